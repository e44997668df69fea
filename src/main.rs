//! Headless demo: an emitter fills a circular container (or, with
//! `wind_tunnel` set, particles stream through an open tunnel) and the frame
//! loop logs tick timing.
//!
//! Usage:
//!   verlet-pool [config.json]
//!   verlet-pool --write-config <path>

use std::process::ExitCode;
use std::time::{Duration, Instant};

use verlet_pool::{DemoConfig, Result, Solver, Spawner, WindTunnel};

/// Frames between timing reports
const REPORT_EVERY: u32 = 60;

fn main() -> ExitCode {
    #[cfg(not(target_arch = "wasm32"))]
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run(std::env::args().skip(1).collect()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Vec<String>) -> Result<()> {
    let config = match args.as_slice() {
        [flag, path] if flag == "--write-config" => {
            DemoConfig::default().save(path)?;
            log::info!("Wrote default config to {path}");
            return Ok(());
        }
        [path] => DemoConfig::load(path)?,
        _ => DemoConfig::default(),
    };
    config.validate()?;

    log::info!("Verlet pool starting ({} frames)...", config.frames);

    let step_dt = config.solver.step_dt;
    let mut solver = Solver::new(config.solver.clone())?;
    let mut spawner = Spawner::new(config.spawn.clone(), config.seed)?;
    let mut tunnel = match config.wind_tunnel.clone() {
        Some(tunnel_config) => {
            let mut tunnel = WindTunnel::new(tunnel_config)?;
            tunnel.populate(&mut solver)?;
            Some(tunnel)
        }
        None => None,
    };

    let mut window = Duration::ZERO;
    let mut slowest = Duration::ZERO;
    for frame in 0..config.frames {
        let now = frame as f32 * step_dt;
        match tunnel.as_mut() {
            Some(tunnel) => {
                tunnel.update(&mut solver)?;
            }
            None => {
                spawner.update(&mut solver, now)?;
            }
        }
        if let Some(pull) = config.pull {
            solver.apply_radial_pull(pull.point, pull.strength, pull.max_distance)?;
        }

        let started = Instant::now();
        solver.tick()?;
        let elapsed = started.elapsed();
        window += elapsed;
        slowest = slowest.max(elapsed);

        if (frame + 1) % REPORT_EVERY == 0 {
            let stats = solver.grid_stats();
            log::info!(
                "Frame {}: {} particles, {:.3} ms/tick avg, {:.3} ms max, {} cells (largest {})",
                frame + 1,
                solver.particle_count(),
                window.as_secs_f64() * 1000.0 / REPORT_EVERY as f64,
                slowest.as_secs_f64() * 1000.0,
                stats.occupied_cells,
                stats.largest_cell
            );
            window = Duration::ZERO;
            slowest = Duration::ZERO;
        }
    }

    let snapshot = solver.render_snapshot();
    log::info!(
        "Done after {} ticks: {} particles, max speed {:.3}, {} bytes of instance data",
        solver.tick_count(),
        snapshot.instances.len(),
        snapshot.max_speed(),
        snapshot.instance_bytes().len()
    );
    Ok(())
}
