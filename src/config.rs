//! Solver and demo configuration
//!
//! Everything the solver is tuned by is passed in here at construction;
//! there is no global mutable state. Files are plain JSON.

use std::fs;
use std::path::Path;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::consts::*;
use crate::error::{Error, Result};
use crate::is_finite_vec;
use crate::sim::Boundary;

/// Serializable boundary description
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum BoundaryConfig {
    Rectangle { center: Vec2, width: f32, height: f32 },
    Circle { center: Vec2, radius: f32 },
}

impl BoundaryConfig {
    pub fn build(&self) -> Result<Boundary> {
        match *self {
            BoundaryConfig::Rectangle {
                center,
                width,
                height,
            } => Boundary::rectangle(center, width, height),
            BoundaryConfig::Circle { center, radius } => Boundary::circle(center, radius),
        }
    }
}

impl From<Boundary> for BoundaryConfig {
    fn from(boundary: Boundary) -> Self {
        match boundary {
            Boundary::Rectangle {
                top,
                bottom,
                left,
                right,
            } => BoundaryConfig::Rectangle {
                center: Vec2::new((left + right) * 0.5, (bottom + top) * 0.5),
                width: right - left,
                height: top - bottom,
            },
            Boundary::Circle { center, radius } => BoundaryConfig::Circle { center, radius },
        }
    }
}

/// Solver tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Constant acceleration applied every substep
    pub gravity: Vec2,
    /// Outer step per `tick`
    pub step_dt: f32,
    /// Integration passes per tick (>= 1)
    pub substeps: u32,
    /// Boundary bounce factor in (0, 1]
    pub restitution: f32,
    /// Broad-phase cell size; `None` derives 2x the largest radius
    pub cell_size: Option<f32>,
    /// Worker count; `None` uses hardware concurrency - 1
    pub worker_threads: Option<usize>,
    /// Per-worker share below which a phase runs as a single task
    pub min_chunk_size: usize,
    /// Containment shape, if any
    pub boundary: Option<BoundaryConfig>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            gravity: GRAVITY,
            step_dt: STEP_DT,
            substeps: SUBSTEPS,
            restitution: RESTITUTION,
            cell_size: None,
            worker_threads: None,
            min_chunk_size: MIN_CHUNK_SIZE,
            boundary: None,
        }
    }
}

impl SolverConfig {
    pub fn validate(&self) -> Result<()> {
        validate_gravity(self.gravity)?;
        validate_step_dt(self.step_dt)?;
        validate_substeps(self.substeps)?;
        validate_restitution(self.restitution)?;
        validate_cell_size(self.cell_size)?;
        if self.worker_threads == Some(0) {
            return Err(Error::invalid("worker_threads must be >= 1"));
        }
        if let Some(boundary) = &self.boundary {
            boundary.build()?;
        }
        Ok(())
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config = Self::from_json_str(&fs::read_to_string(path)?)?;
        log::info!("Loaded solver config from {}", path.display());
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::write(path.as_ref(), self.to_json_string()?)?;
        Ok(())
    }
}

pub(crate) fn validate_gravity(gravity: Vec2) -> Result<()> {
    if is_finite_vec(gravity) {
        Ok(())
    } else {
        Err(Error::invalid(format!("gravity must be finite, got {gravity}")))
    }
}

pub(crate) fn validate_step_dt(step_dt: f32) -> Result<()> {
    if step_dt.is_finite() && step_dt > 0.0 {
        Ok(())
    } else {
        Err(Error::invalid(format!("step_dt must be > 0, got {step_dt}")))
    }
}

pub(crate) fn validate_substeps(substeps: u32) -> Result<()> {
    if substeps >= 1 {
        Ok(())
    } else {
        Err(Error::invalid("substeps must be >= 1"))
    }
}

pub(crate) fn validate_restitution(restitution: f32) -> Result<()> {
    if restitution > 0.0 && restitution <= 1.0 {
        Ok(())
    } else {
        Err(Error::invalid(format!(
            "restitution must be in (0, 1], got {restitution}"
        )))
    }
}

pub(crate) fn validate_cell_size(cell_size: Option<f32>) -> Result<()> {
    match cell_size {
        Some(size) if !(size.is_finite() && size > 0.0) => Err(Error::invalid(format!(
            "cell_size must be > 0, got {size}"
        ))),
        _ => Ok(()),
    }
}

/// Emitter settings for the caller-side spawn policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpawnConfig {
    pub position: Vec2,
    pub radius: f32,
    /// Launch velocity, as passed to `Solver::set_particle_velocity`
    pub velocity: Vec2,
    /// Seconds between spawns
    pub delay: f32,
    /// Population cap
    pub max_particles: usize,
    /// Random rotation of the launch direction, radians either way
    pub angle_jitter: f32,
}

impl Default for SpawnConfig {
    fn default() -> Self {
        Self {
            position: SPAWN_POSITION,
            radius: SPAWN_RADIUS,
            velocity: Vec2::new(1.0, -1.0) * SPAWN_SPEED,
            delay: SPAWN_DELAY,
            max_particles: MAX_PARTICLES,
            angle_jitter: 0.0,
        }
    }
}

impl SpawnConfig {
    pub fn validate(&self) -> Result<()> {
        if !(is_finite_vec(self.position) && is_finite_vec(self.velocity)) {
            return Err(Error::invalid("spawn position and velocity must be finite"));
        }
        if !(self.radius.is_finite() && self.radius > 0.0) {
            return Err(Error::invalid(format!(
                "spawn radius must be > 0, got {}",
                self.radius
            )));
        }
        if !(self.delay.is_finite() && self.delay >= 0.0) {
            return Err(Error::invalid(format!(
                "spawn delay must be >= 0, got {}",
                self.delay
            )));
        }
        if !(self.angle_jitter.is_finite() && self.angle_jitter >= 0.0) {
            return Err(Error::invalid("angle_jitter must be >= 0"));
        }
        Ok(())
    }
}

/// Wind tunnel scenario: columns of particles pushed along by a constant
/// air velocity, removed past `outflow_x` and refilled at `x = 0`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindTunnelConfig {
    /// Re-applied to every particle each frame, as passed to
    /// `Solver::set_particle_velocity`
    pub air_velocity: Vec2,
    pub particle_radius: f32,
    /// Columns seeded at startup
    pub seed_columns: u32,
    /// Particles with `x` beyond this are removed
    pub outflow_x: f32,
    /// Inflow column spans `0..=height`
    pub height: f32,
}

impl Default for WindTunnelConfig {
    fn default() -> Self {
        Self {
            air_velocity: TUNNEL_AIR_VELOCITY,
            particle_radius: TUNNEL_PARTICLE_RADIUS,
            seed_columns: TUNNEL_SEED_COLUMNS,
            outflow_x: SCREEN_WIDTH,
            height: SCREEN_HEIGHT,
        }
    }
}

impl WindTunnelConfig {
    pub fn validate(&self) -> Result<()> {
        if !is_finite_vec(self.air_velocity) {
            return Err(Error::invalid("air velocity must be finite"));
        }
        if !(self.particle_radius.is_finite() && self.particle_radius > 0.0) {
            return Err(Error::invalid(format!(
                "tunnel particle radius must be > 0, got {}",
                self.particle_radius
            )));
        }
        if !(self.outflow_x.is_finite() && self.outflow_x > 0.0) {
            return Err(Error::invalid(format!(
                "outflow_x must be > 0, got {}",
                self.outflow_x
            )));
        }
        if !(self.height.is_finite() && self.height >= 0.0) {
            return Err(Error::invalid(format!(
                "tunnel height must be >= 0, got {}",
                self.height
            )));
        }
        Ok(())
    }
}

/// Interactive attraction toward a point
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PullConfig {
    pub point: Vec2,
    pub strength: f32,
    pub max_distance: f32,
}

impl Default for PullConfig {
    fn default() -> Self {
        Self {
            point: Vec2::new(SCREEN_WIDTH / 2.0, SCREEN_HEIGHT / 2.0),
            strength: PULL_STRENGTH,
            max_distance: PULL_MAX_DISTANCE,
        }
    }
}

/// Settings for the headless demo binary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    pub solver: SolverConfig,
    pub spawn: SpawnConfig,
    /// Frames to simulate
    pub frames: u32,
    /// Seed for the spawner's jitter
    pub seed: u64,
    /// Pull applied every frame when set
    pub pull: Option<PullConfig>,
    /// Run the wind tunnel instead of the emitter when set
    pub wind_tunnel: Option<WindTunnelConfig>,
}

impl Default for DemoConfig {
    fn default() -> Self {
        let center = Vec2::new(SCREEN_WIDTH / 2.0, SCREEN_HEIGHT / 2.0);
        Self {
            solver: SolverConfig {
                boundary: Some(BoundaryConfig::Circle {
                    center,
                    radius: 400.0,
                }),
                ..Default::default()
            },
            spawn: SpawnConfig::default(),
            frames: 600,
            seed: 0x5eed,
            pull: None,
            wind_tunnel: None,
        }
    }
}

impl DemoConfig {
    pub fn validate(&self) -> Result<()> {
        self.solver.validate()?;
        self.spawn.validate()?;
        if let Some(tunnel) = &self.wind_tunnel {
            tunnel.validate()?;
        }
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config: Self = serde_json::from_str(&fs::read_to_string(path)?)?;
        config.validate()?;
        log::info!("Loaded demo config from {}", path.display());
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::write(path.as_ref(), serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}
