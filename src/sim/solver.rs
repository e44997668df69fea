//! Fixed-step tick pipeline
//!
//! One `tick` is: rebuild the grid, then `substeps` times run
//! gravity → integrate → collisions → boundary. Every phase is split into
//! tasks for the scheduler and followed by a drain barrier, so phases never
//! overlap.
//!
//! Single-particle phases are split into contiguous index ranges. The
//! collision phase writes two particles per pair, so it is split by grid
//! color instead: one batch per color, cells of a batch never share a
//! particle.

use std::ops::Range;
use std::sync::{Arc, Mutex, PoisonError};

use glam::Vec2;

use super::boundary::Boundary;
use super::collision::{lock, resolve_indexed};
use super::grid::{COLOR_COUNT, GridStats, SpatialGrid};
use super::particle::Particle;
use crate::config::{
    BoundaryConfig, SolverConfig, validate_cell_size, validate_gravity, validate_restitution,
    validate_step_dt, validate_substeps,
};
use crate::error::{Error, Result};
use crate::is_finite_vec;
use crate::scheduler::TaskScheduler;

/// Particle store shared with in-flight tasks. Range tasks lock each slot
/// once per phase; chunks are disjoint, so the locks are uncontended.
type ParticleStore = Arc<Vec<Mutex<Particle>>>;

/// Verlet particle solver
#[derive(Debug)]
pub struct Solver {
    config: SolverConfig,
    boundary: Option<Boundary>,
    particles: ParticleStore,
    grid: Arc<SpatialGrid>,
    scheduler: TaskScheduler,
    /// Largest radius in the population (drives the automatic cell size)
    max_radius: f32,
    tick_count: u64,
}

impl Solver {
    /// Validate `config` and start the worker pool
    pub fn new(config: SolverConfig) -> Result<Self> {
        config.validate()?;
        let boundary = config.boundary.as_ref().map(BoundaryConfig::build).transpose()?;
        let threads = config
            .worker_threads
            .unwrap_or_else(TaskScheduler::default_thread_count);
        let scheduler = TaskScheduler::new(threads)?;
        let grid = SpatialGrid::new(config.cell_size.unwrap_or(1.0))?;

        log::info!(
            "Solver ready: {} substeps of {:.5}s, {} worker(s), boundary {:?}",
            config.substeps,
            config.step_dt / config.substeps as f32,
            threads,
            boundary
        );

        Ok(Self {
            config,
            boundary,
            particles: Arc::new(Vec::new()),
            grid: Arc::new(grid),
            scheduler,
            max_radius: 0.0,
            tick_count: 0,
        })
    }

    // === Read surface ===

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    pub fn boundary(&self) -> Option<&Boundary> {
        self.boundary.as_ref()
    }

    pub fn particle_count(&self) -> usize {
        self.particles.len()
    }

    pub fn particle(&self, index: usize) -> Option<Particle> {
        self.particles.get(index).map(|slot| *lock(slot))
    }

    /// Copy of every particle, in index order
    pub fn particles(&self) -> Vec<Particle> {
        self.particles.iter().map(|slot| *lock(slot)).collect()
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn worker_threads(&self) -> usize {
        self.scheduler.num_threads()
    }

    #[inline]
    pub fn substep_dt(&self) -> f32 {
        self.config.step_dt / self.config.substeps as f32
    }

    /// Configured cell size, or twice the largest radius
    pub fn cell_size(&self) -> f32 {
        self.config.cell_size.unwrap_or(2.0 * self.max_radius)
    }

    /// Occupancy of the grid built by the last tick
    pub fn grid_stats(&self) -> GridStats {
        self.grid.stats()
    }

    // === Mutators ===

    /// Add a particle at rest; returns its index
    pub fn add_particle(&mut self, position: Vec2, radius: f32) -> Result<usize> {
        let particle = Particle::new(position, radius)?;
        let store = Arc::get_mut(&mut self.particles).ok_or(Error::TickInFlight)?;
        store.push(Mutex::new(particle));
        let index = store.len() - 1;

        if radius > self.max_radius {
            self.max_radius = radius;
            if let Some(cell_size) = self.config.cell_size {
                if cell_size < 2.0 * radius {
                    log::warn!(
                        "cell size {cell_size} is below particle diameter {}; pairs may be missed",
                        2.0 * radius
                    );
                }
            }
        }
        Ok(index)
    }

    /// Set a particle's velocity. It is scaled by `step_dt`, so the particle
    /// moves `velocity * step_dt` per substep until forces change it.
    pub fn set_particle_velocity(&mut self, index: usize, velocity: Vec2) -> Result<()> {
        if !is_finite_vec(velocity) {
            return Err(Error::invalid(format!("velocity must be finite, got {velocity}")));
        }
        let len = self.particles.len();
        let slot = self
            .particles
            .get(index)
            .ok_or(Error::UnknownParticle { index, len })?;
        lock(slot).set_velocity(velocity, self.config.step_dt);
        Ok(())
    }

    pub fn set_gravity(&mut self, gravity: Vec2) -> Result<()> {
        validate_gravity(gravity)?;
        self.config.gravity = gravity;
        Ok(())
    }

    pub fn set_step_dt(&mut self, step_dt: f32) -> Result<()> {
        validate_step_dt(step_dt)?;
        self.config.step_dt = step_dt;
        Ok(())
    }

    pub fn set_substep_count(&mut self, substeps: u32) -> Result<()> {
        validate_substeps(substeps)?;
        self.config.substeps = substeps;
        Ok(())
    }

    pub fn set_restitution(&mut self, restitution: f32) -> Result<()> {
        validate_restitution(restitution)?;
        self.config.restitution = restitution;
        Ok(())
    }

    /// Fix the cell size, or `None` to derive it from the largest radius
    pub fn set_cell_size(&mut self, cell_size: Option<f32>) -> Result<()> {
        validate_cell_size(cell_size)?;
        self.config.cell_size = cell_size;
        Ok(())
    }

    /// Install the boundary, replacing any previous one
    pub fn add_boundary(&mut self, boundary: Boundary) {
        log::info!("Boundary set: {boundary:?}");
        self.config.boundary = Some(BoundaryConfig::from(boundary));
        self.boundary = Some(boundary);
    }

    pub fn clear_boundary(&mut self) {
        self.config.boundary = None;
        self.boundary = None;
    }

    /// Accelerate every particle toward `point` by
    /// `(point - p) * max(0, strength * (max_distance - |point - p|))`.
    ///
    /// The acceleration is consumed by the first substep of the next tick.
    pub fn apply_radial_pull(&mut self, point: Vec2, strength: f32, max_distance: f32) -> Result<()> {
        if !is_finite_vec(point) || !strength.is_finite() || !max_distance.is_finite() {
            return Err(Error::invalid("radial pull parameters must be finite"));
        }
        self.for_each_particle(move |p| {
            let offset = point - p.position;
            let falloff = (strength * (max_distance - offset.length())).max(0.0);
            p.accumulate(offset * falloff);
        })
    }

    /// Drop every particle `keep` rejects; survivors keep their relative
    /// order. Returns the number removed.
    pub fn retain_particles<F>(&mut self, mut keep: F) -> Result<usize>
    where
        F: FnMut(&Particle) -> bool,
    {
        let store = Arc::get_mut(&mut self.particles).ok_or(Error::TickInFlight)?;
        let before = store.len();
        store.retain_mut(|slot| keep(slot.get_mut().unwrap_or_else(PoisonError::into_inner)));
        let removed = before - store.len();

        self.max_radius = store
            .iter_mut()
            .map(|slot| slot.get_mut().unwrap_or_else(PoisonError::into_inner).radius())
            .fold(0.0, f32::max);
        Ok(removed)
    }

    pub fn clear_particles(&mut self) -> Result<()> {
        Arc::get_mut(&mut self.particles)
            .ok_or(Error::TickInFlight)?
            .clear();
        self.max_radius = 0.0;
        Ok(())
    }

    // === Tick ===

    /// Advance the simulation by one `step_dt`
    pub fn tick(&mut self) -> Result<()> {
        if self.particles.is_empty() {
            return Ok(());
        }

        self.rebuild_grid()?;

        let dt = self.substep_dt();
        let gravity = self.config.gravity;
        let restitution = self.config.restitution;

        for _ in 0..self.config.substeps {
            if gravity != Vec2::ZERO {
                self.for_each_particle(move |p| p.accumulate(gravity))?;
            }

            self.for_each_particle(move |p| p.integrate(dt))?;

            self.resolve_collisions()?;

            if let Some(boundary) = self.boundary {
                self.for_each_particle(move |p| boundary.resolve(p, restitution))?;
            }
        }

        self.tick_count += 1;
        Ok(())
    }

    fn rebuild_grid(&mut self) -> Result<()> {
        let cell_size = self.cell_size();
        // No task holds the grid between ticks, so this does not clone
        let grid = Arc::make_mut(&mut self.grid);
        if grid.cell_size() != cell_size {
            grid.set_cell_size(cell_size)?;
        }
        grid.rebuild(self.particles.iter().map(|slot| lock(slot).position));

        let stats = grid.stats();
        log::debug!(
            "Tick {}: {} particles in {} cells (largest {})",
            self.tick_count,
            stats.particles,
            stats.occupied_cells,
            stats.largest_cell
        );
        Ok(())
    }

    /// Run `op` on every particle, one contiguous range per task
    fn for_each_particle<F>(&self, op: F) -> Result<()>
    where
        F: Fn(&mut Particle) + Send + Sync + 'static,
    {
        let op = Arc::new(op);
        let ranges = chunk_ranges(
            self.particles.len(),
            self.scheduler.num_threads(),
            self.config.min_chunk_size,
        );
        for range in ranges {
            let particles = Arc::clone(&self.particles);
            let op = Arc::clone(&op);
            self.scheduler.enqueue(move || {
                for slot in &particles[range] {
                    op(&mut *lock(slot));
                }
            })?;
        }
        self.scheduler.wait_for_tasks()
    }

    /// One scheduler batch per grid color. Small populations run as a single
    /// task that walks the colors in the same order.
    fn resolve_collisions(&self) -> Result<()> {
        let workers = self.scheduler.num_threads();

        if workers == 1 || self.particles.len().div_ceil(workers) < self.config.min_chunk_size {
            let particles = Arc::clone(&self.particles);
            let grid = Arc::clone(&self.grid);
            self.scheduler.enqueue(move || {
                grid.for_each_unique_pair(|a, b| {
                    resolve_indexed(&particles, a, b);
                });
            })?;
            return self.scheduler.wait_for_tasks();
        }

        for color in 0..COLOR_COUNT {
            let cells = self.grid.color_class(color).len();
            if cells == 0 {
                continue;
            }
            for range in chunk_ranges(cells, workers, 1) {
                let particles = Arc::clone(&self.particles);
                let grid = Arc::clone(&self.grid);
                self.scheduler.enqueue(move || {
                    for &cell in &grid.color_class(color)[range] {
                        grid.for_each_pair_from_cell(cell, |a, b| {
                            resolve_indexed(&particles, a, b);
                        });
                    }
                })?;
            }
            self.scheduler.wait_for_tasks()?;
        }
        Ok(())
    }
}

/// Split `0..len` into at most `workers` contiguous ranges. If a share would
/// be smaller than `min_chunk`, the whole range is one task.
fn chunk_ranges(len: usize, workers: usize, min_chunk: usize) -> Vec<Range<usize>> {
    if len == 0 {
        return Vec::new();
    }
    let chunk = len.div_ceil(workers.max(1));
    if chunk < min_chunk {
        return vec![0..len];
    }
    (0..len)
        .step_by(chunk)
        .map(|start| start..(start + chunk).min(len))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_pcg::Pcg32;

    fn config(workers: usize) -> SolverConfig {
        SolverConfig {
            worker_threads: Some(workers),
            ..Default::default()
        }
    }

    fn weightless(workers: usize) -> SolverConfig {
        SolverConfig {
            gravity: Vec2::ZERO,
            ..config(workers)
        }
    }

    fn bits(particles: &[Particle]) -> Vec<[u32; 4]> {
        particles
            .iter()
            .map(|p| {
                [
                    p.position.x.to_bits(),
                    p.position.y.to_bits(),
                    p.position_previous.x.to_bits(),
                    p.position_previous.y.to_bits(),
                ]
            })
            .collect()
    }

    /// Random cloud inside a circle of radius 300 around (600, 400)
    fn crowded(workers: usize, min_chunk_size: usize, count: usize) -> Solver {
        let mut solver = Solver::new(SolverConfig {
            min_chunk_size,
            boundary: Some(BoundaryConfig::Circle {
                center: Vec2::new(600.0, 400.0),
                radius: 300.0,
            }),
            ..config(workers)
        })
        .unwrap();
        let mut rng = Pcg32::seed_from_u64(42);
        for _ in 0..count {
            let angle = rng.random_range(0.0..std::f32::consts::TAU);
            let r = rng.random_range(0.0..250.0);
            let position = crate::polar_to_cartesian(Vec2::new(600.0, 400.0), r, angle);
            solver.add_particle(position, rng.random_range(2.0..6.0)).unwrap();
        }
        solver
    }

    #[test]
    fn test_chunk_ranges() {
        assert!(chunk_ranges(0, 4, 1).is_empty());
        assert_eq!(chunk_ranges(100, 4, 50), vec![0..100]);
        assert_eq!(chunk_ranges(400, 4, 50), vec![0..100, 100..200, 200..300, 300..400]);
        assert_eq!(chunk_ranges(10, 4, 1), vec![0..3, 3..6, 6..9, 9..10]);
        // Never more ranges than workers, always covering everything
        for len in 1..40 {
            for workers in 1..6 {
                let ranges = chunk_ranges(len, workers, 1);
                assert!(ranges.len() <= workers);
                assert_eq!(ranges.iter().map(|r| r.len()).sum::<usize>(), len);
            }
        }
    }

    #[test]
    fn test_invalid_parameters_fail_fast() {
        assert!(Solver::new(SolverConfig {
            substeps: 0,
            ..config(1)
        })
        .is_err());

        let mut solver = Solver::new(config(1)).unwrap();
        assert!(solver.add_particle(Vec2::ZERO, 0.0).is_err());
        assert!(solver.set_substep_count(0).is_err());
        assert!(solver.set_step_dt(-1.0).is_err());
        assert!(solver.set_cell_size(Some(-1.0)).is_err());
        assert!(solver.set_restitution(0.0).is_err());
        assert!(matches!(
            solver.set_particle_velocity(3, Vec2::X),
            Err(Error::UnknownParticle { index: 3, len: 0 })
        ));
        assert_eq!(solver.particle_count(), 0);
        assert_eq!(solver.config().substeps, 8);
    }

    #[test]
    fn test_empty_tick_is_noop() {
        let mut solver = Solver::new(config(2)).unwrap();
        solver.tick().unwrap();
        assert_eq!(solver.tick_count(), 0);
        assert_eq!(solver.grid_stats(), GridStats::default());
    }

    #[test]
    fn test_straight_line_without_forces() {
        let run = || {
            let mut solver = Solver::new(weightless(2)).unwrap();
            let i = solver.add_particle(Vec2::new(10.0, 20.0), 2.0).unwrap();
            solver.set_particle_velocity(i, Vec2::new(30.0, -12.0)).unwrap();
            let step = solver.particle(i).unwrap().velocity();
            for _ in 0..20 {
                solver.tick().unwrap();
            }
            (solver.particles(), step)
        };

        let (first, step) = run();
        let (second, _) = run();
        assert_eq!(bits(&first), bits(&second));

        let expected = Vec2::new(10.0, 20.0) + step * (20 * 8) as f32;
        assert!((first[0].position - expected).length() < 0.5);
        assert!((first[0].velocity() - step).length() < 1e-2);
    }

    #[test]
    fn test_mass_proportional_separation_through_tick() {
        let mut solver = Solver::new(SolverConfig {
            substeps: 1,
            ..weightless(2)
        })
        .unwrap();
        solver.add_particle(Vec2::new(100.0, 100.0), 10.0).unwrap();
        solver.add_particle(Vec2::new(125.0, 100.0), 20.0).unwrap();
        assert_eq!(solver.cell_size(), 40.0);

        solver.tick().unwrap();

        let small = solver.particle(0).unwrap();
        let large = solver.particle(1).unwrap();
        assert!((small.position.x - 96.0).abs() < 1e-3);
        assert!((large.position.x - 126.0).abs() < 1e-3);
        assert!(((large.position - small.position).length() - 30.0).abs() < 1e-3);
        assert_eq!(solver.grid_stats().occupied_cells, 2);
    }

    #[test]
    fn test_coincident_spawns_separate() {
        let mut solver = Solver::new(weightless(2)).unwrap();
        solver.add_particle(Vec2::new(50.0, 50.0), 5.0).unwrap();
        solver.add_particle(Vec2::new(50.0, 50.0), 5.0).unwrap();

        solver.tick().unwrap();

        let particles = solver.particles();
        assert!(particles.iter().all(|p| p.position.is_finite()));
        assert!((particles[0].position - particles[1].position).length() > 1.0);
    }

    #[test]
    fn test_no_boundary_means_unrestricted() {
        let mut solver = Solver::new(weightless(1)).unwrap();
        let i = solver.add_particle(Vec2::new(-1.0e4, 5.0e4), 3.0).unwrap();
        solver.set_particle_velocity(i, Vec2::new(-600.0, 0.0)).unwrap();
        solver.tick().unwrap();
        assert!(solver.particle(i).unwrap().position.x < -1.0e4);
        assert!(solver.boundary().is_none());
    }

    #[test]
    fn test_rectangle_boundary_bounce_in_tick() {
        let mut solver = Solver::new(SolverConfig {
            substeps: 1,
            restitution: 0.5,
            ..weightless(1)
        })
        .unwrap();
        solver.add_boundary(Boundary::rectangle(Vec2::ZERO, 100.0, 100.0).unwrap());
        let i = solver.add_particle(Vec2::new(0.0, 43.0), 5.0).unwrap();
        // 4 units per step toward the top edge
        solver.set_particle_velocity(i, Vec2::new(0.0, 240.0)).unwrap();

        solver.tick().unwrap();

        let p = solver.particle(i).unwrap();
        assert!((p.position.y - 45.0).abs() < 1e-4);
        assert!((p.velocity().y - -2.0).abs() < 1e-3, "{}", p.velocity());
        assert_eq!(
            solver.config().boundary,
            Some(BoundaryConfig::Rectangle {
                center: Vec2::ZERO,
                width: 100.0,
                height: 100.0,
            })
        );

        solver.clear_boundary();
        assert!(solver.boundary().is_none());
        assert!(solver.config().boundary.is_none());
    }

    #[test]
    fn test_far_particle_ticks_cleanly() {
        let mut solver = Solver::new(weightless(1)).unwrap();
        let far = solver.add_particle(Vec2::new(1.0e10, 0.0), 1.0).unwrap();
        let near = solver.add_particle(Vec2::new(0.0, 0.0), 1.0).unwrap();
        solver.set_particle_velocity(near, Vec2::new(60.0, 0.0)).unwrap();

        for _ in 0..3 {
            solver.tick().unwrap();
        }
        assert_eq!(solver.tick_count(), 3);
        assert_eq!(solver.particle(far).unwrap().position, Vec2::new(1.0e10, 0.0));
        assert!(solver.particle(near).unwrap().position.x > 20.0);
    }

    #[test]
    fn test_gravity_change_applies_next_tick() {
        let mut solver = Solver::new(SolverConfig {
            substeps: 1,
            ..weightless(1)
        })
        .unwrap();
        let i = solver.add_particle(Vec2::ZERO, 1.0).unwrap();

        solver.tick().unwrap();
        assert_eq!(solver.particle(i).unwrap().position, Vec2::ZERO);

        solver.set_gravity(Vec2::new(3600.0, 0.0)).unwrap();
        solver.tick().unwrap();
        // a·dt² = 3600 / 3600
        let p = solver.particle(i).unwrap();
        assert!((p.position - Vec2::new(1.0, 0.0)).length() < 1e-4, "{}", p.position);
        assert_eq!(solver.config().gravity, Vec2::new(3600.0, 0.0));
    }

    #[test]
    fn test_step_dt_change_scales_motion() {
        let fall = |step_dt: f32| {
            let mut solver = Solver::new(SolverConfig {
                gravity: Vec2::new(0.0, -100.0),
                substeps: 1,
                ..config(1)
            })
            .unwrap();
            solver.set_step_dt(step_dt).unwrap();
            solver.add_particle(Vec2::ZERO, 1.0).unwrap();
            solver.tick().unwrap();
            solver.particle(0).unwrap().position.y
        };

        // -100 * dt²
        assert!((fall(0.1) - -1.0).abs() < 1e-4);
        assert!((fall(0.2) - -4.0).abs() < 1e-4);
    }

    #[test]
    fn test_radial_pull() {
        let mut solver = Solver::new(weightless(1)).unwrap();
        let near = solver.add_particle(Vec2::new(100.0, 0.0), 1.0).unwrap();
        let far = solver.add_particle(Vec2::new(500.0, 0.0), 1.0).unwrap();

        solver.apply_radial_pull(Vec2::new(200.0, 0.0), 3.0, 120.0).unwrap();

        // (200 - 100) * 3 * (120 - 100)
        let a = solver.particle(near).unwrap().pending_acceleration;
        assert!((a - Vec2::new(6000.0, 0.0)).length() < 1e-2);
        assert_eq!(solver.particle(far).unwrap().pending_acceleration, Vec2::ZERO);

        assert!(solver.apply_radial_pull(Vec2::new(f32::NAN, 0.0), 1.0, 1.0).is_err());
    }

    #[test]
    fn test_retain_preserves_order() {
        let mut solver = Solver::new(config(1)).unwrap();
        for i in 0..6 {
            solver.add_particle(Vec2::new(i as f32 * 10.0, 0.0), 1.0 + i as f32).unwrap();
        }
        let removed = solver.retain_particles(|p| p.position.x != 20.0 && p.position.x != 50.0).unwrap();
        assert_eq!(removed, 2);

        let xs: Vec<f32> = solver.particles().iter().map(|p| p.position.x).collect();
        assert_eq!(xs, vec![0.0, 10.0, 30.0, 40.0]);
        // Largest survivor has radius 5
        assert_eq!(solver.cell_size(), 10.0);

        solver.clear_particles().unwrap();
        assert_eq!(solver.particle_count(), 0);
    }

    #[test]
    fn test_thread_count_does_not_change_results() {
        let mut single = crowded(1, 1, 400);
        let mut pooled = crowded(4, 1, 400);
        for _ in 0..30 {
            single.tick().unwrap();
            pooled.tick().unwrap();
        }
        assert_eq!(bits(&single.particles()), bits(&pooled.particles()));
    }

    #[test]
    fn test_crowd_stays_contained() {
        let mut solver = crowded(3, 10, 600);
        let boundary = *solver.boundary().unwrap();
        for _ in 0..60 {
            solver.tick().unwrap();
        }
        for p in solver.particles() {
            assert!(p.position.is_finite());
            let grown = match boundary {
                Boundary::Circle { center, radius } => (p.position - center).length() - radius,
                Boundary::Rectangle { .. } => unreachable!(),
            };
            assert!(grown <= -p.radius() + 1e-2, "particle escaped by {grown}");
        }
        assert_eq!(solver.tick_count(), 60);
    }

    #[test]
    fn test_settles_against_circular_boundary() {
        let mut solver = Solver::new(SolverConfig {
            gravity: Vec2::new(0.0, -9.81),
            step_dt: 1.0 / 60.0,
            substeps: 8,
            restitution: 0.9,
            boundary: Some(BoundaryConfig::Circle {
                center: Vec2::new(600.0, 400.0),
                radius: 400.0,
            }),
            ..config(2)
        })
        .unwrap();
        solver.add_particle(Vec2::new(600.0, 700.0), 15.0).unwrap();

        let limit = 400.0 - 15.0;
        let mut closest_to_wall = 0.0f32;
        for _ in 0..1000 {
            solver.tick().unwrap();
            let dist = (solver.particle(0).unwrap().position - Vec2::new(600.0, 400.0)).length();
            assert!(dist <= limit + 1e-2, "left the boundary: {dist}");
            closest_to_wall = closest_to_wall.max(dist);
        }
        assert!(closest_to_wall >= limit - 1e-2, "never reached the wall: {closest_to_wall}");
    }
}
