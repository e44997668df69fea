//! Wind tunnel scenario
//!
//! A caller-side policy like `Spawner`: weightless particles are driven by a
//! constant air velocity, dropped once they pass the outflow edge and
//! replaced in the inflow column at `x = 0`. Run `update` once per frame,
//! before `Solver::tick`.

use glam::Vec2;

use crate::config::WindTunnelConfig;
use crate::error::Result;
use crate::sim::Solver;

/// What one `update` changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TunnelUpdate {
    pub removed: usize,
    pub added: usize,
}

#[derive(Debug, Clone)]
pub struct WindTunnel {
    config: WindTunnelConfig,
    removed: usize,
    added: usize,
}

impl WindTunnel {
    pub fn new(config: WindTunnelConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            removed: 0,
            added: 0,
        })
    }

    pub fn config(&self) -> &WindTunnelConfig {
        &self.config
    }

    /// Distance between neighbouring slots: one diameter of clearance
    #[inline]
    pub fn spacing(&self) -> f32 {
        3.0 * self.config.particle_radius
    }

    /// Slots in one column
    pub fn rows(&self) -> usize {
        (self.config.height / self.spacing()).floor() as usize + 1
    }

    /// Particles removed at the outflow edge so far
    pub fn removed(&self) -> usize {
        self.removed
    }

    /// Particles added at the inflow column so far (seeding included)
    pub fn added(&self) -> usize {
        self.added
    }

    fn column(&self, x: f32) -> impl Iterator<Item = Vec2> {
        let spacing = self.spacing();
        (0..self.rows()).map(move |row| Vec2::new(x, row as f32 * spacing))
    }

    /// Switch gravity off and seed `seed_columns` columns from `x = 0`.
    /// Returns the number of particles added.
    pub fn populate(&mut self, solver: &mut Solver) -> Result<usize> {
        solver.set_gravity(Vec2::ZERO)?;

        let mut count = 0;
        for column in 0..self.config.seed_columns {
            for slot in self.column(column as f32 * self.spacing()) {
                solver.add_particle(slot, self.config.particle_radius)?;
                count += 1;
            }
        }
        self.added += count;
        self.apply_air(solver)?;

        log::info!(
            "Wind tunnel seeded {count} particles in {} column(s)",
            self.config.seed_columns
        );
        Ok(count)
    }

    /// Drop particles past the outflow edge, refill free inflow slots and
    /// re-apply the air velocity to everything.
    pub fn update(&mut self, solver: &mut Solver) -> Result<TunnelUpdate> {
        let outflow_x = self.config.outflow_x;
        let removed = solver.retain_particles(|p| p.position.x <= outflow_x)?;
        let added = self.refill(solver)?;
        self.apply_air(solver)?;

        self.removed += removed;
        self.added += added;
        if removed > 0 || added > 0 {
            log::debug!("Wind tunnel: -{removed} +{added}, {} live", solver.particle_count());
        }
        Ok(TunnelUpdate { removed, added })
    }

    fn refill(&self, solver: &mut Solver) -> Result<usize> {
        let spacing = self.spacing();
        let occupied: Vec<Vec2> = solver.particles().iter().map(|p| p.position).collect();

        let mut added = 0;
        for slot in self.column(0.0) {
            if occupied.iter().all(|p| p.distance(slot) >= spacing) {
                solver.add_particle(slot, self.config.particle_radius)?;
                added += 1;
            }
        }
        Ok(added)
    }

    fn apply_air(&self, solver: &mut Solver) -> Result<()> {
        for index in 0..solver.particle_count() {
            solver.set_particle_velocity(index, self.config.air_velocity)?;
        }
        Ok(())
    }
}
