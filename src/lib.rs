//! Verlet Pool - a multithreaded Verlet particle solver
//!
//! Core modules:
//! - `sim`: Particles, boundaries, the spatial grid and the tick pipeline
//! - `scheduler`: Worker pool with a drain barrier
//! - `config`: Serializable solver/spawn configuration
//! - `spawn`: Caller-side emitter policy
//! - `tunnel`: Wind tunnel inflow/outflow policy
//! - `runner`: Opt-in background tick loop
//! - `renderer`: Read-only snapshot types for a drawing collaborator

pub mod config;
pub mod error;
pub mod renderer;
pub mod runner;
pub mod scheduler;
pub mod sim;
pub mod spawn;
pub mod tunnel;

pub use config::{
    BoundaryConfig, DemoConfig, PullConfig, SolverConfig, SpawnConfig, WindTunnelConfig,
};
pub use error::{Error, Result};
pub use renderer::RenderSnapshot;
pub use runner::BackgroundLoop;
pub use scheduler::TaskScheduler;
pub use sim::{Boundary, Particle, Solver, SpatialGrid};
pub use spawn::Spawner;
pub use tunnel::WindTunnel;

use glam::Vec2;

/// Default tuning values
pub mod consts {
    use glam::Vec2;

    /// Demo domain dimensions
    pub const SCREEN_WIDTH: f32 = 1200.0;
    pub const SCREEN_HEIGHT: f32 = 800.0;

    /// Outer timestep fed to the solver once per frame
    pub const STEP_DT: f32 = 1.0 / 60.0;
    /// Integration passes per tick
    pub const SUBSTEPS: u32 = 8;
    /// Downward pull in world units/s² (y-up)
    pub const GRAVITY: Vec2 = Vec2::new(0.0, -9.81);
    /// Fraction of normal speed kept after a boundary bounce
    pub const RESTITUTION: f32 = 0.9;

    /// Below this many particles per worker a phase runs as one task
    pub const MIN_CHUNK_SIZE: usize = 50;

    /// Distance under which a pair normal is treated as degenerate
    pub const NORMAL_EPSILON: f32 = 1.0e-6;

    /// Emitter defaults
    pub const MAX_PARTICLES: usize = 5000;
    pub const SPAWN_DELAY: f32 = 0.05;
    pub const SPAWN_RADIUS: f32 = 3.0;
    pub const SPAWN_SPEED: f32 = 5.0;
    pub const SPAWN_POSITION: Vec2 = Vec2::new(SCREEN_WIDTH / 2.0, SCREEN_HEIGHT - 100.0);

    /// Wind tunnel defaults
    pub const TUNNEL_AIR_VELOCITY: Vec2 = Vec2::new(300.0, 0.0);
    pub const TUNNEL_PARTICLE_RADIUS: f32 = 10.0;
    pub const TUNNEL_SEED_COLUMNS: u32 = 3;

    /// Interactive pull defaults
    pub const PULL_STRENGTH: f32 = 3.0;
    pub const PULL_MAX_DISTANCE: f32 = 120.0;
}

/// Convert polar (r, theta) to cartesian (x, y) around `center`
#[inline]
pub fn polar_to_cartesian(center: Vec2, r: f32, theta: f32) -> Vec2 {
    center + Vec2::new(r * theta.cos(), r * theta.sin())
}

/// True when both components are finite
#[inline]
pub fn is_finite_vec(v: Vec2) -> bool {
    v.x.is_finite() && v.y.is_finite()
}
