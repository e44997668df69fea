//! Particle simulation
//!
//! Everything that advances particle state lives here:
//! - Fixed step and substep count, no wall-clock input
//! - Only solver-dispatched tasks mutate particles
//! - Phases are separated by a drain barrier

pub mod boundary;
pub mod collision;
pub mod grid;
pub mod particle;
pub mod solver;

pub use boundary::Boundary;
pub use collision::resolve_overlap;
pub use grid::{COLOR_COUNT, GridStats, SpatialGrid};
pub use particle::Particle;
pub use solver::Solver;
