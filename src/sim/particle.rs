//! Verlet point-mass
//!
//! Velocity is never stored: it is the displacement between the current and
//! previous position, so any positional correction also changes the velocity
//! seen by the next integration step.

use glam::Vec2;

use crate::error::{Error, Result};
use crate::is_finite_vec;

/// A circular point-mass integrated with position Verlet
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Particle {
    /// Current position
    pub position: Vec2,
    /// Position one substep behind
    pub position_previous: Vec2,
    /// Acceleration summed since the last `integrate`
    pub pending_acceleration: Vec2,
    radius: f32,
    mass: f32,
}

impl Particle {
    /// Create a particle at rest. Mass is `radius²`.
    pub fn new(position: Vec2, radius: f32) -> Result<Self> {
        if !(radius.is_finite() && radius > 0.0) {
            return Err(Error::invalid(format!(
                "particle radius must be finite and > 0, got {radius}"
            )));
        }
        if !is_finite_vec(position) {
            return Err(Error::invalid(format!(
                "particle position must be finite, got {position}"
            )));
        }
        Ok(Self {
            position,
            position_previous: position,
            pending_acceleration: Vec2::ZERO,
            radius,
            mass: radius * radius,
        })
    }

    #[inline]
    pub fn radius(&self) -> f32 {
        self.radius
    }

    #[inline]
    pub fn mass(&self) -> f32 {
        self.mass
    }

    /// Advance one step: `x' = x + (x - x_prev) + a·dt²`, then clear `a`
    pub fn integrate(&mut self, dt: f32) {
        let displacement = self.position - self.position_previous;
        self.position_previous = self.position;
        self.position += displacement + self.pending_acceleration * (dt * dt);
        self.pending_acceleration = Vec2::ZERO;
    }

    /// Add to the acceleration consumed by the next `integrate`
    #[inline]
    pub fn accumulate(&mut self, acceleration: Vec2) {
        self.pending_acceleration += acceleration;
    }

    /// Inject a velocity without moving the particle
    #[inline]
    pub fn set_velocity(&mut self, velocity: Vec2, dt: f32) {
        self.position_previous = self.position - velocity * dt;
    }

    /// Add a velocity on top of the current implicit one
    #[inline]
    pub fn add_velocity(&mut self, velocity: Vec2, dt: f32) {
        self.position_previous -= velocity * dt;
    }

    /// Displacement per step (not scaled by dt)
    #[inline]
    pub fn velocity(&self) -> Vec2 {
        self.position - self.position_previous
    }

    #[inline]
    pub fn speed(&self) -> f32 {
        self.velocity().length()
    }
}
