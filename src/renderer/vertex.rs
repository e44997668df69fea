//! GPU-ready vertex and instance types

use bytemuck::{Pod, Zeroable};
use glam::Vec2;

use crate::sim::{Boundary, Particle};

/// Simple 2D vertex with position and color
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 2],
    pub color: [f32; 4],
}

impl Vertex {
    pub const fn new(x: f32, y: f32, color: [f32; 4]) -> Self {
        Self {
            position: [x, y],
            color,
        }
    }
}

/// One particle as drawn: center, radius and per-step speed for coloring
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct ParticleInstance {
    pub center: [f32; 2],
    pub radius: f32,
    pub speed: f32,
}

impl From<&Particle> for ParticleInstance {
    fn from(p: &Particle) -> Self {
        Self {
            center: p.position.to_array(),
            radius: p.radius(),
            speed: p.speed(),
        }
    }
}

pub const SHAPE_RECTANGLE: u32 = 0;
pub const SHAPE_CIRCLE: u32 = 1;

/// Boundary geometry as flat data.
///
/// `kind` is `SHAPE_RECTANGLE` (uses `half_extents`) or `SHAPE_CIRCLE`
/// (uses `radius`).
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct BoundaryShape {
    pub kind: u32,
    pub radius: f32,
    pub center: [f32; 2],
    pub half_extents: [f32; 2],
}

impl BoundaryShape {
    pub fn is_circle(&self) -> bool {
        self.kind == SHAPE_CIRCLE
    }

    /// Rectangle corners counter-clockwise from bottom-left. A circle
    /// reports its bounding square.
    pub fn corners(&self) -> [Vec2; 4] {
        let c = Vec2::from(self.center);
        let h = if self.is_circle() {
            Vec2::splat(self.radius)
        } else {
            Vec2::from(self.half_extents)
        };
        [
            c + Vec2::new(-h.x, -h.y),
            c + Vec2::new(h.x, -h.y),
            c + Vec2::new(h.x, h.y),
            c + Vec2::new(-h.x, h.y),
        ]
    }

    /// Closed outline polyline; the first point is repeated at the end.
    /// `segments` only applies to circles (at least 3).
    pub fn sample_outline(&self, segments: u32) -> Vec<Vec2> {
        if !self.is_circle() {
            let corners = self.corners();
            return corners.iter().chain(&corners[..1]).copied().collect();
        }
        let segments = segments.max(3);
        let center = Vec2::from(self.center);
        (0..=segments)
            .map(|i| {
                let theta = (i % segments) as f32 / segments as f32 * std::f32::consts::TAU;
                crate::polar_to_cartesian(center, self.radius, theta)
            })
            .collect()
    }
}

impl From<&Boundary> for BoundaryShape {
    fn from(boundary: &Boundary) -> Self {
        match *boundary {
            Boundary::Rectangle {
                top,
                bottom,
                left,
                right,
            } => Self {
                kind: SHAPE_RECTANGLE,
                radius: 0.0,
                center: [(left + right) * 0.5, (bottom + top) * 0.5],
                half_extents: [(right - left) * 0.5, (top - bottom) * 0.5],
            },
            Boundary::Circle { center, radius } => Self {
                kind: SHAPE_CIRCLE,
                radius,
                center: center.to_array(),
                half_extents: [0.0; 2],
            },
        }
    }
}

/// Colors for scene elements
pub mod colors {
    pub const BOUNDARY: [f32; 4] = [0.3, 0.3, 0.4, 1.0];
}
