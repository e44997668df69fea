//! Read-only drawing surface
//!
//! A frame collaborator captures a `RenderSnapshot` after `tick()` returns
//! and draws from it; nothing here can mutate the solver. Instances are
//! `Pod` so they can be uploaded with `bytemuck::cast_slice`.

pub mod shapes;
pub mod vertex;

pub use vertex::{BoundaryShape, ParticleInstance, Vertex};

use glam::Vec2;

use crate::sim::Solver;

/// Everything needed to draw one frame
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderSnapshot {
    pub instances: Vec<ParticleInstance>,
    pub boundary: Option<BoundaryShape>,
}

impl RenderSnapshot {
    pub fn capture(solver: &Solver) -> Self {
        Self {
            instances: solver.particles().iter().map(ParticleInstance::from).collect(),
            boundary: solver.boundary().map(BoundaryShape::from),
        }
    }

    /// Raw instance bytes in index order
    pub fn instance_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.instances)
    }

    /// Fastest particle, used to normalise speed colors
    pub fn max_speed(&self) -> f32 {
        self.instances.iter().map(|i| i.speed).fold(0.0, f32::max)
    }

    /// CPU-side triangle list: boundary outline, then one disc per particle
    pub fn triangles(&self, segments: u32) -> Vec<Vertex> {
        let mut vertices = Vec::new();
        if let Some(shape) = &self.boundary {
            vertices.extend(shapes::polyline(
                &shape.sample_outline(segments * 4),
                2.0,
                vertex::colors::BOUNDARY,
            ));
        }

        let max_speed = self.max_speed();
        for instance in &self.instances {
            vertices.extend(shapes::disc(
                Vec2::from(instance.center),
                instance.radius,
                shapes::speed_color(instance.speed, max_speed, 1.0),
                segments,
            ));
        }
        vertices
    }
}

impl Solver {
    pub fn render_snapshot(&self) -> RenderSnapshot {
        RenderSnapshot::capture(self)
    }
}
