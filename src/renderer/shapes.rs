//! Triangle-list generation for snapshot drawing

use glam::Vec2;
use std::f32::consts::PI;

use super::vertex::Vertex;

/// Interpolate color by speed (slow=blue, medium=green, fast=red/orange).
/// `max_speed` maps to the hot end of the gradient.
pub fn speed_color(speed: f32, max_speed: f32, alpha: f32) -> [f32; 4] {
    let t = if max_speed > 0.0 {
        (speed / max_speed).clamp(0.0, 1.0)
    } else {
        0.0
    };

    // blue -> cyan -> green -> yellow -> orange
    let (r, g, b) = if t < 0.25 {
        let u = t / 0.25;
        (0.2, 0.4 + 0.4 * u, 1.0)
    } else if t < 0.5 {
        let u = (t - 0.25) / 0.25;
        (0.2, 0.8, 1.0 - 0.6 * u)
    } else if t < 0.75 {
        let u = (t - 0.5) / 0.25;
        (0.2 + 0.8 * u, 0.8, 0.4 - 0.2 * u)
    } else {
        let u = (t - 0.75) / 0.25;
        (1.0, 0.8 - 0.5 * u, 0.2)
    };

    [r, g, b, alpha]
}

/// Filled disc as a fan of `segments` triangles
pub fn disc(center: Vec2, radius: f32, color: [f32; 4], segments: u32) -> Vec<Vertex> {
    let segments = segments.max(3);
    let mut vertices = Vec::with_capacity((segments * 3) as usize);

    for i in 0..segments {
        let theta1 = (i as f32 / segments as f32) * 2.0 * PI;
        let theta2 = ((i + 1) as f32 / segments as f32) * 2.0 * PI;

        vertices.push(Vertex::new(center.x, center.y, color));
        vertices.push(Vertex::new(
            center.x + radius * theta1.cos(),
            center.y + radius * theta1.sin(),
            color,
        ));
        vertices.push(Vertex::new(
            center.x + radius * theta2.cos(),
            center.y + radius * theta2.sin(),
            color,
        ));
    }

    vertices
}

/// Thick line through `points`, one quad (two triangles) per segment
pub fn polyline(points: &[Vec2], thickness: f32, color: [f32; 4]) -> Vec<Vertex> {
    if points.len() < 2 {
        return Vec::new();
    }

    let half = thickness * 0.5;
    let mut vertices = Vec::with_capacity((points.len() - 1) * 6);

    for pair in points.windows(2) {
        let (p1, p2) = (pair[0], pair[1]);
        let dir = (p2 - p1).normalize_or_zero();
        let perp = Vec2::new(-dir.y, dir.x) * half;

        let v1a = p1 + perp;
        let v1b = p1 - perp;
        let v2a = p2 + perp;
        let v2b = p2 - perp;

        vertices.push(Vertex::new(v1a.x, v1a.y, color));
        vertices.push(Vertex::new(v1b.x, v1b.y, color));
        vertices.push(Vertex::new(v2a.x, v2a.y, color));

        vertices.push(Vertex::new(v2a.x, v2a.y, color));
        vertices.push(Vertex::new(v1b.x, v1b.y, color));
        vertices.push(Vertex::new(v2b.x, v2b.y, color));
    }

    vertices
}
