//! Containment shapes
//!
//! A solver has at most one boundary. Resolving clamps the particle back
//! inside and rewrites its implicit velocity with the configured restitution.

use glam::Vec2;

use super::particle::Particle;
use crate::consts::NORMAL_EPSILON;
use crate::error::{Error, Result};
use crate::is_finite_vec;

/// Domain containment shape
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Boundary {
    /// Axis-aligned box, y-up: `bottom < top`, `left < right`
    Rectangle {
        top: f32,
        bottom: f32,
        left: f32,
        right: f32,
    },
    /// Disc the particles must stay inside
    Circle { center: Vec2, radius: f32 },
}

impl Boundary {
    /// Rectangle of `width` x `height` centered on `center`
    pub fn rectangle(center: Vec2, width: f32, height: f32) -> Result<Self> {
        if !is_finite_vec(center) {
            return Err(Error::invalid("rectangle center must be finite"));
        }
        if !(width.is_finite() && width > 0.0 && height.is_finite() && height > 0.0) {
            return Err(Error::invalid(format!(
                "rectangle size must be > 0, got {width}x{height}"
            )));
        }
        let half = Vec2::new(width, height) * 0.5;
        Ok(Boundary::Rectangle {
            top: center.y + half.y,
            bottom: center.y - half.y,
            left: center.x - half.x,
            right: center.x + half.x,
        })
    }

    pub fn circle(center: Vec2, radius: f32) -> Result<Self> {
        if !is_finite_vec(center) {
            return Err(Error::invalid("circle center must be finite"));
        }
        if !(radius.is_finite() && radius > 0.0) {
            return Err(Error::invalid(format!(
                "circle radius must be > 0, got {radius}"
            )));
        }
        Ok(Boundary::Circle { center, radius })
    }

    /// Whether a disc of `radius` at `point` lies fully inside
    pub fn contains(&self, point: Vec2, radius: f32) -> bool {
        match *self {
            Boundary::Rectangle {
                top,
                bottom,
                left,
                right,
            } => {
                point.x - radius >= left
                    && point.x + radius <= right
                    && point.y - radius >= bottom
                    && point.y + radius <= top
            }
            Boundary::Circle {
                center,
                radius: limit,
            } => (point - center).length() <= limit - radius,
        }
    }

    /// Push `particle` back inside and bounce its velocity
    pub fn resolve(&self, particle: &mut Particle, restitution: f32) {
        match *self {
            Boundary::Rectangle {
                top,
                bottom,
                left,
                right,
            } => resolve_rectangle(particle, restitution, top, bottom, left, right),
            Boundary::Circle { center, radius } => {
                resolve_circle(particle, restitution, center, radius)
            }
        }
    }
}

fn resolve_rectangle(
    particle: &mut Particle,
    restitution: f32,
    top: f32,
    bottom: f32,
    left: f32,
    right: f32,
) {
    let r = particle.radius();
    let mut velocity = particle.velocity();
    let mut hit = false;

    if particle.position.y - r < bottom {
        particle.position.y = bottom + r;
        velocity.y *= -restitution;
        hit = true;
    }
    if particle.position.y + r > top {
        particle.position.y = top - r;
        velocity.y *= -restitution;
        hit = true;
    }
    if particle.position.x - r < left {
        particle.position.x = left + r;
        velocity.x *= -restitution;
        hit = true;
    }
    if particle.position.x + r > right {
        particle.position.x = right - r;
        velocity.x *= -restitution;
        hit = true;
    }

    if hit {
        particle.set_velocity(velocity, 1.0);
    }
}

fn resolve_circle(particle: &mut Particle, restitution: f32, center: Vec2, radius: f32) {
    let limit = (radius - particle.radius()).max(0.0);
    let offset = particle.position - center;
    let dist = offset.length();
    if dist <= limit {
        return;
    }

    // dist > limit >= 0 here, so only a zero-size boundary reaches the fallback
    let normal = if dist > NORMAL_EPSILON {
        offset / dist
    } else {
        Vec2::Y
    };

    // Reflect the outward normal component only; tangential motion is kept
    let mut velocity = particle.velocity();
    let vn = velocity.dot(normal);
    if vn > 0.0 {
        velocity -= (1.0 + restitution) * vn * normal;
    }

    particle.position = center + normal * limit;
    particle.set_velocity(velocity, 1.0);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn moving(position: Vec2, velocity: Vec2, radius: f32) -> Particle {
        let mut p = Particle::new(position, radius).unwrap();
        p.set_velocity(velocity, 1.0);
        p
    }

    #[test]
    fn test_rectangle_edges_from_center() {
        let b = Boundary::rectangle(Vec2::new(600.0, 400.0), 800.0, 600.0).unwrap();
        assert_eq!(
            b,
            Boundary::Rectangle {
                top: 700.0,
                bottom: 100.0,
                left: 200.0,
                right: 1000.0,
            }
        );
    }

    #[test]
    fn test_invalid_shapes_rejected() {
        assert!(Boundary::rectangle(Vec2::ZERO, 0.0, 10.0).is_err());
        assert!(Boundary::rectangle(Vec2::ZERO, 10.0, -1.0).is_err());
        assert!(Boundary::circle(Vec2::ZERO, 0.0).is_err());
        assert!(Boundary::circle(Vec2::new(f32::NAN, 0.0), 10.0).is_err());
    }

    #[test]
    fn test_rectangle_restitution_bottom_edge() {
        let b = Boundary::rectangle(Vec2::ZERO, 100.0, 100.0).unwrap();
        let mut p = moving(Vec2::new(0.0, -46.0), Vec2::new(1.0, -4.0), 5.0);

        b.resolve(&mut p, 0.5);

        assert_eq!(p.position, Vec2::new(0.0, -45.0));
        let v = p.velocity();
        assert!((v.y - 2.0).abs() < 1e-5, "normal speed scaled and flipped: {v}");
        assert!((v.x - 1.0).abs() < 1e-5, "tangential speed kept: {v}");
    }

    #[test]
    fn test_rectangle_corner_clamps_both_axes() {
        let b = Boundary::rectangle(Vec2::ZERO, 100.0, 100.0).unwrap();
        let mut p = moving(Vec2::new(52.0, 53.0), Vec2::new(3.0, 2.0), 5.0);

        b.resolve(&mut p, 1.0);

        assert_eq!(p.position, Vec2::new(45.0, 45.0));
        assert!((p.velocity() - Vec2::new(-3.0, -2.0)).length() < 1e-5);
        assert!(b.contains(p.position, p.radius()));
    }

    #[test]
    fn test_rectangle_inside_untouched() {
        let b = Boundary::rectangle(Vec2::ZERO, 100.0, 100.0).unwrap();
        let mut p = moving(Vec2::new(10.0, 10.0), Vec2::new(1.0, 1.0), 5.0);
        let before = p;
        b.resolve(&mut p, 0.9);
        assert_eq!(p, before);
    }

    #[test]
    fn test_circle_reflects_normal_component_only() {
        let b = Boundary::circle(Vec2::ZERO, 100.0).unwrap();
        let mut p = moving(Vec2::new(95.0, 0.0), Vec2::new(5.0, -5.0), 10.0);

        b.resolve(&mut p, 0.5);

        assert!((p.position - Vec2::new(90.0, 0.0)).length() < 1e-4);
        let v = p.velocity();
        assert!((v.x - -2.5).abs() < 1e-4, "normal: {v}");
        assert!((v.y - -5.0).abs() < 1e-4, "tangential: {v}");
    }

    #[test]
    fn test_circle_inward_motion_not_reflected() {
        let b = Boundary::circle(Vec2::ZERO, 100.0).unwrap();
        // Outside the limit but already heading back in
        let mut p = moving(Vec2::new(0.0, 92.0), Vec2::new(0.0, -1.0), 10.0);

        b.resolve(&mut p, 0.9);

        assert!((p.position - Vec2::new(0.0, 90.0)).length() < 1e-4);
        assert!((p.velocity() - Vec2::new(0.0, -1.0)).length() < 1e-4);
    }

    #[test]
    fn test_circle_contains() {
        let b = Boundary::circle(Vec2::new(600.0, 400.0), 400.0).unwrap();
        assert!(b.contains(Vec2::new(600.0, 700.0), 15.0));
        assert!(!b.contains(Vec2::new(600.0, 790.0), 15.0));
    }
}
