//! Pairwise overlap correction
//!
//! Purely positional: the pair is pushed apart along the line between the
//! centers and the next Verlet step turns the correction into velocity.

use std::sync::{Mutex, MutexGuard, PoisonError};

use glam::Vec2;

use super::particle::Particle;
use crate::consts::NORMAL_EPSILON;

/// Separating normal used when two centers coincide
pub const FALLBACK_NORMAL: Vec2 = Vec2::X;

/// Separate two overlapping particles by the full overlap, split by mass.
///
/// `a` moves by `overlap * mass_b / (mass_a + mass_b)` and `b` by the rest,
/// so the heavier particle moves less. Returns whether the pair overlapped.
pub fn resolve_overlap(a: &mut Particle, b: &mut Particle) -> bool {
    let offset = a.position - b.position;
    let min_dist = a.radius() + b.radius();
    let dist_sq = offset.length_squared();
    if dist_sq >= min_dist * min_dist {
        return false;
    }

    let dist = dist_sq.sqrt();
    let normal = if dist > NORMAL_EPSILON {
        offset / dist
    } else {
        FALLBACK_NORMAL
    };
    let overlap = min_dist - dist;
    let mass_ratio = a.mass() / (a.mass() + b.mass());

    a.position += normal * (1.0 - mass_ratio) * overlap;
    b.position -= normal * mass_ratio * overlap;
    true
}

/// Lock a particle slot. A poisoned slot is still usable: the panic that
/// poisoned it is reported by the scheduler.
#[inline]
pub(crate) fn lock(slot: &Mutex<Particle>) -> MutexGuard<'_, Particle> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Resolve the pair `(a, b)` of a shared particle store. Locks are taken in
/// index order.
pub(crate) fn resolve_indexed(particles: &[Mutex<Particle>], a: usize, b: usize) -> bool {
    if a == b {
        return false;
    }
    let (first, second) = if a < b { (a, b) } else { (b, a) };
    let mut lo = lock(&particles[first]);
    let mut hi = lock(&particles[second]);
    if first == a {
        resolve_overlap(&mut lo, &mut hi)
    } else {
        resolve_overlap(&mut hi, &mut lo)
    }
}
