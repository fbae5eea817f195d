//! Per-kind interpolation math:
//! - scalar lerp with a fixed epsilon
//! - angular shortest-path targets and [0, 360) normalization
//! - location lerp (elevation only when both ends carry one)

use serde::{Deserialize, Serialize};

use crate::geo::SpriteLocation;

pub const DISTANCE_EPSILON: f64 = 1e-6;
pub const DEGREE_EPSILON: f64 = 1e-6;

#[inline]
pub fn lerp_f64(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

/// Normalize into [0, 360). Non-finite input maps to 0.
#[inline]
pub fn normalize_degrees(deg: f64) -> f64 {
    if !deg.is_finite() {
        return 0.0;
    }
    let wrapped = deg.rem_euclid(360.0);
    // rem_euclid can return exactly 360.0 for tiny negative inputs.
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Signed shortest rotation from `from` to `to`, in [-180, 180).
#[inline]
pub fn shortest_delta_degrees(from: f64, to: f64) -> f64 {
    (to - from + 180.0).rem_euclid(360.0) - 180.0
}

/// Angle in degrees. Interpolates along the shortest arc and settles into [0, 360).
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Degrees(pub f64);

/// A value a channel can interpolate.
pub trait Interpolant: Copy + PartialEq {
    /// Whether two values are far enough apart to animate between.
    fn differs(&self, other: &Self) -> bool;
    fn lerp(from: &Self, to: &Self, t: f64) -> Self;
    /// Rewrite `target` into the value the animation should actually travel to.
    fn path_target(from: &Self, target: &Self) -> Self {
        let _ = from;
        *target
    }
    /// Feed-forward target: `next` pushed further by the last commanded step.
    fn extrapolate(previous: &Self, next: &Self) -> Self;
    /// Canonical form for values handed to the rest of the engine.
    fn settle(self) -> Self {
        self
    }
}

impl Interpolant for f64 {
    fn differs(&self, other: &Self) -> bool {
        (other - self).abs() > DISTANCE_EPSILON
    }

    fn lerp(from: &Self, to: &Self, t: f64) -> Self {
        lerp_f64(*from, *to, t)
    }

    fn extrapolate(previous: &Self, next: &Self) -> Self {
        next + (next - previous)
    }
}

impl Interpolant for Degrees {
    fn differs(&self, other: &Self) -> bool {
        (other.0 - self.0).abs() > DEGREE_EPSILON
    }

    fn lerp(from: &Self, to: &Self, t: f64) -> Self {
        Degrees(lerp_f64(from.0, to.0, t))
    }

    fn path_target(from: &Self, target: &Self) -> Self {
        Degrees(from.0 + shortest_delta_degrees(from.0, target.0))
    }

    fn extrapolate(previous: &Self, next: &Self) -> Self {
        Degrees(next.0 + shortest_delta_degrees(previous.0, next.0))
    }

    fn settle(self) -> Self {
        Degrees(normalize_degrees(self.0))
    }
}

impl Interpolant for SpriteLocation {
    fn differs(&self, other: &Self) -> bool {
        let elevation = match (self.z, other.z) {
            (Some(a), Some(b)) => (b - a).abs() > DISTANCE_EPSILON,
            _ => false,
        };
        (other.lng - self.lng).abs() > DISTANCE_EPSILON
            || (other.lat - self.lat).abs() > DISTANCE_EPSILON
            || elevation
    }

    fn lerp(from: &Self, to: &Self, t: f64) -> Self {
        let z = match (from.z, to.z) {
            (Some(a), Some(b)) => Some(lerp_f64(a, b, t)),
            _ => to.z,
        };
        SpriteLocation {
            lng: lerp_f64(from.lng, to.lng, t),
            lat: lerp_f64(from.lat, to.lat, t),
            z,
        }
    }

    fn extrapolate(previous: &Self, next: &Self) -> Self {
        let z = match (previous.z, next.z) {
            (Some(a), Some(b)) => Some(b + (b - a)),
            _ => next.z,
        };
        SpriteLocation {
            lng: next.lng + (next.lng - previous.lng),
            lat: next.lat + (next.lat - previous.lat),
            z,
        }
    }
}
