//! Math types.
//!
//! This module intentionally stays small and deterministic.
//! It avoids SIMD/unsafe and focuses on stable semantics.
//!
//! Conventions: +Y is up, yaw rotates about +Y, and a yaw of zero looks down -Z.

use std::f32::consts::{PI, TAU};
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};

use serde::{Deserialize, Serialize};

/// 3D vector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Self = Self {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub const UP: Self = Self {
        x: 0.0,
        y: 1.0,
        z: 0.0,
    };

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn dot(self, rhs: Self) -> f32 {
        self.x * rhs.x + self.y * rhs.y + self.z * rhs.z
    }

    pub fn len_sq(self) -> f32 {
        self.dot(self)
    }

    pub fn len(self) -> f32 {
        self.len_sq().sqrt()
    }

    /// Unit vector in the same direction, or zero for (near-)zero input.
    pub fn normalize_or_zero(self) -> Self {
        let len = self.len();
        if len > 1.0e-6 {
            self * (1.0 / len)
        } else {
            Self::ZERO
        }
    }

    /// The XZ-plane part of the vector.
    pub fn horizontal(self) -> Self {
        Self::new(self.x, 0.0, self.z)
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    pub fn lerp(self, to: Self, t: f32) -> Self {
        let t = t.clamp(0.0, 1.0);
        Self::new(
            self.x + (to.x - self.x) * t,
            self.y + (to.y - self.y) * t,
            self.z + (to.z - self.z) * t,
        )
    }

    pub fn distance_sq(self, other: Self) -> f32 {
        (self - other).len_sq()
    }
}

impl Add for Vec3 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl AddAssign for Vec3 {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sub for Vec3 {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl SubAssign for Vec3 {
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl Mul<f32> for Vec3 {
    type Output = Self;

    fn mul(self, rhs: f32) -> Self {
        Self::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl Neg for Vec3 {
    type Output = Self;

    fn neg(self) -> Self {
        Self::new(-self.x, -self.y, -self.z)
    }
}

/// Wraps an angle in radians to `[-PI, PI]`.
pub fn wrap_angle(angle: f32) -> f32 {
    let wrapped = (angle + PI).rem_euclid(TAU) - PI;
    // rem_euclid can land exactly on -PI for +PI input; keep the sign stable.
    if wrapped <= -PI && angle > 0.0 {
        PI
    } else {
        wrapped
    }
}

/// Camera-relative forward direction on the ground plane for a yaw.
pub fn forward_from_yaw(yaw: f32) -> Vec3 {
    Vec3::new(-yaw.sin(), 0.0, -yaw.cos())
}

/// Camera-relative right direction on the ground plane for a yaw.
pub fn right_from_yaw(yaw: f32) -> Vec3 {
    Vec3::new(yaw.cos(), 0.0, -yaw.sin())
}

/// Exponential approach factor for a rate over `dt` seconds.
///
/// `current + (target - current) * approach_factor(rate, dt)` converges at the
/// same speed regardless of how `dt` is sliced.
pub fn approach_factor(rate: f32, dt: f32) -> f32 {
    1.0 - (-rate * dt).exp()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec3_lerp_midpoint() {
        let a = Vec3::new(0.0, 0.0, 0.0);
        let b = Vec3::new(2.0, 4.0, 6.0);
        let mid = a.lerp(b, 0.5);
        assert_eq!(mid, Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn wrap_angle_stays_in_range() {
        for raw in [-10.0_f32, -PI, -1.0, 0.0, 1.0, PI, 4.0, 10.0, 100.0] {
            let w = wrap_angle(raw);
            assert!((-PI..=PI).contains(&w), "{raw} wrapped to {w}");
            // Same direction on the unit circle.
            assert!((w.sin() - raw.sin()).abs() < 1e-4);
            assert!((w.cos() - raw.cos()).abs() < 1e-4);
        }
    }

    #[test]
    fn wrap_angle_small_delta_across_seam() {
        let delta = wrap_angle((PI - 0.05) - (-PI + 0.05));
        assert!((delta + 0.1).abs() < 1e-4);
    }

    #[test]
    fn yaw_basis_is_orthonormal() {
        for yaw in [0.0_f32, 0.7, -2.1, 3.0] {
            let f = forward_from_yaw(yaw);
            let r = right_from_yaw(yaw);
            assert!((f.len() - 1.0).abs() < 1e-5);
            assert!((r.len() - 1.0).abs() < 1e-5);
            assert!(f.dot(r).abs() < 1e-5);
        }
        assert_eq!(forward_from_yaw(0.0), Vec3::new(-0.0, 0.0, -1.0));
    }

    #[test]
    fn normalize_zero_is_zero() {
        assert_eq!(Vec3::ZERO.normalize_or_zero(), Vec3::ZERO);
    }
}
