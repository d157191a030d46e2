//! Collider shapes and the low-level sweep/overlap tests used by the
//! collision world.
//!
//! The character is an upright capsule whose horizontal footprint is a circle.
//! Against axis-aligned boxes that reduces every horizontal query to a circle
//! vs. rectangle problem in the XZ plane, and every vertical query to an
//! interval test on Y.

use serde::{Deserialize, Serialize};

use crate::math::Vec3;

/// Axis-aligned bounding box. `min <= max` on every axis for a valid box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub const fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Box from a center point and full extents.
    pub fn from_center_size(center: Vec3, size: Vec3) -> Self {
        let half = size * 0.5;
        Self::new(center - half, center + half)
    }

    /// True when finite and `min <= max` on every axis.
    pub fn is_valid(&self) -> bool {
        self.min.is_finite()
            && self.max.is_finite()
            && self.min.x <= self.max.x
            && self.min.y <= self.max.y
            && self.min.z <= self.max.z
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Horizontal footprint.
    pub fn footprint(&self) -> Rect {
        Rect {
            min_x: self.min.x,
            min_z: self.min.z,
            max_x: self.max.x,
            max_z: self.max.z,
        }
    }
}

/// Opaque reference to whoever created a collider (scenario element, room, generator).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct ColliderOwner(pub u64);

/// A static or re-added dynamic box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Collider {
    pub bounds: Aabb,
    pub owner: ColliderOwner,
}

impl Collider {
    pub fn new(min: Vec3, max: Vec3, owner: ColliderOwner) -> Self {
        Self {
            bounds: Aabb::new(min, max),
            owner,
        }
    }
}

/// Point on the XZ plane.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Flat {
    pub x: f32,
    pub z: f32,
}

impl Flat {
    pub const fn new(x: f32, z: f32) -> Self {
        Self { x, z }
    }

    pub fn of(v: Vec3) -> Self {
        Self::new(v.x, v.z)
    }

    pub fn dot(self, rhs: Self) -> f32 {
        self.x * rhs.x + self.z * rhs.z
    }

    pub fn len_sq(self) -> f32 {
        self.dot(self)
    }

    pub fn scale(self, s: f32) -> Self {
        Self::new(self.x * s, self.z * s)
    }

    pub fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.z + rhs.z)
    }

    pub fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.z - rhs.z)
    }

    /// Lifts back into 3D with the given height.
    pub fn with_y(self, y: f32) -> Vec3 {
        Vec3::new(self.x, y, self.z)
    }
}

/// Rectangle on the XZ plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub min_x: f32,
    pub min_z: f32,
    pub max_x: f32,
    pub max_z: f32,
}

impl Rect {
    pub fn closest_point(&self, p: Flat) -> Flat {
        Flat::new(
            p.x.clamp(self.min_x, self.max_x),
            p.z.clamp(self.min_z, self.max_z),
        )
    }

    pub fn distance_sq(&self, p: Flat) -> f32 {
        p.sub(self.closest_point(p)).len_sq()
    }

    pub fn expanded(&self, by: f32) -> Self {
        Self {
            min_x: self.min_x - by,
            min_z: self.min_z - by,
            max_x: self.max_x + by,
            max_z: self.max_z + by,
        }
    }
}

/// True when a circle strictly overlaps the rectangle by more than `tolerance`.
///
/// Touching contact (a capsule resting against a wall) is not an overlap.
pub fn circle_overlaps_rect(center: Flat, radius: f32, rect: &Rect, tolerance: f32) -> bool {
    let r = (radius - tolerance).max(0.0);
    rect.distance_sq(center) < r * r
}

/// Minimal horizontal push that separates a circle from a rectangle.
///
/// Returns the unit push direction and the penetration depth, or `None` when
/// they do not overlap.
pub fn circle_rect_penetration(center: Flat, radius: f32, rect: &Rect) -> Option<(Flat, f32)> {
    let closest = rect.closest_point(center);
    let offset = center.sub(closest);
    let dist_sq = offset.len_sq();

    if dist_sq > 1.0e-12 {
        if dist_sq >= radius * radius {
            return None;
        }
        let dist = dist_sq.sqrt();
        return Some((offset.scale(1.0 / dist), radius - dist));
    }

    // Center inside the rectangle: leave through the nearest edge.
    let exits = [
        (center.x - rect.min_x, Flat::new(-1.0, 0.0)),
        (rect.max_x - center.x, Flat::new(1.0, 0.0)),
        (center.z - rect.min_z, Flat::new(0.0, -1.0)),
        (rect.max_z - center.z, Flat::new(0.0, 1.0)),
    ];
    let mut best = exits[0];
    for exit in &exits[1..] {
        if exit.0 < best.0 {
            best = *exit;
        }
    }
    Some((best.1, best.0 + radius))
}

/// First contact of a moving circle with a rectangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweepHit {
    /// Fraction of the displacement travelled before contact, in `[0, 1]`.
    pub fraction: f32,
    /// Contact normal pointing away from the rectangle.
    pub normal: Flat,
}

/// Sweeps a circle from `start` by `delta` against a rectangle.
///
/// The rectangle grown by the radius (a rounded rectangle) is ray-cast: the
/// slab test handles the flat sides and a ray/circle test handles the
/// rounded corners. A circle that already overlaps only reports a hit if it is
/// moving further in.
pub fn sweep_circle_rect(start: Flat, delta: Flat, radius: f32, rect: &Rect) -> Option<SweepHit> {
    if let Some((normal, _depth)) = circle_rect_penetration(start, radius - 1.0e-5, rect) {
        if delta.dot(normal) < 0.0 {
            return Some(SweepHit {
                fraction: 0.0,
                normal,
            });
        }
        return None;
    }

    let grown = rect.expanded(radius);
    let (t_enter, enter_normal) = slab_enter(start, delta, &grown)?;
    if t_enter > 1.0 {
        return None;
    }

    let t = t_enter.max(0.0);
    let hit = start.add(delta.scale(t));
    let within_x = hit.x >= rect.min_x && hit.x <= rect.max_x;
    let within_z = hit.z >= rect.min_z && hit.z <= rect.max_z;
    if within_x || within_z {
        if t_enter >= 0.0 {
            return Some(SweepHit {
                fraction: t_enter,
                normal: enter_normal,
            });
        }
        // Starts touching a flat side: only motion into that side is blocked.
        let normal = if within_z {
            Flat::new(if start.x < rect.min_x { -1.0 } else { 1.0 }, 0.0)
        } else {
            Flat::new(0.0, if start.z < rect.min_z { -1.0 } else { 1.0 })
        };
        if delta.dot(normal) < 0.0 {
            return Some(SweepHit {
                fraction: 0.0,
                normal,
            });
        }
        return None;
    }

    // Entered a corner square: the real surface there is a quarter circle.
    let corner = Flat::new(
        if hit.x < rect.min_x { rect.min_x } else { rect.max_x },
        if hit.z < rect.min_z { rect.min_z } else { rect.max_z },
    );
    let fraction = ray_circle(start, delta, corner, radius)?;
    if fraction > 1.0 {
        return None;
    }
    let at = start.add(delta.scale(fraction));
    let normal = at.sub(corner).scale(1.0 / radius);
    Some(SweepHit { fraction, normal })
}

/// Entry time and face normal of a ray against a rectangle, if it enters at all.
fn slab_enter(start: Flat, delta: Flat, rect: &Rect) -> Option<(f32, Flat)> {
    let mut t_enter = f32::NEG_INFINITY;
    let mut t_exit = f32::INFINITY;
    let mut normal = Flat::default();

    let axes = [
        (start.x, delta.x, rect.min_x, rect.max_x, Flat::new(1.0, 0.0)),
        (start.z, delta.z, rect.min_z, rect.max_z, Flat::new(0.0, 1.0)),
    ];
    for (p, d, lo, hi, axis) in axes {
        if d.abs() < 1.0e-9 {
            if p < lo || p > hi {
                return None;
            }
            continue;
        }
        let inv = 1.0 / d;
        let (mut t0, mut t1) = ((lo - p) * inv, (hi - p) * inv);
        if t0 > t1 {
            std::mem::swap(&mut t0, &mut t1);
        }
        if t0 > t_enter {
            t_enter = t0;
            // Moving toward +axis enters through the low face (normal -axis).
            normal = axis.scale(-d.signum());
        }
        t_exit = t_exit.min(t1);
        if t_enter > t_exit || t_exit < 0.0 {
            return None;
        }
    }

    if t_enter == f32::NEG_INFINITY {
        return None;
    }
    Some((t_enter, normal))
}

/// Smallest non-negative root of `|start + delta * t - center| = radius`.
fn ray_circle(start: Flat, delta: Flat, center: Flat, radius: f32) -> Option<f32> {
    let m = start.sub(center);
    let a = delta.len_sq();
    if a < 1.0e-12 {
        return None;
    }
    let b = m.dot(delta);
    let c = m.len_sq() - radius * radius;
    let disc = b * b - a * c;
    if disc < 0.0 {
        return None;
    }
    let t = (-b - disc.sqrt()) / a;
    if t < 0.0 {
        return None;
    }
    Some(t)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_rect() -> Rect {
        Rect {
            min_x: 2.0,
            min_z: -1.0,
            max_x: 3.0,
            max_z: 1.0,
        }
    }

    #[test]
    fn aabb_validity() {
        assert!(Aabb::new(Vec3::ZERO, Vec3::new(1.0, 1.0, 1.0)).is_valid());
        assert!(Aabb::new(Vec3::ZERO, Vec3::ZERO).is_valid());
        assert!(!Aabb::new(Vec3::new(1.0, 0.0, 0.0), Vec3::ZERO).is_valid());
        assert!(!Aabb::new(Vec3::new(f32::NAN, 0.0, 0.0), Vec3::ZERO).is_valid());
    }

    #[test]
    fn sweep_hits_flat_face() {
        let hit = sweep_circle_rect(Flat::new(0.0, 0.0), Flat::new(5.0, 0.0), 0.3, &unit_rect())
            .expect("hit");
        assert!((hit.fraction * 5.0 - 1.7).abs() < 1e-5);
        assert_eq!(hit.normal, Flat::new(-1.0, 0.0));
    }

    #[test]
    fn sweep_misses_when_passing_by() {
        let hit = sweep_circle_rect(Flat::new(0.0, 2.0), Flat::new(5.0, 0.0), 0.3, &unit_rect());
        assert!(hit.is_none());
    }

    #[test]
    fn sweep_parallel_to_face_does_not_hit() {
        let hit = sweep_circle_rect(Flat::new(1.69, -3.0), Flat::new(0.0, 6.0), 0.3, &unit_rect());
        assert!(hit.is_none());
    }

    #[test]
    fn sweep_hits_rounded_corner() {
        // Passes the corner (2, 1) diagonally-ish, grazing the quarter circle.
        let hit = sweep_circle_rect(Flat::new(0.0, 1.2), Flat::new(4.0, 0.0), 0.3, &unit_rect())
            .expect("corner hit");
        let at = Flat::new(hit.fraction * 4.0, 1.2);
        let dist = at.sub(Flat::new(2.0, 1.0)).len_sq().sqrt();
        assert!((dist - 0.3).abs() < 1e-4);
        assert!(hit.normal.x < 0.0 && hit.normal.z > 0.0);
    }

    #[test]
    fn sweep_out_of_overlap_is_free() {
        let hit = sweep_circle_rect(Flat::new(1.9, 0.0), Flat::new(-1.0, 0.0), 0.3, &unit_rect());
        assert!(hit.is_none());
        let hit = sweep_circle_rect(Flat::new(1.9, 0.0), Flat::new(1.0, 0.0), 0.3, &unit_rect())
            .expect("moving deeper");
        assert_eq!(hit.fraction, 0.0);
    }

    #[test]
    fn penetration_from_inside_uses_nearest_edge() {
        let (normal, depth) =
            circle_rect_penetration(Flat::new(2.1, 0.0), 0.3, &unit_rect()).expect("overlap");
        assert_eq!(normal, Flat::new(-1.0, 0.0));
        assert!((depth - 0.4).abs() < 1e-5);
    }

    #[test]
    fn touching_is_not_overlapping() {
        assert!(!circle_overlaps_rect(Flat::new(1.7, 0.0), 0.3, &unit_rect(), 1e-3));
        assert!(circle_overlaps_rect(Flat::new(1.8, 0.0), 0.3, &unit_rect(), 1e-3));
    }
}
