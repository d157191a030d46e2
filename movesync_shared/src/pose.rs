//! Poses, player state and quantization.
//!
//! A [`Pose`] is the minimal state broadcast per peer. Before a pose goes on
//! the wire it is snapped to a fixed grid so that near-identical frames
//! produce byte-identical payloads.

use serde::{Deserialize, Serialize};

use crate::math::{wrap_angle, Vec3};
use crate::net::PeerId;

/// Position and view orientation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Pose {
    pub position: Vec3,
    /// Radians about +Y.
    pub yaw: f32,
    /// Radians, positive looks up.
    pub pitch: f32,
}

impl Pose {
    pub const fn new(position: Vec3, yaw: f32, pitch: f32) -> Self {
        Self {
            position,
            yaw,
            pitch,
        }
    }
}

/// Grid sizes used to quantize poses.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuantizeSteps {
    /// World units per position step.
    pub position: f32,
    /// Radians per rotation step.
    pub angle: f32,
}

impl QuantizeSteps {
    pub fn from_degrees(position: f32, angle_degrees: f32) -> Self {
        Self {
            position,
            angle: angle_degrees.to_radians(),
        }
    }
}

impl Default for QuantizeSteps {
    fn default() -> Self {
        Self::from_degrees(0.02, 0.2)
    }
}

/// Rounds `value` to the nearest multiple of `step`.
///
/// A non-positive step disables quantization.
pub fn quantize(value: f32, step: f32) -> f32 {
    if step <= 0.0 || !value.is_finite() {
        return value;
    }
    (value / step).round() * step
}

/// Quantizes every axis of a pose. Yaw is wrapped first so equivalent
/// headings share one representation.
pub fn quantize_pose(pose: &Pose, steps: QuantizeSteps) -> Pose {
    Pose {
        position: Vec3::new(
            quantize(pose.position.x, steps.position),
            quantize(pose.position.y, steps.position),
            quantize(pose.position.z, steps.position),
        ),
        yaw: quantize(wrap_angle(pose.yaw), steps.angle),
        pitch: quantize(pose.pitch, steps.angle),
    }
}

/// Spawn room grid coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct RoomCoord {
    pub x: i32,
    pub z: i32,
}

/// Visibility record for one target the player has selected.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct TargetInfo {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub shootable: bool,
    pub disabled: bool,
}

impl TargetInfo {
    pub fn position(&self) -> Vec3 {
        Vec3::new(self.x, self.y, self.z)
    }
}

/// Full per-player state: pose plus identity, spawn room and targets.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerState {
    pub id: PeerId,
    pub pose: Pose,
    pub room: RoomCoord,
    pub targets: Vec<TargetInfo>,
}

impl PlayerState {
    pub fn new(id: PeerId, pose: Pose, room: RoomCoord) -> Self {
        Self {
            id,
            pose,
            room,
            targets: Vec::new(),
        }
    }

    /// Replaces the target list, keeping only the last `max` entries.
    pub fn set_targets(&mut self, targets: &[TargetInfo], max: usize) {
        let skip = targets.len().saturating_sub(max);
        self.targets.clear();
        self.targets.extend_from_slice(&targets[skip..]);
    }
}
