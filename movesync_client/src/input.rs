//! Input handling.
//!
//! The window layer (out of scope here) feeds key and mouse events into an
//! [`InputState`]; the motion controller samples it once per frame. Keys are
//! held-state flags, mouse motion is folded into yaw/pitch immediately.

use std::f32::consts::FRAC_PI_2;

use bitflags::bitflags;
use movesync_shared::math::{forward_from_yaw, right_from_yaw, Vec3};

bitflags! {
    /// Movement keys currently held.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct MoveKeys: u8 {
        const FORWARD  = 1 << 0;
        const BACKWARD = 1 << 1;
        const LEFT     = 1 << 2;
        const RIGHT    = 1 << 3;
        const JUMP     = 1 << 4;
        const CROUCH   = 1 << 5;
    }
}

/// Pitch is kept just short of straight up/down.
const PITCH_LIMIT: f32 = FRAC_PI_2 - 0.01;

/// User input state at a moment in time.
#[derive(Debug, Clone, Copy, Default)]
pub struct InputState {
    pub keys: MoveKeys,
    pub yaw: f32,
    pub pitch: f32,
}

/// Direction intent derived from the held keys.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoveIntent {
    /// Unit camera-relative direction on the ground plane, or zero.
    pub direction: Vec3,
    /// Opposing keys are held (left+right or forward+backward).
    pub opposing: bool,
    /// Any lateral or backward component (drives the asymmetric head bob).
    pub asymmetric: bool,
}

impl MoveIntent {
    pub fn is_moving(&self) -> bool {
        self.direction != Vec3::ZERO
    }
}

impl InputState {
    pub fn press(&mut self, keys: MoveKeys) {
        self.keys.insert(keys);
    }

    pub fn release(&mut self, keys: MoveKeys) {
        self.keys.remove(keys);
    }

    pub fn held(&self, keys: MoveKeys) -> bool {
        self.keys.contains(keys)
    }

    /// Applies mouse motion (radians after sensitivity scaling).
    pub fn look(&mut self, d_yaw: f32, d_pitch: f32) {
        self.yaw -= d_yaw;
        self.pitch = (self.pitch - d_pitch).clamp(-PITCH_LIMIT, PITCH_LIMIT);
    }

    /// Builds the movement direction relative to this state's own yaw.
    pub fn move_intent(&self) -> MoveIntent {
        self.move_intent_at(self.yaw)
    }

    /// Builds the movement direction relative to `yaw`.
    ///
    /// Opposing pairs do not cancel into a partial vector: any opposing pair
    /// yields no movement at all.
    pub fn move_intent_at(&self, yaw: f32) -> MoveIntent {
        let fwd = self.held(MoveKeys::FORWARD);
        let back = self.held(MoveKeys::BACKWARD);
        let left = self.held(MoveKeys::LEFT);
        let right = self.held(MoveKeys::RIGHT);

        if (fwd && back) || (left && right) {
            return MoveIntent {
                direction: Vec3::ZERO,
                opposing: true,
                asymmetric: false,
            };
        }

        let axis_f = f32::from(u8::from(fwd)) - f32::from(u8::from(back));
        let axis_r = f32::from(u8::from(right)) - f32::from(u8::from(left));
        let direction = (forward_from_yaw(yaw) * axis_f + right_from_yaw(yaw) * axis_r)
            .normalize_or_zero();

        MoveIntent {
            direction,
            opposing: false,
            asymmetric: back || left || right,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_at_zero_yaw_is_negative_z() {
        let mut input = InputState::default();
        input.press(MoveKeys::FORWARD);
        let intent = input.move_intent();
        assert!((intent.direction.z + 1.0).abs() < 1e-6);
        assert!(!intent.asymmetric);
    }

    #[test]
    fn diagonal_is_normalized() {
        let mut input = InputState::default();
        input.press(MoveKeys::FORWARD | MoveKeys::RIGHT);
        let intent = input.move_intent();
        assert!((intent.direction.len() - 1.0).abs() < 1e-5);
        assert!(intent.asymmetric);
    }

    #[test]
    fn opposing_keys_zero_direction() {
        let mut input = InputState::default();
        input.press(MoveKeys::LEFT | MoveKeys::RIGHT | MoveKeys::FORWARD);
        let intent = input.move_intent();
        assert!(intent.opposing);
        assert!(!intent.is_moving());
    }

    #[test]
    fn pitch_is_clamped() {
        let mut input = InputState::default();
        input.look(0.0, -10.0);
        assert!(input.pitch <= PITCH_LIMIT);
        input.look(0.3, 20.0);
        assert!(input.pitch >= -PITCH_LIMIT);
        assert!((input.yaw + 0.3).abs() < 1e-6);
    }
}
