//! Configuration system.
//!
//! Loads tuning and connection settings from JSON. Every section is optional
//! in the file and falls back to the defaults below, so a config only needs to
//! name what it overrides.

use std::path::Path;

use anyhow::{ensure, Context};
use serde::{Deserialize, Serialize};

use crate::math::Vec3;
use crate::pose::QuantizeSteps;

/// Root configuration for a movement-sync client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Relay address, e.g. `127.0.0.1:40100`.
    pub relay_addr: String,
    /// Local player display name (logging only).
    pub player_name: String,
    /// Render/simulation frame rate used by the headless client loop.
    pub frame_hz: u32,
    pub player: PlayerConfig,
    pub movement: MovementConfig,
    pub jump: JumpConfig,
    pub head_bob: HeadBobConfig,
    pub send_gate: SendGateConfig,
    pub inbound: InboundConfig,
    pub respawn: RespawnConfig,
    pub room: RoomBounds,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            relay_addr: "127.0.0.1:40100".to_string(),
            player_name: "Player".to_string(),
            frame_hz: 60,
            player: PlayerConfig::default(),
            movement: MovementConfig::default(),
            jump: JumpConfig::default(),
            head_bob: HeadBobConfig::default(),
            send_gate: SendGateConfig::default(),
            inbound: InboundConfig::default(),
            respawn: RespawnConfig::default(),
            room: RoomBounds::default(),
        }
    }
}

/// Character capsule.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub radius: f32,
    pub height: f32,
    /// Tallest obstruction climbed without jumping.
    pub step_height: f32,
    /// Length of the downward grounded probe.
    pub ground_check_distance: f32,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            radius: 0.3,
            height: 1.8,
            step_height: 0.35,
            ground_check_distance: 0.08,
        }
    }
}

/// Horizontal and vertical movement tuning.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct MovementConfig {
    pub walk_speed: f32,
    /// Per-frame lerp factor toward the desired velocity.
    pub acceleration: f32,
    /// Fraction of velocity kept after one second (applied as `damping^dt`).
    pub damping: f32,
    pub gravity: f32,
    /// Maximum falling speed (positive number).
    pub terminal_velocity: f32,
    pub jump_speed: f32,
    pub crouch_speed_factor: f32,
    pub stand_eye_height: f32,
    pub crouch_eye_height: f32,
    /// Exponential rate of the eye-height ease.
    pub crouch_ease_rate: f32,
    /// Eye height snaps to its target once within this distance.
    pub crouch_snap_epsilon: f32,
}

impl Default for MovementConfig {
    fn default() -> Self {
        Self {
            walk_speed: 5.0,
            acceleration: 0.2,
            damping: 0.9,
            gravity: 20.0,
            terminal_velocity: 50.0,
            jump_speed: 7.5,
            crouch_speed_factor: 0.5,
            stand_eye_height: 1.6,
            crouch_eye_height: 1.0,
            crouch_ease_rate: 12.0,
            crouch_snap_epsilon: 0.001,
        }
    }
}

/// Jump buffer / coyote / cooldown windows, in seconds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct JumpConfig {
    pub buffer_window: f32,
    pub coyote_window: f32,
    pub cooldown: f32,
}

impl Default for JumpConfig {
    fn default() -> Self {
        Self {
            buffer_window: 0.12,
            coyote_window: 0.10,
            cooldown: 0.15,
        }
    }
}

/// Cosmetic camera bob.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct HeadBobConfig {
    /// Phase advance in radians per second at full speed.
    pub frequency: f32,
    pub amplitude: f32,
    /// Amplitude multiplier for strafing or walking backward.
    pub asymmetric_boost: f32,
    /// Time without movement before the bob starts decaying.
    pub stop_debounce: f32,
    /// Exponential decay rate once stopped.
    pub decay_rate: f32,
}

impl Default for HeadBobConfig {
    fn default() -> Self {
        Self {
            frequency: 10.0,
            amplitude: 0.05,
            asymmetric_boost: 1.5,
            stop_debounce: 0.1,
            decay_rate: 10.0,
        }
    }
}

/// Outbound pose gating.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct SendGateConfig {
    /// Positional change that triggers a send (world units).
    pub position_threshold: f32,
    /// Yaw/pitch change that triggers a send (degrees).
    pub angle_threshold_deg: f32,
    pub position_step: f32,
    pub angle_step_deg: f32,
    /// How often the change predicates are evaluated (seconds).
    pub check_interval: f32,
    /// Hard cap on sends per second.
    pub max_send_hz: f32,
    /// Maximum number of target records attached to an update.
    pub max_targets: usize,
}

impl Default for SendGateConfig {
    fn default() -> Self {
        Self {
            position_threshold: 0.08,
            angle_threshold_deg: 1.0,
            position_step: 0.02,
            angle_step_deg: 0.2,
            check_interval: 0.05,
            max_send_hz: 15.0,
            max_targets: 8,
        }
    }
}

impl SendGateConfig {
    pub fn quantize_steps(&self) -> QuantizeSteps {
        QuantizeSteps::from_degrees(self.position_step, self.angle_step_deg)
    }

    /// Seconds between sends at the rate cap; zero when uncapped.
    pub fn min_send_interval(&self) -> f64 {
        if self.max_send_hz > 0.0 {
            1.0 / f64::from(self.max_send_hz)
        } else {
            0.0
        }
    }
}

/// Inbound drain rate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct InboundConfig {
    pub max_dequeue_hz: f32,
}

impl Default for InboundConfig {
    fn default() -> Self {
        Self {
            max_dequeue_hz: 20.0,
        }
    }
}

impl InboundConfig {
    /// Interval between drain ticks, or `None` when the rate is not a
    /// positive finite number.
    pub fn drain_period(&self) -> Option<std::time::Duration> {
        if !(self.max_dequeue_hz.is_finite() && self.max_dequeue_hz > 0.0) {
            return None;
        }
        std::time::Duration::try_from_secs_f64(1.0 / f64::from(self.max_dequeue_hz))
            .ok()
            .filter(|period| !period.is_zero())
    }
}

/// Fall-through safety net.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct RespawnConfig {
    /// Distance below the lowest collider that triggers a respawn.
    pub fall_distance: f32,
}

impl Default for RespawnConfig {
    fn default() -> Self {
        Self {
            fall_distance: 20.0,
        }
    }
}

/// Room used to seed spawn placement. Never clamps movement.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomBounds {
    pub center: Vec3,
    pub size: Vec3,
}

impl Default for RoomBounds {
    fn default() -> Self {
        Self {
            center: Vec3::new(0.0, 0.0, 0.0),
            size: Vec3::new(20.0, 4.0, 20.0),
        }
    }
}

impl SyncConfig {
    /// Parses config from JSON.
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    /// Reads and validates a JSON config file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        let cfg = Self::from_json_str(&text)
            .with_context(|| format!("parse config {}", path.display()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Rejects values the simulation cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        let p = &self.player;
        ensure!(
            p.radius > 0.0 && p.height > 2.0 * p.radius,
            "player capsule must have radius > 0 and height > 2 * radius"
        );
        ensure!(
            p.step_height >= 0.0 && p.step_height < p.height,
            "step_height must be in [0, height)"
        );
        ensure!(
            p.ground_check_distance > 0.0,
            "ground_check_distance must be positive"
        );
        ensure!(self.frame_hz > 0, "frame_hz must be positive");

        let m = &self.movement;
        ensure!(
            (0.0..=1.0).contains(&m.acceleration),
            "acceleration must be in [0, 1]"
        );
        ensure!(
            m.damping > 0.0 && m.damping <= 1.0,
            "damping must be in (0, 1]"
        );
        ensure!(
            m.terminal_velocity > 0.0,
            "terminal_velocity must be positive"
        );

        let g = &self.send_gate;
        ensure!(
            g.position_threshold >= 0.0 && g.angle_threshold_deg >= 0.0,
            "send thresholds must be non-negative"
        );
        ensure!(
            g.check_interval >= 0.0,
            "check_interval must be non-negative"
        );
        ensure!(
            self.inbound.drain_period().is_some(),
            "max_dequeue_hz must be positive and finite"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_uses_defaults() {
        let cfg = SyncConfig::from_json_str("{}").unwrap();
        assert_eq!(cfg.frame_hz, 60);
        assert_eq!(cfg.jump.buffer_window, 0.12);
        assert_eq!(cfg.send_gate.position_threshold, 0.08);
        cfg.validate().unwrap();
    }

    #[test]
    fn partial_sections_override_only_named_fields() {
        let cfg = SyncConfig::from_json_str(
            r#"{ "relay_addr": "10.0.0.2:9000", "player": { "radius": 0.5 }, "inbound": { "max_dequeue_hz": 10 } }"#,
        )
        .unwrap();
        assert_eq!(cfg.relay_addr, "10.0.0.2:9000");
        assert_eq!(cfg.player.radius, 0.5);
        assert_eq!(cfg.player.height, 1.8);
        let period = cfg.inbound.drain_period().expect("valid rate");
        assert!((period.as_secs_f64() - 0.1).abs() < 1e-9);
    }

    #[test]
    fn validate_rejects_degenerate_capsule() {
        let mut cfg = SyncConfig::default();
        cfg.player.radius = -1.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn min_send_interval_from_rate() {
        let gate = SendGateConfig {
            max_send_hz: 10.0,
            ..Default::default()
        };
        assert_eq!(gate.min_send_interval(), 0.1);
    }

    #[test]
    fn degenerate_drain_rates_have_no_period() {
        for hz in [0.0, -5.0, f32::NAN, f32::INFINITY] {
            let inbound = InboundConfig { max_dequeue_hz: hz };
            assert_eq!(inbound.drain_period(), None, "hz = {hz}");
            let cfg = SyncConfig {
                inbound,
                ..SyncConfig::default()
            };
            assert!(cfg.validate().is_err(), "hz = {hz}");
        }
    }
}
