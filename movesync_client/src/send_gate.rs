//! Outbound pose gating.
//!
//! Three independent stages decide whether the local pose goes on the wire:
//!
//! 1. change detection: the pose must have moved more than a positional
//!    threshold, or turned more than an angular threshold, since the last
//!    *sent* pose;
//! 2. quantization: a pose that passes is snapped to the wire grid, and that
//!    snapped value becomes the new reference;
//! 3. rate cap: at most `max_send_hz` sends per second, no matter how often
//!    the predicates are checked.
//!
//! The predicates themselves are only evaluated every `check_interval`
//! seconds, accumulated from frame times.

use movesync_shared::{
    config::SendGateConfig,
    math::wrap_angle,
    pose::{quantize_pose, Pose, QuantizeSteps},
};

/// Send-gate state owned by the motion controller.
#[derive(Debug, Clone)]
pub struct SendGate {
    position_threshold_sq: f32,
    angle_threshold: f32,
    check_interval: f32,
    min_send_interval: f64,
    steps: QuantizeSteps,

    check_accumulator: f32,
    last_sent: Option<Pose>,
    last_send_time: Option<f64>,
    next_allowed_send: f64,
}

impl SendGate {
    pub fn new(cfg: &SendGateConfig) -> Self {
        Self {
            position_threshold_sq: cfg.position_threshold * cfg.position_threshold,
            angle_threshold: cfg.angle_threshold_deg.to_radians(),
            check_interval: cfg.check_interval,
            min_send_interval: cfg.min_send_interval(),
            steps: cfg.quantize_steps(),
            check_accumulator: 0.0,
            last_sent: None,
            last_send_time: None,
            next_allowed_send: f64::NEG_INFINITY,
        }
    }

    /// Per-frame entry point. Returns the quantized pose to send, if any.
    pub fn poll(&mut self, now: f64, dt: f32, pose: &Pose) -> Option<Pose> {
        self.check_accumulator += dt.max(0.0);
        if self.check_accumulator < self.check_interval {
            return None;
        }
        self.check_accumulator = 0.0;
        self.evaluate(now, pose)
    }

    /// Runs the change predicates and rate cap immediately.
    pub fn evaluate(&mut self, now: f64, pose: &Pose) -> Option<Pose> {
        if now < self.next_allowed_send || !self.changed(pose) {
            return None;
        }
        let quantized = quantize_pose(pose, self.steps);
        self.last_sent = Some(quantized);
        self.last_send_time = Some(now);
        self.next_allowed_send = now + self.min_send_interval;
        Some(quantized)
    }

    /// True when `pose` differs enough from the last sent pose.
    pub fn changed(&self, pose: &Pose) -> bool {
        let Some(last) = self.last_sent else {
            return true;
        };
        let moved = pose.position.distance_sq(last.position) > self.position_threshold_sq;
        let turned = wrap_angle(pose.yaw - last.yaw).abs() > self.angle_threshold
            || wrap_angle(pose.pitch - last.pitch).abs() > self.angle_threshold;
        moved || turned
    }

    /// Forgets the last sent pose so the next check always fires.
    pub fn reset(&mut self) {
        self.last_sent = None;
        self.last_send_time = None;
        self.next_allowed_send = f64::NEG_INFINITY;
        self.check_accumulator = self.check_interval;
    }

    pub fn last_sent(&self) -> Option<&Pose> {
        self.last_sent.as_ref()
    }

    pub fn last_send_time(&self) -> Option<f64> {
        self.last_send_time
    }

    pub fn next_allowed_send(&self) -> f64 {
        self.next_allowed_send
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use movesync_shared::math::Vec3;

    fn gate() -> SendGate {
        SendGate::new(&SendGateConfig {
            position_threshold: 0.08,
            angle_threshold_deg: 1.0,
            position_step: 0.02,
            angle_step_deg: 0.2,
            check_interval: 0.05,
            max_send_hz: 10.0,
            max_targets: 4,
        })
    }

    fn at(x: f32) -> Pose {
        Pose::new(Vec3::new(x, 0.0, 0.0), 0.0, 0.0)
    }

    #[test]
    fn first_pose_always_sends() {
        let mut g = gate();
        assert_eq!(g.evaluate(0.0, &at(0.0)), Some(at(0.0)));
    }

    #[test]
    fn threshold_scenario() {
        let mut g = gate();
        g.evaluate(0.0, &at(0.0)).unwrap();

        assert_eq!(g.evaluate(1.0, &at(0.05)), None);
        assert_eq!(g.last_sent(), Some(&at(0.0)));

        let sent = g.evaluate(2.0, &at(0.09)).expect("over threshold");
        let expected = quantize_pose(&at(0.09), SendGateConfig::default().quantize_steps());
        assert_eq!(sent, expected);
        assert_eq!(g.last_sent(), Some(&expected));
    }

    #[test]
    fn sub_threshold_jitter_never_sends_twice() {
        let mut g = gate();
        let a = g.evaluate(0.0, &at(1.0));
        assert!(a.is_some());
        for i in 1..50 {
            let jitter = if i % 2 == 0 { 0.03 } else { -0.03 };
            let pose = Pose::new(Vec3::new(1.0 + jitter, 0.0, 0.01), 0.01, -0.01);
            assert_eq!(g.evaluate(f64::from(i) * 0.01, &pose), None);
        }
    }

    #[test]
    fn rate_cap_holds_back_large_changes() {
        let mut g = gate();
        g.evaluate(0.0, &at(0.0)).unwrap();
        // 10 Hz cap: nothing before t = 0.1 even though every pose moved a lot.
        assert_eq!(g.evaluate(0.05, &at(5.0)), None);
        assert_eq!(g.evaluate(0.099, &at(6.0)), None);
        assert!(g.evaluate(0.1, &at(7.0)).is_some());
        assert!((g.next_allowed_send() - 0.2).abs() < 1e-9);
    }

    #[test]
    fn rotation_wraps_across_pi() {
        let mut g = gate();
        let near_pi = Pose::new(Vec3::ZERO, std::f32::consts::PI - 0.001, 0.0);
        g.evaluate(0.0, &near_pi).unwrap();
        // Crossing the seam is a tiny turn, not a full revolution.
        let across = Pose::new(Vec3::ZERO, -std::f32::consts::PI + 0.001, 0.0);
        assert!(!g.changed(&across));
        let turned = Pose::new(Vec3::ZERO, std::f32::consts::PI - 0.1, 0.0);
        assert!(g.changed(&turned));
    }

    #[test]
    fn pitch_alone_crosses_angle_threshold() {
        let mut g = gate();
        g.evaluate(0.0, &at(0.0)).unwrap();
        let small = Pose::new(Vec3::ZERO, 0.0, 0.5_f32.to_radians());
        assert!(!g.changed(&small));
        let tilted = Pose::new(Vec3::ZERO, 0.0, 1.5_f32.to_radians());
        assert!(g.changed(&tilted));
        assert!(g.evaluate(1.0, &tilted).is_some());
    }

    #[test]
    fn check_cadence_is_separate_from_frames() {
        let mut g = gate();
        let dt = 1.0 / 60.0;
        let mut sends = 0;
        let mut now = 0.0;
        for frame in 0..60 {
            now += f64::from(dt);
            if g.poll(now, dt, &at(frame as f32)).is_some() {
                sends += 1;
            }
        }
        // One second of frames, 10 Hz cap, 20 Hz check cadence. A check that
        // lands just short of the rate window defers the send to the next one.
        assert!((5..=10).contains(&sends), "sends = {sends}");
    }

    #[test]
    fn reset_forces_next_check_to_fire() {
        let mut g = gate();
        g.evaluate(0.0, &at(0.0)).unwrap();
        g.reset();
        assert!(g.last_sent().is_none());
        assert!(g.poll(0.01, 0.0, &at(0.0)).is_some());
    }
}
