//! Character motion controller.
//!
//! Turns sampled input into resolved character motion once per frame:
//! jump latch (buffer, coyote, cooldown), horizontal blend and damping,
//! gravity, collision resolution through the [`CollisionWorld`], crouch eye
//! height, head bob, fall-respawn and finally the outbound [`SendGate`].
//!
//! The controller owns the character body state. The world only answers
//! queries about where the capsule can go.

use std::f32::consts::TAU;

use movesync_shared::{
    collision::CollisionWorld,
    config::{HeadBobConfig, JumpConfig, MovementConfig, SyncConfig},
    math::{approach_factor, wrap_angle, Vec3},
    net::{PeerId, PlayerUpdate},
    pose::{PlayerState, Pose, RoomCoord, TargetInfo},
};
use tracing::{debug, info};

use crate::input::{InputState, MoveKeys};
use crate::send_gate::SendGate;

/// Called with the spawn pose after a fall-respawn.
pub type RespawnCallback = Box<dyn FnMut(&Pose) + Send>;

/// Head bob amplitude below which the bob is considered settled.
const BOB_SETTLED: f32 = 1.0e-4;

/// Per-character physical state.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CharacterBody {
    pub vertical_velocity: f32,
    pub grounded: bool,
    pub last_grounded_at: Option<f64>,
    pub last_jump_pressed: Option<f64>,
}

/// Camera-facing transform of the local player.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewTransform {
    /// Feet position.
    pub position: Vec3,
    pub yaw: f32,
    pub pitch: f32,
    pub eye_height: f32,
    /// Vertical camera offset from the head bob.
    pub head_bob: f32,
}

impl ViewTransform {
    pub fn eye_position(&self) -> Vec3 {
        self.position + Vec3::new(0.0, self.eye_height + self.head_bob, 0.0)
    }
}

/// What happened during one [`MotionController::update`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameOutput {
    /// Quantized pose the send gate released this frame.
    pub pose_to_send: Option<Pose>,
    pub jumped: bool,
    pub landed: bool,
    pub respawned: bool,
}

#[derive(Debug, Clone, Copy, Default)]
struct HeadBob {
    phase: f32,
    amplitude: f32,
    since_moving: f32,
}

/// Frame-driven motion state machine for the local player.
pub struct MotionController {
    movement: MovementConfig,
    jump: JumpConfig,
    head_bob_cfg: HeadBobConfig,
    fall_distance: f32,
    max_targets: usize,

    clock: f64,
    position: Vec3,
    yaw: f32,
    pitch: f32,
    last_input_yaw: Option<f32>,
    velocity: Vec3,
    body: CharacterBody,
    last_jump_applied: Option<f64>,
    jump_was_held: bool,

    crouching: bool,
    crouch_suppressed: bool,
    eye_height: f32,
    head_bob: HeadBob,

    paused: bool,
    spawn: Pose,
    lowest_block_y: Option<f32>,
    on_respawn: Option<RespawnCallback>,

    gate: SendGate,
    state: PlayerState,
}

impl MotionController {
    pub fn new(cfg: &SyncConfig) -> Self {
        let spawn = Pose::default();
        Self {
            movement: cfg.movement,
            jump: cfg.jump,
            head_bob_cfg: cfg.head_bob,
            fall_distance: cfg.respawn.fall_distance,
            max_targets: cfg.send_gate.max_targets,
            clock: 0.0,
            position: spawn.position,
            yaw: spawn.yaw,
            pitch: spawn.pitch,
            last_input_yaw: None,
            velocity: Vec3::ZERO,
            body: CharacterBody::default(),
            last_jump_applied: None,
            jump_was_held: false,
            crouching: false,
            crouch_suppressed: false,
            eye_height: cfg.movement.stand_eye_height,
            head_bob: HeadBob::default(),
            paused: false,
            spawn,
            lowest_block_y: None,
            on_respawn: None,
            gate: SendGate::new(&cfg.send_gate),
            state: PlayerState::new(PeerId(0), spawn, RoomCoord::default()),
        }
    }

    // ─── Frame update ───

    /// Advances the controller by one frame.
    ///
    /// Expects the world to have been stepped for this frame already, so the
    /// pose offered to the send gate is the post-collision one.
    pub fn update(&mut self, world: &mut CollisionWorld, input: &InputState, dt: f32) -> FrameOutput {
        let mut out = FrameOutput::default();
        if !dt.is_finite() || dt <= 0.0 {
            return out;
        }
        self.clock += f64::from(dt);
        let now = self.clock;

        self.apply_look(input);
        if self.paused {
            self.velocity = Vec3::ZERO;
            self.body.vertical_velocity = 0.0;
            self.sync_state();
            return out;
        }

        let physics = world.is_physics_enabled();
        self.body.grounded =
            physics && self.body.vertical_velocity <= 0.0 && world.is_grounded();
        if self.body.grounded {
            self.body.last_grounded_at = Some(now);
        }

        // Jump latch on the press edge.
        let jump_held = input.held(MoveKeys::JUMP);
        if jump_held && !self.jump_was_held {
            self.body.last_jump_pressed = Some(now);
        }
        self.jump_was_held = jump_held;

        let crouch_held = input.held(MoveKeys::CROUCH);
        if !crouch_held {
            self.crouch_suppressed = false;
        }
        self.crouching = crouch_held && !self.crouch_suppressed;

        if physics && self.try_jump(now) {
            out.jumped = true;
            if crouch_held {
                self.crouch_suppressed = true;
            }
        }

        let intent = input.move_intent_at(self.yaw);
        self.integrate_horizontal(intent.direction, intent.is_moving(), dt);

        if physics {
            let dy = if !self.body.grounded || self.body.vertical_velocity > 0.0 {
                self.body.vertical_velocity = (self.body.vertical_velocity
                    - self.movement.gravity * dt)
                    .max(-self.movement.terminal_velocity);
                self.body.vertical_velocity * dt
            } else {
                // Resting: snap onto the floor the probe found.
                self.body.vertical_velocity = 0.0;
                -world.shape().ground_check_distance
            };

            let attempted = self.velocity * dt + Vec3::new(0.0, dy, 0.0);
            let slide = world.slide_player_along_walls(self.position, attempted);
            if slide.hit_ceiling && self.body.vertical_velocity > 0.0 {
                self.body.vertical_velocity = 0.0;
            }
            self.position = slide.position;
            world.set_player_position(self.position);

            let falling = self.body.vertical_velocity < 0.0;
            self.body.grounded =
                self.body.vertical_velocity <= 0.0 && (slide.landed || world.is_grounded());
            if self.body.grounded {
                self.body.last_grounded_at = Some(now);
                if falling {
                    self.body.vertical_velocity = 0.0;
                    out.landed = true;
                }
            }
        } else {
            // Free camera: no gravity, no collision.
            self.body.vertical_velocity = 0.0;
            self.body.grounded = false;
            self.position += self.velocity * dt;
            world.set_player_position(self.position);
        }

        self.ease_eye_height(dt);
        let bobbing = self.body.grounded && intent.is_moving() && !intent.opposing;
        self.advance_head_bob(bobbing, intent.asymmetric, dt);

        if self.fell_out_of_world(world) {
            self.respawn(world);
            out.respawned = true;
        }

        self.sync_state();
        out.pose_to_send = self.gate.poll(now, dt, &self.pose());
        out
    }

    fn apply_look(&mut self, input: &InputState) {
        if let Some(last) = self.last_input_yaw {
            self.yaw = wrap_angle(self.yaw + wrap_angle(input.yaw - last));
        }
        self.last_input_yaw = Some(input.yaw);
        self.pitch = input.pitch;
    }

    /// Applies a latched jump if buffer, coyote and cooldown all allow it.
    fn try_jump(&mut self, now: f64) -> bool {
        let Some(pressed) = self.body.last_jump_pressed else {
            return false;
        };
        if now - pressed > f64::from(self.jump.buffer_window) {
            self.body.last_jump_pressed = None;
            return false;
        }
        let coyote = self.body.grounded
            || self
                .body
                .last_grounded_at
                .is_some_and(|t| now - t <= f64::from(self.jump.coyote_window));
        let cooled = self
            .last_jump_applied
            .map_or(true, |t| now - t >= f64::from(self.jump.cooldown));
        if !(coyote && cooled) {
            return false;
        }

        self.body.vertical_velocity = self.movement.jump_speed;
        self.body.grounded = false;
        self.body.last_grounded_at = None;
        self.body.last_jump_pressed = None;
        self.last_jump_applied = Some(now);
        self.crouching = false;
        debug!(t = now, "Jump applied");
        true
    }

    fn integrate_horizontal(&mut self, direction: Vec3, moving: bool, dt: f32) {
        if !moving {
            self.velocity = Vec3::ZERO;
            return;
        }
        let mut speed = self.movement.walk_speed;
        if self.crouching {
            speed *= self.movement.crouch_speed_factor;
        }
        let blended = self.velocity.lerp(direction * speed, self.movement.acceleration);
        self.velocity = damp(blended, self.movement.damping, dt);
    }

    fn ease_eye_height(&mut self, dt: f32) {
        let target = if self.crouching {
            self.movement.crouch_eye_height
        } else {
            self.movement.stand_eye_height
        };
        self.eye_height += (target - self.eye_height)
            * approach_factor(self.movement.crouch_ease_rate, dt);
        if (target - self.eye_height).abs() < self.movement.crouch_snap_epsilon {
            self.eye_height = target;
        }
    }

    fn advance_head_bob(&mut self, moving: bool, asymmetric: bool, dt: f32) {
        let cfg = self.head_bob_cfg;
        let bob = &mut self.head_bob;
        if moving {
            bob.since_moving = 0.0;
            let boost = if asymmetric { cfg.asymmetric_boost } else { 1.0 };
            let target = cfg.amplitude * boost;
            bob.amplitude += (target - bob.amplitude) * approach_factor(cfg.decay_rate, dt);
            bob.phase = (bob.phase + cfg.frequency * dt) % TAU;
            return;
        }

        bob.since_moving += dt;
        if bob.since_moving < cfg.stop_debounce {
            return;
        }
        bob.amplitude *= 1.0 - approach_factor(cfg.decay_rate, dt);
        if bob.amplitude < BOB_SETTLED {
            bob.amplitude = 0.0;
            bob.phase = 0.0;
        }
    }

    fn fell_out_of_world(&self, world: &CollisionWorld) -> bool {
        self.lowest_block_y
            .or_else(|| world.lowest_collider_y())
            .is_some_and(|lowest| self.position.y < lowest - self.fall_distance)
    }

    fn respawn(&mut self, world: &mut CollisionWorld) {
        let spawn = self.spawn;
        info!(
            from_y = self.position.y,
            x = spawn.position.x,
            y = spawn.position.y,
            z = spawn.position.z,
            "Fell out of the world, respawning"
        );
        self.teleport_to(world, spawn.position, spawn.yaw, false);
        if let Some(callback) = self.on_respawn.as_mut() {
            callback(&spawn);
        }
    }

    fn sync_state(&mut self) {
        self.state.pose = self.pose();
    }

    // ─── Collaborator surface ───

    /// Moves the character, optionally recording the destination as spawn.
    ///
    /// Resets velocity state and the send gate, so the next gate check always
    /// publishes the new pose.
    pub fn teleport_to(
        &mut self,
        world: &mut CollisionWorld,
        position: Vec3,
        yaw: f32,
        save_as_spawn: bool,
    ) {
        let mut target = position;
        if world.overlaps_any(target) {
            target = world.push_out_of_colliders(target, false);
        }
        self.position = target;
        self.yaw = wrap_angle(yaw);
        world.set_player_position(target);
        if save_as_spawn {
            self.spawn = Pose::new(target, self.yaw, 0.0);
        }
        self.reset_physics_state();
        self.gate.reset();
        self.sync_state();
        debug!(x = target.x, y = target.y, z = target.z, save_as_spawn, "Teleported");
    }

    /// Clears velocity, jump latches and grounded history.
    pub fn reset_physics_state(&mut self) {
        self.velocity = Vec3::ZERO;
        self.body = CharacterBody::default();
        self.last_jump_applied = None;
        self.head_bob = HeadBob::default();
    }

    /// Freezes the character in place. Velocity is zeroed on entry.
    pub fn set_paused(&mut self, paused: bool) {
        if paused {
            self.velocity = Vec3::ZERO;
            self.body.vertical_velocity = 0.0;
        }
        self.paused = paused;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Overrides the lowest static collider height used for fall detection.
    pub fn set_lowest_block_y(&mut self, y: f32) {
        self.lowest_block_y = Some(y);
    }

    pub fn set_on_respawn_callback(&mut self, callback: RespawnCallback) {
        self.on_respawn = Some(callback);
    }

    pub fn transform(&self) -> ViewTransform {
        ViewTransform {
            position: self.position,
            yaw: self.yaw,
            pitch: self.pitch,
            eye_height: self.eye_height,
            head_bob: self.head_bob.phase.sin() * self.head_bob.amplitude,
        }
    }

    pub fn pose(&self) -> Pose {
        Pose::new(self.position, self.yaw, self.pitch)
    }

    pub fn spawn_pose(&self) -> Pose {
        self.spawn
    }

    pub fn player_state(&self) -> &PlayerState {
        &self.state
    }

    pub fn set_peer_id(&mut self, id: PeerId) {
        self.state.id = id;
    }

    pub fn set_room(&mut self, room: RoomCoord) {
        self.state.room = room;
    }

    /// Replaces the published targets, keeping the most recent ones.
    pub fn set_targets(&mut self, targets: &[TargetInfo]) {
        self.state.set_targets(targets, self.max_targets);
    }

    /// Wire update for a pose released by the send gate.
    pub fn outbound_update(&self, pose: &Pose) -> PlayerUpdate {
        let mut update = PlayerUpdate::from_pose(self.state.id, pose);
        update.targets_info = self.state.targets.clone();
        update.room = Some(self.state.room);
        update
    }

    pub fn body(&self) -> &CharacterBody {
        &self.body
    }

    pub fn velocity(&self) -> Vec3 {
        self.velocity
    }

    pub fn is_crouching(&self) -> bool {
        self.crouching
    }

    pub fn head_bob_amplitude(&self) -> f32 {
        self.head_bob.amplitude
    }

    pub fn send_gate(&self) -> &SendGate {
        &self.gate
    }

    /// Controller clock in seconds.
    pub fn clock(&self) -> f64 {
        self.clock
    }
}

/// Continuous velocity decay: keeps `damping` of the velocity per second.
pub fn damp(velocity: Vec3, damping: f32, dt: f32) -> Vec3 {
    velocity * damping.powf(dt)
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use movesync_shared::collision::CapsuleShape;
    use movesync_shared::geometry::{Collider, ColliderOwner};

    const DT: f32 = 0.01;

    fn floor_world() -> CollisionWorld {
        let mut world = CollisionWorld::new(CapsuleShape::default());
        world
            .add_collider(Collider::new(
                Vec3::new(-50.0, -1.0, -50.0),
                Vec3::new(50.0, 0.0, 50.0),
                ColliderOwner(1),
            ))
            .unwrap();
        world
    }

    fn controller_at(world: &mut CollisionWorld, position: Vec3) -> MotionController {
        let mut c = MotionController::new(&SyncConfig::default());
        c.teleport_to(world, position, 0.0, true);
        c
    }

    fn keys(k: MoveKeys) -> InputState {
        InputState {
            keys: k,
            ..InputState::default()
        }
    }

    #[test]
    fn jump_is_applied_once_within_cooldown() {
        let mut world = floor_world();
        let mut c = controller_at(&mut world, Vec3::ZERO);

        let mut jumps = 0;
        for frame in 0..40 {
            // Press at ~0.05 s, release, press again at ~0.10 s.
            let held = (5..7).contains(&frame) || (10..12).contains(&frame);
            let input = if held { keys(MoveKeys::JUMP) } else { keys(MoveKeys::empty()) };
            if c.update(&mut world, &input, DT).jumped {
                jumps += 1;
            }
        }
        assert_eq!(jumps, 1);
        assert!(c.transform().position.y > 0.0);
    }

    #[test]
    fn early_press_is_buffered_until_landing() {
        let mut world = floor_world();
        let mut c = controller_at(&mut world, Vec3::new(0.0, 0.5, 0.0));

        let mut jumped_at = None;
        for frame in 0..40 {
            let input = if (15..17).contains(&frame) {
                keys(MoveKeys::JUMP)
            } else {
                keys(MoveKeys::empty())
            };
            if c.update(&mut world, &input, DT).jumped {
                jumped_at = Some(frame);
                break;
            }
        }
        let frame = jumped_at.expect("buffered jump should fire on landing");
        assert!(frame > 16, "jumped mid-air at frame {frame}");
    }

    #[test]
    fn coyote_window_allows_late_jump() {
        let mut world = floor_world();
        let mut c = controller_at(&mut world, Vec3::ZERO);
        let idle = keys(MoveKeys::empty());
        for _ in 0..3 {
            c.update(&mut world, &idle, DT);
        }
        assert!(c.body().grounded);

        world.clear_all();
        c.update(&mut world, &idle, DT);
        c.update(&mut world, &idle, DT);
        assert!(!c.body().grounded);
        assert!(c.update(&mut world, &keys(MoveKeys::JUMP), DT).jumped);
    }

    #[test]
    fn coyote_window_expires() {
        let mut world = floor_world();
        let mut c = controller_at(&mut world, Vec3::ZERO);
        let idle = keys(MoveKeys::empty());
        c.update(&mut world, &idle, DT);
        world.clear_all();
        for _ in 0..20 {
            c.update(&mut world, &idle, DT);
        }
        for _ in 0..20 {
            assert!(!c.update(&mut world, &keys(MoveKeys::JUMP), DT).jumped);
        }
    }

    #[test]
    fn damping_is_frame_rate_invariant() {
        let v = Vec3::new(4.0, 0.0, -2.0);
        let mut at_60 = v;
        for _ in 0..60 {
            at_60 = damp(at_60, 0.9, 1.0 / 60.0);
        }
        let mut at_20 = v;
        for _ in 0..20 {
            at_20 = damp(at_20, 0.9, 1.0 / 20.0);
        }
        let once = damp(v, 0.9, 1.0);
        assert!((at_60 - once).len() < 1e-4);
        assert!((at_20 - once).len() < 1e-4);
        assert!((once.x - 3.6).abs() < 1e-5);
    }

    #[test]
    fn releasing_or_opposing_keys_stops_immediately() {
        let mut world = floor_world();
        let mut c = controller_at(&mut world, Vec3::ZERO);
        for _ in 0..30 {
            c.update(&mut world, &keys(MoveKeys::FORWARD), DT);
        }
        assert!(c.velocity().len() > 1.0);

        c.update(&mut world, &keys(MoveKeys::LEFT | MoveKeys::RIGHT), DT);
        assert_eq!(c.velocity(), Vec3::ZERO);

        for _ in 0..30 {
            c.update(&mut world, &keys(MoveKeys::FORWARD), DT);
        }
        c.update(&mut world, &keys(MoveKeys::empty()), DT);
        assert_eq!(c.velocity(), Vec3::ZERO);
    }

    #[test]
    fn walking_forward_moves_down_negative_z() {
        let mut world = floor_world();
        let mut c = controller_at(&mut world, Vec3::ZERO);
        for _ in 0..100 {
            c.update(&mut world, &keys(MoveKeys::FORWARD), DT);
        }
        let p = c.transform().position;
        assert!(p.z < -2.0, "z = {}", p.z);
        assert!(p.x.abs() < 1e-3);
        assert_eq!(p.y, 0.0);
    }

    #[test]
    fn paused_controller_does_not_drift() {
        let mut world = floor_world();
        let mut c = controller_at(&mut world, Vec3::new(0.0, 3.0, 0.0));
        c.set_paused(true);
        for _ in 0..100 {
            c.update(&mut world, &keys(MoveKeys::FORWARD | MoveKeys::JUMP), DT);
        }
        assert_eq!(c.transform().position, Vec3::new(0.0, 3.0, 0.0));
        assert_eq!(c.velocity(), Vec3::ZERO);
        assert_eq!(c.body().vertical_velocity, 0.0);

        c.set_paused(false);
        c.update(&mut world, &keys(MoveKeys::empty()), DT);
        assert!(c.transform().position.y < 3.0);
    }

    #[test]
    fn physics_disabled_moves_freely_without_gravity() {
        let mut world = CollisionWorld::new(CapsuleShape::default());
        world.disable_physics();
        let mut c = controller_at(&mut world, Vec3::new(0.0, 10.0, 0.0));
        for _ in 0..50 {
            c.update(&mut world, &keys(MoveKeys::FORWARD), DT);
        }
        let p = c.transform().position;
        assert_eq!(p.y, 10.0);
        assert!(p.z < -0.5);
    }

    #[test]
    fn teleport_forces_next_check_to_send() {
        let mut world = floor_world();
        let mut c = controller_at(&mut world, Vec3::ZERO);
        let idle = keys(MoveKeys::empty());
        let sent = (0..10).filter_map(|_| c.update(&mut world, &idle, DT).pose_to_send).count();
        assert_eq!(sent, 1);

        // Well under the positional threshold.
        c.teleport_to(&mut world, Vec3::new(0.01, 0.0, 0.0), 0.0, false);
        let out = c.update(&mut world, &idle, DT);
        let pose = out.pose_to_send.expect("teleport must publish");
        assert!((pose.position.x - 0.0).abs() < 0.03);
    }

    #[test]
    fn crouch_eases_snaps_and_is_cancelled_by_jump() {
        let mut world = floor_world();
        let cfg = SyncConfig::default();
        let mut c = controller_at(&mut world, Vec3::ZERO);

        for _ in 0..200 {
            c.update(&mut world, &keys(MoveKeys::CROUCH), DT);
        }
        assert!(c.is_crouching());
        assert_eq!(c.transform().eye_height, cfg.movement.crouch_eye_height);

        assert!(c.update(&mut world, &keys(MoveKeys::CROUCH | MoveKeys::JUMP), DT).jumped);
        // Still held, but the jump cancelled it.
        for _ in 0..5 {
            c.update(&mut world, &keys(MoveKeys::CROUCH), DT);
            assert!(!c.is_crouching());
        }
        c.update(&mut world, &keys(MoveKeys::empty()), DT);
        c.update(&mut world, &keys(MoveKeys::CROUCH), DT);
        assert!(c.is_crouching());
    }

    #[test]
    fn head_bob_debounces_then_decays() {
        let mut world = floor_world();
        let mut c = controller_at(&mut world, Vec3::ZERO);
        for _ in 0..50 {
            c.update(&mut world, &keys(MoveKeys::FORWARD), DT);
        }
        let walking = c.head_bob_amplitude();
        assert!(walking > 0.0);

        let idle = keys(MoveKeys::empty());
        for _ in 0..5 {
            c.update(&mut world, &idle, DT);
        }
        assert_eq!(c.head_bob_amplitude(), walking);

        for _ in 0..20 {
            c.update(&mut world, &idle, DT);
        }
        let decaying = c.head_bob_amplitude();
        assert!(decaying < walking && decaying > 0.0);

        for _ in 0..200 {
            c.update(&mut world, &idle, DT);
        }
        assert_eq!(c.head_bob_amplitude(), 0.0);
    }

    #[test]
    fn strafing_bobs_harder() {
        let mut world = floor_world();
        let mut fwd = controller_at(&mut world, Vec3::ZERO);
        for _ in 0..100 {
            fwd.update(&mut world, &keys(MoveKeys::FORWARD), DT);
        }
        let mut world = floor_world();
        let mut side = controller_at(&mut world, Vec3::ZERO);
        for _ in 0..100 {
            side.update(&mut world, &keys(MoveKeys::LEFT), DT);
        }
        assert!(side.head_bob_amplitude() > fwd.head_bob_amplitude());
    }

    #[test]
    fn falling_out_respawns_at_saved_spawn() {
        let mut world = CollisionWorld::new(CapsuleShape::default());
        world
            .add_collider(Collider::new(
                Vec3::new(-2.0, -1.0, -2.0),
                Vec3::new(2.0, 0.0, 2.0),
                ColliderOwner(1),
            ))
            .unwrap();
        let mut c = controller_at(&mut world, Vec3::new(0.0, 0.0, 0.0));
        c.set_lowest_block_y(-1.0);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        c.set_on_respawn_callback(Box::new(move |pose| sink.lock().unwrap().push(*pose)));

        c.teleport_to(&mut world, Vec3::new(10.0, 0.0, 0.0), 1.0, false);
        let idle = keys(MoveKeys::empty());
        let respawns = (0..300)
            .filter(|_| c.update(&mut world, &idle, DT).respawned)
            .count();

        assert_eq!(respawns, 1);
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].position, Vec3::ZERO);
        assert_eq!(c.transform().position, Vec3::ZERO);
    }

    #[test]
    fn targets_are_capped_and_published() {
        let mut c = MotionController::new(&SyncConfig::default());
        c.set_peer_id(PeerId(4));
        c.set_room(RoomCoord { x: 1, z: -2 });
        let targets: Vec<TargetInfo> = (0..20)
            .map(|i| TargetInfo {
                x: i as f32,
                ..TargetInfo::default()
            })
            .collect();
        c.set_targets(&targets);
        let max = SyncConfig::default().send_gate.max_targets;
        assert_eq!(c.player_state().targets.len(), max);
        assert_eq!(c.player_state().targets[0].x, (20 - max) as f32);

        let update = c.outbound_update(&c.pose());
        assert_eq!(update.id, PeerId(4));
        assert_eq!(update.room, Some(RoomCoord { x: 1, z: -2 }));
        assert_eq!(update.targets_info.len(), max);
    }
}
