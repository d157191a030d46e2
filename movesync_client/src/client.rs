//! Game client frame loop.
//!
//! The client owns:
//! - The collision world (scenario geometry plus the simulated body)
//! - The motion controller for the local player
//! - An optional peer channel to the relay
//!
//! Each frame runs the physics step, then motion integration, then the
//! outbound gate, so a pose on the wire is always the post-collision one.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use movesync_shared::{
    collision::{CapsuleShape, CollisionWorld},
    config::{RoomBounds, SyncConfig},
    geometry::{Collider, ColliderOwner},
    math::Vec3,
    physics::PendingCollisionWorld,
    pose::{Pose, RoomCoord},
};
use rand::Rng;
use tracing::{debug, info};

use crate::{
    channel::{ConnectionState, PeerChannel},
    input::InputState,
    motion::{FrameOutput, MotionController},
    neighbors::NeighborTable,
};

/// Owner id for the generated room shell.
pub const ROOM_OWNER: ColliderOwner = ColliderOwner(0);

const WALL_THICKNESS: f32 = 0.5;

/// Clearance between a seeded spawn and the room walls.
const SPAWN_WALL_GAP: f32 = 0.1;

/// High-level game client.
pub struct GameClient {
    cfg: SyncConfig,
    world: CollisionWorld,
    controller: MotionController,
    channel: Option<PeerChannel>,
    frames: u64,
    sent: u64,
}

impl GameClient {
    /// Creates an offline client around an initialized world.
    pub fn new(cfg: SyncConfig, world: CollisionWorld) -> Self {
        // Fall detection reads the world's lowest collider every frame.
        let mut controller = MotionController::new(&cfg);
        controller.set_room(room_coord(&cfg.room));
        Self {
            cfg,
            world,
            controller,
            channel: None,
            frames: 0,
            sent: 0,
        }
    }

    /// Connects to the configured relay and waits for an identity.
    pub async fn connect(cfg: SyncConfig, world: CollisionWorld) -> anyhow::Result<Self> {
        let addr: SocketAddr = cfg.relay_addr.parse().context("parse relay_addr")?;
        info!(relay = %addr, player = %cfg.player_name, "Connecting to relay");
        let channel = PeerChannel::connect(addr, &cfg.inbound)
            .await
            .context("relay handshake")?;
        let mut client = Self::new(cfg, world);
        client.attach_channel(channel);
        Ok(client)
    }

    pub fn attach_channel(&mut self, channel: PeerChannel) {
        if let Some(id) = channel.peer_id() {
            self.controller.set_peer_id(id);
        }
        self.channel = Some(channel);
    }

    /// Picks a random point in the room and drops it onto the floor below.
    /// The result is saved as the spawn pose.
    pub fn seed_spawn<R: Rng>(&mut self, rng: &mut R) -> Pose {
        let room = self.cfg.room;
        let margin = self.world.shape().radius + SPAWN_WALL_GAP;
        let half_x = (room.size.x * 0.5 - margin).max(0.0);
        let half_z = (room.size.z * 0.5 - margin).max(0.0);
        let top = room.center.y + room.size.y * 0.5;
        let bottom = room.center.y - room.size.y * 0.5;

        let x = room.center.x + rng.gen_range(-half_x..=half_x);
        let z = room.center.z + rng.gen_range(-half_z..=half_z);
        let yaw = rng.gen_range(-std::f32::consts::PI..std::f32::consts::PI);

        let probe = Vec3::new(x, top, z);
        let y = self
            .world
            .check_ground_collision(probe, room.size.y + WALL_THICKNESS)
            .unwrap_or(bottom);
        let position = Vec3::new(x, y, z);

        self.controller
            .teleport_to(&mut self.world, position, yaw, true);
        let spawn = self.controller.spawn_pose();
        info!(
            x = spawn.position.x,
            y = spawn.position.y,
            z = spawn.position.z,
            "Spawn seeded"
        );
        spawn
    }

    /// Runs one frame.
    pub fn frame(&mut self, input: &InputState, dt: f32) -> FrameOutput {
        self.frames += 1;
        self.world.step(dt);
        let out = self.controller.update(&mut self.world, input, dt);

        if let Some(channel) = &self.channel {
            if let Some(id) = channel.peer_id() {
                if self.controller.player_state().id != id {
                    self.controller.set_peer_id(id);
                }
            }
            if let Some(pose) = out.pose_to_send {
                channel.send_player_update(self.controller.outbound_update(&pose));
                self.sent += 1;
            }
        }
        if out.respawned {
            debug!(frame = self.frames, "Respawned this frame");
        }
        out
    }

    /// Pauses motion and the physics clock together.
    pub fn set_paused(&mut self, paused: bool) {
        self.controller.set_paused(paused);
        if paused {
            self.world.disable_physics();
        } else {
            self.world.enable_physics();
        }
    }

    pub fn teleport_to(&mut self, position: Vec3, yaw: f32, save_as_spawn: bool) {
        self.controller
            .teleport_to(&mut self.world, position, yaw, save_as_spawn);
    }

    pub fn config(&self) -> &SyncConfig {
        &self.cfg
    }

    pub fn world(&self) -> &CollisionWorld {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut CollisionWorld {
        &mut self.world
    }

    pub fn controller(&self) -> &MotionController {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut MotionController {
        &mut self.controller
    }

    pub fn channel(&self) -> Option<&PeerChannel> {
        self.channel.as_ref()
    }

    pub fn connection_state(&self) -> Option<ConnectionState> {
        self.channel.as_ref().map(PeerChannel::connection_state)
    }

    pub fn neighbors(&self) -> Option<Arc<NeighborTable>> {
        self.channel.as_ref().map(PeerChannel::neighbors)
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Updates handed to the channel.
    pub fn updates_sent(&self) -> u64 {
        self.sent
    }
}

/// Grid coordinate of a room, in room-size units.
pub fn room_coord(room: &RoomBounds) -> RoomCoord {
    let cell = |c: f32, size: f32| if size > 0.0 { (c / size).round() as i32 } else { 0 };
    RoomCoord {
        x: cell(room.center.x, room.size.x),
        z: cell(room.center.z, room.size.z),
    }
}

/// Floor and four walls enclosing `room`.
pub fn room_colliders(room: &RoomBounds) -> Vec<Collider> {
    let c = room.center;
    let h = Vec3::new(room.size.x * 0.5, room.size.y * 0.5, room.size.z * 0.5);
    let t = WALL_THICKNESS;
    let (x0, x1) = (c.x - h.x, c.x + h.x);
    let (y0, y1) = (c.y - h.y, c.y + h.y);
    let (z0, z1) = (c.z - h.z, c.z + h.z);

    [
        // floor
        (Vec3::new(x0 - t, y0 - t, z0 - t), Vec3::new(x1 + t, y0, z1 + t)),
        (Vec3::new(x0 - t, y0, z0 - t), Vec3::new(x0, y1, z1 + t)),
        (Vec3::new(x1, y0, z0 - t), Vec3::new(x1 + t, y1, z1 + t)),
        (Vec3::new(x0, y0, z0 - t), Vec3::new(x1, y1, z0)),
        (Vec3::new(x0, y0, z1), Vec3::new(x1, y1, z1 + t)),
    ]
    .into_iter()
    .map(|(min, max)| Collider::new(min, max, ROOM_OWNER))
    .collect()
}

/// Builds the collision world for `cfg`'s room off the calling task.
pub async fn load_room_world(cfg: &SyncConfig) -> anyhow::Result<CollisionWorld> {
    let mut pending = PendingCollisionWorld::new(CapsuleShape::from(&cfg.player));
    for collider in room_colliders(&cfg.room) {
        pending.add_collider(collider);
    }
    pending.wait_for_init().await.context("physics init")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::MoveKeys;
    use rand::{rngs::StdRng, SeedableRng};

    fn offline() -> GameClient {
        let cfg = SyncConfig::default();
        let mut world = CollisionWorld::new(CapsuleShape::from(&cfg.player));
        for c in room_colliders(&cfg.room) {
            world.add_collider(c).unwrap();
        }
        GameClient::new(cfg, world)
    }

    #[test]
    fn spawn_lands_on_room_floor_inside_bounds() {
        let mut client = offline();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..20 {
            let spawn = client.seed_spawn(&mut rng);
            let room = client.config().room;
            assert_eq!(spawn.position.y, room.center.y - room.size.y * 0.5);
            assert!(spawn.position.x.abs() <= room.size.x * 0.5);
            assert!(spawn.position.z.abs() <= room.size.z * 0.5);
            assert!(!client.world().overlaps_any(spawn.position));
        }
    }

    #[test]
    fn walls_contain_the_player() {
        let mut client = offline();
        client.teleport_to(Vec3::new(0.0, -2.0, 0.0), 0.0, true);
        let mut input = InputState::default();
        input.press(MoveKeys::FORWARD);
        for _ in 0..600 {
            client.frame(&input, 1.0 / 60.0);
        }
        let p = client.controller().transform().position;
        let half_z = client.config().room.size.z * 0.5;
        let r = client.world().shape().radius;
        assert!(p.z >= -half_z + r - 0.01, "z = {}", p.z);
        assert!(p.z < -half_z + r + 0.05, "z = {}", p.z);
    }

    #[test]
    fn geometry_added_later_counts_for_fall_detection() {
        let mut client = offline();
        client
            .world_mut()
            .add_collider(Collider::new(
                Vec3::new(50.0, -31.0, -5.0),
                Vec3::new(60.0, -30.0, 5.0),
                ColliderOwner(9),
            ))
            .unwrap();
        client.teleport_to(Vec3::new(55.0, -30.0, 0.0), 0.0, false);
        for _ in 0..30 {
            let out = client.frame(&InputState::default(), 1.0 / 60.0);
            assert!(!out.respawned);
        }
        assert_eq!(client.controller().transform().position.y, -30.0);

        // Removing it again puts the same spot below the world.
        client.world_mut().remove_owner(ColliderOwner(9));
        let out = client.frame(&InputState::default(), 1.0 / 60.0);
        assert!(out.respawned);
    }

    #[test]
    fn paused_client_stops_physics_clock() {
        let mut client = offline();
        client.frame(&InputState::default(), 0.1);
        let t = client.world().time();
        client.set_paused(true);
        for _ in 0..10 {
            client.frame(&InputState::default(), 0.1);
        }
        assert_eq!(client.world().time(), t);
        assert!(!client.world().is_physics_enabled());
        client.set_paused(false);
        assert!(client.world().is_physics_enabled());
    }

    #[test]
    fn offline_client_counts_no_sends() {
        let mut client = offline();
        for _ in 0..30 {
            client.frame(&InputState::default(), 1.0 / 60.0);
        }
        assert_eq!(client.frames(), 30);
        assert_eq!(client.updates_sent(), 0);
        assert!(client.neighbors().is_none());
    }

    #[test]
    fn room_coord_is_in_room_units() {
        let room = RoomBounds {
            center: Vec3::new(40.0, 0.0, -20.0),
            size: Vec3::new(20.0, 4.0, 20.0),
        };
        assert_eq!(room_coord(&room), RoomCoord { x: 2, z: -1 });
    }
}
