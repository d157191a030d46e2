//! `movesync_client`
//!
//! Client-side systems:
//! - Input sampling (held keys, mouse look)
//! - Motion controller (jump windows, crouch, head bob, fall-respawn)
//! - Send gate for outbound poses (threshold, quantization, rate cap)
//! - Peer synchronization channel and neighbor table
//! - The `GameClient` frame loop tying them together

pub mod channel;
pub mod client;
pub mod input;
pub mod motion;
pub mod neighbors;
pub mod send_gate;

pub use channel::{ConnectionState, PeerChannel};
pub use client::GameClient;
pub use motion::MotionController;
