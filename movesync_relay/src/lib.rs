//! `movesync_relay`
//!
//! Relay-side systems:
//! - Accepts peer connections and assigns each a `PeerId`
//! - Forwards every pose update to all other connected peers
//!
//! Networking model:
//! - TCP only, length-prefixed JSON frames (see `movesync_shared::net`)
//! - One reader task and one writer task per peer; no simulation state

pub mod relay;

pub use relay::{bind_ephemeral, Relay};
