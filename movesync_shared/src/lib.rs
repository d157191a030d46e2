//! `movesync_shared`
//!
//! Shared libraries used by the movement-sync client and the relay.
//!
//! Design goals:
//! - Deterministic where it matters (collision queries, quantization).
//! - Clear separation of concerns (math, geometry, collision, net, config).
//! - Explicitly constructed services; no process-wide state.
//! - No `unsafe`.

pub mod collision;
pub mod config;
pub mod geometry;
pub mod math;
pub mod net;
pub mod physics;
pub mod pose;

pub mod prelude {
    //! Commonly used exports.

    pub use crate::collision::{CapsuleShape, CollisionWorld, SlideOutcome};
    pub use crate::config::*;
    pub use crate::geometry::{Aabb, Collider, ColliderOwner};
    pub use crate::math::*;
    pub use crate::net::*;
    pub use crate::physics::{PendingCollisionWorld, PhysicsError};
    pub use crate::pose::*;
}
