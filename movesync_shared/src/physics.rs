//! Physics backend initialization.
//!
//! A [`CollisionWorld`] only exists once the backend is ready. Until then
//! callers hold a [`PendingCollisionWorld`], which queues scenario geometry and
//! capsule configuration and replays it when [`PendingCollisionWorld::wait_for_init`]
//! resolves. Queries are simply not available on the pending type, so an
//! "uninitialized query" cannot be written.

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::collision::{CapsuleShape, CollisionWorld};
use crate::geometry::{Collider, ColliderOwner};

/// Errors reported by the collision world.
///
/// These are configuration problems in the content being loaded; they are
/// logged where they occur and never stop the frame loop.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PhysicsError {
    #[error("collider from owner {owner:?} has min > max or non-finite bounds")]
    InvalidBounds { owner: ColliderOwner },

    #[error("invalid {name}: {value}")]
    InvalidDimension { name: &'static str, value: f32 },

    #[error("physics backend failed to initialize: {0}")]
    InitFailed(String),
}

enum PendingOp {
    AddCollider(Collider),
    ClearAll,
    Dimensions { radius: f32, height: f32 },
    StepHeight(f32),
}

/// Collision world whose backend has not finished initializing.
pub struct PendingCollisionWorld {
    shape: CapsuleShape,
    ops: Vec<PendingOp>,
}

impl PendingCollisionWorld {
    pub fn new(shape: CapsuleShape) -> Self {
        Self {
            shape,
            ops: Vec::new(),
        }
    }

    /// Queues a collider for insertion at init.
    pub fn add_collider(&mut self, collider: Collider) {
        self.ops.push(PendingOp::AddCollider(collider));
    }

    pub fn clear_all(&mut self) {
        self.ops.push(PendingOp::ClearAll);
    }

    pub fn set_player_dimensions(&mut self, radius: f32, height: f32) {
        self.ops.push(PendingOp::Dimensions { radius, height });
    }

    pub fn set_step_height(&mut self, step_height: f32) {
        self.ops.push(PendingOp::StepHeight(step_height));
    }

    /// Number of queued operations.
    pub fn queued(&self) -> usize {
        self.ops.len()
    }

    /// Finishes backend setup off the calling task and returns the ready world.
    ///
    /// Queued operations are replayed in order; the ones that fail validation
    /// are logged and skipped exactly as they would be on a live world.
    pub async fn wait_for_init(self) -> Result<CollisionWorld, PhysicsError> {
        let queued = self.ops.len();
        let world = tokio::task::spawn_blocking(move || self.build())
            .await
            .map_err(|e| PhysicsError::InitFailed(e.to_string()))?;
        info!(
            queued,
            colliders = world.colliders().len(),
            "Physics backend initialized"
        );
        Ok(world)
    }

    fn build(self) -> CollisionWorld {
        let mut world = CollisionWorld::new(self.shape);
        let mut rejected = 0usize;
        for op in self.ops {
            let result = match op {
                PendingOp::AddCollider(c) => world.add_collider(c),
                PendingOp::ClearAll => {
                    world.clear_all();
                    Ok(())
                }
                PendingOp::Dimensions { radius, height } => {
                    world.set_player_dimensions(radius, height)
                }
                PendingOp::StepHeight(h) => world.set_step_height(h),
            };
            if let Err(e) = result {
                debug!(error = %e, "Queued physics op rejected");
                rejected += 1;
            }
        }
        if rejected > 0 {
            warn!(rejected, "Some queued physics operations were rejected");
        }
        world
    }
}
