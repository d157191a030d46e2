//! Shared helpers for the integration tests.

use std::future::Future;
use std::time::Duration;

use movesync_shared::{
    collision::{CapsuleShape, CollisionWorld},
    geometry::{Collider, ColliderOwner},
    math::Vec3,
};

/// Installs a test-writer subscriber once per process.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_test_writer()
        .try_init();
}

/// Polls `check` until it returns `Some` or `timeout` elapses.
pub async fn wait_until<T, F, Fut>(timeout: Duration, mut check: F) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if let Some(v) = check().await {
            return Some(v);
        }
        if tokio::time::Instant::now() >= deadline {
            return None;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// World with a large floor whose top face sits at y = 0.
pub fn flat_world() -> CollisionWorld {
    let mut world = CollisionWorld::new(CapsuleShape::default());
    world
        .add_collider(Collider::new(
            Vec3::new(-50.0, -1.0, -50.0),
            Vec3::new(50.0, 0.0, 50.0),
            ColliderOwner(1),
        ))
        .expect("valid floor");
    world
}
