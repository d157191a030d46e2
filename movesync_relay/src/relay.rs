//! Relay implementation.
//!
//! The relay does not simulate anything. It:
//! - performs the `Hello` / `Welcome` handshake and assigns identities,
//! - rewrites the `id` of every incoming `PlayerUpdate` to the sender's id,
//! - forwards the update to every other connected peer,
//! - forgets a peer as soon as its connection ends.
//!
//! A slow peer never stalls the others: each peer has a bounded outbound
//! queue and updates that do not fit are dropped for that peer only.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Context};
use bytes::Bytes;
use movesync_shared::net::{
    decode_from_bytes, encode_frame, read_frame, PeerId, RelayMsg, ReliableConn, ReliableListener,
    PROTOCOL_VERSION,
};
use tokio::{io::AsyncWriteExt, net::tcp::OwnedWriteHalf, sync::mpsc, task::JoinHandle};
use tracing::{debug, info, trace, warn};

const PEER_QUEUE: usize = 128;

#[derive(Default)]
struct RelayState {
    peers: Mutex<HashMap<PeerId, mpsc::Sender<Bytes>>>,
    next_id: AtomicU32,
    forwarded: AtomicU64,
}

impl RelayState {
    fn register(&self, tx: mpsc::Sender<Bytes>) -> PeerId {
        let id = PeerId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        self.lock_peers().insert(id, tx);
        id
    }

    fn unregister(&self, id: PeerId) {
        self.lock_peers().remove(&id);
    }

    fn lock_peers(&self) -> std::sync::MutexGuard<'_, HashMap<PeerId, mpsc::Sender<Bytes>>> {
        // A poisoned map is still structurally valid.
        self.peers.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queues `frame` for every peer except `from`.
    fn forward(&self, from: PeerId, frame: &Bytes) {
        let peers = self.lock_peers();
        for (id, tx) in peers.iter().filter(|(id, _)| **id != from) {
            match tx.try_send(frame.clone()) {
                Ok(()) => {
                    self.forwarded.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => debug!(to = %id, error = %e, "Dropped forward"),
            }
        }
    }
}

/// Pose relay.
pub struct Relay {
    listener: ReliableListener,
    state: Arc<RelayState>,
}

impl Relay {
    pub async fn bind(addr: SocketAddr) -> anyhow::Result<Self> {
        let listener = ReliableListener::bind(addr).await?;
        Ok(Self {
            listener,
            state: Arc::new(RelayState::default()),
        })
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Connected peers.
    pub fn peer_count(&self) -> usize {
        self.state.lock_peers().len()
    }

    /// Total frames queued to peers so far.
    pub fn forwarded(&self) -> u64 {
        self.state.forwarded.load(Ordering::Relaxed)
    }

    /// Accepts peers until the listener fails.
    pub async fn run(&self) -> anyhow::Result<()> {
        loop {
            let (conn, addr) = self.listener.accept().await?;
            let state = Arc::clone(&self.state);
            tokio::spawn(async move {
                if let Err(e) = serve_peer(conn, addr, state).await {
                    warn!(%addr, error = %e, "Peer session ended with error");
                }
            });
        }
    }

    /// Runs the accept loop in the background.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            if let Err(e) = self.run().await {
                warn!(error = %e, "Relay accept loop stopped");
            }
        })
    }
}

async fn serve_peer(
    mut conn: ReliableConn,
    addr: SocketAddr,
    state: Arc<RelayState>,
) -> anyhow::Result<()> {
    match conn.recv().await.context("handshake")? {
        RelayMsg::Hello { protocol } if protocol == PROTOCOL_VERSION => {}
        RelayMsg::Hello { protocol } => {
            bail!("protocol mismatch: peer {protocol}, relay {PROTOCOL_VERSION}")
        }
        other => bail!("unexpected handshake msg: {other:?}"),
    }

    let (tx, rx) = mpsc::channel(PEER_QUEUE);
    let id = state.register(tx.clone());
    // Welcome goes through the same queue so it precedes any forwarded update.
    let welcome = encode_frame(&RelayMsg::Welcome { id })?;
    if tx.try_send(welcome).is_err() {
        state.unregister(id);
        bail!("peer queue closed before welcome");
    }
    drop(tx);
    info!(peer = %id, %addr, "Peer connected");

    let (mut reader, writer) = conn.into_split();
    let writer_task = tokio::spawn(write_frames(writer, rx));

    let result = loop {
        let payload = match read_frame(&mut reader).await {
            Ok(Some(payload)) => payload,
            Ok(None) => break Ok(()),
            Err(e) => break Err(e),
        };
        match decode_from_bytes(&payload) {
            Ok(RelayMsg::PlayerUpdate(mut update)) => {
                update.id = id;
                match encode_frame(&RelayMsg::PlayerUpdate(update)) {
                    Ok(frame) => state.forward(id, &frame),
                    Err(e) => warn!(peer = %id, error = %e, "Could not re-encode update"),
                }
            }
            Ok(other) => trace!(peer = %id, ?other, "Ignoring message"),
            Err(e) => warn!(peer = %id, len = payload.len(), error = %e, "Dropping malformed frame"),
        }
    };

    state.unregister(id);
    writer_task.abort();
    info!(peer = %id, "Peer disconnected");
    result
}

async fn write_frames(mut writer: OwnedWriteHalf, mut rx: mpsc::Receiver<Bytes>) {
    while let Some(frame) = rx.recv().await {
        if let Err(e) = writer.write_all(&frame).await {
            debug!(error = %e, "Peer write failed");
            return;
        }
    }
}

/// Helper for tests: bind to an ephemeral localhost port and start serving.
pub async fn bind_ephemeral() -> anyhow::Result<(SocketAddr, JoinHandle<()>)> {
    let relay = Relay::bind(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0)).await?;
    let addr = relay.local_addr()?;
    Ok((addr, relay.spawn()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use movesync_shared::{
        math::Vec3,
        net::PlayerUpdate,
        pose::Pose,
    };

    async fn join(addr: SocketAddr) -> (ReliableConn, PeerId) {
        let mut conn = ReliableConn::connect(addr).await.unwrap();
        conn.send(&RelayMsg::Hello {
            protocol: PROTOCOL_VERSION,
        })
        .await
        .unwrap();
        match conn.recv().await.unwrap() {
            RelayMsg::Welcome { id } => (conn, id),
            other => panic!("expected Welcome, got {other:?}"),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn assigns_distinct_ids() {
        let (addr, _relay) = bind_ephemeral().await.unwrap();
        let (_a, id_a) = join(addr).await;
        let (_b, id_b) = join(addr).await;
        assert_ne!(id_a, id_b);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn forwards_with_sender_id() {
        let (addr, _relay) = bind_ephemeral().await.unwrap();
        let (mut a, id_a) = join(addr).await;
        let (mut b, _id_b) = join(addr).await;

        // Claimed id is ignored; the relay stamps the sender's own.
        let update = PlayerUpdate::from_pose(PeerId(999), &Pose::new(Vec3::new(1.0, 2.0, 3.0), 0.5, 0.0));
        a.send(&RelayMsg::PlayerUpdate(update)).await.unwrap();

        let got = tokio::time::timeout(std::time::Duration::from_secs(2), b.recv())
            .await
            .expect("forward timed out")
            .unwrap();
        match got {
            RelayMsg::PlayerUpdate(u) => {
                assert_eq!(u.id, id_a);
                assert_eq!(u.position, Vec3::new(1.0, 2.0, 3.0));
            }
            other => panic!("expected PlayerUpdate, got {other:?}"),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn rejects_wrong_protocol() {
        let (addr, _relay) = bind_ephemeral().await.unwrap();
        let mut conn = ReliableConn::connect(addr).await.unwrap();
        conn.send(&RelayMsg::Hello { protocol: 0 }).await.unwrap();
        let res = tokio::time::timeout(std::time::Duration::from_secs(2), conn.recv())
            .await
            .expect("relay should close the connection");
        assert!(res.is_err());
    }
}
