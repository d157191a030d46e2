//! Peer synchronization channel.
//!
//! One persistent TCP connection to the relay. A single owner task holds all
//! inbound state (the coalescing [`InboundQueue`] and the [`NeighborTable`])
//! and multiplexes three inputs with `select!`:
//! - decoded frames from a small reader task (framing only),
//! - the drain interval, which applies pending updates to the table,
//! - the outbound queue fed by [`PeerChannel::send_player_update`].
//!
//! Observers never touch that state directly. Connection state, the assigned
//! identity and neighbor snapshots are published through `watch` channels.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use movesync_shared::{
    config::InboundConfig,
    net::{
        decode_from_bytes, read_frame, write_frame, PeerId, PlayerUpdate, RelayMsg, ReliableConn,
        PROTOCOL_VERSION,
    },
};
use tokio::{
    net::tcp::OwnedReadHalf,
    sync::{mpsc, watch, Notify},
    time::MissedTickBehavior,
};
use tracing::{debug, info, trace, warn};

use crate::neighbors::{InboundQueue, NeighborTable};

const OUTBOUND_CAPACITY: usize = 64;
const INBOUND_FRAME_CAPACITY: usize = 256;

/// Connection lifecycle. Reconnecting is up to the owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

struct Publishers {
    state: watch::Sender<ConnectionState>,
    id: watch::Sender<Option<PeerId>>,
    neighbors: watch::Sender<Arc<NeighborTable>>,
}

/// Handle to the channel task.
pub struct PeerChannel {
    outbound: mpsc::Sender<PlayerUpdate>,
    state_rx: watch::Receiver<ConnectionState>,
    id_rx: watch::Receiver<Option<PeerId>>,
    neighbors_rx: watch::Receiver<Arc<NeighborTable>>,
    shutdown: Arc<Notify>,
}

impl PeerChannel {
    /// Starts connecting to `addr` in the background.
    ///
    /// Returns immediately in [`ConnectionState::Connecting`]. A failed
    /// connect moves straight to [`ConnectionState::Closed`], as does an
    /// inbound config without a usable drain rate.
    pub fn spawn(addr: SocketAddr, cfg: &InboundConfig) -> Self {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let (id_tx, id_rx) = watch::channel(None);
        let (neighbors_tx, neighbors_rx) = watch::channel(Arc::new(NeighborTable::new()));
        let (outbound, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);

        let publishers = Publishers {
            state: state_tx,
            id: id_tx,
            neighbors: neighbors_tx,
        };
        let shutdown = Arc::new(Notify::new());
        match cfg.drain_period() {
            Some(drain_period) => {
                let task_shutdown = Arc::clone(&shutdown);
                tokio::spawn(async move {
                    run(addr, drain_period, publishers, outbound_rx, task_shutdown).await;
                });
            }
            None => {
                warn!(
                    %addr,
                    max_dequeue_hz = cfg.max_dequeue_hz,
                    "Rejected inbound drain rate, channel not started"
                );
                publishers.state.send_replace(ConnectionState::Closed);
            }
        }

        Self {
            outbound,
            state_rx,
            id_rx,
            neighbors_rx,
            shutdown,
        }
    }

    /// Connects and waits for the relay to assign an identity.
    pub async fn connect(addr: SocketAddr, cfg: &InboundConfig) -> anyhow::Result<Self> {
        let channel = Self::spawn(addr, cfg);
        match channel.ready().await {
            Some(id) => {
                debug!(peer = %id, %addr, "Channel ready");
                Ok(channel)
            }
            None => anyhow::bail!("relay at {addr} closed before assigning an id"),
        }
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    pub fn is_open(&self) -> bool {
        self.connection_state() == ConnectionState::Open
    }

    /// Identity assigned by the relay, once known.
    pub fn peer_id(&self) -> Option<PeerId> {
        *self.id_rx.borrow()
    }

    /// Resolves with the assigned id, or `None` if the channel closed first.
    pub async fn ready(&self) -> Option<PeerId> {
        let mut id_rx = self.id_rx.clone();
        let mut state_rx = self.state_rx.clone();
        tokio::select! {
            res = id_rx.wait_for(Option::is_some) => match res {
                Ok(id) => *id,
                Err(_) => None,
            },
            _ = state_rx.wait_for(|s| *s == ConnectionState::Closed) => self.peer_id(),
        }
    }

    /// Runs `callback` once with the assigned id; immediately if already known.
    pub fn on_ready<F>(&self, callback: F)
    where
        F: FnOnce(PeerId) + Send + 'static,
    {
        if let Some(id) = self.peer_id() {
            callback(id);
            return;
        }
        let mut id_rx = self.id_rx.clone();
        tokio::spawn(async move {
            let id = match id_rx.wait_for(Option::is_some).await {
                Ok(id) => *id,
                Err(_) => return,
            };
            if let Some(id) = id {
                callback(id);
            }
        });
    }

    /// Queues a pose update. A silent no-op unless the channel is open.
    pub fn send_player_update(&self, mut update: PlayerUpdate) {
        if !self.is_open() {
            trace!("Dropping update, channel not open");
            return;
        }
        if let Some(id) = self.peer_id() {
            update.id = id;
        }
        if let Err(e) = self.outbound.try_send(update) {
            debug!(error = %e, "Outbound queue unavailable, update dropped");
        }
    }

    /// Latest neighbor snapshot published by the drain tick.
    pub fn neighbors(&self) -> Arc<NeighborTable> {
        Arc::clone(&self.neighbors_rx.borrow())
    }

    /// Waits until a published snapshot satisfies `pred`.
    pub async fn wait_for_neighbors<P>(&self, mut pred: P) -> Option<Arc<NeighborTable>>
    where
        P: FnMut(&NeighborTable) -> bool,
    {
        let mut rx = self.neighbors_rx.clone();
        let result = rx.wait_for(|table| pred(table)).await;
        result.ok().map(|table| Arc::clone(&table))
    }

    /// Asks the channel task to stop. The state moves to `Closed`.
    pub fn close(&self) {
        self.shutdown.notify_one();
    }
}

async fn run(
    addr: SocketAddr,
    drain_period: std::time::Duration,
    publishers: Publishers,
    outbound_rx: mpsc::Receiver<PlayerUpdate>,
    shutdown: Arc<Notify>,
) {
    if let Err(e) = serve(addr, drain_period, &publishers, outbound_rx, &shutdown).await {
        warn!(%addr, error = %e, "Relay channel failed");
    }
    publishers.state.send_replace(ConnectionState::Closed);
    info!(%addr, "Relay channel closed");
}

async fn serve(
    addr: SocketAddr,
    drain_period: std::time::Duration,
    publishers: &Publishers,
    mut outbound_rx: mpsc::Receiver<PlayerUpdate>,
    shutdown: &Notify,
) -> anyhow::Result<()> {
    let conn = ReliableConn::connect(addr).await?;
    let (reader, mut writer) = conn.into_split();
    write_frame(
        &mut writer,
        &RelayMsg::Hello {
            protocol: PROTOCOL_VERSION,
        },
    )
    .await?;
    publishers.state.send_replace(ConnectionState::Open);
    info!(%addr, "Connected to relay");

    let (frames_tx, mut frames_rx) = mpsc::channel(INBOUND_FRAME_CAPACITY);
    let reader_task = tokio::spawn(read_frames(reader, frames_tx));

    let mut queue = InboundQueue::new();
    let mut table = NeighborTable::new();
    let mut drain = tokio::time::interval(drain_period);
    drain.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let result = loop {
        tokio::select! {
            frame = frames_rx.recv() => match frame {
                Some(payload) => handle_payload(&payload, &mut queue, publishers),
                None => {
                    debug!("Relay stream ended");
                    break Ok(());
                }
            },
            _ = drain.tick() => {
                let applied = queue.drain(Instant::now(), &mut table);
                if applied > 0 {
                    trace!(applied, neighbors = table.len(), "Drain tick");
                    publishers.neighbors.send_replace(Arc::new(table.clone()));
                }
            },
            update = outbound_rx.recv() => match update {
                Some(update) => {
                    if let Err(e) = write_frame(&mut writer, &RelayMsg::PlayerUpdate(update)).await {
                        break Err(e);
                    }
                }
                None => {
                    debug!("Channel handle dropped");
                    break Ok(());
                }
            },
            _ = shutdown.notified() => {
                debug!("Channel closed by owner");
                break Ok(());
            }
        }
    };
    reader_task.abort();
    result
}

/// Reads raw frames until the stream ends or breaks.
async fn read_frames(mut reader: OwnedReadHalf, frames: mpsc::Sender<Vec<u8>>) {
    loop {
        match read_frame(&mut reader).await {
            Ok(Some(payload)) => {
                if frames.send(payload).await.is_err() {
                    return;
                }
            }
            Ok(None) => return,
            Err(e) => {
                warn!(error = %e, "Relay read failed");
                return;
            }
        }
    }
}

fn handle_payload(payload: &[u8], queue: &mut InboundQueue, publishers: &Publishers) {
    match decode_from_bytes(payload) {
        Ok(RelayMsg::PlayerUpdate(update)) => {
            if update.is_finite() {
                queue.push(update);
            } else {
                warn!(peer = %update.id, "Dropping non-finite player update");
            }
        }
        Ok(RelayMsg::Welcome { id }) => {
            info!(peer = %id, "Relay assigned identity");
            publishers.id.send_replace(Some(id));
        }
        Ok(other) => trace!(?other, "Ignoring relay message"),
        Err(e) => warn!(len = payload.len(), error = %e, "Dropping malformed relay frame"),
    }
}
