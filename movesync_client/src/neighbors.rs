//! Remote peer state.
//!
//! [`InboundQueue`] keeps at most one pending update per sender; a newer
//! update from the same id replaces the pending one. [`InboundQueue::drain`]
//! moves every pending update into the [`NeighborTable`] in one pass, so each
//! id is applied at most once per drain tick no matter how noisy it is.

use std::collections::HashMap;
use std::time::Instant;

use movesync_shared::{
    net::{PeerId, PlayerUpdate},
    pose::{PlayerState, RoomCoord},
};
use tracing::trace;

/// One remote peer.
#[derive(Debug, Clone, PartialEq)]
pub struct NeighborEntry {
    pub state: PlayerState,
    pub last_applied: Instant,
    /// Number of updates applied to this entry.
    pub applied: u64,
}

/// Latest known state of every remote peer.
#[derive(Debug, Clone, Default)]
pub struct NeighborTable {
    entries: HashMap<PeerId, NeighborEntry>,
}

impl NeighborTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a decoded update, creating the entry on first sight.
    pub fn apply(&mut self, update: PlayerUpdate, now: Instant) {
        let id = update.id;
        let pose = update.pose();
        match self.entries.get_mut(&id) {
            Some(entry) => {
                entry.state.pose = pose;
                if let Some(room) = update.room {
                    entry.state.room = room;
                }
                entry.state.targets = update.targets_info;
                entry.last_applied = entry.last_applied.max(now);
                entry.applied += 1;
            }
            None => {
                let mut state = PlayerState::new(id, pose, update.room.unwrap_or_default());
                state.targets = update.targets_info;
                self.entries.insert(
                    id,
                    NeighborEntry {
                        state,
                        last_applied: now,
                        applied: 1,
                    },
                );
            }
        }
    }

    pub fn get(&self, id: PeerId) -> Option<&NeighborEntry> {
        self.entries.get(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PeerId, &NeighborEntry)> {
        self.entries.iter()
    }

    /// Peer ids in ascending order.
    pub fn ids(&self) -> Vec<PeerId> {
        let mut ids: Vec<PeerId> = self.entries.keys().copied().collect();
        ids.sort();
        ids
    }
}

/// Per-sender coalescing slot map.
#[derive(Debug, Default)]
pub struct InboundQueue {
    pending: HashMap<PeerId, PlayerUpdate>,
    coalesced: u64,
}

impl InboundQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `update` as the pending one for its sender.
    pub fn push(&mut self, update: PlayerUpdate) {
        if self.pending.insert(update.id, update).is_some() {
            self.coalesced += 1;
        }
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Updates overwritten before they were applied.
    pub fn coalesced(&self) -> u64 {
        self.coalesced
    }

    /// Applies every pending update to `table` and clears the slots.
    /// Returns how many were applied.
    pub fn drain(&mut self, now: Instant, table: &mut NeighborTable) -> usize {
        let applied = self.pending.len();
        for (id, update) in self.pending.drain() {
            trace!(peer = %id, "Applying neighbor update");
            table.apply(update, now);
        }
        applied
    }
}
