use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use dashmap::DashMap;
use serde::Serialize;
use uuid::Uuid;

/// Consoles currently connected to this peer.
///
/// Replies go only to the connection that sent the command, so the registry
/// is bookkeeping for stats and metrics rather than a broadcast fan-out.
#[derive(Clone, Default)]
pub struct PeerRegistry {
    inner: Arc<DashMap<Uuid, ConnectionEntry>>,
}

struct ConnectionEntry {
    connected_at: Instant,
    commands: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PeerSnapshot {
    pub connection_id: Uuid,
    pub connected_for_secs: u64,
    pub commands: u64,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of active connections after insertion.
    pub fn register(&self, connection_id: Uuid) -> usize {
        self.inner.insert(
            connection_id,
            ConnectionEntry {
                connected_at: Instant::now(),
                commands: AtomicU64::new(0),
            },
        );
        self.inner.len()
    }

    /// Returns the number of active connections after removal.
    pub fn unregister(&self, connection_id: Uuid) -> usize {
        self.inner.remove(&connection_id);
        self.inner.len()
    }

    pub fn record_command(&self, connection_id: Uuid) {
        if let Some(entry) = self.inner.get(&connection_id) {
            entry.commands.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn snapshot(&self) -> Vec<PeerSnapshot> {
        let now = Instant::now();
        let mut peers: Vec<PeerSnapshot> = self
            .inner
            .iter()
            .map(|entry| PeerSnapshot {
                connection_id: *entry.key(),
                connected_for_secs: now
                    .checked_duration_since(entry.connected_at)
                    .unwrap_or(Duration::ZERO)
                    .as_secs(),
                commands: entry.commands.load(Ordering::Relaxed),
            })
            .collect();
        peers.sort_by_key(|peer| peer.connection_id);
        peers
    }
}
