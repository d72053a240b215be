//! Room snapshot persistence
//!
//! A snapshot is a best-effort projection of a room's membership and per-user
//! media state, written to the key-value store after every membership or
//! producer change. The in-memory registry stays authoritative; snapshots only
//! serve crash recovery and late-joiner catch-up.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use crate::config::SnapshotConfig;
use crate::error::Result;
use crate::registry::{ResourceRegistry, SharedRegistry};
use crate::room::{media_state_of, MediaState};
use crate::store::KeyValueStore;
use crate::types::{RoomId, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub room_id: RoomId,
    pub peers: Vec<UserId>,
    pub media_states: BTreeMap<UserId, MediaState>,
    /// Epoch milliseconds
    pub updated_at: i64,
}

impl RoomSnapshot {
    /// Project a room from the registry; `None` when the room has no peers
    pub fn capture(registry: &ResourceRegistry, room_id: &RoomId) -> Option<Self> {
        let room = registry.rooms.get(room_id)?;
        if room.peers.is_empty() {
            return None;
        }

        let peers = room.peer_ids();
        let media_states = peers
            .iter()
            .map(|user_id| (user_id.clone(), media_state_of(registry, room_id, user_id)))
            .collect();

        Some(Self {
            room_id: room_id.clone(),
            peers,
            media_states,
            updated_at: chrono::Utc::now().timestamp_millis(),
        })
    }
}

#[derive(Clone)]
pub struct SnapshotStore {
    store: Arc<dyn KeyValueStore>,
    key_prefix: String,
    ttl_seconds: u64,
}

impl SnapshotStore {
    pub fn new(store: Arc<dyn KeyValueStore>, config: &SnapshotConfig) -> Self {
        Self {
            store,
            key_prefix: config.key_prefix.clone(),
            ttl_seconds: config.ttl_seconds,
        }
    }

    pub fn key(&self, room_id: &RoomId) -> String {
        format!("{}:room:{}:snapshot", self.key_prefix, room_id)
    }

    pub async fn persist(&self, snapshot: &RoomSnapshot) -> Result<()> {
        let json = serde_json::to_string(snapshot)?;
        self.store
            .set(&self.key(&snapshot.room_id), &json, self.ttl_seconds)
            .await
    }

    pub async fn delete(&self, room_id: &RoomId) -> Result<()> {
        self.store.del(&self.key(room_id)).await
    }

    pub async fn load(&self, room_id: &RoomId) -> Result<Option<RoomSnapshot>> {
        match self.store.get(&self.key(room_id)).await? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Write the snapshot, or delete the key when the room is gone or empty.
    /// Failures are logged and swallowed.
    pub async fn sync_room(&self, room_id: &RoomId, snapshot: Option<RoomSnapshot>) {
        let result = match &snapshot {
            Some(snapshot) => self.persist(snapshot).await,
            None => self.delete(room_id).await,
        };

        match result {
            Ok(()) => debug!(
                room_id = %room_id,
                deleted = snapshot.is_none(),
                "Room snapshot synced"
            ),
            Err(e) => warn!(room_id = %room_id, error = %e, "Failed to sync room snapshot"),
        }
    }
}

/// Background snapshot refreshes, serialized per room.
///
/// Each task holds its room's lock from reading the registry until the store
/// write completes, so the last write for a room always reflects a registry
/// read taken after the last change that scheduled it.
#[derive(Clone)]
pub struct SnapshotScheduler {
    registry: SharedRegistry,
    store: SnapshotStore,
    tasks: TaskTracker,
    room_locks: Arc<DashMap<RoomId, Arc<Mutex<()>>>>,
}

impl SnapshotScheduler {
    pub fn new(registry: SharedRegistry, store: SnapshotStore) -> Self {
        Self {
            registry,
            store,
            tasks: TaskTracker::new(),
            room_locks: Arc::new(DashMap::new()),
        }
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    pub fn schedule(&self, room_id: &RoomId) {
        let lock = self
            .room_locks
            .entry(room_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let scheduler = self.clone();
        let room_id = room_id.clone();

        self.tasks.spawn(async move {
            {
                let _guard = lock.lock().await;
                let snapshot = {
                    let registry = scheduler.registry.read();
                    RoomSnapshot::capture(&registry, &room_id)
                };
                scheduler.store.sync_room(&room_id, snapshot).await;
            }

            drop(lock);
            scheduler
                .room_locks
                .remove_if(&room_id, |_, lock| Arc::strong_count(lock) == 1);
        });
    }

    /// Wait until every refresh scheduled so far has finished
    pub async fn flush(&self) {
        self.tasks.close();
        self.tasks.wait().await;
        self.tasks.reopen();
    }
}
