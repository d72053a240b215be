//! In-memory resource registry
//!
//! Authoritative arena of rooms, transports, producers and consumers while the
//! process is alive. Rooms own their peers; the flat resource maps are keyed by
//! id and every record points back at the `(room, user)` that owns it.
//!
//! Only the lifecycle components mutate the registry, always through a
//! `parking_lot` write lock that is never held across an `.await`.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::config::SfuConfig;
use crate::engine::{ConsumerHandle, EngineAdapter, ProducerHandle, RouterHandle, TransportHandle};
use crate::rtp::{DtlsParameters, MediaKind, RtpParameters, TransportDirection};
use crate::types::{ConnectionId, ConsumerId, ProducerId, RoomId, TransportId, UserId};

pub type SharedRegistry = Arc<RwLock<ResourceRegistry>>;

/// Called after a room's membership or producers change outside a facade call
pub type RoomChangedHook = Arc<dyn Fn(&RoomId) + Send + Sync>;

pub struct Room {
    pub id: RoomId,
    pub peers: HashMap<UserId, Peer>,
    pub router: Option<RouterHandle>,
    pub created_at: DateTime<Utc>,
}

impl Room {
    pub fn new(id: RoomId) -> Self {
        Self {
            id,
            peers: HashMap::new(),
            router: None,
            created_at: Utc::now(),
        }
    }

    /// User ids of every peer, sorted
    pub fn peer_ids(&self) -> Vec<UserId> {
        let mut ids: Vec<UserId> = self.peers.keys().cloned().collect();
        ids.sort();
        ids
    }
}

pub struct Peer {
    pub user_id: UserId,
    pub connection_id: ConnectionId,
    pub transport_ids: HashSet<TransportId>,
    pub producer_ids: HashSet<ProducerId>,
    pub consumer_ids: HashSet<ConsumerId>,
    pub joined_at: DateTime<Utc>,
}

impl Peer {
    pub fn new(user_id: UserId, connection_id: ConnectionId) -> Self {
        Self {
            user_id,
            connection_id,
            transport_ids: HashSet::new(),
            producer_ids: HashSet::new(),
            consumer_ids: HashSet::new(),
            joined_at: Utc::now(),
        }
    }

    pub fn owns_nothing(&self) -> bool {
        self.transport_ids.is_empty() && self.producer_ids.is_empty() && self.consumer_ids.is_empty()
    }
}

pub struct Transport {
    pub id: TransportId,
    pub room_id: RoomId,
    pub user_id: UserId,
    pub direction: TransportDirection,
    pub connected: bool,
    pub dtls_parameters: Option<DtlsParameters>,
    pub handle: Option<TransportHandle>,
}

pub struct Producer {
    pub id: ProducerId,
    pub room_id: RoomId,
    pub user_id: UserId,
    pub transport_id: TransportId,
    pub kind: MediaKind,
    pub rtp_parameters: RtpParameters,
    pub app_data: Option<Value>,
    pub handle: Option<ProducerHandle>,
}

pub struct Consumer {
    pub id: ConsumerId,
    pub room_id: RoomId,
    pub user_id: UserId,
    pub transport_id: TransportId,
    pub producer_id: ProducerId,
    pub kind: MediaKind,
    pub rtp_parameters: RtpParameters,
    pub handle: Option<ConsumerHandle>,
}

/// Aggregate resource counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryStats {
    pub rooms: usize,
    pub peers: usize,
    pub transports: usize,
    pub producers: usize,
    pub consumers: usize,
}

#[derive(Default)]
pub struct ResourceRegistry {
    pub rooms: HashMap<RoomId, Room>,
    pub transports: HashMap<TransportId, Transport>,
    pub producers: HashMap<ProducerId, Producer>,
    pub consumers: HashMap<ConsumerId, Consumer>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedRegistry {
        Arc::new(RwLock::new(Self::new()))
    }

    pub fn peer(&self, room_id: &RoomId, user_id: &UserId) -> Option<&Peer> {
        self.rooms.get(room_id).and_then(|room| room.peers.get(user_id))
    }

    pub fn peer_mut(&mut self, room_id: &RoomId, user_id: &UserId) -> Option<&mut Peer> {
        self.rooms
            .get_mut(room_id)
            .and_then(|room| room.peers.get_mut(user_id))
    }

    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            rooms: self.rooms.len(),
            peers: self.rooms.values().map(|room| room.peers.len()).sum(),
            transports: self.transports.len(),
            producers: self.producers.len(),
            consumers: self.consumers.len(),
        }
    }
}

/// State shared by the lifecycle components
#[derive(Clone)]
pub struct SfuContext {
    pub registry: SharedRegistry,
    pub engine: Arc<dyn EngineAdapter>,
    pub config: Arc<SfuConfig>,
    pub on_room_changed: Option<RoomChangedHook>,
}

impl SfuContext {
    pub fn new(engine: Arc<dyn EngineAdapter>, config: SfuConfig) -> Self {
        Self {
            registry: ResourceRegistry::shared(),
            engine,
            config: Arc::new(config),
            on_room_changed: None,
        }
    }

    pub fn with_room_changed_hook(mut self, hook: RoomChangedHook) -> Self {
        self.on_room_changed = Some(hook);
        self
    }

    pub fn notify_room_changed(&self, room_id: &RoomId) {
        if let Some(hook) = &self.on_room_changed {
            hook(room_id);
        }
    }
}
