//! SFU Manager - the session facade used by the signaling layer
//!
//! This module provides:
//! - The single entry point for every room, transport, producer and consumer
//!   operation
//! - Snapshot persistence after membership and producer changes
//! - Runtime statistics and graceful shutdown

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cascade::TeardownSummary;
use crate::config::{Config, SfuConfig};
use crate::consumer::{ConsumerDescriptor, ConsumerLifecycle};
use crate::engine::{self, EngineAdapter, EngineMode, EngineProbe};
use crate::error::Result;
use crate::producer::{ProducerDescriptor, ProducerLifecycle, ProducerSummary};
use crate::registry::{RegistryStats, SfuContext};
use crate::room::{JoinedRoom, MediaState, PeerMediaState, RoomLifecycle};
use crate::rtp::{DtlsParameters, MediaKind, RtpCapabilities, RtpParameters, TransportDirection};
use crate::logging;
use crate::snapshot::{RoomSnapshot, SnapshotScheduler, SnapshotStore};
use crate::store::{KeyValueStore, MemoryKeyValueStore, RedisKeyValueStore};
use crate::transport::{TransportDescriptor, TransportLifecycle};
use crate::types::{ConnectionId, ProducerId, RoomId, TransportId, UserId};

/// Engine status and resource counts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeInfo {
    pub engine_available: bool,
    pub engine_mode: EngineMode,
    pub stats: RegistryStats,
}

pub struct SfuManager {
    ctx: SfuContext,
    rooms: RoomLifecycle,
    transports: TransportLifecycle,
    producers: ProducerLifecycle,
    consumers: ConsumerLifecycle,

    /// `None` when snapshot persistence is disabled
    snapshots: Option<SnapshotScheduler>,
}

impl SfuManager {
    pub fn new(
        engine: Arc<dyn EngineAdapter>,
        config: SfuConfig,
        snapshots: Option<SnapshotStore>,
    ) -> Arc<Self> {
        let ctx = SfuContext::new(engine, config);
        let snapshots = snapshots.map(|store| SnapshotScheduler::new(ctx.registry.clone(), store));

        // Producers the engine closes on its own still refresh the room's snapshot
        let ctx = match &snapshots {
            Some(scheduler) => {
                let scheduler = scheduler.clone();
                ctx.with_room_changed_hook(Arc::new(move |room_id: &RoomId| scheduler.schedule(room_id)))
            }
            None => ctx,
        };
        let rooms = RoomLifecycle::new(ctx.clone());

        let manager = Arc::new(Self {
            transports: TransportLifecycle::new(ctx.clone(), rooms.clone()),
            producers: ProducerLifecycle::new(ctx.clone()),
            consumers: ConsumerLifecycle::new(ctx.clone()),
            rooms,
            snapshots,
            ctx,
        });

        info!(
            engine_mode = ?manager.ctx.engine.mode(),
            max_rooms = manager.ctx.config.max_rooms,
            max_peers_per_room = manager.ctx.config.max_peers_per_room,
            snapshots = manager.snapshots.is_some(),
            "SFU Manager initialized"
        );

        manager
    }

    /// Validate the configuration, install logging, probe the media engine
    /// once and wire up the snapshot backend.
    ///
    /// Logging setup is skipped when the host process already installed a
    /// global subscriber.
    pub async fn bootstrap(config: &Config, probe: Option<EngineProbe>) -> Result<Arc<Self>> {
        config.validate()?;
        if let Err(e) = logging::init_logging(&config.logging) {
            debug!(error = %e, "Keeping the existing tracing subscriber");
        }

        let engine = engine::initialize(config.sfu.enable_media_engine, probe).await;

        let snapshots = if config.snapshot.enabled {
            let store: Arc<dyn KeyValueStore> = match &config.redis.url {
                Some(url) => Arc::new(RedisKeyValueStore::open(url)?),
                None => {
                    info!("No Redis configured, keeping room snapshots in memory");
                    Arc::new(MemoryKeyValueStore::new())
                }
            };
            Some(SnapshotStore::new(store, &config.snapshot))
        } else {
            None
        };

        Ok(Self::new(engine, config.sfu.clone(), snapshots))
    }

    fn schedule_snapshot(&self, room_id: &RoomId) {
        if let Some(scheduler) = &self.snapshots {
            scheduler.schedule(room_id);
        }
    }

    pub fn runtime_info(&self) -> RuntimeInfo {
        RuntimeInfo {
            engine_available: self.ctx.engine.is_available(),
            engine_mode: self.ctx.engine.mode(),
            stats: self.ctx.registry.read().stats(),
        }
    }

    /// Capabilities clients load their device with. With a room and a live
    /// engine this creates the room's router on first use.
    pub async fn router_rtp_capabilities(&self, room_id: Option<&RoomId>) -> RtpCapabilities {
        if let Some(room_id) = room_id {
            if let Err(e) = self.rooms.ensure_router(room_id).await {
                warn!(room_id = %room_id, error = %e, "Failed to create router, advertising fallback capabilities");
            }
        }
        self.rooms.router_capabilities(room_id)
    }

    pub async fn join_room(
        &self,
        room_id: &RoomId,
        user_id: &UserId,
        connection_id: ConnectionId,
    ) -> Result<JoinedRoom> {
        let joined = self.rooms.join_room(room_id, user_id, connection_id)?;
        self.schedule_snapshot(room_id);
        Ok(joined)
    }

    pub async fn leave_room(&self, room_id: &RoomId, user_id: &UserId) -> TeardownSummary {
        let summary = self.rooms.leave_room(room_id, user_id);
        self.schedule_snapshot(room_id);
        summary
    }

    /// Used when a signaling connection drops without saying which rooms it was in
    pub async fn leave_user_from_all_rooms(&self, user_id: &UserId) -> Vec<RoomId> {
        let room_ids = self.rooms.leave_user_from_all_rooms(user_id);
        for room_id in &room_ids {
            self.schedule_snapshot(room_id);
        }
        room_ids
    }

    pub async fn create_transport(
        &self,
        room_id: &RoomId,
        user_id: &UserId,
        direction: TransportDirection,
    ) -> Result<TransportDescriptor> {
        self.transports
            .create_transport(room_id, user_id, direction)
            .await
    }

    pub async fn connect_transport(
        &self,
        transport_id: &TransportId,
        dtls_parameters: DtlsParameters,
    ) -> Result<()> {
        self.transports
            .connect_transport(transport_id, dtls_parameters)
            .await
    }

    pub async fn produce(
        &self,
        room_id: &RoomId,
        user_id: &UserId,
        transport_id: &TransportId,
        kind: MediaKind,
        rtp_parameters: RtpParameters,
        app_data: Option<Value>,
    ) -> Result<ProducerDescriptor> {
        let producer = self
            .producers
            .produce(room_id, user_id, transport_id, kind, rtp_parameters, app_data)
            .await?;
        self.schedule_snapshot(room_id);
        Ok(producer)
    }

    pub async fn consume(
        &self,
        room_id: &RoomId,
        user_id: &UserId,
        transport_id: &TransportId,
        producer_id: &ProducerId,
        rtp_capabilities: &RtpCapabilities,
    ) -> Result<ConsumerDescriptor> {
        self.consumers
            .consume(room_id, user_id, transport_id, producer_id, rtp_capabilities)
            .await
    }

    pub async fn close_producer(
        &self,
        room_id: &RoomId,
        user_id: &UserId,
        producer_id: &ProducerId,
    ) -> bool {
        let closed = self.producers.close_producer(room_id, user_id, producer_id);
        self.schedule_snapshot(room_id);
        closed
    }

    pub async fn close_user_producers(&self, room_id: &RoomId, user_id: &UserId) -> Vec<ProducerId> {
        let closed = self.producers.close_user_producers(room_id, user_id);
        self.schedule_snapshot(room_id);
        closed
    }

    pub fn list_room_producers(
        &self,
        room_id: &RoomId,
        except_user_id: Option<&UserId>,
    ) -> Vec<ProducerSummary> {
        self.producers.list_room_producers(room_id, except_user_id)
    }

    pub fn user_media_state(&self, room_id: &RoomId, user_id: &UserId) -> MediaState {
        self.rooms.user_media_state(room_id, user_id)
    }

    pub fn list_room_media_states(
        &self,
        room_id: &RoomId,
        except_user_id: Option<&UserId>,
    ) -> Vec<PeerMediaState> {
        self.rooms.list_room_media_states(room_id, except_user_id)
    }

    /// Signaling connection currently bound to the peer
    pub fn peer_socket_id(&self, room_id: &RoomId, user_id: &UserId) -> Option<ConnectionId> {
        self.rooms.peer_connection_id(room_id, user_id)
    }

    /// Last persisted snapshot of a room. Store failures read as "no snapshot".
    pub async fn persisted_room_snapshot(&self, room_id: &RoomId) -> Option<RoomSnapshot> {
        let scheduler = self.snapshots.as_ref()?;
        match scheduler.store().load(room_id).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(room_id = %room_id, error = %e, "Failed to read room snapshot");
                None
            }
        }
    }

    pub fn room_ids(&self) -> Vec<RoomId> {
        self.rooms.room_ids()
    }

    /// Wait until every snapshot task scheduled so far has finished
    pub async fn wait_for_snapshots(&self) {
        if let Some(scheduler) = &self.snapshots {
            scheduler.flush().await;
        }
    }

    /// Tear down every room and flush pending snapshot writes.
    ///
    /// Snapshots of the torn-down rooms are left in the store so a restarted
    /// node can still serve them until they expire.
    pub async fn shutdown(&self) {
        let rooms: Vec<(RoomId, Vec<UserId>)> = {
            let registry = self.ctx.registry.read();
            registry
                .rooms
                .values()
                .map(|room| (room.id.clone(), room.peer_ids()))
                .collect()
        };

        let room_count = rooms.len();
        for (room_id, peers) in rooms {
            for user_id in peers {
                self.rooms.leave_room(&room_id, &user_id);
            }
        }

        self.wait_for_snapshots().await;
        info!(rooms_closed = room_count, "SFU Manager shut down");
    }
}
