//! Room and peer lifecycle
//!
//! A room exists exactly as long as it has at least one peer: it is created by
//! the first join and destroyed, together with its router, by the last leave.

use serde::{Deserialize, Serialize};
use std::collections::hash_map::Entry;
use tracing::{debug, info};

use crate::cascade::{self, Released, TeardownSummary};
use crate::error::{Error, Result};
use crate::registry::{Peer, ResourceRegistry, Room, SfuContext};
use crate::rtp::{MediaKind, RtpCapabilities};
use crate::types::{ConnectionId, RoomId, UserId};

/// Result of a join
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinedRoom {
    pub room_id: RoomId,
    pub peer_ids: Vec<UserId>,
}

/// Which media a user is currently sending, derived from their live producers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaState {
    pub audio: bool,
    pub video: bool,
    pub screen: bool,
}

impl MediaState {
    fn mark(&mut self, kind: MediaKind) {
        match kind {
            MediaKind::Audio => self.audio = true,
            MediaKind::Video => self.video = true,
            MediaKind::Screen => self.screen = true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerMediaState {
    pub user_id: UserId,
    #[serde(flatten)]
    pub state: MediaState,
}

pub fn media_state_of(registry: &ResourceRegistry, room_id: &RoomId, user_id: &UserId) -> MediaState {
    registry
        .producers
        .values()
        .filter(|producer| &producer.room_id == room_id && &producer.user_id == user_id)
        .fold(MediaState::default(), |mut state, producer| {
            state.mark(producer.kind);
            state
        })
}

/// Return the room, registering a new empty one if needed.
///
/// Only called inside the join critical section, which inserts the peer before
/// the lock is released.
pub fn ensure_room<'a>(
    registry: &'a mut ResourceRegistry,
    room_id: &RoomId,
    max_rooms: usize,
) -> Result<&'a mut Room> {
    let total_rooms = registry.rooms.len();
    match registry.rooms.entry(room_id.clone()) {
        Entry::Occupied(entry) => Ok(entry.into_mut()),
        Entry::Vacant(entry) => {
            if max_rooms > 0 && total_rooms >= max_rooms {
                return Err(Error::RoomLimitReached);
            }
            info!(room_id = %room_id, total_rooms = total_rooms + 1, "Created new room");
            Ok(entry.insert(Room::new(room_id.clone())))
        }
    }
}

#[derive(Clone)]
pub struct RoomLifecycle {
    ctx: SfuContext,
}

impl RoomLifecycle {
    pub fn new(ctx: SfuContext) -> Self {
        Self { ctx }
    }

    /// Join a room, replacing any stale peer the user still has there
    pub fn join_room(
        &self,
        room_id: &RoomId,
        user_id: &UserId,
        connection_id: ConnectionId,
    ) -> Result<JoinedRoom> {
        let mut released = Released::default();
        let (joined, rejoin) = {
            let mut registry = self.ctx.registry.write();
            let rejoin = registry.peer(room_id, user_id).is_some();

            if rejoin {
                cascade::detach_peer_resources(&mut registry, room_id, user_id, &mut released);
            } else if let Some(room) = registry.rooms.get(room_id) {
                let max_peers = self.ctx.config.max_peers_per_room;
                if max_peers > 0 && room.peers.len() >= max_peers {
                    return Err(Error::PeerLimitReached);
                }
            }

            let room = ensure_room(&mut registry, room_id, self.ctx.config.max_rooms)?;
            match room.peers.get_mut(user_id) {
                Some(peer) => peer.connection_id = connection_id,
                None => {
                    room.peers
                        .insert(user_id.clone(), Peer::new(user_id.clone(), connection_id));
                }
            }

            let joined = JoinedRoom {
                room_id: room_id.clone(),
                peer_ids: room.peer_ids(),
            };
            (joined, rejoin)
        };

        let summary = released.close_all();
        info!(
            room_id = %room_id,
            user_id = %user_id,
            rejoin,
            stale_consumers = summary.consumers_closed,
            stale_producers = summary.producers_closed,
            stale_transports = summary.transports_closed,
            peer_count = joined.peer_ids.len(),
            "Peer joined room"
        );

        Ok(joined)
    }

    /// Tear down a peer. Unknown rooms and users are a no-op.
    pub fn leave_room(&self, room_id: &RoomId, user_id: &UserId) -> TeardownSummary {
        let mut released = Released::default();
        let removed = cascade::remove_peer(
            &mut self.ctx.registry.write(),
            room_id,
            user_id,
            &mut released,
        );
        let summary = released.close_all();

        if !removed {
            debug!(room_id = %room_id, user_id = %user_id, "Leave for absent peer ignored");
            return summary;
        }

        info!(
            room_id = %room_id,
            user_id = %user_id,
            consumers_closed = summary.consumers_closed,
            producers_closed = summary.producers_closed,
            transports_closed = summary.transports_closed,
            "Peer left room"
        );
        if summary.room_closed {
            info!(room_id = %room_id, "Room destroyed");
        }

        summary
    }

    /// Leave every room the user is in, returning the affected room ids
    pub fn leave_user_from_all_rooms(&self, user_id: &UserId) -> Vec<RoomId> {
        let mut room_ids: Vec<RoomId> = {
            let registry = self.ctx.registry.read();
            registry
                .rooms
                .values()
                .filter(|room| room.peers.contains_key(user_id))
                .map(|room| room.id.clone())
                .collect()
        };
        room_ids.sort();

        for room_id in &room_ids {
            self.leave_room(room_id, user_id);
        }
        room_ids
    }

    /// Create the room's router if the engine is available and none exists yet
    pub async fn ensure_router(&self, room_id: &RoomId) -> Result<()> {
        if !self.ctx.engine.is_available() {
            return Ok(());
        }

        {
            let registry = self.ctx.registry.read();
            match registry.rooms.get(room_id) {
                Some(room) if room.router.is_none() => {}
                _ => return Ok(()),
            }
        }

        let Some(router) = self.ctx.engine.create_router(room_id).await? else {
            return Ok(());
        };

        let orphan = {
            let mut registry = self.ctx.registry.write();
            match registry.rooms.get_mut(room_id) {
                Some(room) if room.router.is_none() => {
                    room.router = Some(router);
                    None
                }
                _ => Some(router),
            }
        };

        match orphan {
            Some(router) => {
                debug!(room_id = %room_id, "Room closed or already routed, discarding new router");
                router.close();
            }
            None => info!(room_id = %room_id, "Router attached to room"),
        }
        Ok(())
    }

    pub fn router_capabilities(&self, room_id: Option<&RoomId>) -> RtpCapabilities {
        let router = room_id.and_then(|room_id| {
            self.ctx
                .registry
                .read()
                .rooms
                .get(room_id)
                .and_then(|room| room.router.clone())
        });
        self.ctx.engine.router_capabilities(router.as_ref())
    }

    pub fn user_media_state(&self, room_id: &RoomId, user_id: &UserId) -> MediaState {
        media_state_of(&self.ctx.registry.read(), room_id, user_id)
    }

    pub fn list_room_media_states(
        &self,
        room_id: &RoomId,
        except_user_id: Option<&UserId>,
    ) -> Vec<PeerMediaState> {
        let registry = self.ctx.registry.read();
        let Some(room) = registry.rooms.get(room_id) else {
            return Vec::new();
        };

        room.peer_ids()
            .into_iter()
            .filter(|user_id| Some(user_id) != except_user_id)
            .map(|user_id| PeerMediaState {
                state: media_state_of(&registry, room_id, &user_id),
                user_id,
            })
            .collect()
    }

    pub fn peer_connection_id(&self, room_id: &RoomId, user_id: &UserId) -> Option<ConnectionId> {
        self.ctx
            .registry
            .read()
            .peer(room_id, user_id)
            .map(|peer| peer.connection_id.clone())
    }

    pub fn room_ids(&self) -> Vec<RoomId> {
        let mut ids: Vec<RoomId> = self.ctx.registry.read().rooms.keys().cloned().collect();
        ids.sort();
        ids
    }
}
