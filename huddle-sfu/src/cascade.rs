//! Cascading teardown of the room -> peer -> resource ownership tree
//!
//! Every removal from the registry goes through the functions below. Children are
//! always detached before their parents: consumers, then producers, then
//! transports, then the room's router. Engine handles are collected while the
//! registry lock is held and closed afterwards by [`Released::close_all`], in the
//! same order.
//!
//! All functions are idempotent: detaching an unknown id does nothing.

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::engine::{ConsumerHandle, ProducerHandle, RouterHandle, TransportHandle};
use crate::registry::{ResourceRegistry, SfuContext};
use crate::types::{ConsumerId, ProducerId, RoomId, TransportId, UserId};

/// What a teardown removed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeardownSummary {
    pub consumers_closed: usize,
    pub producers_closed: usize,
    pub transports_closed: usize,
    pub room_closed: bool,
}

impl TeardownSummary {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.consumers_closed == 0
            && self.producers_closed == 0
            && self.transports_closed == 0
            && !self.room_closed
    }
}

/// Engine handles detached from the registry, waiting to be closed
#[derive(Default)]
pub struct Released {
    consumers: Vec<ConsumerHandle>,
    producers: Vec<ProducerHandle>,
    transports: Vec<TransportHandle>,
    router: Option<RouterHandle>,
    summary: TeardownSummary,
}

impl Released {
    /// Close every collected handle. Must be called after the registry lock is
    /// released.
    pub fn close_all(self) -> TeardownSummary {
        for consumer in &self.consumers {
            consumer.close();
        }
        for producer in &self.producers {
            producer.close();
        }
        for transport in &self.transports {
            transport.close();
        }
        if let Some(router) = &self.router {
            router.close();
        }
        self.summary
    }
}

pub fn detach_consumer(
    registry: &mut ResourceRegistry,
    consumer_id: &ConsumerId,
    released: &mut Released,
) -> bool {
    let Some(consumer) = registry.consumers.remove(consumer_id) else {
        return false;
    };

    if let Some(peer) = registry.peer_mut(&consumer.room_id, &consumer.user_id) {
        peer.consumer_ids.remove(consumer_id);
    }
    if let Some(handle) = consumer.handle {
        released.consumers.push(handle);
    }
    released.summary.consumers_closed += 1;
    true
}

/// Detach a producer and every consumer that depends on it
pub fn detach_producer(
    registry: &mut ResourceRegistry,
    producer_id: &ProducerId,
    released: &mut Released,
) -> bool {
    let dependents: Vec<ConsumerId> = registry
        .consumers
        .values()
        .filter(|consumer| &consumer.producer_id == producer_id)
        .map(|consumer| consumer.id.clone())
        .collect();
    for consumer_id in &dependents {
        detach_consumer(registry, consumer_id, released);
    }

    let Some(producer) = registry.producers.remove(producer_id) else {
        return false;
    };

    if let Some(peer) = registry.peer_mut(&producer.room_id, &producer.user_id) {
        peer.producer_ids.remove(producer_id);
    }
    if let Some(handle) = producer.handle {
        released.producers.push(handle);
    }
    released.summary.producers_closed += 1;
    true
}

/// Detach a transport, after whatever still rides on it
pub fn detach_transport(
    registry: &mut ResourceRegistry,
    transport_id: &TransportId,
    released: &mut Released,
) -> bool {
    let consumers: Vec<ConsumerId> = registry
        .consumers
        .values()
        .filter(|consumer| &consumer.transport_id == transport_id)
        .map(|consumer| consumer.id.clone())
        .collect();
    for consumer_id in &consumers {
        detach_consumer(registry, consumer_id, released);
    }

    let producers: Vec<ProducerId> = registry
        .producers
        .values()
        .filter(|producer| &producer.transport_id == transport_id)
        .map(|producer| producer.id.clone())
        .collect();
    for producer_id in &producers {
        detach_producer(registry, producer_id, released);
    }

    let Some(transport) = registry.transports.remove(transport_id) else {
        return false;
    };

    if let Some(peer) = registry.peer_mut(&transport.room_id, &transport.user_id) {
        peer.transport_ids.remove(transport_id);
    }
    if let Some(handle) = transport.handle {
        released.transports.push(handle);
    }
    released.summary.transports_closed += 1;
    true
}

/// Release everything a peer owns, leaving the (now empty) peer entry in place
pub fn detach_peer_resources(
    registry: &mut ResourceRegistry,
    room_id: &RoomId,
    user_id: &UserId,
    released: &mut Released,
) -> bool {
    let Some(peer) = registry.peer(room_id, user_id) else {
        return false;
    };
    let consumer_ids: Vec<ConsumerId> = peer.consumer_ids.iter().cloned().collect();
    let producer_ids: Vec<ProducerId> = peer.producer_ids.iter().cloned().collect();
    let transport_ids: Vec<TransportId> = peer.transport_ids.iter().cloned().collect();

    for consumer_id in &consumer_ids {
        detach_consumer(registry, consumer_id, released);
    }
    for producer_id in &producer_ids {
        detach_producer(registry, producer_id, released);
    }
    for transport_id in &transport_ids {
        detach_transport(registry, transport_id, released);
    }
    true
}

/// Release a peer's resources, remove the peer and drop the room if it emptied
pub fn remove_peer(
    registry: &mut ResourceRegistry,
    room_id: &RoomId,
    user_id: &UserId,
    released: &mut Released,
) -> bool {
    if !detach_peer_resources(registry, room_id, user_id, released) {
        return false;
    }

    let Some(room) = registry.rooms.get_mut(room_id) else {
        return false;
    };
    room.peers.remove(user_id);

    if room.peers.is_empty() {
        if let Some(room) = registry.rooms.remove(room_id) {
            released.router = room.router;
            released.summary.room_closed = true;
        }
    }
    true
}

/// Resource whose engine-side closure should be mirrored in the registry
#[derive(Debug, Clone)]
pub enum CloseTarget {
    Producer(ProducerId),
    Consumer(ConsumerId),
}

/// Remove `target` from the registry once the engine reports it closed.
///
/// Fires for explicit closes as well; by then the record is already gone and the
/// listener does nothing. A producer removed this way changes its room's media
/// state, so the context's room-changed hook runs afterwards.
pub fn spawn_close_listener(ctx: &SfuContext, closed: CancellationToken, target: CloseTarget) {
    let ctx = ctx.clone();
    tokio::spawn(async move {
        closed.cancelled().await;

        let mut released = Released::default();
        let detached_from = {
            let mut registry = ctx.registry.write();
            match &target {
                CloseTarget::Producer(id) => {
                    let room_id = registry.producers.get(id).map(|p| p.room_id.clone());
                    room_id.filter(|_| detach_producer(&mut registry, id, &mut released))
                }
                CloseTarget::Consumer(id) => {
                    let room_id = registry.consumers.get(id).map(|c| c.room_id.clone());
                    room_id.filter(|_| detach_consumer(&mut registry, id, &mut released))
                }
            }
        };

        let Some(room_id) = detached_from else {
            return;
        };
        let summary = released.close_all();
        debug!(
            resource = ?target,
            room_id = %room_id,
            consumers_closed = summary.consumers_closed,
            "Engine closed resource, removed from registry"
        );

        // Consumers are not part of a room's published state
        if matches!(target, CloseTarget::Producer(_)) {
            ctx.notify_room_changed(&room_id);
        }
    });
}
