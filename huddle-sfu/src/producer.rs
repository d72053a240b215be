//! Media producers on send transports

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::cascade::{self, CloseTarget, Released};
use crate::engine::ProduceRequest;
use crate::error::{Error, Result};
use crate::registry::{Producer, ResourceRegistry, SfuContext};
use crate::rtp::{MediaKind, RtpParameters, TransportDirection};
use crate::types::{ProducerId, RoomId, TransportId, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProducerDescriptor {
    pub id: ProducerId,
    pub kind: MediaKind,
}

/// Entry of a room's producer listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProducerSummary {
    pub producer_id: ProducerId,
    pub user_id: UserId,
    pub kind: MediaKind,
}

/// Error for a transport that cannot carry a producer of this peer
fn check_send_transport(
    registry: &ResourceRegistry,
    room_id: &RoomId,
    user_id: &UserId,
    transport_id: &TransportId,
) -> Result<()> {
    if registry.peer(room_id, user_id).is_none() {
        return Err(Error::PeerNotJoined);
    }
    match registry.transports.get(transport_id) {
        Some(transport)
            if &transport.room_id == room_id
                && &transport.user_id == user_id
                && transport.direction == TransportDirection::Send =>
        {
            Ok(())
        }
        _ => Err(Error::InvalidSendTransport),
    }
}

#[derive(Clone)]
pub struct ProducerLifecycle {
    ctx: SfuContext,
}

impl ProducerLifecycle {
    pub fn new(ctx: SfuContext) -> Self {
        Self { ctx }
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
        let transport = {
            let registry = self.ctx.registry.read();
            check_send_transport(&registry, room_id, user_id, transport_id)?;
            registry
                .transports
                .get(transport_id)
                .and_then(|transport| transport.handle.clone())
        };

        let created = self
            .ctx
            .engine
            .produce(
                transport.as_ref(),
                ProduceRequest {
                    kind,
                    rtp_parameters: &rtp_parameters,
                    app_data: app_data.as_ref(),
                },
            )
            .await?;

        let registered = {
            let mut registry = self.ctx.registry.write();
            match check_send_transport(&registry, room_id, user_id, transport_id) {
                Ok(()) => {
                    if let Some(peer) = registry.peer_mut(room_id, user_id) {
                        peer.producer_ids.insert(created.id.clone());
                    }
                    registry.producers.insert(
                        created.id.clone(),
                        Producer {
                            id: created.id.clone(),
                            room_id: room_id.clone(),
                            user_id: user_id.clone(),
                            transport_id: transport_id.clone(),
                            kind,
                            rtp_parameters,
                            app_data,
                            handle: created.handle.clone(),
                        },
                    );
                    Ok(())
                }
                Err(e) => Err(e),
            }
        };

        if let Err(e) = registered {
            if let Some(handle) = created.handle {
                handle.close();
            }
            debug!(room_id = %room_id, user_id = %user_id, error = %e, "Producer target vanished during creation");
            return Err(e);
        }

        if let Some(handle) = &created.handle {
            cascade::spawn_close_listener(
                &self.ctx,
                handle.closed(),
                CloseTarget::Producer(created.id.clone()),
            );
        }

        info!(
            room_id = %room_id,
            user_id = %user_id,
            producer_id = %created.id,
            kind = %kind,
            "Producer created"
        );

        Ok(ProducerDescriptor {
            id: created.id,
            kind,
        })
    }

    /// Close a producer owned by `user_id` together with every consumer of it.
    /// Returns false when there was nothing to close.
    pub fn close_producer(&self, room_id: &RoomId, user_id: &UserId, producer_id: &ProducerId) -> bool {
        let mut released = Released::default();
        let closed = {
            let mut registry = self.ctx.registry.write();
            let owned = registry.producers.get(producer_id).is_some_and(|producer| {
                &producer.room_id == room_id && &producer.user_id == user_id
            });
            owned && cascade::detach_producer(&mut registry, producer_id, &mut released)
        };
        let summary = released.close_all();

        if closed {
            info!(
                room_id = %room_id,
                user_id = %user_id,
                producer_id = %producer_id,
                consumers_closed = summary.consumers_closed,
                "Producer closed"
            );
        } else {
            debug!(producer_id = %producer_id, "Close for unknown or foreign producer ignored");
        }
        closed
    }

    pub fn close_user_producers(&self, room_id: &RoomId, user_id: &UserId) -> Vec<ProducerId> {
        let mut released = Released::default();
        let closed = {
            let mut registry = self.ctx.registry.write();
            let mut ids: Vec<ProducerId> = registry
                .peer(room_id, user_id)
                .map(|peer| peer.producer_ids.iter().cloned().collect())
                .unwrap_or_default();
            ids.sort();
            ids.retain(|id| cascade::detach_producer(&mut registry, id, &mut released));
            ids
        };
        let summary = released.close_all();

        if !closed.is_empty() {
            info!(
                room_id = %room_id,
                user_id = %user_id,
                producers_closed = summary.producers_closed,
                consumers_closed = summary.consumers_closed,
                "Closed all producers of user"
            );
        }
        closed
    }

    /// Producers in a room, ordered by owner then id
    pub fn list_room_producers(
        &self,
        room_id: &RoomId,
        except_user_id: Option<&UserId>,
    ) -> Vec<ProducerSummary> {
        let registry = self.ctx.registry.read();
        let mut producers: Vec<ProducerSummary> = registry
            .producers
            .values()
            .filter(|producer| &producer.room_id == room_id)
            .filter(|producer| Some(&producer.user_id) != except_user_id)
            .map(|producer| ProducerSummary {
                producer_id: producer.id.clone(),
                user_id: producer.user_id.clone(),
                kind: producer.kind,
            })
            .collect();
        producers.sort_by(|a, b| {
            a.user_id
                .cmp(&b.user_id)
                .then_with(|| a.producer_id.cmp(&b.producer_id))
        });
        producers
    }
}
