//! Consumers of room producers on receive transports

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::cascade::{self, CloseTarget};
use crate::engine::ConsumeRequest;
use crate::error::{Error, Result};
use crate::registry::{Consumer, ResourceRegistry, SfuContext};
use crate::rtp::{MediaKind, RtpCapabilities, RtpParameters, TransportDirection};
use crate::types::{ConsumerId, ProducerId, RoomId, TransportId, UserId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerDescriptor {
    pub id: ConsumerId,
    pub producer_id: ProducerId,
    pub producer_user_id: UserId,
    pub kind: MediaKind,
    pub rtp_parameters: RtpParameters,
}

/// Producer facts captured before the engine call
struct Source {
    user_id: UserId,
    kind: MediaKind,
    rtp_parameters: RtpParameters,
}

fn validate(
    registry: &ResourceRegistry,
    room_id: &RoomId,
    user_id: &UserId,
    transport_id: &TransportId,
    producer_id: &ProducerId,
) -> Result<Source> {
    if registry.peer(room_id, user_id).is_none() {
        return Err(Error::PeerNotJoined);
    }

    let valid_transport = registry.transports.get(transport_id).is_some_and(|transport| {
        &transport.room_id == room_id
            && &transport.user_id == user_id
            && transport.direction == TransportDirection::Recv
    });
    if !valid_transport {
        return Err(Error::InvalidRecvTransport);
    }

    registry
        .producers
        .get(producer_id)
        .filter(|producer| &producer.room_id == room_id)
        .map(|producer| Source {
            user_id: producer.user_id.clone(),
            kind: producer.kind,
            rtp_parameters: producer.rtp_parameters.clone(),
        })
        .ok_or(Error::ProducerNotFound)
}

#[derive(Clone)]
pub struct ConsumerLifecycle {
    ctx: SfuContext,
}

impl ConsumerLifecycle {
    pub fn new(ctx: SfuContext) -> Self {
        Self { ctx }
    }

    pub async fn consume(
        &self,
        room_id: &RoomId,
        user_id: &UserId,
        transport_id: &TransportId,
        producer_id: &ProducerId,
        rtp_capabilities: &RtpCapabilities,
    ) -> Result<ConsumerDescriptor> {
        let (source, router, transport) = {
            let registry = self.ctx.registry.read();
            let source = validate(&registry, room_id, user_id, transport_id, producer_id)?;
            let router = registry.rooms.get(room_id).and_then(|room| room.router.clone());
            let transport = registry
                .transports
                .get(transport_id)
                .and_then(|transport| transport.handle.clone());
            (source, router, transport)
        };

        let created = self
            .ctx
            .engine
            .consume(
                router.as_ref(),
                transport.as_ref(),
                ConsumeRequest {
                    producer_id,
                    producer_rtp_parameters: &source.rtp_parameters,
                    rtp_capabilities,
                },
            )
            .await?;

        let registered = {
            let mut registry = self.ctx.registry.write();
            validate(&registry, room_id, user_id, transport_id, producer_id).map(|_| {
                if let Some(peer) = registry.peer_mut(room_id, user_id) {
                    peer.consumer_ids.insert(created.id.clone());
                }
                registry.consumers.insert(
                    created.id.clone(),
                    Consumer {
                        id: created.id.clone(),
                        room_id: room_id.clone(),
                        user_id: user_id.clone(),
                        transport_id: transport_id.clone(),
                        producer_id: producer_id.clone(),
                        kind: source.kind,
                        rtp_parameters: created.rtp_parameters.clone(),
                        handle: created.handle.clone(),
                    },
                );
            })
        };

        if let Err(e) = registered {
            if let Some(handle) = created.handle {
                handle.close();
            }
            debug!(room_id = %room_id, user_id = %user_id, error = %e, "Consumer target vanished during creation");
            return Err(e);
        }

        if let Some(handle) = &created.handle {
            cascade::spawn_close_listener(
                &self.ctx,
                handle.closed(),
                CloseTarget::Consumer(created.id.clone()),
            );
        }

        info!(
            room_id = %room_id,
            user_id = %user_id,
            consumer_id = %created.id,
            producer_id = %producer_id,
            kind = %source.kind,
            "Consumer created"
        );

        Ok(ConsumerDescriptor {
            id: created.id,
            producer_id: producer_id.clone(),
            producer_user_id: source.user_id,
            kind: source.kind,
            rtp_parameters: created.rtp_parameters,
        })
    }
}
