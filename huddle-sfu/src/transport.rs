//! WebRTC transport lifecycle: created -> connected -> closed

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::registry::{SfuContext, Transport};
use crate::room::RoomLifecycle;
use crate::rtp::{DtlsParameters, IceCandidate, IceParameters, TransportDirection};
use crate::types::{RoomId, TransportId, UserId};

/// Everything a client needs to set up its side of a transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportDescriptor {
    pub id: TransportId,
    pub direction: TransportDirection,
    pub ice_parameters: IceParameters,
    pub ice_candidates: Vec<IceCandidate>,
    pub dtls_parameters: DtlsParameters,
}

#[derive(Clone)]
pub struct TransportLifecycle {
    ctx: SfuContext,
    rooms: RoomLifecycle,
}

impl TransportLifecycle {
    pub fn new(ctx: SfuContext, rooms: RoomLifecycle) -> Self {
        Self { ctx, rooms }
    }

    pub async fn create_transport(
        &self,
        room_id: &RoomId,
        user_id: &UserId,
        direction: TransportDirection,
    ) -> Result<TransportDescriptor> {
        if self.ctx.registry.read().peer(room_id, user_id).is_none() {
            return Err(Error::PeerNotJoined);
        }

        self.rooms.ensure_router(room_id).await?;

        let router = {
            let registry = self.ctx.registry.read();
            if registry.peer(room_id, user_id).is_none() {
                return Err(Error::PeerNotJoined);
            }
            registry.rooms.get(room_id).and_then(|room| room.router.clone())
        };

        let created = self
            .ctx
            .engine
            .create_transport(router.as_ref(), direction)
            .await?;

        let descriptor = TransportDescriptor {
            id: created.id.clone(),
            direction,
            ice_parameters: created.ice_parameters,
            ice_candidates: created.ice_candidates,
            dtls_parameters: created.dtls_parameters,
        };

        let registered = {
            let mut registry = self.ctx.registry.write();
            match registry.peer_mut(room_id, user_id) {
                Some(peer) => {
                    peer.transport_ids.insert(created.id.clone());
                    registry.transports.insert(
                        created.id.clone(),
                        Transport {
                            id: created.id,
                            room_id: room_id.clone(),
                            user_id: user_id.clone(),
                            direction,
                            connected: false,
                            dtls_parameters: None,
                            handle: created.handle,
                        },
                    );
                    Ok(())
                }
                None => Err(created.handle),
            }
        };

        if let Err(orphan) = registered {
            if let Some(handle) = orphan {
                handle.close();
            }
            debug!(room_id = %room_id, user_id = %user_id, "Peer left during transport creation");
            return Err(Error::PeerNotJoined);
        }

        info!(
            room_id = %room_id,
            user_id = %user_id,
            transport_id = %descriptor.id,
            direction = %direction,
            "Transport created"
        );
        Ok(descriptor)
    }

    /// Hand the client's DTLS parameters to the engine. Repeated calls on an
    /// already connected transport succeed without touching the engine.
    pub async fn connect_transport(
        &self,
        transport_id: &TransportId,
        dtls_parameters: DtlsParameters,
    ) -> Result<()> {
        let handle = {
            let registry = self.ctx.registry.read();
            let transport = registry
                .transports
                .get(transport_id)
                .ok_or(Error::TransportNotFound)?;
            if transport.connected {
                debug!(transport_id = %transport_id, "Transport already connected");
                return Ok(());
            }
            transport.handle.clone()
        };

        self.ctx
            .engine
            .connect_transport(handle.as_ref(), &dtls_parameters)
            .await?;

        let mut registry = self.ctx.registry.write();
        let transport = registry
            .transports
            .get_mut(transport_id)
            .ok_or(Error::TransportNotFound)?;
        transport.connected = true;
        transport.dtls_parameters = Some(dtls_parameters);

        info!(transport_id = %transport_id, "Transport connected");
        Ok(())
    }

    pub fn is_connected(&self, transport_id: &TransportId) -> bool {
        self.ctx
            .registry
            .read()
            .transports
            .get(transport_id)
            .is_some_and(|transport| transport.connected)
    }
}
