//! Signaling-only adapter used when no media engine is available

use async_trait::async_trait;

use super::{
    ConsumeRequest, CreatedConsumer, CreatedProducer, CreatedTransport, EngineAdapter, EngineMode,
    ProduceRequest, RouterHandle, TransportHandle,
};
use crate::error::Result;
use crate::rtp::{
    DtlsFingerprint, DtlsParameters, DtlsRole, IceParameters, RtpCapabilities, TransportDirection,
};
use crate::types::{ConsumerId, ProducerId, RoomId, TransportId};

const STUB_ICE_USERNAME_FRAGMENT: &str = "stub";
const STUB_ICE_PASSWORD: &str = "stub";
const STUB_FINGERPRINT_ALGORITHM: &str = "sha-256";

/// Tracks signaling state only. Every request succeeds with synthesized ids and
/// placeholder transport parameters, so the protocol surface matches native mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct StubEngineAdapter;

impl StubEngineAdapter {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn ice_parameters() -> IceParameters {
        IceParameters {
            username_fragment: STUB_ICE_USERNAME_FRAGMENT.to_string(),
            password: STUB_ICE_PASSWORD.to_string(),
            ice_lite: true,
        }
    }

    fn dtls_parameters() -> DtlsParameters {
        DtlsParameters {
            role: Some(DtlsRole::Auto),
            fingerprints: vec![DtlsFingerprint {
                algorithm: STUB_FINGERPRINT_ALGORITHM.to_string(),
                value: vec!["00"; 32].join(":"),
            }],
        }
    }
}

#[async_trait]
impl EngineAdapter for StubEngineAdapter {
    fn mode(&self) -> EngineMode {
        EngineMode::Stub
    }

    fn router_capabilities(&self, _router: Option<&RouterHandle>) -> RtpCapabilities {
        RtpCapabilities::fallback()
    }

    async fn create_router(&self, _room_id: &RoomId) -> Result<Option<RouterHandle>> {
        Ok(None)
    }

    async fn create_transport(
        &self,
        _router: Option<&RouterHandle>,
        _direction: TransportDirection,
    ) -> Result<CreatedTransport> {
        Ok(CreatedTransport {
            id: TransportId::generate(),
            ice_parameters: Self::ice_parameters(),
            ice_candidates: Vec::new(),
            dtls_parameters: Self::dtls_parameters(),
            handle: None,
        })
    }

    async fn connect_transport(
        &self,
        _transport: Option<&TransportHandle>,
        _dtls_parameters: &DtlsParameters,
    ) -> Result<()> {
        Ok(())
    }

    async fn produce(
        &self,
        _transport: Option<&TransportHandle>,
        _request: ProduceRequest<'_>,
    ) -> Result<CreatedProducer> {
        Ok(CreatedProducer {
            id: ProducerId::generate(),
            handle: None,
        })
    }

    // No codec negotiation happens without an engine, so every request is
    // honored with the producer's own parameters.
    async fn consume(
        &self,
        _router: Option<&RouterHandle>,
        _transport: Option<&TransportHandle>,
        request: ConsumeRequest<'_>,
    ) -> Result<CreatedConsumer> {
        Ok(CreatedConsumer {
            id: ConsumerId::generate(),
            rtp_parameters: request.producer_rtp_parameters.clone(),
            handle: None,
        })
    }
}
