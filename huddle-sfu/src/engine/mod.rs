//! Media engine seam
//!
//! The traits in this module describe the media-forwarding engine the controller
//! drives: routers, WebRTC transports, producers and consumers, all held as opaque
//! handles. The engine itself lives outside this crate and is handed over at
//! startup through an [`EngineProbe`].
//!
//! Lifecycle code never talks to a [`MediaEngine`] directly. It goes through the
//! [`EngineAdapter`] capability interface, which has exactly two implementations:
//! [`NativeEngineAdapter`] when the engine loaded, and [`StubEngineAdapter`] for
//! the signaling-only fallback.

mod adapter;
mod native;
mod stub;

pub use adapter::{initialize, ConsumeRequest, EngineAdapter, EngineMode, EngineProbe, ProduceRequest};
pub use native::NativeEngineAdapter;
pub use stub::StubEngineAdapter;

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::rtp::{
    DtlsParameters, EngineMediaKind, IceCandidate, IceParameters, RtpCapabilities,
    RtpCodecCapability, RtpParameters,
};
use crate::types::{ConsumerId, ProducerId, TransportId};

/// Errors reported by the media engine
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Router error: {0}")]
    Router(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Producer error: {0}")]
    Producer(String),

    #[error("Consumer error: {0}")]
    Consumer(String),

    #[error("No engine handle attached to {0}")]
    MissingHandle(&'static str),
}

pub type RouterHandle = Arc<dyn EngineRouter>;
pub type TransportHandle = Arc<dyn EngineTransport>;
pub type ProducerHandle = Arc<dyn EngineProducer>;
pub type ConsumerHandle = Arc<dyn EngineConsumer>;

/// Entry point of a loaded media engine
#[async_trait]
pub trait MediaEngine: Send + Sync {
    async fn create_router(
        &self,
        media_codecs: Vec<RtpCodecCapability>,
    ) -> Result<RouterHandle, EngineError>;
}

/// Per-room router
#[async_trait]
pub trait EngineRouter: Send + Sync {
    fn id(&self) -> String;

    fn rtp_capabilities(&self) -> RtpCapabilities;

    /// Codec compatibility check between a producer and a receiver's capabilities
    fn can_consume(&self, producer_id: &ProducerId, rtp_capabilities: &RtpCapabilities) -> bool;

    async fn create_webrtc_transport(&self) -> Result<TransportHandle, EngineError>;

    fn close(&self);
}

/// Options for [`EngineTransport::produce`]
#[derive(Debug, Clone)]
pub struct ProduceOptions {
    pub kind: EngineMediaKind,
    pub rtp_parameters: RtpParameters,
    pub app_data: Value,
}

/// Options for [`EngineTransport::consume`]
#[derive(Debug, Clone)]
pub struct ConsumeOptions {
    pub producer_id: ProducerId,
    pub rtp_capabilities: RtpCapabilities,
}

#[async_trait]
pub trait EngineTransport: Send + Sync {
    fn id(&self) -> TransportId;

    fn ice_parameters(&self) -> IceParameters;

    fn ice_candidates(&self) -> Vec<IceCandidate>;

    fn dtls_parameters(&self) -> DtlsParameters;

    async fn connect(&self, dtls_parameters: DtlsParameters) -> Result<(), EngineError>;

    async fn produce(&self, options: ProduceOptions) -> Result<ProducerHandle, EngineError>;

    async fn consume(&self, options: ConsumeOptions) -> Result<ConsumerHandle, EngineError>;

    fn close(&self);
}

pub trait EngineProducer: Send + Sync {
    fn id(&self) -> ProducerId;

    fn close(&self);

    /// Cancelled once the producer is closed, including when its transport closes
    fn closed(&self) -> CancellationToken;
}

pub trait EngineConsumer: Send + Sync {
    fn id(&self) -> ConsumerId;

    fn rtp_parameters(&self) -> RtpParameters;

    fn close(&self);

    /// Cancelled once the consumer is closed, including when its transport or
    /// producer closes
    fn closed(&self) -> CancellationToken;
}

/// Transport as returned by an adapter, ready to be registered
pub struct CreatedTransport {
    pub id: TransportId,
    pub ice_parameters: IceParameters,
    pub ice_candidates: Vec<IceCandidate>,
    pub dtls_parameters: DtlsParameters,
    pub handle: Option<TransportHandle>,
}

/// Producer as returned by an adapter, ready to be registered
pub struct CreatedProducer {
    pub id: ProducerId,
    pub handle: Option<ProducerHandle>,
}

/// Consumer as returned by an adapter, ready to be registered
pub struct CreatedConsumer {
    pub id: ConsumerId,
    pub rtp_parameters: RtpParameters,
    pub handle: Option<ConsumerHandle>,
}
