//! Capability interface shared by the native and stub engine adapters

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

use super::{
    CreatedConsumer, CreatedProducer, CreatedTransport, MediaEngine, NativeEngineAdapter,
    RouterHandle, StubEngineAdapter, TransportHandle,
};
use crate::error::Result;
use crate::rtp::{DtlsParameters, MediaKind, RtpCapabilities, RtpParameters, TransportDirection};
use crate::types::{ProducerId, RoomId};

/// Future that loads the native media engine, resolved once at startup
pub type EngineProbe = BoxFuture<'static, anyhow::Result<Arc<dyn MediaEngine>>>;

/// Which adapter is serving the process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineMode {
    Native,
    Stub,
}

/// Producer creation request handed to an adapter
#[derive(Debug, Clone, Copy)]
pub struct ProduceRequest<'a> {
    pub kind: MediaKind,
    pub rtp_parameters: &'a RtpParameters,
    pub app_data: Option<&'a Value>,
}

/// Consumer creation request handed to an adapter
#[derive(Debug, Clone, Copy)]
pub struct ConsumeRequest<'a> {
    pub producer_id: &'a ProducerId,
    pub producer_rtp_parameters: &'a RtpParameters,
    pub rtp_capabilities: &'a RtpCapabilities,
}

/// Uniform view of the media engine used by every lifecycle component
///
/// Handles are optional throughout: the stub adapter never produces them and
/// ignores them on input, the native adapter requires them.
#[async_trait]
pub trait EngineAdapter: Send + Sync {
    fn mode(&self) -> EngineMode;

    fn is_available(&self) -> bool {
        self.mode() == EngineMode::Native
    }

    /// Live router capabilities, or the fixed fallback set
    fn router_capabilities(&self, router: Option<&RouterHandle>) -> RtpCapabilities;

    /// Create a router for a room; `None` when there is no engine
    async fn create_router(&self, room_id: &RoomId) -> Result<Option<RouterHandle>>;

    async fn create_transport(
        &self,
        router: Option<&RouterHandle>,
        direction: TransportDirection,
    ) -> Result<CreatedTransport>;

    async fn connect_transport(
        &self,
        transport: Option<&TransportHandle>,
        dtls_parameters: &DtlsParameters,
    ) -> Result<()>;

    async fn produce(
        &self,
        transport: Option<&TransportHandle>,
        request: ProduceRequest<'_>,
    ) -> Result<CreatedProducer>;

    async fn consume(
        &self,
        router: Option<&RouterHandle>,
        transport: Option<&TransportHandle>,
        request: ConsumeRequest<'_>,
    ) -> Result<CreatedConsumer>;
}

/// Select the adapter for the lifetime of the process.
///
/// Called once during startup. Any failure to load the engine is logged and
/// permanently selects the stub adapter; there is no retry.
pub async fn initialize(enabled: bool, probe: Option<EngineProbe>) -> Arc<dyn EngineAdapter> {
    if !enabled {
        info!("Media engine disabled by configuration, running signaling-only");
        return Arc::new(StubEngineAdapter::new());
    }

    let Some(probe) = probe else {
        warn!("No media engine linked, running signaling-only");
        return Arc::new(StubEngineAdapter::new());
    };

    match probe.await {
        Ok(engine) => {
            info!("Media engine loaded");
            Arc::new(NativeEngineAdapter::new(engine))
        }
        Err(e) => {
            warn!(error = %e, "Failed to load media engine, running signaling-only");
            Arc::new(StubEngineAdapter::new())
        }
    }
}
