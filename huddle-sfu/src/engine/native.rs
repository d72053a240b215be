//! Adapter backed by a loaded media engine

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;

use super::{
    ConsumeOptions, ConsumeRequest, CreatedConsumer, CreatedProducer, CreatedTransport,
    EngineAdapter, EngineError, EngineMode, MediaEngine, ProduceOptions, ProduceRequest,
    RouterHandle, TransportHandle,
};
use crate::error::{Error, Result};
use crate::rtp::{
    router_media_codecs, DtlsParameters, MediaKind, RtpCapabilities, TransportDirection,
};
use crate::types::RoomId;

pub struct NativeEngineAdapter {
    engine: Arc<dyn MediaEngine>,
}

impl NativeEngineAdapter {
    pub fn new(engine: Arc<dyn MediaEngine>) -> Self {
        Self { engine }
    }

    /// Client app data with the logical kind stamped in, since the engine only
    /// distinguishes audio and video
    fn tag_app_data(kind: MediaKind, app_data: Option<&Value>) -> Value {
        let mut tagged = match app_data {
            Some(Value::Object(map)) => map.clone(),
            Some(other) => {
                let mut map = Map::new();
                map.insert("data".to_string(), other.clone());
                map
            }
            None => Map::new(),
        };
        tagged.insert("kind".to_string(), Value::from(kind.as_str()));
        Value::Object(tagged)
    }
}

#[async_trait]
impl EngineAdapter for NativeEngineAdapter {
    fn mode(&self) -> EngineMode {
        EngineMode::Native
    }

    fn router_capabilities(&self, router: Option<&RouterHandle>) -> RtpCapabilities {
        router.map_or_else(RtpCapabilities::fallback, |router| router.rtp_capabilities())
    }

    async fn create_router(&self, room_id: &RoomId) -> Result<Option<RouterHandle>> {
        let router = self.engine.create_router(router_media_codecs()).await?;
        debug!(room_id = %room_id, router_id = %router.id(), "Engine router created");
        Ok(Some(router))
    }

    async fn create_transport(
        &self,
        router: Option<&RouterHandle>,
        direction: TransportDirection,
    ) -> Result<CreatedTransport> {
        let router = router.ok_or(EngineError::MissingHandle("room"))?;
        let transport = router.create_webrtc_transport().await?;
        debug!(transport_id = %transport.id(), direction = %direction, "Engine transport created");

        Ok(CreatedTransport {
            id: transport.id(),
            ice_parameters: transport.ice_parameters(),
            ice_candidates: transport.ice_candidates(),
            dtls_parameters: transport.dtls_parameters(),
            handle: Some(transport),
        })
    }

    async fn connect_transport(
        &self,
        transport: Option<&TransportHandle>,
        dtls_parameters: &DtlsParameters,
    ) -> Result<()> {
        let transport = transport.ok_or(EngineError::MissingHandle("transport"))?;
        transport.connect(dtls_parameters.clone()).await?;
        Ok(())
    }

    async fn produce(
        &self,
        transport: Option<&TransportHandle>,
        request: ProduceRequest<'_>,
    ) -> Result<CreatedProducer> {
        let transport = transport.ok_or(EngineError::MissingHandle("transport"))?;
        let producer = transport
            .produce(ProduceOptions {
                kind: request.kind.engine_kind(),
                rtp_parameters: request.rtp_parameters.clone(),
                app_data: Self::tag_app_data(request.kind, request.app_data),
            })
            .await?;

        Ok(CreatedProducer {
            id: producer.id(),
            handle: Some(producer),
        })
    }

    async fn consume(
        &self,
        router: Option<&RouterHandle>,
        transport: Option<&TransportHandle>,
        request: ConsumeRequest<'_>,
    ) -> Result<CreatedConsumer> {
        let router = router.ok_or(EngineError::MissingHandle("room"))?;
        let transport = transport.ok_or(EngineError::MissingHandle("transport"))?;

        if !router.can_consume(request.producer_id, request.rtp_capabilities) {
            return Err(Error::CannotConsume);
        }

        let consumer = transport
            .consume(ConsumeOptions {
                producer_id: request.producer_id.clone(),
                rtp_capabilities: request.rtp_capabilities.clone(),
            })
            .await?;

        Ok(CreatedConsumer {
            id: consumer.id(),
            rtp_parameters: consumer.rtp_parameters(),
            handle: Some(consumer),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rtp::{EngineMediaKind, RtpParameters};
    use crate::test_helpers::{recv_capabilities, FakeEngine};
    use crate::types::ProducerId;

    #[test]
    fn test_app_data_tagging() {
        let tagged = NativeEngineAdapter::tag_app_data(
            MediaKind::Screen,
            Some(&serde_json::json!({ "source": "display" })),
        );
        assert_eq!(tagged["kind"], "screen");
        assert_eq!(tagged["source"], "display");

        let bare = NativeEngineAdapter::tag_app_data(MediaKind::Audio, None);
        assert_eq!(bare, serde_json::json!({ "kind": "audio" }));
    }

    #[tokio::test]
    async fn test_screen_producer_uses_engine_video_kind() {
        let engine = Arc::new(FakeEngine::new());
        let adapter = NativeEngineAdapter::new(engine.clone());

        let router = adapter
            .create_router(&RoomId::from("r1"))
            .await
            .unwrap()
            .unwrap();
        let transport = adapter
            .create_transport(Some(&router), TransportDirection::Send)
            .await
            .unwrap();
        let params = RtpParameters::default();
        let producer = adapter
            .produce(
                transport.handle.as_ref(),
                ProduceRequest {
                    kind: MediaKind::Screen,
                    rtp_parameters: &params,
                    app_data: None,
                },
            )
            .await
            .unwrap();

        let (kind, app_data) = engine.producer_options(&producer.id).unwrap();
        assert_eq!(kind, EngineMediaKind::Video);
        assert_eq!(app_data["kind"], "screen");
    }

    #[tokio::test]
    async fn test_incompatible_consume_is_rejected() {
        let engine = Arc::new(FakeEngine::new());
        let adapter = NativeEngineAdapter::new(engine);

        let router = adapter
            .create_router(&RoomId::from("r1"))
            .await
            .unwrap()
            .unwrap();
        let send = adapter
            .create_transport(Some(&router), TransportDirection::Send)
            .await
            .unwrap();
        let recv = adapter
            .create_transport(Some(&router), TransportDirection::Recv)
            .await
            .unwrap();
        let params = RtpParameters::default();
        let producer = adapter
            .produce(
                send.handle.as_ref(),
                ProduceRequest {
                    kind: MediaKind::Video,
                    rtp_parameters: &params,
                    app_data: None,
                },
            )
            .await
            .unwrap();

        let audio_only = recv_capabilities(&[EngineMediaKind::Audio]);
        let result = adapter
            .consume(
                Some(&router),
                recv.handle.as_ref(),
                ConsumeRequest {
                    producer_id: &producer.id,
                    producer_rtp_parameters: &params,
                    rtp_capabilities: &audio_only,
                },
            )
            .await;
        assert!(matches!(result, Err(Error::CannotConsume)));

        let unknown = ProducerId::from("missing");
        let result = adapter
            .consume(
                Some(&router),
                recv.handle.as_ref(),
                ConsumeRequest {
                    producer_id: &unknown,
                    producer_rtp_parameters: &params,
                    rtp_capabilities: &recv_capabilities(&[EngineMediaKind::Video]),
                },
            )
            .await;
        assert!(matches!(result, Err(Error::CannotConsume)));
    }

    #[tokio::test]
    async fn test_missing_handles_are_engine_errors() {
        let adapter = NativeEngineAdapter::new(Arc::new(FakeEngine::new()));
        let result = adapter.create_transport(None, TransportDirection::Send).await;
        assert!(matches!(
            result,
            Err(Error::Engine(EngineError::MissingHandle("room")))
        ));
    }
}
