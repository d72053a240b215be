//! Shared fixtures for unit tests: an in-process media engine and ready-made
//! lifecycle contexts for both adapter modes.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::config::SfuConfig;
use crate::engine::{
    ConsumeOptions, ConsumerHandle, EngineConsumer, EngineError, EngineProducer, EngineRouter,
    EngineTransport, MediaEngine, NativeEngineAdapter, ProduceOptions, ProducerHandle,
    RouterHandle, StubEngineAdapter, TransportHandle,
};
use crate::registry::SfuContext;
use crate::rtp::{
    router_media_codecs, DtlsFingerprint, DtlsParameters, DtlsRole, EngineMediaKind, IceCandidate,
    IceParameters, RtpCapabilities, RtpCodecCapability, RtpParameters,
};
use crate::store::{KeyValueStore, MemoryKeyValueStore};
use crate::types::{ConsumerId, ProducerId, TransportId};

pub fn stub_context() -> SfuContext {
    SfuContext::new(Arc::new(StubEngineAdapter::new()), SfuConfig::default())
}

pub fn native_context() -> (SfuContext, Arc<FakeEngine>) {
    let engine = Arc::new(FakeEngine::new());
    let ctx = SfuContext::new(
        Arc::new(NativeEngineAdapter::new(engine.clone())),
        SfuConfig::default(),
    );
    (ctx, engine)
}

/// Receiver capabilities limited to the given kinds
pub fn recv_capabilities(kinds: &[EngineMediaKind]) -> RtpCapabilities {
    let mut caps = RtpCapabilities::fallback();
    caps.codecs.retain(|codec| kinds.contains(&codec.kind));
    caps
}

/// In-memory store whose writes land only after `delay`
pub struct SlowWriteStore {
    inner: MemoryKeyValueStore,
    delay: Duration,
}

impl SlowWriteStore {
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: MemoryKeyValueStore::new(),
            delay,
        }
    }
}

#[async_trait]
impl KeyValueStore for SlowWriteStore {
    async fn get(&self, key: &str) -> crate::Result<Option<String>> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str, ttl_seconds: u64) -> crate::Result<()> {
        tokio::time::sleep(self.delay).await;
        self.inner.set(key, value, ttl_seconds).await
    }

    async fn del(&self, key: &str) -> crate::Result<()> {
        self.inner.del(key).await
    }
}

struct ProducerEntry {
    kind: EngineMediaKind,
    app_data: Value,
    closed: CancellationToken,
}

#[derive(Default)]
struct TransportEntry {
    closed: CancellationToken,
    consumers: Vec<CancellationToken>,
}

#[derive(Default)]
struct EngineState {
    routers_created: AtomicUsize,
    connects: AtomicUsize,
    closes: AtomicUsize,
    close_calls: AtomicUsize,
    producers: Mutex<HashMap<ProducerId, ProducerEntry>>,
    transports: Mutex<HashMap<TransportId, TransportEntry>>,
    /// Close token of every object ever created
    objects: Mutex<Vec<CancellationToken>>,

    pause_next: AtomicBool,
    suspended: Notify,
    resume: Notify,
}

impl EngineState {
    fn track(&self, token: &CancellationToken) {
        self.objects.lock().push(token.clone());
    }

    /// Hold the first creation call after `pause_next_call` until `resume`.
    /// The new object already exists while the call is held.
    async fn checkpoint(&self) {
        if self.pause_next.swap(false, Ordering::SeqCst) {
            self.suspended.notify_one();
            self.resume.notified().await;
        }
    }

    /// Cancel `token` on behalf of an explicit close; repeated closes are not counted
    fn close(&self, token: &CancellationToken) {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        if !token.is_cancelled() {
            self.closes.fetch_add(1, Ordering::SeqCst);
            token.cancel();
        }
    }

    fn close_transport(&self, transport_id: &TransportId, explicit: bool) {
        let transports = self.transports.lock();
        let Some(entry) = transports.get(transport_id) else {
            return;
        };
        if explicit {
            self.close(&entry.closed);
        } else {
            entry.closed.cancel();
        }
        for consumer in &entry.consumers {
            consumer.cancel();
        }
    }
}

/// Media engine double. Routers accept any producer they created, subject to the
/// receiver supporting its kind; closing a transport or producer closes whatever
/// depends on it, like a real engine would.
#[derive(Default)]
pub struct FakeEngine {
    state: Arc<EngineState>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn capabilities_for(codecs: Vec<RtpCodecCapability>) -> RtpCapabilities {
        let payload_types = [111u8, 96];
        RtpCapabilities {
            codecs: codecs
                .into_iter()
                .zip(payload_types)
                .map(|(mut codec, pt)| {
                    codec.preferred_payload_type = Some(pt);
                    codec
                })
                .collect(),
            header_extensions: Vec::new(),
        }
    }

    /// Capabilities every router of this engine reports
    pub fn router_capabilities(&self) -> RtpCapabilities {
        Self::capabilities_for(router_media_codecs())
    }

    pub fn routers_created(&self) -> usize {
        self.state.routers_created.load(Ordering::SeqCst)
    }

    pub fn connect_count(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    /// Explicit closes of live engine objects
    pub fn close_count(&self) -> usize {
        self.state.closes.load(Ordering::SeqCst)
    }

    /// Every `close()` made on an engine object, including already closed ones
    pub fn close_calls(&self) -> usize {
        self.state.close_calls.load(Ordering::SeqCst)
    }

    /// Engine objects created and not closed yet
    pub fn live_objects(&self) -> usize {
        self.state
            .objects
            .lock()
            .iter()
            .filter(|token| !token.is_cancelled())
            .count()
    }

    /// Suspend the next router, transport, producer or consumer creation right
    /// after the engine object is built
    pub fn pause_next_call(&self) {
        self.state.pause_next.store(true, Ordering::SeqCst);
    }

    pub async fn wait_until_suspended(&self) {
        self.state.suspended.notified().await;
    }

    pub fn resume(&self) {
        self.state.resume.notify_one();
    }

    pub fn producer_options(&self, producer_id: &ProducerId) -> Option<(EngineMediaKind, Value)> {
        self.state
            .producers
            .lock()
            .get(producer_id)
            .map(|entry| (entry.kind, entry.app_data.clone()))
    }

    /// Simulate the engine tearing a transport down on its own (ICE failure)
    pub fn close_transport_externally(&self, transport_id: &TransportId) {
        self.state.close_transport(transport_id, false);
    }

    pub fn close_producer_externally(&self, producer_id: &ProducerId) {
        if let Some(entry) = self.state.producers.lock().get(producer_id) {
            entry.closed.cancel();
        }
    }
}

#[async_trait]
impl MediaEngine for FakeEngine {
    async fn create_router(
        &self,
        media_codecs: Vec<RtpCodecCapability>,
    ) -> Result<RouterHandle, EngineError> {
        let n = self.state.routers_created.fetch_add(1, Ordering::SeqCst);
        let closed = CancellationToken::new();
        self.state.track(&closed);
        let router = Arc::new(FakeRouter {
            id: format!("router-{n}"),
            capabilities: Self::capabilities_for(media_codecs),
            state: self.state.clone(),
            closed,
        });
        self.state.checkpoint().await;
        Ok(router)
    }
}

struct FakeRouter {
    id: String,
    capabilities: RtpCapabilities,
    state: Arc<EngineState>,
    closed: CancellationToken,
}

#[async_trait]
impl EngineRouter for FakeRouter {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn rtp_capabilities(&self) -> RtpCapabilities {
        self.capabilities.clone()
    }

    fn can_consume(&self, producer_id: &ProducerId, rtp_capabilities: &RtpCapabilities) -> bool {
        self.state
            .producers
            .lock()
            .get(producer_id)
            .is_some_and(|entry| rtp_capabilities.supports(entry.kind))
    }

    async fn create_webrtc_transport(&self) -> Result<TransportHandle, EngineError> {
        if self.closed.is_cancelled() {
            return Err(EngineError::Router("router closed".to_string()));
        }

        let id = TransportId::generate();
        let closed = self.closed.child_token();
        self.state.transports.lock().insert(
            id.clone(),
            TransportEntry {
                closed: closed.clone(),
                consumers: Vec::new(),
            },
        );
        self.state.track(&closed);
        let transport = Arc::new(FakeTransport {
            id,
            state: self.state.clone(),
            closed,
        });
        self.state.checkpoint().await;
        Ok(transport)
    }

    fn close(&self) {
        self.state.close(&self.closed);
    }
}

struct FakeTransport {
    id: TransportId,
    state: Arc<EngineState>,
    closed: CancellationToken,
}

#[async_trait]
impl EngineTransport for FakeTransport {
    fn id(&self) -> TransportId {
        self.id.clone()
    }

    fn ice_parameters(&self) -> IceParameters {
        IceParameters {
            username_fragment: format!("ufrag-{}", self.id),
            password: "secret".to_string(),
            ice_lite: true,
        }
    }

    fn ice_candidates(&self) -> Vec<IceCandidate> {
        vec![IceCandidate {
            foundation: "udpcandidate".to_string(),
            priority: 1_076_302_079,
            ip: "127.0.0.1".to_string(),
            protocol: "udp".to_string(),
            port: 40000,
            candidate_type: "host".to_string(),
            tcp_type: None,
        }]
    }

    fn dtls_parameters(&self) -> DtlsParameters {
        DtlsParameters {
            role: Some(DtlsRole::Auto),
            fingerprints: vec![DtlsFingerprint {
                algorithm: "sha-256".to_string(),
                value: "FA:KE".to_string(),
            }],
        }
    }

    async fn connect(&self, _dtls_parameters: DtlsParameters) -> Result<(), EngineError> {
        if self.closed.is_cancelled() {
            return Err(EngineError::Transport("transport closed".to_string()));
        }
        self.state.connects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn produce(&self, options: ProduceOptions) -> Result<ProducerHandle, EngineError> {
        let id = ProducerId::generate();
        let closed = self.closed.child_token();
        self.state.producers.lock().insert(
            id.clone(),
            ProducerEntry {
                kind: options.kind,
                app_data: options.app_data,
                closed: closed.clone(),
            },
        );
        self.state.track(&closed);
        let producer = Arc::new(FakeProducer {
            id,
            state: self.state.clone(),
            closed,
        });
        self.state.checkpoint().await;
        Ok(producer)
    }

    async fn consume(&self, options: ConsumeOptions) -> Result<ConsumerHandle, EngineError> {
        let closed = self
            .state
            .producers
            .lock()
            .get(&options.producer_id)
            .map(|entry| entry.closed.child_token())
            .ok_or_else(|| EngineError::Consumer("unknown producer".to_string()))?;

        if let Some(entry) = self.state.transports.lock().get_mut(&self.id) {
            entry.consumers.push(closed.clone());
        }
        self.state.track(&closed);

        let consumer = Arc::new(FakeConsumer {
            id: ConsumerId::generate(),
            rtp_parameters: RtpParameters(serde_json::json!({
                "producerId": options.producer_id,
                "codecs": options.rtp_capabilities.codecs,
            })),
            state: self.state.clone(),
            closed,
        });
        self.state.checkpoint().await;
        Ok(consumer)
    }

    fn close(&self) {
        self.state.close_transport(&self.id, true);
    }
}

struct FakeProducer {
    id: ProducerId,
    state: Arc<EngineState>,
    closed: CancellationToken,
}

impl EngineProducer for FakeProducer {
    fn id(&self) -> ProducerId {
        self.id.clone()
    }

    fn close(&self) {
        self.state.close(&self.closed);
    }

    fn closed(&self) -> CancellationToken {
        self.closed.clone()
    }
}

struct FakeConsumer {
    id: ConsumerId,
    rtp_parameters: RtpParameters,
    state: Arc<EngineState>,
    closed: CancellationToken,
}

impl EngineConsumer for FakeConsumer {
    fn id(&self) -> ConsumerId {
        self.id.clone()
    }

    fn rtp_parameters(&self) -> RtpParameters {
        self.rtp_parameters.clone()
    }

    fn close(&self) {
        self.state.close(&self.closed);
    }

    fn closed(&self) -> CancellationToken {
        self.closed.clone()
    }
}
