//! RTP, ICE and DTLS parameter types exchanged with clients and the media engine
//!
//! The controller treats most of these as opaque payloads. Only the codec list of
//! [`RtpCapabilities`] is inspected, to build the fallback capability set and to
//! decide which media kinds a receiver can accept.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use webrtc::api::media_engine::{MIME_TYPE_OPUS, MIME_TYPE_VP8};

/// Logical media kind of a producer or consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
    Screen,
}

impl MediaKind {
    /// Kind understood by the media engine, which has no notion of screen sharing
    #[must_use]
    pub const fn engine_kind(self) -> EngineMediaKind {
        match self {
            Self::Audio => EngineMediaKind::Audio,
            Self::Video | Self::Screen => EngineMediaKind::Video,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Audio => "audio",
            Self::Video => "video",
            Self::Screen => "screen",
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Media kind taxonomy of the engine itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineMediaKind {
    Audio,
    Video,
}

/// Direction of a transport, fixed at creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportDirection {
    Send,
    Recv,
}

impl TransportDirection {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Send => "send",
            Self::Recv => "recv",
        }
    }
}

impl std::fmt::Display for TransportDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RtcpFeedback {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub parameter: String,
}

impl RtcpFeedback {
    fn new(kind: &str, parameter: &str) -> Self {
        Self {
            kind: kind.to_string(),
            parameter: parameter.to_string(),
        }
    }
}

/// A codec entry of a capability set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RtpCodecCapability {
    pub kind: EngineMediaKind,
    pub mime_type: String,
    pub clock_rate: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channels: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_payload_type: Option<u8>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub parameters: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rtcp_feedback: Vec<RtcpFeedback>,
}

/// RTP capabilities of a router or of a receiving client
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RtpCapabilities {
    #[serde(default)]
    pub codecs: Vec<RtpCodecCapability>,
    #[serde(default)]
    pub header_extensions: Vec<Value>,
}

impl RtpCapabilities {
    /// Hard-coded capabilities advertised when no router is available, so that
    /// client-side device loading still completes in signaling-only mode.
    #[must_use]
    pub fn fallback() -> Self {
        Self {
            codecs: vec![
                RtpCodecCapability {
                    kind: EngineMediaKind::Audio,
                    mime_type: MIME_TYPE_OPUS.to_string(),
                    clock_rate: 48000,
                    channels: Some(2),
                    preferred_payload_type: Some(100),
                    parameters: Map::new(),
                    rtcp_feedback: vec![RtcpFeedback::new("transport-cc", "")],
                },
                RtpCodecCapability {
                    kind: EngineMediaKind::Video,
                    mime_type: MIME_TYPE_VP8.to_string(),
                    clock_rate: 90000,
                    channels: None,
                    preferred_payload_type: Some(101),
                    parameters: Map::new(),
                    rtcp_feedback: vec![
                        RtcpFeedback::new("nack", ""),
                        RtcpFeedback::new("nack", "pli"),
                        RtcpFeedback::new("ccm", "fir"),
                        RtcpFeedback::new("goog-remb", ""),
                        RtcpFeedback::new("transport-cc", ""),
                    ],
                },
            ],
            header_extensions: Vec::new(),
        }
    }

    /// Whether any codec of the given engine kind is present
    #[must_use]
    pub fn supports(&self, kind: EngineMediaKind) -> bool {
        self.codecs.iter().any(|codec| codec.kind == kind)
    }
}

/// Codec set every per-room router is created with
#[must_use]
pub fn router_media_codecs() -> Vec<RtpCodecCapability> {
    let mut vp8_parameters = Map::new();
    vp8_parameters.insert("x-google-start-bitrate".to_string(), Value::from(1000));

    vec![
        RtpCodecCapability {
            kind: EngineMediaKind::Audio,
            mime_type: MIME_TYPE_OPUS.to_string(),
            clock_rate: 48000,
            channels: Some(2),
            preferred_payload_type: None,
            parameters: Map::new(),
            rtcp_feedback: Vec::new(),
        },
        RtpCodecCapability {
            kind: EngineMediaKind::Video,
            mime_type: MIME_TYPE_VP8.to_string(),
            clock_rate: 90000,
            channels: None,
            preferred_payload_type: None,
            parameters: vp8_parameters,
            rtcp_feedback: Vec::new(),
        },
    ]
}

/// RTP send parameters supplied by the producing client, passed through untouched
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RtpParameters(pub Value);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DtlsRole {
    Auto,
    Client,
    Server,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DtlsFingerprint {
    pub algorithm: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DtlsParameters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<DtlsRole>,
    #[serde(default)]
    pub fingerprints: Vec<DtlsFingerprint>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceParameters {
    pub username_fragment: String,
    pub password: String,
    #[serde(default)]
    pub ice_lite: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub foundation: String,
    pub priority: u32,
    pub ip: String,
    pub protocol: String,
    pub port: u16,
    #[serde(rename = "type")]
    pub candidate_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tcp_type: Option<String>,
}
