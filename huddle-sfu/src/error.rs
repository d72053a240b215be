use thiserror::Error;

use crate::engine::EngineError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("peer not joined")]
    PeerNotJoined,

    #[error("transport not found")]
    TransportNotFound,

    #[error("invalid send transport")]
    InvalidSendTransport,

    #[error("invalid recv transport")]
    InvalidRecvTransport,

    #[error("producer not found")]
    ProducerNotFound,

    #[error("router cannot consume this producer")]
    CannotConsume,

    #[error("Maximum number of SFU rooms reached")]
    RoomLimitReached,

    #[error("Maximum number of peers reached for this room")]
    PeerLimitReached,

    #[error("Media engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

impl Error {
    /// Whether the signaling layer should surface this error as a rejection of
    /// the client's request. Everything else is an internal failure.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::PeerNotJoined
                | Self::TransportNotFound
                | Self::InvalidSendTransport
                | Self::InvalidRecvTransport
                | Self::ProducerNotFound
                | Self::CannotConsume
                | Self::RoomLimitReached
                | Self::PeerLimitReached
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
