//! Huddle SFU (Selective Forwarding Unit) session controller
//!
//! This crate tracks multi-party media sessions and coordinates the media
//! engine objects behind them. It owns the resource graph of rooms, peers,
//! transports, producers and consumers, and tears it down in dependency order.
//! It works with or without a media engine: when none can be loaded, every
//! operation still succeeds in a signaling-only mode.
//!
//! ## Architecture
//!
//! - **`SfuManager`**: The facade the signaling layer calls into
//! - **`EngineAdapter`**: Native engine or signaling-only stub, chosen once at startup
//! - **`SnapshotStore`**: Best-effort room summaries in a key-value store
//!
//! Internally, one lifecycle component per resource type mutates a shared
//! in-memory registry. Teardown always runs consumers, then producers, then
//! transports, then the room's router.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use huddle_sfu::{Config, SfuManager, TransportDirection};
//!
//! let config = Config::from_env()?;
//! let manager = SfuManager::bootstrap(&config, None).await?;
//!
//! let joined = manager.join_room(&room_id, &user_id, connection_id).await?;
//! let transport = manager
//!     .create_transport(&room_id, &user_id, TransportDirection::Send)
//!     .await?;
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod rtp;
pub mod snapshot;
pub mod store;
pub mod types;

mod cascade;
mod consumer;
mod manager;
mod producer;
mod registry;
mod room;
mod transport;

#[cfg(test)]
mod test_helpers;

pub use cascade::TeardownSummary;
pub use config::Config;
pub use consumer::ConsumerDescriptor;
pub use engine::{EngineAdapter, EngineError, EngineMode, EngineProbe, MediaEngine};
pub use error::{Error, Result};
pub use manager::{RuntimeInfo, SfuManager};
pub use producer::{ProducerDescriptor, ProducerSummary};
pub use registry::RegistryStats;
pub use room::{JoinedRoom, MediaState, PeerMediaState};
pub use rtp::{MediaKind, RtpCapabilities, RtpParameters, TransportDirection};
pub use snapshot::{RoomSnapshot, SnapshotScheduler, SnapshotStore};
pub use store::{KeyValueStore, MemoryKeyValueStore, RedisKeyValueStore};
pub use transport::TransportDescriptor;
pub use types::{ConnectionId, ConsumerId, ProducerId, RoomId, TransportId, UserId};
