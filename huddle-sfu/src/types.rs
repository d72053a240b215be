//! Common identifier types used throughout the SFU implementation

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Generate a fresh 12-character nanoid
            #[must_use]
            pub fn generate() -> Self {
                Self(nanoid::nanoid!(12))
            }

            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

string_id!(
    /// Identifier of a media room, chosen by the caller
    RoomId
);

string_id!(
    /// Identifier of a user participating in rooms
    UserId
);

string_id!(
    /// Identifier of the signaling connection currently bound to a peer
    ConnectionId
);

string_id!(
    /// Identifier of a send or receive transport
    TransportId
);

string_id!(
    /// Identifier of a media producer
    ProducerId
);

string_id!(
    /// Identifier of a media consumer
    ConsumerId
);
