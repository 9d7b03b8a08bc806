//! The wire frame exchanged by bridges: a magic tag, a routing header, and an opaque body.
//!
//! The core validates nothing about a [`Packet`] beyond JSON well-formedness. Magic checking
//! and authentication on `header.from` are collaborator policy, layered on top.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// `{app_name, major, minor}`: three free-form strings identifying the protocol dialect. The
/// core never inspects it; it round-trips opaquely so collaborators can version their own wire
/// format independently of this crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Magic(pub String, pub String, pub String);

impl Magic {
    pub fn new(app: impl Into<String>, major: impl Into<String>, minor: impl Into<String>) -> Self {
        Self(app.into(), major.into(), minor.into())
    }

    pub fn app(&self) -> &str {
        &self.0
    }

    pub fn major(&self) -> &str {
        &self.1
    }

    pub fn minor(&self) -> &str {
        &self.2
    }
}

/// Routing and timing metadata. Only `to`, `expiration`, and `timestamp` affect core routing;
/// `id` and `type` are opaque to the core and exist for collaborator use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub id: String,

    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,

    /// Time-to-live in nanoseconds. `0` means "no expiration"; the derived lifespan is
    /// unconstrained.
    pub expiration: i64,

    pub to: Vec<String>,

    pub from: Vec<String>,

    #[serde(rename = "type")]
    pub kind: String,
}

/// A complete wire frame: `{magic, header, body}`, with `body` carried as base64 in JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Packet {
    pub magic: Magic,
    pub header: Header,

    #[serde(with = "base64_body")]
    pub body: Vec<u8>,
}

impl Packet {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decode a frame. Unknown fields are tolerated; malformed frames are the caller's concern
    /// to drop (the bridge's reader does so silently).
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Serializes `Vec<u8>` as a base64 string, matching how `encoding/json` marshals `[]byte`.
mod base64_body {
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
        serializer.serialize_str(&encoded)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
