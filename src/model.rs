//! Immutable value types naming each operation and its outcome.
//!
//! These are the wire-shaped records of the system even though there is no
//! wire: a [`crate::transport::UnreliableTransport`] calls straight through
//! to a [`crate::service::KvService`], but the request/reply split is kept
//! explicit because the dedup cache keys off exactly these fields.

use rand::Rng;
use serde_derive::{Deserialize, Serialize};
use std::fmt;

/// A durable-for-the-process client identifier. High-entropy, generated
/// once per [`crate::clerk::Clerk`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientId(pub u64);

impl ClientId {
    /// Generates a fresh, high-entropy client id.
    pub fn generate() -> Self {
        ClientId(rand::thread_rng().gen())
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client-{:016x}", self.0)
    }
}

/// An in-memory entry: a value paired with its version. Version 0 is
/// reserved to mean "no entry"; see [`crate::service`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub value: Vec<u8>,
    pub version: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetRequest {
    pub key: Vec<u8>,
}

/// The server's reply to a GET. Read-only: never touches the dedup cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GetReply {
    Found { value: Vec<u8>, version: u64 },
    NoKey,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutRequest {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub expected_version: u64,
    pub client_id: ClientId,
    pub seq: u64,
}

/// The server's reply to a PUT. Carries the resulting/current version on
/// the definitive branches so the dedup cache and callers can assert exact
/// versions without an extra round trip -- a harmless enrichment beyond the
/// minimal taxonomy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PutReply {
    Ok { version: u64 },
    NoKey,
    VersionMismatch { current_version: u64 },
}
