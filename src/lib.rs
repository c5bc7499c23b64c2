//! `dkv` is an educational distributed key-value store: a versioned,
//! linearizable in-memory service (component D) that survives an
//! unreliable, message-dropping transport (component C) by providing
//! at-most-once PUT semantics via a per-client dedup cache; a
//! fault-tolerant clerk (component E) that turns best-effort delivery into
//! a three-outcome contract (definite success, definite failure, or
//! ambiguous "maybe"); and a distributed mutual-exclusion lock (component
//! F) built entirely from version-conditional writes, with no server-side
//! lock primitive.
//!
//! ## Getting started
//!
//! ```
//! use dkv::clerk::Clerk;
//! use dkv::config::{KvConfig, RetryConfig};
//! use dkv::service::KvService;
//! use dkv::transport::UnreliableTransport;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let service = Arc::new(KvService::new(KvConfig::default()));
//!     let transport = Arc::new(UnreliableTransport::new(service, KvConfig::default()));
//!     let clerk = Clerk::new(transport, RetryConfig::default());
//!
//!     clerk.put(b"x", b"a".to_vec(), 0).await.unwrap();
//!     let (value, version) = clerk.get(b"x").await.unwrap();
//!     assert_eq!((value, version), (b"a".to_vec(), 1));
//! }
//! ```

pub mod clerk;
pub mod config;
pub mod error;
pub mod lock;
pub mod model;
pub mod service;
pub mod transport;

pub use clerk::Clerk;
pub use error::{Error, KvResult};
pub use lock::Lock;
pub use service::KvService;
pub use transport::UnreliableTransport;
