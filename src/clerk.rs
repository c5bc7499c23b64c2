//! The fault-tolerant client (component E).
//!
//! The clerk turns best-effort message delivery into the three-outcome
//! contract of [`crate::error::Error`]: a definite success, a definite
//! failure (`NoKey` / `VersionMismatch`), or an ambiguous `Maybe` /
//! `Timeout`. The `ever_sent` flag tracked across retries of a single
//! logical PUT is the one piece of local state that makes the
//! classification correct.

use crate::config::RetryConfig;
use crate::error::{Error, KvResult};
use crate::model::{ClientId, GetReply, GetRequest, PutReply, PutRequest};
use crate::transport::{Delivery, UnreliableTransport};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// State held by one logical actor. Each caller is expected to own its own
/// Clerk; the sequence counter is an atomic so that concurrent callers
/// sharing a Clerk never reuse a seq, but the intended usage is still one
/// caller at a time per in-flight operation.
pub struct Clerk {
    client_id: ClientId,
    seq: AtomicU64,
    transport: Arc<UnreliableTransport>,
    retry: RetryConfig,
}

impl Clerk {
    pub fn new(transport: Arc<UnreliableTransport>, retry: RetryConfig) -> Self {
        Clerk { client_id: ClientId::generate(), seq: AtomicU64::new(0), transport, retry }
    }

    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed) + 1
    }

    async fn backoff(&self, attempt: u32) {
        let delay = self.retry.delay_for_attempt(attempt);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    /// GET is idempotent at the server, so the clerk retries transport
    /// drops up to the configured attempt budget.
    pub async fn get(&self, key: &[u8]) -> KvResult<(Vec<u8>, u64)> {
        for attempt in 0..self.retry.max_attempts {
            match self.transport.get(GetRequest { key: key.to_vec() }) {
                Delivery::Dropped => {
                    log::debug!("clerk {}: GET {:?} dropped, retrying", self.client_id, key);
                    self.backoff(attempt).await;
                }
                Delivery::Delivered(GetReply::Found { value, version }) => {
                    return Ok((value, version));
                }
                Delivery::Delivered(GetReply::NoKey) => return Err(Error::NoKey),
            }
        }
        log::warn!("clerk {}: GET {:?} timed out after {} attempts", self.client_id, key, self.retry.max_attempts);
        Err(Error::Timeout)
    }

    /// Classifies the three-outcome PUT contract using `ever_sent`. Returns
    /// the resulting version on success.
    pub async fn put(&self, key: &[u8], value: Vec<u8>, expected_version: u64) -> KvResult<u64> {
        let seq = self.next_seq();
        let mut ever_sent = false;

        for attempt in 0..self.retry.max_attempts {
            let request = PutRequest {
                key: key.to_vec(),
                value: value.clone(),
                expected_version,
                client_id: self.client_id,
                seq,
            };
            match self.transport.put(request) {
                Delivery::Dropped => {
                    log::debug!(
                        "clerk {}: PUT {:?} seq {} dropped, retrying (ever_sent={})",
                        self.client_id,
                        key,
                        seq,
                        ever_sent
                    );
                    ever_sent = true;
                    self.backoff(attempt).await;
                }
                Delivery::Delivered(PutReply::Ok { version }) => return Ok(version),
                Delivery::Delivered(PutReply::VersionMismatch { .. }) => {
                    return if ever_sent {
                        log::warn!(
                            "clerk {}: PUT {:?} seq {} saw VersionMismatch after a dropped attempt -- surfacing Maybe",
                            self.client_id,
                            key,
                            seq
                        );
                        Err(Error::Maybe)
                    } else {
                        Err(Error::VersionMismatch)
                    };
                }
                Delivery::Delivered(PutReply::NoKey) => {
                    return if ever_sent { Err(Error::Maybe) } else { Err(Error::NoKey) };
                }
            }
        }

        if ever_sent {
            log::warn!(
                "clerk {}: PUT {:?} seq {} exhausted retries after at least one dropped attempt -- surfacing Maybe",
                self.client_id,
                key,
                seq
            );
            Err(Error::Maybe)
        } else {
            Err(Error::Timeout)
        }
    }
}
