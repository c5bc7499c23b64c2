//! The in-memory versioned key-value service (component D).
//!
//! Every GET and PUT executes under a single mutual-exclusion region
//! covering the dedup-cache lookup, the conditional store mutation and the
//! dedup-cache write. There is no read/write split and no per-key locking:
//! the single critical section is what makes linearizability trivially
//! true.

use crate::config::KvConfig;
use crate::model::{ClientId, Entry, GetReply, GetRequest, PutReply, PutRequest};
use std::collections::HashMap;
use std::sync::Mutex;

/// Diagnostic snapshot, used only for logging -- never for correctness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub keys: usize,
    pub clients_tracked: usize,
}

struct Inner {
    store: HashMap<Vec<u8>, Entry>,
    /// Per-client memoization of the most recent `(seq, reply)` observed.
    /// Only one slot per client: clients are required to issue requests
    /// sequentially, so a single slot is sufficient.
    dedup: HashMap<ClientId, (u64, PutReply)>,
}

/// The process-wide store. Construction and teardown bound its lifetime;
/// there is no persistence across either.
pub struct KvService {
    inner: Mutex<Inner>,
    #[allow(dead_code)]
    config: KvConfig,
}

impl KvService {
    pub fn new(config: KvConfig) -> Self {
        KvService {
            inner: Mutex::new(Inner { store: HashMap::new(), dedup: HashMap::new() }),
            config,
        }
    }

    /// Pure read. Does not touch the dedup cache: reads are idempotent and
    /// carry no side effects even under retry.
    pub fn get(&self, request: GetRequest) -> GetReply {
        let inner = self.inner.lock().unwrap();
        match inner.store.get(&request.key) {
            Some(entry) => GetReply::Found { value: entry.value.clone(), version: entry.version },
            None => GetReply::NoKey,
        }
    }

    /// The version-conditional write algorithm, executed entirely under one
    /// lock acquisition.
    pub fn put(&self, request: PutRequest) -> PutReply {
        let mut inner = self.inner.lock().unwrap();

        if let Some((cached_seq, cached_reply)) = inner.dedup.get(&request.client_id) {
            if *cached_seq == request.seq {
                log::debug!(
                    "service: dedup hit for client {} seq {}, replaying cached reply",
                    request.client_id,
                    request.seq
                );
                return cached_reply.clone();
            }
            if request.seq < *cached_seq {
                // A correct client never produces this; log and execute it as
                // if uncached rather than rejecting it outright.
                log::warn!(
                    "service: stale seq {} from client {} (cache has {}); executing anyway",
                    request.seq,
                    request.client_id,
                    cached_seq
                );
            }
        }

        let reply = match inner.store.get(&request.key) {
            None => {
                if request.expected_version == 0 {
                    inner
                        .store
                        .insert(request.key.clone(), Entry { value: request.value.clone(), version: 1 });
                    PutReply::Ok { version: 1 }
                } else {
                    PutReply::NoKey
                }
            }
            Some(existing) => {
                if request.expected_version == existing.version {
                    let next_version = existing.version + 1;
                    inner.store.insert(
                        request.key.clone(),
                        Entry { value: request.value.clone(), version: next_version },
                    );
                    PutReply::Ok { version: next_version }
                } else {
                    PutReply::VersionMismatch { current_version: existing.version }
                }
            }
        };

        inner.dedup.insert(request.client_id, (request.seq, reply.clone()));
        reply
    }

    /// A point-in-time diagnostic snapshot.
    pub fn status(&self) -> Status {
        let inner = self.inner.lock().unwrap();
        Status { keys: inner.store.len(), clients_tracked: inner.dedup.len() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ClientId;

    fn put(
        service: &KvService,
        key: &[u8],
        value: &[u8],
        expected_version: u64,
        client: ClientId,
        seq: u64,
    ) -> PutReply {
        service.put(PutRequest {
            key: key.to_vec(),
            value: value.to_vec(),
            expected_version,
            client_id: client,
            seq,
        })
    }

    #[test]
    fn create_on_absent_key_with_expected_zero() {
        let service = KvService::new(KvConfig::default());
        let client = ClientId(1);
        assert_eq!(put(&service, b"x", b"a", 0, client, 1), PutReply::Ok { version: 1 });
        assert_eq!(service.get(GetRequest { key: b"x".to_vec() }), GetReply::Found { value: b"a".to_vec(), version: 1 });
    }

    #[test]
    fn create_on_present_key_is_version_mismatch() {
        let service = KvService::new(KvConfig::default());
        let client = ClientId(1);
        put(&service, b"x", b"a", 0, client, 1);
        assert_eq!(
            put(&service, b"x", b"b", 0, client, 2),
            PutReply::VersionMismatch { current_version: 1 }
        );
    }

    #[test]
    fn update_on_absent_key_is_no_key() {
        let service = KvService::new(KvConfig::default());
        let client = ClientId(1);
        assert_eq!(put(&service, b"x", b"a", 5, client, 1), PutReply::NoKey);
    }

    #[test]
    fn get_on_absent_key_is_no_key() {
        let service = KvService::new(KvConfig::default());
        assert_eq!(service.get(GetRequest { key: b"missing".to_vec() }), GetReply::NoKey);
    }

    #[test]
    fn version_increments_by_exactly_one_per_successful_put() {
        let service = KvService::new(KvConfig::default());
        let client = ClientId(1);
        put(&service, b"x", b"a", 0, client, 1);
        put(&service, b"x", b"b", 1, client, 2);
        assert_eq!(put(&service, b"x", b"c", 2, client, 3), PutReply::Ok { version: 3 });
        assert_eq!(service.get(GetRequest { key: b"x".to_vec() }), GetReply::Found { value: b"c".to_vec(), version: 3 });
    }

    #[test]
    fn replaying_same_seq_does_not_mutate_store_twice() {
        let service = KvService::new(KvConfig::default());
        let client = ClientId(1);
        assert_eq!(put(&service, b"y", b"1", 0, client, 1), PutReply::Ok { version: 1 });
        // Replay the identical request: same client, same seq.
        assert_eq!(put(&service, b"y", b"1", 0, client, 1), PutReply::Ok { version: 1 });
        assert_eq!(put(&service, b"y", b"1", 0, client, 1), PutReply::Ok { version: 1 });
        assert_eq!(service.get(GetRequest { key: b"y".to_vec() }), GetReply::Found { value: b"1".to_vec(), version: 1 });
        assert_eq!(service.status(), Status { keys: 1, clients_tracked: 1 });
    }

    #[test]
    fn dedup_returns_recorded_reply_verbatim_even_on_mismatch() {
        let service = KvService::new(KvConfig::default());
        let client = ClientId(1);
        put(&service, b"x", b"a", 0, client, 1);
        let mismatch = put(&service, b"x", b"bad", 0, client, 2);
        assert_eq!(mismatch, PutReply::VersionMismatch { current_version: 1 });
        // Retry with the same seq must return the exact same recorded reply.
        assert_eq!(put(&service, b"x", b"bad", 0, client, 2), mismatch);
    }

    #[test]
    fn get_never_touches_dedup_cache() {
        let service = KvService::new(KvConfig::default());
        service.get(GetRequest { key: b"anything".to_vec() });
        service.get(GetRequest { key: b"anything".to_vec() });
        assert_eq!(service.status(), Status { keys: 0, clients_tracked: 0 });
    }

    #[test]
    fn different_clients_do_not_interfere() {
        let service = KvService::new(KvConfig::default());
        let a = ClientId(1);
        let b = ClientId(2);
        assert_eq!(put(&service, b"x", b"a", 0, a, 1), PutReply::Ok { version: 1 });
        assert_eq!(
            put(&service, b"x", b"b", 0, b, 1),
            PutReply::VersionMismatch { current_version: 1 }
        );
    }
}
