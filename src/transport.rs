//! An unreliable transport simulator standing in for the network.
//!
//! Each request/reply pair draws two independent Bernoulli(p) variables --
//! one for the request direction, one for the reply direction -- and
//! signals a dropped delivery synchronously. The simulator is stateless
//! beyond its RNG and drop rate; it never suspends.

use crate::config::KvConfig;
use crate::model::{GetReply, GetRequest, PutReply, PutRequest};
use crate::service::KvService;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Where a transport's drop/deliver decisions come from.
enum DropSource {
    /// Bernoulli(p) draws from an RNG -- the normal mode.
    Rng(StdRng),

    /// A fixed, pre-determined sequence of decisions, one consumed per
    /// direction per call. Once exhausted, further draws never drop.
    /// Used by tests that need an exact, named drop pattern rather than
    /// a seed that happens to produce one.
    Script(VecDeque<bool>),
}

/// What a caller observes after dispatching a call through the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery<T> {
    /// Neither the request nor the reply was dropped.
    Delivered(T),

    /// The request never reached the server, or the server's reply never
    /// reached the caller. The two cases are indistinguishable to the
    /// caller.
    Dropped,
}

/// Wraps a [`KvService`] with drop simulation on both directions of a call.
pub struct UnreliableTransport {
    service: Arc<KvService>,
    unreliable: bool,
    drop_probability: f64,
    source: Mutex<DropSource>,
}

impl UnreliableTransport {
    /// Builds a transport over `service` using the system RNG. This is the
    /// production constructor; tests that need reproducible drop sequences
    /// should use [`UnreliableTransport::with_seed`] instead.
    pub fn new(service: Arc<KvService>, config: KvConfig) -> Self {
        Self::from_rng(service, config, StdRng::from_entropy())
    }

    /// Builds a transport seeded for deterministic drop sequences in tests.
    pub fn with_seed(service: Arc<KvService>, config: KvConfig, seed: u64) -> Self {
        Self::from_rng(service, config, StdRng::seed_from_u64(seed))
    }

    /// Builds a transport whose drop/deliver decisions follow `script`
    /// exactly, one entry consumed per direction per call, instead of an
    /// RNG. Once `script` runs out, every later draw delivers cleanly.
    pub fn with_script(service: Arc<KvService>, script: Vec<bool>) -> Self {
        UnreliableTransport {
            service,
            unreliable: true,
            drop_probability: 1.0,
            source: Mutex::new(DropSource::Script(script.into())),
        }
    }

    fn from_rng(service: Arc<KvService>, config: KvConfig, rng: StdRng) -> Self {
        UnreliableTransport {
            service,
            unreliable: config.unreliable,
            drop_probability: config.drop_probability,
            source: Mutex::new(DropSource::Rng(rng)),
        }
    }

    fn draw_drop(&self) -> bool {
        let mut source = self.source.lock().unwrap();
        match &mut *source {
            DropSource::Script(script) => script.pop_front().unwrap_or(false),
            DropSource::Rng(rng) => {
                if !self.unreliable || self.drop_probability <= 0.0 {
                    false
                } else {
                    rng.gen_bool(self.drop_probability.min(1.0))
                }
            }
        }
    }

    /// Dispatches a GET through the transport. GET is read-only and does
    /// not touch the dedup cache even under retry.
    pub fn get(&self, request: GetRequest) -> Delivery<GetReply> {
        if self.draw_drop() {
            log::trace!("transport: dropped GET request for key {:?}", request.key);
            return Delivery::Dropped;
        }
        let key = request.key.clone();
        let reply = self.service.get(request);
        if self.draw_drop() {
            log::trace!("transport: dropped GET reply for key {:?}", key);
            return Delivery::Dropped;
        }
        Delivery::Delivered(reply)
    }

    /// Dispatches a PUT through the transport. If the request itself is
    /// dropped the server never executes it; if only the reply is dropped
    /// the server has already mutated its state.
    pub fn put(&self, request: PutRequest) -> Delivery<PutReply> {
        if self.draw_drop() {
            log::trace!(
                "transport: dropped PUT request for key {:?} (client {})",
                request.key,
                request.client_id
            );
            return Delivery::Dropped;
        }
        let reply = self.service.put(request.clone());
        if self.draw_drop() {
            log::trace!(
                "transport: dropped PUT reply for key {:?} (client {})",
                request.key,
                request.client_id
            );
            return Delivery::Dropped;
        }
        Delivery::Delivered(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PutRequest;

    fn service() -> Arc<KvService> {
        Arc::new(KvService::new(KvConfig::default()))
    }

    #[test]
    fn reliable_transport_never_drops() {
        let transport = UnreliableTransport::new(service(), KvConfig::default());
        for _ in 0..50 {
            let reply = transport.get(GetRequest { key: b"x".to_vec() });
            assert!(matches!(reply, Delivery::Delivered(_)));
        }
    }

    #[test]
    fn fully_unreliable_transport_always_drops() {
        let transport =
            UnreliableTransport::with_seed(service(), KvConfig::unreliable(1.0), 7);
        for _ in 0..20 {
            assert_eq!(transport.get(GetRequest { key: b"x".to_vec() }), Delivery::Dropped);
        }
        let put = PutRequest {
            key: b"x".to_vec(),
            value: b"v".to_vec(),
            expected_version: 0,
            client_id: crate::model::ClientId(1),
            seq: 1,
        };
        assert_eq!(transport.put(put), Delivery::Dropped);
    }

    #[test]
    fn seeded_transport_is_reproducible() {
        let a = UnreliableTransport::with_seed(service(), KvConfig::unreliable(0.5), 42);
        let b = UnreliableTransport::with_seed(service(), KvConfig::unreliable(0.5), 42);
        let a_results: Vec<_> = (0..30).map(|_| a.get(GetRequest { key: b"k".to_vec() })).collect();
        let b_results: Vec<_> = (0..30).map(|_| b.get(GetRequest { key: b"k".to_vec() })).collect();
        assert_eq!(a_results, b_results);
    }

    #[test]
    fn scripted_transport_follows_its_script_then_stops_dropping() {
        // call 1: request delivered, reply dropped (net Dropped). call 2: both delivered.
        let transport = UnreliableTransport::with_script(service(), vec![false, true, false, false]);
        assert_eq!(transport.get(GetRequest { key: b"x".to_vec() }), Delivery::Dropped);
        assert!(matches!(transport.get(GetRequest { key: b"x".to_vec() }), Delivery::Delivered(_)));
        // script exhausted: everything delivers from here on.
        for _ in 0..10 {
            assert!(matches!(transport.get(GetRequest { key: b"x".to_vec() }), Delivery::Delivered(_)));
        }
    }
}
