//! A distributed mutual-exclusion lock (component F) built entirely on top
//! of the clerk's public contract -- no server-side lock primitive exists.
//! Mutual exclusion falls out of the KV service's version-conditional
//! write: at most one PUT can observe the expected version at a time, so at
//! most one owner-id can ever become the value of the lock key.

use crate::clerk::Clerk;
use crate::config::LockConfig;
use crate::error::Error;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// The conventional "not held" value stored in a lock key.
pub const FREE_MARKER: &[u8] = b"";

/// One instance of a lock on a given key. Two `Lock`s targeting the same
/// key are distinct actors with distinct owner-ids.
pub struct Lock {
    clerk: Arc<Clerk>,
    lock_key: Vec<u8>,
    owner_id: String,
    config: LockConfig,
}

/// RAII sugar returned by [`Lock::acquire_guard`]. Dropping it makes a
/// best-effort, fire-and-forget release on the ambient tokio runtime,
/// since `Drop` cannot `.await`. Release is not required for correctness
/// of exclusion -- callers that need a release to be observed
/// before proceeding should call [`Lock::release`] directly instead of
/// relying on guard drop timing.
pub struct LockGuard<'a> {
    lock: Option<&'a Lock>,
}

impl<'a> Drop for LockGuard<'a> {
    fn drop(&mut self) {
        if let Some(lock) = self.lock.take() {
            let clerk = lock.clerk.clone();
            let lock_key = lock.lock_key.clone();
            let owner_id = lock.owner_id.clone();
            let config = lock.config.clone();
            tokio::spawn(async move {
                let released = Lock { clerk, lock_key, owner_id, config };
                released.release().await;
            });
        }
    }
}

impl Lock {
    pub fn new(clerk: Arc<Clerk>, lock_key: Vec<u8>) -> Self {
        Self::with_config(clerk, lock_key, LockConfig::default())
    }

    pub fn with_config(clerk: Arc<Clerk>, lock_key: Vec<u8>, config: LockConfig) -> Self {
        Lock { clerk, lock_key, owner_id: generate_owner_id(), config }
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    /// Attempts to acquire the lock, looping until `timeout` elapses.
    /// Terminates in at most two round trips under no contention (an
    /// initial read, then a create or take-over).
    pub async fn acquire(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;

        loop {
            if Instant::now() >= deadline {
                return false;
            }

            match self.clerk.get(&self.lock_key).await {
                Err(Error::NoKey) => match self.try_create().await {
                    TakeoverOutcome::Acquired => {
                        log::debug!("lock {}: acquired by create", self.owner_id);
                        return true;
                    }
                    TakeoverOutcome::LostRace => {
                        self.sleep_poll_interval(deadline).await;
                    }
                    TakeoverOutcome::Retry => {
                        // Ambiguous create: re-read and decide by owner-id.
                    }
                },
                Ok((value, _version)) if value.as_slice() == self.owner_id.as_bytes() => {
                    log::debug!("lock {}: already held (recovered)", self.owner_id);
                    return true;
                }
                Ok((value, version)) if value == FREE_MARKER => {
                    match self.try_takeover(version).await {
                        TakeoverOutcome::Acquired => {
                            log::debug!("lock {}: acquired by takeover", self.owner_id);
                            return true;
                        }
                        TakeoverOutcome::LostRace => {
                            self.sleep_poll_interval(deadline).await;
                        }
                        TakeoverOutcome::Retry => {}
                    }
                }
                Ok(_held_by_other) => {
                    self.sleep_poll_interval(deadline).await;
                }
                Err(Error::Maybe) | Err(Error::Timeout) => {
                    // Ambiguous read: loop and try again.
                }
                Err(other) => {
                    log::warn!("lock {}: unexpected GET error {:?}, retrying", self.owner_id, other);
                }
            }
        }
    }

    async fn try_create(&self) -> TakeoverOutcome {
        match self.clerk.put(&self.lock_key, self.owner_id.as_bytes().to_vec(), 0).await {
            Ok(_) => TakeoverOutcome::Acquired,
            Err(Error::VersionMismatch) | Err(Error::NoKey) => TakeoverOutcome::LostRace,
            Err(Error::Maybe) => self.resolve_ambiguous_claim().await,
            Err(_timeout) => TakeoverOutcome::Retry,
        }
    }

    async fn try_takeover(&self, observed_version: u64) -> TakeoverOutcome {
        match self
            .clerk
            .put(&self.lock_key, self.owner_id.as_bytes().to_vec(), observed_version)
            .await
        {
            Ok(_) => TakeoverOutcome::Acquired,
            Err(Error::VersionMismatch) => TakeoverOutcome::LostRace,
            Err(Error::Maybe) => self.resolve_ambiguous_claim().await,
            Err(_timeout) => TakeoverOutcome::Retry,
        }
    }

    /// After a `Maybe` from a create/takeover attempt, re-read the key: if
    /// it now shows our own owner-id, our write actually landed.
    async fn resolve_ambiguous_claim(&self) -> TakeoverOutcome {
        match self.clerk.get(&self.lock_key).await {
            Ok((value, _)) if value.as_slice() == self.owner_id.as_bytes() => {
                TakeoverOutcome::Acquired
            }
            _ => TakeoverOutcome::Retry,
        }
    }

    async fn sleep_poll_interval(&self, deadline: Instant) {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let delay = self.config.poll_interval.min(remaining);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    /// Releases the lock if we still hold it. A no-op (and not an error)
    /// if we do not own it -- releasing a lock you do not hold is the
    /// caller's bug, but must not corrupt state.
    pub async fn release(&self) {
        let (value, version) = match self.clerk.get(&self.lock_key).await {
            Ok(v) => v,
            Err(_) => return,
        };
        if value.as_slice() != self.owner_id.as_bytes() {
            return;
        }

        match self.clerk.put(&self.lock_key, FREE_MARKER.to_vec(), version).await {
            Ok(_) => log::debug!("lock {}: released", self.owner_id),
            Err(Error::Maybe) => {
                // Treated as success iff a follow-up read shows we no
                // longer hold it; otherwise retry once.
                if let Ok((value, version)) = self.clerk.get(&self.lock_key).await {
                    if value.as_slice() == self.owner_id.as_bytes() {
                        let _ = self.clerk.put(&self.lock_key, FREE_MARKER.to_vec(), version).await;
                    }
                }
            }
            Err(_) => {}
        }
    }

    /// Scoped-acquisition sugar: acquires and, on success, returns a guard
    /// whose drop makes a best-effort release.
    pub async fn acquire_guard(&self, timeout: Duration) -> Option<LockGuard<'_>> {
        if self.acquire(timeout).await {
            Some(LockGuard { lock: Some(self) })
        } else {
            None
        }
    }
}

enum TakeoverOutcome {
    Acquired,
    LostRace,
    Retry,
}

fn generate_owner_id() -> String {
    use rand::Rng;
    let raw: u64 = rand::thread_rng().gen();
    format!("owner-{:016x}", raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{KvConfig, RetryConfig};
    use crate::service::KvService;
    use crate::transport::UnreliableTransport;
    use std::sync::Arc;

    fn lock_on(key: &[u8], transport: Arc<UnreliableTransport>) -> Lock {
        Lock::new(Arc::new(Clerk::new(transport, RetryConfig::default())), key.to_vec())
    }

    fn reliable_transport() -> Arc<UnreliableTransport> {
        Arc::new(UnreliableTransport::new(Arc::new(KvService::new(KvConfig::default())), KvConfig::default()))
    }

    #[tokio::test]
    async fn acquire_on_fresh_key_succeeds_and_stamps_owner() {
        let transport = reliable_transport();
        let lock = lock_on(b"m", transport.clone());
        assert!(lock.acquire(Duration::from_secs(1)).await);

        let observer = Clerk::new(transport, RetryConfig::default());
        let (value, _version) = observer.get(b"m").await.unwrap();
        assert_eq!(value, lock.owner_id().as_bytes());
    }

    #[tokio::test]
    async fn second_acquire_fails_until_release() {
        let transport = reliable_transport();
        let l1 = lock_on(b"m", transport.clone());
        let l2 = lock_on(b"m", transport.clone());

        assert!(l1.acquire(Duration::from_secs(1)).await);
        assert!(!l2.acquire(Duration::from_millis(100)).await);

        l1.release().await;
        assert!(l2.acquire(Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn takeover_after_release_bumps_version_twice() {
        let transport = reliable_transport();
        let l1 = lock_on(b"m", transport.clone());
        assert!(l1.acquire(Duration::from_secs(1)).await);

        let observer = Clerk::new(transport.clone(), RetryConfig::default());
        let (_, v_before_release) = observer.get(b"m").await.unwrap();

        l1.release().await;
        let l2 = lock_on(b"m", transport.clone());
        assert!(l2.acquire(Duration::from_secs(1)).await);

        let (value, version) = observer.get(b"m").await.unwrap();
        assert_eq!(value, l2.owner_id().as_bytes());
        assert_eq!(version, v_before_release + 2);
    }

    #[tokio::test]
    async fn release_of_unheld_lock_is_a_silent_no_op() {
        let transport = reliable_transport();
        let l1 = lock_on(b"m", transport.clone());
        let l2 = lock_on(b"m", transport.clone());

        assert!(l1.acquire(Duration::from_secs(1)).await);
        // l2 never acquired; releasing must not disturb l1's hold.
        l2.release().await;

        let observer = Clerk::new(transport, RetryConfig::default());
        let (value, _) = observer.get(b"m").await.unwrap();
        assert_eq!(value, l1.owner_id().as_bytes());
    }

    #[tokio::test]
    async fn acquire_guard_releases_on_drop() {
        let transport = reliable_transport();
        let lock = lock_on(b"m", transport.clone());
        {
            let guard = lock.acquire_guard(Duration::from_secs(1)).await;
            assert!(guard.is_some());
        }
        // Drop spawned a background release; give it a tick to run.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let l2 = lock_on(b"m", transport);
        assert!(l2.acquire(Duration::from_secs(1)).await);
    }
}
