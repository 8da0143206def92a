//! Per-key leases, and the helper that guarantees they are handed back.
use std::{collections::HashMap, future::Future, sync::Arc, time::Duration};

use log::{error, trace, warn};
use tokio::{sync::Mutex, time::Instant};

use crate::db::traits::{KeyLockProvider, LockToken, OrderEngineError};

/// The lock key that serialises order creation for one user.
pub fn checkout_lock_key(user_id: &str) -> String {
    format!("order-creation:{user_id}")
}

/// Runs `f` while holding the lease on `key`.
///
/// The lease is released whether `f` succeeds or fails, and `f`'s result is returned unchanged. A failed release is
/// only logged; the lease will lapse on its own when its TTL runs out.
pub async fn with_lock<L, T, F, Fut>(lock: &L, key: &str, ttl: Duration, f: F) -> Result<T, OrderEngineError>
where
    L: KeyLockProvider,
    F: FnOnce(LockToken) -> Fut,
    Fut: Future<Output = Result<T, OrderEngineError>>,
{
    let token = lock.acquire(key, ttl).await?;
    let result = f(token.clone()).await;
    match lock.release(key, &token).await {
        Ok(true) => trace!("🔒️ Lock {key} released"),
        Ok(false) => warn!("🔒️ Lock {key} had already expired when it was released. Consider a longer TTL."),
        Err(e) => error!("🔒️ Could not release lock {key}. It will expire on its own. {e}"),
    }
    result
}

/// An in-process [`KeyLockProvider`]. Leases are only visible to clones of the same instance, so this is suitable
/// for single-node deployments and tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryKeyLock {
    leases: Arc<Mutex<HashMap<String, Lease>>>,
}

#[derive(Debug, Clone)]
struct Lease {
    token: LockToken,
    expires_at: Instant,
}

impl Lease {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }

    fn is_held_by(&self, token: &LockToken, now: Instant) -> bool {
        self.is_live(now) && &self.token == token
    }
}

impl MemoryKeyLock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyLockProvider for MemoryKeyLock {
    async fn acquire(&self, key: &str, ttl: Duration) -> Result<LockToken, OrderEngineError> {
        let now = Instant::now();
        let mut leases = self.leases.lock().await;
        if leases.get(key).is_some_and(|l| l.is_live(now)) {
            return Err(OrderEngineError::LockBusy(key.to_string()));
        }
        let token = LockToken::random();
        leases.insert(key.to_string(), Lease { token: token.clone(), expires_at: now + ttl });
        Ok(token)
    }

    async fn release(&self, key: &str, token: &LockToken) -> Result<bool, OrderEngineError> {
        let mut leases = self.leases.lock().await;
        match leases.get(key) {
            Some(lease) if &lease.token == token => {
                let live = lease.is_live(Instant::now());
                leases.remove(key);
                Ok(live)
            },
            _ => Ok(false),
        }
    }

    async fn renew(&self, key: &str, token: &LockToken, ttl: Duration) -> Result<bool, OrderEngineError> {
        let now = Instant::now();
        let mut leases = self.leases.lock().await;
        match leases.get_mut(key) {
            Some(lease) if lease.is_held_by(token, now) => {
                lease.expires_at = now + ttl;
                Ok(true)
            },
            _ => Ok(false),
        }
    }

    async fn verify(&self, key: &str, token: &LockToken) -> Result<bool, OrderEngineError> {
        let leases = self.leases.lock().await;
        Ok(leases.get(key).is_some_and(|l| l.is_held_by(token, Instant::now())))
    }
}
