use std::time::Duration;

use crate::db::traits::{LockToken, OrderEngineError};

/// A lease-based mutual exclusion service keyed by a logical resource name, e.g. `order-creation:alice`.
///
/// Leases expire on their own after `ttl`, so a crashed holder cannot block a key forever. Holders must therefore
/// check that they still own the lease (with [`KeyLockProvider::verify`]) before a side-effecting write that follows
/// slow I/O.
#[allow(async_fn_in_trait)]
pub trait KeyLockProvider {
    /// Takes the lease on `key` if it is free or expired. Fails with `LockBusy` if someone else holds it.
    async fn acquire(&self, key: &str, ttl: Duration) -> Result<LockToken, OrderEngineError>;

    /// Gives up the lease. Returns false if the lease had already expired or been taken over.
    async fn release(&self, key: &str, token: &LockToken) -> Result<bool, OrderEngineError>;

    /// Extends a lease that is still held. Returns false if it was lost.
    async fn renew(&self, key: &str, token: &LockToken, ttl: Duration) -> Result<bool, OrderEngineError>;

    /// True if `token` still holds an unexpired lease on `key`.
    async fn verify(&self, key: &str, token: &LockToken) -> Result<bool, OrderEngineError>;
}
