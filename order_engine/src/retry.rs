//! Bounded retries for optimistic updates.
//!
//! A versioned write that loses a race reports [`UpdateOutcome::Conflict`]. [`RetryPolicy`] turns that into a
//! re-read and another attempt, sleeping a little longer each time, until either the write lands or the attempt budget
//! is spent. Only then does contention become visible to the caller, as [`OrderEngineError::ConcurrencyExhausted`].
use std::{future::Future, time::Duration};

use log::{trace, warn};
use rand::Rng;

use crate::{
    db::traits::{OrderEngineError, UpdateOutcome, VersionedRecordStore},
    db_types::Versioned,
};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 8;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1);
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: DEFAULT_MAX_ATTEMPTS, base_delay: DEFAULT_BASE_DELAY, max_delay: DEFAULT_MAX_DELAY }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self { max_attempts: max_attempts.max(1), base_delay, max_delay: max_delay.max(base_delay) }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// The longest the policy will wait before retrying attempt number `attempt` (1-based): the base delay doubled
    /// for each earlier attempt, capped at the maximum delay.
    pub fn delay_ceiling(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << shift).min(self.max_delay)
    }

    /// A jittered delay between half the ceiling and the ceiling, so that writers that collided once do not collide
    /// again in lockstep.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let ceiling = self.delay_ceiling(attempt);
        let micros = u64::try_from(ceiling.as_micros()).unwrap_or(u64::MAX);
        if micros < 2 {
            return ceiling;
        }
        Duration::from_micros(rand::thread_rng().gen_range(micros / 2..=micros))
    }

    /// Runs `attempt` until it returns `Updated`, an error, or the attempt budget runs out.
    ///
    /// Errors from `attempt` are returned immediately. Only `Conflict` is retried.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut attempt: F) -> Result<T, OrderEngineError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<UpdateOutcome<T>, OrderEngineError>>,
    {
        for n in 1..=self.max_attempts {
            match attempt().await? {
                UpdateOutcome::Updated(value) => {
                    if n > 1 {
                        trace!("🗃️ {operation} succeeded on attempt {n}");
                    }
                    return Ok(value);
                },
                UpdateOutcome::Conflict if n < self.max_attempts => {
                    let delay = self.backoff(n);
                    trace!("🗃️ {operation} lost a race on attempt {n}. Retrying in {}µs", delay.as_micros());
                    tokio::time::sleep(delay).await;
                },
                UpdateOutcome::Conflict => {},
            }
        }
        warn!("🗃️ Giving up on {operation} after {} conflicting attempts", self.max_attempts);
        Err(OrderEngineError::ConcurrencyExhausted { operation: operation.to_string(), attempts: self.max_attempts })
    }

    /// Re-reads the record and applies `mutator` to it through [`VersionedRecordStore::update`], retrying on
    /// conflict. `mutator` sees the freshest state on every attempt, so business checks made inside it (such as
    /// "is there enough stock?") are never made against stale data.
    pub async fn update_record<R, S, F>(&self, store: &S, id: i64, mutator: F) -> Result<R, OrderEngineError>
    where
        R: Versioned + Clone,
        S: VersionedRecordStore<R>,
        F: Fn(&R) -> Result<R, OrderEngineError>,
    {
        let mutator = &mutator;
        let operation = format!("update of {} #{id}", R::ENTITY);
        self.run(&operation, move || async move {
            let current = store.fetch_record(id).await?.ok_or_else(|| OrderEngineError::not_found::<R>(id))?;
            store.update(id, current.version(), mutator).await
        })
        .await
    }
}
