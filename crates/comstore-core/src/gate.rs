//! Rate-limited call gate.
//!
//! [`RateGate::run`] wraps any remote-call future with a global concurrency
//! cap and a shared backoff. Callers beyond the cap wait in FIFO order. When
//! a call fails with a rate-limit classification every caller waits for the
//! backoff window before its call starts. The gate never retries.
//!
//! The gate also carries the last known remaining API quota, which the
//! setup sequence and the queue processor use to size their work.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{Semaphore, SemaphorePermit};
use tokio::time::Instant;
use tracing::{debug, warn};

/// Default concurrency cap.
pub const DEFAULT_MAX_CONCURRENT: usize = 10;

/// Default backoff after a rate-limited failure.
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(5);

/// Calls kept in reserve for interactive use.
pub const QUOTA_RESERVE: u64 = 1000;

/// Approximate API calls one repository update costs.
pub const CALLS_PER_UPDATE: u64 = 15;

/// Tuning for a [`RateGate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateConfig {
    pub max_concurrent: usize,
    pub backoff: Duration,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            backoff: DEFAULT_BACKOFF,
        }
    }
}

/// Classifies an error as "rate limited".
pub trait RateLimitClassify {
    fn is_rate_limited(&self) -> bool;
}

/// The gate was closed while a call waited for a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Rate gate is closed")]
pub struct GateClosed;

/// Number of repository updates the remaining quota allows.
pub const fn fetch_updates_for(remaining: u64) -> u64 {
    if remaining <= QUOTA_RESERVE {
        return 0;
    }
    (remaining - QUOTA_RESERVE) / CALLS_PER_UPDATE
}

/// Concurrency-capping, backoff-aware wrapper for remote calls.
#[derive(Debug)]
pub struct RateGate {
    permits: Semaphore,
    max_concurrent: usize,
    backoff: Duration,
    backoff_until: Mutex<Option<Instant>>,
    in_flight: AtomicUsize,
    remaining: Mutex<Option<u64>>,
}

impl Default for RateGate {
    fn default() -> Self {
        Self::new(GateConfig::default())
    }
}

impl RateGate {
    pub fn new(config: GateConfig) -> Self {
        let max_concurrent = config.max_concurrent.max(1);
        Self {
            permits: Semaphore::new(max_concurrent),
            max_concurrent,
            backoff: config.backoff,
            backoff_until: Mutex::new(None),
            in_flight: AtomicUsize::new(0),
            remaining: Mutex::new(None),
        }
    }

    /// Run `operation` through the gate.
    ///
    /// The future is not polled until a slot is held and any backoff window
    /// has passed. The slot is released on every exit path.
    pub async fn run<F, T, E>(&self, operation: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        E: RateLimitClassify + From<GateClosed>,
    {
        let permit = self.permits.acquire().await.map_err(|_| GateClosed)?;
        self.wait_for_backoff().await;

        let _slot = Slot::enter(&self.in_flight, permit);
        let result = operation.await;

        if let Err(e) = &result {
            if e.is_rate_limited() {
                self.start_backoff();
            }
        }
        result
    }

    /// Calls currently running inside the gate.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub const fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Whether a backoff window is active right now.
    pub fn backing_off(&self) -> bool {
        self.backoff_until
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some_and(|until| until > Instant::now())
    }

    /// Reject every waiting and future call.
    pub fn close(&self) {
        self.permits.close();
    }

    /// Record the last known remaining quota.
    pub fn set_remaining(&self, remaining: u64) {
        *self
            .remaining
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(remaining);
    }

    pub fn remaining(&self) -> Option<u64> {
        *self.remaining.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Updates the recorded quota allows. `None` when no quota was recorded.
    pub fn updates_allowed(&self) -> Option<u64> {
        self.remaining().map(fetch_updates_for)
    }

    async fn wait_for_backoff(&self) {
        loop {
            let until = *self
                .backoff_until
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            match until {
                Some(until) if until > Instant::now() => {
                    debug!(
                        wait = ?until.saturating_duration_since(Instant::now()),
                        "Waiting for rate limit backoff"
                    );
                    tokio::time::sleep_until(until).await;
                }
                _ => break,
            }
        }
    }

    fn start_backoff(&self) {
        let until = Instant::now() + self.backoff;
        *self
            .backoff_until
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(until);
        warn!(
            backoff_secs = self.backoff.as_secs(),
            "Rate limited, backing off"
        );
    }
}

/// A held slot. Dropping it releases the permit.
struct Slot<'a> {
    counter: &'a AtomicUsize,
    _permit: SemaphorePermit<'a>,
}

impl<'a> Slot<'a> {
    fn enter(counter: &'a AtomicUsize, permit: SemaphorePermit<'a>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self {
            counter,
            _permit: permit,
        }
    }
}

impl Drop for Slot<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}
