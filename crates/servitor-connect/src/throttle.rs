//! Per-credential admission control.
//!
//! A [`Throttle`] combines a concurrency limit with two leaky buckets, one
//! counting tokens and one counting requests.  Both buckets refill
//! continuously at `rate / period` per second up to `rate`.  Admission holds
//! a concurrency slot, then polls the buckets every [`POLL_INTERVAL`] until
//! both can cover the request; there is no FIFO ordering between waiters.
//!
//! The bucket mutex is only held for the arithmetic of one check and never
//! across an `.await`.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

use crate::config::{Config, MIN_PERIOD};
use crate::error::{ConnectorError, Result};

/// How often a waiting admission re-checks the buckets.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

// ---------------------------------------------------------------------------
// Limits
// ---------------------------------------------------------------------------

/// Throttle parameters.  A rate of `0` disables that bucket.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThrottleLimits {
    pub request_rate: f64,
    pub token_rate: f64,
    /// Refill period in seconds.
    pub period: f64,
    pub concurrent: u32,
}

impl ThrottleLimits {
    pub fn from_config(config: &Config) -> Self {
        Self {
            request_rate: config.request_rate(),
            token_rate: config.token_rate(),
            period: config.period(),
            concurrent: config.concurrent(),
        }
    }
}

// ---------------------------------------------------------------------------
// Throttle
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Buckets {
    tokens: f64,
    requests: f64,
    refreshed: Instant,
}

/// Admission controller for one credential.
#[derive(Debug)]
pub struct Throttle {
    limits: ThrottleLimits,
    buckets: Mutex<Buckets>,
    slots: Arc<Semaphore>,
}

impl Throttle {
    /// Create a throttle with full buckets.
    pub fn new(limits: ThrottleLimits) -> Self {
        let limits = ThrottleLimits {
            request_rate: limits.request_rate.max(0.0),
            token_rate: limits.token_rate.max(0.0),
            period: limits.period.max(MIN_PERIOD),
            concurrent: limits.concurrent.max(1),
        };
        Self {
            limits,
            buckets: Mutex::new(Buckets {
                tokens: limits.token_rate,
                requests: limits.request_rate,
                refreshed: Instant::now(),
            }),
            slots: Arc::new(Semaphore::new(limits.concurrent as usize)),
        }
    }

    pub fn limits(&self) -> ThrottleLimits {
        self.limits
    }

    /// Wait until a request estimated at `cost` tokens may proceed.
    ///
    /// The returned [`Lease`] holds a concurrency slot until it is settled
    /// or dropped.  A cost above the token rate waits for a full bucket
    /// instead of forever.
    pub async fn acquire(self: &Arc<Self>, cost: u64) -> Result<Lease> {
        if self.slots.available_permits() == 0 {
            tracing::info!(concurrent = self.limits.concurrent, "throttling concurrent requests");
        }
        let permit = Arc::clone(&self.slots)
            .acquire_owned()
            .await
            .map_err(|_| ConnectorError::Busy {
                provider: "throttle".into(),
                reason: "admission closed".into(),
            })?;

        let mut reported = false;
        loop {
            match self.try_debit(cost) {
                Ok(()) => break,
                Err(reason) => {
                    if !reported {
                        tracing::info!(cost, reason, "throttling request");
                        reported = true;
                    }
                }
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }

        tracing::debug!(cost, "admitted request");
        Ok(Lease {
            throttle: Arc::clone(self),
            estimate: cost,
            _permit: permit,
        })
    }

    /// Current `(token, request)` allowances after refilling.
    pub fn available(&self) -> (f64, f64) {
        let mut buckets = self.lock();
        self.refill(&mut buckets);
        (buckets.tokens, buckets.requests)
    }

    /// Credit (or, when negative, debit) the token bucket by one lease's
    /// correction.
    ///
    /// A credit stops at the bucket's maximum.  A debit stops at `floor`
    /// below zero but never lifts a balance other leases already pushed
    /// lower.
    fn adjust_tokens(&self, delta: f64, floor: f64) {
        if self.limits.token_rate == 0.0 {
            return;
        }
        let mut buckets = self.lock();
        self.refill(&mut buckets);
        let tokens = buckets.tokens;
        buckets.tokens = if delta < 0.0 {
            (tokens + delta).max(-floor).min(tokens)
        } else {
            (tokens + delta).min(self.limits.token_rate)
        };
    }

    fn try_debit(&self, cost: u64) -> std::result::Result<(), &'static str> {
        let mut buckets = self.lock();
        self.refill(&mut buckets);

        let cost = cost as f64;
        let tokens_ok = self.limits.token_rate == 0.0
            || buckets.tokens >= cost.min(self.limits.token_rate);
        let requests_ok = self.limits.request_rate == 0.0
            || buckets.requests >= 1.0_f64.min(self.limits.request_rate);

        match (tokens_ok, requests_ok) {
            (true, true) => {
                if self.limits.token_rate > 0.0 {
                    buckets.tokens -= cost;
                }
                if self.limits.request_rate > 0.0 {
                    buckets.requests -= 1.0;
                }
                Ok(())
            }
            (false, _) => Err("token allowance exhausted"),
            (true, false) => Err("request allowance exhausted"),
        }
    }

    fn refill(&self, buckets: &mut Buckets) {
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(buckets.refreshed).as_secs_f64();
        buckets.refreshed = now;

        let limits = &self.limits;
        buckets.tokens =
            (buckets.tokens + elapsed * limits.token_rate / limits.period).min(limits.token_rate);
        buckets.requests = (buckets.requests + elapsed * limits.request_rate / limits.period)
            .min(limits.request_rate);
    }

    fn lock(&self) -> MutexGuard<'_, Buckets> {
        self.buckets.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ---------------------------------------------------------------------------
// Lease
// ---------------------------------------------------------------------------

/// An admitted request.  Dropping it frees the concurrency slot.
#[derive(Debug)]
pub struct Lease {
    throttle: Arc<Throttle>,
    estimate: u64,
    _permit: OwnedSemaphorePermit,
}

impl Lease {
    /// The token estimate debited at admission.
    pub fn estimate(&self) -> u64 {
        self.estimate
    }

    /// Reconcile the estimate with the provider's reported usage and
    /// release the slot.
    pub fn settle(self, actual: u64) {
        let delta = self.estimate as f64 - actual as f64;
        tracing::debug!(estimate = self.estimate, actual, "settling throttle lease");
        self.throttle.adjust_tokens(delta, self.estimate as f64);
    }
}

// ---------------------------------------------------------------------------
// Throttle registry
// ---------------------------------------------------------------------------

/// Throttles keyed by a hash of their credential, created on first use.
///
/// The limits of the first request for a credential fix that credential's
/// throttle.
#[derive(Debug, Default)]
pub struct ThrottleRegistry {
    throttles: DashMap<u64, Arc<Throttle>>,
}

impl ThrottleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The throttle for `credential`, creating it with `limits` if needed.
    pub fn get_or_create(&self, credential: &str, limits: ThrottleLimits) -> Arc<Throttle> {
        let key = credential_key(credential);
        let entry = self
            .throttles
            .entry(key)
            .or_insert_with(|| Arc::new(Throttle::new(limits)));
        Arc::clone(entry.value())
    }

    pub fn len(&self) -> usize {
        self.throttles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.throttles.is_empty()
    }
}

fn credential_key(credential: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    credential.hash(&mut hasher);
    hasher.finish()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
