//! Rate limiting and retry policy for Bot API calls
//!
//! The Bot API throttles aggressively, and the only client-side defense is
//! bounding how many requests are outstanding at once. [`RateLimiter`] hands
//! out one permit per probe; the permit is held until the probe settles.

use crate::error::{Error, Result};
use crate::telegram::client::{TransportError, TransportErrorKind};
use rand::Rng;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::sleep;

/// Concurrency gate with optional spacing between acquisitions
pub struct RateLimiter {
    /// One permit per in-flight probe
    concurrency: Arc<Semaphore>,
    /// Minimum delay between acquisitions
    min_delay: Duration,
    /// Last acquisition timestamp
    last_op: parking_lot::Mutex<Option<Instant>>,
    /// Live and peak in-flight counts
    gauge: Arc<InFlightGauge>,
}

/// Tracks how many permits are out, and the most ever out at once
#[derive(Debug, Default)]
pub struct InFlightGauge {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl InFlightGauge {
    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    /// Permits currently held
    pub fn current(&self) -> usize {
        self.current.load(Ordering::SeqCst)
    }

    /// Highest number of permits held at once
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl RateLimiter {
    /// Create a new rate limiter
    ///
    /// # Arguments
    /// * `max_concurrent` - Maximum probes in flight
    /// * `min_delay` - Minimum spacing between two acquisitions
    pub fn new(max_concurrent: usize, min_delay: Duration) -> Self {
        RateLimiter {
            concurrency: Arc::new(Semaphore::new(max_concurrent)),
            min_delay,
            last_op: parking_lot::Mutex::new(None),
            gauge: Arc::new(InFlightGauge::default()),
        }
    }

    /// Acquire permission to start a probe
    ///
    /// Cancel-safe: dropping the future before it resolves gives nothing up.
    pub async fn acquire(&self) -> Result<ProbePermit> {
        let permit = Arc::clone(&self.concurrency)
            .acquire_owned()
            .await
            .map_err(|e| Error::Internal(format!("Concurrency gate closed: {}", e)))?;

        if !self.min_delay.is_zero() {
            let wait = {
                let last_op = self.last_op.lock();
                (*last_op)
                    .map(|at| self.min_delay.saturating_sub(at.elapsed()))
                    .unwrap_or_default()
            };
            if !wait.is_zero() {
                sleep(wait).await;
            }
            *self.last_op.lock() = Some(Instant::now());
        }

        self.gauge.enter();
        Ok(ProbePermit {
            _permit: permit,
            gauge: Arc::clone(&self.gauge),
        })
    }

    /// Permits currently available
    pub fn available(&self) -> usize {
        self.concurrency.available_permits()
    }

    /// In-flight accounting
    pub fn gauge(&self) -> &InFlightGauge {
        &self.gauge
    }
}

/// Permit that frees its slot on drop
pub struct ProbePermit {
    _permit: OwnedSemaphorePermit,
    gauge: Arc<InFlightGauge>,
}

impl Drop for ProbePermit {
    fn drop(&mut self) {
        self.gauge.leave();
    }
}

/// Jittered, capped retry for name-resolution failures
///
/// Every other transport failure is final.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    min_delay_ms: u64,
    max_delay_ms: u64,
    max_retries: u32,
}

impl RetryPolicy {
    /// Create a retry policy drawing delays from `[min_delay_ms, max_delay_ms)`
    pub fn new(min_delay_ms: u64, max_delay_ms: u64, max_retries: u32) -> Self {
        RetryPolicy {
            min_delay_ms,
            max_delay_ms: max_delay_ms.max(min_delay_ms),
            max_retries,
        }
    }

    /// Whether a failed attempt may be retried at all
    pub fn should_retry(&self, error: &TransportError) -> bool {
        error.kind == TransportErrorKind::NameResolution
    }

    /// Delay before retry number `retries_done + 1`, or None if the cap is reached
    pub fn next_delay(&self, retries_done: u32) -> Option<Duration> {
        if retries_done >= self.max_retries {
            return None;
        }
        Some(self.jitter())
    }

    fn jitter(&self) -> Duration {
        let ms = if self.max_delay_ms > self.min_delay_ms {
            rand::thread_rng().gen_range(self.min_delay_ms..self.max_delay_ms)
        } else {
            self.min_delay_ms
        };
        Duration::from_millis(ms)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::new(300, 600, 50)
    }
}
