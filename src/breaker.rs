//! Circuit breaker guarding broker calls
//!
//! Classic three-state breaker: `Closed` passes calls through and counts
//! consecutive failures, `Open` rejects immediately without invoking the
//! wrapped call, `HalfOpen` admits exactly one trial probe after the
//! cooldown. Fail-fast during outages keeps producers from piling up
//! against a dead broker; the single-trial probe keeps recovery from
//! becoming a thundering herd.
//!
//! The breaker owns the only shared mutable state in the core. All
//! transitions happen under one mutex; the wrapped call itself is awaited
//! outside the lock.

use crate::error::{BusError, BusResult};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Breaker tuning
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive failures that trip `Closed -> Open`
    pub failure_threshold: u32,
    /// Time the breaker stays `Open` before admitting a trial call
    pub cooldown: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(30),
        }
    }
}

/// Read-only projection of breaker state for reporting
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub state: CircuitState,
    pub failure_count: u32,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub total_successes: u64,
    pub total_calls: u64,
    pub failure_rate: f64,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    /// Exactly one trial call may be in flight while half-open
    trial_in_flight: bool,
    /// Monotonic gate for the cooldown - immune to wall-clock jumps
    opened_at: Option<Instant>,
    /// Wall-clock copies, kept for reporting only
    last_failure_at: Option<DateTime<Utc>>,
    next_attempt_at: Option<DateTime<Utc>>,
    total_successes: u64,
    total_calls: u64,
}

impl BreakerInner {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            trial_in_flight: false,
            opened_at: None,
            last_failure_at: None,
            next_attempt_at: None,
            total_successes: 0,
            total_calls: 0,
        }
    }

    fn failure_rate(&self) -> f64 {
        if self.total_calls == 0 {
            0.0
        } else {
            1.0 - (self.total_successes as f64 / self.total_calls as f64)
        }
    }

    fn trip_open(&mut self, cooldown: Duration) {
        self.state = CircuitState::Open;
        self.opened_at = Some(Instant::now());
        self.next_attempt_at =
            Some(Utc::now() + chrono::Duration::from_std(cooldown).unwrap_or_default());
        self.trial_in_flight = false;
    }

    fn close(&mut self) {
        self.state = CircuitState::Closed;
        self.failure_count = 0;
        self.trial_in_flight = false;
        self.opened_at = None;
        self.next_attempt_at = None;
    }
}

/// How a call was admitted, decided under the lock
enum Admission {
    Normal,
    Trial,
}

/// Circuit breaker for a single guarded broker connection.
///
/// One instance per connection; owned by the publish gateway and never
/// shared across unrelated connections.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: BreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(BreakerInner::new()),
        }
    }

    /// Execute a broker call under breaker protection.
    ///
    /// While `Open` the future is never polled and the caller gets
    /// [`BusError::CircuitOpen`] immediately. Every other outcome of the
    /// wrapped call is returned as-is - the breaker transitions state but
    /// never hides a failure as success. Only broker-class failures
    /// ([`BusError::counts_as_broker_failure`]) count toward the threshold.
    pub async fn call<T, F>(&self, fut: F) -> BusResult<T>
    where
        F: Future<Output = BusResult<T>>,
    {
        let admission = {
            let mut inner = self.inner.lock().await;
            match inner.state {
                CircuitState::Closed => Admission::Normal,
                CircuitState::Open => {
                    let cooled_down = inner
                        .opened_at
                        .map(|at| at.elapsed() >= self.config.cooldown)
                        .unwrap_or(true);
                    if cooled_down {
                        info!("circuit breaker cooldown elapsed, admitting trial call");
                        inner.state = CircuitState::HalfOpen;
                        inner.trial_in_flight = true;
                        Admission::Trial
                    } else {
                        debug!("circuit breaker open, rejecting call");
                        return Err(BusError::CircuitOpen {
                            retry_at: inner.next_attempt_at.unwrap_or_else(Utc::now),
                        });
                    }
                }
                CircuitState::HalfOpen => {
                    if inner.trial_in_flight {
                        debug!("trial call already in flight, rejecting concurrent caller");
                        return Err(BusError::CircuitOpen {
                            retry_at: inner.next_attempt_at.unwrap_or_else(Utc::now),
                        });
                    }
                    inner.trial_in_flight = true;
                    Admission::Trial
                }
            }
        };

        let outcome = fut.await;

        let mut inner = self.inner.lock().await;
        inner.total_calls += 1;
        match &outcome {
            Ok(_) => {
                inner.total_successes += 1;
                match admission {
                    Admission::Trial => {
                        info!("trial call succeeded, closing circuit breaker");
                        inner.close();
                    }
                    Admission::Normal => {
                        // Consecutive-failure counting: any success resets
                        inner.failure_count = 0;
                    }
                }
            }
            Err(e) if e.counts_as_broker_failure() => {
                inner.failure_count += 1;
                inner.last_failure_at = Some(Utc::now());
                match admission {
                    Admission::Trial => {
                        warn!("trial call failed, re-opening circuit breaker");
                        inner.trip_open(self.config.cooldown);
                    }
                    Admission::Normal => {
                        if inner.failure_count >= self.config.failure_threshold {
                            warn!(
                                failure_count = inner.failure_count,
                                "failure threshold reached, opening circuit breaker"
                            );
                            inner.trip_open(self.config.cooldown);
                        }
                    }
                }
            }
            Err(_) => {
                // Not a broker-class failure; release the trial slot so the
                // next caller can probe.
                inner.trial_in_flight = false;
            }
        }
        outcome
    }

    /// Non-mutating read of the current breaker state for reporting
    pub async fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.inner.lock().await;
        BreakerSnapshot {
            state: inner.state,
            failure_count: inner.failure_count,
            last_failure_at: inner.last_failure_at,
            next_attempt_at: inner.next_attempt_at,
            total_successes: inner.total_successes,
            total_calls: inner.total_calls,
            failure_rate: inner.failure_rate(),
        }
    }
}
