//! Tiered health classification over breaker state and gateway metrics
//!
//! Turns raw connectivity/latency signals into healthy / degraded / offline.
//! Hard connectivity loss (breaker open) always dominates soft-degradation
//! signals; the classification is ordered and first-match-wins.
//!
//! Reporting never fails: an unreachable broker produces an `Offline`
//! snapshot with the breaker's error context, not an `Err` - health must
//! stay observable exactly when the broker is not.

use crate::breaker::{BreakerSnapshot, CircuitState};
use crate::gateway::PublishGateway;
use crate::transport::{BrokerClient, PoolStats};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// Overall bus health tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Offline,
}

/// Classification thresholds
#[derive(Debug, Clone)]
pub struct HealthConfig {
    /// Ping latency above this is a degradation signal (ms)
    pub degraded_latency_ms: u64,
    /// Failure rate above this is a degradation signal
    pub degraded_failure_rate: f64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            degraded_latency_ms: 50,
            degraded_failure_rate: 0.05,
        }
    }
}

/// Read-only, on-demand health projection - never persisted
#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub status: HealthStatus,
    pub circuit_breaker: BreakerSnapshot,
    pub ping_latency_ms: Option<u64>,
    pub failure_rate: f64,
    pub connection_pool: PoolStats,
}

/// Classifies overall bus health from breaker state, latency samples, and
/// pool metrics
pub struct HealthReporter<B: BrokerClient> {
    gateway: Arc<PublishGateway<B>>,
    config: HealthConfig,
}

impl<B: BrokerClient> HealthReporter<B> {
    pub fn new(gateway: Arc<PublishGateway<B>>, config: HealthConfig) -> Self {
        Self { gateway, config }
    }

    /// Produce a health snapshot from current breaker and gateway state
    pub async fn report(&self) -> HealthSnapshot {
        let breaker = self.gateway.breaker_snapshot().await;
        let ping_latency_ms = self.gateway.last_ping_latency_ms();
        let status = classify(&breaker, ping_latency_ms, &self.config);

        debug!(
            status = ?status,
            breaker_state = ?breaker.state,
            ping_latency_ms = ?ping_latency_ms,
            failure_rate = breaker.failure_rate,
            "health report"
        );

        HealthSnapshot {
            status,
            failure_rate: breaker.failure_rate,
            circuit_breaker: breaker,
            ping_latency_ms,
            connection_pool: self.gateway.pool_stats(),
        }
    }
}

/// Ordered classification, first match wins (pure function)
fn classify(
    breaker: &BreakerSnapshot,
    ping_latency_ms: Option<u64>,
    config: &HealthConfig,
) -> HealthStatus {
    if breaker.state == CircuitState::Open {
        return HealthStatus::Offline;
    }
    let slow_ping = ping_latency_ms
        .map(|latency| latency > config.degraded_latency_ms)
        .unwrap_or(false);
    if breaker.state == CircuitState::HalfOpen
        || slow_ping
        || breaker.failure_rate > config.degraded_failure_rate
    {
        return HealthStatus::Degraded;
    }
    HealthStatus::Healthy
}
