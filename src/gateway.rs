//! Publish gateway - the only component that talks to the broker client
//!
//! Every outbound call (publish, ping) is routed through the circuit
//! breaker. The gateway records per-call latency and a last-success
//! timestamp for the health reporter, and never retries on its own: retry
//! policy belongs to the caller, fail-fast belongs here.

use crate::breaker::{BreakerConfig, BreakerSnapshot, CircuitBreaker};
use crate::error::{BusError, BusResult};
use crate::protocol::{ChannelBuilder, EncoderStrategy, MessageEnvelope};
use crate::transport::{BrokerClient, PoolStats};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Sentinel for "no sample recorded yet"
const NO_SAMPLE: u64 = u64::MAX;

/// Gateway tuning
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Channel prefix events are routed under
    pub channel_prefix: String,
    /// Default timeout for publish calls
    pub publish_timeout: Duration,
    /// Default timeout for ping probes
    pub ping_timeout: Duration,
    /// Wire serializer, fixed at startup
    pub encoder: EncoderStrategy,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            channel_prefix: "bus/events".to_string(),
            publish_timeout: Duration::from_secs(5),
            ping_timeout: Duration::from_secs(2),
            encoder: EncoderStrategy::default(),
        }
    }
}

/// Circuit-breaker-protected gateway to one broker connection.
///
/// Constructed explicitly and passed to callers - one gateway (and one
/// breaker) per guarded broker connection, no process-wide instance.
pub struct PublishGateway<B: BrokerClient> {
    broker: Arc<B>,
    breaker: CircuitBreaker,
    config: GatewayConfig,
    last_ping_latency_ms: AtomicU64,
    last_publish_latency_ms: AtomicU64,
    last_success_at: Mutex<Option<DateTime<Utc>>>,
}

impl<B: BrokerClient> PublishGateway<B> {
    pub fn new(broker: Arc<B>, breaker_config: BreakerConfig, config: GatewayConfig) -> Self {
        Self {
            broker,
            breaker: CircuitBreaker::new(breaker_config),
            config,
            last_ping_latency_ms: AtomicU64::new(NO_SAMPLE),
            last_publish_latency_ms: AtomicU64::new(NO_SAMPLE),
            last_success_at: Mutex::new(None),
        }
    }

    /// Publish an envelope with the configured timeout
    pub async fn publish(&self, envelope: &MessageEnvelope) -> BusResult<()> {
        self.publish_with_timeout(envelope, self.config.publish_timeout)
            .await
    }

    /// Publish an envelope with a caller-supplied timeout.
    ///
    /// A timeout counts as a failure for breaker accounting. Validation
    /// failures in the codec surface before the breaker is consulted.
    pub async fn publish_with_timeout(
        &self,
        envelope: &MessageEnvelope,
        timeout: Duration,
    ) -> BusResult<()> {
        let payload = Bytes::from(envelope.encode_with(self.config.encoder)?);
        let channel = ChannelBuilder::event_channel(&self.config.channel_prefix, envelope.event_type);

        let broker = self.broker.clone();
        let started = Instant::now();
        let result = self
            .breaker
            .call(async move {
                match tokio::time::timeout(timeout, broker.publish(&channel, payload)).await {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(e)) => Err(BusError::Broker(e)),
                    Err(_) => Err(BusError::Timeout {
                        elapsed_ms: timeout.as_millis() as u64,
                    }),
                }
            })
            .await;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(()) => {
                self.record_success(&self.last_publish_latency_ms, elapsed_ms);
                debug!(
                    event_type = %envelope.event_type,
                    latency_ms = elapsed_ms,
                    "published envelope"
                );
            }
            Err(e) => {
                warn!(event_type = %envelope.event_type, error = %e, "publish failed");
            }
        }
        result
    }

    /// Measure broker round-trip time with the configured timeout
    pub async fn ping(&self) -> BusResult<u64> {
        self.ping_with_timeout(self.config.ping_timeout).await
    }

    /// Measure broker round-trip time with a caller-supplied timeout
    pub async fn ping_with_timeout(&self, timeout: Duration) -> BusResult<u64> {
        let broker = self.broker.clone();
        let started = Instant::now();
        let result = self
            .breaker
            .call(async move {
                match tokio::time::timeout(timeout, broker.ping()).await {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(e)) => Err(BusError::Broker(e)),
                    Err(_) => Err(BusError::Timeout {
                        elapsed_ms: timeout.as_millis() as u64,
                    }),
                }
            })
            .await;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match result {
            Ok(()) => {
                self.record_success(&self.last_ping_latency_ms, elapsed_ms);
                debug!(latency_ms = elapsed_ms, "broker ping succeeded");
                Ok(elapsed_ms)
            }
            Err(e) => {
                warn!(error = %e, "broker ping failed");
                Err(e)
            }
        }
    }

    fn record_success(&self, latency_slot: &AtomicU64, elapsed_ms: u64) {
        latency_slot.store(elapsed_ms, Ordering::Relaxed);
        if let Ok(mut last) = self.last_success_at.lock() {
            *last = Some(Utc::now());
        }
    }

    /// Latency of the most recent successful ping, if any
    pub fn last_ping_latency_ms(&self) -> Option<u64> {
        match self.last_ping_latency_ms.load(Ordering::Relaxed) {
            NO_SAMPLE => None,
            latency => Some(latency),
        }
    }

    /// Latency of the most recent successful publish, if any
    pub fn last_publish_latency_ms(&self) -> Option<u64> {
        match self.last_publish_latency_ms.load(Ordering::Relaxed) {
            NO_SAMPLE => None,
            latency => Some(latency),
        }
    }

    /// Wall-clock time of the most recent successful broker operation
    pub fn last_success_at(&self) -> Option<DateTime<Utc>> {
        self.last_success_at.lock().ok().and_then(|last| *last)
    }

    /// Non-mutating breaker read for the health reporter
    pub async fn breaker_snapshot(&self) -> BreakerSnapshot {
        self.breaker.snapshot().await
    }

    /// Connection pool statistics from the underlying broker client
    pub fn pool_stats(&self) -> PoolStats {
        self.broker.pool_stats()
    }
}
