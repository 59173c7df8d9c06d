//! Mock implementations for testing
//!
//! Provides a scriptable [`MockBroker`] so gateway, breaker, and health
//! behavior can be tested without a live broker.

use crate::transport::{BrokerClient, BrokerError, PoolStats};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Mock broker for testing
///
/// Records published payloads, counts calls (so tests can assert the
/// breaker's fail-fast path never reached the broker), and supports
/// scripted failures and artificial latency.
#[derive(Debug, Default)]
pub struct MockBroker {
    published: Arc<Mutex<Vec<(String, Bytes)>>>,
    publish_calls: AtomicU64,
    ping_calls: AtomicU64,
    should_fail: AtomicBool,
    latency: Option<Duration>,
}

impl MockBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Broker where every call fails with a publish error
    pub fn failing() -> Self {
        let broker = Self::default();
        broker.should_fail.store(true, Ordering::SeqCst);
        broker
    }

    /// Broker where every call takes at least `latency`
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Default::default()
        }
    }

    /// Flip failure behavior mid-test (e.g. to simulate broker recovery)
    pub fn set_failing(&self, failing: bool) {
        self.should_fail.store(failing, Ordering::SeqCst);
    }

    /// All recorded publishes as (channel, payload) pairs
    pub async fn published(&self) -> Vec<(String, Bytes)> {
        self.published.lock().await.clone()
    }

    /// Number of times `publish` was actually invoked
    pub fn publish_calls(&self) -> u64 {
        self.publish_calls.load(Ordering::SeqCst)
    }

    /// Number of times `ping` was actually invoked
    pub fn ping_calls(&self) -> u64 {
        self.ping_calls.load(Ordering::SeqCst)
    }

    async fn simulate(&self) -> Result<(), BrokerError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.should_fail.load(Ordering::SeqCst) {
            Err(BrokerError::PublishFailed(
                "mock broker failure".to_string(),
            ))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl BrokerClient for MockBroker {
    async fn publish(&self, channel: &str, payload: Bytes) -> Result<(), BrokerError> {
        self.publish_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate().await?;
        self.published
            .lock()
            .await
            .push((channel.to_string(), payload));
        Ok(())
    }

    async fn ping(&self) -> Result<(), BrokerError> {
        self.ping_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate().await
    }

    fn pool_stats(&self) -> PoolStats {
        PoolStats::single_connection(!self.should_fail.load(Ordering::SeqCst))
    }
}
