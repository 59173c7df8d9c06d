//! Transport layer for broker communication
//!
//! This module provides the broker client abstraction the publish gateway
//! talks through, enabling dependency injection and testing without a live
//! broker.

use bytes::Bytes;
use serde::Serialize;
use thiserror::Error;

pub mod mqtt;

/// Transport-level broker errors
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Publish failed: {0}")]
    PublishFailed(String),
    #[error("Invalid broker URL: {0}")]
    InvalidBrokerUrl(String),
    #[error("Not connected")]
    NotConnected,
}

/// Connection pool statistics, consumed by the health reporter.
///
/// For single-connection transports (MQTT) the pool degenerates to max 1.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoolStats {
    pub max_connections: u32,
    pub active_connections: u32,
    pub idle_connections: u32,
    pub status: PoolStatus,
}

/// Pool-level status summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolStatus {
    Connected,
    Disconnected,
}

impl PoolStats {
    /// Stats for a single-connection transport
    pub fn single_connection(connected: bool) -> Self {
        Self {
            max_connections: 1,
            active_connections: if connected { 1 } else { 0 },
            idle_connections: 0,
            status: if connected {
                PoolStatus::Connected
            } else {
                PoolStatus::Disconnected
            },
        }
    }
}

/// Broker client abstraction
///
/// The publish gateway is the only consumer; every call it makes is wrapped
/// by the circuit breaker, so implementations should fail honestly and fast
/// rather than retrying internally.
#[async_trait::async_trait]
pub trait BrokerClient: Send + Sync {
    /// Publish a payload to a channel
    async fn publish(&self, channel: &str, payload: Bytes) -> Result<(), BrokerError>;

    /// Lightweight liveness probe against the broker
    async fn ping(&self) -> Result<(), BrokerError>;

    /// Current connection pool statistics
    fn pool_stats(&self) -> PoolStats;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_connection_pool_stats() {
        let connected = PoolStats::single_connection(true);
        assert_eq!(connected.max_connections, 1);
        assert_eq!(connected.active_connections, 1);
        assert_eq!(connected.status, PoolStatus::Connected);

        let disconnected = PoolStats::single_connection(false);
        assert_eq!(disconnected.active_connections, 0);
        assert_eq!(disconnected.status, PoolStatus::Disconnected);
    }

    #[test]
    fn test_pool_status_serializes_lowercase() {
        let stats = PoolStats::single_connection(true);
        let json = serde_json::to_string(&stats).unwrap();
        assert!(json.contains("\"connected\""));
    }

    #[test]
    fn test_broker_error_display() {
        let errors = vec![
            BrokerError::ConnectionFailed("refused".to_string()),
            BrokerError::PublishFailed("queue full".to_string()),
            BrokerError::InvalidBrokerUrl("not-a-url".to_string()),
            BrokerError::NotConnected,
        ];
        for error in errors {
            assert!(!error.to_string().is_empty());
        }
    }
}
