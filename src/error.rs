//! Error taxonomy for the bus core
//!
//! Three caller-facing failure classes: validation errors (fix your input,
//! never retried), circuit-open rejections (fail-fast while the broker is
//! considered down), and broker call errors (transport failures counted
//! toward breaker accounting).

use crate::transport::BrokerError;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Main error type for bus operations
#[derive(Debug, Error)]
pub enum BusError {
    #[error("Validation failed: {message}")]
    Validation { message: String },

    #[error("Circuit breaker open - rejecting call until {retry_at}")]
    CircuitOpen { retry_at: DateTime<Utc> },

    #[error("Broker call failed: {0}")]
    Broker(#[from] BrokerError),

    #[error("Broker call timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

impl BusError {
    /// Create a validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// True when the failure should count against the circuit breaker.
    /// Validation and circuit-open rejections never reach the broker and
    /// therefore never feed its failure accounting.
    pub fn counts_as_broker_failure(&self) -> bool {
        matches!(self, BusError::Broker(_) | BusError::Timeout { .. })
    }
}

/// Result type for bus operations
pub type BusResult<T> = Result<T, BusError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_constructor() {
        let error = BusError::validation("missing trace_id");
        assert!(matches!(error, BusError::Validation { .. }));
        assert_eq!(error.to_string(), "Validation failed: missing trace_id");
    }

    #[test]
    fn test_circuit_open_display_includes_retry_time() {
        let retry_at = Utc::now();
        let error = BusError::CircuitOpen { retry_at };
        assert!(error.to_string().contains("rejecting call"));
    }

    #[test]
    fn test_broker_failure_accounting() {
        assert!(BusError::Timeout { elapsed_ms: 500 }.counts_as_broker_failure());
        assert!(
            BusError::Broker(BrokerError::PublishFailed("boom".to_string()))
                .counts_as_broker_failure()
        );
        assert!(!BusError::validation("bad").counts_as_broker_failure());
        assert!(!BusError::CircuitOpen {
            retry_at: Utc::now()
        }
        .counts_as_broker_failure());
    }
}
