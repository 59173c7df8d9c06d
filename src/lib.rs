//! interbus - circuit-breaker-protected pub/sub backbone
//!
//! Modules exchange structured events over a message broker whose
//! connection is unreliable enough that naive publish calls would cascade
//! failures across producers. This crate provides the two pieces with real
//! failure-handling semantics:
//!
//! - a canonical, versioned **message envelope** every event is wrapped in
//!   before transmission ([`protocol::MessageEnvelope`])
//! - a **circuit-breaker-protected publish/health path** that gates all
//!   broker calls and classifies overall health as healthy / degraded /
//!   offline ([`gateway::PublishGateway`], [`health::HealthReporter`])
//!
//! Everything else in the surrounding application consumes this core
//! through two calls: publish an envelope, report current health.
//!
//! # Quick Start
//!
//! ```no_run
//! use interbus::breaker::BreakerConfig;
//! use interbus::gateway::{GatewayConfig, PublishGateway};
//! use interbus::health::{HealthConfig, HealthReporter};
//! use interbus::protocol::{EventType, MessageEnvelope};
//! use interbus::testing::MockBroker;
//! use chrono::Utc;
//! use serde_json::json;
//! use std::sync::Arc;
//! use uuid::Uuid;
//!
//! # async fn example() -> interbus::BusResult<()> {
//! let broker = Arc::new(MockBroker::new());
//! let gateway = Arc::new(PublishGateway::new(
//!     broker,
//!     BreakerConfig::default(),
//!     GatewayConfig::default(),
//! ));
//!
//! let envelope = MessageEnvelope::new(
//!     Uuid::new_v4(),
//!     "orders.processor",
//!     Utc::now(),
//!     "trace-1",
//!     "req-1",
//!     EventType::EventLog,
//!     json!({"order_id": 7}),
//! );
//! gateway.publish(&envelope).await?;
//!
//! let reporter = HealthReporter::new(gateway.clone(), HealthConfig::default());
//! let snapshot = reporter.report().await;
//! println!("bus status: {:?}", snapshot.status);
//! # Ok(())
//! # }
//! ```

pub mod breaker;
pub mod config;
pub mod error;
pub mod gateway;
pub mod health;
pub mod observability;
pub mod protocol;
pub mod testing;
pub mod transport;

pub use breaker::{BreakerConfig, BreakerSnapshot, CircuitBreaker, CircuitState};
pub use config::BusConfig;
pub use error::{BusError, BusResult};
pub use gateway::{GatewayConfig, PublishGateway};
pub use health::{HealthConfig, HealthReporter, HealthSnapshot, HealthStatus};
pub use protocol::{EncoderStrategy, EventType, MessageEnvelope};
pub use transport::{BrokerClient, BrokerError, PoolStats};
