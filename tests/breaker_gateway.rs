//! End-to-end scenarios: gateway, breaker, and health reporter against a
//! scripted mock broker.

use chrono::Utc;
use futures::future::join_all;
use interbus::breaker::{BreakerConfig, CircuitState};
use interbus::error::BusError;
use interbus::gateway::{GatewayConfig, PublishGateway};
use interbus::health::{HealthConfig, HealthReporter, HealthStatus};
use interbus::protocol::{EventType, MessageEnvelope};
use interbus::testing::MockBroker;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

fn envelope(source: &str) -> MessageEnvelope {
    MessageEnvelope::new(
        Uuid::new_v4(),
        source,
        Utc::now(),
        "trace-it",
        "req-it",
        EventType::EventLog,
        json!({"n": 1}),
    )
}

fn gateway_with(
    broker: Arc<MockBroker>,
    failure_threshold: u32,
    cooldown: Duration,
) -> Arc<PublishGateway<MockBroker>> {
    Arc::new(PublishGateway::new(
        broker,
        BreakerConfig {
            failure_threshold,
            cooldown,
        },
        GatewayConfig::default(),
    ))
}

async fn open_breaker(gateway: &PublishGateway<MockBroker>, failures: u32) {
    for _ in 0..failures {
        let _ = gateway.publish(&envelope("it.opener")).await;
    }
    assert_eq!(
        gateway.breaker_snapshot().await.state,
        CircuitState::Open
    );
}

#[tokio::test]
async fn threshold_of_three_failures_opens_then_fails_fast() {
    let broker = Arc::new(MockBroker::failing());
    let gateway = gateway_with(broker.clone(), 3, Duration::from_secs(60));

    for i in 0..3 {
        let result = gateway.publish(&envelope("it.orders")).await;
        assert!(matches!(result, Err(BusError::Broker(_))), "call {i}");
    }
    assert_eq!(broker.publish_calls(), 3);

    // Inside the cooldown every call short-circuits with a retry hint
    let result = gateway.publish(&envelope("it.orders")).await;
    match result {
        Err(BusError::CircuitOpen { retry_at }) => assert!(retry_at > Utc::now()),
        other => panic!("expected CircuitOpen, got {other:?}"),
    }
    assert_eq!(broker.publish_calls(), 3);
}

#[tokio::test]
async fn concurrent_callers_against_open_breaker_all_short_circuit() {
    let broker = Arc::new(MockBroker::failing());
    let gateway = gateway_with(broker.clone(), 2, Duration::from_secs(60));
    open_breaker(&gateway, 2).await;

    let calls_before = broker.publish_calls();
    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let gateway = gateway.clone();
            tokio::spawn(async move { gateway.publish(&envelope("it.concurrent")).await })
        })
        .collect();

    for task in join_all(tasks).await {
        let result = task.unwrap();
        assert!(matches!(result, Err(BusError::CircuitOpen { .. })));
    }
    assert_eq!(broker.publish_calls(), calls_before);
}

#[tokio::test]
async fn half_open_admits_exactly_one_trial_under_concurrent_load() {
    // Slow broker so the trial holds the half-open slot while the other
    // callers arrive.
    let broker = Arc::new(MockBroker::with_latency(Duration::from_millis(50)));
    broker.set_failing(true);
    let gateway = gateway_with(broker.clone(), 2, Duration::from_millis(20));
    open_breaker(&gateway, 2).await;

    tokio::time::sleep(Duration::from_millis(30)).await;
    broker.set_failing(false);

    let calls_before = broker.publish_calls();
    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let gateway = gateway.clone();
            tokio::spawn(async move { gateway.publish(&envelope("it.trial")).await })
        })
        .collect();

    let results: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|task| task.unwrap())
        .collect();

    let successes = results.iter().filter(|r| r.is_ok()).count();
    let rejected = results
        .iter()
        .filter(|r| matches!(r, Err(BusError::CircuitOpen { .. })))
        .count();

    assert_eq!(successes, 1);
    assert_eq!(rejected, 7);
    assert_eq!(broker.publish_calls(), calls_before + 1);
    assert_eq!(
        gateway.breaker_snapshot().await.state,
        CircuitState::Closed
    );
}

#[tokio::test]
async fn failed_trial_reopens_with_fresh_cooldown() {
    let broker = Arc::new(MockBroker::failing());
    let gateway = gateway_with(broker.clone(), 2, Duration::from_millis(20));
    open_breaker(&gateway, 2).await;

    tokio::time::sleep(Duration::from_millis(30)).await;

    // The trial reaches the still-broken broker and fails
    let calls_before = broker.publish_calls();
    let result = gateway.publish(&envelope("it.trial")).await;
    assert!(matches!(result, Err(BusError::Broker(_))));
    assert_eq!(broker.publish_calls(), calls_before + 1);

    // Immediately after the failed trial we are back in cooldown
    let snapshot = gateway.breaker_snapshot().await;
    assert_eq!(snapshot.state, CircuitState::Open);
    let result = gateway.publish(&envelope("it.trial")).await;
    assert!(matches!(result, Err(BusError::CircuitOpen { .. })));
    assert_eq!(broker.publish_calls(), calls_before + 1);
}

#[tokio::test]
async fn health_follows_outage_and_recovery() {
    let broker = Arc::new(MockBroker::new());
    let gateway = gateway_with(broker.clone(), 3, Duration::from_millis(20));
    let reporter = HealthReporter::new(gateway.clone(), HealthConfig::default());

    gateway.publish(&envelope("it.health")).await.unwrap();
    assert_eq!(reporter.report().await.status, HealthStatus::Healthy);

    // Outage: breaker opens, health goes offline
    broker.set_failing(true);
    for _ in 0..3 {
        let _ = gateway.publish(&envelope("it.health")).await;
    }
    let snapshot = reporter.report().await;
    assert_eq!(snapshot.status, HealthStatus::Offline);
    assert_eq!(snapshot.circuit_breaker.state, CircuitState::Open);

    // Recovery: cooldown elapses, trial succeeds, breaker closes
    broker.set_failing(false);
    tokio::time::sleep(Duration::from_millis(30)).await;
    gateway.publish(&envelope("it.health")).await.unwrap();

    let snapshot = reporter.report().await;
    assert_eq!(snapshot.circuit_breaker.state, CircuitState::Closed);
    // Three failures remain in the rolling accounting, so the bus reports
    // degraded rather than instantly healthy.
    assert_eq!(snapshot.status, HealthStatus::Degraded);
    assert!(snapshot.failure_rate > 0.05);
}

#[tokio::test]
async fn slow_pings_degrade_an_otherwise_closed_circuit() {
    let broker = Arc::new(MockBroker::with_latency(Duration::from_millis(60)));
    let gateway = gateway_with(broker, 3, Duration::from_secs(60));
    let reporter = HealthReporter::new(
        gateway.clone(),
        HealthConfig {
            degraded_latency_ms: 50,
            degraded_failure_rate: 0.05,
        },
    );

    let latency = gateway.ping().await.unwrap();
    assert!(latency >= 60);

    let snapshot = reporter.report().await;
    assert_eq!(snapshot.circuit_breaker.state, CircuitState::Closed);
    assert_eq!(snapshot.status, HealthStatus::Degraded);
    assert_eq!(snapshot.ping_latency_ms, Some(latency));
}

#[tokio::test]
async fn health_snapshot_serializes_wire_fields() {
    let broker = Arc::new(MockBroker::new());
    let gateway = gateway_with(broker, 3, Duration::from_secs(60));
    let reporter = HealthReporter::new(gateway.clone(), HealthConfig::default());

    gateway.publish(&envelope("it.wire")).await.unwrap();

    let rendered = serde_json::to_value(reporter.report().await).unwrap();
    assert_eq!(rendered["status"], "healthy");
    assert_eq!(rendered["circuit_breaker"]["state"], "CLOSED");
    assert_eq!(rendered["connection_pool"]["status"], "connected");
    assert!(rendered["failure_rate"].is_number());
}
