//! MQTT-backed broker client
//!
//! Wraps rumqttc (MQTT v5) behind the [`BrokerClient`] seam. The event loop
//! runs on a background task that tracks connection state; rumqttc handles
//! wire-level reconnection on subsequent polls, so the loop's only jobs are
//! state tracking and orderly shutdown.

use super::{BrokerClient, BrokerError, PoolStats};
use crate::config::BrokerSection;
use bytes::Bytes;
use rumqttc::v5::mqttbytes::v5::Packet;
use rumqttc::v5::{mqttbytes::QoS, AsyncClient, Event, MqttOptions};
use rumqttc::Transport as RumqttcTransport;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Delay before re-polling after an event loop error; rumqttc retries the
/// connection on the next poll.
const REPOLL_DELAY: Duration = Duration::from_millis(250);

/// How long to wait for the initial ConnAck
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// MQTT broker client - one instance per guarded connection
pub struct MqttBroker {
    client: AsyncClient,
    connected: Arc<AtomicBool>,
    probe_channel: String,
    shutdown_tx: watch::Sender<bool>,
    event_loop_handle: Option<JoinHandle<()>>,
}

impl MqttBroker {
    /// Connect to the broker and wait for ConnAck.
    ///
    /// `client_id` must be unique per connection; `probe_channel` is where
    /// [`BrokerClient::ping`] probes land.
    pub async fn connect(
        config: &BrokerSection,
        client_id: &str,
        probe_channel: impl Into<String>,
    ) -> Result<Self, BrokerError> {
        let options = configure_mqtt_options(client_id, config)?;
        let (client, mut event_loop) = AsyncClient::new(options, 10);

        let connected = Arc::new(AtomicBool::new(false));
        let (state_tx, state_rx) = watch::channel(false);
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let connected_flag = connected.clone();
        let task_client_id = client_id.to_string();
        let handle = tokio::spawn(async move {
            info!(client_id = %task_client_id, "starting MQTT event loop");
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            info!(client_id = %task_client_id, "shutdown requested, stopping event loop");
                            break;
                        }
                    }
                    event = event_loop.poll() => {
                        match event {
                            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                                info!(client_id = %task_client_id, "broker connection acknowledged");
                                connected_flag.store(true, Ordering::SeqCst);
                                let _ = state_tx.send(true);
                            }
                            Ok(event) => {
                                debug!(client_id = %task_client_id, ?event, "broker event");
                            }
                            Err(e) => {
                                warn!(client_id = %task_client_id, error = %e, "broker event loop error");
                                connected_flag.store(false, Ordering::SeqCst);
                                let _ = state_tx.send(false);
                                tokio::time::sleep(REPOLL_DELAY).await;
                            }
                        }
                    }
                }
            }
        });

        wait_for_connack(state_rx, CONNECT_TIMEOUT).await?;

        Ok(Self {
            client,
            connected,
            probe_channel: probe_channel.into(),
            shutdown_tx,
            event_loop_handle: Some(handle),
        })
    }

    /// Disconnect from the broker and stop the event loop
    pub async fn disconnect(&mut self) -> Result<(), BrokerError> {
        self.client
            .disconnect()
            .await
            .map_err(|e| BrokerError::ConnectionFailed(e.to_string()))?;
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.event_loop_handle.take() {
            let _ = handle.await;
        }
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait::async_trait]
impl BrokerClient for MqttBroker {
    async fn publish(&self, channel: &str, payload: Bytes) -> Result<(), BrokerError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(BrokerError::NotConnected);
        }
        self.client
            .publish(channel, QoS::AtLeastOnce, false, payload)
            .await
            .map_err(|e| BrokerError::PublishFailed(e.to_string()))
    }

    async fn ping(&self) -> Result<(), BrokerError> {
        // Tiny QoS 1 publish to the reserved probe channel; rumqttc does not
        // expose PINGREQ round-trips directly.
        self.publish(&self.probe_channel, Bytes::new()).await
    }

    fn pool_stats(&self) -> PoolStats {
        PoolStats::single_connection(self.connected.load(Ordering::SeqCst))
    }
}

/// Wait for the event loop to observe a ConnAck
async fn wait_for_connack(
    mut state_rx: watch::Receiver<bool>,
    timeout: Duration,
) -> Result<(), BrokerError> {
    let wait = tokio::time::timeout(timeout, async {
        loop {
            if *state_rx.borrow() {
                return Ok(());
            }
            if state_rx.changed().await.is_err() {
                return Err(BrokerError::ConnectionFailed(
                    "event loop terminated before ConnAck".to_string(),
                ));
            }
        }
    })
    .await;

    match wait {
        Ok(result) => result,
        Err(_) => Err(BrokerError::ConnectionFailed(
            "timed out waiting for ConnAck".to_string(),
        )),
    }
}

/// Build rumqttc options from broker config (pure function)
pub fn configure_mqtt_options(
    client_id: &str,
    config: &BrokerSection,
) -> Result<MqttOptions, BrokerError> {
    let url = url::Url::parse(&config.url)
        .map_err(|_| BrokerError::InvalidBrokerUrl(config.url.clone()))?;

    let host = url
        .host_str()
        .ok_or_else(|| BrokerError::InvalidBrokerUrl(config.url.clone()))?;
    let port = url
        .port()
        .unwrap_or(if url.scheme() == "mqtts" { 8883 } else { 1883 });

    let mut options = MqttOptions::new(client_id, host, port);

    if url.scheme() == "mqtts" {
        options.set_transport(RumqttcTransport::tls_with_default_config());
    }

    if let Some(username_env) = &config.username_env {
        let username = resolve_credential(username_env)?;
        let password = config
            .password_env
            .as_ref()
            .map(|env_name| resolve_credential(env_name))
            .transpose()?
            .unwrap_or_default();
        options.set_credentials(username, password);
    }

    options.set_keep_alive(Duration::from_secs(60));
    Ok(options)
}

/// Resolve a credential from the named environment variable.
///
/// Whitespace-only values are rejected: a blank token is a deployment
/// mistake, not a valid credential.
fn resolve_credential(env_name: &str) -> Result<String, BrokerError> {
    let value = std::env::var(env_name).map_err(|_| {
        BrokerError::ConnectionFailed(format!("credential env var {env_name} is not set"))
    })?;
    if value.trim().is_empty() {
        return Err(BrokerError::ConnectionFailed(format!(
            "credential env var {env_name} is blank"
        )));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_broker_section(url: &str) -> BrokerSection {
        BrokerSection {
            url: url.to_string(),
            username_env: None,
            password_env: None,
        }
    }

    #[test]
    fn test_configure_options_defaults_port() {
        let config = test_broker_section("mqtt://localhost");
        let options = configure_mqtt_options("bus-1", &config).unwrap();
        assert_eq!(options.broker_address().1, 1883);
    }

    #[test]
    fn test_configure_options_mqtts_default_port() {
        let config = test_broker_section("mqtts://broker.internal");
        let options = configure_mqtt_options("bus-1", &config).unwrap();
        assert_eq!(options.broker_address().1, 8883);
    }

    #[test]
    fn test_configure_options_explicit_port() {
        let config = test_broker_section("mqtt://localhost:2883");
        let options = configure_mqtt_options("bus-1", &config).unwrap();
        assert_eq!(options.broker_address(), ("localhost".to_string(), 2883));
    }

    #[test]
    fn test_invalid_url_rejected() {
        let config = test_broker_section("not a url");
        assert!(matches!(
            configure_mqtt_options("bus-1", &config),
            Err(BrokerError::InvalidBrokerUrl(_))
        ));
    }

    #[test]
    fn test_blank_credential_rejected() {
        let env_name = "INTERBUS_TEST_BLANK_CREDENTIAL";
        std::env::set_var(env_name, "   ");
        let result = resolve_credential(env_name);
        std::env::remove_var(env_name);
        assert!(matches!(result, Err(BrokerError::ConnectionFailed(_))));
    }

    #[test]
    fn test_missing_credential_env_rejected() {
        assert!(matches!(
            resolve_credential("INTERBUS_TEST_MISSING_CREDENTIAL"),
            Err(BrokerError::ConnectionFailed(_))
        ));
    }

    #[test]
    fn test_present_credential_resolved() {
        let env_name = "INTERBUS_TEST_PRESENT_CREDENTIAL";
        std::env::set_var(env_name, "secret-value");
        let resolved = resolve_credential(env_name).unwrap();
        std::env::remove_var(env_name);
        assert_eq!(resolved, "secret-value");
    }
}
