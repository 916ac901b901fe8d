//! Publish/subscribe output
//!
//! Every camera publishes onto one shared topic through its own client.
//! Publishing is fire-and-forget: nothing waits for broker acknowledgement.

use crate::config::BrokerConfig;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Publish to '{topic}' failed: {reason}")]
    Rejected { topic: String, reason: String },
}

/// Client able to put a payload on a topic
pub trait Publisher: Send {
    fn publish(&self, topic: &str, payload: &str) -> Result<(), PublishError>;
}

impl<P: Publisher + ?Sized> Publisher for Box<P> {
    fn publish(&self, topic: &str, payload: &str) -> Result<(), PublishError> {
        (**self).publish(topic, payload)
    }
}

/// Outgoing request queue depth of the MQTT client
const REQUEST_CAPACITY: usize = 64;

/// Pause before the event loop retries after a connection error
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// MQTT publisher backed by a rumqttc event loop task
pub struct MqttPublisher {
    client: AsyncClient,
    event_task: tokio::task::JoinHandle<()>,
}

impl MqttPublisher {
    /// Client id used for a camera's connection
    pub fn client_id(camera_id: &str) -> String {
        format!("{}Publisher", camera_id)
    }

    /// Connect to the broker.
    ///
    /// A failed first connection is only logged: the event loop keeps
    /// reconnecting in the background and publishes fail until it succeeds.
    pub async fn connect(camera_id: &str, broker: &BrokerConfig) -> Self {
        let mut options = MqttOptions::new(Self::client_id(camera_id), &broker.host, broker.port);
        options.set_keep_alive(Duration::from_secs(broker.keep_alive_secs.max(5)));

        let (client, mut event_loop) = AsyncClient::new(options, REQUEST_CAPACITY);

        let timeout = Duration::from_millis(broker.connect_timeout_ms);
        match tokio::time::timeout(timeout, wait_for_connack(&mut event_loop)).await {
            Ok(Ok(())) => log::info!(
                "MQTT client for {} connected to {}:{}",
                camera_id,
                broker.host,
                broker.port
            ),
            Ok(Err(e)) => log::warn!(
                "Failed to connect to MQTT broker {}:{} for {}: {}",
                broker.host,
                broker.port,
                camera_id,
                e
            ),
            Err(_) => log::warn!(
                "Timed out connecting to MQTT broker {}:{} for {}",
                broker.host,
                broker.port,
                camera_id
            ),
        }

        let name = camera_id.to_string();
        let event_task = tokio::spawn(async move {
            loop {
                if let Err(e) = event_loop.poll().await {
                    log::debug!("[{}] MQTT connection error: {}", name, e);
                    tokio::time::sleep(RECONNECT_DELAY).await;
                }
            }
        });

        Self { client, event_task }
    }
}

async fn wait_for_connack(event_loop: &mut EventLoop) -> Result<(), rumqttc::ConnectionError> {
    loop {
        if let Event::Incoming(Packet::ConnAck(_)) = event_loop.poll().await? {
            return Ok(());
        }
    }
}

impl Publisher for MqttPublisher {
    fn publish(&self, topic: &str, payload: &str) -> Result<(), PublishError> {
        self.client
            .try_publish(topic, QoS::AtMostOnce, false, payload.as_bytes().to_vec())
            .map_err(|e| PublishError::Rejected {
                topic: topic.to_string(),
                reason: e.to_string(),
            })
    }
}

impl Drop for MqttPublisher {
    fn drop(&mut self) {
        self.event_task.abort();
    }
}
