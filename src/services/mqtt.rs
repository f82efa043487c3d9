//! `rumqttc` broker connection.
//!
//! [`RumqttcClient`] implements [`MqttClient`] with the non-blocking `try_*`
//! calls, so handlers never wait on the network. [`pump_events`] drives the
//! `rumqttc` event loop and turns broker traffic into [`ControlEvent`]s.

use std::time::Duration;

use rumqttc::{AsyncClient, ClientError, Event, EventLoop, MqttOptions, Packet, QoS};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::MqttConfig;
use crate::traits::{MqttClient, TransportError};

use super::runner::ControlEvent;

/// Capacity of the client's outbound request queue.
pub const REQUEST_QUEUE_CAPACITY: usize = 64;

/// Wait after an event loop error before polling again.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Build `rumqttc` options from the configuration.
pub fn mqtt_options(config: &MqttConfig) -> MqttOptions {
    let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
    options.set_keep_alive(Duration::from_secs(u64::from(config.keep_alive_secs)));
    if config.has_auth() {
        options.set_credentials(&config.username, &config.password);
    }
    options
}

/// Create a client and its (not yet polled) event loop.
pub fn connect(config: &MqttConfig) -> (RumqttcClient, EventLoop) {
    let (client, eventloop) = AsyncClient::new(mqtt_options(config), REQUEST_QUEUE_CAPACITY);
    (RumqttcClient::new(client), eventloop)
}

/// [`MqttClient`] over a `rumqttc` [`AsyncClient`]. Cheap to clone.
#[derive(Clone, Debug)]
pub struct RumqttcClient {
    client: AsyncClient,
    qos: QoS,
}

impl RumqttcClient {
    /// Wrap a client; everything is sent at QoS 1.
    pub fn new(client: AsyncClient) -> Self {
        Self {
            client,
            qos: QoS::AtLeastOnce,
        }
    }

    /// Queue a clean disconnect.
    pub async fn disconnect(&self) {
        if let Err(e) = self.client.disconnect().await {
            debug!(error = %e, "disconnect not queued");
        }
    }
}

fn subscribe_error(topic: &str, e: ClientError) -> TransportError {
    TransportError::Subscribe {
        topic: topic.to_string(),
        reason: e.to_string(),
    }
}

impl MqttClient for RumqttcClient {
    fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) -> Result<(), TransportError> {
        self.client
            .try_publish(topic, self.qos, retain, payload.to_vec())
            .map_err(|e| TransportError::Publish {
                topic: topic.to_string(),
                reason: e.to_string(),
            })
    }

    fn subscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        self.client
            .try_subscribe(topic, self.qos)
            .map_err(|e| subscribe_error(topic, e))
    }

    fn unsubscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        self.client
            .try_unsubscribe(topic)
            .map_err(|e| subscribe_error(topic, e))
    }
}

/// Poll the event loop until the receiving side of `tx` goes away.
///
/// Every ConnAck posts [`ControlEvent::Connected`] so the controller can
/// resubscribe; inbound publishes are forwarded as [`ControlEvent::Mqtt`].
pub async fn pump_events(mut eventloop: EventLoop, tx: mpsc::Sender<ControlEvent>) {
    loop {
        let event = match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                info!(code = ?ack.code, "broker connected");
                ControlEvent::Connected
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => ControlEvent::Mqtt {
                topic: publish.topic,
                payload: publish.payload.to_vec(),
            },
            Ok(_) => continue,
            Err(e) => {
                if tx.is_closed() {
                    return;
                }
                warn!(error = %e, "MQTT connection error, retrying");
                tokio::time::sleep(RECONNECT_DELAY).await;
                continue;
            }
        };

        if tx.send(event).await.is_err() {
            debug!("control loop gone, stopping MQTT pump");
            return;
        }
    }
}
