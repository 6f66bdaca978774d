//! Broker session and inbound message routing

use super::events::BrokerEvent;
use crate::command::CommandDispatcher;
use crate::config::BrokerConfig;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use rumqttc::{AsyncClient, EventLoop, MqttOptions, QoS};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Delay between polls after the session drops, while the library reconnects
const RECONNECT_POLL_DELAY: Duration = Duration::from_secs(1);

/// Anything that can register interest in a topic
#[async_trait]
pub trait Subscriber: Send + Sync {
    async fn subscribe(&self, topic: &str) -> Result<()>;
}

/// Subscribes through the MQTT client at QoS 0
#[derive(Clone)]
pub struct MqttSubscriber {
    client: AsyncClient,
}

#[async_trait]
impl Subscriber for MqttSubscriber {
    async fn subscribe(&self, topic: &str) -> Result<()> {
        self.client
            .subscribe(topic, QoS::AtMostOnce)
            .await
            .map_err(|e| anyhow!("Subscribe to {} failed: {}", topic, e))
    }
}

/// Logical session with the message broker
pub struct CommandChannel {
    client: AsyncClient,
    event_rx: mpsc::Receiver<BrokerEvent>,
}

impl CommandChannel {
    /// Start the broker session and its event loop
    pub fn connect(config: &BrokerConfig) -> Self {
        let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
        options.set_credentials(&config.username, &config.password);
        options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));
        options.set_clean_session(true);

        let (client, eventloop) = AsyncClient::new(options, 16);
        let (event_tx, event_rx) = mpsc::channel::<BrokerEvent>(100);

        info!("[MQTT] Connecting to {}:{}", config.host, config.port);
        tokio::spawn(async move {
            event_loop(eventloop, event_tx).await;
        });

        Self { client, event_rx }
    }

    /// Receive the next broker event
    pub async fn recv(&mut self) -> Option<BrokerEvent> {
        self.event_rx.recv().await
    }

    /// Handle used to (re)subscribe topics
    pub fn subscriber(&self) -> MqttSubscriber {
        MqttSubscriber {
            client: self.client.clone(),
        }
    }

    /// End the session
    pub async fn disconnect(&self) -> Result<()> {
        self.client
            .disconnect()
            .await
            .map_err(|e| anyhow!("Disconnect failed: {}", e))
    }
}

/// Polls the client library and forwards events in arrival order
async fn event_loop(mut eventloop: EventLoop, event_tx: mpsc::Sender<BrokerEvent>) {
    let mut connected = false;

    loop {
        let event = match eventloop.poll().await {
            Ok(event) => match BrokerEvent::from_mqtt(&event) {
                Some(event) => event,
                None => continue,
            },
            Err(e) => {
                let reason = e.to_string();
                let event = if connected {
                    BrokerEvent::Disconnected { reason }
                } else {
                    BrokerEvent::Error { reason }
                };
                connected = false;
                if event_tx.send(event).await.is_err() {
                    break;
                }
                // The next poll reconnects
                tokio::time::sleep(RECONNECT_POLL_DELAY).await;
                continue;
            }
        };

        match event {
            BrokerEvent::Connected => connected = true,
            BrokerEvent::Disconnected { .. } => connected = false,
            _ => {}
        }

        if event_tx.send(event).await.is_err() {
            break;
        }
    }

    debug!("[MQTT] Event loop stopped");
}

/// React to one broker event
///
/// Subscriptions are re-issued on every connect; message handling failures
/// never leave this function.
pub async fn handle_broker_event(
    event: BrokerEvent,
    subscriber: &dyn Subscriber,
    dispatcher: &CommandDispatcher,
) {
    match event {
        BrokerEvent::Connected => {
            info!("[MQTT] Connected");
            for topic in dispatcher.topics() {
                match subscriber.subscribe(topic).await {
                    Ok(()) => debug!("[MQTT] Subscribing to {}", topic),
                    Err(e) => error!("[MQTT] {}", e),
                }
            }
        }
        BrokerEvent::Disconnected { reason } => {
            warn!("[MQTT] Disconnected: {}", reason);
        }
        BrokerEvent::Subscribed => {
            info!("[MQTT] Subscribed to topic");
        }
        BrokerEvent::Unsubscribed => {
            info!("[MQTT] Unsubscribed from topic");
        }
        BrokerEvent::Message { topic, payload } => {
            info!(
                "[MQTT] Data received: topic={} data={}",
                String::from_utf8_lossy(&topic),
                String::from_utf8_lossy(&payload)
            );
            dispatcher.dispatch(&topic, &payload).await;
        }
        BrokerEvent::Error { reason } => {
            warn!("[MQTT] Error: {}", reason);
        }
    }
}
