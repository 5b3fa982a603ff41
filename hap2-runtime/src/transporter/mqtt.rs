//! MQTT transporter on top of `rumqttc`.
//!
//! The plugin publishes on `<queue>-S` and listens on `<queue>-T`. The
//! subscription is (re)issued on every CONNACK so a broker restart does not
//! leave the plugin deaf.

use super::{check_capacity, ReceiverCallback, Transporter, TransporterArgs};
use crate::error::HapError;
use async_trait::async_trait;
use parking_lot::Mutex;
use rumqttc::{AsyncClient, Event, EventLoop, Incoming, MqttOptions, QoS, Transport};
use std::time::Duration;
use tracing::{debug, info, warn};

const RECONNECT_DELAY: Duration = Duration::from_secs(2);
/// Room for the MQTT fixed header and topic on top of the payload limit.
const PACKET_OVERHEAD: usize = 1024;

#[derive(Clone)]
struct Connection {
    client: AsyncClient,
    publish_topic: String,
    subscribe_topic: String,
    max_message_size: usize,
}

pub struct MqttTransporter {
    connection: Mutex<Option<Connection>>,
    eventloop: tokio::sync::Mutex<Option<EventLoop>>,
    receiver: Mutex<Option<ReceiverCallback>>,
}

impl MqttTransporter {
    pub fn new() -> Self {
        Self {
            connection: Mutex::new(None),
            eventloop: tokio::sync::Mutex::new(None),
            receiver: Mutex::new(None),
        }
    }

    fn connection(&self) -> Result<Connection, HapError> {
        self.connection
            .lock()
            .clone()
            .ok_or_else(|| HapError::recoverable("mqtt transporter is not set up"))
    }

    async fn publish(&self, msg: &str) -> Result<(), HapError> {
        let conn = self.connection()?;
        check_capacity(msg, conn.max_message_size)?;
        conn.client
            .publish(conn.publish_topic.as_str(), QoS::AtLeastOnce, false, msg.as_bytes().to_vec())
            .await
            .map_err(|e| HapError::Transport(format!("publish on {}: {}", conn.publish_topic, e)))
    }
}

impl Default for MqttTransporter {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn topics(queue: &str) -> (String, String) {
    (format!("{}-S", queue), format!("{}-T", queue))
}

async fn build_options(args: &TransporterArgs) -> Result<MqttOptions, HapError> {
    let client_id = args
        .client_id
        .clone()
        .unwrap_or_else(|| format!("hap2-{}", uuid::Uuid::new_v4().simple()));
    let mut opts = MqttOptions::new(client_id, args.broker.as_str(), args.port);
    opts.set_keep_alive(Duration::from_secs(15));
    let packet_limit = args.max_message_size + PACKET_OVERHEAD;
    opts.set_max_packet_size(packet_limit, packet_limit);

    if let Some(user) = &args.user {
        opts.set_credentials(user.as_str(), args.password.clone().unwrap_or_default());
    }

    if let Some(ca_path) = &args.ssl_ca_cert {
        let ca = tokio::fs::read(ca_path).await?;
        let client_auth = match (&args.ssl_client_cert, &args.ssl_client_key) {
            (Some(cert), Some(key)) => Some((tokio::fs::read(cert).await?, tokio::fs::read(key).await?)),
            (None, None) => None,
            _ => {
                return Err(HapError::Config(
                    "ssl client certificate and key must be given together".to_string(),
                ))
            }
        };
        opts.set_transport(Transport::tls(ca, client_auth, None));
    }
    Ok(opts)
}

#[async_trait]
impl Transporter for MqttTransporter {
    async fn setup(&self, args: &TransporterArgs) -> Result<(), HapError> {
        if self.connection.lock().is_some() {
            return Ok(());
        }
        let opts = build_options(args).await?;
        let (client, eventloop) = AsyncClient::new(opts, 10);
        let (publish_topic, subscribe_topic) = topics(&args.queue);
        info!(
            "[mqtt] connecting to {}:{} (publish {}, subscribe {})",
            args.broker, args.port, publish_topic, subscribe_topic
        );
        *self.eventloop.lock().await = Some(eventloop);
        *self.connection.lock() = Some(Connection {
            client,
            publish_topic,
            subscribe_topic,
            max_message_size: args.max_message_size,
        });
        Ok(())
    }

    async fn close(&self) -> Result<(), HapError> {
        let conn = self.connection.lock().take();
        if let Some(conn) = conn {
            if let Err(e) = conn.client.disconnect().await {
                debug!("[mqtt] disconnect: {}", e);
            }
        }
        *self.eventloop.lock().await = None;
        info!("[mqtt] closed");
        Ok(())
    }

    async fn call(&self, msg: &str) -> Result<(), HapError> {
        self.publish(msg).await
    }

    async fn reply(&self, msg: &str) -> Result<(), HapError> {
        self.publish(msg).await
    }

    fn set_receiver(&self, receiver: ReceiverCallback) {
        *self.receiver.lock() = Some(receiver);
    }

    fn get_receiver(&self) -> Option<ReceiverCallback> {
        self.receiver.lock().clone()
    }

    async fn run_receive_loop(&self) -> Result<(), HapError> {
        let conn = self.connection()?;
        let mut guard = self.eventloop.lock().await;
        let eventloop = guard
            .as_mut()
            .ok_or_else(|| HapError::recoverable("mqtt event loop is not set up"))?;

        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    info!("[mqtt] connected, subscribing {}", conn.subscribe_topic);
                    // try_subscribe: the request queue is drained by this very loop
                    if let Err(e) = conn.client.try_subscribe(conn.subscribe_topic.as_str(), QoS::AtLeastOnce) {
                        warn!("[mqtt] subscribe {} failed: {}", conn.subscribe_topic, e);
                    }
                }
                Ok(Event::Incoming(Incoming::Publish(p))) if p.topic == conn.subscribe_topic => {
                    match String::from_utf8(p.payload.to_vec()) {
                        Ok(text) => match self.get_receiver() {
                            Some(receiver) => receiver(text),
                            None => warn!("[mqtt] no receiver set, dropping message"),
                        },
                        Err(_) => warn!("[mqtt] non UTF-8 payload on {}", p.topic),
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("[mqtt] connection error: {}", e);
                    tokio::time::sleep(RECONNECT_DELAY).await;
                }
            }
        }
    }
}
