//! Transporter contract and registry.
//!
//! A transporter moves raw JSON strings between the plugin and the Hatohol
//! server. The runtime only sees this trait; concrete transports are looked up
//! by name in a [`TransporterManager`]:
//! - `mqtt` : broker transport ([`mqtt::MqttTransporter`])
//! - `memory` : in-process transport for tests and local runs ([`memory::MemoryTransporter`])

pub mod memory;
pub mod mqtt;

use crate::error::HapError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Invoked once per inbound raw message.
pub type ReceiverCallback = Arc<dyn Fn(String) + Send + Sync>;

/// Connection parameters shared by all transporters.
///
/// Each transporter reads the fields it understands and ignores the rest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransporterArgs {
    pub broker: String,
    pub port: u16,
    /// Base queue name; `-S` / `-T` suffixes select the direction.
    pub queue: String,
    pub client_id: Option<String>,
    pub user: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    pub ssl_ca_cert: Option<PathBuf>,
    pub ssl_client_cert: Option<PathBuf>,
    pub ssl_client_key: Option<PathBuf>,
    pub max_message_size: usize,
}

pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 1024 * 1024;

impl Default for TransporterArgs {
    fn default() -> Self {
        Self {
            broker: "localhost".to_string(),
            port: 1883,
            queue: "hap2".to_string(),
            client_id: None,
            user: None,
            password: None,
            ssl_ca_cert: None,
            ssl_client_cert: None,
            ssl_client_key: None,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

#[async_trait]
pub trait Transporter: Send + Sync {
    /// Establishes the connection. Calling it again on a live transporter is a no-op.
    async fn setup(&self, args: &TransporterArgs) -> Result<(), HapError>;

    async fn close(&self) -> Result<(), HapError>;

    /// Sends a request or notification.
    ///
    /// Fails with [`HapError::TransportCapacity`] when `msg` exceeds the
    /// transport limit; messages are never truncated.
    async fn call(&self, msg: &str) -> Result<(), HapError>;

    /// Sends a response on the same channel.
    async fn reply(&self, msg: &str) -> Result<(), HapError>;

    fn set_receiver(&self, receiver: ReceiverCallback);

    fn get_receiver(&self) -> Option<ReceiverCallback>;

    /// Blocks, handing every inbound message to the receiver.
    ///
    /// May be called again after the previous loop was dropped.
    async fn run_receive_loop(&self) -> Result<(), HapError>;
}

pub(crate) fn check_capacity(msg: &str, limit: usize) -> Result<(), HapError> {
    if msg.len() > limit {
        return Err(HapError::TransportCapacity { size: msg.len(), limit });
    }
    Ok(())
}

pub type TransporterFactory = fn() -> Arc<dyn Transporter>;

/// Name → transporter factory registry.
#[derive(Clone, Default)]
pub struct TransporterManager {
    factories: BTreeMap<String, TransporterFactory>,
}

impl TransporterManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in `mqtt` and `memory` transporters.
    pub fn with_defaults() -> Self {
        let mut manager = Self::new();
        manager.register("mqtt", || Arc::new(mqtt::MqttTransporter::new()));
        manager.register("memory", || Arc::new(memory::MemoryTransporter::new()));
        manager
    }

    pub fn register(&mut self, name: &str, factory: TransporterFactory) {
        if self.factories.insert(name.to_string(), factory).is_some() {
            tracing::warn!("[transporter] factory {} replaced", name);
        }
    }

    pub fn create(&self, name: &str) -> Result<Arc<dyn Transporter>, HapError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| HapError::UnknownTransporter(name.to_string()))?;
        Ok(factory())
    }

    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }
}
