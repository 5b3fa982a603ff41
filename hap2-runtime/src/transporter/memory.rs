//! In-process transporter.
//!
//! Records everything the plugin sends and lets a test (or the devkit's fake
//! server) inject inbound messages, with no broker involved.

use super::{check_capacity, ReceiverCallback, Transporter, TransporterArgs, DEFAULT_MAX_MESSAGE_SIZE};
use crate::error::HapError;
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SentKind {
    Call,
    Reply,
}

#[derive(Debug, Clone)]
pub struct SentMessage {
    pub kind: SentKind,
    pub payload: String,
}

impl SentMessage {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.payload).unwrap_or(serde_json::Value::Null)
    }
}

pub struct MemoryTransporter {
    /// Set once, either at construction or by the first `setup`.
    max_message_size: Mutex<Option<usize>>,
    receiver: Mutex<Option<ReceiverCallback>>,
    inbound_tx: mpsc::UnboundedSender<String>,
    inbound_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<String>>,
    sent: Mutex<Vec<SentMessage>>,
    taps: Mutex<Vec<mpsc::UnboundedSender<SentMessage>>>,
}

impl MemoryTransporter {
    pub fn new() -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        Self {
            max_message_size: Mutex::new(None),
            receiver: Mutex::new(None),
            inbound_tx,
            inbound_rx: tokio::sync::Mutex::new(inbound_rx),
            sent: Mutex::new(Vec::new()),
            taps: Mutex::new(Vec::new()),
        }
    }

    pub fn with_max_message_size(limit: usize) -> Self {
        let transporter = Self::new();
        *transporter.max_message_size.lock() = Some(limit);
        transporter
    }

    fn limit(&self) -> usize {
        self.max_message_size.lock().unwrap_or(DEFAULT_MAX_MESSAGE_SIZE)
    }

    /// Queues a message as if the server had sent it.
    pub fn simulate_incoming(&self, payload: impl Into<String>) -> Result<(), HapError> {
        self.inbound_tx
            .send(payload.into())
            .map_err(|_| HapError::ChannelClosed("memory inbound"))
    }

    /// Every message sent from now on is also pushed to the returned channel.
    pub fn subscribe_outbound(&self) -> mpsc::UnboundedReceiver<SentMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.taps.lock().push(tx);
        rx
    }

    pub fn sent_messages(&self) -> Vec<SentMessage> {
        self.sent.lock().clone()
    }

    /// Sent messages whose `method` is `method`.
    pub fn find_calls(&self, method: &str) -> Vec<serde_json::Value> {
        self.sent
            .lock()
            .iter()
            .map(SentMessage::json)
            .filter(|msg| msg.get("method").and_then(|m| m.as_str()) == Some(method))
            .collect()
    }

    pub fn clear(&self) {
        self.sent.lock().clear();
    }

    fn record(&self, kind: SentKind, msg: &str) -> Result<(), HapError> {
        check_capacity(msg, self.limit())?;
        let message = SentMessage { kind, payload: msg.to_string() };
        debug!("[memory] {:?} {} bytes", kind, msg.len());
        self.taps.lock().retain(|tap| tap.send(message.clone()).is_ok());
        self.sent.lock().push(message);
        Ok(())
    }
}

impl Default for MemoryTransporter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transporter for MemoryTransporter {
    async fn setup(&self, args: &TransporterArgs) -> Result<(), HapError> {
        let mut limit = self.max_message_size.lock();
        if limit.is_none() {
            *limit = Some(args.max_message_size);
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), HapError> {
        Ok(())
    }

    async fn call(&self, msg: &str) -> Result<(), HapError> {
        self.record(SentKind::Call, msg)
    }

    async fn reply(&self, msg: &str) -> Result<(), HapError> {
        self.record(SentKind::Reply, msg)
    }

    fn set_receiver(&self, receiver: ReceiverCallback) {
        *self.receiver.lock() = Some(receiver);
    }

    fn get_receiver(&self) -> Option<ReceiverCallback> {
        self.receiver.lock().clone()
    }

    async fn run_receive_loop(&self) -> Result<(), HapError> {
        let mut inbound = self.inbound_rx.lock().await;
        while let Some(msg) = inbound.recv().await {
            match self.get_receiver() {
                Some(receiver) => receiver(msg),
                None => warn!("[memory] no receiver set, dropping message"),
            }
        }
        Ok(())
    }
}
