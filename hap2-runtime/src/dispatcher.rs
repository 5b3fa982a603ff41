//! Routes parsed inbound messages to whoever waits for them.
//!
//! The dispatcher task owns two tables:
//! - in-flight: correlation id → component blocked on that id
//! - reply queues: component → its private reply channel
//!
//! A caller registers interest with [`DispatcherHandle::acknowledge`] and
//! waits for [`Reply::Acknowledged`] before sending its request, so the
//! response can never arrive before the registration. Anything that is not
//! a tracked response goes to the inbound RPC queue of the main plugin.

use crate::error::HapError;
use crate::protocol::{Component, CorrelationId, ParsedKind, ParsedMessage};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// What a component receives on its reply queue.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Acknowledged,
    Message(ParsedMessage),
}

/// What the main plugin receives on its inbound RPC queue.
#[derive(Debug, Clone, PartialEq)]
pub enum RpcEvent {
    Message(ParsedMessage),
    Terminate,
}

#[derive(Debug)]
pub enum DispatcherInput {
    Acknowledge { component: Component, id: i64 },
    Message(ParsedMessage),
    Attach { component: Component, queue: mpsc::UnboundedSender<Reply> },
    /// Drops an in-flight entry whose waiter gave up.
    Forget { id: i64 },
    Shutdown,
}

#[derive(Clone, Debug)]
pub struct DispatcherHandle {
    tx: mpsc::UnboundedSender<DispatcherInput>,
}

impl DispatcherHandle {
    fn send(&self, input: DispatcherInput) -> Result<(), HapError> {
        self.tx
            .send(input)
            .map_err(|_| HapError::ChannelClosed("dispatcher inbox"))
    }

    pub fn acknowledge(&self, component: Component, id: i64) -> Result<(), HapError> {
        self.send(DispatcherInput::Acknowledge { component, id })
    }

    pub fn dispatch(&self, msg: ParsedMessage) -> Result<(), HapError> {
        self.send(DispatcherInput::Message(msg))
    }

    /// Creates the reply queue of `component`, replacing any previous one.
    pub fn attach(&self, component: Component) -> Result<mpsc::UnboundedReceiver<Reply>, HapError> {
        let (queue, rx) = mpsc::unbounded_channel();
        self.send(DispatcherInput::Attach { component, queue })?;
        Ok(rx)
    }

    pub fn forget(&self, id: i64) {
        // a closed inbox has no table left to clean
        let _ = self.send(DispatcherInput::Forget { id });
    }

    pub fn shutdown(&self) {
        let _ = self.send(DispatcherInput::Shutdown);
    }
}

pub struct Dispatcher {
    in_flight: HashMap<i64, Component>,
    reply_queues: HashMap<Component, mpsc::UnboundedSender<Reply>>,
    rpc_queue: mpsc::UnboundedSender<RpcEvent>,
    inbox: mpsc::UnboundedReceiver<DispatcherInput>,
}

impl Dispatcher {
    /// Builds a dispatcher feeding `rpc_queue`, plus the handle to reach it.
    pub fn new(rpc_queue: mpsc::UnboundedSender<RpcEvent>) -> (Self, DispatcherHandle) {
        let (tx, inbox) = mpsc::unbounded_channel();
        let dispatcher = Self {
            in_flight: HashMap::new(),
            reply_queues: HashMap::new(),
            rpc_queue,
            inbox,
        };
        (dispatcher, DispatcherHandle { tx })
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Runs until `Shutdown` or until every handle is dropped.
    ///
    /// A closed RPC queue ends the task with an error: nothing could receive
    /// inbound calls any more.
    pub async fn run(mut self) -> Result<(), HapError> {
        info!("[dispatcher] started");
        while let Some(input) = self.inbox.recv().await {
            if !self.handle(input)? {
                break;
            }
        }
        info!("[dispatcher] stopped");
        Ok(())
    }

    /// Processes one input; `Ok(false)` asks the loop to stop.
    pub fn handle(&mut self, input: DispatcherInput) -> Result<bool, HapError> {
        match input {
            DispatcherInput::Attach { component, queue } => {
                debug!("[dispatcher] reply queue attached for {}", component);
                self.reply_queues.insert(component, queue);
            }
            DispatcherInput::Acknowledge { component, id } => self.acknowledge(component, id),
            DispatcherInput::Forget { id } => {
                if self.in_flight.remove(&id).is_some() {
                    debug!("[dispatcher] forgot {}", id);
                }
            }
            DispatcherInput::Message(msg) => self.route(msg)?,
            DispatcherInput::Shutdown => return Ok(false),
        }
        Ok(true)
    }

    fn acknowledge(&mut self, component: Component, id: i64) {
        if self.in_flight.contains_key(&id) {
            warn!("[dispatcher] duplicate acknowledgement for {} from {}, ignored", id, component);
            return;
        }
        let Some(queue) = self.reply_queues.get(&component) else {
            error!("[dispatcher] no reply queue for {}", component);
            return;
        };
        if queue.send(Reply::Acknowledged).is_err() {
            warn!("[dispatcher] reply queue of {} is closed", component);
            return;
        }
        self.in_flight.insert(id, component);
    }

    fn route(&mut self, msg: ParsedMessage) -> Result<(), HapError> {
        let Some(id) = msg.message_id else {
            if msg.is_error() {
                return self.to_rpc_queue(msg);
            }
            return self.route_unmatched(msg);
        };

        if let Some(component) = self.in_flight.remove(&id) {
            match self.reply_queues.get(&component) {
                Some(queue) if queue.send(Reply::Message(msg)).is_ok() => {}
                _ => warn!("[dispatcher] waiter {} for {} is gone, reply dropped", component, id),
            }
            return Ok(());
        }
        self.route_unmatched(msg)
    }

    fn route_unmatched(&mut self, msg: ParsedMessage) -> Result<(), HapError> {
        let has_method = matches!(
            msg.kind,
            ParsedKind::Request { .. } | ParsedKind::Invalid { method: Some(_), .. }
        );
        if !has_method {
            match msg.message_id.and_then(CorrelationId::from_wire) {
                Some(origin) => warn!(
                    "[dispatcher] late reply to {} request {} dropped",
                    origin.component, origin
                ),
                None => warn!("[dispatcher] undeliverable message dropped: {:?}", msg),
            }
            return Ok(());
        }
        self.to_rpc_queue(msg)
    }

    fn to_rpc_queue(&self, msg: ParsedMessage) -> Result<(), HapError> {
        self.rpc_queue
            .send(RpcEvent::Message(msg))
            .map_err(|_| HapError::ChannelClosed("rpc queue"))
    }
}
