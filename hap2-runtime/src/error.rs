//! Error taxonomy shared by every HAP2 component.
//!
//! - Recoverable / critical signals (connection loss, unrecoverable transport faults)
//! - Transport capacity, timeouts and remote failures, kept apart so callers can
//!   tell "no answer" from "explicit failure"
//! - One classification hook ([`handle_error`]) used at every task boundary

use std::time::Duration;
use tracing::{error, info, warn};

/// Errors raised by the runtime.
///
/// Validation problems on inbound messages are not errors: they travel as data
/// inside [`crate::protocol::ParsedMessage`].
#[derive(Debug, thiserror::Error)]
pub enum HapError {
    #[error("signal: {reason}")]
    Signal { reason: String, critical: bool },
    #[error("message of {size} bytes exceeds the transport limit of {limit} bytes")]
    TransportCapacity { size: usize, limit: usize },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("no acknowledgement from dispatcher for request {id} within {after:?}")]
    AcknowledgeTimeout { id: i64, after: Duration },
    #[error("timed out after {after:?} waiting for the response to {method} (id {id})")]
    Timeout { method: String, id: i64, after: Duration },
    #[error("server reported FAILURE for {method}")]
    RemoteFailure { method: String },
    #[error("server returned error {code}: {message}")]
    RemoteError { code: i32, message: String },
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("procedure not implemented: {0}")]
    NotImplemented(String),
    #[error("unknown transporter: {0}")]
    UnknownTransporter(String),
    #[error("channel closed: {0}")]
    ChannelClosed(&'static str),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("invalid hapi time: {0}")]
    InvalidTime(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl HapError {
    /// A condition the owning loop retries after its retry interval.
    pub fn recoverable(reason: impl Into<String>) -> Self {
        HapError::Signal { reason: reason.into(), critical: false }
    }

    /// A condition that must end the owning task.
    pub fn critical(reason: impl Into<String>) -> Self {
        HapError::Signal { reason: reason.into(), critical: true }
    }

    pub fn is_critical(&self) -> bool {
        matches!(self, HapError::Signal { critical: true, .. })
    }
}

/// Result of [`classify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Expected control flow: recoverable signals, timeouts, remote failures.
    ControlSignal,
    /// Critical signal: the owning task stops.
    Critical,
    /// Anything else is a defect worth a loud log line.
    Defect,
}

pub fn classify(err: &HapError) -> ErrorClass {
    match err {
        HapError::Signal { critical: true, .. } => ErrorClass::Critical,
        HapError::Signal { .. }
        | HapError::Timeout { .. }
        | HapError::RemoteFailure { .. }
        | HapError::RemoteError { .. }
        | HapError::Transport(_)
        | HapError::TransportCapacity { .. } => ErrorClass::ControlSignal,
        _ => ErrorClass::Defect,
    }
}

/// Logs an error according to its class and returns the class.
pub fn handle_error(context: &str, err: &HapError) -> ErrorClass {
    let class = classify(err);
    match class {
        ErrorClass::ControlSignal => info!("[{}] {}", context, err),
        ErrorClass::Critical => error!("[{}] critical: {}", context, err),
        ErrorClass::Defect => warn!("[{}] unexpected error: {:?}", context, err),
    }
    class
}
