//! Serializes JSON-RPC envelopes and hands them to the transporter.

use crate::error::HapError;
use crate::protocol::{envelope_id, error_message, JSONRPC_VERSION};
use crate::transporter::Transporter;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

/// Stateless: it keeps no record of outstanding requests.
#[derive(Clone)]
pub struct Sender {
    transporter: Arc<dyn Transporter>,
}

impl Sender {
    pub fn new(transporter: Arc<dyn Transporter>) -> Self {
        Self { transporter }
    }

    pub fn transporter(&self) -> &Arc<dyn Transporter> {
        &self.transporter
    }

    /// Sends a request, or a notification when `id` is `None`.
    pub async fn request(&self, method: &str, params: Value, id: Option<i64>) -> Result<(), HapError> {
        let mut envelope = json!({
            "jsonrpc": JSONRPC_VERSION,
            "method": method,
            "params": params,
        });
        if let Some(id) = id {
            envelope["id"] = Value::from(id);
        }
        let text = serde_json::to_string(&envelope)?;
        debug!("[sender] request {} ({} bytes)", method, text.len());
        self.transporter.call(&text).await
    }

    pub async fn notify(&self, method: &str, params: Value) -> Result<(), HapError> {
        self.request(method, params, None).await
    }

    pub async fn response(&self, result: Value, id: i64) -> Result<(), HapError> {
        let envelope = json!({"jsonrpc": JSONRPC_VERSION, "result": result, "id": id});
        self.transporter.reply(&serde_json::to_string(&envelope)?).await
    }

    /// Sends the canned error for `code`; `id` is `null` when unknown.
    pub async fn error(&self, code: i32, id: Option<i64>) -> Result<(), HapError> {
        let envelope = json!({
            "jsonrpc": JSONRPC_VERSION,
            "error": {"code": code, "message": error_message(code)},
            "id": envelope_id(id),
        });
        self.transporter.reply(&serde_json::to_string(&envelope)?).await
    }
}
