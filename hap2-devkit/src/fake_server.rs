/*!
In-memory Hatohol server for plugin tests.

Sits on the far side of a [`MemoryTransporter`]: every call the plugin
sends with an id is answered from a per-method table, every message is
recorded, and the test can push server requests to the plugin.
*/

use crate::builders::{HapiMessageBuilder, ServerInfoBuilder};
use anyhow::{bail, Result};
use hap2_runtime::models::MonitoringServerInfo;
use hap2_runtime::protocol::Procedure;
use hap2_runtime::transporter::memory::{MemoryTransporter, SentKind};
use hap2_runtime::transporter::Transporter;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration, Instant};

const POLL_STEP: Duration = Duration::from_millis(50);

/// `None` keeps the server silent for that method.
type AnswerTable = HashMap<String, Option<Value>>;

pub struct FakeHatoholServer {
    transporter: Arc<MemoryTransporter>,
    answers: Arc<Mutex<AnswerTable>>,
    task: JoinHandle<()>,
}

impl FakeHatoholServer {
    /// Must be called inside a tokio runtime.
    pub fn new() -> Self {
        Self::on(Arc::new(MemoryTransporter::new()))
    }

    pub fn on(transporter: Arc<MemoryTransporter>) -> Self {
        env_logger::try_init().ok();

        let answers = Arc::new(Mutex::new(default_answers()));
        let mut outbound = transporter.subscribe_outbound();
        let task = {
            let transporter = transporter.clone();
            let answers = answers.clone();
            tokio::spawn(async move {
                while let Some(sent) = outbound.recv().await {
                    if sent.kind != SentKind::Call {
                        continue;
                    }
                    let msg = sent.json();
                    let (Some(method), Some(id)) = (msg["method"].as_str(), msg["id"].as_i64()) else {
                        continue;
                    };
                    let answer = answers
                        .lock()
                        .get(method)
                        .cloned()
                        .unwrap_or_else(|| Some(json!("SUCCESS")));
                    let Some(result) = answer else {
                        log::info!("🤐 [FAKE] Leaving {} (id {}) unanswered", method, id);
                        continue;
                    };
                    let reply = HapiMessageBuilder::response(result, id);
                    if let Err(e) = transporter.simulate_incoming(reply.to_string()) {
                        log::warn!("⚠️ [FAKE] Cannot answer {}: {}", method, e);
                    }
                }
            })
        };

        Self { transporter, answers, task }
    }

    pub fn with_server_info(self, info: &MonitoringServerInfo) -> Self {
        self.answer(Procedure::GetMonitoringServerInfo.name(), json!(info));
        self
    }

    /// The transporter to hand to `StandardHap::run_with` or `BaseMainPlugin::setup`.
    pub fn transporter(&self) -> Arc<dyn Transporter> {
        self.transporter.clone()
    }

    pub fn memory(&self) -> &Arc<MemoryTransporter> {
        &self.transporter
    }

    /// Answers every later `method` call with `result`.
    pub fn answer(&self, method: &str, result: Value) {
        self.answers.lock().insert(method.to_string(), Some(result));
    }

    /// Stops answering `method`, so the plugin side times out.
    pub fn silence(&self, method: &str) {
        self.answers.lock().insert(method.to_string(), None);
    }

    pub fn send(&self, message: &Value) -> Result<()> {
        self.transporter.simulate_incoming(message.to_string())?;
        log::info!("📨 [FAKE] Sent {}", message["method"].as_str().unwrap_or("reply"));
        Ok(())
    }

    pub fn send_request(&self, method: &str, params: Value, id: i64) -> Result<()> {
        self.send(&HapiMessageBuilder::request(method, params, id))
    }

    pub fn send_notification(&self, method: &str, params: Value) -> Result<()> {
        self.send(&HapiMessageBuilder::notification(method, params))
    }

    /// Calls (requests and notifications) the plugin made for `method`.
    pub fn calls(&self, method: &str) -> Vec<Value> {
        self.transporter.find_calls(method)
    }

    /// Responses and errors the plugin sent back to server requests.
    pub fn replies(&self) -> Vec<Value> {
        self.transporter
            .sent_messages()
            .into_iter()
            .filter(|sent| sent.kind == SentKind::Reply)
            .map(|sent| sent.json())
            .collect()
    }

    /// Waits until the plugin made `count` calls of `method`.
    pub async fn wait_for_calls(&self, method: &str, count: usize, timeout_ms: u64) -> Result<Option<Vec<Value>>> {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        loop {
            let calls = self.calls(method);
            if calls.len() >= count {
                return Ok(Some(calls));
            }
            if Instant::now() >= deadline {
                log::warn!("⏰ [FAKE] {} x{} not seen within {} ms", method, count, timeout_ms);
                return Ok(None);
            }
            sleep(POLL_STEP).await;
        }
    }

    pub async fn wait_for_call(&self, method: &str, timeout_ms: u64) -> Result<Option<Value>> {
        Ok(self
            .wait_for_calls(method, 1, timeout_ms)
            .await?
            .and_then(|calls| calls.into_iter().next()))
    }

    /// Waits for the plugin's reply to the server request `id`.
    pub async fn wait_for_reply(&self, id: i64, timeout_ms: u64) -> Result<Option<Value>> {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        loop {
            if let Some(reply) = self.replies().into_iter().find(|reply| reply["id"] == id) {
                return Ok(Some(reply));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            sleep(POLL_STEP).await;
        }
    }

    /// Fails unless every method in `methods` was called at least once.
    pub fn verify_called(&self, methods: &[&str]) -> Result<()> {
        let missing: Vec<&str> = methods
            .iter()
            .copied()
            .filter(|method| self.calls(method).is_empty())
            .collect();
        if !missing.is_empty() {
            bail!("never called: {}", missing.join(", "));
        }
        Ok(())
    }
}

impl Default for FakeHatoholServer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for FakeHatoholServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn default_answers() -> AnswerTable {
    let procedures: Vec<&str> = Procedure::ALL.iter().map(Procedure::name).collect();
    let mut answers = AnswerTable::new();
    answers.insert(
        Procedure::ExchangeProfile.name().to_string(),
        Some(json!({"procedures": procedures, "name": "hatohol"})),
    );
    answers.insert(
        Procedure::GetMonitoringServerInfo.name().to_string(),
        Some(ServerInfoBuilder::new("devkit").to_json()),
    );
    answers.insert(Procedure::GetLastInfo.name().to_string(), Some(json!("")));
    answers
}
