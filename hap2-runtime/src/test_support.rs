//! Wires a memory transporter, receiver and dispatcher together for unit
//! tests, with a scripted server on the other end.

use crate::dispatcher::{Dispatcher, DispatcherHandle, RpcEvent};
use crate::protocol::Procedure;
use crate::receiver::Receiver;
use crate::sender::Sender;
use crate::transporter::memory::{MemoryTransporter, SentKind};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub(crate) struct Pipeline {
    pub transporter: Arc<MemoryTransporter>,
    pub sender: Sender,
    pub dispatcher: DispatcherHandle,
    pub rpc_rx: mpsc::UnboundedReceiver<RpcEvent>,
    tasks: Vec<JoinHandle<()>>,
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

pub(crate) fn pipeline(allowed: &[Procedure]) -> Pipeline {
    pipeline_on(Arc::new(MemoryTransporter::new()), allowed)
}

pub(crate) fn pipeline_on(transporter: Arc<MemoryTransporter>, allowed: &[Procedure]) -> Pipeline {
    let (rpc_tx, rpc_rx) = mpsc::unbounded_channel();
    let (dispatcher, handle) = Dispatcher::new(rpc_tx);
    let receiver = Receiver::new(
        transporter.clone(),
        allowed.iter().copied().collect::<HashSet<_>>(),
        handle.clone(),
    );
    let tasks = vec![
        tokio::spawn(async move {
            let _ = dispatcher.run().await;
        }),
        tokio::spawn(async move {
            let _ = receiver.run().await;
        }),
    ];
    Pipeline {
        sender: Sender::new(transporter.clone()),
        transporter,
        dispatcher: handle,
        rpc_rx,
        tasks,
    }
}

impl Pipeline {
    /// Answers every outbound request with `answer(method, params)`;
    /// `None` leaves the request unanswered.
    pub fn serve<F>(&mut self, answer: F)
    where
        F: Fn(&str, &Value) -> Option<Value> + Send + 'static,
    {
        let mut outbound = self.transporter.subscribe_outbound();
        let transporter = self.transporter.clone();
        self.tasks.push(tokio::spawn(async move {
            while let Some(sent) = outbound.recv().await {
                if sent.kind != SentKind::Call {
                    continue;
                }
                let msg = sent.json();
                let (Some(method), Some(id)) = (msg["method"].as_str(), msg["id"].as_i64()) else {
                    continue;
                };
                if let Some(result) = answer(method, &msg["params"]) {
                    let reply = json!({"jsonrpc": "2.0", "result": result, "id": id});
                    let _ = transporter.simulate_incoming(reply.to_string());
                }
            }
        }));
    }

    /// Answers every request with `"SUCCESS"`.
    pub fn serve_success(&mut self) {
        self.serve(|_, _| Some(json!("SUCCESS")));
    }

    pub fn calls(&self, method: &str) -> Vec<Value> {
        self.transporter.find_calls(method)
    }
}

pub(crate) fn monitoring_server_info_json(polling: u64, retry: u64) -> Value {
    json!({
        "serverId": 1,
        "url": "http://127.0.0.1/",
        "type": "hap2-test",
        "nickName": "test",
        "userName": "admin",
        "password": "secret",
        "pollingIntervalSec": polling,
        "retryIntervalSec": retry,
        "extendedInfo": ""
    })
}
