//! Main plugin: owns the dispatcher / receiver pair and serves inbound RPCs.
//!
//! Lifecycle:
//! - [`BaseMainPlugin::new`] (no I/O)
//! - [`BaseMainPlugin::setup`] (connects the transporter, builds the pipeline)
//! - [`BaseMainPlugin::start_dispatcher`] / [`BaseMainPlugin::start_receiver`]
//! - [`BaseMainPlugin::exchange_profile`], then [`BaseMainPlugin::get_monitoring_server_info`]
//! - [`BaseMainPlugin::run`] until a `Terminate` sentinel arrives

use crate::dispatcher::{Dispatcher, DispatcherHandle, RpcEvent};
use crate::error::{handle_error, ErrorClass, HapError};
use crate::hapi::HapiProcessor;
use crate::models::{
    FetchEventsParams, FetchHistoryParams, FetchHostsParams, FetchItemsParams,
    FetchTriggersParams, MonitoringServerInfo,
};
use crate::protocol::{Component, ParsedKind, ParsedMessage, Procedure, ERR_INVALID_PARAMS, ERR_METHOD_NOT_FOUND};
use crate::receiver::Receiver;
use crate::sender::Sender;
use crate::transporter::{Transporter, TransporterArgs};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// A pipeline task, ready to be spawned by the supervisor.
pub type TaskFuture = Pin<Box<dyn Future<Output = Result<(), HapError>> + Send>>;

pub type MonitoringServerInfoCallback = Box<dyn FnMut(Arc<MonitoringServerInfo>) + Send>;

/// Source-specific answers to server-initiated fetches.
///
/// Only the procedures listed by [`implemented_procedures`](Self::implemented_procedures)
/// are advertised and dispatched. The base plugin has already answered
/// `SUCCESS` to `request_id` when a `fetch_*` method runs; the handler
/// uploads its data through `hapi`.
#[async_trait]
pub trait MainPluginHandler: Send {
    fn implemented_procedures(&self) -> Vec<Procedure> {
        Vec::new()
    }

    async fn fetch_hosts(
        &mut self,
        _hapi: &mut HapiProcessor,
        _params: FetchHostsParams,
        _request_id: i64,
    ) -> Result<(), HapError> {
        Err(HapError::NotImplemented(Procedure::FetchHosts.name().to_string()))
    }

    async fn fetch_items(
        &mut self,
        _hapi: &mut HapiProcessor,
        _params: FetchItemsParams,
        _request_id: i64,
    ) -> Result<(), HapError> {
        Err(HapError::NotImplemented(Procedure::FetchItems.name().to_string()))
    }

    async fn fetch_history(
        &mut self,
        _hapi: &mut HapiProcessor,
        _params: FetchHistoryParams,
        _request_id: i64,
    ) -> Result<(), HapError> {
        Err(HapError::NotImplemented(Procedure::FetchHistory.name().to_string()))
    }

    async fn fetch_triggers(
        &mut self,
        _hapi: &mut HapiProcessor,
        _params: FetchTriggersParams,
        _request_id: i64,
    ) -> Result<(), HapError> {
        Err(HapError::NotImplemented(Procedure::FetchTriggers.name().to_string()))
    }

    async fn fetch_events(
        &mut self,
        _hapi: &mut HapiProcessor,
        _params: FetchEventsParams,
        _request_id: i64,
    ) -> Result<(), HapError> {
        Err(HapError::NotImplemented(Procedure::FetchEvents.name().to_string()))
    }
}

/// Procedures a handler may implement on top of the built-in ones.
const HANDLER_PROCEDURES: [Procedure; 5] = [
    Procedure::FetchHosts,
    Procedure::FetchItems,
    Procedure::FetchHistory,
    Procedure::FetchTriggers,
    Procedure::FetchEvents,
];

struct Wiring {
    transporter: Arc<dyn Transporter>,
    sender: Sender,
    dispatcher: Option<Dispatcher>,
    dispatcher_handle: DispatcherHandle,
    rpc_tx: mpsc::UnboundedSender<RpcEvent>,
    rpc_rx: Option<mpsc::UnboundedReceiver<RpcEvent>>,
    hapi: HapiProcessor,
}

pub struct BaseMainPlugin {
    name: String,
    handler: Box<dyn MainPluginHandler>,
    procedures: BTreeMap<&'static str, Procedure>,
    ms_info_callback: Option<MonitoringServerInfoCallback>,
    wiring: Option<Wiring>,
}

impl BaseMainPlugin {
    pub fn new(name: impl Into<String>, handler: Box<dyn MainPluginHandler>) -> Self {
        let mut procedures = BTreeMap::new();
        for p in [Procedure::ExchangeProfile, Procedure::UpdateMonitoringServerInfo] {
            procedures.insert(p.name(), p);
        }
        for p in handler.implemented_procedures() {
            if HANDLER_PROCEDURES.contains(&p) {
                procedures.insert(p.name(), p);
            } else {
                warn!("[main] {} cannot be provided by a handler, ignored", p);
            }
        }
        Self {
            name: name.into(),
            handler,
            procedures,
            ms_info_callback: None,
            wiring: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Procedures advertised to the server, in name order.
    pub fn implemented_procedures(&self) -> Vec<Procedure> {
        self.procedures.values().copied().collect()
    }

    /// Implemented procedures that the server also lists in its profile.
    fn shared_procedures(&self, server_profile: &Value) -> Vec<Procedure> {
        let offered: HashSet<&str> = server_profile
            .get("procedures")
            .and_then(Value::as_array)
            .map(|list| list.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();
        self.procedures
            .iter()
            .filter(|(name, _)| offered.contains(*name))
            .map(|(_, procedure)| *procedure)
            .collect()
    }

    fn allowed(&self) -> HashSet<Procedure> {
        self.procedures.values().copied().collect()
    }

    /// Connects the transporter and builds sender, dispatcher and the main
    /// RPC client. Replaces any previous pipeline.
    pub async fn setup(&mut self, transporter: Arc<dyn Transporter>, args: &TransporterArgs) -> Result<(), HapError> {
        transporter.setup(args).await?;
        let sender = Sender::new(transporter.clone());
        let (rpc_tx, rpc_rx) = mpsc::unbounded_channel();
        let (dispatcher, dispatcher_handle) = Dispatcher::new(rpc_tx.clone());
        let hapi = HapiProcessor::new(Component::Main, sender.clone(), dispatcher_handle.clone())?;
        self.wiring = Some(Wiring {
            transporter,
            sender,
            dispatcher: Some(dispatcher),
            dispatcher_handle,
            rpc_tx,
            rpc_rx: Some(rpc_rx),
            hapi,
        });
        info!("[main] {} set up", self.name);
        Ok(())
    }

    fn wiring(&self) -> Result<&Wiring, HapError> {
        self.wiring
            .as_ref()
            .ok_or_else(|| HapError::Protocol("main plugin is not set up".to_string()))
    }

    fn wiring_mut(&mut self) -> Result<&mut Wiring, HapError> {
        self.wiring
            .as_mut()
            .ok_or_else(|| HapError::Protocol("main plugin is not set up".to_string()))
    }

    pub fn start_dispatcher(&mut self) -> Result<TaskFuture, HapError> {
        let dispatcher = self
            .wiring_mut()?
            .dispatcher
            .take()
            .ok_or_else(|| HapError::Protocol("dispatcher already started".to_string()))?;
        Ok(Box::pin(dispatcher.run()))
    }

    pub fn start_receiver(&self) -> Result<TaskFuture, HapError> {
        let wiring = self.wiring()?;
        let receiver = Receiver::new(
            wiring.transporter.clone(),
            self.allowed(),
            wiring.dispatcher_handle.clone(),
        );
        Ok(Box::pin(receiver.run()))
    }

    pub fn sender(&self) -> Result<Sender, HapError> {
        Ok(self.wiring()?.sender.clone())
    }

    pub fn dispatcher_handle(&self) -> Result<DispatcherHandle, HapError> {
        Ok(self.wiring()?.dispatcher_handle.clone())
    }

    /// An RPC client for another component sharing this dispatcher.
    pub fn create_hapi(&self, component: Component) -> Result<HapiProcessor, HapError> {
        let wiring = self.wiring()?;
        HapiProcessor::new(component, wiring.sender.clone(), wiring.dispatcher_handle.clone())
    }

    /// Sender side of the inbound RPC queue; pushing
    /// [`RpcEvent::Terminate`] ends [`run`](Self::run).
    pub fn rpc_queue(&self) -> Result<mpsc::UnboundedSender<RpcEvent>, HapError> {
        Ok(self.wiring()?.rpc_tx.clone())
    }

    pub fn hapi(&mut self) -> Result<&mut HapiProcessor, HapError> {
        Ok(&mut self.wiring_mut()?.hapi)
    }

    pub async fn exchange_profile(&mut self) -> Result<Value, HapError> {
        let procedures = self.implemented_procedures();
        let name = self.name.clone();
        let answer = self.hapi()?.exchange_profile(&procedures, &name).await?;
        info!("[main] profile exchanged: {}", answer);
        Ok(answer)
    }

    pub async fn get_monitoring_server_info(&mut self) -> Result<Arc<MonitoringServerInfo>, HapError> {
        self.hapi()?.get_monitoring_server_info().await
    }

    pub fn set_monitoring_server_info_callback(&mut self, callback: MonitoringServerInfoCallback) {
        self.ms_info_callback = Some(callback);
    }

    /// Serves the inbound RPC queue until `Terminate`.
    ///
    /// Handler failures are logged and the loop goes on; only a critical
    /// signal or a closed queue ends it with an error.
    pub async fn run(&mut self) -> Result<(), HapError> {
        let mut rpc_rx = self
            .wiring_mut()?
            .rpc_rx
            .take()
            .ok_or_else(|| HapError::Protocol("main loop already running".to_string()))?;
        info!("[main] {} serving {:?}", self.name, self.procedures.keys().collect::<Vec<_>>());

        let result = loop {
            let msg = match rpc_rx.recv().await {
                Some(RpcEvent::Message(msg)) => msg,
                Some(RpcEvent::Terminate) => {
                    info!("[main] terminate requested");
                    break Ok(());
                }
                None => break Err(HapError::ChannelClosed("rpc queue")),
            };
            if let Err(e) = self.handle_message(msg).await {
                if handle_error("main", &e) == ErrorClass::Critical {
                    break Err(e);
                }
            }
        };

        if let Some(wiring) = self.wiring.as_mut() {
            wiring.rpc_rx = Some(rpc_rx);
        }
        result
    }

    async fn handle_message(&mut self, msg: ParsedMessage) -> Result<(), HapError> {
        let id = msg.message_id;
        match msg.kind {
            ParsedKind::Request { method, params } => self.dispatch(&method, params, id).await,
            ParsedKind::Invalid { code, message, .. } | ParsedKind::ErrorReply { code, message } => {
                warn!("[main] error message (code {}, id {:?}): {}", code, id, message);
                match id {
                    Some(id) => {
                        let sender = self.sender()?;
                        sender.error(code, Some(id)).await
                    }
                    None => Ok(()),
                }
            }
            ParsedKind::Response { .. } => {
                warn!("[main] unexpected response {:?} on the RPC queue", id);
                Ok(())
            }
        }
    }

    async fn dispatch(&mut self, method: &str, params: Value, id: Option<i64>) -> Result<(), HapError> {
        let Some(procedure) = self.procedures.get(method).copied() else {
            warn!("[main] {} is not implemented", method);
            if let Some(id) = id {
                let sender = self.sender()?;
                sender.error(ERR_METHOD_NOT_FOUND, Some(id)).await?;
            }
            return Ok(());
        };
        debug!("[main] dispatching {} (id {:?})", procedure, id);

        if procedure == Procedure::UpdateMonitoringServerInfo {
            let info = Arc::new(serde_json::from_value::<MonitoringServerInfo>(params)?);
            info!("[main] monitoring server info updated (server {})", info.server_id);
            self.hapi()?.set_ms_info(info.clone());
            if let Some(callback) = self.ms_info_callback.as_mut() {
                callback(info);
            }
            return Ok(());
        }

        let id = id.ok_or_else(|| HapError::Protocol(format!("{} without id", procedure)))?;
        if procedure == Procedure::ExchangeProfile {
            let procedures = self.shared_procedures(&params);
            let name = self.name.clone();
            return self.hapi()?.respond_exchange_profile(&procedures, &name, id).await;
        }

        let wiring = self
            .wiring
            .as_mut()
            .ok_or_else(|| HapError::Protocol("main plugin is not set up".to_string()))?;
        let hapi = &mut wiring.hapi;
        let handler = &mut self.handler;
        match procedure {
            Procedure::FetchHosts => match decode(hapi, params, id).await? {
                Some(p) => handler.fetch_hosts(hapi, p, id).await,
                None => Ok(()),
            },
            Procedure::FetchItems => match decode(hapi, params, id).await? {
                Some(p) => handler.fetch_items(hapi, p, id).await,
                None => Ok(()),
            },
            Procedure::FetchHistory => match decode(hapi, params, id).await? {
                Some(p) => handler.fetch_history(hapi, p, id).await,
                None => Ok(()),
            },
            Procedure::FetchTriggers => match decode(hapi, params, id).await? {
                Some(p) => handler.fetch_triggers(hapi, p, id).await,
                None => Ok(()),
            },
            Procedure::FetchEvents => match decode(hapi, params, id).await? {
                Some(p) => handler.fetch_events(hapi, p, id).await,
                None => Ok(()),
            },
            other => Err(HapError::NotImplemented(other.name().to_string())),
        }
    }
}

/// Decodes fetch params and acknowledges the fetch with `SUCCESS`.
///
/// Params that do not decode are answered with invalid-params and yield `None`.
async fn decode<T: DeserializeOwned>(hapi: &HapiProcessor, params: Value, id: i64) -> Result<Option<T>, HapError> {
    match serde_json::from_value::<T>(params) {
        Ok(params) => {
            hapi.respond_success(id).await?;
            Ok(Some(params))
        }
        Err(e) => {
            warn!("[main] bad fetch params (id {}): {}", id, e);
            hapi.sender().error(ERR_INVALID_PARAMS, Some(id)).await?;
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Trigger, UpdateType};
    use crate::test_support::monitoring_server_info_json;
    use crate::transporter::memory::{MemoryTransporter, SentKind};
    use serde_json::json;
    use std::time::Duration;

    struct TriggerHandler;

    #[async_trait]
    impl MainPluginHandler for TriggerHandler {
        fn implemented_procedures(&self) -> Vec<Procedure> {
            vec![Procedure::FetchTriggers, Procedure::PutHosts]
        }

        async fn fetch_triggers(
            &mut self,
            hapi: &mut HapiProcessor,
            params: FetchTriggersParams,
            _request_id: i64,
        ) -> Result<(), HapError> {
            let trigger = Trigger {
                trigger_id: "1".into(),
                status: "OK".into(),
                severity: "INFO".into(),
                last_change_time: "20150628093511".into(),
                host_id: params.host_ids.unwrap_or_default().join(","),
                host_name: "h".into(),
                brief: "b".into(),
                extended_info: String::new(),
            };
            hapi.put_triggers(&[trigger], UpdateType::All, None, Some(params.fetch_id.as_str()))
                .await
        }
    }

    struct Harness {
        transporter: Arc<MemoryTransporter>,
        tasks: Vec<tokio::task::JoinHandle<Result<(), HapError>>>,
    }

    impl Drop for Harness {
        fn drop(&mut self) {
            for t in &self.tasks {
                t.abort();
            }
        }
    }

    async fn started(plugin: &mut BaseMainPlugin) -> Harness {
        let transporter = Arc::new(MemoryTransporter::new());
        plugin.setup(transporter.clone(), &TransporterArgs::default()).await.unwrap();
        let tasks = vec![
            tokio::spawn(plugin.start_dispatcher().unwrap()),
            tokio::spawn(plugin.start_receiver().unwrap()),
        ];
        Harness { transporter, tasks }
    }

    /// Answers the plugin's own calls like a Hatohol server would.
    fn serve(transporter: Arc<MemoryTransporter>) {
        let mut outbound = transporter.subscribe_outbound();
        tokio::spawn(async move {
            while let Some(sent) = outbound.recv().await {
                let msg = sent.json();
                if sent.kind != SentKind::Call || msg["id"].is_null() {
                    continue;
                }
                let result = match msg["method"].as_str() {
                    Some("getMonitoringServerInfo") => monitoring_server_info_json(30, 10),
                    Some("exchangeProfile") => json!({"procedures": ["exchangeProfile"], "name": "hatohol"}),
                    _ => json!("SUCCESS"),
                };
                let reply = json!({"jsonrpc": "2.0", "result": result, "id": msg["id"]});
                let _ = transporter.simulate_incoming(reply.to_string());
            }
        });
    }

    async fn next_reply(tap: &mut mpsc::UnboundedReceiver<crate::transporter::memory::SentMessage>) -> Value {
        loop {
            let sent = tokio::time::timeout(Duration::from_secs(5), tap.recv()).await.unwrap().unwrap();
            if sent.kind == SentKind::Reply {
                return sent.json();
            }
        }
    }

    #[test]
    fn test_procedure_map() {
        let plugin = BaseMainPlugin::new("test", Box::new(TriggerHandler));
        assert_eq!(
            plugin.implemented_procedures(),
            vec![Procedure::ExchangeProfile, Procedure::FetchTriggers, Procedure::UpdateMonitoringServerInfo]
        );
    }

    #[tokio::test]
    async fn test_not_set_up() {
        let mut plugin = BaseMainPlugin::new("test", Box::new(TriggerHandler));
        assert!(plugin.start_dispatcher().is_err());
        assert!(plugin.run().await.is_err());
    }

    #[tokio::test]
    async fn test_handshake() {
        let mut plugin = BaseMainPlugin::new("test", Box::new(TriggerHandler));
        let h = started(&mut plugin).await;
        serve(h.transporter.clone());

        plugin.exchange_profile().await.unwrap();
        let info = plugin.get_monitoring_server_info().await.unwrap();
        assert_eq!(info.retry_interval_sec, 10);

        let sent = h.transporter.find_calls("exchangeProfile");
        assert_eq!(
            sent[0]["params"]["procedures"],
            json!(["exchangeProfile", "fetchTriggers", "updateMonitoringServerInfo"])
        );
    }

    #[tokio::test]
    async fn test_fetch_triggers_round() {
        let mut plugin = BaseMainPlugin::new("test", Box::new(TriggerHandler));
        let h = started(&mut plugin).await;
        serve(h.transporter.clone());
        let mut tap = h.transporter.subscribe_outbound();
        let rpc = plugin.rpc_queue().unwrap();

        h.transporter
            .simulate_incoming(
                json!({"jsonrpc": "2.0", "method": "fetchTriggers", "params": {"hostIds": ["7"], "fetchId": "42"}, "id": 3})
                    .to_string(),
            )
            .unwrap();
        let runner = tokio::spawn(async move {
            plugin.run().await.unwrap();
            plugin
        });

        assert_eq!(next_reply(&mut tap).await, json!({"jsonrpc": "2.0", "result": "SUCCESS", "id": 3}));
        loop {
            let sent = tap.recv().await.unwrap().json();
            if sent["method"] == "putTriggers" {
                assert_eq!(sent["params"]["fetchId"], "42");
                assert_eq!(sent["params"]["triggers"][0]["hostId"], "7");
                break;
            }
        }
        rpc.send(RpcEvent::Terminate).unwrap();
        runner.await.unwrap();
    }

    #[tokio::test]
    async fn test_errors_are_answered_and_loop_survives() {
        let mut plugin = BaseMainPlugin::new("test", Box::new(TriggerHandler));
        let h = started(&mut plugin).await;
        let mut tap = h.transporter.subscribe_outbound();
        let rpc = plugin.rpc_queue().unwrap();

        // not advertised, so rejected by the receiver
        h.transporter
            .simulate_incoming(json!({"jsonrpc": "2.0", "method": "fetchItems", "params": {"fetchId": "1"}, "id": 4}).to_string())
            .unwrap();
        // parse error without id: logged only
        h.transporter.simulate_incoming("{oops").unwrap();
        // schema is fine but params do not decode
        h.transporter
            .simulate_incoming(json!({"jsonrpc": "2.0", "method": "fetchTriggers", "params": {"hostIds": [1], "fetchId": "1"}, "id": 5}).to_string())
            .unwrap();

        let runner = tokio::spawn(async move { plugin.run().await });

        let first = next_reply(&mut tap).await;
        assert_eq!(first["id"], 4);
        assert_eq!(first["error"]["code"], -32601);
        let second = next_reply(&mut tap).await;
        assert_eq!(second["id"], 5);
        assert_eq!(second["error"]["code"], -32602);

        rpc.send(RpcEvent::Terminate).unwrap();
        assert!(runner.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_update_monitoring_server_info_triggers_callback() {
        let mut plugin = BaseMainPlugin::new("test", Box::new(TriggerHandler));
        let h = started(&mut plugin).await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        plugin.set_monitoring_server_info_callback(Box::new(move |info| {
            let _ = tx.send(info);
        }));
        let rpc = plugin.rpc_queue().unwrap();

        h.transporter
            .simulate_incoming(
                json!({"jsonrpc": "2.0", "method": "updateMonitoringServerInfo", "params": monitoring_server_info_json(60, 5)})
                    .to_string(),
            )
            .unwrap();
        let runner = tokio::spawn(async move {
            plugin.run().await.unwrap();
            plugin
        });

        let info = rx.recv().await.unwrap();
        assert_eq!(info.polling_interval_sec, 60);
        rpc.send(RpcEvent::Terminate).unwrap();
        let mut plugin = runner.await.unwrap();
        assert_eq!(plugin.hapi().unwrap().ms_info().unwrap().polling_interval_sec, 60);
    }

    #[tokio::test]
    async fn test_inbound_exchange_profile_is_answered() {
        let mut plugin = BaseMainPlugin::new("test", Box::new(TriggerHandler));
        let h = started(&mut plugin).await;
        let mut tap = h.transporter.subscribe_outbound();
        let rpc = plugin.rpc_queue().unwrap();

        h.transporter
            .simulate_incoming(
                json!({"jsonrpc": "2.0", "method": "exchangeProfile",
                       "params": {"procedures": ["exchangeProfile", "fetchTriggers"], "name": "hatohol"}, "id": 8})
                .to_string(),
            )
            .unwrap();
        let runner = tokio::spawn(async move { plugin.run().await });

        let reply = next_reply(&mut tap).await;
        assert_eq!(reply["id"], 8);
        assert_eq!(reply["result"]["procedures"], json!(["exchangeProfile", "fetchTriggers"]));
        assert_eq!(reply["result"]["name"], "test");
        rpc.send(RpcEvent::Terminate).unwrap();
        assert!(runner.await.unwrap().is_ok());
    }

    struct TriggerAndEventHandler;

    #[async_trait]
    impl MainPluginHandler for TriggerAndEventHandler {
        fn implemented_procedures(&self) -> Vec<Procedure> {
            vec![Procedure::FetchTriggers, Procedure::FetchEvents]
        }
    }

    #[tokio::test]
    async fn test_exchange_profile_reply_lists_only_shared_procedures() {
        let mut plugin = BaseMainPlugin::new("test", Box::new(TriggerAndEventHandler));
        let h = started(&mut plugin).await;
        let mut tap = h.transporter.subscribe_outbound();
        let rpc = plugin.rpc_queue().unwrap();

        // the server does not know fetchEvents
        h.transporter
            .simulate_incoming(
                json!({"jsonrpc": "2.0", "method": "exchangeProfile",
                       "params": {"procedures": ["exchangeProfile", "fetchTriggers"], "name": "hatohol"}, "id": 9})
                .to_string(),
            )
            .unwrap();
        // nor anything at all
        h.transporter
            .simulate_incoming(
                json!({"jsonrpc": "2.0", "method": "exchangeProfile",
                       "params": {"procedures": [], "name": "hatohol"}, "id": 10})
                .to_string(),
            )
            .unwrap();
        let runner = tokio::spawn(async move { plugin.run().await });

        let reply = next_reply(&mut tap).await;
        assert_eq!(reply["id"], 9);
        assert_eq!(reply["result"]["procedures"], json!(["exchangeProfile", "fetchTriggers"]));
        let reply = next_reply(&mut tap).await;
        assert_eq!(reply["id"], 10);
        assert_eq!(reply["result"]["procedures"], json!([]));

        rpc.send(RpcEvent::Terminate).unwrap();
        assert!(runner.await.unwrap().is_ok());
    }
}
