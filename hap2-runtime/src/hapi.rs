//! RPC client facade used by the main plugin and the poller.
//!
//! Every `get_*` / `put_*` call goes through [`HapiProcessor::request`]:
//! 1. register the correlation id with the dispatcher and wait for the ack
//! 2. send the request
//! 3. wait for the response carrying that id
//!
//! Bulk uploads go through [`HapiProcessor::divide_and_put_data`], which
//! splits the payload in chunks and shrinks them when the transport reports
//! a message as too large.

use crate::dispatcher::{DispatcherHandle, Reply};
use crate::error::HapError;
use crate::hapi_time;
use crate::models::{
    ArmInfo, Event, FetchContext, HistorySample, Host, HostGroup, HostGroupMembership, Item,
    MonitoringServerInfo, Trigger, UpdateType,
};
use crate::protocol::{Component, CorrelationId, ParsedKind, Procedure};
use crate::sender::Sender;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_CHUNK_SIZE: usize = 100;

/// Derives the `lastInfo` cursor of a batch of events.
pub type LastInfoGenerator = dyn Fn(&[Event]) -> Option<String> + Send + Sync;

/// Largest `eventId` of the batch, compared digit-width safe.
pub fn default_last_info(events: &[Event]) -> Option<String> {
    let ids: Vec<&str> = events.iter().map(|e| e.event_id.as_str()).collect();
    hapi_time::biggest_index(&ids).map(|i| ids[i].to_string())
}

pub struct HapiProcessor {
    component: Component,
    sender: Sender,
    dispatcher: DispatcherHandle,
    reply_rx: mpsc::UnboundedReceiver<Reply>,
    response_timeout: Duration,
    default_chunk_size: usize,
    ms_info: Option<Arc<MonitoringServerInfo>>,
    prev_hosts: Option<Vec<Host>>,
    prev_host_groups: Option<Vec<HostGroup>>,
    prev_host_group_membership: Option<Vec<HostGroupMembership>>,
    event_last_info: Option<String>,
}

impl HapiProcessor {
    /// Attaches a fresh reply queue for `component` to the dispatcher.
    pub fn new(component: Component, sender: Sender, dispatcher: DispatcherHandle) -> Result<Self, HapError> {
        let reply_rx = dispatcher.attach(component)?;
        Ok(Self {
            component,
            sender,
            dispatcher,
            reply_rx,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            default_chunk_size: DEFAULT_CHUNK_SIZE,
            ms_info: None,
            prev_hosts: None,
            prev_host_groups: None,
            prev_host_group_membership: None,
            event_last_info: None,
        })
    }

    pub fn component(&self) -> Component {
        self.component
    }

    pub fn sender(&self) -> &Sender {
        &self.sender
    }

    pub fn set_response_timeout(&mut self, timeout: Duration) {
        self.response_timeout = timeout;
    }

    pub fn set_default_chunk_size(&mut self, size: usize) {
        self.default_chunk_size = size.max(1);
    }

    pub fn ms_info(&self) -> Option<Arc<MonitoringServerInfo>> {
        self.ms_info.clone()
    }

    pub fn set_ms_info(&mut self, info: Arc<MonitoringServerInfo>) {
        self.ms_info = Some(info);
    }

    /// Forgets the change-suppression snapshots and the event cursor.
    pub fn reset_cache(&mut self) {
        self.prev_hosts = None;
        self.prev_host_groups = None;
        self.prev_host_group_membership = None;
        self.event_last_info = None;
    }

    /// Blocking request / response round trip.
    pub async fn request(&mut self, procedure: Procedure, params: Value) -> Result<Value, HapError> {
        let id = CorrelationId::generate(self.component).to_wire();
        self.dispatcher.acknowledge(self.component, id)?;
        self.wait_acknowledge(id).await?;

        if let Err(e) = self.sender.request(procedure.name(), params, Some(id)).await {
            self.dispatcher.forget(id);
            return Err(e);
        }
        self.wait_response(procedure, id).await
    }

    async fn wait_acknowledge(&mut self, id: i64) -> Result<(), HapError> {
        let deadline = Instant::now() + self.response_timeout;
        loop {
            match timeout_at(deadline, self.reply_rx.recv()).await {
                Ok(Some(Reply::Acknowledged)) => return Ok(()),
                Ok(Some(Reply::Message(stale))) => {
                    debug!("[hapi] {}: discarding stale reply {:?}", self.component, stale.message_id);
                }
                Ok(None) => return Err(HapError::ChannelClosed("reply queue")),
                Err(_) => {
                    self.dispatcher.forget(id);
                    return Err(HapError::AcknowledgeTimeout { id, after: self.response_timeout });
                }
            }
        }
    }

    async fn wait_response(&mut self, procedure: Procedure, id: i64) -> Result<Value, HapError> {
        let deadline = Instant::now() + self.response_timeout;
        let msg = loop {
            match timeout_at(deadline, self.reply_rx.recv()).await {
                Ok(Some(Reply::Message(msg))) => break msg,
                Ok(Some(Reply::Acknowledged)) => {}
                Ok(None) => return Err(HapError::ChannelClosed("reply queue")),
                Err(_) => {
                    self.dispatcher.forget(id);
                    return Err(HapError::Timeout {
                        method: procedure.name().to_string(),
                        id,
                        after: self.response_timeout,
                    });
                }
            }
        };

        if msg.message_id != Some(id) {
            return Err(HapError::Protocol(format!(
                "{}: expected response id {}, got {:?}",
                procedure, id, msg.message_id
            )));
        }
        match msg.kind {
            ParsedKind::Response { result } if result.as_str() == Some("FAILURE") => {
                Err(HapError::RemoteFailure { method: procedure.name().to_string() })
            }
            ParsedKind::Response { result } => Ok(result),
            ParsedKind::ErrorReply { code, message } => Err(HapError::RemoteError { code, message }),
            ParsedKind::Request { method, .. } => Err(HapError::Protocol(format!(
                "{}: got a {} request instead of a response",
                procedure, method
            ))),
            ParsedKind::Invalid { message, .. } => {
                Err(HapError::Protocol(format!("{}: invalid response: {}", procedure, message)))
            }
        }
    }

    pub async fn exchange_profile(&mut self, procedures: &[Procedure], name: &str) -> Result<Value, HapError> {
        let params = profile(procedures, name);
        self.request(Procedure::ExchangeProfile, params).await
    }

    pub async fn respond_exchange_profile(
        &self,
        procedures: &[Procedure],
        name: &str,
        id: i64,
    ) -> Result<(), HapError> {
        self.sender.response(profile(procedures, name), id).await
    }

    pub async fn respond_success(&self, id: i64) -> Result<(), HapError> {
        self.sender.response(json!("SUCCESS"), id).await
    }

    /// Fetches the server info and makes it the active snapshot.
    pub async fn get_monitoring_server_info(&mut self) -> Result<Arc<MonitoringServerInfo>, HapError> {
        let result = self.request(Procedure::GetMonitoringServerInfo, json!({})).await?;
        let info = Arc::new(serde_json::from_value::<MonitoringServerInfo>(result)?);
        self.ms_info = Some(info.clone());
        Ok(info)
    }

    /// Server-side cursor of `element`; `None` when the server has none yet.
    pub async fn get_last_info(&mut self, element: &str) -> Result<Option<String>, HapError> {
        let result = self
            .request(Procedure::GetLastInfo, json!({"element": element}))
            .await?;
        Ok(result.as_str().filter(|s| !s.is_empty()).map(str::to_string))
    }

    /// Event cursor, asking the server only until one is known.
    pub async fn get_cached_event_last_info(&mut self) -> Result<Option<String>, HapError> {
        if self.event_last_info.is_none() {
            self.event_last_info = self.get_last_info("event").await?;
        }
        Ok(self.event_last_info.clone())
    }

    pub async fn put_arm_info(&mut self, arm_info: &ArmInfo) -> Result<(), HapError> {
        let params = serde_json::to_value(arm_info)?;
        self.request(Procedure::PutArmInfo, params).await.map(|_| ())
    }

    pub async fn put_hosts(&mut self, mut hosts: Vec<Host>) -> Result<(), HapError> {
        hosts.sort();
        if self.prev_hosts.as_ref() == Some(&hosts) {
            debug!("[hapi] hosts unchanged, not sent");
            return Ok(());
        }
        self.divide_and_put_data(Procedure::PutHosts, "hosts", &hosts, update_all(), true)
            .await?;
        self.prev_hosts = Some(hosts);
        Ok(())
    }

    pub async fn put_host_groups(&mut self, mut groups: Vec<HostGroup>) -> Result<(), HapError> {
        groups.sort();
        if self.prev_host_groups.as_ref() == Some(&groups) {
            debug!("[hapi] host groups unchanged, not sent");
            return Ok(());
        }
        self.divide_and_put_data(Procedure::PutHostGroups, "hostGroups", &groups, update_all(), true)
            .await?;
        self.prev_host_groups = Some(groups);
        Ok(())
    }

    pub async fn put_host_group_membership(
        &mut self,
        mut membership: Vec<HostGroupMembership>,
    ) -> Result<(), HapError> {
        for entry in &mut membership {
            entry.group_ids.sort();
        }
        membership.sort();
        if self.prev_host_group_membership.as_ref() == Some(&membership) {
            debug!("[hapi] host group membership unchanged, not sent");
            return Ok(());
        }
        self.divide_and_put_data(
            Procedure::PutHostGroupMembership,
            "hostGroupMembership",
            &membership,
            update_all(),
            true,
        )
        .await?;
        self.prev_host_group_membership = Some(membership);
        Ok(())
    }

    pub async fn put_triggers(
        &mut self,
        triggers: &[Trigger],
        update_type: UpdateType,
        last_info: Option<&str>,
        fetch_id: Option<&str>,
    ) -> Result<(), HapError> {
        let mut extra = Map::new();
        extra.insert("updateType".into(), json!(update_type.as_str()));
        if let Some(last_info) = last_info {
            extra.insert("lastInfo".into(), json!(last_info));
        }
        if let Some(fetch_id) = fetch_id {
            extra.insert("fetchId".into(), json!(fetch_id));
        }
        let put_empty = update_type == UpdateType::All || fetch_id.is_some();
        self.divide_and_put_data(Procedure::PutTriggers, "triggers", triggers, extra, put_empty)
            .await
    }

    /// Uploads events.
    ///
    /// Poll-driven calls (`fetch` is `None`) advance the cached cursor;
    /// fetch answers carry `fetchId` / `mayMoreFlag` and leave it alone.
    pub async fn put_events(
        &mut self,
        events: &[Event],
        fetch: Option<&FetchContext>,
        last_info_generator: Option<&LastInfoGenerator>,
    ) -> Result<(), HapError> {
        let mut extra = Map::new();
        match fetch {
            Some(fetch) => {
                extra.insert("fetchId".into(), json!(fetch.fetch_id));
                extra.insert("mayMoreFlag".into(), json!(fetch.may_more));
                self.divide_and_put_data(Procedure::PutEvents, "events", events, extra, true)
                    .await
            }
            None => {
                if events.is_empty() {
                    return Ok(());
                }
                let last_info = match last_info_generator {
                    Some(generate) => generate(events),
                    None => default_last_info(events),
                };
                if let Some(last_info) = &last_info {
                    extra.insert("lastInfo".into(), json!(last_info));
                }
                self.divide_and_put_data(Procedure::PutEvents, "events", events, extra, false)
                    .await?;
                if last_info.is_some() {
                    self.event_last_info = last_info;
                }
                Ok(())
            }
        }
    }

    pub async fn put_items(&mut self, items: &[Item], fetch_id: &str) -> Result<(), HapError> {
        let mut extra = Map::new();
        extra.insert("fetchId".into(), json!(fetch_id));
        self.divide_and_put_data(Procedure::PutItems, "items", items, extra, true)
            .await
    }

    pub async fn put_history(
        &mut self,
        item_id: &str,
        samples: &[HistorySample],
        fetch_id: &str,
    ) -> Result<(), HapError> {
        let mut extra = Map::new();
        extra.insert("itemId".into(), json!(item_id));
        extra.insert("fetchId".into(), json!(fetch_id));
        self.divide_and_put_data(Procedure::PutHistory, "samples", samples, extra, true)
            .await
    }

    /// Sends `contents` under `content_key`, split in chunks.
    ///
    /// Batches of more than one chunk tag every chunk with
    /// `divideInfo {serialId, isLast, requestId}`. A transport capacity error
    /// shrinks the chunk size to 3/4 and resends from the first unsent item.
    /// The shrunk size only lives for this call.
    pub async fn divide_and_put_data<T: Serialize>(
        &mut self,
        procedure: Procedure,
        content_key: &str,
        contents: &[T],
        extra: Map<String, Value>,
        put_empty_contents: bool,
    ) -> Result<(), HapError> {
        if contents.is_empty() {
            if put_empty_contents {
                let mut params = extra;
                params.insert(content_key.to_string(), json!([]));
                self.request(procedure, Value::Object(params)).await?;
            }
            return Ok(());
        }

        let request_id: u32 = rand::random();
        let mut chunk_size = self.default_chunk_size;
        let mut offset = 0;
        let mut serial_id = 0u64;

        while offset < contents.len() {
            let end = (offset + chunk_size).min(contents.len());
            let mut params = extra.clone();
            params.insert(content_key.to_string(), serde_json::to_value(&contents[offset..end])?);
            if contents.len() > chunk_size {
                params.insert(
                    "divideInfo".to_string(),
                    json!({
                        "serialId": serial_id,
                        "isLast": end == contents.len(),
                        "requestId": request_id,
                    }),
                );
            }

            match self.request(procedure, Value::Object(params)).await {
                Ok(_) => {
                    offset = end;
                    serial_id += 1;
                }
                Err(err @ HapError::TransportCapacity { .. }) => {
                    let shrunk = chunk_size * 3 / 4;
                    if shrunk == 0 || shrunk == chunk_size {
                        warn!("[hapi] {}: cannot shrink chunks below {}", procedure, chunk_size);
                        return Err(err);
                    }
                    info!("[hapi] {}: {}; chunk size {} -> {}", procedure, err, chunk_size, shrunk);
                    chunk_size = shrunk;
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }
}

fn profile(procedures: &[Procedure], name: &str) -> Value {
    let names: Vec<&str> = procedures.iter().map(Procedure::name).collect();
    json!({"procedures": names, "name": name})
}

fn update_all() -> Map<String, Value> {
    let mut extra = Map::new();
    extra.insert("updateType".into(), json!(UpdateType::All.as_str()));
    extra
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{monitoring_server_info_json, pipeline, pipeline_on, Pipeline};
    use crate::transporter::memory::MemoryTransporter;

    fn hapi(p: &Pipeline) -> HapiProcessor {
        HapiProcessor::new(Component::Poller, p.sender.clone(), p.dispatcher.clone()).unwrap()
    }

    fn host(id: &str) -> Host {
        Host { host_id: id.into(), host_name: format!("host-{}", id) }
    }

    fn event(id: &str) -> Event {
        Event {
            event_id: id.into(),
            time: "20150628093511.123456".into(),
            event_type: "BAD".into(),
            trigger_id: "1".into(),
            status: "NG".into(),
            severity: "ERROR".into(),
            host_id: "1".into(),
            host_name: "host-1".into(),
            brief: "down".into(),
            extended_info: String::new(),
        }
    }

    #[tokio::test]
    async fn test_request_round_trip() {
        let mut p = pipeline(&[]);
        p.serve(|method, _| match method {
            "getMonitoringServerInfo" => Some(monitoring_server_info_json(30, 10)),
            "getLastInfo" => Some(json!("1234")),
            _ => None,
        });
        let mut hapi = hapi(&p);

        let info = hapi.get_monitoring_server_info().await.unwrap();
        assert_eq!(info.polling_interval_sec, 30);
        assert_eq!(hapi.ms_info().unwrap().server_id, 1);

        assert_eq!(hapi.get_cached_event_last_info().await.unwrap().as_deref(), Some("1234"));
        assert_eq!(hapi.get_cached_event_last_info().await.unwrap().as_deref(), Some("1234"));
        assert_eq!(p.calls("getLastInfo").len(), 1);
        assert_eq!(p.calls("getLastInfo")[0]["params"], json!({"element": "event"}));
    }

    #[tokio::test]
    async fn test_timeout_is_not_remote_failure() {
        let mut p = pipeline(&[]);
        p.serve(|method, _| (method == "putArmInfo").then(|| json!("FAILURE")));
        let mut hapi = hapi(&p);
        hapi.set_response_timeout(Duration::from_millis(100));

        let failure = hapi.put_arm_info(&ArmInfo::default()).await.unwrap_err();
        assert!(matches!(failure, HapError::RemoteFailure { .. }));

        let timeout = hapi.put_hosts(vec![host("1")]).await.unwrap_err();
        assert!(matches!(timeout, HapError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_late_reply_does_not_answer_the_next_request() {
        let p = pipeline(&[]);
        let transporter = p.transporter.clone();
        let mut outbound = transporter.subscribe_outbound();
        let mut hapi = hapi(&p);
        hapi.set_response_timeout(Duration::from_millis(100));

        let err = hapi.get_last_info("event").await.unwrap_err();
        assert!(matches!(err, HapError::Timeout { .. }));
        let first = outbound.recv().await.unwrap().json();

        let responder = tokio::spawn(async move {
            let late = json!({"jsonrpc": "2.0", "result": "stale", "id": first["id"]});
            transporter.simulate_incoming(late.to_string()).unwrap();
            let second = outbound.recv().await.unwrap().json();
            assert_ne!(second["id"], first["id"]);
            let reply = json!({"jsonrpc": "2.0", "result": "fresh", "id": second["id"]});
            transporter.simulate_incoming(reply.to_string()).unwrap();
        });
        hapi.set_response_timeout(Duration::from_secs(5));
        assert_eq!(hapi.get_last_info("event").await.unwrap().as_deref(), Some("fresh"));
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn test_remote_error_envelope() {
        let p = pipeline(&[]);
        let transporter = p.transporter.clone();
        let mut outbound = transporter.subscribe_outbound();
        let mut hapi = hapi(&p);
        let responder = tokio::spawn(async move {
            let sent = outbound.recv().await.unwrap().json();
            let reply = json!({"jsonrpc": "2.0", "error": {"code": -32602, "message": "Invalid params"}, "id": sent["id"]});
            transporter.simulate_incoming(reply.to_string()).unwrap();
        });
        let err = hapi.get_last_info("event").await.unwrap_err();
        assert!(matches!(err, HapError::RemoteError { code: -32602, .. }));
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn test_change_suppression() {
        let mut p = pipeline(&[]);
        p.serve_success();
        let mut hapi = hapi(&p);

        hapi.put_hosts(vec![host("1"), host("2")]).await.unwrap();
        hapi.put_hosts(vec![host("2"), host("1")]).await.unwrap();
        assert_eq!(p.calls("putHosts").len(), 1);

        hapi.put_hosts(vec![host("1"), host("3")]).await.unwrap();
        assert_eq!(p.calls("putHosts").len(), 2);
        assert_eq!(p.calls("putHosts")[0]["params"]["updateType"], "ALL");

        let membership = |ids: &[&str]| {
            vec![HostGroupMembership {
                host_id: "1".into(),
                group_ids: ids.iter().map(|s| s.to_string()).collect(),
            }]
        };
        hapi.put_host_group_membership(membership(&["a", "b"])).await.unwrap();
        hapi.put_host_group_membership(membership(&["b", "a"])).await.unwrap();
        assert_eq!(p.calls("putHostGroupMembership").len(), 1);
    }

    #[tokio::test]
    async fn test_failed_put_keeps_previous_snapshot() {
        let mut p = pipeline(&[]);
        p.serve(|_, _| Some(json!("FAILURE")));
        let mut hapi = hapi(&p);
        assert!(hapi.put_host_groups(vec![]).await.is_err());
        assert!(hapi.put_host_groups(vec![]).await.is_err());
        assert_eq!(p.calls("putHostGroups").len(), 2);
    }

    #[tokio::test]
    async fn test_chunking_is_lossless_and_ordered() {
        let mut p = pipeline(&[]);
        p.serve_success();
        let mut hapi = hapi(&p);
        hapi.set_default_chunk_size(3);

        let hosts: Vec<Host> = (0..8).map(|i| host(&format!("{:02}", i))).collect();
        hapi.put_hosts(hosts.clone()).await.unwrap();

        let calls = p.calls("putHosts");
        assert_eq!(calls.len(), 3);
        let mut rebuilt: Vec<Host> = Vec::new();
        for (serial, call) in calls.iter().enumerate() {
            let info = &call["params"]["divideInfo"];
            assert_eq!(info["serialId"], serial);
            assert_eq!(info["isLast"], serial == 2);
            assert_eq!(info["requestId"], calls[0]["params"]["divideInfo"]["requestId"]);
            rebuilt.extend(serde_json::from_value::<Vec<Host>>(call["params"]["hosts"].clone()).unwrap());
        }
        assert_eq!(rebuilt, hosts);
    }

    #[tokio::test]
    async fn test_single_chunk_has_no_divide_info() {
        let mut p = pipeline(&[]);
        p.serve_success();
        let mut hapi = hapi(&p);
        hapi.put_items(&[], "9").await.unwrap();
        hapi.put_triggers(&[], UpdateType::Updated, None, None).await.unwrap();
        hapi.put_host_groups(vec![HostGroup { group_id: "1".into(), group_name: "g".into() }])
            .await
            .unwrap();

        let items = p.calls("putItems");
        assert_eq!(items[0]["params"], json!({"items": [], "fetchId": "9"}));
        // UPDATED with nothing to say is not sent
        assert!(p.calls("putTriggers").is_empty());
        assert!(p.calls("putHostGroups")[0]["params"].get("divideInfo").is_none());
    }

    #[tokio::test]
    async fn test_chunks_shrink_on_capacity_error() {
        let transporter = std::sync::Arc::new(MemoryTransporter::with_max_message_size(600));
        let mut p = pipeline_on(transporter, &[]);
        p.serve_success();
        let mut hapi = hapi(&p);
        hapi.set_default_chunk_size(20);

        let hosts: Vec<Host> = (0..20).map(|i| host(&format!("{:03}", i))).collect();
        hapi.put_hosts(hosts.clone()).await.unwrap();

        let calls = p.calls("putHosts");
        assert!(calls.len() > 1);
        let mut rebuilt: Vec<Host> = Vec::new();
        for call in &calls {
            rebuilt.extend(serde_json::from_value::<Vec<Host>>(call["params"]["hosts"].clone()).unwrap());
        }
        assert_eq!(rebuilt, hosts);
        let last_flags: Vec<bool> = calls
            .iter()
            .map(|c| c["params"]["divideInfo"]["isLast"].as_bool().unwrap())
            .collect();
        assert_eq!(last_flags.iter().filter(|f| **f).count(), 1);
        assert!(last_flags[last_flags.len() - 1]);
    }

    #[tokio::test]
    async fn test_chunks_cannot_shrink_forever() {
        let transporter = std::sync::Arc::new(MemoryTransporter::with_max_message_size(40));
        let mut p = pipeline_on(transporter, &[]);
        p.serve_success();
        let mut hapi = hapi(&p);
        let err = hapi.put_hosts(vec![host("1"), host("2")]).await.unwrap_err();
        assert!(matches!(err, HapError::TransportCapacity { .. }));
    }

    #[tokio::test]
    async fn test_event_cursor() {
        let mut p = pipeline(&[]);
        p.serve_success();
        let mut hapi = hapi(&p);

        hapi.put_events(&[event("9"), event("10"), event("2")], None, None)
            .await
            .unwrap();
        let call = &p.calls("putEvents")[0];
        assert_eq!(call["params"]["lastInfo"], "10");
        assert_eq!(hapi.get_cached_event_last_info().await.unwrap().as_deref(), Some("10"));

        let fetch = FetchContext { fetch_id: "5".into(), may_more: true };
        hapi.put_events(&[event("99")], Some(&fetch), None).await.unwrap();
        let call = &p.calls("putEvents")[1];
        assert_eq!(call["params"]["fetchId"], "5");
        assert_eq!(call["params"]["mayMoreFlag"], true);
        assert!(call["params"].get("lastInfo").is_none());
        assert_eq!(hapi.get_cached_event_last_info().await.unwrap().as_deref(), Some("10"));

        let custom = |events: &[Event]| Some(format!("n={}", events.len()));
        hapi.put_events(&[event("1")], None, Some(&custom)).await.unwrap();
        assert_eq!(p.calls("putEvents")[2]["params"]["lastInfo"], "n=1");

        // empty poll batches are skipped
        hapi.put_events(&[], None, None).await.unwrap();
        assert_eq!(p.calls("putEvents").len(), 3);
    }

    #[tokio::test]
    async fn test_exchange_profile_forms() {
        let mut p = pipeline(&[]);
        p.serve(|method, _| (method == "exchangeProfile").then(|| json!({"procedures": [], "name": "hatohol"})));
        let mut hapi = hapi(&p);
        let procedures = [Procedure::ExchangeProfile, Procedure::FetchTriggers];

        let answer = hapi.exchange_profile(&procedures, "localhost").await.unwrap();
        assert_eq!(answer["name"], "hatohol");
        assert_eq!(
            p.calls("exchangeProfile")[0]["params"],
            json!({"procedures": ["exchangeProfile", "fetchTriggers"], "name": "localhost"})
        );

        hapi.respond_exchange_profile(&procedures, "localhost", 77).await.unwrap();
        hapi.respond_success(78).await.unwrap();
        let replies: Vec<Value> = p
            .transporter
            .sent_messages()
            .iter()
            .filter(|m| m.kind == crate::transporter::memory::SentKind::Reply)
            .map(|m| m.json())
            .collect();
        assert_eq!(replies[0]["id"], 77);
        assert_eq!(replies[1]["result"], "SUCCESS");
    }

    #[test]
    fn test_default_last_info_is_digit_width_safe() {
        assert_eq!(default_last_info(&[event("9"), event("10")]).as_deref(), Some("10"));
        assert_eq!(default_last_info(&[]), None);
    }
}
