use crate::monitor::Monitor;
use crate::probe::Probe;
use async_trait::async_trait;
use hap2_runtime::models::{
    Event, FetchContext, FetchEventsParams, FetchHistoryParams, FetchHostsParams, FetchItemsParams,
    FetchTriggersParams, Host, HostGroup, HostGroupMembership, PolledTriggers, UpdateType,
};
use hap2_runtime::protocol::Procedure;
use hap2_runtime::{Collector, HapError, HapPlugin, HapiProcessor, MainPluginHandler};
use parking_lot::Mutex;
use serde_json::{json, Map};
use std::sync::Arc;
use tracing::{debug, warn};

pub const PLUGIN_NAME: &str = "hap2-localhost";

/// Reports the machine it runs on. The poller and the fetch handler share
/// one [`Monitor`], which outlives pipeline restarts.
pub struct LocalhostPlugin {
    monitor: Arc<Mutex<Monitor>>,
}

impl LocalhostPlugin {
    pub fn new(probe: Box<dyn Probe>) -> Self {
        Self { monitor: Arc::new(Mutex::new(Monitor::new(probe))) }
    }
}

impl HapPlugin for LocalhostPlugin {
    fn name(&self) -> &str {
        PLUGIN_NAME
    }

    fn create_main_handler(&self) -> Box<dyn MainPluginHandler> {
        Box::new(LocalFetcher { monitor: self.monitor.clone() })
    }

    fn create_collector(&self) -> Option<Box<dyn Collector>> {
        Some(Box::new(LocalCollector { monitor: self.monitor.clone() }))
    }
}

struct LocalCollector {
    monitor: Arc<Mutex<Monitor>>,
}

#[async_trait]
impl Collector for LocalCollector {
    async fn poll_setup(&mut self) -> Result<(), HapError> {
        self.monitor.lock().refresh();
        Ok(())
    }

    async fn poll_hosts(&mut self) -> Result<Option<Vec<Host>>, HapError> {
        Ok(Some(vec![self.monitor.lock().host()]))
    }

    async fn poll_host_groups(&mut self) -> Result<Option<Vec<HostGroup>>, HapError> {
        Ok(Some(vec![self.monitor.lock().host_group()]))
    }

    async fn poll_host_group_membership(&mut self) -> Result<Option<Vec<HostGroupMembership>>, HapError> {
        Ok(Some(vec![self.monitor.lock().membership()]))
    }

    async fn poll_triggers(&mut self) -> Result<Option<PolledTriggers>, HapError> {
        Ok(Some(PolledTriggers {
            triggers: self.monitor.lock().triggers(),
            update_type: UpdateType::All,
            last_info: None,
        }))
    }

    async fn poll_events(&mut self, last_info: Option<&str>) -> Result<Option<Vec<Event>>, HapError> {
        let events = self.monitor.lock().take_pending_events(last_info);
        if !events.is_empty() {
            debug!("[localhost] {} new events", events.len());
        }
        Ok(Some(events))
    }
}

struct LocalFetcher {
    monitor: Arc<Mutex<Monitor>>,
}

impl LocalFetcher {
    /// Takes a first sample when the poller has not run yet.
    fn warm_monitor(&self) -> parking_lot::MutexGuard<'_, Monitor> {
        let mut monitor = self.monitor.lock();
        if !monitor.has_samples() {
            monitor.refresh();
        }
        monitor
    }
}

fn wanted(host_ids: &Option<Vec<String>>, host_id: &str) -> bool {
    host_ids
        .as_ref()
        .map_or(true, |ids| ids.iter().any(|id| id == host_id))
}

#[async_trait]
impl MainPluginHandler for LocalFetcher {
    fn implemented_procedures(&self) -> Vec<Procedure> {
        vec![
            Procedure::FetchHosts,
            Procedure::FetchItems,
            Procedure::FetchHistory,
            Procedure::FetchTriggers,
            Procedure::FetchEvents,
        ]
    }

    async fn fetch_hosts(
        &mut self,
        hapi: &mut HapiProcessor,
        params: FetchHostsParams,
        _request_id: i64,
    ) -> Result<(), HapError> {
        let hosts: Vec<Host> = {
            let host = self.monitor.lock().host();
            wanted(&params.host_ids, &host.host_id).then_some(host).into_iter().collect()
        };
        let mut extra = Map::new();
        extra.insert("updateType".into(), json!(UpdateType::All.as_str()));
        extra.insert("fetchId".into(), json!(params.fetch_id));
        hapi.divide_and_put_data(Procedure::PutHosts, "hosts", &hosts, extra, true)
            .await
    }

    async fn fetch_items(
        &mut self,
        hapi: &mut HapiProcessor,
        params: FetchItemsParams,
        _request_id: i64,
    ) -> Result<(), HapError> {
        let items: Vec<_> = self
            .warm_monitor()
            .items()
            .into_iter()
            .filter(|item| wanted(&params.host_ids, &item.host_id))
            .collect();
        hapi.put_items(&items, &params.fetch_id).await
    }

    async fn fetch_history(
        &mut self,
        hapi: &mut HapiProcessor,
        params: FetchHistoryParams,
        _request_id: i64,
    ) -> Result<(), HapError> {
        let history = self
            .monitor
            .lock()
            .history(&params.item_id, &params.begin_time, &params.end_time)?;
        let samples = history.unwrap_or_else(|| {
            warn!("[localhost] no history for item {}", params.item_id);
            Vec::new()
        });
        hapi.put_history(&params.item_id, &samples, &params.fetch_id).await
    }

    async fn fetch_triggers(
        &mut self,
        hapi: &mut HapiProcessor,
        params: FetchTriggersParams,
        _request_id: i64,
    ) -> Result<(), HapError> {
        let triggers: Vec<_> = self
            .warm_monitor()
            .triggers()
            .into_iter()
            .filter(|trigger| wanted(&params.host_ids, &trigger.host_id))
            .collect();
        hapi.put_triggers(&triggers, UpdateType::All, None, Some(params.fetch_id.as_str()))
            .await
    }

    async fn fetch_events(
        &mut self,
        hapi: &mut HapiProcessor,
        params: FetchEventsParams,
        _request_id: i64,
    ) -> Result<(), HapError> {
        let (events, may_more) = self
            .monitor
            .lock()
            .events(&params.last_info, params.count, params.direction);
        let fetch = FetchContext { fetch_id: params.fetch_id, may_more };
        hapi.put_events(&events, Some(&fetch), None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::tests::ScriptedProbe;
    use hap2_devkit::{FakeHatoholServer, HapiMessageBuilder};
    use hap2_runtime::config::HapConfig;
    use hap2_runtime::models::Direction;
    use hap2_runtime::standard_hap::EXIT_OK;
    use hap2_runtime::StandardHap;
    use tokio::sync::oneshot;
    use tokio::task::JoinHandle;

    const WAIT_MS: u64 = 5000;

    fn start(server: &FakeHatoholServer, samples: &[(f32, f32)], disable_poller: bool) -> (oneshot::Sender<()>, JoinHandle<i32>) {
        let plugin = LocalhostPlugin::new(Box::new(ScriptedProbe::new(samples)));
        let config = HapConfig { disable_poller, ..HapConfig::default() };
        let hap = StandardHap::new(plugin, config);
        let transporter = server.transporter();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let run = tokio::spawn(async move {
            hap.run_with(transporter, async {
                let _ = stop_rx.await;
            })
            .await
        });
        (stop_tx, run)
    }

    #[test]
    fn test_host_filter() {
        assert!(wanted(&None, "box"));
        assert!(wanted(&Some(vec!["box".into()]), "box"));
        assert!(!wanted(&Some(vec!["other".into()]), "box"));
    }

    #[tokio::test]
    async fn test_poll_cycle_reports_the_machine() {
        let server = FakeHatoholServer::new();
        server.answer("getLastInfo", json!("41"));
        let (stop, run) = start(&server, &[(0.95, 0.2)], false);

        server.wait_for_call("putArmInfo", WAIT_MS).await.unwrap().unwrap();
        let hosts = server.calls("putHosts");
        assert_eq!(hosts[0]["params"]["hosts"][0]["hostName"], "box");
        let membership = server.calls("putHostGroupMembership");
        assert_eq!(membership[0]["params"]["hostGroupMembership"][0]["groupIds"], json!(["1"]));
        let triggers = server.calls("putTriggers");
        assert_eq!(triggers[0]["params"]["triggers"][0]["status"], "NG");
        let events = server.calls("putEvents");
        assert_eq!(events[0]["params"]["events"][0]["eventId"], "42");
        assert_eq!(events[0]["params"]["lastInfo"], "42");

        stop.send(()).unwrap();
        assert_eq!(run.await.unwrap(), EXIT_OK);
    }

    #[tokio::test]
    async fn test_fetches_without_poller() {
        let server = FakeHatoholServer::new();
        let (stop, run) = start(&server, &[(0.5, 0.25)], true);
        server.wait_for_call("getMonitoringServerInfo", WAIT_MS).await.unwrap().unwrap();

        server.send(&HapiMessageBuilder::fetch_items(Some(&["box"]), "1", 10)).unwrap();
        let put = server.wait_for_call("putItems", WAIT_MS).await.unwrap().unwrap();
        assert_eq!(put["params"]["fetchId"], "1");
        assert_eq!(put["params"]["items"][0]["lastValue"], "50.0");
        assert_eq!(put["params"]["items"][1]["lastValue"], "25.0");

        server.send(&HapiMessageBuilder::fetch_triggers(Some(&["other"]), "2", 11)).unwrap();
        let put = server.wait_for_call("putTriggers", WAIT_MS).await.unwrap().unwrap();
        assert_eq!(put["params"]["triggers"], json!([]));

        server.send(&HapiMessageBuilder::fetch_hosts(None, "3", 12)).unwrap();
        let put = server.wait_for_call("putHosts", WAIT_MS).await.unwrap().unwrap();
        assert_eq!(put["params"]["fetchId"], "3");
        assert_eq!(put["params"]["hosts"][0]["hostId"], "box");

        server
            .send(&HapiMessageBuilder::fetch_history(
                "box",
                "cpu.usage",
                "19700101000000",
                "99991231235959",
                "4",
                13,
            ))
            .unwrap();
        let put = server.wait_for_call("putHistory", WAIT_MS).await.unwrap().unwrap();
        assert_eq!(put["params"]["itemId"], "cpu.usage");
        assert_eq!(put["params"]["samples"][0]["value"], "50.0");

        server.send(&HapiMessageBuilder::fetch_events("", 10, Direction::Asc, "5", 14)).unwrap();
        let put = server.wait_for_call("putEvents", WAIT_MS).await.unwrap().unwrap();
        assert_eq!(put["params"]["fetchId"], "5");
        assert_eq!(put["params"]["mayMoreFlag"], false);
        assert_eq!(put["params"]["events"], json!([]));

        stop.send(()).unwrap();
        assert_eq!(run.await.unwrap(), EXIT_OK);
    }
}
