/*!
Builders for the messages a Hatohol server exchanges with a plugin.

Everything here returns plain `serde_json::Value`s (or runtime models), so
a test can tweak any field before handing it to
[`FakeHatoholServer`](crate::fake_server::FakeHatoholServer).
*/

use chrono::{DateTime, Utc};
use hap2_runtime::hapi_time;
use hap2_runtime::models::{Direction, Event, MonitoringServerInfo};
use hap2_runtime::protocol::{error_message, JSONRPC_VERSION};
use serde_json::{json, Value};

/// JSON-RPC envelopes, shaped the way the server sends them.
pub struct HapiMessageBuilder;

impl HapiMessageBuilder {
    pub fn request<S: Into<String>>(method: S, params: Value, id: i64) -> Value {
        json!({"jsonrpc": JSONRPC_VERSION, "method": method.into(), "params": params, "id": id})
    }

    pub fn notification<S: Into<String>>(method: S, params: Value) -> Value {
        json!({"jsonrpc": JSONRPC_VERSION, "method": method.into(), "params": params})
    }

    pub fn response(result: Value, id: i64) -> Value {
        json!({"jsonrpc": JSONRPC_VERSION, "result": result, "id": id})
    }

    pub fn success(id: i64) -> Value {
        Self::response(json!("SUCCESS"), id)
    }

    pub fn error(code: i32, id: Option<i64>) -> Value {
        json!({
            "jsonrpc": JSONRPC_VERSION,
            "error": {"code": code, "message": error_message(code)},
            "id": id,
        })
    }

    pub fn exchange_profile(procedures: &[&str], id: i64) -> Value {
        Self::request("exchangeProfile", json!({"procedures": procedures, "name": "hatohol"}), id)
    }

    pub fn fetch_hosts(host_ids: Option<&[&str]>, fetch_id: &str, id: i64) -> Value {
        Self::request("fetchHosts", Self::host_filter(host_ids, fetch_id), id)
    }

    pub fn fetch_items(host_ids: Option<&[&str]>, fetch_id: &str, id: i64) -> Value {
        Self::request("fetchItems", Self::host_filter(host_ids, fetch_id), id)
    }

    pub fn fetch_triggers(host_ids: Option<&[&str]>, fetch_id: &str, id: i64) -> Value {
        Self::request("fetchTriggers", Self::host_filter(host_ids, fetch_id), id)
    }

    pub fn fetch_history(
        host_id: &str,
        item_id: &str,
        begin_time: &str,
        end_time: &str,
        fetch_id: &str,
        id: i64,
    ) -> Value {
        Self::request(
            "fetchHistory",
            json!({
                "hostId": host_id,
                "itemId": item_id,
                "beginTime": begin_time,
                "endTime": end_time,
                "fetchId": fetch_id,
            }),
            id,
        )
    }

    pub fn fetch_events(last_info: &str, count: u64, direction: Direction, fetch_id: &str, id: i64) -> Value {
        Self::request(
            "fetchEvents",
            json!({"lastInfo": last_info, "count": count, "direction": direction, "fetchId": fetch_id}),
            id,
        )
    }

    pub fn update_monitoring_server_info(info: &MonitoringServerInfo) -> Value {
        Self::notification("updateMonitoringServerInfo", json!(info))
    }

    fn host_filter(host_ids: Option<&[&str]>, fetch_id: &str) -> Value {
        match host_ids {
            Some(ids) => json!({"hostIds": ids, "fetchId": fetch_id}),
            None => json!({"fetchId": fetch_id}),
        }
    }
}

/// Monitoring server info with test-friendly defaults.
pub struct ServerInfoBuilder {
    info: MonitoringServerInfo,
}

impl ServerInfoBuilder {
    pub fn new<S: Into<String>>(nick_name: S) -> Self {
        Self {
            info: MonitoringServerInfo {
                server_id: 1,
                url: "http://localhost/".to_string(),
                server_type: "hap2-devkit".to_string(),
                nick_name: nick_name.into(),
                user_name: String::new(),
                password: String::new(),
                polling_interval_sec: 30,
                retry_interval_sec: 10,
                extended_info: String::new(),
            },
        }
    }

    pub fn server_id(mut self, server_id: i64) -> Self {
        self.info.server_id = server_id;
        self
    }

    pub fn url<S: Into<String>>(mut self, url: S) -> Self {
        self.info.url = url.into();
        self
    }

    pub fn credentials<S: Into<String>>(mut self, user_name: S, password: S) -> Self {
        self.info.user_name = user_name.into();
        self.info.password = password.into();
        self
    }

    pub fn polling_interval(mut self, secs: u64) -> Self {
        self.info.polling_interval_sec = secs;
        self
    }

    pub fn retry_interval(mut self, secs: u64) -> Self {
        self.info.retry_interval_sec = secs;
        self
    }

    /// Stored as a JSON string, like the server does.
    pub fn extended_info(mut self, extended_info: Value) -> Self {
        self.info.extended_info = extended_info.to_string();
        self
    }

    pub fn build(self) -> MonitoringServerInfo {
        self.info
    }

    pub fn to_json(&self) -> Value {
        json!(self.info)
    }
}

/// An event in the wire shape `putEvents` carries.
pub struct EventBuilder {
    event: Event,
}

impl EventBuilder {
    pub fn new<S: Into<String>>(event_id: S, trigger_id: S) -> Self {
        Self {
            event: Event {
                event_id: event_id.into(),
                time: hapi_time::now(),
                event_type: "BAD".to_string(),
                trigger_id: trigger_id.into(),
                status: "NG".to_string(),
                severity: "WARNING".to_string(),
                host_id: String::new(),
                host_name: String::new(),
                brief: String::new(),
                extended_info: String::new(),
            },
        }
    }

    pub fn host<S: Into<String>>(mut self, host_id: S, host_name: S) -> Self {
        self.event.host_id = host_id.into();
        self.event.host_name = host_name.into();
        self
    }

    /// Recovery event: type GOOD, status OK.
    pub fn good(mut self) -> Self {
        self.event.event_type = "GOOD".to_string();
        self.event.status = "OK".to_string();
        self
    }

    pub fn severity<S: Into<String>>(mut self, severity: S) -> Self {
        self.event.severity = severity.into();
        self
    }

    pub fn brief<S: Into<String>>(mut self, brief: S) -> Self {
        self.event.brief = brief.into();
        self
    }

    pub fn at(mut self, time: DateTime<Utc>) -> Self {
        self.event.time = hapi_time::encode(&time);
        self
    }

    pub fn build(self) -> Event {
        self.event
    }
}
