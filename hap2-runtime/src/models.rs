//! Wire data model (camelCase on the wire, mirrors the HAPI 2.0 schema).

use crate::hapi_time;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Connection details of one monitored system, as sent by the server.
///
/// Never mutated: a fresh snapshot replaces the old one wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringServerInfo {
    pub server_id: i64,
    pub url: String,
    #[serde(rename = "type")]
    pub server_type: String,
    pub nick_name: String,
    pub user_name: String,
    pub password: String,
    pub polling_interval_sec: u64,
    pub retry_interval_sec: u64,
    #[serde(default)]
    pub extended_info: String,
}

impl MonitoringServerInfo {
    /// `extendedInfo` decoded as JSON, when it is JSON.
    pub fn extended_info_json(&self) -> Option<Value> {
        serde_json::from_str(&self.extended_info).ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ArmStatus {
    Init,
    Ok,
    Ng,
}

/// Cumulative health counters of one poller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArmInfo {
    pub last_status: ArmStatus,
    pub failure_reason: String,
    pub last_success_time: String,
    pub last_failure_time: String,
    pub num_success: u64,
    pub num_failure: u64,
}

impl Default for ArmInfo {
    fn default() -> Self {
        Self {
            last_status: ArmStatus::Init,
            failure_reason: String::new(),
            last_success_time: String::new(),
            last_failure_time: String::new(),
            num_success: 0,
            num_failure: 0,
        }
    }
}

impl ArmInfo {
    pub fn success(&mut self) {
        self.last_status = ArmStatus::Ok;
        self.failure_reason.clear();
        self.last_success_time = hapi_time::now();
        self.num_success += 1;
    }

    pub fn fail(&mut self, reason: impl Into<String>) {
        self.last_status = ArmStatus::Ng;
        self.failure_reason = reason.into();
        self.last_failure_time = hapi_time::now();
        self.num_failure += 1;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Host {
    pub host_id: String,
    pub host_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostGroup {
    pub group_id: String,
    pub group_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostGroupMembership {
    pub host_id: String,
    pub group_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trigger {
    pub trigger_id: String,
    /// OK, NG or UNKNOWN
    pub status: String,
    pub severity: String,
    pub last_change_time: String,
    pub host_id: String,
    pub host_name: String,
    pub brief: String,
    #[serde(default)]
    pub extended_info: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub event_id: String,
    pub time: String,
    /// GOOD, BAD, UNKNOWN or NOTIFICATION
    #[serde(rename = "type")]
    pub event_type: String,
    pub trigger_id: String,
    pub status: String,
    pub severity: String,
    pub host_id: String,
    pub host_name: String,
    pub brief: String,
    #[serde(default)]
    pub extended_info: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub item_id: String,
    pub host_id: String,
    pub brief: String,
    pub last_value_time: String,
    pub last_value: String,
    pub item_group_name: String,
    pub unit: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistorySample {
    pub value: String,
    pub time: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum UpdateType {
    /// Full replacement
    All,
    /// Incremental
    Updated,
}

impl UpdateType {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateType::All => "ALL",
            UpdateType::Updated => "UPDATED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Asc,
    Desc,
}

/// Triggers produced by one `poll_triggers` call.
#[derive(Debug, Clone, PartialEq)]
pub struct PolledTriggers {
    pub triggers: Vec<Trigger>,
    pub update_type: UpdateType,
    pub last_info: Option<String>,
}

/// Identifies a server-initiated fetch an upload answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchContext {
    pub fetch_id: String,
    /// More data may remain beyond what this answer carries.
    pub may_more: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchHostsParams {
    #[serde(default)]
    pub host_ids: Option<Vec<String>>,
    pub fetch_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchItemsParams {
    #[serde(default)]
    pub host_ids: Option<Vec<String>>,
    pub fetch_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchHistoryParams {
    pub host_id: String,
    pub item_id: String,
    pub begin_time: String,
    pub end_time: String,
    pub fetch_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchTriggersParams {
    #[serde(default)]
    pub host_ids: Option<Vec<String>>,
    pub fetch_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchEventsParams {
    pub last_info: String,
    pub count: u64,
    pub direction: Direction,
    pub fetch_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_monitoring_server_info_from_wire() {
        let info: MonitoringServerInfo = serde_json::from_value(json!({
            "serverId": 1,
            "url": "http://zabbix.example/api_jsonrpc.php",
            "type": "8e632c14-d1f7-11e4-8350-d43d7e3146fb",
            "nickName": "zabbix",
            "userName": "Admin",
            "password": "zabbix",
            "pollingIntervalSec": 30,
            "retryIntervalSec": 10,
            "extendedInfo": "{\"db\": \"ndoutils\"}"
        }))
        .unwrap();
        assert_eq!(info.polling_interval_sec, 30);
        assert_eq!(info.extended_info_json().unwrap()["db"], "ndoutils");
    }

    #[test]
    fn test_raw_extended_info() {
        let info = MonitoringServerInfo {
            server_id: 1,
            url: String::new(),
            server_type: String::new(),
            nick_name: String::new(),
            user_name: String::new(),
            password: String::new(),
            polling_interval_sec: 30,
            retry_interval_sec: 10,
            extended_info: "not json".into(),
        };
        assert!(info.extended_info_json().is_none());
    }

    #[test]
    fn test_arm_info_counters() {
        let mut arm = ArmInfo::default();
        assert_eq!(arm.last_status, ArmStatus::Init);

        arm.fail("connection refused");
        assert_eq!(arm.last_status, ArmStatus::Ng);
        assert_eq!(arm.failure_reason, "connection refused");
        assert_eq!(arm.num_failure, 1);
        assert!(hapi_time::decode(&arm.last_failure_time).is_ok());

        arm.success();
        assert_eq!(arm.last_status, ArmStatus::Ok);
        assert!(arm.failure_reason.is_empty());
        assert_eq!((arm.num_success, arm.num_failure), (1, 1));

        let wire = serde_json::to_value(&arm).unwrap();
        assert_eq!(wire["lastStatus"], "OK");
        assert_eq!(wire["numFailure"], 1);
    }

    #[test]
    fn test_event_wire_names() {
        let wire = json!({
            "eventId": "1", "time": "20150628093511.000000", "type": "BAD",
            "triggerId": "2", "status": "NG", "severity": "ERROR",
            "hostId": "3", "hostName": "web", "brief": "down"
        });
        let event: Event = serde_json::from_value(wire).unwrap();
        assert_eq!(event.event_type, "BAD");
        assert!(event.extended_info.is_empty());
    }
}
