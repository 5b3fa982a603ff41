//! JSON-RPC 2.0 protocol pieces: procedures, error codes, correlation ids and
//! the inbound message codec.

pub mod codec;
pub mod schema;

pub use codec::{parse_message, ParsedKind, ParsedMessage};
pub use schema::{procedure_def, validate_params, ArgDef, ArgType, ProcedureDef};

use serde_json::Value;
use std::fmt;

pub const JSONRPC_VERSION: &str = "2.0";

pub const ERR_INVALID_REQUEST: i32 = -32600;
pub const ERR_METHOD_NOT_FOUND: i32 = -32601;
pub const ERR_INVALID_PARAMS: i32 = -32602;
pub const ERR_PARSE_ERROR: i32 = -32700;

/// Canned message sent on the wire for an error code.
pub fn error_message(code: i32) -> &'static str {
    match code {
        ERR_PARSE_ERROR => "Parse error",
        ERR_INVALID_REQUEST => "Invalid request",
        ERR_METHOD_NOT_FOUND => "Method not found",
        ERR_INVALID_PARAMS => "Invalid params",
        _ => "Server error",
    }
}

/// Every procedure of the HAPI 2.0 protocol, both directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Procedure {
    ExchangeProfile,
    GetMonitoringServerInfo,
    GetLastInfo,
    FetchHosts,
    FetchItems,
    FetchHistory,
    FetchTriggers,
    FetchEvents,
    UpdateMonitoringServerInfo,
    PutHosts,
    PutHostGroups,
    PutHostGroupMembership,
    PutTriggers,
    PutEvents,
    PutItems,
    PutHistory,
    PutArmInfo,
}

impl Procedure {
    pub const ALL: [Procedure; 17] = [
        Procedure::ExchangeProfile,
        Procedure::GetMonitoringServerInfo,
        Procedure::GetLastInfo,
        Procedure::FetchHosts,
        Procedure::FetchItems,
        Procedure::FetchHistory,
        Procedure::FetchTriggers,
        Procedure::FetchEvents,
        Procedure::UpdateMonitoringServerInfo,
        Procedure::PutHosts,
        Procedure::PutHostGroups,
        Procedure::PutHostGroupMembership,
        Procedure::PutTriggers,
        Procedure::PutEvents,
        Procedure::PutItems,
        Procedure::PutHistory,
        Procedure::PutArmInfo,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Procedure::ExchangeProfile => "exchangeProfile",
            Procedure::GetMonitoringServerInfo => "getMonitoringServerInfo",
            Procedure::GetLastInfo => "getLastInfo",
            Procedure::FetchHosts => "fetchHosts",
            Procedure::FetchItems => "fetchItems",
            Procedure::FetchHistory => "fetchHistory",
            Procedure::FetchTriggers => "fetchTriggers",
            Procedure::FetchEvents => "fetchEvents",
            Procedure::UpdateMonitoringServerInfo => "updateMonitoringServerInfo",
            Procedure::PutHosts => "putHosts",
            Procedure::PutHostGroups => "putHostGroups",
            Procedure::PutHostGroupMembership => "putHostGroupMembership",
            Procedure::PutTriggers => "putTriggers",
            Procedure::PutEvents => "putEvents",
            Procedure::PutItems => "putItems",
            Procedure::PutHistory => "putHistory",
            Procedure::PutArmInfo => "putArmInfo",
        }
    }

    pub fn from_name(name: &str) -> Option<Procedure> {
        Procedure::ALL.iter().copied().find(|p| p.name() == name)
    }

    /// Fire-and-forget procedures carry no id.
    pub fn is_notification(&self) -> bool {
        procedure_def(*self).notification
    }
}

impl fmt::Display for Procedure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The component waiting for a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Component {
    Main,
    Poller,
}

impl Component {
    pub fn code(&self) -> u32 {
        match self {
            Component::Main => 1,
            Component::Poller => 2,
        }
    }

    pub fn from_code(code: u32) -> Option<Component> {
        match code {
            1 => Some(Component::Main),
            2 => Some(Component::Poller),
            _ => None,
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Component::Main => f.write_str("Main"),
            Component::Poller => f.write_str("Poller"),
        }
    }
}

/// Correlation key of one outbound request.
///
/// On the wire it is a single integer: the component code above bit 32 and a
/// random serial below it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CorrelationId {
    pub component: Component,
    pub serial: u32,
}

impl CorrelationId {
    pub fn generate(component: Component) -> Self {
        Self { component, serial: rand::random() }
    }

    pub fn to_wire(&self) -> i64 {
        (i64::from(self.component.code()) << 32) | i64::from(self.serial)
    }

    pub fn from_wire(id: i64) -> Option<Self> {
        if id < 0 {
            return None;
        }
        let component = Component::from_code(u32::try_from(id >> 32).ok()?)?;
        Some(Self { component, serial: (id & 0xFFFF_FFFF) as u32 })
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_wire())
    }
}

pub(crate) fn envelope_id(id: Option<i64>) -> Value {
    id.map(Value::from).unwrap_or(Value::Null)
}
