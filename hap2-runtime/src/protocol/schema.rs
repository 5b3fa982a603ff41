//! Static argument schema of every procedure and the validator that checks
//! inbound params against it.

use super::{Procedure, ERR_INVALID_PARAMS};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgType {
    String,
    Integer,
    Boolean,
    List,
    Object,
}

impl ArgType {
    /// Exact JSON type match: a float is not an integer, a bool is not an integer.
    pub fn matches(&self, value: &Value) -> bool {
        match (self, value) {
            (ArgType::String, Value::String(_)) => true,
            (ArgType::Integer, Value::Number(n)) => n.is_i64() || n.is_u64(),
            (ArgType::Boolean, Value::Bool(_)) => true,
            (ArgType::List, Value::Array(_)) => true,
            (ArgType::Object, Value::Object(_)) => true,
            _ => false,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            ArgType::String => "string",
            ArgType::Integer => "integer",
            ArgType::Boolean => "boolean",
            ArgType::List => "list",
            ArgType::Object => "object",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ArgDef {
    pub name: &'static str,
    pub kind: ArgType,
    pub mandatory: bool,
    pub max_size: Option<usize>,
    pub choices: Option<&'static [&'static str]>,
}

impl ArgDef {
    const fn new(name: &'static str, kind: ArgType) -> Self {
        Self { name, kind, mandatory: true, max_size: None, choices: None }
    }

    const fn optional(mut self) -> Self {
        self.mandatory = false;
        self
    }

    const fn max_size(mut self, size: usize) -> Self {
        self.max_size = Some(size);
        self
    }

    const fn choices(mut self, choices: &'static [&'static str]) -> Self {
        self.choices = Some(choices);
        self
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ProcedureDef {
    pub notification: bool,
    pub args: &'static [ArgDef],
}

const FETCH_ID: ArgDef = ArgDef::new("fetchId", ArgType::String).max_size(255);
const HOST_IDS: ArgDef = ArgDef::new("hostIds", ArgType::List).optional();

static EXCHANGE_PROFILE: [ArgDef; 2] = [
    ArgDef::new("procedures", ArgType::List),
    ArgDef::new("name", ArgType::String).max_size(255),
];
static GET_LAST_INFO: [ArgDef; 1] = [ArgDef::new("element", ArgType::String).max_size(255)];
static FETCH_BY_HOSTS: [ArgDef; 2] = [HOST_IDS, FETCH_ID];
static FETCH_HISTORY: [ArgDef; 5] = [
    ArgDef::new("hostId", ArgType::String).max_size(255),
    ArgDef::new("itemId", ArgType::String).max_size(255),
    ArgDef::new("beginTime", ArgType::String),
    ArgDef::new("endTime", ArgType::String),
    FETCH_ID,
];
static FETCH_EVENTS: [ArgDef; 4] = [
    ArgDef::new("lastInfo", ArgType::String).max_size(32767),
    ArgDef::new("count", ArgType::Integer),
    ArgDef::new("direction", ArgType::String).choices(&["ASC", "DESC"]),
    FETCH_ID,
];
static UPDATE_MONITORING_SERVER_INFO: [ArgDef; 9] = [
    ArgDef::new("serverId", ArgType::Integer),
    ArgDef::new("url", ArgType::String),
    ArgDef::new("type", ArgType::String),
    ArgDef::new("nickName", ArgType::String),
    ArgDef::new("userName", ArgType::String),
    ArgDef::new("password", ArgType::String),
    ArgDef::new("pollingIntervalSec", ArgType::Integer),
    ArgDef::new("retryIntervalSec", ArgType::Integer),
    ArgDef::new("extendedInfo", ArgType::String),
];

const fn request(args: &'static [ArgDef]) -> ProcedureDef {
    ProcedureDef { notification: false, args }
}

/// Schema of `procedure`.
///
/// Plugin-to-server procedures (`put*`) have no inbound schema: the plugin
/// never receives them.
pub fn procedure_def(procedure: Procedure) -> ProcedureDef {
    match procedure {
        Procedure::ExchangeProfile => request(&EXCHANGE_PROFILE),
        Procedure::GetLastInfo => request(&GET_LAST_INFO),
        Procedure::FetchHosts | Procedure::FetchItems | Procedure::FetchTriggers => {
            request(&FETCH_BY_HOSTS)
        }
        Procedure::FetchHistory => request(&FETCH_HISTORY),
        Procedure::FetchEvents => request(&FETCH_EVENTS),
        Procedure::UpdateMonitoringServerInfo => ProcedureDef {
            notification: true,
            args: &UPDATE_MONITORING_SERVER_INFO,
        },
        Procedure::GetMonitoringServerInfo
        | Procedure::PutHosts
        | Procedure::PutHostGroups
        | Procedure::PutHostGroupMembership
        | Procedure::PutTriggers
        | Procedure::PutEvents
        | Procedure::PutItems
        | Procedure::PutHistory
        | Procedure::PutArmInfo => request(&[]),
    }
}

fn arg_len(value: &Value) -> Option<usize> {
    match value {
        Value::String(s) => Some(s.chars().count()),
        Value::Array(a) => Some(a.len()),
        Value::Object(o) => Some(o.len()),
        _ => None,
    }
}

/// Checks `params` against the schema of `procedure`.
///
/// Returns the error code and a human-readable reason on the first violation.
pub fn validate_params(procedure: Procedure, params: &Value) -> Result<(), (i32, String)> {
    let def = procedure_def(procedure);
    let empty = serde_json::Map::new();
    let params = match params {
        Value::Object(map) => map,
        Value::Null => &empty,
        _ => {
            return Err((ERR_INVALID_PARAMS, format!("{}: params must be an object", procedure)));
        }
    };

    for arg in def.args {
        let Some(value) = params.get(arg.name) else {
            if arg.mandatory {
                return Err((ERR_INVALID_PARAMS, format!("Not found: {}", arg.name)));
            }
            continue;
        };

        if !arg.kind.matches(value) {
            return Err((
                ERR_INVALID_PARAMS,
                format!("{}: expected {}", arg.name, arg.kind.name()),
            ));
        }

        if let (Some(max), Some(len)) = (arg.max_size, arg_len(value)) {
            if len > max {
                return Err((
                    ERR_INVALID_PARAMS,
                    format!("{}: length {} exceeds {}", arg.name, len, max),
                ));
            }
        }

        if let Some(choices) = arg.choices {
            let allowed = value.as_str().map(|s| choices.contains(&s)).unwrap_or(false);
            if !allowed {
                return Err((
                    ERR_INVALID_PARAMS,
                    format!("{}: {} not in {:?}", arg.name, value, choices),
                ));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_exchange_profile_schema() {
        let ok = json!({"procedures": ["exchangeProfile"], "name": "zabbix"});
        assert!(validate_params(Procedure::ExchangeProfile, &ok).is_ok());

        let missing = json!({"procedures": []});
        let (code, reason) = validate_params(Procedure::ExchangeProfile, &missing).unwrap_err();
        assert_eq!(code, ERR_INVALID_PARAMS);
        assert_eq!(reason, "Not found: name");

        let long = json!({"procedures": [], "name": "x".repeat(256)});
        assert!(validate_params(Procedure::ExchangeProfile, &long).is_err());
        let exact = json!({"procedures": [], "name": "x".repeat(255)});
        assert!(validate_params(Procedure::ExchangeProfile, &exact).is_ok());
    }

    #[test]
    fn test_choices() {
        let params = |direction: &str| {
            json!({"lastInfo": "", "count": 100, "direction": direction, "fetchId": "1"})
        };
        assert!(validate_params(Procedure::FetchEvents, &params("ASC")).is_ok());
        assert!(validate_params(Procedure::FetchEvents, &params("DESC")).is_ok());
        let (code, _) = validate_params(Procedure::FetchEvents, &params("SIDEWAYS")).unwrap_err();
        assert_eq!(code, ERR_INVALID_PARAMS);
    }

    #[test]
    fn test_exact_types() {
        let float_count = json!({"lastInfo": "", "count": 1.5, "direction": "ASC", "fetchId": "1"});
        assert!(validate_params(Procedure::FetchEvents, &float_count).is_err());
        let bool_count = json!({"lastInfo": "", "count": true, "direction": "ASC", "fetchId": "1"});
        assert!(validate_params(Procedure::FetchEvents, &bool_count).is_err());
        let string_ids = json!({"hostIds": "7", "fetchId": "1"});
        assert!(validate_params(Procedure::FetchTriggers, &string_ids).is_err());
    }

    #[test]
    fn test_optional_args() {
        assert!(validate_params(Procedure::FetchTriggers, &json!({"fetchId": "42"})).is_ok());
        assert!(validate_params(Procedure::FetchTriggers, &json!({"hostIds": ["7"], "fetchId": "42"})).is_ok());
        assert!(validate_params(Procedure::GetMonitoringServerInfo, &Value::Null).is_ok());
    }

    #[test]
    fn test_max_size_counts_characters() {
        // 255 multi-byte characters are within the limit
        let params = json!({"procedures": [], "name": "é".repeat(255)});
        assert!(validate_params(Procedure::ExchangeProfile, &params).is_ok());
    }
}
