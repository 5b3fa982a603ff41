//! Decodes one raw inbound message into a [`ParsedMessage`].
//!
//! Decoding never fails: problems are reported inside the result so the
//! caller can log them and, when an id is known, answer with an error.

use super::{
    schema::validate_params, Procedure, ERR_INVALID_PARAMS, ERR_INVALID_REQUEST,
    ERR_METHOD_NOT_FOUND, ERR_PARSE_ERROR,
};
use serde_json::{Map, Value};
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq)]
pub enum ParsedKind {
    /// Inbound RPC (request or notification).
    Request { method: String, params: Value },
    /// Successful reply to one of our requests.
    Response { result: Value },
    /// Error envelope sent by the peer.
    ErrorReply { code: i32, message: String },
    /// The message could not be decoded or failed validation.
    Invalid { code: i32, message: String, method: Option<String> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedMessage {
    pub message_id: Option<i64>,
    pub kind: ParsedKind,
}

impl ParsedMessage {
    pub fn error_code(&self) -> Option<i32> {
        match &self.kind {
            ParsedKind::ErrorReply { code, .. } | ParsedKind::Invalid { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match &self.kind {
            ParsedKind::ErrorReply { message, .. } | ParsedKind::Invalid { message, .. } => {
                Some(message)
            }
            _ => None,
        }
    }

    pub fn method(&self) -> Option<&str> {
        match &self.kind {
            ParsedKind::Request { method, .. } => Some(method),
            ParsedKind::Invalid { method, .. } => method.as_deref(),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        self.error_code().is_some()
    }

    fn invalid(message_id: Option<i64>, code: i32, message: impl Into<String>, method: Option<String>) -> Self {
        Self {
            message_id,
            kind: ParsedKind::Invalid { code, message: message.into(), method },
        }
    }
}

fn read_id(obj: &Map<String, Value>) -> Result<Option<i64>, ()> {
    match obj.get("id") {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v.as_i64().map(Some).ok_or(()),
    }
}

/// Parses `raw` and validates it against `allowed` inbound procedures.
pub fn parse_message(raw: &str, allowed: &HashSet<Procedure>) -> ParsedMessage {
    let value: Value = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(e) => {
            return ParsedMessage::invalid(None, ERR_PARSE_ERROR, format!("Parse error: {}", e), None);
        }
    };
    let Value::Object(mut obj) = value else {
        return ParsedMessage::invalid(None, ERR_INVALID_REQUEST, "Not an object", None);
    };
    let Ok(message_id) = read_id(&obj) else {
        return ParsedMessage::invalid(None, ERR_INVALID_REQUEST, "id must be an integer", None);
    };

    if let Some(error) = obj.remove("error") {
        let code = error
            .get("code")
            .and_then(Value::as_i64)
            .and_then(|code| i32::try_from(code).ok());
        let message = error.get("message").and_then(Value::as_str);
        let kind = match (code, message) {
            (Some(code), Some(message)) => ParsedKind::ErrorReply {
                code,
                message: message.to_string(),
            },
            _ => ParsedKind::ErrorReply {
                code: ERR_INVALID_REQUEST,
                message: format!("Invalid error message: {}", raw),
            },
        };
        return ParsedMessage { message_id, kind };
    }

    if let Some(result) = obj.remove("result") {
        return ParsedMessage { message_id, kind: ParsedKind::Response { result } };
    }

    let Some(method) = obj.get("method").and_then(Value::as_str).map(str::to_string) else {
        return ParsedMessage::invalid(message_id, ERR_INVALID_REQUEST, "Not found: method", None);
    };
    let procedure = match Procedure::from_name(&method) {
        Some(p) if allowed.contains(&p) => p,
        _ => {
            return ParsedMessage::invalid(
                message_id,
                ERR_METHOD_NOT_FOUND,
                format!("Method not found: {}", method),
                Some(method),
            );
        }
    };

    if !procedure.is_notification() && message_id.is_none() {
        return ParsedMessage::invalid(None, ERR_INVALID_PARAMS, "Not found: id", Some(method));
    }

    let params = obj.remove("params").unwrap_or(Value::Null);
    if let Err((code, reason)) = validate_params(procedure, &params) {
        return ParsedMessage::invalid(message_id, code, reason, Some(method));
    }

    ParsedMessage { message_id, kind: ParsedKind::Request { method, params } }
}
