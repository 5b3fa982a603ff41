//! Hapi time (`YYYYMMDDHHMMSS[.fraction]`, UTC) and last-info cursor helpers.

use crate::error::HapError;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;

/// Fraction digits used when the caller does not ask for a precision.
pub const DEFAULT_PRECISION: usize = 6;
const MAX_PRECISION: usize = 9;

/// Encodes `time` with microsecond precision.
pub fn encode(time: &DateTime<Utc>) -> String {
    encode_with_precision(time, DEFAULT_PRECISION)
}

/// Encodes `time` with `digits` fraction digits (0 drops the fraction, capped at 9).
pub fn encode_with_precision(time: &DateTime<Utc>, digits: usize) -> String {
    let base = time.format("%Y%m%d%H%M%S").to_string();
    let digits = digits.min(MAX_PRECISION);
    if digits == 0 {
        return base;
    }
    let nanos = format!("{:09}", time.timestamp_subsec_nanos());
    format!("{}.{}", base, &nanos[..digits])
}

pub fn now() -> String {
    encode(&Utc::now())
}

/// Decodes a hapi time. Accepts 1 to 9 fraction digits.
pub fn decode(text: &str) -> Result<DateTime<Utc>, HapError> {
    let (whole, fraction) = match text.split_once('.') {
        Some((whole, fraction)) => (whole, Some(fraction)),
        None => (text, None),
    };
    if whole.len() != 14 || !whole.bytes().all(|b| b.is_ascii_digit()) {
        return Err(HapError::InvalidTime(text.to_string()));
    }
    let naive = NaiveDateTime::parse_from_str(whole, "%Y%m%d%H%M%S")
        .map_err(|_| HapError::InvalidTime(text.to_string()))?;

    let nanos = match fraction {
        None => 0,
        Some(f) if !f.is_empty() && f.len() <= MAX_PRECISION && f.bytes().all(|b| b.is_ascii_digit()) => {
            format!("{:0<9}", f)
                .parse::<u32>()
                .map_err(|_| HapError::InvalidTime(text.to_string()))?
        }
        Some(_) => return Err(HapError::InvalidTime(text.to_string())),
    };

    let time = Utc.from_utc_datetime(&naive);
    Ok(time + chrono::Duration::nanoseconds(i64::from(nanos)))
}

/// Unix time in seconds (with fraction) to hapi time, microsecond precision.
pub fn from_unix_time(unix: f64) -> Result<String, HapError> {
    let mut secs = unix.floor() as i64;
    let mut micros = ((unix - unix.floor()) * 1_000_000.0).round() as u32;
    if micros >= 1_000_000 {
        secs += 1;
        micros -= 1_000_000;
    }
    let time = DateTime::from_timestamp(secs, micros * 1_000)
        .ok_or_else(|| HapError::InvalidTime(unix.to_string()))?;
    Ok(encode(&time))
}

/// Hapi time to unix time in seconds, keeping nanoseconds.
pub fn to_unix_time(text: &str) -> Result<f64, HapError> {
    let time = decode(text)?;
    Ok(time.timestamp() as f64 + f64::from(time.timestamp_subsec_nanos()) / 1e9)
}

fn cursor_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Index of the biggest value, comparing zero-padded decimal strings.
///
/// All values are padded to the widest one before the lexical comparison, so
/// `"10"` beats `"9"`.
pub fn biggest_index<S: AsRef<str>>(values: &[S]) -> Option<usize> {
    let width = values.iter().map(|v| v.as_ref().len()).max()?;
    values
        .iter()
        .map(|v| format!("{:0>width$}", v.as_ref(), width = width))
        .enumerate()
        .max_by(|(_, a), (_, b)| a.cmp(b))
        .map(|(idx, _)| idx)
}

/// Biggest `key` value across `array`, returned as found (number or string).
pub fn get_biggest_num_of_dict_array(array: &[Value], key: &str) -> Option<Value> {
    let candidates: Vec<&Value> = array.iter().filter_map(|item| item.get(key)).collect();
    let texts: Option<Vec<String>> = candidates.iter().map(|v| cursor_text(v)).collect();
    let idx = biggest_index(&texts?)?;
    Some(candidates[idx].clone())
}
