//! Value helpers around `sea_query::Value`.
//!
//! `sea_query::Value` is the single value type of the crate: it carries query
//! bindings, row fields and entity attributes. This module adds what the ORM
//! needs on top of it:
//!
//! - **`is_null`** - typed nulls (`Value::Int(None)`, `Value::String(None)`, ...)
//! - **`Key`** - a normalized, hashable form used to match primary and foreign
//!   keys across integer widths and numeric strings
//! - **`to_json` / `from_json`** - serialization of attributes
//! - **`FromValue`** - typed extraction with loose conversions

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use indexmap::IndexMap;
use sea_query::Value;

/// Ordered attribute map (column name → value)
pub type Record = IndexMap<String, Value>;

pub(crate) const DATE_FORMAT: &str = "%Y-%m-%d";
pub(crate) const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
pub(crate) const TIME_FORMAT: &str = "%H:%M:%S";

/// The canonical SQL NULL
pub fn null() -> Value {
    Value::String(None)
}

/// Whether the value is a typed SQL NULL
pub fn is_null(value: &Value) -> bool {
    matches!(
        value,
        Value::Bool(None)
            | Value::TinyInt(None)
            | Value::SmallInt(None)
            | Value::Int(None)
            | Value::BigInt(None)
            | Value::TinyUnsigned(None)
            | Value::SmallUnsigned(None)
            | Value::Unsigned(None)
            | Value::BigUnsigned(None)
            | Value::Float(None)
            | Value::Double(None)
            | Value::String(None)
            | Value::Char(None)
            | Value::Bytes(None)
            | Value::Json(None)
            | Value::ChronoDate(None)
            | Value::ChronoTime(None)
            | Value::ChronoDateTime(None)
            | Value::ChronoDateTimeUtc(None)
    )
}

/// Normalized key used to match related rows to their parents
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Int(i64),
    Text(String),
    Bytes(Vec<u8>),
}

/// Normalize a value into a matching key, `None` for NULL
///
/// Integers of every width collapse into `Key::Int`, and numeric strings do
/// too, so a `BIGINT` primary key matches a `VARCHAR` morph id holding the
/// same number.
pub fn key_of(value: &Value) -> Option<Key> {
    if is_null(value) {
        return None;
    }
    let key = match value {
        Value::Bool(Some(b)) => Key::Int(i64::from(*b)),
        Value::TinyInt(Some(i)) => Key::Int(i64::from(*i)),
        Value::SmallInt(Some(i)) => Key::Int(i64::from(*i)),
        Value::Int(Some(i)) => Key::Int(i64::from(*i)),
        Value::BigInt(Some(i)) => Key::Int(*i),
        Value::TinyUnsigned(Some(u)) => Key::Int(i64::from(*u)),
        Value::SmallUnsigned(Some(u)) => Key::Int(i64::from(*u)),
        Value::Unsigned(Some(u)) => Key::Int(i64::from(*u)),
        Value::BigUnsigned(Some(u)) => match i64::try_from(*u) {
            Ok(i) => Key::Int(i),
            Err(_) => Key::Text(u.to_string()),
        },
        Value::Float(Some(f)) => float_key(f64::from(*f)),
        Value::Double(Some(d)) => float_key(*d),
        Value::String(Some(s)) => match s.parse::<i64>() {
            Ok(i) => Key::Int(i),
            Err(_) => Key::Text(s.to_string()),
        },
        Value::Char(Some(c)) => Key::Text(c.to_string()),
        Value::Bytes(Some(b)) => Key::Bytes(b.to_vec()),
        other => Key::Text(to_json(other).to_string()),
    };
    Some(key)
}

fn float_key(f: f64) -> Key {
    if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
        Key::Int(f as i64)
    } else {
        Key::Text(f.to_string())
    }
}

/// Whether two values denote the same key
pub fn same_key(a: &Value, b: &Value) -> bool {
    match (key_of(a), key_of(b)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// Convert a value to JSON for serialization
pub fn to_json(value: &Value) -> serde_json::Value {
    use serde_json::Value as Json;

    if is_null(value) {
        return Json::Null;
    }
    match value {
        Value::Bool(Some(b)) => Json::Bool(*b),
        Value::TinyInt(Some(i)) => Json::from(*i),
        Value::SmallInt(Some(i)) => Json::from(*i),
        Value::Int(Some(i)) => Json::from(*i),
        Value::BigInt(Some(i)) => Json::from(*i),
        Value::TinyUnsigned(Some(u)) => Json::from(*u),
        Value::SmallUnsigned(Some(u)) => Json::from(*u),
        Value::Unsigned(Some(u)) => Json::from(*u),
        Value::BigUnsigned(Some(u)) => Json::from(*u),
        Value::Float(Some(f)) => Json::from(f64::from(*f)),
        Value::Double(Some(d)) => Json::from(*d),
        Value::String(Some(s)) => Json::String(s.to_string()),
        Value::Char(Some(c)) => Json::String(c.to_string()),
        Value::Bytes(Some(b)) => Json::String(String::from_utf8_lossy(b).into_owned()),
        Value::Json(Some(j)) => serde_json::Value::clone(j),
        Value::ChronoDate(Some(d)) => Json::String(d.format(DATE_FORMAT).to_string()),
        Value::ChronoTime(Some(t)) => Json::String(t.format(TIME_FORMAT).to_string()),
        Value::ChronoDateTime(Some(dt)) => Json::String(dt.format(DATETIME_FORMAT).to_string()),
        Value::ChronoDateTimeUtc(Some(dt)) => Json::String(dt.to_rfc3339()),
        other => Json::String(format!("{other:?}")),
    }
}

/// Convert JSON back into a value (objects and arrays stay JSON)
pub fn from_json(json: serde_json::Value) -> Value {
    use serde_json::Value as Json;

    match json {
        Json::Null => null(),
        Json::Bool(b) => Value::from(b),
        Json::Number(n) => match n.as_i64() {
            Some(i) => Value::from(i),
            None => Value::from(n.as_f64().unwrap_or_default()),
        },
        Json::String(s) => Value::from(s),
        other => Value::from(other),
    }
}

/// Typed extraction from a `Value`
///
/// Conversions are loose in the way database drivers need them to be: an
/// SQLite boolean arrives as an integer, a date arrives as text.
pub trait FromValue: Sized {
    /// Returns `None` for NULL or when the value cannot represent `Self`
    fn from_value(value: &Value) -> Option<Self>;
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Option<Self> {
        match key_of(value)? {
            Key::Int(i) => Some(i),
            Key::Text(s) => s.parse().ok(),
            Key::Bytes(_) => None,
        }
    }
}

impl FromValue for i32 {
    fn from_value(value: &Value) -> Option<Self> {
        i64::from_value(value).and_then(|i| i32::try_from(i).ok())
    }
}

impl FromValue for u64 {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::BigUnsigned(Some(u)) => Some(*u),
            other => i64::from_value(other).and_then(|i| u64::try_from(i).ok()),
        }
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Float(Some(f)) => Some(f64::from(*f)),
            Value::Double(Some(d)) => Some(*d),
            Value::String(Some(s)) => s.parse().ok(),
            other => i64::from_value(other).map(|i| i as f64),
        }
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(Some(b)) => Some(*b),
            Value::String(Some(s)) => match s.to_ascii_lowercase().as_str() {
                "true" | "1" => Some(true),
                "false" | "0" => Some(false),
                _ => None,
            },
            other => i64::from_value(other).map(|i| i != 0),
        }
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Option<Self> {
        if is_null(value) {
            return None;
        }
        match value {
            Value::String(Some(s)) => Some(s.to_string()),
            Value::Char(Some(c)) => Some(c.to_string()),
            other => match to_json(other) {
                serde_json::Value::String(s) => Some(s),
                json => Some(json.to_string()),
            },
        }
    }
}

impl FromValue for serde_json::Value {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Json(Some(j)) => Some(serde_json::Value::clone(j)),
            Value::String(Some(s)) => serde_json::from_str(s).ok(),
            other if is_null(other) => None,
            other => Some(to_json(other)),
        }
    }
}

impl FromValue for NaiveDate {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::ChronoDate(Some(d)) => Some(NaiveDate::clone(d)),
            Value::ChronoDateTime(Some(dt)) => Some(dt.date()),
            Value::String(Some(s)) => parse_date(s),
            _ => None,
        }
    }
}

impl FromValue for NaiveDateTime {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::ChronoDateTime(Some(dt)) => Some(NaiveDateTime::clone(dt)),
            Value::ChronoDate(Some(d)) => Some(d.and_time(NaiveTime::MIN)),
            Value::String(Some(s)) => parse_datetime(s),
            _ => None,
        }
    }
}

/// Parse `YYYY-MM-DD`, also accepting a datetime and keeping its date
pub(crate) fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, DATE_FORMAT)
        .ok()
        .or_else(|| parse_datetime(s).map(|dt| dt.date()))
}

/// Parse `YYYY-MM-DD HH:MM:SS` (or ISO `T`-separated), also accepting a bare date
pub(crate) fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, DATETIME_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(s, DATE_FORMAT)
                .ok()
                .map(|d| d.and_time(NaiveTime::MIN))
        })
}
