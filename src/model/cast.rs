//! Attribute casts.
//!
//! Attributes are stored on an [`Entity`](super::Entity) in DB-native form.
//! A cast converts on read (`cast`) and back on write (`uncast`):
//!
//! | name | read as | stored as |
//! |---|---|---|
//! | `integer` | `BigInt` | `BigInt` |
//! | `float` | `Double` | `Double` |
//! | `boolean` | `Bool` | `0` / `1` |
//! | `string` | `String` | `String` |
//! | `date` | `ChronoDate` | `YYYY-MM-DD` |
//! | `datetime` | `ChronoDateTime` | `YYYY-MM-DD HH:MM:SS` |
//! | `json` (`array`, `object`) | `Json` | JSON text |
//!
//! Custom casts implement [`CastHandler`] and are registered by name on the
//! [`Registry`](super::Registry) before the models that use them.

use crate::error::{LucidError, Result};
use crate::value::{self, FromValue, DATETIME_FORMAT, DATE_FORMAT};
use chrono::{NaiveDate, NaiveDateTime};
use sea_query::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// User-defined attribute conversion
///
/// # Example
///
/// ```
/// use lucid::model::cast::CastHandler;
/// use lucid::sea_query::Value;
///
/// struct Cents;
///
/// impl CastHandler for Cents {
///     fn cast(&self, _attribute: &str, value: &Value) -> lucid::Result<Value> {
///         let cents = lucid::value::FromValue::from_value(value).unwrap_or(0i64);
///         Ok(Value::from(cents as f64 / 100.0))
///     }
///
///     fn uncast(&self, _attribute: &str, value: &Value) -> lucid::Result<Value> {
///         let amount: f64 = lucid::value::FromValue::from_value(value).unwrap_or(0.0);
///         Ok(Value::from((amount * 100.0).round() as i64))
///     }
/// }
/// ```
pub trait CastHandler: Send + Sync {
    /// DB-native value → application value
    fn cast(&self, attribute: &str, value: &Value) -> Result<Value>;

    /// Application value → DB-native value
    fn uncast(&self, attribute: &str, value: &Value) -> Result<Value>;
}

/// Cast attached to one attribute
#[derive(Clone)]
pub enum Cast {
    Integer,
    Float,
    Boolean,
    String,
    Date,
    DateTime,
    Json,
    Custom(Arc<dyn CastHandler>),
    /// Custom cast referenced by name, resolved when the model is registered
    Named(String),
}

impl fmt::Debug for Cast {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cast::Integer => f.write_str("Integer"),
            Cast::Float => f.write_str("Float"),
            Cast::Boolean => f.write_str("Boolean"),
            Cast::String => f.write_str("String"),
            Cast::Date => f.write_str("Date"),
            Cast::DateTime => f.write_str("DateTime"),
            Cast::Json => f.write_str("Json"),
            Cast::Custom(_) => f.write_str("Custom(..)"),
            Cast::Named(name) => write!(f, "Named({name})"),
        }
    }
}

impl Cast {
    /// Built-in cast for a type name, `None` when the name is not built in
    pub fn builtin(name: &str) -> Option<Self> {
        let cast = match name.to_ascii_lowercase().as_str() {
            "integer" | "int" => Cast::Integer,
            "float" | "double" => Cast::Float,
            "boolean" | "bool" => Cast::Boolean,
            "string" => Cast::String,
            "date" => Cast::Date,
            "datetime" => Cast::DateTime,
            "json" | "array" | "object" => Cast::Json,
            _ => return None,
        };
        Some(cast)
    }

    /// Parse a declared cast name: built-in, or a name to resolve later
    pub(crate) fn parse(name: &str) -> Self {
        Cast::builtin(name).unwrap_or_else(|| Cast::Named(name.to_string()))
    }

    /// Convert a stored value for reading
    pub fn cast(&self, attribute: &str, value: &Value) -> Result<Value> {
        if value::is_null(value) {
            return Ok(value.clone());
        }
        let cast = match self {
            Cast::Integer => i64::from_value(value).map(Value::from),
            Cast::Float => f64::from_value(value).map(Value::from),
            Cast::Boolean => bool::from_value(value).map(Value::from),
            Cast::String => String::from_value(value).map(Value::from),
            Cast::Date => NaiveDate::from_value(value).map(Value::from),
            Cast::DateTime => NaiveDateTime::from_value(value).map(Value::from),
            Cast::Json => serde_json::Value::from_value(value).map(Value::from),
            Cast::Custom(handler) => return handler.cast(attribute, value),
            Cast::Named(name) => return Err(LucidError::UnknownCast(name.clone())),
        };
        cast.ok_or_else(|| LucidError::Cast {
            attribute: attribute.to_string(),
            message: format!("cannot read {value:?} as {self:?}"),
        })
    }

    /// Convert an application value into its stored form
    pub fn uncast(&self, attribute: &str, value: &Value) -> Result<Value> {
        if value::is_null(value) {
            return Ok(value.clone());
        }
        let stored = match self {
            Cast::Integer => i64::from_value(value).map(Value::from),
            Cast::Float => f64::from_value(value).map(Value::from),
            Cast::Boolean => bool::from_value(value).map(|b| Value::from(i64::from(b))),
            Cast::String => String::from_value(value).map(Value::from),
            Cast::Date => NaiveDate::from_value(value)
                .map(|d| Value::from(d.format(DATE_FORMAT).to_string())),
            Cast::DateTime => NaiveDateTime::from_value(value)
                .map(|dt| Value::from(dt.format(DATETIME_FORMAT).to_string())),
            Cast::Json => match value {
                Value::String(Some(s)) => Some(Value::from(s.to_string())),
                other => Some(Value::from(value::to_json(other).to_string())),
            },
            Cast::Custom(handler) => return handler.uncast(attribute, value),
            Cast::Named(name) => return Err(LucidError::UnknownCast(name.clone())),
        };
        stored.ok_or_else(|| LucidError::Cast {
            attribute: attribute.to_string(),
            message: format!("cannot store {value:?} as {self:?}"),
        })
    }
}

/// Named custom casts
#[derive(Default, Clone)]
pub struct CastRegistry {
    handlers: HashMap<String, Arc<dyn CastHandler>>,
}

impl CastRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, handler: Arc<dyn CastHandler>) {
        self.handlers.insert(name.into(), handler);
    }

    /// Turn a `Named` cast into the registered handler
    ///
    /// Every name that is neither built in nor registered fails with
    /// `UnknownCast`.
    pub fn resolve(&self, cast: &Cast) -> Result<Cast> {
        match cast {
            Cast::Named(name) => self
                .handlers
                .get(name)
                .map(|h| Cast::Custom(Arc::clone(h)))
                .ok_or_else(|| LucidError::UnknownCast(name.clone())),
            other => Ok(other.clone()),
        }
    }
}

impl fmt::Debug for CastRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CastRegistry")
            .field("handlers", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Upper;

    impl CastHandler for Upper {
        fn cast(&self, _attribute: &str, value: &Value) -> Result<Value> {
            Ok(Value::from(String::from_value(value).unwrap_or_default().to_uppercase()))
        }

        fn uncast(&self, _attribute: &str, value: &Value) -> Result<Value> {
            Ok(Value::from(String::from_value(value).unwrap_or_default().to_lowercase()))
        }
    }

    #[test]
    fn test_builtin_names_and_aliases() {
        assert!(matches!(Cast::builtin("JSON"), Some(Cast::Json)));
        assert!(matches!(Cast::builtin("array"), Some(Cast::Json)));
        assert!(matches!(Cast::builtin("object"), Some(Cast::Json)));
        assert!(Cast::builtin("money").is_none());
        assert!(matches!(Cast::parse("money"), Cast::Named(_)));
    }

    #[test]
    fn test_boolean_round_trip_through_storage() {
        let stored = Cast::Boolean.uncast("active", &Value::from(true)).unwrap();
        assert_eq!(stored, Value::from(1i64));
        assert_eq!(Cast::Boolean.cast("active", &stored).unwrap(), Value::from(true));
    }

    #[test]
    fn test_date_and_json_casts() {
        let stored = Cast::Date
            .uncast("born", &Value::from(NaiveDate::from_ymd_opt(2024, 12, 25).unwrap()))
            .unwrap();
        assert_eq!(stored, Value::from("2024-12-25"));
        assert_eq!(
            Cast::Date.cast("born", &stored).unwrap(),
            Value::from(NaiveDate::from_ymd_opt(2024, 12, 25).unwrap())
        );

        let stored = Cast::Json
            .uncast("tags", &Value::from(serde_json::json!(["a", "b"])))
            .unwrap();
        assert_eq!(stored, Value::from(r#"["a","b"]"#));
        assert_eq!(
            Cast::Json.cast("tags", &stored).unwrap(),
            Value::from(serde_json::json!(["a", "b"]))
        );
    }

    #[test]
    fn test_null_passes_through_and_bad_values_fail() {
        assert!(value::is_null(&Cast::Integer.cast("n", &value::null()).unwrap()));
        let err = Cast::Integer.cast("n", &Value::from("abc")).unwrap_err();
        assert!(matches!(err, LucidError::Cast { .. }));
    }

    #[test]
    fn test_registry_resolves_or_fails_uniformly() {
        let mut registry = CastRegistry::new();
        registry.register("upper", Arc::new(Upper));

        let cast = registry.resolve(&Cast::parse("upper")).unwrap();
        assert_eq!(cast.cast("name", &Value::from("ada")).unwrap(), Value::from("ADA"));
        assert_eq!(cast.uncast("name", &Value::from("ADA")).unwrap(), Value::from("ada"));

        let err = registry.resolve(&Cast::parse("money")).unwrap_err();
        assert!(matches!(err, LucidError::UnknownCast(name) if name == "money"));
        assert!(matches!(
            Cast::Named("money".into()).cast("x", &Value::from(1i32)),
            Err(LucidError::UnknownCast(_))
        ));
    }
}
