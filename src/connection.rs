//! Connection abstraction.
//!
//! Provides the `Connection` trait every terminal verb executes through. The
//! compiler only ever hands it SQL with `?` placeholders and a positional
//! binding list, and gets back ordered field-name → value rows.
//!
//! Implementations:
//! - [`sqlite::SqliteConnection`] (feature `sqlite`) - rusqlite-backed driver
//! - [`mock::MockConnection`] (feature `mock`) - scripted results for tests

use crate::error::{DbErrorKind, Result};
use crate::value::{self, FromValue, Record};
use indexmap::IndexMap;
use sea_query::Value;
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::ops::ControlFlow;

#[cfg(any(test, feature = "mock"))]
pub mod mock;
#[cfg(feature = "sqlite")]
pub mod sqlite;

/// One result row: field names in select order, each with its value
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    fields: IndexMap<String, Value>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a field, replacing an earlier field with the same name
    pub fn push(&mut self, name: impl Into<String>, value: Value) {
        self.fields.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Typed access, `None` when the field is missing, NULL or not convertible
    pub fn get_as<T: FromValue>(&self, name: &str) -> Option<T> {
        self.get(name).and_then(T::from_value)
    }

    /// Value of the field at `index` in select order
    pub fn get_index(&self, index: usize) -> Option<&Value> {
        self.fields.get_index(index).map(|(_, v)| v)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn into_record(self) -> Record {
        self.fields
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.fields
                .iter()
                .map(|(k, v)| (k.clone(), value::to_json(v)))
                .collect(),
        )
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, &value::to_json(value))?;
        }
        map.end()
    }
}

impl From<Record> for Row {
    fn from(fields: Record) -> Self {
        Self { fields }
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

/// Outcome of a write statement
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecResult {
    pub rows_affected: u64,
    /// Auto-increment id generated by an INSERT, when the backend reports one
    pub last_insert_id: Option<i64>,
}

/// Trait for executing compiled statements
///
/// Errors are returned as `LucidError::Database` with the offending SQL and
/// bindings attached. Implementations never retry.
pub trait Connection {
    /// Run a SELECT and materialize every row
    fn select(&self, sql: &str, bindings: &[Value]) -> Result<Vec<Row>>;

    /// Run an INSERT/UPDATE/DELETE (or DDL)
    fn execute(&self, sql: &str, bindings: &[Value]) -> Result<ExecResult>;

    /// Run a SELECT and feed rows to `sink` one at a time as the driver
    /// produces them. Returning `ControlFlow::Break` stops fetching and
    /// releases the statement.
    fn stream(
        &self,
        sql: &str,
        bindings: &[Value],
        sink: &mut dyn FnMut(Row) -> ControlFlow<()>,
    ) -> Result<()>;

    /// Id generated by the most recent INSERT on this connection
    fn last_insert_id(&self) -> Option<i64>;

    fn begin(&self) -> Result<()> {
        self.execute("BEGIN", &[]).map(|_| ())
    }

    fn commit(&self) -> Result<()> {
        self.execute("COMMIT", &[]).map(|_| ())
    }

    fn rollback(&self) -> Result<()> {
        self.execute("ROLLBACK", &[]).map(|_| ())
    }
}

/// Run `f` between BEGIN and COMMIT, rolling back when it fails
///
/// This is a pass-through boundary: no retry, no isolation management.
///
/// # Example
///
/// ```no_run
/// use lucid::{connection::transaction, Connection, Query};
///
/// # fn example(conn: &dyn Connection) -> lucid::Result<()> {
/// transaction(conn, |conn| {
///     Query::table("accounts").where_eq("id", 1).decrement(conn, "balance", 10)?;
///     Query::table("accounts").where_eq("id", 2).increment(conn, "balance", 10)?;
///     Ok(())
/// })?;
/// # Ok(())
/// # }
/// ```
pub fn transaction<T, F>(conn: &dyn Connection, f: F) -> Result<T>
where
    F: FnOnce(&dyn Connection) -> Result<T>,
{
    conn.begin()?;
    match f(conn) {
        Ok(value) => {
            conn.commit()?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = conn.rollback() {
                log::error!("rollback failed after {err}: {rollback_err}");
            }
            Err(err)
        }
    }
}

/// Classify a driver message when no error code is available
pub(crate) fn classify_message(message: &str) -> DbErrorKind {
    let msg = message.to_lowercase();
    if msg.contains("duplicate") || msg.contains("unique constraint") {
        DbErrorKind::DuplicateKey
    } else if msg.contains("constraint") {
        DbErrorKind::Constraint
    } else if msg.contains("syntax") || msg.contains("no such") {
        DbErrorKind::Syntax
    } else if msg.contains("connection") || msg.contains("refused") {
        DbErrorKind::Connection
    } else {
        DbErrorKind::Other
    }
}
