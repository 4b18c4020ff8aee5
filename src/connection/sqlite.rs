//! rusqlite-backed connection.
//!
//! The compiler emits MySQL-style SQL. SQLite already accepts backtick
//! identifiers and `?` placeholders, so the driver only has to bridge a few
//! gaps before each statement runs:
//!
//! - `INSERT IGNORE INTO` becomes `INSERT OR IGNORE INTO`
//! - the offset-only `LIMIT 18446744073709551615` becomes `LIMIT -1`
//! - trailing lock clauses (`FOR UPDATE`, `FOR SHARE`, ...) are dropped;
//!   SQLite serializes writers at the database level
//! - `YEAR`, `MONTH`, `DAY` and `DAYOFWEEK` are registered as SQL functions
//!   (`DATE` and `TIME` are built in)

use super::{classify_message, Connection, ExecResult, Row};
use crate::config::DatabaseConfig;
use crate::error::{DbErrorKind, LucidError, Result};
use crate::value::{self, parse_date, DATETIME_FORMAT, DATE_FORMAT, TIME_FORMAT};
use chrono::Datelike;
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::functions::{Context, FunctionFlags};
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{ffi, params_from_iter, ErrorCode};
use sea_query::Value;
use std::borrow::Cow;
use std::cell::RefCell;
use std::ops::ControlFlow;
use std::time::{Duration, Instant};

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;
#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

static LOCK_CLAUSE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\s+FOR (?:UPDATE(?: SKIP LOCKED| NOWAIT)?|SHARE)$").expect("lock clause regex")
});

const UNBOUNDED_LIMIT: &str = " LIMIT 18446744073709551615";

impl From<rusqlite::Error> for LucidError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(code, message) => {
                let message = message.clone().unwrap_or_else(|| code.to_string());
                let kind = match code.code {
                    ErrorCode::ConstraintViolation
                        if code.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
                            || code.extended_code == ffi::SQLITE_CONSTRAINT_PRIMARYKEY =>
                    {
                        DbErrorKind::DuplicateKey
                    }
                    ErrorCode::ConstraintViolation => DbErrorKind::Constraint,
                    ErrorCode::CannotOpen
                    | ErrorCode::DatabaseBusy
                    | ErrorCode::DatabaseLocked
                    | ErrorCode::NotADatabase => DbErrorKind::Connection,
                    _ => classify_message(&message),
                };
                LucidError::database(kind, message)
            }
            other => {
                let message = other.to_string();
                LucidError::database(classify_message(&message), message)
            }
        }
    }
}

/// A single SQLite connection
///
/// # Example
///
/// ```
/// use lucid::connection::sqlite::SqliteConnection;
/// use lucid::{Connection, Query};
///
/// let conn = SqliteConnection::open_in_memory().unwrap();
/// conn.execute_batch("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)").unwrap();
/// Query::table("users").insert(&conn, lucid::record! { "name" => "ada" }).unwrap();
/// assert_eq!(Query::table("users").count(&conn).unwrap(), 1);
/// ```
pub struct SqliteConnection {
    conn: rusqlite::Connection,
    slow_query_threshold: Duration,
    query_log: RefCell<Option<Vec<(String, Vec<Value>)>>>,
}

impl SqliteConnection {
    /// Open a private in-memory database
    pub fn open_in_memory() -> Result<Self> {
        Self::from_rusqlite(rusqlite::Connection::open_in_memory()?)
    }

    pub fn open(path: &str) -> Result<Self> {
        Self::from_rusqlite(rusqlite::Connection::open(path)?)
    }

    /// Open the database named by the configuration
    pub fn connect(config: &DatabaseConfig) -> Result<Self> {
        let mut conn = if config.url == ":memory:" {
            Self::open_in_memory()?
        } else {
            Self::open(&config.url)?
        };
        conn.slow_query_threshold = config.slow_query_threshold();
        if config.log_queries {
            conn.enable_query_log();
        }
        log::debug!("connected to sqlite database {}", config.url);
        Ok(conn)
    }

    fn from_rusqlite(conn: rusqlite::Connection) -> Result<Self> {
        register_functions(&conn)?;
        Ok(Self {
            conn,
            slow_query_threshold: DatabaseConfig::default().slow_query_threshold(),
            query_log: RefCell::new(None),
        })
    }

    /// Run several `;`-separated statements without bindings (schema setup)
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        self.conn.execute_batch(sql).map_err(LucidError::from)
    }

    /// Start recording every statement with its bindings
    pub fn enable_query_log(&self) {
        self.query_log.borrow_mut().get_or_insert_with(Vec::new);
    }

    /// Statements recorded since the log was enabled or last cleared
    pub fn query_log(&self) -> Vec<(String, Vec<Value>)> {
        self.query_log.borrow().clone().unwrap_or_default()
    }

    pub fn clear_query_log(&self) {
        if let Some(log) = self.query_log.borrow_mut().as_mut() {
            log.clear();
        }
    }

    /// The underlying rusqlite handle
    pub fn inner(&self) -> &rusqlite::Connection {
        &self.conn
    }

    fn run<T>(
        &self,
        sql: &str,
        bindings: &[Value],
        f: impl FnOnce(&str, Vec<SqlValue>) -> Result<T>,
    ) -> Result<T> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::execute_query_span(sql).entered();

        log::debug!("{sql} {bindings:?}");
        if let Some(log) = self.query_log.borrow_mut().as_mut() {
            log.push((sql.to_string(), bindings.to_vec()));
        }

        let start = Instant::now();
        let result = bindings
            .iter()
            .map(to_sql_value)
            .collect::<Result<Vec<_>>>()
            .and_then(|params| f(&translate(sql), params))
            .map_err(|e| {
                #[cfg(feature = "metrics")]
                METRICS.record_query_error();
                e.with_statement(sql, bindings)
            });

        let elapsed = start.elapsed();
        #[cfg(feature = "metrics")]
        METRICS.record_query_duration(elapsed);
        if elapsed >= self.slow_query_threshold {
            log::warn!("slow query ({} ms): {sql}", elapsed.as_millis());
        }

        result
    }
}

impl Connection for SqliteConnection {
    fn select(&self, sql: &str, bindings: &[Value]) -> Result<Vec<Row>> {
        let mut rows = Vec::new();
        self.stream(sql, bindings, &mut |row| {
            rows.push(row);
            ControlFlow::Continue(())
        })?;
        Ok(rows)
    }

    fn execute(&self, sql: &str, bindings: &[Value]) -> Result<ExecResult> {
        self.run(sql, bindings, |sql, params| {
            let changed = self.conn.execute(sql, params_from_iter(params))?;
            let last_insert_id = if changed > 0 && sql.starts_with("INSERT") {
                Some(self.conn.last_insert_rowid())
            } else {
                None
            };
            Ok(ExecResult {
                rows_affected: changed as u64,
                last_insert_id,
            })
        })
    }

    fn stream(
        &self,
        sql: &str,
        bindings: &[Value],
        sink: &mut dyn FnMut(Row) -> ControlFlow<()>,
    ) -> Result<()> {
        self.run(sql, bindings, |sql, params| {
            let mut stmt = self.conn.prepare(sql)?;
            let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
            let mut rows = stmt.query(params_from_iter(params))?;
            while let Some(raw) = rows.next()? {
                let mut row = Row::new();
                for (i, name) in names.iter().enumerate() {
                    row.push(name.as_str(), from_value_ref(raw.get_ref(i)?));
                }
                if sink(row).is_break() {
                    break;
                }
            }
            Ok(())
        })
    }

    fn last_insert_id(&self) -> Option<i64> {
        match self.conn.last_insert_rowid() {
            0 => None,
            id => Some(id),
        }
    }
}

/// Rewrite the MySQL-only parts of a statement
fn translate(sql: &str) -> Cow<'_, str> {
    let mut out = Cow::Borrowed(sql);
    if out.starts_with("INSERT IGNORE INTO") {
        out = Cow::Owned(out.replacen("INSERT IGNORE INTO", "INSERT OR IGNORE INTO", 1));
    }
    if out.contains(UNBOUNDED_LIMIT) {
        out = Cow::Owned(out.replace(UNBOUNDED_LIMIT, " LIMIT -1"));
    }
    if LOCK_CLAUSE.is_match(&out) {
        out = Cow::Owned(LOCK_CLAUSE.replace(&out, "").into_owned());
    }
    out
}

fn to_sql_value(value: &Value) -> Result<SqlValue> {
    if value::is_null(value) {
        return Ok(SqlValue::Null);
    }
    let converted = match value {
        Value::Bool(Some(b)) => SqlValue::Integer(i64::from(*b)),
        Value::TinyInt(Some(i)) => SqlValue::Integer(i64::from(*i)),
        Value::SmallInt(Some(i)) => SqlValue::Integer(i64::from(*i)),
        Value::Int(Some(i)) => SqlValue::Integer(i64::from(*i)),
        Value::BigInt(Some(i)) => SqlValue::Integer(*i),
        Value::TinyUnsigned(Some(u)) => SqlValue::Integer(i64::from(*u)),
        Value::SmallUnsigned(Some(u)) => SqlValue::Integer(i64::from(*u)),
        Value::Unsigned(Some(u)) => SqlValue::Integer(i64::from(*u)),
        Value::BigUnsigned(Some(u)) => match i64::try_from(*u) {
            Ok(i) => SqlValue::Integer(i),
            Err(_) => {
                return Err(LucidError::InvalidArgument(format!(
                    "u64 value {u} exceeds i64::MAX and cannot be bound"
                )))
            }
        },
        Value::Float(Some(f)) => SqlValue::Real(f64::from(*f)),
        Value::Double(Some(d)) => SqlValue::Real(*d),
        Value::String(Some(s)) => SqlValue::Text(s.to_string()),
        Value::Char(Some(c)) => SqlValue::Text(c.to_string()),
        Value::Bytes(Some(b)) => SqlValue::Blob(b.to_vec()),
        Value::Json(Some(j)) => SqlValue::Text(j.to_string()),
        Value::ChronoDate(Some(d)) => SqlValue::Text(d.format(DATE_FORMAT).to_string()),
        Value::ChronoTime(Some(t)) => SqlValue::Text(t.format(TIME_FORMAT).to_string()),
        Value::ChronoDateTime(Some(dt)) => {
            SqlValue::Text(dt.format(DATETIME_FORMAT).to_string())
        }
        Value::ChronoDateTimeUtc(Some(dt)) => {
            SqlValue::Text(dt.format(DATETIME_FORMAT).to_string())
        }
        other => {
            return Err(LucidError::Unsupported(format!(
                "cannot bind {other:?} to sqlite"
            )))
        }
    };
    Ok(converted)
}

fn from_value_ref(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => value::null(),
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Value::from(f),
        ValueRef::Text(t) => Value::from(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::from(b.to_vec()),
    }
}

fn register_functions(conn: &rusqlite::Connection) -> rusqlite::Result<()> {
    let flags = FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC;
    conn.create_scalar_function("YEAR", 1, flags, |ctx| {
        Ok(date_arg(ctx).map(|d| i64::from(d.year())))
    })?;
    conn.create_scalar_function("MONTH", 1, flags, |ctx| {
        Ok(date_arg(ctx).map(|d| i64::from(d.month())))
    })?;
    conn.create_scalar_function("DAY", 1, flags, |ctx| {
        Ok(date_arg(ctx).map(|d| i64::from(d.day())))
    })?;
    // 1 = Sunday ... 7 = Saturday
    conn.create_scalar_function("DAYOFWEEK", 1, flags, |ctx| {
        Ok(date_arg(ctx).map(|d| i64::from(d.weekday().number_from_sunday())))
    })?;
    Ok(())
}

fn date_arg(ctx: &Context<'_>) -> Option<chrono::NaiveDate> {
    match ctx.get_raw(0) {
        ValueRef::Text(t) => std::str::from_utf8(t).ok().and_then(parse_date),
        _ => None,
    }
}
