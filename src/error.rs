//! Error type shared by the compiler, the connection layer and the loaders.

use sea_query::Value;
use std::fmt;

/// Classification of a backend failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbErrorKind {
    /// Unique or primary key conflict
    DuplicateKey,
    /// Any other constraint (foreign key, not null, check)
    Constraint,
    /// SQL could not be parsed or references unknown objects
    Syntax,
    /// Connection refused, closed or busy
    Connection,
    /// Anything the driver did not classify
    Other,
}

/// Crate error type
#[derive(Debug)]
pub enum LucidError {
    /// Backend failure, carrying the statement that caused it
    Database {
        kind: DbErrorKind,
        message: String,
        sql: Option<String>,
        bindings: Vec<Value>,
    },
    /// The query could not be compiled
    Query(String),
    /// A builder or terminal verb received an argument it cannot use
    InvalidArgument(String),
    /// The model has no relation with this name
    UnknownRelation { model: String, relation: String },
    /// No model is registered under this name or morph label
    UnknownModel(String),
    /// No cast is registered under this name
    UnknownCast(String),
    /// A cast or uncast transform failed on a value
    Cast { attribute: String, message: String },
    /// The relation kind does not support the requested operation
    Unsupported(String),
    /// A `*_or_fail` lookup found nothing
    NotFound(String),
    /// Row decoding or serialization failure
    Parse(String),
}

impl LucidError {
    /// Database error without statement context (connection setup, BEGIN, ...)
    pub fn database(kind: DbErrorKind, message: impl Into<String>) -> Self {
        LucidError::Database {
            kind,
            message: message.into(),
            sql: None,
            bindings: Vec::new(),
        }
    }

    /// Attach the failing statement to a database error
    pub fn with_statement(self, statement: &str, values: &[Value]) -> Self {
        match self {
            LucidError::Database {
                kind,
                message,
                sql: None,
                ..
            } => LucidError::Database {
                kind,
                message,
                sql: Some(statement.to_string()),
                bindings: values.to_vec(),
            },
            other => other,
        }
    }

    /// Backend kind, when this is a database error
    pub fn db_kind(&self) -> Option<DbErrorKind> {
        match self {
            LucidError::Database { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    pub fn is_duplicate_key(&self) -> bool {
        self.db_kind() == Some(DbErrorKind::DuplicateKey)
    }
}

impl fmt::Display for LucidError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LucidError::Database {
                kind,
                message,
                sql,
                bindings,
            } => {
                write!(f, "Database error ({kind:?}): {message}")?;
                if let Some(sql) = sql {
                    write!(f, " [sql: {sql}; bindings: {bindings:?}]")?;
                }
                Ok(())
            }
            LucidError::Query(s) => write!(f, "Query error: {s}"),
            LucidError::InvalidArgument(s) => write!(f, "Invalid argument: {s}"),
            LucidError::UnknownRelation { model, relation } => {
                write!(f, "Model {model} has no relation named \"{relation}\"")
            }
            LucidError::UnknownModel(name) => write!(f, "Unknown model: {name}"),
            LucidError::UnknownCast(name) => write!(f, "Unknown cast type: {name}"),
            LucidError::Cast { attribute, message } => {
                write!(f, "Cast error on {attribute}: {message}")
            }
            LucidError::Unsupported(s) => write!(f, "Unsupported: {s}"),
            LucidError::NotFound(s) => write!(f, "Not found: {s}"),
            LucidError::Parse(s) => write!(f, "Parse error: {s}"),
        }
    }
}

impl std::error::Error for LucidError {}

impl From<serde_json::Error> for LucidError {
    fn from(err: serde_json::Error) -> Self {
        LucidError::Parse(err.to_string())
    }
}

/// Crate result alias
pub type Result<T, E = LucidError> = std::result::Result<T, E>;
