//! # Lucid
//!
//! Fluent SQL query builder and model layer with batched relation loading.
//!
//! - [`Query`] compiles a table-bound fluent chain into SQL with `?`
//!   placeholders and a positional binding list, and runs it through any
//!   [`Connection`].
//! - [`ModelDef`] and [`Registry`] describe models: table, primary key,
//!   attribute casts, hidden fields and relations.
//! - [`Builder`] runs model queries, hydrates [`Entity`] values and resolves
//!   `with`/`with_count` preloads with one query per relation path.
//!
//! SQLite support ships through [`connection::sqlite`] (feature `sqlite`).

mod macros;

pub mod builder;
pub mod collection;
pub mod config;
pub mod connection;
pub mod error;
pub mod metrics;
pub mod model;
pub mod query;
pub mod relation;
pub mod value;

pub use builder::Builder;
pub use collection::Collection;
pub use config::DatabaseConfig;
pub use connection::{Connection, ExecResult, Row};
pub use error::{DbErrorKind, LucidError, Result};
pub use model::{Entity, ModelDef, Registry, Related};
pub use query::{Op, Paginator, Query};
pub use value::Record;

pub use sea_query;
