//! Relations between models.
//!
//! Provides support for defining, querying and eagerly loading relations:
//! - [`spec`]: relation kinds and their key material
//! - [`handler`]: turns a named relation into a query, for one parent (real
//!   mode), for a whole batch (eager mode) or as a correlated existence check
//! - [`loader`]: batched eager loading, one query per relation path
//! - [`pivot`]: attach/detach/sync on pivot tables

pub mod handler;
pub mod loader;
pub mod pivot;
pub mod spec;

pub use handler::{Mode, RelationHandler, RelationQuery};
pub use loader::{Preload, RelationLoader};
pub use pivot::{PivotOps, SyncResult};
pub use spec::{RelationKind, RelationSpec};

use crate::query::Query;
use std::sync::Arc;

/// Callback narrowing a relation query
pub type Constraint = Arc<dyn Fn(Query) -> Query + Send + Sync>;
