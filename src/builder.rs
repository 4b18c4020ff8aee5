//! Model-aware query builder.
//!
//! A [`Builder`] wraps a [`Query`] bound to one registered model. Terminal
//! verbs hydrate rows into [`Entity`] values and then run the requested
//! preloads through the [`RelationLoader`], one batched query per relation
//! path.
//!
//! # Example
//!
//! ```no_run
//! use lucid::connection::sqlite::SqliteConnection;
//! use lucid::relation::Preload;
//! use lucid::{Builder, ModelDef, Op, Registry};
//!
//! # fn main() -> lucid::Result<()> {
//! let registry = Registry::new()
//!     .register(ModelDef::new("User", "users").has_many("posts", "Post", "user_id"))?
//!     .register(ModelDef::new("Post", "posts").has_many("comments", "Comment", "post_id"))?
//!     .register(ModelDef::new("Comment", "comments"))?
//!     .into_shared();
//! let conn = SqliteConnection::open_in_memory()?;
//!
//! let users = Builder::new(&registry, "User")?
//!     .where_("active", Op::Eq, 1)
//!     .with(["posts.comments"])?
//!     .with_count([Preload::constrained("posts", |q| q.where_eq("draft", 0))])?
//!     .all(&conn)?;
//! # Ok(())
//! # }
//! ```

use crate::collection::Collection;
use crate::connection::{Connection, Row};
use crate::error::{LucidError, Result};
use crate::macros::delegate_query;
use crate::model::{Entity, ModelDef, Registry};
use crate::query::{Clause, Compiled, Condition, Op, Paginator, Query};
use crate::relation::handler::RelationHandler;
use crate::relation::{Preload, RelationKind, RelationLoader};
use crate::value::Record;
use chrono::Duration;
use sea_query::{Order, Value};
use std::ops::ControlFlow;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct Builder {
    registry: Arc<Registry>,
    model: Arc<ModelDef>,
    query: Query,
    preloads: Vec<Preload>,
    counts: Vec<Preload>,
    extra_columns: Vec<String>,
}

impl Builder {
    /// Builder over the table of a registered model
    pub fn new(registry: &Arc<Registry>, model: &str) -> Result<Self> {
        let model = registry.model(model)?;
        let query = Query::table(model.table());
        Ok(Self::from_query(registry, model, query))
    }

    pub(crate) fn from_query(registry: &Arc<Registry>, model: Arc<ModelDef>, query: Query) -> Self {
        Self {
            registry: Arc::clone(registry),
            model,
            query,
            preloads: Vec::new(),
            counts: Vec::new(),
            extra_columns: Vec::new(),
        }
    }

    /// Selected aliases hydrated into extras rather than attributes
    pub(crate) fn with_extra_columns(mut self, columns: Vec<String>) -> Self {
        self.extra_columns = columns;
        self
    }

    pub fn model(&self) -> &Arc<ModelDef> {
        &self.model
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn into_query(self) -> Query {
        self.query
    }

    /// Apply arbitrary `Query` methods
    pub fn map_query(mut self, f: impl FnOnce(Query) -> Query) -> Self {
        self.query = f(self.query);
        self
    }

    delegate_query! {
        fn select(columns: impl IntoIterator<Item = impl Into<String>>);
        fn select_raw(sql: impl Into<String>, bindings: Vec<Value>);
        fn distinct();
        fn join(table: &str, left: &str, op: Op, right: &str);
        fn left_join(table: &str, left: &str, op: Op, right: &str);
        fn right_join(table: &str, left: &str, op: Op, right: &str);
        fn where_(column: &str, op: Op, value: impl Into<Value>);
        fn or_where(column: &str, op: Op, value: impl Into<Value>);
        fn where_eq(column: &str, value: impl Into<Value>);
        fn where_column(left: &str, op: Op, right: &str);
        fn or_where_column(left: &str, op: Op, right: &str);
        fn where_sub(column: &str, op: Op, query: Query);
        fn where_in(column: &str, values: impl IntoIterator<Item = impl Into<Value>>);
        fn or_where_in(column: &str, values: impl IntoIterator<Item = impl Into<Value>>);
        fn where_not_in(column: &str, values: impl IntoIterator<Item = impl Into<Value>>);
        fn or_where_not_in(column: &str, values: impl IntoIterator<Item = impl Into<Value>>);
        fn where_in_sub(column: &str, query: Query);
        fn where_not_in_sub(column: &str, query: Query);
        fn where_exists(query: Query);
        fn or_where_exists(query: Query);
        fn where_not_exists(query: Query);
        fn where_null(column: &str);
        fn or_where_null(column: &str);
        fn where_not_null(column: &str);
        fn or_where_not_null(column: &str);
        fn where_true(column: &str);
        fn where_false(column: &str);
        fn where_between(column: &str, low: impl Into<Value>, high: impl Into<Value>);
        fn where_not_between(column: &str, low: impl Into<Value>, high: impl Into<Value>);
        fn where_raw(sql: impl Into<String>, bindings: Vec<Value>);
        fn or_where_raw(sql: impl Into<String>, bindings: Vec<Value>);
        fn where_group(build: impl FnOnce(Query) -> Query);
        fn or_where_group(build: impl FnOnce(Query) -> Query);
        fn where_not_group(build: impl FnOnce(Query) -> Query);
        fn search(columns: impl IntoIterator<Item = impl Into<String>>, term: impl Into<String>);
        fn where_date(column: &str, op: Op, value: impl Into<Value>);
        fn where_year(column: &str, op: Op, year: i32);
        fn where_day(column: &str, op: Op, day: u32);
        fn where_time(column: &str, op: Op, value: impl Into<Value>);
        fn where_today(column: &str);
        fn where_yesterday(column: &str);
        fn where_tomorrow(column: &str);
        fn this_week(column: &str);
        fn last_week(column: &str);
        fn this_month(column: &str);
        fn last_month(column: &str);
        fn this_year(column: &str);
        fn last_year(column: &str);
        fn older_than(column: &str, age: Duration);
        fn newer_than(column: &str, age: Duration);
        fn weekdays(column: &str);
        fn weekends(column: &str);
        fn group_by(columns: impl IntoIterator<Item = impl Into<String>>);
        fn having(column: &str, op: Op, value: impl Into<Value>);
        fn or_having(column: &str, op: Op, value: impl Into<Value>);
        fn having_raw(sql: impl Into<String>, bindings: Vec<Value>);
        fn order_by(column: &str, order: Order);
        fn latest(column: &str);
        fn order_by_raw(sql: impl Into<String>);
        fn limit(limit: u64);
        fn offset(offset: u64);
        fn for_page(page: u64, per_page: u64);
        fn for_update();
        fn skip_locked();
        fn no_wait();
        fn for_share();
    }

    /// `MONTH(col) op ?`; fails on an unknown month
    pub fn where_month(
        mut self,
        column: &str,
        op: Op,
        month: impl crate::query::dates::IntoMonth,
    ) -> Result<Self> {
        self.query = self.query.where_month(column, op, month)?;
        Ok(self)
    }

    pub fn where_between_list<V: Into<Value>>(mut self, column: &str, bounds: Vec<V>) -> Result<Self> {
        self.query = self.query.where_between_list(column, bounds)?;
        Ok(self)
    }

    // --- eager loading ---

    /// Relations to load after the main query, replacing earlier `with` calls
    ///
    /// # Errors
    ///
    /// `UnknownRelation` for a segment the model (or, for nested segments, a
    /// statically known related model) does not declare.
    pub fn with<I, P>(mut self, preloads: I) -> Result<Self>
    where
        I: IntoIterator<Item = P>,
        P: Into<Preload>,
    {
        let preloads: Vec<Preload> = preloads.into_iter().map(Into::into).collect();
        for preload in &preloads {
            self.validate_path(preload.path())?;
        }
        self.preloads = preloads;
        Ok(self)
    }

    /// hasMany relations to count into `<relation>_count`, replacing earlier
    /// `with_count` calls
    pub fn with_count<I, P>(mut self, preloads: I) -> Result<Self>
    where
        I: IntoIterator<Item = P>,
        P: Into<Preload>,
    {
        let preloads: Vec<Preload> = preloads.into_iter().map(Into::into).collect();
        let handler = RelationHandler::new(&self.registry, &self.model);
        for preload in &preloads {
            let name = preload.path();
            if name.contains('.') {
                return Err(LucidError::InvalidArgument(format!(
                    "with_count takes a single relation, got {name}"
                )));
            }
            let kind = handler.spec(name)?.kind();
            if kind != RelationKind::HasMany {
                return Err(LucidError::Unsupported(format!(
                    "with_count on {kind:?} relation {name}"
                )));
            }
        }
        self.counts = preloads;
        Ok(self)
    }

    fn validate_path(&self, path: &str) -> Result<()> {
        let mut model = Some(Arc::clone(&self.model));
        for segment in path.split('.') {
            // Past a morphTo the target model is only known per row
            let Some(current) = model else {
                break;
            };
            let spec = RelationHandler::new(&self.registry, &current).spec(segment)?;
            model = match spec.related() {
                Some(related) => Some(self.registry.model(related)?),
                None => None,
            };
        }
        Ok(())
    }

    // --- relation existence ---

    fn existence(
        &self,
        model: &ModelDef,
        outer: &str,
        path: &str,
        constraint: Option<&dyn Fn(Query) -> Query>,
        count: Option<(Op, i64)>,
        negated: bool,
    ) -> Result<Condition> {
        let handler = RelationHandler::new(&self.registry, model);
        match path.split_once('.') {
            None => {
                let (query, _) = handler.correlated(path, constraint, outer)?;
                Ok(match count {
                    Some((op, count)) => Condition::SubqueryCount {
                        query: Box::new(query.clear_select().select_raw("COUNT(*)", Vec::new())),
                        op,
                        count,
                    },
                    None => Condition::Exists {
                        query: Box::new(query),
                        negated,
                    },
                })
            }
            Some((head, rest)) => {
                let related = handler.spec(head)?.related().ok_or_else(|| {
                    LucidError::Unsupported(format!("nested existence check through morphTo {head}"))
                })?;
                let related = self.registry.model(related)?;
                let (query, reference) = handler.correlated(head, None, outer)?;
                let inner = self.existence(&related, &reference, rest, constraint, count, false)?;
                let query = query.push_where(Clause::and(inner));
                Ok(Condition::Exists {
                    query: Box::new(query),
                    negated,
                })
            }
        }
    }

    fn push_existence(
        mut self,
        clause: fn(Condition) -> Clause,
        path: &str,
        constraint: Option<&dyn Fn(Query) -> Query>,
        count: Option<(Op, i64)>,
        negated: bool,
    ) -> Result<Self> {
        let outer = self.query.alias.clone().unwrap_or_else(|| self.model.table().to_string());
        let condition = self.existence(&self.model, &outer, path, constraint, count, negated)?;
        self.query = self.query.push_where(clause(condition));
        Ok(self)
    }

    /// Rows with at least one related row (`EXISTS`)
    pub fn has(self, relation: &str) -> Result<Self> {
        self.push_existence(Clause::and, relation, None, None, false)
    }

    /// Rows whose related row count satisfies `op count`
    pub fn has_count(self, relation: &str, op: Op, count: i64) -> Result<Self> {
        self.push_existence(Clause::and, relation, None, Some((op, count)), false)
    }

    /// Rows with a related row matching the constraint
    pub fn where_has(self, relation: &str, constraint: impl Fn(Query) -> Query) -> Result<Self> {
        self.push_existence(Clause::and, relation, Some(&constraint), None, false)
    }

    pub fn where_has_count(
        self,
        relation: &str,
        constraint: impl Fn(Query) -> Query,
        op: Op,
        count: i64,
    ) -> Result<Self> {
        self.push_existence(Clause::and, relation, Some(&constraint), Some((op, count)), false)
    }

    pub fn or_has(self, relation: &str) -> Result<Self> {
        self.push_existence(Clause::or, relation, None, None, false)
    }

    pub fn or_where_has(self, relation: &str, constraint: impl Fn(Query) -> Query) -> Result<Self> {
        self.push_existence(Clause::or, relation, Some(&constraint), None, false)
    }

    /// Rows without any related row (`NOT EXISTS`)
    pub fn doesnt_have(self, relation: &str) -> Result<Self> {
        self.push_existence(Clause::and, relation, None, None, true)
    }

    pub fn where_doesnt_have(
        self,
        relation: &str,
        constraint: impl Fn(Query) -> Query,
    ) -> Result<Self> {
        self.push_existence(Clause::and, relation, Some(&constraint), None, true)
    }

    // --- terminal verbs ---

    fn hydrate(&self, rows: Vec<Row>) -> Vec<Entity> {
        rows.into_iter()
            .map(|row| {
                Entity::hydrate_with_extras(Arc::clone(&self.model), row, &self.extra_columns)
            })
            .collect()
    }

    fn eager_load(&self, conn: &dyn Connection, entities: &mut [Entity]) -> Result<()> {
        if self.preloads.is_empty() && self.counts.is_empty() {
            return Ok(());
        }
        let loader = RelationLoader::new(&self.registry, conn);
        loader.load(entities, &self.preloads)?;
        loader.load_counts(entities, &self.counts)
    }

    /// Every matching entity, with preloads applied
    pub fn all(&self, conn: &dyn Connection) -> Result<Collection> {
        let mut entities = self.hydrate(self.query.all(conn)?);
        self.eager_load(conn, &mut entities)?;
        Ok(Collection::from(entities))
    }

    pub fn first(&self, conn: &dyn Connection) -> Result<Option<Entity>> {
        let Some(row) = self.query.first(conn)? else {
            return Ok(None);
        };
        let mut entities = self.hydrate(vec![row]);
        self.eager_load(conn, &mut entities)?;
        Ok(entities.pop())
    }

    /// Entity by primary key
    pub fn find(&self, conn: &dyn Connection, key: impl Into<Value>) -> Result<Option<Entity>> {
        let mut scoped = self.clone();
        scoped.query = scoped.query.where_eq(&self.model.qualified_key(), key);
        scoped.first(conn)
    }

    pub fn first_or_fail(&self, conn: &dyn Connection) -> Result<Entity> {
        self.first(conn)?
            .ok_or_else(|| LucidError::NotFound(format!("no {} matches the query", self.model.name())))
    }

    pub fn find_or_fail(&self, conn: &dyn Connection, key: impl Into<Value>) -> Result<Entity> {
        let key = key.into();
        self.find(conn, key.clone())?
            .ok_or_else(|| LucidError::NotFound(format!("{} with key {key:?}", self.model.name())))
    }

    pub fn paginate(
        &self,
        conn: &dyn Connection,
        per_page: u64,
        page: u64,
    ) -> Result<Paginator<Collection>> {
        let mut page = self
            .query
            .paginate(conn, per_page, page)?
            .map(|rows| Collection::from(self.hydrate(rows)));
        self.eager_load(conn, page.items_mut().as_mut_slice())?;
        Ok(page)
    }

    /// Hydrated chunks of `size` entities, preloads applied per chunk
    pub fn chunk<F>(&self, conn: &dyn Connection, size: u64, mut f: F) -> Result<()>
    where
        F: FnMut(Collection) -> ControlFlow<()>,
    {
        let mut failure = None;
        self.query.chunk(conn, size, |rows| {
            let mut entities = self.hydrate(rows);
            if let Err(err) = self.eager_load(conn, &mut entities) {
                failure = Some(err);
                return ControlFlow::Break(());
            }
            f(Collection::from(entities))
        })?;
        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Stream entities one at a time
    ///
    /// # Errors
    ///
    /// `InvalidArgument` when preloads are set: a cursor never holds a batch
    /// to load relations into.
    pub fn cursor<F>(&self, conn: &dyn Connection, mut f: F) -> Result<()>
    where
        F: FnMut(Entity) -> ControlFlow<()>,
    {
        if !self.preloads.is_empty() || !self.counts.is_empty() {
            return Err(LucidError::InvalidArgument(
                "cursor cannot be combined with with/with_count".into(),
            ));
        }
        self.query
            .cursor(conn, |row| {
                f(Entity::hydrate_with_extras(Arc::clone(&self.model), row, &self.extra_columns))
            })
    }

    pub fn count(&self, conn: &dyn Connection) -> Result<u64> {
        self.query.count(conn)
    }

    pub fn exists(&self, conn: &dyn Connection) -> Result<bool> {
        self.query.exists(conn)
    }

    /// Insert a new entity from `attributes` (casts applied)
    pub fn create(&self, conn: &dyn Connection, attributes: Record) -> Result<Entity> {
        let mut entity = Entity::new(Arc::clone(&self.model));
        entity.fill(attributes)?;
        entity.save(conn)?;
        Ok(entity)
    }

    pub fn update(&self, conn: &dyn Connection, record: Record) -> Result<u64> {
        self.query.update(conn, record)
    }

    pub fn delete(&self, conn: &dyn Connection) -> Result<u64> {
        self.query.delete(conn)
    }

    pub fn to_sql(&self) -> Result<Compiled> {
        self.query.to_sql()
    }
}
