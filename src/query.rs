//! Fluent query builder.
//!
//! A [`Query`] accumulates clause descriptors and compiles them on demand into
//! SQL with positional bindings. It never holds a connection: every terminal
//! verb (see [`execution`]) takes the connection it runs on.
//!
//! ```
//! use lucid::{Op, Query};
//!
//! let compiled = Query::table("products")
//!     .where_("color", Op::Eq, "#000")
//!     .or_where("color", Op::Eq, "#FFF")
//!     .to_sql()
//!     .unwrap();
//! assert_eq!(compiled.sql, "SELECT * FROM `products` WHERE `color` = ? OR `color` = ?");
//! ```

pub mod clause;
pub mod compiler;
pub mod dates;
pub mod execution;
pub mod paginator;

pub use clause::{AggregateFn, Clause, Condition, Connector, JoinKind, Lock, Op};
pub use compiler::Compiled;
pub use paginator::Paginator;

use crate::error::{LucidError, Result};
use clause::{Join, OrderExpr, SelectExpr};
use sea_query::{Order, Value};

/// Accumulated SELECT (or UPDATE/DELETE filter) state for one table
#[derive(Debug, Clone, Default)]
pub struct Query {
    pub(crate) table: String,
    pub(crate) alias: Option<String>,
    pub(crate) distinct: bool,
    pub(crate) selects: Vec<SelectExpr>,
    pub(crate) joins: Vec<Join>,
    pub(crate) wheres: Vec<Clause>,
    pub(crate) groups: Vec<String>,
    pub(crate) havings: Vec<Clause>,
    pub(crate) orders: Vec<OrderExpr>,
    pub(crate) limit: Option<u64>,
    pub(crate) offset: Option<u64>,
    pub(crate) lock: Option<Lock>,
}

impl Query {
    pub fn table(name: impl Into<String>) -> Self {
        Self {
            table: name.into(),
            ..Self::default()
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    /// `FROM table AS alias`
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Clear every clause, keeping the table
    pub fn reset(&mut self) {
        *self = Self::table(std::mem::take(&mut self.table));
    }

    /// The WHERE clauses accumulated so far
    pub fn wheres(&self) -> &[Clause] {
        &self.wheres
    }

    pub fn has_order(&self) -> bool {
        !self.orders.is_empty()
    }

    // --- select list ---

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    /// Append columns to the select list (`"users.*"`, `"email as contact"`)
    pub fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.selects
            .extend(columns.into_iter().map(|c| SelectExpr::Column(c.into())));
        self
    }

    /// Append a raw select expression with its own bindings
    pub fn select_raw(mut self, sql: impl Into<String>, bindings: Vec<Value>) -> Self {
        self.selects.push(SelectExpr::Raw {
            sql: sql.into(),
            bindings,
        });
        self
    }

    /// Append `FN(col) AS alias` (`COUNT(*)` when `column` is `None`)
    pub fn select_aggregate(
        mut self,
        func: AggregateFn,
        column: Option<&str>,
        alias: impl Into<String>,
    ) -> Self {
        self.selects.push(SelectExpr::Aggregate {
            func,
            column: column.map(str::to_string),
            alias: alias.into(),
        });
        self
    }

    pub(crate) fn clear_select(mut self) -> Self {
        self.selects.clear();
        self
    }

    // --- joins ---

    fn push_join(mut self, kind: JoinKind, table: &str, left: &str, op: Op, right: &str) -> Self {
        self.joins.push(Join {
            kind,
            table: table.to_string(),
            left: left.to_string(),
            op,
            right: right.to_string(),
        });
        self
    }

    /// `INNER JOIN table ON left op right`
    pub fn join(self, table: &str, left: &str, op: Op, right: &str) -> Self {
        self.push_join(JoinKind::Inner, table, left, op, right)
    }

    pub fn left_join(self, table: &str, left: &str, op: Op, right: &str) -> Self {
        self.push_join(JoinKind::Left, table, left, op, right)
    }

    pub fn right_join(self, table: &str, left: &str, op: Op, right: &str) -> Self {
        self.push_join(JoinKind::Right, table, left, op, right)
    }

    // --- where ---

    pub(crate) fn push_where(mut self, clause: Clause) -> Self {
        self.wheres.push(clause);
        self
    }

    fn and_where(self, condition: Condition) -> Self {
        self.push_where(Clause::and(condition))
    }

    fn or_where_condition(self, condition: Condition) -> Self {
        self.push_where(Clause::or(condition))
    }

    /// `col op ?`
    pub fn where_(self, column: &str, op: Op, value: impl Into<Value>) -> Self {
        self.and_where(Condition::Compare {
            column: column.to_string(),
            op,
            value: value.into(),
        })
    }

    /// `OR col op ?`
    pub fn or_where(self, column: &str, op: Op, value: impl Into<Value>) -> Self {
        self.or_where_condition(Condition::Compare {
            column: column.to_string(),
            op,
            value: value.into(),
        })
    }

    /// `col = ?`
    pub fn where_eq(self, column: &str, value: impl Into<Value>) -> Self {
        self.where_(column, Op::Eq, value)
    }

    /// `left op right`, comparing two columns
    pub fn where_column(self, left: &str, op: Op, right: &str) -> Self {
        self.and_where(Condition::CompareColumn {
            left: left.to_string(),
            op,
            right: right.to_string(),
        })
    }

    pub fn or_where_column(self, left: &str, op: Op, right: &str) -> Self {
        self.or_where_condition(Condition::CompareColumn {
            left: left.to_string(),
            op,
            right: right.to_string(),
        })
    }

    /// `col op (subquery)`
    pub fn where_sub(self, column: &str, op: Op, query: Query) -> Self {
        self.and_where(Condition::CompareSubquery {
            column: column.to_string(),
            op,
            query: Box::new(query),
        })
    }

    fn in_list<I, V>(column: &str, values: I, negated: bool) -> Condition
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Condition::In {
            column: column.to_string(),
            values: values.into_iter().map(Into::into).collect(),
            negated,
        }
    }

    /// `col IN (?, ...)`; an empty list matches nothing
    pub fn where_in<I, V>(self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.and_where(Self::in_list(column, values, false))
    }

    pub fn or_where_in<I, V>(self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.or_where_condition(Self::in_list(column, values, false))
    }

    /// `col NOT IN (?, ...)`; an empty list matches everything
    pub fn where_not_in<I, V>(self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.and_where(Self::in_list(column, values, true))
    }

    pub fn or_where_not_in<I, V>(self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.or_where_condition(Self::in_list(column, values, true))
    }

    /// `col IN (subquery)`
    pub fn where_in_sub(self, column: &str, query: Query) -> Self {
        self.and_where(Condition::InSubquery {
            column: column.to_string(),
            query: Box::new(query),
            negated: false,
        })
    }

    pub fn where_not_in_sub(self, column: &str, query: Query) -> Self {
        self.and_where(Condition::InSubquery {
            column: column.to_string(),
            query: Box::new(query),
            negated: true,
        })
    }

    /// `EXISTS (subquery)`
    pub fn where_exists(self, query: Query) -> Self {
        self.and_where(Condition::Exists {
            query: Box::new(query),
            negated: false,
        })
    }

    pub fn or_where_exists(self, query: Query) -> Self {
        self.or_where_condition(Condition::Exists {
            query: Box::new(query),
            negated: false,
        })
    }

    pub fn where_not_exists(self, query: Query) -> Self {
        self.and_where(Condition::Exists {
            query: Box::new(query),
            negated: true,
        })
    }

    pub fn where_null(self, column: &str) -> Self {
        self.and_where(Condition::Null {
            column: column.to_string(),
            negated: false,
        })
    }

    pub fn or_where_null(self, column: &str) -> Self {
        self.or_where_condition(Condition::Null {
            column: column.to_string(),
            negated: false,
        })
    }

    pub fn where_not_null(self, column: &str) -> Self {
        self.and_where(Condition::Null {
            column: column.to_string(),
            negated: true,
        })
    }

    pub fn or_where_not_null(self, column: &str) -> Self {
        self.or_where_condition(Condition::Null {
            column: column.to_string(),
            negated: true,
        })
    }

    /// `col IS TRUE`
    pub fn where_true(self, column: &str) -> Self {
        self.and_where(Condition::Boolean {
            column: column.to_string(),
            value: true,
        })
    }

    /// `col IS FALSE`
    pub fn where_false(self, column: &str) -> Self {
        self.and_where(Condition::Boolean {
            column: column.to_string(),
            value: false,
        })
    }

    /// `col BETWEEN ? AND ?`
    pub fn where_between(self, column: &str, low: impl Into<Value>, high: impl Into<Value>) -> Self {
        self.and_where(Condition::Between {
            column: column.to_string(),
            low: low.into(),
            high: high.into(),
            negated: false,
        })
    }

    pub fn where_not_between(
        self,
        column: &str,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> Self {
        self.and_where(Condition::Between {
            column: column.to_string(),
            low: low.into(),
            high: high.into(),
            negated: true,
        })
    }

    /// `col BETWEEN ? AND ?` from a list that must hold exactly two bounds
    pub fn where_between_list<V: Into<Value>>(self, column: &str, bounds: Vec<V>) -> Result<Self> {
        let count = bounds.len();
        let mut bounds = bounds.into_iter();
        match (bounds.next(), bounds.next(), count) {
            (Some(low), Some(high), 2) => Ok(self.where_between(column, low, high)),
            _ => Err(LucidError::InvalidArgument(format!(
                "where_between on `{column}` needs exactly 2 bounds, got {count}"
            ))),
        }
    }

    /// Verbatim condition; `bindings` must match its `?` count
    pub fn where_raw(self, sql: impl Into<String>, bindings: Vec<Value>) -> Self {
        self.and_where(Condition::Raw {
            sql: sql.into(),
            bindings,
        })
    }

    pub fn or_where_raw(self, sql: impl Into<String>, bindings: Vec<Value>) -> Self {
        self.or_where_condition(Condition::Raw {
            sql: sql.into(),
            bindings,
        })
    }

    /// Only the child's WHERE clauses are kept
    fn group(&self, build: impl FnOnce(Query) -> Query, negated: bool) -> Condition {
        let child = build(Query::table(self.table.clone()));
        let stray = !child.selects.is_empty()
            || !child.joins.is_empty()
            || !child.groups.is_empty()
            || !child.havings.is_empty()
            || !child.orders.is_empty()
            || child.limit.is_some()
            || child.offset.is_some()
            || child.lock.is_some();
        if stray {
            log::warn!(
                "where group on {} ignores everything but where clauses of its closure",
                self.table
            );
        }
        Condition::Group {
            clauses: child.wheres,
            negated,
        }
    }

    /// `AND ( ... )`: the closure receives an empty child query and its WHERE
    /// clauses become the parenthesized group
    ///
    /// Joins, orders, selects, limits and locks set inside the closure are
    /// dropped; add them to the outer query instead.
    ///
    /// ```
    /// use lucid::{Op, Query};
    ///
    /// let compiled = Query::table("t")
    ///     .where_eq("a", 1)
    ///     .where_group(|q| q.where_eq("b", 2).or_where("c", Op::Eq, 3))
    ///     .to_sql()
    ///     .unwrap();
    /// assert_eq!(compiled.sql, "SELECT * FROM `t` WHERE `a` = ? AND (`b` = ? OR `c` = ?)");
    /// ```
    pub fn where_group(self, build: impl FnOnce(Query) -> Query) -> Self {
        let condition = self.group(build, false);
        self.and_where(condition)
    }

    /// `OR ( ... )`, keeping only the closure's WHERE clauses
    pub fn or_where_group(self, build: impl FnOnce(Query) -> Query) -> Self {
        let condition = self.group(build, false);
        self.or_where_condition(condition)
    }

    /// `AND NOT ( ... )`, keeping only the closure's WHERE clauses
    pub fn where_not_group(self, build: impl FnOnce(Query) -> Query) -> Self {
        let condition = self.group(build, true);
        self.and_where(condition)
    }

    /// Full-text `MATCH(cols) AGAINST (? IN BOOLEAN MODE)`
    pub fn search<I, S>(self, columns: I, term: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.and_where(Condition::Search {
            columns: columns.into_iter().map(Into::into).collect(),
            term: term.into(),
        })
    }

    // --- grouping, ordering, paging ---

    pub fn group_by<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups.extend(columns.into_iter().map(Into::into));
        self
    }

    /// `HAVING col op ?`
    pub fn having(mut self, column: &str, op: Op, value: impl Into<Value>) -> Self {
        self.havings.push(Clause::and(Condition::Compare {
            column: column.to_string(),
            op,
            value: value.into(),
        }));
        self
    }

    pub fn or_having(mut self, column: &str, op: Op, value: impl Into<Value>) -> Self {
        self.havings.push(Clause::or(Condition::Compare {
            column: column.to_string(),
            op,
            value: value.into(),
        }));
        self
    }

    pub fn having_raw(mut self, sql: impl Into<String>, bindings: Vec<Value>) -> Self {
        self.havings.push(Clause::and(Condition::Raw {
            sql: sql.into(),
            bindings,
        }));
        self
    }

    pub fn order_by(mut self, column: &str, order: Order) -> Self {
        self.orders.push(OrderExpr::Column(column.to_string(), order));
        self
    }

    /// `ORDER BY col DESC`
    pub fn latest(self, column: &str) -> Self {
        self.order_by(column, Order::Desc)
    }

    pub fn order_by_raw(mut self, sql: impl Into<String>) -> Self {
        self.orders.push(OrderExpr::Raw(sql.into()));
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// `LIMIT per_page OFFSET (page - 1) * per_page`, pages start at 1;
    /// the offset saturates at `u64::MAX`
    pub fn for_page(self, page: u64, per_page: u64) -> Self {
        let offset = page.saturating_sub(1).saturating_mul(per_page);
        self.limit(per_page).offset(offset)
    }

    // --- locks ---

    pub fn for_update(mut self) -> Self {
        self.lock = Some(Lock::ForUpdate);
        self
    }

    pub fn skip_locked(mut self) -> Self {
        self.lock = Some(Lock::SkipLocked);
        self
    }

    pub fn no_wait(mut self) -> Self {
        self.lock = Some(Lock::NoWait);
        self
    }

    pub fn for_share(mut self) -> Self {
        self.lock = Some(Lock::ForShare);
        self
    }

    /// Compile to SQL and bindings
    pub fn to_sql(&self) -> Result<Compiled> {
        compiler::compile_select(self)
    }

    /// Copy for counting: same FROM/JOIN/WHERE/GROUP, no ORDER/LIMIT/OFFSET/lock
    pub(crate) fn stripped(&self) -> Self {
        Self {
            orders: Vec::new(),
            limit: None,
            offset: None,
            lock: None,
            ..self.clone()
        }
    }

    /// Whether a count has to go through a derived table
    pub(crate) fn needs_derived_count(&self) -> bool {
        self.distinct || !self.groups.is_empty()
    }
}
