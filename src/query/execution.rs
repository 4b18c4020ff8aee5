//! Terminal verbs: everything that sends a [`Query`] to a [`Connection`].

use super::compiler::{self, Assignment, Compiled};
use super::{AggregateFn, Paginator, Query};
use crate::connection::{Connection, ExecResult, Row};
use crate::error::{LucidError, Result};
use crate::value::Record;
use sea_query::{Order, Value};
use std::ops::ControlFlow;

const AGGREGATE_ALIAS: &str = "aggregate";

fn select(conn: &dyn Connection, compiled: &Compiled) -> Result<Vec<Row>> {
    conn.select(&compiled.sql, &compiled.bindings)
}

fn execute(conn: &dyn Connection, compiled: &Compiled) -> Result<ExecResult> {
    conn.execute(&compiled.sql, &compiled.bindings)
}

impl Query {
    /// Every matching row
    pub fn all(&self, conn: &dyn Connection) -> Result<Vec<Row>> {
        select(conn, &self.to_sql()?)
    }

    /// The first matching row (`LIMIT 1`), `None` when nothing matches
    pub fn first(&self, conn: &dyn Connection) -> Result<Option<Row>> {
        Ok(self.clone().limit(1).all(conn)?.into_iter().next())
    }

    /// Value of `name` in the first row
    pub fn column(&self, conn: &dyn Connection, name: &str) -> Result<Option<Value>> {
        let row = self.clone().clear_select().select([name]).first(conn)?;
        Ok(row.and_then(|r| r.get_index(0).cloned()))
    }

    /// Value of `name` in every row
    pub fn pluck(&self, conn: &dyn Connection, name: &str) -> Result<Vec<Value>> {
        let rows = self.clone().clear_select().select([name]).all(conn)?;
        Ok(rows
            .into_iter()
            .filter_map(|r| r.get_index(0).cloned())
            .collect())
    }

    pub fn exists(&self, conn: &dyn Connection) -> Result<bool> {
        Ok(self.first(conn)?.is_some())
    }

    /// Stream rows one at a time
    ///
    /// Every call prepares a fresh statement, so the same query can be walked
    /// again. Returning `ControlFlow::Break` from `f` stops fetching.
    pub fn cursor<F>(&self, conn: &dyn Connection, mut f: F) -> Result<()>
    where
        F: FnMut(Row) -> ControlFlow<()>,
    {
        let compiled = self.to_sql()?;
        conn.stream(&compiled.sql, &compiled.bindings, &mut f)
    }

    /// Fetch `size` rows at a time until the rows run out or `f` breaks
    ///
    /// Pages follow the query's order, or `id` when it has none, so every row
    /// is visited exactly once.
    pub fn chunk<F>(&self, conn: &dyn Connection, size: u64, mut f: F) -> Result<()>
    where
        F: FnMut(Vec<Row>) -> ControlFlow<()>,
    {
        if size == 0 {
            return Err(LucidError::InvalidArgument(
                "chunk size must be a positive integer".into(),
            ));
        }
        let base = if self.has_order() {
            self.clone()
        } else {
            self.clone().order_by("id", Order::Asc)
        };

        let mut page = 1;
        loop {
            let rows = base.clone().for_page(page, size).all(conn)?;
            let fetched = rows.len() as u64;
            if fetched == 0 {
                break;
            }
            log::trace!("chunk {page} of {} holds {fetched} rows", self.table);
            if f(rows).is_break() || fetched < size {
                break;
            }
            page += 1;
        }
        Ok(())
    }

    /// Count the rows, then fetch one page of them
    pub fn paginate(
        &self,
        conn: &dyn Connection,
        per_page: u64,
        page: u64,
    ) -> Result<Paginator<Vec<Row>>> {
        if per_page == 0 {
            return Err(LucidError::InvalidArgument(
                "per_page must be a positive integer".into(),
            ));
        }
        let page = page.max(1);
        let total = self.count(conn)?;
        let rows = self.clone().for_page(page, per_page).all(conn)?;
        Ok(Paginator::new(rows, total, per_page, page))
    }

    /// Number of matching rows, ignoring ORDER/LIMIT/OFFSET
    ///
    /// Grouped or distinct queries are counted through a derived table so the
    /// result is the number of groups.
    pub fn count(&self, conn: &dyn Connection) -> Result<u64> {
        let stripped = self.stripped();
        let compiled = if stripped.needs_derived_count() {
            let inner = stripped.to_sql()?;
            Compiled {
                sql: format!(
                    "SELECT COUNT(*) AS `{AGGREGATE_ALIAS}` FROM ({}) AS `aggregate_table`",
                    inner.sql
                ),
                bindings: inner.bindings,
            }
        } else {
            stripped
                .clear_select()
                .select_aggregate(AggregateFn::Count, None, AGGREGATE_ALIAS)
                .to_sql()?
        };
        let rows = select(conn, &compiled)?;
        Ok(rows
            .first()
            .and_then(|r| r.get_as::<u64>(AGGREGATE_ALIAS))
            .unwrap_or(0))
    }

    fn aggregate(&self, conn: &dyn Connection, func: AggregateFn, column: &str) -> Result<Option<f64>> {
        let row = self
            .stripped()
            .clear_select()
            .select_aggregate(func, Some(column), AGGREGATE_ALIAS)
            .first(conn)?;
        Ok(row.and_then(|r| r.get_as::<f64>(AGGREGATE_ALIAS)))
    }

    /// `SUM(col)`, `None` when no rows match
    pub fn sum(&self, conn: &dyn Connection, column: &str) -> Result<Option<f64>> {
        self.aggregate(conn, AggregateFn::Sum, column)
    }

    pub fn avg(&self, conn: &dyn Connection, column: &str) -> Result<Option<f64>> {
        self.aggregate(conn, AggregateFn::Avg, column)
    }

    pub fn min(&self, conn: &dyn Connection, column: &str) -> Result<Option<f64>> {
        self.aggregate(conn, AggregateFn::Min, column)
    }

    pub fn max(&self, conn: &dyn Connection, column: &str) -> Result<Option<f64>> {
        self.aggregate(conn, AggregateFn::Max, column)
    }

    /// Row count per distinct value of `column`
    pub fn count_by(&self, conn: &dyn Connection, column: &str) -> Result<Vec<(Value, u64)>> {
        let rows = self
            .stripped()
            .clear_select()
            .select([column])
            .select_aggregate(AggregateFn::Count, None, "count")
            .group_by([column])
            .all(conn)?;
        Ok(rows
            .into_iter()
            .filter_map(|r| {
                let count = r.get_as::<u64>("count")?;
                Some((r.get_index(0)?.clone(), count))
            })
            .collect())
    }

    /// Insert one row
    pub fn insert(&self, conn: &dyn Connection, record: Record) -> Result<ExecResult> {
        execute(conn, &compiler::compile_insert(&self.table, &[record], false)?)
    }

    /// Insert one row, skipping it when it conflicts with a unique key
    pub fn insert_ignore(&self, conn: &dyn Connection, record: Record) -> Result<ExecResult> {
        let compiled = compiler::compile_insert(&self.table, &[record], true)?;
        match execute(conn, &compiled) {
            Err(err) if err.is_duplicate_key() => {
                log::debug!("insert_ignore skipped duplicate row in {}", self.table);
                Ok(ExecResult::default())
            }
            other => other,
        }
    }

    /// Insert several rows sharing the same columns in one statement
    pub fn bulk_insert(&self, conn: &dyn Connection, records: Vec<Record>) -> Result<ExecResult> {
        execute(conn, &compiler::compile_insert(&self.table, &records, false)?)
    }

    /// `UPDATE ... SET` the given columns on matching rows; returns rows affected
    pub fn update(&self, conn: &dyn Connection, record: Record) -> Result<u64> {
        let sets: Vec<(String, Assignment)> = record
            .into_iter()
            .map(|(column, value)| (column, Assignment::Value(value)))
            .collect();
        Ok(execute(conn, &compiler::compile_update(self, &sets)?)?.rows_affected)
    }

    /// `col = col + amount`
    pub fn increment(&self, conn: &dyn Connection, column: &str, amount: impl Into<Value>) -> Result<u64> {
        let sets = [(column.to_string(), Assignment::Add(amount.into()))];
        Ok(execute(conn, &compiler::compile_update(self, &sets)?)?.rows_affected)
    }

    /// `col = col - amount`
    pub fn decrement(&self, conn: &dyn Connection, column: &str, amount: impl Into<Value>) -> Result<u64> {
        let sets = [(column.to_string(), Assignment::Sub(amount.into()))];
        Ok(execute(conn, &compiler::compile_update(self, &sets)?)?.rows_affected)
    }

    /// Delete matching rows; returns rows affected
    pub fn delete(&self, conn: &dyn Connection) -> Result<u64> {
        Ok(execute(conn, &compiler::compile_delete(self)?)?.rows_affected)
    }
}
