//! Scripted connection for tests.
//!
//! Results are queued up front and handed out in order, one per statement;
//! every statement is recorded with its bindings so tests can assert on the
//! exact SQL and on how many queries an operation issued.

use super::{Connection, ExecResult, Row};
use crate::error::{LucidError, Result};
use sea_query::Value;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::ops::ControlFlow;

enum Scripted {
    Rows(Vec<Row>),
    Exec(ExecResult),
    Error(LucidError),
}

/// A connection that replays queued results
///
/// # Example
///
/// ```ignore
/// use lucid::connection::mock::MockConnection;
/// use lucid::{Connection, Row};
/// use sea_query::Value;
///
/// let conn = MockConnection::new()
///     .append_rows(vec![Row::from_iter([("id", Value::from(1i64))])]);
/// let rows = conn.select("SELECT * FROM `users`", &[]).unwrap();
/// assert_eq!(rows.len(), 1);
/// assert_eq!(conn.statements(), vec!["SELECT * FROM `users`".to_string()]);
/// ```
#[derive(Default)]
pub struct MockConnection {
    script: RefCell<VecDeque<Scripted>>,
    log: RefCell<Vec<(String, Vec<Value>)>>,
    last_id: Cell<Option<i64>>,
}

impl MockConnection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the rows returned by the next SELECT
    pub fn append_rows(self, rows: Vec<Row>) -> Self {
        self.script.borrow_mut().push_back(Scripted::Rows(rows));
        self
    }

    /// Queue the result of the next write statement
    pub fn append_exec(self, result: ExecResult) -> Self {
        self.script.borrow_mut().push_back(Scripted::Exec(result));
        self
    }

    /// Queue a failure for the next statement
    pub fn append_error(self, error: LucidError) -> Self {
        self.script.borrow_mut().push_back(Scripted::Error(error));
        self
    }

    /// Every statement executed so far, in order
    pub fn statements(&self) -> Vec<String> {
        self.log.borrow().iter().map(|(sql, _)| sql.clone()).collect()
    }

    /// Every statement with its bindings
    pub fn log(&self) -> Vec<(String, Vec<Value>)> {
        self.log.borrow().clone()
    }

    /// Number of SELECT statements executed
    pub fn select_count(&self) -> usize {
        self.log
            .borrow()
            .iter()
            .filter(|(sql, _)| sql.starts_with("SELECT"))
            .count()
    }

    fn record(&self, sql: &str, bindings: &[Value]) {
        log::debug!("mock: {sql} {bindings:?}");
        self.log
            .borrow_mut()
            .push((sql.to_string(), bindings.to_vec()));
    }

    fn next_rows(&self) -> Result<Vec<Row>> {
        match self.script.borrow_mut().pop_front() {
            Some(Scripted::Rows(rows)) => Ok(rows),
            Some(Scripted::Error(err)) => Err(err),
            Some(Scripted::Exec(_)) | None => Ok(Vec::new()),
        }
    }
}

impl Connection for MockConnection {
    fn select(&self, sql: &str, bindings: &[Value]) -> Result<Vec<Row>> {
        self.record(sql, bindings);
        self.next_rows()
            .map_err(|e| e.with_statement(sql, bindings))
    }

    fn execute(&self, sql: &str, bindings: &[Value]) -> Result<ExecResult> {
        self.record(sql, bindings);
        if matches!(sql, "BEGIN" | "COMMIT" | "ROLLBACK") {
            return Ok(ExecResult::default());
        }
        let next = self.script.borrow_mut().pop_front();
        match next {
            Some(Scripted::Exec(result)) => {
                if result.last_insert_id.is_some() {
                    self.last_id.set(result.last_insert_id);
                }
                Ok(result)
            }
            Some(Scripted::Error(err)) => Err(err.with_statement(sql, bindings)),
            Some(Scripted::Rows(_)) | None => Ok(ExecResult::default()),
        }
    }

    fn stream(
        &self,
        sql: &str,
        bindings: &[Value],
        sink: &mut dyn FnMut(Row) -> ControlFlow<()>,
    ) -> Result<()> {
        self.record(sql, bindings);
        let rows = self
            .next_rows()
            .map_err(|e| e.with_statement(sql, bindings))?;
        for row in rows {
            if sink(row).is_break() {
                break;
            }
        }
        Ok(())
    }

    fn last_insert_id(&self) -> Option<i64> {
        self.last_id.get()
    }
}
