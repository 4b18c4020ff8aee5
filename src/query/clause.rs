//! Clause descriptors accumulated by [`Query`](super::Query).
//!
//! Descriptors are plain values: once pushed onto a query they are never
//! mutated, and each one knows the runtime values it contributes as bindings.

use super::Query;
use crate::error::LucidError;
use sea_query::{Order, Value};
use std::fmt;
use std::str::FromStr;

/// Boolean connector between a clause and the one before it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connector {
    And,
    Or,
}

impl Connector {
    pub fn as_sql(self) -> &'static str {
        match self {
            Connector::And => "AND",
            Connector::Or => "OR",
        }
    }
}

/// Comparison operator
///
/// `Op::from_str` accepts the SQL spellings (`=`, `!=`, `<>`, `<`, `<=`, `>`,
/// `>=`, `like`, `not like`), case-insensitively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    Like,
    NotLike,
}

impl Op {
    pub fn as_sql(self) -> &'static str {
        match self {
            Op::Eq => "=",
            Op::Ne => "!=",
            Op::Lt => "<",
            Op::Lte => "<=",
            Op::Gt => ">",
            Op::Gte => ">=",
            Op::Like => "LIKE",
            Op::NotLike => "NOT LIKE",
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

impl FromStr for Op {
    type Err = LucidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let op = match s.trim().to_ascii_lowercase().as_str() {
            "=" | "==" => Op::Eq,
            "!=" | "<>" => Op::Ne,
            "<" => Op::Lt,
            "<=" => Op::Lte,
            ">" => Op::Gt,
            ">=" => Op::Gte,
            "like" => Op::Like,
            "not like" => Op::NotLike,
            other => {
                return Err(LucidError::InvalidArgument(format!(
                    "unknown comparison operator `{other}`"
                )))
            }
        };
        Ok(op)
    }
}

/// SQL function wrapped around a column by the date helpers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateFn {
    Date,
    Year,
    Month,
    Day,
    Time,
    DayOfWeek,
}

impl DateFn {
    pub fn as_sql(self) -> &'static str {
        match self {
            DateFn::Date => "DATE",
            DateFn::Year => "YEAR",
            DateFn::Month => "MONTH",
            DateFn::Day => "DAY",
            DateFn::Time => "TIME",
            DateFn::DayOfWeek => "DAYOFWEEK",
        }
    }
}

/// One WHERE/HAVING fragment
#[derive(Debug, Clone)]
pub enum Condition {
    /// `col op ?`
    Compare { column: String, op: Op, value: Value },
    /// `left op right`, both identifiers
    CompareColumn { left: String, op: Op, right: String },
    /// `col op (subquery)`
    CompareSubquery {
        column: String,
        op: Op,
        query: Box<Query>,
    },
    /// Parenthesized sub-clause
    Group { clauses: Vec<Clause>, negated: bool },
    /// `col [NOT] IN (?, ...)`
    In {
        column: String,
        values: Vec<Value>,
        negated: bool,
    },
    /// `col [NOT] IN (subquery)`
    InSubquery {
        column: String,
        query: Box<Query>,
        negated: bool,
    },
    /// `[NOT] EXISTS (subquery)`
    Exists { query: Box<Query>, negated: bool },
    /// `col IS [NOT] NULL`
    Null { column: String, negated: bool },
    /// `col IS TRUE` / `col IS FALSE`
    Boolean { column: String, value: bool },
    /// `col [NOT] BETWEEN ? AND ?`
    Between {
        column: String,
        low: Value,
        high: Value,
        negated: bool,
    },
    /// `FN(col) op ?`
    DatePart {
        func: DateFn,
        column: String,
        op: Op,
        value: Value,
    },
    /// Verbatim SQL with its own positional bindings
    Raw { sql: String, bindings: Vec<Value> },
    /// `MATCH(cols) AGAINST (? IN BOOLEAN MODE)`
    Search { columns: Vec<String>, term: String },
    /// `(SELECT COUNT(*) ...) op ?`
    SubqueryCount {
        query: Box<Query>,
        op: Op,
        count: i64,
    },
}

/// A condition with the connector that joins it to the previous clause
#[derive(Debug, Clone)]
pub struct Clause {
    pub connector: Connector,
    pub condition: Condition,
}

impl Clause {
    pub fn and(condition: Condition) -> Self {
        Self {
            connector: Connector::And,
            condition,
        }
    }

    pub fn or(condition: Condition) -> Self {
        Self {
            connector: Connector::Or,
            condition,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
}

impl JoinKind {
    pub fn as_sql(self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::Left => "LEFT JOIN",
            JoinKind::Right => "RIGHT JOIN",
        }
    }
}

/// `<kind> JOIN table ON left op right`
#[derive(Debug, Clone)]
pub struct Join {
    pub kind: JoinKind,
    pub table: String,
    pub left: String,
    pub op: Op,
    pub right: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFn {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFn {
    pub fn as_sql(self) -> &'static str {
        match self {
            AggregateFn::Count => "COUNT",
            AggregateFn::Sum => "SUM",
            AggregateFn::Avg => "AVG",
            AggregateFn::Min => "MIN",
            AggregateFn::Max => "MAX",
        }
    }
}

/// One entry of the select list
#[derive(Debug, Clone)]
pub enum SelectExpr {
    Column(String),
    Raw { sql: String, bindings: Vec<Value> },
    /// `FN(col) AS alias`, `COUNT(*)` when `column` is `None`
    Aggregate {
        func: AggregateFn,
        column: Option<String>,
        alias: String,
    },
}

#[derive(Debug, Clone)]
pub enum OrderExpr {
    Column(String, Order),
    Raw(String),
}

/// Trailing row lock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lock {
    ForUpdate,
    SkipLocked,
    NoWait,
    ForShare,
}

impl Lock {
    pub fn as_sql(self) -> &'static str {
        match self {
            Lock::ForUpdate => "FOR UPDATE",
            Lock::SkipLocked => "FOR UPDATE SKIP LOCKED",
            Lock::NoWait => "FOR UPDATE NOWAIT",
            Lock::ForShare => "FOR SHARE",
        }
    }
}
