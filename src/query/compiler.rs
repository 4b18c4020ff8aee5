//! SQL text generation.
//!
//! Turns a [`Query`](super::Query) into MySQL-style SQL (backtick identifiers,
//! `?` placeholders) plus the positional bindings. Bindings are appended in
//! exactly the order their placeholders are written, subquery bindings
//! included, so the two can never drift apart.

use super::clause::{Clause, Condition, OrderExpr, SelectExpr};
use super::Query;
use crate::error::{LucidError, Result};
use crate::value::{self, Record};
use once_cell::sync::Lazy;
use regex::Regex;
use sea_query::{Order, Value};

/// Offset without limit: MySQL requires a LIMIT, so use the largest one
const NO_LIMIT: u64 = u64::MAX;

/// A quoted string literal or a bare placeholder
static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"'(?:[^']|'')*'|\?").expect("placeholder regex"));

/// SQL text with its positional bindings
#[derive(Debug, Clone, PartialEq)]
pub struct Compiled {
    pub sql: String,
    pub bindings: Vec<Value>,
}

/// Right-hand side of an UPDATE assignment
#[derive(Debug, Clone)]
pub(crate) enum Assignment {
    Value(Value),
    Add(Value),
    Sub(Value),
}

/// Quote an identifier
///
/// - `users.id` → `` `users`.`id` ``
/// - `users.*` → `` `users`.* ``
/// - `email as contact` → `` `email` AS `contact` ``
/// - expressions containing `(` and already-quoted text pass through
///
/// ```
/// use lucid::query::compiler::quote;
/// assert_eq!(quote("posts.user_id"), "`posts`.`user_id`");
/// assert_eq!(quote("tags.id as tag"), "`tags`.`id` AS `tag`");
/// ```
pub fn quote(ident: &str) -> String {
    let ident = ident.trim();
    if ident.contains('(') || ident.starts_with('`') {
        return ident.to_string();
    }
    if let Some(pos) = ident.to_ascii_lowercase().find(" as ") {
        let (column, alias) = (&ident[..pos], &ident[pos + 4..]);
        return format!("{} AS {}", quote(column), quote_part(alias.trim()));
    }
    ident
        .split('.')
        .map(quote_part)
        .collect::<Vec<_>>()
        .join(".")
}

fn quote_part(part: &str) -> String {
    if part == "*" {
        part.to_string()
    } else {
        format!("`{}`", part.replace('`', "``"))
    }
}

#[derive(Default)]
struct Writer {
    sql: String,
    bindings: Vec<Value>,
}

impl Writer {
    fn push(&mut self, sql: &str) {
        self.sql.push_str(sql);
    }

    fn bind(&mut self, value: Value) {
        self.sql.push('?');
        self.bindings.push(value);
    }

    fn splice(&mut self, compiled: Compiled) {
        self.sql.push_str(&compiled.sql);
        self.bindings.extend(compiled.bindings);
    }

    fn raw(&mut self, sql: &str, bindings: &[Value]) -> Result<()> {
        check_raw(sql, bindings)?;
        self.sql.push_str(sql);
        self.bindings.extend_from_slice(bindings);
        Ok(())
    }

    fn finish(self) -> Compiled {
        Compiled {
            sql: self.sql,
            bindings: self.bindings,
        }
    }
}

fn check_raw(sql: &str, bindings: &[Value]) -> Result<()> {
    let placeholders = PLACEHOLDER
        .find_iter(sql)
        .filter(|m| m.as_str() == "?")
        .count();
    if placeholders != bindings.len() {
        return Err(LucidError::Query(format!(
            "raw fragment `{sql}` has {placeholders} placeholders but {} bindings",
            bindings.len()
        )));
    }
    Ok(())
}

/// Compile a SELECT
pub(crate) fn compile_select(query: &Query) -> Result<Compiled> {
    let mut w = Writer::default();
    w.push("SELECT ");
    if query.distinct {
        w.push("DISTINCT ");
    }
    if query.selects.is_empty() {
        w.push("*");
    }
    for (i, expr) in query.selects.iter().enumerate() {
        if i > 0 {
            w.push(", ");
        }
        match expr {
            SelectExpr::Column(column) => w.push(&quote(column)),
            SelectExpr::Raw { sql, bindings } => w.raw(sql, bindings)?,
            SelectExpr::Aggregate {
                func,
                column,
                alias,
            } => {
                let target = column.as_deref().map_or_else(|| "*".to_string(), quote);
                w.push(&format!("{}({target}) AS {}", func.as_sql(), quote(alias)));
            }
        }
    }

    w.push(" FROM ");
    w.push(&quote(&query.table));
    if let Some(alias) = &query.alias {
        w.push(" AS ");
        w.push(&quote(alias));
    }

    for join in &query.joins {
        w.push(&format!(
            " {} {} ON {} {} {}",
            join.kind.as_sql(),
            quote(&join.table),
            quote(&join.left),
            join.op.as_sql(),
            quote(&join.right)
        ));
    }

    write_where(&mut w, &query.wheres)?;

    if !query.groups.is_empty() {
        w.push(" GROUP BY ");
        w.push(&join_quoted(&query.groups));
    }

    if !query.havings.is_empty() {
        w.push(" HAVING ");
        write_clauses(&mut w, &query.havings)?;
    }

    if !query.orders.is_empty() {
        w.push(" ORDER BY ");
        let orders: Vec<String> = query
            .orders
            .iter()
            .map(|order| match order {
                OrderExpr::Column(column, Order::Desc) => format!("{} DESC", quote(column)),
                OrderExpr::Column(column, _) => format!("{} ASC", quote(column)),
                OrderExpr::Raw(sql) => sql.clone(),
            })
            .collect();
        w.push(&orders.join(", "));
    }

    match (query.limit, query.offset) {
        (Some(limit), Some(offset)) => w.push(&format!(" LIMIT {limit} OFFSET {offset}")),
        (Some(limit), None) => w.push(&format!(" LIMIT {limit}")),
        (None, Some(offset)) => w.push(&format!(" LIMIT {NO_LIMIT} OFFSET {offset}")),
        (None, None) => {}
    }

    if let Some(lock) = query.lock {
        w.push(" ");
        w.push(lock.as_sql());
    }

    Ok(w.finish())
}

/// `INSERT [IGNORE] INTO t (cols) VALUES (?, ..)[, (?, ..)]`
///
/// Every row must carry the same columns as the first one; values are
/// written in the first row's column order.
pub(crate) fn compile_insert(table: &str, rows: &[Record], ignore: bool) -> Result<Compiled> {
    let first = match rows.first() {
        Some(first) if !first.is_empty() => first,
        _ => {
            return Err(LucidError::InvalidArgument(
                "insert requires at least one column".into(),
            ))
        }
    };
    let columns: Vec<&String> = first.keys().collect();

    let mut w = Writer::default();
    w.push(if ignore {
        "INSERT IGNORE INTO "
    } else {
        "INSERT INTO "
    });
    w.push(&quote(table));
    w.push(" (");
    w.push(
        &columns
            .iter()
            .map(|c| quote(c))
            .collect::<Vec<_>>()
            .join(", "),
    );
    w.push(") VALUES ");

    for (i, row) in rows.iter().enumerate() {
        if row.len() != columns.len() || columns.iter().any(|c| !row.contains_key(*c)) {
            return Err(LucidError::Query(format!(
                "bulk insert row {i} has different columns than the first row"
            )));
        }
        if i > 0 {
            w.push(", ");
        }
        w.push("(");
        for (j, column) in columns.iter().enumerate() {
            if j > 0 {
                w.push(", ");
            }
            w.bind(row.get(*column).cloned().unwrap_or_else(value::null));
        }
        w.push(")");
    }

    Ok(w.finish())
}

/// `UPDATE t SET a = ?, b = b + ? WHERE ...`
pub(crate) fn compile_update(query: &Query, sets: &[(String, Assignment)]) -> Result<Compiled> {
    if sets.is_empty() {
        return Err(LucidError::InvalidArgument(
            "update requires at least one column".into(),
        ));
    }
    let mut w = Writer::default();
    w.push("UPDATE ");
    w.push(&quote(&query.table));
    w.push(" SET ");
    for (i, (column, assignment)) in sets.iter().enumerate() {
        if i > 0 {
            w.push(", ");
        }
        let column = quote(column);
        match assignment {
            Assignment::Value(value) => {
                w.push(&format!("{column} = "));
                w.bind(value.clone());
            }
            Assignment::Add(value) => {
                w.push(&format!("{column} = {column} + "));
                w.bind(value.clone());
            }
            Assignment::Sub(value) => {
                w.push(&format!("{column} = {column} - "));
                w.bind(value.clone());
            }
        }
    }
    write_where(&mut w, &query.wheres)?;
    Ok(w.finish())
}

/// `DELETE FROM t WHERE ...`
pub(crate) fn compile_delete(query: &Query) -> Result<Compiled> {
    let mut w = Writer::default();
    w.push("DELETE FROM ");
    w.push(&quote(&query.table));
    write_where(&mut w, &query.wheres)?;
    Ok(w.finish())
}

fn join_quoted(columns: &[String]) -> String {
    columns
        .iter()
        .map(|c| quote(c))
        .collect::<Vec<_>>()
        .join(", ")
}

fn write_where(w: &mut Writer, clauses: &[Clause]) -> Result<()> {
    if clauses.is_empty() {
        return Ok(());
    }
    w.push(" WHERE ");
    write_clauses(w, clauses)
}

fn write_clauses(w: &mut Writer, clauses: &[Clause]) -> Result<()> {
    for (i, clause) in clauses.iter().enumerate() {
        if i > 0 {
            w.push(" ");
            w.push(clause.connector.as_sql());
            w.push(" ");
        }
        write_condition(w, &clause.condition)?;
    }
    Ok(())
}

fn not(negated: bool) -> &'static str {
    if negated {
        "NOT "
    } else {
        ""
    }
}

fn write_condition(w: &mut Writer, condition: &Condition) -> Result<()> {
    match condition {
        Condition::Compare { column, op, value } => {
            w.push(&format!("{} {} ", quote(column), op.as_sql()));
            w.bind(value.clone());
        }
        Condition::CompareColumn { left, op, right } => {
            w.push(&format!("{} {} {}", quote(left), op.as_sql(), quote(right)));
        }
        Condition::CompareSubquery { column, op, query } => {
            w.push(&format!("{} {} (", quote(column), op.as_sql()));
            w.splice(compile_select(query)?);
            w.push(")");
        }
        Condition::Group { clauses, negated } => {
            if clauses.is_empty() {
                return Err(LucidError::Query("where group has no clauses".into()));
            }
            w.push(not(*negated));
            w.push("(");
            write_clauses(w, clauses)?;
            w.push(")");
        }
        Condition::In {
            column,
            values,
            negated,
        } => {
            if values.is_empty() {
                w.push(if *negated { "1 = 1" } else { "0 = 1" });
                return Ok(());
            }
            w.push(&format!("{} {}IN (", quote(column), not(*negated)));
            for (i, value) in values.iter().enumerate() {
                if i > 0 {
                    w.push(", ");
                }
                w.bind(value.clone());
            }
            w.push(")");
        }
        Condition::InSubquery {
            column,
            query,
            negated,
        } => {
            w.push(&format!("{} {}IN (", quote(column), not(*negated)));
            w.splice(compile_select(query)?);
            w.push(")");
        }
        Condition::Exists { query, negated } => {
            w.push(not(*negated));
            w.push("EXISTS (");
            w.splice(compile_select(query)?);
            w.push(")");
        }
        Condition::Null { column, negated } => {
            w.push(&format!("{} IS {}NULL", quote(column), not(*negated)));
        }
        Condition::Boolean { column, value } => {
            let literal = if *value { "TRUE" } else { "FALSE" };
            w.push(&format!("{} IS {literal}", quote(column)));
        }
        Condition::Between {
            column,
            low,
            high,
            negated,
        } => {
            w.push(&format!("{} {}BETWEEN ", quote(column), not(*negated)));
            w.bind(low.clone());
            w.push(" AND ");
            w.bind(high.clone());
        }
        Condition::DatePart {
            func,
            column,
            op,
            value,
        } => {
            w.push(&format!("{}({}) {} ", func.as_sql(), quote(column), op.as_sql()));
            w.bind(value.clone());
        }
        Condition::Raw { sql, bindings } => w.raw(sql, bindings)?,
        Condition::Search { columns, term } => {
            w.push(&format!("MATCH({}) AGAINST (", join_quoted(columns)));
            w.bind(Value::from(term.as_str()));
            w.push(" IN BOOLEAN MODE)");
        }
        Condition::SubqueryCount { query, op, count } => {
            w.push("(");
            w.splice(compile_select(query)?);
            w.push(&format!(") {} ", op.as_sql()));
            w.bind(Value::from(*count));
        }
    }
    Ok(())
}
