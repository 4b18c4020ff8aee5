//! Date filters.
//!
//! `where_date`/`where_year`/`where_month`/`where_day`/`where_time` compare a
//! SQL date function of the column with a bound value. The relative helpers
//! compute their boundaries in local time with chrono and bind them as plain
//! dates or datetimes.

use super::clause::{Clause, Condition, DateFn, Op};
use super::Query;
use crate::error::{LucidError, Result};
use chrono::{Datelike, Duration, Local, NaiveDate, NaiveDateTime, NaiveTime};
use sea_query::Value;

const MONTHS: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

/// Resolve a month name, abbreviation or number to `1..=12`
///
/// ```
/// use lucid::query::dates::resolve_month;
/// assert_eq!(resolve_month("dec").unwrap(), 12);
/// assert_eq!(resolve_month("December").unwrap(), 12);
/// assert_eq!(resolve_month("3").unwrap(), 3);
/// assert!(resolve_month("smarch").is_err());
/// ```
pub fn resolve_month(name: &str) -> Result<u32> {
    let name = name.trim().to_ascii_lowercase();
    if let Ok(n) = name.parse::<u32>() {
        return check_month(n);
    }
    MONTHS
        .iter()
        .position(|m| *m == name || (name.len() == 3 && m.starts_with(name.as_str())))
        .map(|i| i as u32 + 1)
        .ok_or_else(|| LucidError::InvalidArgument(format!("invalid month `{name}`")))
}

fn check_month(n: u32) -> Result<u32> {
    if (1..=12).contains(&n) {
        Ok(n)
    } else {
        Err(LucidError::InvalidArgument(format!("invalid month {n}")))
    }
}

/// Anything `where_month` accepts
pub trait IntoMonth {
    fn into_month(self) -> Result<u32>;
}

impl IntoMonth for u32 {
    fn into_month(self) -> Result<u32> {
        check_month(self)
    }
}

impl IntoMonth for i32 {
    fn into_month(self) -> Result<u32> {
        u32::try_from(self)
            .map_err(|_| LucidError::InvalidArgument(format!("invalid month {self}")))
            .and_then(check_month)
    }
}

impl IntoMonth for &str {
    fn into_month(self) -> Result<u32> {
        resolve_month(self)
    }
}

impl IntoMonth for String {
    fn into_month(self) -> Result<u32> {
        resolve_month(&self)
    }
}

/// Half-open datetime range: `start <= t < end`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Period {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl Period {
    fn days(first: NaiveDate, last: NaiveDate) -> Self {
        Self {
            start: first.and_time(NaiveTime::MIN),
            end: (last + Duration::days(1)).and_time(NaiveTime::MIN),
        }
    }

    /// Monday through Sunday of the week containing `day`
    pub fn week_of(day: NaiveDate) -> Self {
        let monday = day - Duration::days(i64::from(day.weekday().num_days_from_monday()));
        Self::days(monday, monday + Duration::days(6))
    }

    pub fn month_of(day: NaiveDate) -> Self {
        let first = day.with_day(1).unwrap_or(day);
        let next = if first.month() == 12 {
            NaiveDate::from_ymd_opt(first.year() + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(first.year(), first.month() + 1, 1)
        };
        let last = next.map_or(day, |n| n - Duration::days(1));
        Self::days(first, last)
    }

    pub fn year_of(day: NaiveDate) -> Self {
        let first = NaiveDate::from_ymd_opt(day.year(), 1, 1).unwrap_or(day);
        let last = NaiveDate::from_ymd_opt(day.year(), 12, 31).unwrap_or(day);
        Self::days(first, last)
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn now() -> NaiveDateTime {
    Local::now().naive_local()
}

impl Query {
    fn date_part(mut self, func: DateFn, column: &str, op: Op, value: Value) -> Self {
        self.wheres.push(Clause::and(Condition::DatePart {
            func,
            column: column.to_string(),
            op,
            value,
        }));
        self
    }

    fn where_period(self, column: &str, period: Period) -> Self {
        self.where_(column, Op::Gte, period.start)
            .where_(column, Op::Lt, period.end)
    }

    /// `DATE(col) op ?`
    pub fn where_date(self, column: &str, op: Op, value: impl Into<Value>) -> Self {
        self.date_part(DateFn::Date, column, op, value.into())
    }

    /// `YEAR(col) op ?`
    pub fn where_year(self, column: &str, op: Op, year: i32) -> Self {
        self.date_part(DateFn::Year, column, op, Value::from(year))
    }

    /// `MONTH(col) op ?`, accepting month names (`"dec"`, `"December"`) and
    /// numbers; an unknown month fails here rather than at execution
    pub fn where_month(self, column: &str, op: Op, month: impl IntoMonth) -> Result<Self> {
        let month = month.into_month()?;
        Ok(self.date_part(DateFn::Month, column, op, Value::from(month)))
    }

    /// `DAY(col) op ?`
    pub fn where_day(self, column: &str, op: Op, day: u32) -> Self {
        self.date_part(DateFn::Day, column, op, Value::from(day))
    }

    /// `TIME(col) op ?`
    pub fn where_time(self, column: &str, op: Op, value: impl Into<Value>) -> Self {
        self.date_part(DateFn::Time, column, op, value.into())
    }

    pub fn where_today(self, column: &str) -> Self {
        self.where_date(column, Op::Eq, today())
    }

    pub fn where_yesterday(self, column: &str) -> Self {
        self.where_date(column, Op::Eq, today() - Duration::days(1))
    }

    pub fn where_tomorrow(self, column: &str) -> Self {
        self.where_date(column, Op::Eq, today() + Duration::days(1))
    }

    /// From Monday 00:00:00 up to (not including) next Monday
    pub fn this_week(self, column: &str) -> Self {
        self.where_period(column, Period::week_of(today()))
    }

    pub fn last_week(self, column: &str) -> Self {
        self.where_period(column, Period::week_of(today() - Duration::days(7)))
    }

    pub fn this_month(self, column: &str) -> Self {
        self.where_period(column, Period::month_of(today()))
    }

    pub fn last_month(self, column: &str) -> Self {
        let first = today().with_day(1).unwrap_or_else(today);
        self.where_period(column, Period::month_of(first - Duration::days(1)))
    }

    pub fn this_year(self, column: &str) -> Self {
        self.where_period(column, Period::year_of(today()))
    }

    pub fn last_year(self, column: &str) -> Self {
        let day = today();
        let last = NaiveDate::from_ymd_opt(day.year() - 1, 1, 1).unwrap_or(day);
        self.where_period(column, Period::year_of(last))
    }

    /// `col < now - age`
    pub fn older_than(self, column: &str, age: Duration) -> Self {
        self.where_(column, Op::Lt, now() - age)
    }

    /// `col > now - age`
    pub fn newer_than(self, column: &str, age: Duration) -> Self {
        self.where_(column, Op::Gt, now() - age)
    }

    /// Monday through Friday (`DAYOFWEEK` 2..=6)
    pub fn weekdays(mut self, column: &str) -> Self {
        self.wheres.push(Clause::and(Condition::Raw {
            sql: format!("DAYOFWEEK({}) BETWEEN ? AND ?", super::compiler::quote(column)),
            bindings: vec![Value::from(2i32), Value::from(6i32)],
        }));
        self
    }

    /// Saturday and Sunday (`DAYOFWEEK` 7 and 1)
    pub fn weekends(mut self, column: &str) -> Self {
        self.wheres.push(Clause::and(Condition::Raw {
            sql: format!("DAYOFWEEK({}) IN (?, ?)", super::compiler::quote(column)),
            bindings: vec![Value::from(1i32), Value::from(7i32)],
        }));
        self
    }
}
