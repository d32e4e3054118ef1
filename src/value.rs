//! Values as they move from a source record to a typed insert parameter.
//!
//! A column's value starts as a [`Cell`] (read from the source record and
//! rewritten by transforms), is resolved to a [`Resolution`] against the
//! column's fallback policy, and finally coerced into a [`SqlValue`] that can be
//! bound as a positional parameter.

use std::error::Error;
use std::fmt;

use bytes::BytesMut;
use chrono::{DateTime, NaiveDateTime, Utc};
use postgres::types::{IsNull, ToSql, Type};
use serde_json::Value;
use uuid::Uuid;

use crate::column::ColumnType;

/// The value of one column while it flows through the transform pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    /// No value: the source field is missing, null, or was cleared.
    Absent,
    /// A concrete source value. Never `Value::Null`.
    Value(Value),
    /// An explicit SQL NULL, distinct from "no value".
    Null,
    /// Drop the whole row.
    Skip,
    /// No acceptable value. Aborts the table unless a fallback rescues it.
    Fail(String),
}

impl Cell {
    /// Wraps a raw source value; JSON `null` and missing fields are [`Cell::Absent`].
    pub fn from_source(value: Option<&Value>) -> Self {
        match value {
            None | Some(Value::Null) => Cell::Absent,
            Some(v) => Cell::Value(v.clone()),
        }
    }

    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Null => Cell::Absent,
            v => Cell::Value(v),
        }
    }

    pub fn string(s: impl Into<String>) -> Self {
        Cell::Value(Value::String(s.into()))
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Cell::Absent)
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            Cell::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.value().and_then(Value::as_str)
    }
}

/// Outcome of resolving one column of one row.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Bind this value.
    Value(Value),
    /// Bind SQL NULL.
    UseNull,
    /// Leave the column out of the insert so the destination default applies.
    OmitColumn,
    /// Drop the entire row.
    SkipRow,
    /// Abort the table migration.
    Fail(String),
}

/// A typed positional parameter for an insert statement.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Text(String),
    Int32(i32),
    Int64(i64),
    Bool(bool),
    Timestamp(DateTime<Utc>),
    Json(Value),
    Uuid(Uuid),
    TextArray(Vec<String>),
    Int32Array(Vec<i32>),
    Int64Array(Vec<i64>),
    BoolArray(Vec<bool>),
    TimestampArray(Vec<DateTime<Utc>>),
    JsonArray(Vec<Value>),
    UuidArray(Vec<Uuid>),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Converts a resolved value into the parameter type of a column.
    pub fn coerce(value: &Value, ty: ColumnType, array: bool) -> Result<SqlValue, String> {
        if value.is_null() {
            return Ok(SqlValue::Null);
        }
        if !array {
            return coerce_scalar(value, ty);
        }
        let items = array_items(value)?;
        let scalars = items
            .iter()
            .map(|item| coerce_scalar(item, ty))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(match ty {
            ColumnType::Text => SqlValue::TextArray(collect(scalars, |v| match v {
                SqlValue::Text(s) => Some(s),
                _ => None,
            })?),
            ColumnType::Int32 => SqlValue::Int32Array(collect(scalars, |v| match v {
                SqlValue::Int32(n) => Some(n),
                _ => None,
            })?),
            ColumnType::Int64 => SqlValue::Int64Array(collect(scalars, |v| match v {
                SqlValue::Int64(n) => Some(n),
                _ => None,
            })?),
            ColumnType::Bool => SqlValue::BoolArray(collect(scalars, |v| match v {
                SqlValue::Bool(b) => Some(b),
                _ => None,
            })?),
            ColumnType::Timestamp => SqlValue::TimestampArray(collect(scalars, |v| match v {
                SqlValue::Timestamp(t) => Some(t),
                _ => None,
            })?),
            ColumnType::Json => SqlValue::JsonArray(collect(scalars, |v| match v {
                SqlValue::Json(j) => Some(j),
                _ => None,
            })?),
            ColumnType::Uuid => SqlValue::UuidArray(collect(scalars, |v| match v {
                SqlValue::Uuid(u) => Some(u),
                _ => None,
            })?),
        })
    }
}

fn collect<T>(values: Vec<SqlValue>, pick: impl Fn(SqlValue) -> Option<T>) -> Result<Vec<T>, String> {
    values
        .into_iter()
        .map(|v| pick(v).ok_or_else(|| "array elements may not be null".to_string()))
        .collect()
}

/// Elements of an array value. Accepts JSON arrays and simple Postgres array
/// literals such as `{}` or `{a,b}`.
fn array_items(value: &Value) -> Result<Vec<Value>, String> {
    match value {
        Value::Array(items) => Ok(items.clone()),
        Value::String(s) => {
            let trimmed = s.trim();
            let inner = trimmed
                .strip_prefix('{')
                .and_then(|rest| rest.strip_suffix('}'))
                .ok_or_else(|| format!("expected an array, got {:?}", s))?;
            if inner.trim().is_empty() {
                return Ok(Vec::new());
            }
            Ok(inner
                .split(',')
                .map(|item| Value::String(item.trim().trim_matches('"').to_string()))
                .collect())
        }
        other => Err(format!("expected an array, got {}", other)),
    }
}

fn coerce_scalar(value: &Value, ty: ColumnType) -> Result<SqlValue, String> {
    if value.is_null() {
        return Ok(SqlValue::Null);
    }
    match ty {
        ColumnType::Text => Ok(SqlValue::Text(match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })),
        ColumnType::Int32 => {
            let n = integer(value)?;
            i32::try_from(n)
                .map(SqlValue::Int32)
                .map_err(|_| format!("{} is out of range for int", n))
        }
        ColumnType::Int64 => integer(value).map(SqlValue::Int64),
        ColumnType::Bool => match value {
            Value::Bool(b) => Ok(SqlValue::Bool(*b)),
            Value::Number(n) if n.as_i64() == Some(0) => Ok(SqlValue::Bool(false)),
            Value::Number(n) if n.as_i64() == Some(1) => Ok(SqlValue::Bool(true)),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "t" | "yes" | "1" => Ok(SqlValue::Bool(true)),
                "false" | "f" | "no" | "0" => Ok(SqlValue::Bool(false)),
                _ => Err(format!("{:?} is not a boolean", s)),
            },
            other => Err(format!("{} is not a boolean", other)),
        },
        ColumnType::Timestamp => timestamp(value).map(SqlValue::Timestamp),
        ColumnType::Json => Ok(SqlValue::Json(value.clone())),
        ColumnType::Uuid => match value {
            Value::String(s) => Uuid::parse_str(s.trim())
                .map(SqlValue::Uuid)
                .map_err(|e| format!("{:?} is not a uuid: {}", s, e)),
            other => Err(format!("{} is not a uuid", other)),
        },
    }
}

fn integer(value: &Value) -> Result<i64, String> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(i)
            } else {
                match n.as_f64() {
                    Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Ok(f as i64),
                    _ => Err(format!("{} is not an integer", n)),
                }
            }
        }
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| format!("{:?} is not an integer", s)),
        Value::Bool(b) => Ok(i64::from(*b)),
        other => Err(format!("{} is not an integer", other)),
    }
}

/// Parses RFC 3339 strings, common naive date-time layouts (taken as UTC) and
/// Unix milliseconds.
pub fn timestamp(value: &Value) -> Result<DateTime<Utc>, String> {
    match value {
        Value::Number(n) => {
            let millis = n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f as i64))
                .ok_or_else(|| format!("{} is not a timestamp", n))?;
            DateTime::from_timestamp_millis(millis)
                .ok_or_else(|| format!("{} is out of range for a timestamp", millis))
        }
        Value::String(s) => {
            let s = s.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Ok(dt.with_timezone(&Utc));
            }
            for layout in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
                if let Ok(naive) = NaiveDateTime::parse_from_str(s, layout) {
                    return Ok(naive.and_utc());
                }
            }
            Err(format!("{:?} is not a timestamp", s))
        }
        other => Err(format!("{} is not a timestamp", other)),
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => write!(f, "NULL"),
            SqlValue::Text(s) => write!(f, "{:?}", s),
            SqlValue::Int32(n) => write!(f, "{}", n),
            SqlValue::Int64(n) => write!(f, "{}", n),
            SqlValue::Bool(b) => write!(f, "{}", b),
            SqlValue::Timestamp(t) => write!(f, "{}", t.to_rfc3339()),
            SqlValue::Json(v) => write!(f, "{}", v),
            SqlValue::Uuid(u) => write!(f, "{}", u),
            SqlValue::TextArray(v) => write!(f, "{:?}", v),
            SqlValue::Int32Array(v) => write!(f, "{:?}", v),
            SqlValue::Int64Array(v) => write!(f, "{:?}", v),
            SqlValue::BoolArray(v) => write!(f, "{:?}", v),
            SqlValue::TimestampArray(v) => {
                let items: Vec<String> = v.iter().map(|t| t.to_rfc3339()).collect();
                write!(f, "{:?}", items)
            }
            SqlValue::JsonArray(v) => write!(f, "{}", Value::Array(v.clone())),
            SqlValue::UuidArray(v) => {
                let items: Vec<String> = v.iter().map(Uuid::to_string).collect();
                write!(f, "{:?}", items)
            }
        }
    }
}

impl ToSql for SqlValue {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
        match self {
            SqlValue::Null => Ok(IsNull::Yes),
            SqlValue::Text(v) => v.to_sql(ty, out),
            SqlValue::Int32(v) => v.to_sql(ty, out),
            SqlValue::Int64(v) => v.to_sql(ty, out),
            SqlValue::Bool(v) => v.to_sql(ty, out),
            SqlValue::Timestamp(v) => v.to_sql(ty, out),
            SqlValue::Json(v) => v.to_sql(ty, out),
            SqlValue::Uuid(v) => v.to_sql(ty, out),
            SqlValue::TextArray(v) => v.to_sql(ty, out),
            SqlValue::Int32Array(v) => v.to_sql(ty, out),
            SqlValue::Int64Array(v) => v.to_sql(ty, out),
            SqlValue::BoolArray(v) => v.to_sql(ty, out),
            SqlValue::TimestampArray(v) => v.to_sql(ty, out),
            SqlValue::JsonArray(v) => v.to_sql(ty, out),
            SqlValue::UuidArray(v) => v.to_sql(ty, out),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    // Delegates so the inner type checks the column type.
    fn to_sql_checked(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
        match self {
            SqlValue::Null => Ok(IsNull::Yes),
            SqlValue::Text(v) => v.to_sql_checked(ty, out),
            SqlValue::Int32(v) => v.to_sql_checked(ty, out),
            SqlValue::Int64(v) => v.to_sql_checked(ty, out),
            SqlValue::Bool(v) => v.to_sql_checked(ty, out),
            SqlValue::Timestamp(v) => v.to_sql_checked(ty, out),
            SqlValue::Json(v) => v.to_sql_checked(ty, out),
            SqlValue::Uuid(v) => v.to_sql_checked(ty, out),
            SqlValue::TextArray(v) => v.to_sql_checked(ty, out),
            SqlValue::Int32Array(v) => v.to_sql_checked(ty, out),
            SqlValue::Int64Array(v) => v.to_sql_checked(ty, out),
            SqlValue::BoolArray(v) => v.to_sql_checked(ty, out),
            SqlValue::TimestampArray(v) => v.to_sql_checked(ty, out),
            SqlValue::JsonArray(v) => v.to_sql_checked(ty, out),
            SqlValue::UuidArray(v) => v.to_sql_checked(ty, out),
        }
    }
}
