//! Transforms available to table declarations by name.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Deserialize;
use serde_json::{Value, json};
use sha2::{Digest, Sha512};
use tracing::debug;

use super::link::{normalize_link, title_case};
use super::{RowContext, Transform};
use crate::resolver::Resolver;
use crate::value::Cell;

const LETTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Random string of ASCII letters.
pub fn random_string(length: usize) -> String {
    let mut rng = rand::rng();
    (0..length)
        .map(|_| LETTERS[rng.random_range(0..LETTERS.len())] as char)
        .collect()
}

fn map_str(cell: Cell, f: impl FnOnce(&str) -> String) -> Cell {
    match cell {
        Cell::Value(Value::String(s)) => Cell::string(f(&s)),
        other => other,
    }
}

/// Trims surrounding whitespace.
#[derive(Debug, Clone, Copy, Default)]
pub struct Trim;

impl Transform for Trim {
    fn apply(&self, _ctx: &RowContext<'_>, cell: Cell) -> Cell {
        map_str(cell, |s| s.trim().to_string())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Lowercase;

impl Transform for Lowercase {
    fn apply(&self, _ctx: &RowContext<'_>, cell: Cell) -> Cell {
        map_str(cell, str::to_lowercase)
    }
}

/// `"a, b,c"` -> `["a", "b", "c"]`. Non-strings pass through.
#[derive(Debug, Clone, Copy, Default)]
pub struct ToList;

impl Transform for ToList {
    fn apply(&self, _ctx: &RowContext<'_>, cell: Cell) -> Cell {
        match cell {
            Cell::Value(Value::String(s)) => {
                let compact: String = s.chars().filter(|c| *c != ' ').collect();
                let items = compact
                    .split(',')
                    .map(|item| Value::String(item.to_string()))
                    .collect();
                Cell::Value(Value::Array(items))
            }
            other => other,
        }
    }
}

/// Converts Unix milliseconds, numeric strings, RFC 3339 strings and `NOW`
/// markers into an RFC 3339 timestamp.
#[derive(Debug, Clone, Copy, Default)]
pub struct ToTimestamp;

impl ToTimestamp {
    fn from_millis(millis: i64) -> Cell {
        match DateTime::from_timestamp_millis(millis) {
            Some(dt) => Cell::string(dt.to_rfc3339()),
            None => Cell::Fail(format!("{} is out of range for a timestamp", millis)),
        }
    }
}

impl Transform for ToTimestamp {
    fn apply(&self, _ctx: &RowContext<'_>, cell: Cell) -> Cell {
        let value = match cell {
            Cell::Value(v) => v,
            other => return other,
        };
        match value {
            Value::Number(n) => match n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)) {
                Some(millis) => Self::from_millis(millis),
                None => Cell::Fail(format!("{} is not a timestamp", n)),
            },
            Value::String(s) => {
                if let Ok(millis) = s.trim().parse::<i64>() {
                    Self::from_millis(millis)
                } else if let Ok(dt) = DateTime::parse_from_rfc3339(s.trim()) {
                    Cell::string(dt.with_timezone(&Utc).to_rfc3339())
                } else if s.contains("NOW") {
                    Cell::string(Utc::now().to_rfc3339())
                } else {
                    Cell::Fail(format!("{:?} is not a timestamp", s))
                }
            }
            other => Cell::Value(other),
        }
    }
}

/// Normalizes the current value as a link labelled `label`. Invalid links
/// become the empty string.
#[derive(Debug, Clone)]
pub struct NormalizeLink {
    pub label: String,
}

impl Transform for NormalizeLink {
    fn apply(&self, _ctx: &RowContext<'_>, cell: Cell) -> Cell {
        map_str(cell, |s| normalize_link(&self.label, s))
    }
}

/// Builds a JSON array of `{name, value}` links from several record fields.
#[derive(Debug, Clone)]
pub struct CollectLinks {
    pub fields: Vec<String>,
}

impl Transform for CollectLinks {
    fn apply(&self, ctx: &RowContext<'_>, _cell: Cell) -> Cell {
        let links: Vec<Value> = self
            .fields
            .iter()
            .filter_map(|field| {
                let raw = ctx.field_str(field)?;
                let name = title_case(field);
                let value = normalize_link(&name, raw);
                (!value.is_empty()).then(|| json!({ "name": name, "value": value }))
            })
            .collect();
        Cell::Value(Value::Array(links))
    }
}

/// Generates a random letter string when the column has no value.
#[derive(Debug, Clone, Copy)]
pub struct RandomIfMissing {
    pub length: usize,
}

impl Transform for RandomIfMissing {
    fn apply(&self, _ctx: &RowContext<'_>, cell: Cell) -> Cell {
        if cell.is_absent() {
            Cell::string(random_string(self.length))
        } else {
            cell
        }
    }
}

/// Replaces the value with a random string when it is missing or when more
/// than one record of the entity carries it in `field` (case-insensitive).
#[derive(Debug, Clone)]
pub struct DedupeRandom {
    pub field: String,
    pub length: usize,
}

impl Transform for DedupeRandom {
    fn apply(&self, ctx: &RowContext<'_>, cell: Cell) -> Cell {
        let current = match &cell {
            Cell::Absent => return Cell::string(random_string(self.length)),
            Cell::Value(Value::String(s)) => s.clone(),
            _ => return cell,
        };
        let count = ctx
            .siblings
            .iter()
            .filter_map(|record| record.get(&self.field).and_then(Value::as_str))
            .filter(|other| other.eq_ignore_ascii_case(&current))
            .count();
        if count > 1 {
            debug!(value = %current, count, "duplicate value, generating a new one");
            Cell::string(random_string(self.length))
        } else {
            cell
        }
    }
}

/// Hashes every element of an array with SHA-512 (hex). Anything that is
/// not an array becomes an empty array.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha512Each;

impl Transform for Sha512Each {
    fn apply(&self, _ctx: &RowContext<'_>, cell: Cell) -> Cell {
        let items = match cell {
            Cell::Value(Value::Array(items)) => items,
            _ => return Cell::Value(Value::Array(Vec::new())),
        };
        let hashed = items
            .iter()
            .map(|item| {
                let text = match item {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                Value::String(hex::encode(Sha512::digest(text.as_bytes())))
            })
            .collect();
        Cell::Value(Value::Array(hashed))
    }
}

/// One `field -> value` case of [`FirstFlag`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FlagCase {
    pub field: String,
    pub value: Value,
}

/// The first case whose record field is `true` decides the value.
#[derive(Debug, Clone)]
pub struct FirstFlag {
    pub cases: Vec<FlagCase>,
}

impl Transform for FirstFlag {
    fn apply(&self, ctx: &RowContext<'_>, cell: Cell) -> Cell {
        self.cases
            .iter()
            .find(|case| ctx.field(&case.field).and_then(Value::as_bool) == Some(true))
            .map(|case| Cell::from_value(case.value.clone()))
            .unwrap_or(cell)
    }
}

/// What a [`Lookup`] produces when the resolver has no answer.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnMiss {
    #[default]
    Keep,
    Skip,
    Fail,
    Null,
    Value(Value),
}

/// Resolves a value through an external [`Resolver`], keyed by a record field
/// or by the current value.
#[derive(Clone)]
pub struct Lookup {
    /// Record field holding the key. `None` uses the current value.
    pub key_field: Option<String>,
    pub resolver: Arc<dyn Resolver>,
    pub on_miss: OnMiss,
    /// Only consult the resolver when the column has no value.
    pub only_if_missing: bool,
}

impl Lookup {
    fn key(&self, ctx: &RowContext<'_>, cell: &Cell) -> Option<String> {
        let value = match &self.key_field {
            Some(field) => ctx.field(field)?,
            None => cell.value()?,
        };
        match value {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    fn miss(&self, cell: Cell, key: Option<&str>) -> Cell {
        match &self.on_miss {
            OnMiss::Keep => cell,
            OnMiss::Skip => Cell::Skip,
            OnMiss::Fail => Cell::Fail(format!(
                "lookup found nothing for {}",
                key.unwrap_or("<no key>")
            )),
            OnMiss::Null => Cell::Null,
            OnMiss::Value(v) => Cell::from_value(v.clone()),
        }
    }
}

impl Transform for Lookup {
    fn apply(&self, ctx: &RowContext<'_>, cell: Cell) -> Cell {
        if self.only_if_missing && !cell.is_absent() {
            return cell;
        }
        let Some(key) = self.key(ctx, &cell) else {
            return self.miss(cell, None);
        };
        match self.resolver.resolve(&key) {
            Some(value) => Cell::from_value(value),
            None => self.miss(cell, Some(&key)),
        }
    }
}
