use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Number, Value};
use tracing::debug;

use super::{Record, Source};
use crate::error::SourceError;

const EXTENSIONS: [&str; 2] = ["json", "jsonl"];

/// A directory of exported collections, one `<entity>.json` (an array of
/// documents) or `<entity>.jsonl` (one document per line) file per entity.
///
/// Exports in MongoDB Extended JSON are flattened on the way out: `$oid`
/// becomes its hex string, `$date` an RFC 3339 timestamp and the `$number*`
/// wrappers plain numbers.
#[derive(Debug, Clone)]
pub struct JsonDirSource {
    root: PathBuf,
    ignore: BTreeSet<String>,
}

impl JsonDirSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        JsonDirSource {
            root: root.into(),
            ignore: BTreeSet::new(),
        }
    }

    /// Entities that are neither listed nor readable.
    pub fn with_ignore<I, S>(mut self, entities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignore.extend(entities.into_iter().map(Into::into));
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entity_path(&self, entity: &str) -> Option<PathBuf> {
        if self.ignore.contains(entity) {
            return None;
        }
        EXTENSIONS
            .iter()
            .map(|ext| self.root.join(format!("{}.{}", entity, ext)))
            .find(|path| path.is_file())
    }
}

impl Source for JsonDirSource {
    fn list_entities(&self) -> Result<Vec<String>, SourceError> {
        let mut entities = BTreeSet::new();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            let is_export = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| EXTENSIONS.contains(&e));
            if !is_export || !path.is_file() {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if !self.ignore.contains(stem) {
                    entities.insert(stem.to_string());
                }
            }
        }
        Ok(entities.into_iter().collect())
    }

    fn get_records(&self, entity: &str) -> Result<Vec<Record>, SourceError> {
        let path = self
            .entity_path(entity)
            .ok_or_else(|| SourceError::NotFound(entity.to_string()))?;
        debug!(entity, path = %path.display(), "reading records");
        let text = fs::read_to_string(&path)?;
        let parse_error = |message: String| SourceError::Parse {
            entity: entity.to_string(),
            message,
        };

        let values: Vec<Value> = if path.extension().is_some_and(|e| e == "jsonl") {
            text.lines()
                .enumerate()
                .filter(|(_, line)| !line.trim().is_empty())
                .map(|(n, line)| {
                    serde_json::from_str(line)
                        .map_err(|e| parse_error(format!("line {}: {}", n + 1, e)))
                })
                .collect::<Result<_, _>>()?
        } else {
            match serde_json::from_str(&text).map_err(|e| parse_error(e.to_string()))? {
                Value::Array(items) => items,
                Value::Object(doc) => vec![Value::Object(doc)],
                _ => return Err(parse_error("expected an array of documents".into())),
            }
        };

        values
            .into_iter()
            .enumerate()
            .map(|(n, value)| match value {
                Value::Object(doc) => Ok(doc),
                _ => Err(parse_error(format!("document {} is not an object", n))),
            })
            .collect()
    }

    fn get_count(&self, entity: &str) -> Result<u64, SourceError> {
        Ok(self.get_records(entity)?.len() as u64)
    }

    fn extra_parse(&self, value: &Value) -> Option<Value> {
        flatten(value)
    }
}

/// Flattens Extended JSON wrappers anywhere inside `value`. `None` when there
/// was nothing to flatten.
fn flatten(value: &Value) -> Option<Value> {
    match value {
        Value::Object(map) => {
            if map.len() == 1 {
                if let Some((key, inner)) = map.iter().next() {
                    if let Some(plain) = unwrap_extended(key, inner) {
                        return Some(plain);
                    }
                }
            }
            let mut changed = false;
            let flat: Map<String, Value> = map
                .iter()
                .map(|(k, v)| {
                    let v = match flatten(v) {
                        Some(flat) => {
                            changed = true;
                            flat
                        }
                        None => v.clone(),
                    };
                    (k.clone(), v)
                })
                .collect();
            changed.then_some(Value::Object(flat))
        }
        Value::Array(items) => {
            let mut changed = false;
            let flat: Vec<Value> = items
                .iter()
                .map(|v| match flatten(v) {
                    Some(flat) => {
                        changed = true;
                        flat
                    }
                    None => v.clone(),
                })
                .collect();
            changed.then_some(Value::Array(flat))
        }
        _ => None,
    }
}

fn unwrap_extended(key: &str, inner: &Value) -> Option<Value> {
    match key {
        "$oid" | "$numberDecimal" => inner.as_str().map(Value::from),
        "$numberLong" | "$numberInt" => match inner {
            Value::String(s) => s.parse::<i64>().ok().map(Value::from),
            Value::Number(n) => Some(Value::Number(n.clone())),
            _ => None,
        },
        "$numberDouble" => {
            let s = inner.as_str()?;
            let n = s.parse::<f64>().ok()?;
            // NaN and the infinities have no JSON number form.
            Some(Number::from_f64(n).map_or_else(|| Value::from(s), Value::Number))
        }
        "$date" => date(inner).map(|d| Value::from(d.to_rfc3339_opts(SecondsFormat::Millis, true))),
        _ => None,
    }
}

fn date(inner: &Value) -> Option<DateTime<Utc>> {
    match inner {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|d| d.with_timezone(&Utc)),
        Value::Number(n) => DateTime::from_timestamp_millis(n.as_i64()?),
        Value::Object(map) => {
            let millis = map.get("$numberLong")?.as_str()?.parse().ok()?;
            DateTime::from_timestamp_millis(millis)
        }
        _ => None,
    }
}
