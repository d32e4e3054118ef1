use std::collections::BTreeMap;

use serde_json::Value;

use super::{Record, Source};
use crate::error::SourceError;

/// Entities held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    entities: BTreeMap<String, Vec<Record>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entity(mut self, entity: impl Into<String>, records: Vec<Record>) -> Self {
        self.insert(entity, records);
        self
    }

    /// Adds an entity from JSON objects. Values that are not objects are ignored.
    pub fn with_json(self, entity: impl Into<String>, records: Vec<Value>) -> Self {
        let records = records
            .into_iter()
            .filter_map(|v| match v {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .collect();
        self.with_entity(entity, records)
    }

    pub fn insert(&mut self, entity: impl Into<String>, records: Vec<Record>) {
        self.entities.insert(entity.into(), records);
    }
}

impl Source for MemorySource {
    fn list_entities(&self) -> Result<Vec<String>, SourceError> {
        Ok(self.entities.keys().cloned().collect())
    }

    fn get_records(&self, entity: &str) -> Result<Vec<Record>, SourceError> {
        self.entities
            .get(entity)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(entity.to_string()))
    }

    fn get_count(&self, entity: &str) -> Result<u64, SourceError> {
        self.entities
            .get(entity)
            .map(|records| records.len() as u64)
            .ok_or_else(|| SourceError::NotFound(entity.to_string()))
    }

    fn extra_parse(&self, _value: &Value) -> Option<Value> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_entity_is_not_found() {
        let source = MemorySource::new().with_json("users", vec![json!({"a": 1}), json!(2)]);
        assert_eq!(source.list_entities().unwrap(), vec!["users"]);
        assert_eq!(source.get_count("users").unwrap(), 1);
        assert!(matches!(
            source.get_records("bots"),
            Err(SourceError::NotFound(e)) if e == "bots"
        ));
    }
}
