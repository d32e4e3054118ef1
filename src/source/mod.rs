//! Document sources records are read from.

mod json_dir;
mod memory;

pub use json_dir::JsonDirSource;
pub use memory::MemorySource;

use serde_json::{Map, Value};

use crate::error::SourceError;

/// One schema-less source document.
pub type Record = Map<String, Value>;

pub trait Source {
    /// Names of every entity (collection) the source holds.
    fn list_entities(&self) -> Result<Vec<String>, SourceError>;

    /// All records of `entity`. Fails with [`SourceError::NotFound`] when the
    /// entity does not exist.
    fn get_records(&self, entity: &str) -> Result<Vec<Record>, SourceError>;

    fn get_count(&self, entity: &str) -> Result<u64, SourceError>;

    /// Source-specific final coercion of a transformed value, e.g. flattening
    /// a rich source type into a plain one. `None` when no special parsing
    /// applies.
    fn extra_parse(&self, value: &Value) -> Option<Value>;
}

impl<S: Source + ?Sized> Source for &S {
    fn list_entities(&self) -> Result<Vec<String>, SourceError> {
        (**self).list_entities()
    }

    fn get_records(&self, entity: &str) -> Result<Vec<Record>, SourceError> {
        (**self).get_records(entity)
    }

    fn get_count(&self, entity: &str) -> Result<u64, SourceError> {
        (**self).get_count(entity)
    }

    fn extra_parse(&self, value: &Value) -> Option<Value> {
        (**self).extra_parse(value)
    }
}
