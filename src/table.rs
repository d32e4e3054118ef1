// src/table.rs
// Destination table names and the per-table migration declaration.

use std::collections::HashSet;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use crate::column::{Column, ForeignKey};
use crate::error::ConfigError;

/// A destination table name, optionally schema-qualified.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TableName {
    pub schema: Option<String>,
    pub name: String,
}

impl TableName {
    pub fn new(full_name: &str) -> Self {
        if let Some((schema, name)) = full_name.split_once('.') {
            TableName {
                schema: Some(schema.to_string()),
                name: name.to_string(),
            }
        } else {
            TableName {
                schema: None,
                name: full_name.to_string(),
            }
        }
    }

    /// Whether `reference` (as written in a foreign key) points at this table.
    pub fn matches(&self, reference: &str) -> bool {
        let other = TableName::new(reference);
        match (&self.schema, &other.schema) {
            (Some(a), Some(b)) => a == b && self.name == other.name,
            _ => self.name == other.name,
        }
    }
}

impl FromStr for TableName {
    type Err = Infallible;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(TableName::new(s))
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{}.{}", schema, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// One migration unit: a source entity and the destination table built from it.
#[derive(Clone, Debug)]
pub struct Table {
    source_entity: String,
    dest: TableName,
    columns: Vec<Column>,
    index_columns: Vec<String>,
    tolerate_foreign_key_violation: bool,
    tolerate_unique_violation: bool,
    tolerate_missing_source: bool,
    normalize_none: bool,
}

impl Table {
    pub fn builder(source_entity: impl Into<String>, dest: &str) -> TableBuilder {
        TableBuilder {
            table: Table {
                source_entity: source_entity.into(),
                dest: TableName::new(dest),
                columns: Vec::new(),
                index_columns: Vec::new(),
                tolerate_foreign_key_violation: false,
                tolerate_unique_violation: false,
                tolerate_missing_source: false,
                normalize_none: true,
            },
        }
    }

    pub fn source_entity(&self) -> &str {
        &self.source_entity
    }

    pub fn dest(&self) -> &TableName {
        &self.dest
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn index_columns(&self) -> &[String] {
        &self.index_columns
    }

    pub fn tolerates_foreign_key_violation(&self) -> bool {
        self.tolerate_foreign_key_violation
    }

    pub fn tolerates_unique_violation(&self) -> bool {
        self.tolerate_unique_violation
    }

    pub fn tolerates_missing_source(&self) -> bool {
        self.tolerate_missing_source
    }

    /// Whether a transformed `"none"` string counts as no value.
    pub fn normalizes_none(&self) -> bool {
        self.normalize_none
    }

    /// Foreign keys declared by this table's columns.
    pub fn foreign_keys(&self) -> impl Iterator<Item = &ForeignKey> {
        self.columns
            .iter()
            .filter_map(|c| c.constraints().foreign_key.as_ref())
    }
}

/// Builds an immutable [`Table`], validating its columns.
pub struct TableBuilder {
    table: Table,
}

impl TableBuilder {
    pub fn column(mut self, column: Column) -> Self {
        self.table.columns.push(column);
        self
    }

    pub fn columns(mut self, columns: impl IntoIterator<Item = Column>) -> Self {
        self.table.columns.extend(columns);
        self
    }

    pub fn index_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.table.index_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn tolerate_foreign_key_violation(mut self, tolerate: bool) -> Self {
        self.table.tolerate_foreign_key_violation = tolerate;
        self
    }

    pub fn tolerate_unique_violation(mut self, tolerate: bool) -> Self {
        self.table.tolerate_unique_violation = tolerate;
        self
    }

    pub fn tolerate_missing_source(mut self, tolerate: bool) -> Self {
        self.table.tolerate_missing_source = tolerate;
        self
    }

    pub fn normalize_none(mut self, normalize: bool) -> Self {
        self.table.normalize_none = normalize;
        self
    }

    pub fn build(self) -> Result<Table, ConfigError> {
        let table = self.table;
        if table.dest.name.is_empty() {
            return Err(ConfigError::EmptyTableName(table.source_entity));
        }
        let mut seen = HashSet::new();
        for column in &table.columns {
            if column.dest_name().is_empty() {
                return Err(ConfigError::EmptyColumnName {
                    table: table.dest.to_string(),
                });
            }
            if !seen.insert(column.dest_name()) {
                return Err(ConfigError::DuplicateColumn {
                    table: table.dest.to_string(),
                    column: column.dest_name().to_string(),
                });
            }
        }
        Ok(table)
    }
}
