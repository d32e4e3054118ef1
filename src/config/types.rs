//! Configuration type definitions.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

use crate::column::{ColumnType, Fallback};
use crate::transform::{FlagCase, OnMiss};

/// Root of a table declaration file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Named key/value tables usable by `lookup` transforms.
    #[serde(default)]
    pub resolvers: BTreeMap<String, BTreeMap<String, Value>>,

    pub tables: Vec<TableConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TableConfig {
    /// Source entity name.
    pub source: String,

    /// Destination table name (defaults to the source name).
    #[serde(default)]
    pub dest: Option<String>,

    #[serde(default)]
    pub tolerate_foreign_key_violation: bool,

    #[serde(default)]
    pub tolerate_unique_violation: bool,

    /// Create the table empty when the source has no such entity.
    #[serde(default)]
    pub tolerate_missing_source: bool,

    /// Treat a transformed `"none"` string as no value.
    #[serde(default = "default_true")]
    pub normalize_none: bool,

    /// Columns or expressions of the table's index.
    #[serde(default)]
    pub index: Vec<String>,

    pub columns: Vec<ColumnConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ColumnConfig {
    /// Source field. Empty for columns with no source analogue.
    #[serde(default)]
    pub source: String,

    pub dest: String,

    #[serde(rename = "type")]
    pub ty: ColumnType,

    #[serde(default)]
    pub array: bool,

    #[serde(default)]
    pub nullable: bool,

    /// `skip`, `required`, `"null"` or `{ value: ... }`.
    #[serde(default)]
    pub default: Option<Fallback>,

    /// Raw SQL expression for the column's `DEFAULT` clause.
    #[serde(default)]
    pub sql_default: Option<String>,

    #[serde(default)]
    pub unique: bool,

    /// Foreign key target written as `table.column`.
    #[serde(default)]
    pub references: Option<String>,

    #[serde(default)]
    pub transforms: Vec<TransformSpec>,
}

/// A built-in transform and its arguments, e.g. `trim` or
/// `{ normalize_link: { label: Support } }`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformSpec {
    Trim,
    Lowercase,
    ToList,
    ToTimestamp,
    Sha512Each,
    NormalizeLink {
        label: String,
    },
    CollectLinks {
        fields: Vec<String>,
    },
    RandomIfMissing {
        #[serde(default = "default_random_length")]
        length: usize,
    },
    DedupeRandom {
        field: String,
        #[serde(default = "default_random_length")]
        length: usize,
    },
    FirstFlag {
        cases: Vec<FlagCase>,
    },
    Lookup {
        resolver: String,
        /// Record field holding the key; the current value when unset.
        #[serde(default)]
        key: Option<String>,
        #[serde(default)]
        on_miss: OnMiss,
        #[serde(default)]
        only_if_missing: bool,
    },
}

fn default_true() -> bool {
    true
}

fn default_random_length() -> usize {
    8
}
