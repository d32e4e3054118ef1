//! Error types for the migration engine.

use thiserror::Error;

/// Fatal errors. Any of these stops the whole run.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Table declarations are invalid
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The source could not deliver the records of an entity
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// A schema statement failed. Schema setup has no tolerance policy.
    #[error("Schema statement failed: {statement}\n  Cause: {source}")]
    Schema {
        statement: String,
        #[source]
        source: SinkError,
    },

    /// A required column had no value after transforms and defaulting
    #[error("Table {table}: no value for column {column} at row {row}: {reason}")]
    MissingValue {
        table: String,
        row: usize,
        column: String,
        reason: String,
    },

    /// A resolved value does not fit the column type
    #[error("Table {table}: cannot convert column {column} at row {row}: {message}")]
    Coerce {
        table: String,
        row: usize,
        column: String,
        message: String,
    },

    /// An insert failed with an error the table does not tolerate
    #[error("Table {table}: insert #{row} failed: {source}\n  Statement: {sql}\n  Args: {args}")]
    Insert {
        table: String,
        row: usize,
        sql: String,
        args: String,
        #[source]
        source: SinkError,
    },

    /// Foreign keys between the declared tables form a cycle
    #[error("Cyclic foreign key dependency between tables: {}", .0.join(", "))]
    CyclicDependency(Vec<String>),

    /// Migration was stopped between two tables
    #[error("Migration cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MigrateError {
    /// Format error with its full cause chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);
        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }
        output
    }
}

/// Errors raised while building table declarations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("table {0}: destination name must not be empty")]
    EmptyTableName(String),

    #[error("table {table}: column destination name must not be empty")]
    EmptyColumnName { table: String },

    #[error("table {table}: duplicate destination column {column}")]
    DuplicateColumn { table: String, column: String },

    #[error("table {table}: column {column}: {message}")]
    InvalidColumn {
        table: String,
        column: String,
        message: String,
    },

    #[error("unknown resolver {0}")]
    UnknownResolver(String),
}

/// Errors reported by a [`crate::source::Source`].
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("entity {0} not found")]
    NotFound(String),

    #[error("entity {entity}: {message}")]
    Parse { entity: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Category of a sink failure, enough to apply a table's tolerance policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkErrorKind {
    ForeignKeyViolation,
    UniqueViolation,
    Other,
}

/// Error reported by a [`crate::sink::Sink`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct SinkError {
    pub kind: SinkErrorKind,
    pub message: String,
}

impl SinkError {
    pub fn new(kind: SinkErrorKind, message: impl Into<String>) -> Self {
        SinkError {
            kind,
            message: message.into(),
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(SinkErrorKind::Other, message)
    }

    pub fn is_foreign_key_violation(&self) -> bool {
        self.kind == SinkErrorKind::ForeignKeyViolation
    }

    pub fn is_unique_violation(&self) -> bool {
        self.kind == SinkErrorKind::UniqueViolation
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
