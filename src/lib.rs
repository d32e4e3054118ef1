//! Main library entry point for doc-pg-migrate.
//!
//! Migrates schema-less document collections into relational PostgreSQL
//! tables: each declared [`Table`] is created from scratch, every source record
//! is run through its columns' transform pipelines and default policies, and
//! the resulting rows are inserted one by one under the table's tolerance
//! policy.

pub mod apply;
pub mod args;
pub mod column;
pub mod config;
pub mod dependency;
pub mod error;
pub mod materialize;
pub mod orchestrator;
pub mod progress;
pub mod resolver;
pub mod schema;
pub mod sink;
pub mod source;
pub mod table;
pub mod transform;
pub mod value;

// Re-export key types for ergonomic access

pub use self::table::*;
pub use apply::{ApplyReport, apply_inserts};
pub use column::*;
pub use config::Config;
pub use dependency::dependency_order;
pub use error::{ConfigError, MigrateError, Result, SinkError, SinkErrorKind, SourceError};
pub use materialize::*;
pub use orchestrator::*;
pub use progress::{Level, Progress, ProgressBar, RecordingProgress, TracingProgress};
pub use resolver::{MapResolver, Resolver};
pub use schema::{DdlStatement, prepare_destination, synthesize};
pub use sink::{MemorySink, PostgresSink, Sink};
pub use source::{JsonDirSource, MemorySource, Record, Source};
pub use transform::{RowContext, Transform};
pub use value::{Cell, Resolution, SqlValue};
