use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::apply::apply_inserts;
use crate::dependency::dependency_order;
use crate::error::{MigrateError, Result, SourceError};
use crate::materialize::materialize_table;
use crate::progress::{Level, Progress, TracingProgress};
use crate::schema::{DdlStatement, prepare_destination, synthesize};
use crate::sink::Sink;
use crate::source::Source;
use crate::table::Table;

/// Outcome of migrating one table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableReport {
    pub table: String,
    pub source_rows: usize,
    pub skipped_rows: usize,
    pub inserted: u64,
    pub fk_skipped: usize,
    pub unique_skipped: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub tables: Vec<TableReport>,
}

impl MigrationReport {
    pub fn inserted(&self) -> u64 {
        self.tables.iter().map(|t| t.inserted).sum()
    }

    pub fn table(&self, name: &str) -> Option<&TableReport> {
        self.tables.iter().find(|t| t.table == name)
    }
}

/// Drives a whole migration: prepares the destination, then migrates every
/// declared table in foreign-key order.
pub struct MigrationOrchestrator<S, K> {
    tables: Vec<Table>,
    source: S,
    sink: K,
    progress: Box<dyn Progress>,
    stop: Arc<AtomicBool>,
    preparation: Option<bool>,
}

impl<S: Source, K: Sink> MigrationOrchestrator<S, K> {
    pub fn new(tables: Vec<Table>, source: S, sink: K) -> Self {
        Self {
            tables,
            source,
            sink,
            progress: Box::new(TracingProgress),
            stop: Arc::new(AtomicBool::new(false)),
            preparation: None,
        }
    }

    pub fn with_progress(mut self, progress: impl Progress + 'static) -> Self {
        self.progress = Box::new(progress);
        self
    }

    /// Checked between tables; once set, [`run`](Self::run) returns
    /// [`MigrateError::Cancelled`] before starting the next table.
    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = stop;
        self
    }

    /// Prepare the destination before the first table, optionally dropping and
    /// recreating the `public` schema.
    pub fn with_preparation(mut self, reset_schema: bool) -> Self {
        self.preparation = Some(reset_schema);
        self
    }

    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    pub fn tables(&self) -> &[Table] {
        &self.tables
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    pub fn into_sink(self) -> K {
        self.sink
    }

    /// Runs the preparation statements. Failures are reported as warnings only.
    pub fn prepare(&mut self, reset_schema: bool) {
        for statement in prepare_destination(reset_schema) {
            if let Err(err) = self.sink.execute_ddl(&statement) {
                self.progress.notify(
                    Level::Warning,
                    &format!("Preparation statement failed: {}: {}", statement, err),
                );
            }
        }
    }

    pub fn plan(&self) -> Result<Vec<DdlStatement>> {
        plan(&self.tables)
    }

    pub fn migrate_table(&mut self, table: &Table) -> Result<TableReport> {
        migrate_one(table, &self.source, &mut self.sink, self.progress.as_ref())
    }

    pub fn run(&mut self) -> Result<MigrationReport> {
        if let Some(reset_schema) = self.preparation {
            self.prepare(reset_schema);
        }
        let order = dependency_order(&self.tables)?;
        let mut report = MigrationReport::default();
        for table in order {
            if self.stop.load(Ordering::Relaxed) {
                self.progress
                    .notify(Level::Warning, "Stop requested, not migrating further tables");
                return Err(MigrateError::Cancelled);
            }
            let table_report =
                migrate_one(table, &self.source, &mut self.sink, self.progress.as_ref())?;
            report.tables.push(table_report);
        }
        self.progress.notify(
            Level::Info,
            &format!(
                "Migrated {} tables, {} rows inserted",
                report.tables.len(),
                report.inserted()
            ),
        );
        Ok(report)
    }
}

/// The schema statements of every table, in the order a run executes them.
pub fn plan(tables: &[Table]) -> Result<Vec<DdlStatement>> {
    Ok(dependency_order(tables)?
        .into_iter()
        .flat_map(synthesize)
        .collect())
}

fn migrate_one<S, K>(
    table: &Table,
    source: &S,
    sink: &mut K,
    progress: &dyn Progress,
) -> Result<TableReport>
where
    S: Source + ?Sized,
    K: Sink + ?Sized,
{
    let name = table.dest().to_string();
    progress.notify(
        Level::Info,
        &format!("Migrating {} -> {}", table.source_entity(), name),
    );

    let records = match source.get_records(table.source_entity()) {
        Ok(records) => records,
        Err(SourceError::NotFound(entity)) if table.tolerates_missing_source() => {
            progress.notify(
                Level::Info,
                &format!("Entity {} not found on source, creating {} empty", entity, name),
            );
            Vec::new()
        }
        Err(err) => return Err(err.into()),
    };

    let mut bar = progress.start_bar(&name, 2);
    for statement in synthesize(table) {
        sink.execute_ddl(&statement)
            .map_err(|source| MigrateError::Schema {
                statement: statement.to_string(),
                source,
            })?;
    }

    let materialized = materialize_table(table, &records, source, progress)?;
    bar.increment();
    let applied = apply_inserts(table, &materialized.inserts, sink, progress)?;
    bar.increment();
    bar.complete();

    Ok(TableReport {
        table: name,
        source_rows: records.len(),
        skipped_rows: materialized.skipped,
        inserted: applied.inserted,
        fk_skipped: applied.fk_skipped,
        unique_skipped: applied.unique_skipped,
    })
}
