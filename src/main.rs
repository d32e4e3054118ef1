//! Main binary entry point for doc-pg-migrate.

use anyhow::Result;
use doc_pg_migrate::args::{Command, get_args};
use doc_pg_migrate::{Config, JsonDirSource, MigrationOrchestrator, PostgresSink, Source};
use r2d2::Pool;
use r2d2_postgres::{PostgresConnectionManager, postgres::NoTls as R2d2NoTls};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn setup_logging(verbosity: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(verbosity));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let args = get_args()?;
    setup_logging(&args.verbosity);
    match args.command {
        Command::Migrate {
            uri,
            source,
            tables,
            reset_schema,
            ignore,
        } => {
            let tables = Config::load(&tables)?.tables()?;
            let source = JsonDirSource::new(source).with_ignore(ignore);
            let manager = PostgresConnectionManager::new(uri.parse()?, R2d2NoTls);
            let pool = Pool::new(manager)?;
            let mut client = pool.get()?;

            let stop = Arc::new(AtomicBool::new(false));
            let stop_clone = stop.clone();
            ctrlc::set_handler(move || {
                stop_clone.store(true, Ordering::Relaxed);
            })?;

            let mut orchestrator =
                MigrationOrchestrator::new(tables, source, PostgresSink::new(&mut *client))
                    .with_stop_flag(stop)
                    .with_preparation(reset_schema);
            let report = orchestrator.run().inspect_err(|e| error!("{}", e.format_detailed()))?;
            for table in &report.tables {
                info!(
                    table = %table.table,
                    source_rows = table.source_rows,
                    skipped = table.skipped_rows,
                    inserted = table.inserted,
                    fk_skipped = table.fk_skipped,
                    unique_skipped = table.unique_skipped,
                    "table migrated"
                );
            }
        }
        Command::Entities { source, ignore } => {
            let source = JsonDirSource::new(source).with_ignore(ignore);
            for entity in source.list_entities()? {
                println!("{}\t{}", entity, source.get_count(&entity)?);
            }
        }
        Command::Plan { tables } => {
            let tables = Config::load(&tables)?.tables()?;
            for statement in doc_pg_migrate::plan(&tables)? {
                println!("{};", statement);
            }
        }
    }
    Ok(())
}
