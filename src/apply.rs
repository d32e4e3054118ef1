//! Sequential insertion of materialized rows.

use crate::error::{MigrateError, Result};
use crate::materialize::InsertStatement;
use crate::progress::{Level, Progress};
use crate::sink::Sink;
use crate::table::Table;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub inserted: u64,
    /// Rows dropped because of a tolerated foreign-key violation.
    pub fk_skipped: usize,
    /// Rows dropped because of a tolerated unique violation.
    pub unique_skipped: usize,
}

/// Executes `inserts` one at a time, outside any transaction. A failure the
/// table does not tolerate stops the run; rows inserted before it stay.
pub fn apply_inserts<K>(
    table: &Table,
    inserts: &[InsertStatement],
    sink: &mut K,
    progress: &dyn Progress,
) -> Result<ApplyReport>
where
    K: Sink + ?Sized,
{
    let mut bar = progress.start_bar("inserting data", inserts.len() as u64);
    let mut report = ApplyReport::default();

    for (i, insert) in inserts.iter().enumerate() {
        bar.increment();
        let err = match sink.execute(insert) {
            Ok(affected) => {
                report.inserted += affected;
                continue;
            }
            Err(err) => err,
        };

        if table.tolerates_foreign_key_violation() && err.is_foreign_key_violation() {
            progress.notify(
                Level::Warning,
                &format!("Ignoring foreign key error on insert #{}: {}", i + 1, err),
            );
            report.fk_skipped += 1;
        } else if table.tolerates_unique_violation() && err.is_unique_violation() {
            progress.notify(
                Level::Warning,
                &format!("Ignoring unique error on insert #{}: {}", i + 1, err),
            );
            report.unique_skipped += 1;
        } else {
            progress.notify(Level::Error, &format!("Error on insert #{}: {}", i + 1, err));
            return Err(MigrateError::Insert {
                table: table.dest().to_string(),
                row: i + 1,
                sql: insert.sql(),
                args: insert.args_display(),
                source: err,
            });
        }
    }

    bar.complete();
    Ok(report)
}
