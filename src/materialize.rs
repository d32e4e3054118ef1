//! Turns source records into parameterized insert statements.

use std::fmt;

use itertools::Itertools;
use serde_json::Value;

use crate::column::{Column, Fallback};
use crate::error::{MigrateError, Result};
use crate::progress::{Level, Progress};
use crate::source::{Record, Source};
use crate::table::{Table, TableName};
use crate::transform::{RowContext, run_pipeline};
use crate::value::{Cell, Resolution, SqlValue};

/// One row ready to be inserted.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertStatement {
    pub table: TableName,
    pub columns: Vec<String>,
    pub args: Vec<SqlValue>,
}

impl InsertStatement {
    pub fn sql(&self) -> String {
        if self.columns.is_empty() {
            return format!("INSERT INTO {} DEFAULT VALUES", self.table);
        }
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.table,
            self.columns.join(","),
            (1..=self.columns.len()).map(|i| format!("${}", i)).join(",")
        )
    }

    /// The bound arguments, for error messages.
    pub fn args_display(&self) -> String {
        format!("[{}]", self.args.iter().join(", "))
    }

    /// The value bound to `column`, if it was not omitted.
    pub fn arg(&self, column: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|i| &self.args[i])
    }
}

impl fmt::Display for InsertStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.sql(), self.args_display())
    }
}

/// What became of one record.
#[derive(Debug, Clone, PartialEq)]
pub enum RowOutcome {
    Insert(InsertStatement),
    /// The row was dropped because of `column`.
    Skipped { column: String },
}

/// Materialized rows of one table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Materialized {
    pub inserts: Vec<InsertStatement>,
    pub skipped: usize,
}

fn is_null_expression(expression: &str) -> bool {
    expression.trim().eq_ignore_ascii_case("null")
}

/// Resolves one column of the record in `ctx` against its fallback policy.
pub fn resolve_column<S>(
    column: &Column,
    ctx: &RowContext<'_>,
    source: &S,
    normalize_none: bool,
) -> Resolution
where
    S: Source + ?Sized,
{
    let initial = if column.source_name().is_empty() {
        Cell::Absent
    } else {
        Cell::from_source(ctx.record.get(column.source_name()))
    };
    let mut cell = run_pipeline(column.transforms(), ctx, initial, source);

    if normalize_none && cell.as_str() == Some("none") {
        cell = Cell::Absent;
    }

    let failure = match cell {
        Cell::Value(value) => return Resolution::Value(value),
        Cell::Null => return Resolution::UseNull,
        Cell::Skip => return Resolution::SkipRow,
        Cell::Fail(reason) => Some(reason),
        Cell::Absent => None,
    };

    // Only a substitute value, a skip or a database-side default can stand in
    // for a failed transform.
    let null_or_fail = |failure: Option<String>| match failure {
        Some(reason) => Resolution::Fail(reason),
        None => Resolution::UseNull,
    };
    match column.fallback() {
        Some(Fallback::Value(value)) => Resolution::Value(value.clone()),
        Some(Fallback::Null) => null_or_fail(failure),
        Some(Fallback::Skip) => Resolution::SkipRow,
        Some(Fallback::Required) => {
            Resolution::Fail(failure.unwrap_or_else(|| "column is required".to_string()))
        }
        None => match column.sql_default() {
            Some(expression) if is_null_expression(expression) => null_or_fail(failure),
            Some(_) => Resolution::OmitColumn,
            None => null_or_fail(failure),
        },
    }
}

/// Materializes one record. `row` is the 1-based ordinal used in messages.
pub fn materialize_row<S>(
    table: &Table,
    ctx: &RowContext<'_>,
    source: &S,
    row: usize,
) -> Result<RowOutcome>
where
    S: Source + ?Sized,
{
    let mut columns = Vec::with_capacity(table.columns().len());
    let mut args = Vec::with_capacity(table.columns().len());

    for column in table.columns() {
        let value = match resolve_column(column, ctx, source, table.normalizes_none()) {
            Resolution::Value(value) => coerce(table, column, &value, row)?,
            Resolution::UseNull => SqlValue::Null,
            Resolution::OmitColumn => continue,
            Resolution::SkipRow => {
                return Ok(RowOutcome::Skipped {
                    column: column.dest_name().to_string(),
                });
            }
            Resolution::Fail(reason) => {
                return Err(MigrateError::MissingValue {
                    table: table.dest().to_string(),
                    row,
                    column: column.source_name().to_string(),
                    reason,
                });
            }
        };
        columns.push(column.dest_name().to_string());
        args.push(value);
    }

    Ok(RowOutcome::Insert(InsertStatement {
        table: table.dest().clone(),
        columns,
        args,
    }))
}

fn coerce(table: &Table, column: &Column, value: &Value, row: usize) -> Result<SqlValue> {
    SqlValue::coerce(value, column.ty(), column.is_array()).map_err(|message| {
        MigrateError::Coerce {
            table: table.dest().to_string(),
            row,
            column: column.dest_name().to_string(),
            message,
        }
    })
}

/// Materializes every record of a table. Nothing is inserted here, so a fatal
/// row aborts the table before any of its rows reach the destination.
pub fn materialize_table<S>(
    table: &Table,
    records: &[Record],
    source: &S,
    progress: &dyn Progress,
) -> Result<Materialized>
where
    S: Source + ?Sized,
{
    let name = format!("collecting {}", table.dest());
    let mut bar = progress.start_bar(&name, records.len() as u64);
    let mut materialized = Materialized::default();

    for (index, record) in records.iter().enumerate() {
        bar.increment();
        let row = index + 1;
        let ctx = RowContext::new(record, records, index);
        match materialize_row(table, &ctx, source, row)? {
            RowOutcome::Insert(insert) => materialized.inserts.push(insert),
            RowOutcome::Skipped { column } => {
                materialized.skipped += 1;
                progress.notify(
                    Level::Warning,
                    &format!(
                        "{}: skipping row {} due to default value of column {}",
                        table.dest(),
                        row,
                        column
                    ),
                );
            }
        }
    }

    bar.complete();
    Ok(materialized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::RecordingProgress;
    use crate::source::MemorySource;
    use crate::transform::Transform;
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    fn resolve(column: &Column, rec: Value) -> Resolution {
        let rec = record(rec);
        let ctx = RowContext::single(&rec);
        resolve_column(column, &ctx, &MemorySource::default(), true)
    }

    fn fail(_: &RowContext<'_>, _: Cell) -> Cell {
        Cell::Fail("bad value".to_string())
    }

    fn skip(_: &RowContext<'_>, _: Cell) -> Cell {
        Cell::Skip
    }

    #[test]
    fn present_values_win() {
        let column = Column::text("name", "name").default_value("unknown").build();
        assert_eq!(resolve(&column, json!({"name": "x"})), Resolution::Value(json!("x")));
        assert_eq!(resolve(&column, json!({})), Resolution::Value(json!("unknown")));
        assert_eq!(
            resolve(&column, json!({"name": null})),
            Resolution::Value(json!("unknown"))
        );
    }

    #[test]
    fn none_counts_as_missing() {
        let column = Column::text("bio", "bio").default_value("-").build();
        assert_eq!(resolve(&column, json!({"bio": "none"})), Resolution::Value(json!("-")));

        let table = Table::builder("t", "t")
            .column(Column::text("bio", "bio").build())
            .normalize_none(false)
            .build()
            .unwrap();
        let rec = record(json!({"bio": "none"}));
        let outcome = materialize_row(&table, &RowContext::single(&rec), &MemorySource::default(), 1).unwrap();
        let RowOutcome::Insert(insert) = outcome else {
            panic!("row was skipped");
        };
        assert_eq!(insert.args, vec![SqlValue::Text("none".into())]);
    }

    #[test]
    fn fallback_markers() {
        let null = Column::text("a", "a").null_if_missing().build();
        assert_eq!(resolve(&null, json!({})), Resolution::UseNull);

        let skip = Column::text("a", "a").skip_if_missing().build();
        assert_eq!(resolve(&skip, json!({})), Resolution::SkipRow);

        let required = Column::text("a", "a").required().build();
        assert!(matches!(resolve(&required, json!({})), Resolution::Fail(_)));

        let none = Column::text("a", "a").nullable(true).build();
        assert_eq!(resolve(&none, json!({})), Resolution::UseNull);
    }

    #[test]
    fn sql_defaults_omit_the_column() {
        let id = Column::uuid("", "id").sql_default("uuid_generate_v4()").build();
        assert_eq!(resolve(&id, json!({})), Resolution::OmitColumn);

        let now = Column::timestamp("at", "at").sql_default("NOW()").build();
        assert_eq!(resolve(&now, json!({})), Resolution::OmitColumn);

        let null = Column::text("a", "a").sql_default("NULL").build();
        assert_eq!(resolve(&null, json!({})), Resolution::UseNull);
    }

    #[test]
    fn failed_transforms_need_a_rescue() {
        let bare = Column::text("a", "a").transform(fail).build();
        assert_eq!(
            resolve(&bare, json!({"a": "x"})),
            Resolution::Fail("bad value".into())
        );

        let null = Column::text("a", "a").transform(fail).null_if_missing().build();
        assert!(matches!(resolve(&null, json!({})), Resolution::Fail(_)));

        let value = Column::text("a", "a").transform(fail).default_value("d").build();
        assert_eq!(resolve(&value, json!({})), Resolution::Value(json!("d")));

        let skip = Column::text("a", "a").transform(fail).skip_if_missing().build();
        assert_eq!(resolve(&skip, json!({})), Resolution::SkipRow);

        let omitted = Column::uuid("", "id")
            .transform(fail)
            .sql_default("uuid_generate_v4()")
            .build();
        assert_eq!(resolve(&omitted, json!({})), Resolution::OmitColumn);
    }

    #[test]
    fn transforms_can_skip_rows() {
        let column = Column::text("a", "a").transform(skip).default_value("d").build();
        assert_eq!(resolve(&column, json!({"a": "x"})), Resolution::SkipRow);
    }

    #[test]
    fn omitted_columns_leave_the_statement() {
        let table = Table::builder("bots", "bots")
            .column(Column::uuid("", "id").sql_default("uuid_generate_v4()").build())
            .column(Column::text("name", "name").build())
            .column(Column::int("votes", "votes").build())
            .build()
            .unwrap();
        let rec = record(json!({"name": "bot", "votes": "12"}));
        let outcome = materialize_row(&table, &RowContext::single(&rec), &MemorySource::default(), 1).unwrap();
        let RowOutcome::Insert(insert) = outcome else {
            panic!("row was skipped");
        };
        assert_eq!(insert.columns, vec!["name", "votes"]);
        assert_eq!(insert.args, vec![SqlValue::Text("bot".into()), SqlValue::Int32(12)]);
        assert_eq!(insert.sql(), "INSERT INTO bots (name,votes) VALUES ($1,$2)");
        assert_eq!(insert.arg("id"), None);
    }

    #[test]
    fn all_columns_omitted_uses_default_values() {
        let insert = InsertStatement {
            table: TableName::new("tags"),
            columns: vec![],
            args: vec![],
        };
        assert_eq!(insert.sql(), "INSERT INTO tags DEFAULT VALUES");
    }

    #[test]
    fn coercion_failures_name_row_and_column() {
        let table = Table::builder("t", "t")
            .column(Column::int("n", "n").build())
            .build()
            .unwrap();
        let rec = record(json!({"n": "twelve"}));
        let err = materialize_row(&table, &RowContext::single(&rec), &MemorySource::default(), 4).unwrap_err();
        assert!(matches!(
            err,
            MigrateError::Coerce { row: 4, ref column, .. } if column == "n"
        ));
    }

    #[test]
    fn skipped_rows_are_counted_and_reported() {
        let table = Table::builder("users", "users")
            .column(Column::text("id", "id").skip_if_missing().build())
            .build()
            .unwrap();
        let records = vec![
            record(json!({"id": "a"})),
            record(json!({})),
            record(json!({"id": "c"})),
        ];
        let progress = RecordingProgress::new();
        let out = materialize_table(&table, &records, &MemorySource::default(), &progress).unwrap();
        assert_eq!(out.inserts.len(), 2);
        assert_eq!(out.skipped, 1);
        let warnings = progress.messages_at(Level::Warning);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("row 2"));
        assert_eq!(progress.bars()[0].2, 3);
    }

    #[test]
    fn transforms_see_siblings() {
        struct Position;
        impl Transform for Position {
            fn apply(&self, ctx: &RowContext<'_>, _: Cell) -> Cell {
                Cell::Value(json!(format!("{}/{}", ctx.index + 1, ctx.siblings.len())))
            }
        }
        let table = Table::builder("t", "t")
            .column(Column::text("", "pos").transform(Position).build())
            .build()
            .unwrap();
        let records = vec![record(json!({})), record(json!({}))];
        let out = materialize_table(&table, &records, &MemorySource::default(), &RecordingProgress::new()).unwrap();
        assert_eq!(out.inserts[1].args, vec![SqlValue::Text("2/2".into())]);
    }
}
