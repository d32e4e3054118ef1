//! Destination schema synthesis.

use std::fmt;

use crate::column::ConstraintDdl;
use crate::table::{Table, TableName};

/// Primary key every destination table is created with.
pub const ROW_TAG_COLUMN: &str = "itag";

/// One schema statement, rendered to SQL through `Display`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DdlStatement {
    /// With `cascade`, foreign keys of other tables pointing at this one are
    /// dropped along with it.
    DropTable {
        table: TableName,
        cascade: bool,
    },
    /// Creates the table with only its `itag` key.
    CreateTable(TableName),
    AddColumn {
        table: TableName,
        column: String,
        sql_type: String,
        modifiers: Vec<String>,
    },
    AddConstraint {
        table: TableName,
        constraint: ConstraintDdl,
    },
    CreateIndex {
        table: TableName,
        columns: Vec<String>,
    },
    Raw(String),
}

impl DdlStatement {
    pub fn table(&self) -> Option<&TableName> {
        match self {
            DdlStatement::CreateTable(t) => Some(t),
            DdlStatement::DropTable { table, .. }
            | DdlStatement::AddColumn { table, .. }
            | DdlStatement::AddConstraint { table, .. }
            | DdlStatement::CreateIndex { table, .. } => Some(table),
            DdlStatement::Raw(_) => None,
        }
    }
}

impl fmt::Display for DdlStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DdlStatement::DropTable { table, cascade } => {
                write!(f, "DROP TABLE IF EXISTS {}", table)?;
                if *cascade {
                    f.write_str(" CASCADE")?;
                }
                Ok(())
            }
            DdlStatement::CreateTable(t) => write!(
                f,
                "CREATE TABLE {} ({} UUID PRIMARY KEY NOT NULL DEFAULT uuid_generate_v4())",
                t, ROW_TAG_COLUMN
            ),
            DdlStatement::AddColumn {
                table,
                column,
                sql_type,
                modifiers,
            } => {
                write!(
                    f,
                    "ALTER TABLE {} ADD COLUMN IF NOT EXISTS {} {}",
                    table, column, sql_type
                )?;
                for modifier in modifiers {
                    write!(f, " {}", modifier)?;
                }
                Ok(())
            }
            DdlStatement::AddConstraint { table, constraint } => write!(
                f,
                "ALTER TABLE {} ADD CONSTRAINT {} {}",
                table,
                constraint.name,
                constraint.sql()
            ),
            DdlStatement::CreateIndex { table, columns } => write!(
                f,
                "CREATE INDEX {}_migindex ON {}({})",
                table.name,
                table,
                columns.join(",")
            ),
            DdlStatement::Raw(sql) => f.write_str(sql),
        }
    }
}

/// The statements that (re)create `table` from scratch.
pub fn synthesize(table: &Table) -> Vec<DdlStatement> {
    let dest = table.dest();
    let mut statements = vec![
        DdlStatement::DropTable {
            table: dest.clone(),
            cascade: true,
        },
        DdlStatement::CreateTable(dest.clone()),
    ];
    for column in table.columns() {
        statements.push(DdlStatement::AddColumn {
            table: dest.clone(),
            column: column.dest_name().to_string(),
            sql_type: column.sql_type(),
            modifiers: column.ddl_modifiers(),
        });
        statements.extend(
            column
                .constraint_ddl(dest)
                .into_iter()
                .map(|constraint| DdlStatement::AddConstraint {
                    table: dest.clone(),
                    constraint,
                }),
        );
    }
    if !table.index_columns().is_empty() {
        statements.push(DdlStatement::CreateIndex {
            table: dest.clone(),
            columns: table.index_columns().to_vec(),
        });
    }
    statements
}

/// One-time preparation of the destination database.
pub fn prepare_destination(reset_schema: bool) -> Vec<DdlStatement> {
    let mut statements = Vec::new();
    if reset_schema {
        statements.extend(
            [
                "DROP SCHEMA public CASCADE",
                "CREATE SCHEMA public",
                "GRANT ALL ON SCHEMA public TO public",
            ]
            .map(|sql| DdlStatement::Raw(sql.to_string())),
        );
    }
    statements.push(DdlStatement::Raw(
        r#"CREATE EXTENSION IF NOT EXISTS "uuid-ossp""#.to_string(),
    ));
    statements
}
