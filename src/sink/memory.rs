use std::collections::BTreeMap;

use itertools::Itertools;
use uuid::Uuid;

use super::Sink;
use crate::column::{Constraint, ForeignKey};
use crate::error::{SinkError, SinkErrorKind};
use crate::materialize::InsertStatement;
use crate::schema::{DdlStatement, ROW_TAG_COLUMN};
use crate::table::TableName;
use crate::value::SqlValue;

pub type MemoryRow = BTreeMap<String, SqlValue>;

#[derive(Debug, Clone)]
struct MemoryColumn {
    name: String,
    not_null: bool,
    has_default: bool,
}

#[derive(Debug, Clone)]
struct MemoryTable {
    name: TableName,
    columns: Vec<MemoryColumn>,
    unique: Vec<(String, String)>,
    foreign_keys: Vec<(String, String, ForeignKey)>,
    index: Option<Vec<String>>,
    rows: Vec<MemoryRow>,
}

/// An in-memory destination that understands the statements the schema
/// synthesizer emits, enforcing `NOT NULL`, unique and foreign-key
/// constraints on insert.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    tables: BTreeMap<String, MemoryTable>,
    ddl: Vec<String>,
    failing_ddl: Vec<String>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every schema statement containing `fragment` fail.
    pub fn fail_ddl_containing(mut self, fragment: impl Into<String>) -> Self {
        self.failing_ddl.push(fragment.into());
        self
    }

    /// Every schema statement executed, in order.
    pub fn ddl(&self) -> &[String] {
        &self.ddl
    }

    pub fn has_table(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }

    pub fn columns(&self, table: &str) -> Vec<String> {
        self.tables
            .get(table)
            .map(|t| t.columns.iter().map(|c| c.name.clone()).collect())
            .unwrap_or_default()
    }

    pub fn index(&self, table: &str) -> Option<&[String]> {
        self.tables.get(table).and_then(|t| t.index.as_deref())
    }

    pub fn constraint_names(&self, table: &str) -> Vec<String> {
        self.tables
            .get(table)
            .map(|t| {
                t.unique
                    .iter()
                    .map(|(name, _)| name.clone())
                    .chain(t.foreign_keys.iter().map(|(name, _, _)| name.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn rows(&self, table: &str) -> &[MemoryRow] {
        self.tables.get(table).map(|t| t.rows.as_slice()).unwrap_or_default()
    }

    fn table_mut(&mut self, name: &TableName) -> Result<&mut MemoryTable, SinkError> {
        self.tables
            .get_mut(&name.to_string())
            .ok_or_else(|| missing_relation(name))
    }

    fn find_referenced(&self, reference: &str) -> Option<&MemoryTable> {
        self.tables.values().find(|t| t.name.matches(reference))
    }

    fn apply_ddl(&mut self, statement: &DdlStatement) -> Result<(), SinkError> {
        match statement {
            DdlStatement::DropTable { table, cascade } => {
                let key = table.to_string();
                if !self.tables.contains_key(&key) {
                    return Ok(());
                }
                let mut dependents: Vec<(String, String)> = Vec::new();
                for (other, t) in self.tables.iter().filter(|(other, _)| **other != key) {
                    for (name, _, fk) in &t.foreign_keys {
                        if table.matches(&fk.table) {
                            dependents.push((other.clone(), name.clone()));
                        }
                    }
                }
                if !*cascade && !dependents.is_empty() {
                    return Err(SinkError::other(format!(
                        "cannot drop table {} because other objects depend on it: constraint {}",
                        table,
                        dependents.iter().map(|(_, name)| name).join(", ")
                    )));
                }
                for (other, constraint) in &dependents {
                    if let Some(t) = self.tables.get_mut(other) {
                        t.foreign_keys.retain(|(name, _, _)| name != constraint);
                    }
                }
                self.tables.remove(&key);
            }
            DdlStatement::CreateTable(name) => {
                let key = name.to_string();
                if self.tables.contains_key(&key) {
                    return Err(SinkError::other(format!(
                        "relation \"{}\" already exists",
                        name
                    )));
                }
                self.tables.insert(
                    key,
                    MemoryTable {
                        name: name.clone(),
                        columns: vec![MemoryColumn {
                            name: ROW_TAG_COLUMN.to_string(),
                            not_null: true,
                            has_default: true,
                        }],
                        unique: Vec::new(),
                        foreign_keys: Vec::new(),
                        index: None,
                        rows: Vec::new(),
                    },
                );
            }
            DdlStatement::AddColumn {
                table,
                column,
                modifiers,
                ..
            } => {
                let table = self.table_mut(table)?;
                if table.columns.iter().any(|c| &c.name == column) {
                    return Ok(());
                }
                table.columns.push(MemoryColumn {
                    name: column.clone(),
                    not_null: modifiers.iter().any(|m| m == "NOT NULL"),
                    has_default: modifiers.iter().any(|m| m.starts_with("DEFAULT ")),
                });
            }
            DdlStatement::AddConstraint { table, constraint } => {
                if let Constraint::ForeignKey(fk) = &constraint.constraint {
                    if self.find_referenced(&fk.table).is_none() {
                        return Err(missing_relation(&TableName::new(&fk.table)));
                    }
                }
                let table = self.table_mut(table)?;
                if !table.columns.iter().any(|c| c.name == constraint.column) {
                    return Err(SinkError::other(format!(
                        "column \"{}\" named in key does not exist",
                        constraint.column
                    )));
                }
                match &constraint.constraint {
                    Constraint::Unique => table
                        .unique
                        .push((constraint.name.clone(), constraint.column.clone())),
                    Constraint::ForeignKey(fk) => table.foreign_keys.push((
                        constraint.name.clone(),
                        constraint.column.clone(),
                        fk.clone(),
                    )),
                }
            }
            DdlStatement::CreateIndex { table, columns } => {
                self.table_mut(table)?.index = Some(columns.clone());
            }
            DdlStatement::Raw(_) => {}
        }
        Ok(())
    }

    fn check(&self, table: &MemoryTable, row: &MemoryRow) -> Result<(), SinkError> {
        for column in &table.columns {
            let missing = row.get(&column.name).is_none_or(SqlValue::is_null);
            let defaulted = column.has_default && !row.contains_key(&column.name);
            if column.not_null && missing && !defaulted {
                return Err(SinkError::other(format!(
                    "null value in column \"{}\" of relation \"{}\" violates not-null constraint",
                    column.name, table.name
                )));
            }
        }
        for (name, column) in &table.unique {
            let Some(value) = row.get(column).filter(|v| !v.is_null()) else {
                continue;
            };
            if table.rows.iter().any(|r| r.get(column) == Some(value)) {
                return Err(SinkError::new(
                    SinkErrorKind::UniqueViolation,
                    format!("duplicate key value violates unique constraint \"{}\"", name),
                ));
            }
        }
        for (name, column, fk) in &table.foreign_keys {
            let Some(value) = row.get(column).filter(|v| !v.is_null()) else {
                continue;
            };
            let found = self
                .find_referenced(&fk.table)
                .is_some_and(|parent| parent.rows.iter().any(|r| r.get(&fk.column) == Some(value)));
            if !found {
                return Err(SinkError::new(
                    SinkErrorKind::ForeignKeyViolation,
                    format!(
                        "insert or update on table \"{}\" violates foreign key constraint \"{}\"",
                        table.name, name
                    ),
                ));
            }
        }
        Ok(())
    }
}

fn missing_relation(name: &TableName) -> SinkError {
    SinkError::other(format!("relation \"{}\" does not exist", name))
}

impl Sink for MemorySink {
    fn execute_ddl(&mut self, statement: &DdlStatement) -> Result<(), SinkError> {
        let sql = statement.to_string();
        if let Some(fragment) = self.failing_ddl.iter().find(|f| sql.contains(f.as_str())) {
            return Err(SinkError::other(format!("statement rejected: {}", fragment)));
        }
        self.apply_ddl(statement)?;
        self.ddl.push(sql);
        Ok(())
    }

    fn execute(&mut self, insert: &InsertStatement) -> Result<u64, SinkError> {
        let table = self
            .tables
            .get(&insert.table.to_string())
            .ok_or_else(|| missing_relation(&insert.table))?;

        let mut row = MemoryRow::new();
        for (column, value) in insert.columns.iter().zip(&insert.args) {
            if !table.columns.iter().any(|c| &c.name == column) {
                return Err(SinkError::other(format!(
                    "column \"{}\" of relation \"{}\" does not exist",
                    column, table.name
                )));
            }
            row.insert(column.clone(), value.clone());
        }
        self.check(table, &row)?;

        row.entry(ROW_TAG_COLUMN.to_string())
            .or_insert_with(|| SqlValue::Uuid(Uuid::new_v4()));
        self.table_mut(&insert.table)?.rows.push(row);
        Ok(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::Column;
    use crate::schema::synthesize;
    use crate::table::Table;

    fn insert(table: &str, columns: &[&str], args: Vec<SqlValue>) -> InsertStatement {
        InsertStatement {
            table: TableName::new(table),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            args,
        }
    }

    fn text(s: &str) -> SqlValue {
        SqlValue::Text(s.to_string())
    }

    fn sink_with(tables: &[Table]) -> MemorySink {
        let mut sink = MemorySink::new();
        for table in tables {
            for statement in synthesize(table) {
                sink.execute_ddl(&statement).unwrap();
            }
        }
        sink
    }

    fn bots() -> Table {
        Table::builder("bots", "bots")
            .column(Column::text("id", "bot_id").unique().build())
            .build()
            .unwrap()
    }

    #[test]
    fn enforces_unique_constraints() {
        let mut sink = sink_with(&[bots()]);
        sink.execute(&insert("bots", &["bot_id"], vec![text("a")])).unwrap();
        let err = sink
            .execute(&insert("bots", &["bot_id"], vec![text("a")]))
            .unwrap_err();
        assert!(err.is_unique_violation());
        assert_eq!(sink.rows("bots").len(), 1);
    }

    #[test]
    fn enforces_foreign_keys() {
        let reviews = Table::builder("reviews", "reviews")
            .column(
                Column::text("bot", "bot_id")
                    .nullable(true)
                    .references("bots", "bot_id")
                    .build(),
            )
            .build()
            .unwrap();
        let mut sink = sink_with(&[bots(), reviews]);
        sink.execute(&insert("bots", &["bot_id"], vec![text("a")])).unwrap();
        sink.execute(&insert("reviews", &["bot_id"], vec![text("a")])).unwrap();
        sink.execute(&insert("reviews", &["bot_id"], vec![SqlValue::Null])).unwrap();
        let err = sink
            .execute(&insert("reviews", &["bot_id"], vec![text("zzz")]))
            .unwrap_err();
        assert!(err.is_foreign_key_violation());
    }

    #[test]
    fn dropping_a_referenced_table_needs_cascade() {
        let reviews = Table::builder("reviews", "reviews")
            .column(Column::text("bot", "bot_id").references("bots", "bot_id").build())
            .build()
            .unwrap();
        let mut sink = sink_with(&[bots(), reviews]);
        let err = sink
            .execute_ddl(&DdlStatement::DropTable {
                table: TableName::new("bots"),
                cascade: false,
            })
            .unwrap_err();
        assert!(err.message.contains("reviews_bot_id_fk"));
        assert!(sink.has_table("bots"));

        sink.execute_ddl(&DdlStatement::DropTable {
            table: TableName::new("bots"),
            cascade: true,
        })
        .unwrap();
        assert!(!sink.has_table("bots"));
        assert!(sink.has_table("reviews"));
        assert!(sink.constraint_names("reviews").is_empty());
        sink.execute(&insert("reviews", &["bot_id"], vec![text("gone")]))
            .unwrap();
    }

    #[test]
    fn foreign_keys_need_the_parent_table() {
        let orphan = Table::builder("reviews", "reviews")
            .column(Column::text("bot", "bot_id").references("bots", "bot_id").build())
            .build()
            .unwrap();
        let mut sink = MemorySink::new();
        let err = synthesize(&orphan)
            .iter()
            .try_for_each(|s| sink.execute_ddl(s))
            .unwrap_err();
        assert!(err.message.contains("does not exist"));
    }

    #[test]
    fn not_null_columns_need_a_value_or_default() {
        let table = Table::builder("t", "t")
            .column(Column::text("a", "a").build())
            .column(Column::text("b", "b").default_value("x").build())
            .build()
            .unwrap();
        let mut sink = sink_with(&[table]);
        sink.execute(&insert("t", &["a"], vec![text("1")])).unwrap();
        assert!(sink.execute(&insert("t", &["b"], vec![text("2")])).is_err());
        assert!(
            sink.execute(&insert("t", &["a", "b"], vec![text("1"), SqlValue::Null]))
                .is_err()
        );
    }

    #[test]
    fn records_ddl_and_layout() {
        let sink = sink_with(&[bots()]);
        assert_eq!(sink.ddl().len(), 4);
        assert_eq!(sink.columns("bots"), vec!["itag", "bot_id"]);
        assert_eq!(sink.constraint_names("bots"), vec!["bots_bot_id_unique"]);
        assert_eq!(sink.index("bots"), None);
    }

    #[test]
    fn injected_ddl_failures() {
        let mut sink = MemorySink::new().fail_ddl_containing("uuid-ossp");
        let err = sink
            .execute_ddl(&DdlStatement::Raw(
                r#"CREATE EXTENSION IF NOT EXISTS "uuid-ossp""#.into(),
            ))
            .unwrap_err();
        assert_eq!(err.kind, SinkErrorKind::Other);
        assert!(sink.ddl().is_empty());
    }
}
