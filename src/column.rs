use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use crate::table::TableName;
use crate::transform::Transform;

/// Destination column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Text,
    #[serde(alias = "int", alias = "int4")]
    Int32,
    #[serde(alias = "bigint", alias = "int8")]
    Int64,
    #[serde(alias = "boolean")]
    Bool,
    #[serde(alias = "timestamptz")]
    Timestamp,
    #[serde(alias = "jsonb")]
    Json,
    Uuid,
}

impl ColumnType {
    pub fn base_sql_type(self) -> &'static str {
        match self {
            ColumnType::Text => "text",
            ColumnType::Int32 => "int",
            ColumnType::Int64 => "bigint",
            ColumnType::Bool => "bool",
            ColumnType::Timestamp => "timestamptz",
            ColumnType::Json => "jsonb",
            ColumnType::Uuid => "uuid",
        }
    }

    /// Whether literals of this type are written as quoted strings.
    fn quoted(self) -> bool {
        !matches!(
            self,
            ColumnType::Int32 | ColumnType::Int64 | ColumnType::Bool
        )
    }
}

/// What a row gets when a column has no value after its transforms.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Fallback {
    /// Substitute this value. Also rendered as the DDL default.
    Value(Value),
    /// Bind SQL NULL.
    Null,
    /// Drop the whole row.
    Skip,
    /// Abort the table migration.
    Required,
}

/// `table.column` target of a foreign key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ForeignKey {
    pub table: String,
    pub column: String,
}

impl ForeignKey {
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Self {
        ForeignKey {
            table: table.into(),
            column: column.into(),
        }
    }
}

impl FromStr for ForeignKey {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.rsplit_once('.') {
            Some((table, column)) if !table.is_empty() && !column.is_empty() => {
                Ok(ForeignKey::new(table, column))
            }
            _ => Err(format!("foreign key {:?} must be written as table.column", s)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Constraints {
    pub unique: bool,
    pub foreign_key: Option<ForeignKey>,
}

/// A single table constraint on one column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constraint {
    Unique,
    ForeignKey(ForeignKey),
}

impl Constraint {
    /// Suffix used in constraint names.
    pub fn kind(&self) -> &'static str {
        match self {
            Constraint::Unique => "unique",
            Constraint::ForeignKey(_) => "fk",
        }
    }

    pub fn sql(&self, column: &str) -> String {
        match self {
            Constraint::Unique => format!("UNIQUE ({})", column),
            Constraint::ForeignKey(fk) => format!(
                "FOREIGN KEY ({}) REFERENCES {}({}) ON DELETE CASCADE ON UPDATE CASCADE",
                column, fk.table, fk.column
            ),
        }
    }
}

/// A named constraint ready to be added to a destination table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstraintDdl {
    pub name: String,
    pub column: String,
    pub constraint: Constraint,
}

impl ConstraintDdl {
    pub fn sql(&self) -> String {
        self.constraint.sql(&self.column)
    }
}

/// One destination column and how to fill it from a source record.
#[derive(Clone)]
pub struct Column {
    source_name: String,
    dest_name: String,
    ty: ColumnType,
    array: bool,
    nullable: bool,
    fallback: Option<Fallback>,
    sql_default: Option<String>,
    constraints: Constraints,
    transforms: Vec<Arc<dyn Transform>>,
}

impl fmt::Debug for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Column")
            .field("source_name", &self.source_name)
            .field("dest_name", &self.dest_name)
            .field("ty", &self.ty)
            .field("array", &self.array)
            .field("nullable", &self.nullable)
            .field("fallback", &self.fallback)
            .field("sql_default", &self.sql_default)
            .field("constraints", &self.constraints)
            .field("transforms", &self.transforms.len())
            .finish()
    }
}

impl Column {
    pub fn builder(
        ty: ColumnType,
        source: impl Into<String>,
        dest: impl Into<String>,
    ) -> ColumnBuilder {
        ColumnBuilder {
            column: Column {
                source_name: source.into(),
                dest_name: dest.into(),
                ty,
                array: false,
                nullable: false,
                fallback: None,
                sql_default: None,
                constraints: Constraints::default(),
                transforms: Vec::new(),
            },
        }
    }

    pub fn text(source: impl Into<String>, dest: impl Into<String>) -> ColumnBuilder {
        Self::builder(ColumnType::Text, source, dest)
    }

    pub fn int(source: impl Into<String>, dest: impl Into<String>) -> ColumnBuilder {
        Self::builder(ColumnType::Int32, source, dest)
    }

    pub fn bigint(source: impl Into<String>, dest: impl Into<String>) -> ColumnBuilder {
        Self::builder(ColumnType::Int64, source, dest)
    }

    pub fn bool(source: impl Into<String>, dest: impl Into<String>) -> ColumnBuilder {
        Self::builder(ColumnType::Bool, source, dest)
    }

    pub fn timestamp(source: impl Into<String>, dest: impl Into<String>) -> ColumnBuilder {
        Self::builder(ColumnType::Timestamp, source, dest)
    }

    pub fn json(source: impl Into<String>, dest: impl Into<String>) -> ColumnBuilder {
        Self::builder(ColumnType::Json, source, dest)
    }

    pub fn uuid(source: impl Into<String>, dest: impl Into<String>) -> ColumnBuilder {
        Self::builder(ColumnType::Uuid, source, dest)
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    pub fn dest_name(&self) -> &str {
        &self.dest_name
    }

    pub fn ty(&self) -> ColumnType {
        self.ty
    }

    pub fn is_array(&self) -> bool {
        self.array
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn fallback(&self) -> Option<&Fallback> {
        self.fallback.as_ref()
    }

    pub fn sql_default(&self) -> Option<&str> {
        self.sql_default.as_deref()
    }

    pub fn constraints(&self) -> &Constraints {
        &self.constraints
    }

    pub fn transforms(&self) -> &[Arc<dyn Transform>] {
        &self.transforms
    }

    /// Literal for the DDL `DEFAULT` clause, or an empty string when there is none.
    pub fn effective_default_literal(&self) -> String {
        match &self.fallback {
            Some(Fallback::Value(v)) => render_literal(v, self.ty, self.array),
            _ => self.sql_default.clone().unwrap_or_default(),
        }
    }

    pub fn sql_type(&self) -> String {
        if self.array {
            format!("{}[]", self.ty.base_sql_type())
        } else {
            self.ty.base_sql_type().to_string()
        }
    }

    pub fn ddl_modifiers(&self) -> Vec<String> {
        let mut modifiers = Vec::new();
        if !self.nullable {
            modifiers.push("NOT NULL".to_string());
        }
        let default = self.effective_default_literal();
        if !default.is_empty() {
            modifiers.push(format!("DEFAULT {}", default));
        }
        modifiers
    }

    pub fn constraint_ddl(&self, table: &TableName) -> Vec<ConstraintDdl> {
        let mut constraints = Vec::new();
        if self.constraints.unique {
            constraints.push(Constraint::Unique);
        }
        if let Some(fk) = &self.constraints.foreign_key {
            constraints.push(Constraint::ForeignKey(fk.clone()));
        }
        constraints
            .into_iter()
            .map(|constraint| ConstraintDdl {
                name: format!("{}_{}_{}", table.name, self.dest_name, constraint.kind()),
                column: self.dest_name.clone(),
                constraint,
            })
            .collect()
    }
}

/// Builds an immutable [`Column`].
pub struct ColumnBuilder {
    column: Column,
}

impl ColumnBuilder {
    pub fn array(mut self, array: bool) -> Self {
        self.column.array = array;
        self
    }

    pub fn nullable(mut self, nullable: bool) -> Self {
        self.column.nullable = nullable;
        self
    }

    /// A `Value` fallback holding JSON `null` is the same as [`Fallback::Null`].
    pub fn fallback(mut self, fallback: Fallback) -> Self {
        self.column.fallback = Some(match fallback {
            Fallback::Value(Value::Null) => Fallback::Null,
            other => other,
        });
        self
    }

    pub fn default_value(self, value: impl Into<Value>) -> Self {
        self.fallback(Fallback::Value(value.into()))
    }

    pub fn required(self) -> Self {
        self.fallback(Fallback::Required)
    }

    pub fn skip_if_missing(self) -> Self {
        self.fallback(Fallback::Skip)
    }

    pub fn null_if_missing(self) -> Self {
        self.fallback(Fallback::Null)
    }

    pub fn sql_default(mut self, expression: impl Into<String>) -> Self {
        self.column.sql_default = Some(expression.into());
        self
    }

    pub fn unique(mut self) -> Self {
        self.column.constraints.unique = true;
        self
    }

    pub fn references(mut self, table: impl Into<String>, column: impl Into<String>) -> Self {
        self.column.constraints.foreign_key = Some(ForeignKey::new(table, column));
        self
    }

    pub fn foreign_key(mut self, fk: Option<ForeignKey>) -> Self {
        self.column.constraints.foreign_key = fk;
        self
    }

    pub fn transform(mut self, transform: impl Transform + 'static) -> Self {
        self.column.transforms.push(Arc::new(transform));
        self
    }

    pub fn transforms(mut self, transforms: Vec<Arc<dyn Transform>>) -> Self {
        self.column.transforms.extend(transforms);
        self
    }

    pub fn build(self) -> Column {
        self.column
    }
}

fn quote_literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

fn render_literal(value: &Value, ty: ColumnType, array: bool) -> String {
    if array {
        return match value {
            Value::Array(items) => {
                let inner: Vec<String> = items
                    .iter()
                    .map(|item| match item {
                        Value::String(s) => format!("\"{}\"", s.replace('"', "\\\"")),
                        other => other.to_string(),
                    })
                    .collect();
                quote_literal(&format!("{{{}}}", inner.join(",")))
            }
            Value::String(s) => quote_literal(s),
            other => quote_literal(&other.to_string()),
        };
    }
    match (value, ty) {
        (Value::String(s), _) if ty.quoted() => quote_literal(s),
        (Value::String(s), _) => s.clone(),
        (other, ColumnType::Json) => quote_literal(&other.to_string()),
        (other, _) if ty.quoted() => quote_literal(&other.to_string()),
        (other, _) => other.to_string(),
    }
}
