//! Table declarations loaded from YAML.

mod types;
mod validation;

pub use types::*;

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;

use crate::column::{Column, ForeignKey};
use crate::error::{ConfigError, Result};
use crate::resolver::{MapResolver, Resolver};
use crate::table::Table;
use crate::transform::{
    CollectLinks, DedupeRandom, FirstFlag, Lookup, Lowercase, NormalizeLink, RandomIfMissing,
    Sha512Each, ToList, ToTimestamp, Transform, Trim,
};

/// Resolvers by name.
pub type Resolvers = BTreeMap<String, Arc<dyn Resolver>>;

impl Config {
    /// Load table declarations from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse table declarations from a YAML string.
    ///
    /// Enum-valued keys (`default`, `transforms`, `on_miss`) are written as
    /// one-key maps such as `{ value: 0 }` rather than YAML tags.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let deserializer = serde_yaml::Deserializer::from_str(yaml);
        let config: Config = serde_yaml::with::singleton_map_recursive::deserialize(deserializer)?;
        Ok(config)
    }

    /// Builds the declared tables, with only the resolvers declared in the file.
    pub fn tables(&self) -> Result<Vec<Table>> {
        self.tables_with(Resolvers::new())
    }

    /// Builds the declared tables. `extra` resolvers take precedence over the
    /// ones declared in the file.
    pub fn tables_with(&self, extra: Resolvers) -> Result<Vec<Table>> {
        let mut resolvers: Resolvers = self
            .resolvers
            .iter()
            .map(|(name, values)| {
                let resolver: MapResolver =
                    values.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
                (name.clone(), Arc::new(resolver) as Arc<dyn Resolver>)
            })
            .collect();
        resolvers.extend(extra);

        let names: BTreeSet<&str> = resolvers.keys().map(String::as_str).collect();
        validation::validate(self, &names)?;

        let tables = self
            .tables
            .iter()
            .map(|table| build_table(table, &resolvers))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(tables)
    }
}

fn build_table(
    config: &TableConfig,
    resolvers: &Resolvers,
) -> std::result::Result<Table, ConfigError> {
    let dest = config.dest.as_deref().unwrap_or(&config.source);
    let columns = config
        .columns
        .iter()
        .map(|column| build_column(dest, column, resolvers))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Table::builder(&config.source, dest)
        .columns(columns)
        .index_columns(config.index.iter().cloned())
        .tolerate_foreign_key_violation(config.tolerate_foreign_key_violation)
        .tolerate_unique_violation(config.tolerate_unique_violation)
        .tolerate_missing_source(config.tolerate_missing_source)
        .normalize_none(config.normalize_none)
        .build()
}

fn build_column(
    table: &str,
    config: &ColumnConfig,
    resolvers: &Resolvers,
) -> std::result::Result<Column, ConfigError> {
    let foreign_key = match &config.references {
        Some(reference) => Some(reference.parse::<ForeignKey>().map_err(|message| {
            ConfigError::InvalidColumn {
                table: table.to_string(),
                column: config.dest.clone(),
                message,
            }
        })?),
        None => None,
    };
    let transforms = config
        .transforms
        .iter()
        .map(|spec| build_transform(spec, resolvers))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut builder = Column::builder(config.ty, &config.source, &config.dest)
        .array(config.array)
        .nullable(config.nullable)
        .foreign_key(foreign_key)
        .transforms(transforms);
    if let Some(fallback) = &config.default {
        builder = builder.fallback(fallback.clone());
    }
    if let Some(expression) = &config.sql_default {
        builder = builder.sql_default(expression);
    }
    if config.unique {
        builder = builder.unique();
    }
    Ok(builder.build())
}

fn build_transform(
    spec: &TransformSpec,
    resolvers: &Resolvers,
) -> std::result::Result<Arc<dyn Transform>, ConfigError> {
    let transform: Arc<dyn Transform> = match spec {
        TransformSpec::Trim => Arc::new(Trim),
        TransformSpec::Lowercase => Arc::new(Lowercase),
        TransformSpec::ToList => Arc::new(ToList),
        TransformSpec::ToTimestamp => Arc::new(ToTimestamp),
        TransformSpec::Sha512Each => Arc::new(Sha512Each),
        TransformSpec::NormalizeLink { label } => Arc::new(NormalizeLink {
            label: label.clone(),
        }),
        TransformSpec::CollectLinks { fields } => Arc::new(CollectLinks {
            fields: fields.clone(),
        }),
        TransformSpec::RandomIfMissing { length } => {
            Arc::new(RandomIfMissing { length: *length })
        }
        TransformSpec::DedupeRandom { field, length } => Arc::new(DedupeRandom {
            field: field.clone(),
            length: *length,
        }),
        TransformSpec::FirstFlag { cases } => Arc::new(FirstFlag {
            cases: cases.clone(),
        }),
        TransformSpec::Lookup {
            resolver,
            key,
            on_miss,
            only_if_missing,
        } => {
            let resolver = resolvers
                .get(resolver)
                .cloned()
                .ok_or_else(|| ConfigError::UnknownResolver(resolver.clone()))?;
            Arc::new(Lookup {
                key_field: key.clone(),
                resolver,
                on_miss: on_miss.clone(),
                only_if_missing: *only_if_missing,
            })
        }
    };
    Ok(transform)
}
