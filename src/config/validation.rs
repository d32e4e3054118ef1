//! Configuration validation.

use std::collections::BTreeSet;

use super::{Config, TransformSpec};
use crate::column::ForeignKey;
use crate::error::ConfigError;

/// Checks what the table builders cannot: transform arguments, resolver
/// references and foreign-key syntax.
pub fn validate(config: &Config, resolvers: &BTreeSet<&str>) -> Result<(), ConfigError> {
    for table in &config.tables {
        let dest = table.dest.as_deref().unwrap_or(&table.source);
        if table.source.is_empty() {
            return Err(ConfigError::EmptyTableName(dest.to_string()));
        }
        for column in &table.columns {
            let invalid = |message: String| ConfigError::InvalidColumn {
                table: dest.to_string(),
                column: column.dest.clone(),
                message,
            };
            if let Some(reference) = &column.references {
                reference.parse::<ForeignKey>().map_err(invalid)?;
            }
            if column.array && column.unique {
                return Err(invalid("array columns cannot be unique".into()));
            }
            for spec in &column.transforms {
                match spec {
                    TransformSpec::RandomIfMissing { length }
                    | TransformSpec::DedupeRandom { length, .. }
                        if *length == 0 =>
                    {
                        return Err(invalid("random length must be at least 1".into()));
                    }
                    TransformSpec::CollectLinks { fields } if fields.is_empty() => {
                        return Err(invalid("collect_links needs at least one field".into()));
                    }
                    TransformSpec::FirstFlag { cases } if cases.is_empty() => {
                        return Err(invalid("first_flag needs at least one case".into()));
                    }
                    TransformSpec::Lookup { resolver, .. }
                        if !resolvers.contains(resolver.as_str()) =>
                    {
                        return Err(ConfigError::UnknownResolver(resolver.clone()));
                    }
                    _ => {}
                }
            }
        }
    }
    Ok(())
}
