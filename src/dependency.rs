//! Creation order of tables linked by foreign keys.

use std::collections::BTreeSet;

use itertools::Itertools;

use crate::error::{MigrateError, Result};
use crate::table::Table;

/// Indices of the declared tables each table references, excluding itself.
fn parents(tables: &[Table]) -> Vec<BTreeSet<usize>> {
    tables
        .iter()
        .enumerate()
        .map(|(i, table)| {
            table
                .foreign_keys()
                .flat_map(|fk| {
                    tables
                        .iter()
                        .positions(move |other| other.dest().matches(&fk.table))
                })
                .filter(|&j| j != i)
                .collect()
        })
        .collect()
}

/// Orders `tables` so every table comes after the tables its foreign keys
/// reference. Tables without a constraint between them keep their declared
/// order. References to tables that are not declared are ignored.
pub fn dependency_order(tables: &[Table]) -> Result<Vec<&Table>> {
    let parents = parents(tables);
    let mut waiting: Vec<usize> = parents.iter().map(BTreeSet::len).collect();
    let mut ready: BTreeSet<usize> = (0..tables.len()).filter(|&i| waiting[i] == 0).collect();
    let mut order = Vec::with_capacity(tables.len());

    while let Some(next) = ready.pop_first() {
        order.push(next);
        for (child, deps) in parents.iter().enumerate() {
            if deps.contains(&next) {
                waiting[child] -= 1;
                if waiting[child] == 0 {
                    ready.insert(child);
                }
            }
        }
    }

    if order.len() < tables.len() {
        let cycle = (0..tables.len())
            .filter(|i| waiting[*i] > 0)
            .map(|i| tables[i].dest().to_string())
            .collect();
        return Err(MigrateError::CyclicDependency(cycle));
    }
    Ok(order.into_iter().map(|i| &tables[i]).collect())
}
