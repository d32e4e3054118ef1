//! Per-column transform pipeline.
//!
//! Each column carries an ordered list of transforms. A transform receives the
//! whole source record (plus the other records of the same entity) and the
//! column's current [`Cell`], and returns the next cell. Transforms signal
//! control decisions through the cell itself: [`Cell::Skip`] drops the row and
//! [`Cell::Fail`] aborts the table unless the column's fallback rescues it.

pub mod builtin;
pub mod link;

pub use builtin::*;
pub use link::normalize_link;

use std::sync::Arc;

use serde_json::Value;

use crate::source::{Record, Source};
use crate::value::Cell;

/// The record being materialized and the records read alongside it.
#[derive(Debug, Clone, Copy)]
pub struct RowContext<'a> {
    pub record: &'a Record,
    /// Every record fetched for the current table, in source order.
    pub siblings: &'a [Record],
    /// Position of `record` in `siblings`.
    pub index: usize,
}

impl<'a> RowContext<'a> {
    pub fn new(record: &'a Record, siblings: &'a [Record], index: usize) -> Self {
        RowContext {
            record,
            siblings,
            index,
        }
    }

    /// A context for a record that has no siblings.
    pub fn single(record: &'a Record) -> Self {
        RowContext {
            record,
            siblings: std::slice::from_ref(record),
            index: 0,
        }
    }

    pub fn field(&self, name: &str) -> Option<&'a Value> {
        self.record.get(name).filter(|v| !v.is_null())
    }

    pub fn field_str(&self, name: &str) -> Option<&'a str> {
        self.field(name).and_then(Value::as_str)
    }
}

pub trait Transform: Send + Sync {
    fn apply(&self, ctx: &RowContext<'_>, cell: Cell) -> Cell;
}

impl<F> Transform for F
where
    F: Fn(&RowContext<'_>, Cell) -> Cell + Send + Sync,
{
    fn apply(&self, ctx: &RowContext<'_>, cell: Cell) -> Cell {
        self(ctx, cell)
    }
}

/// Runs `transforms` in order, then gives the source's extra-parse hook a
/// final chance to rewrite the value.
pub fn run_pipeline<S>(
    transforms: &[Arc<dyn Transform>],
    ctx: &RowContext<'_>,
    initial: Cell,
    source: &S,
) -> Cell
where
    S: Source + ?Sized,
{
    let cell = transforms
        .iter()
        .fold(initial, |cell, transform| transform.apply(ctx, cell));
    match cell {
        Cell::Value(value) => match source.extra_parse(&value) {
            Some(parsed) => Cell::from_value(parsed),
            None => Cell::Value(value),
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;
    use serde_json::json;

    fn record(value: serde_json::Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    fn exclaim(_: &RowContext<'_>, cell: Cell) -> Cell {
        match cell.as_str() {
            Some(s) => Cell::string(format!("{}!", s)),
            None => cell,
        }
    }

    fn certified(ctx: &RowContext<'_>, cell: Cell) -> Cell {
        if ctx.field("certified") == Some(&json!(true)) {
            Cell::string("certified")
        } else {
            cell
        }
    }

    #[test]
    fn transforms_run_in_order() {
        let rec = record(json!({"name": "  Bob "}));
        let ctx = RowContext::single(&rec);
        let transforms: Vec<Arc<dyn Transform>> = vec![Arc::new(Trim), Arc::new(exclaim)];
        let out = run_pipeline(
            &transforms,
            &ctx,
            Cell::from_source(rec.get("name")),
            &MemorySource::default(),
        );
        assert_eq!(out, Cell::string("Bob!"));
    }

    #[test]
    fn transforms_see_the_whole_record() {
        let rec = record(json!({"certified": true}));
        let ctx = RowContext::single(&rec);
        let transforms: Vec<Arc<dyn Transform>> = vec![Arc::new(certified)];
        let out = run_pipeline(&transforms, &ctx, Cell::Absent, &MemorySource::default());
        assert_eq!(out, Cell::string("certified"));
    }

    #[test]
    fn extra_parse_rewrites_values_only() {
        let source = crate::source::JsonDirSource::new("unused");
        let rec = Record::new();
        let ctx = RowContext::single(&rec);
        let oid = Cell::Value(json!({"$oid": "5f1b"}));
        assert_eq!(run_pipeline(&[], &ctx, oid, &source), Cell::string("5f1b"));
        assert_eq!(run_pipeline(&[], &ctx, Cell::Skip, &source), Cell::Skip);
        let plain = Cell::string("x");
        assert_eq!(run_pipeline(&[], &ctx, plain.clone(), &source), plain);
    }
}
