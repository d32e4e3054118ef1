//! Destinations schema statements and rows are written to.

mod memory;
mod postgres;

pub use self::memory::{MemoryRow, MemorySink};
pub use self::postgres::{PostgresSink, classify_message};

use crate::error::SinkError;
use crate::materialize::InsertStatement;
use crate::schema::DdlStatement;

pub trait Sink {
    fn execute_ddl(&mut self, statement: &DdlStatement) -> Result<(), SinkError>;

    /// Inserts one row, returning the number of rows affected.
    fn execute(&mut self, insert: &InsertStatement) -> Result<u64, SinkError>;
}

impl<S: Sink + ?Sized> Sink for &mut S {
    fn execute_ddl(&mut self, statement: &DdlStatement) -> Result<(), SinkError> {
        (**self).execute_ddl(statement)
    }

    fn execute(&mut self, insert: &InsertStatement) -> Result<u64, SinkError> {
        (**self).execute(insert)
    }
}
