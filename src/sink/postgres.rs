use postgres::Client;
use postgres::error::SqlState;
use postgres::types::ToSql;
use tracing::debug;

use super::Sink;
use crate::error::{SinkError, SinkErrorKind};
use crate::materialize::InsertStatement;
use crate::schema::DdlStatement;

/// Writes to a PostgreSQL database over a blocking client.
pub struct PostgresSink<'a> {
    client: &'a mut Client,
}

impl<'a> PostgresSink<'a> {
    pub fn new(client: &'a mut Client) -> Self {
        Self { client }
    }
}

impl Sink for PostgresSink<'_> {
    fn execute_ddl(&mut self, statement: &DdlStatement) -> Result<(), SinkError> {
        let sql = statement.to_string();
        debug!(%sql, "executing schema statement");
        self.client.batch_execute(&sql).map_err(classify)
    }

    fn execute(&mut self, insert: &InsertStatement) -> Result<u64, SinkError> {
        let sql = insert.sql();
        let params: Vec<&(dyn ToSql + Sync)> = insert
            .args
            .iter()
            .map(|arg| arg as &(dyn ToSql + Sync))
            .collect();
        self.client.execute(sql.as_str(), &params).map_err(classify)
    }
}

fn classify(err: postgres::Error) -> SinkError {
    let message = describe(&err);
    let kind = match err.code() {
        Some(code) if *code == SqlState::FOREIGN_KEY_VIOLATION => SinkErrorKind::ForeignKeyViolation,
        Some(code) if *code == SqlState::UNIQUE_VIOLATION => SinkErrorKind::UniqueViolation,
        _ => classify_message(&message),
    };
    SinkError::new(kind, message)
}

/// The server's own message with its detail and constraint; the driver's
/// `Display` only says "db error".
fn describe(err: &postgres::Error) -> String {
    let Some(db) = err.as_db_error() else {
        return err.to_string();
    };
    let mut message = format!("{}: {}", db.severity(), db.message());
    if let Some(detail) = db.detail() {
        message.push_str(&format!(" ({})", detail));
    }
    if let Some(constraint) = db.constraint() {
        message.push_str(&format!(" [constraint {}]", constraint));
    }
    message
}

/// Classifies an error from its text alone, for drivers that do not expose
/// SQLSTATE codes.
pub fn classify_message(message: &str) -> SinkErrorKind {
    if message.contains("violates foreign key") {
        SinkErrorKind::ForeignKeyViolation
    } else if message.contains("unique constraint") {
        SinkErrorKind::UniqueViolation
    } else {
        SinkErrorKind::Other
    }
}
