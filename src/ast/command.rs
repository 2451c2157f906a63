//! Utility statements outside the query pipeline: savepoints, advisory
//! locks and bulk-copy headers. Each one is gated by a dialect capability.

use serde::{Deserialize, Serialize};

use super::expr::Expr;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Command {
    Savepoint(String),
    ReleaseSavepoint(String),
    RollbackToSavepoint(String),
    /// Session-level advisory lock on `key`; blocks until acquired.
    AdvisoryLock { key: Expr },
    AdvisoryUnlock { key: Expr },
    /// Header of a bulk load; the driver streams the rows.
    CopyIn { table: String, columns: Vec<String> },
}

impl Command {
    pub fn copy_in<I, S>(table: impl Into<String>, columns: I) -> Command
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Command::CopyIn {
            table: table.into(),
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Command::Savepoint(_) => "SAVEPOINT",
            Command::ReleaseSavepoint(_) => "RELEASE SAVEPOINT",
            Command::RollbackToSavepoint(_) => "ROLLBACK TO SAVEPOINT",
            Command::AdvisoryLock { .. } => "ADVISORY LOCK",
            Command::AdvisoryUnlock { .. } => "ADVISORY UNLOCK",
            Command::CopyIn { .. } => "COPY",
        }
    }
}
