//! Utility command rendering.

use crate::ast::{Command, Expr};
use crate::dialect::{AdvisoryLockSyntax, BulkCopySyntax, Capability};
use crate::error::{CompileError, Result};

use super::resolve::{resolve, TableScope};
use super::Emitter;

impl Emitter<'_> {
    pub(crate) fn command(&mut self, command: &Command) -> Result<()> {
        match command {
            Command::Savepoint(name) => self.savepoint("SAVEPOINT ", name),
            Command::ReleaseSavepoint(name) => self.savepoint("RELEASE SAVEPOINT ", name),
            Command::RollbackToSavepoint(name) => {
                self.savepoint("ROLLBACK TO SAVEPOINT ", name)
            }
            Command::AdvisoryLock { key } => self.advisory(command, key, true),
            Command::AdvisoryUnlock { key } => self.advisory(command, key, false),
            Command::CopyIn { table, columns } => {
                self.require(Capability::BulkCopy)?;
                match self.dialect.bulk_copy_syntax() {
                    Some(BulkCopySyntax::CopyFromStdin) => {
                        self.push("COPY ");
                        self.ident(table);
                        if !columns.is_empty() {
                            self.push(" (");
                            self.ident_list(columns);
                            self.push(")");
                        }
                        self.push(" FROM STDIN");
                        Ok(())
                    }
                    None => Err(self.unrepresentable(command)),
                }
            }
        }
    }

    fn savepoint(&mut self, keyword: &str, name: &str) -> Result<()> {
        self.require(Capability::Savepoint)?;
        self.push(keyword);
        self.ident(name);
        Ok(())
    }

    fn advisory(&mut self, command: &Command, key: &Expr, lock: bool) -> Result<()> {
        self.require(Capability::AdvisoryLock)?;
        let syntax = self
            .dialect
            .advisory_lock_syntax()
            .ok_or_else(|| self.unrepresentable(command))?;
        let key = resolve(key, &TableScope::Ambiguous("commands have no source table"))?;
        match (syntax, lock) {
            (AdvisoryLockSyntax::Postgres, true) => {
                self.push("SELECT pg_advisory_lock(");
                self.expr(&key)?;
                self.push(")");
            }
            (AdvisoryLockSyntax::Postgres, false) => {
                self.push("SELECT pg_advisory_unlock(");
                self.expr(&key)?;
                self.push(")");
            }
            // -1 waits indefinitely, like pg_advisory_lock.
            (AdvisoryLockSyntax::MySql, true) => {
                self.push("SELECT GET_LOCK(");
                self.expr(&key)?;
                self.push(", -1)");
            }
            (AdvisoryLockSyntax::MySql, false) => {
                self.push("SELECT RELEASE_LOCK(");
                self.expr(&key)?;
                self.push(")");
            }
        }
        Ok(())
    }

    fn require(&self, feature: Capability) -> Result<()> {
        if self.dialect.supports(feature) {
            return Ok(());
        }
        Err(CompileError::Capability {
            feature,
            dialect: self.dialect.name().to_string(),
        })
    }

    fn unrepresentable(&self, command: &Command) -> CompileError {
        CompileError::Unrepresentable {
            dialect: self.dialect.name().to_string(),
            kind: command.kind_name().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::*;
    use crate::compiler::compile_command;
    use crate::dialect::{Capability, DialectDescriptor};
    use crate::error::CompileError;

    #[test]
    fn test_savepoints() {
        let pg = DialectDescriptor::postgres();
        let cases = [
            (Command::Savepoint("s1".into()), "SAVEPOINT \"s1\""),
            (Command::ReleaseSavepoint("s1".into()), "RELEASE SAVEPOINT \"s1\""),
            (
                Command::RollbackToSavepoint("s1".into()),
                "ROLLBACK TO SAVEPOINT \"s1\"",
            ),
        ];
        for (command, expected) in cases {
            let plan = compile_command(&pg, &command).unwrap();
            assert_eq!(plan.sql, expected);
            assert!(plan.params.is_empty());
        }
    }

    #[test]
    fn test_advisory_locks() {
        let key = param(SqlType::BigInt, "lock_key");
        let lock = Command::AdvisoryLock { key: key.clone() };
        let unlock = Command::AdvisoryUnlock { key };

        let pg = DialectDescriptor::postgres();
        let plan = compile_command(&pg, &lock).unwrap();
        assert_eq!(plan.sql, "SELECT pg_advisory_lock($1)");
        assert_eq!(plan.params, vec!["lock_key"]);
        assert_eq!(
            compile_command(&pg, &unlock).unwrap().sql,
            "SELECT pg_advisory_unlock($1)"
        );

        let mysql = DialectDescriptor::mysql();
        assert_eq!(
            compile_command(&mysql, &lock).unwrap().sql,
            "SELECT GET_LOCK(?, -1)"
        );
        assert_eq!(
            compile_command(&mysql, &unlock).unwrap().sql,
            "SELECT RELEASE_LOCK(?)"
        );

        assert_eq!(
            compile_command(&DialectDescriptor::sqlite(), &lock).unwrap_err(),
            CompileError::Capability {
                feature: Capability::AdvisoryLock,
                dialect: "sqlite".into(),
            }
        );
    }

    #[test]
    fn test_advisory_key_rejects_placeholder() {
        let lock = Command::AdvisoryLock { key: field("id") };
        assert!(matches!(
            compile_command(&DialectDescriptor::postgres(), &lock),
            Err(CompileError::Resolution { .. })
        ));
    }

    #[test]
    fn test_copy_in() {
        let copy = Command::copy_in("events", ["id", "payload"]);
        assert_eq!(
            compile_command(&DialectDescriptor::postgres(), &copy)
                .unwrap()
                .sql,
            "COPY \"events\" (\"id\", \"payload\") FROM STDIN"
        );
        assert_eq!(
            compile_command(&DialectDescriptor::mysql(), &copy).unwrap_err(),
            CompileError::Capability {
                feature: Capability::BulkCopy,
                dialect: "mysql".into(),
            }
        );
    }
}
