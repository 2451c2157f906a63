//! INSERT, UPDATE and DELETE rendering.

use crate::ast::{Assignment, ConflictAction, SelectItem};
use crate::dialect::UpsertSyntax;
use crate::error::{CompileError, Result};

use super::clause::{DeleteStatement, InsertSource, InsertStatement, UpdateStatement, Upsert};
use super::Emitter;

impl Emitter<'_> {
    pub(crate) fn insert(&mut self, insert: &InsertStatement) -> Result<()> {
        let source = insert.source.as_ref().ok_or_else(|| {
            CompileError::Structural(format!(
                "INSERT INTO {} has no VALUES or SELECT source",
                insert.table
            ))
        })?;
        let upsert = match &insert.upsert {
            Some(upsert) => {
                let syntax = self.dialect.upsert_syntax().ok_or_else(|| {
                    CompileError::Unrepresentable {
                        dialect: self.dialect.name().to_string(),
                        kind: "ON CONFLICT".into(),
                    }
                })?;
                Some((upsert, syntax))
            }
            None => None,
        };

        let ignore = matches!(
            upsert,
            Some((
                Upsert {
                    action: ConflictAction::DoNothing,
                    ..
                },
                UpsertSyntax::OnDuplicateKey
            ))
        );
        self.push(if ignore {
            "INSERT IGNORE INTO "
        } else {
            "INSERT INTO "
        });
        self.ident(&insert.table);
        if !insert.columns.is_empty() {
            self.push(" (");
            self.ident_list(&insert.columns);
            self.push(")");
        }

        match source {
            InsertSource::Values(rows) => {
                self.push(" VALUES ");
                self.list(rows, |this, row| {
                    this.push("(");
                    this.list(row, Self::expr)?;
                    this.push(")");
                    Ok(())
                })?;
            }
            InsertSource::Select(statement) => {
                self.push(" ");
                self.statement(statement)?;
            }
        }

        if let Some((upsert, syntax)) = upsert {
            self.upsert(upsert, syntax)?;
        }
        self.returning(insert.returning.as_deref())
    }

    fn upsert(&mut self, upsert: &Upsert, syntax: UpsertSyntax) -> Result<()> {
        match (syntax, &upsert.action) {
            (UpsertSyntax::OnConflict, action) => {
                self.push(" ON CONFLICT");
                if !upsert.target.is_empty() {
                    self.push(" (");
                    self.ident_list(&upsert.target);
                    self.push(")");
                }
                match action {
                    ConflictAction::DoNothing => self.push(" DO NOTHING"),
                    ConflictAction::DoUpdate(assignments) => {
                        if upsert.target.is_empty() {
                            return Err(CompileError::Structural(
                                "ON CONFLICT DO UPDATE requires a conflict target".into(),
                            ));
                        }
                        self.push(" DO UPDATE SET ");
                        self.assignments(assignments)?;
                    }
                }
            }
            // Handled by INSERT IGNORE.
            (UpsertSyntax::OnDuplicateKey, ConflictAction::DoNothing) => {}
            (UpsertSyntax::OnDuplicateKey, ConflictAction::DoUpdate(assignments)) => {
                self.push(" ON DUPLICATE KEY UPDATE ");
                self.excluded_as_values = true;
                let rendered = self.assignments(assignments);
                self.excluded_as_values = false;
                rendered?;
            }
        }
        Ok(())
    }

    fn assignments(&mut self, assignments: &[Assignment]) -> Result<()> {
        self.list(assignments, |this, assignment| {
            this.ident(&assignment.column);
            this.push(" = ");
            this.expr(&assignment.value)
        })
    }

    fn returning(&mut self, items: Option<&[SelectItem]>) -> Result<()> {
        if let Some(items) = items {
            self.push(" RETURNING ");
            self.select_items(items)?;
        }
        Ok(())
    }

    pub(crate) fn update(&mut self, update: &UpdateStatement) -> Result<()> {
        if update.assignments.is_empty() {
            return Err(CompileError::Structural(format!(
                "UPDATE {} has no SET assignments",
                update.table
            )));
        }
        self.push("UPDATE ");
        self.ident(&update.table);
        self.push(" SET ");
        self.assignments(&update.assignments)?;
        self.conjunction(" WHERE ", &update.filters)?;
        self.returning(update.returning.as_deref())
    }

    pub(crate) fn delete(&mut self, delete: &DeleteStatement) -> Result<()> {
        self.push("DELETE FROM ");
        self.ident(&delete.table);
        self.conjunction(" WHERE ", &delete.filters)?;
        self.returning(delete.returning.as_deref())
    }
}
