//! Query compiler.
//!
//! ```text
//! Query --lower--> Statement (clause IR) --render--> Plan { sql, params }
//! ```
//!
//! Lowering (`clause.rs`) resolves placeholders, checks capabilities and
//! decides clause placement. Rendering walks the IR once in SQL textual
//! order with a single [`Emitter`]; the emitter is the only thing that
//! numbers parameters, so `params[n]` always names the n-th placeholder in
//! the text, including those inside subqueries, set operations and CTEs.

mod clause;
mod command;
mod dml;
mod expr;
pub mod resolve;
mod select;

use serde::Serialize;
use tracing::debug;

use crate::ast::{Command, Query};
use crate::dialect::Dialect;
use crate::error::Result;

pub use resolve::{primary_table, resolve, TableScope};

/// Compiled, parameterized statement.
///
/// `params[n]` names the value a driver binds to the (n+1)-th placeholder.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Plan {
    pub sql: String,
    pub params: Vec<String>,
}

/// Compile `query` for `dialect`.
pub fn compile(dialect: &dyn Dialect, query: &Query) -> Result<Plan> {
    debug!(dialect = dialect.name(), stage = query.kind_name(), "compiling query");
    let statement = clause::lower(dialect, query)?;
    let mut emitter = Emitter::new(dialect);
    emitter.statement(&statement)?;
    let plan = emitter.finish();
    debug!(
        dialect = dialect.name(),
        sql_len = plan.sql.len(),
        params = plan.params.len(),
        "compiled query"
    );
    Ok(plan)
}

/// Compile a utility command for `dialect`.
pub fn compile_command(dialect: &dyn Dialect, command: &Command) -> Result<Plan> {
    debug!(dialect = dialect.name(), command = command.kind_name(), "compiling command");
    let mut emitter = Emitter::new(dialect);
    emitter.command(command)?;
    Ok(emitter.finish())
}

/// Output buffer shared by every part of one compilation.
pub(crate) struct Emitter<'d> {
    dialect: &'d dyn Dialect,
    sql: String,
    params: Vec<String>,
    /// Inside MySQL `ON DUPLICATE KEY UPDATE`, where the proposed row is
    /// spelled `VALUES(col)`.
    excluded_as_values: bool,
}

impl<'d> Emitter<'d> {
    fn new(dialect: &'d dyn Dialect) -> Self {
        Self {
            dialect,
            sql: String::new(),
            params: Vec::new(),
            excluded_as_values: false,
        }
    }

    fn finish(self) -> Plan {
        Plan {
            sql: self.sql,
            params: self.params,
        }
    }

    fn push(&mut self, text: &str) {
        self.sql.push_str(text);
    }

    fn ident(&mut self, name: &str) {
        let quoted = self.dialect.quote_identifier(name);
        self.sql.push_str(&quoted);
    }

    fn ident_list(&mut self, names: &[String]) {
        for (i, name) in names.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.ident(name);
        }
    }

    /// Append a placeholder for the parameter `name`.
    fn parameter(&mut self, name: &str) {
        self.params.push(name.to_string());
        let placeholder = self.dialect.placeholder(self.params.len());
        self.sql.push_str(&placeholder);
    }

    /// Render `items` separated by `", "`.
    fn list<T>(
        &mut self,
        items: &[T],
        mut render: impl FnMut(&mut Self, &T) -> Result<()>,
    ) -> Result<()> {
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            render(&mut *self, item)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::*;
    use crate::dialect::{Capability, DialectDescriptor};
    use crate::error::CompileError;

    fn pg() -> DialectDescriptor {
        DialectDescriptor::postgres()
    }

    fn mysql() -> DialectDescriptor {
        DialectDescriptor::mysql()
    }

    /// Every placeholder occurrence in `sql`, in order.
    fn dollar_ordinals(sql: &str) -> Vec<usize> {
        let bytes = sql.as_bytes();
        let mut out = Vec::new();
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] == b'$' {
                let start = i + 1;
                let mut end = start;
                while end < bytes.len() && bytes[end].is_ascii_digit() {
                    end += 1;
                }
                out.push(sql[start..end].parse().unwrap());
                i = end;
            } else {
                i += 1;
            }
        }
        out
    }

    #[test]
    fn test_mysql_active_users() {
        let q = table("users")
            .filter(field("active").eq(true))
            .select([col("id"), col("email")]);
        let plan = compile(&mysql(), &q).unwrap();
        assert_eq!(
            plan.sql,
            "SELECT `id`, `email` FROM `users` WHERE (`users`.`active` = 1)"
        );
        assert!(plan.params.is_empty());
    }

    #[test]
    fn test_postgres_active_users() {
        let q = table("users")
            .filter(field("active").eq(true))
            .select([col("id"), col("email")]);
        let plan = compile(&pg(), &q).unwrap();
        assert_eq!(
            plan.sql,
            "SELECT \"id\", \"email\" FROM \"users\" WHERE (\"users\".\"active\" = TRUE)"
        );
    }

    #[test]
    fn test_placeholder_after_join_fails_resolution() {
        let q = table("users")
            .join("orders", column("users", "id").eq(column("orders", "user_id")))
            .filter(field("total").gt(100));
        match compile(&pg(), &q) {
            Err(CompileError::Resolution { expr, .. }) => assert_eq!(expr, "(_.total > 100)"),
            other => panic!("expected resolution error, got {other:?}"),
        }
    }

    #[test]
    fn test_upsert_on_ansi_fails_capability() {
        let q = Query::insert_into("users", ["email"])
            .values([["a@example.com"]])
            .on_conflict_do_nothing(["email"]);
        let err = compile(&DialectDescriptor::ansi(), &q).unwrap_err();
        assert_eq!(
            err,
            CompileError::Capability {
                feature: Capability::Upsert,
                dialect: "ansi".into(),
            }
        );
    }

    #[test]
    fn test_params_follow_textual_order() {
        let q = table("users")
            .filter(field("age").gt(param(SqlType::Integer, "min_age")))
            .select([col("id")])
            .order_by([col("id")])
            .offset(param(SqlType::BigInt, "offset"))
            .limit(param(SqlType::BigInt, "limit"));
        let plan = compile(&pg(), &q).unwrap();
        assert_eq!(
            plan.sql,
            "SELECT \"id\" FROM \"users\" WHERE (\"users\".\"age\" > $1) ORDER BY \"id\" LIMIT $2 OFFSET $3"
        );
        assert_eq!(plan.params, vec!["min_age", "limit", "offset"]);
    }

    #[test]
    fn test_params_numbered_across_subqueries_set_ops_and_ctes() {
        let recent = table("orders")
            .filter(field("placed_at").gt(param(SqlType::Timestamp, "since")))
            .select([col("user_id")]);
        let vip = table("vips")
            .filter(field("tier").eq(param(SqlType::Text, "tier")))
            .select([col("user_id")]);
        let main = table("active_users")
            .filter(field("id").in_subquery(recent.union(vip)))
            .filter(field("score").gt(param(SqlType::Integer, "score")))
            .select([col("id")]);
        let q = Query::with(
            vec![Cte::new(
                "active_users",
                table("users").filter(field("active").eq(param(SqlType::Boolean, "active"))),
            )],
            main,
        );
        let plan = compile(&pg(), &q).unwrap();
        assert_eq!(plan.params, vec!["active", "since", "tier", "score"]);
        assert_eq!(dollar_ordinals(&plan.sql), vec![1, 2, 3, 4]);
        assert!(plan
            .sql
            .contains("(\"active_users\".\"id\" IN (SELECT \"user_id\" FROM \"orders\""));
        assert!(plan.sql.starts_with("WITH \"active_users\" AS (SELECT * FROM \"users\""));
    }

    #[test]
    fn test_repeated_parameter_gets_each_occurrence() {
        let p = param(SqlType::Text, "name");
        let q = table("users").filter(field("first").eq(p.clone()).or(field("last").eq(p)));
        let plan = compile(&pg(), &q).unwrap();
        assert_eq!(plan.params, vec!["name", "name"]);
        assert_eq!(dollar_ordinals(&plan.sql), vec![1, 2]);
    }

    #[test]
    fn test_question_placeholders_still_ordered() {
        let q = table("users")
            .filter(field("a").eq(param(SqlType::Integer, "a")))
            .filter(field("b").eq(param(SqlType::Integer, "b")));
        let plan = compile(&mysql(), &q).unwrap();
        assert_eq!(
            plan.sql,
            "SELECT * FROM `users` WHERE (`users`.`a` = ?) AND (`users`.`b` = ?)"
        );
        assert_eq!(plan.params, vec!["a", "b"]);
    }

    #[test]
    fn test_compile_is_deterministic() {
        let build = || {
            table("users")
                .filter(field("email").ilike(param(SqlType::Text, "pattern")))
                .order_by([col("created_at").desc().nulls_last()])
                .limit(10)
        };
        for dialect in [pg(), mysql(), DialectDescriptor::sqlite(), DialectDescriptor::ansi()] {
            assert_eq!(compile(&dialect, &build()), compile(&dialect, &build()));
        }
    }
}
