//! Expression rendering.

use crate::ast::expr::EXCLUDED_TABLE;
use crate::ast::{
    ColumnRef, Expr, NullsOrder, OrderKey, SortDirection, UnaryOperator, Value, WindowCall,
};
use crate::dialect::{Capability, NullsOrdering, OperatorSyntax};
use crate::error::{CompileError, Result};

use super::clause::lower_rows;
use super::Emitter;

impl Emitter<'_> {
    pub(crate) fn expr(&mut self, expr: &Expr) -> Result<()> {
        match expr {
            Expr::Column(column) => {
                self.column(column);
                Ok(())
            }
            Expr::Placeholder(name) => Err(CompileError::Resolution {
                expr: expr.to_string(),
                reason: format!("placeholder field `{name}` was never resolved to a table"),
            }),
            Expr::Literal(value) => self.literal(value),
            Expr::Parameter(p) => {
                self.parameter(&p.name);
                Ok(())
            }
            Expr::Binary { op, left, right } => {
                let syntax = self.dialect.operator(*op).ok_or_else(|| {
                    CompileError::Unrepresentable {
                        dialect: self.dialect.name().to_string(),
                        kind: format!("operator {}", op.symbol()),
                    }
                })?;
                match syntax {
                    OperatorSyntax::Infix(symbol) => {
                        self.push("(");
                        self.expr(left)?;
                        self.push(" ");
                        self.push(symbol);
                        self.push(" ");
                        self.expr(right)?;
                        self.push(")");
                    }
                    OperatorSyntax::Function(name) => {
                        self.push(name);
                        self.push("(");
                        self.expr(left)?;
                        self.push(", ");
                        self.expr(right)?;
                        self.push(")");
                    }
                    OperatorSyntax::UpperInfix(symbol) => {
                        self.push("(UPPER(");
                        self.expr(left)?;
                        self.push(") ");
                        self.push(symbol);
                        self.push(" UPPER(");
                        self.expr(right)?;
                        self.push("))");
                    }
                }
                Ok(())
            }
            Expr::Unary { op, operand } => {
                match op {
                    UnaryOperator::Not => {
                        self.push("(NOT ");
                        self.expr(operand)?;
                    }
                    UnaryOperator::Minus => {
                        // The space keeps `-(-5)` from becoming a `--` comment.
                        self.push("(- ");
                        self.expr(operand)?;
                    }
                    UnaryOperator::IsNull => {
                        self.push("(");
                        self.expr(operand)?;
                        self.push(" IS NULL");
                    }
                    UnaryOperator::IsNotNull => {
                        self.push("(");
                        self.expr(operand)?;
                        self.push(" IS NOT NULL");
                    }
                }
                self.push(")");
                Ok(())
            }
            Expr::Function {
                name,
                args,
                distinct,
            } => {
                self.push(name);
                self.push("(");
                if *distinct {
                    self.push("DISTINCT ");
                }
                self.list(args, Self::expr)?;
                self.push(")");
                Ok(())
            }
            Expr::Between {
                expr,
                low,
                high,
                negated,
            } => {
                self.push("(");
                self.expr(expr)?;
                self.push(if *negated { " NOT BETWEEN " } else { " BETWEEN " });
                self.expr(low)?;
                self.push(" AND ");
                self.expr(high)?;
                self.push(")");
                Ok(())
            }
            Expr::InList {
                expr,
                values,
                negated,
            } => {
                if values.is_empty() {
                    return Err(CompileError::Structural(format!(
                        "IN list for `{expr}` is empty"
                    )));
                }
                self.push("(");
                self.expr(expr)?;
                self.push(if *negated { " NOT IN (" } else { " IN (" });
                // A lone subquery is a membership test, not a one-value list.
                if let [Expr::Subquery(query)] = values.as_slice() {
                    let statement = lower_rows(self.dialect, query)?;
                    self.statement(&statement)?;
                } else {
                    self.list(values, Self::expr)?;
                }
                self.push("))");
                Ok(())
            }
            Expr::Cast { expr, ty } => {
                let name = self.dialect.type_name(ty).ok_or_else(|| {
                    CompileError::Unrepresentable {
                        dialect: self.dialect.name().to_string(),
                        kind: format!("CAST to {ty}"),
                    }
                })?;
                self.push("CAST(");
                self.expr(expr)?;
                self.push(" AS ");
                self.push(&name);
                self.push(")");
                Ok(())
            }
            Expr::Subquery(query) => {
                let statement = lower_rows(self.dialect, query)?;
                self.push("(");
                self.statement(&statement)?;
                self.push(")");
                Ok(())
            }
            Expr::Exists { query, negated } => {
                let statement = lower_rows(self.dialect, query)?;
                self.push(if *negated { "NOT EXISTS (" } else { "EXISTS (" });
                self.statement(&statement)?;
                self.push(")");
                Ok(())
            }
            Expr::Case {
                branches,
                otherwise,
            } => {
                if branches.is_empty() {
                    return Err(CompileError::Structural(
                        "CASE requires at least one WHEN branch".into(),
                    ));
                }
                self.push("(CASE");
                for (when, then) in branches {
                    self.push(" WHEN ");
                    self.expr(when)?;
                    self.push(" THEN ");
                    self.expr(then)?;
                }
                if let Some(otherwise) = otherwise {
                    self.push(" ELSE ");
                    self.expr(otherwise)?;
                }
                self.push(" END)");
                Ok(())
            }
            Expr::Window(call) => self.window(call),
            Expr::Wildcard => {
                self.push("*");
                Ok(())
            }
        }
    }

    fn column(&mut self, column: &ColumnRef) {
        match column.table.as_deref() {
            Some(EXCLUDED_TABLE) if self.excluded_as_values => {
                self.push("VALUES(");
                self.ident(&column.name);
                self.push(")");
            }
            Some(table) => {
                self.ident(table);
                self.push(".");
                self.ident(&column.name);
            }
            None => self.ident(&column.name),
        }
    }

    fn literal(&mut self, value: &Value) -> Result<()> {
        match value {
            Value::Null => self.push("NULL"),
            Value::Bool(b) => {
                let text = self.dialect.boolean_literal(*b);
                self.push(text);
            }
            Value::Int(i) => self.push(&i.to_string()),
            Value::Float(x) => {
                if !x.is_finite() {
                    return Err(CompileError::Structural(format!(
                        "float literal {x} has no SQL representation"
                    )));
                }
                // Debug keeps the decimal point: 1.0, not 1.
                self.push(&format!("{x:?}"));
            }
            Value::Text(s) => {
                let text = self.dialect.string_literal(s);
                self.push(&text);
            }
        }
        Ok(())
    }

    /// ORDER BY keys, shared by the ORDER BY clause and window calls.
    pub(crate) fn order_keys(&mut self, keys: &[OrderKey]) -> Result<()> {
        let emulate = self.dialect.nulls_ordering() == NullsOrdering::EmulatedWithIsNull;
        for (i, key) in keys.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            match (key.nulls, emulate) {
                (Some(nulls), true) => {
                    // `x IS NULL` sorts false (0) before true (1).
                    self.push("(");
                    self.expr(&key.expr)?;
                    self.push(match nulls {
                        NullsOrder::First => " IS NULL) DESC, ",
                        NullsOrder::Last => " IS NULL), ",
                    });
                    self.order_key_body(key)?;
                }
                (Some(nulls), false) => {
                    self.order_key_body(key)?;
                    self.push(match nulls {
                        NullsOrder::First => " NULLS FIRST",
                        NullsOrder::Last => " NULLS LAST",
                    });
                }
                (None, _) => self.order_key_body(key)?,
            }
        }
        Ok(())
    }

    fn order_key_body(&mut self, key: &OrderKey) -> Result<()> {
        self.expr(&key.expr)?;
        if key.direction == SortDirection::Desc {
            self.push(" DESC");
        }
        Ok(())
    }

    fn window(&mut self, call: &WindowCall) -> Result<()> {
        if !self.dialect.supports(Capability::Window) {
            return Err(CompileError::Capability {
                feature: Capability::Window,
                dialect: self.dialect.name().to_string(),
            });
        }
        self.push(&call.name);
        self.push("(");
        self.list(&call.args, Self::expr)?;
        self.push(") OVER (");
        let mut sep = "";
        if !call.partition_by.is_empty() {
            self.push("PARTITION BY ");
            self.list(&call.partition_by, Self::expr)?;
            sep = " ";
        }
        if !call.order_by.is_empty() {
            self.push(sep);
            self.push("ORDER BY ");
            self.order_keys(&call.order_by)?;
            sep = " ";
        }
        if let Some(frame) = &call.frame {
            self.push(sep);
            self.push(&frame.to_string());
        }
        self.push(")");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::*;
    use crate::compiler::compile;
    use crate::dialect::{Capability, DialectDescriptor};
    use crate::error::CompileError;

    /// Render `predicate` as the WHERE clause of `SELECT * FROM t`.
    fn where_sql(dialect: &DialectDescriptor, predicate: Expr) -> String {
        let sql = compile(dialect, &table("t").filter(predicate)).unwrap().sql;
        let prefix_end = sql.find(" WHERE ").unwrap() + " WHERE ".len();
        sql[prefix_end..].to_string()
    }

    #[test]
    fn test_ilike_native_and_emulated() {
        let pred = || col("name").ilike("%ann%");
        assert_eq!(
            where_sql(&DialectDescriptor::postgres(), pred()),
            "(\"name\" ILIKE '%ann%')"
        );
        assert_eq!(
            where_sql(&DialectDescriptor::sqlite(), pred()),
            "(UPPER(\"name\") LIKE UPPER('%ann%'))"
        );
        assert_eq!(
            where_sql(&DialectDescriptor::mysql(), col("name").not_ilike("x")),
            "(UPPER(`name`) NOT LIKE UPPER('x'))"
        );
    }

    #[test]
    fn test_negating_negative_literal_is_not_a_comment() {
        let pg = DialectDescriptor::postgres();
        let sql = compile(&pg, &table("t").filter((-lit(-5)).eq(col("a"))))
            .unwrap()
            .sql;
        assert_eq!(sql, "SELECT * FROM \"t\" WHERE ((- -5) = \"a\")");
        assert!(!sql.contains("--"));

        let sql = where_sql(&DialectDescriptor::sqlite(), (-lit(-2.5)).lt(col("b")));
        assert_eq!(sql, "((- -2.5) < \"b\")");
    }

    #[test]
    fn test_lone_subquery_in_list_is_membership_test() {
        let buyers = || table("orders").select([col("user_id")]);
        let sqlite = DialectDescriptor::sqlite();
        let expected = "(\"t\".\"id\" IN (SELECT \"user_id\" FROM \"orders\"))";
        assert_eq!(where_sql(&sqlite, field("id").in_subquery(buyers())), expected);
        assert_eq!(
            where_sql(&sqlite, field("id").in_list([subquery(buyers())]).unwrap()),
            expected
        );
        assert_eq!(
            where_sql(&sqlite, field("id").not_in_subquery(buyers())),
            "(\"t\".\"id\" NOT IN (SELECT \"user_id\" FROM \"orders\"))"
        );

        // Alongside other values the subquery stays a scalar.
        let mixed = field("id").in_list([lit(1), subquery(buyers().limit(1))]).unwrap();
        assert_eq!(
            where_sql(&sqlite, mixed),
            "(\"t\".\"id\" IN (1, (SELECT \"user_id\" FROM \"orders\" LIMIT 1)))"
        );
    }

    #[test]
    fn test_concat_as_function_on_mysql() {
        let pred = col("first").concat(" ").concat(col("last")).eq("a b");
        assert_eq!(
            where_sql(&DialectDescriptor::mysql(), pred.clone()),
            "(CONCAT(CONCAT(`first`, ' '), `last`) = 'a b')"
        );
        assert_eq!(
            where_sql(&DialectDescriptor::postgres(), pred),
            "(((\"first\" || ' ') || \"last\") = 'a b')"
        );
    }

    #[test]
    fn test_regex_unrepresentable_on_sqlite() {
        let q = table("t").filter(col("name").regex_match("^a"));
        let err = compile(&DialectDescriptor::sqlite(), &q).unwrap_err();
        assert_eq!(
            err,
            CompileError::Unrepresentable {
                dialect: "sqlite".into(),
                kind: "operator ~".into(),
            }
        );
    }

    #[test]
    fn test_operators_and_literals() {
        let pg = DialectDescriptor::postgres();
        assert_eq!(
            where_sql(&pg, (col("a") + 1) * col("b") % 2.5),
            "(((\"a\" + 1) * \"b\") % 2.5)"
        );
        assert_eq!(
            where_sql(&pg, !col("ok") & col("n").is_null()),
            "((NOT \"ok\") AND (\"n\" IS NULL))"
        );
        assert_eq!(where_sql(&pg, col("x").eq(1.0)), "(\"x\" = 1.0)");
        assert_eq!(where_sql(&pg, col("x").eq(null())), "(\"x\" = NULL)");
        assert_eq!(where_sql(&pg, col("s").eq("O'Brien")), "(\"s\" = 'O''Brien')");
    }

    #[test]
    fn test_non_finite_float_rejected() {
        let q = table("t").filter(col("x").eq(f64::NAN));
        assert!(matches!(
            compile(&DialectDescriptor::postgres(), &q),
            Err(CompileError::Structural(_))
        ));
    }

    #[test]
    fn test_between_in_list_and_case() {
        let pg = DialectDescriptor::postgres();
        assert_eq!(
            where_sql(&pg, col("p").not_between(1, 10)),
            "(\"p\" NOT BETWEEN 1 AND 10)"
        );
        assert_eq!(
            where_sql(&pg, col("id").in_list([1, 2, 3]).unwrap()),
            "(\"id\" IN (1, 2, 3))"
        );
        let case = case_when([(col("a").gt(0), lit("pos"))], Some(lit("neg"))).unwrap();
        assert_eq!(
            where_sql(&pg, case.eq("pos")),
            "((CASE WHEN (\"a\" > 0) THEN 'pos' ELSE 'neg' END) = 'pos')"
        );
    }

    #[test]
    fn test_deserialized_empty_in_list_rejected() {
        let bad = Expr::InList {
            expr: Box::new(col("id")),
            values: Vec::new(),
            negated: false,
        };
        let q = table("t").filter(bad);
        assert!(matches!(
            compile(&DialectDescriptor::postgres(), &q),
            Err(CompileError::Structural(_))
        ));
    }

    #[test]
    fn test_cast_uses_dialect_type_names() {
        let expr = col("id").cast(SqlType::Text).eq("1");
        assert_eq!(
            where_sql(&DialectDescriptor::mysql(), expr.clone()),
            "(CAST(`id` AS CHAR) = '1')"
        );
        assert_eq!(
            where_sql(&DialectDescriptor::ansi(), expr),
            "(CAST(\"id\" AS VARCHAR) = '1')"
        );
        let q = table("t").filter(col("id").cast(SqlType::Uuid).is_not_null());
        assert!(matches!(
            compile(&DialectDescriptor::mysql(), &q),
            Err(CompileError::Unrepresentable { .. })
        ));
    }

    #[test]
    fn test_window_call_rendering() {
        let w = window("ROW_NUMBER", Vec::<Expr>::new())
            .partition_by([col("team")])
            .order_by([col("score").desc()])
            .frame(WindowFrame::rows(
                WindowFrameBound::Preceding(None),
                WindowFrameBound::CurrentRow,
            ));
        let q = table("players").select([SelectItem::from(col("name")), Expr::from(w).alias("rank")]);
        let plan = compile(&DialectDescriptor::postgres(), &q).unwrap();
        assert_eq!(
            plan.sql,
            "SELECT \"name\", ROW_NUMBER() OVER (PARTITION BY \"team\" ORDER BY \"score\" DESC \
             ROWS BETWEEN UNBOUNDED PRECEDING AND CURRENT ROW) AS \"rank\" FROM \"players\""
        );
    }

    #[test]
    fn test_window_requires_capability() {
        let dialect = DialectDescriptor::postgres().without_capability(Capability::Window);
        let q = table("t").select([Expr::from(window("RANK", Vec::<Expr>::new()))]);
        assert_eq!(
            compile(&dialect, &q).unwrap_err(),
            CompileError::Capability {
                feature: Capability::Window,
                dialect: "postgres".into(),
            }
        );
    }

    #[test]
    fn test_exists_subquery_resolves_own_table() {
        let orders = table("orders").filter(field("user_id").eq(column("users", "id")));
        let q = table("users").filter(exists(orders));
        let plan = compile(&DialectDescriptor::postgres(), &q).unwrap();
        assert_eq!(
            plan.sql,
            "SELECT * FROM \"users\" WHERE EXISTS (SELECT * FROM \"orders\" \
             WHERE (\"orders\".\"user_id\" = \"users\".\"id\"))"
        );
    }
}
