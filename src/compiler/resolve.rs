//! Placeholder resolution.
//!
//! A placeholder field (`field("x")`) names a column of "the" table of the
//! pipeline it appears in. That only makes sense when the pipeline reads
//! from exactly one table; joins, set operations and CTEs make it ambiguous.

use crate::ast::{Expr, OrderKey, Query, WindowCall};
use crate::error::{CompileError, Result};

/// The table placeholder fields of a stage resolve to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableScope<'a> {
    Table(&'a str),
    /// No single table; the reason ends up in the resolution error.
    Ambiguous(&'static str),
}

impl TableScope<'_> {
    /// Alias used when this pipeline is wrapped as a derived table.
    pub(crate) fn alias(&self) -> &str {
        match self {
            TableScope::Table(table) => table,
            TableScope::Ambiguous(_) => "t",
        }
    }
}

/// Walk from `query` down to its root and report the single source table.
pub fn primary_table(query: &Query) -> TableScope<'_> {
    match query {
        Query::From { table }
        | Query::InsertInto { table, .. }
        | Query::Update { table }
        | Query::DeleteFrom { table } => TableScope::Table(table),
        Query::Join { .. } => TableScope::Ambiguous("pipeline contains a JOIN"),
        Query::SetOperation { .. } => {
            TableScope::Ambiguous("pipeline reads from a set operation")
        }
        Query::With { .. } => TableScope::Ambiguous("pipeline reads from a WITH query"),
        other => match other.source() {
            Some(source) => primary_table(source),
            None => TableScope::Ambiguous("pipeline has no source table"),
        },
    }
}

/// Replace every placeholder in `expr` with a column of the scope's table.
///
/// Subqueries are left alone: each one resolves against its own pipeline
/// when it is compiled.
pub fn resolve(expr: &Expr, scope: &TableScope<'_>) -> Result<Expr> {
    match scope {
        TableScope::Table(table) => Ok(qualify(expr, table)),
        TableScope::Ambiguous(reason) => match first_placeholder(expr) {
            Some(name) => Err(CompileError::Resolution {
                expr: expr.to_string(),
                reason: format!("placeholder field `{name}` is ambiguous: {reason}"),
            }),
            None => Ok(expr.clone()),
        },
    }
}

pub(crate) fn resolve_all(exprs: &[Expr], scope: &TableScope<'_>) -> Result<Vec<Expr>> {
    exprs.iter().map(|e| resolve(e, scope)).collect()
}

pub(crate) fn resolve_order(key: &OrderKey, scope: &TableScope<'_>) -> Result<OrderKey> {
    Ok(OrderKey {
        expr: resolve(&key.expr, scope)?,
        direction: key.direction,
        nulls: key.nulls,
    })
}

fn qualify_box(expr: &Expr, table: &str) -> Box<Expr> {
    Box::new(qualify(expr, table))
}

fn qualify(expr: &Expr, table: &str) -> Expr {
    match expr {
        Expr::Placeholder(name) => crate::ast::column(table, name.as_str()),
        Expr::Binary { op, left, right } => Expr::Binary {
            op: *op,
            left: qualify_box(left, table),
            right: qualify_box(right, table),
        },
        Expr::Unary { op, operand } => Expr::Unary {
            op: *op,
            operand: qualify_box(operand, table),
        },
        Expr::Function {
            name,
            args,
            distinct,
        } => Expr::Function {
            name: name.clone(),
            args: args.iter().map(|a| qualify(a, table)).collect(),
            distinct: *distinct,
        },
        Expr::Between {
            expr,
            low,
            high,
            negated,
        } => Expr::Between {
            expr: qualify_box(expr, table),
            low: qualify_box(low, table),
            high: qualify_box(high, table),
            negated: *negated,
        },
        Expr::InList {
            expr,
            values,
            negated,
        } => Expr::InList {
            expr: qualify_box(expr, table),
            values: values.iter().map(|v| qualify(v, table)).collect(),
            negated: *negated,
        },
        Expr::Cast { expr, ty } => Expr::Cast {
            expr: qualify_box(expr, table),
            ty: ty.clone(),
        },
        Expr::Case {
            branches,
            otherwise,
        } => Expr::Case {
            branches: branches
                .iter()
                .map(|(when, then)| (qualify(when, table), qualify(then, table)))
                .collect(),
            otherwise: otherwise.as_deref().map(|e| qualify_box(e, table)),
        },
        Expr::Window(call) => Expr::Window(Box::new(WindowCall {
            name: call.name.clone(),
            args: call.args.iter().map(|a| qualify(a, table)).collect(),
            partition_by: call.partition_by.iter().map(|p| qualify(p, table)).collect(),
            order_by: call
                .order_by
                .iter()
                .map(|k| OrderKey {
                    expr: qualify(&k.expr, table),
                    direction: k.direction,
                    nulls: k.nulls,
                })
                .collect(),
            frame: call.frame.clone(),
        })),
        Expr::Column(_)
        | Expr::Literal(_)
        | Expr::Parameter(_)
        | Expr::Subquery(_)
        | Expr::Exists { .. }
        | Expr::Wildcard => expr.clone(),
    }
}

fn first_placeholder(expr: &Expr) -> Option<&str> {
    match expr {
        Expr::Placeholder(name) => Some(name.as_str()),
        Expr::Binary { left, right, .. } => {
            first_placeholder(left).or_else(|| first_placeholder(right))
        }
        Expr::Unary { operand, .. } => first_placeholder(operand),
        Expr::Function { args, .. } => args.iter().find_map(first_placeholder),
        Expr::Between {
            expr, low, high, ..
        } => first_placeholder(expr)
            .or_else(|| first_placeholder(low))
            .or_else(|| first_placeholder(high)),
        Expr::InList { expr, values, .. } => {
            first_placeholder(expr).or_else(|| values.iter().find_map(first_placeholder))
        }
        Expr::Cast { expr, .. } => first_placeholder(expr),
        Expr::Case {
            branches,
            otherwise,
        } => branches
            .iter()
            .find_map(|(when, then)| first_placeholder(when).or_else(|| first_placeholder(then)))
            .or_else(|| otherwise.as_deref().and_then(first_placeholder)),
        Expr::Window(call) => call
            .args
            .iter()
            .chain(call.partition_by.iter())
            .chain(call.order_by.iter().map(|k| &k.expr))
            .find_map(first_placeholder),
        Expr::Column(_)
        | Expr::Literal(_)
        | Expr::Parameter(_)
        | Expr::Subquery(_)
        | Expr::Exists { .. }
        | Expr::Wildcard => None,
    }
}
