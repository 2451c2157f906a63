//! Expression model.
//!
//! [`Expr`] is a closed, immutable tree of scalar and predicate nodes.
//! Builders never evaluate anything: comparison methods and the operator
//! overloads in [`super::ops`] only construct nodes. Raw scalars passed as
//! operands are wrapped into [`Expr::Literal`].
//!
//! Equality and hashing are structural, so two trees built independently
//! from the same calls are interchangeable as cache keys.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::query::Query;
use super::types::*;
use crate::error::{CompileError, Result};

/// A column reference. A `None` table renders as the bare column name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnRef {
    pub table: Option<String>,
    pub name: String,
}

/// A named, typed parameter whose value the driver binds at execution time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundParameter {
    pub ty: SqlType,
    pub name: String,
}

/// Window function call: `name(args) OVER (PARTITION BY .. ORDER BY .. frame)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WindowCall {
    pub name: String,
    pub args: Vec<Expr>,
    pub partition_by: Vec<Expr>,
    pub order_by: Vec<OrderKey>,
    pub frame: Option<WindowFrame>,
}

impl WindowCall {
    pub fn partition_by<I, E>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = E>,
        E: Into<Expr>,
    {
        self.partition_by = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn order_by<I, K>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<OrderKey>,
    {
        self.order_by = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn frame(mut self, frame: WindowFrame) -> Self {
        self.frame = Some(frame);
        self
    }
}

/// ORDER BY key, used by the `OrderBy` stage and by window calls.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderKey {
    pub expr: Expr,
    pub direction: SortDirection,
    pub nulls: Option<NullsOrder>,
}

impl OrderKey {
    pub fn nulls_first(mut self) -> Self {
        self.nulls = Some(NullsOrder::First);
        self
    }

    pub fn nulls_last(mut self) -> Self {
        self.nulls = Some(NullsOrder::Last);
        self
    }
}

impl<T: Into<Expr>> From<T> for OrderKey {
    fn from(expr: T) -> Self {
        OrderKey {
            expr: expr.into(),
            direction: SortDirection::Asc,
            nulls: None,
        }
    }
}

/// Core expression type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Expr {
    /// Explicit column reference.
    Column(ColumnRef),
    /// Placeholder field: an unqualified column that resolves to the owning
    /// pipeline's single source table at compile time.
    Placeholder(String),
    Literal(Value),
    Parameter(BoundParameter),
    Binary {
        op: BinaryOperator,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOperator,
        operand: Box<Expr>,
    },
    Function {
        name: String,
        args: Vec<Expr>,
        distinct: bool,
    },
    Between {
        expr: Box<Expr>,
        low: Box<Expr>,
        high: Box<Expr>,
        negated: bool,
    },
    InList {
        expr: Box<Expr>,
        values: Vec<Expr>,
        negated: bool,
    },
    Cast {
        expr: Box<Expr>,
        ty: SqlType,
    },
    /// Scalar subquery. Resolves its own placeholders independently.
    Subquery(Arc<Query>),
    Exists {
        query: Arc<Query>,
        negated: bool,
    },
    Case {
        branches: Vec<(Expr, Expr)>,
        otherwise: Option<Box<Expr>>,
    },
    Window(Box<WindowCall>),
    /// `*`, as in `COUNT(*)`.
    Wildcard,
}

/// Unqualified column: renders as `"name"`.
pub fn col(name: impl Into<String>) -> Expr {
    Expr::Column(ColumnRef {
        table: None,
        name: name.into(),
    })
}

/// Table-qualified column: renders as `"table"."name"`.
pub fn column(table: impl Into<String>, name: impl Into<String>) -> Expr {
    Expr::Column(ColumnRef {
        table: Some(table.into()),
        name: name.into(),
    })
}

/// Placeholder field resolved against the pipeline's single table.
pub fn field(name: impl Into<String>) -> Expr {
    Expr::Placeholder(name.into())
}

/// The row proposed for insertion, inside an upsert's update assignments.
pub fn excluded(name: impl Into<String>) -> Expr {
    column(EXCLUDED_TABLE, name)
}

pub(crate) const EXCLUDED_TABLE: &str = "excluded";

pub fn lit(value: impl Into<Value>) -> Expr {
    Expr::Literal(value.into())
}

pub fn null() -> Expr {
    Expr::Literal(Value::Null)
}

pub fn param(ty: SqlType, name: impl Into<String>) -> Expr {
    Expr::Parameter(BoundParameter {
        ty,
        name: name.into(),
    })
}

pub fn func<I, E>(name: impl Into<String>, args: I) -> Expr
where
    I: IntoIterator<Item = E>,
    E: Into<Expr>,
{
    Expr::Function {
        name: name.into(),
        args: args.into_iter().map(Into::into).collect(),
        distinct: false,
    }
}

pub fn func_distinct<I, E>(name: impl Into<String>, args: I) -> Expr
where
    I: IntoIterator<Item = E>,
    E: Into<Expr>,
{
    Expr::Function {
        name: name.into(),
        args: args.into_iter().map(Into::into).collect(),
        distinct: true,
    }
}

pub fn count_star() -> Expr {
    func("COUNT", [Expr::Wildcard])
}

pub fn subquery(query: Query) -> Expr {
    Expr::Subquery(Arc::new(query))
}

pub fn exists(query: Query) -> Expr {
    Expr::Exists {
        query: Arc::new(query),
        negated: false,
    }
}

pub fn not_exists(query: Query) -> Expr {
    Expr::Exists {
        query: Arc::new(query),
        negated: true,
    }
}

/// Searched CASE. Fails when no WHEN branch is given.
pub fn case_when<I, C, R>(branches: I, otherwise: Option<Expr>) -> Result<Expr>
where
    I: IntoIterator<Item = (C, R)>,
    C: Into<Expr>,
    R: Into<Expr>,
{
    let branches: Vec<(Expr, Expr)> = branches
        .into_iter()
        .map(|(when, then)| (when.into(), then.into()))
        .collect();
    if branches.is_empty() {
        return Err(CompileError::Structural(
            "CASE requires at least one WHEN branch".into(),
        ));
    }
    Ok(Expr::Case {
        branches,
        otherwise: otherwise.map(Box::new),
    })
}

/// Start a window call; refine it with [`WindowCall::partition_by`] and friends.
pub fn window<I, E>(name: impl Into<String>, args: I) -> WindowCall
where
    I: IntoIterator<Item = E>,
    E: Into<Expr>,
{
    WindowCall {
        name: name.into(),
        args: args.into_iter().map(Into::into).collect(),
        partition_by: Vec::new(),
        order_by: Vec::new(),
        frame: None,
    }
}

fn binary(op: BinaryOperator, left: Expr, right: Expr) -> Expr {
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

fn unary(op: UnaryOperator, operand: Expr) -> Expr {
    Expr::Unary {
        op,
        operand: Box::new(operand),
    }
}

impl Expr {
    pub(crate) fn binary(op: BinaryOperator, left: Expr, right: Expr) -> Expr {
        binary(op, left, right)
    }

    pub(crate) fn unary(op: UnaryOperator, operand: Expr) -> Expr {
        unary(op, operand)
    }

    // Comparison. Rust's `==`/`<` return `bool`, so these are methods.

    pub fn eq(self, rhs: impl Into<Expr>) -> Expr {
        binary(BinaryOperator::Eq, self, rhs.into())
    }

    pub fn not_eq(self, rhs: impl Into<Expr>) -> Expr {
        binary(BinaryOperator::NotEq, self, rhs.into())
    }

    pub fn lt(self, rhs: impl Into<Expr>) -> Expr {
        binary(BinaryOperator::Lt, self, rhs.into())
    }

    pub fn lt_eq(self, rhs: impl Into<Expr>) -> Expr {
        binary(BinaryOperator::LtEq, self, rhs.into())
    }

    pub fn gt(self, rhs: impl Into<Expr>) -> Expr {
        binary(BinaryOperator::Gt, self, rhs.into())
    }

    pub fn gt_eq(self, rhs: impl Into<Expr>) -> Expr {
        binary(BinaryOperator::GtEq, self, rhs.into())
    }

    pub fn and(self, rhs: impl Into<Expr>) -> Expr {
        binary(BinaryOperator::And, self, rhs.into())
    }

    pub fn or(self, rhs: impl Into<Expr>) -> Expr {
        binary(BinaryOperator::Or, self, rhs.into())
    }

    pub fn like(self, pattern: impl Into<Expr>) -> Expr {
        binary(BinaryOperator::Like, self, pattern.into())
    }

    pub fn not_like(self, pattern: impl Into<Expr>) -> Expr {
        binary(BinaryOperator::NotLike, self, pattern.into())
    }

    pub fn ilike(self, pattern: impl Into<Expr>) -> Expr {
        binary(BinaryOperator::ILike, self, pattern.into())
    }

    pub fn not_ilike(self, pattern: impl Into<Expr>) -> Expr {
        binary(BinaryOperator::NotILike, self, pattern.into())
    }

    pub fn concat(self, rhs: impl Into<Expr>) -> Expr {
        binary(BinaryOperator::Concat, self, rhs.into())
    }

    pub fn regex_match(self, pattern: impl Into<Expr>) -> Expr {
        binary(BinaryOperator::RegexMatch, self, pattern.into())
    }

    pub fn is_null(self) -> Expr {
        unary(UnaryOperator::IsNull, self)
    }

    pub fn is_not_null(self) -> Expr {
        unary(UnaryOperator::IsNotNull, self)
    }

    pub fn between(self, low: impl Into<Expr>, high: impl Into<Expr>) -> Expr {
        Expr::Between {
            expr: Box::new(self),
            low: Box::new(low.into()),
            high: Box::new(high.into()),
            negated: false,
        }
    }

    pub fn not_between(self, low: impl Into<Expr>, high: impl Into<Expr>) -> Expr {
        Expr::Between {
            expr: Box::new(self),
            low: Box::new(low.into()),
            high: Box::new(high.into()),
            negated: true,
        }
    }

    /// BETWEEN from a dynamically built bound list; exactly two bounds.
    pub fn try_between<I, E>(self, bounds: I) -> Result<Expr>
    where
        I: IntoIterator<Item = E>,
        E: Into<Expr>,
    {
        let mut bounds: Vec<Expr> = bounds.into_iter().map(Into::into).collect();
        if bounds.len() != 2 {
            return Err(CompileError::Structural(format!(
                "BETWEEN takes exactly a low and a high bound, got {}",
                bounds.len()
            )));
        }
        let high = bounds.pop();
        let low = bounds.pop();
        match (low, high) {
            (Some(low), Some(high)) => Ok(self.between(low, high)),
            _ => Err(CompileError::Structural("BETWEEN bounds missing".into())),
        }
    }

    /// `expr IN (values)`. Fails on an empty list.
    pub fn in_list<I, E>(self, values: I) -> Result<Expr>
    where
        I: IntoIterator<Item = E>,
        E: Into<Expr>,
    {
        self.membership(values, false)
    }

    pub fn not_in_list<I, E>(self, values: I) -> Result<Expr>
    where
        I: IntoIterator<Item = E>,
        E: Into<Expr>,
    {
        self.membership(values, true)
    }

    /// `expr IN (SELECT ...)`.
    pub fn in_subquery(self, query: Query) -> Expr {
        Expr::InList {
            expr: Box::new(self),
            values: vec![subquery(query)],
            negated: false,
        }
    }

    pub fn not_in_subquery(self, query: Query) -> Expr {
        Expr::InList {
            expr: Box::new(self),
            values: vec![subquery(query)],
            negated: true,
        }
    }

    fn membership<I, E>(self, values: I, negated: bool) -> Result<Expr>
    where
        I: IntoIterator<Item = E>,
        E: Into<Expr>,
    {
        let values: Vec<Expr> = values.into_iter().map(Into::into).collect();
        if values.is_empty() {
            return Err(CompileError::Structural(format!(
                "IN list for `{self}` is empty"
            )));
        }
        Ok(Expr::InList {
            expr: Box::new(self),
            values,
            negated,
        })
    }

    pub fn cast(self, ty: SqlType) -> Expr {
        Expr::Cast {
            expr: Box::new(self),
            ty,
        }
    }

    pub fn asc(self) -> OrderKey {
        OrderKey {
            expr: self,
            direction: SortDirection::Asc,
            nulls: None,
        }
    }

    pub fn desc(self) -> OrderKey {
        OrderKey {
            expr: self,
            direction: SortDirection::Desc,
            nulls: None,
        }
    }

    /// Output name this expression gets in a projection without an alias.
    pub fn output_name(&self) -> String {
        match self {
            Expr::Column(c) => c.name.clone(),
            Expr::Placeholder(name) => name.clone(),
            Expr::Function { name, .. } => name.to_lowercase(),
            Expr::Window(call) => call.name.to_lowercase(),
            other => other.to_string(),
        }
    }
}

impl From<Value> for Expr {
    fn from(value: Value) -> Self {
        Expr::Literal(value)
    }
}

macro_rules! literal_from {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Expr {
                fn from(value: $ty) -> Self {
                    Expr::Literal(Value::from(value))
                }
            }
        )*
    };
}

literal_from!(bool, i32, i64, f64, &str, String);

impl From<ColumnRef> for Expr {
    fn from(column: ColumnRef) -> Self {
        Expr::Column(column)
    }
}

impl From<BoundParameter> for Expr {
    fn from(parameter: BoundParameter) -> Self {
        Expr::Parameter(parameter)
    }
}

impl From<WindowCall> for Expr {
    fn from(call: WindowCall) -> Self {
        Expr::Window(Box::new(call))
    }
}

fn write_list<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

impl fmt::Display for OrderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.expr)?;
        if self.direction == SortDirection::Desc {
            write!(f, " DESC")?;
        }
        match self.nulls {
            Some(NullsOrder::First) => write!(f, " NULLS FIRST"),
            Some(NullsOrder::Last) => write!(f, " NULLS LAST"),
            None => Ok(()),
        }
    }
}

/// Dialect-neutral rendering for diagnostics. Placeholders show as `_.name`,
/// parameters as `:name`.
impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Column(ColumnRef { table, name }) => match table {
                Some(t) => write!(f, "{t}.{name}"),
                None => write!(f, "{name}"),
            },
            Expr::Placeholder(name) => write!(f, "_.{name}"),
            Expr::Literal(value) => match value {
                Value::Null => write!(f, "NULL"),
                Value::Bool(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
                Value::Int(i) => write!(f, "{i}"),
                Value::Float(x) => write!(f, "{x:?}"),
                Value::Text(s) => write!(f, "'{}'", s.replace('\'', "''")),
            },
            Expr::Parameter(p) => write!(f, ":{}", p.name),
            Expr::Binary { op, left, right } => write!(f, "({left} {} {right})", op.symbol()),
            Expr::Unary { op, operand } => match op {
                UnaryOperator::Not => write!(f, "(NOT {operand})"),
                UnaryOperator::Minus => write!(f, "(- {operand})"),
                UnaryOperator::IsNull => write!(f, "({operand} IS NULL)"),
                UnaryOperator::IsNotNull => write!(f, "({operand} IS NOT NULL)"),
            },
            Expr::Function {
                name,
                args,
                distinct,
            } => {
                write!(f, "{name}(")?;
                if *distinct {
                    write!(f, "DISTINCT ")?;
                }
                write_list(f, args)?;
                write!(f, ")")
            }
            Expr::Between {
                expr,
                low,
                high,
                negated,
            } => {
                let not = if *negated { "NOT " } else { "" };
                write!(f, "({expr} {not}BETWEEN {low} AND {high})")
            }
            Expr::InList {
                expr,
                values,
                negated,
            } => {
                let not = if *negated { "NOT " } else { "" };
                if let [Expr::Subquery(q)] = values.as_slice() {
                    return write!(f, "({expr} {not}IN <{} subquery>)", q.kind_name());
                }
                write!(f, "({expr} {not}IN (")?;
                write_list(f, values)?;
                write!(f, "))")
            }
            Expr::Cast { expr, ty } => write!(f, "CAST({expr} AS {ty})"),
            Expr::Subquery(q) => write!(f, "(<{} subquery>)", q.kind_name()),
            Expr::Exists { query, negated } => {
                let not = if *negated { "NOT " } else { "" };
                write!(f, "{not}EXISTS (<{} subquery>)", query.kind_name())
            }
            Expr::Case {
                branches,
                otherwise,
            } => {
                write!(f, "CASE")?;
                for (when, then) in branches {
                    write!(f, " WHEN {when} THEN {then}")?;
                }
                if let Some(e) = otherwise {
                    write!(f, " ELSE {e}")?;
                }
                write!(f, " END")
            }
            Expr::Window(call) => {
                write!(f, "{}(", call.name)?;
                write_list(f, &call.args)?;
                write!(f, ") OVER (")?;
                if !call.partition_by.is_empty() {
                    write!(f, "PARTITION BY ")?;
                    write_list(f, &call.partition_by)?;
                }
                if !call.order_by.is_empty() {
                    if !call.partition_by.is_empty() {
                        write!(f, " ")?;
                    }
                    write!(f, "ORDER BY ")?;
                    write_list(f, &call.order_by)?;
                }
                if let Some(frame) = &call.frame {
                    if !call.partition_by.is_empty() || !call.order_by.is_empty() {
                        write!(f, " ")?;
                    }
                    write!(f, "{frame}")?;
                }
                write!(f, ")")
            }
            Expr::Wildcard => write!(f, "*"),
        }
    }
}
