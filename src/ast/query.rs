//! Query model: an immutable pipeline of stages.
//!
//! Every stage except the roots wraps the stage before it behind an `Arc`,
//! so extending a pipeline never touches the source and shared prefixes are
//! cheap to reuse:
//!
//! ```text
//! table("users") -> Where -> Select
//!                \-> Where -> OrderBy -> Limit
//! ```
//!
//! Builders take `self` and return the new outer stage.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::expr::{Expr, OrderKey};
use super::types::SetOperator;

/// Abstract output shape threaded through a pipeline.
///
/// Only `Select` and `Returning` declare a new shape; every other stage
/// reports its source's shape unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Shape {
    /// Every column of a table.
    Table(String),
    /// Declared row: optional type name plus field names in projection order.
    Row {
        name: Option<String>,
        fields: Vec<String>,
    },
    /// Statements that produce no rows.
    Unit,
}

/// One projected expression, optionally aliased.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SelectItem {
    pub expr: Expr,
    pub alias: Option<String>,
}

impl SelectItem {
    pub fn output_name(&self) -> String {
        match &self.alias {
            Some(alias) => alias.clone(),
            None => self.expr.output_name(),
        }
    }
}

impl<T: Into<Expr>> From<T> for SelectItem {
    fn from(expr: T) -> Self {
        SelectItem {
            expr: expr.into(),
            alias: None,
        }
    }
}

impl Expr {
    pub fn alias(self, alias: impl Into<String>) -> SelectItem {
        SelectItem {
            expr: self,
            alias: Some(alias.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
    Cross,
}

impl JoinKind {
    pub fn keyword(&self) -> &'static str {
        match self {
            JoinKind::Inner => "JOIN",
            JoinKind::Left => "LEFT JOIN",
            JoinKind::Right => "RIGHT JOIN",
            JoinKind::Full => "FULL JOIN",
            JoinKind::Cross => "CROSS JOIN",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JoinTarget {
    Table(String),
    /// `LATERAL (subquery) AS alias`
    Lateral { query: Arc<Query>, alias: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Assignment {
    pub column: String,
    pub value: Expr,
}

impl<C: Into<String>, V: Into<Expr>> From<(C, V)> for Assignment {
    fn from((column, value): (C, V)) -> Self {
        Assignment {
            column: column.into(),
            value: value.into(),
        }
    }
}

/// What an upsert does when the insert hits a conflicting row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConflictAction {
    DoNothing,
    DoUpdate(Vec<Assignment>),
}

/// Common Table Expression (one entry of a WITH clause).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cte {
    pub name: String,
    pub columns: Vec<String>,
    pub query: Arc<Query>,
}

impl Cte {
    pub fn new(name: impl Into<String>, query: Query) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            query: Arc::new(query),
        }
    }

    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }
}

/// A query stage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Query {
    From {
        table: String,
    },
    Where {
        source: Arc<Query>,
        predicate: Expr,
    },
    Join {
        source: Arc<Query>,
        target: JoinTarget,
        condition: Option<Expr>,
        kind: JoinKind,
    },
    Select {
        source: Arc<Query>,
        shape: Shape,
        items: Vec<SelectItem>,
    },
    OrderBy {
        source: Arc<Query>,
        keys: Vec<OrderKey>,
    },
    Limit {
        source: Arc<Query>,
        count: Expr,
    },
    Offset {
        source: Arc<Query>,
        count: Expr,
    },
    Distinct {
        source: Arc<Query>,
    },
    GroupBy {
        source: Arc<Query>,
        keys: Vec<Expr>,
    },
    Having {
        source: Arc<Query>,
        predicate: Expr,
    },
    InsertInto {
        table: String,
        columns: Vec<String>,
    },
    InsertValues {
        source: Arc<Query>,
        rows: Vec<Vec<Expr>>,
    },
    InsertSelect {
        source: Arc<Query>,
        query: Arc<Query>,
    },
    OnConflict {
        source: Arc<Query>,
        target: Vec<String>,
        action: ConflictAction,
    },
    Update {
        table: String,
    },
    UpdateAssign {
        source: Arc<Query>,
        assignments: Vec<Assignment>,
    },
    UpdateWhere {
        source: Arc<Query>,
        predicate: Expr,
    },
    DeleteFrom {
        table: String,
    },
    DeleteWhere {
        source: Arc<Query>,
        predicate: Expr,
    },
    Returning {
        source: Arc<Query>,
        shape: Shape,
        items: Vec<SelectItem>,
    },
    SetOperation {
        op: SetOperator,
        all: bool,
        left: Arc<Query>,
        right: Arc<Query>,
    },
    With {
        recursive: bool,
        ctes: Vec<Cte>,
        main: Arc<Query>,
    },
}

/// Start a SELECT pipeline over `name`.
pub fn table(name: impl Into<String>) -> Query {
    Query::From { table: name.into() }
}

fn row_shape(name: Option<String>, items: &[SelectItem]) -> Shape {
    Shape::Row {
        name,
        fields: items.iter().map(SelectItem::output_name).collect(),
    }
}

fn collect<I, T, U>(items: I) -> Vec<U>
where
    I: IntoIterator<Item = T>,
    T: Into<U>,
{
    items.into_iter().map(Into::into).collect()
}

impl Query {
    pub fn insert_into<I, S>(table: impl Into<String>, columns: I) -> Query
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Query::InsertInto {
            table: table.into(),
            columns: collect(columns),
        }
    }

    pub fn update(table: impl Into<String>) -> Query {
        Query::Update {
            table: table.into(),
        }
    }

    pub fn delete_from(table: impl Into<String>) -> Query {
        Query::DeleteFrom {
            table: table.into(),
        }
    }

    pub fn with(ctes: Vec<Cte>, main: Query) -> Query {
        Query::With {
            recursive: false,
            ctes,
            main: Arc::new(main),
        }
    }

    pub fn with_recursive(ctes: Vec<Cte>, main: Query) -> Query {
        Query::With {
            recursive: true,
            ctes,
            main: Arc::new(main),
        }
    }

    pub fn filter(self, predicate: impl Into<Expr>) -> Query {
        Query::Where {
            source: Arc::new(self),
            predicate: predicate.into(),
        }
    }

    pub fn join(self, table: impl Into<String>, condition: impl Into<Expr>) -> Query {
        self.join_kind(JoinKind::Inner, table, Some(condition.into()))
    }

    pub fn left_join(self, table: impl Into<String>, condition: impl Into<Expr>) -> Query {
        self.join_kind(JoinKind::Left, table, Some(condition.into()))
    }

    pub fn cross_join(self, table: impl Into<String>) -> Query {
        self.join_kind(JoinKind::Cross, table, None)
    }

    pub fn join_kind(
        self,
        kind: JoinKind,
        table: impl Into<String>,
        condition: Option<Expr>,
    ) -> Query {
        Query::Join {
            source: Arc::new(self),
            target: JoinTarget::Table(table.into()),
            condition,
            kind,
        }
    }

    pub fn join_lateral(
        self,
        kind: JoinKind,
        query: Query,
        alias: impl Into<String>,
        condition: Option<Expr>,
    ) -> Query {
        Query::Join {
            source: Arc::new(self),
            target: JoinTarget::Lateral {
                query: Arc::new(query),
                alias: alias.into(),
            },
            condition,
            kind,
        }
    }

    /// Project `items`; the output shape's fields follow the item order.
    pub fn select<I, T>(self, items: I) -> Query
    where
        I: IntoIterator<Item = T>,
        T: Into<SelectItem>,
    {
        let items: Vec<SelectItem> = collect(items);
        Query::Select {
            source: Arc::new(self),
            shape: row_shape(None, &items),
            items,
        }
    }

    /// Project `items` into a named row shape.
    pub fn select_as<I, T>(self, shape_name: impl Into<String>, items: I) -> Query
    where
        I: IntoIterator<Item = T>,
        T: Into<SelectItem>,
    {
        let items: Vec<SelectItem> = collect(items);
        Query::Select {
            source: Arc::new(self),
            shape: row_shape(Some(shape_name.into()), &items),
            items,
        }
    }

    pub fn order_by<I, K>(self, keys: I) -> Query
    where
        I: IntoIterator<Item = K>,
        K: Into<OrderKey>,
    {
        Query::OrderBy {
            source: Arc::new(self),
            keys: collect(keys),
        }
    }

    pub fn limit(self, count: impl Into<Expr>) -> Query {
        Query::Limit {
            source: Arc::new(self),
            count: count.into(),
        }
    }

    pub fn offset(self, count: impl Into<Expr>) -> Query {
        Query::Offset {
            source: Arc::new(self),
            count: count.into(),
        }
    }

    pub fn distinct(self) -> Query {
        Query::Distinct {
            source: Arc::new(self),
        }
    }

    pub fn group_by<I, E>(self, keys: I) -> Query
    where
        I: IntoIterator<Item = E>,
        E: Into<Expr>,
    {
        Query::GroupBy {
            source: Arc::new(self),
            keys: collect(keys),
        }
    }

    pub fn having(self, predicate: impl Into<Expr>) -> Query {
        Query::Having {
            source: Arc::new(self),
            predicate: predicate.into(),
        }
    }

    pub fn values<R, I, E>(self, rows: R) -> Query
    where
        R: IntoIterator<Item = I>,
        I: IntoIterator<Item = E>,
        E: Into<Expr>,
    {
        Query::InsertValues {
            source: Arc::new(self),
            rows: rows.into_iter().map(collect::<I, E, Expr>).collect(),
        }
    }

    pub fn insert_select(self, query: Query) -> Query {
        Query::InsertSelect {
            source: Arc::new(self),
            query: Arc::new(query),
        }
    }

    pub fn on_conflict_do_nothing<I, S>(self, target: I) -> Query
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Query::OnConflict {
            source: Arc::new(self),
            target: collect(target),
            action: ConflictAction::DoNothing,
        }
    }

    pub fn on_conflict_do_update<I, S, A, T>(self, target: I, assignments: A) -> Query
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        A: IntoIterator<Item = T>,
        T: Into<Assignment>,
    {
        Query::OnConflict {
            source: Arc::new(self),
            target: collect(target),
            action: ConflictAction::DoUpdate(collect(assignments)),
        }
    }

    pub fn set<I, T>(self, assignments: I) -> Query
    where
        I: IntoIterator<Item = T>,
        T: Into<Assignment>,
    {
        Query::UpdateAssign {
            source: Arc::new(self),
            assignments: collect(assignments),
        }
    }

    pub fn update_where(self, predicate: impl Into<Expr>) -> Query {
        Query::UpdateWhere {
            source: Arc::new(self),
            predicate: predicate.into(),
        }
    }

    pub fn delete_where(self, predicate: impl Into<Expr>) -> Query {
        Query::DeleteWhere {
            source: Arc::new(self),
            predicate: predicate.into(),
        }
    }

    pub fn returning<I, T>(self, items: I) -> Query
    where
        I: IntoIterator<Item = T>,
        T: Into<SelectItem>,
    {
        let items: Vec<SelectItem> = collect(items);
        Query::Returning {
            source: Arc::new(self),
            shape: row_shape(None, &items),
            items,
        }
    }

    fn set_operation(self, op: SetOperator, all: bool, right: Query) -> Query {
        Query::SetOperation {
            op,
            all,
            left: Arc::new(self),
            right: Arc::new(right),
        }
    }

    pub fn union(self, right: Query) -> Query {
        self.set_operation(SetOperator::Union, false, right)
    }

    pub fn union_all(self, right: Query) -> Query {
        self.set_operation(SetOperator::Union, true, right)
    }

    pub fn intersect(self, right: Query) -> Query {
        self.set_operation(SetOperator::Intersect, false, right)
    }

    pub fn intersect_all(self, right: Query) -> Query {
        self.set_operation(SetOperator::Intersect, true, right)
    }

    pub fn except(self, right: Query) -> Query {
        self.set_operation(SetOperator::Except, false, right)
    }

    pub fn except_all(self, right: Query) -> Query {
        self.set_operation(SetOperator::Except, true, right)
    }

    /// The stage this one wraps, if any. Combinators have no single source.
    pub fn source(&self) -> Option<&Query> {
        match self {
            Query::From { .. }
            | Query::InsertInto { .. }
            | Query::Update { .. }
            | Query::DeleteFrom { .. }
            | Query::SetOperation { .. }
            | Query::With { .. } => None,
            Query::Where { source, .. }
            | Query::Join { source, .. }
            | Query::Select { source, .. }
            | Query::OrderBy { source, .. }
            | Query::Limit { source, .. }
            | Query::Offset { source, .. }
            | Query::Distinct { source }
            | Query::GroupBy { source, .. }
            | Query::Having { source, .. }
            | Query::InsertValues { source, .. }
            | Query::InsertSelect { source, .. }
            | Query::OnConflict { source, .. }
            | Query::UpdateAssign { source, .. }
            | Query::UpdateWhere { source, .. }
            | Query::DeleteWhere { source, .. }
            | Query::Returning { source, .. } => Some(source),
        }
    }

    /// Output shape of this stage.
    pub fn shape(&self) -> Shape {
        match self {
            Query::From { table } => Shape::Table(table.clone()),
            Query::InsertInto { .. } | Query::Update { .. } | Query::DeleteFrom { .. } => {
                Shape::Unit
            }
            Query::Select { shape, .. } | Query::Returning { shape, .. } => shape.clone(),
            Query::SetOperation { left, .. } => left.shape(),
            Query::With { main, .. } => main.shape(),
            other => other.source().map_or(Shape::Unit, Query::shape),
        }
    }

    /// Short stage name for diagnostics and logs.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Query::From { .. } => "FROM",
            Query::Where { .. } => "WHERE",
            Query::Join { .. } => "JOIN",
            Query::Select { .. } => "SELECT",
            Query::OrderBy { .. } => "ORDER BY",
            Query::Limit { .. } => "LIMIT",
            Query::Offset { .. } => "OFFSET",
            Query::Distinct { .. } => "DISTINCT",
            Query::GroupBy { .. } => "GROUP BY",
            Query::Having { .. } => "HAVING",
            Query::InsertInto { .. } => "INSERT INTO",
            Query::InsertValues { .. } => "VALUES",
            Query::InsertSelect { .. } => "INSERT SELECT",
            Query::OnConflict { .. } => "ON CONFLICT",
            Query::Update { .. } => "UPDATE",
            Query::UpdateAssign { .. } => "SET",
            Query::UpdateWhere { .. } => "UPDATE WHERE",
            Query::DeleteFrom { .. } => "DELETE FROM",
            Query::DeleteWhere { .. } => "DELETE WHERE",
            Query::Returning { .. } => "RETURNING",
            Query::SetOperation { op, .. } => op.keyword(),
            Query::With { .. } => "WITH",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::expr::{col, field};

    #[test]
    fn test_builders_do_not_mutate_source() {
        let base = table("users").filter(field("active").eq(true));
        let limited = base.clone().limit(10);
        let ordered = base.clone().order_by([col("id").desc()]);
        assert_eq!(limited.source(), Some(&base));
        assert_eq!(ordered.source(), Some(&base));
        assert_eq!(base.kind_name(), "WHERE");
    }

    #[test]
    fn test_shape_preserved_by_non_projecting_stages() {
        let root = table("users");
        let source_shape = root.shape();
        assert_eq!(source_shape, Shape::Table("users".into()));

        let stages = vec![
            root.clone().filter(field("active").eq(true)),
            root.clone().join("orders", col("a").eq(col("b"))),
            root.clone().order_by([col("id")]),
            root.clone().limit(5),
            root.clone().offset(5),
            root.clone().distinct(),
            root.clone().group_by([col("team")]),
            root.clone().having(col("n").gt(1)),
        ];
        for stage in stages {
            assert_eq!(stage.shape(), source_shape, "{} changed shape", stage.kind_name());
        }
    }

    #[test]
    fn test_select_declares_row_shape() {
        let q = table("users").select([SelectItem::from(col("id")), col("email").alias("mail")]);
        assert_eq!(
            q.shape(),
            Shape::Row {
                name: None,
                fields: vec!["id".into(), "mail".into()],
            }
        );
        let limited = q.clone().limit(1);
        assert_eq!(limited.shape(), q.shape());

        let named = table("users").select_as("UserRow", [col("id")]);
        assert_eq!(
            named.shape(),
            Shape::Row {
                name: Some("UserRow".into()),
                fields: vec!["id".into()],
            }
        );
    }

    #[test]
    fn test_combinator_shapes() {
        let left = table("a").select([col("id")]);
        let right = table("b").select([col("id")]);
        let union = left.clone().union(right);
        assert_eq!(union.shape(), left.shape());

        let with = Query::with(vec![Cte::new("x", table("a"))], table("x"));
        assert_eq!(with.shape(), Shape::Table("x".into()));
    }

    #[test]
    fn test_dml_shapes() {
        let insert = Query::insert_into("users", ["email"]).values([["a@b.c"]]);
        assert_eq!(insert.shape(), Shape::Unit);
        let returning = insert.returning([col("id")]);
        assert_eq!(
            returning.shape(),
            Shape::Row {
                name: None,
                fields: vec!["id".into()],
            }
        );
    }
}
