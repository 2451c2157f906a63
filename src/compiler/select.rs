//! SELECT-side rendering: blocks, set operations and WITH.

use crate::ast::{Expr, SelectItem, SetOperator};
use crate::error::Result;

use super::clause::{FromSource, JoinClause, JoinSource, LoweredCte, SelectBlock, Statement};
use super::Emitter;

/// Alias given to wrapped set operands.
const OPERAND_ALIAS: &str = "t";

impl Emitter<'_> {
    pub(crate) fn statement(&mut self, statement: &Statement) -> Result<()> {
        match statement {
            Statement::Block(block) => self.select_block(block),
            Statement::SetOp {
                op,
                all,
                left,
                right,
            } => self.set_operation(*op, *all, left, right),
            Statement::With {
                recursive,
                ctes,
                body,
            } => self.with(*recursive, ctes, body),
            Statement::Insert(insert) => self.insert(insert),
            Statement::Update(update) => self.update(update),
            Statement::Delete(delete) => self.delete(delete),
        }
    }

    fn select_block(&mut self, block: &SelectBlock) -> Result<()> {
        // SELECT [DISTINCT]
        self.push("SELECT ");
        if block.distinct {
            self.push("DISTINCT ");
        }
        match &block.projection {
            Some(items) => self.select_items(items)?,
            None => self.push("*"),
        }

        // FROM
        self.push(" FROM ");
        match &block.from {
            FromSource::Table(name) => self.ident(name),
            FromSource::Derived { body, alias } => {
                self.push("(");
                self.statement(body)?;
                self.push(") AS ");
                self.ident(alias);
            }
        }

        // JOINs
        for join in &block.joins {
            self.join(join)?;
        }

        self.conjunction(" WHERE ", &block.filters)?;

        if !block.group_by.is_empty() {
            self.push(" GROUP BY ");
            self.list(&block.group_by, Self::expr)?;
        }

        self.conjunction(" HAVING ", &block.having)?;

        if !block.order_by.is_empty() {
            self.push(" ORDER BY ");
            self.order_keys(&block.order_by)?;
        }

        // LIMIT / OFFSET
        if let Some(limit) = &block.limit {
            self.push(" LIMIT ");
            self.expr(limit)?;
        } else if block.offset.is_some() {
            let dialect = self.dialect;
            if let Some(clause) = dialect.offset_without_limit() {
                self.push(" ");
                self.push(clause);
            }
        }
        if let Some(offset) = &block.offset {
            self.push(" OFFSET ");
            self.expr(offset)?;
        }
        Ok(())
    }

    pub(crate) fn select_items(&mut self, items: &[SelectItem]) -> Result<()> {
        self.list(items, |this, item| {
            this.expr(&item.expr)?;
            if let Some(alias) = &item.alias {
                this.push(" AS ");
                this.ident(alias);
            }
            Ok(())
        })
    }

    /// `keyword p1 AND p2 ...`, nothing when `predicates` is empty.
    pub(crate) fn conjunction(&mut self, keyword: &str, predicates: &[Expr]) -> Result<()> {
        for (i, predicate) in predicates.iter().enumerate() {
            self.push(if i == 0 { keyword } else { " AND " });
            self.expr(predicate)?;
        }
        Ok(())
    }

    fn join(&mut self, join: &JoinClause) -> Result<()> {
        self.push(" ");
        self.push(join.kind.keyword());
        self.push(" ");
        match &join.source {
            JoinSource::Table(name) => self.ident(name),
            JoinSource::Lateral { body, alias } => {
                self.push("LATERAL (");
                self.statement(body)?;
                self.push(") AS ");
                self.ident(alias);
            }
        }
        if let Some(condition) = &join.condition {
            self.push(" ON ");
            self.expr(condition)?;
        }
        Ok(())
    }

    fn set_operation(
        &mut self,
        op: SetOperator,
        all: bool,
        left: &Statement,
        right: &Statement,
    ) -> Result<()> {
        self.set_operand(left, Some((op, all)))?;
        self.push(" ");
        self.push(op.keyword());
        if all {
            self.push(" ALL");
        }
        self.push(" ");
        self.set_operand(right, None)
    }

    /// Operands that carry their own ORDER BY/LIMIT, or that would regroup
    /// under SQL's set-operator precedence, are wrapped as derived tables.
    /// `chain` is the parent operator when rendering its left side, where a
    /// same-operator chain can stay flat.
    fn set_operand(
        &mut self,
        operand: &Statement,
        chain: Option<(SetOperator, bool)>,
    ) -> Result<()> {
        let flat = match operand {
            Statement::Block(block) => {
                block.order_by.is_empty() && block.limit.is_none() && block.offset.is_none()
            }
            Statement::SetOp { op, all, .. } => chain == Some((*op, *all)),
            _ => false,
        };
        if flat {
            return self.statement(operand);
        }
        self.push("SELECT * FROM (");
        self.statement(operand)?;
        self.push(") AS ");
        self.ident(OPERAND_ALIAS);
        Ok(())
    }

    fn with(&mut self, recursive: bool, ctes: &[LoweredCte], body: &Statement) -> Result<()> {
        self.push(if recursive { "WITH RECURSIVE " } else { "WITH " });
        for (i, cte) in ctes.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.ident(&cte.name);
            if !cte.columns.is_empty() {
                self.push(" (");
                self.ident_list(&cte.columns);
                self.push(")");
            }
            self.push(" AS (");
            self.statement(&cte.body)?;
            self.push(")");
        }
        self.push(" ");
        self.statement(body)
    }
}
