//! Query construction algebra.
//!
//! ```text
//! Caller builds            Expr / Query trees   (expr.rs, query.rs)
//!       ↓
//! Placeholder resolution   (compiler/resolve.rs)
//!       ↓
//! Clause lowering + render (compiler/)
//!       ↓
//! Plan { sql, params }     → Driver
//! ```
//!
//! Trees are immutable and compare structurally, which is what lets the
//! plan cache key on them.

pub mod command;
pub mod expr;
pub mod ops;
pub mod query;
pub mod types;

pub use command::Command;
pub use expr::{
    case_when, col, column, count_star, excluded, exists, field, func, func_distinct, lit,
    not_exists, null, param, subquery, window, BoundParameter, ColumnRef, Expr, OrderKey,
    WindowCall,
};
pub use query::{
    table, Assignment, ConflictAction, Cte, JoinKind, JoinTarget, Query, SelectItem, Shape,
};
pub use types::*;
