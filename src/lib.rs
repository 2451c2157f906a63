//! Typed SQL query construction, compiled per dialect into parameterized SQL.
//!
//! ```
//! use sqlforge::ast::*;
//! use sqlforge::{compile, DialectDescriptor};
//!
//! let q = table("users")
//!     .filter(field("active").eq(true))
//!     .select([col("id"), col("email")]);
//! let plan = compile(&DialectDescriptor::mysql(), &q).unwrap();
//! assert_eq!(plan.sql, "SELECT `id`, `email` FROM `users` WHERE (`users`.`active` = 1)");
//! ```

pub mod ast;
pub mod cache;
pub mod compiler;
pub mod config;
pub mod dialect;
pub mod error;

pub use cache::{cache_stats, compile_with_cache, CacheStats, PlanCache};
pub use compiler::{compile, compile_command, Plan};
pub use config::{CacheConfig, DialectConfig, Settings};
pub use dialect::{Capability, Dialect, DialectDescriptor};
pub use error::{CompileError, Result};
