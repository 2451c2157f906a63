use thiserror::Error;

use crate::dialect::Capability;

/// Errors raised while building or compiling a query.
///
/// None of these are retried: compiling the same tree again reproduces the
/// same error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    /// A placeholder field has no single unambiguous table to resolve to.
    #[error("cannot resolve `{expr}`: {reason}")]
    Resolution { expr: String, reason: String },

    /// The query needs a feature the dialect does not offer.
    #[error("dialect `{dialect}` does not support {feature}")]
    Capability { feature: Capability, dialect: String },

    /// Malformed tree: bad arity, empty required list, stage out of place.
    #[error("malformed query: {0}")]
    Structural(String),

    /// The dialect has no compilation rule for a node kind.
    #[error("dialect `{dialect}` cannot represent {kind}")]
    Unrepresentable { dialect: String, kind: String },
}

pub type Result<T, E = CompileError> = std::result::Result<T, E>;
