//! Error taxonomy.
//!
//! Every failure in the engine falls into one of six categories, each with a
//! numeric code range. Layers propagate errors upward unchanged; only the
//! parser attaches source locations.

use serde::{Deserialize, Serialize};

/// Failure category. Each category owns a thousand-range of codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCategory {
    Syntax,
    Semantic,
    Type,
    Runtime,
    Constraint,
    Transaction,
}

impl ErrorCategory {
    /// Base code for the category (SYNTAX = 1000, ... TRANSACTION = 6000).
    pub fn base_code(self) -> u32 {
        match self {
            ErrorCategory::Syntax => 1000,
            ErrorCategory::Semantic => 2000,
            ErrorCategory::Type => 3000,
            ErrorCategory::Runtime => 4000,
            ErrorCategory::Constraint => 5000,
            ErrorCategory::Transaction => 6000,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCategory::Syntax => "SYNTAX",
            ErrorCategory::Semantic => "SEMANTIC",
            ErrorCategory::Type => "TYPE",
            ErrorCategory::Runtime => "RUNTIME",
            ErrorCategory::Constraint => "CONSTRAINT",
            ErrorCategory::Transaction => "TRANSACTION",
        }
    }
}

/// Source location, 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub line: u32,
    pub column: u32,
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// Malformed query text. Carries location and a short context slice.
    #[error("syntax error at {location}: {message}")]
    Syntax {
        message: String,
        location: Location,
        /// Up to 64 chars of surrounding source.
        context: String,
    },

    #[error("undefined variable '{0}'")]
    UndefinedVariable(String),

    #[error("missing parameter '${0}'")]
    MissingParameter(String),

    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    #[error("variable '{name}' already bound to a different entity kind")]
    InconsistentVariable { name: String },

    #[error("column mismatch across UNION branches")]
    UnionColumnMismatch,

    #[error("semantic error: {0}")]
    Semantic(String),

    #[error("type error: expected {expected}, got {got}")]
    Type { expected: String, got: String },

    #[error("function '{name}' expects {expected} arguments, got {got}")]
    Arity {
        name: String,
        expected: String,
        got: usize,
    },

    #[error("cannot compare {left} with {right}")]
    Incomparable { left: String, right: String },

    #[error("result cap of {0} rows reached; add a LIMIT clause")]
    RowCapExceeded(usize),

    #[error("expression nesting exceeds the maximum depth of {0}")]
    DepthExceeded(usize),

    #[error("variable-length expansion exceeds the maximum depth of {0}")]
    ExpandDepthExceeded(usize),

    #[error("query cancelled")]
    Cancelled,

    #[error("runtime error: {0}")]
    Runtime(String),

    #[error("edge endpoint {0} does not exist")]
    MissingEndpoint(u64),

    #[error("cannot delete node {id}: {edges} connected edge(s); use DETACH DELETE")]
    NodeHasEdges { id: u64, edges: usize },

    #[error("constraint violation: {0}")]
    Constraint(String),

    #[error("host transaction failure: {0}")]
    Transaction(String),
}

impl Error {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Syntax { .. } => ErrorCategory::Syntax,
            Error::UndefinedVariable(_)
            | Error::MissingParameter(_)
            | Error::UnknownFunction(_)
            | Error::InconsistentVariable { .. }
            | Error::UnionColumnMismatch
            | Error::Semantic(_) => ErrorCategory::Semantic,
            Error::Type { .. } | Error::Arity { .. } | Error::Incomparable { .. } => {
                ErrorCategory::Type
            }
            Error::RowCapExceeded(_)
            | Error::DepthExceeded(_)
            | Error::ExpandDepthExceeded(_)
            | Error::Cancelled
            | Error::Runtime(_) => ErrorCategory::Runtime,
            Error::MissingEndpoint(_) | Error::NodeHasEdges { .. } | Error::Constraint(_) => {
                ErrorCategory::Constraint
            }
            Error::Transaction(_) => ErrorCategory::Transaction,
        }
    }

    /// Numeric code: category base plus a per-variant offset.
    pub fn code(&self) -> u32 {
        let offset = match self {
            Error::Syntax { .. } => 1,
            Error::UndefinedVariable(_) => 1,
            Error::InconsistentVariable { .. } => 2,
            Error::MissingParameter(_) => 3,
            Error::UnknownFunction(_) => 4,
            Error::UnionColumnMismatch => 5,
            Error::Semantic(_) => 9,
            Error::Type { .. } => 1,
            Error::Arity { .. } => 2,
            Error::Incomparable { .. } => 3,
            Error::RowCapExceeded(_) => 1,
            Error::DepthExceeded(_) => 2,
            Error::ExpandDepthExceeded(_) => 3,
            Error::Cancelled => 4,
            Error::Runtime(_) => 9,
            Error::MissingEndpoint(_) => 1,
            Error::NodeHasEdges { .. } => 2,
            Error::Constraint(_) => 9,
            Error::Transaction(_) => 1,
        };
        self.category().base_code() + offset
    }

    pub fn location(&self) -> Option<Location> {
        match self {
            Error::Syntax { location, .. } => Some(*location),
            _ => None,
        }
    }

    /// Context slice of the source around a syntax error, if any.
    pub fn context(&self) -> Option<&str> {
        match self {
            Error::Syntax { context, .. } => Some(context.as_str()),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_codes() {
        let err = Error::Syntax {
            message: "bad".into(),
            location: Location { line: 1, column: 5 },
            context: "MATCH (".into(),
        };
        assert_eq!(err.category(), ErrorCategory::Syntax);
        assert_eq!(err.code(), 1001);

        assert_eq!(Error::UndefinedVariable("x".into()).code(), 2001);
        assert_eq!(
            Error::Type { expected: "Integer".into(), got: "String".into() }.code(),
            3001
        );
        assert_eq!(Error::RowCapExceeded(10_000).code(), 4001);
        assert_eq!(Error::NodeHasEdges { id: 1, edges: 2 }.code(), 5002);
        assert_eq!(Error::Transaction("rollback".into()).code(), 6001);
    }

    #[test]
    fn test_runtime_codes() {
        assert_eq!(Error::DepthExceeded(64).code(), 4002);
        assert_eq!(Error::ExpandDepthExceeded(15).code(), 4003);
        assert_eq!(Error::Cancelled.code(), 4004);
        assert_eq!(Error::MissingEndpoint(9).code(), 5001);
    }

    #[test]
    fn test_location_only_on_syntax() {
        let err = Error::Semantic("x".into());
        assert!(err.location().is_none());
        assert!(err.context().is_none());
    }

    #[test]
    fn test_category_names() {
        assert_eq!(ErrorCategory::Syntax.as_str(), "SYNTAX");
        assert_eq!(ErrorCategory::Transaction.as_str(), "TRANSACTION");
        assert_eq!(ErrorCategory::Constraint.base_code(), 5000);
    }
}
