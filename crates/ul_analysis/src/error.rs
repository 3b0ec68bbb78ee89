use thiserror::Error;

/// Every semantic inconsistency the engine can detect. All of them abort the
/// compilation; the code generator attaches the offending source location.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SemanticError {
    #[error("unknown type `{0}`")]
    UnknownType(String),

    #[error("undeclared identifier `{0}`")]
    UndeclaredIdentifier(String),

    #[error("class `{class}` has no method `{method}`")]
    UnknownMethod { class: String, method: String },

    #[error("class `{class}` has no field `{field}`")]
    UnknownField { class: String, field: String },

    #[error("no constructor of `{class}` accepts ({args})")]
    NoMatchingConstructor { class: String, args: String },

    #[error("`{callee}` expects {expected} argument(s), found {found}")]
    ArityMismatch {
        callee: String,
        expected: usize,
        found: usize,
    },

    #[error("cannot convert `{from}` to `{to}`")]
    NonCastable { from: String, to: String },

    #[error("{0}")]
    InvalidOperand(String),

    #[error("cannot include `{path}`: {reason}")]
    IncludeFailure { path: String, reason: String },
}

impl SemanticError {
    pub fn invalid(message: impl Into<String>) -> Self {
        SemanticError::InvalidOperand(message.into())
    }

    pub fn non_castable(from: impl ToString, to: impl ToString) -> Self {
        SemanticError::NonCastable {
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}

pub type SemanticResult<T> = Result<T, SemanticError>;
