use inkwell::builder::BuilderError;
use thiserror::Error;
use ul_analysis::{SemanticError, SemanticResult};
use ul_frontend::{Location, ParseError};

#[derive(Debug, Error)]
pub enum CodegenError {
    #[error("{}{error}", .location.as_ref().map(|l| format!("{l}: ")).unwrap_or_default())]
    Semantic {
        error: SemanticError,
        location: Option<Location>,
    },

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("backend builder error: {0}")]
    Builder(#[from] BuilderError),

    /// Every error recorded in accumulating mode, in source order.
    #[error("{}", .0.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("\n"))]
    Many(Vec<CodegenError>),
}

impl CodegenError {
    /// Attach `location` unless the error already points somewhere.
    pub fn or_at(self, location: &Location) -> Self {
        match self {
            CodegenError::Semantic {
                error,
                location: None,
            } => CodegenError::Semantic {
                error,
                location: Some(location.clone()),
            },
            other => other,
        }
    }

    /// The semantic error behind this failure, if it is one.
    pub fn semantic(&self) -> Option<&SemanticError> {
        match self {
            CodegenError::Semantic { error, .. } => Some(error),
            CodegenError::Many(errors) => errors.first().and_then(|e| e.semantic()),
            _ => None,
        }
    }
}

impl From<SemanticError> for CodegenError {
    fn from(error: SemanticError) -> Self {
        CodegenError::Semantic {
            error,
            location: None,
        }
    }
}

pub type CgResult<T> = Result<T, CodegenError>;

/// Attach a source location to a semantic failure.
pub(crate) trait At<T> {
    fn at(self, location: &Location) -> CgResult<T>;
}

impl<T> At<T> for SemanticResult<T> {
    fn at(self, location: &Location) -> CgResult<T> {
        self.map_err(|error| CodegenError::Semantic {
            error,
            location: Some(location.clone()),
        })
    }
}
