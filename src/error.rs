use thiserror::Error;

/// Errors produced while building, running, training or persisting a network.
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Shape mismatch during {operation}: expected {expected}, got {actual}")]
    ShapeMismatch {
        expected: usize,
        actual: usize,
        operation: String,
    },

    #[error("Input layer is immutable: {0}")]
    ImmutableInputLayer(String),

    #[error("Malformed model file at line {line}: {message}")]
    Persistence { line: usize, message: String },

    #[error("Symbol {0:?} is not part of the vocabulary")]
    UnknownSymbol(char),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl NetworkError {
    pub(crate) fn shape(expected: usize, actual: usize, operation: impl Into<String>) -> Self {
        NetworkError::ShapeMismatch {
            expected,
            actual,
            operation: operation.into(),
        }
    }

    pub(crate) fn persistence(line: usize, message: impl Into<String>) -> Self {
        NetworkError::Persistence {
            line,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, NetworkError>;
