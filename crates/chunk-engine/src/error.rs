//! Error types for chunked grid computation.

use grid_expression::ExpressionError;
use thiserror::Error;

use crate::position::ChunkPosition;

/// Errors that can occur while building or running a chunked computation.
#[derive(Error, Debug)]
pub enum ChunkError {
    /// Grid dimensions or tile size cannot form a chunking scheme.
    #[error("invalid chunking scheme: {0}")]
    InvalidScheme(String),

    /// Expression failed to compile or evaluate.
    #[error("expression error: {0}")]
    Expression(#[from] ExpressionError),

    /// A chunk or value does not have the type a component requires.
    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    /// A producer returned a chunk that does not line up with the others.
    #[error("producer '{producer}' is not aligned at {position}: expected {expected}, found {found}")]
    Alignment {
        producer: String,
        position: ChunkPosition,
        expected: String,
        found: String,
    },

    /// Reading or writing backing storage failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// A buffer could not be allocated.
    #[error(
        "out of memory: {0}; reduce the tile size or thread count, or increase available memory"
    )]
    ResourceExhausted(String),

    /// The run was cancelled before this position was processed.
    #[error("computation cancelled")]
    Cancelled,

    /// A chunk function reported a failure.
    #[error("function error: {0}")]
    Function(String),

    /// Invalid engine configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// An operation was invoked in the wrong lifecycle state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Work for a single position failed.
    #[error("position {position} failed: {source}")]
    PositionFailed {
        position: ChunkPosition,
        source: Box<ChunkError>,
    },

    /// Several positions failed during a run-to-completion pass.
    #[error("{} positions failed, first: {}", .0.len(), first_failure(.0))]
    Aggregate(Vec<ChunkError>),
}

fn first_failure(errors: &[ChunkError]) -> String {
    errors
        .first()
        .map(|e| e.to_string())
        .unwrap_or_else(|| "none".to_string())
}

impl ChunkError {
    /// Create a Storage error.
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a TypeMismatch error.
    pub fn type_mismatch(msg: impl Into<String>) -> Self {
        Self::TypeMismatch(msg.into())
    }

    /// Create a Function error.
    pub fn function(msg: impl Into<String>) -> Self {
        Self::Function(msg.into())
    }

    /// Create a Config error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a ResourceExhausted error for an allocation of `count` elements.
    pub fn exhausted(count: usize, what: &str) -> Self {
        Self::ResourceExhausted(format!("cannot allocate {count} {what} values"))
    }

    /// Attach the failing position.
    pub fn at(self, position: ChunkPosition) -> Self {
        match self {
            Self::PositionFailed { .. } | Self::Cancelled => self,
            other => Self::PositionFailed {
                position,
                source: Box::new(other),
            },
        }
    }

    /// The position this error was raised for, if known.
    pub fn position(&self) -> Option<ChunkPosition> {
        match self {
            Self::PositionFailed { position, .. } | Self::Alignment { position, .. } => {
                Some(*position)
            }
            _ => None,
        }
    }

    /// Returns true for errors detected before any chunk is processed.
    pub fn is_configuration(&self) -> bool {
        match self {
            Self::Expression(e) => e.is_compile_error(),
            Self::InvalidScheme(_) | Self::Config(_) | Self::TypeMismatch(_) => true,
            _ => false,
        }
    }
}

impl From<std::io::Error> for ChunkError {
    fn from(err: std::io::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for ChunkError {
    fn from(err: serde_json::Error) -> Self {
        Self::Storage(format!("invalid metadata: {err}"))
    }
}

impl From<serde_yaml::Error> for ChunkError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Config(err.to_string())
    }
}

/// Result type for chunk engine operations.
pub type Result<T> = std::result::Result<T, ChunkError>;
