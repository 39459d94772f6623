//! Error types for expression compilation and evaluation.

use std::fmt;

use thiserror::Error;

/// Points at the offending part of an expression.
///
/// Displays as the column number followed by the expression text and a
/// caret under the offending character.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    /// Full expression text.
    pub expression: String,
    /// Zero-based byte offset of the offending token.
    pub offset: usize,
}

impl Location {
    pub fn new(expression: &str, offset: usize) -> Self {
        Self {
            expression: expression.to_string(),
            offset: offset.min(expression.len()),
        }
    }

    /// One-based column of the offending token.
    pub fn column(&self) -> usize {
        self.expression[..self.offset].chars().count() + 1
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pad = " ".repeat(self.column() - 1);
        write!(
            f,
            " at column {}\n    {}\n    {}^",
            self.column(),
            self.expression,
            pad
        )
    }
}

/// Errors that can occur while compiling or evaluating an expression.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExpressionError {
    /// The expression text is not syntactically valid.
    #[error("syntax error: {message}{location}")]
    Syntax { message: String, location: Location },

    /// A name could not be resolved to a variable or constant.
    #[error("unknown variable '{name}'{location}")]
    UnresolvedVariable { name: String, location: Location },

    /// An operator or function was applied to operands of the wrong type.
    #[error("type error: {message}{location}")]
    Type { message: String, location: Location },

    /// A function name is not part of the library.
    #[error("unknown function '{name}'{location}")]
    UnknownFunction { name: String, location: Location },

    /// A function was called with the wrong number of arguments.
    #[error("function '{name}' expects {expected} argument(s), found {found}{location}")]
    Arity {
        name: String,
        expected: String,
        found: usize,
        location: Location,
    },

    /// Integer division or remainder by zero during evaluation.
    #[error("integer division by zero")]
    DivisionByZero,

    /// A runtime failure other than division by zero.
    #[error("evaluation failed: {0}")]
    Evaluation(String),

    /// The expression line is not of the form `<name> = <expression>`.
    #[error("invalid assignment '{0}': expected '<name> = <expression>'")]
    InvalidAssignment(String),
}

impl ExpressionError {
    pub fn syntax(message: impl Into<String>, expression: &str, offset: usize) -> Self {
        Self::Syntax {
            message: message.into(),
            location: Location::new(expression, offset),
        }
    }

    pub fn type_error(message: impl Into<String>, expression: &str, offset: usize) -> Self {
        Self::Type {
            message: message.into(),
            location: Location::new(expression, offset),
        }
    }

    pub fn evaluation(message: impl Into<String>) -> Self {
        Self::Evaluation(message.into())
    }

    /// Returns true for errors raised before any evaluation takes place.
    pub fn is_compile_error(&self) -> bool {
        !matches!(self, Self::DivisionByZero | Self::Evaluation(_))
    }
}

/// Result type for expression operations.
pub type Result<T> = std::result::Result<T, ExpressionError>;
