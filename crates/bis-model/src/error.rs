//! Error types for LDraw line parsing.

use thiserror::Error;

/// Errors raised while tokenizing or interpreting a single LDraw line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    /// The first token is not one of the LDraw line types 0-5.
    #[error("unknown line type '{token}'")]
    UnknownLineType { token: String },

    /// A geometry line carries fewer fields than its type requires.
    #[error("line type {line_type} needs {expected} fields, found {found}")]
    MissingFields {
        line_type: u8,
        expected: usize,
        found: usize,
    },

    /// A numeric field could not be parsed.
    #[error("invalid number '{value}' in field {field}")]
    InvalidNumber { field: usize, value: String },

    /// The colour field is neither a decimal code nor a direct colour.
    #[error("invalid colour '{value}'")]
    InvalidColour { value: String },

    /// A viewer step key string does not follow `model;line;step[_suffix]`.
    #[error("malformed viewer step key '{key}'")]
    MalformedKey { key: String },
}

/// Result type for line-level operations.
pub type Result<T> = std::result::Result<T, ModelError>;
