//! Error types for data parsing in stride-types.

use thiserror::Error;

/// Errors that can occur when parsing step data.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// A calendar day string was not in `YYYY-MM-DD` form.
    #[error("Invalid day '{input}': expected YYYY-MM-DD")]
    InvalidDay {
        /// The rejected input.
        input: String,
    },

    /// A document key was not in `{user}_{date}` form.
    #[error("Invalid document key: {0}")]
    InvalidKey(String),

    /// A field held a value outside its valid range.
    #[error("Invalid value: {0}")]
    InvalidValue(String),
}

impl ParseError {
    /// Create an invalid day error for the given input.
    pub fn invalid_day(input: impl Into<String>) -> Self {
        Self::InvalidDay {
            input: input.into(),
        }
    }
}

/// Result type alias using stride-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
