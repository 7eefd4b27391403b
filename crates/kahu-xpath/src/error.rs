//! Error codes and the engine error type.
//!
//! Codes are authoritative; messages are informational. Module-system
//! failures carry the W3C error code as a message prefix (for example
//! `XQST0048: ...`) while mapping onto the host-visible code set.

use thiserror::Error;

/// Host-visible outcome codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Okay,
    /// A valid evaluation produced no matches.
    Search,
    /// Cooperative cancellation requested by a callback.
    Terminate,
    /// Tokeniser/parser rejection, or a runtime construct the engine does not
    /// implement.
    Syntax,
    NullArgs,
    InvalidValue,
    Failed,
}

impl ErrorCode {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Okay => "Okay",
            ErrorCode::Search => "Search",
            ErrorCode::Terminate => "Terminate",
            ErrorCode::Syntax => "Syntax",
            ErrorCode::NullArgs => "NullArgs",
            ErrorCode::InvalidValue => "InvalidValue",
            ErrorCode::Failed => "Failed",
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("{}: {message}", code.as_str())]
pub struct Error {
    pub code: ErrorCode,
    pub message: String,
}

impl Error {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }

    /// Runtime construct the engine does not implement; surfaces as `Syntax`
    /// from the top-level entry points per the error taxonomy.
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Syntax, message)
    }

    pub fn invalid_value(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidValue, message)
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Failed, message)
    }

    /// Module-system error carrying its W3C code as the message prefix.
    pub fn module(w3c_code: &str, message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Failed, format!("{w3c_code}: {}", message.into()))
    }
}

/// Result of a `find_tag` traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FindOutcome {
    /// At least one callback fired successfully.
    Matched,
    /// Valid evaluation, no matching node.
    NoMatch,
    /// A callback requested termination.
    Terminated,
}

/// Callback verdict for `find_tag`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Continue,
    Terminate,
}
