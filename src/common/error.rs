//! Error types for the compatibility runner
//!
//! Every failure a test phase can hit is a variant here. Messages are meant
//! to be printed as-is in the per-iteration report, so they carry enough of
//! the expected and actual values to diagnose a failure without a debugger.

use std::fmt;
use std::io;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the compatibility runner
#[derive(Error, Debug)]
pub enum Error {
    // === Test description errors ===
    #[error("Invalid step: {0}")]
    Validation(String),

    #[error("Cannot convert {value} to {target}: {reason}")]
    Conversion {
        value: String,
        target: String,
        reason: String,
    },

    // === Backend errors ===
    #[error("Failed to connect to {endpoint}: {message}")]
    Connection { endpoint: String, message: String },

    #[error("Query failed: {message}\n  query: {query}")]
    Query { query: String, message: String },

    // === Assertion errors ===
    #[error("Expected result {expected}, got {actual}")]
    ResultMismatch { expected: String, actual: String },

    #[error("Expected row {row} not found in actual results {actual}")]
    MissingRow { row: String, actual: String },

    #[error("Expected {expected}, got status '{actual}'")]
    ResultShape { expected: String, actual: String },

    #[error("Assertion failed: {0}")]
    Assertion(String),

    // === Configuration errors ===
    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    #[error("Invalid test description: {0}")]
    Yaml(#[from] serde_yaml::Error),

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Coarse classification used for reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Conversion,
    Query,
    Assertion,
    Setup,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Conversion => "conversion",
            ErrorKind::Query => "query",
            ErrorKind::Assertion => "assertion",
            ErrorKind::Setup => "setup",
        };
        f.write_str(name)
    }
}

impl Error {
    /// Create a conversion error for a literal that does not fit its type
    pub fn conversion(value: impl fmt::Display, target: &str, reason: impl fmt::Display) -> Self {
        Self::Conversion {
            value: value.to_string(),
            target: target.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Create a query error, keeping the query text for the report
    pub fn query(query: &str, message: impl fmt::Display) -> Self {
        Self::Query {
            query: query.trim().to_string(),
            message: message.to_string(),
        }
    }

    /// Create a connection error
    pub fn connection(endpoint: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Connection {
            endpoint: endpoint.into(),
            message: message.to_string(),
        }
    }

    /// Create a mismatch error carrying both sides of the comparison
    pub fn result_mismatch(expected: impl fmt::Display, actual: impl fmt::Display) -> Self {
        Self::ResultMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// Which part of the taxonomy this error belongs to
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) => ErrorKind::Validation,
            Error::Conversion { .. } => ErrorKind::Conversion,
            Error::Connection { .. } | Error::Query { .. } => ErrorKind::Query,
            Error::ResultMismatch { .. }
            | Error::MissingRow { .. }
            | Error::ResultShape { .. }
            | Error::Assertion(_) => ErrorKind::Assertion,
            Error::ConfigParse(_)
            | Error::FileRead { .. }
            | Error::Yaml(_)
            | Error::Io(_) => ErrorKind::Setup,
        }
    }
}
