//! Backend-agnostic query execution
//!
//! The interpreter only sees the [`Connector`] and [`QueryAdapter`] traits.
//! A connector opens one adapter per test iteration; the adapter executes
//! already-substituted query text with positional parameters and reports
//! an [`ExecutionResult`].

pub mod mock;
pub mod placeholder;
pub mod postgres;

use async_trait::async_trait;
use std::fmt;

use crate::common::Result;
use crate::testing::params::BoundParam;
use crate::testing::value::Value;

pub use placeholder::{adjust_placeholders, PlaceholderStyle};

/// One returned row: field names and values in column order
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    fields: Vec<(String, Value)>,
}

impl Record {
    pub fn new(fields: Vec<(String, Value)>) -> Self {
        Self { fields }
    }

    /// Build a record with positional column names (`column1`, ...)
    pub fn from_values(values: impl IntoIterator<Item = Value>) -> Self {
        Self {
            fields: values
                .into_iter()
                .enumerate()
                .map(|(i, v)| (format!("column{}", i + 1), v))
                .collect(),
        }
    }

    pub fn fields(&self) -> &[(String, Value)] {
        &self.fields
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.fields.iter().map(|(_, v)| v)
    }

}

/// What a backend reported for one statement
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionResult {
    /// Rows from a select-class query, possibly none
    RowSet(Vec<Record>),
    /// Affected-row count of an insert/update-class statement
    Status(u64),
    /// No rows and no count
    Empty,
    /// A status the driver could not structure, kept verbatim
    Raw(String),
}

impl fmt::Display for ExecutionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionResult::RowSet(rows) => {
                let rows = rows
                    .iter()
                    .map(|r| Value::List(r.values().cloned().collect()))
                    .collect();
                write!(f, "{}", Value::List(rows).with_rendered_timestamps())
            }
            ExecutionResult::Status(count) => write!(f, "{}", count),
            ExecutionResult::Empty => f.write_str("null"),
            ExecutionResult::Raw(status) => f.write_str(status),
        }
    }
}

/// Shape of a statement, decided once from its leading keyword
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    /// Returns rows
    Select,
    /// Reports an affected-row count
    Mutation,
    /// DDL and everything else
    Other,
}

impl QueryKind {
    pub fn classify(query: &str) -> Self {
        match leading_keyword(query).to_ascii_lowercase().as_str() {
            "select" | "with" | "show" | "values" | "explain" => QueryKind::Select,
            "insert" | "update" | "delete" => QueryKind::Mutation,
            _ => QueryKind::Other,
        }
    }
}

/// First word of a query, skipping whitespace, `--` comments and opening
/// parentheses
pub fn leading_keyword(query: &str) -> &str {
    let mut rest = query;
    loop {
        rest = rest.trim_start_matches(|c: char| c.is_whitespace() || c == '(');
        match rest.strip_prefix("--") {
            Some(comment) => rest = comment.split_once('\n').map(|(_, r)| r).unwrap_or(""),
            None => break,
        }
    }
    let end = rest
        .find(|c: char| !c.is_ascii_alphabetic())
        .unwrap_or(rest.len());
    &rest[..end]
}

/// A live connection able to run statements
#[async_trait]
pub trait QueryAdapter: Send {
    /// Driver name for logs
    fn name(&self) -> &'static str;

    /// Marker syntax this driver binds positional parameters with
    fn placeholder_style(&self) -> PlaceholderStyle;

    /// Execute one statement. Backend errors are returned as
    /// [`crate::Error::Query`] and never retried.
    async fn execute(&mut self, query: &str, params: &[BoundParam]) -> Result<ExecutionResult>;

    /// Release the connection. Called exactly once, at the end of an
    /// iteration, whatever the outcome.
    async fn close(&mut self) -> Result<()>;
}

/// Opens fresh connections
#[async_trait]
pub trait Connector: Send + Sync {
    /// Human-readable target, e.g. `postgres://admin@localhost:8812/qdb`
    fn describe(&self) -> String;

    async fn connect(&self) -> Result<Box<dyn QueryAdapter>>;
}
