//! compat-runner - data-driven SQL compatibility testing
//!
//! This library reads declarative YAML test descriptions and drives them
//! against SQL backends through pluggable drivers, checking returned rows
//! against exact or subset expectations.

pub mod cli;
pub mod common;
pub mod driver;
pub mod testing;

// Re-export commonly used types for tests
pub use common::{Error, Result};
