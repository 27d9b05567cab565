//! Test description engine
//!
//! Reads YAML test suites and drives them against a database through the
//! [`crate::driver`] traits: variable scoping and substitution, typed
//! parameter coercion, loop expansion and result assertion.

pub mod assertion;
pub mod interpreter;
pub mod params;
pub mod runner;
pub mod scope;
pub mod suite;
pub mod value;

pub use assertion::{assert_result, Expectation};
pub use interpreter::StepInterpreter;
pub use params::{bind_parameters, coerce, BoundParam, ParamType, TypedParameter};
pub use runner::{IterationReport, Phase, PhaseFailure, RunOptions, Runner, SuiteReport};
pub use scope::{Scope, Variables};
pub use suite::{ActionStep, ExpectSpec, LoopSpec, LoopStep, RangeSpec, Step, TestCase, TestSuite};
pub use value::Value;
