//! Test description types
//!
//! Defines the data structures for deserializing YAML test suites. Only
//! what a step needs to execute is checked here; everything else is left
//! to the interpreter.

use serde::de::{self, Deserializer};
use serde::Deserialize;
use std::path::Path;

use crate::common::{Error, Result};

use super::params::TypedParameter;
use super::scope::Variables;
use super::value::Value;

/// A complete test description loaded from a YAML file
#[derive(Deserialize, Debug, Default)]
pub struct TestSuite {
    /// Variables visible to every test
    #[serde(default)]
    pub variables: Variables,
    /// Tests, run in order
    #[serde(default)]
    pub tests: Vec<TestCase>,
}

impl TestSuite {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        // An empty document is a suite with nothing to run
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }
}

#[derive(Deserialize, Debug)]
pub struct TestCase {
    pub name: String,
    /// Overrides merged over the suite variables
    #[serde(default)]
    pub variables: Variables,
    /// Falls back to the configured default when absent
    pub iterations: Option<u32>,
    #[serde(default)]
    pub prepare: Vec<Step>,
    #[serde(default)]
    pub steps: Vec<Step>,
    #[serde(default)]
    pub teardown: Vec<Step>,
}

/// A single entry of a step list
#[derive(Debug)]
pub enum Step {
    Loop(LoopStep),
    Action(ActionStep),
}

// A mapping carrying a `loop` key is a loop; anything else is an action.
impl<'de> Deserialize<'de> for Step {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = serde_yaml::Value::deserialize(deserializer)?;
        let is_loop = raw
            .as_mapping()
            .is_some_and(|mapping| mapping.contains_key("loop"));

        if is_loop {
            serde_yaml::from_value(raw)
                .map(Step::Loop)
                .map_err(de::Error::custom)
        } else {
            serde_yaml::from_value(raw)
                .map(Step::Action)
                .map_err(de::Error::custom)
        }
    }
}

#[derive(Deserialize, Debug)]
pub struct LoopStep {
    #[serde(rename = "loop")]
    pub spec: LoopSpec,
    /// Body written next to `loop` rather than inside it
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl LoopStep {
    /// Nested steps; `loop.steps` takes precedence over a sibling `steps`
    pub fn body(&self) -> &[Step] {
        if self.spec.steps.is_empty() {
            &self.steps
        } else {
            &self.spec.steps
        }
    }
}

#[derive(Deserialize, Debug)]
pub struct LoopSpec {
    /// Name the current item is bound to
    #[serde(rename = "as")]
    pub var: String,
    pub over: Option<Value>,
    pub range: Option<RangeSpec>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

/// Inclusive integer range
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeSpec {
    pub start: i64,
    pub end: i64,
}

#[derive(Deserialize, Debug, Default)]
pub struct ActionStep {
    /// Free-form label shown in verbose output
    pub action: Option<String>,
    pub query: Option<String>,
    #[serde(default)]
    pub parameters: Vec<TypedParameter>,
    pub expect: Option<ExpectSpec>,
}

impl ActionStep {
    pub fn label(&self) -> &str {
        self.action
            .as_deref()
            .or_else(|| self.query.as_deref().and_then(|q| q.trim().lines().next()))
            .unwrap_or("step")
    }
}

/// Expectations of an action step
#[derive(Deserialize, Debug, Default)]
pub struct ExpectSpec {
    /// Exact result
    #[serde(default, deserialize_with = "present")]
    pub result: Option<Value>,
    /// Rows that must each appear in the result
    #[serde(default, deserialize_with = "present")]
    pub result_contains: Option<Value>,
}

/// A key written with an explicit null still counts as present
fn present<'de, D>(deserializer: D) -> std::result::Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}
