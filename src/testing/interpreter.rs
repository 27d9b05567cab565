//! Step execution
//!
//! Walks a step list against one open connection. Errors are returned
//! unchanged to the caller; the lifecycle controller decides what a failure
//! means for the iteration.

use colored::Colorize;
use futures_util::future::BoxFuture;
use tracing::debug;

use crate::common::{Error, Result};
use crate::driver::{adjust_placeholders, QueryAdapter};

use super::assertion::assert_result;
use super::params::bind_parameters;
use super::scope::Scope;
use super::suite::{ActionStep, ExpectSpec, LoopSpec, LoopStep, Step};
use super::value::Value;

type LoopItems<'a> = Box<dyn Iterator<Item = Value> + Send + 'a>;

pub struct StepInterpreter<'a> {
    adapter: &'a mut dyn QueryAdapter,
    verbose: bool,
    executed: usize,
}

impl<'a> StepInterpreter<'a> {
    pub fn new(adapter: &'a mut dyn QueryAdapter) -> Self {
        Self {
            adapter,
            verbose: false,
            executed: 0,
        }
    }

    /// Print every executed step to stdout
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Number of statements executed so far
    pub fn executed(&self) -> usize {
        self.executed
    }

    /// Run `steps` in order, stopping at the first error
    pub fn run_steps<'s>(
        &'s mut self,
        steps: &'s [Step],
        scope: &'s Scope,
    ) -> BoxFuture<'s, Result<()>> {
        Box::pin(async move {
            for step in steps {
                match step {
                    Step::Action(action) => self.run_action(action, scope).await?,
                    Step::Loop(looped) => self.run_loop(looped, scope).await?,
                }
            }
            Ok(())
        })
    }

    async fn run_action(&mut self, step: &ActionStep, scope: &Scope) -> Result<()> {
        let template = step.query.as_deref().ok_or_else(|| {
            Error::Validation(format!("step '{}' has no query", step.label()))
        })?;

        let substituted = scope.substitute(template);
        let query = adjust_placeholders(&substituted, self.adapter.placeholder_style());
        let params = bind_parameters(&step.parameters, scope)?;

        if self.verbose {
            println!("    {} {}", "→".dimmed(), step.label());
        }
        debug!(
            driver = self.adapter.name(),
            params = params.len(),
            "executing: {}",
            query.trim()
        );

        let result = self.adapter.execute(&query, &params).await?;
        self.executed += 1;

        if let Some(expectation) = step.expect.as_ref().and_then(ExpectSpec::expectation) {
            assert_result(&expectation, &result)?;
            if self.verbose {
                println!("      {} result matched", "✓".green());
            }
        }
        Ok(())
    }

    async fn run_loop(&mut self, step: &LoopStep, scope: &Scope) -> Result<()> {
        let items = loop_items(&step.spec)?;
        let body = step.body();

        for item in items {
            debug!(var = %step.spec.var, item = %item, "loop iteration");
            let child = scope.branch(&step.spec.var, item);
            self.run_steps(body, &child).await?;
        }
        Ok(())
    }
}

/// Items a loop iterates over; `over` wins over `range`
fn loop_items(spec: &LoopSpec) -> Result<LoopItems<'_>> {
    match (&spec.over, &spec.range) {
        (Some(over), _) => match over.as_list() {
            Some(items) => Ok(Box::new(items.iter().cloned())),
            None => Err(Error::Validation(format!(
                "Loop 'over' must be a list, got {}",
                over.type_name()
            ))),
        },
        (None, Some(range)) => Ok(Box::new((range.start..=range.end).map(Value::Int))),
        (None, None) => Err(Error::Validation(
            "Loop must have 'over' or 'range' defined".to_string(),
        )),
    }
}
