//! Test lifecycle controller
//!
//! Runs every test of a suite for its configured number of iterations.
//! Each iteration gets a fresh scope and a fresh connection and moves
//! through prepare, run and teardown; teardown and connection release
//! happen whatever the earlier phases returned. The suite stops at the
//! first failed iteration.

use colored::Colorize;
use std::fmt;
use tracing::{info, warn};

use crate::common::Error;
use crate::driver::Connector;

use super::interpreter::StepInterpreter;
use super::scope::{Scope, Variables};
use super::suite::{TestCase, TestSuite};

/// Iteration count used when neither the test nor the configuration sets one
pub const DEFAULT_ITERATIONS: u32 = 50;

#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    /// Iterations for tests that do not declare their own
    pub default_iterations: u32,
    /// Print each executed step
    pub verbose: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            default_iterations: DEFAULT_ITERATIONS,
            verbose: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Connect,
    Prepare,
    Run,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Connect => "connect",
            Phase::Prepare => "prepare",
            Phase::Run => "run",
        };
        f.write_str(name)
    }
}

/// The phase that failed an iteration and why
#[derive(Debug)]
pub struct PhaseFailure {
    pub phase: Phase,
    pub error: Error,
}

impl PhaseFailure {
    fn at(phase: Phase) -> impl FnOnce(Error) -> Self {
        move |error| Self { phase, error }
    }
}

impl fmt::Display for PhaseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} phase)", self.error, self.phase)
    }
}

/// Outcome of one iteration of one test
#[derive(Debug)]
pub struct IterationReport {
    pub test: String,
    /// 1-based
    pub iteration: u32,
    pub iterations: u32,
    /// Result of connect, prepare and run
    pub outcome: Result<(), PhaseFailure>,
    /// Reported separately; never changes `outcome`
    pub teardown: Option<Error>,
    pub steps_executed: usize,
}

impl IterationReport {
    pub fn passed(&self) -> bool {
        self.outcome.is_ok()
    }

    fn print(&self) {
        match &self.outcome {
            Ok(()) => println!(
                "  {} Test '{}' passed. (iteration {}/{})",
                "✓".green(),
                self.test,
                self.iteration,
                self.iterations
            ),
            Err(failure) => println!(
                "  {} Test '{}' failed: {} (iteration {}/{})",
                "✗".red(),
                self.test,
                failure,
                self.iteration,
                self.iterations
            ),
        }
        if let Some(error) = &self.teardown {
            println!(
                "  {} Teardown for test '{}' failed: {}",
                "!".yellow(),
                self.test,
                error
            );
        }
    }
}

/// Everything a suite run produced, in execution order
#[derive(Debug, Default)]
pub struct SuiteReport {
    pub iterations: Vec<IterationReport>,
    /// Tests at least partially run
    pub tests_run: usize,
    pub tests_total: usize,
}

impl SuiteReport {
    pub fn passed(&self) -> bool {
        self.failure().is_none()
    }

    /// The iteration that stopped the suite, if any
    pub fn failure(&self) -> Option<&IterationReport> {
        self.iterations.iter().find(|r| !r.passed())
    }

    pub fn passed_count(&self) -> usize {
        self.iterations.iter().filter(|r| r.passed()).count()
    }
}

pub struct Runner<C: Connector> {
    connector: C,
    options: RunOptions,
}

impl<C: Connector> Runner<C> {
    pub fn new(connector: C, options: RunOptions) -> Self {
        Self { connector, options }
    }

    /// Run all tests in order, stopping after the first failed iteration
    pub async fn run_suite(&self, suite: &TestSuite) -> SuiteReport {
        let mut report = SuiteReport {
            tests_total: suite.tests.len(),
            ..Default::default()
        };

        for test in &suite.tests {
            let iterations = test.iterations.unwrap_or(self.options.default_iterations);
            println!(
                "\n{} {}",
                "Running Test:".blue().bold(),
                test.name.white().bold()
            );
            report.tests_run += 1;

            for iteration in 1..=iterations {
                let result = self
                    .run_iteration(&suite.variables, test, iteration, iterations)
                    .await;
                result.print();

                let failed = !result.passed();
                report.iterations.push(result);
                if failed {
                    return report;
                }
            }
        }

        report
    }

    /// Run a single iteration of `test`
    pub async fn run_iteration(
        &self,
        globals: &Variables,
        test: &TestCase,
        iteration: u32,
        iterations: u32,
    ) -> IterationReport {
        info!(test = %test.name, iteration, iterations, "starting iteration");

        let mut report = IterationReport {
            test: test.name.clone(),
            iteration,
            iterations,
            outcome: Ok(()),
            teardown: None,
            steps_executed: 0,
        };

        let scope = Scope::new(globals, &test.variables);

        let mut adapter = match self.connector.connect().await {
            Ok(adapter) => adapter,
            Err(e) => {
                info!(test = %test.name, iteration, kind = %e.kind(), "connection failed");
                report.outcome = Err(PhaseFailure::at(Phase::Connect)(e));
                return report;
            }
        };

        let mut interpreter = StepInterpreter::new(adapter.as_mut()).verbose(self.options.verbose);

        report.outcome = match interpreter.run_steps(&test.prepare, &scope).await {
            Ok(()) => interpreter
                .run_steps(&test.steps, &scope)
                .await
                .map_err(PhaseFailure::at(Phase::Run)),
            Err(e) => Err(PhaseFailure::at(Phase::Prepare)(e)),
        };

        if let Err(e) = interpreter.run_steps(&test.teardown, &scope).await {
            warn!(test = %test.name, iteration, "teardown failed: {}", e);
            report.teardown = Some(e);
        }
        report.steps_executed = interpreter.executed();

        if let Err(e) = adapter.close().await {
            warn!(test = %test.name, iteration, "failed to close connection: {}", e);
        }

        if let Err(failure) = &report.outcome {
            info!(
                test = %test.name,
                iteration,
                phase = %failure.phase,
                kind = %failure.error.kind(),
                "iteration failed"
            );
        }
        report
    }
}
