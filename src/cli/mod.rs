//! Command-line entry point
//!
//! Resolves connection settings (config file, then flags), loads the test
//! description and runs it against a PostgreSQL wire protocol backend.

use clap::Parser;
use colored::Colorize;
use std::path::PathBuf;
use tracing::debug;

use crate::common::config::Config;
use crate::common::Result;
use crate::driver::postgres::PostgresConnector;
use crate::driver::Connector;
use crate::testing::{RunOptions, Runner, SuiteReport, TestSuite};

#[derive(Parser, Debug)]
#[command(name = "compat-runner", about = "Data-driven SQL compatibility test runner")]
#[command(version, long_about = None)]
pub struct Cli {
    /// YAML test description to run
    pub file: PathBuf,

    /// Configuration file (default: <config dir>/compat-runner/config.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Database host
    #[arg(long)]
    pub host: Option<String>,

    /// Database port
    #[arg(long, short)]
    pub port: Option<u16>,

    /// Database user
    #[arg(long, short)]
    pub user: Option<String>,

    /// Database password
    #[arg(long)]
    pub password: Option<String>,

    /// Database name
    #[arg(long, short)]
    pub database: Option<String>,

    /// Iterations for tests that do not set their own
    #[arg(long, short)]
    pub iterations: Option<u32>,

    /// Print every executed step
    #[arg(long, short)]
    pub verbose: bool,
}

impl Cli {
    /// Configuration file values with command-line flags applied on top
    pub fn resolve_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load_from(path)?,
            None => Config::load()?,
        };

        let connection = &mut config.connection;
        if let Some(host) = &self.host {
            connection.host = host.clone();
        }
        if let Some(port) = self.port {
            connection.port = port;
        }
        if let Some(user) = &self.user {
            connection.user = user.clone();
        }
        if let Some(password) = &self.password {
            connection.password = password.clone();
        }
        if let Some(database) = &self.database {
            connection.database = database.clone();
        }
        if let Some(iterations) = self.iterations {
            config.defaults.iterations = iterations;
        }

        Ok(config)
    }
}

/// Run the suite named on the command line; `Ok(false)` when a test failed
pub async fn run(cli: Cli) -> Result<bool> {
    let config = cli.resolve_config()?;
    let suite = TestSuite::load(&cli.file)?;

    let connector = PostgresConnector::new(config.connection.clone());
    debug!(target_db = %connector.describe(), file = %cli.file.display(), "loaded suite");

    let options = RunOptions {
        default_iterations: config.defaults.iterations,
        verbose: cli.verbose,
    };
    let report = Runner::new(connector, options).run_suite(&suite).await;
    print_summary(&report);

    Ok(report.passed())
}

fn print_summary(report: &SuiteReport) {
    if report.passed() {
        println!(
            "\n{} {}\n",
            "✓".green().bold(),
            format!(
                "All tests passed ({} tests, {} iterations)",
                report.tests_total,
                report.passed_count()
            )
            .green()
            .bold()
        );
    } else {
        let skipped = report.tests_total - report.tests_run;
        println!(
            "\n{} {}\n",
            "✗".red().bold(),
            format!(
                "Test run failed ({} iterations passed, {} tests not run)",
                report.passed_count(),
                skipped
            )
            .red()
            .bold()
        );
    }
}
