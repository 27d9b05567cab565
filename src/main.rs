//! compat-runner - data-driven SQL compatibility test runner
//!
//! Runs a YAML test description against a PostgreSQL wire protocol
//! backend and exits non-zero at the first failed test iteration.

use clap::Parser;
use compat::cli::{self, Cli};
use compat::common::logging;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    logging::init_cli(cli.verbose);

    match cli::run(cli).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}
