//! ruleweave entry point.
//!
//! ```bash
//! cargo run -p ruleweave-cli -- check --tree person.json --value alice.json
//! ```

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use ruleweave_cli::Cli;

fn main() -> Result<ExitCode> {
    // Logs go to stderr so stdout stays machine-readable (respects RUST_LOG)
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let outcome = ruleweave_cli::run(Cli::parse())?;
    println!("{}", outcome.output);

    Ok(if outcome.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
