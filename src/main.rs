//! Shadowscope - shadow-logic analysis CLI
//!
//! A local-first analyzer that ranks code by the gap between structural
//! complexity and human review evidence.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = shadowscope::cli::Cli::parse();
    shadowscope::cli::run(cli)
}
