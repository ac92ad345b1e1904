//! pdfunlock binary
//!
//! Logs go to stderr so that `--json` output on stdout stays parseable.

use clap::Parser;
use pdfunlock_cli::{render_json, render_text, run, Cli};
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let summary = run(&cli)?;

    if cli.json {
        println!("{}", render_json(&summary)?);
    } else {
        print!("{}", render_text(&summary));
    }

    if summary.has_failures() {
        std::process::exit(1);
    }
    Ok(())
}
