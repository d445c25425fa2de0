//! safemark CLI - sanitizing markdown renderer.
//!
//! Provides commands for:
//! - `render`: Render markdown to sanitized HTML, a JSON tree, or plain text
//! - `normalize`: Apply line-break normalization only

mod commands;
mod error;
mod output;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::{NormalizeArgs, RenderArgs};
use output::Output;

/// safemark - Sanitizing markdown renderer.
#[derive(Parser)]
#[command(name = "safemark", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render markdown through the sanitizing pipeline.
    Render(RenderArgs),
    /// Print markdown with line breaks normalized.
    Normalize(NormalizeArgs),
}

fn main() {
    let cli = Cli::parse();
    let output = Output::new();

    let verbose = matches!(&cli.command, Commands::Render(args) if args.verbose);

    // --verbose enables DEBUG level, otherwise use RUST_LOG or default to WARN
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Render(args) => args.execute(),
        Commands::Normalize(args) => args.execute(),
    };

    if let Err(err) = result {
        output.error(&format!("Error: {err}"));
        std::process::exit(1);
    }
}
