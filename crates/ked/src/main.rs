//! ked CLI - Kroki diagram editor.
//!
//! Provides commands for:
//! - `encode`: Encode diagram source into a Kroki token
//! - `decode`: Recover diagram source from a token, Kroki URL or share link
//! - `link`: Print the shareable GET URL for a diagram
//! - `render`: Render a diagram once and save the result
//! - `watch`: Re-render a diagram file whenever it changes

mod commands;
mod error;
mod output;
mod target;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::{DecodeArgs, EncodeArgs, LinkArgs, RenderArgs, WatchArgs};
use output::Output;

/// ked - Kroki diagram editor.
#[derive(Parser)]
#[command(name = "ked", version, about)]
struct Cli {
    /// Enable verbose output (render timing and transport decisions).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encode diagram source into a Kroki token.
    Encode(EncodeArgs),
    /// Decode a token, Kroki URL or share link back into diagram source.
    Decode(DecodeArgs),
    /// Print the shareable URL for a diagram.
    Link(LinkArgs),
    /// Render a diagram once and save the result.
    Render(RenderArgs),
    /// Watch a diagram file and re-render on changes.
    Watch(WatchArgs),
}

fn main() {
    let cli = Cli::parse();
    let output = Output::new();

    // --verbose enables INFO level, otherwise use RUST_LOG or default to WARN
    let filter = if cli.verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Encode(args) => args.execute(),
        Commands::Decode(args) => args.execute(),
        Commands::Link(args) => args.execute(),
        Commands::Render(args) => args.execute(),
        Commands::Watch(args) => args.execute(),
    };

    if let Err(err) = result {
        output.error(&format!("Error: {err}"));
        std::process::exit(1);
    }
}
