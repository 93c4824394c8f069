//! Reverie: threaded conversations with optimistic interactions
//!
//! Main binary with subcommands:
//! - `thread`: Build a conversation tree from a JSON entry dump
//! - `simulate`: Exercise the interaction caches against an in-memory repository

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use miette::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod input;
mod simulate;
mod thread;

/// Parse boolean from environment variable, accepting common truthy values.
/// Accepts "1", "true", "yes", "on" (case-insensitive) as true.
/// Accepts "0", "false", "no", "off", "" (case-insensitive) as false.
fn parse_bool_env(s: &str) -> Result<bool, String> {
    match s.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(format!(
            "invalid boolean value '{}', expected 1/true/yes/on or 0/false/no/off",
            s
        )),
    }
}

/// Traversal requested on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    Dfs,
    Bfs,
    /// Pick from the thread's shape
    Adaptive,
}

#[derive(Parser)]
#[command(name = "reverie")]
#[command(about = "Threaded conversations with optimistic interactions", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a thread from a JSON array of entries and print it
    Thread {
        /// JSON file holding an array of entries
        #[arg(long, env = "REVERIE_INPUT")]
        input: PathBuf,

        /// Traversal order
        #[arg(long, value_enum, env = "REVERIE_MODE", default_value = "dfs")]
        mode: ModeArg,

        /// Nodes deeper than this are left out
        #[arg(long, env = "REVERIE_MAX_DEPTH", default_value = "100")]
        max_depth: usize,

        /// Inputs larger than this are logged as a warning
        #[arg(long, env = "REVERIE_MAX_ENTRIES", default_value = "10000")]
        max_entries: usize,

        /// Print nodes as JSON instead of an outline
        #[arg(long, env = "REVERIE_JSON", value_parser = parse_bool_env, default_value = "false")]
        json: bool,
    },

    /// Run a render burst and a few interactions against an in-memory repository
    Simulate {
        /// JSON file holding an array of entries
        #[arg(long, env = "REVERIE_INPUT")]
        input: PathBuf,

        /// Viewer to act as
        #[arg(long, env = "REVERIE_VIEWER")]
        viewer: String,

        /// Concurrent viewer-state loads in the render burst
        #[arg(long, default_value = "10")]
        renders: usize,

        /// Artificial repository latency in milliseconds
        #[arg(long, env = "REVERIE_LATENCY_MS", default_value = "50")]
        latency_ms: u64,

        /// Make the repository fail the interactions
        #[arg(long, env = "REVERIE_FAIL", value_parser = parse_bool_env, default_value = "false")]
        fail: bool,

        /// Coalescer debounce window in milliseconds
        #[arg(long, env = "REVERIE_DEBOUNCE_MS", default_value = "100")]
        debounce_ms: u64,

        /// Cache TTL in seconds
        #[arg(long, env = "REVERIE_TTL_SECS", default_value = "30")]
        ttl_secs: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "reverie=info".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Thread {
            input,
            mode,
            max_depth,
            max_entries,
            json,
        } => {
            thread::run(&input, mode, max_depth, max_entries, json).await?;
        }
        Commands::Simulate {
            input,
            viewer,
            renders,
            latency_ms,
            fail,
            debounce_ms,
            ttl_secs,
        } => {
            simulate::run(simulate::SimulateOptions {
                input,
                viewer,
                renders,
                latency_ms,
                fail,
                debounce_ms,
                ttl_secs,
            })
            .await?;
        }
    }

    Ok(())
}
