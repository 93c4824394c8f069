//! The `thread` subcommand.

use std::fmt::Write as _;
use std::path::Path;

use miette::{IntoDiagnostic, Result};
use tracing::info;

use reverie_thread::{ThreadBuilder, ThreadConfig, ThreadNode, TraversalMode};

use crate::ModeArg;
use crate::input::load_entries;

/// Longest content excerpt shown in the outline.
const EXCERPT_CHARS: usize = 60;

pub async fn run(
    input: &Path,
    mode: ModeArg,
    max_depth: usize,
    max_entries: usize,
    json: bool,
) -> Result<()> {
    let entries = load_entries(input).await?;

    let (config, requested) = configure(mode, max_depth, max_entries);
    let builder = ThreadBuilder::new(config);
    let (nodes, stats) = builder.build_with_stats(&entries, requested);

    info!(
        mode = %stats.mode,
        nodes = stats.result_count,
        roots = stats.root_count,
        duplicates = stats.duplicates,
        cycles_broken = stats.cycles_broken,
        depth_truncated = stats.depth_truncated,
        "build finished"
    );

    if json {
        println!("{}", serde_json::to_string_pretty(&nodes).into_diagnostic()?);
    } else {
        print!("{}", outline(&nodes));
    }
    Ok(())
}

/// Map the CLI mode onto builder config and an explicit mode, if any.
fn configure(
    mode: ModeArg,
    max_depth: usize,
    max_entries: usize,
) -> (ThreadConfig, Option<TraversalMode>) {
    let config = ThreadConfig::default()
        .with_max_depth(max_depth)
        .with_max_entries(max_entries);

    match mode {
        ModeArg::Dfs => (config, Some(TraversalMode::Dfs)),
        ModeArg::Bfs => (config, Some(TraversalMode::Bfs)),
        ModeArg::Adaptive => (config.with_adaptive(true), None),
    }
}

/// Indented one-line-per-node rendering.
fn outline(nodes: &[ThreadNode]) -> String {
    let mut out = String::new();
    for node in nodes {
        let entry = &node.entry;
        let author = entry.author.as_deref().unwrap_or("anonymous");
        let excerpt: String = entry.content.chars().take(EXCERPT_CHARS).collect();
        let ellipsis = if entry.content.chars().count() > EXCERPT_CHARS {
            "..."
        } else {
            ""
        };

        // Writing to a String cannot fail
        let _ = writeln!(
            out,
            "{:indent$}[{}] {} ({}, {}): {}{}",
            "",
            entry.id,
            author,
            entry.kind,
            entry.timestamp.format("%Y-%m-%d %H:%M"),
            excerpt,
            ellipsis,
            indent = node.depth * 2,
        );
    }
    out
}
