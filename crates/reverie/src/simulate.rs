//! The `simulate` subcommand.
//!
//! Replays a render burst against an in-memory repository so coalescing,
//! optimistic updates and rollback can be watched from the terminal.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use miette::Result;
use tokio::sync::broadcast::error::TryRecvError;
use tracing::{info, warn};

use reverie_interact::{InteractionConfig, InteractionCoordinator, InteractionError};
use reverie_store::{CacheConfig, EntryId, MemoryRepository, ViewerId};
use reverie_thread::ThreadBuilder;

use crate::input::load_entries;

pub struct SimulateOptions {
    pub input: PathBuf,
    pub viewer: String,
    pub renders: usize,
    pub latency_ms: u64,
    pub fail: bool,
    pub debounce_ms: u64,
    pub ttl_secs: u64,
}

pub async fn run(options: SimulateOptions) -> Result<()> {
    let entries = load_entries(&options.input).await?;
    let viewer = ViewerId::from(options.viewer);

    let repo = Arc::new(
        MemoryRepository::with_entries(entries.iter().cloned())
            .with_latency(Duration::from_millis(options.latency_ms)),
    );
    let ttl = Duration::from_secs(options.ttl_secs);
    let cache_config = CacheConfig::default()
        .with_debounce(Duration::from_millis(options.debounce_ms))
        .with_count_ttl(ttl)
        .with_viewer_ttl(ttl);
    let coordinator = Arc::new(InteractionCoordinator::from_repository(
        repo.clone(),
        &cache_config,
        InteractionConfig::default(),
    ));
    let mut updates = coordinator.counts().subscribe();

    let nodes = ThreadBuilder::default().build(&entries, None);
    let ids: Vec<EntryId> = nodes.iter().map(|n| n.entry.id.clone()).collect();

    // Render burst: every component asks for the same flags at once
    let loads = (0..options.renders).map(|_| coordinator.viewers().batch_load(&viewer, &ids));
    let failed = join_all(loads)
        .await
        .into_iter()
        .filter(|r| r.is_err())
        .count();
    if failed > 0 {
        warn!(failed, "some viewer-state loads failed");
    }
    if let Err(e) = coordinator.counts().refresh(&ids).await {
        warn!(error = %e, "count refresh failed");
    }
    info!(
        renders = options.renders,
        fetches = repo.calls().get_viewer_states,
        "render burst settled"
    );

    if let Some(target) = nodes.first().map(|n| n.entry.id.clone()) {
        repo.set_failing(options.fail);

        report("resonate", &target, coordinator.resonate(&viewer, &target).await);
        report("amplify", &target, coordinator.amplify(&viewer, &target).await);

        repo.set_failing(false);
    }

    let mut update_count = 0;
    loop {
        match updates.try_recv() {
            Ok(_) => update_count += 1,
            Err(TryRecvError::Lagged(skipped)) => update_count += skipped as usize,
            Err(TryRecvError::Empty | TryRecvError::Closed) => break,
        }
    }

    let calls = repo.calls();
    println!("repository calls:");
    println!("  get_viewer_states     {}", calls.get_viewer_states);
    println!("  get_counts            {}", calls.get_counts);
    println!("  toggle_resonance      {}", calls.toggle_resonance);
    println!("  toggle_amplification  {}", calls.toggle_amplification);
    println!("cache updates published: {}", update_count);
    println!();

    for rendered in coordinator.hydrate(&viewer, nodes) {
        let flags = match rendered.viewer_state {
            Some(state) => format!(
                "resonated={} amplified={}",
                state.has_resonated, state.has_amplified
            ),
            None => "flags unknown".to_string(),
        };
        println!(
            "{:indent$}[{}] resonance={} amplification={} branches={} {}",
            "",
            rendered.node.entry.id,
            rendered.counts.resonance_count,
            rendered.counts.amplification_count,
            rendered.counts.branch_count,
            flags,
            indent = rendered.node.depth * 2,
        );
    }

    Ok(())
}

fn report<T>(action: &str, target: &EntryId, result: Result<T, InteractionError>)
where
    T: std::fmt::Debug,
{
    match result {
        Ok(outcome) => println!("{} {}: {:?}", action, target, outcome),
        Err(e) => println!("{} {}: rolled back ({})", action, target, e),
    }
}
