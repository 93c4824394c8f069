//! Integration tests for the interaction coordinator against the in-memory
//! repository.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use pretty_assertions::assert_eq;

use reverie_interact::{InteractionConfig, InteractionCoordinator, InteractionError, InteractionKind};
use reverie_store::{
    CacheConfig, Entry, EntryFilter, EntryId, InteractionCounts, MemoryRepository, StoreError,
    ViewerId, ViewerInteractionState,
};
use reverie_thread::{ThreadBuilder, ThreadConfig, TraversalMode};

fn entry(id: &str, parent: Option<&str>, secs: i64, resonance: u64) -> Entry {
    Entry::new(id, parent.map(EntryId::from), Utc.timestamp_opt(secs, 0).unwrap()).with_counts(
        InteractionCounts {
            resonance_count: resonance,
            ..Default::default()
        },
    )
}

fn setup(entries: Vec<Entry>) -> (Arc<MemoryRepository>, InteractionCoordinator) {
    let repo = Arc::new(MemoryRepository::with_entries(entries));
    let cache_config = CacheConfig::default().with_debounce(Duration::ZERO);
    let coordinator =
        InteractionCoordinator::from_repository(repo.clone(), &cache_config, InteractionConfig::default());
    (repo, coordinator)
}

fn viewer() -> ViewerId {
    ViewerId::from("alice")
}

/// Load counters and flags for `ids` so there is something to roll back to.
async fn warm(coordinator: &InteractionCoordinator, ids: &[EntryId]) {
    coordinator.counts().refresh(ids).await.unwrap();
    coordinator.viewers().batch_load(&viewer(), ids).await.unwrap();
}

#[tokio::test]
async fn resonate_applies_and_confirms() {
    let (repo, coordinator) = setup(vec![entry("1", None, 1, 3)]);
    let id = EntryId::from("1");
    warm(&coordinator, &[id.clone()]).await;

    let outcome = coordinator.resonate(&viewer(), &id).await.unwrap();

    assert!(outcome.active);
    assert!(!outcome.reconciled);
    assert_eq!(outcome.counts.unwrap().resonance_count, 4);
    assert_eq!(coordinator.viewers().get(&viewer(), &id).unwrap().has_resonated, true);
    assert_eq!(repo.entry(&id).unwrap().counts.resonance_count, 4);
    assert!(!coordinator.is_pending(&viewer(), &id, InteractionKind::Resonance));
}

#[tokio::test]
async fn resonate_twice_undoes() {
    let (_repo, coordinator) = setup(vec![entry("1", None, 1, 3)]);
    let id = EntryId::from("1");
    warm(&coordinator, &[id.clone()]).await;

    coordinator.resonate(&viewer(), &id).await.unwrap();
    let outcome = coordinator.resonate(&viewer(), &id).await.unwrap();

    assert!(!outcome.active);
    assert_eq!(outcome.counts.unwrap().resonance_count, 3);
}

#[tokio::test]
async fn amplify_touches_only_amplification() {
    let (_repo, coordinator) = setup(vec![entry("1", None, 1, 3)]);
    let id = EntryId::from("1");
    warm(&coordinator, &[id.clone()]).await;

    let outcome = coordinator.amplify(&viewer(), &id).await.unwrap();
    let counts = outcome.counts.unwrap();

    assert_eq!(counts.amplification_count, 1);
    assert_eq!(counts.resonance_count, 3);
    assert_eq!(
        coordinator.viewers().get(&viewer(), &id),
        Some(ViewerInteractionState {
            has_resonated: false,
            has_amplified: true,
        })
    );
}

#[tokio::test]
async fn failure_rolls_back_exactly() {
    let (repo, coordinator) = setup(vec![entry("1", None, 1, 0)]);
    let id = EntryId::from("1");
    warm(&coordinator, &[id.clone()]).await;

    let state_before = coordinator.viewers().get(&viewer(), &id);
    let counts_before = coordinator.counts().get(&id);

    repo.set_failing(true);
    let err = coordinator.resonate(&viewer(), &id).await.unwrap_err();

    assert!(matches!(err, InteractionError::Remote(StoreError::Remote(_))));
    assert_eq!(coordinator.viewers().get(&viewer(), &id), state_before);
    assert_eq!(coordinator.counts().get(&id), counts_before);
    assert!(!coordinator.is_pending(&viewer(), &id, InteractionKind::Resonance));
}

#[tokio::test]
async fn failure_restores_unknown_as_unknown() {
    let (repo, coordinator) = setup(vec![entry("1", None, 1, 2)]);
    let id = EntryId::from("1");
    repo.set_failing(true);

    assert!(coordinator.resonate(&viewer(), &id).await.is_err());

    // Nothing was cached before, so nothing may be cached after
    assert_eq!(coordinator.viewers().get(&viewer(), &id), None);
    assert_eq!(coordinator.counts().get(&id), None);
}

#[tokio::test]
async fn repository_disagreement_is_reconciled() {
    let (repo, coordinator) = setup(vec![entry("1", None, 1, 1)]);
    let id = EntryId::from("1");
    coordinator.counts().refresh(&[id.clone()]).await.unwrap();

    // Another client already resonated; the local cache does not know yet
    repo.set_viewer_state(
        &viewer(),
        &id,
        ViewerInteractionState {
            has_resonated: true,
            has_amplified: false,
        },
    );

    let outcome = coordinator.resonate(&viewer(), &id).await.unwrap();

    assert!(!outcome.active);
    assert!(outcome.reconciled);
    assert_eq!(coordinator.viewers().get(&viewer(), &id).unwrap().has_resonated, false);
    assert_eq!(coordinator.counts().get(&id).unwrap().resonance_count, 0);
    assert_eq!(repo.entry(&id).unwrap().counts.resonance_count, 0);
}

#[tokio::test(start_paused = true)]
async fn second_action_while_pending_is_rejected() {
    let (repo, coordinator) = setup(vec![entry("1", None, 1, 0)]);
    let coordinator = Arc::new(coordinator);
    let id = EntryId::from("1");
    warm(&coordinator, &[id.clone()]).await;
    repo.set_latency(Duration::from_secs(1));

    let first = tokio::spawn({
        let coordinator = coordinator.clone();
        let id = id.clone();
        async move { coordinator.resonate(&viewer(), &id).await }
    });
    while !coordinator.is_pending(&viewer(), &id, InteractionKind::Resonance) {
        tokio::task::yield_now().await;
    }

    let err = coordinator.resonate(&viewer(), &id).await.unwrap_err();
    assert!(err.is_already_pending());

    // A different kind on the same entry is not blocked
    assert!(!coordinator.is_pending(&viewer(), &id, InteractionKind::Amplification));

    let outcome = first.await.unwrap().unwrap();
    assert!(outcome.active);
    assert_eq!(repo.calls().toggle_resonance, 1);
    assert_eq!(coordinator.counts().get(&id).unwrap().resonance_count, 1);
    assert_eq!(coordinator.pending_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn timeout_rolls_back() {
    let (repo, coordinator) = setup(vec![entry("1", None, 1, 5)]);
    let id = EntryId::from("1");
    warm(&coordinator, &[id.clone()]).await;
    repo.set_latency(Duration::from_secs(60));

    let err = coordinator.amplify(&viewer(), &id).await.unwrap_err();

    assert!(matches!(
        err,
        InteractionError::Timeout {
            operation: "toggle_amplification",
            after_ms: 15_000,
        }
    ));
    assert_eq!(
        coordinator.viewers().get(&viewer(), &id),
        Some(ViewerInteractionState::default())
    );
    assert_eq!(coordinator.counts().get(&id).unwrap().amplification_count, 0);
    assert!(!coordinator.is_pending(&viewer(), &id, InteractionKind::Amplification));
}

#[tokio::test(start_paused = true)]
async fn logout_while_pending_survives_rollback() {
    let (repo, coordinator) = setup(vec![entry("1", None, 1, 2)]);
    let coordinator = Arc::new(coordinator);
    let id = EntryId::from("1");
    warm(&coordinator, &[id.clone()]).await;
    repo.set_latency(Duration::from_secs(1));

    let toggle = tokio::spawn({
        let coordinator = coordinator.clone();
        let id = id.clone();
        async move { coordinator.resonate(&viewer(), &id).await }
    });
    while !coordinator.is_pending(&viewer(), &id, InteractionKind::Resonance) {
        tokio::task::yield_now().await;
    }
    repo.set_failing(true);
    coordinator.viewers().invalidate_viewer(&viewer());

    let err = toggle.await.unwrap().unwrap_err();
    assert!(matches!(err, InteractionError::Remote(_)));
    assert_eq!(coordinator.viewers().get(&viewer(), &id), None);
    assert!(coordinator.viewers().is_empty());
    assert_eq!(coordinator.counts().get(&id).unwrap().resonance_count, 2);
}

#[tokio::test(start_paused = true)]
async fn logout_while_pending_survives_reconciliation() {
    let (repo, coordinator) = setup(vec![entry("1", None, 1, 1)]);
    let coordinator = Arc::new(coordinator);
    let id = EntryId::from("1");
    coordinator.counts().refresh(&[id.clone()]).await.unwrap();
    repo.set_viewer_state(
        &viewer(),
        &id,
        ViewerInteractionState {
            has_resonated: true,
            has_amplified: false,
        },
    );
    repo.set_latency(Duration::from_secs(1));

    let toggle = tokio::spawn({
        let coordinator = coordinator.clone();
        let id = id.clone();
        async move { coordinator.resonate(&viewer(), &id).await }
    });
    while !coordinator.is_pending(&viewer(), &id, InteractionKind::Resonance) {
        tokio::task::yield_now().await;
    }
    coordinator.viewers().invalidate_viewer(&viewer());

    let outcome = toggle.await.unwrap().unwrap();
    assert!(outcome.reconciled);
    assert!(!outcome.active);
    assert_eq!(coordinator.viewers().get(&viewer(), &id), None);
    assert!(coordinator.viewers().is_empty());
    assert_eq!(coordinator.counts().get(&id).unwrap().resonance_count, 0);
}

#[tokio::test]
async fn branch_bumps_parent_after_success() {
    let (repo, coordinator) = setup(vec![entry("1", None, 1, 0)]);
    let parent = EntryId::from("1");
    coordinator.counts().refresh(&[parent.clone()]).await.unwrap();

    let child = coordinator.branch(&parent, "a reply").await.unwrap();

    assert_eq!(child.parent_id, Some(parent.clone()));
    assert_eq!(child.content, "a reply");
    assert_eq!(coordinator.counts().get(&parent).unwrap().branch_count, 1);
    assert_eq!(repo.len(), 2);
}

#[tokio::test]
async fn branch_failure_returns_draft() {
    let (repo, coordinator) = setup(vec![entry("1", None, 1, 0)]);
    let parent = EntryId::from("1");
    coordinator.counts().refresh(&[parent.clone()]).await.unwrap();
    repo.set_failing(true);

    let err = coordinator.branch(&parent, "keep me").await.unwrap_err();

    match err {
        InteractionError::BranchFailed {
            parent: failed_parent,
            content,
            ..
        } => {
            assert_eq!(failed_parent, parent);
            assert_eq!(content, "keep me");
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(coordinator.counts().get(&parent).unwrap().branch_count, 0);
}

#[tokio::test]
async fn hydrate_keeps_unknown_flags_unknown() {
    let entries = vec![entry("1", None, 1, 7), entry("2", Some("1"), 2, 1)];
    let (_repo, coordinator) = setup(entries.clone());
    coordinator.counts().refresh(&["1".into()]).await.unwrap();
    coordinator.counts().apply_delta(&"1".into(), reverie_store::CountField::Resonance, 1);

    let nodes = ThreadBuilder::default().build(&entries, Some(TraversalMode::Dfs));
    let rendered = coordinator.hydrate(&viewer(), nodes);

    assert_eq!(rendered.len(), 2);
    // Cached counters win over the embedded ones
    assert_eq!(rendered[0].counts.resonance_count, 8);
    // Cache miss falls back to the entry
    assert_eq!(rendered[1].counts.resonance_count, 1);
    assert!(rendered.iter().all(|r| r.viewer_state.is_none()));
    assert_eq!(rendered[1].has_resonated(), None);
}

#[tokio::test]
async fn load_thread_hydrates_everything() {
    let (repo, coordinator) = setup(vec![
        entry("root", None, 1, 2),
        entry("a", Some("root"), 2, 0),
        entry("b", Some("root"), 3, 0),
    ]);
    repo.set_viewer_state(
        &viewer(),
        &"a".into(),
        ViewerInteractionState {
            has_resonated: true,
            has_amplified: false,
        },
    );
    let coordinator = coordinator.with_builder(ThreadBuilder::new(
        ThreadConfig::default().with_default_mode(TraversalMode::Bfs),
    ));

    let rendered = coordinator
        .load_thread(&viewer(), &EntryFilter::default())
        .await
        .unwrap();

    let ids: Vec<_> = rendered.iter().map(|r| r.node.entry.id.as_str()).collect();
    assert_eq!(ids, vec!["root", "a", "b"]);
    assert_eq!(rendered[0].counts.resonance_count, 2);
    assert_eq!(rendered[1].has_resonated(), Some(true));
    // Ids missing from the repository response load as unset, not unknown
    assert_eq!(rendered[2].has_resonated(), Some(false));
    assert_eq!(repo.calls().get_counts, 1);
    assert_eq!(repo.calls().get_viewer_states, 1);
}

#[tokio::test]
async fn load_thread_fails_without_entries() {
    let (repo, coordinator) = setup(vec![entry("root", None, 1, 4)]);
    repo.set_failing(true);

    let err = coordinator
        .load_thread(&viewer(), &EntryFilter::default())
        .await
        .unwrap_err();

    assert!(matches!(err, InteractionError::Remote(_)));
    assert!(coordinator.counts().is_empty());
    assert_eq!(repo.calls().get_counts, 0);
}
