//! Integration tests for paged loading and live change streams.
//!
//! Drives `TaskSync` against the in-memory backend and checks that the
//! cache stays sorted and de-duplicated while pages and deltas interleave.

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::float_cmp)]

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use parking_lot::Mutex;

use taskdeck::CacheEvent;
use taskdeck::tasks::{LoadOutcome, TaskSync};
use taskdeck_proto::source::{ChangeKind, TaskChange, TaskSource};
use taskdeck_proto::task::{OwnerId, Partition, Task, TaskId, TaskPatch};
use taskdeck_store::MemoryBackend;

// ---------------------------------------------------------------------------
// Helper functions
// ---------------------------------------------------------------------------

fn alice() -> OwnerId {
    OwnerId::new("alice")
}

fn make_task(id: &str, order: f64, completed: bool) -> Task {
    Task {
        id: TaskId::new(id),
        owner: alice(),
        text: format!("task {id}"),
        completed,
        order,
        created_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        due_date: None,
    }
}

fn seed_many(backend: &MemoryBackend, prefix: &str, count: u32, completed: bool) {
    for i in 0..count {
        backend.seed_task(make_task(&format!("{prefix}{i:02}"), f64::from(i), completed));
    }
}

fn signed_in(backend: &Arc<MemoryBackend>, page_size: usize) -> Arc<TaskSync<MemoryBackend>> {
    let sync = TaskSync::new(Arc::clone(backend), page_size);
    sync.switch_owner(Some(alice())).unwrap();
    sync
}

async fn wait_until(mut done: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !done() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("condition not reached in time");
}

fn assert_sorted_and_unique(tasks: &[Task]) {
    let mut seen = HashSet::new();
    for task in tasks {
        assert!(seen.insert(task.id.clone()), "duplicate id {}", task.id);
    }
    for pair in tasks.windows(2) {
        assert!(pair[0].display_cmp(&pair[1]).is_lt());
    }
}

// ===========================================================================
// Paging
// ===========================================================================

#[tokio::test]
async fn partitions_page_independently() {
    let backend = Arc::new(MemoryBackend::new());
    seed_many(&backend, "p", 5, false);
    seed_many(&backend, "c", 3, true);
    let sync = signed_in(&backend, 2);

    let pending = sync.load_page(Partition::Pending).await.unwrap();
    assert_eq!(pending.added.len(), 2);
    let completed = sync.load_page(Partition::Completed).await.unwrap();
    assert_eq!(completed.added.len(), 2);

    assert!(sync.has_more(Partition::Pending));
    assert!(sync.has_more(Partition::Completed));
    let completed = sync.load_page(Partition::Completed).await.unwrap();
    assert_eq!(completed.added.len(), 1);
    assert!(!completed.has_more);
    assert!(sync.has_more(Partition::Pending));
}

#[tokio::test]
async fn load_page_never_returns_duplicates() {
    let backend = Arc::new(MemoryBackend::new());
    let sync = signed_in(&backend, 3);
    seed_many(&backend, "p", 7, false);

    // Let the live stream deliver every seeded task first.
    wait_until(|| sync.pending().len() == 7).await;

    let mut added = Vec::new();
    while sync.has_more(Partition::Pending) {
        added.extend(sync.load_page(Partition::Pending).await.unwrap().added);
    }
    assert!(added.is_empty());
    assert_eq!(sync.pending().len(), 7);
    assert_sorted_and_unique(&sync.all());
}

#[tokio::test]
async fn loading_everything_matches_backend() {
    let backend = Arc::new(MemoryBackend::new());
    seed_many(&backend, "p", 11, false);
    let sync = signed_in(&backend, 4);

    sync.load_all(Partition::Pending).await.unwrap();

    assert_eq!(sync.pending(), backend.tasks_of(&alice(), Partition::Pending));
    let outcome = sync.load_page(Partition::Pending).await.unwrap();
    assert_eq!(
        outcome,
        LoadOutcome {
            added: Vec::new(),
            has_more: false
        }
    );
}

#[tokio::test]
async fn page_loaded_events_are_published() {
    let backend = Arc::new(MemoryBackend::new());
    seed_many(&backend, "p", 2, false);
    let sync = signed_in(&backend, 10);

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let subscription = sync.subscribe(move |event| {
        if matches!(event, CacheEvent::PageLoaded { .. }) {
            sink.lock().push(event.clone());
        }
    });

    sync.load_page(Partition::Pending).await.unwrap();
    assert!(subscription.unsubscribe());
    sync.load_page(Partition::Completed).await.unwrap();

    let events = events.lock();
    assert_eq!(events.len(), 1);
    assert!(matches!(
        events[0],
        CacheEvent::PageLoaded {
            partition: Partition::Pending,
            ..
        }
    ));
}

// ===========================================================================
// Live deltas
// ===========================================================================

#[tokio::test]
async fn remote_writes_flow_into_cache_in_order() {
    let backend = Arc::new(MemoryBackend::new());
    seed_many(&backend, "p", 3, false);
    let sync = signed_in(&backend, 10);
    sync.load_page(Partition::Pending).await.unwrap();
    sync.load_page(Partition::Completed).await.unwrap();

    // Another device completes p01 and deletes p02.
    backend
        .update(&TaskId::new("p01"), TaskPatch::completed(true))
        .await
        .unwrap();
    backend.delete(&TaskId::new("p02")).await.unwrap();

    wait_until(|| sync.pending().len() == 1 && sync.completed().len() == 1).await;
    assert_eq!(sync.pending()[0].id, TaskId::new("p00"));
    assert_eq!(sync.completed()[0].id, TaskId::new("p01"));
}

#[tokio::test]
async fn removed_task_is_not_resurrected_by_later_page() {
    let backend = Arc::new(MemoryBackend::new());
    let sync = signed_in(&backend, 10);
    let doomed = make_task("doomed", 0.0, false);

    assert!(!sync.apply_remote_delta(&TaskChange {
        kind: ChangeKind::Removed,
        task: doomed.clone(),
    }));
    // The backend still returns it, as a stale query would.
    backend.seed_task(doomed);
    let outcome = sync.load_page(Partition::Pending).await.unwrap();

    assert!(outcome.added.is_empty());
    assert!(sync.pending().is_empty());
}

#[tokio::test]
async fn modified_delta_for_unknown_task_is_ignored() {
    let backend = Arc::new(MemoryBackend::new());
    let sync = signed_in(&backend, 10);

    assert!(!sync.apply_remote_delta(&TaskChange {
        kind: ChangeKind::Modified,
        task: make_task("ghost", 0.0, false),
    }));
    assert!(sync.all().is_empty());
}

#[tokio::test]
async fn delta_reorder_keeps_cache_sorted() {
    let backend = Arc::new(MemoryBackend::new());
    seed_many(&backend, "p", 4, false);
    let sync = signed_in(&backend, 10);
    sync.load_page(Partition::Pending).await.unwrap();

    let mut moved = make_task("p03", -5.0, false);
    moved.text = "task p03".to_string();
    assert!(sync.apply_remote_delta(&TaskChange {
        kind: ChangeKind::Modified,
        task: moved,
    }));

    let pending = sync.pending();
    assert_eq!(pending[0].id, TaskId::new("p03"));
    assert_sorted_and_unique(&pending);
}

#[tokio::test]
async fn signing_out_clears_cache_and_stops_updates() {
    let backend = Arc::new(MemoryBackend::new());
    seed_many(&backend, "p", 2, false);
    let sync = signed_in(&backend, 10);
    sync.load_page(Partition::Pending).await.unwrap();

    sync.switch_owner(None).unwrap();
    assert!(sync.all().is_empty());
    assert!(!sync.has_more(Partition::Pending));

    backend.seed_task(make_task("late", 9.0, false));
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert!(sync.all().is_empty());
    assert_eq!(
        sync.load_page(Partition::Pending).await.unwrap(),
        LoadOutcome::default()
    );
}
