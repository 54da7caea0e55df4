//! Integration tests for the task write path.
//!
//! Exercises `MutationGateway` against the in-memory backend: validation,
//! rate limiting, optimistic updates with rollback, reordering, bulk
//! clears and history recording.

#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::float_cmp,
    clippy::similar_names
)]

use std::sync::Arc;
use std::time::Duration;

use chrono::{Days, Months, TimeZone, Utc};
use parking_lot::Mutex;

use taskdeck::CacheEvent;
use taskdeck::MutationKind;
use taskdeck::history::{HistoryConfig, HistoryLog};
use taskdeck::rate_limit::{OperationKind, RateLimit, RateLimiter, RateLimits};
use taskdeck::tasks::{MutationGateway, TaskError, TaskSync};
use taskdeck_proto::history::HistoryAction;
use taskdeck_proto::source::{ChangeStream, Page, PageRequest, SourceError, TaskSource};
use taskdeck_proto::task::{NewTask, OrderUpdate, OwnerId, Partition, Task, TaskId, TaskPatch};
use taskdeck_proto::validation::ValidationError;
use taskdeck_store::{MemoryBackend, Operation};

// ---------------------------------------------------------------------------
// Helper functions
// ---------------------------------------------------------------------------

fn alice() -> OwnerId {
    OwnerId::new("alice")
}

struct Harness {
    backend: Arc<MemoryBackend>,
    sync: Arc<TaskSync<MemoryBackend>>,
    history: Arc<HistoryLog<MemoryBackend>>,
    gateway: MutationGateway<MemoryBackend, MemoryBackend>,
}

/// Signed-in harness for alice with the given limits.
fn harness_with(limits: RateLimits) -> Harness {
    harness_paged(limits, 20)
}

fn harness_paged(limits: RateLimits, page_size: usize) -> Harness {
    let backend = Arc::new(MemoryBackend::new());
    let limiter = Arc::new(RateLimiter::new(limits));
    let sync = TaskSync::new(Arc::clone(&backend), page_size);
    let history = Arc::new(HistoryLog::new(
        Arc::clone(&backend),
        Arc::clone(&limiter),
        HistoryConfig::default(),
    ));
    sync.switch_owner(Some(alice())).unwrap();
    history.set_owner(Some(alice()));
    let gateway = MutationGateway::new(Arc::clone(&sync), Arc::clone(&history), limiter);
    Harness {
        backend,
        sync,
        history,
        gateway,
    }
}

fn harness() -> Harness {
    harness_with(RateLimits::default())
}

fn seed_like(id: &str) -> Task {
    Task {
        id: TaskId::new(id),
        owner: alice(),
        text: format!("seeded {id}"),
        completed: false,
        order: 0.0,
        created_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        due_date: None,
    }
}

/// Seeds a task directly in the backend.
fn seed(backend: &MemoryBackend, id: &str, order: f64, completed: bool) -> Task {
    let task = Task {
        order,
        completed,
        ..seed_like(id)
    };
    backend.seed_task(task.clone());
    task
}

/// Loads the first page of both partitions.
async fn load(h: &Harness) {
    for partition in Partition::ALL {
        h.sync.load_page(partition).await.unwrap();
    }
}

fn ids(tasks: &[Task]) -> Vec<&str> {
    tasks.iter().map(|t| t.id.as_str()).collect()
}

async fn history_actions(h: &Harness) -> Vec<HistoryAction> {
    let mut entries = h.history.recent().await.unwrap();
    entries.reverse();
    entries.into_iter().map(|e| e.action).collect()
}

fn record_events(sync: &TaskSync<MemoryBackend>) -> Arc<Mutex<Vec<CacheEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    // Kept registered for the rest of the test.
    let _subscription = sync.subscribe(move |event| sink.lock().push(event.clone()));
    events
}

// ===========================================================================
// Create
// ===========================================================================

#[tokio::test]
async fn buy_milk_end_to_end() {
    let h = harness();
    load(&h).await;

    let created = h.gateway.create("Buy milk", None).await.unwrap();
    let pending = h.sync.pending();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].text, "Buy milk");
    assert!(!pending[0].completed);
    assert_eq!(pending[0].order, 0.0);

    h.gateway
        .update(&created.id, TaskPatch::completed(true))
        .await
        .unwrap();
    assert!(h.sync.pending().is_empty());
    let completed = h.sync.completed();
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].id, created.id);

    h.gateway.delete(&created.id).await.unwrap();
    assert!(h.sync.all().is_empty());
    assert!(h.backend.task(&created.id).is_none());

    assert_eq!(
        history_actions(&h).await,
        vec![
            HistoryAction::Created,
            HistoryAction::Completed,
            HistoryAction::Deleted
        ]
    );
}

#[tokio::test]
async fn text_length_boundaries() {
    let h = harness();

    let err = h.gateway.create("ab", None).await.unwrap_err();
    assert_eq!(
        err,
        TaskError::Validation(ValidationError::TextTooShort { min: 3 })
    );
    assert!(h.gateway.create("abc", None).await.is_ok());

    let err = h.gateway.create("   ab   ", None).await.unwrap_err();
    assert!(matches!(err, TaskError::Validation(_)));

    let long = "x".repeat(501);
    let err = h.gateway.create(&long, None).await.unwrap_err();
    assert_eq!(
        err,
        TaskError::Validation(ValidationError::TextTooLong { max: 500 })
    );
    assert!(h.gateway.create(&"x".repeat(500), None).await.is_ok());
}

#[tokio::test]
async fn text_is_trimmed() {
    let h = harness();
    let task = h.gateway.create("   Water plants  ", None).await.unwrap();
    assert_eq!(task.text, "Water plants");
}

#[tokio::test]
async fn due_date_more_than_a_year_ahead_is_rejected() {
    let h = harness();
    let too_far = Utc::now()
        .checked_add_months(Months::new(12))
        .and_then(|d| d.checked_add_days(Days::new(1)))
        .unwrap();

    let err = h.gateway.create("Renew passport", Some(too_far)).await.unwrap_err();
    assert_eq!(err, TaskError::Validation(ValidationError::DueDateTooFar));
    assert_eq!(h.backend.write_count(), 0);

    let fine = Utc::now() + chrono::Duration::days(30);
    assert!(h.gateway.create("Renew passport", Some(fine)).await.is_ok());
}

#[tokio::test]
async fn past_due_date_rejected_on_create_but_allowed_on_edit() {
    let h = harness();
    let yesterday = Utc::now() - chrono::Duration::days(1);

    let err = h.gateway.create("File taxes", Some(yesterday)).await.unwrap_err();
    assert_eq!(err, TaskError::Validation(ValidationError::DueDateInPast));

    let task = h.gateway.create("File taxes", None).await.unwrap();
    let updated = h
        .gateway
        .update(&task.id, TaskPatch::due_date(Some(yesterday)))
        .await
        .unwrap();
    assert_eq!(updated.due_date, Some(yesterday));
}

#[tokio::test]
async fn create_goes_to_the_front_of_pending() {
    let h = harness();
    seed(&h.backend, "a", 0.0, false);
    seed(&h.backend, "b", 1.0, false);

    // No explicit load: create fetches the first page itself.
    let created = h.gateway.create("New first", None).await.unwrap();
    assert_eq!(created.order, -1.0);
    assert_eq!(ids(&h.sync.pending())[0], created.id.as_str());
    assert_eq!(h.sync.pending().len(), 3);
}

#[tokio::test]
async fn create_is_not_duplicated_by_the_live_stream() {
    let h = harness();
    load(&h).await;
    let created = h.gateway.create("Only once", None).await.unwrap();

    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    let pending = h.sync.pending();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, created.id);
}

#[tokio::test]
async fn failed_insert_leaves_cache_untouched() {
    let h = harness();
    load(&h).await;
    h.backend
        .fail_next(Operation::Insert, SourceError::PermissionDenied("rules".into()));

    let err = h.gateway.create("Denied", None).await.unwrap_err();
    assert!(matches!(err, TaskError::Remote(SourceError::PermissionDenied(_))));
    assert!(h.sync.pending().is_empty());
    assert_eq!(h.backend.history_len(&alice()), 0);
}

#[tokio::test]
async fn signed_out_writes_fail() {
    let h = harness();
    h.sync.switch_owner(None).unwrap();
    assert_eq!(
        h.gateway.create("Nobody home", None).await.unwrap_err(),
        TaskError::SignedOut
    );
}

// ===========================================================================
// Rate limiting
// ===========================================================================

#[tokio::test]
async fn exceeding_create_limit_writes_nothing() {
    let limits = RateLimits {
        create: RateLimit::new(2, Duration::from_secs(60), "too many creates"),
        ..RateLimits::default()
    };
    let h = harness_with(limits);
    load(&h).await;

    h.gateway.create("First task", None).await.unwrap();
    h.gateway.create("Second task", None).await.unwrap();
    let writes = h.backend.write_count();

    let err = h.gateway.create("Third task", None).await.unwrap_err();
    assert_eq!(
        err,
        TaskError::RateLimited {
            operation: OperationKind::CreateTask,
            message: "too many creates".to_string(),
        }
    );
    assert_eq!(err.to_string(), "too many creates");
    assert_eq!(h.backend.write_count(), writes);
    assert_eq!(h.backend.tasks_of(&alice(), Partition::Pending).len(), 2);
    assert_eq!(h.sync.pending().len(), 2);
}

#[tokio::test]
async fn exceeding_delete_limit_keeps_the_task() {
    let limits = RateLimits {
        delete: RateLimit::new(1, Duration::from_secs(60), "too many deletes"),
        ..RateLimits::default()
    };
    let h = harness_with(limits);
    seed(&h.backend, "a", 0.0, false);
    seed(&h.backend, "b", 1.0, false);
    load(&h).await;

    h.gateway.delete(&TaskId::new("a")).await.unwrap();
    let err = h.gateway.delete(&TaskId::new("b")).await.unwrap_err();
    assert!(matches!(err, TaskError::RateLimited { .. }));
    assert!(h.sync.get(&TaskId::new("b")).is_some());
    assert!(h.backend.task(&TaskId::new("b")).is_some());
}

// ===========================================================================
// Update
// ===========================================================================

#[tokio::test]
async fn toggle_moves_task_to_front_of_other_partition() {
    let h = harness();
    seed(&h.backend, "a", 0.0, false);
    seed(&h.backend, "b", 1.0, false);
    seed(&h.backend, "c", 0.0, true);
    seed(&h.backend, "d", 1.0, true);
    load(&h).await;

    let moved = h
        .gateway
        .update(&TaskId::new("b"), TaskPatch::completed(true))
        .await
        .unwrap();
    assert_eq!(moved.order, -1.0);
    assert_eq!(ids(&h.sync.completed()), ["b", "c", "d"]);
    assert_eq!(ids(&h.sync.pending()), ["a"]);

    let back = h
        .gateway
        .update(&TaskId::new("c"), TaskPatch::completed(false))
        .await
        .unwrap();
    assert_eq!(back.order, -1.0);
    assert_eq!(ids(&h.sync.pending()), ["c", "a"]);

    assert_eq!(
        history_actions(&h).await,
        vec![HistoryAction::Completed, HistoryAction::MarkedIncomplete]
    );
}

#[tokio::test]
async fn toggle_into_unloaded_partition_goes_to_its_front() {
    let h = harness();
    seed(&h.backend, "a", 0.0, false);
    seed(&h.backend, "c", 0.0, true);
    seed(&h.backend, "d", 1.0, true);
    h.sync.load_page(Partition::Pending).await.unwrap();
    assert!(h.sync.completed().is_empty());

    let moved = h
        .gateway
        .update(&TaskId::new("a"), TaskPatch::completed(true))
        .await
        .unwrap();
    assert_eq!(moved.order, -1.0);
    assert_eq!(ids(&h.sync.completed()), ["a", "c", "d"]);
    let orders: Vec<f64> = h
        .backend
        .tasks_of(&alice(), Partition::Completed)
        .iter()
        .map(|t| t.order)
        .collect();
    assert_eq!(orders, [-1.0, 0.0, 1.0]);
}

#[tokio::test]
async fn edit_records_old_and_new_text() {
    let h = harness();
    seed(&h.backend, "a", 0.0, false);
    load(&h).await;

    h.gateway
        .update(&TaskId::new("a"), TaskPatch::text("  Buy oat milk "))
        .await
        .unwrap();
    assert_eq!(h.sync.get(&TaskId::new("a")).unwrap().text, "Buy oat milk");
    assert_eq!(
        h.backend.task(&TaskId::new("a")).unwrap().text,
        "Buy oat milk"
    );

    let entries = h.history.recent().await.unwrap();
    assert_eq!(entries[0].action, HistoryAction::Edited);
    assert_eq!(
        entries[0].task_text,
        "Changed from \"seeded a\" to \"Buy oat milk\""
    );
}

#[tokio::test]
async fn invalid_edit_is_rejected_without_writing() {
    let h = harness();
    seed(&h.backend, "a", 0.0, false);
    load(&h).await;
    let before = h.backend.write_count();

    let err = h
        .gateway
        .update(&TaskId::new("a"), TaskPatch::text("no"))
        .await
        .unwrap_err();
    assert!(matches!(err, TaskError::Validation(_)));
    assert_eq!(h.backend.write_count(), before);
    assert_eq!(h.sync.get(&TaskId::new("a")).unwrap().text, "seeded a");
}

#[tokio::test]
async fn failed_update_rolls_back() {
    let h = harness();
    seed(&h.backend, "a", 0.0, false);
    load(&h).await;
    let before = h.sync.all();
    let events = record_events(&h.sync);

    h.backend
        .fail_next(Operation::Update, SourceError::Unavailable("offline".into()));
    let err = h
        .gateway
        .update(&TaskId::new("a"), TaskPatch::completed(true))
        .await
        .unwrap_err();

    assert!(matches!(err, TaskError::Remote(_)));
    assert_eq!(h.sync.all(), before);
    assert!(events.lock().contains(&CacheEvent::RolledBack {
        mutation: MutationKind::Update
    }));
    assert_eq!(h.backend.history_len(&alice()), 0);
}

#[tokio::test]
async fn update_of_unknown_task_is_not_found() {
    let h = harness();
    let err = h
        .gateway
        .update(&TaskId::new("ghost"), TaskPatch::completed(true))
        .await
        .unwrap_err();
    assert_eq!(err, TaskError::NotFound(TaskId::new("ghost")));
}

// ===========================================================================
// Delete
// ===========================================================================

#[tokio::test]
async fn failed_delete_restores_exact_state() {
    let h = harness();
    seed(&h.backend, "a", 0.0, false);
    seed(&h.backend, "b", 1.0, false);
    seed(&h.backend, "c", 2.0, false);
    load(&h).await;
    let before = h.sync.all();
    let events = record_events(&h.sync);

    h.backend
        .fail_next(Operation::Delete, SourceError::Unavailable("offline".into()));
    let err = h.gateway.delete(&TaskId::new("b")).await.unwrap_err();

    assert!(matches!(err, TaskError::Remote(SourceError::Unavailable(_))));
    assert_eq!(h.sync.all(), before);
    let events = events.lock();
    assert!(events.contains(&CacheEvent::Mutated {
        mutation: MutationKind::Delete,
        id: Some(TaskId::new("b")),
    }));
    assert!(events.contains(&CacheEvent::RolledBack {
        mutation: MutationKind::Delete
    }));
}

#[tokio::test]
async fn restored_task_can_be_deleted_again() {
    let h = harness();
    seed(&h.backend, "a", 0.0, false);
    load(&h).await;

    h.backend
        .fail_next(Operation::Delete, SourceError::Unavailable("offline".into()));
    assert!(h.gateway.delete(&TaskId::new("a")).await.is_err());
    h.gateway.delete(&TaskId::new("a")).await.unwrap();
    assert!(h.sync.all().is_empty());

    // A late `Added` delta must not bring it back.
    h.sync.apply_remote_delta(&taskdeck_proto::source::TaskChange {
        kind: taskdeck_proto::source::ChangeKind::Added,
        task: seed_like("a"),
    });
    assert!(h.sync.all().is_empty());
}

#[tokio::test]
async fn history_failure_does_not_fail_the_delete() {
    let h = harness();
    seed(&h.backend, "a", 0.0, false);
    load(&h).await;

    h.backend
        .fail_next(Operation::Append, SourceError::Unavailable("history down".into()));
    let removed = h.gateway.delete(&TaskId::new("a")).await.unwrap();
    assert_eq!(removed.id, TaskId::new("a"));
    assert!(h.backend.task(&TaskId::new("a")).is_none());
    assert_eq!(h.backend.history_len(&alice()), 0);
}

// ===========================================================================
// Reorder
// ===========================================================================

#[tokio::test]
async fn reorder_assigns_indexes_and_is_idempotent() {
    let h = harness();
    seed(&h.backend, "a", 0.0, false);
    seed(&h.backend, "b", 1.0, false);
    seed(&h.backend, "c", 2.0, false);
    load(&h).await;

    let order = [TaskId::new("c"), TaskId::new("a"), TaskId::new("b")];
    let written = h.gateway.reorder(Partition::Pending, &order).await.unwrap();
    assert_eq!(written, 3);
    assert_eq!(ids(&h.sync.pending()), ["c", "a", "b"]);
    let orders: Vec<f64> = h.sync.pending().iter().map(|t| t.order).collect();
    assert_eq!(orders, [0.0, 1.0, 2.0]);
    assert_eq!(
        ids(&h.backend.tasks_of(&alice(), Partition::Pending)),
        ["c", "a", "b"]
    );

    let writes = h.backend.write_count();
    let again = h.gateway.reorder(Partition::Pending, &order).await.unwrap();
    assert_eq!(again, 0);
    assert_eq!(h.backend.write_count(), writes);
}

#[tokio::test]
async fn reorder_only_writes_changed_tasks() {
    let h = harness();
    seed(&h.backend, "a", 0.0, false);
    seed(&h.backend, "b", 1.0, false);
    seed(&h.backend, "c", 2.0, false);
    load(&h).await;

    let written = h
        .gateway
        .reorder(
            Partition::Pending,
            &[TaskId::new("a"), TaskId::new("c"), TaskId::new("b")],
        )
        .await
        .unwrap();
    assert_eq!(written, 2);
}

#[tokio::test]
async fn reorder_must_cover_the_partition_exactly() {
    let h = harness();
    seed(&h.backend, "a", 0.0, false);
    seed(&h.backend, "b", 1.0, false);
    seed(&h.backend, "done", 0.0, true);
    load(&h).await;
    let mismatch = TaskError::Validation(ValidationError::ReorderMismatch {
        partition: Partition::Pending,
    });

    let missing = h
        .gateway
        .reorder(Partition::Pending, &[TaskId::new("a")])
        .await
        .unwrap_err();
    assert_eq!(missing, mismatch);

    let duplicated = h
        .gateway
        .reorder(Partition::Pending, &[TaskId::new("a"), TaskId::new("a")])
        .await
        .unwrap_err();
    assert_eq!(duplicated, mismatch);

    let foreign = h
        .gateway
        .reorder(
            Partition::Pending,
            &[TaskId::new("a"), TaskId::new("b"), TaskId::new("done")],
        )
        .await
        .unwrap_err();
    assert_eq!(foreign, mismatch);

    let unknown = h
        .gateway
        .reorder(Partition::Pending, &[TaskId::new("a"), TaskId::new("zzz")])
        .await
        .unwrap_err();
    assert_eq!(unknown, TaskError::NotFound(TaskId::new("zzz")));
}

#[tokio::test]
async fn reorder_loads_remaining_pages_first() {
    let h = harness_paged(RateLimits::default(), 2);
    for i in 0..4 {
        seed(&h.backend, &format!("s{i}"), f64::from(i), false);
    }
    h.sync.load_page(Partition::Pending).await.unwrap();
    let created = h.gateway.create("new task", None).await.unwrap();
    assert_eq!(created.order, -1.0);
    assert!(h.sync.has_more(Partition::Pending));

    let loaded_only = [TaskId::new("s1"), TaskId::new("s0"), created.id.clone()];
    let err = h
        .gateway
        .reorder(Partition::Pending, &loaded_only)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        TaskError::Validation(ValidationError::ReorderMismatch {
            partition: Partition::Pending,
        })
    );
    assert!(!h.sync.has_more(Partition::Pending));

    let reversed: Vec<TaskId> = h.sync.pending().into_iter().rev().map(|t| t.id).collect();
    assert_eq!(reversed.len(), 5);
    h.gateway
        .reorder(Partition::Pending, &reversed)
        .await
        .unwrap();

    let remote = h.backend.tasks_of(&alice(), Partition::Pending);
    let orders: Vec<f64> = remote.iter().map(|t| t.order).collect();
    assert_eq!(orders, [0.0, 1.0, 2.0, 3.0, 4.0]);
    assert_eq!(ids(&remote), ["s3", "s2", "s1", "s0", created.id.as_str()]);
}

#[tokio::test]
async fn failed_reorder_restores_previous_orders() {
    let h = harness();
    seed(&h.backend, "a", 0.0, false);
    seed(&h.backend, "b", 1.0, false);
    load(&h).await;
    let before = h.sync.all();

    h.backend
        .fail_next(Operation::UpdateOrders, SourceError::Rejected("conflict".into()));
    let err = h
        .gateway
        .reorder(Partition::Pending, &[TaskId::new("b"), TaskId::new("a")])
        .await
        .unwrap_err();

    assert!(matches!(err, TaskError::Remote(SourceError::Rejected(_))));
    assert_eq!(h.sync.all(), before);
    assert_eq!(
        ids(&h.backend.tasks_of(&alice(), Partition::Pending)),
        ["a", "b"]
    );
}

// ===========================================================================
// Bulk operations
// ===========================================================================

#[tokio::test]
async fn clear_pending_removes_only_pending() {
    let limits = RateLimits {
        delete: RateLimit::new(1, Duration::from_secs(60), "too many deletes"),
        ..RateLimits::default()
    };
    let h = harness_with(limits);
    seed(&h.backend, "a", 0.0, false);
    seed(&h.backend, "b", 1.0, false);
    seed(&h.backend, "done", 0.0, true);
    load(&h).await;

    let cleared = h.gateway.clear_pending().await.unwrap();
    assert_eq!(cleared, 2);
    assert!(h.sync.pending().is_empty());
    assert_eq!(ids(&h.sync.completed()), ["done"]);
    assert!(h.backend.tasks_of(&alice(), Partition::Pending).is_empty());

    let entries = h.history.recent().await.unwrap();
    assert_eq!(entries[0].action, HistoryAction::ClearedPending);
    assert_eq!(entries[0].task_text, "2 pending tasks");
}

#[tokio::test]
async fn clear_pending_on_empty_list_is_a_no_op() {
    let h = harness();
    load(&h).await;
    assert_eq!(h.gateway.clear_pending().await.unwrap(), 0);
    assert_eq!(h.backend.history_len(&alice()), 0);
}

#[tokio::test]
async fn purge_removes_unloaded_tasks_and_history() {
    let h = harness_paged(RateLimits::default(), 2);
    for i in 0..5 {
        seed(&h.backend, &format!("p{i}"), f64::from(i), false);
    }
    seed(&h.backend, "done", 0.0, true);
    h.sync.load_page(Partition::Pending).await.unwrap();
    h.history
        .log_action(HistoryAction::Created, "something")
        .await
        .unwrap();

    let report = h.gateway.purge().await.unwrap();
    assert_eq!(report.tasks, 6);
    assert_eq!(report.history, 1);
    assert!(h.backend.tasks_of(&alice(), Partition::Pending).is_empty());
    assert!(h.backend.tasks_of(&alice(), Partition::Completed).is_empty());
    assert_eq!(h.backend.history_len(&alice()), 0);
    assert!(h.sync.all().is_empty());
}

// ===========================================================================
// Order allocation under overlapping writes
// ===========================================================================

/// Backend whose inserts take a while to land.
struct SlowInserts(Arc<MemoryBackend>);

impl TaskSource for SlowInserts {
    async fn fetch_page(&self, request: PageRequest) -> Result<Page, SourceError> {
        self.0.fetch_page(request).await
    }

    fn subscribe(&self, owner: &OwnerId) -> Result<ChangeStream, SourceError> {
        self.0.subscribe(owner)
    }

    async fn insert(&self, task: NewTask) -> Result<Task, SourceError> {
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.0.insert(task).await
    }

    async fn update(&self, id: &TaskId, patch: TaskPatch) -> Result<(), SourceError> {
        self.0.update(id, patch).await
    }

    async fn update_orders(&self, updates: Vec<OrderUpdate>) -> Result<(), SourceError> {
        self.0.update_orders(updates).await
    }

    async fn delete(&self, id: &TaskId) -> Result<(), SourceError> {
        self.0.delete(id).await
    }

    async fn count(&self, owner: &OwnerId, partition: Partition) -> Result<usize, SourceError> {
        self.0.count(owner, partition).await
    }
}

#[tokio::test]
async fn overlapping_creates_get_distinct_front_orders() {
    let backend = Arc::new(MemoryBackend::new());
    let limiter = Arc::new(RateLimiter::default());
    let sync = TaskSync::new(Arc::new(SlowInserts(Arc::clone(&backend))), 20);
    let history = Arc::new(HistoryLog::new(
        Arc::clone(&backend),
        Arc::clone(&limiter),
        HistoryConfig::default(),
    ));
    sync.switch_owner(Some(alice())).unwrap();
    history.set_owner(Some(alice()));
    let gateway = MutationGateway::new(Arc::clone(&sync), history, limiter);
    sync.load_page(Partition::Pending).await.unwrap();

    let (first, second) = tokio::join!(
        gateway.create("first task", None),
        gateway.create("second task", None)
    );
    let (first, second) = (first.unwrap(), second.unwrap());
    assert_eq!(first.order, -1.0);
    assert_eq!(second.order, -2.0);

    let orders: Vec<f64> = backend
        .tasks_of(&alice(), Partition::Pending)
        .iter()
        .map(|t| t.order)
        .collect();
    assert_eq!(orders, [-2.0, -1.0]);
    let texts: Vec<String> = sync.pending().into_iter().map(|t| t.text).collect();
    assert_eq!(texts, ["second task", "first task"]);
}
