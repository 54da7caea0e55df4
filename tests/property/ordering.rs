//! Property-based tests for task ordering and page cursors.
//!
//! Uses proptest to verify:
//! 1. `display_cmp` is a total order consistent with sorting.
//! 2. `front_order` always sorts strictly before every existing member.
//! 3. Walking a sorted list with `PageCursor` visits every task exactly once.

use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use taskdeck_proto::source::PageCursor;
use taskdeck_proto::task::{OwnerId, Task, TaskId, front_order};

/// Strategy for tasks with small, collision-prone orders and timestamps.
fn arb_task() -> impl Strategy<Value = Task> {
    ("[a-z]{1,6}", -20i32..20, 0i64..50, any::<bool>()).prop_map(|(id, order, secs, completed)| {
        Task {
            id: TaskId::new(id),
            owner: OwnerId::new("alice"),
            text: "generated task".to_string(),
            completed,
            order: f64::from(order),
            created_at: Utc.timestamp_opt(secs, 0).unwrap(),
            due_date: None,
        }
    })
}

/// Tasks with unique ids.
fn arb_task_set() -> impl Strategy<Value = Vec<Task>> {
    prop::collection::vec(arb_task(), 0..40).prop_map(|mut tasks| {
        tasks.sort_by(|a, b| a.id.cmp(&b.id));
        tasks.dedup_by(|a, b| a.id == b.id);
        tasks
    })
}

proptest! {
    #[test]
    fn sorting_is_deterministic(mut tasks in arb_task_set()) {
        let mut reversed: Vec<Task> = tasks.iter().rev().cloned().collect();
        tasks.sort_by(Task::display_cmp);
        reversed.sort_by(Task::display_cmp);
        prop_assert_eq!(tasks, reversed);
    }

    #[test]
    fn front_order_sorts_before_all_members(tasks in arb_task_set()) {
        let front = front_order(&tasks);
        for task in &tasks {
            prop_assert!(front < task.order);
        }
    }

    #[test]
    fn cursor_walk_visits_each_task_once(mut tasks in arb_task_set(), limit in 1usize..7) {
        tasks.sort_by(Task::display_cmp);

        let mut visited: Vec<Task> = Vec::new();
        let mut cursor: Option<PageCursor> = None;
        loop {
            let page: Vec<Task> = tasks
                .iter()
                .filter(|t| cursor.as_ref().is_none_or(|c| c.admits(t)))
                .take(limit)
                .cloned()
                .collect();
            let full = page.len() == limit;
            if let Some(last) = page.last() {
                cursor = Some(PageCursor::after(last));
            }
            visited.extend(page);
            if !full {
                break;
            }
        }

        prop_assert_eq!(visited, tasks);
    }
}
