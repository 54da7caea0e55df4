//! Due-date reminders for pending tasks.
//!
//! [`ReminderMonitor`] looks at the loaded pending tasks, picks out the
//! overdue ones and those due soon, and produces at most one
//! [`ReminderDigest`] per quiet period.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::seq::IndexedRandom;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use taskdeck_proto::source::TaskSource;
use taskdeck_proto::task::{Partition, Task};

use crate::tasks::{TaskError, TaskSync};

/// Shortest period between scheduled checks.
pub const MIN_CHECK_INTERVAL: Duration = Duration::from_secs(1);

const OVERDUE_SINGLE: &[&str] = &[
    "\"{task}\" is overdue.",
    "\"{task}\" slipped past its due date.",
    "Time to catch up on \"{task}\".",
];

const OVERDUE_MANY: &[&str] = &[
    "{count} tasks are overdue.",
    "You have {count} overdue tasks waiting.",
    "{count} tasks are past their due date.",
];

const DUE_SOON_SINGLE: &[&str] = &[
    "\"{task}\" is due soon.",
    "Heads up: \"{task}\" is due within a day.",
];

const DUE_SOON_MANY: &[&str] = &[
    "{count} tasks are due soon.",
    "{count} tasks are due within a day.",
];

const PENDING_FEW: &[&str] = &[
    "{count} pending tasks left.",
    "Only {count} pending tasks to go.",
];

const PENDING_SOME: &[&str] = &[
    "{count} pending tasks on the list.",
    "A steady {count} pending tasks.",
];

const PENDING_MANY: &[&str] = &[
    "{count} pending tasks and counting.",
    "The list has grown to {count} pending tasks.",
];

/// Reminder thresholds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderConfig {
    /// Tasks due within this window count as due soon.
    pub due_soon: chrono::Duration,
    /// Minimum time between two digests.
    pub quiet_period: Duration,
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            due_soon: chrono::Duration::hours(24),
            quiet_period: Duration::from_secs(30 * 60),
        }
    }
}

/// Pending tasks with a due date worth mentioning.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DueSummary {
    pub overdue: Vec<Task>,
    pub due_soon: Vec<Task>,
}

impl DueSummary {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.overdue.is_empty() && self.due_soon.is_empty()
    }
}

/// Splits pending tasks into overdue and due within `due_soon` of `now`.
///
/// Completed tasks and tasks without a due date are ignored.
#[must_use]
pub fn classify(tasks: &[Task], now: DateTime<Utc>, due_soon: chrono::Duration) -> DueSummary {
    let horizon = now + due_soon;
    let mut summary = DueSummary::default();
    for task in tasks.iter().filter(|t| !t.completed) {
        match task.due_date {
            Some(due) if due < now => summary.overdue.push(task.clone()),
            Some(due) if due <= horizon => summary.due_soon.push(task.clone()),
            _ => {}
        }
    }
    summary
}

/// How urgent a digest is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Urgent,
}

/// One reminder ready to show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderDigest {
    pub severity: Severity,
    /// Overdue or due-soon message.
    pub headline: String,
    /// Total pending tasks reported by the remote source.
    pub total_pending: usize,
    /// Message about the pending total.
    pub total_message: String,
}

fn pick(templates: &[&str]) -> String {
    templates
        .choose(&mut rand::rng())
        .copied()
        .unwrap_or_default()
        .to_string()
}

fn render(template: &str, task: Option<&Task>, count: usize) -> String {
    let text = task.map_or("", |t| t.text.as_str());
    template
        .replace("{task}", text)
        .replace("{count}", &count.to_string())
}

fn headline(summary: &DueSummary) -> Option<(Severity, String)> {
    match (summary.overdue.as_slice(), summary.due_soon.as_slice()) {
        ([only], _) => Some((Severity::Urgent, render(&pick(OVERDUE_SINGLE), Some(only), 1))),
        (overdue, _) if !overdue.is_empty() => Some((
            Severity::Urgent,
            render(&pick(OVERDUE_MANY), None, overdue.len()),
        )),
        (_, [only]) => Some((Severity::Warning, render(&pick(DUE_SOON_SINGLE), Some(only), 1))),
        (_, soon) if !soon.is_empty() => Some((
            Severity::Warning,
            render(&pick(DUE_SOON_MANY), None, soon.len()),
        )),
        _ => None,
    }
}

fn total_message(total: usize) -> String {
    let templates = match total {
        0..=3 => PENDING_FEW,
        4..=7 => PENDING_SOME,
        _ => PENDING_MANY,
    };
    render(&pick(templates), None, total)
}

/// Throttled reminder producer.
pub struct ReminderMonitor {
    config: ReminderConfig,
    last_digest: Mutex<Option<Instant>>,
}

impl ReminderMonitor {
    #[must_use]
    pub const fn new(config: ReminderConfig) -> Self {
        Self {
            config,
            last_digest: Mutex::new(None),
        }
    }

    /// Returns `true` and starts a new quiet period if none is running.
    fn claim_slot(&self, now: Instant) -> bool {
        let mut last = self.last_digest.lock();
        if last.is_some_and(|at| now.saturating_duration_since(at) < self.config.quiet_period) {
            return false;
        }
        *last = Some(now);
        true
    }

    /// Builds a digest for the loaded pending tasks of `sync`, unless
    /// there is nothing due or a digest went out within the quiet period.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Remote`] if the pending count query fails.
    pub async fn check<S: TaskSource + 'static>(
        &self,
        sync: &TaskSync<S>,
    ) -> Result<Option<ReminderDigest>, TaskError> {
        self.check_at(sync, Utc::now(), Instant::now()).await
    }

    /// Same as [`check`](Self::check) with explicit clock readings.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Remote`] if the pending count query fails.
    pub async fn check_at<S: TaskSource + 'static>(
        &self,
        sync: &TaskSync<S>,
        now: DateTime<Utc>,
        instant: Instant,
    ) -> Result<Option<ReminderDigest>, TaskError> {
        let Some(owner) = sync.owner() else {
            return Ok(None);
        };
        let summary = classify(&sync.pending(), now, self.config.due_soon);
        let Some((severity, headline)) = headline(&summary) else {
            return Ok(None);
        };
        if !self.claim_slot(instant) {
            tracing::trace!(%owner, "reminder suppressed during quiet period");
            return Ok(None);
        }

        let total_pending = sync.source().count(&owner, Partition::Pending).await?;
        tracing::debug!(
            %owner,
            overdue = summary.overdue.len(),
            due_soon = summary.due_soon.len(),
            total_pending,
            "reminder digest ready"
        );
        Ok(Some(ReminderDigest {
            severity,
            headline,
            total_pending,
            total_message: total_message(total_pending),
        }))
    }

    /// Checks every `interval` and sends digests on the returned channel.
    ///
    /// `interval` is raised to [`MIN_CHECK_INTERVAL`] if shorter.
    /// The task stops when the receiver is dropped.
    pub fn spawn<S: TaskSource + 'static>(
        self: &Arc<Self>,
        sync: Arc<TaskSync<S>>,
        interval: Duration,
    ) -> (JoinHandle<()>, mpsc::Receiver<ReminderDigest>) {
        let (tx, rx) = mpsc::channel(8);
        let monitor = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval.max(MIN_CHECK_INTERVAL));
            loop {
                tick.tick().await;
                match monitor.check(&sync).await {
                    Ok(Some(digest)) => {
                        if tx.send(digest).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(err) => tracing::warn!(error = %err, "reminder check failed"),
                }
            }
        });
        (handle, rx)
    }
}
