//! `TaskDeck` demo: a scripted session against the in-memory backend.
//!
//! Signs in, creates the given tasks, completes the first `--complete` of
//! them and prints both partitions, the history and any reminder.
//!
//! ```bash
//! cargo run --bin taskdeck -- --owner alice "Buy milk" "Walk the dog"
//! cargo run --bin taskdeck -- --owner alice --complete 1 --json "Buy milk" "Pay rent"
//! cargo run --bin taskdeck -- --owner alice --search milk "Buy milk" "Pay rent"
//! ```

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;

use taskdeck::config::{CliArgs, ClientConfig, ConfigError};
use taskdeck::history::HistoryLog;
use taskdeck::rate_limit::RateLimiter;
use taskdeck::reminders::{ReminderDigest, ReminderMonitor};
use taskdeck::search::SearchFilter;
use taskdeck::session::SessionController;
use taskdeck::tasks::{MutationGateway, TaskError, TaskSync};
use taskdeck_proto::history::HistoryEntry;
use taskdeck_proto::task::{OwnerId, Partition, Task, TaskPatch};
use taskdeck_store::{MemoryAuth, MemoryBackend};

/// How long the demo waits for the first reminder digest.
const REMINDER_WAIT: Duration = Duration::from_millis(250);

#[derive(Debug, thiserror::Error)]
enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Task(#[from] TaskError),
    #[error("failed to encode output: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(serde::Serialize)]
struct Snapshot {
    owner: OwnerId,
    pending: Vec<Task>,
    completed: Vec<Task>,
    history: Vec<HistoryEntry>,
    reminder: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), RunError> {
    let cli = CliArgs::parse();
    let _log_guard = init_logging(&cli.log_level, cli.log_file.as_deref());
    let config = ClientConfig::load(&cli)?;
    tracing::info!(page_size = config.page_size, "taskdeck starting");

    let owner = OwnerId::new(config.owner.clone().unwrap_or_else(|| "demo".to_string()));
    let snapshot = run(&cli, &config, owner).await?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        print_snapshot(&snapshot);
    }
    Ok(())
}

async fn run(cli: &CliArgs, config: &ClientConfig, owner: OwnerId) -> Result<Snapshot, RunError> {
    let backend = Arc::new(MemoryBackend::new());
    let auth = MemoryAuth::new();
    let limiter = Arc::new(RateLimiter::new(config.limits.clone()));
    let sync = TaskSync::new(Arc::clone(&backend), config.page_size);
    let history = Arc::new(HistoryLog::new(
        Arc::clone(&backend),
        Arc::clone(&limiter),
        config.history.clone(),
    ));
    let session = SessionController::new(
        Arc::clone(&sync),
        Arc::clone(&history),
        Arc::clone(&limiter),
        config.history_cleanup_interval,
    );

    auth.sign_in(owner.clone());
    let follower = session.follow(&auth)?;
    for partition in Partition::ALL {
        sync.load_page(partition).await?;
    }

    let gateway = MutationGateway::new(Arc::clone(&sync), Arc::clone(&history), limiter);
    let mut created = Vec::with_capacity(cli.tasks.len());
    for text in &cli.tasks {
        match gateway.create(text, None).await {
            Ok(task) => created.push(task),
            Err(err) => eprintln!("skipped {text:?}: {err}"),
        }
    }
    for task in created.iter().take(cli.complete) {
        gateway.update(&task.id, TaskPatch::completed(true)).await?;
    }

    // The first check runs immediately; later ones follow the configured interval.
    let monitor = Arc::new(ReminderMonitor::new(config.reminders.clone()));
    let (reminders, mut digests) = monitor.spawn(Arc::clone(&sync), config.reminder_interval);
    let reminder = tokio::time::timeout(REMINDER_WAIT, digests.recv())
        .await
        .ok()
        .flatten()
        .map(|ReminderDigest { headline, total_message, .. }| format!("{headline} {total_message}"));
    reminders.abort();

    let filter = SearchFilter::new(cli.search.as_deref().unwrap_or_default());
    let visible = |tasks: Vec<Task>| -> Vec<Task> {
        tasks.into_iter().filter(|t| filter.matches(&t.text)).collect()
    };
    let snapshot = Snapshot {
        owner,
        pending: visible(sync.pending()),
        completed: visible(sync.completed()),
        history: history.recent().await?,
        reminder,
    };

    auth.sign_out();
    follower.abort();
    Ok(snapshot)
}

fn print_snapshot(snapshot: &Snapshot) {
    println!("Tasks for {}", snapshot.owner);
    println!("\nPending ({}):", snapshot.pending.len());
    for task in &snapshot.pending {
        print_task(task);
    }
    println!("\nCompleted ({}):", snapshot.completed.len());
    for task in &snapshot.completed {
        print_task(task);
    }
    println!("\nHistory:");
    for entry in &snapshot.history {
        println!(
            "  {}  {:<24} {}",
            entry.timestamp.format("%H:%M:%S"),
            entry.action,
            entry.task_text
        );
    }
    if let Some(reminder) = &snapshot.reminder {
        println!("\n{reminder}");
    }
}

fn print_task(task: &Task) {
    let mark = if task.completed { 'x' } else { ' ' };
    match task.due_date {
        Some(due) => println!("  [{mark}] {} (due {})", task.text, due.format("%Y-%m-%d")),
        None => println!("  [{mark}] {}", task.text),
    }
}

/// Initialize file-based logging.
///
/// Stdout carries the demo output, so logs go to a file. Returns a
/// [`WorkerGuard`] that must be held until shutdown to flush buffered
/// entries.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let default_path = std::env::temp_dir().join("taskdeck.log");
    let log_path = file_path.unwrap_or(&default_path);

    let log_dir = log_path.parent()?;
    let file_name = log_path.file_name()?.to_str()?;

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}
