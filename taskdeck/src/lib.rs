//! `TaskDeck`: client core for an owner-scoped, live-synced task list.

pub mod bus;
pub mod config;
pub mod history;
pub mod rate_limit;
pub mod reminders;
pub mod search;
pub mod session;
pub mod tasks;

pub use bus::{CacheEvent, MutationKind, ObserverBus, Subscription};
pub use tasks::TaskError;
