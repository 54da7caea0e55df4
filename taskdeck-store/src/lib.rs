//! In-memory backend for `TaskDeck`.
//!
//! Implements the remote task, history and auth contracts from
//! `taskdeck-proto` entirely in process. Used by tests and the demo binary
//! in place of a hosted document database.

pub mod auth;
pub mod store;

pub use auth::MemoryAuth;
pub use store::{MemoryBackend, Operation};
