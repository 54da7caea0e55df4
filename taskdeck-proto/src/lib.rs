//! Shared task model and remote-backend contracts for `TaskDeck`.

pub mod history;
pub mod source;
pub mod task;
pub mod validation;
