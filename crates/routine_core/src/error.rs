//! Error types for routine_core

use thiserror::Error;

/// Failures surfaced by stores and the routine service.
///
/// Malformed recurrence data never shows up here; the engine normalizes it.
#[derive(Error, Debug)]
pub enum Error {
    #[error("item not found: {0}")]
    NotFound(String),

    #[error("item {id} does not belong to owner {owner_id}")]
    OwnerMismatch { id: String, owner_id: String },

    #[error("item {0} is not recurring")]
    NotRecurring(String),

    #[error("item already exists: {0}")]
    DuplicateId(String),

    /// The next occurrence fell outside the representable calendar range.
    #[error("unable to schedule item {0}")]
    Schedule(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("watch error: {0}")]
    Watch(#[from] notify::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
