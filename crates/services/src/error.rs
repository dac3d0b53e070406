//! Shared error types for the services crate.

use thiserror::Error;

use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;
use tutor_core::model::{LearnerId, LessonId};

/// Errors emitted by the `Ledger` facade.
///
/// Each one is also written to the learner's error slot. None of them
/// poison the ledger: other lessons and learners keep working.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum LedgerError {
    /// Persistence failed; the in-memory change was kept but is not durable.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(#[from] StorageError),
    #[error("unknown lesson: {0}")]
    InvalidLesson(LessonId),
    #[error("a message is already waiting for a reply in lesson {0}")]
    ConcurrentSendRejected(LessonId),
    #[error("lesson {0} cannot be cleared while a reply is pending")]
    ReplyPending(LessonId),
    #[error("learner {0} is not logged in")]
    NotLoggedIn(LearnerId),
    #[error("tutor reply task ended without a result")]
    ReplyLost,
}

/// Errors emitted while bootstrapping the ledger.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LedgerInitError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}
