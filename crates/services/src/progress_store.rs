use std::sync::Arc;

use storage::repository::{LedgerStore, Namespace, StorageError, load_record, save_record};
use tracing::{debug, info};
use tutor_core::model::{InteractionEvent, LearnerId, LessonId, LessonProgress, ProgressLedger};

use crate::Clock;

/// Applies interaction events to a learner's progress and persists the
/// whole `progress` record after each one.
#[derive(Clone)]
pub struct ProgressStore {
    clock: Clock,
    records: Arc<dyn LedgerStore>,
}

impl ProgressStore {
    #[must_use]
    pub fn new(clock: Clock, records: Arc<dyn LedgerStore>) -> Self {
        Self { clock, records }
    }

    /// Load the learner's stored progress.
    ///
    /// Returns `Ok(None)` for a learner with no record yet.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the record cannot be read or decoded.
    pub async fn load(&self, learner: &LearnerId) -> Result<Option<ProgressLedger>, StorageError> {
        let ledger: Option<ProgressLedger> =
            load_record(self.records.as_ref(), learner, Namespace::Progress).await?;
        Ok(ledger.map(ProgressLedger::normalized))
    }

    /// Apply `event` to the lesson and persist the full ledger.
    ///
    /// The in-memory update is applied before the write, so it survives a
    /// storage failure.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the ledger cannot be persisted.
    pub async fn record(
        &self,
        learner: &LearnerId,
        ledger: &mut ProgressLedger,
        lesson: LessonId,
        event: &InteractionEvent,
    ) -> Result<LessonProgress, StorageError> {
        let was_completed = ledger.lesson(lesson).completed();
        let updated = ledger.record(lesson, event, self.clock.now()).clone();
        if updated.completed() && !was_completed {
            info!(learner = %learner, lesson = %lesson, "lesson completed");
        } else {
            debug!(
                learner = %learner,
                lesson = %lesson,
                percentage = updated.progress_percentage(),
                "progress updated"
            );
        }
        self.persist(learner, ledger).await?;
        Ok(updated)
    }

    /// Write the whole ledger.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the write fails.
    pub async fn persist(
        &self,
        learner: &LearnerId,
        ledger: &ProgressLedger,
    ) -> Result<(), StorageError> {
        save_record(self.records.as_ref(), learner, Namespace::Progress, ledger).await
    }
}
