use std::sync::Arc;

use storage::repository::{LedgerStore, Namespace, StorageError, load_record, save_record};
use tracing::debug;
use tutor_core::model::{ConversationLog, LearnerId, LessonId, Message, Sender};
use tutor_core::responder::Responder;

use crate::Clock;

/// Appends learner and tutor messages to a learner's log and persists the
/// whole `conversations` record.
#[derive(Clone)]
pub struct ConversationStore {
    clock: Clock,
    records: Arc<dyn LedgerStore>,
    responder: Arc<dyn Responder>,
}

impl ConversationStore {
    #[must_use]
    pub fn new(clock: Clock, records: Arc<dyn LedgerStore>, responder: Arc<dyn Responder>) -> Self {
        Self {
            clock,
            records,
            responder,
        }
    }

    /// Load the learner's log, empty if nothing was stored.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the record cannot be read or decoded.
    pub async fn load(&self, learner: &LearnerId) -> Result<ConversationLog, StorageError> {
        let log: Option<ConversationLog> =
            load_record(self.records.as_ref(), learner, Namespace::Conversations).await?;
        Ok(log.unwrap_or_default())
    }

    /// Append the learner's message and work out the tutor's answer.
    ///
    /// Returns the stored message and the reply text to append once the
    /// latency window has passed.
    pub fn ask(&self, log: &mut ConversationLog, lesson: LessonId, text: &str) -> (Message, String) {
        let turn = log.turn_index(lesson);
        let message = log
            .append(lesson, Sender::Learner, text, self.clock.now())
            .clone();
        let reply = self.responder.respond(lesson, turn);
        debug!(lesson = %lesson, turn, "learner message appended");
        (message, reply)
    }

    /// Append the tutor's reply.
    pub fn answer(&self, log: &mut ConversationLog, lesson: LessonId, reply: String) -> Message {
        log.append(lesson, Sender::Tutor, reply, self.clock.now())
            .clone()
    }

    /// Empty the lesson thread and persist.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the write fails; the thread stays cleared in memory.
    pub async fn clear(
        &self,
        learner: &LearnerId,
        log: &mut ConversationLog,
        lesson: LessonId,
    ) -> Result<(), StorageError> {
        log.clear(lesson);
        self.persist(learner, log).await
    }

    /// Write the whole log.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the write fails.
    pub async fn persist(
        &self,
        learner: &LearnerId,
        log: &ConversationLog,
    ) -> Result<(), StorageError> {
        save_record(self.records.as_ref(), learner, Namespace::Conversations, log).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use storage::repository::InMemoryRepository;
    use tutor_core::responder::CannedResponder;
    use tutor_core::time::fixed_now;

    struct EchoTurn;

    impl Responder for EchoTurn {
        fn respond(&self, lesson: LessonId, turn_index: usize) -> String {
            format!("lesson {lesson} turn {turn_index}")
        }
    }

    #[test]
    fn ask_passes_zero_based_turn_index() {
        let store = ConversationStore::new(
            Clock::fixed(fixed_now()),
            Arc::new(InMemoryRepository::new()),
            Arc::new(EchoTurn),
        );
        let mut log = ConversationLog::new();
        let lesson = LessonId::new(5);

        let (first, reply) = store.ask(&mut log, lesson, "hello");
        assert_eq!(first.sender(), Sender::Learner);
        assert_eq!(reply, "lesson 5 turn 0");
        store.answer(&mut log, lesson, reply);

        let (_, reply) = store.ask(&mut log, lesson, "again");
        assert_eq!(reply, "lesson 5 turn 1");
    }

    #[tokio::test]
    async fn clear_persists_empty_thread() {
        let repo = InMemoryRepository::new();
        let store = ConversationStore::new(
            Clock::fixed(fixed_now()),
            Arc::new(repo.clone()),
            Arc::new(CannedResponder),
        );
        let learner = LearnerId::new("usr_1").unwrap();
        let lesson = LessonId::new(1);
        let mut log = ConversationLog::new();
        let (_, reply) = store.ask(&mut log, lesson, "what is a qubit?");
        store.answer(&mut log, lesson, reply);
        store.persist(&learner, &log).await.unwrap();
        assert_eq!(store.load(&learner).await.unwrap().thread(lesson).len(), 2);

        store.clear(&learner, &mut log, lesson).await.unwrap();
        let stored = store.load(&learner).await.unwrap();
        assert!(stored.thread(lesson).is_empty());
        assert_eq!(
            repo.raw("conversations:usr_1"),
            Some(serde_json::json!({"1": []}))
        );
    }
}
