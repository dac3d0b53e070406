use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{LessonId, Message, MessageId, Sender};

/// Per-lesson message threads for one learner.
///
/// Serializes as a plain `lessonId -> [Message]` map. Message ids are
/// issued from the larger of the wall-clock milliseconds and the last
/// issued id plus one, so they keep increasing across clears and reloads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<LessonId, Vec<Message>>", into = "BTreeMap<LessonId, Vec<Message>>")]
pub struct ConversationLog {
    threads: BTreeMap<LessonId, Vec<Message>>,
    last_id: u64,
}

impl From<BTreeMap<LessonId, Vec<Message>>> for ConversationLog {
    fn from(threads: BTreeMap<LessonId, Vec<Message>>) -> Self {
        let last_id = threads
            .values()
            .flatten()
            .map(|m| m.id().value())
            .max()
            .unwrap_or(0);
        Self { threads, last_id }
    }
}

impl From<ConversationLog> for BTreeMap<LessonId, Vec<Message>> {
    fn from(log: ConversationLog) -> Self {
        log.threads
    }
}

impl ConversationLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages of a lesson in insertion order; empty if the lesson was never opened.
    #[must_use]
    pub fn thread(&self, lesson: LessonId) -> &[Message] {
        self.threads.get(&lesson).map(Vec::as_slice).unwrap_or_default()
    }

    #[must_use]
    pub fn threads(&self) -> &BTreeMap<LessonId, Vec<Message>> {
        &self.threads
    }

    /// Make sure an (empty) entry exists for the lesson. Returns true if one was created.
    pub fn open(&mut self, lesson: LessonId) -> bool {
        if self.threads.contains_key(&lesson) {
            return false;
        }
        self.threads.insert(lesson, Vec::new());
        true
    }

    /// Number of learner turns already taken in the lesson.
    #[must_use]
    pub fn turn_index(&self, lesson: LessonId) -> usize {
        self.thread(lesson)
            .iter()
            .filter(|m| m.is_from_learner())
            .count()
    }

    /// Append a message to the lesson thread.
    ///
    /// A timestamp older than the thread tail is raised to the tail's
    /// timestamp so the thread stays in timestamp order.
    pub fn append(
        &mut self,
        lesson: LessonId,
        sender: Sender,
        text: impl Into<String>,
        now: DateTime<Utc>,
    ) -> &Message {
        let id = self.next_id(now);
        let thread = self.threads.entry(lesson).or_default();
        let timestamp = thread
            .last()
            .map_or(now, |tail| tail.timestamp().max(now));
        thread.push(Message::new(id, text.into(), sender, timestamp));
        &thread[thread.len() - 1]
    }

    /// Replace the lesson thread with an empty one.
    pub fn clear(&mut self, lesson: LessonId) {
        self.threads.insert(lesson, Vec::new());
    }

    fn next_id(&mut self, now: DateTime<Utc>) -> MessageId {
        let millis = u64::try_from(now.timestamp_millis()).unwrap_or(0);
        self.last_id = millis.max(self.last_id.saturating_add(1));
        MessageId::new(self.last_id)
    }
}
