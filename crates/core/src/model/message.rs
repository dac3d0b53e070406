use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::MessageId;

/// Who wrote a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    Learner,
    Tutor,
}

/// One immutable entry of a lesson conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    id: MessageId,
    text: String,
    sender: Sender,
    timestamp: DateTime<Utc>,
}

impl Message {
    pub(crate) fn new(
        id: MessageId,
        text: String,
        sender: Sender,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            text,
            sender,
            timestamp,
        }
    }

    #[must_use]
    pub fn id(&self) -> MessageId {
        self.id
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn sender(&self) -> Sender {
        self.sender
    }

    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    #[must_use]
    pub fn is_from_learner(&self) -> bool {
        self.sender == Sender::Learner
    }
}
