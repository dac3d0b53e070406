mod conversation;
mod ids;
mod learner;
mod lesson;
mod message;
mod progress;

pub use conversation::ConversationLog;
pub use ids::{LearnerId, LearnerIdError, LessonId, MessageId, ParseIdError};
pub use learner::{Learner, Role};
pub use lesson::{CATALOG_SIZE, Lesson, LessonError};
pub use message::{Message, Sender};
pub use progress::{
    CONCEPTS_WEIGHT, INTERACTION_CAP, InteractionEvent, KEY_CONCEPTS,
    LessonProgress, ProgressLedger, TARGET_INTERACTIONS,
};
