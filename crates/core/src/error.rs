use thiserror::Error;

use crate::model::{LearnerIdError, LessonError};

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Lesson(#[from] LessonError),
    #[error(transparent)]
    LearnerId(#[from] LearnerIdError),
}
