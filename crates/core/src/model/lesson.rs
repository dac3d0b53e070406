use thiserror::Error;

use crate::model::LessonId;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum LessonError {
    #[error("unknown lesson: {0}")]
    Unknown(LessonId),
}

/// Number of lessons in the catalog.
pub const CATALOG_SIZE: usize = 10;

/// Static catalog entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lesson {
    id: u32,
    title: &'static str,
    description: &'static str,
    icon: &'static str,
    color_tag: &'static str,
}

static CATALOG: [Lesson; CATALOG_SIZE] = [
    Lesson::entry(
        1,
        "Introduction to Quantum Computing",
        "Foundations and basic concepts of quantum computing.",
        "🔬",
        "blue",
    ),
    Lesson::entry(
        2,
        "Qubits and Superposition",
        "Understanding quantum bits and the superposition principle.",
        "🔄",
        "purple",
    ),
    Lesson::entry(
        3,
        "Quantum Entanglement",
        "The entanglement phenomenon and its applications.",
        "🔗",
        "pink",
    ),
    Lesson::entry(
        4,
        "Quantum Gates",
        "Basic operations on quantum systems.",
        "🚪",
        "indigo",
    ),
    Lesson::entry(
        5,
        "Quantum Algorithms I",
        "Deutsch-Jozsa and other introductory algorithms.",
        "📊",
        "green",
    ),
    Lesson::entry(
        6,
        "Quantum Algorithms II",
        "Grover's algorithm and quantum search.",
        "🔍",
        "yellow",
    ),
    Lesson::entry(
        7,
        "Quantum Algorithms III",
        "Shor's algorithm and quantum factoring.",
        "🔢",
        "red",
    ),
    Lesson::entry(
        8,
        "Quantum Error Correction",
        "Techniques for mitigating errors in quantum computers.",
        "🛠️",
        "orange",
    ),
    Lesson::entry(
        9,
        "Current Quantum Computers",
        "State of the art and physical implementations.",
        "💻",
        "teal",
    ),
    Lesson::entry(
        10,
        "The Future of Quantum Computing",
        "Trends and open challenges in the field.",
        "🚀",
        "cyan",
    ),
];

impl Lesson {
    const fn entry(
        id: u32,
        title: &'static str,
        description: &'static str,
        icon: &'static str,
        color_tag: &'static str,
    ) -> Self {
        Self {
            id,
            title,
            description,
            icon,
            color_tag,
        }
    }

    /// All catalog lessons in ascending id order.
    #[must_use]
    pub fn catalog() -> &'static [Lesson] {
        &CATALOG
    }

    /// Look up a lesson by id.
    #[must_use]
    pub fn find(id: LessonId) -> Option<&'static Lesson> {
        CATALOG.iter().find(|lesson| lesson.id == id.value())
    }

    /// Like [`Lesson::find`] but as a `Result`.
    ///
    /// # Errors
    ///
    /// Returns `LessonError::Unknown` for ids outside the catalog.
    pub fn get(id: LessonId) -> Result<&'static Lesson, LessonError> {
        Self::find(id).ok_or(LessonError::Unknown(id))
    }

    #[must_use]
    pub fn id(&self) -> LessonId {
        LessonId::new(self.id)
    }

    #[must_use]
    pub fn title(&self) -> &'static str {
        self.title
    }

    #[must_use]
    pub fn description(&self) -> &'static str {
        self.description
    }

    #[must_use]
    pub fn icon(&self) -> &'static str {
        self.icon
    }

    #[must_use]
    pub fn color_tag(&self) -> &'static str {
        self.color_tag
    }
}
