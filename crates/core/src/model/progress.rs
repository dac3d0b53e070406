use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{Lesson, LessonId};

/// Messages needed to reach the interaction cap.
pub const TARGET_INTERACTIONS: u32 = 20;
/// Largest share of a lesson earned from interactions alone.
pub const INTERACTION_CAP: f64 = 0.7;
/// Key concepts assumed per lesson.
pub const KEY_CONCEPTS: u32 = 5;
/// Share earned by exploring all key concepts.
pub const CONCEPTS_WEIGHT: f64 = 0.3;

/// Discrete learner interaction that moves lesson progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum InteractionEvent {
    Start,
    Message {
        #[serde(default)]
        concepts: Vec<String>,
    },
    Complete,
}

impl InteractionEvent {
    /// A message event carrying the given concepts.
    pub fn message<I, S>(concepts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Message {
            concepts: concepts.into_iter().map(Into::into).collect(),
        }
    }
}

/// Progress of one learner through one lesson.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonProgress {
    lesson_id: LessonId,
    started: bool,
    completed: bool,
    interactions: u32,
    last_active: Option<DateTime<Utc>>,
    concepts_explored: Vec<String>,
    progress_percentage: u8,
}

impl LessonProgress {
    /// Zeroed record for a lesson nobody has opened yet.
    #[must_use]
    pub fn new(lesson_id: LessonId) -> Self {
        Self {
            lesson_id,
            started: false,
            completed: false,
            interactions: 0,
            last_active: None,
            concepts_explored: Vec::new(),
            progress_percentage: 0,
        }
    }

    #[must_use]
    pub fn lesson_id(&self) -> LessonId {
        self.lesson_id
    }

    #[must_use]
    pub fn started(&self) -> bool {
        self.started
    }

    #[must_use]
    pub fn completed(&self) -> bool {
        self.completed
    }

    #[must_use]
    pub fn interactions(&self) -> u32 {
        self.interactions
    }

    #[must_use]
    pub fn last_active(&self) -> Option<DateTime<Utc>> {
        self.last_active
    }

    /// Distinct concepts in the order they were first seen.
    #[must_use]
    pub fn concepts_explored(&self) -> &[String] {
        &self.concepts_explored
    }

    #[must_use]
    pub fn progress_percentage(&self) -> u8 {
        self.progress_percentage
    }

    #[must_use]
    pub fn is_in_progress(&self) -> bool {
        self.started && !self.completed
    }

    /// Apply one interaction event at `now`.
    pub fn apply(&mut self, event: &InteractionEvent, now: DateTime<Utc>) {
        match event {
            InteractionEvent::Start => {
                self.started = true;
                self.last_active = Some(now);
            }
            InteractionEvent::Message { concepts } => {
                self.started = true;
                self.interactions = self.interactions.saturating_add(1);
                self.last_active = Some(now);
                for concept in concepts {
                    if !self.concepts_explored.contains(concept) {
                        self.concepts_explored.push(concept.clone());
                    }
                }
                // Completion is sticky: a lesson forced complete stays at 100.
                self.progress_percentage = if self.completed {
                    100
                } else {
                    self.computed_percentage()
                };
                if self.progress_percentage >= 100 {
                    self.completed = true;
                }
            }
            InteractionEvent::Complete => {
                self.started = true;
                self.completed = true;
                self.progress_percentage = 100;
                self.last_active = Some(now);
            }
        }
    }

    /// `min(floor((min(i/20, 0.7) + (c/5) * 0.3) * 100), 100)`, evaluated in
    /// `f64` in that order so rounding matches the stored history. The
    /// concepts term has no cap of its own.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn computed_percentage(&self) -> u8 {
        let interactions =
            (f64::from(self.interactions) / f64::from(TARGET_INTERACTIONS)).min(INTERACTION_CAP);
        let concepts = u32::try_from(self.concepts_explored.len()).map_or(f64::MAX, f64::from);
        let concepts = (concepts / f64::from(KEY_CONCEPTS)) * CONCEPTS_WEIGHT;
        let total = ((interactions + concepts) * 100.0).floor().clamp(0.0, 100.0);
        total as u8
    }

    /// Restore invariants on a record read back from storage.
    fn normalize(&mut self, lesson_id: LessonId) {
        self.lesson_id = lesson_id;
        self.progress_percentage = self.progress_percentage.min(100);
        if self.completed {
            self.progress_percentage = 100;
        } else if self.progress_percentage == 100 {
            self.completed = true;
        }
        // Any recorded activity implies the lesson was opened.
        if self.interactions > 0 || self.progress_percentage > 0 {
            self.started = true;
        }
        let mut seen = Vec::with_capacity(self.concepts_explored.len());
        self.concepts_explored.retain(|c| {
            if seen.contains(c) {
                false
            } else {
                seen.push(c.clone());
                true
            }
        });
    }
}

/// Every lesson's progress for one learner.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProgressLedger {
    lessons: BTreeMap<LessonId, LessonProgress>,
}

impl ProgressLedger {
    /// One zeroed entry per catalog lesson.
    #[must_use]
    pub fn initial() -> Self {
        let lessons = Lesson::catalog()
            .iter()
            .map(|lesson| (lesson.id(), LessonProgress::new(lesson.id())))
            .collect();
        Self { lessons }
    }

    /// Record for the lesson, or a zeroed one if none is stored.
    #[must_use]
    pub fn lesson(&self, lesson: LessonId) -> LessonProgress {
        self.lessons
            .get(&lesson)
            .cloned()
            .unwrap_or_else(|| LessonProgress::new(lesson))
    }

    /// Apply an event to the lesson's record, creating it if needed.
    pub fn record(
        &mut self,
        lesson: LessonId,
        event: &InteractionEvent,
        now: DateTime<Utc>,
    ) -> &LessonProgress {
        let entry = self
            .lessons
            .entry(lesson)
            .or_insert_with(|| LessonProgress::new(lesson));
        entry.apply(event, now);
        entry
    }

    /// Records in ascending lesson order.
    pub fn iter(&self) -> impl Iterator<Item = &LessonProgress> {
        self.lessons.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lessons.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lessons.is_empty()
    }

    /// Clamp persisted records back into their invariants, drop lessons
    /// outside the catalog and fill in catalog lessons missing from an
    /// older snapshot.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.lessons.retain(|id, _| Lesson::find(*id).is_some());
        for (id, progress) in &mut self.lessons {
            progress.normalize(*id);
        }
        for lesson in Lesson::catalog() {
            self.lessons
                .entry(lesson.id())
                .or_insert_with(|| LessonProgress::new(lesson.id()));
        }
        self
    }
}
