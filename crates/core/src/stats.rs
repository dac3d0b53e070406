//! Aggregate statistics derived from a [`ProgressLedger`].
//!
//! Everything here is pure and recomputed on every call; the catalog is
//! small enough that nothing is cached.

use chrono::{DateTime, Utc};

use crate::model::{CATALOG_SIZE, LessonId, ProgressLedger};

/// Rough study time assumed per lesson that has not been started.
pub const MINUTES_PER_LESSON: u32 = 60;

/// Floor of the mean percentage over the whole catalog.
#[must_use]
pub fn overall_progress(ledger: &ProgressLedger) -> u8 {
    let total: u32 = ledger
        .iter()
        .map(|p| u32::from(p.progress_percentage()))
        .sum();
    let catalog = u32::try_from(CATALOG_SIZE).unwrap_or(u32::MAX);
    u8::try_from((total / catalog).min(100)).unwrap_or(100)
}

#[must_use]
pub fn completed_count(ledger: &ProgressLedger) -> usize {
    ledger.iter().filter(|p| p.completed()).count()
}

/// Lessons started but not completed, ascending.
#[must_use]
pub fn in_progress_lessons(ledger: &ProgressLedger) -> Vec<LessonId> {
    ledger
        .iter()
        .filter(|p| p.is_in_progress())
        .map(|p| p.lesson_id())
        .collect()
}

/// Most recent activity across all lessons.
#[must_use]
pub fn last_active(ledger: &ProgressLedger) -> Option<DateTime<Utc>> {
    ledger.iter().filter_map(|p| p.last_active()).max()
}

/// Dashboard numbers in one pass-friendly bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressSummary {
    pub overall: u8,
    pub completed: usize,
    pub in_progress: Vec<LessonId>,
    pub not_started: usize,
    pub estimated_minutes_remaining: u32,
    pub last_active: Option<DateTime<Utc>>,
}

impl ProgressSummary {
    #[must_use]
    pub fn from_ledger(ledger: &ProgressLedger) -> Self {
        let completed = completed_count(ledger);
        let in_progress = in_progress_lessons(ledger);
        let not_started = CATALOG_SIZE.saturating_sub(completed + in_progress.len());
        let estimated_minutes_remaining =
            u32::try_from(not_started).unwrap_or(u32::MAX).saturating_mul(MINUTES_PER_LESSON);
        Self {
            overall: overall_progress(ledger),
            completed,
            in_progress,
            not_started,
            estimated_minutes_remaining,
            last_active: last_active(ledger),
        }
    }

    #[must_use]
    pub fn estimated_time_remaining(&self) -> String {
        format_duration(self.estimated_minutes_remaining)
    }
}

/// Human label for a remaining-time estimate: `done`, `~45m`, `~2h`, `~2h 30m`.
#[must_use]
pub fn format_duration(minutes: u32) -> String {
    match (minutes / 60, minutes % 60) {
        (0, 0) => "done".to_string(),
        (0, m) => format!("~{m}m"),
        (h, 0) => format!("~{h}h"),
        (h, m) => format!("~{h}h {m}m"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::InteractionEvent;
    use crate::time::fixed_now;
    use chrono::Duration;

    fn ledger_with(percentages: [u8; 10]) -> ProgressLedger {
        let mut ledger = ProgressLedger::initial();
        for (idx, &pct) in percentages.iter().enumerate() {
            let lesson = LessonId::new(u32::try_from(idx).unwrap() + 1);
            match pct {
                0 => {}
                100 => {
                    ledger.record(lesson, &InteractionEvent::Start, fixed_now());
                    ledger.record(lesson, &InteractionEvent::Complete, fixed_now());
                }
                pct => {
                    ledger.record(lesson, &InteractionEvent::Start, fixed_now());
                    for _ in 0..(pct / 5) {
                        ledger.record(
                            lesson,
                            &InteractionEvent::message(Vec::<String>::new()),
                            fixed_now(),
                        );
                    }
                }
            }
        }
        ledger
    }

    #[test]
    fn overall_is_floor_of_catalog_mean() {
        let ledger = ledger_with([100, 70, 30, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(overall_progress(&ledger), 20);

        let ledger = ledger_with([5, 5, 5, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(overall_progress(&ledger), 1);
    }

    #[test]
    fn empty_ledger_has_zero_overall() {
        assert_eq!(overall_progress(&ProgressLedger::default()), 0);
    }

    #[test]
    fn counts_and_in_progress_order() {
        let ledger = ledger_with([100, 70, 30, 0, 0, 0, 0, 0, 0, 100]);
        assert_eq!(completed_count(&ledger), 2);
        assert_eq!(
            in_progress_lessons(&ledger),
            vec![LessonId::new(2), LessonId::new(3)]
        );
    }

    #[test]
    fn summary_estimates_remaining_time() {
        let mut ledger = ledger_with([100, 70, 0, 0, 0, 0, 0, 0, 0, 0]);
        let later = fixed_now() + Duration::hours(2);
        ledger.record(LessonId::new(2), &InteractionEvent::message(["qubit"]), later);

        let summary = ProgressSummary::from_ledger(&ledger);
        assert_eq!(summary.completed, 1);
        assert_eq!(summary.in_progress, vec![LessonId::new(2)]);
        assert_eq!(summary.not_started, 8);
        assert_eq!(summary.estimated_minutes_remaining, 480);
        assert_eq!(summary.estimated_time_remaining(), "~8h");
        assert_eq!(summary.last_active, Some(later));
    }

    #[test]
    fn duration_labels() {
        assert_eq!(format_duration(0), "done");
        assert_eq!(format_duration(45), "~45m");
        assert_eq!(format_duration(150), "~2h 30m");
    }
}
