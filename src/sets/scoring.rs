/// Scoring capability: numeric rollup over a set's available questions.
///
/// All aggregate getters derive from `available_questions` — unavailable
/// branches contribute nothing. Pass/fail is abstract here: a concrete
/// scoring type supplies `is_passed` (and is the only one who knows what
/// passing means for it); completion defaults to the anchor model's flag.
use crate::error::ScoringResult;
use crate::offline::{
    CompletionStatus, ObjectiveScore, ObjectiveStatus, OfflineStorage, SuccessStatus,
};
use crate::sets::{IntersectionSet, LifecycleSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::error;

/// Milliseconds the objective-status writer coalesces bursts for.
const STATUS_DEBOUNCE_MS: u64 = 100;

/// Scale `value` within `min_score..=max_score` to a whole percentage.
///
/// Non-negative values are measured against the non-negative part of the
/// range (the lower bound clamps to 0); an empty range scales to 0.
/// Negative values are measured against the magnitude of the negative
/// lower bound, yielding a negative percentage.
pub fn scale(value: f64, min_score: f64, max_score: f64) -> i64 {
    if value < 0.0 {
        if min_score >= 0.0 {
            return 0;
        }
        return (100.0 * value / min_score.abs()).round() as i64;
    }
    let floor = min_score.max(0.0);
    let range = max_score - floor;
    if range <= 0.0 {
        return 0;
    }
    (100.0 * (value - floor) / range).round() as i64
}

/// The SCORM-style objective record for one scoring set.
///
/// Score writes go straight through; status writes are debounced by
/// ~100 ms because completion flips arrive in bursts during an update
/// drain. Only root sets own one of these — clones never touch
/// objectives.
pub struct Objective {
    id: String,
    storage: Arc<OfflineStorage>,
    pending_status: Arc<Mutex<Option<ObjectiveStatus>>>,
    flush_scheduled: Arc<AtomicBool>,
}

impl Objective {
    pub fn new(id: impl Into<String>, storage: Arc<OfflineStorage>) -> Self {
        Self {
            id: id.into(),
            storage,
            pending_status: Arc::new(Mutex::new(None)),
            flush_scheduled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn write_description(&self, title: &str) {
        self.storage.set_objective_description(&self.id, title);
    }

    pub fn write_score(&self, score: ObjectiveScore) {
        self.storage.set_objective_score(&self.id, score);
    }

    /// Record a status, coalescing rapid successive writes. Outside a
    /// runtime the write is immediate.
    pub fn write_status(&self, status: ObjectiveStatus) {
        *self.pending_status.lock().expect("status lock") = Some(status);
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            self.flush();
            return;
        };
        if self.flush_scheduled.swap(true, Ordering::AcqRel) {
            return;
        }
        let pending = Arc::clone(&self.pending_status);
        let scheduled = Arc::clone(&self.flush_scheduled);
        let storage = Arc::clone(&self.storage);
        let id = self.id.clone();
        handle.spawn(async move {
            tokio::time::sleep(Duration::from_millis(STATUS_DEBOUNCE_MS)).await;
            scheduled.store(false, Ordering::Release);
            if let Some(status) = pending.lock().expect("status lock").take() {
                storage.set_objective_status(&id, status);
            }
        });
    }

    /// Write any pending status immediately.
    pub fn flush(&self) {
        if let Some(status) = self.pending_status.lock().expect("status lock").take() {
            self.storage.set_objective_status(&self.id, status);
        }
    }
}

/// A set that aggregates scores.
pub trait ScoringSet: LifecycleSet {
    fn min_score(&self) -> f64 {
        self.available_questions().iter().map(|q| q.min_score()).sum()
    }

    fn max_score(&self) -> f64 {
        self.available_questions().iter().map(|q| q.max_score()).sum()
    }

    fn score(&self) -> f64 {
        self.available_questions().iter().map(|q| q.score()).sum()
    }

    /// Number of correctly answered available questions.
    fn correctness(&self) -> usize {
        self.available_questions()
            .iter()
            .filter(|q| q.is_correct())
            .count()
    }

    fn max_correctness(&self) -> usize {
        self.available_questions().len()
    }

    fn scaled_score(&self) -> i64 {
        scale(self.score(), self.min_score(), self.max_score())
    }

    fn scaled_correctness(&self) -> i64 {
        scale(self.correctness() as f64, 0.0, self.max_correctness() as f64)
    }

    /// The score with an explicit sign for positive values.
    fn score_as_string(&self) -> String {
        let score = self.score();
        let text = if score.fract() == 0.0 {
            format!("{}", score as i64)
        } else {
            format!("{score}")
        };
        if score > 0.0 {
            format!("+{text}")
        } else {
            text
        }
    }

    /// The raw config flag; the effective value is
    /// [`ScoringSet::is_score_included`].
    fn score_included_config(&self) -> bool {
        true
    }

    /// The raw config flag; the effective value is
    /// [`ScoringSet::is_completion_required`].
    fn completion_required_config(&self) -> bool {
        true
    }

    fn is_score_included(&self) -> bool {
        self.is_available() && !self.is_optional() && self.score_included_config()
    }

    fn is_completion_required(&self) -> bool {
        self.is_available() && !self.is_optional() && self.completion_required_config()
    }

    fn is_complete(&self) -> bool {
        self.model().is_some_and(|model| model.is_complete())
    }

    /// Concrete scoring types must decide what passing means. The
    /// fallback is a contract violation: logged, never panicking, and
    /// conservatively not passed.
    fn is_passed(&self) -> bool {
        error!(
            id = self.id(),
            set_type = self.set_type(),
            "scoring set does not define is_passed"
        );
        false
    }

    fn is_failed(&self) -> bool {
        self.is_complete() && !self.is_passed()
    }

    /// Whether this set can clear its own state and be retaken.
    fn can_reset(&self) -> bool {
        false
    }

    /// The objective record, for root sets that persist one.
    fn objective(&self) -> Option<&Objective> {
        None
    }

    /// Completion transition hook: announce and persist. Invoked by the
    /// controller when `is_complete` flips to true during an update.
    fn on_completed(&self) {
        if self.is_intersected_clone() {
            return;
        }
        self.core().emit(&format!(
            "scoring:{}:complete scoring:set:complete",
            self.set_type()
        ));
        if let Some(objective) = self.objective() {
            objective.write_score(ObjectiveScore {
                score: self.score(),
                min_score: self.min_score(),
                max_score: self.max_score(),
            });
            let success = if self.is_passed() {
                SuccessStatus::Passed
            } else {
                SuccessStatus::Failed
            };
            objective.write_status(ObjectiveStatus {
                completion: CompletionStatus::Completed,
                success: Some(success),
            });
        }
    }

    /// Pass transition hook: announce. Invoked by the controller when
    /// `is_passed` flips to true during an update.
    fn on_passed(&self) {
        if self.is_intersected_clone() {
            return;
        }
        self.core().emit(&format!(
            "scoring:{}:passed scoring:set:passed",
            self.set_type()
        ));
    }

    /// Persist restoration state. Default: nothing to persist.
    fn save_state(&self) -> ScoringResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_scale_endpoints() {
        assert_eq!(scale(10.0, 0.0, 10.0), 100);
        assert_eq!(scale(0.0, 0.0, 10.0), 0);
        assert_eq!(scale(5.0, 0.0, 10.0), 50);
        assert_eq!(scale(2.0, 2.0, 10.0), 0);
    }

    #[test]
    fn test_scale_empty_range() {
        assert_eq!(scale(0.0, 0.0, 0.0), 0);
        assert_eq!(scale(5.0, 0.0, 0.0), 0);
    }

    #[test]
    fn test_scale_negative_values() {
        assert_eq!(scale(-5.0, -10.0, 0.0), -50);
        assert_eq!(scale(-10.0, -10.0, 10.0), -100);
        // Negative value with no negative range clamps to 0.
        assert_eq!(scale(-5.0, 0.0, 10.0), 0);
    }

    #[test]
    fn test_scale_rounds_to_nearest() {
        assert_eq!(scale(1.0, 0.0, 3.0), 33);
        assert_eq!(scale(2.0, 0.0, 3.0), 67);
    }

    proptest! {
        #[test]
        fn prop_scale_monotonic(a in -100.0f64..100.0, b in -100.0f64..100.0,
                                min in -50.0f64..0.0, max in 1.0f64..100.0) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(scale(lo, min, max) <= scale(hi, min, max));
        }

        #[test]
        fn prop_scale_bounds(v in 0.0f64..100.0, max in 1.0f64..100.0) {
            let scaled = scale(v.min(max), 0.0, max);
            prop_assert!((0..=100).contains(&scaled));
        }
    }

    #[test]
    fn test_objective_immediate_outside_runtime() {
        let storage = Arc::new(OfflineStorage::ready_now());
        let objective = Objective::new("o-1", storage.clone());
        objective.write_status(ObjectiveStatus {
            completion: CompletionStatus::Incomplete,
            success: None,
        });
        assert_eq!(
            storage.objective_status("o-1").unwrap().completion,
            CompletionStatus::Incomplete
        );
    }

    #[tokio::test]
    async fn test_objective_status_debounce() {
        let storage = Arc::new(OfflineStorage::ready_now());
        let objective = Objective::new("o-1", storage.clone());

        objective.write_status(ObjectiveStatus {
            completion: CompletionStatus::Incomplete,
            success: None,
        });
        objective.write_status(ObjectiveStatus {
            completion: CompletionStatus::Completed,
            success: Some(SuccessStatus::Passed),
        });

        // Nothing lands until the debounce window closes.
        assert!(storage.objective_status("o-1").is_none());
        tokio::time::sleep(Duration::from_millis(STATUS_DEBOUNCE_MS * 2)).await;

        // Only the last write in the burst survives.
        let status = storage.objective_status("o-1").unwrap();
        assert_eq!(status.completion, CompletionStatus::Completed);
    }

    #[tokio::test]
    async fn test_objective_flush() {
        let storage = Arc::new(OfflineStorage::ready_now());
        let objective = Objective::new("o-1", storage.clone());
        objective.write_status(ObjectiveStatus {
            completion: CompletionStatus::Completed,
            success: Some(SuccessStatus::Failed),
        });
        objective.flush();
        assert_eq!(
            storage.objective_status("o-1").unwrap().success,
            Some(SuccessStatus::Failed)
        );
    }
}
