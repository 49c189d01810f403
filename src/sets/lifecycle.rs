/// Lifecycle capability: cooperative callbacks and triggers.
///
/// The controller drives each root set through the phases by calling the
/// `on_*` callbacks below; all of them may suspend. Sets fire the two
/// triggers (`update`, `reset`) themselves; those go straight to the
/// observer the controller installed at registration — a typed interface,
/// not a topic side channel — plus the public bus topics.
///
/// Intersected clones take part in none of this: they publish nothing,
/// persist nothing, and never enter a phase queue.
use crate::error::ScoringResult;
use crate::sets::IntersectionSet;
use async_trait::async_trait;

/// Installed on every root set at registration. The controller is the one
/// implementor; sets call these directly when triggered programmatically.
pub trait SetObserver: Send + Sync {
    /// `set.update()` was invoked: sets intersecting the set's model are
    /// due an update pass.
    fn set_updated(&self, set_id: &str);

    /// `set.reset()` was invoked: sets on the same model are due a
    /// restart pass.
    fn set_reset(&self, set_id: &str);
}

/// A set that participates in the lifecycle.
#[async_trait]
pub trait LifecycleSet: IntersectionSet {
    /// First-phase hook. Runs once per session, before restore.
    async fn on_init(&self) -> ScoringResult<()> {
        Ok(())
    }

    /// Restore from offline storage. Returns whether anything was
    /// restored; a `false` earns the set an `on_start` call. The default
    /// restores nothing and announces the attempt.
    async fn on_restore(&self) -> ScoringResult<bool> {
        self.core().emit(&format!(
            "scoring:{}:restored scoring:set:restored",
            self.set_type()
        ));
        Ok(false)
    }

    /// Fresh-session start, and the restart hook after a reset.
    async fn on_start(&self) -> ScoringResult<()> {
        Ok(())
    }

    /// The learner navigated into this set's neighborhood.
    async fn on_visit(&self) -> ScoringResult<()> {
        Ok(())
    }

    /// The learner navigated away.
    async fn on_leave(&self) -> ScoringResult<()> {
        Ok(())
    }

    /// Content intersecting this set changed.
    async fn on_update(&self) -> ScoringResult<()> {
        Ok(())
    }

    /// Clear accumulated state. Only dispatched to sets that report
    /// [`ScoringSet::can_reset`](crate::sets::ScoringSet::can_reset).
    async fn on_reset(&self) -> ScoringResult<()> {
        Ok(())
    }

    /// Programmatic trigger: notify sets intersecting this set's model
    /// that they should update.
    fn update(&self) {
        if self.is_intersected_clone() {
            return;
        }
        self.core().emit(&format!(
            "scoring:{}:update scoring:set:update",
            self.set_type()
        ));
        if let Some(observer) = self.core().observer() {
            observer.set_updated(self.id());
        }
    }

    /// Programmatic trigger: notify sets on this set's model that they
    /// should restart.
    fn reset(&self) {
        if self.is_intersected_clone() {
            return;
        }
        self.core().emit(&format!(
            "scoring:{}:reset scoring:set:reset",
            self.set_type()
        ));
        if let Some(observer) = self.core().observer() {
            observer.set_reset(self.id());
        }
    }
}
