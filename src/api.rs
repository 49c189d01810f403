/// The scoring root: the one object an embedding host talks to.
///
/// Owns the context, renderer, and controller, and fronts the registry
/// and query surfaces. Host wiring is two calls: `data_ready()` once the
/// content tree is populated (builds the total set), then `start()` to
/// run the startup lifecycle. Navigation and programmatic update/reset
/// go through here too.
///
/// # Example
///
/// ```ignore
/// use scoreset::{Scoring, ScoringConfig, ContentTree, OfflineStorage};
/// use std::sync::Arc;
///
/// let tree = Arc::new(ContentTree::new());
/// // … populate the tree from course data …
/// let storage = Arc::new(OfflineStorage::ready_now());
/// let scoring = Scoring::new(tree, storage, ScoringConfig::default());
/// scoring.data_ready()?;
/// scoring.start().await;
///
/// let result = scoring.get_subset_by_query("#a-300 #performance")?;
/// ```
use crate::config::ScoringConfig;
use crate::content::ContentTree;
use crate::context::ScoringContext;
use crate::error::ScoringResult;
use crate::hierarchy::intersects_hierarchy;
use crate::lifecycle::renderer::{PhaseRenderer, DEFAULT_FPS};
use crate::lifecycle::{HostWait, LifecycleController, NullWait, SetStatus};
use crate::offline::OfflineStorage;
use crate::query;
use crate::sets::{IntersectionSet, SetRef, TotalSet};
use std::sync::Arc;

pub struct Scoring {
    ctx: Arc<ScoringContext>,
    renderer: Arc<PhaseRenderer>,
    controller: Arc<LifecycleController>,
}

impl Scoring {
    /// Build with the default (null) wait port and tick rate.
    pub fn new(
        tree: Arc<ContentTree>,
        storage: Arc<OfflineStorage>,
        config: ScoringConfig,
    ) -> Self {
        Self::with_wait(tree, storage, config, Arc::new(NullWait), DEFAULT_FPS)
    }

    /// Build against a host wait port and tick rate.
    pub fn with_wait(
        tree: Arc<ContentTree>,
        storage: Arc<OfflineStorage>,
        config: ScoringConfig,
        wait: Arc<dyn HostWait>,
        fps: u32,
    ) -> Self {
        let ctx = ScoringContext::new(tree, storage, config);
        let renderer = PhaseRenderer::new(wait, fps);
        let controller = LifecycleController::install(Arc::clone(&ctx), Arc::clone(&renderer));
        Self {
            ctx,
            renderer,
            controller,
        }
    }

    pub fn context(&self) -> &Arc<ScoringContext> {
        &self.ctx
    }

    pub fn controller(&self) -> &Arc<LifecycleController> {
        &self.controller
    }

    /// Course data is loaded: build the total set from configuration.
    pub fn data_ready(&self) -> ScoringResult<Arc<TotalSet>> {
        let total = TotalSet::create(&self.ctx)?;
        self.ctx.set_total(Arc::clone(&total));
        Ok(total)
    }

    /// Run the startup lifecycle (init → restore → start → update) and
    /// open the gates for change events.
    pub async fn start(&self) {
        self.controller.start().await;
    }

    /// The learner moved to a content object (`None` = off any page).
    pub fn navigate(&self, to: Option<&str>) {
        self.controller.navigate(to);
    }

    /// Register a host-built root set.
    pub fn register(&self, set: SetRef) -> ScoringResult<()> {
        self.ctx.register_set(set)
    }

    /// Deregister a root set by id.
    pub fn deregister(&self, id: &str) -> ScoringResult<SetRef> {
        self.controller.forget_status(id);
        self.ctx
            .deregister_set(id)
            .ok_or_else(|| crate::error::ScoringError::SetNotFound { id: id.to_string() })
    }

    /// Drop every registered set and the total.
    pub fn clear(&self) {
        let ids: Vec<String> = self
            .ctx
            .registry()
            .sets()
            .iter()
            .map(|set| set.id().to_string())
            .collect();
        for id in ids {
            let _ = self.deregister(&id);
        }
        self.ctx.clear_total();
    }

    /// All root sets in lifecycle order.
    pub fn sets(&self) -> Vec<SetRef> {
        self.ctx.registry().sets()
    }

    pub fn total(&self) -> Option<Arc<TotalSet>> {
        self.ctx.total()
    }

    pub fn is_backward_compatible(&self) -> bool {
        self.ctx.config().is_backward_compatible
    }

    /// Drive every set through an update pass and wait for the batch.
    pub async fn update(&self) {
        self.ctx.bus().publish("scoring:update", None);
        self.controller.update_all().await;
    }

    /// Drive every set through the reset phase and wait for the batch.
    pub async fn reset(&self) {
        self.ctx.bus().publish("scoring:reset", None);
        self.controller.reset_all().await;
    }

    /// The lifecycle status vector of a set.
    pub fn status_of(&self, set_id: &str) -> SetStatus {
        self.controller.status_of(set_id)
    }

    // Query surface ------------------------------------------------------

    pub fn get_set_by_id(&self, id: &str) -> Option<SetRef> {
        self.ctx.registry().get(id)
    }

    pub fn get_sets_by_type(&self, set_type: &str) -> Vec<SetRef> {
        self.ctx.registry().sets_by_type(set_type)
    }

    /// Root sets whose models hierarchy-intersect the given model.
    pub fn get_sets_by_intersecting_model_id(&self, model_id: &str) -> Vec<SetRef> {
        let Some(model) = self.ctx.tree().find_by_id(model_id) else {
            return Vec::new();
        };
        self.ctx
            .registry()
            .sets()
            .into_iter()
            .filter(|set| intersects_hierarchy(&model, &set.models()))
            .collect()
    }

    /// Dotted path form: `"a-1.b-1.perf"` folds the named sets left to
    /// right through the intersection operator.
    pub fn get_subset_by_path(&self, path: &str) -> Option<SetRef> {
        query::get_subset_by_path(&self.ctx, path.split('.'))
    }

    /// Path form over explicit ids.
    pub fn get_subset_by_path_ids<I, S>(&self, path: I) -> Option<SetRef>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        query::get_subset_by_path(&self.ctx, path)
    }

    pub fn get_subsets_by_query(&self, q: &str) -> ScoringResult<Vec<SetRef>> {
        query::get_subsets_by_query(&self.ctx, q)
    }

    pub fn get_subset_by_query(&self, q: &str) -> ScoringResult<Option<SetRef>> {
        query::get_subset_by_query(&self.ctx, q)
    }

    /// Wait for in-flight lifecycle work to settle (test convenience).
    pub async fn settle(&self) {
        self.renderer.wait_for_batch().await;
    }

    /// Stop background tasks. Queued work is abandoned.
    pub fn shutdown(&self) {
        self.controller.shutdown();
    }
}

impl Drop for Scoring {
    fn drop(&mut self) {
        self.shutdown();
    }
}
