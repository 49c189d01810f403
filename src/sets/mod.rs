/// The set algebra.
///
/// A *set* is a named projection over content models. The capability
/// hierarchy is explicit:
///
/// - [`IntersectionSet`] — identity, model membership, the intersection
///   operator, and the query surface. Every set implements this.
/// - [`LifecycleSet`] — the cooperative lifecycle callbacks and triggers.
/// - [`ScoringSet`] — score/correctness/completion/pass-fail aggregation.
///
/// Concrete types: [`ModelSet`](model_set::ModelSet) wraps a single content
/// model (non-scoring); [`ModelScoringSet`](model_scoring::ModelScoringSet)
/// is the minimal concrete scoring set; [`TotalSet`](total::TotalSet)
/// aggregates across every included set.
///
/// A set constructed without an intersection parent is a *root set* and
/// registers itself. `clone_with_parent` produces an *intersected clone*
/// of the same concrete type: never registered, no side effects, its
/// derived views recomputed against the new parent.
pub mod lifecycle;
pub mod model_scoring;
pub mod model_set;
pub mod scoring;
pub mod total;

pub use lifecycle::{LifecycleSet, SetObserver};
pub use model_scoring::{ModelScoringOptions, ModelScoringSet};
pub use model_set::ModelSet;
pub use scoring::{scale, Objective, ScoringSet};
pub use total::TotalSet;

use crate::content::{ContentModel, ContentType};
use crate::context::ScoringContext;
use crate::hierarchy::{
    filter_by_intersecting_hierarchy, intersects_hierarchy, is_available_in_hierarchy,
    unique_models,
};
use std::sync::{Arc, Mutex, RwLock, Weak};
use tracing::error;

/// The universal currency for sets: every registered set, clone, and query
/// result travels as one of these.
pub type SetRef = Arc<dyn LifecycleSet>;

/// Construction options shared by every concrete set type.
#[derive(Default, Clone)]
pub struct SetOptions {
    pub id: Option<String>,
    pub title: Option<String>,
    pub model: Option<Arc<ContentModel>>,
    pub models: Option<Vec<Arc<ContentModel>>>,
    pub order: Option<i32>,
}

impl SetOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn model(mut self, model: Arc<ContentModel>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn models(mut self, models: Vec<Arc<ContentModel>>) -> Self {
        self.models = Some(models);
        self
    }

    pub fn order(mut self, order: i32) -> Self {
        self.order = Some(order);
        self
    }
}

#[derive(Default)]
struct ViewCache {
    stamp: u64,
    effective: Option<Vec<Arc<ContentModel>>>,
    available: Option<Vec<Arc<ContentModel>>>,
}

/// The stable own-state block every concrete set embeds.
///
/// Everything a clone copies lives here; everything derived is computed by
/// the trait methods against the current tree and intersection parent.
pub struct SetCore {
    id: String,
    set_type: String,
    title: Option<String>,
    model: Option<Arc<ContentModel>>,
    models: Option<Vec<Arc<ContentModel>>>,
    intersection_parent: Option<SetRef>,
    order: i32,
    ctx: Weak<ScoringContext>,
    observer: RwLock<Option<Weak<dyn SetObserver>>>,
    self_ref: RwLock<Option<Weak<dyn LifecycleSet>>>,
    cache: Mutex<ViewCache>,
}

impl SetCore {
    /// Build a root core. A missing id is generated from the first free
    /// `{type|modelId|unknown}-{n}` against the registry.
    pub fn build(
        ctx: &Arc<ScoringContext>,
        set_type: impl Into<String>,
        default_order: i32,
        opts: SetOptions,
    ) -> Self {
        let set_type = set_type.into();
        let id = opts.id.unwrap_or_else(|| {
            let prefix = if !set_type.is_empty() {
                set_type.clone()
            } else if let Some(model) = &opts.model {
                model.id().to_string()
            } else {
                error!("set has neither type nor model; generating an 'unknown' id");
                "unknown".to_string()
            };
            ctx.registry().free_id(&prefix)
        });
        Self {
            id,
            set_type,
            title: opts.title,
            model: opts.model,
            models: opts.models,
            intersection_parent: None,
            order: opts.order.unwrap_or(default_order),
            ctx: Arc::downgrade(ctx),
            observer: RwLock::new(None),
            self_ref: RwLock::new(None),
            cache: Mutex::new(ViewCache::default()),
        }
    }

    /// Copy the stable own state for an intersected clone under `parent`.
    /// Clones carry no observer and publish nothing.
    pub fn for_clone(&self, parent: SetRef) -> Self {
        Self {
            id: self.id.clone(),
            set_type: self.set_type.clone(),
            title: self.title.clone(),
            model: self.model.clone(),
            models: self.models.clone(),
            intersection_parent: Some(parent),
            order: self.order,
            ctx: self.ctx.clone(),
            observer: RwLock::new(None),
            self_ref: RwLock::new(None),
            cache: Mutex::new(ViewCache::default()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn set_type(&self) -> &str {
        &self.set_type
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn model(&self) -> Option<Arc<ContentModel>> {
        self.model.clone()
    }

    pub fn model_id(&self) -> Option<String> {
        self.model.as_ref().map(|model| model.id().to_string())
    }

    pub fn explicit_models(&self) -> Option<Vec<Arc<ContentModel>>> {
        self.models.clone()
    }

    pub fn order(&self) -> i32 {
        self.order
    }

    pub fn intersection_parent(&self) -> Option<SetRef> {
        self.intersection_parent.clone()
    }

    pub fn is_clone(&self) -> bool {
        self.intersection_parent.is_some()
    }

    pub fn ctx(&self) -> Option<Arc<ScoringContext>> {
        self.ctx.upgrade()
    }

    pub fn install_observer(&self, observer: Weak<dyn SetObserver>) {
        *self.observer.write().expect("observer lock") = Some(observer);
    }

    pub fn observer(&self) -> Option<Arc<dyn SetObserver>> {
        self.observer
            .read()
            .expect("observer lock")
            .as_ref()
            .and_then(Weak::upgrade)
    }

    /// Remember the `Arc` this core is embedded in; used as event payload
    /// and as the intersection parent of subset clones.
    pub fn bind_self(&self, set: &SetRef) {
        *self.self_ref.write().expect("self lock") = Some(Arc::downgrade(set));
    }

    pub fn self_ref(&self) -> Option<SetRef> {
        self.self_ref
            .read()
            .expect("self lock")
            .as_ref()
            .and_then(Weak::upgrade)
    }

    /// Publish topics with this set as payload. Intersected clones are
    /// silent by contract.
    pub fn emit(&self, topics: &str) {
        if self.is_clone() {
            return;
        }
        if let Some(ctx) = self.ctx() {
            ctx.bus().publish(topics, self.self_ref());
        }
    }

    fn with_cache<T>(
        &self,
        read: impl Fn(&ViewCache) -> Option<T>,
        write: impl Fn(&mut ViewCache, T),
        compute: impl Fn() -> T,
    ) -> T
    where
        T: Clone,
    {
        let stamp = self.ctx().map_or(0, |ctx| ctx.stamp());
        {
            let mut cache = self.cache.lock().expect("view cache lock");
            if cache.stamp != stamp {
                *cache = ViewCache {
                    stamp,
                    ..ViewCache::default()
                };
            } else if let Some(value) = read(&cache) {
                return value;
            }
        }
        // Recompute outside the lock: the closure may re-enter other sets.
        let value = compute();
        let mut cache = self.cache.lock().expect("view cache lock");
        if cache.stamp == stamp {
            write(&mut cache, value.clone());
        }
        value
    }
}

/// Base contract of every set: identity, membership, intersection, and
/// the query-facing getters.
pub trait IntersectionSet: Send + Sync {
    /// The embedded stable state block.
    fn core(&self) -> &SetCore;

    /// Rebuild this set as an intersected clone of the same concrete type
    /// under `parent`. The clone must not register.
    fn clone_with_parent(&self, parent: SetRef) -> SetRef;

    fn id(&self) -> &str {
        self.core().id()
    }

    fn set_type(&self) -> &str {
        self.core().set_type()
    }

    fn title(&self) -> Option<String> {
        self.core().title().map(str::to_string)
    }

    fn model(&self) -> Option<Arc<ContentModel>> {
        self.core().model()
    }

    fn model_id(&self) -> Option<String> {
        self.core().model_id()
    }

    fn order(&self) -> i32 {
        self.core().order()
    }

    fn intersection_parent(&self) -> Option<SetRef> {
        self.core().intersection_parent()
    }

    fn is_intersected_clone(&self) -> bool {
        self.core().is_clone()
    }

    /// The set's own models: the explicit list when given, otherwise the
    /// anchor model's children (detached children included). A set with
    /// neither is a contract violation: logged, empty.
    fn models(&self) -> Vec<Arc<ContentModel>> {
        let core = self.core();
        if let Some(models) = core.explicit_models() {
            return models;
        }
        if let Some(model) = core.model() {
            return model.children();
        }
        error!(
            id = core.id(),
            set_type = core.set_type(),
            "set defines neither models nor an anchor model"
        );
        Vec::new()
    }

    /// Own models, de-duplicated, restricted to the intersection parent's
    /// effective models by the overlapping-hierarchy relation.
    fn effective_models(&self) -> Vec<Arc<ContentModel>> {
        self.core().with_cache(
            |cache| cache.effective.clone(),
            |cache, value| cache.effective = Some(value),
            || {
                let own = unique_models(self.models());
                match self.intersection_parent() {
                    Some(parent) => {
                        filter_by_intersecting_hierarchy(&own, &parent.effective_models())
                    }
                    None => own,
                }
            },
        )
    }

    /// Effective models that are attached and available all the way up.
    fn available_models(&self) -> Vec<Arc<ContentModel>> {
        self.core().with_cache(
            |cache| cache.available.clone(),
            |cache, value| cache.available = Some(value),
            || {
                self.effective_models()
                    .into_iter()
                    .filter(is_available_in_hierarchy)
                    .collect()
            },
        )
    }

    fn components(&self) -> Vec<Arc<ContentModel>> {
        project_components(&self.effective_models())
    }

    fn available_components(&self) -> Vec<Arc<ContentModel>> {
        project_components(&self.available_models())
            .into_iter()
            .filter(is_available_in_hierarchy)
            .collect()
    }

    fn questions(&self) -> Vec<Arc<ContentModel>> {
        self.components()
            .into_iter()
            .filter(|model| model.is_question())
            .collect()
    }

    fn available_questions(&self) -> Vec<Arc<ContentModel>> {
        self.available_components()
            .into_iter()
            .filter(|model| model.is_question())
            .collect()
    }

    fn presentation_components(&self) -> Vec<Arc<ContentModel>> {
        self.components()
            .into_iter()
            .filter(|model| !model.is_question())
            .collect()
    }

    fn trackable_components(&self) -> Vec<Arc<ContentModel>> {
        self.components()
            .into_iter()
            .filter(|model| model.is_trackable())
            .collect()
    }

    fn is_enabled(&self) -> bool {
        true
    }

    fn is_optional(&self) -> bool {
        self.model().is_some_and(|model| model.is_optional())
    }

    fn is_available(&self) -> bool {
        self.model().is_none_or(|model| model.is_available())
    }

    /// Whether the set's own models are non-empty. Deliberately over the
    /// raw `models`, not the intersected view — an intersected clone with
    /// an empty effective scope is still populated. Emptiness after
    /// intersection is what [`SubsetExt::populated_intersected_subsets`]
    /// filters on.
    fn is_populated(&self) -> bool {
        !unique_models(self.models()).is_empty()
    }

    fn is_not_populated(&self) -> bool {
        !self.is_populated()
    }

    fn is_model_available_in_hierarchy(&self) -> bool {
        self.model()
            .is_some_and(|model| is_available_in_hierarchy(&model))
    }

    /// Probe for the scoring capability.
    fn as_scoring(&self) -> Option<&dyn ScoringSet> {
        None
    }
}

/// Flatten models to the components at or below them, in order, unique.
fn project_components(models: &[Arc<ContentModel>]) -> Vec<Arc<ContentModel>> {
    let mut out = Vec::new();
    for model in models {
        if model.model_type() == ContentType::Component {
            out.push(Arc::clone(model));
        } else {
            out.extend(
                crate::hierarchy::descendants(model)
                    .into_iter()
                    .filter(|descendant| descendant.model_type() == ContentType::Component),
            );
        }
    }
    unique_models(out)
}

/// Fold a chain of sets left to right via the intersection operator.
///
/// `intersect_chain([a, b, c])` yields a clone of `c` whose parent is
/// `b`-intersected-with-`a`; the result's concrete type is the rightmost
/// operand's.
pub fn intersect_chain(sets: &[SetRef]) -> Option<SetRef> {
    let mut iter = sets.iter();
    let first = iter.next()?.clone();
    Some(iter.fold(first, |acc, set| set.clone_with_parent(acc)))
}

/// Subset lookups: this-intersected clones of other registered sets.
///
/// These live on [`SetRef`] rather than the trait because the clones need
/// the receiving set itself as their intersection parent.
pub trait SubsetExt {
    /// The chain from the root ancestor to this set, inclusive.
    fn subset_path(&self) -> Vec<SetRef>;

    /// A this-intersected clone of the registered set with `id`.
    fn get_subset_by_id(&self, id: &str) -> Option<SetRef>;

    /// This-intersected clones of all registered sets of `set_type`.
    fn get_subsets_by_type(&self, set_type: &str) -> Vec<SetRef>;

    /// This-intersected clones of all registered sets whose models
    /// hierarchy-intersect the given model.
    fn get_subsets_by_intersecting_model_id(&self, model_id: &str) -> Vec<SetRef>;

    /// This-intersected clones of every other registered set.
    fn intersected_subsets(&self) -> Vec<SetRef>;

    /// As [`SubsetExt::intersected_subsets`], restricted to clones whose
    /// effective models are non-empty.
    fn populated_intersected_subsets(&self) -> Vec<SetRef>;
}

fn other_roots(set: &SetRef) -> Vec<SetRef> {
    let Some(ctx) = set.core().ctx() else {
        return Vec::new();
    };
    ctx.registry()
        .sets()
        .into_iter()
        .filter(|other| other.id() != set.id())
        .collect()
}

impl SubsetExt for SetRef {
    fn subset_path(&self) -> Vec<SetRef> {
        let mut chain = vec![self.clone()];
        let mut current = self.intersection_parent();
        while let Some(parent) = current {
            current = parent.intersection_parent();
            chain.push(parent);
        }
        chain.reverse();
        chain
    }

    fn get_subset_by_id(&self, id: &str) -> Option<SetRef> {
        if id == self.id() {
            return None;
        }
        let ctx = self.core().ctx()?;
        let other = ctx.registry().get(id)?;
        Some(other.clone_with_parent(self.clone()))
    }

    fn get_subsets_by_type(&self, set_type: &str) -> Vec<SetRef> {
        other_roots(self)
            .into_iter()
            .filter(|other| other.set_type() == set_type)
            .map(|other| other.clone_with_parent(self.clone()))
            .collect()
    }

    fn get_subsets_by_intersecting_model_id(&self, model_id: &str) -> Vec<SetRef> {
        let Some(model) = self
            .core()
            .ctx()
            .and_then(|ctx| ctx.tree().find_by_id(model_id))
        else {
            return Vec::new();
        };
        other_roots(self)
            .into_iter()
            .filter(|other| intersects_hierarchy(&model, &other.models()))
            .map(|other| other.clone_with_parent(self.clone()))
            .collect()
    }

    fn intersected_subsets(&self) -> Vec<SetRef> {
        other_roots(self)
            .into_iter()
            .map(|other| other.clone_with_parent(self.clone()))
            .collect()
    }

    fn populated_intersected_subsets(&self) -> Vec<SetRef> {
        self.intersected_subsets()
            .into_iter()
            .filter(|subset| !subset.effective_models().is_empty())
            .collect()
    }
}
