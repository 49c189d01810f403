/// The per-model wrapper set.
///
/// The controller creates one of these for every content model added to
/// the tree, which is what makes single models addressable by the query
/// language (`#a-300`, `model[modelType=article]`). The set's id is the
/// model's id and its models are the model itself; its hierarchy
/// neighborhood arrives through intersection, not membership.
///
/// Model sets are non-scoring and their lifecycle hooks are deliberate
/// no-ops: a wrapper has nothing to restore and nothing to announce.
use crate::content::ContentModel;
use crate::context::ScoringContext;
use crate::error::ScoringResult;
use crate::sets::{IntersectionSet, LifecycleSet, SetCore, SetOptions, SetRef};
use async_trait::async_trait;
use std::sync::Arc;

/// Wrapper sets run before everything else, deepest models first.
const MODEL_SET_BASE_ORDER: i32 = 100;

pub struct ModelSet {
    core: SetCore,
}

impl ModelSet {
    pub const TYPE: &'static str = "model";

    /// Wrap `model` and register. The set id is the model id; the order is
    /// `100 − depth` so descendants run before their ancestors.
    pub fn create(
        ctx: &Arc<ScoringContext>,
        model: Arc<ContentModel>,
    ) -> ScoringResult<Arc<Self>> {
        let depth = model.ancestors(false).len() as i32;
        let core = SetCore::build(
            ctx,
            Self::TYPE,
            MODEL_SET_BASE_ORDER - depth,
            SetOptions::new()
                .id(model.id())
                .models(vec![Arc::clone(&model)])
                .model(model),
        );
        let set = Arc::new(Self { core });
        let set_ref: SetRef = set.clone();
        set.core.bind_self(&set_ref);
        ctx.register_set(set_ref)?;
        Ok(set)
    }
}

impl IntersectionSet for ModelSet {
    fn core(&self) -> &SetCore {
        &self.core
    }

    fn clone_with_parent(&self, parent: SetRef) -> SetRef {
        let clone = Arc::new(Self {
            core: self.core.for_clone(parent),
        });
        let clone_ref: SetRef = clone.clone();
        clone.core.bind_self(&clone_ref);
        clone_ref
    }
}

#[async_trait]
impl LifecycleSet for ModelSet {
    // A wrapper set restores nothing and does not announce the attempt.
    async fn on_restore(&self) -> ScoringResult<bool> {
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScoringConfig;
    use crate::content::{ContentTree, ContentType};
    use crate::offline::OfflineStorage;
    use crate::sets::SubsetExt;

    fn fixture() -> (Arc<ScoringContext>, Arc<ContentTree>) {
        let tree = Arc::new(ContentTree::new());
        tree.add(ContentModel::new("course", ContentType::Course), None)
            .unwrap();
        tree.add(ContentModel::new("a-1", ContentType::Article), Some("course"))
            .unwrap();
        tree.add(ContentModel::new("b-1", ContentType::Block), Some("a-1"))
            .unwrap();
        tree.add(ContentModel::question("q-1", "mcq"), Some("b-1"))
            .unwrap();
        let ctx = ScoringContext::new(
            Arc::clone(&tree),
            Arc::new(OfflineStorage::ready_now()),
            ScoringConfig::default(),
        );
        (ctx, tree)
    }

    #[test]
    fn test_wraps_model_under_its_own_id() {
        let (ctx, tree) = fixture();
        let a1 = tree.find_by_id("a-1").unwrap();
        let set = ModelSet::create(&ctx, a1).unwrap();

        assert_eq!(set.id(), "a-1");
        assert_eq!(set.set_type(), "model");
        assert_eq!(set.model_id().as_deref(), Some("a-1"));
        let models = set.models();
        assert_eq!(models.len(), 1);
        assert_eq!(models[0].id(), "a-1");
        assert!(ctx.registry().contains("a-1"));
    }

    #[test]
    fn test_order_puts_descendants_first() {
        let (ctx, tree) = fixture();
        let course = ModelSet::create(&ctx, tree.find_by_id("course").unwrap()).unwrap();
        let block = ModelSet::create(&ctx, tree.find_by_id("b-1").unwrap()).unwrap();
        let question = ModelSet::create(&ctx, tree.find_by_id("q-1").unwrap()).unwrap();

        assert_eq!(course.order(), 100);
        assert_eq!(block.order(), 98);
        assert_eq!(question.order(), 97);
        assert!(question.order() < block.order());
    }

    #[test]
    fn test_clone_is_unregistered_same_type() {
        let (ctx, tree) = fixture();
        let a1: SetRef = ModelSet::create(&ctx, tree.find_by_id("a-1").unwrap()).unwrap();
        let course: SetRef = ModelSet::create(&ctx, tree.find_by_id("course").unwrap()).unwrap();

        let clone = a1.clone_with_parent(course.clone());
        assert!(clone.is_intersected_clone());
        assert_eq!(clone.set_type(), "model");
        assert_eq!(clone.id(), "a-1");
        assert_eq!(ctx.registry().len(), 2);
    }

    #[test]
    fn test_subset_lookups_exclude_self() {
        let (ctx, tree) = fixture();
        let a1: SetRef = ModelSet::create(&ctx, tree.find_by_id("a-1").unwrap()).unwrap();
        let _b1: SetRef = ModelSet::create(&ctx, tree.find_by_id("b-1").unwrap()).unwrap();
        let _q1: SetRef = ModelSet::create(&ctx, tree.find_by_id("q-1").unwrap()).unwrap();

        let subsets = a1.intersected_subsets();
        assert_eq!(subsets.len(), 2);
        assert!(subsets.iter().all(|s| s.is_intersected_clone()));
        assert!(subsets.iter().all(|s| s.id() != "a-1"));

        assert!(a1.get_subset_by_id("a-1").is_none());
        assert_eq!(a1.get_subset_by_id("b-1").unwrap().id(), "b-1");
    }

    #[test]
    fn test_subsets_by_intersecting_model_id() {
        let (ctx, tree) = fixture();
        let course: SetRef = ModelSet::create(&ctx, tree.find_by_id("course").unwrap()).unwrap();
        let _a1: SetRef = ModelSet::create(&ctx, tree.find_by_id("a-1").unwrap()).unwrap();
        let _q1: SetRef = ModelSet::create(&ctx, tree.find_by_id("q-1").unwrap()).unwrap();

        // Both the article and question wrappers overlap b-1's hierarchy.
        let subsets = course.get_subsets_by_intersecting_model_id("b-1");
        let mut ids: Vec<&str> = subsets.iter().map(|s| s.id()).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec!["a-1", "q-1"]);

        assert!(course
            .get_subsets_by_intersecting_model_id("missing")
            .is_empty());
    }

    #[test]
    fn test_effective_models_intersect_parent() {
        let (ctx, tree) = fixture();
        let a1: SetRef = ModelSet::create(&ctx, tree.find_by_id("a-1").unwrap()).unwrap();
        let q1: SetRef = ModelSet::create(&ctx, tree.find_by_id("q-1").unwrap()).unwrap();

        // q-1 is a descendant of a-1, so the wrapper intersects.
        let subset = q1.clone_with_parent(a1.clone());
        assert_eq!(subset.effective_models().len(), 1);
        assert!(subset.is_populated());
    }
}
