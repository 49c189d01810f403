/// The total set: one rollup across the whole course.
///
/// A singleton scoring set of type `total`, anchored to the course model.
/// Its members are the registered sets that opted in: `is_score_included`
/// sets contribute score, `is_completion_required` sets gate completion.
/// Its own models are the union of its members' models, which is what
/// lets the total itself be intersected (`#a-300 total` is the course
/// result restricted to one article); members of an intersected total are
/// re-intersected against it before summing.
use crate::config::Passmark;
use crate::context::ScoringContext;
use crate::error::ScoringResult;
use crate::hierarchy::{filter_by_intersecting_hierarchy, unique_models};
use crate::sets::{
    IntersectionSet, LifecycleSet, Objective, ScoringSet, SetCore, SetOptions, SetRef,
};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// The total drains after every contributing set in a batch.
const TOTAL_SET_ORDER: i32 = 1000;

pub struct TotalSet {
    core: SetCore,
    passmark: Passmark,
    objective: Option<Objective>,
}

impl TotalSet {
    pub const TYPE: &'static str = "total";

    /// Build and register the total from the course configuration. Called
    /// once course data is ready, so the course model can anchor it.
    pub fn create(ctx: &Arc<ScoringContext>) -> ScoringResult<Arc<Self>> {
        let config = ctx.config();
        let mut opts = SetOptions::new()
            .id(config.total_id())
            .order(TOTAL_SET_ORDER);
        if let Some(title) = &config.title {
            opts = opts.title(title.clone());
        }
        if let Some(course) = ctx.tree().course() {
            opts = opts.model(course);
        }
        let core = SetCore::build(ctx, Self::TYPE, TOTAL_SET_ORDER, opts);
        let objective = Objective::new(core.id(), Arc::clone(ctx.storage()));
        let set = Arc::new(Self {
            core,
            passmark: config.passmark.clone(),
            objective: Some(objective),
        });
        let set_ref: SetRef = set.clone();
        set.core.bind_self(&set_ref);
        ctx.register_set(set_ref)?;
        debug!(id = set.id(), "total set created");
        Ok(set)
    }

    /// Registered sets contributing by the given capability flag,
    /// excluding the total itself.
    fn candidates(&self, by_score: bool) -> Vec<SetRef> {
        let Some(ctx) = self.core.ctx() else {
            return Vec::new();
        };
        ctx.registry()
            .sets()
            .into_iter()
            .filter(|set| set.id() != self.id())
            .filter(|set| {
                set.as_scoring().is_some_and(|scoring| {
                    if by_score {
                        scoring.is_score_included()
                    } else {
                        scoring.is_completion_required()
                    }
                })
            })
            .collect()
    }

    /// Restrict candidates to this total's effective scope, re-intersecting
    /// each member when the total is itself an intersected clone.
    fn members(&self, by_score: bool) -> Vec<SetRef> {
        let scope = self.effective_models();
        let rescope_to = self
            .is_intersected_clone()
            .then(|| self.core.self_ref())
            .flatten();
        self.candidates(by_score)
            .into_iter()
            .filter(|set| !filter_by_intersecting_hierarchy(&set.models(), &scope).is_empty())
            .map(|set| match &rescope_to {
                Some(total) => set.clone_with_parent(total.clone()),
                None => set,
            })
            .collect()
    }

    /// The score-contributing member sets, in lifecycle order.
    pub fn scoring_sets(&self) -> Vec<SetRef> {
        self.members(true)
    }

    /// The completion-gating member sets, in lifecycle order.
    pub fn completion_sets(&self) -> Vec<SetRef> {
        self.members(false)
    }

    pub fn passmark(&self) -> &Passmark {
        &self.passmark
    }

    fn sum_scoring<F>(&self, f: F) -> f64
    where
        F: Fn(&dyn ScoringSet) -> f64,
    {
        self.scoring_sets()
            .iter()
            .filter_map(|set| set.as_scoring().map(&f))
            .sum()
    }

    fn display_title(&self) -> String {
        self.title().unwrap_or_else(|| self.id().to_string())
    }
}

impl IntersectionSet for TotalSet {
    fn core(&self) -> &SetCore {
        &self.core
    }

    fn clone_with_parent(&self, parent: SetRef) -> SetRef {
        let clone = Arc::new(Self {
            core: self.core.for_clone(parent),
            passmark: self.passmark.clone(),
            objective: None,
        });
        let clone_ref: SetRef = clone.clone();
        clone.core.bind_self(&clone_ref);
        clone_ref
    }

    /// The union of every contributing set's models, de-duplicated.
    fn models(&self) -> Vec<Arc<crate::content::ContentModel>> {
        let mut all = Vec::new();
        for set in self.candidates(true) {
            all.extend(set.models());
        }
        for set in self.candidates(false) {
            all.extend(set.models());
        }
        unique_models(all)
    }

    fn as_scoring(&self) -> Option<&dyn ScoringSet> {
        Some(self)
    }
}

#[async_trait]
impl LifecycleSet for TotalSet {
    async fn on_init(&self) -> ScoringResult<()> {
        if let Some(objective) = &self.objective {
            objective.write_description(&self.display_title());
        }
        Ok(())
    }
}

impl ScoringSet for TotalSet {
    fn min_score(&self) -> f64 {
        self.sum_scoring(|set| set.min_score())
    }

    fn max_score(&self) -> f64 {
        self.sum_scoring(|set| set.max_score())
    }

    fn score(&self) -> f64 {
        self.sum_scoring(|set| set.score())
    }

    fn correctness(&self) -> usize {
        self.scoring_sets()
            .iter()
            .filter_map(|set| set.as_scoring().map(|s| s.correctness()))
            .sum()
    }

    fn max_correctness(&self) -> usize {
        self.scoring_sets()
            .iter()
            .filter_map(|set| set.as_scoring().map(|s| s.max_correctness()))
            .sum()
    }

    /// Complete iff every completion-gating member is complete.
    fn is_complete(&self) -> bool {
        self.completion_sets()
            .iter()
            .all(|set| set.as_scoring().is_some_and(|s| s.is_complete()))
    }

    fn is_passed(&self) -> bool {
        if !self.passmark.is_enabled {
            return false;
        }
        let threshold_met = if self.passmark.is_scaled {
            self.scaled_score() as f64 >= self.passmark.score
                && self.scaled_correctness() as f64 >= self.passmark.correctness
        } else {
            self.score() >= self.passmark.score
                && self.correctness() as f64 >= self.passmark.correctness
        };
        if !threshold_met {
            return false;
        }
        if self.passmark.requires_passed_subsets {
            return self
                .scoring_sets()
                .iter()
                .all(|set| set.as_scoring().is_some_and(|s| s.is_passed()));
        }
        true
    }

    fn is_failed(&self) -> bool {
        self.is_complete() && !self.is_passed() && !self.can_reset()
    }

    /// The course can be retaken while any contributing set can reset.
    fn can_reset(&self) -> bool {
        self.scoring_sets()
            .iter()
            .any(|set| set.as_scoring().is_some_and(|s| s.can_reset()))
    }

    fn objective(&self) -> Option<&Objective> {
        self.objective.as_ref()
    }

    /// As the generic hook, plus the course-level `scoring:complete`.
    fn on_completed(&self) {
        if self.is_intersected_clone() {
            return;
        }
        self.core.emit(&format!(
            "scoring:{0}:complete scoring:set:complete scoring:complete",
            self.set_type()
        ));
        if let Some(objective) = &self.objective {
            objective.write_score(crate::offline::ObjectiveScore {
                score: self.score(),
                min_score: self.min_score(),
                max_score: self.max_score(),
            });
            let success = if self.is_passed() {
                crate::offline::SuccessStatus::Passed
            } else {
                crate::offline::SuccessStatus::Failed
            };
            objective.write_status(crate::offline::ObjectiveStatus {
                completion: crate::offline::CompletionStatus::Completed,
                success: Some(success),
            });
        }
    }

    /// As the generic hook, plus the course-level `scoring:pass`.
    fn on_passed(&self) {
        if self.is_intersected_clone() {
            return;
        }
        self.core.emit(&format!(
            "scoring:{0}:passed scoring:set:passed scoring:pass",
            self.set_type()
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScoringConfig;
    use crate::content::{ContentModel, ContentTree, ContentType, ModelFlag};
    use crate::offline::OfflineStorage;
    use crate::sets::{ModelScoringOptions, ModelScoringSet, ModelSet};

    /// course → (a-1 → b-1 → q-1 q-2), (a-2 → b-2 → q-3 q-4), one scoring
    /// set per article.
    fn fixture(config: ScoringConfig) -> (Arc<ScoringContext>, Arc<ContentTree>) {
        let tree = Arc::new(ContentTree::new());
        tree.add(ContentModel::new("course", ContentType::Course), None)
            .unwrap();
        for (article, block, qs) in [
            ("a-1", "b-1", ["q-1", "q-2"]),
            ("a-2", "b-2", ["q-3", "q-4"]),
        ] {
            tree.add(ContentModel::new(article, ContentType::Article), Some("course"))
                .unwrap();
            tree.add(ContentModel::new(block, ContentType::Block), Some(article))
                .unwrap();
            for q in qs {
                tree.add(ContentModel::question(q, "mcq"), Some(block)).unwrap();
            }
        }
        let ctx = ScoringContext::new(
            Arc::clone(&tree),
            Arc::new(OfflineStorage::ready_now()),
            config,
        );
        for (id, qs) in [("first", ["q-1", "q-2"]), ("second", ["q-3", "q-4"])] {
            ModelScoringSet::create(
                &ctx,
                ModelScoringOptions::new().set_type("assessment").set(
                    SetOptions::new()
                        .id(id)
                        .models(qs.iter().map(|q| tree.find_by_id(q).unwrap()).collect()),
                ),
            )
            .unwrap();
        }
        (ctx, tree)
    }

    fn answer(tree: &ContentTree, id: &str, score: f64, correct: bool) {
        let q = tree.find_by_id(id).unwrap();
        q.set_score(score);
        q.set_flag(ModelFlag::IsCorrect, correct);
        q.set_flag(ModelFlag::IsInteractionComplete, true);
    }

    #[test]
    fn test_sums_across_member_sets() {
        let (ctx, tree) = fixture(ScoringConfig::default());
        let total = TotalSet::create(&ctx).unwrap();

        assert_eq!(total.max_score(), 4.0);
        answer(&tree, "q-1", 1.0, true);
        answer(&tree, "q-3", 1.0, true);
        ctx.bump_stamp();

        assert_eq!(total.score(), 2.0);
        assert_eq!(total.correctness(), 2);
        assert_eq!(total.max_correctness(), 4);
        assert_eq!(total.scaled_score(), 50);
    }

    #[test]
    fn test_complete_requires_every_member() {
        let (ctx, tree) = fixture(ScoringConfig::default());
        let total = TotalSet::create(&ctx).unwrap();
        assert!(!total.is_complete());

        for q in ["q-1", "q-2"] {
            answer(&tree, q, 1.0, true);
        }
        ctx.bump_stamp();
        assert!(!total.is_complete());

        for q in ["q-3", "q-4"] {
            answer(&tree, q, 0.0, false);
        }
        ctx.bump_stamp();
        assert!(total.is_complete());
    }

    #[test]
    fn test_passmark_score_and_correctness_both_gate() {
        let (ctx, tree) = fixture(ScoringConfig::default());
        let total = TotalSet::create(&ctx).unwrap();

        // 3 of 4: 75% on both axes, above the 60/60 default.
        for q in ["q-1", "q-2", "q-3"] {
            answer(&tree, q, 1.0, true);
        }
        ctx.bump_stamp();
        assert!(total.is_passed());

        // Score high but correctness low: q-4 scores without being correct.
        answer(&tree, "q-4", 1.0, false);
        for q in ["q-2", "q-3"] {
            let model = tree.find_by_id(q).unwrap();
            model.set_flag(ModelFlag::IsCorrect, false);
        }
        ctx.bump_stamp();
        assert_eq!(total.scaled_score(), 100);
        assert_eq!(total.scaled_correctness(), 25);
        assert!(!total.is_passed());
    }

    #[test]
    fn test_requires_passed_subsets() {
        let mut config = ScoringConfig::default();
        config.passmark.requires_passed_subsets = true;
        let (ctx, tree) = fixture(config);
        let total = TotalSet::create(&ctx).unwrap();

        // Everything right in the first set, 1 of 2 in the second:
        // overall 75% ≥ 60, but the second subset sits at 50%.
        answer(&tree, "q-1", 1.0, true);
        answer(&tree, "q-2", 1.0, true);
        answer(&tree, "q-3", 1.0, true);
        answer(&tree, "q-4", 0.0, false);
        ctx.bump_stamp();
        assert!(!total.is_passed());

        answer(&tree, "q-4", 1.0, true);
        ctx.bump_stamp();
        assert!(total.is_passed());
    }

    #[test]
    fn test_optional_member_drops_out_of_total() {
        let (ctx, tree) = fixture(ScoringConfig::default());
        let total = TotalSet::create(&ctx).unwrap();
        assert_eq!(total.max_score(), 4.0);

        // Anchor the second set to a-2 and make the article optional.
        ctx.deregister_set("second").unwrap();
        ModelScoringSet::create(
            &ctx,
            ModelScoringOptions::new().set_type("assessment").set(
                SetOptions::new()
                    .id("second")
                    .model(tree.find_by_id("a-2").unwrap())
                    .models(
                        ["q-3", "q-4"]
                            .iter()
                            .map(|q| tree.find_by_id(q).unwrap())
                            .collect(),
                    ),
            ),
        )
        .unwrap();
        tree.find_by_id("a-2")
            .unwrap()
            .set_flag(ModelFlag::IsOptional, true);
        ctx.bump_stamp();

        assert_eq!(total.max_score(), 2.0);
        assert_eq!(total.max_correctness(), 2);
    }

    #[test]
    fn test_intersected_total_rescopes_members() {
        let (ctx, tree) = fixture(ScoringConfig::default());
        let total = TotalSet::create(&ctx).unwrap();
        for q in ["q-1", "q-2", "q-3", "q-4"] {
            answer(&tree, q, 1.0, true);
        }
        ctx.bump_stamp();
        assert_eq!(total.score(), 4.0);

        // Restrict the total to article a-1: only q-1/q-2 contribute.
        let article: SetRef =
            ModelSet::create(&ctx, tree.find_by_id("a-1").unwrap()).unwrap();
        let total_ref: SetRef = total.clone();
        let scoped = total_ref.clone_with_parent(article);
        let scoped_scoring = scoped.as_scoring().unwrap();
        assert_eq!(scoped_scoring.score(), 2.0);
        assert_eq!(scoped_scoring.max_score(), 2.0);
        assert!(scoped.is_intersected_clone());
    }

    #[test]
    fn test_failed_needs_no_reset_available() {
        let (ctx, tree) = fixture(ScoringConfig::default());
        let total = TotalSet::create(&ctx).unwrap();

        // Complete with a failing score.
        for q in ["q-1", "q-2", "q-3", "q-4"] {
            answer(&tree, q, 0.0, false);
        }
        ctx.bump_stamp();
        assert!(total.is_complete());
        assert!(!total.is_passed());
        assert!(total.is_failed());

        // A resettable subset means the course is retakeable, not failed.
        ctx.deregister_set("first").unwrap();
        ModelScoringSet::create(
            &ctx,
            ModelScoringOptions::new()
                .set_type("assessment")
                .resettable(true)
                .set(
                    SetOptions::new().id("first").models(
                        ["q-1", "q-2"]
                            .iter()
                            .map(|q| tree.find_by_id(q).unwrap())
                            .collect(),
                    ),
                ),
        )
        .unwrap();
        ctx.bump_stamp();
        assert!(total.can_reset());
        assert!(!total.is_failed());
    }
}
