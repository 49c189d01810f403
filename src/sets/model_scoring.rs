/// The minimal concrete scoring set.
///
/// Anchored to a model (or an explicit model list), it scores whatever
/// questions fall inside it: complete when every available question has
/// been interacted with, passed against its own passmark (defaulting to
/// the course passmark). Restoration persists per-question interaction
/// and correctness flags plus raw scores, enough to rebuild the rollup in
/// a fresh session.
///
/// Richer behaviors (attempt counting, banking, randomization) belong to
/// host-defined set types; this one implements the abstract contract and
/// nothing else.
use crate::config::Passmark;
use crate::context::ScoringContext;
use crate::error::ScoringResult;
use crate::offline::{CompletionStatus, ObjectiveStatus};
use crate::sets::{
    IntersectionSet, LifecycleSet, Objective, ScoringSet, SetCore, SetOptions, SetRef,
};
use crate::state::{State, StateValue};
use async_trait::async_trait;
use std::sync::Arc;

/// Scoring sets run after the wrapper sets they aggregate.
const SCORING_SET_ORDER: i32 = 500;

/// Construction options for [`ModelScoringSet`].
#[derive(Clone)]
pub struct ModelScoringOptions {
    pub set: SetOptions,
    /// Type string for events and queries. Defaults to `"scoring"`.
    pub set_type: String,
    /// Pass thresholds; `None` adopts the course passmark.
    pub passmark: Option<Passmark>,
    /// Raw config flag behind `is_score_included`.
    pub is_score_included: bool,
    /// Raw config flag behind `is_completion_required`.
    pub is_completion_required: bool,
    /// Whether this set may clear its state and be retaken.
    pub can_reset: bool,
}

impl Default for ModelScoringOptions {
    fn default() -> Self {
        Self {
            set: SetOptions::new(),
            set_type: "scoring".to_string(),
            passmark: None,
            is_score_included: true,
            is_completion_required: true,
            can_reset: false,
        }
    }
}

impl ModelScoringOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, set: SetOptions) -> Self {
        self.set = set;
        self
    }

    pub fn set_type(mut self, set_type: impl Into<String>) -> Self {
        self.set_type = set_type.into();
        self
    }

    pub fn passmark(mut self, passmark: Passmark) -> Self {
        self.passmark = Some(passmark);
        self
    }

    pub fn score_included(mut self, included: bool) -> Self {
        self.is_score_included = included;
        self
    }

    pub fn completion_required(mut self, required: bool) -> Self {
        self.is_completion_required = required;
        self
    }

    pub fn resettable(mut self, can_reset: bool) -> Self {
        self.can_reset = can_reset;
        self
    }
}

pub struct ModelScoringSet {
    core: SetCore,
    passmark: Passmark,
    score_included: bool,
    completion_required: bool,
    resettable: bool,
    objective: Option<Objective>,
    state: Option<State>,
}

impl ModelScoringSet {
    /// Build and register a root scoring set.
    pub fn create(
        ctx: &Arc<ScoringContext>,
        opts: ModelScoringOptions,
    ) -> ScoringResult<Arc<Self>> {
        let passmark = opts
            .passmark
            .unwrap_or_else(|| ctx.config().passmark.clone());
        let core = SetCore::build(ctx, opts.set_type, SCORING_SET_ORDER, opts.set);
        let objective = Objective::new(core.id(), Arc::clone(ctx.storage()));
        let state = State::new(core.set_type(), core.id(), Arc::clone(ctx.storage()));
        let set = Arc::new(Self {
            core,
            passmark,
            score_included: opts.is_score_included,
            completion_required: opts.is_completion_required,
            resettable: opts.can_reset,
            objective: Some(objective),
            state: Some(state),
        });
        let set_ref: SetRef = set.clone();
        set.core.bind_self(&set_ref);
        ctx.register_set(set_ref)?;
        Ok(set)
    }

    fn display_title(&self) -> String {
        self.title().unwrap_or_else(|| self.id().to_string())
    }

    /// Snapshot per-question restoration state, question order.
    fn state_snapshot(&self) -> StateValue {
        let questions = self.questions();
        StateValue::Nested(vec![
            StateValue::Booleans(
                questions
                    .iter()
                    .map(|q| q.is_interaction_complete())
                    .collect(),
            ),
            StateValue::Booleans(questions.iter().map(|q| q.is_correct()).collect()),
            StateValue::Numbers(questions.iter().map(|q| q.score()).collect()),
        ])
    }

    /// Apply a restoration blob back onto the question models. Shape
    /// mismatches (content changed between sessions) restore nothing.
    fn apply_state(&self, value: &StateValue) -> bool {
        use crate::content::ModelFlag;
        let StateValue::Nested(rows) = value else {
            return false;
        };
        let [StateValue::Booleans(interacted), StateValue::Booleans(correct), StateValue::Numbers(scores)] =
            rows.as_slice()
        else {
            return false;
        };
        let questions = self.questions();
        if questions.len() != interacted.len()
            || questions.len() != correct.len()
            || questions.len() != scores.len()
        {
            return false;
        }
        for (i, question) in questions.iter().enumerate() {
            question.set_flag(ModelFlag::IsInteractionComplete, interacted[i]);
            question.set_flag(ModelFlag::IsCorrect, correct[i]);
            question.set_score(scores[i]);
        }
        true
    }
}

impl IntersectionSet for ModelScoringSet {
    fn core(&self) -> &SetCore {
        &self.core
    }

    fn clone_with_parent(&self, parent: SetRef) -> SetRef {
        let clone = Arc::new(Self {
            core: self.core.for_clone(parent),
            passmark: self.passmark.clone(),
            score_included: self.score_included,
            completion_required: self.completion_required,
            resettable: self.resettable,
            // Clones never touch objectives or state.
            objective: None,
            state: None,
        });
        let clone_ref: SetRef = clone.clone();
        clone.core.bind_self(&clone_ref);
        clone_ref
    }

    fn as_scoring(&self) -> Option<&dyn ScoringSet> {
        Some(self)
    }
}

#[async_trait]
impl LifecycleSet for ModelScoringSet {
    async fn on_init(&self) -> ScoringResult<()> {
        if let Some(objective) = &self.objective {
            objective.write_description(&self.display_title());
        }
        Ok(())
    }

    async fn on_restore(&self) -> ScoringResult<bool> {
        let restored = self
            .state
            .as_ref()
            .and_then(|state| state.load())
            .map(|value| self.apply_state(&value))
            .unwrap_or(false);
        self.core.emit(&format!(
            "scoring:{}:restored scoring:set:restored",
            self.set_type()
        ));
        Ok(restored)
    }

    async fn on_update(&self) -> ScoringResult<()> {
        self.save_state()
    }

    async fn on_reset(&self) -> ScoringResult<()> {
        use crate::content::ModelFlag;
        if !ScoringSet::can_reset(self) {
            return Ok(());
        }
        for question in self.questions() {
            question.set_flag(ModelFlag::IsInteractionComplete, false);
            question.set_flag(ModelFlag::IsCorrect, false);
            question.set_score(0.0);
        }
        if let Some(state) = &self.state {
            state.clear();
        }
        if let Some(objective) = &self.objective {
            objective.write_status(ObjectiveStatus {
                completion: CompletionStatus::Incomplete,
                success: None,
            });
        }
        Ok(())
    }
}

impl ScoringSet for ModelScoringSet {
    fn score_included_config(&self) -> bool {
        self.score_included
    }

    fn completion_required_config(&self) -> bool {
        self.completion_required
    }

    fn is_complete(&self) -> bool {
        let questions = self.available_questions();
        if questions.is_empty() {
            return self.model().is_some_and(|model| model.is_complete());
        }
        questions.iter().all(|q| q.is_interaction_complete())
    }

    fn is_passed(&self) -> bool {
        if !self.passmark.is_enabled {
            // A set that does not evaluate passing passes by completing.
            return self.is_complete();
        }
        if self.passmark.is_scaled {
            self.scaled_score() as f64 >= self.passmark.score
                && self.scaled_correctness() as f64 >= self.passmark.correctness
        } else {
            self.score() >= self.passmark.score
                && self.correctness() as f64 >= self.passmark.correctness
        }
    }

    fn can_reset(&self) -> bool {
        self.resettable
    }

    fn objective(&self) -> Option<&Objective> {
        self.objective.as_ref()
    }

    fn save_state(&self) -> ScoringResult<()> {
        match &self.state {
            Some(state) => state.save(&self.state_snapshot()),
            None => Ok(()),
        }
    }
}
