/// The lifecycle controller: routing rules and per-set status.
///
/// The controller subscribes to the content tree, implements the typed
/// observer sets trigger into, and owns the startup sequence. Everything
/// it decides lands in the renderer's phase queues; it is also the
/// renderer's dispatch target, so the per-set status vectors (phase,
/// `was_restored`, `was_complete`, `was_passed`) live here and nowhere
/// else.
///
/// Routing rules:
/// - model added → create its wrapper set
/// - model removed → deregister every set anchored to it
/// - tracked attribute change → `update` for all hierarchy-intersecting sets
/// - navigation → `leave` for sets local to the old location, `visit` for
///   sets local to the new one
/// - `set.update()` → `update` for sets intersecting its anchor
/// - `set.reset()` → `restart` for sets on the same anchor
/// - global reset → `reset` for everyone
///
/// Before the startup sequence has finished, attribute changes and
/// navigation are dropped on the floor; model add/remove is honored at
/// any time so the registry tracks the tree.
use crate::content::{ContentEvent, ContentModel};
use crate::context::ScoringContext;
use crate::error::{ScoringError, ScoringResult};
use crate::hierarchy::hierarchy_ids;
use crate::lifecycle::renderer::{PhaseHandler, PhaseRenderer};
use crate::lifecycle::{Phase, SetPhase, SetStatus};
use crate::sets::{IntersectionSet, LifecycleSet, ModelSet, SetObserver, SetRef};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Attribute changes that trigger an update pass.
const UPDATE_ATTRS: [&str; 4] = [
    "isAvailable",
    "isInteractionComplete",
    "isActive",
    "isVisited",
];

pub struct LifecycleController {
    ctx: Arc<ScoringContext>,
    renderer: Arc<PhaseRenderer>,
    status: DashMap<String, SetStatus>,
    started: AtomicBool,
    location: Mutex<Option<String>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl LifecycleController {
    /// Create the controller, install it as the context observer, and
    /// spawn the renderer consumer and the content-event pump.
    pub fn install(
        ctx: Arc<ScoringContext>,
        renderer: Arc<PhaseRenderer>,
    ) -> Arc<Self> {
        let controller = Arc::new(Self {
            ctx: Arc::clone(&ctx),
            renderer: Arc::clone(&renderer),
            status: DashMap::new(),
            started: AtomicBool::new(false),
            location: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
        });

        let observer: Arc<dyn SetObserver> = controller.clone();
        ctx.set_observer(Arc::downgrade(&observer));

        let handler: Arc<dyn PhaseHandler> = controller.clone();
        let consumer = renderer.spawn(handler);
        let pump = controller.clone().spawn_event_pump();
        let mut tasks = controller.tasks.lock().expect("tasks lock");
        tasks.push(consumer);
        tasks.push(pump);
        drop(tasks);

        controller
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Drop the status vector of a deregistered set.
    pub fn forget_status(&self, set_id: &str) {
        self.status.remove(set_id);
    }

    /// The status vector for a set, defaulting for unseen ids.
    pub fn status_of(&self, set_id: &str) -> SetStatus {
        self.status
            .get(set_id)
            .map(|entry| *entry.value())
            .unwrap_or_default()
    }

    /// Run the startup sequence: once offline storage is ready, drive
    /// every registered set through init → restore → start → update in a
    /// single batch, then open the gates for change events.
    pub async fn start(&self) {
        self.ctx.storage().ready().await;
        let all = self.ctx.registry().sets();
        info!(sets = all.len(), "lifecycle starting");
        self.renderer.enqueue(Phase::Init, all.clone());
        self.renderer.enqueue(Phase::Restore, all.clone());
        self.renderer.enqueue(Phase::Start, all.clone());
        self.renderer.enqueue(Phase::Update, all);
        self.renderer.wait_for_batch().await;
        self.started.store(true, Ordering::Release);
        self.ctx.bus().publish("scoring:restored", None);
        info!("lifecycle started");
    }

    /// Global reset: every registered set enters the reset phase.
    pub async fn reset_all(&self) {
        let all = self.ctx.registry().sets();
        self.renderer.render(Phase::Reset, all).await;
    }

    /// Recompute everything: every registered set enters update.
    pub async fn update_all(&self) {
        let all = self.ctx.registry().sets();
        self.renderer.render(Phase::Update, all).await;
    }

    /// Navigation change. Sets local to the previous content object get
    /// `leave`; sets local to the new one get `visit`.
    pub fn navigate(&self, to: Option<&str>) {
        let previous = {
            let mut location = self.location.lock().expect("location lock");
            std::mem::replace(&mut *location, to.map(str::to_string))
        };
        if !self.is_started() {
            return;
        }
        if let Some(previous) = previous {
            let leaving = self.local_sets(&previous);
            self.renderer.enqueue(Phase::Leave, leaving);
        }
        if let Some(current) = to {
            let visiting = self.local_sets(current);
            self.renderer.enqueue(Phase::Visit, visiting);
        }
    }

    /// A model-level reset request: restart every set anchored to it.
    pub fn model_reset(&self, model_id: &str) {
        if !self.is_started() {
            return;
        }
        let matching = self.sets_anchored_to(model_id);
        self.renderer.enqueue(Phase::Restart, matching);
    }

    /// Wait until the currently queued work has rendered.
    pub async fn settle(&self) {
        self.renderer.wait_for_batch().await;
    }

    /// Stop background tasks. Queued work is abandoned.
    pub fn shutdown(&self) {
        self.renderer.stop();
        for task in self.tasks.lock().expect("tasks lock").drain(..) {
            task.abort();
        }
    }

    fn spawn_event_pump(self: Arc<Self>) -> JoinHandle<()> {
        let mut events = self.ctx.tree().subscribe();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => self.on_content_event(event),
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "content event stream lagged");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    fn on_content_event(&self, event: ContentEvent) {
        match event {
            ContentEvent::Added { model, .. } => {
                self.ctx.bump_stamp();
                match ModelSet::create(&self.ctx, Arc::clone(&model)) {
                    Ok(_) => debug!(id = model.id(), "wrapper set created"),
                    Err(ScoringError::DuplicateSetId { id }) => {
                        warn!(id, "model id already registered as a set");
                    }
                    Err(err) => warn!(error = %err, "wrapper set creation failed"),
                }
            }
            ContentEvent::Removed { model, .. } => {
                self.ctx.bump_stamp();
                for set in self.sets_anchored_to(model.id()) {
                    self.ctx.deregister_set(set.id());
                    self.status.remove(set.id());
                }
            }
            ContentEvent::Change { model, attr, .. } => {
                self.ctx.bump_stamp();
                if !self.is_started() || !UPDATE_ATTRS.contains(&attr) {
                    return;
                }
                let intersecting = self.sets_intersecting(&model);
                self.renderer.enqueue(Phase::Update, intersecting);
            }
        }
    }

    /// Registered sets whose models hierarchy-intersect `model`.
    fn sets_intersecting(&self, model: &Arc<ContentModel>) -> Vec<SetRef> {
        self.ctx
            .registry()
            .sets()
            .into_iter()
            .filter(|set| hierarchy_ids(&set.models()).contains(model.id()))
            .collect()
    }

    fn sets_anchored_to(&self, model_id: &str) -> Vec<SetRef> {
        self.ctx
            .registry()
            .sets()
            .into_iter()
            .filter(|set| set.model_id().as_deref() == Some(model_id))
            .collect()
    }

    /// A set is local to a content object when it is anchored to it, or
    /// anchored to a descendant that is not itself another content
    /// object.
    fn local_sets(&self, location: &str) -> Vec<SetRef> {
        self.ctx
            .registry()
            .sets()
            .into_iter()
            .filter(|set| {
                let Some(model) = set.model() else {
                    return false;
                };
                if model.id() == location {
                    return true;
                }
                if model.is_type_group("contentobject") {
                    return false;
                }
                model
                    .ancestors(false)
                    .iter()
                    .any(|ancestor| ancestor.id() == location)
            })
            .collect()
    }

    fn update_status(&self, set_id: &str, apply: impl FnOnce(&mut SetStatus)) {
        let mut entry = self.status.entry(set_id.to_string()).or_default();
        apply(entry.value_mut());
    }
}

impl SetObserver for LifecycleController {
    fn set_updated(&self, set_id: &str) {
        if !self.is_started() {
            return;
        }
        let Some(set) = self.ctx.registry().get(set_id) else {
            return;
        };
        let targets = match set.model() {
            Some(model) => self.sets_intersecting(&model),
            None => vec![set],
        };
        self.renderer.enqueue(Phase::Update, targets);
    }

    fn set_reset(&self, set_id: &str) {
        if !self.is_started() {
            return;
        }
        let Some(set) = self.ctx.registry().get(set_id) else {
            return;
        };
        let targets = match set.model_id() {
            Some(model_id) => self.sets_anchored_to(&model_id),
            None => vec![set],
        };
        self.renderer.enqueue(Phase::Restart, targets);
    }
}

#[async_trait]
impl PhaseHandler for LifecycleController {
    async fn handle(&self, phase: Phase, set: SetRef) -> ScoringResult<()> {
        let id = set.id().to_string();
        match phase {
            Phase::Init => {
                set.on_init().await?;
                self.update_status(&id, |status| status.phase = SetPhase::Init);
            }
            Phase::Restore => {
                let restored = set.on_restore().await?;
                self.update_status(&id, |status| {
                    status.phase = SetPhase::Restored;
                    status.was_restored = restored;
                });
            }
            Phase::Start => {
                if !self.status_of(&id).was_restored {
                    set.on_start().await?;
                }
                self.update_status(&id, |status| status.phase = SetPhase::Started);
            }
            Phase::Reset => {
                let can_reset = set
                    .as_scoring()
                    .is_some_and(|scoring| scoring.can_reset());
                if can_reset {
                    self.update_status(&id, |status| status.phase = SetPhase::Resetting);
                    set.on_reset().await?;
                    self.update_status(&id, |status| {
                        status.phase = SetPhase::Started;
                        status.was_complete = false;
                        status.was_passed = false;
                    });
                }
            }
            Phase::Restart => {
                self.update_status(&id, |status| {
                    status.phase = SetPhase::Resetting;
                    status.was_complete = false;
                    status.was_passed = false;
                });
                set.on_start().await?;
                self.update_status(&id, |status| status.phase = SetPhase::Started);
            }
            Phase::Leave => {
                self.update_status(&id, |status| status.phase = SetPhase::Leaving);
                set.on_leave().await?;
            }
            Phase::Visit => {
                self.update_status(&id, |status| status.phase = SetPhase::Visiting);
                set.on_visit().await?;
            }
            Phase::Update => {
                self.update_status(&id, |status| status.phase = SetPhase::Updating);
                set.on_update().await?;
                if let Some(scoring) = set.as_scoring() {
                    let complete = scoring.is_complete();
                    let passed = scoring.is_passed();
                    let before = self.status_of(&id);
                    if complete && !before.was_complete {
                        scoring.on_completed();
                    }
                    if passed && !before.was_passed {
                        scoring.on_passed();
                    }
                    self.update_status(&id, |status| {
                        status.was_complete = complete;
                        status.was_passed = passed;
                    });
                }
            }
        }
        Ok(())
    }
}
