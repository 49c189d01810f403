/// Reference content-model port.
///
/// The engine consumes a tree of content models (course → menu/page →
/// article → block → component) owned by the host runtime. This module is
/// the in-process stand-in for that tree: typed nodes with mutable state
/// flags, parent/child links, type-group membership, tracking positions,
/// and a change-event stream. An embedding host projects its own model
/// store into this surface; the engine core only ever touches the public
/// methods here.
///
/// Mutations go through the node (`set_flag`, `set_score`, …) and are
/// published on the tree's broadcast channel as they happen, which is what
/// drives the lifecycle controller.
use crate::error::{ScoringError, ScoringResult};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, Weak};
use tokio::sync::broadcast;

/// Capacity of the change-event broadcast channel.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// The node kinds of a content tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Course,
    Menu,
    Page,
    Article,
    Block,
    Component,
}

impl ContentType {
    /// The wire name of this type, as used in queries (`modelType=article`).
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Course => "course",
            ContentType::Menu => "menu",
            ContentType::Page => "page",
            ContentType::Article => "article",
            ContentType::Block => "block",
            ContentType::Component => "component",
        }
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The mutable boolean attributes of a content model.
///
/// The `as_str` names double as the `change:<attr>` event suffixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelFlag {
    IsAvailable,
    IsComplete,
    IsInteractionComplete,
    IsActive,
    IsVisited,
    IsCorrect,
    IsOptional,
    IsTrackable,
}

impl ModelFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelFlag::IsAvailable => "isAvailable",
            ModelFlag::IsComplete => "isComplete",
            ModelFlag::IsInteractionComplete => "isInteractionComplete",
            ModelFlag::IsActive => "isActive",
            ModelFlag::IsVisited => "isVisited",
            ModelFlag::IsCorrect => "isCorrect",
            ModelFlag::IsOptional => "isOptional",
            ModelFlag::IsTrackable => "isTrackable",
        }
    }
}

/// Snapshot of a model's mutable attribute block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelAttributes {
    pub is_available: bool,
    pub is_complete: bool,
    pub is_interaction_complete: bool,
    pub is_active: bool,
    pub is_visited: bool,
    pub is_correct: bool,
    pub is_optional: bool,
    pub is_trackable: bool,
    pub score: f64,
    pub min_score: f64,
    pub max_score: f64,
}

impl Default for ModelAttributes {
    fn default() -> Self {
        Self {
            is_available: true,
            is_complete: false,
            is_interaction_complete: false,
            is_active: false,
            is_visited: false,
            is_correct: false,
            is_optional: false,
            is_trackable: true,
            score: 0.0,
            min_score: 0.0,
            max_score: 0.0,
        }
    }
}

/// A change event published by the tree.
#[derive(Debug, Clone)]
pub enum ContentEvent {
    /// A model was added to the tree.
    Added {
        model: Arc<ContentModel>,
        at: DateTime<Utc>,
    },
    /// A model was removed (detached) from the tree.
    Removed {
        model: Arc<ContentModel>,
        at: DateTime<Utc>,
    },
    /// A mutable attribute changed value. `attr` is the wire name, so the
    /// full topic form is `change:<attr>`.
    Change {
        model: Arc<ContentModel>,
        attr: &'static str,
        at: DateTime<Utc>,
    },
}

impl ContentEvent {
    /// The model this event concerns.
    pub fn model(&self) -> &Arc<ContentModel> {
        match self {
            ContentEvent::Added { model, .. }
            | ContentEvent::Removed { model, .. }
            | ContentEvent::Change { model, .. } => model,
        }
    }
}

/// A single node of the content tree.
///
/// Nodes are shared via `Arc`; identity is the unique `id`. The attribute
/// block is interior-mutable and every effective mutation is published on
/// the owning tree's event channel. A node detached from its tree keeps its
/// state but stops publishing.
pub struct ContentModel {
    id: String,
    model_type: ContentType,
    component: Option<String>,
    is_question: bool,
    attrs: RwLock<ModelAttributes>,
    parent: RwLock<Weak<ContentModel>>,
    children: RwLock<Vec<Arc<ContentModel>>>,
    attached: AtomicBool,
    tracking_position: RwLock<Option<String>>,
    events: RwLock<Option<broadcast::Sender<ContentEvent>>>,
}

impl std::fmt::Debug for ContentModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentModel")
            .field("id", &self.id)
            .field("type", &self.model_type)
            .field("component", &self.component)
            .field("is_question", &self.is_question)
            .field("attached", &self.is_attached())
            .finish()
    }
}

impl ContentModel {
    fn build(
        id: String,
        model_type: ContentType,
        component: Option<String>,
        is_question: bool,
        attrs: ModelAttributes,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            model_type,
            component,
            is_question,
            attrs: RwLock::new(attrs),
            parent: RwLock::new(Weak::new()),
            children: RwLock::new(Vec::new()),
            attached: AtomicBool::new(false),
            tracking_position: RwLock::new(None),
            events: RwLock::new(None),
        })
    }

    /// Create a detached node of the given type.
    pub fn new(id: impl Into<String>, model_type: ContentType) -> Arc<Self> {
        Self::build(id.into(), model_type, None, false, ModelAttributes::default())
    }

    /// Create a presentation component (text, graphic, …).
    pub fn component(id: impl Into<String>, kind: impl Into<String>) -> Arc<Self> {
        Self::build(
            id.into(),
            ContentType::Component,
            Some(kind.into()),
            false,
            ModelAttributes::default(),
        )
    }

    /// Create a question component. Questions default to a 0..=1 score
    /// range, overridable via [`ContentModel::set_score_range`].
    pub fn question(id: impl Into<String>, kind: impl Into<String>) -> Arc<Self> {
        let attrs = ModelAttributes {
            max_score: 1.0,
            ..ModelAttributes::default()
        };
        Self::build(id.into(), ContentType::Component, Some(kind.into()), true, attrs)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn model_type(&self) -> ContentType {
        self.model_type
    }

    /// The component sub-type (e.g. `"mcq"`), for component nodes.
    pub fn component_kind(&self) -> Option<&str> {
        self.component.as_deref()
    }

    pub fn is_question(&self) -> bool {
        self.is_question
    }

    /// Type-group membership. Every node belongs to its own type's group;
    /// pages and menus additionally belong to `contentobject`; question
    /// components belong to `question`.
    pub fn is_type_group(&self, group: &str) -> bool {
        if group == self.model_type.as_str() {
            return true;
        }
        match group {
            "contentobject" => {
                matches!(self.model_type, ContentType::Page | ContentType::Menu)
            }
            "question" => self.is_question,
            _ => false,
        }
    }

    /// Snapshot of the attribute block.
    pub fn attributes(&self) -> ModelAttributes {
        self.attrs.read().expect("attrs lock").clone()
    }

    pub fn flag(&self, flag: ModelFlag) -> bool {
        let attrs = self.attrs.read().expect("attrs lock");
        match flag {
            ModelFlag::IsAvailable => attrs.is_available,
            ModelFlag::IsComplete => attrs.is_complete,
            ModelFlag::IsInteractionComplete => attrs.is_interaction_complete,
            ModelFlag::IsActive => attrs.is_active,
            ModelFlag::IsVisited => attrs.is_visited,
            ModelFlag::IsCorrect => attrs.is_correct,
            ModelFlag::IsOptional => attrs.is_optional,
            ModelFlag::IsTrackable => attrs.is_trackable,
        }
    }

    /// Set a boolean attribute, publishing `change:<attr>` when the value
    /// actually changes.
    pub fn set_flag(self: &Arc<Self>, flag: ModelFlag, value: bool) {
        let changed = {
            let mut attrs = self.attrs.write().expect("attrs lock");
            let slot = match flag {
                ModelFlag::IsAvailable => &mut attrs.is_available,
                ModelFlag::IsComplete => &mut attrs.is_complete,
                ModelFlag::IsInteractionComplete => &mut attrs.is_interaction_complete,
                ModelFlag::IsActive => &mut attrs.is_active,
                ModelFlag::IsVisited => &mut attrs.is_visited,
                ModelFlag::IsCorrect => &mut attrs.is_correct,
                ModelFlag::IsOptional => &mut attrs.is_optional,
                ModelFlag::IsTrackable => &mut attrs.is_trackable,
            };
            let changed = *slot != value;
            *slot = value;
            changed
        };
        if changed {
            self.emit_change(flag.as_str());
        }
    }

    pub fn is_available(&self) -> bool {
        self.flag(ModelFlag::IsAvailable)
    }

    pub fn is_complete(&self) -> bool {
        self.flag(ModelFlag::IsComplete)
    }

    pub fn is_interaction_complete(&self) -> bool {
        self.flag(ModelFlag::IsInteractionComplete)
    }

    pub fn is_optional(&self) -> bool {
        self.flag(ModelFlag::IsOptional)
    }

    pub fn is_correct(&self) -> bool {
        self.flag(ModelFlag::IsCorrect)
    }

    pub fn is_trackable(&self) -> bool {
        self.flag(ModelFlag::IsTrackable)
    }

    pub fn score(&self) -> f64 {
        self.attrs.read().expect("attrs lock").score
    }

    pub fn min_score(&self) -> f64 {
        self.attrs.read().expect("attrs lock").min_score
    }

    pub fn max_score(&self) -> f64 {
        self.attrs.read().expect("attrs lock").max_score
    }

    /// Set the current score, publishing `change:score` on change.
    pub fn set_score(self: &Arc<Self>, score: f64) {
        let changed = {
            let mut attrs = self.attrs.write().expect("attrs lock");
            let changed = attrs.score != score;
            attrs.score = score;
            changed
        };
        if changed {
            self.emit_change("score");
        }
    }

    /// Set the score range for this node.
    pub fn set_score_range(self: &Arc<Self>, min_score: f64, max_score: f64) {
        let mut attrs = self.attrs.write().expect("attrs lock");
        attrs.min_score = min_score;
        attrs.max_score = max_score;
    }

    pub fn parent(&self) -> Option<Arc<ContentModel>> {
        self.parent.read().expect("parent lock").upgrade()
    }

    pub fn children(&self) -> Vec<Arc<ContentModel>> {
        self.children.read().expect("children lock").clone()
    }

    pub fn has_child(&self, id: &str) -> bool {
        self.children
            .read()
            .expect("children lock")
            .iter()
            .any(|child| child.id() == id)
    }

    /// Ancestors of this node, closest first (parent, …, course).
    pub fn ancestors(self: &Arc<Self>, include_self: bool) -> Vec<Arc<ContentModel>> {
        let mut out = Vec::new();
        if include_self {
            out.push(Arc::clone(self));
        }
        let mut current = self.parent();
        while let Some(model) = current {
            current = model.parent();
            out.push(model);
        }
        out
    }

    /// The nearest ancestor belonging to the given type group.
    pub fn find_ancestor(&self, type_group: &str) -> Option<Arc<ContentModel>> {
        let mut current = self.parent();
        while let Some(model) = current {
            if model.is_type_group(type_group) {
                return Some(model);
            }
            current = model.parent();
        }
        None
    }

    /// Whether this node is currently part of a tree.
    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::Acquire)
    }

    /// Opaque relocation key assigned when the node joined the tree.
    pub fn tracking_position(&self) -> Option<String> {
        self.tracking_position.read().expect("position lock").clone()
    }

    fn emit_change(self: &Arc<Self>, attr: &'static str) {
        let sender = self.events.read().expect("events lock").clone();
        if let Some(sender) = sender {
            let _ = sender.send(ContentEvent::Change {
                model: Arc::clone(self),
                attr,
                at: Utc::now(),
            });
        }
    }
}

/// The content tree: id-indexed nodes plus the change-event channel.
pub struct ContentTree {
    models: DashMap<String, Arc<ContentModel>>,
    course: RwLock<Option<Arc<ContentModel>>>,
    events: broadcast::Sender<ContentEvent>,
}

impl Default for ContentTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentTree {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            models: DashMap::new(),
            course: RwLock::new(None),
            events,
        }
    }

    /// Subscribe to `add` / `remove` / `change:<attr>` events.
    pub fn subscribe(&self) -> broadcast::Receiver<ContentEvent> {
        self.events.subscribe()
    }

    /// Add a node under `parent_id` (or as the course root when `None`).
    ///
    /// Wires parent/child links, marks the node attached, assigns its
    /// tracking position, and publishes `add`.
    pub fn add(&self, model: Arc<ContentModel>, parent_id: Option<&str>) -> ScoringResult<()> {
        if self.models.contains_key(model.id()) {
            return Err(ScoringError::DuplicateModelId {
                id: model.id().to_string(),
            });
        }
        let position = match parent_id {
            None => {
                *self.course.write().expect("course lock") = Some(Arc::clone(&model));
                String::new()
            }
            Some(parent_id) => {
                let parent = self.find_by_id(parent_id).ok_or_else(|| {
                    ScoringError::ModelNotFound {
                        id: parent_id.to_string(),
                    }
                })?;
                let index = {
                    let mut children = parent.children.write().expect("children lock");
                    children.push(Arc::clone(&model));
                    children.len() - 1
                };
                *model.parent.write().expect("parent lock") = Arc::downgrade(&parent);
                match parent.tracking_position() {
                    Some(pos) if !pos.is_empty() => format!("{pos}/{index}"),
                    _ => index.to_string(),
                }
            }
        };
        *model.tracking_position.write().expect("position lock") = Some(position);
        *model.events.write().expect("events lock") = Some(self.events.clone());
        model.attached.store(true, Ordering::Release);
        self.models.insert(model.id().to_string(), Arc::clone(&model));
        let _ = self.events.send(ContentEvent::Added {
            model,
            at: Utc::now(),
        });
        Ok(())
    }

    /// Remove a node and its whole subtree, publishing `remove` per node,
    /// leaves first.
    pub fn remove(&self, id: &str) -> ScoringResult<Arc<ContentModel>> {
        let model = self
            .find_by_id(id)
            .ok_or_else(|| ScoringError::ModelNotFound { id: id.to_string() })?;
        if let Some(parent) = model.parent() {
            parent
                .children
                .write()
                .expect("children lock")
                .retain(|child| child.id() != id);
        }
        self.detach_subtree(&model);
        Ok(model)
    }

    fn detach_subtree(&self, model: &Arc<ContentModel>) {
        for child in model.children() {
            self.detach_subtree(&child);
        }
        model.attached.store(false, Ordering::Release);
        *model.events.write().expect("events lock") = None;
        self.models.remove(model.id());
        let _ = self.events.send(ContentEvent::Removed {
            model: Arc::clone(model),
            at: Utc::now(),
        });
    }

    pub fn find_by_id(&self, id: &str) -> Option<Arc<ContentModel>> {
        self.models.get(id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn course(&self) -> Option<Arc<ContentModel>> {
        self.course.read().expect("course lock").clone()
    }

    pub fn find_by_tracking_position(&self, position: &str) -> Option<Arc<ContentModel>> {
        self.models.iter().find_map(|entry| {
            let model = entry.value();
            (model.tracking_position().as_deref() == Some(position)).then(|| Arc::clone(model))
        })
    }

    /// Number of attached nodes.
    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// All attached nodes, unordered.
    pub fn all(&self) -> Vec<Arc<ContentModel>> {
        self.models
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }
}
