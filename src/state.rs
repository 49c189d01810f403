/// Per-set restoration state.
///
/// A set that wants to survive a session break owns a [`State`] adapter
/// writing a single value under `offlineStorage[{setType}][{setId}]`. The
/// value shapes are deliberately narrow — arrays of booleans, arrays of
/// numbers, or arrays of such arrays — because the wire format behind the
/// port (SCORM suspend data) packs exactly those. Anything else is
/// rejected before it reaches storage.
use crate::error::{ScoringError, ScoringResult};
use crate::offline::{OfflineStorage, NS_SHARED_CHILDREN};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::warn;

/// A restorable state value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StateValue {
    /// An array of booleans, e.g. per-question correctness.
    Booleans(Vec<bool>),
    /// An array of numbers, e.g. per-question raw scores.
    Numbers(Vec<f64>),
    /// An array whose elements are themselves state arrays.
    Nested(Vec<StateValue>),
}

impl StateValue {
    /// Validate an arbitrary JSON value against the permitted shapes.
    pub fn from_json(name: &str, id: &str, value: &JsonValue) -> ScoringResult<Self> {
        serde_json::from_value(value.clone()).map_err(|_| ScoringError::InvalidStateShape {
            name: name.to_string(),
            id: id.to_string(),
            reason: format!("expected arrays of booleans/numbers, got {value}"),
        })
    }

    /// Number of top-level elements.
    pub fn len(&self) -> usize {
        match self {
            StateValue::Booleans(items) => items.len(),
            StateValue::Numbers(items) => items.len(),
            StateValue::Nested(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Adapter for one set's slot in the offline store.
///
/// `name` is the owning set's type (the storage namespace), `id` the set
/// id. Reads and writes degrade to no-ops when the store is unavailable.
pub struct State {
    name: String,
    id: String,
    storage: Arc<OfflineStorage>,
}

impl State {
    pub fn new(
        name: impl Into<String>,
        id: impl Into<String>,
        storage: Arc<OfflineStorage>,
    ) -> Self {
        Self {
            name: name.into(),
            id: id.into(),
            storage,
        }
    }

    /// Serialize and persist a value. Shape violations error; an
    /// unavailable store silently drops the write.
    pub fn save(&self, value: &StateValue) -> ScoringResult<()> {
        let serialized = serde_json::to_string(value)?;
        self.storage.set(&self.name, &self.id, serialized);
        Ok(())
    }

    /// Load and deserialize this slot. Returns `None` when the store is
    /// unavailable, the slot is empty, or the payload does not parse as a
    /// permitted shape (logged, not fatal).
    pub fn load(&self) -> Option<StateValue> {
        let raw = self.storage.get(&self.name, &self.id)?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(error) => {
                warn!(
                    name = %self.name,
                    id = %self.id,
                    %error,
                    "discarding unreadable state blob"
                );
                None
            }
        }
    }

    pub fn clear(&self) {
        self.storage.remove(&self.name, &self.id);
    }
}

/// Typed wrapper over the shared-children namespace:
/// `ch[{modelId}] = [trackingPosition, …]`, used to relocate dynamically
/// added children across sessions.
pub struct SharedChildren {
    storage: Arc<OfflineStorage>,
}

impl SharedChildren {
    pub fn new(storage: Arc<OfflineStorage>) -> Self {
        Self { storage }
    }

    pub fn save(&self, model_id: &str, positions: &[String]) -> ScoringResult<()> {
        let serialized = serde_json::to_string(positions)?;
        self.storage.set(NS_SHARED_CHILDREN, model_id, serialized);
        Ok(())
    }

    pub fn load(&self, model_id: &str) -> Option<Vec<String>> {
        let raw = self.storage.get(NS_SHARED_CHILDREN, model_id)?;
        serde_json::from_str(&raw).ok()
    }
}
