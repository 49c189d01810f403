/// Offline-storage port.
///
/// The host runtime exposes a synchronous key/value surface (SCORM suspend
/// data and objectives in practice). This module provides the in-memory
/// reference implementation the engine and its tests run against: values
/// live in namespace → id → string maps, with typed helpers for the
/// objective namespaces and a `ready` latch the lifecycle waits on before
/// restoring.
///
/// An unavailable store (never readied, or torn down) degrades silently:
/// writes are dropped, reads return `None`. Persistence must never be able
/// to fail the lifecycle.
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;
use tracing::debug;

/// Namespace for objective titles.
pub const NS_OBJECTIVE_DESCRIPTION: &str = "objectiveDescription";
/// Namespace for objective score triples.
pub const NS_OBJECTIVE_SCORE: &str = "objectiveScore";
/// Namespace for objective completion/success pairs.
pub const NS_OBJECTIVE_STATUS: &str = "objectiveStatus";
/// Namespace for shared-children tracking positions.
pub const NS_SHARED_CHILDREN: &str = "ch";

/// SCORM-style completion status vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompletionStatus {
    #[serde(rename = "not attempted")]
    NotAttempted,
    #[serde(rename = "incomplete")]
    Incomplete,
    #[serde(rename = "completed")]
    Completed,
    #[serde(rename = "unknown")]
    Unknown,
}

/// SCORM-style success status vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SuccessStatus {
    #[serde(rename = "passed")]
    Passed,
    #[serde(rename = "failed")]
    Failed,
    #[serde(rename = "unknown")]
    Unknown,
}

/// An objective score triple.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObjectiveScore {
    pub score: f64,
    pub min_score: f64,
    pub max_score: f64,
}

/// An objective status record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectiveStatus {
    pub completion: CompletionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success: Option<SuccessStatus>,
}

/// In-memory reference implementation of the offline-storage port.
pub struct OfflineStorage {
    data: DashMap<String, DashMap<String, String>>,
    available: AtomicBool,
    ready_tx: watch::Sender<bool>,
    ready_rx: watch::Receiver<bool>,
}

impl Default for OfflineStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl OfflineStorage {
    /// Create an available but not-yet-ready store.
    pub fn new() -> Self {
        let (ready_tx, ready_rx) = watch::channel(false);
        Self {
            data: DashMap::new(),
            available: AtomicBool::new(true),
            ready_tx,
            ready_rx,
        }
    }

    /// Create a store that is ready immediately (test convenience).
    pub fn ready_now() -> Self {
        let storage = Self::new();
        storage.set_ready();
        storage
    }

    /// Mark the store unavailable: reads return `None`, writes are dropped.
    pub fn set_unavailable(&self) {
        self.available.store(false, Ordering::Release);
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::Acquire)
    }

    /// Signal that restoration data is loaded and reads are meaningful.
    pub fn set_ready(&self) {
        let _ = self.ready_tx.send(true);
    }

    pub fn is_ready(&self) -> bool {
        *self.ready_rx.borrow()
    }

    /// Resolve once the store has signalled ready.
    pub async fn ready(&self) {
        let mut rx = self.ready_rx.clone();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Raw read under `namespace/id`.
    pub fn get(&self, namespace: &str, id: &str) -> Option<String> {
        if !self.is_available() {
            return None;
        }
        self.data
            .get(namespace)
            .and_then(|ns| ns.get(id).map(|value| value.clone()))
    }

    /// Raw write under `namespace/id`. Dropped when unavailable.
    pub fn set(&self, namespace: &str, id: &str, value: String) {
        if !self.is_available() {
            debug!(namespace, id, "offline storage unavailable, write dropped");
            return;
        }
        self.data
            .entry(namespace.to_string())
            .or_default()
            .insert(id.to_string(), value);
    }

    pub fn remove(&self, namespace: &str, id: &str) {
        if let Some(ns) = self.data.get(namespace) {
            ns.remove(id);
        }
    }

    // Typed objective helpers -------------------------------------------

    pub fn set_objective_description(&self, id: &str, title: &str) {
        self.set(NS_OBJECTIVE_DESCRIPTION, id, title.to_string());
    }

    pub fn objective_description(&self, id: &str) -> Option<String> {
        self.get(NS_OBJECTIVE_DESCRIPTION, id)
    }

    pub fn set_objective_score(&self, id: &str, score: ObjectiveScore) {
        if let Ok(json) = serde_json::to_string(&score) {
            self.set(NS_OBJECTIVE_SCORE, id, json);
        }
    }

    pub fn objective_score(&self, id: &str) -> Option<ObjectiveScore> {
        self.get(NS_OBJECTIVE_SCORE, id)
            .and_then(|json| serde_json::from_str(&json).ok())
    }

    pub fn set_objective_status(&self, id: &str, status: ObjectiveStatus) {
        if let Ok(json) = serde_json::to_string(&status) {
            self.set(NS_OBJECTIVE_STATUS, id, json);
        }
    }

    pub fn objective_status(&self, id: &str) -> Option<ObjectiveStatus> {
        self.get(NS_OBJECTIVE_STATUS, id)
            .and_then(|json| serde_json::from_str(&json).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_roundtrip() {
        let storage = OfflineStorage::ready_now();
        storage.set("assessment", "a-1", "[[1,0]]".to_string());
        assert_eq!(storage.get("assessment", "a-1").unwrap(), "[[1,0]]");
        assert!(storage.get("assessment", "missing").is_none());
    }

    #[test]
    fn test_unavailable_drops_writes_and_reads() {
        let storage = OfflineStorage::ready_now();
        storage.set("ns", "id", "before".to_string());
        storage.set_unavailable();
        storage.set("ns", "id", "after".to_string());
        assert!(storage.get("ns", "id").is_none());
    }

    #[test]
    fn test_objective_records() {
        let storage = OfflineStorage::ready_now();
        storage.set_objective_description("total", "Course result");
        storage.set_objective_score(
            "total",
            ObjectiveScore {
                score: 7.0,
                min_score: 0.0,
                max_score: 10.0,
            },
        );
        storage.set_objective_status(
            "total",
            ObjectiveStatus {
                completion: CompletionStatus::Completed,
                success: Some(SuccessStatus::Passed),
            },
        );

        assert_eq!(
            storage.objective_description("total").unwrap(),
            "Course result"
        );
        assert_eq!(storage.objective_score("total").unwrap().max_score, 10.0);
        let status = storage.objective_status("total").unwrap();
        assert_eq!(status.completion, CompletionStatus::Completed);
        assert_eq!(status.success, Some(SuccessStatus::Passed));
    }

    #[test]
    fn test_status_wire_vocabulary() {
        let json = serde_json::to_string(&ObjectiveStatus {
            completion: CompletionStatus::NotAttempted,
            success: None,
        })
        .unwrap();
        assert_eq!(json, r#"{"completion":"not attempted"}"#);
    }

    #[tokio::test]
    async fn test_ready_latch() {
        let storage = std::sync::Arc::new(OfflineStorage::new());
        assert!(!storage.is_ready());
        let waiter = {
            let storage = storage.clone();
            tokio::spawn(async move { storage.ready().await })
        };
        storage.set_ready();
        waiter.await.unwrap();
        assert!(storage.is_ready());
    }
}
