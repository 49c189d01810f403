/// The root-set registry.
///
/// Every root set (one with no intersection parent) lives here, keyed by
/// its unique id. Intersected clones are never registered; they exist only
/// while a query or subset computation holds them. Listing order is the
/// lifecycle order: ascending `order`, then registration order.
use crate::error::{ScoringError, ScoringResult};
use crate::sets::{IntersectionSet, SetRef};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

struct Registered {
    seq: u64,
    set: SetRef,
}

/// Id-indexed collection of root sets.
pub struct SetRegistry {
    sets: DashMap<String, Registered>,
    next_seq: AtomicU64,
}

impl Default for SetRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SetRegistry {
    pub fn new() -> Self {
        Self {
            sets: DashMap::new(),
            next_seq: AtomicU64::new(0),
        }
    }

    /// Insert a root set. A duplicate id is fatal to the caller.
    pub fn insert(&self, set: SetRef) -> ScoringResult<()> {
        let id = set.id().to_string();
        if self.sets.contains_key(&id) {
            return Err(ScoringError::DuplicateSetId { id });
        }
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        debug!(id = %id, set_type = %set.set_type(), "set registered");
        self.sets.insert(id, Registered { seq, set });
        Ok(())
    }

    /// Remove a set by id, returning it if present.
    pub fn remove(&self, id: &str) -> Option<SetRef> {
        let removed = self.sets.remove(id).map(|(_, entry)| entry.set);
        if removed.is_some() {
            debug!(id, "set deregistered");
        }
        removed
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sets.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<SetRef> {
        self.sets.get(id).map(|entry| entry.set.clone())
    }

    /// All root sets in lifecycle order (`order` ascending, then
    /// registration order).
    pub fn sets(&self) -> Vec<SetRef> {
        let mut entries: Vec<(i32, u64, SetRef)> = self
            .sets
            .iter()
            .map(|entry| {
                let registered = entry.value();
                (registered.set.order(), registered.seq, registered.set.clone())
            })
            .collect();
        entries.sort_by_key(|(order, seq, _)| (*order, *seq));
        entries.into_iter().map(|(_, _, set)| set).collect()
    }

    pub fn sets_by_type(&self, set_type: &str) -> Vec<SetRef> {
        self.sets()
            .into_iter()
            .filter(|set| set.set_type() == set_type)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    /// Drop every registered set.
    pub fn clear(&self) -> Vec<SetRef> {
        let all = self.sets();
        self.sets.clear();
        all
    }

    /// First free id of the form `{prefix}-{n}`, scanning from 1.
    pub fn free_id(&self, prefix: &str) -> String {
        let mut n = 1u64;
        loop {
            let candidate = format!("{prefix}-{n}");
            if !self.sets.contains_key(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }
}
