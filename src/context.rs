/// The scoring context.
///
/// One value object binds everything a set needs to do its job: the
/// content tree, the event bus, the offline store, the registry, the
/// course configuration, and the dirty stamp that invalidates cached set
/// views. Sets hold a weak handle; the embedding application owns the
/// strong one (and may pin it process-wide if it wants a singleton — the
/// core never does).
use crate::bus::EventBus;
use crate::config::ScoringConfig;
use crate::content::ContentTree;
use crate::error::ScoringResult;
use crate::offline::OfflineStorage;
use crate::registry::SetRegistry;
use crate::sets::total::TotalSet;
use crate::sets::{IntersectionSet, SetObserver, SetRef};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};

pub struct ScoringContext {
    tree: Arc<ContentTree>,
    bus: EventBus,
    storage: Arc<OfflineStorage>,
    config: ScoringConfig,
    registry: SetRegistry,
    stamp: AtomicU64,
    observer: RwLock<Option<Weak<dyn SetObserver>>>,
    total: RwLock<Option<Arc<TotalSet>>>,
}

impl ScoringContext {
    pub fn new(
        tree: Arc<ContentTree>,
        storage: Arc<OfflineStorage>,
        config: ScoringConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            tree,
            bus: EventBus::new(),
            storage,
            config,
            registry: SetRegistry::new(),
            stamp: AtomicU64::new(0),
            observer: RwLock::new(None),
            total: RwLock::new(None),
        })
    }

    pub fn tree(&self) -> &Arc<ContentTree> {
        &self.tree
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn storage(&self) -> &Arc<OfflineStorage> {
        &self.storage
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    pub fn registry(&self) -> &SetRegistry {
        &self.registry
    }

    /// Current dirty stamp. Set views cached against an older stamp
    /// recompute on next access.
    pub fn stamp(&self) -> u64 {
        self.stamp.load(Ordering::Acquire)
    }

    /// Invalidate every cached set view.
    pub fn bump_stamp(&self) {
        self.stamp.fetch_add(1, Ordering::AcqRel);
    }

    /// Install the lifecycle observer handed to every set at registration.
    pub fn set_observer(&self, observer: Weak<dyn SetObserver>) {
        *self.observer.write().expect("observer lock") = Some(observer);
    }

    pub fn observer(&self) -> Option<Arc<dyn SetObserver>> {
        self.observer
            .read()
            .expect("observer lock")
            .as_ref()
            .and_then(Weak::upgrade)
    }

    /// Register a root set: insert into the registry, hand it the
    /// observer, publish the register topics, and invalidate views.
    pub fn register_set(&self, set: SetRef) -> ScoringResult<()> {
        self.registry.insert(set.clone())?;
        set.core().bind_self(&set);
        if let Some(observer) = self.observer.read().expect("observer lock").clone() {
            set.core().install_observer(observer);
        }
        self.bump_stamp();
        self.bus.publish(
            &format!("scoring:{}:register scoring:register", set.set_type()),
            Some(set),
        );
        Ok(())
    }

    /// Deregister by id, publishing the deregister topics.
    pub fn deregister_set(&self, id: &str) -> Option<SetRef> {
        let set = self.registry.remove(id)?;
        self.bump_stamp();
        self.bus.publish(
            &format!("scoring:{}:deregister scoring:deregister", set.set_type()),
            Some(set.clone()),
        );
        Some(set)
    }

    /// The total set, once course data has been seen.
    pub fn total(&self) -> Option<Arc<TotalSet>> {
        self.total.read().expect("total lock").clone()
    }

    pub fn set_total(&self, total: Arc<TotalSet>) {
        *self.total.write().expect("total lock") = Some(total);
    }

    pub fn clear_total(&self) {
        *self.total.write().expect("total lock") = None;
    }
}
