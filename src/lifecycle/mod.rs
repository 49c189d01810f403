/// The lifecycle engine.
///
/// Content-model changes, navigation, and programmatic triggers decide
/// *which* sets need *which* callbacks; the [`renderer`] decides *when*:
/// it batches everything into frame ticks and drains per phase, in set
/// order, one callback at a time. The [`controller`] owns the routing
/// rules and the per-set status vectors.
pub mod controller;
pub mod renderer;

pub use controller::LifecycleController;
pub use renderer::{PhaseHandler, PhaseRenderer};

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use uuid::Uuid;

/// The dispatch phases, in the order they drain within a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Init,
    Restore,
    Start,
    Reset,
    Restart,
    Leave,
    Visit,
    Update,
}

impl Phase {
    /// Every phase, drain order.
    pub const ALL: [Phase; 8] = [
        Phase::Init,
        Phase::Restore,
        Phase::Start,
        Phase::Reset,
        Phase::Restart,
        Phase::Leave,
        Phase::Visit,
        Phase::Update,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Init => "init",
            Phase::Restore => "restore",
            Phase::Start => "start",
            Phase::Reset => "reset",
            Phase::Restart => "restart",
            Phase::Leave => "leave",
            Phase::Visit => "visit",
            Phase::Update => "update",
        }
    }

    pub(crate) fn index(&self) -> usize {
        *self as usize
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a set currently sits in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SetPhase {
    #[default]
    New,
    Init,
    Restored,
    Started,
    Leaving,
    Visiting,
    Updating,
    Resetting,
}

/// The per-set status vector the controller keeps.
#[derive(Debug, Clone, Copy, Default)]
pub struct SetStatus {
    pub phase: SetPhase,
    pub was_restored: bool,
    pub was_complete: bool,
    pub was_passed: bool,
}

/// The host wait port: the renderer holds one token from first enqueue
/// until its queues are empty, which is how the host runtime is kept from
/// advancing past initialization while callbacks are still settling.
pub trait HostWait: Send + Sync {
    fn begin_wait(&self) -> Uuid;
    fn end_wait(&self, token: Uuid);
}

/// A wait port that coordinates with nobody.
#[derive(Debug, Default)]
pub struct NullWait;

impl HostWait for NullWait {
    fn begin_wait(&self) -> Uuid {
        Uuid::new_v4()
    }

    fn end_wait(&self, _token: Uuid) {}
}

/// A counting wait port, for tests and embedders that just want to know
/// whether the engine is busy.
#[derive(Debug, Default)]
pub struct CountingWait {
    begins: AtomicUsize,
    ends: AtomicUsize,
}

impl CountingWait {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begins(&self) -> usize {
        self.begins.load(Ordering::Acquire)
    }

    pub fn ends(&self) -> usize {
        self.ends.load(Ordering::Acquire)
    }

    /// Tokens currently held.
    pub fn active(&self) -> usize {
        self.begins() - self.ends()
    }
}

impl HostWait for CountingWait {
    fn begin_wait(&self) -> Uuid {
        self.begins.fetch_add(1, Ordering::AcqRel);
        Uuid::new_v4()
    }

    fn end_wait(&self, _token: Uuid) {
        self.ends.fetch_add(1, Ordering::AcqRel);
    }
}
