//! # scoreset — scoring-set algebra and lifecycle engine
//!
//! scoreset sits on top of an e-learning runtime's content tree
//! (course → page → article → block → component) and provides:
//!
//! - **A set algebra** — first-class named sets over content models, with
//!   an intersection operator defined by *overlapping hierarchies*
//!   (equal / ancestor / descendant) and a query language for selecting
//!   and intersecting sets (`"#a-300 #performance"`).
//! - **Scoring rollup** — score, correctness, completion, and pass/fail
//!   aggregated per set and across a course-wide total with a
//!   configurable passmark.
//! - **A lifecycle engine** — batched, ordered, cooperative dispatch of
//!   per-set callbacks (init → restore → start → visit/leave/update →
//!   reset/restart), driven by content changes, navigation, and
//!   programmatic triggers.
//! - **State persistence** — per-set restoration blobs and SCORM-style
//!   objectives through an offline-storage port.
//!
//! ## Quick start
//!
//! ```ignore
//! use scoreset::{
//!     ContentModel, ContentTree, ContentType, ModelScoringOptions,
//!     ModelScoringSet, OfflineStorage, Scoring, ScoringConfig, SetOptions,
//! };
//! use std::sync::Arc;
//!
//! # async fn run() -> scoreset::ScoringResult<()> {
//! let tree = Arc::new(ContentTree::new());
//! tree.add(ContentModel::new("course", ContentType::Course), None)?;
//! // … the rest of the course …
//!
//! let storage = Arc::new(OfflineStorage::ready_now());
//! let scoring = Scoring::new(Arc::clone(&tree), storage, ScoringConfig::default());
//!
//! ModelScoringSet::create(
//!     scoring.context(),
//!     ModelScoringOptions::new()
//!         .set_type("assessment")
//!         .set(SetOptions::new().id("performance")),
//! )?;
//!
//! scoring.data_ready()?;
//! scoring.start().await;
//!
//! let subset = scoring.get_subset_by_query("#a-300 #performance")?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! Sets form an explicit capability hierarchy:
//! [`IntersectionSet`](sets::IntersectionSet) (identity, membership,
//! intersection, query surface) → [`LifecycleSet`](sets::LifecycleSet)
//! (cooperative callbacks) → [`ScoringSet`](sets::ScoringSet)
//! (aggregation). [`sets::ModelSet`] wraps each content model;
//! [`sets::TotalSet`] rolls everything up.
//!
//! The lifecycle is single-threaded cooperative: the
//! [`renderer`](lifecycle::PhaseRenderer) drains ordered unique phase
//! queues once per frame tick, holding a host wait token until the
//! engine settles; the [`controller`](lifecycle::LifecycleController)
//! owns the routing rules and per-set status.

pub mod api;
pub mod bus;
pub mod config;
pub mod content;
pub mod context;
pub mod error;
pub mod hierarchy;
pub mod lifecycle;
pub mod offline;
pub mod query;
pub mod registry;
pub mod sets;
pub mod state;

pub use api::Scoring;
pub use bus::{EventBus, ScoringEvent, TopicFilter};
pub use config::{Passmark, ScoringConfig};
pub use content::{ContentEvent, ContentModel, ContentTree, ContentType, ModelFlag};
pub use context::ScoringContext;
pub use error::{ScoringError, ScoringResult};
pub use lifecycle::{
    CountingWait, HostWait, LifecycleController, NullWait, Phase, PhaseRenderer, SetPhase,
    SetStatus,
};
pub use offline::{
    CompletionStatus, ObjectiveScore, ObjectiveStatus, OfflineStorage, SuccessStatus,
};
pub use sets::{
    scale, IntersectionSet, LifecycleSet, ModelScoringOptions, ModelScoringSet, ModelSet,
    Objective, ScoringSet, SetCore, SetObserver, SetOptions, SetRef, SubsetExt, TotalSet,
};
pub use state::{SharedChildren, State, StateValue};

/// Install a `tracing` subscriber honoring `RUST_LOG`, for embedders and
/// tests that want the engine's logs on stderr. Safe to call repeatedly.
pub fn init_logging() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();
}
