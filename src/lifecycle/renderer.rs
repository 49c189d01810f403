/// The frame-batched phase renderer.
///
/// One consumer task drains eight ordered unique queues, at most once per
/// `1/fps` seconds. A batch snapshots every queue, then dispatches phase
/// by phase in drain order, sets sorted ascending by `order` (stable on
/// enqueue order), one `await` per callback. Anything enqueued while a
/// batch runs lands in the next batch.
///
/// The renderer holds a single host wait token from the first enqueue
/// until every queue is empty after a drain, and releases it even when
/// callbacks fail — persistence and host coordination must fail open.
use crate::error::ScoringResult;
use crate::lifecycle::{HostWait, Phase};
use crate::sets::{IntersectionSet, SetRef};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, Notify};
use tokio::task::JoinHandle;
use tracing::{error, trace};

/// Default tick rate, frames per second.
pub const DEFAULT_FPS: u32 = 30;

/// The per-batch dispatch target. The controller is the one implementor.
#[async_trait]
pub trait PhaseHandler: Send + Sync {
    async fn handle(&self, phase: Phase, set: SetRef) -> ScoringResult<()>;
}

struct PhaseQueue {
    sets: Vec<SetRef>,
    ids: HashSet<String>,
}

impl PhaseQueue {
    fn new() -> Self {
        Self {
            sets: Vec::new(),
            ids: HashSet::new(),
        }
    }

    fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    fn take(&mut self) -> Vec<SetRef> {
        self.ids.clear();
        std::mem::take(&mut self.sets)
    }
}

struct Queues {
    phases: [PhaseQueue; 8],
}

impl Queues {
    fn new() -> Self {
        Self {
            phases: std::array::from_fn(|_| PhaseQueue::new()),
        }
    }

    fn is_empty(&self) -> bool {
        self.phases.iter().all(PhaseQueue::is_empty)
    }
}

pub struct PhaseRenderer {
    queues: Mutex<Queues>,
    wake: Notify,
    rendered: broadcast::Sender<()>,
    wait: Arc<dyn HostWait>,
    token: Mutex<Option<uuid::Uuid>>,
    frame: Duration,
    shutdown: AtomicBool,
    draining: AtomicBool,
}

impl PhaseRenderer {
    pub fn new(wait: Arc<dyn HostWait>, fps: u32) -> Arc<Self> {
        let (rendered, _) = broadcast::channel(64);
        Arc::new(Self {
            queues: Mutex::new(Queues::new()),
            wake: Notify::new(),
            rendered,
            wait,
            token: Mutex::new(None),
            frame: Duration::from_secs_f64(1.0 / f64::from(fps.max(1))),
            shutdown: AtomicBool::new(false),
            draining: AtomicBool::new(false),
        })
    }

    /// Append sets to a phase queue, skipping intersected clones and sets
    /// already queued for that phase. Returns how many were accepted.
    pub fn enqueue<I>(&self, phase: Phase, sets: I) -> usize
    where
        I: IntoIterator<Item = SetRef>,
    {
        let mut queues = self.queues.lock().expect("queue lock");
        let queue = &mut queues.phases[phase.index()];
        let mut added = 0;
        for set in sets {
            if set.is_intersected_clone() {
                trace!(id = set.id(), %phase, "clone dropped from phase queue");
                continue;
            }
            if queue.ids.insert(set.id().to_string()) {
                queue.sets.push(set);
                added += 1;
            }
        }
        if added > 0 {
            self.take_token();
            self.wake.notify_one();
        }
        added
    }

    /// Nothing queued and no batch in flight?
    pub fn is_idle(&self) -> bool {
        !self.draining.load(Ordering::Acquire) && self.queues_empty()
    }

    fn queues_empty(&self) -> bool {
        self.queues.lock().expect("queue lock").is_empty()
    }

    /// Resolve when the next batch finishes. Returns immediately when
    /// nothing is queued.
    pub async fn wait_for_batch(&self) {
        let mut rendered = self.rendered.subscribe();
        if self.is_idle() {
            return;
        }
        let _ = rendered.recv().await;
    }

    /// Enqueue and resolve when the batch containing these sets has run.
    pub async fn render<I>(&self, phase: Phase, sets: I)
    where
        I: IntoIterator<Item = SetRef>,
    {
        let mut rendered = self.rendered.subscribe();
        let added = self.enqueue(phase, sets);
        if added == 0 && self.is_idle() {
            return;
        }
        let _ = rendered.recv().await;
    }

    /// Stop the consumer task after the current batch.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Release);
        self.wake.notify_one();
    }

    /// Spawn the single consumer task.
    pub fn spawn(self: &Arc<Self>, handler: Arc<dyn PhaseHandler>) -> JoinHandle<()> {
        let renderer = Arc::clone(self);
        tokio::spawn(async move {
            let mut last_tick: Option<tokio::time::Instant> = None;
            loop {
                if renderer.shutdown.load(Ordering::Acquire) {
                    break;
                }
                if renderer.is_idle() {
                    renderer.wake.notified().await;
                    continue;
                }
                // Throttle to the frame cadence.
                if let Some(last) = last_tick {
                    tokio::time::sleep_until(last + renderer.frame).await;
                }
                last_tick = Some(tokio::time::Instant::now());
                renderer.drain_batch(&handler).await;
            }
        })
    }

    /// Snapshot every queue, then dispatch phase by phase.
    async fn drain_batch(&self, handler: &Arc<dyn PhaseHandler>) {
        self.draining.store(true, Ordering::Release);
        let snapshot: Vec<(Phase, Vec<SetRef>)> = {
            let mut queues = self.queues.lock().expect("queue lock");
            Phase::ALL
                .iter()
                .map(|phase| (*phase, queues.phases[phase.index()].take()))
                .collect()
        };
        for (phase, mut sets) in snapshot {
            if sets.is_empty() {
                continue;
            }
            sets.sort_by_key(|set| set.order());
            trace!(%phase, count = sets.len(), "draining phase");
            for set in sets {
                if let Err(err) = handler.handle(phase, set.clone()).await {
                    error!(
                        id = set.id(),
                        %phase,
                        error = %err,
                        "lifecycle callback failed; continuing batch"
                    );
                }
            }
        }
        // Fail open: the token goes back even if every callback errored.
        if self.queues_empty() {
            self.release_token();
        }
        self.draining.store(false, Ordering::Release);
        let _ = self.rendered.send(());
    }

    fn take_token(&self) {
        let mut token = self.token.lock().expect("token lock");
        if token.is_none() {
            *token = Some(self.wait.begin_wait());
        }
    }

    fn release_token(&self) {
        if let Some(token) = self.token.lock().expect("token lock").take() {
            self.wait.end_wait(token);
        }
    }
}
