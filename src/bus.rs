/// Topic event bus for scoring notifications.
///
/// The engine publishes its externally visible transitions as topics on
/// this bus (`scoring:register`, `scoring:{type}:complete`, …). A publish
/// may name several topics at once as a space-separated list; each topic
/// goes out as its own event. Subscribers receive everything and filter,
/// or attach a [`TopicFilter`] for the common prefix/exact cases.
///
/// # Example
///
/// ```ignore
/// let bus = EventBus::new();
/// let mut rx = bus.subscribe();
/// bus.publish("scoring:assessment:register scoring:register", Some(set));
/// while let Ok(event) = rx.recv().await {
///     println!("{}", event.topic);
/// }
/// ```
use crate::sets::{IntersectionSet, SetRef};
use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

/// Capacity of the bus broadcast channel.
const BUS_CHANNEL_CAPACITY: usize = 1024;

/// A published scoring event.
#[derive(Clone)]
pub struct ScoringEvent {
    /// Single topic (one element of the published list).
    pub topic: String,
    /// The set this event concerns, when the topic carries one.
    pub set: Option<SetRef>,
    /// When the event was published.
    pub at: DateTime<Utc>,
}

impl std::fmt::Debug for ScoringEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScoringEvent")
            .field("topic", &self.topic)
            .field("set", &self.set.as_ref().map(|set| set.id().to_string()))
            .field("at", &self.at)
            .finish()
    }
}

/// Subscriber-side topic filter.
#[derive(Debug, Clone)]
pub enum TopicFilter {
    /// Match every topic.
    All,
    /// Match one topic exactly.
    Exact(String),
    /// Match topics beginning with a prefix (`scoring:` catches the lot).
    Prefix(String),
}

impl TopicFilter {
    pub fn matches(&self, topic: &str) -> bool {
        match self {
            TopicFilter::All => true,
            TopicFilter::Exact(exact) => topic == exact,
            TopicFilter::Prefix(prefix) => topic.starts_with(prefix.as_str()),
        }
    }
}

/// The bus itself: a broadcast channel plus the publish helpers.
pub struct EventBus {
    sender: broadcast::Sender<ScoringEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(BUS_CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Subscribe to all events. Filtering happens subscriber-side.
    pub fn subscribe(&self) -> broadcast::Receiver<ScoringEvent> {
        self.sender.subscribe()
    }

    /// Publish one or more topics (space-separated) with an optional set
    /// payload. Publishing with no live subscribers is a no-op.
    pub fn publish(&self, topics: &str, set: Option<SetRef>) {
        let at = Utc::now();
        for topic in topics.split_whitespace() {
            let _ = self.sender.send(ScoringEvent {
                topic: topic.to_string(),
                set: set.clone(),
                at,
            });
        }
    }

    /// Number of live subscribers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
