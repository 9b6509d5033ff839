//! Event hub
//!
//! Fan-out of recorder lifecycle and data events to independently
//! registered listeners. Each session owns exactly one hub; there is no
//! global registry. Handlers passed at construction and ad-hoc
//! subscriptions go through the same [`EventHub::subscribe`].

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::domain::error::RecorderError;
use crate::domain::format::FormatId;
use crate::domain::recording::{Artifact, Chunk};

/// Event kinds listeners can register for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    Start,
    Stop,
    Pause,
    Resume,
    Data,
    Error,
}

impl EventKind {
    pub const ALL: [EventKind; 6] = [
        Self::Start,
        Self::Stop,
        Self::Pause,
        Self::Resume,
        Self::Data,
        Self::Error,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Data => "data",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Events published by a capture session
#[derive(Debug, Clone)]
pub enum RecorderEvent {
    /// Recording began with the negotiated format
    Start { format: FormatId },
    /// Recording finished; carries the same artifact `stop()` returns
    Stop { artifact: Artifact },
    Pause,
    Resume,
    /// One chunk appended to the session buffer
    Data(Chunk),
    /// Device failure; the session has already been forced inactive
    Error(RecorderError),
}

impl RecorderEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Start { .. } => EventKind::Start,
            Self::Stop { .. } => EventKind::Stop,
            Self::Pause => EventKind::Pause,
            Self::Resume => EventKind::Resume,
            Self::Data(_) => EventKind::Data,
            Self::Error(_) => EventKind::Error,
        }
    }
}

/// Listener callback
pub type Handler = Arc<dyn Fn(&RecorderEvent) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    listeners: HashMap<EventKind, BTreeMap<u64, Handler>>,
}

impl Registry {
    fn contains(&self, kind: EventKind, id: u64) -> bool {
        self.listeners
            .get(&kind)
            .is_some_and(|set| set.contains_key(&id))
    }
}

/// Outcome of one publish
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Handlers that returned normally
    pub delivered: usize,
    /// Handlers that panicked
    pub failed: usize,
}

/// Handle returned by [`EventHub::subscribe`]
#[derive(Clone)]
pub struct Subscription {
    registry: Weak<Mutex<Registry>>,
    kind: EventKind,
    id: u64,
}

impl Subscription {
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Remove exactly this handler. Further calls are no-ops.
    pub fn unsubscribe(&self) {
        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        let mut registry = registry.lock();
        if let Some(set) = registry.listeners.get_mut(&self.kind) {
            set.remove(&self.id);
        }
    }

    /// Whether the handler is still registered
    pub fn is_active(&self) -> bool {
        self.registry
            .upgrade()
            .is_some_and(|registry| registry.lock().contains(self.kind, self.id))
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("kind", &self.kind)
            .field("id", &self.id)
            .finish()
    }
}

/// Per-session listener registry
#[derive(Default)]
pub struct EventHub {
    registry: Arc<Mutex<Registry>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for events of `kind`
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> Subscription
    where
        F: Fn(&RecorderEvent) + Send + Sync + 'static,
    {
        self.subscribe_arc(kind, Arc::new(handler))
    }

    /// Register an already shared handler
    pub fn subscribe_arc(&self, kind: EventKind, handler: Handler) -> Subscription {
        let mut registry = self.registry.lock();
        registry.next_id += 1;
        let id = registry.next_id;
        registry.listeners.entry(kind).or_default().insert(id, handler);

        Subscription {
            registry: Arc::downgrade(&self.registry),
            kind,
            id,
        }
    }

    /// Deliver `event` synchronously to every handler registered for its
    /// kind when the publish began.
    ///
    /// Handlers run in registration order without the registry locked, so
    /// they may subscribe or unsubscribe freely. A handler removed by an
    /// earlier handler in the same publish is skipped. A panicking handler
    /// is isolated and counted in the report.
    pub fn publish(&self, event: &RecorderEvent) -> PublishReport {
        let kind = event.kind();
        let snapshot: Vec<(u64, Handler)> = {
            let registry = self.registry.lock();
            match registry.listeners.get(&kind) {
                Some(set) => set.iter().map(|(id, h)| (*id, Arc::clone(h))).collect(),
                None => return PublishReport::default(),
            }
        };

        let mut report = PublishReport::default();
        for (id, handler) in snapshot {
            if !self.registry.lock().contains(kind, id) {
                continue;
            }
            match panic::catch_unwind(AssertUnwindSafe(|| handler(event))) {
                Ok(()) => report.delivered += 1,
                Err(payload) => {
                    report.failed += 1;
                    tracing::warn!(
                        event = %kind,
                        listener = id,
                        panic = panic_message(payload.as_ref()),
                        "event listener panicked"
                    );
                }
            }
        }
        report
    }

    /// Number of handlers currently registered for `kind`
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.registry
            .lock()
            .listeners
            .get(&kind)
            .map_or(0, BTreeMap::len)
    }
}

impl fmt::Debug for EventHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.registry.lock();
        let mut map = f.debug_map();
        for (kind, set) in &registry.listeners {
            map.entry(kind, &set.len());
        }
        map.finish()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("<non-string panic>")
}
