//! In-process pub/sub event buses.
//!
//! Two instances of the same generic bus carry the pipeline's output: the
//! change bus (raw refresh signals) and the activity bus (semantic
//! events). Delivery is synchronous within one `emit` call, in
//! subscription order, to subscribers whose project scope matches —
//! global subscribers receive everything. Event ids are strictly
//! increasing per bus instance, independent of scoping, so a
//! reconnecting client can resume from the last id it saw.
//!
//! The activity bus additionally keeps a bounded newest-first history
//! ring and persists it to disk on every emission, fire-and-forget: a
//! persistence failure logs and never blocks emission.

use std::collections::VecDeque;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, Weak};

use tracing::warn;

use beads_live_core::{ActivityEvent, ProjectIdentity};

use crate::change::ChangeEvent;

/// Capacity of the activity history ring.
pub const ACTIVITY_HISTORY_CAPACITY: usize = 100;

/// An event that can ride a bus: it belongs to a project and carries the
/// id the bus stamps on it at emission.
pub trait BusEvent: Clone + Send + 'static {
    fn project(&self) -> &ProjectIdentity;
    fn id(&self) -> u64;
    fn with_id(self, id: u64) -> Self;
}

impl BusEvent for ChangeEvent {
    fn project(&self) -> &ProjectIdentity {
        &self.project
    }
    fn id(&self) -> u64 {
        self.id
    }
    fn with_id(mut self, id: u64) -> Self {
        self.id = id;
        self
    }
}

impl BusEvent for ActivityEvent {
    fn project(&self) -> &ProjectIdentity {
        &self.project
    }
    fn id(&self) -> u64 {
        self.id
    }
    fn with_id(mut self, id: u64) -> Self {
        self.id = id;
        self
    }
}

type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct SubscriberEntry<T> {
    id: u64,
    scope: Option<ProjectIdentity>,
    listener: Listener<T>,
}

struct BusInner<T> {
    next_event_id: u64,
    next_subscriber_id: u64,
    subscribers: Vec<SubscriberEntry<T>>,
}

/// Generic in-process pub/sub bus.
pub struct EventBus<T> {
    inner: Arc<Mutex<BusInner<T>>>,
}

impl<T> Clone for EventBus<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: BusEvent> Default for EventBus<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: BusEvent> EventBus<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(BusInner {
                next_event_id: 0,
                next_subscriber_id: 0,
                subscribers: Vec::new(),
            })),
        }
    }

    /// Stamp the next id on `event` and deliver it synchronously, in
    /// subscription order, to every subscriber whose scope matches.
    /// Returns the stamped event.
    pub fn emit(&self, event: T) -> T {
        let (stamped, listeners) = {
            let mut inner = self.inner.lock().expect("bus lock poisoned");
            inner.next_event_id += 1;
            let stamped = event.with_id(inner.next_event_id);
            let listeners: Vec<Listener<T>> = inner
                .subscribers
                .iter()
                .filter(|s| {
                    s.scope
                        .as_ref()
                        .map_or(true, |scope| scope == stamped.project())
                })
                .map(|s| Arc::clone(&s.listener))
                .collect();
            (stamped, listeners)
        };
        // Delivered outside the lock so listeners may subscribe or emit.
        for listener in listeners {
            listener(&stamped);
        }
        stamped
    }

    /// Register a listener, optionally scoped to one project. Returns an
    /// RAII guard; dropping it unsubscribes.
    pub fn subscribe(
        &self,
        scope: Option<ProjectIdentity>,
        listener: impl Fn(&T) + Send + Sync + 'static,
    ) -> Subscription<T> {
        let mut inner = self.inner.lock().expect("bus lock poisoned");
        inner.next_subscriber_id += 1;
        let id = inner.next_subscriber_id;
        inner.subscribers.push(SubscriberEntry {
            id,
            scope,
            listener: Arc::new(listener),
        });
        Subscription {
            inner: Arc::downgrade(&self.inner),
            id,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().expect("bus lock poisoned").subscribers.len()
    }
}

/// RAII unsubscribe guard returned by [`EventBus::subscribe`].
pub struct Subscription<T> {
    inner: Weak<Mutex<BusInner<T>>>,
    id: u64,
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade() {
            let mut inner = inner.lock().expect("bus lock poisoned");
            inner.subscribers.retain(|s| s.id != self.id);
        }
    }
}

/// The raw change-signal bus.
pub type ChangeBus = EventBus<ChangeEvent>;

/// The semantic activity bus: a plain bus plus the bounded history ring
/// and its on-disk mirror.
#[derive(Clone)]
pub struct ActivityBus {
    bus: EventBus<ActivityEvent>,
    history: Arc<Mutex<VecDeque<ActivityEvent>>>,
    history_path: Option<Arc<PathBuf>>,
}

impl Default for ActivityBus {
    fn default() -> Self {
        Self::new()
    }
}

impl ActivityBus {
    /// In-memory only; nothing survives a restart.
    pub fn new() -> Self {
        Self {
            bus: EventBus::new(),
            history: Arc::new(Mutex::new(VecDeque::new())),
            history_path: None,
        }
    }

    /// Mirror the history ring to `path`, loading whatever a previous
    /// process left there. A missing or unreadable file starts empty.
    pub fn with_history_file(path: PathBuf) -> Self {
        let history = match load_history(&path) {
            Ok(events) => events,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "could not load activity history; starting empty");
                VecDeque::new()
            }
        };
        Self {
            bus: EventBus::new(),
            history: Arc::new(Mutex::new(history)),
            history_path: Some(Arc::new(path)),
        }
    }

    /// Emit an activity event: stamp its id, deliver to subscribers,
    /// record it at the head of the history ring, and kick off the
    /// fire-and-forget disk mirror.
    ///
    /// With a history file configured this must run inside a tokio
    /// runtime; the write itself happens on the blocking pool.
    pub fn emit(&self, event: ActivityEvent) -> ActivityEvent {
        let stamped = self.bus.emit(event);

        let snapshot: Vec<ActivityEvent> = {
            let mut history = self.history.lock().expect("history lock poisoned");
            history.push_front(stamped.clone());
            history.truncate(ACTIVITY_HISTORY_CAPACITY);
            history.iter().cloned().collect()
        };

        if let Some(path) = &self.history_path {
            let path = Arc::clone(path);
            tokio::task::spawn_blocking(move || {
                if let Err(e) = persist_history(&path, &snapshot) {
                    warn!(path = %path.display(), error = %e, "failed to persist activity history");
                }
            });
        }
        stamped
    }

    pub fn subscribe(
        &self,
        scope: Option<ProjectIdentity>,
        listener: impl Fn(&ActivityEvent) + Send + Sync + 'static,
    ) -> Subscription<ActivityEvent> {
        self.bus.subscribe(scope, listener)
    }

    pub fn subscriber_count(&self) -> usize {
        self.bus.subscriber_count()
    }

    /// The history ring, newest first, optionally filtered to one project.
    pub fn history(&self, filter: Option<&ProjectIdentity>) -> Vec<ActivityEvent> {
        let history = self.history.lock().expect("history lock poisoned");
        history
            .iter()
            .filter(|event| filter.map_or(true, |project| &event.project == project))
            .cloned()
            .collect()
    }
}

fn load_history(path: &Path) -> std::io::Result<VecDeque<ActivityEvent>> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(VecDeque::new()),
        Err(e) => return Err(e),
    };
    let events: Vec<ActivityEvent> = serde_json::from_str(&raw)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    let mut ring: VecDeque<ActivityEvent> = events.into();
    ring.truncate(ACTIVITY_HISTORY_CAPACITY);
    Ok(ring)
}

/// Wholesale atomic rewrite of the history file.
fn persist_history(path: &Path, events: &[ActivityEvent]) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;
    let json = serde_json::to_vec_pretty(events)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(&json)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
