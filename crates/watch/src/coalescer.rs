//! Debounce coalescer.
//!
//! Filesystem watchers fire in bursts: one logical tracker write produces
//! a handful of create/modify events within milliseconds. The coalescer
//! collapses each burst into a single flush per project, carrying only
//! the most recent payload (last-write-wins, not accumulation). At most
//! one flush fires per debounce window per project.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::trace;

use beads_live_core::ProjectIdentity;

type FlushFn<P> = Arc<dyn Fn(ProjectIdentity, P) + Send + Sync>;

struct Pending {
    generation: u64,
    handle: JoinHandle<()>,
}

struct Inner {
    next_generation: u64,
    pending: HashMap<ProjectIdentity, Pending>,
}

/// Per-project debounce timer map.
///
/// Flush-callback failures are the callback's responsibility — the
/// coalescer neither retries nor observes them.
pub struct Coalescer<P> {
    window: Duration,
    inner: Arc<Mutex<Inner>>,
    on_flush: FlushFn<P>,
}

impl<P: Clone + Send + 'static> Coalescer<P> {
    pub fn new(window: Duration, on_flush: impl Fn(ProjectIdentity, P) + Send + Sync + 'static) -> Self {
        Self {
            window,
            inner: Arc::new(Mutex::new(Inner {
                next_generation: 0,
                pending: HashMap::new(),
            })),
            on_flush: Arc::new(on_flush),
        }
    }

    /// Schedule a flush of `payload` for `project` after the debounce
    /// window. A second call for the same project before the window
    /// elapses replaces the pending payload and restarts the timer.
    pub fn queue(&self, project: ProjectIdentity, payload: P) {
        let mut inner = self.inner.lock().expect("coalescer lock poisoned");
        inner.next_generation += 1;
        let generation = inner.next_generation;

        if let Some(previous) = inner.pending.remove(&project) {
            previous.handle.abort();
            trace!(project = %project, "debounce restarted");
        }

        let handle = tokio::spawn({
            let window = self.window;
            let inner = Arc::clone(&self.inner);
            let on_flush = Arc::clone(&self.on_flush);
            let project = project.clone();
            async move {
                tokio::time::sleep(window).await;
                // Fire only if this timer is still the current one for the
                // project; a newer queue() call supersedes it.
                let fire = {
                    let mut inner = inner.lock().expect("coalescer lock poisoned");
                    match inner.pending.get(&project) {
                        Some(pending) if pending.generation == generation => {
                            inner.pending.remove(&project);
                            true
                        }
                        _ => false,
                    }
                };
                if fire {
                    on_flush(project, payload);
                }
            }
        });

        inner.pending.insert(project, Pending { generation, handle });
    }

    /// Discard any pending timer for `project` without flushing.
    pub fn cancel(&self, project: &ProjectIdentity) {
        let mut inner = self.inner.lock().expect("coalescer lock poisoned");
        if let Some(pending) = inner.pending.remove(project) {
            pending.handle.abort();
        }
    }

    /// Discard every pending timer without flushing. Used on shutdown.
    pub fn cancel_all(&self) {
        let mut inner = self.inner.lock().expect("coalescer lock poisoned");
        for (_, pending) in inner.pending.drain() {
            pending.handle.abort();
        }
    }

    /// Number of projects with a pending flush.
    pub fn pending_count(&self) -> usize {
        self.inner.lock().expect("coalescer lock poisoned").pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_millis(100);

    fn collecting() -> (Coalescer<u32>, Arc<Mutex<Vec<(ProjectIdentity, u32)>>>) {
        let flushed = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&flushed);
        let coalescer = Coalescer::new(WINDOW, move |project, payload| {
            sink.lock().unwrap().push((project, payload));
        });
        (coalescer, flushed)
    }

    fn project(root: &str) -> ProjectIdentity {
        ProjectIdentity::from_root(root)
    }

    async fn settle() {
        // Paused clock: sleeping past the window auto-advances time and
        // lets the spawned timers run.
        tokio::time::sleep(WINDOW * 3).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_collapses_to_one_flush_with_last_payload() {
        let (coalescer, flushed) = collecting();
        coalescer.queue(project("/a"), 1);
        coalescer.queue(project("/a"), 2);
        coalescer.queue(project("/a"), 3);
        settle().await;

        let flushed = flushed.lock().unwrap();
        assert_eq!(flushed.len(), 1);
        assert_eq!(flushed[0], (project("/a"), 3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_requeue_mid_window_restarts_timer() {
        let (coalescer, flushed) = collecting();
        coalescer.queue(project("/a"), 1);
        tokio::time::sleep(WINDOW / 2).await;
        coalescer.queue(project("/a"), 2);
        tokio::time::sleep(WINDOW / 2).await;
        // First window has elapsed but the restarted timer has not.
        assert!(flushed.lock().unwrap().is_empty());
        settle().await;
        assert_eq!(*flushed.lock().unwrap(), vec![(project("/a"), 2)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_projects_debounce_independently() {
        let (coalescer, flushed) = collecting();
        coalescer.queue(project("/a"), 1);
        coalescer.queue(project("/b"), 2);
        settle().await;

        let mut flushed = flushed.lock().unwrap().clone();
        flushed.sort();
        assert_eq!(flushed, vec![(project("/a"), 1), (project("/b"), 2)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_discards_without_flushing() {
        let (coalescer, flushed) = collecting();
        coalescer.queue(project("/a"), 1);
        coalescer.cancel(&project("/a"));
        settle().await;
        assert!(flushed.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all_discards_everything() {
        let (coalescer, flushed) = collecting();
        coalescer.queue(project("/a"), 1);
        coalescer.queue(project("/b"), 2);
        assert_eq!(coalescer.pending_count(), 2);
        coalescer.cancel_all();
        assert_eq!(coalescer.pending_count(), 0);
        settle().await;
        assert!(flushed.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_then_requeue_flushes_again() {
        let (coalescer, flushed) = collecting();
        coalescer.queue(project("/a"), 1);
        settle().await;
        coalescer.queue(project("/a"), 2);
        settle().await;
        assert_eq!(
            *flushed.lock().unwrap(),
            vec![(project("/a"), 1), (project("/a"), 2)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_normalized_project_shares_one_slot() {
        let (coalescer, flushed) = collecting();
        coalescer.queue(project("/Work/Acme"), 1);
        coalescer.queue(project("/work/acme/"), 2);
        settle().await;
        let flushed = flushed.lock().unwrap();
        assert_eq!(flushed.len(), 1);
        assert_eq!(flushed[0].1, 2);
    }
}
