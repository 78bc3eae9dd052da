//! Per-project watch manager.
//!
//! Owns one filesystem watcher per project root and drives the pipeline:
//! raw notify events are filtered to the tracker's files, queued on the
//! debounce coalescer, and classified on flush — telemetry touches emit a
//! change signal and stop; content changes re-read the snapshot, diff it
//! against the stored previous one, and emit each resulting activity
//! event. A failed re-read is logged and swallowed with the stored
//! snapshot left unchanged, so the next successful flush still diffs
//! correctly; nothing ever propagates out of the watcher's event handler.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use chrono::Utc;
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use beads_live_core::{diff_snapshots, IssueReader, IssueSnapshot, ProjectIdentity};

use crate::bus::{ActivityBus, ChangeBus};
use crate::change::{ChangeEvent, ChangeKind};
use crate::coalescer::Coalescer;
use crate::config::Config;
use crate::reader::{SNAPSHOT_FILE, TRACKER_DIR};
use crate::retry::read_with_retry;

/// Bounded channel between the notify thread and the pump task. Overflow
/// increments the dropped counter instead of blocking the watcher.
const EVENT_CHANNEL_CAPACITY: usize = 512;

/// Heartbeat marker the tracker touches without changing data.
const TOUCH_FILE: &str = "last-touch";
/// The tracker's database file; housekeeping touches it constantly.
const DB_FILE: &str = "beads.db";

/// Raw filesystem event class, before flush-time classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RawKind {
    Added,
    Changed,
    Unlinked,
}

/// The coalescer payload: the most recent raw event for a project.
#[derive(Debug, Clone)]
pub struct RawEvent {
    path: PathBuf,
    kind: RawKind,
}

struct WatchedProject {
    root: PathBuf,
    /// Keeps the OS watch alive; dropping it detaches.
    _watcher: RecommendedWatcher,
    pump: tokio::task::JoinHandle<()>,
    /// The last successfully read snapshot. The tokio mutex is held
    /// across re-read + diff + store, serializing flushes per project.
    snapshot: Arc<tokio::sync::Mutex<Option<IssueSnapshot>>>,
    /// A snapshot-class path was touched since the last flush.
    snapshot_touched: Arc<AtomicBool>,
}

/// Orchestrates filesystem watching for any number of projects.
pub struct WatchManager {
    reader: Arc<dyn IssueReader>,
    change_bus: ChangeBus,
    activity_bus: ActivityBus,
    coalescer: Coalescer<RawEvent>,
    messages_dir: Option<PathBuf>,
    retry_attempts: u32,
    retry_delay: Duration,
    watched: Mutex<HashMap<ProjectIdentity, WatchedProject>>,
}

impl WatchManager {
    pub fn new(
        reader: Arc<dyn IssueReader>,
        change_bus: ChangeBus,
        activity_bus: ActivityBus,
        config: &Config,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<WatchManager>| {
            let flush_target = weak.clone();
            let coalescer = Coalescer::new(config.debounce(), move |project, raw| {
                // Flush callback: hand off to an async task. Failures are
                // handled (and swallowed) inside handle_flush.
                if let Some(manager) = flush_target.upgrade() {
                    tokio::spawn(async move {
                        manager.handle_flush(project, raw).await;
                    });
                }
            });
            Self {
                reader,
                change_bus,
                activity_bus,
                coalescer,
                messages_dir: config.messages_dir.clone(),
                retry_attempts: config.read_retry_attempts,
                retry_delay: config.read_retry_delay(),
                watched: Mutex::new(HashMap::new()),
            }
        })
    }

    /// Begin watching a project root. Idempotent: a root that is already
    /// watched (under any spelling) is a no-op.
    ///
    /// Reads a baseline snapshot first so the first real change diffs
    /// against the world as it was, not against nothing.
    pub async fn start_watch(self: &Arc<Self>, root: &Path) -> notify::Result<()> {
        let project = ProjectIdentity::from_root(root);
        if self.is_watching_project(&project) {
            debug!(project = %project, "already watching");
            return Ok(());
        }

        // Opportunistic baseline; a failure downgrades the first diff to
        // "everything created" rather than blocking the watch.
        let baseline = match read_with_retry(
            self.reader.as_ref(),
            root,
            self.retry_attempts,
            self.retry_delay,
        )
        .await
        {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!(project = %project, error = %e, "baseline snapshot read failed");
                None
            }
        };

        let snapshot = Arc::new(tokio::sync::Mutex::new(baseline));
        let snapshot_touched = Arc::new(AtomicBool::new(false));
        let dropped = Arc::new(AtomicU64::new(0));

        let (tx, mut rx) = mpsc::channel::<RawEvent>(EVENT_CHANNEL_CAPACITY);
        let tracker_dir = root.join(TRACKER_DIR);
        let mut watcher = build_watcher(
            tx,
            tracker_dir.clone(),
            self.messages_dir.clone(),
            Arc::clone(&dropped),
        )?;

        if tracker_dir.exists() {
            watcher.watch(&tracker_dir, RecursiveMode::Recursive)?;
            info!(project = %project, dir = %tracker_dir.display(), "watching tracker directory");
        } else {
            warn!(
                project = %project,
                dir = %tracker_dir.display(),
                "tracker directory does not exist; watcher idle"
            );
        }
        if let Some(messages_dir) = &self.messages_dir {
            if messages_dir.exists() {
                watcher.watch(messages_dir, RecursiveMode::Recursive)?;
            }
        }

        // Pump: raw events → snapshot-touch bookkeeping → coalescer.
        let pump = tokio::spawn({
            let manager = Arc::downgrade(self);
            let project = project.clone();
            let snapshot_touched = Arc::clone(&snapshot_touched);
            async move {
                let mut seen_drops = 0u64;
                while let Some(raw) = rx.recv().await {
                    let Some(manager) = manager.upgrade() else { break };

                    if is_snapshot_path(&raw.path) {
                        snapshot_touched.store(true, Ordering::SeqCst);
                    }
                    // Channel overflow means we may have missed a snapshot
                    // touch; force a re-read on the next flush to catch up.
                    let drops = dropped.load(Ordering::SeqCst);
                    if drops > seen_drops {
                        seen_drops = drops;
                        snapshot_touched.store(true, Ordering::SeqCst);
                        info!(project = %project, dropped_total = drops, "watcher events dropped; forcing catch-up re-read");
                    }

                    manager.coalescer.queue(project.clone(), raw);
                }
            }
        });

        let mut watched = self.watched.lock().expect("watched lock poisoned");
        // A concurrent start_watch may have won the race; keep the first.
        watched.entry(project).or_insert(WatchedProject {
            root: root.to_path_buf(),
            _watcher: watcher,
            pump,
            snapshot,
            snapshot_touched,
        });
        Ok(())
    }

    /// Stop watching a project: cancel its pending coalesced flush and
    /// detach the watcher.
    pub fn stop_watch(&self, root: &Path) {
        let project = ProjectIdentity::from_root(root);
        let removed = {
            let mut watched = self.watched.lock().expect("watched lock poisoned");
            watched.remove(&project)
        };
        if let Some(entry) = removed {
            self.coalescer.cancel(&project);
            entry.pump.abort();
            info!(project = %project, "stopped watching");
        }
    }

    /// Stop every watched project.
    pub fn stop_all(&self) {
        let drained: Vec<(ProjectIdentity, WatchedProject)> = {
            let mut watched = self.watched.lock().expect("watched lock poisoned");
            watched.drain().collect()
        };
        self.coalescer.cancel_all();
        for (project, entry) in drained {
            entry.pump.abort();
            debug!(project = %project, "stopped watching");
        }
    }

    pub fn is_watching(&self, root: &Path) -> bool {
        self.is_watching_project(&ProjectIdentity::from_root(root))
    }

    fn is_watching_project(&self, project: &ProjectIdentity) -> bool {
        self.watched
            .lock()
            .expect("watched lock poisoned")
            .contains_key(project)
    }

    pub fn watched_projects(&self) -> Vec<ProjectIdentity> {
        self.watched
            .lock()
            .expect("watched lock poisoned")
            .keys()
            .cloned()
            .collect()
    }

    /// One debounced flush for one project.
    async fn handle_flush(&self, project: ProjectIdentity, raw: RawEvent) {
        let (root, snapshot, snapshot_touched) = {
            let watched = self.watched.lock().expect("watched lock poisoned");
            match watched.get(&project) {
                Some(entry) => (
                    entry.root.clone(),
                    Arc::clone(&entry.snapshot),
                    Arc::clone(&entry.snapshot_touched),
                ),
                // stop_watch raced the pending flush; nothing to do.
                None => return,
            }
        };

        let touched = snapshot_touched.swap(false, Ordering::SeqCst);
        let kind = classify_flush(&raw, touched);
        self.change_bus
            .emit(ChangeEvent::new(project.clone(), Some(raw.path), kind));

        if kind == ChangeKind::Telemetry {
            return;
        }

        // Serialize re-read + diff + store per project.
        let mut stored = snapshot.lock().await;

        let current = match read_with_retry(
            self.reader.as_ref(),
            &root,
            self.retry_attempts,
            self.retry_delay,
        )
        .await
        {
            Ok(snapshot) => snapshot,
            Err(e) => {
                // Keep the previous snapshot so the next successful flush
                // still diffs against real state.
                warn!(project = %project, error = %e, "snapshot re-read failed; keeping previous snapshot");
                return;
            }
        };

        let project_name = project.short_name().to_string();
        let events = diff_snapshots(stored.as_ref(), &current, &project, &project_name, Utc::now());
        *stored = Some(current);
        drop(stored);

        for event in events {
            self.activity_bus.emit(event);
        }
    }
}

/// Flush-time classification.
///
/// `snapshot_touched` reports whether any snapshot-class path was seen
/// since the last flush — a database touch with none is housekeeping, not
/// data.
fn classify_flush(raw: &RawEvent, snapshot_touched: bool) -> ChangeKind {
    let name = raw
        .path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    if name == TOUCH_FILE {
        ChangeKind::Telemetry
    } else if name == DB_FILE && !snapshot_touched {
        ChangeKind::Telemetry
    } else if raw.kind == RawKind::Unlinked {
        ChangeKind::RenamedOrRemoved
    } else {
        ChangeKind::ContentChanged
    }
}

/// Snapshot file or one of its write-ahead variants
/// (`issues.jsonl`, `issues.jsonl.wal`, `issues.jsonl.tmp`, ...).
fn is_snapshot_path(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|name| name.starts_with(SNAPSHOT_FILE))
        .unwrap_or(false)
}

/// Paths the pipeline cares about; everything else is filtered on the
/// notify thread before it reaches the channel.
fn is_interesting(path: &Path, tracker_dir: &Path, messages_dir: Option<&Path>) -> bool {
    if let Some(dir) = messages_dir {
        if path.starts_with(dir) {
            return true;
        }
    }
    if !path.starts_with(tracker_dir) {
        return false;
    }
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    name.starts_with(SNAPSHOT_FILE) || name == DB_FILE || name == TOUCH_FILE
}

fn build_watcher(
    tx: mpsc::Sender<RawEvent>,
    tracker_dir: PathBuf,
    messages_dir: Option<PathBuf>,
    dropped: Arc<AtomicU64>,
) -> notify::Result<RecommendedWatcher> {
    notify::recommended_watcher(move |res: Result<notify::Event, notify::Error>| match res {
        Ok(event) => {
            let kind = match event.kind {
                EventKind::Remove(_) => RawKind::Unlinked,
                EventKind::Create(_) => RawKind::Added,
                EventKind::Modify(_) => RawKind::Changed,
                _ => return,
            };
            for path in event.paths {
                if !is_interesting(&path, &tracker_dir, messages_dir.as_deref()) {
                    continue;
                }
                if tx.try_send(RawEvent { path, kind }).is_err() {
                    let count = dropped.fetch_add(1, Ordering::Relaxed) + 1;
                    if count == 1 || count % 100 == 0 {
                        warn!(dropped_total = count, "watcher channel full; event dropped");
                    }
                }
            }
        }
        Err(e) => {
            error!(error = %e, "filesystem watcher error");
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::BusEvent;
    use crate::reader::JsonlIssueReader;
    use beads_live_core::ActivityKind;

    fn raw(path: &str, kind: RawKind) -> RawEvent {
        RawEvent {
            path: PathBuf::from(path),
            kind,
        }
    }

    #[test]
    fn test_classify_touch_marker_is_telemetry() {
        let event = raw("/p/.beads/last-touch", RawKind::Changed);
        assert_eq!(classify_flush(&event, false), ChangeKind::Telemetry);
        // Even when a snapshot path was also touched, the marker itself
        // stays telemetry — the snapshot event gets its own flush window.
        assert_eq!(classify_flush(&event, true), ChangeKind::Telemetry);
    }

    #[test]
    fn test_classify_db_touch_without_snapshot_is_telemetry() {
        let event = raw("/p/.beads/beads.db", RawKind::Changed);
        assert_eq!(classify_flush(&event, false), ChangeKind::Telemetry);
    }

    #[test]
    fn test_classify_db_touch_with_snapshot_is_content() {
        let event = raw("/p/.beads/beads.db", RawKind::Changed);
        assert_eq!(classify_flush(&event, true), ChangeKind::ContentChanged);
    }

    #[test]
    fn test_classify_snapshot_write_is_content() {
        let event = raw("/p/.beads/issues.jsonl", RawKind::Changed);
        assert_eq!(classify_flush(&event, false), ChangeKind::ContentChanged);
    }

    #[test]
    fn test_classify_unlink_is_renamed_or_removed() {
        let event = raw("/p/.beads/issues.jsonl", RawKind::Unlinked);
        assert_eq!(classify_flush(&event, false), ChangeKind::RenamedOrRemoved);
    }

    #[test]
    fn test_is_snapshot_path_covers_wal_variants() {
        assert!(is_snapshot_path(Path::new("/p/.beads/issues.jsonl")));
        assert!(is_snapshot_path(Path::new("/p/.beads/issues.jsonl.wal")));
        assert!(is_snapshot_path(Path::new("/p/.beads/issues.jsonl.tmp")));
        assert!(!is_snapshot_path(Path::new("/p/.beads/beads.db")));
    }

    #[test]
    fn test_is_interesting_filters_unrelated_paths() {
        let tracker = Path::new("/p/.beads");
        assert!(is_interesting(
            Path::new("/p/.beads/issues.jsonl"),
            tracker,
            None
        ));
        assert!(is_interesting(Path::new("/p/.beads/beads.db"), tracker, None));
        assert!(is_interesting(
            Path::new("/p/.beads/last-touch"),
            tracker,
            None
        ));
        assert!(!is_interesting(Path::new("/p/src/main.rs"), tracker, None));
        assert!(!is_interesting(Path::new("/p/.beads/config.yml"), tracker, None));
        assert!(is_interesting(
            Path::new("/mail/agent-a/m-1.json"),
            tracker,
            Some(Path::new("/mail"))
        ));
    }

    // =========================================================================
    // End-to-end pipeline tests (real notify watcher, real filesystem)
    // =========================================================================

    fn write_snapshot(root: &Path, lines: &[&str]) {
        let dir = root.join(TRACKER_DIR);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(SNAPSHOT_FILE), lines.join("\n")).unwrap();
    }

    fn fast_config() -> Config {
        let mut config = Config::default();
        config.debounce_ms = 50;
        config.read_retry_delay_ms = 10;
        config
    }

    async fn recv_with_timeout<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("channel closed")
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_pipeline_emits_activity_for_tracker_change() {
        let dir = tempfile::tempdir().unwrap();
        write_snapshot(dir.path(), &[r#"{"id":"bd-1","title":"A","status":"open"}"#]);

        let change_bus = ChangeBus::new();
        let activity_bus = ActivityBus::new();
        let manager = WatchManager::new(
            Arc::new(JsonlIssueReader::new()),
            change_bus.clone(),
            activity_bus.clone(),
            &fast_config(),
        );

        let (change_tx, mut change_rx) = mpsc::unbounded_channel();
        let _change_sub = change_bus.subscribe(None, move |e: &ChangeEvent| {
            let _ = change_tx.send(e.clone());
        });
        let (activity_tx, mut activity_rx) = mpsc::unbounded_channel();
        let _activity_sub = activity_bus.subscribe(None, move |e| {
            let _ = activity_tx.send(e.clone());
        });

        manager.start_watch(dir.path()).await.unwrap();
        assert!(manager.is_watching(dir.path()));

        // Mutate the tracker: bd-1 closes.
        write_snapshot(dir.path(), &[r#"{"id":"bd-1","title":"A","status":"closed"}"#]);

        let change = recv_with_timeout(&mut change_rx).await;
        assert_eq!(change.kind, ChangeKind::ContentChanged);

        // Baseline was taken at start_watch, so this is a close — not a
        // mass "created" diff against nothing.
        let activity = recv_with_timeout(&mut activity_rx).await;
        assert_eq!(activity.kind, ActivityKind::Closed);
        assert_eq!(activity.issue_id, "bd-1");
        assert!(activity.id() > 0);

        manager.stop_all();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_telemetry_touch_does_not_trigger_activity() {
        let dir = tempfile::tempdir().unwrap();
        write_snapshot(dir.path(), &[r#"{"id":"bd-1","title":"A","status":"open"}"#]);

        let change_bus = ChangeBus::new();
        let activity_bus = ActivityBus::new();
        let manager = WatchManager::new(
            Arc::new(JsonlIssueReader::new()),
            change_bus.clone(),
            activity_bus.clone(),
            &fast_config(),
        );

        let (change_tx, mut change_rx) = mpsc::unbounded_channel();
        let _change_sub = change_bus.subscribe(None, move |e: &ChangeEvent| {
            let _ = change_tx.send(e.clone());
        });
        let (activity_tx, mut activity_rx) = mpsc::unbounded_channel();
        let _activity_sub = activity_bus.subscribe(None, move |e| {
            let _ = activity_tx.send(e.clone());
        });

        manager.start_watch(dir.path()).await.unwrap();

        // Heartbeat pulse: only the marker file is touched.
        std::fs::write(dir.path().join(TRACKER_DIR).join(TOUCH_FILE), b"now").unwrap();

        let change = recv_with_timeout(&mut change_rx).await;
        assert_eq!(change.kind, ChangeKind::Telemetry);

        // No activity may follow a telemetry flush.
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(activity_rx.try_recv().is_err());

        manager.stop_all();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_start_watch_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        write_snapshot(dir.path(), &[r#"{"id":"bd-1","title":"A","status":"open"}"#]);

        let manager = WatchManager::new(
            Arc::new(JsonlIssueReader::new()),
            ChangeBus::new(),
            ActivityBus::new(),
            &fast_config(),
        );

        manager.start_watch(dir.path()).await.unwrap();
        // Different spelling of the same root: still one watched project.
        let respelled = format!("{}/", dir.path().display());
        manager.start_watch(Path::new(&respelled)).await.unwrap();
        assert_eq!(manager.watched_projects().len(), 1);

        manager.stop_all();
        assert!(manager.watched_projects().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_stop_watch_silences_the_project() {
        let dir = tempfile::tempdir().unwrap();
        write_snapshot(dir.path(), &[r#"{"id":"bd-1","title":"A","status":"open"}"#]);

        let change_bus = ChangeBus::new();
        let manager = WatchManager::new(
            Arc::new(JsonlIssueReader::new()),
            change_bus.clone(),
            ActivityBus::new(),
            &fast_config(),
        );

        let (change_tx, mut change_rx) = mpsc::unbounded_channel();
        let _change_sub = change_bus.subscribe(None, move |e: &ChangeEvent| {
            let _ = change_tx.send(e.clone());
        });

        manager.start_watch(dir.path()).await.unwrap();
        manager.stop_watch(dir.path());
        assert!(!manager.is_watching(dir.path()));

        write_snapshot(dir.path(), &[r#"{"id":"bd-1","title":"A","status":"closed"}"#]);
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(change_rx.try_recv().is_err());
    }
}
