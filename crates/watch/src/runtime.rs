//! Process composition root.
//!
//! There are no ambient globals: the two buses, the watch manager, and
//! the reservation ledger are constructed here, owned by the embedding
//! process, and handed to whatever serves them (route layer, CLI, tests).

use std::sync::Arc;

use anyhow::Context as _;
use tracing::info;

use beads_live_core::IssueReader;
use beads_live_ledger::ReservationLedger;

use crate::bus::{ActivityBus, ChangeBus};
use crate::config::Config;
use crate::manager::WatchManager;
use crate::reader::JsonlIssueReader;

/// Everything a process needs to run the coordination substrate.
pub struct Runtime {
    pub config: Config,
    pub change_bus: ChangeBus,
    pub activity_bus: ActivityBus,
    pub watch_manager: Arc<WatchManager>,
    pub ledger: ReservationLedger,
}

impl Runtime {
    /// Start with the default JSONL snapshot reader.
    pub fn start(config: Config) -> anyhow::Result<Self> {
        Self::start_with_reader(config, Arc::new(JsonlIssueReader::new()))
    }

    /// Start with an injected snapshot reader (fakes in tests, alternate
    /// storage engines in embedders).
    pub fn start_with_reader(
        config: Config,
        reader: Arc<dyn IssueReader>,
    ) -> anyhow::Result<Self> {
        let change_bus = ChangeBus::new();
        let activity_bus = ActivityBus::with_history_file(config.activity_history_path());
        let ledger = ReservationLedger::open(config.ledger_dir())
            .context("opening reservation ledger")?;
        let watch_manager =
            WatchManager::new(reader, change_bus.clone(), activity_bus.clone(), &config);

        info!(
            state_dir = %config.state_dir.display(),
            debounce_ms = config.debounce_ms,
            "beads-live runtime started"
        );

        Ok(Self {
            config,
            change_bus,
            activity_bus,
            watch_manager,
            ledger,
        })
    }

    /// Detach every watcher and discard pending flushes.
    pub fn stop_all(&self) {
        self.watch_manager.stop_all();
        info!("beads-live runtime stopped");
    }
}

/// Wire the tracing subscriber for a process that has no other one.
/// `RUST_LOG` wins; the default level is `info`.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
