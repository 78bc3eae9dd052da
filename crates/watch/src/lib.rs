//! Watch pipeline, event buses, and the process composition root.
//!
//! Raw filesystem events are noisy, batched, and unordered. This crate
//! turns them into something agents and a UI can subscribe to:
//!
//! ```text
//! OS file event → coalescer (debounce) → watch manager (classify)
//!   → change bus ── telemetry touches stop here
//!   → re-read snapshot → differ → activity bus → SSE frame streams
//! ```
//!
//! Everything is explicitly constructed and dependency-injected; the
//! [`runtime::Runtime`] is the only place the pieces meet.

pub mod bus;
pub mod change;
pub mod coalescer;
pub mod config;
pub mod frame;
pub mod manager;
pub mod reader;
pub mod retry;
pub mod runtime;
pub mod stream;

pub use bus::{ActivityBus, BusEvent, ChangeBus, EventBus, Subscription};
pub use change::{ChangeEvent, ChangeKind};
pub use coalescer::Coalescer;
pub use config::Config;
pub use frame::{Frame, FrameKind, CONNECTED_FRAME, HEARTBEAT_FRAME};
pub use manager::WatchManager;
pub use reader::JsonlIssueReader;
pub use runtime::Runtime;
pub use stream::{activity_frames, change_frames};
