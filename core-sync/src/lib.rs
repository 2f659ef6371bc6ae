//! # Offline Content Synchronization Engine
//!
//! Keeps a local cache of remote course content usable offline. The engine
//! mirrors course file metadata and dashboard cards into SQLite, decides
//! which files are stale against their completed-download records, and
//! downloads them with bounded concurrency while publishing progress events.
//!
//! ## Modules
//!
//! - [`settings`]: resolves per-course sync configuration into applicable
//!   file sets
//! - [`staleness`]: timestamp-based staleness detection
//! - [`snapshot`]: wholesale replacement of cached metadata snapshots
//! - [`orchestrator`]: session lifecycle, bounded downloads, cancellation
//! - [`progress`]: aggregation of file rows into course and session states
//! - [`events`]: broadcast channel for observing a running session
//! - [`logging`]: tracing subscriber setup

pub mod error;
pub mod events;
pub mod logging;
pub mod orchestrator;
pub mod progress;
pub mod settings;
pub mod snapshot;
pub mod staleness;

pub use error::{Result, SyncError};
pub use events::{EventBus, SyncEvent, DEFAULT_EVENT_BUFFER_SIZE};
pub use logging::{init_logging, LogFormat, LoggingConfig};
pub use orchestrator::{SyncConfig, SyncOrchestrator};
pub use progress::{aggregate_state, fraction_complete, ProgressAggregator};
pub use settings::{SyncMode, SyncSettingsResolver};
pub use snapshot::SnapshotReplacer;
pub use staleness::{is_stale, StalenessDetector};
