//! # rundev
//!
//! A sync-gated local development proxy: it serves HTTP requests through a
//! reverse proxy whose backend is a supervised child process, and before
//! forwarding each request it guarantees the backend's working copy reflects
//! the latest local source tree, restarting the backend when the tree has
//! changed. Edit files locally; requests are served by a process that is
//! transparently kept in sync and rebooted on change.
//!
//! ## Request flow
//!
//! ```text
//! inbound request ──► router ──► /rundev/* introspection handlers
//!                        │
//!                        └──► gate cycle ──► [checksum compare]
//!                                 │  unchanged         │ changed
//!                                 ▼                    ▼
//!                            forward to backend   sync + restart, then forward
//! ```
//!
//! ## Concurrency model
//!
//! Requests are handled concurrently. The gate serializes the
//! compare-sync-restart cycle under one async mutex so concurrent requests
//! that observe the same change collapse into a single sync/restart; the
//! supervisor's process record is guarded by a read-write lock and stale
//! exit notifications are discarded by generation comparison.

pub mod config;
pub mod error;
pub mod gate;
pub mod nanny;
pub mod proxy;
pub mod server;
pub mod snapshot;
pub mod syncer;

// Re-export commonly used types
pub use config::{BackendConfig, Config, IgnoreSet, SyncConfig};
pub use error::{Error, Result};
pub use gate::{GateOutcome, SyncGate};
pub use nanny::{Nanny, ProcOpts, ProcessNanny};
pub use proxy::Forwarder;
pub use server::{AppState, HDR_RUNDEV_CHECKSUM};
pub use snapshot::{Checksum, FsNode, Snapshot};
pub use syncer::{MirrorSyncer, SyncProvider};
