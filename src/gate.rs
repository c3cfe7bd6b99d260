//! The sync gate: checksum-compare → sync → restart, run before every
//! proxied request.
//!
//! The gate holds the checksum that was in effect the last time a request
//! was forwarded. When a fresh walk produces the same value the request goes
//! straight through; when it differs (including the very first request) the
//! provider reconciles the run dir and the supervisor restarts the backend
//! before the checksum advances. A failed sync or restart leaves the stored
//! checksum untouched so the next request retries the whole cycle.
//!
//! The compare-sync-restart sequence is serialized under one async mutex:
//! concurrent requests that raced the same change wait for the in-flight
//! cycle, re-compare against the advanced checksum, and skip. The first
//! checksum walk runs outside the lock; a mismatch is confirmed by a second
//! walk under the lock before anything runs.

use crate::error::Result;
use crate::nanny::Nanny;
use crate::snapshot::Checksum;
use crate::syncer::SyncProvider;
use std::sync::Arc;
use tokio::sync::Mutex;

/// What a gate evaluation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateOutcome {
    /// Tree unchanged since the last forwarded request; nothing ran.
    Unchanged,
    /// Tree changed; the run dir was synced and the backend restarted.
    Refreshed,
}

pub struct SyncGate {
    provider: Arc<dyn SyncProvider>,
    nanny: Arc<dyn Nanny>,
    last_forwarded: Mutex<Option<Checksum>>,
}

impl SyncGate {
    pub fn new(provider: Arc<dyn SyncProvider>, nanny: Arc<dyn Nanny>) -> Self {
        Self {
            provider,
            nanny,
            last_forwarded: Mutex::new(None),
        }
    }

    /// Run the gate cycle for one request.
    ///
    /// Errors abort the triggering request only; the stored checksum is
    /// advanced exclusively after both the sync and the restart succeeded.
    pub async fn ensure_fresh(&self) -> Result<GateOutcome> {
        let fresh = self.provider.checksum().await?;

        let mut last = self.last_forwarded.lock().await;
        if last.as_ref() == Some(&fresh) {
            return Ok(GateOutcome::Unchanged);
        }

        // The pre-lock digest may predate a cycle that completed while this
        // caller waited; re-walk under the lock so a stale digest can never
        // be installed over a newer one.
        let fresh = self.provider.checksum().await?;
        if last.as_ref() == Some(&fresh) {
            return Ok(GateOutcome::Unchanged);
        }

        tracing::info!(checksum = %fresh, "local tree changed, syncing and restarting backend");
        self.provider.sync().await?;
        self.nanny.restart().await?;
        *last = Some(fresh);
        Ok(GateOutcome::Refreshed)
    }

    /// Checksum recorded by the last successful gate cycle.
    pub async fn last_forwarded(&self) -> Option<Checksum> {
        self.last_forwarded.lock().await.clone()
    }
}
