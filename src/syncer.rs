//! The snapshot & sync provider contract, and the shipped implementation.
//!
//! [`SyncProvider`] is the seam the gate consumes: a deterministic checksum
//! of the local tree, and a reconcile operation that brings the sync target
//! up to date. The byte-level transfer mechanism lives entirely behind this
//! trait; [`MirrorSyncer`] reconciles a local run directory by full-file
//! copy and prune.

use crate::config::IgnoreSet;
use crate::error::{Error, Result};
use crate::snapshot::{self, Checksum};
use async_trait::async_trait;
use std::fs;
use std::path::{Path, PathBuf};

/// Checksum/sync contract consumed by the sync-gated transport.
#[async_trait]
pub trait SyncProvider: Send + Sync {
    /// Deterministic digest of the current local tree, honoring the
    /// configured ignore set.
    async fn checksum(&self) -> Result<Checksum>;

    /// Reconcile the sync target with the current local tree. Returns
    /// whether anything was written.
    async fn sync(&self) -> Result<bool>;
}

/// Mirrors the local source tree into the backend's run directory.
///
/// Reconciliation is whole-file: new and changed files are rewritten,
/// directories are created as needed, and entries absent from the local tree
/// are pruned from the run dir. Ignored names are neither copied nor pruned,
/// so backend-generated state (caches, virtualenvs) survives a sync as long
/// as it is ignored.
pub struct MirrorSyncer {
    local_dir: PathBuf,
    run_dir: PathBuf,
    ignores: IgnoreSet,
}

impl MirrorSyncer {
    pub fn new(local_dir: PathBuf, run_dir: PathBuf, ignores: IgnoreSet) -> Self {
        Self {
            local_dir,
            run_dir,
            ignores,
        }
    }

    pub fn local_dir(&self) -> &Path {
        &self.local_dir
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    pub fn ignores(&self) -> &IgnoreSet {
        &self.ignores
    }
}

#[async_trait]
impl SyncProvider for MirrorSyncer {
    async fn checksum(&self) -> Result<Checksum> {
        let local = self.local_dir.clone();
        let ignores = self.ignores.clone();
        tokio::task::spawn_blocking(move || {
            snapshot::walk(&local, &ignores).map(|s| s.root_checksum().clone())
        })
        .await
        .map_err(|e| Error::Filesystem(format!("checksum task failed: {}", e)))?
    }

    async fn sync(&self) -> Result<bool> {
        let local = self.local_dir.clone();
        let run = self.run_dir.clone();
        let ignores = self.ignores.clone();
        tokio::task::spawn_blocking(move || reconcile(&local, &run, &ignores))
            .await
            .map_err(|e| Error::Sync(format!("sync task failed: {}", e)))?
    }
}

/// Mirror `local` into `target`. Returns whether anything changed on disk.
fn reconcile(local: &Path, target: &Path, ignores: &IgnoreSet) -> Result<bool> {
    if !target.exists() {
        fs::create_dir_all(target)
            .map_err(|e| Error::Sync(format!("cannot create {}: {}", target.display(), e)))?;
    }
    let mut changed = false;
    mirror_dir(local, target, ignores, &mut changed)?;
    Ok(changed)
}

fn mirror_dir(local: &Path, target: &Path, ignores: &IgnoreSet, changed: &mut bool) -> Result<()> {
    let mut local_names: Vec<String> = Vec::new();

    let entries = fs::read_dir(local)
        .map_err(|e| Error::Sync(format!("cannot read {}: {}", local.display(), e)))?;
    for entry in entries {
        let entry =
            entry.map_err(|e| Error::Sync(format!("cannot read {}: {}", local.display(), e)))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if ignores.matches(&name) {
            continue;
        }
        let src = entry.path();
        let meta = fs::symlink_metadata(&src)
            .map_err(|e| Error::Sync(format!("cannot stat {}: {}", src.display(), e)))?;
        if !meta.is_dir() && !meta.is_file() {
            continue;
        }
        let dst = target.join(&name);
        if meta.is_dir() {
            if dst.exists() && !dst.is_dir() {
                fs::remove_file(&dst)
                    .map_err(|e| Error::Sync(format!("cannot remove {}: {}", dst.display(), e)))?;
                *changed = true;
            }
            if !dst.exists() {
                fs::create_dir_all(&dst)
                    .map_err(|e| Error::Sync(format!("cannot create {}: {}", dst.display(), e)))?;
                *changed = true;
            }
            mirror_dir(&src, &dst, ignores, changed)?;
        } else {
            copy_if_changed(&src, &dst, changed)?;
        }
        local_names.push(name);
    }

    // Prune target entries that no longer exist locally. Ignored names are
    // left alone: the backend may keep its own state there.
    let entries = fs::read_dir(target)
        .map_err(|e| Error::Sync(format!("cannot read {}: {}", target.display(), e)))?;
    for entry in entries {
        let entry =
            entry.map_err(|e| Error::Sync(format!("cannot read {}: {}", target.display(), e)))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if ignores.matches(&name) || local_names.iter().any(|n| n == &name) {
            continue;
        }
        let stale = entry.path();
        let result = if stale.is_dir() {
            fs::remove_dir_all(&stale)
        } else {
            fs::remove_file(&stale)
        };
        result.map_err(|e| Error::Sync(format!("cannot prune {}: {}", stale.display(), e)))?;
        *changed = true;
    }

    Ok(())
}

fn copy_if_changed(src: &Path, dst: &Path, changed: &mut bool) -> Result<()> {
    let contents =
        fs::read(src).map_err(|e| Error::Sync(format!("cannot read {}: {}", src.display(), e)))?;
    let perms = fs::metadata(src)
        .map_err(|e| Error::Sync(format!("cannot stat {}: {}", src.display(), e)))?
        .permissions();
    if dst.is_file() {
        if let Ok(existing) = fs::read(dst) {
            if existing == contents {
                // Content matches but the mode may not (a local chmod with
                // no edit); an executable entrypoint must stay executable
                // in the run dir.
                let current = fs::metadata(dst)
                    .map_err(|e| Error::Sync(format!("cannot stat {}: {}", dst.display(), e)))?
                    .permissions();
                if current != perms {
                    fs::set_permissions(dst, perms).map_err(|e| {
                        Error::Sync(format!("cannot chmod {}: {}", dst.display(), e))
                    })?;
                    *changed = true;
                }
                return Ok(());
            }
        }
    } else if dst.exists() {
        // A directory where a file should be.
        fs::remove_dir_all(dst)
            .map_err(|e| Error::Sync(format!("cannot remove {}: {}", dst.display(), e)))?;
    }
    fs::write(dst, contents)
        .map_err(|e| Error::Sync(format!("cannot write {}: {}", dst.display(), e)))?;
    fs::set_permissions(dst, perms)
        .map_err(|e| Error::Sync(format!("cannot chmod {}: {}", dst.display(), e)))?;
    *changed = true;
    Ok(())
}
