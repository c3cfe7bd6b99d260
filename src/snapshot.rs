//! Content-addressed snapshots of the local source tree.
//!
//! A snapshot reduces a directory tree to a single comparable [`Checksum`]:
//! file digests are blake3 over contents, directory digests cover the sorted
//! child names and their digests. Two walks of identical content with the
//! same ignore set always produce the same root checksum, regardless of
//! traversal timing or the order files were created in.

use crate::config::IgnoreSet;
use crate::error::{Error, Result};
use serde::Serialize;
use std::fmt;
use std::fs;
use std::path::Path;

/// Opaque, comparable digest of a tree's content state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Checksum(String);

impl Checksum {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<blake3::Hash> for Checksum {
    fn from(hash: blake3::Hash) -> Self {
        Checksum(hex::encode(hash.as_bytes()))
    }
}

/// One node of a snapshot tree. Serialized as the `/rundev/fsz` payload.
#[derive(Debug, Clone, Serialize)]
pub struct FsNode {
    pub name: String,
    pub checksum: Checksum,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub children: Vec<FsNode>,
}

impl FsNode {
    pub fn is_dir(&self) -> bool {
        self.size.is_none()
    }
}

/// A walked tree plus its root digest.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub root: FsNode,
}

impl Snapshot {
    pub fn root_checksum(&self) -> &Checksum {
        &self.root.checksum
    }
}

/// Walk `root` into a [`Snapshot`], skipping ignored path components.
///
/// Symlinks and special files are skipped entirely; following them would make
/// the digest depend on state outside the tree. Directory entries are hashed
/// in name order, which is what makes the walk deterministic.
pub fn walk(root: &Path, ignores: &IgnoreSet) -> Result<Snapshot> {
    let meta = fs::symlink_metadata(root)
        .map_err(|e| Error::Filesystem(format!("cannot stat {}: {}", root.display(), e)))?;
    if !meta.is_dir() {
        return Err(Error::Filesystem(format!(
            "{} is not a directory",
            root.display()
        )));
    }
    let name = root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| ".".to_string());
    let root = walk_dir(root, name, ignores)?;
    Ok(Snapshot { root })
}

fn walk_dir(dir: &Path, name: String, ignores: &IgnoreSet) -> Result<FsNode> {
    let mut entries: Vec<(String, fs::Metadata, std::path::PathBuf)> = Vec::new();
    let read = fs::read_dir(dir)
        .map_err(|e| Error::Filesystem(format!("cannot read {}: {}", dir.display(), e)))?;
    for entry in read {
        let entry = entry
            .map_err(|e| Error::Filesystem(format!("cannot read {}: {}", dir.display(), e)))?;
        let entry_name = entry.file_name().to_string_lossy().into_owned();
        if ignores.matches(&entry_name) {
            continue;
        }
        let path = entry.path();
        let meta = fs::symlink_metadata(&path)
            .map_err(|e| Error::Filesystem(format!("cannot stat {}: {}", path.display(), e)))?;
        if !meta.is_dir() && !meta.is_file() {
            // Symlinks, sockets, fifos: not part of the content state.
            continue;
        }
        entries.push((entry_name, meta, path));
    }
    // Name order makes the digest independent of readdir order.
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    let mut children = Vec::with_capacity(entries.len());
    let mut hasher = blake3::Hasher::new();
    for (entry_name, meta, path) in entries {
        let child = if meta.is_dir() {
            walk_dir(&path, entry_name, ignores)?
        } else {
            let contents = fs::read(&path).map_err(|e| {
                Error::Filesystem(format!("cannot read {}: {}", path.display(), e))
            })?;
            FsNode {
                name: entry_name,
                checksum: blake3::hash(&contents).into(),
                size: Some(meta.len()),
                children: Vec::new(),
            }
        };
        hasher.update(child.name.as_bytes());
        hasher.update(b"\0");
        hasher.update(child.checksum.as_str().as_bytes());
        hasher.update(b"\n");
        children.push(child);
    }

    Ok(FsNode {
        name,
        checksum: hasher.finalize().into(),
        size: None,
        children,
    })
}
