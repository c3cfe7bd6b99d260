//! Runtime configuration.
//!
//! rundev is configured entirely from the command line; these structs are the
//! resolved form handed to the components. The backend's working copy (the
//! "run dir") is always part of the ignore set so syncing into it can never
//! feed back into the checksum.

use serde::Serialize;
use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Directory names excluded from the snapshot walk by default.
pub const DEFAULT_IGNORES: &[&str] = &[".git", ".hg", ".rundev", "node_modules", "__pycache__"];

/// How the backend process is launched.
#[derive(Debug, Clone, Serialize)]
pub struct BackendConfig {
    /// Executable to run.
    pub command: String,
    /// Arguments passed to the executable.
    pub args: Vec<String>,
    /// Port the backend is expected to listen on. Injected as `PORT=<n>`
    /// into the child environment and used as the proxy target.
    pub port: u16,
    /// Working directory for the child (the synced run dir).
    pub work_dir: PathBuf,
}

/// What gets synced and from where.
#[derive(Debug, Clone, Serialize)]
pub struct SyncConfig {
    /// Local source tree being edited.
    pub local_dir: PathBuf,
    /// Backend working copy kept in sync with `local_dir`.
    pub run_dir: PathBuf,
    /// Path-component names excluded from snapshots and sync.
    pub ignores: IgnoreSet,
}

/// Top-level resolved configuration.
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// Address the proxy listens on.
    pub listen_addr: SocketAddr,
    pub backend: BackendConfig,
    pub sync: SyncConfig,
}

/// Set of path-component names to skip during tree walks.
///
/// Matching is by exact component name (`.git`, `node_modules`), not glob,
/// mirroring how the snapshot walk compares `file_name` per entry. A
/// `BTreeSet` keeps the set ordered so the ignore set itself is
/// deterministic input to the checksum contract.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IgnoreSet {
    names: BTreeSet<String>,
}

impl IgnoreSet {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Default ignores plus any extra names.
    pub fn with_defaults<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut names: BTreeSet<String> =
            DEFAULT_IGNORES.iter().map(|s| s.to_string()).collect();
        names.extend(extra.into_iter().map(Into::into));
        Self { names }
    }

    pub fn insert(&mut self, name: impl Into<String>) {
        self.names.insert(name.into());
    }

    pub fn matches(&self, component: &str) -> bool {
        self.names.contains(component)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_include_git_and_node_modules() {
        let ignores = IgnoreSet::with_defaults(Vec::<String>::new());
        assert!(ignores.matches(".git"));
        assert!(ignores.matches("node_modules"));
        assert!(!ignores.matches("src"));
    }

    #[test]
    fn extra_names_are_added() {
        let ignores = IgnoreSet::with_defaults(vec!["target"]);
        assert!(ignores.matches("target"));
        assert!(ignores.matches(".git"));
    }

    #[test]
    fn iteration_is_sorted() {
        let ignores = IgnoreSet::new(vec!["b", "a", "c"]);
        let names: Vec<&str> = ignores.iter().collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }
}
