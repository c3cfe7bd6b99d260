//! Backend process supervision.
//!
//! [`ProcessNanny`] owns zero-or-one live backend child process. `restart`
//! always kills-then-starts, so there is never a window where an old and a
//! new process are both recorded as current. Each started process gets a
//! fresh generation token; the per-process exit watcher only clears liveness
//! if its token still matches the recorded one, which discards stale exit
//! notifications from superseded processes without any PID-reuse assumptions.

use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use parking_lot::RwLock;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::process::Command;

/// Lifecycle owner for the backend process.
#[async_trait]
pub trait Nanny: Send + Sync {
    /// Whether the currently recorded process is believed alive. Never
    /// blocks on process state; safe under concurrent restart/kill.
    fn running(&self) -> bool;

    /// Ensure a fresh backend instance is running: terminate any current
    /// process, then launch a new one. On launch failure no process is
    /// recorded and [`running`](Nanny::running) reports false.
    async fn restart(&self) -> Result<()>;

    /// Terminate and release the current process if any. Safe to call when
    /// nothing is running; killing an already-dead process is not an error.
    fn kill(&self);

    /// PID of the current process, if one is recorded.
    fn pid(&self) -> Option<u32> {
        None
    }

    /// When the current process was started.
    fn started_at(&self) -> Option<DateTime<Utc>> {
        None
    }
}

/// How the backend child is launched.
#[derive(Debug, Clone)]
pub struct ProcOpts {
    /// Injected as `PORT=<n>` on top of the inherited environment.
    pub port: Option<u16>,
    /// Child working directory (the synced run dir).
    pub work_dir: PathBuf,
}

#[derive(Debug, Default)]
struct ProcState {
    /// Process group id of the current child, if any.
    pid: Option<u32>,
    /// Token identifying the current handle; bumped on every install.
    generation: u64,
    active: bool,
    started_at: Option<DateTime<Utc>>,
}

/// Process supervisor for a single backend command.
pub struct ProcessNanny {
    command: String,
    args: Vec<String>,
    opts: ProcOpts,
    state: Arc<RwLock<ProcState>>,
}

impl ProcessNanny {
    pub fn new(command: String, args: Vec<String>, opts: ProcOpts) -> Self {
        Self {
            command,
            args,
            opts,
            state: Arc::new(RwLock::new(ProcState::default())),
        }
    }

    pub fn command_line(&self) -> String {
        std::iter::once(self.command.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// SIGKILL the current process group and clear the record. Termination
    /// errors (process already gone) are swallowed.
    fn kill_current(&self) {
        let mut state = self.state.write();
        if let Some(pid) = state.pid.take() {
            tracing::debug!(pid, "killing backend process group");
            let _ = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL);
        }
        state.active = false;
        state.started_at = None;
    }
}

#[async_trait]
impl Nanny for ProcessNanny {
    fn running(&self) -> bool {
        self.state.read().active
    }

    async fn restart(&self) -> Result<()> {
        self.kill_current();

        let mut cmd = Command::new(&self.command);
        cmd.args(&self.args)
            .current_dir(&self.opts.work_dir)
            .kill_on_drop(false)
            .process_group(0);
        if let Some(port) = self.opts.port {
            cmd.env("PORT", port.to_string());
        }

        let mut child = cmd.spawn().map_err(|e| {
            Error::ProcessLaunch(format!("{}: {}", self.command, e))
        })?;
        let pid = child.id();

        let generation = {
            let mut state = self.state.write();
            state.generation += 1;
            state.pid = pid;
            state.active = true;
            state.started_at = Some(Utc::now());
            state.generation
        };
        tracing::info!(pid, generation, command = %self.command, "backend process started");

        // Exit watcher: reaps the child and clears liveness, but only if this
        // generation is still the recorded one. A later restart/kill
        // supersedes it and its exit must not touch the newer record.
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            let status = child.wait().await;
            let mut state = state.write();
            if state.generation == generation {
                tracing::debug!(pid, generation, ?status, "backend process exited");
                state.active = false;
                state.pid = None;
                state.started_at = None;
            }
        });

        Ok(())
    }

    fn kill(&self) {
        self.kill_current();
    }

    fn pid(&self) -> Option<u32> {
        self.state.read().pid
    }

    fn started_at(&self) -> Option<DateTime<Utc>> {
        self.state.read().started_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn nanny(cmd: &str, args: &[&str], dir: &TempDir) -> ProcessNanny {
        ProcessNanny::new(
            cmd.to_string(),
            args.iter().map(|s| s.to_string()).collect(),
            ProcOpts {
                port: None,
                work_dir: dir.path().to_path_buf(),
            },
        )
    }

    #[tokio::test]
    async fn restart_starts_a_process() {
        let dir = TempDir::new().unwrap();
        let n = nanny("sh", &["-c", "sleep 30"], &dir);
        assert!(!n.running());
        n.restart().await.unwrap();
        assert!(n.running());
        assert!(n.pid().is_some());
        n.kill();
    }

    #[tokio::test]
    async fn restart_replaces_the_process() {
        let dir = TempDir::new().unwrap();
        let n = nanny("sh", &["-c", "sleep 30"], &dir);
        n.restart().await.unwrap();
        let first = n.pid().unwrap();
        n.restart().await.unwrap();
        let second = n.pid().unwrap();
        assert_ne!(first, second);
        assert!(n.running());
        n.kill();
    }

    #[tokio::test]
    async fn natural_exit_clears_running() {
        let dir = TempDir::new().unwrap();
        let n = nanny("sh", &["-c", "exit 0"], &dir);
        n.restart().await.unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(!n.running());
        assert!(n.pid().is_none());
    }

    #[tokio::test]
    async fn stale_exit_does_not_clear_newer_process() {
        let dir = TempDir::new().unwrap();
        // Start a process that exits immediately, then replace it with a
        // long-lived one before the first exit notification lands.
        let fast = nanny("sh", &["-c", "exit 0"], &dir);
        fast.restart().await.unwrap();

        let slow_args = ["-c", "sleep 30"];
        let slow = ProcessNanny {
            command: "sh".to_string(),
            args: slow_args.iter().map(|s| s.to_string()).collect(),
            opts: ProcOpts {
                port: None,
                work_dir: dir.path().to_path_buf(),
            },
            state: Arc::clone(&fast.state),
        };
        slow.restart().await.unwrap();

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(slow.running(), "stale exit must not clear the new process");
        slow.kill();
    }

    #[tokio::test]
    async fn launch_failure_leaves_nothing_running() {
        let dir = TempDir::new().unwrap();
        let n = nanny("/definitely/not/a/real/binary", &[], &dir);
        let err = n.restart().await.unwrap_err();
        assert!(matches!(err, Error::ProcessLaunch(_)));
        assert!(!n.running());
        assert!(n.pid().is_none());
    }

    #[tokio::test]
    async fn restart_recovers_after_launch_failure() {
        let dir = TempDir::new().unwrap();
        let broken = nanny("/definitely/not/a/real/binary", &[], &dir);
        assert!(broken.restart().await.is_err());

        let good = nanny("sh", &["-c", "sleep 30"], &dir);
        good.restart().await.unwrap();
        assert!(good.running());
        good.kill();
    }

    #[tokio::test]
    async fn kill_when_stopped_is_a_noop() {
        let dir = TempDir::new().unwrap();
        let n = nanny("sh", &["-c", "sleep 30"], &dir);
        n.kill();
        assert!(!n.running());
    }

    #[tokio::test]
    async fn kill_stops_a_running_process() {
        let dir = TempDir::new().unwrap();
        let n = nanny("sh", &["-c", "sleep 30"], &dir);
        n.restart().await.unwrap();
        n.kill();
        assert!(!n.running());
        assert!(n.pid().is_none());
    }

    #[tokio::test]
    async fn port_is_injected_into_child_env() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("port.txt");
        let script = format!("printf '%s' \"$PORT\" > {}", out.display());
        let n = ProcessNanny::new(
            "sh".to_string(),
            vec!["-c".to_string(), script],
            ProcOpts {
                port: Some(43210),
                work_dir: dir.path().to_path_buf(),
            },
        );
        n.restart().await.unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "43210");
    }
}
