//! Supervisor behavior against real child processes.

use rundev::{Nanny, ProcOpts, ProcessNanny};
use std::fs;
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::sleep;

fn sh_nanny(script: &str, dir: &TempDir, port: Option<u16>) -> ProcessNanny {
    ProcessNanny::new(
        "sh".to_string(),
        vec!["-c".to_string(), script.to_string()],
        ProcOpts {
            port,
            work_dir: dir.path().to_path_buf(),
        },
    )
}

fn alive(pid: u32) -> bool {
    nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid as i32), None).is_ok()
}

#[tokio::test]
async fn restart_launches_a_running_child() {
    let dir = TempDir::new().unwrap();
    let nanny = sh_nanny("sleep 30", &dir, None);

    assert!(!nanny.running());
    nanny.restart().await.unwrap();
    assert!(nanny.running());
    let pid = nanny.pid().unwrap();
    assert!(alive(pid));
    assert!(nanny.started_at().is_some());

    nanny.kill();
    assert!(!nanny.running());
    assert_eq!(nanny.pid(), None);
}

#[tokio::test]
async fn restart_replaces_the_previous_child() {
    let dir = TempDir::new().unwrap();
    let nanny = sh_nanny("echo $$ >> pids; sleep 30", &dir, None);

    nanny.restart().await.unwrap();
    let first = nanny.pid().unwrap();
    for _ in 0..50 {
        if dir.path().join("pids").exists() {
            break;
        }
        sleep(Duration::from_millis(100)).await;
    }
    nanny.restart().await.unwrap();
    let second = nanny.pid().unwrap();
    assert_ne!(first, second);
    assert!(nanny.running());

    // The first child was killed; give the exit watcher a beat to reap it.
    sleep(Duration::from_millis(500)).await;
    assert!(!alive(first));
    assert!(alive(second));

    let pids = fs::read_to_string(dir.path().join("pids")).unwrap();
    assert_eq!(pids.lines().count(), 2);

    nanny.kill();
}

#[tokio::test]
async fn child_exit_clears_running() {
    let dir = TempDir::new().unwrap();
    let nanny = sh_nanny("true", &dir, None);

    nanny.restart().await.unwrap();
    for _ in 0..50 {
        if !nanny.running() {
            break;
        }
        sleep(Duration::from_millis(100)).await;
    }
    assert!(!nanny.running());
    assert_eq!(nanny.pid(), None);
}

#[tokio::test]
async fn launch_failure_reports_error_and_not_running() {
    let dir = TempDir::new().unwrap();
    let nanny = ProcessNanny::new(
        "definitely-not-a-real-command".to_string(),
        vec![],
        ProcOpts {
            port: None,
            work_dir: dir.path().to_path_buf(),
        },
    );

    assert!(nanny.restart().await.is_err());
    assert!(!nanny.running());
    assert_eq!(nanny.pid(), None);
}

#[tokio::test]
async fn port_is_injected_and_cwd_is_the_run_dir() {
    let dir = TempDir::new().unwrap();
    let nanny = sh_nanny("echo \"$PORT\" > env.txt; pwd > cwd.txt", &dir, Some(7777));

    nanny.restart().await.unwrap();
    for _ in 0..50 {
        if dir.path().join("cwd.txt").exists() && dir.path().join("env.txt").exists() {
            break;
        }
        sleep(Duration::from_millis(100)).await;
    }
    sleep(Duration::from_millis(100)).await;

    let port = fs::read_to_string(dir.path().join("env.txt")).unwrap();
    assert_eq!(port.trim(), "7777");
    let cwd = fs::read_to_string(dir.path().join("cwd.txt")).unwrap();
    assert_eq!(
        fs::canonicalize(cwd.trim()).unwrap(),
        fs::canonicalize(dir.path()).unwrap()
    );
}

#[tokio::test]
async fn kill_twice_is_harmless() {
    let dir = TempDir::new().unwrap();
    let nanny = sh_nanny("sleep 30", &dir, None);

    nanny.restart().await.unwrap();
    nanny.kill();
    nanny.kill();
    assert!(!nanny.running());
}
