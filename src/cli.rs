use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "rundev")]
#[command(about = "Sync-gated local development proxy: keeps a backend process in sync with your source tree and restarts it on change")]
pub struct Cli {
    /// Address the proxy listens on
    #[arg(short, long, default_value = "127.0.0.1:8080")]
    pub addr: SocketAddr,

    /// Local source directory to watch and sync
    #[arg(short, long, default_value = ".")]
    pub dir: PathBuf,

    /// Backend working copy (defaults to <dir>/.rundev/worktree)
    #[arg(long)]
    pub run_dir: Option<PathBuf>,

    /// Port the backend listens on; injected as PORT=<n> (defaults to a
    /// random free port)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Path-component names to exclude from snapshots and sync (can be
    /// repeated; .git, node_modules etc. are always excluded)
    #[arg(long = "ignore", value_name = "NAME")]
    pub ignores: Vec<String>,

    /// Backend command and arguments (after --)
    #[arg(last = true, required = true)]
    pub command: Vec<String>,
}
