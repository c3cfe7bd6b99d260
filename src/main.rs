mod cli;

use clap::Parser;
use cli::Cli;
use rundev::{
    server, AppState, BackendConfig, Config, Error as RundevError, Forwarder, IgnoreSet,
    MirrorSyncer, Nanny, ProcOpts, ProcessNanny, SyncConfig, SyncGate,
};
use std::sync::Arc;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        if let Some(err) = e.downcast_ref::<RundevError>() {
            eprintln!("Error: {}", err);
            if let Some(suggestion) = err.suggestion() {
                eprintln!("\nHint: {}", suggestion);
            }
        } else {
            eprintln!("Error: {:#}", e);
        }
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let local_dir = cli.dir.canonicalize().map_err(|e| {
        RundevError::Config(format!("invalid source directory {}: {}", cli.dir.display(), e))
    })?;
    let run_dir = cli
        .run_dir
        .unwrap_or_else(|| local_dir.join(".rundev").join("worktree"));
    std::fs::create_dir_all(&run_dir)?;
    let run_dir = run_dir.canonicalize()?;

    let mut ignores = IgnoreSet::with_defaults(cli.ignores);
    // A run dir nested inside the source tree must never feed back into the
    // checksum; ignore its topmost component.
    if let Ok(rel) = run_dir.strip_prefix(&local_dir) {
        if let Some(first) = rel.components().next() {
            ignores.insert(first.as_os_str().to_string_lossy().into_owned());
        }
    }

    let port = match cli.port {
        Some(port) => port,
        None => server::free_port().await?,
    };

    let (command, args) = cli
        .command
        .split_first()
        .ok_or_else(|| RundevError::Config("no backend command given".to_string()))?;

    let config = Arc::new(Config {
        listen_addr: cli.addr,
        backend: BackendConfig {
            command: command.clone(),
            args: args.to_vec(),
            port,
            work_dir: run_dir.clone(),
        },
        sync: SyncConfig {
            local_dir: local_dir.clone(),
            run_dir: run_dir.clone(),
            ignores: ignores.clone(),
        },
    });

    let nanny = Arc::new(ProcessNanny::new(
        command.clone(),
        args.to_vec(),
        ProcOpts {
            port: Some(port),
            work_dir: run_dir.clone(),
        },
    ));
    let provider = Arc::new(MirrorSyncer::new(local_dir, run_dir, ignores));
    let gate = Arc::new(SyncGate::new(provider, nanny.clone()));
    let forwarder = Arc::new(Forwarder::new(format!("http://127.0.0.1:{}", port))?);

    tracing::info!(
        command = %nanny.command_line(),
        port,
        "supervising backend command"
    );

    let state = AppState {
        gate,
        forwarder,
        nanny: nanny.clone(),
        config,
    };

    let shutdown = {
        let nanny = nanny.clone();
        async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down, killing backend");
            nanny.kill();
        }
    };

    server::serve(state, cli.addr, shutdown).await?;
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}
