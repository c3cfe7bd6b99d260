//! The local HTTP surface: `/rundev/*` introspection endpoints plus the
//! reverse-proxy fallback that everything else flows through.

use crate::config::Config;
use crate::error::Error;
use crate::gate::SyncGate;
use crate::nanny::Nanny;
use crate::proxy::Forwarder;
use crate::snapshot;
use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, Response, StatusCode};
use axum::routing::{any, get};
use axum::Router;
use std::fmt::Write as _;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Response header carrying the root checksum on `/rundev/fsz`.
pub const HDR_RUNDEV_CHECKSUM: &str = "x-rundev-checksum";

#[derive(Clone)]
pub struct AppState {
    pub gate: Arc<SyncGate>,
    pub forwarder: Arc<Forwarder>,
    pub nanny: Arc<dyn Nanny>,
    pub config: Arc<Config>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/rundev/fsz", get(fsz_handler))
        .route("/rundev/debugz", get(debugz_handler))
        // Unmatched client endpoints must not leak through to the backend.
        .route("/rundev", any(unsupported_handler))
        .route("/rundev/*rest", any(unsupported_handler))
        .route("/favicon.ico", any(unsupported_handler))
        .fallback(proxy_handler)
        .with_state(state)
}

/// Bind `addr` and serve until `shutdown` resolves.
pub async fn serve(
    state: AppState,
    addr: SocketAddr,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> crate::error::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, backend = %state.forwarder.base(), "rundev proxy listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

/// Probe the OS for a free localhost port.
pub async fn free_port() -> crate::error::Result<u16> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();
    drop(listener);
    Ok(port)
}

/// JSON tree snapshot of the local directory, root checksum in a header.
async fn fsz_handler(State(state): State<AppState>) -> Response<Body> {
    let local = state.config.sync.local_dir.clone();
    let ignores = state.config.sync.ignores.clone();
    let walked = tokio::task::spawn_blocking(move || snapshot::walk(&local, &ignores)).await;
    let snap = match walked {
        Ok(Ok(snap)) => snap,
        Ok(Err(err)) => return internal_error(err.to_string()),
        Err(err) => return internal_error(format!("snapshot task failed: {}", err)),
    };
    let body = match serde_json::to_string_pretty(&snap) {
        Ok(body) => body,
        Err(err) => return internal_error(format!("failed to encode snapshot: {}", err)),
    };
    Response::builder()
        .status(StatusCode::OK)
        .header("content-type", "application/json")
        .header(HDR_RUNDEV_CHECKSUM, snap.root_checksum().as_str())
        .body(Body::from(body))
        .unwrap_or_else(|_| internal_error("failed to build response".to_string()))
}

/// Human-readable dump of the sync/process configuration. Diagnostic only.
async fn debugz_handler(State(state): State<AppState>) -> Response<Body> {
    let local = state.config.sync.local_dir.clone();
    let ignores = state.config.sync.ignores.clone();
    let checksum_line =
        match tokio::task::spawn_blocking(move || snapshot::walk(&local, &ignores)).await {
            Ok(Ok(snap)) => snap.root_checksum().to_string(),
            Ok(Err(err)) => format!("<error: {}>", err),
            Err(err) => format!("<error: snapshot task failed: {}>", err),
        };

    let mut out = String::new();
    let _ = writeln!(out, "fs checksum: {}", checksum_line);
    let _ = writeln!(out, "last forwarded: {}", fmt_last(&state).await);
    let _ = writeln!(out, "sync:");
    let _ = writeln!(out, "  dir:     {}", state.config.sync.local_dir.display());
    let _ = writeln!(out, "  run dir: {}", state.config.sync.run_dir.display());
    let _ = writeln!(
        out,
        "  ignores: [{}]",
        state
            .config
            .sync
            .ignores
            .iter()
            .collect::<Vec<_>>()
            .join(", ")
    );
    let _ = writeln!(out, "backend:");
    let _ = writeln!(out, "  command: {}", state.config.backend.command);
    let _ = writeln!(out, "  args:    {:?}", state.config.backend.args);
    let _ = writeln!(out, "  port:    {}", state.config.backend.port);
    let _ = writeln!(out, "  running: {}", state.nanny.running());
    let _ = writeln!(out, "  pid:     {:?}", state.nanny.pid());
    let _ = writeln!(out, "  started: {:?}", state.nanny.started_at());

    Response::builder()
        .status(StatusCode::OK)
        .header("content-type", "text/plain; charset=utf-8")
        .body(Body::from(out))
        .unwrap_or_else(|_| internal_error("failed to build response".to_string()))
}

async fn fmt_last(state: &AppState) -> String {
    match state.gate.last_forwarded().await {
        Some(checksum) => checksum.to_string(),
        None => "<none>".to_string(),
    }
}

/// 404 for client-side endpoints that don't exist; these must never be
/// proxied to the backend.
async fn unsupported_handler(req: Request<Body>) -> Response<Body> {
    Response::builder()
        .status(StatusCode::NOT_FOUND)
        .header("content-type", "text/plain; charset=utf-8")
        .body(Body::from(format!(
            "unsupported rundev endpoint {}",
            req.uri().path()
        )))
        .unwrap_or_else(|_| internal_error("failed to build response".to_string()))
}

/// Gate cycle, then forward. A gate or transport failure turns into a 502
/// for this one request; the stored checksum only advances on success, so
/// the next request re-triggers the gate.
async fn proxy_handler(State(state): State<AppState>, req: Request<Body>) -> Response<Body> {
    if let Err(err) = state.gate.ensure_fresh().await {
        tracing::error!(error = %err, "gate cycle failed");
        return gateway_error(&err);
    }
    match state.forwarder.forward(req).await {
        Ok(resp) => resp,
        Err(err) => {
            tracing::error!(error = %err, "backend exchange failed");
            gateway_error(&err)
        }
    }
}

fn gateway_error(err: &Error) -> Response<Body> {
    let mut body = format!("rundev gateway error: {}", err);
    if let Some(suggestion) = err.suggestion() {
        body.push_str("\n\nHint: ");
        body.push_str(&suggestion);
    }
    Response::builder()
        .status(StatusCode::BAD_GATEWAY)
        .header("content-type", "text/plain; charset=utf-8")
        .body(Body::from(body))
        .unwrap_or_else(|_| {
            let mut resp = Response::new(Body::empty());
            *resp.status_mut() = StatusCode::BAD_GATEWAY;
            resp
        })
}

fn internal_error(message: String) -> Response<Body> {
    let mut resp = Response::new(Body::from(message));
    *resp.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    resp
}
