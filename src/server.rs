//! HTTP trigger surface.
//!
//! `GET /` answers with a welcome message, `GET /scrape` runs every target
//! and `GET /scrape/:target` runs one. Runs are serialized: a request that
//! arrives during a run waits for it to finish.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::app::{AppContext, StandfastError};
use crate::pipeline::RunReport;

pub const WELCOME: &str = "Welcome to the Standfast Revival API";
pub const COMPLETED: &str = "Scraping completed!";

#[derive(Clone)]
pub struct ServerState {
    ctx: Arc<AppContext>,
    run_lock: Arc<Mutex<()>>,
}

impl ServerState {
    pub fn new(ctx: Arc<AppContext>) -> Self {
        Self {
            ctx,
            run_lock: Arc::new(Mutex::new(())),
        }
    }
}

/// Every reply has this one shape; run details only go to the log.
#[derive(Debug, Serialize)]
pub struct Ack {
    pub message: String,
}

impl Ack {
    fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

type Reply = Result<Json<Ack>, (StatusCode, Json<Ack>)>;

pub fn router(state: ServerState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/scrape", get(scrape_all))
        .route("/scrape/:target", get(scrape_target))
        .with_state(state)
}

pub async fn serve(ctx: Arc<AppContext>, bind: &str) -> anyhow::Result<()> {
    let addr: SocketAddr = bind
        .parse()
        .with_context(|| format!("invalid bind address {}", bind))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, router(ServerState::new(ctx)))
        .await
        .context("server shutdown")?;
    Ok(())
}

async fn root() -> Json<Ack> {
    Json(Ack::message(WELCOME))
}

async fn scrape_all(State(state): State<ServerState>) -> Json<Ack> {
    let _guard = state.run_lock.lock().await;
    let reports = state.ctx.run_all().await;
    log_reports(&reports);
    Json(Ack::message(COMPLETED))
}

async fn scrape_target(State(state): State<ServerState>, Path(target): Path<String>) -> Reply {
    state.ctx.target(&target).map_err(error_reply)?;

    let _guard = state.run_lock.lock().await;
    let report = state.ctx.run_reported(&target).await;
    log_reports(std::slice::from_ref(&report));
    Ok(Json(Ack::message(COMPLETED)))
}

fn log_reports(reports: &[RunReport]) {
    for report in reports {
        info!("Triggered run finished: {}", report);
        for (kind, count) in &report.failures {
            info!("  {}: {} × {}", report.target, count, kind);
        }
    }
}

fn error_reply(err: StandfastError) -> (StatusCode, Json<Ack>) {
    let status = match err {
        StandfastError::UnknownTarget(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    warn!("Trigger failed: {}", err);
    (status, Json(Ack::message(err.to_string())))
}
