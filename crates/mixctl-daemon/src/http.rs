//! The control-plane HTTP API.
//!
//! Read endpoints return JSON snapshots assembled from the collaborators;
//! the handful of mutating endpoints drive docker compose and the `.env`
//! file. Upstream failures surface as `ok: false` bodies with HTTP 200;
//! the dashboard must keep rendering whatever is still reachable, so no
//! handler here propagates a fault for a flaky upstream.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use chrono::{Local, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::{info, warn};

use mixctl_core::config::Config;
use mixctl_core::logscan;
use mixctl_core::reconcile;
use mixctl_core::runtime;

use crate::compose::{ComposeRunner, StackOp};
use crate::docker::DockerCli;
use crate::envfile::EnvFile;
use crate::icecast::IcecastClient;
use crate::scheduler::SchedulerClient;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub docker: DockerCli,
    pub icecast: IcecastClient,
    pub scheduler: SchedulerClient,
    pub compose: ComposeRunner,
    pub env_file: EnvFile,
    /// Reason the stack needs a recreate to pick up pending changes.
    pub need_restart: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let icecast = IcecastClient::new(config.icecast.clone());
        let scheduler = SchedulerClient::new(&config.scheduler.base_url);
        let compose = ComposeRunner::new(
            config.stack.compose_file.clone(),
            config.stack.env_file.clone(),
        );
        let env_file = EnvFile::new(config.stack.env_file.clone());
        Self {
            config: Arc::new(config),
            docker: DockerCli::new(),
            icecast,
            scheduler,
            compose,
            env_file,
            need_restart: Arc::new(RwLock::new(None)),
        }
    }

    async fn set_need_restart(&self, reason: impl Into<String>) {
        *self.need_restart.write().await = Some(reason.into());
    }
}

/// Map the `service` query value onto a container name. The two stack roles
/// have shorthand names; anything else is taken verbatim.
fn resolve_container<'a>(config: &'a Config, service: &'a str) -> &'a str {
    match service {
        "engine" => &config.stack.engine_container,
        "scheduler" => &config.stack.scheduler_container,
        other => other,
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/status", get(status))
        .route("/api/logs", get(logs))
        .route("/api/now", get(now_playing))
        .route("/api/upcoming", get(upcoming))
        .route("/api/engine/queue", get(engine_queue))
        .route("/api/icecast/now", get(icecast_now))
        .route("/api/scheduler/health", get(scheduler_health))
        .route("/api/scheduler/upcoming", get(scheduler_upcoming))
        .route("/api/env", get(env_get).post(env_post))
        .route("/api/image_tag", post(image_tag))
        .route("/api/need_restart", get(need_restart_get))
        .route("/api/need_restart/clear", post(need_restart_clear))
        .route("/api/stack/up", post(stack_up))
        .route("/api/stack/down", post(stack_down))
        .route("/api/stack/recreate", post(stack_recreate))
        .route("/api/stack/purge_image", post(purge_image))
        // The web UI is served from elsewhere; let it talk to us.
        .layer(tower_http::cors::CorsLayer::permissive())
        .with_state(state)
}

pub async fn serve(state: AppState) -> anyhow::Result<()> {
    let addr = format!(
        "{}:{}",
        state.config.http.bind_address, state.config.http.port
    );
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Control API listening on http://{}", addr);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

// ── Read endpoints ────────────────────────────────────────────────────────────

async fn health() -> Json<Value> {
    Json(json!({"ok": true}))
}

async fn status(State(state): State<AppState>) -> Json<Value> {
    let stack = &state.config.stack;
    let (docker_ok, engine, scheduler) = tokio::join!(
        state.docker.ping(),
        state.docker.inspect(&stack.engine_container),
        state.docker.inspect(&stack.scheduler_container),
    );
    let summary = runtime::summarize(
        Utc::now(),
        (&stack.engine_container, engine.as_ref()),
        (&stack.scheduler_container, scheduler.as_ref()),
    );
    Json(json!({
        "ok": true,
        "now_utc": Utc::now().to_rfc3339(),
        "docker_ok": docker_ok,
        "engine": summary.engine,
        "scheduler": summary.scheduler,
    }))
}

#[derive(Deserialize)]
struct LogsQuery {
    service: String,
    #[serde(default)]
    tail: u32,
}

async fn logs(State(state): State<AppState>, Query(q): Query<LogsQuery>) -> String {
    let name = resolve_container(&state.config, &q.service);
    let tail = state.config.logs.clamp_tail(q.tail);
    match state.docker.log_tail(name, tail).await {
        Ok(text) => text,
        // The tail pane renders whatever it gets; an error message is more
        // useful there than an empty response.
        Err(e) => format!("{}\n", e),
    }
}

async fn now_playing(State(state): State<AppState>) -> Json<Value> {
    let stack = &state.config.stack;
    let tail = state.config.logs.tail_default;
    let (ice, scheduler_tail, engine_tail) = tokio::join!(
        state.icecast.now_playing(),
        state.docker.log_tail(&stack.scheduler_container, tail),
        state.docker.log_tail(&stack.engine_container, tail),
    );

    let scheduler_tail = scheduler_tail.map_err(|e| e.to_string());
    let engine_tail = engine_tail.map_err(|e| e.to_string());

    let observed = if ice.ok { ice.title.clone() } else { None };
    let snap = reconcile::reconcile_now(
        observed.as_deref(),
        scheduler_tail.as_deref().map_err(|e| e.as_str()),
        engine_tail.as_deref().map_err(|e| e.as_str()),
        Local::now().naive_local(),
        state.config.reconcile.upcoming_limit,
        state.config.reconcile.recent_window_secs,
    );

    let mut body = serde_json::to_value(&snap).unwrap_or_else(|_| json!({}));
    if let Value::Object(map) = &mut body {
        map.insert("ok".to_string(), json!(true));
        map.insert(
            "stream_url".to_string(),
            json!(state.config.icecast.stream_url()),
        );
        map.insert(
            "icecast".to_string(),
            serde_json::to_value(&ice).unwrap_or_else(|_| json!({})),
        );
    }
    Json(body)
}

#[derive(Deserialize)]
struct UpcomingQuery {
    #[serde(default)]
    n: usize,
}

async fn upcoming(State(state): State<AppState>, Query(q): Query<UpcomingQuery>) -> Json<Value> {
    let limit = if q.n == 0 {
        state.config.reconcile.upcoming_limit
    } else {
        q.n.clamp(1, 50)
    };
    let stack = &state.config.stack;
    let (ice, scheduler_tail) = tokio::join!(
        state.icecast.now_playing(),
        state
            .docker
            .log_tail(&stack.scheduler_container, state.config.logs.tail_default),
    );
    let scheduler_tail = scheduler_tail.map_err(|e| e.to_string());
    let observed = if ice.ok { ice.title.clone() } else { None };
    let view = reconcile::upcoming_from_tail(
        scheduler_tail.as_deref().map_err(|e| e.as_str()),
        observed.as_deref(),
        limit,
    );
    Json(serde_json::to_value(&view).unwrap_or_else(|_| json!({})))
}

async fn engine_queue(State(state): State<AppState>) -> Json<Value> {
    let stack = &state.config.stack;
    match state
        .docker
        .log_tail(&stack.engine_container, state.config.logs.tail_default)
        .await
    {
        Ok(text) => {
            let titles = logscan::scan_preprocess_titles(&text);
            Json(json!({"ok": true, "titles": titles}))
        }
        Err(e) => Json(json!({"ok": false, "error": e.to_string(), "titles": []})),
    }
}

async fn icecast_now(State(state): State<AppState>) -> Json<Value> {
    let status = state.icecast.now_playing().await;
    Json(serde_json::to_value(&status).unwrap_or_else(|_| json!({})))
}

async fn scheduler_health(State(state): State<AppState>) -> Json<Value> {
    Json(state.scheduler.health().await)
}

#[derive(Deserialize)]
struct SchedulerUpcomingQuery {
    #[serde(default = "default_sched_n")]
    n: u32,
}

fn default_sched_n() -> u32 {
    10
}

async fn scheduler_upcoming(
    State(state): State<AppState>,
    Query(q): Query<SchedulerUpcomingQuery>,
) -> Json<Value> {
    Json(state.scheduler.upcoming(q.n.clamp(1, 50)).await)
}

// ── Env file & restart flag ───────────────────────────────────────────────────

async fn env_get(State(state): State<AppState>) -> Json<Value> {
    let path = state.env_file.path().display().to_string();
    match state.env_file.read().await {
        Ok(vars) => Json(json!({"ok": true, "path": path, "environment": vars})),
        Err(e) => Json(json!({"ok": false, "path": path, "error": e.to_string()})),
    }
}

#[derive(Deserialize)]
struct EnvUpdate {
    environment: BTreeMap<String, String>,
}

async fn env_post(State(state): State<AppState>, Json(body): Json<EnvUpdate>) -> Json<Value> {
    match state.env_file.write(&body.environment).await {
        Ok(changed) => {
            if changed > 0 {
                state
                    .set_need_restart("environment changed; recreate the stack to apply")
                    .await;
            }
            Json(json!({"ok": true, "changed": changed}))
        }
        Err(e) => {
            warn!("[env] write failed: {}", e);
            Json(json!({"ok": false, "error": e.to_string()}))
        }
    }
}

#[derive(Deserialize)]
struct TagBody {
    tag: String,
}

async fn image_tag(State(state): State<AppState>, Json(body): Json<TagBody>) -> Json<Value> {
    let tag = body.tag.trim().to_string();
    if tag.is_empty() {
        return Json(json!({"ok": false, "error": "empty tag"}));
    }
    let mut update = BTreeMap::new();
    update.insert(state.config.stack.image_tag_key.clone(), tag.clone());
    match state.env_file.write(&update).await {
        Ok(_) => {
            state
                .set_need_restart(format!(
                    "engine image tag set to {}; recreate the stack to apply",
                    tag
                ))
                .await;
            Json(json!({"ok": true, "tag": tag}))
        }
        Err(e) => Json(json!({"ok": false, "error": e.to_string()})),
    }
}

async fn need_restart_get(State(state): State<AppState>) -> Json<Value> {
    let reason = state.need_restart.read().await.clone();
    Json(json!({
        "need_restart": reason.is_some(),
        "reason": reason,
    }))
}

async fn need_restart_clear(State(state): State<AppState>) -> Json<Value> {
    *state.need_restart.write().await = None;
    Json(json!({"ok": true}))
}

// ── Stack control ─────────────────────────────────────────────────────────────

async fn run_stack_op(state: &AppState, op: StackOp) -> String {
    let run = state.compose.run(op).await;
    if !run.ok {
        warn!("[compose] {} failed: exit {:?}", op.label(), run.return_code);
    }
    // A fresh up/recreate picks up whatever was pending.
    if run.ok && matches!(op, StackOp::Up | StackOp::Recreate) {
        *state.need_restart.write().await = None;
    }
    run.transcript(op.label())
}

async fn stack_up(State(state): State<AppState>) -> String {
    run_stack_op(&state, StackOp::Up).await
}

async fn stack_down(State(state): State<AppState>) -> String {
    run_stack_op(&state, StackOp::Down).await
}

async fn stack_recreate(State(state): State<AppState>) -> String {
    run_stack_op(&state, StackOp::Recreate).await
}

#[derive(Deserialize)]
struct PurgeQuery {
    #[serde(default = "default_purge_tag")]
    tag: String,
}

fn default_purge_tag() -> String {
    "latest".to_string()
}

async fn purge_image(State(state): State<AppState>, Query(q): Query<PurgeQuery>) -> String {
    let image_ref = format!("{}:{}", state.config.stack.engine_image, q.tag.trim());
    let run = state.compose.remove_image(&image_ref).await;
    run.transcript(&format!("purge image {}", image_ref))
}
