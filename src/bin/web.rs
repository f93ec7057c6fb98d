//! EMIS Agent 流式 Web 接口
//!
//! 启动: cargo run --bin emis-agent-web --features web
//! POST /chat/stream、POST /chat/resume 返回 SSE（每条 data 为一个 JSON 帧）；
//! GET /session/:id/state 查询挂起状态；GET /health 健康检查。
//! 工具源连接失败时仍启动（agent_ready=false，对话接口返回 503）；推理引擎凭证缺失则直接退出。

#![cfg(feature = "web")]

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::{
    extract::{Path, State},
    http::{HeaderValue, StatusCode},
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use emis_agent::config::{load_config, AppConfig};
use emis_agent::core::{AgentBuilder, AgentError, AgentService, Invocation};
use emis_agent::react::EventFrame;
use emis_agent::session::LoopNode;

struct AppState {
    /// 启动时构建；工具源不可用时为 None
    service: Option<Arc<AgentService>>,
}

impl AppState {
    fn service(&self) -> Result<Arc<AgentService>, (StatusCode, String)> {
        self.service
            .clone()
            .ok_or_else(|| error_response(AgentError::ServiceUnavailable))
    }
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    message: String,
    #[serde(default)]
    session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResumeRequest {
    session_id: String,
    human_response: String,
}

#[derive(Debug, Serialize)]
struct InterruptData {
    query: String,
}

#[derive(Debug, Serialize)]
struct SessionStateResponse {
    session_id: String,
    next_nodes: Vec<LoopNode>,
    has_interrupts: bool,
    interrupt_data: Option<InterruptData>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    agent_ready: bool,
}

fn error_response(e: AgentError) -> (StatusCode, String) {
    let status = match &e {
        AgentError::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        AgentError::UnknownSession(_) => StatusCode::NOT_FOUND,
        AgentError::NoPendingInterrupt(_) | AgentError::SessionSuspended(_) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, e.to_string())
}

/// 事件流 → SSE：每个事件一个 JSON 帧
fn sse_response(invocation: Invocation) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let session_id = invocation.session_id;
    let events = invocation.events.map(move |event| {
        let frame = EventFrame::new(&session_id, &event);
        let sse = match Event::default().json_data(&frame) {
            Ok(ev) => ev,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to encode event frame");
                Event::default().data(frame.content)
            }
        };
        Ok(sse)
    });
    Sse::new(events).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keepalive"),
    )
}

/// POST /chat/stream
async fn chat_stream(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, (StatusCode, String)> {
    let service = state.service()?;
    let invocation = service
        .start(&req.message, req.session_id)
        .await
        .map_err(error_response)?;
    Ok(sse_response(invocation))
}

/// POST /chat/resume
async fn chat_resume(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ResumeRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, (StatusCode, String)> {
    let service = state.service()?;
    let invocation = service
        .resume(&req.session_id, &req.human_response)
        .await
        .map_err(error_response)?;
    Ok(sse_response(invocation))
}

/// GET /session/:id/state
async fn session_state(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionStateResponse>, (StatusCode, String)> {
    let service = state.service()?;
    let snapshot = service.get_state(&session_id).await.map_err(error_response)?;
    Ok(Json(SessionStateResponse {
        session_id: snapshot.session_id,
        next_nodes: snapshot.next_step.into_iter().collect(),
        has_interrupts: snapshot.interrupt.is_some(),
        interrupt_data: snapshot.interrupt.map(|i| InterruptData { query: i.query }),
    }))
}

/// GET /health
async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        agent_ready: state.service.is_some(),
    })
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = %o, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}

/// 构建服务；工具源不可用时降级为无服务启动，其余错误（如凭证缺失）向上返回
async fn build_service(cfg: &AppConfig) -> anyhow::Result<Option<Arc<AgentService>>> {
    match AgentBuilder::new(cfg.clone()).build().await {
        Ok(service) => Ok(Some(Arc::new(service))),
        Err(AgentError::ToolSource(e)) => {
            tracing::error!(error = %e, "Tool source unavailable, starting without agent");
            Ok(None)
        }
        Err(e) => Err(e).context("Failed to initialize agent"),
    }
}

/// 定期清理过期会话
fn spawn_session_cleanup(service: Arc<AgentService>, cfg: &AppConfig) {
    let ttl = Duration::from_secs(cfg.session.ttl_secs);
    let every = Duration::from_secs(cfg.session.cleanup_interval_secs.max(1));
    let store = service.store();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.tick().await;
        loop {
            interval.tick().await;
            match store.cleanup_expired(ttl).await {
                Ok(0) => {}
                Ok(n) => tracing::info!(removed = n, "Expired sessions cleaned up"),
                Err(e) => tracing::warn!(error = %e, "Session cleanup failed"),
            }
        }
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    emis_agent::observability::init();

    let cfg = load_config(None).context("Failed to load config")?;
    let service = build_service(&cfg).await?;
    if let Some(ref service) = service {
        spawn_session_cleanup(Arc::clone(service), &cfg);
    }

    let state = Arc::new(AppState { service });
    let app = Router::new()
        .route("/chat/stream", post(chat_stream))
        .route("/chat/resume", post(chat_resume))
        .route("/session/:session_id/state", get(session_state))
        .route("/health", get(health))
        .with_state(state)
        .layer(cors_layer(&cfg.server.cors_origins));

    let addr: SocketAddr = format!("{}:{}", cfg.server.host, cfg.server.port)
        .parse()
        .context("Invalid server address")?;
    tracing::info!("{} listening on http://{}", cfg.app.name, addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
