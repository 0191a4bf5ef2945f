//! Arbor Web API
//!
//! 启动: cargo run --bin arbor-web --features web
//! POST /api/reason  {"query": "..."} -> SSE 事件流（node_enter / token / tool_io / done）
//! GET  /health      -> 模型后端连通性

#![cfg(feature = "web")]

use std::sync::Arc;

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use futures_util::stream::Stream;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use arbor::config::{load_config, AppConfig};
use arbor::llm::{create_llm, LlmClient, Message};
use arbor::mcts::{search_loop, EngineEvent, SearchSession};
use arbor::tools::{create_provider, ToolInvoker};

#[derive(Clone)]
struct AppState {
    cfg: AppConfig,
    llm: Arc<dyn LlmClient>,
    invoker: Arc<ToolInvoker>,
}

#[derive(Deserialize)]
struct ReasonRequest {
    query: String,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    model: String,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let probe = vec![Message::user("ping")];
    let reachable = state.llm.complete(&probe, 0.0).await.is_ok();
    Json(HealthResponse {
        status: if reachable { "healthy" } else { "degraded" }.to_string(),
        model: state.cfg.llm.model.clone(),
    })
}

async fn reason(
    State(state): State<AppState>,
    Json(req): Json<ReasonRequest>,
) -> Sse<impl Stream<Item = Result<Event, std::convert::Infallible>>> {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<EngineEvent>();
    let cancel = CancellationToken::new();

    {
        let state = state.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let session = SearchSession::new(state.llm, state.invoker, &state.cfg)
                .with_event_tx(tx)
                .with_cancel(cancel);
            if let Err(e) = search_loop(&session, &req.query).await {
                tracing::warn!(error = %e, "search ended with error");
            }
        });
    }

    let stream = futures_util::stream::unfold(rx, |mut rx| async move {
        let ev = rx.recv().await?;
        let sse = Event::default().json_data(&ev).unwrap_or_default();
        Some((Ok(sse), rx))
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    arbor::observability::init();

    let cfg = load_config(None).unwrap_or_default();
    let llm = create_llm(&cfg.llm);
    let provider = create_provider(&cfg.search);
    let invoker = Arc::new(ToolInvoker::new(
        provider,
        cfg.search.timeout_secs,
        cfg.search.max_results,
        cfg.search.cache_ttl_secs,
    ));
    let state = AppState { cfg, llm, invoker };

    let app = Router::new()
        .route("/api/reason", post(reason))
        .route("/health", get(health))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:8080").await?;
    tracing::info!("arbor-web listening on http://127.0.0.1:8080");
    axum::serve(listener, app).await?;
    Ok(())
}
