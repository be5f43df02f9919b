//! HTTP query surface.
//!
//! One build per process lifetime: the index is built or loaded before the
//! server starts, then shared read-only across handlers. No locking: the
//! store is never mutated while serving. Rebuilding means restarting the
//! daemon.

use std::sync::Arc;

use axum::{
    extract::State,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tokio::signal;

use crate::config::Config;
use crate::qa::{self, AnswerGenerator, QaResponse};
use crate::retrieval::{Retriever, SearchResult, StoreStats, VectorStore};

pub struct ServeState {
    pub store: VectorStore,
    pub config: Config,
    pub generator: Option<Box<dyn AnswerGenerator>>,
}

pub fn start_daemon(state: ServeState, addr: String) {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(async { start_app(state, addr).await });
}

async fn start_app(state: ServeState, addr: String) {
    let shared_state = Arc::new(state);

    async fn shutdown_signal() {
        let ctrl_c = async {
            signal::ctrl_c()
                .await
                .expect("failed to install Ctrl+C handler");
        };

        let terminate = async {
            signal::unix::signal(signal::unix::SignalKind::terminate())
                .expect("failed to install signal handler")
                .recv()
                .await;
        };

        tokio::select! {
            _ = ctrl_c => {
                log::warn!("shutting down");
            },
            _ = terminate => {},
        }
    }

    let app = Router::new()
        .route("/api/search", post(search))
        .route("/api/ask", post(ask))
        .route("/api/stats", get(stats))
        .layer(
            tower_http::trace::TraceLayer::new_for_http()
                .make_span_with(
                    tower_http::trace::DefaultMakeSpan::new().level(tracing::Level::INFO),
                )
                .on_response(
                    tower_http::trace::DefaultOnResponse::new().level(tracing::Level::INFO),
                ),
        )
        .with_state(shared_state);

    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();
    log::info!("listening on {addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap();
}

// Make our own error that wraps `anyhow::Error`.
#[derive(Debug)]
struct HttpError(anyhow::Error);

impl IntoResponse for HttpError {
    fn into_response(self) -> axum::response::Response {
        (
            axum::http::StatusCode::INTERNAL_SERVER_ERROR,
            json!({"error": self.0.to_string()}).to_string(),
        )
            .into_response()
    }
}

impl<E> From<E> for HttpError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchRequest {
    query: String,
    top_k: Option<usize>,
}

async fn search(
    State(state): State<Arc<ServeState>>,
    Json(payload): Json<SearchRequest>,
) -> Result<axum::Json<Vec<SearchResult>>, HttpError> {
    log::debug!("payload: {payload:?}");

    let top_k = payload.top_k.unwrap_or(state.config.index.top_k);

    tokio::task::block_in_place(move || {
        let results = Retriever::new(&state.store).search(&payload.query, top_k);
        Ok(Json(results))
    })
}

#[derive(Debug, Clone, Deserialize)]
pub struct AskRequest {
    question: String,
    top_k: Option<usize>,
}

async fn ask(
    State(state): State<Arc<ServeState>>,
    Json(payload): Json<AskRequest>,
) -> Result<axum::Json<QaResponse>, HttpError> {
    log::debug!("payload: {payload:?}");

    let top_k = payload.top_k.unwrap_or(state.config.index.top_k);

    tokio::task::block_in_place(move || {
        let Some(generator) = state.generator.as_ref() else {
            return Err(HttpError(anyhow::anyhow!(
                "answer generation is not configured (missing API key)"
            )));
        };

        let response =
            qa::answer_question(&state.store, generator.as_ref(), &payload.question, top_k);
        Ok(Json(response))
    })
}

async fn stats(
    State(state): State<Arc<ServeState>>,
) -> Result<axum::Json<StoreStats>, HttpError> {
    Ok(Json(state.store.stats()))
}
