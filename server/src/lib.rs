use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use seo_core::config::Config;
use seo_core::document::ClickEvent;
use seo_core::search::{SearchBackend, SearchHit};

#[derive(Clone)]
pub struct AppState {
    pub backend: SearchBackend,
    decay_interval: Duration,
    decay_started: Arc<AtomicBool>,
}

impl AppState {
    pub fn new(backend: SearchBackend, config: &Config) -> Self {
        Self {
            backend,
            decay_interval: config.decay_job_interval,
            decay_started: Arc::new(AtomicBool::new(false)),
        }
    }
}

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: String,
    #[serde(default = "default_size")]
    pub size: usize,
}

fn default_size() -> usize {
    10
}

#[derive(Debug, Serialize)]
pub struct SearchResult {
    pub url: String,
    pub title: String,
    pub snippet: String,
    pub score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ranking_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub h1: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crawled_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_length: Option<i64>,
}

impl SearchResult {
    /// Snippet preference: first `content` highlight, else the stored
    /// summary, else the leading slice of the content itself. An untitled
    /// page is labelled with its URL.
    fn from_hit(hit: SearchHit) -> Self {
        let source = hit.source;
        let snippet = hit
            .content_highlights
            .into_iter()
            .next()
            .unwrap_or_else(|| {
                if source.summary.is_empty() {
                    source.content.chars().take(200).collect()
                } else {
                    source.summary.clone()
                }
            });
        let title = if source.title.is_empty() {
            source.url.clone()
        } else {
            source.title.clone()
        };
        Self {
            url: source.url,
            title,
            snippet,
            score: hit.score,
            ranking_score: Some(source.ranking_score),
            h1: (!source.h1.is_empty()).then_some(source.h1),
            meta_description: (!source.meta_description.is_empty())
                .then_some(source.meta_description),
            crawled_at: source.crawled_at,
            content_length: source.content_length,
        }
    }
}

/// Build the service router. CORS defaults to allow-all for development;
/// `CORS_ALLOW_ORIGIN` (comma-separated) narrows it.
pub fn build_app(state: AppState) -> Router {
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val.split(',').filter_map(|s| s.trim().parse().ok()).collect();
            if origins.is_empty() {
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any)
            } else {
                CorsLayer::new()
                    .allow_origin(AllowOrigin::list(origins))
                    .allow_methods(Any)
                    .allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    };

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/search", get(search_handler))
        .route("/track_click", post(track_click_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

pub async fn search_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<SearchResult>>, (StatusCode, String)> {
    if params.q.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "query must not be empty".into()));
    }
    let hits = state
        .backend
        .search(&params.q, params.size)
        .await
        .map_err(internal_error)?;
    Ok(Json(hits.into_iter().map(SearchResult::from_hit).collect()))
}

pub async fn track_click_handler(
    State(state): State<AppState>,
    Json(event): Json<ClickEvent>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    state
        .backend
        .ensure_indices()
        .await
        .map_err(internal_error)?;
    state
        .backend
        .track_click(&event)
        .await
        .map_err(internal_error)?;
    Ok(Json(
        serde_json::json!({"status": "tracked", "url": event.url}),
    ))
}

fn internal_error(err: anyhow::Error) -> (StatusCode, String) {
    tracing::error!(%err, "search backend request failed");
    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}

/// Start the periodic decay sweep. At most one task per state, enforced by
/// the startup guard; returns `None` when it is already running. The caller
/// owns the handle and aborts it on shutdown.
pub fn spawn_decay_loop(state: &AppState) -> Option<JoinHandle<()>> {
    if state.decay_started.swap(true, Ordering::SeqCst) {
        return None;
    }
    let backend = state.backend.clone();
    let interval = state.decay_interval;
    Some(tokio::spawn(async move {
        loop {
            sleep(interval).await;
            if let Err(err) = backend.apply_decay().await {
                tracing::error!(%err, "decay sweep failed");
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> AppState {
        let config = Config::default();
        AppState::new(SearchBackend::new(&config).unwrap(), &config)
    }

    #[tokio::test]
    async fn decay_loop_is_single_instance() {
        let state = state();
        let first = spawn_decay_loop(&state);
        assert!(first.is_some());
        assert!(spawn_decay_loop(&state).is_none());
        first.unwrap().abort();
    }
}
