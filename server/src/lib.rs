use anyhow::Result;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use pubscout_core::{Engine, Error, IndexStats, ScoredDocument, SearchConfig, SortKey};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

#[derive(Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
    #[serde(default = "default_sort")]
    pub sort: String,
}

fn default_sort() -> String {
    "relevance".into()
}

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub total_hits: usize,
    pub results: Vec<SearchHit>,
}

/// Flat result row: the stored record fields plus the relevance score.
#[derive(Serialize)]
pub struct SearchHit {
    pub title: String,
    pub authors: Vec<String>,
    pub author_links: Vec<String>,
    pub year: Option<i32>,
    pub url: String,
    pub publication_type: String,
    pub crawled_at: String,
    pub score: f32,
}

impl From<ScoredDocument> for SearchHit {
    fn from(hit: ScoredDocument) -> Self {
        let d = hit.document;
        SearchHit {
            title: d.title,
            authors: d.authors,
            author_links: d.author_links,
            year: d.year,
            url: d.url,
            publication_type: d.publication_type,
            crawled_at: d.crawled_at,
            score: hit.score,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
}

/// Open the engine for `data_dir` and build the API router around it.
pub fn build_app(data_dir: &str, config: SearchConfig) -> Result<Router> {
    let engine = Arc::new(Engine::open(data_dir, config)?);
    Ok(router(engine))
}

/// Assemble the router. CORS origins come from `CORS_ALLOW_ORIGIN`
/// (comma-separated); any origin is allowed by default.
pub fn router(engine: Arc<Engine>) -> Router {
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
        .route("/api/search", get(search_handler))
        .route("/api/stats", get(stats_handler))
        .with_state(AppState { engine })
        .layer(cors)
}

/// Search endpoint. A blank `q` is an empty result list, not an error; an
/// unknown `sort` is a client error; a never-built index is 503.
pub async fn search_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, (StatusCode, String)> {
    let sort: SortKey = params
        .sort
        .parse()
        .map_err(|e: Error| (StatusCode::BAD_REQUEST, e.to_string()))?;

    let query = params.q.trim().to_string();
    if query.is_empty() {
        return Ok(Json(SearchResponse {
            query,
            total_hits: 0,
            results: Vec::new(),
        }));
    }

    let hits = state.engine.search(&query, sort).map_err(|e| match e {
        Error::IndexUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, e.to_string()),
        other => (StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
    })?;

    Ok(Json(SearchResponse {
        query,
        total_hits: hits.len(),
        results: hits.into_iter().map(SearchHit::from).collect(),
    }))
}

/// Health endpoint for the UI; never fails, even with no index built.
pub async fn stats_handler(State(state): State<AppState>) -> Json<IndexStats> {
    Json(state.engine.stats())
}
