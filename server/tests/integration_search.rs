use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use pubscout_core::{stable_id, DocumentRecord, Engine, SearchConfig};
use pubscout_server::router;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tower::ServiceExt;

fn record(title: &str, url: &str, year: i32, crawled_at: &str) -> DocumentRecord {
    DocumentRecord {
        id: stable_id(title, url),
        title: title.into(),
        authors: vec!["A. Keynes".into()],
        author_links: vec!["https://portal.example/persons/a-keynes".into()],
        year: Some(year),
        url: url.into(),
        publication_type: "Journal Article".into(),
        crawled_at: crawled_at.into(),
    }
}

fn build_engine(dir: &Path) -> Arc<Engine> {
    let engine = Engine::open(dir, SearchConfig::default()).unwrap();
    engine
        .ingest(record(
            "Executive compensation governance",
            "https://x/1",
            2020,
            "2026-08-01T00:00:00Z",
        ))
        .unwrap();
    engine
        .ingest(record(
            "Governance of boards",
            "https://x/2",
            2019,
            "2026-07-01T00:00:00Z",
        ))
        .unwrap();
    engine.checkpoint().unwrap();
    Arc::new(engine)
}

async fn call(app: axum::Router, uri: &str) -> (StatusCode, Value) {
    let resp = app
        .oneshot(Request::get(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

#[tokio::test]
async fn search_returns_scored_results() {
    let dir = tempfile::tempdir().unwrap();
    let app = router(build_engine(dir.path()));

    let (status, json) = call(app, "/api/search?q=governance").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["query"], "governance");
    let results = json["results"].as_array().unwrap();
    assert_eq!(results.len(), 2);
    for row in results {
        assert!(row["score"].as_f64().unwrap() > 0.0);
        assert_eq!(row["authors"][0], "A. Keynes");
    }
}

#[tokio::test]
async fn year_sort_is_descending() {
    let dir = tempfile::tempdir().unwrap();
    let app = router(build_engine(dir.path()));

    let (status, json) = call(app, "/api/search?q=governance&sort=year").await;
    assert_eq!(status, StatusCode::OK);
    let results = json["results"].as_array().unwrap();
    assert_eq!(results[0]["year"], 2020);
    assert_eq!(results[1]["year"], 2019);
}

#[tokio::test]
async fn empty_query_is_ok_and_empty() {
    let dir = tempfile::tempdir().unwrap();
    let app = router(build_engine(dir.path()));

    let (status, json) = call(app, "/api/search?q=").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total_hits"], 0);
    assert!(json["results"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn unknown_sort_is_a_client_error() {
    let dir = tempfile::tempdir().unwrap();
    let app = router(build_engine(dir.path()));

    let (status, _) = call(app, "/api/search?q=governance&sort=citations").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn stats_reports_ready_and_docs() {
    let dir = tempfile::tempdir().unwrap();
    let app = router(build_engine(dir.path()));

    let (status, json) = call(app, "/api/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["ready"], true);
    assert_eq!(json["docs"], 2);
}

#[tokio::test]
async fn unbuilt_index_is_unavailable_but_stats_still_answer() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Arc::new(Engine::open(dir.path(), SearchConfig::default()).unwrap());
    let app = router(engine);

    let (status, json) = call(app.clone(), "/api/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["ready"], false);
    assert_eq!(json["docs"], 0);

    let (status, _) = call(app, "/api/search?q=governance").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}
