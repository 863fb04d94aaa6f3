use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use mockito::{Matcher, Server};
use serde_json::{json, Value};
use tower::ServiceExt;

use seo_core::config::Config;
use seo_core::search::SearchBackend;
use server::{build_app, AppState};

fn app_for(server: &Server) -> Router {
    let config = Config {
        elasticsearch_url: server.url(),
        ..Config::default()
    };
    let backend = SearchBackend::new(&config).unwrap();
    build_app(AppState::new(backend, &config))
}

async fn call(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let resp = app.oneshot(request).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn health_endpoint_answers() {
    let server = Server::new_async().await;
    let (status, body) = call(app_for(&server), get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::String("ok".into()));
}

#[tokio::test]
async fn search_maps_hits_with_snippet_and_title_fallbacks() {
    let mut server = Server::new_async().await;
    let canned = json!({
        "hits": {"hits": [
            {
                "_score": 3.5,
                "_source": {
                    "url": "https://example.com/a",
                    "title": "Alpha",
                    "content": "alpha page body",
                    "summary": "alpha summary",
                    "h1": "Alpha heading",
                    "meta_description": "about alpha",
                    "ranking_score": 2.5,
                    "crawled_at": "2026-07-30T12:00:00Z",
                    "content_length": 120,
                },
                "highlight": {"content": ["<em>alpha</em> page body"]},
            },
            {
                "_score": 1.0,
                "_source": {
                    "url": "https://example.com/b",
                    "title": "",
                    "content": "beta page body",
                    "summary": "beta summary",
                },
            },
            {
                "_score": 0.5,
                "_source": {
                    "url": "https://example.com/c",
                    "title": "Gamma",
                    "content": "gamma body text with no summary stored",
                },
            },
        ]},
    });
    let search = server
        .mock("POST", "/seo_pages/_search")
        .match_query(Matcher::UrlEncoded("size".into(), "3".into()))
        .match_body(Matcher::PartialJson(
            json!({"query": {"multi_match": {"query": "page"}}}),
        ))
        .with_body(canned.to_string())
        .create_async()
        .await;

    let (status, body) = call(app_for(&server), get("/search?q=page&size=3")).await;
    assert_eq!(status, StatusCode::OK);
    let results = body.as_array().unwrap();
    assert_eq!(results.len(), 3);

    // Highlight wins when present.
    assert_eq!(results[0]["snippet"], "<em>alpha</em> page body");
    assert_eq!(results[0]["title"], "Alpha");
    assert_eq!(results[0]["h1"], "Alpha heading");
    assert_eq!(results[0]["ranking_score"], 2.5);
    assert_eq!(results[0]["content_length"], 120);

    // No highlight: stored summary; empty title falls back to the URL.
    assert_eq!(results[1]["snippet"], "beta summary");
    assert_eq!(results[1]["title"], "https://example.com/b");

    // Neither highlight nor summary: leading content.
    assert_eq!(
        results[2]["snippet"],
        "gamma body text with no summary stored"
    );
    search.assert_async().await;
}

#[tokio::test]
async fn search_rejects_blank_queries_without_touching_the_backend() {
    let server = Server::new_async().await;
    let (status, _) = call(app_for(&server), get("/search?q=%20%20")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // A missing q is a deserialization failure at the extractor.
    let (status, _) = call(app_for(&server), get("/search")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn track_click_returns_tracked_after_the_update() {
    let mut server = Server::new_async().await;
    let _indices = server
        .mock("HEAD", Matcher::Regex(r"^/seo_page".to_string()))
        .with_status(200)
        .expect_at_least(2)
        .create_async()
        .await;
    let log = server
        .mock("POST", "/seo_page_clicks/_doc")
        .match_body(Matcher::PartialJson(
            json!({"url": "https://example.com/a", "user_id": "u-1"}),
        ))
        .with_status(201)
        .with_body("{}")
        .create_async()
        .await;
    let update = server
        .mock(
            "POST",
            Matcher::Regex(r"^/seo_pages/_update/https%3A%2F%2Fexample\.com%2Fa".to_string()),
        )
        .match_query(Matcher::UrlEncoded("refresh".into(), "wait_for".into()))
        .with_body("{}")
        .create_async()
        .await;

    let request = Request::builder()
        .method("POST")
        .uri("/track_click")
        .header("content-type", "application/json")
        .body(Body::from(
            r#"{"url":"https://example.com/a","user_id":"u-1","metadata":{"rank":1}}"#,
        ))
        .unwrap();
    let (status, body) = call(app_for(&server), request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "tracked");
    assert_eq!(body["url"], "https://example.com/a");
    log.assert_async().await;
    update.assert_async().await;
}

#[tokio::test]
async fn backend_failures_surface_as_internal_errors() {
    let mut server = Server::new_async().await;
    let _search = server
        .mock("POST", "/seo_pages/_search")
        .with_status(503)
        .with_body("backend down")
        .create_async()
        .await;

    let (status, _) = call(app_for(&server), get("/search?q=anything")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}
