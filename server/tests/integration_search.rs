use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use search_core::index::{AcceptAll, IndexBuilder, RawDocument};
use search_core::persist;
use search_core::SearchConfig;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

fn doc(url: &str, title: &str, content: &str) -> RawDocument {
    RawDocument {
        url: url.into(),
        title: title.into(),
        description: String::new(),
        content: content.into(),
        fetched_at: None,
        classifier_score: None,
    }
}

fn build_index_dir(dir: &std::path::Path) {
    let docs = vec![
        doc(
            "https://alice.example/finance",
            "personal finance tips",
            "a long essay about saving money and budgeting well",
        ),
        doc(
            "https://bob.example/finance",
            "finance",
            "short note on finance",
        ),
        doc(
            "https://carol.example/food",
            "cooking recipes",
            "pasta and sauces all day",
        ),
    ];
    let index = IndexBuilder::build(&docs, &AcceptAll);
    persist::save(&index, None, &SearchConfig::default(), dir).unwrap();
}

async fn call(app: Router, uri: &str) -> (StatusCode, Value) {
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
async fn search_returns_ranked_results() {
    let dir = tempfile::tempdir().unwrap();
    let index_dir = dir.path().join("index");
    build_index_dir(&index_dir);
    let app = server::build_app(index_dir.to_str().unwrap()).unwrap();

    let (status, json) = call(app, "/search?q=finance%20tips").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["mode"], "lexical");
    let results = json["results"].as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["title"], "personal finance tips");
    assert_eq!(results[1]["title"], "finance");
}

#[tokio::test]
async fn empty_query_is_empty_results_not_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let index_dir = dir.path().join("index");
    build_index_dir(&index_dir);
    let app = server::build_app(index_dir.to_str().unwrap()).unwrap();

    let (status, json) = call(app, "/search?q=%20%20").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total"], 0);
}

#[tokio::test]
async fn pagination_parameters_are_honored() {
    let dir = tempfile::tempdir().unwrap();
    let index_dir = dir.path().join("index");
    build_index_dir(&index_dir);
    let app = server::build_app(index_dir.to_str().unwrap()).unwrap();

    let (status, json) = call(app, "/search?q=finance&page=2&page_size=1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["page"], 2);
    let results = json["results"].as_array().unwrap();
    assert_eq!(results.len(), 1);
}

#[tokio::test]
async fn health_endpoint() {
    let dir = tempfile::tempdir().unwrap();
    let index_dir = dir.path().join("index");
    build_index_dir(&index_dir);
    let app = server::build_app(index_dir.to_str().unwrap()).unwrap();

    let resp = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}
