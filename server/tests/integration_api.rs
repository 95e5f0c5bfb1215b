use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use server::{build_app, ServerConfig};
use std::fs;
use tempfile::TempDir;
use tower::ServiceExt;

fn pages_json() -> Value {
    let words = |page: usize, list: &[&str]| -> Value {
        let tokens: Vec<Value> = list
            .iter()
            .enumerate()
            .map(|(i, w)| {
                let left = i as f64 * 15.0;
                json!({ "page_index": page, "token_index": i, "text": w, "bounds": { "left": left, "top": 0.0, "right": left + 10.0, "bottom": 10.0 } })
            })
            .collect();
        json!({ "page_index": page, "text": list.join(" "), "tokens": tokens })
    };
    json!([words(0, &["The", "tenant", "pays"]), words(1, &["rent", "monthly", "tenant"])])
}

fn label(kind: &str) -> Value { json!({ "id": kind, "text": kind, "label_type": kind }) }

async fn app(dir: &TempDir) -> Router {
    let pages = dir.path().join("pages.json");
    fs::write(&pages, pages_json().to_string()).unwrap();
    build_app(ServerConfig {
        pages,
        db: dir.path().join("db"),
        corpus_id: "corpus".into(),
        document_id: "lease".into(),
        context_chars: 128,
    })
    .await
    .unwrap()
}

async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let req = match body {
        Some(b) => builder.header("content-type", "application/json").body(Body::from(b.to_string())).unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap_or(Value::Null) };
    (status, json)
}

#[tokio::test]
async fn search_returns_located_hits_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(&dir).await;
    let (status, body) = call(&app, Method::GET, "/search?q=TENANT&context_chars=10", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_hits"], 2);
    let results = body["results"].as_array().unwrap();
    assert_eq!(results[0]["start_page"], 0);
    assert_eq!(results[1]["start_page"], 1);
    assert_eq!(results[0]["full_context"]["lead_in"], "The");
    assert_eq!(results[0]["full_context"]["matched"], "tenant");
}

#[tokio::test]
async fn selection_commit_creates_one_annotation() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(&dir).await;

    // no label: nothing happens, gesture kept
    call(&app, Method::POST, "/selection/queue", Some(json!({ "page_index": 0, "bounds": { "left": 16.0, "top": 1.0, "right": 24.0, "bottom": 9.0 } }))).await;
    call(&app, Method::POST, "/selection/active", Some(json!({ "page_index": 1, "bounds": { "left": 1.0, "top": 1.0, "right": 9.0, "bottom": 9.0 } }))).await;
    let (status, _) = call(&app, Method::POST, "/selection/commit", Some(json!({}))).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, selection) = call(&app, Method::GET, "/selection", None).await;
    assert!(selection["active"].is_object());

    let (status, created) = call(&app, Method::POST, "/selection/commit", Some(json!({ "label": label("TOKEN_LABEL") }))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["raw_text"], "tenant rent");
    assert_eq!(created["target"]["page"], 1);

    let (_, selection) = call(&app, Method::GET, "/selection", None).await;
    assert!(selection["active"].is_null());
    assert_eq!(selection["queue"], json!({}));

    let (_, snapshot) = call(&app, Method::GET, "/annotations", None).await;
    assert_eq!(snapshot["annotations"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn deleting_an_annotation_cascades_over_http() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(&dir).await;
    let span = |text: &str| json!({ "label": label("SPAN_LABEL"), "raw_text": text, "target": { "type": "span", "start": 0, "end": 1 } });

    let (_, a) = call(&app, Method::POST, "/annotations", Some(span("a"))).await;
    let (_, b) = call(&app, Method::POST, "/annotations", Some(span("b"))).await;
    let (status, _) = call(&app, Method::POST, "/annotations", Some(span("  "))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let relation = json!({ "source_ids": [a["id"]], "target_ids": [b["id"]], "label": label("RELATIONSHIP_LABEL") });
    let (status, _) = call(&app, Method::POST, "/relations", Some(relation)).await;
    assert_eq!(status, StatusCode::CREATED);

    let uri = format!("/annotations/{}", a["id"].as_str().unwrap());
    let (status, plan) = call(&app, Method::DELETE, &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(plan["to_delete"].as_array().unwrap().len(), 1);

    let (_, snapshot) = call(&app, Method::GET, "/annotations", None).await;
    assert_eq!(snapshot["annotations"].as_array().unwrap().len(), 1);
    assert!(snapshot["relations"].as_array().unwrap().is_empty());

    let (_, notices) = call(&app, Method::GET, "/notices", None).await;
    assert_eq!(notices[0]["level"], "warning");
}

#[tokio::test]
async fn review_and_doc_types_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(&dir).await;
    let (_, a) = call(&app, Method::POST, "/annotations", Some(json!({ "label": label("SPAN_LABEL"), "raw_text": "x", "target": { "type": "span", "start": 0, "end": 1 } }))).await;
    let id = a["id"].as_str().unwrap();

    let (status, approved) = call(&app, Method::POST, &format!("/annotations/{id}/approve"), Some(json!({ "comment": "ok" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(approved["approved"], true);
    assert_eq!(approved["rejected"], false);

    let (status, _) = call(&app, Method::POST, "/annotations/missing/reject", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, doc_type) = call(&app, Method::POST, "/doc-types", Some(label("DOC_TYPE_LABEL"))).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = call(&app, Method::DELETE, &format!("/doc-types/{}", doc_type["id"].as_str().unwrap()), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, snapshot) = call(&app, Method::GET, "/annotations", None).await;
    assert!(snapshot["doc_types"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn search_session_cursor_wraps_and_resets() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(&dir).await;

    let (status, view) = call(&app, Method::POST, "/search/session", Some(json!({ "term": "tenant" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["total_hits"], 2);
    assert_eq!(view["selected"], 0);
    assert_eq!(view["result"]["start_page"], 0);

    let (_, view) = call(&app, Method::POST, "/search/session/next", None).await;
    assert_eq!(view["selected"], 1);
    assert_eq!(view["result"]["start_page"], 1);
    let (_, view) = call(&app, Method::POST, "/search/session/next", None).await;
    assert_eq!(view["selected"], 0);
    let (_, view) = call(&app, Method::POST, "/search/session/prev", None).await;
    assert_eq!(view["selected"], 1);

    // same term keeps the cursor, a new one resets it
    let (_, view) = call(&app, Method::POST, "/search/session", Some(json!({ "term": "tenant" }))).await;
    assert_eq!(view["selected"], 1);
    let (_, view) = call(&app, Method::POST, "/search/session", Some(json!({ "term": "rent" }))).await;
    assert_eq!(view["selected"], 0);
    assert_eq!(view["total_hits"], 1);

    let (status, _) = call(&app, Method::DELETE, "/search/session", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, view) = call(&app, Method::GET, "/search/session", None).await;
    assert_eq!(view["total_hits"], 0);
    assert!(view["result"].is_null());
}
