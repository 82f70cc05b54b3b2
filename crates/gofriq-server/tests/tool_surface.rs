//! Tool-surface integration tests: the full router over embedded
//! backends, driven through tower without a listening socket.
//!
//! Run with: cargo test -p gofriq-server --test tool_surface

#![allow(clippy::unwrap_used)]

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::util::ServiceExt;

use gofriq::GofrIqConfig;
use gofriq_server::{router, AppState};
use gofriq_services::group::TokenClaims;

const SECRET: &str = "tool-surface-secret";

fn token(groups: &[&str]) -> String {
    let claims = TokenClaims {
        sub: Some("tester".to_string()),
        groups: groups.iter().map(|g| (*g).to_string()).collect(),
        exp: usize::MAX,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
}

async fn app() -> (TempDir, Router) {
    let dir = TempDir::new().unwrap();
    let mut config = GofrIqConfig::embedded(dir.path());
    config.jwt_secret = Some(SECRET.to_string());
    let state = AppState::build(config).await.unwrap();
    (dir, router(state))
}

async fn call(app: &Router, tool: &str, mut args: Value, tokens: &[String]) -> Value {
    args["auth_tokens"] = json!(tokens);
    let request = Request::builder()
        .method("POST")
        .uri(format!("/tools/{tool}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(args.to_string()))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let (_dir, app) = app().await;
    let body = call(&app, "health_check", json!({}), &[]).await;
    assert_eq!(body["status"], "success");
    // Embedded mode: in-memory backends up, no LLM.
    assert_eq!(body["data"]["status"], "degraded");
    assert_eq!(body["data"]["services"]["neo4j"], "up");
    assert_eq!(body["data"]["services"]["llm"], "unconfigured");
}

#[tokio::test]
async fn test_unknown_tool_is_validation_error() {
    let (_dir, app) = app().await;
    let body = call(&app, "does_not_exist", json!({}), &[]).await;
    assert_eq!(body["status"], "error");
    assert_eq!(body["error_code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_anonymous_cannot_write() {
    let (_dir, app) = app().await;
    let body = call(
        &app,
        "create_source",
        json!({"name": "Wire", "source_type": "news_agency"}),
        &[],
    )
    .await;
    assert_eq!(body["status"], "error");
    assert_eq!(body["error_code"], "AUTH_REQUIRED");
}

#[tokio::test]
async fn test_source_lifecycle_over_the_surface() {
    let (_dir, app) = app().await;
    let writer = vec![token(&["alpha"])];

    let created = call(
        &app,
        "create_source",
        json!({
            "name": "Alpha Wire",
            "source_type": "news_agency",
            "region": "APAC",
            "trust_level": "high"
        }),
        &writer,
    )
    .await;
    assert_eq!(created["status"], "success");
    let source_id = created["data"]["source_guid"].as_str().unwrap().to_string();

    let listed = call(&app, "list_sources", json!({}), &writer).await;
    assert_eq!(listed["data"]["count"], 1);

    let updated = call(
        &app,
        "update_source",
        json!({"source_id": source_id, "trust_level": "medium"}),
        &writer,
    )
    .await;
    assert_eq!(updated["data"]["trust_level"], "medium");

    let deleted =
        call(&app, "delete_source", json!({"source_id": source_id}), &writer).await;
    assert_eq!(deleted["status"], "success");
    assert_eq!(deleted["data"]["active"], false);

    // Default listing hides the soft-deleted source.
    let relisted = call(&app, "list_sources", json!({}), &writer).await;
    assert_eq!(relisted["data"]["count"], 0);
}

#[tokio::test]
async fn test_ingest_query_and_cross_group_denial() {
    let (_dir, app) = app().await;
    let alpha = vec![token(&["alpha"])];
    let beta = vec![token(&["beta"])];

    let source = call(
        &app,
        "create_source",
        json!({"name": "Alpha Wire", "source_type": "news_agency", "trust_level": "high"}),
        &alpha,
    )
    .await;
    let source_id = source["data"]["source_guid"].as_str().unwrap().to_string();

    let ingested = call(
        &app,
        "ingest_document",
        json!({
            "title": "Heavy Truck Strike",
            "content": "Drivers walked out at the Heavy Truck Co plant this morning.",
            "source_id": source_id,
        }),
        &alpha,
    )
    .await;
    assert_eq!(ingested["status"], "success");
    assert_eq!(ingested["data"]["status"], "success");
    assert_eq!(ingested["data"]["language"], "en");
    let doc_id = ingested["data"]["doc_id"].as_str().unwrap().to_string();

    // The owner reads it back.
    let fetched = call(&app, "get_document", json!({"doc_id": doc_id}), &alpha).await;
    assert_eq!(fetched["status"], "success");
    assert_eq!(fetched["data"]["title"], "Heavy Truck Strike");

    // A beta-scoped caller is denied, not told "not found".
    let denied = call(&app, "get_document", json!({"doc_id": doc_id}), &beta).await;
    assert_eq!(denied["status"], "error");
    assert_eq!(denied["error_code"], "ACCESS_DENIED");

    // And beta queries never surface it.
    let results = call(
        &app,
        "query_documents",
        json!({"query": "Drivers walked out", "n_results": 5}),
        &beta,
    )
    .await;
    assert_eq!(results["status"], "success");
    assert_eq!(results["data"]["results"].as_array().unwrap().len(), 0);

    // Alpha queries do.
    let results = call(
        &app,
        "query_documents",
        json!({"query": "Drivers walked out", "n_results": 5}),
        &alpha,
    )
    .await;
    assert_eq!(results["data"]["results"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_reingest_reports_duplicate() {
    let (_dir, app) = app().await;
    let alpha = vec![token(&["alpha"])];
    let source = call(
        &app,
        "create_source",
        json!({"name": "Wire", "source_type": "news_agency"}),
        &alpha,
    )
    .await;
    let source_id = source["data"]["source_guid"].as_str().unwrap().to_string();

    let payload = json!({
        "title": "Same Story",
        "content": "The same story body, word for word.",
        "source_id": source_id,
    });
    let first = call(&app, "ingest_document", payload.clone(), &alpha).await;
    assert_eq!(first["data"]["status"], "success");

    let second = call(&app, "ingest_document", payload, &alpha).await;
    assert_eq!(second["data"]["status"], "duplicate");
    assert_eq!(second["data"]["duplicate_of"], first["data"]["doc_id"]);
}

#[tokio::test]
async fn test_word_count_error_code() {
    let (_dir, app) = app().await;
    let alpha = vec![token(&["alpha"])];
    let source = call(
        &app,
        "create_source",
        json!({"name": "Wire", "source_type": "news_agency"}),
        &alpha,
    )
    .await;
    let source_id = source["data"]["source_guid"].as_str().unwrap().to_string();

    let body = call(
        &app,
        "ingest_document",
        json!({
            "title": "Too Long",
            "content": "word ".repeat(20_001),
            "source_id": source_id,
        }),
        &alpha,
    )
    .await;
    assert_eq!(body["status"], "error");
    assert_eq!(body["error_code"], "WORD_COUNT_EXCEEDED");
}

#[tokio::test]
async fn test_validate_document_reports_without_persisting() {
    let (_dir, app) = app().await;
    let alpha = vec![token(&["alpha"])];
    let source = call(
        &app,
        "create_source",
        json!({"name": "Wire", "source_type": "news_agency"}),
        &alpha,
    )
    .await;
    let source_id = source["data"]["source_guid"].as_str().unwrap().to_string();

    let report = call(
        &app,
        "validate_document",
        json!({
            "title": "Probe",
            "content": "A short probe body.",
            "source_id": source_id,
        }),
        &alpha,
    )
    .await;
    assert_eq!(report["status"], "success");
    assert_eq!(report["data"]["valid"], true);
    assert_eq!(report["data"]["is_duplicate"], false);

    // Nothing was ingested: a query finds nothing.
    let results =
        call(&app, "query_documents", json!({"query": "probe body"}), &alpha).await;
    assert_eq!(results["data"]["results"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_client_flow_and_feed_over_the_surface() {
    let (_dir, app) = app().await;
    let alpha = vec![token(&["alpha"])];

    let client = call(
        &app,
        "create_client",
        json!({"name": "Quantum Momentum", "client_type_code": "HEDGE_FUND"}),
        &alpha,
    )
    .await;
    assert_eq!(client["status"], "success");
    let client_id = client["data"]["client_guid"].as_str().unwrap().to_string();

    // No universe seeded: portfolio adds fail closed.
    let missing = call(
        &app,
        "add_to_portfolio",
        json!({"client_id": client_id, "ticker": "TRUCK", "weight": 1.0}),
        &alpha,
    )
    .await;
    assert_eq!(missing["status"], "error");
    assert_eq!(missing["error_code"], "VALIDATION_ERROR");

    // Profile round-trip with completeness.
    let updated = call(
        &app,
        "update_client_profile",
        json!({
            "client_id": client_id,
            "mandate_type": "GROWTH",
            "mandate_text": "Aggressive growth with thematic tilts.",
            "mandate_themes": ["blockchain"],
            "esg_constrained": false
        }),
        &alpha,
    )
    .await;
    assert_eq!(updated["status"], "success");

    let profile = call(&app, "get_client_profile", json!({"client_id": client_id}), &alpha).await;
    assert_eq!(profile["data"]["profile"]["mandate_type"], "GROWTH");
    // Mandate (0.35) + constraints (0.20).
    assert_eq!(profile["data"]["completeness"]["score"], 0.55);

    // An empty feed is a valid feed.
    let feed = call(
        &app,
        "get_client_avatar_feed",
        json!({"client_id": client_id, "limit": 10, "time_window_hours": 24}),
        &alpha,
    )
    .await;
    assert_eq!(feed["status"], "success");
    assert_eq!(feed["data"]["maintenance"].as_array().unwrap().len(), 0);

    // Another group cannot read this client.
    let beta = vec![token(&["beta"])];
    let denied =
        call(&app, "get_client_profile", json!({"client_id": client_id}), &beta).await;
    assert_eq!(denied["error_code"], "ACCESS_DENIED");
}

#[tokio::test]
async fn test_explore_graph_is_group_scoped() {
    let (_dir, app) = app().await;
    let alpha = vec![token(&["alpha"])];
    let beta = vec![token(&["beta"])];

    let source = call(
        &app,
        "create_source",
        json!({"name": "Alpha Wire", "source_type": "news_agency"}),
        &alpha,
    )
    .await;
    let source_id = source["data"]["source_guid"].as_str().unwrap().to_string();
    let ingested = call(
        &app,
        "ingest_document",
        json!({
            "title": "Alpha Only Story",
            "content": "Visible to the alpha group and nobody else.",
            "source_id": source_id,
        }),
        &alpha,
    )
    .await;
    let doc_id = ingested["data"]["doc_id"].as_str().unwrap().to_string();

    // Starting exploration AT a non-permitted document is denied outright.
    let denied = call(
        &app,
        "explore_graph",
        json!({"node_type": "Document", "node_id": doc_id}),
        &beta,
    )
    .await;
    assert_eq!(denied["status"], "error");
    assert_eq!(denied["error_code"], "ACCESS_DENIED");

    // Exploring THROUGH the source: the PRODUCED_BY edge into the alpha
    // document is dropped for an anonymous caller...
    let anonymous = call(
        &app,
        "explore_graph",
        json!({"node_type": "Source", "node_id": source_id}),
        &[],
    )
    .await;
    assert_eq!(anonymous["status"], "success");
    assert_eq!(anonymous["data"]["relationships"].as_array().unwrap().len(), 0);
    assert_eq!(anonymous["data"]["total_found"], 0);

    // ...but visible to the owning group.
    let owner = call(
        &app,
        "explore_graph",
        json!({"node_type": "Source", "node_id": source_id}),
        &alpha,
    )
    .await;
    let relationships = owner["data"]["relationships"].as_array().unwrap();
    assert_eq!(relationships.len(), 1);
    assert_eq!(relationships[0]["relation"], "ProducedBy");

    // The owner may also start at the document itself.
    let direct = call(
        &app,
        "explore_graph",
        json!({"node_type": "Document", "node_id": doc_id}),
        &alpha,
    )
    .await;
    assert_eq!(direct["status"], "success");
}

#[tokio::test]
async fn test_delete_document_requires_admin() {
    let (_dir, app) = app().await;
    let alpha = vec![token(&["alpha"])];
    let admin = vec![token(&["admin", "alpha"])];

    let source = call(
        &app,
        "create_source",
        json!({"name": "Wire", "source_type": "news_agency"}),
        &alpha,
    )
    .await;
    let source_id = source["data"]["source_guid"].as_str().unwrap().to_string();
    let ingested = call(
        &app,
        "ingest_document",
        json!({"title": "Doomed", "content": "Will be hard-deleted.", "source_id": source_id}),
        &alpha,
    )
    .await;
    let doc_id = ingested["data"]["doc_id"].as_str().unwrap().to_string();

    let refused =
        call(&app, "delete_document", json!({"doc_id": doc_id}), &alpha).await;
    assert_eq!(refused["error_code"], "ADMIN_REQUIRED");

    let deleted = call(&app, "delete_document", json!({"doc_id": doc_id}), &admin).await;
    assert_eq!(deleted["status"], "success");

    let gone = call(&app, "get_document", json!({"doc_id": doc_id}), &alpha).await;
    assert_eq!(gone["error_code"], "DOCUMENT_NOT_FOUND");
}
