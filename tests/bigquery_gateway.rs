mod common;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query as QueryString, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::net::TcpListener;

use tds_explorer::config::Config;
use tds_explorer::error::AppError;
use tds_explorer::queries::AuthorFilter;
use tds_explorer::warehouse::{BigQueryGateway, QueryGateway};

#[derive(Clone, Copy)]
enum Scenario {
    /// Job incomplete on the first reply, then two result pages.
    PollAndPage,
    /// Two 503s before a successful answer.
    FlakyThenOk,
    BadRequest,
    Slow,
    /// The first request is rejected as unauthenticated.
    ExpiredOnce,
}

#[derive(Clone)]
struct Mock {
    scenario: Scenario,
    token_calls: Arc<AtomicUsize>,
    query_calls: Arc<AtomicUsize>,
    bodies: Arc<std::sync::Mutex<Vec<Value>>>,
}

fn schema() -> Value {
    json!({
        "fields": [
            {"name": "Title", "type": "STRING", "mode": "NULLABLE"},
            {"name": "Author", "type": "STRING", "mode": "NULLABLE"},
            {"name": "Claps", "type": "INTEGER", "mode": "NULLABLE"},
            {"name": "Responses", "type": "INTEGER", "mode": "NULLABLE"},
            {"name": "ReadingTime", "type": "FLOAT", "mode": "NULLABLE"},
            {"name": "Date", "type": "STRING", "mode": "NULLABLE"},
            {"name": "Id", "type": "INTEGER", "mode": "NULLABLE"}
        ]
    })
}

fn article_row(rank: i64, claps: i64) -> Value {
    json!({"f": [
        {"v": format!("Article {}", rank)},
        {"v": "Jane Doe"},
        {"v": claps.to_string()},
        {"v": "2"},
        {"v": "7.5"},
        {"v": "2019-03-01"},
        {"v": rank.to_string()}
    ]})
}

async fn token(State(mock): State<Mock>) -> Json<Value> {
    mock.token_calls.fetch_add(1, Ordering::SeqCst);
    Json(json!({"access_token": "test-token", "expires_in": 3600, "token_type": "Bearer"}))
}

async fn start_query(State(mock): State<Mock>, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    let call = mock.query_calls.fetch_add(1, Ordering::SeqCst);
    mock.bodies.lock().unwrap().push(body);

    match mock.scenario {
        Scenario::PollAndPage => (
            StatusCode::OK,
            Json(json!({
                "jobComplete": false,
                "jobReference": {"projectId": "tds-explorer-test", "jobId": "job-1", "location": "US"}
            })),
        ),
        Scenario::FlakyThenOk if call < 2 => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"error": {"code": 503, "message": "backend unavailable"}})),
        ),
        Scenario::FlakyThenOk => (
            StatusCode::OK,
            Json(json!({"jobComplete": true, "schema": schema(), "rows": [article_row(1, 900)]})),
        ),
        Scenario::BadRequest => (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": {"code": 400, "message": "Unrecognized name: Clapz"}})),
        ),
        Scenario::ExpiredOnce if call == 0 => (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": {"code": 401, "message": "Request had invalid authentication credentials."}})),
        ),
        Scenario::ExpiredOnce => (
            StatusCode::OK,
            Json(json!({"jobComplete": true, "schema": schema(), "rows": [article_row(1, 900)]})),
        ),
        Scenario::Slow => {
            tokio::time::sleep(Duration::from_secs(5)).await;
            (StatusCode::OK, Json(json!({"jobComplete": true})))
        }
    }
}

async fn query_results(
    Path((_, job)): Path<(String, String)>,
    QueryString(params): QueryString<HashMap<String, String>>,
) -> Json<Value> {
    assert_eq!(job, "job-1");
    assert_eq!(params.get("location").map(String::as_str), Some("US"));

    match params.get("pageToken").map(String::as_str) {
        None => Json(json!({
            "jobComplete": true,
            "jobReference": {"jobId": "job-1", "location": "US"},
            "schema": schema(),
            "rows": [article_row(1, 900), article_row(2, 450)],
            "pageToken": "page-2"
        })),
        Some("page-2") => Json(json!({
            "jobComplete": true,
            "jobReference": {"jobId": "job-1", "location": "US"},
            "schema": schema(),
            "rows": [article_row(3, 120)]
        })),
        Some(other) => panic!("unexpected page token {}", other),
    }
}

struct Harness {
    mock: Mock,
    gateway: BigQueryGateway,
    _dir: TempDir,
}

async fn harness(scenario: Scenario, timeout_secs: &str) -> Harness {
    let mock = Mock {
        scenario,
        token_calls: Arc::new(AtomicUsize::new(0)),
        query_calls: Arc::new(AtomicUsize::new(0)),
        bodies: Arc::new(std::sync::Mutex::new(Vec::new())),
    };

    let router = Router::new()
        .route("/token", post(token))
        .route("/projects/:project/queries", post(start_query))
        .route("/projects/:project/queries/:job", get(query_results))
        .with_state(mock.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    // Point the service account's token endpoint at the mock.
    let mut account: Value =
        serde_json::from_str(&std::fs::read_to_string(common::fixture_path("service_account.json")).unwrap()).unwrap();
    account["token_uri"] = json!(format!("http://{}/token", addr));
    let dir = tempfile::tempdir().unwrap();
    let credentials = dir.path().join("credentials.json");
    std::fs::write(&credentials, account.to_string()).unwrap();

    let api_base = format!("http://{}", addr);
    let credentials = credentials.display().to_string();
    let vars: HashMap<&str, String> = HashMap::from([
        ("GOOGLE_APPLICATION_CREDENTIALS", credentials),
        ("BQ_API_BASE", api_base),
        ("BQ_LOCATION", "US".to_string()),
        ("BQ_ARTICLES_TABLE", "tds-project.medium.articles".to_string()),
        ("QUERY_TIMEOUT_SECS", timeout_secs.to_string()),
    ]);
    let config = Config::from_lookup(|key: &str| vars.get(key).cloned()).unwrap();
    let gateway = BigQueryGateway::new(&config).unwrap().with_backoff(Duration::from_millis(5));

    Harness { mock, gateway, _dir: dir }
}

#[tokio::test]
async fn test_polls_until_complete_and_follows_pages() {
    let h = harness(Scenario::PollAndPage, "10").await;
    let query = common::templates().top_articles(&AuthorFilter::Author("Jane Doe".into()));

    let rows = h.gateway.run(&query).await.unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[2].int("Claps").unwrap(), 120);
    assert_eq!(rows[0].float("ReadingTime").unwrap(), 7.5);

    let bodies = h.mock.bodies.lock().unwrap().clone();
    assert_eq!(bodies.len(), 1);
    assert_eq!(bodies[0]["useLegacySql"], false);
    assert_eq!(bodies[0]["parameterMode"], "NAMED");
    assert_eq!(bodies[0]["location"], "US");
    let params = bodies[0]["queryParameters"].as_array().unwrap();
    assert!(params.iter().any(|p| p["name"] == "author" && p["parameterValue"]["value"] == "Jane Doe"));
    assert!(!bodies[0]["query"].as_str().unwrap().contains("Jane Doe"));
}

#[tokio::test]
async fn test_retries_transient_failures() {
    let h = harness(Scenario::FlakyThenOk, "10").await;

    let rows = h.gateway.run(&common::templates().top_articles(&AuthorFilter::All)).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(h.mock.query_calls.load(Ordering::SeqCst), 3);
    // The token is cached across attempts.
    assert_eq!(h.mock.token_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_rejected_token_is_refreshed() {
    let h = harness(Scenario::ExpiredOnce, "10").await;

    let rows = h.gateway.run(&common::templates().top_articles(&AuthorFilter::All)).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(h.mock.query_calls.load(Ordering::SeqCst), 2);
    assert_eq!(h.mock.token_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_query_errors_are_not_retried() {
    let h = harness(Scenario::BadRequest, "10").await;

    let err = h.gateway.run(&common::templates().authors()).await.unwrap_err();
    match err {
        AppError::QueryError(msg) => assert!(msg.contains("Unrecognized name"), "{}", msg),
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(h.mock.query_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_slow_queries_time_out() {
    let h = harness(Scenario::Slow, "1").await;

    let err = h.gateway.run(&common::templates().tags()).await.unwrap_err();
    assert!(matches!(err, AppError::Timeout(_)), "{:?}", err);
    assert!(err.is_retryable());
}
