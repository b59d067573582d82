use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use super::*;
use crate::test_support::{runner_with, seed_source, Fixed, Gate, RecordingMailer};

fn app_with(pool: PgPool, auth: AuthState) -> Router {
    let runner = runner_with(
        pool.clone(),
        &[("acme.example", Fixed::postings(&["/j1", "/j2"]))],
        Arc::new(RecordingMailer::default()),
        &[],
    );
    build_app(AppState { pool, runner }, auth)
}

fn open_app(pool: PgPool) -> Router {
    app_with(pool, AuthState::from_keys(&[], true).expect("auth"))
}

async fn call(app: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("request"),
        None => builder.body(Body::empty()).expect("request"),
    };
    let response = app.oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body bytes");
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("json parse")
    };
    (status, json)
}

fn source_body(url: &str) -> Value {
    json!({
        "title": "Acme careers",
        "url": url,
        "schedule_time": "08:15",
        "schedule_days": ["mon", "wed"],
        "keywords": ["rust", "  "]
    })
}

#[test]
fn normalize_limit_applies_defaults_and_bounds() {
    assert_eq!(normalize_limit(None), 50);
    assert_eq!(normalize_limit(Some(0)), 1);
    assert_eq!(normalize_limit(Some(1_000)), 200);
    assert_eq!(normalize_limit(Some(25)), 25);
}

#[test]
fn api_error_codes_map_to_statuses() {
    let cases = [
        ("validation_error", StatusCode::BAD_REQUEST),
        ("not_found", StatusCode::NOT_FOUND),
        ("conflict", StatusCode::CONFLICT),
        ("internal_error", StatusCode::INTERNAL_SERVER_ERROR),
    ];
    for (code, status) in cases {
        let response = ApiError::new("req-1", code, "x").into_response();
        assert_eq!(response.status(), status, "code {code}");
    }
}

#[sqlx::test(migrations = "../../migrations")]
async fn health_is_public_and_carries_request_id(pool: PgPool) {
    let app = app_with(pool, AuthState::from_keys(&["k".to_string()], false).expect("auth"));
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/health")
                .header("x-request-id", "req-42")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-request-id"], "req-42");
    let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
    let json: Value = serde_json::from_slice(&bytes).expect("json");
    assert_eq!(json["data"]["status"], "ok");
    assert_eq!(json["meta"]["request_id"], "req-42");
}

#[sqlx::test(migrations = "../../migrations")]
async fn protected_routes_require_a_bearer_token(pool: PgPool) {
    let auth = AuthState::from_keys(&["secret".to_string()], false).expect("auth");
    let app = app_with(pool, auth);

    let (status, json) = call(app.clone(), "GET", "/api/v1/sources", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["error"]["code"], "unauthorized");

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/sources")
                .header("authorization", "Bearer secret")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
}

#[sqlx::test(migrations = "../../migrations")]
async fn source_crud_round_trip(pool: PgPool) {
    let app = open_app(pool);

    let (status, created) = call(
        app.clone(),
        "POST",
        "/api/v1/sources",
        Some(source_body("https://acme.example/jobs")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = created["data"]["id"].as_i64().expect("id");
    assert_eq!(created["data"]["cron"], "0 15 8 * * MON,WED");
    assert_eq!(created["data"]["keywords"], json!(["rust"]));

    let mut replacement = source_body("https://acme.example/jobs?page=1");
    replacement["schedule_time"] = json!("10:00");
    replacement["keywords"] = json!([]);
    let (status, replaced) = call(
        app.clone(),
        "PUT",
        &format!("/api/v1/sources/{id}"),
        Some(replacement),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(replaced["data"]["cron"], "0 0 10 * * MON,WED");
    assert_eq!(replaced["data"]["keywords"], json!([]));

    let (status, listed) = call(app.clone(), "GET", "/api/v1/sources", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed["data"].as_array().map(Vec::len), Some(1));

    let (status, _) = call(app.clone(), "DELETE", &format!("/api/v1/sources/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, json) = call(app, "GET", &format!("/api/v1/sources/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"]["code"], "not_found");
}

#[sqlx::test(migrations = "../../migrations")]
async fn invalid_source_payloads_are_rejected(pool: PgPool) {
    let app = open_app(pool);

    let mut bad_day = source_body("https://acme.example/jobs");
    bad_day["schedule_days"] = json!(["funday"]);
    let (status, json) = call(app.clone(), "POST", "/api/v1/sources", Some(bad_day)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "validation_error");

    let (status, _) = call(
        app.clone(),
        "POST",
        "/api/v1/sources",
        Some(source_body("not a url")),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(
        app,
        "PUT",
        "/api/v1/sources/9999",
        Some(source_body("https://acme.example/jobs")),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[sqlx::test(migrations = "../../migrations")]
async fn manual_run_is_accepted_then_reconciled(pool: PgPool) {
    let id = seed_source(&pool, "Acme", "https://acme.example/jobs").await;
    let runner = runner_with(
        pool.clone(),
        &[("acme.example", Fixed::postings(&["/j1", "/j2"]))],
        Arc::new(RecordingMailer::default()),
        &[],
    );
    let app = build_app(
        AppState {
            pool: pool.clone(),
            runner: Arc::clone(&runner),
        },
        AuthState::from_keys(&[], true).expect("auth"),
    );

    let (status, json) = call(app.clone(), "POST", &format!("/api/v1/sources/{id}/run"), None).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(json["data"]["source_id"], id);

    // The run proceeds on its own task; wait for the guard to clear.
    for _ in 0..100 {
        if !runner.is_running(id) {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    assert!(!runner.is_running(id));

    let (status, postings) =
        call(app, "GET", &format!("/api/v1/sources/{id}/postings"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(postings["data"].as_array().map(Vec::len), Some(2));
}

#[sqlx::test(migrations = "../../migrations")]
async fn manual_run_conflicts_while_in_flight(pool: PgPool) {
    let id = seed_source(&pool, "Acme", "https://acme.example/jobs").await;
    let gate = Gate::new();
    let runner = runner_with(
        pool.clone(),
        &[("acme.example", gate.extractor())],
        Arc::new(RecordingMailer::default()),
        &[],
    );
    let app = build_app(
        AppState {
            pool,
            runner: Arc::clone(&runner),
        },
        AuthState::from_keys(&[], true).expect("auth"),
    );
    let uri = format!("/api/v1/sources/{id}/run");

    let (status, _) = call(app.clone(), "POST", &uri, None).await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let (status, json) = call(app.clone(), "POST", &uri, None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["error"]["code"], "conflict");

    gate.open();
    for _ in 0..100 {
        if !runner.is_running(id) {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    let (status, _) = call(app, "POST", &uri, None).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    gate.open();
}

#[sqlx::test(migrations = "../../migrations")]
async fn unknown_source_ids_are_not_found(pool: PgPool) {
    let app = open_app(pool);

    let (status, _) = call(app.clone(), "POST", "/api/v1/sources/9999/run", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = call(app.clone(), "GET", "/api/v1/sources/9999/postings", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = call(app, "DELETE", "/api/v1/sources/9999", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[sqlx::test(migrations = "../../migrations")]
async fn recipients_add_list_conflict_delete(pool: PgPool) {
    let app = open_app(pool);
    let body = json!({ "email": " team@example.com " });

    let (status, created) = call(app.clone(), "POST", "/api/v1/recipients", Some(body.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["data"]["email"], "team@example.com");
    let id = created["data"]["id"].as_i64().expect("id");

    let (status, json) = call(app.clone(), "POST", "/api/v1/recipients", Some(body)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["error"]["code"], "conflict");

    let (status, _) = call(
        app.clone(),
        "POST",
        "/api/v1/recipients",
        Some(json!({ "email": "nobody" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, listed) = call(app.clone(), "GET", "/api/v1/recipients", None).await;
    assert_eq!(listed["data"].as_array().map(Vec::len), Some(1));

    let (status, _) = call(app.clone(), "DELETE", &format!("/api/v1/recipients/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = call(app, "DELETE", &format!("/api/v1/recipients/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[sqlx::test(migrations = "../../migrations")]
async fn recipients_the_mailer_cannot_parse_are_rejected(pool: PgPool) {
    let app = open_app(pool.clone());

    for email in ["a,b@example.com", "Team <team@example.com>"] {
        let (status, json) = call(
            app.clone(),
            "POST",
            "/api/v1/recipients",
            Some(json!({ "email": email })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{email}");
        assert_eq!(json["error"]["code"], "validation_error");
    }

    assert!(jobwatch_db::list_recipient_emails(&pool)
        .await
        .expect("recipients")
        .is_empty());
}

#[sqlx::test(migrations = "../../migrations")]
async fn digest_time_read_and_update(pool: PgPool) {
    let app = open_app(pool);

    let (status, json) = call(app.clone(), "GET", "/api/v1/settings/digest-time", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["digest_time"], "15:30");
    assert_eq!(json["data"]["cleanup_time"], "15:35");
    assert_eq!(json["data"]["reset_time"], "15:40");

    let (status, json) = call(
        app.clone(),
        "PUT",
        "/api/v1/settings/digest-time",
        Some(json!({ "digest_time": "23:58" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["cleanup_time"], "00:03");

    let (status, _) = call(
        app.clone(),
        "PUT",
        "/api/v1/settings/digest-time",
        Some(json!({ "digest_time": "25:00" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, json) = call(app, "GET", "/api/v1/settings/digest-time", None).await;
    assert_eq!(json["data"]["digest_time"], "23:58");
}

#[sqlx::test(migrations = "../../migrations")]
async fn failures_are_listed_newest_first(pool: PgPool) {
    let id = seed_source(&pool, "Acme", "https://acme.example/jobs").await;
    for message in ["first", "second", "third"] {
        jobwatch_db::insert_failure(
            &pool,
            &jobwatch_db::NewFailure {
                source_id: id,
                source_url: "https://acme.example/jobs",
                kind: jobwatch_db::FailureKind::RunError,
                message,
                trace: message,
            },
        )
        .await
        .expect("insert failure");
    }
    let (status, json) = call(open_app(pool), "GET", "/api/v1/failures?limit=2", None).await;
    assert_eq!(status, StatusCode::OK);
    let data = json["data"].as_array().expect("array");
    assert_eq!(data.len(), 2);
    assert_eq!(data[0]["message"], "third");
    assert_eq!(data[0]["error_kind"], "run_error");
}

#[sqlx::test(migrations = "../../migrations")]
async fn stats_summarise_postings_and_failures(pool: PgPool) {
    let id = seed_source(&pool, "Acme", "https://acme.example/jobs").await;
    let postings: Vec<jobwatch_core::Posting> = ["/j1", "/j2"]
        .into_iter()
        .map(|link| jobwatch_core::Posting {
            title: format!("Engineer {link}"),
            company: "Acme".to_string(),
            location: "Remote".to_string(),
            link: link.to_string(),
        })
        .collect();
    jobwatch_db::reconcile_postings(&pool, id, "https://acme.example/jobs", &postings)
        .await
        .expect("reconcile");

    let (status, json) = call(open_app(pool), "GET", "/api/v1/stats", None).await;
    assert_eq!(status, StatusCode::OK);
    let data = &json["data"];
    assert_eq!(data["active_postings"], 2);
    assert_eq!(data["new_today"], 2);
    assert_eq!(data["removed_today"], 0);
    assert_eq!(data["source_count"], 1);
    assert_eq!(data["postings_per_url"][0]["source_url"], "https://acme.example/jobs");
    assert_eq!(data["postings_per_url"][0]["postings"], 2);
    assert_eq!(data["last_failures"][0]["source_id"], id);
    assert!(data["last_failures"][0]["failed_at"].is_null());
    assert_eq!(data["trend"].as_array().expect("trend array").len(), 30);
    assert_eq!(data["trend"][29]["new_postings"], 2);
    assert!(json["meta"]["request_id"].is_string());
}
