//! HTTP API tests
//!
//! Drive the full router against the in-memory bill store.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use core_kernel::{BillId, FixedClock, ParticipantId};
use domain_bill::ports::mock::MockBillStore;
use domain_bill::BillPatch;
use interface_api::{
    config::ApiConfig, create_router, ledgers::LedgerRegistry, middleware::ACTOR_HEADER, AppState,
};
use test_utils::{IdFixtures, TestBillBuilder, TestSessionBuilder, TimeFixtures};

struct TestApp {
    router: Router,
    store: MockBillStore,
    ledgers: LedgerRegistry,
    _sessions: TempDir,
}

fn app() -> TestApp {
    let sessions = TempDir::new().unwrap();
    let store = MockBillStore::new();
    let config = ApiConfig {
        session_dir: sessions.path().to_path_buf(),
        ..ApiConfig::default()
    };
    let state = AppState::new(
        Arc::new(store.clone()),
        Arc::new(FixedClock::new(TimeFixtures::now())),
        config,
    );
    TestApp {
        ledgers: state.ledgers.clone(),
        router: create_router(state),
        store,
        _sessions: sessions,
    }
}

async fn send(
    app: &TestApp,
    method: Method,
    uri: &str,
    actor: Option<ParticipantId>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(actor) = actor {
        request = request.header(ACTOR_HEADER, actor.to_string());
    }
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

/// Creates the default trio bill as Alice and returns its JSON
async fn create_dinner(app: &TestApp) -> Value {
    let body = serde_json::to_value(TestBillBuilder::new().request()).unwrap();
    let (status, bill) = send(app, Method::POST, "/api/v1/bills", Some(IdFixtures::alice()), Some(body)).await;
    assert_eq!(status, StatusCode::CREATED);
    bill
}

fn update_body(patch: BillPatch, expected_version: u64) -> Value {
    let mut body = serde_json::to_value(patch).unwrap();
    body["expected_version"] = json!(expected_version);
    body
}

mod health_tests {
    use super::*;

    #[tokio::test]
    async fn test_health_is_public() {
        let app = app();
        let (status, body) = send(&app, Method::GET, "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_readiness_follows_store() {
        let app = app();
        let (status, _) = send(&app, Method::GET, "/health/ready", None, None).await;
        assert_eq!(status, StatusCode::OK);

        app.store.set_unavailable(true);
        let (status, _) = send(&app, Method::GET, "/health/ready", None, None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }
}

mod bill_route_tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_actor_is_unauthorized() {
        let app = app();
        let (status, body) = send(&app, Method::GET, "/api/v1/ledger", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "unauthorized");
    }

    #[tokio::test]
    async fn test_create_uses_actor_as_creator() {
        let app = app();
        let bill = create_dinner(&app).await;

        assert_eq!(bill["version"], 1);
        assert_eq!(bill["created_by"], json!(IdFixtures::alice()));
        assert_eq!(app.store.bill_count().await, 1);
    }

    #[tokio::test]
    async fn test_blank_name_rejected() {
        let app = app();
        let body = serde_json::to_value(TestBillBuilder::new().with_name("").request()).unwrap();
        let (status, body) = send(&app, Method::POST, "/api/v1/bills", Some(IdFixtures::alice()), Some(body)).await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["retryable"], false);
        assert_eq!(app.store.bill_count().await, 0);
    }

    #[tokio::test]
    async fn test_outsider_cannot_read() {
        let app = app();
        let bill = create_dinner(&app).await;
        let uri = format!("/api/v1/bills/{}", bill["id"].as_str().unwrap());

        let (status, _) = send(&app, Method::GET, &uri, Some(IdFixtures::bob()), None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = send(&app, Method::GET, &uri, Some(IdFixtures::outsider()), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_stale_update_returns_conflict_details() {
        let app = app();
        let bill = create_dinner(&app).await;
        let uri = format!("/api/v1/bills/{}", bill["id"].as_str().unwrap());

        let (status, updated) = send(
            &app,
            Method::PUT,
            &uri,
            Some(IdFixtures::bob()),
            Some(update_body(BillPatch::default().with_bill_name("Bob's dinner"), 1)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["version"], 2);

        let (status, body) = send(
            &app,
            Method::PUT,
            &uri,
            Some(IdFixtures::carol()),
            Some(update_body(BillPatch::default().with_bill_name("Carol's dinner"), 1)),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "conflict");
        assert_eq!(body["details"]["conflict"]["local_version"], 1);
        assert_eq!(body["details"]["conflict"]["server_version"], 2);
        assert_eq!(body["details"]["server"]["bill_name"], "Bob's dinner");
    }

    #[tokio::test]
    async fn test_zero_expected_version_rejected() {
        let app = app();
        let bill = create_dinner(&app).await;
        let uri = format!("/api/v1/bills/{}", bill["id"].as_str().unwrap());

        let (status, _) = send(
            &app,
            Method::PUT,
            &uri,
            Some(IdFixtures::alice()),
            Some(update_body(BillPatch::default().with_bill_name("X"), 0)),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_delete_permissions_and_gone() {
        let app = app();
        let bill = create_dinner(&app).await;
        let uri = format!("/api/v1/bills/{}", bill["id"].as_str().unwrap());

        let (status, body) = send(&app, Method::DELETE, &uri, Some(IdFixtures::carol()), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "forbidden");

        let (status, ack) = send(&app, Method::DELETE, &uri, Some(IdFixtures::alice()), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(ack["version"], 2);
        assert_eq!(ack["already_deleted"], false);

        let (status, _) = send(
            &app,
            Method::PUT,
            &uri,
            Some(IdFixtures::alice()),
            Some(update_body(BillPatch::default().with_bill_name("Revived"), 2)),
        )
        .await;
        assert_eq!(status, StatusCode::GONE);
    }

    #[tokio::test]
    async fn test_activity_feed_is_per_caller() {
        let app = app();
        let bill = create_dinner(&app).await;
        let uri = format!("/api/v1/bills/{}/activities", bill["id"].as_str().unwrap());

        let (status, feed) = send(&app, Method::GET, &uri, Some(IdFixtures::bob()), None).await;
        assert_eq!(status, StatusCode::OK);
        let feed = feed.as_array().unwrap();
        assert_eq!(feed.len(), 1);
        assert_eq!(feed[0]["participant_id"], json!(IdFixtures::bob()));

        let (status, _) = send(&app, Method::GET, &uri, Some(IdFixtures::outsider()), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_unknown_bill_not_found() {
        let app = app();
        let uri = format!("/api/v1/bills/{}", BillId::new_v7().as_uuid());
        let (status, _) = send(&app, Method::GET, &uri, Some(IdFixtures::alice()), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}

mod conflict_route_tests {
    use super::*;

    async fn stale_edit(app: &TestApp) -> (String, Value) {
        let bill = create_dinner(app).await;
        let uri = format!("/api/v1/bills/{}", bill["id"].as_str().unwrap());
        send(
            app,
            Method::PUT,
            &uri,
            Some(IdFixtures::bob()),
            Some(update_body(BillPatch::default().with_bill_name("Server"), 1)),
        )
        .await;
        let (_, body) = send(
            app,
            Method::PUT,
            &uri,
            Some(IdFixtures::carol()),
            Some(update_body(BillPatch::default().with_bill_name("Local"), 1)),
        )
        .await;
        (uri, body["details"]["conflict"].clone())
    }

    #[tokio::test]
    async fn test_pending_conflicts_listed_for_owner() {
        let app = app();
        let (_, conflict) = stale_edit(&app).await;

        let (status, list) = send(&app, Method::GET, "/api/v1/conflicts", Some(IdFixtures::carol()), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list.as_array().unwrap().len(), 1);
        assert_eq!(list[0]["id"], conflict["id"]);

        let (_, list) = send(&app, Method::GET, "/api/v1/conflicts", Some(IdFixtures::bob()), None).await;
        assert!(list.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_accept_local_commits() {
        let app = app();
        let (uri, conflict) = stale_edit(&app).await;
        let resolve = format!("/api/v1/conflicts/{}/resolve", conflict["id"].as_str().unwrap());

        let (status, outcome) = send(
            &app,
            Method::POST,
            &resolve,
            Some(IdFixtures::carol()),
            Some(json!({ "resolution": "accept_local" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(outcome["outcome"], "committed");
        assert_eq!(outcome["bill"]["version"], 3);

        let (_, bill) = send(&app, Method::GET, &uri, Some(IdFixtures::alice()), None).await;
        assert_eq!(bill["bill_name"], "Local");

        let (status, _) = send(
            &app,
            Method::POST,
            &resolve,
            Some(IdFixtures::carol()),
            Some(json!({ "resolution": "accept_local" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_manual_not_offered_on_low_severity() {
        let app = app();
        let (_, conflict) = stale_edit(&app).await;
        let resolve = format!("/api/v1/conflicts/{}/resolve", conflict["id"].as_str().unwrap());

        let (status, _) = send(
            &app,
            Method::POST,
            &resolve,
            Some(IdFixtures::carol()),
            Some(json!({ "resolution": "manual" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}

mod ledger_route_tests {
    use super::*;

    #[tokio::test]
    async fn test_ledger_lists_bills_and_balances() {
        let app = app();
        create_dinner(&app).await;

        let (status, ledger) = send(&app, Method::GET, "/api/v1/ledger", Some(IdFixtures::bob()), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(ledger["bills"].as_array().unwrap().len(), 1);

        let balances = ledger["balances"].as_array().unwrap();
        assert_eq!(balances.len(), 1);
        assert_eq!(balances[0]["counterparty"], json!(IdFixtures::alice()));
    }

    #[tokio::test]
    async fn test_ledger_follows_commits_without_reloading() {
        let app = app();
        let (status, ledger) = send(&app, Method::GET, "/api/v1/ledger", Some(IdFixtures::bob()), None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(ledger["bills"].as_array().unwrap().is_empty());

        let mut updates = app.ledgers.ledger(IdFixtures::bob()).await.unwrap().subscribe();
        create_dinner(&app).await;
        tokio::time::timeout(Duration::from_secs(5), updates.wait_for(|s| s.bills().count() == 1))
            .await
            .expect("ledger should pick up the new bill")
            .unwrap();

        // Served from the live snapshot, so the store is not consulted
        app.store.set_unavailable(true);
        let (status, ledger) = send(&app, Method::GET, "/api/v1/ledger", Some(IdFixtures::bob()), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(ledger["bills"].as_array().unwrap().len(), 1);
        assert_eq!(ledger["balances"].as_array().unwrap().len(), 1);
        assert_eq!(app.ledgers.live_count().await, 1);
    }

    #[tokio::test]
    async fn test_ledger_unavailable_is_retryable() {
        let app = app();
        app.store.set_unavailable(true);

        let (status, body) = send(&app, Method::GET, "/api/v1/ledger", Some(IdFixtures::bob()), None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["retryable"], true);
    }
}

mod session_route_tests {
    use super::*;

    #[tokio::test]
    async fn test_save_load_discard() {
        let app = app();
        let snapshot = serde_json::to_value(TestSessionBuilder::new().build()).unwrap();

        let (status, _) = send(&app, Method::GET, "/api/v1/session", Some(IdFixtures::alice()), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&app, Method::PUT, "/api/v1/session", Some(IdFixtures::alice()), Some(snapshot.clone())).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, loaded) = send(&app, Method::GET, "/api/v1/session", Some(IdFixtures::alice()), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(loaded["session_id"], snapshot["session_id"]);

        // Sessions are private to their participant
        let (status, _) = send(&app, Method::GET, "/api/v1/session", Some(IdFixtures::bob()), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&app, Method::DELETE, "/api/v1/session", Some(IdFixtures::alice()), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&app, Method::GET, "/api/v1/session", Some(IdFixtures::alice()), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_commit_creates_bill_and_clears_session() {
        let app = app();
        let snapshot = TestSessionBuilder::new()
            .paid_by(IdFixtures::alice())
            .fully_assigned()
            .build();
        send(
            &app,
            Method::PUT,
            "/api/v1/session",
            Some(IdFixtures::alice()),
            Some(serde_json::to_value(snapshot).unwrap()),
        )
        .await;

        let (status, bill) = send(
            &app,
            Method::POST,
            "/api/v1/session/commit",
            Some(IdFixtures::alice()),
            Some(json!({ "date": "2024-03-15" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(bill["date"], "2024-03-15");
        assert_eq!(bill["version"], 1);

        let (status, _) = send(&app, Method::GET, "/api/v1/session", Some(IdFixtures::alice()), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_commit_without_payer_keeps_session() {
        let app = app();
        let snapshot = TestSessionBuilder::new().fully_assigned().build();
        send(
            &app,
            Method::PUT,
            "/api/v1/session",
            Some(IdFixtures::alice()),
            Some(serde_json::to_value(snapshot).unwrap()),
        )
        .await;

        let (status, _) = send(&app, Method::POST, "/api/v1/session/commit", Some(IdFixtures::alice()), Some(json!({}))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (status, _) = send(&app, Method::GET, "/api/v1/session", Some(IdFixtures::alice()), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(app.store.bill_count().await, 0);
    }
}
