//! HTTP surface tests driven through the router with `oneshot`

use axum::{
    body::{to_bytes, Body},
    http::{HeaderMap, Method, Request, StatusCode},
    Router,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use std::str::FromStr;
use std::sync::Arc;
use tower::ServiceExt;
use wagering::api::{build_app, AppState};
use wagering::config::ApiConfig;
use wagering::storage::MemoryStore;
use wagering::{UserId, WageringConfig, WageringService};

const CLIENT_IP: &str = "203.0.113.7";

async fn app() -> Router {
    let service = WageringService::builder(WageringConfig::testing(), Arc::new(MemoryStore::new()))
        .build()
        .unwrap();
    service
        .register_account(&UserId::new("alice"), dec!(1000))
        .await
        .unwrap();
    service
        .register_account(&UserId::new("mallory"), dec!(1000))
        .await
        .unwrap();
    let state = Arc::new(AppState::new(Arc::new(service), true));
    build_app(state, &ApiConfig::default())
}

struct Reply {
    status: StatusCode,
    headers: HeaderMap,
    body: Value,
}

async fn call(
    app: &Router,
    method: Method,
    uri: &str,
    user: Option<&str>,
    ip: &str,
    body: Option<Value>,
) -> Reply {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-forwarded-for", format!("{}, 10.0.0.1", ip));
    if let Some(user) = user {
        builder = builder.header("x-user-id", user);
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    Reply {
        status,
        headers,
        body,
    }
}

fn money(value: &Value) -> Decimal {
    Decimal::from_str(value.as_str().expect("amounts are strings")).unwrap()
}

async fn launch(app: &Router, user: &str) -> String {
    let reply = call(
        app,
        Method::POST,
        "/api/games/launch",
        Some(user),
        CLIENT_IP,
        Some(json!({ "game_id": "classic-fruits" })),
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK, "{}", reply.body);
    reply.body["session_token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health_and_request_id() {
    let app = app().await;
    let reply = call(&app, Method::GET, "/health", None, CLIENT_IP, None).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["status"], "Running");
    assert_eq!(reply.body["games"], 2);
    assert!(reply.headers.contains_key("x-request-id"));
}

#[tokio::test]
async fn test_bet_win_rollback_over_http() {
    let app = app().await;
    let token = launch(&app, "alice").await;

    let bet = call(
        &app,
        Method::POST,
        "/api/games/bet",
        Some("alice"),
        CLIENT_IP,
        Some(json!({ "session_token": token, "round_id": "r-1", "amount": "10.00" })),
    )
    .await;
    assert_eq!(bet.status, StatusCode::OK, "{}", bet.body);
    assert_eq!(money(&bet.body["balance"]), dec!(990));

    let win = call(
        &app,
        Method::POST,
        "/api/games/win",
        Some("alice"),
        CLIENT_IP,
        Some(json!({ "session_token": token, "round_id": "r-1", "amount": "0" })),
    )
    .await;
    assert_eq!(win.status, StatusCode::OK, "{}", win.body);
    assert_eq!(money(&win.body["balance"]), dec!(990));

    let rollback = call(
        &app,
        Method::POST,
        "/api/games/rollback/r-1",
        Some("alice"),
        CLIENT_IP,
        None,
    )
    .await;
    assert_eq!(rollback.status, StatusCode::CONFLICT);
    assert_eq!(rollback.body["error"]["code"], "ROUND_ALREADY_SETTLED");
    assert!(rollback.body["request_id"].is_string());

    let balance = call(&app, Method::GET, "/api/balance", Some("alice"), CLIENT_IP, None).await;
    assert_eq!(money(&balance.body["balance"]), dec!(990));

    let ledger = call(&app, Method::GET, "/api/ledger?limit=5", Some("alice"), CLIENT_IP, None).await;
    assert_eq!(ledger.status, StatusCode::OK);
    assert_eq!(ledger.body["entries"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_security_failures_are_forbidden() {
    let app = app().await;
    let token = launch(&app, "alice").await;

    let hijack = call(
        &app,
        Method::POST,
        "/api/games/bet",
        Some("mallory"),
        CLIENT_IP,
        Some(json!({ "session_token": token, "round_id": "r-1", "amount": "1" })),
    )
    .await;
    assert_eq!(hijack.status, StatusCode::FORBIDDEN);
    assert_eq!(hijack.body["error"]["code"], "SESSION_NOT_OWNED");

    let moved = call(
        &app,
        Method::POST,
        "/api/games/bet",
        Some("alice"),
        "198.51.100.4",
        Some(json!({ "session_token": token, "round_id": "r-1", "amount": "1" })),
    )
    .await;
    assert_eq!(moved.status, StatusCode::FORBIDDEN);
    assert_eq!(moved.body["error"]["code"], "ORIGIN_MISMATCH");

    call(
        &app,
        Method::POST,
        "/api/games/bet",
        Some("alice"),
        CLIENT_IP,
        Some(json!({ "session_token": token, "round_id": "r-2", "amount": "1.00" })),
    )
    .await;
    let fraud = call(
        &app,
        Method::POST,
        "/api/games/win",
        Some("alice"),
        CLIENT_IP,
        Some(json!({ "session_token": token, "round_id": "r-2", "amount": "1000.01" })),
    )
    .await;
    assert_eq!(fraud.status, StatusCode::FORBIDDEN);
    assert_eq!(fraud.body["error"]["code"], "INVALID_WIN_AMOUNT");
    assert_eq!(money(&fraud.body["error"]["details"]["allowed"]), dec!(1000));

    let foreign = call(&app, Method::GET, "/api/rounds/r-2", Some("mallory"), CLIENT_IP, None).await;
    assert_eq!(foreign.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_missing_caller_is_unauthorized() {
    let app = app().await;
    let reply = call(
        &app,
        Method::POST,
        "/api/games/launch",
        None,
        CLIENT_IP,
        Some(json!({ "game_id": "classic-fruits" })),
    )
    .await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);

    // Demo launches need no identity and return a demo token
    let demo = call(
        &app,
        Method::POST,
        "/api/games/launch",
        None,
        CLIENT_IP,
        Some(json!({ "game_id": "classic-fruits", "demo": true })),
    )
    .await;
    assert_eq!(demo.status, StatusCode::OK);
    assert!(demo.body["session_token"]
        .as_str()
        .unwrap()
        .starts_with("demo-"));
}

#[tokio::test]
async fn test_insufficient_funds_and_stake_limits() {
    let app = app().await;
    let token = launch(&app, "alice").await;

    let too_large = call(
        &app,
        Method::POST,
        "/api/games/bet",
        Some("alice"),
        CLIENT_IP,
        Some(json!({ "session_token": token, "round_id": "big", "amount": "5000" })),
    )
    .await;
    assert_eq!(too_large.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(too_large.body["error"]["code"], "STAKE_OUT_OF_RANGE");

    for i in 0..2 {
        call(
            &app,
            Method::POST,
            "/api/games/bet",
            Some("alice"),
            CLIENT_IP,
            Some(json!({ "session_token": token, "round_id": format!("b-{}", i), "amount": "450" })),
        )
        .await;
    }
    let broke = call(
        &app,
        Method::POST,
        "/api/games/bet",
        Some("alice"),
        CLIENT_IP,
        Some(json!({ "session_token": token, "round_id": "b-3", "amount": "450" })),
    )
    .await;
    assert_eq!(broke.status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(money(&broke.body["error"]["details"]["balance"]), dec!(100));
}

#[tokio::test]
async fn test_session_spin_and_end() {
    let app = app().await;
    let token = launch(&app, "alice").await;

    let spin = call(
        &app,
        Method::POST,
        &format!("/api/game-sessions/{}/spin", token),
        Some("alice"),
        CLIENT_IP,
        Some(json!({ "stake": "2.00", "round_id": "spin-1" })),
    )
    .await;
    assert_eq!(spin.status, StatusCode::OK, "{}", spin.body);
    assert_eq!(spin.body["round_id"], "spin-1");
    assert_eq!(spin.body["symbols"].as_array().unwrap().len(), 3);
    let expected = dec!(998) + money(&spin.body["win_amount"]);
    assert_eq!(money(&spin.body["new_balance"]), expected);

    let round = call(&app, Method::GET, "/api/rounds/spin-1", Some("alice"), CLIENT_IP, None).await;
    assert_eq!(round.status, StatusCode::OK);
    assert_eq!(round.body["status"], "COMPLETED");

    let end = call(
        &app,
        Method::POST,
        &format!("/api/game-sessions/{}/end", token),
        Some("alice"),
        CLIENT_IP,
        None,
    )
    .await;
    assert_eq!(end.status, StatusCode::NO_CONTENT);

    let closed = call(
        &app,
        Method::POST,
        "/api/games/spin",
        Some("alice"),
        CLIENT_IP,
        Some(json!({ "session_token": token, "stake": "1" })),
    )
    .await;
    assert_eq!(closed.status, StatusCode::CONFLICT);
    assert_eq!(closed.body["error"]["code"], "SESSION_CLOSED");
}

#[tokio::test]
async fn test_spin_rate_limit() {
    let app = app().await;
    let token = launch(&app, "alice").await;

    let mut statuses = Vec::new();
    for _ in 0..8 {
        let reply = call(
            &app,
            Method::POST,
            "/api/games/spin",
            Some("alice"),
            CLIENT_IP,
            Some(json!({ "session_token": token, "stake": "0.10" })),
        )
        .await;
        statuses.push(reply.status);
    }
    assert_eq!(statuses[0], StatusCode::OK);
    assert!(statuses.contains(&StatusCode::TOO_MANY_REQUESTS));
}

#[tokio::test]
async fn test_player_rollbacks_share_wager_budget() {
    let app = app().await;

    let mut statuses = Vec::new();
    for i in 0..25 {
        let reply = call(
            &app,
            Method::POST,
            &format!("/api/games/rollback/missing-{}", i),
            Some("alice"),
            CLIENT_IP,
            None,
        )
        .await;
        statuses.push(reply.status);
    }
    assert_eq!(statuses[0], StatusCode::NOT_FOUND);
    assert!(statuses.contains(&StatusCode::TOO_MANY_REQUESTS));

    // The budget is per caller
    let other = call(
        &app,
        Method::POST,
        "/api/games/rollback/missing-x",
        Some("mallory"),
        CLIENT_IP,
        None,
    )
    .await;
    assert_eq!(other.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = app().await;
    launch(&app, "alice").await;
    let reply = call(&app, Method::GET, "/metrics", None, CLIENT_IP, None).await;
    assert_eq!(reply.status, StatusCode::OK);
    let text = reply.body.as_str().unwrap();
    assert!(text.contains("wagering_operations_total{operation=\"launch\",outcome=\"ok\"} 1"));
}
