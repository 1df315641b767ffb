//! End-to-end behaviour of the HTTP surface.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use fnb_core::span::MemorySpanSink;
use fnb_core::trace::TraceContext;
use fnb_router::BackpressurePolicy;
use fnb_server::{build_router, AppConfig, AppState, Server};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

fn quiet_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.seed = Some(2024);
    config.router.latency_scale = 0.0;
    config.loadgen.enabled = false;
    config.backends.fraud.forced_score = Some(20.0);
    config.backends.screening.hit_rate = 0.0;
    config.backends.screening.pep_rate = 0.0;
    config.backends.screening.adverse_media_rate = 0.0;
    config.backends.notification.sms_failure_rate = 0.0;
    config.backends.notification.email_failure_rate = 0.0;
    config
}

fn state_with(config: AppConfig) -> (AppState, Arc<MemorySpanSink>) {
    let sink = Arc::new(MemorySpanSink::new());
    let state = AppState::with_sink(Arc::new(config), sink.clone()).unwrap();
    (state, sink)
}

fn wire_body() -> String {
    json!({
        "sourceAccount": "ACC00000007",
        "destinationAccount": "ACC00000042",
        "amount": 12500.0,
        "currency": "USD",
        "destinationCountry": "GB",
        "purpose": "Invoice settlement"
    })
    .to_string()
}

fn post(uri: &str) -> axum::http::request::Builder {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
}

async fn json_body(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn wire_transfer_completes_and_propagates_the_callers_trace() {
    let (state, sink) = state_with(quiet_config());
    let app = build_router(state);
    let caller = TraceContext::new_root();

    let response = app
        .oneshot(
            post("/payments/wire")
                .header("b3", caller.to_header())
                .body(Body::from(wire_body()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let echoed = TraceContext::parse_header(response.headers()["b3"].to_str().unwrap()).unwrap();
    assert_eq!(echoed.trace_id(), caller.trace_id());
    assert_ne!(echoed.span_id(), caller.span_id());

    let body = json_body(response).await;
    assert_eq!(body["outcome"], "COMPLETED");
    assert_eq!(body["traceId"], caller.trace_id().to_string());
    let steps: Vec<&str> = body["calls"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["step"].as_str().unwrap())
        .collect();
    assert_eq!(
        steps,
        ["fraud-check", "aml-screening", "ledger-debit", "notification"]
    );

    let spans = sink.by_trace(caller.trace_id());
    assert_eq!(spans.len(), body["spanCount"].as_u64().unwrap() as usize);
    assert!(spans.iter().any(|s| s.name == "mule:flow/payment-processing-flow"));
}

#[tokio::test]
async fn traceparent_is_honoured() {
    let (state, _) = state_with(quiet_config());
    let caller = TraceContext::new_root();

    let response = build_router(state)
        .oneshot(
            Request::builder()
                .uri("/customers/CUST000003/360")
                .header("traceparent", caller.to_traceparent())
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["traceId"], caller.trace_id().to_string());
}

#[tokio::test]
async fn high_fraud_score_is_a_422_without_ledger_debit() {
    let mut config = quiet_config();
    config.backends.fraud.forced_score = Some(99.0);
    let (state, _) = state_with(config);

    let response = build_router(state.clone())
        .oneshot(
            post("/payments/wire")
                .body(Body::from(wire_body()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = json_body(response).await;
    assert_eq!(body["outcome"], "REJECTED");
    assert_eq!(body["reason"], "fraud-check rejected the transaction");
    assert!(body["skipped"]
        .as_array()
        .unwrap()
        .iter()
        .any(|s| s == "ledger-debit"));
    assert_eq!(state.router.counters().rejected, 1);
}

#[tokio::test]
async fn unavailable_ledger_is_a_502() {
    let mut config = quiet_config();
    config.backends.ledger.unavailable_rate = 1.0;
    let (state, _) = state_with(config);

    let response = build_router(state)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/reconciliation/trigger")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body = json_body(response).await;
    assert_eq!(body["outcome"], "FAILED");
    assert_eq!(body["reason"], "trade-positions failed: unavailable");
}

#[tokio::test]
async fn retries_with_the_same_correlation_id_are_idempotent() {
    let (state, _) = state_with(quiet_config());
    let app = build_router(state.clone());

    let mut bodies = Vec::new();
    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(
                post("/payments/ach")
                    .header("x-correlation-id", "teller-retry-1")
                    .body(Body::from(wire_body()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.headers()["x-correlation-id"], "teller-retry-1");
        let echoed =
            TraceContext::parse_header(response.headers()["b3"].to_str().unwrap()).unwrap();
        let body = json_body(response).await;
        // A replay echoes the trace its body reports.
        assert_eq!(body["traceId"], echoed.trace_id().to_string());
        bodies.push(body);
    }

    assert_eq!(bodies[0], bodies[1]);
    let counters = state.router.counters();
    assert_eq!(counters.completed, 1);
    assert_eq!(counters.cache_hits, 1);
    let fraud_calls = state.router.backends().snapshot().backends[&fnb_backends::Backend::Fraud].calls;
    assert_eq!(fraud_calls, 1);
}

#[tokio::test]
async fn drop_policy_refuses_with_503_at_capacity() {
    let mut config = quiet_config();
    config.router.max_in_flight = 1;
    config.router.backpressure = BackpressurePolicy::Drop;
    let (state, _) = state_with(config);
    let held = state.router.try_admit().unwrap();

    let response = build_router(state.clone())
        .oneshot(
            Request::builder()
                .uri("/reconciliation/status")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json_body(response).await["error"], "overloaded");

    drop(held);
    let response = build_router(state)
        .oneshot(
            Request::builder()
                .uri("/reconciliation/status")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn admin_reset_cancels_in_flight_transactions() {
    let mut config = quiet_config();
    // Real waiting so the flow is still running when the reset lands.
    config.router.latency_scale = 1.0;
    let (state, _) = state_with(config);
    let app = build_router(state.clone());

    let running = tokio::spawn(app.clone().oneshot(
        Request::builder()
            .method("POST")
            .uri("/reconciliation/trigger")
            .body(Body::empty())
            .unwrap(),
    ));
    while state.router.in_flight() == 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let reset = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/admin/reset")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(json_body(reset).await["cancelled"], 1);

    let response = running.await.unwrap().unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(json_body(response).await["reason"], "cancelled");
    assert_eq!(state.router.counters().cancelled, 1);
}

#[tokio::test]
async fn live_server_serves_flows_and_stats() {
    let server = Server::from_state(state_with(quiet_config()).0);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(server.run_with_listener(listener, shutdown.clone()));

    let client = reqwest::Client::new();
    let response = client
        .post(format!("http://{addr}/accounts/open"))
        .json(&json!({
            "firstName": "Grace",
            "lastName": "Mokoena",
            "dateOfBirth": "1979-11-02",
            "accountType": "CHECKING",
            "initialDeposit": 250.0,
            "branchCode": "BR-003"
        }))
        .send()
        .await
        .unwrap();
    assert!(response.headers().contains_key("b3"));
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["flowName"], "account-opening-kyc-flow");

    let stats: Value = client
        .get(format!("http://{addr}/stats"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let router = &stats["router"];
    let finished = router["completed"].as_u64().unwrap()
        + router["rejected"].as_u64().unwrap()
        + router["failed"].as_u64().unwrap();
    assert_eq!(finished, 1);

    shutdown.cancel();
    handle.await.unwrap().unwrap();
}
