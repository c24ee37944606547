//! In-process scenario tests for arc-daemon HTTP endpoints.
//!
//! The router runs without binding a TCP socket: each test builds it over
//! an engine driven by a [`ScriptedLedger`] and calls it through
//! `tower::ServiceExt::oneshot`.
//!
//! GREEN when:
//! - A dice wager POSTed with string units is accepted with 202 in
//!   `submitting`, and once the ledger reports the roll it shows up under
//!   `/v1/history/dice`.
//! - A second placement while one is in flight is refused with 422
//!   `WAGER_IN_FLIGHT`; malformed stakes and params get their own codes.
//! - Unknown kinds are 404 `UNKNOWN_KIND`.
//! - `/v1/round/chance` reports the prospective chance for an amount.
//! - Engine events reach the SSE bus.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt; // oneshot

use arc_daemon::{routes, state};
use arc_ledger::LedgerClient;
use arc_runtime::{Engine, EngineActor, EngineHandle, RuntimeOptions};
use arc_schemas::{parse_units, DiceDirection, NoticeBatch};
use arc_session::WagerStatus;
use arc_testkit::{dice_result, engine_config, reading, wait_for, ScriptedLedger};

const WAIT: Duration = Duration::from_secs(3);

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct Harness {
    ledger: ScriptedLedger,
    engine: EngineHandle,
    state: Arc<state::AppState>,
}

impl Harness {
    async fn start(ledger: ScriptedLedger) -> anyhow::Result<Self> {
        ledger.set_balance(parse_units("5")?);
        let cfg = engine_config();
        let client: Arc<dyn LedgerClient> = Arc::new(ledger.clone());
        let (engine, _join) = EngineActor::spawn(
            Engine::from_config(&cfg),
            client,
            None,
            RuntimeOptions::from_config(&cfg, None),
        );
        assert!(ledger.wait_for_subscribers(5, WAIT).await);
        wait_for(&engine, WAIT, |s| s.balance.is_some()).await?;

        let state = Arc::new(state::AppState::new(engine.clone()));
        state::spawn_engine_relay(Arc::clone(&state));
        Ok(Self {
            ledger,
            engine,
            state,
        })
    }

    fn router(&self) -> axum::Router {
        routes::build_router(Arc::clone(&self.state))
    }
}

/// Drive the router with a single request and return (status, body_bytes).
async fn call(router: axum::Router, req: Request<Body>) -> (StatusCode, bytes::Bytes) {
    let resp = router.oneshot(req).await.expect("oneshot failed");
    let status = resp.status();
    let body = resp
        .into_body()
        .collect()
        .await
        .expect("body collect failed")
        .to_bytes();
    (status, body)
}

fn parse_json(b: bytes::Bytes) -> Value {
    serde_json::from_slice(&b).expect("body is not valid JSON")
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn over_seven(stake: &str) -> Value {
    json!({
        "kind": "dice",
        "params": { "direction": "over", "target": 7 },
        "stake": stake,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_reports_service() -> anyhow::Result<()> {
    let h = Harness::start(ScriptedLedger::new()).await?;
    let (status, body) = call(h.router(), get("/v1/health")).await;
    assert_eq!(status, StatusCode::OK);
    let j = parse_json(body);
    assert_eq!(j["ok"], true);
    assert_eq!(j["service"], "arc-daemon");
    Ok(())
}

#[tokio::test]
async fn dice_wager_accepted_then_lands_in_history() -> anyhow::Result<()> {
    let h = Harness::start(ScriptedLedger::new()).await?;

    let (status, body) = call(h.router(), post_json("/v1/wager", over_seven("0.1"))).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let j = parse_json(body);
    assert_eq!(j["status"], "submitting");
    assert_eq!(j["stake"], parse_units("0.1")?.to_string());

    let snap = wait_for(&h.engine, WAIT, |s| {
        s.wager.as_ref().map(|w| w.status) == Some(WagerStatus::AwaitingResolution)
    })
    .await?;
    let tx = snap
        .wager
        .and_then(|w| w.tx)
        .expect("confirmed wager has a tx");

    let stake = parse_units("0.1")?;
    h.ledger.publish(NoticeBatch::Results(vec![dice_result(
        &tx,
        DiceDirection::Over,
        7,
        9,
        stake,
    )]));
    wait_for(&h.engine, WAIT, |s| {
        s.wager.as_ref().map(|w| w.status) == Some(WagerStatus::Resolved)
    })
    .await?;

    let (status, body) = call(h.router(), get("/v1/history/dice")).await;
    assert_eq!(status, StatusCode::OK);
    let entries = parse_json(body);
    let entries = entries.as_array().expect("history is an array");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["outcome"]["won"], true);
    assert_eq!(
        entries[0]["outcome"]["payout"],
        parse_units("0.15")?.to_string()
    );

    let (_, body) = call(h.router(), get("/v1/history/flip")).await;
    assert_eq!(parse_json(body), json!([]));
    Ok(())
}

#[tokio::test]
async fn second_wager_in_flight_is_refused() -> anyhow::Result<()> {
    let ledger = ScriptedLedger::new();
    ledger.manual_confirmations();
    let h = Harness::start(ledger).await?;

    let (status, _) = call(h.router(), post_json("/v1/wager", over_seven("0.1"))).await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let (status, body) = call(h.router(), post_json("/v1/wager", over_seven("0.1"))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(parse_json(body)["code"], "WAGER_IN_FLIGHT");

    let (status, body) = call(h.router(), get("/v1/wager")).await;
    assert_eq!(status, StatusCode::OK);
    assert_ne!(parse_json(body), Value::Null);
    assert_eq!(h.ledger.submissions().len(), 1);
    Ok(())
}

#[tokio::test]
async fn malformed_placements_get_distinct_codes() -> anyhow::Result<()> {
    let h = Harness::start(ScriptedLedger::new()).await?;

    let (status, body) = call(h.router(), post_json("/v1/wager", over_seven("-1"))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(parse_json(body)["code"], "INVALID_STAKE");

    let (status, body) = call(h.router(), post_json("/v1/wager", over_seven("0"))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(parse_json(body)["code"], "NON_POSITIVE_STAKE");

    let missing_face = json!({ "kind": "flip", "params": {}, "stake": "0.1" });
    let (status, body) = call(h.router(), post_json("/v1/wager", missing_face)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(parse_json(body)["code"], "INVALID_REQUEST");

    let out_of_range = json!({
        "kind": "dice",
        "params": { "direction": "under", "target": 13 },
        "stake": "0.1",
    });
    let (status, body) = call(h.router(), post_json("/v1/wager", out_of_range)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(parse_json(body)["code"], "INVALID_PARAMETERS");

    assert!(h.ledger.submissions().is_empty());
    Ok(())
}

#[tokio::test]
async fn unknown_kind_is_404() -> anyhow::Result<()> {
    let h = Harness::start(ScriptedLedger::new()).await?;

    let (status, body) = call(h.router(), get("/v1/history/roulette")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(parse_json(body)["code"], "UNKNOWN_KIND");

    let req = Request::builder()
        .method("POST")
        .uri("/v1/session/reset/roulette")
        .body(Body::empty())
        .unwrap();
    let (status, _) = call(h.router(), req).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // The alias resolves to race.
    let (status, _) = call(h.router(), get("/v1/history/lightning")).await;
    assert_eq!(status, StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn reset_all_is_acknowledged() -> anyhow::Result<()> {
    let h = Harness::start(ScriptedLedger::new()).await?;
    let req = Request::builder()
        .method("POST")
        .uri("/v1/session/reset/all")
        .body(Body::empty())
        .unwrap();
    let (status, body) = call(h.router(), req).await;
    assert_eq!(status, StatusCode::OK);
    let j = parse_json(body);
    assert_eq!(j["ok"], true);
    assert_eq!(j["kind"], "all");
    Ok(())
}

#[tokio::test]
async fn round_view_and_prospective_chance() -> anyhow::Result<()> {
    let ledger = ScriptedLedger::new();
    let deadline = chrono::Utc::now().timestamp_millis() + 60_000;
    ledger.set_round(reading(1, parse_units("10")?, deadline, Some(0)));
    let h = Harness::start(ledger).await?;
    wait_for(&h.engine, WAIT, |s| s.round.round_id == Some(1)).await?;

    let (status, body) = call(h.router(), get("/v1/round")).await;
    assert_eq!(status, StatusCode::OK);
    let j = parse_json(body);
    assert_eq!(j["round_id"], 1);
    assert_eq!(j["pool_total"], parse_units("10")?.to_string());
    assert!(j["countdown"].as_str().is_some());

    let (status, body) = call(h.router(), get("/v1/round/chance?amount=10")).await;
    assert_eq!(status, StatusCode::OK);
    let j = parse_json(body);
    assert_eq!(j["win_chance_pct"], 50.0);
    assert_eq!(j["pool_total"], "10");

    let (status, body) = call(h.router(), get("/v1/round/chance?amount=ten")).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(parse_json(body)["code"], "INVALID_AMOUNT");
    Ok(())
}

#[tokio::test]
async fn engine_events_reach_the_sse_bus() -> anyhow::Result<()> {
    let h = Harness::start(ScriptedLedger::new()).await?;
    let mut bus = h.state.bus.subscribe();

    let (status, _) = call(h.router(), post_json("/v1/wager", over_seven("0.1"))).await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let got = tokio::time::timeout(WAIT, async {
        loop {
            match bus.recv().await {
                Ok(msg) if msg.event_name() == "wager" => return Some(msg),
                Ok(_) => continue,
                Err(_) => return None,
            }
        }
    })
    .await?;
    let msg = got.expect("bus closed before a wager event");
    let j = serde_json::to_value(&msg)?;
    assert_eq!(j["type"], "wager");
    assert_eq!(j["to"], "submitting");

    let resp = h.router().oneshot(get("/v1/stream")).await?;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok()),
        Some("text/event-stream")
    );
    Ok(())
}
