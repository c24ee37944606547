//! Axum router and all HTTP handlers for arc-daemon.
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! middleware layers. Scenario tests in `tests/` compose the bare router.

use std::{collections::HashMap, convert::Infallible, sync::Arc};

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures_util::{Stream, StreamExt};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::info;

use arc_runtime::PlaceError;
use arc_schemas::{format_units, parse_units, GameKind};

use crate::{
    api_types::{
        ChanceResponse, ErrorResponse, HealthResponse, PlaceWagerRequest, ResetResponse,
        RoundResponse,
    },
    state::{AppState, BusMsg},
};

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the complete application router wired to the given shared state.
///
/// Middleware layers (CORS, tracing) are **not** applied here.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/snapshot", get(snapshot))
        .route("/v1/wager", get(current_wager).post(place_wager))
        .route("/v1/history/:kind", get(history))
        .route("/v1/round", get(round))
        .route("/v1/round/chance", get(round_chance))
        .route("/v1/session/reset/:kind", post(reset))
        .route("/v1/stream", get(stream))
        .with_state(state)
}

fn error(status: StatusCode, code: &str, msg: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: msg.into(),
            code: code.to_string(),
        }),
    )
        .into_response()
}

fn parse_kind(raw: &str) -> Result<GameKind, Response> {
    raw.parse::<GameKind>()
        .map_err(|e| error(StatusCode::NOT_FOUND, "UNKNOWN_KIND", e))
}

// ---------------------------------------------------------------------------
// Read endpoints
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service,
            version: st.build.version,
        }),
    )
}

pub(crate) async fn snapshot(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    Json(st.engine.snapshot())
}

/// The in-flight (or last) wager, `null` before the first placement.
pub(crate) async fn current_wager(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    Json(st.engine.snapshot().wager)
}

pub(crate) async fn history(
    State(st): State<Arc<AppState>>,
    Path(kind): Path<String>,
) -> Response {
    let kind = match parse_kind(&kind) {
        Ok(k) => k,
        Err(resp) => return resp,
    };
    let entries = st
        .engine
        .snapshot()
        .histories
        .remove(&kind)
        .unwrap_or_default();
    Json(entries).into_response()
}

pub(crate) async fn round(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    let snap = st.engine.snapshot();
    Json(RoundResponse {
        countdown: snap.remaining_ms.map(arc_round::format_countdown),
        remaining_ms: snap.remaining_ms,
        round: snap.round,
    })
}

/// `GET /v1/round/chance?amount=0.5` - chance after a hypothetical entry.
pub(crate) async fn round_chance(
    State(st): State<Arc<AppState>>,
    Query(q): Query<HashMap<String, String>>,
) -> Response {
    let Some(raw) = q.get("amount") else {
        return error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "INVALID_AMOUNT",
            "missing amount",
        );
    };
    let amount = match parse_units(raw) {
        Ok(a) => a,
        Err(e) => return error(StatusCode::UNPROCESSABLE_ENTITY, "INVALID_AMOUNT", e.to_string()),
    };
    let round = st.engine.snapshot().round;
    Json(ChanceResponse {
        amount: format_units(amount),
        pool_total: format_units(round.pool_total),
        win_chance_pct: arc_round::prospective_win_chance_pct(amount, round.pool_total),
    })
    .into_response()
}

// ---------------------------------------------------------------------------
// Write endpoints
// ---------------------------------------------------------------------------

pub(crate) async fn place_wager(
    State(st): State<Arc<AppState>>,
    Json(req): Json<PlaceWagerRequest>,
) -> Response {
    let params = match req.wager_params() {
        Ok(p) => p,
        Err(e) => return error(StatusCode::UNPROCESSABLE_ENTITY, "INVALID_REQUEST", e),
    };
    let stake = match parse_units(&req.stake) {
        Ok(s) => s,
        Err(e) => return error(StatusCode::UNPROCESSABLE_ENTITY, "INVALID_STAKE", e.to_string()),
    };

    match st.engine.place_wager(params, stake).await {
        Ok(wager) => {
            info!(wager_id = %wager.wager_id, kind = wager.kind.as_str(), "wager accepted");
            (StatusCode::ACCEPTED, Json(wager)).into_response()
        }
        Err(PlaceError::Rejected(e)) => {
            error(StatusCode::UNPROCESSABLE_ENTITY, e.code(), e.to_string())
        }
        Err(PlaceError::Stopped) => error(
            StatusCode::SERVICE_UNAVAILABLE,
            "ENGINE_STOPPED",
            PlaceError::Stopped.to_string(),
        ),
    }
}

/// `POST /v1/session/reset/:kind`, where `all` clears every kind.
pub(crate) async fn reset(State(st): State<Arc<AppState>>, Path(kind): Path<String>) -> Response {
    let target = if kind.eq_ignore_ascii_case("all") {
        None
    } else {
        match parse_kind(&kind) {
            Ok(k) => Some(k),
            Err(resp) => return resp,
        }
    };

    match st.engine.reset(target).await {
        Ok(()) => {
            let label = target.map_or("all", |k| k.as_str()).to_string();
            info!(kind = %label, "history reset");
            Json(ResetResponse { ok: true, kind: label }).into_response()
        }
        Err(e) => error(StatusCode::SERVICE_UNAVAILABLE, "ENGINE_STOPPED", e.to_string()),
    }
}

// ---------------------------------------------------------------------------
// SSE
// ---------------------------------------------------------------------------

pub(crate) async fn stream(State(st): State<Arc<AppState>>) -> Response {
    let rx = st.bus.subscribe();

    let mut headers = HeaderMap::new();
    headers.insert("Cache-Control", HeaderValue::from_static("no-cache"));
    headers.insert("Connection", HeaderValue::from_static("keep-alive"));

    let events = broadcast_to_sse(rx);

    (headers, Sse::new(events).keep_alive(KeepAlive::new())).into_response()
}

fn broadcast_to_sse(
    rx: broadcast::Receiver<BusMsg>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    BroadcastStream::new(rx).filter_map(|msg| async move {
        match msg {
            Ok(m) => {
                let data = serde_json::to_string(&m).ok()?;
                Some(Ok(Event::default().event(m.event_name()).data(data)))
            }
            Err(_) => None, // lagged / closed
        }
    })
}
