//! Shared runtime state for arc-daemon.
//!
//! Handlers receive `State<Arc<AppState>>` from Axum. The engine lives
//! behind its [`EngineHandle`]; this module only relays its events onto the
//! SSE bus.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use arc_runtime::{EngineEvent, EngineHandle};

/// Messages broadcast over the internal bus and surfaced as SSE events.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BusMsg {
    Heartbeat { ts_millis: i64 },
    Engine(EngineEvent),
}

impl BusMsg {
    pub fn event_name(&self) -> &'static str {
        match self {
            BusMsg::Heartbeat { .. } => "heartbeat",
            BusMsg::Engine(ev) => ev.name(),
        }
    }
}

/// Static build metadata included in health responses.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

#[derive(Clone)]
pub struct AppState {
    /// Broadcast bus for SSE.
    pub bus: broadcast::Sender<BusMsg>,
    pub build: BuildInfo,
    pub engine: EngineHandle,
}

impl AppState {
    pub fn new(engine: EngineHandle) -> Self {
        let (bus, _rx) = broadcast::channel::<BusMsg>(1024);
        Self {
            bus,
            build: BuildInfo {
                service: "arc-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
            engine,
        }
    }
}

/// Spawn a background task that emits a heartbeat SSE every `interval`.
pub fn spawn_heartbeat(bus: broadcast::Sender<BusMsg>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let ts = chrono::Utc::now().timestamp_millis();
            let _ = bus.send(BusMsg::Heartbeat { ts_millis: ts });
        }
    });
}

/// Forward engine events onto the SSE bus until the engine stops.
pub fn spawn_engine_relay(state: Arc<AppState>) {
    let mut rx = state.engine.subscribe_events();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(ev) => {
                    let _ = state.bus.send(BusMsg::Engine(ev));
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "sse relay lagged behind engine events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}
