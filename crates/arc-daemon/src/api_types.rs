//! Request and response bodies for the daemon's HTTP endpoints.
//!
//! Amounts cross the wire as decimal strings in whole units (`"0.1"`).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use arc_round::RoundSnapshot;
use arc_schemas::{GameKind, WagerParams};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: &'static str,
    pub version: &'static str,
}

/// Body of every 4xx/5xx response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    /// Stable machine-readable code, e.g. `WAGER_IN_FLIGHT`.
    pub code: String,
}

/// `POST /v1/wager`.
///
/// `params` carries the kind-specific fields, e.g.
/// `{"direction": "over", "target": 7}` for dice; omit it for slots and
/// jackpot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceWagerRequest {
    pub kind: GameKind,
    #[serde(default)]
    pub params: Value,
    pub stake: String,
}

impl PlaceWagerRequest {
    pub fn wager_params(&self) -> Result<WagerParams, String> {
        let mut obj = match &self.params {
            Value::Null => serde_json::Map::new(),
            Value::Object(m) => m.clone(),
            other => return Err(format!("params must be an object, got {other}")),
        };
        obj.insert("kind".to_string(), Value::String(self.kind.as_str().to_string()));
        serde_json::from_value(Value::Object(obj)).map_err(|e| format!("bad params: {e}"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundResponse {
    #[serde(flatten)]
    pub round: RoundSnapshot,
    pub remaining_ms: Option<i64>,
    /// `HH:MM:SS`, absent until a round is held.
    pub countdown: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChanceResponse {
    pub amount: String,
    pub pool_total: String,
    pub win_chance_pct: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetResponse {
    pub ok: bool,
    /// Kind cleared, or `"all"`.
    pub kind: String,
}
