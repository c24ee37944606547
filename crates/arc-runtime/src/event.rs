//! Events published on the engine bus and surfaced over SSE.

use serde::{Deserialize, Serialize};

use arc_round::RoundSnapshot;
use arc_session::{HistoryEntry, Wager, WagerStatus};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    Wager {
        from: WagerStatus,
        to: WagerStatus,
        wager: Wager,
    },
    History {
        entry: HistoryEntry,
    },
    Round {
        round: RoundSnapshot,
    },
    Tick {
        round_id: u64,
        remaining_ms: i64,
        closed_now: bool,
    },
    Log {
        level: String,
        msg: String,
    },
}

impl EngineEvent {
    /// SSE event name.
    pub fn name(&self) -> &'static str {
        match self {
            EngineEvent::Wager { .. } => "wager",
            EngineEvent::History { .. } => "history",
            EngineEvent::Round { .. } => "round",
            EngineEvent::Tick { .. } => "tick",
            EngineEvent::Log { .. } => "log",
        }
    }

    pub fn log(level: &str, msg: impl Into<String>) -> Self {
        EngineEvent::Log {
            level: level.to_string(),
            msg: msg.into(),
        }
    }
}
