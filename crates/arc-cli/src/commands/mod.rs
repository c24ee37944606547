//! Command handlers for arcade.
//!
//! Shared helpers used by more than one command live here.

pub mod journal;
pub mod play;

use arc_schemas::format_units;
use arc_session::{HistoryEntry, Wager};

/// One-line `key=value` rendering of a wager.
pub fn wager_line(w: &Wager) -> String {
    let mut line = format!(
        "wager_id={} kind={} status={} stake={}",
        w.wager_id,
        w.kind,
        w.status.as_str(),
        format_units(w.stake)
    );
    if let Some(tx) = &w.tx {
        line.push_str(&format!(" tx={tx}"));
    }
    if let Some(round_id) = w.round_id {
        line.push_str(&format!(" round_id={round_id}"));
    }
    if let Some(err) = &w.error {
        line.push_str(&format!(" error={err:?}"));
    }
    line
}

pub fn history_line(e: &HistoryEntry) -> String {
    format!(
        "history kind={} tx={} stake={} result={} payout={} detail={}",
        e.kind,
        e.tx,
        format_units(e.stake),
        e.result_label(),
        format_units(e.outcome.payout),
        serde_json::to_string(&e.outcome.detail).unwrap_or_default()
    )
}
