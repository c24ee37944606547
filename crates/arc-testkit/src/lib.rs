//! Test doubles and builders shared by the scenario tests.

pub mod ledger;
pub mod notices;

pub use ledger::ScriptedLedger;
pub use notices::{contribution, dice_result, draw, me, reading, round_started};

use std::time::Duration;

use anyhow::{bail, Result};
use arc_config::EngineConfig;
use arc_runtime::{EngineHandle, EngineSnapshot};

/// Default config with the test identity and fast intervals.
pub fn engine_config() -> EngineConfig {
    let mut cfg = EngineConfig {
        identity: Some(me()),
        ..EngineConfig::default()
    };
    cfg.round.tick_ms = 20;
    cfg.round.poll_ms = 60_000;
    cfg
}

/// Wait until a published snapshot satisfies `pred`.
pub async fn wait_for<F>(
    handle: &EngineHandle,
    timeout: Duration,
    pred: F,
) -> Result<EngineSnapshot>
where
    F: Fn(&EngineSnapshot) -> bool,
{
    let mut rx = handle.subscribe_snapshots();
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        {
            let snap = rx.borrow_and_update();
            if pred(&snap) {
                return Ok(snap.clone());
            }
        }
        match tokio::time::timeout_at(deadline, rx.changed()).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => bail!("engine stopped while waiting"),
            Err(_) => bail!("timed out after {timeout:?} waiting for snapshot condition"),
        }
    }
}
