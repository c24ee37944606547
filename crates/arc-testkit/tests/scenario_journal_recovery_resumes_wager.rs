//! Scenario: a wager in flight at shutdown survives a restart.
//!
//! GREEN when:
//! - A wager that reached `AwaitingResolution` before shutdown is restored
//!   from the journal on restart, with previously recorded history.
//! - A result delivered (and redelivered) after restart resolves it exactly
//!   once.
//! - A wager still `AwaitingConfirmation` at shutdown is re-awaited on
//!   restart.
//! - The journal's hash chain stays intact across sessions.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use arc_journal::{recover, verify_hash_chain, JournalWriter, VerifyResult};
use arc_ledger::LedgerClient;
use arc_runtime::{Engine, EngineActor, EngineHandle, RuntimeOptions};
use arc_schemas::{parse_units, DiceDirection, GameKind, NoticeBatch, TxHash, WagerParams};
use arc_session::WagerStatus;
use arc_testkit::{dice_result, engine_config, wait_for, ScriptedLedger};
use tokio::task::JoinHandle;
use uuid::Uuid;

const WAIT: Duration = Duration::from_secs(2);

fn over_four() -> WagerParams {
    WagerParams::Dice {
        direction: DiceDirection::Over,
        target: 4,
    }
}

fn start(path: &Path, ledger: &ScriptedLedger) -> (EngineHandle, JoinHandle<()>) {
    let cfg = engine_config();
    let mut engine = Engine::from_config(&cfg);
    engine.restore(recover(path).unwrap());
    let journal = JournalWriter::open(path, true, Uuid::new_v4()).unwrap();
    let client: Arc<dyn LedgerClient> = Arc::new(ledger.clone());
    EngineActor::spawn(
        engine,
        client,
        Some(journal),
        RuntimeOptions::from_config(&cfg, Some("cfg-hash".to_string())),
    )
}

async fn status_is(handle: &EngineHandle, status: WagerStatus) -> anyhow::Result<TxHash> {
    let snap = wait_for(handle, WAIT, |s| {
        s.wager.as_ref().map(|w| w.status) == Some(status)
    })
    .await?;
    Ok(snap.wager.and_then(|w| w.tx).unwrap_or_else(|| TxHash::new("")))
}

#[tokio::test]
async fn awaiting_resolution_wager_resolves_once_after_restart() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("wagers.jsonl");
    let stake = parse_units("0.1")?;

    // --- first session: one resolved wager, one left awaiting its result ----
    let ledger = ScriptedLedger::new();
    ledger.set_balance(parse_units("1")?);
    let (handle, join) = start(&path, &ledger);
    assert!(ledger.wait_for_subscribers(5, WAIT).await);
    wait_for(&handle, WAIT, |s| s.balance.is_some()).await?;

    handle.place_wager(over_four(), stake).await?;
    let tx1 = status_is(&handle, WagerStatus::AwaitingResolution).await?;
    ledger.publish(NoticeBatch::Results(vec![dice_result(
        &tx1,
        DiceDirection::Over,
        4,
        6,
        stake,
    )]));
    wait_for(&handle, WAIT, |s| s.histories[&GameKind::Dice].len() == 1).await?;

    handle.place_wager(over_four(), stake).await?;
    let tx2 = status_is(&handle, WagerStatus::AwaitingResolution).await?;
    handle.shutdown().await;
    join.await?;

    // --- restart against a fresh ledger connection -------------------------
    let ledger = ScriptedLedger::new();
    ledger.set_balance(parse_units("1")?);
    let (handle, join) = start(&path, &ledger);
    assert!(ledger.wait_for_subscribers(5, WAIT).await);

    let snap = handle.snapshot();
    let restored = snap.wager.as_ref().unwrap();
    assert_eq!(restored.status, WagerStatus::AwaitingResolution);
    assert_eq!(restored.tx.as_ref(), Some(&tx2));
    assert_eq!(snap.histories[&GameKind::Dice].len(), 1);

    let result = dice_result(&tx2, DiceDirection::Over, 4, 2, stake);
    ledger.publish(NoticeBatch::Results(vec![result.clone()]));
    ledger.publish(NoticeBatch::Results(vec![result]));

    let snap = wait_for(&handle, WAIT, |s| s.diagnostics.redeliveries == 1).await?;
    assert_eq!(snap.wager.as_ref().map(|w| w.status), Some(WagerStatus::Resolved));
    let dice = &snap.histories[&GameKind::Dice];
    assert_eq!(dice.len(), 2);
    assert_eq!(dice[0].tx, tx2);
    assert!(!dice[0].outcome.won);
    // No new submission was made for the resumed wager.
    assert!(ledger.submissions().is_empty());

    handle.shutdown().await;
    join.await?;

    match verify_hash_chain(&path)? {
        VerifyResult::Valid { lines } => assert!(lines > 8),
        broken => panic!("journal chain broken: {broken:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn awaiting_confirmation_wager_is_re_awaited() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("wagers.jsonl");
    let stake = parse_units("0.1")?;

    let ledger = ScriptedLedger::new();
    ledger.set_balance(parse_units("1")?);
    ledger.manual_confirmations();
    let (handle, join) = start(&path, &ledger);
    wait_for(&handle, WAIT, |s| s.balance.is_some()).await?;
    handle.place_wager(over_four(), stake).await?;
    let tx = status_is(&handle, WagerStatus::AwaitingConfirmation).await?;
    handle.shutdown().await;
    join.await?;

    // Confirmations resolve immediately on the new connection.
    let ledger = ScriptedLedger::new();
    let (handle, join) = start(&path, &ledger);
    assert_eq!(status_is(&handle, WagerStatus::AwaitingResolution).await?, tx);

    handle.shutdown().await;
    join.await?;
    Ok(())
}
