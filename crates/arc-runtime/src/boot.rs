//! Engine start-up from configuration: journal check, recovery, spawn.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio::task::JoinHandle;
use uuid::Uuid;

use arc_config::EngineConfig;
use arc_journal::{recover, verify_hash_chain, JournalWriter, VerifyResult};
use arc_ledger::LedgerClient;

use crate::actor::{EngineActor, EngineHandle, RuntimeOptions};
use crate::engine::Engine;

/// Build the engine for `cfg`, replay its journal (if configured) and start
/// the actor. A journal whose hash chain does not verify is refused.
pub fn start(
    cfg: &EngineConfig,
    ledger: Arc<dyn LedgerClient>,
    config_hash: Option<String>,
) -> Result<(EngineHandle, JoinHandle<()>)> {
    let mut engine = Engine::from_config(cfg);

    let journal = match cfg.journal.path.as_deref() {
        Some(path) => {
            if cfg.journal.hash_chain && Path::new(path).exists() {
                if let VerifyResult::Broken { line, reason } = verify_hash_chain(path)? {
                    bail!("JOURNAL_CHAIN_BROKEN path={path} line={line}: {reason}");
                }
            }
            let recovered = recover(path).with_context(|| format!("recover journal {path}"))?;
            let records = recovered.records;
            let resumed = recovered.pending.as_ref().map(|w| w.wager_id);
            let restored = engine.restore(recovered);
            tracing::info!(
                path,
                records,
                history = restored,
                resumed = ?resumed,
                "journal replayed"
            );
            Some(JournalWriter::open(path, cfg.journal.hash_chain, Uuid::new_v4())?)
        }
        None => None,
    };

    Ok(EngineActor::spawn(
        engine,
        ledger,
        journal,
        RuntimeOptions::from_config(cfg, config_hash),
    ))
}
