//! `arcade journal verify|pending`.

use anyhow::{bail, Context, Result};
use arc_journal::{recover, verify_hash_chain, VerifyResult};

use super::{history_line, wager_line};

pub fn verify(path: &str) -> Result<()> {
    match verify_hash_chain(path).with_context(|| format!("read journal failed: {path}"))? {
        VerifyResult::Valid { lines } => {
            println!("chain_valid=true lines={lines} path={path}");
            Ok(())
        }
        VerifyResult::Broken { line, reason } => {
            println!("chain_valid=false line={line} path={path}");
            bail!("JOURNAL_CHAIN_BROKEN path={path} line={line}: {reason}")
        }
    }
}

pub fn pending(path: &str) -> Result<()> {
    let rec = recover(path).with_context(|| format!("read journal failed: {path}"))?;
    println!("records={}", rec.records);
    match &rec.pending {
        Some(w) => println!("pending {}", wager_line(w)),
        None => println!("pending=none"),
    }
    for w in &rec.abandoned {
        println!("abandoned {}", wager_line(w));
    }
    println!("history_len={}", rec.history.len());
    for e in rec.history.iter().rev() {
        println!("{}", history_line(e));
    }
    Ok(())
}
