//! Append-only wager journal. JSON Lines, one record per line, with an
//! optional hash chain (`hash_prev` + `hash_self`).
//!
//! Every wager transition and history change is appended as it happens, so
//! a restarted process can tell which wager was still waiting on the ledger
//! (see [`recover`]).

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use arc_schemas::{Address, GameKind};
use arc_session::{HistoryEntry, Wager, WagerStatus};

/// Namespace for deterministic record ids.
const RECORD_ID_NAMESPACE: Uuid = Uuid::from_u128(0x6a2f_41c3_9d0e_4b57_8e11_c0de_a7ca_de01);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JournalEvent {
    SessionStarted {
        identity: Option<Address>,
        config_hash: Option<String>,
    },
    WagerTransition {
        from: WagerStatus,
        to: WagerStatus,
        wager: Wager,
    },
    HistoryAppended {
        entry: HistoryEntry,
    },
    /// `kind == None` clears every kind.
    HistoryCleared {
        kind: Option<GameKind>,
    },
}

impl JournalEvent {
    pub fn name(&self) -> &'static str {
        match self {
            JournalEvent::SessionStarted { .. } => "session_started",
            JournalEvent::WagerTransition { .. } => "wager_transition",
            JournalEvent::HistoryAppended { .. } => "history_appended",
            JournalEvent::HistoryCleared { .. } => "history_cleared",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalRecord {
    pub seq: u64,
    pub record_id: Uuid,
    pub session_id: Uuid,
    pub ts_utc: DateTime<Utc>,
    pub body: JournalEvent,
    pub hash_prev: Option<String>,
    pub hash_self: Option<String>,
}

pub struct JournalWriter {
    path: PathBuf,
    hash_chain: bool,
    session_id: Uuid,
    last_hash: Option<String>,
    /// Number of records in the file; the next record's `seq`.
    seq: u64,
}

impl JournalWriter {
    /// Open (or create) a journal and resume its chain from the last record.
    pub fn open(path: impl AsRef<Path>, hash_chain: bool, session_id: Uuid) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).with_context(|| format!("create_dir_all {:?}", parent))?;
        }

        let (seq, last_hash) = if path.exists() {
            let records = read_records(&path)?;
            let last_hash = records.last().and_then(|r| r.hash_self.clone());
            (records.len() as u64, last_hash)
        } else {
            (0, None)
        };

        Ok(Self {
            path,
            hash_chain,
            session_id,
            last_hash,
            seq,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn last_hash(&self) -> Option<String> {
        self.last_hash.clone()
    }

    pub fn append(&mut self, body: JournalEvent) -> Result<JournalRecord> {
        let body_json = serde_json::to_value(&body).context("serialize journal body failed")?;
        let record_id = derive_record_id(self.last_hash.as_deref(), &body_json, self.seq)?;

        let mut rec = JournalRecord {
            seq: self.seq,
            record_id,
            session_id: self.session_id,
            ts_utc: Utc::now(),
            body,
            hash_prev: None,
            hash_self: None,
        };

        if self.hash_chain {
            rec.hash_prev = self.last_hash.clone();
            let self_hash = compute_record_hash(&rec)?;
            rec.hash_self = Some(self_hash.clone());
            self.last_hash = Some(self_hash);
        }

        let line = canonical_json_line(&rec)?;
        append_line(&self.path, &line)?;
        self.seq += 1;
        Ok(rec)
    }
}

/// Deterministic id from chain position and content: same inputs, same id.
fn derive_record_id(last_hash: Option<&str>, body: &Value, seq: u64) -> Result<Uuid> {
    let material = format!(
        "{}|{}|{}",
        last_hash.unwrap_or("genesis"),
        seq,
        canonical_json_line(body)?
    );
    Ok(Uuid::new_v5(&RECORD_ID_NAMESPACE, material.as_bytes()))
}

fn append_line(path: &Path, line: &str) -> Result<()> {
    let mut f = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open journal {:?}", path))?;
    f.write_all(line.as_bytes())
        .context("write journal line failed")?;
    f.write_all(b"\n").context("write newline failed")?;
    Ok(())
}

/// Sort keys recursively and emit compact JSON.
fn canonical_json_line<T: Serialize>(v: &T) -> Result<String> {
    let raw = serde_json::to_value(v).context("serialize journal record failed")?;
    serde_json::to_string(&sort_keys(&raw)).context("json stringify failed")
}

fn sort_keys(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut keys: Vec<_> = map.keys().cloned().collect();
            keys.sort();
            let mut new = serde_json::Map::new();
            for k in keys {
                new.insert(k.clone(), sort_keys(&map[&k]));
            }
            Value::Object(new)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_keys).collect()),
        _ => v.clone(),
    }
}

/// Hash of the canonical record without `hash_self`.
pub fn compute_record_hash(rec: &JournalRecord) -> Result<String> {
    let mut clone = rec.clone();
    clone.hash_self = None;
    let canonical = canonical_json_line(&clone)?;
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

pub fn read_records(path: impl AsRef<Path>) -> Result<Vec<JournalRecord>> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("read journal {:?}", path.as_ref()))?;
    parse_records(&content)
}

pub fn parse_records(content: &str) -> Result<Vec<JournalRecord>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, l)| !l.trim().is_empty())
        .map(|(i, l)| {
            serde_json::from_str(l.trim())
                .with_context(|| format!("parse journal record at line {}", i + 1))
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyResult {
    Valid { lines: usize },
    Broken { line: usize, reason: String },
}

pub fn verify_hash_chain(path: impl AsRef<Path>) -> Result<VerifyResult> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("read journal {:?}", path.as_ref()))?;
    verify_hash_chain_str(&content)
}

pub fn verify_hash_chain_str(content: &str) -> Result<VerifyResult> {
    let mut prev_hash: Option<String> = None;
    let mut line_count = 0usize;

    for (i, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let rec: JournalRecord = serde_json::from_str(trimmed)
            .with_context(|| format!("parse journal record at line {}", i + 1))?;
        line_count += 1;

        if rec.hash_prev != prev_hash {
            return Ok(VerifyResult::Broken {
                line: i + 1,
                reason: format!(
                    "hash_prev mismatch: expected {:?}, got {:?}",
                    prev_hash, rec.hash_prev
                ),
            });
        }
        if let Some(ref claimed) = rec.hash_self {
            let recomputed = compute_record_hash(&rec)?;
            if *claimed != recomputed {
                return Ok(VerifyResult::Broken {
                    line: i + 1,
                    reason: format!("hash_self mismatch: claimed {claimed}, recomputed {recomputed}"),
                });
            }
        }
        prev_hash = rec.hash_self.clone();
    }

    Ok(VerifyResult::Valid { lines: line_count })
}

// ---------------------------------------------------------------------------
// Recovery
// ---------------------------------------------------------------------------

/// State reconstructed from a journal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Recovered {
    /// Wager still waiting on the ledger when the journal ends, if any.
    pub pending: Option<Wager>,
    /// Wagers whose last record is non-terminal but which cannot be resumed
    /// (no transaction id yet, or superseded by a later wager).
    pub abandoned: Vec<Wager>,
    /// Retained history, oldest first, ready to be replayed in order.
    pub history: Vec<HistoryEntry>,
    pub records: usize,
}

pub fn recover(path: impl AsRef<Path>) -> Result<Recovered> {
    if !path.as_ref().exists() {
        return Ok(Recovered::default());
    }
    Ok(recover_from_records(&read_records(path)?))
}

pub fn recover_from_records(records: &[JournalRecord]) -> Recovered {
    let mut latest: BTreeMap<Uuid, (u64, Wager)> = BTreeMap::new();
    let mut history: Vec<HistoryEntry> = Vec::new();

    for rec in records {
        match &rec.body {
            JournalEvent::WagerTransition { wager, .. } => {
                latest.insert(wager.wager_id, (rec.seq, wager.clone()));
            }
            JournalEvent::HistoryAppended { entry } => {
                if !history.iter().any(|e| e.tx == entry.tx) {
                    history.push(entry.clone());
                }
            }
            JournalEvent::HistoryCleared { kind } => match kind {
                Some(k) => history.retain(|e| e.kind != *k),
                None => history.clear(),
            },
            JournalEvent::SessionStarted { .. } => {}
        }
    }

    let mut open: Vec<(u64, Wager)> = latest
        .into_values()
        .filter(|(_, w)| !w.status.is_terminal())
        .collect();
    open.sort_by_key(|(seq, _)| *seq);

    let mut pending = None;
    if let Some((_, w)) = open.pop() {
        let resumable = w.tx.is_some()
            && matches!(
                w.status,
                WagerStatus::AwaitingConfirmation | WagerStatus::AwaitingResolution
            );
        if resumable {
            pending = Some(w);
        } else {
            open.push((0, w));
        }
    }

    Recovered {
        pending,
        abandoned: open.into_iter().map(|(_, w)| w).collect(),
        history,
        records: records.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arc_schemas::{CoinFace, TxHash, WagerParams};

    fn wager(status: WagerStatus, tx: Option<&str>) -> Wager {
        let mut w = Wager::new(WagerParams::Flip { face: CoinFace::Heads }, 10, None, 0);
        w.status = status;
        w.tx = tx.map(TxHash::new);
        w
    }

    #[test]
    fn record_ids_are_deterministic() {
        let body = serde_json::json!({"event": "history_cleared", "kind": null});
        let a = derive_record_id(Some("abc"), &body, 3).unwrap();
        let b = derive_record_id(Some("abc"), &body, 3).unwrap();
        let c = derive_record_id(Some("abc"), &body, 4).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn recovery_picks_waiting_wager() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("j.jsonl");
        let mut j = JournalWriter::open(&path, true, Uuid::new_v4()).unwrap();

        let mut w = wager(WagerStatus::Submitting, None);
        j.append(JournalEvent::WagerTransition {
            from: WagerStatus::Idle,
            to: WagerStatus::Submitting,
            wager: w.clone(),
        })
        .unwrap();
        w.status = WagerStatus::AwaitingResolution;
        w.tx = Some(TxHash::new("0xaa"));
        j.append(JournalEvent::WagerTransition {
            from: WagerStatus::AwaitingConfirmation,
            to: WagerStatus::AwaitingResolution,
            wager: w.clone(),
        })
        .unwrap();

        let r = recover(&path).unwrap();
        assert_eq!(r.records, 2);
        assert_eq!(r.pending.map(|p| p.wager_id), Some(w.wager_id));
        assert!(r.abandoned.is_empty());
    }

    #[test]
    fn submitting_wager_is_abandoned_not_resumed() {
        let w = wager(WagerStatus::Submitting, None);
        let rec = JournalRecord {
            seq: 0,
            record_id: Uuid::nil(),
            session_id: Uuid::nil(),
            ts_utc: Utc::now(),
            body: JournalEvent::WagerTransition {
                from: WagerStatus::Idle,
                to: WagerStatus::Submitting,
                wager: w.clone(),
            },
            hash_prev: None,
            hash_self: None,
        };
        let r = recover_from_records(&[rec]);
        assert_eq!(r.pending, None);
        assert_eq!(r.abandoned, vec![w]);
    }

    #[test]
    fn missing_journal_recovers_empty() {
        let dir = tempfile::tempdir().unwrap();
        let r = recover(dir.path().join("absent.jsonl")).unwrap();
        assert_eq!(r, Recovered::default());
    }

    #[test]
    fn reopen_resumes_chain() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("j.jsonl");
        {
            let mut j = JournalWriter::open(&path, true, Uuid::new_v4()).unwrap();
            j.append(JournalEvent::HistoryCleared { kind: None }).unwrap();
        }
        let mut j = JournalWriter::open(&path, true, Uuid::new_v4()).unwrap();
        assert_eq!(j.seq(), 1);
        let rec = j
            .append(JournalEvent::HistoryCleared {
                kind: Some(GameKind::Dice),
            })
            .unwrap();
        assert_eq!(rec.seq, 1);
        assert!(rec.hash_prev.is_some());
        assert_eq!(
            verify_hash_chain(&path).unwrap(),
            VerifyResult::Valid { lines: 2 }
        );
    }
}
