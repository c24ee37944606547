//! Bounded, newest-first outcome logs, one per game kind.

use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use arc_schemas::{GameKind, Outcome, TxHash, WagerParams, Wei};

use crate::wager::{Wager, WagerStatus};

/// Immutable snapshot of a resolved wager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub wager_id: Uuid,
    pub tx: TxHash,
    pub kind: GameKind,
    pub params: WagerParams,
    #[serde(with = "arc_schemas::units::wei_serde")]
    pub stake: Wei,
    pub outcome: Outcome,
    pub resolved_at_ms: i64,
}

impl HistoryEntry {
    /// Snapshot a resolved wager. `None` unless the wager is `Resolved`.
    pub fn from_resolved(wager: &Wager, resolved_at_ms: i64) -> Option<Self> {
        if wager.status != WagerStatus::Resolved {
            return None;
        }
        Some(Self {
            wager_id: wager.wager_id,
            tx: wager.tx.clone()?,
            kind: wager.kind,
            params: wager.params.clone(),
            stake: wager.stake,
            outcome: wager.outcome.clone()?,
            resolved_at_ms,
        })
    }

    pub fn result_label(&self) -> &'static str {
        if self.kind.is_pooled() {
            "entered"
        } else if self.outcome.won {
            "win"
        } else {
            "lose"
        }
    }
}

#[derive(Debug, Clone)]
pub struct HistoryLedger {
    capacity: usize,
    entries: VecDeque<HistoryEntry>,
}

impl HistoryLedger {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: VecDeque::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Prepend `entry`, evicting the oldest past capacity.
    ///
    /// Returns `false` (and changes nothing) when an entry for the same
    /// transaction is already retained.
    pub fn append(&mut self, entry: HistoryEntry) -> bool {
        if self.entries.iter().any(|e| e.tx == entry.tx) {
            return false;
        }
        self.entries.push_front(entry);
        self.entries.truncate(self.capacity);
        true
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn latest(&self) -> Option<&HistoryEntry> {
        self.entries.front()
    }

    /// Newest first.
    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    pub fn to_vec(&self) -> Vec<HistoryEntry> {
        self.entries.iter().cloned().collect()
    }
}

/// Per-kind history capacities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryCapacities {
    pub dice: usize,
    pub flip: usize,
    pub slots: usize,
    pub race: usize,
    pub jackpot: usize,
}

impl Default for HistoryCapacities {
    fn default() -> Self {
        Self {
            dice: 5,
            flip: 4,
            slots: 4,
            race: 3,
            jackpot: 5,
        }
    }
}

impl HistoryCapacities {
    pub fn for_kind(&self, kind: GameKind) -> usize {
        match kind {
            GameKind::Dice => self.dice,
            GameKind::Flip => self.flip,
            GameKind::Slots => self.slots,
            GameKind::Race => self.race,
            GameKind::Jackpot => self.jackpot,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HistoryBook {
    ledgers: BTreeMap<GameKind, HistoryLedger>,
}

impl Default for HistoryBook {
    fn default() -> Self {
        Self::new(HistoryCapacities::default())
    }
}

impl HistoryBook {
    pub fn new(caps: HistoryCapacities) -> Self {
        let ledgers = GameKind::ALL
            .iter()
            .map(|k| (*k, HistoryLedger::new(caps.for_kind(*k))))
            .collect();
        Self { ledgers }
    }

    pub fn ledger(&self, kind: GameKind) -> Option<&HistoryLedger> {
        self.ledgers.get(&kind)
    }

    pub fn append(&mut self, entry: HistoryEntry) -> bool {
        match self.ledgers.get_mut(&entry.kind) {
            Some(l) => l.append(entry),
            None => false,
        }
    }

    pub fn clear(&mut self, kind: GameKind) {
        if let Some(l) = self.ledgers.get_mut(&kind) {
            l.clear();
        }
    }

    pub fn clear_all(&mut self) {
        self.ledgers.values_mut().for_each(HistoryLedger::clear);
    }

    pub fn entries(&self, kind: GameKind) -> Vec<HistoryEntry> {
        self.ledger(kind).map(HistoryLedger::to_vec).unwrap_or_default()
    }

    pub fn snapshot(&self) -> BTreeMap<GameKind, Vec<HistoryEntry>> {
        self.ledgers.iter().map(|(k, l)| (*k, l.to_vec())).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arc_schemas::{CoinFace, LedgerDetail};

    fn flip_entry(tx: &str) -> HistoryEntry {
        HistoryEntry {
            wager_id: Uuid::new_v4(),
            tx: TxHash::new(tx),
            kind: GameKind::Flip,
            params: WagerParams::Flip { face: CoinFace::Heads },
            stake: 10,
            outcome: Outcome {
                won: true,
                payout: 20,
                detail: LedgerDetail::Flip { face: CoinFace::Heads },
            },
            resolved_at_ms: 0,
        }
    }

    #[test]
    fn newest_first_with_eviction() {
        let mut l = HistoryLedger::new(3);
        for tx in ["0x1", "0x2", "0x3", "0x4"] {
            assert!(l.append(flip_entry(tx)));
        }
        let txs: Vec<_> = l.iter().map(|e| e.tx.as_str().to_string()).collect();
        assert_eq!(txs, vec!["0x4", "0x3", "0x2"]);
    }

    #[test]
    fn same_tx_is_refused() {
        let mut l = HistoryLedger::new(4);
        assert!(l.append(flip_entry("0x1")));
        assert!(!l.append(flip_entry("0x1")));
        assert_eq!(l.len(), 1);
    }

    #[test]
    fn book_uses_per_kind_capacity() {
        let mut book = HistoryBook::default();
        for i in 0..10 {
            book.append(flip_entry(&format!("0x{i}")));
        }
        assert_eq!(book.entries(GameKind::Flip).len(), 4);
        assert_eq!(book.ledger(GameKind::Race).map(|l| l.capacity()), Some(3));
        assert!(book.entries(GameKind::Dice).is_empty());

        book.clear(GameKind::Flip);
        assert!(book.entries(GameKind::Flip).is_empty());
    }
}
