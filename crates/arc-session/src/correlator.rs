//! Matches ledger result notifications to the single tracked transaction.
//!
//! The correlator is the only place a notification is attributed to a wager.
//! It never inspects payload contents beyond `tx` and `player`; the wager
//! state machine decides what a match means.

use std::collections::VecDeque;

use arc_schemas::{Address, ContributionNotice, LedgerDetail, ResultNotice, TxHash};

use crate::wager::Wager;

/// Resolved transaction ids remembered for redelivery detection.
pub const DEFAULT_RESOLVED_MEMORY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Correlation {
    /// The tracked transaction appeared; the last matching entry wins.
    Match(ResultNotice),
    /// Nothing in the batch concerns the tracked transaction.
    Miss,
    /// The batch only re-delivers results for transactions already resolved.
    Redelivery,
}

#[derive(Debug, Clone)]
pub struct EventCorrelator {
    identity: Option<Address>,
    tracked: Option<TxHash>,
    resolved: VecDeque<TxHash>,
    memory: usize,
}

impl EventCorrelator {
    pub fn new(identity: Option<Address>) -> Self {
        Self::with_memory(identity, DEFAULT_RESOLVED_MEMORY)
    }

    pub fn with_memory(identity: Option<Address>, memory: usize) -> Self {
        Self {
            identity,
            tracked: None,
            resolved: VecDeque::new(),
            memory: memory.max(1),
        }
    }

    pub fn identity(&self) -> Option<&Address> {
        self.identity.as_ref()
    }

    pub fn tracked(&self) -> Option<&TxHash> {
        self.tracked.as_ref()
    }

    /// Start watching for `tx`. Replaces any previously tracked id.
    pub fn track(&mut self, tx: TxHash) {
        self.tracked = Some(tx);
    }

    pub fn untrack(&mut self) {
        self.tracked = None;
    }

    /// Stop tracking `tx` and remember it so redeliveries are recognised.
    pub fn mark_resolved(&mut self, tx: &TxHash) {
        if self.tracked.as_ref() == Some(tx) {
            self.tracked = None;
        }
        if self.resolved.contains(tx) {
            return;
        }
        self.resolved.push_front(tx.clone());
        self.resolved.truncate(self.memory);
    }

    pub fn was_resolved(&self, tx: &TxHash) -> bool {
        self.resolved.contains(tx)
    }

    fn belongs_to_identity(&self, player: Option<&Address>) -> bool {
        match (player, self.identity.as_ref()) {
            (Some(p), Some(me)) => p == me,
            _ => true,
        }
    }

    /// Correlate one ordered batch against the tracked transaction.
    pub fn correlate(&self, batch: &[ResultNotice]) -> Correlation {
        if let Some(tracked) = &self.tracked {
            let hit = batch
                .iter()
                .rev()
                .filter(|n| self.belongs_to_identity(n.player.as_ref()))
                .find(|n| &n.tx == tracked);
            if let Some(n) = hit {
                return Correlation::Match(n.clone());
            }
        }
        if !batch.is_empty() && batch.iter().all(|n| self.was_resolved(&n.tx)) {
            return Correlation::Redelivery;
        }
        Correlation::Miss
    }

    /// Correlate a batch of pooled contributions against `wager`.
    ///
    /// A contribution resolves the pooled wager when its `tx` matches. Events
    /// that omit `tx` fall back to content identity: same contributor, round
    /// and amount as the wager.
    pub fn correlate_contributions(
        &self,
        batch: &[ContributionNotice],
        wager: &Wager,
    ) -> Correlation {
        let Some(tracked) = &self.tracked else {
            return Correlation::Miss;
        };
        if wager.tx.as_ref() != Some(tracked) {
            return Correlation::Miss;
        }

        let hit = batch.iter().rev().find(|c| match &c.tx {
            Some(tx) => tx == tracked,
            None => {
                Some(&c.contributor) == self.identity.as_ref()
                    && Some(c.round_id) == wager.round_id
                    && c.amount == wager.stake
            }
        });

        match hit {
            Some(c) => Correlation::Match(ResultNotice {
                tx: tracked.clone(),
                player: Some(c.contributor.clone()),
                game_id: None,
                won: false,
                payout: 0,
                detail: LedgerDetail::Jackpot {
                    round_id: c.round_id,
                    entry_index: c.entry_index,
                    pool_after: c.pool_after,
                },
            }),
            None => Correlation::Miss,
        }
    }
}
