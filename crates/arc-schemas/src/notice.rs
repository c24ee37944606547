//! Notifications emitted by the authoritative ledger.
//!
//! Delivery is at-least-once and batched; nothing here implies ordering across
//! unrelated transactions.

use serde::{Deserialize, Serialize};

use crate::game::{LedgerDetail, Outcome};
use crate::units::{opt_wei_serde, wei_serde, Wei};

/// Participant identity on the ledger. Compared case-insensitively, so it is
/// stored lowercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Address(String);

impl Address {
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().trim().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Address {
    fn from(raw: String) -> Self {
        Address::new(raw)
    }
}

impl From<Address> for String {
    fn from(a: Address) -> Self {
        a.0
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Transaction identifier assigned by the ledger on submission acceptance.
/// Opaque; it is only ever compared for equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxHash(pub String);

impl TxHash {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TxHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A game result keyed by the transaction that caused it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultNotice {
    pub tx: TxHash,
    /// Player the ledger attributes the result to, when the event carries it.
    #[serde(default)]
    pub player: Option<Address>,
    /// Ledger-side game counter, informational only.
    #[serde(default)]
    pub game_id: Option<u64>,
    pub won: bool,
    #[serde(with = "wei_serde")]
    pub payout: Wei,
    pub detail: LedgerDetail,
}

impl ResultNotice {
    pub fn outcome(&self) -> Outcome {
        Outcome {
            won: self.won,
            payout: self.payout,
            detail: self.detail.clone(),
        }
    }
}

/// A new pooled round began.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundStarted {
    pub round_id: u64,
    pub start_ms: i64,
    pub deadline_ms: i64,
}

/// One contribution entered into a pooled round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContributionNotice {
    pub round_id: u64,
    /// Ledger-assigned position of this entry within its round.
    pub entry_index: u64,
    pub contributor: Address,
    #[serde(with = "wei_serde")]
    pub amount: Wei,
    /// Authoritative pool size immediately after this entry.
    #[serde(with = "wei_serde")]
    pub pool_after: Wei,
    /// Transaction that entered the contribution, if the event exposes it.
    #[serde(default)]
    pub tx: Option<TxHash>,
}

/// A pooled round was drawn and settled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawNotice {
    pub round_id: u64,
    pub winner: Address,
    #[serde(with = "wei_serde")]
    pub prize: Wei,
}

/// Result of polling the authoritative readable state of the pooled game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundReading {
    pub round_id: u64,
    #[serde(with = "wei_serde")]
    pub pool_total: Wei,
    pub deadline_ms: i64,
    /// Cumulative contribution of the session identity in `round_id`.
    #[serde(with = "opt_wei_serde", default)]
    pub user_total: Option<Wei>,
}

/// Explicit error the ledger reports for an already-confirmed transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureNotice {
    pub tx: TxHash,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedKind {
    Results,
    Contributions,
    Draws,
    Rounds,
    Failures,
}

impl FeedKind {
    pub const ALL: [FeedKind; 5] = [
        FeedKind::Results,
        FeedKind::Contributions,
        FeedKind::Draws,
        FeedKind::Rounds,
        FeedKind::Failures,
    ];
}

/// One delivery from a subscribed feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "feed", content = "notices", rename_all = "snake_case")]
pub enum NoticeBatch {
    Results(Vec<ResultNotice>),
    Contributions(Vec<ContributionNotice>),
    Draws(Vec<DrawNotice>),
    Rounds(Vec<RoundStarted>),
    Failures(Vec<FailureNotice>),
}

impl NoticeBatch {
    pub fn feed(&self) -> FeedKind {
        match self {
            NoticeBatch::Results(_) => FeedKind::Results,
            NoticeBatch::Contributions(_) => FeedKind::Contributions,
            NoticeBatch::Draws(_) => FeedKind::Draws,
            NoticeBatch::Rounds(_) => FeedKind::Rounds,
            NoticeBatch::Failures(_) => FeedKind::Failures,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            NoticeBatch::Results(v) => v.len(),
            NoticeBatch::Contributions(v) => v.len(),
            NoticeBatch::Draws(v) => v.len(),
            NoticeBatch::Rounds(v) => v.len(),
            NoticeBatch::Failures(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
