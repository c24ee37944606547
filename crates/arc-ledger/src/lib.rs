//! Contracts for the authoritative ledger's collaborators.
//!
//! The engine never talks to a chain, wallet or RPC endpoint directly; it
//! drives these traits. Implementations must not retry internally: a failed
//! submission or confirmation is reported once and the engine decides.
//!
//! | Concern                   | Trait                   |
//! |---------------------------|-------------------------|
//! | submit a wager            | [`WagerSubmitter`]      |
//! | wait for inclusion        | [`ConfirmationWatcher`] |
//! | result/round notifications| [`EventFeed`]           |
//! | readable contract state   | [`LedgerReader`]        |
//! | account balance           | [`BalanceReader`]       |

use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use arc_schemas::{Address, FeedKind, NoticeBatch, RoundReading, TxHash, WagerParams, Wei};

/// Composite round reads tried before giving up on a moving round id.
pub const ROUND_READ_ATTEMPTS: usize = 3;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionError {
    /// The signer (user or wallet) declined.
    Rejected(String),
    /// The ledger refused the call, e.g. a failed pre-flight simulation.
    Failed(String),
    /// The collaborator itself broke.
    Fault(String),
}

impl std::fmt::Display for SubmissionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubmissionError::Rejected(m) => write!(f, "submission rejected: {m}"),
            SubmissionError::Failed(m) => write!(f, "submission failed: {m}"),
            SubmissionError::Fault(m) => write!(f, "submission fault: {m}"),
        }
    }
}

impl std::error::Error for SubmissionError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationError {
    /// Included but reverted.
    Reverted(String),
    /// Dropped or replaced before inclusion.
    Failed(String),
    Fault(String),
}

impl std::fmt::Display for ConfirmationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfirmationError::Reverted(m) => write!(f, "transaction reverted: {m}"),
            ConfirmationError::Failed(m) => write!(f, "confirmation failed: {m}"),
            ConfirmationError::Fault(m) => write!(f, "confirmation fault: {m}"),
        }
    }
}

impl std::error::Error for ConfirmationError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadError {
    Unavailable(String),
    /// The read succeeded but returned a value of the wrong shape.
    UnexpectedValue { query: LedgerQuery, value: LedgerValue },
    /// The round id kept changing while a round view was composed.
    RoundMoved { attempts: usize },
}

impl std::fmt::Display for ReadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReadError::Unavailable(m) => write!(f, "ledger read unavailable: {m}"),
            ReadError::UnexpectedValue { query, value } => {
                write!(f, "ledger read {query:?} returned {value:?}")
            }
            ReadError::RoundMoved { attempts } => {
                write!(f, "round changed during read ({attempts} attempts)")
            }
        }
    }
}

impl std::error::Error for ReadError {}

// ---------------------------------------------------------------------------
// Request / read types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub wager_id: Uuid,
    pub player: Address,
    pub params: WagerParams,
    #[serde(with = "arc_schemas::units::wei_serde")]
    pub stake: Wei,
    /// Pooled kind only.
    pub round_id: Option<u64>,
}

/// Named readable values on the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "query", rename_all = "snake_case")]
pub enum LedgerQuery {
    CurrentRoundId,
    PoolTotal,
    DrawTime,
    PlayerTotal { round_id: u64, player: Address },
    MinBet,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum LedgerValue {
    RoundId(u64),
    Amount(#[serde(with = "arc_schemas::units::wei_serde")] Wei),
    TimestampMs(i64),
}

impl LedgerValue {
    pub fn into_round_id(self, query: LedgerQuery) -> Result<u64, ReadError> {
        match self {
            LedgerValue::RoundId(v) => Ok(v),
            value => Err(ReadError::UnexpectedValue { query, value }),
        }
    }

    pub fn into_amount(self, query: LedgerQuery) -> Result<Wei, ReadError> {
        match self {
            LedgerValue::Amount(v) => Ok(v),
            value => Err(ReadError::UnexpectedValue { query, value }),
        }
    }

    pub fn into_timestamp_ms(self, query: LedgerQuery) -> Result<i64, ReadError> {
        match self {
            LedgerValue::TimestampMs(v) => Ok(v),
            value => Err(ReadError::UnexpectedValue { query, value }),
        }
    }
}

// ---------------------------------------------------------------------------
// Collaborator traits
// ---------------------------------------------------------------------------

#[async_trait::async_trait]
pub trait WagerSubmitter: Send + Sync {
    /// Hand the wager to the ledger. Resolves once the transaction id is known.
    async fn submit_wager(&self, req: SubmitRequest) -> Result<TxHash, SubmissionError>;
}

#[async_trait::async_trait]
pub trait ConfirmationWatcher: Send + Sync {
    /// Wait until `tx` is included. Latency is unbounded; callers must not
    /// block on this.
    async fn await_confirmation(&self, tx: &TxHash) -> Result<(), ConfirmationError>;
}

/// At-least-once, batched notification streams.
pub trait EventFeed: Send + Sync {
    fn subscribe(&self, feed: FeedKind) -> BoxStream<'static, NoticeBatch>;
}

#[async_trait::async_trait]
pub trait LedgerReader: Send + Sync {
    async fn read_value(&self, query: LedgerQuery) -> Result<LedgerValue, ReadError>;

    /// Compose the pooled round view from individual reads.
    ///
    /// The round id is read again after the other values; if it moved the
    /// whole read is retried, up to [`ROUND_READ_ATTEMPTS`] times.
    async fn read_round(&self, player: Option<&Address>) -> Result<RoundReading, ReadError> {
        let mut round_id = self
            .read_value(LedgerQuery::CurrentRoundId)
            .await?
            .into_round_id(LedgerQuery::CurrentRoundId)?;
        for _ in 0..ROUND_READ_ATTEMPTS {
            let pool_total = self
                .read_value(LedgerQuery::PoolTotal)
                .await?
                .into_amount(LedgerQuery::PoolTotal)?;
            let deadline_ms = self
                .read_value(LedgerQuery::DrawTime)
                .await?
                .into_timestamp_ms(LedgerQuery::DrawTime)?;
            let user_total = match player {
                Some(p) => {
                    let q = LedgerQuery::PlayerTotal {
                        round_id,
                        player: p.clone(),
                    };
                    Some(self.read_value(q.clone()).await?.into_amount(q)?)
                }
                None => None,
            };
            let after = self
                .read_value(LedgerQuery::CurrentRoundId)
                .await?
                .into_round_id(LedgerQuery::CurrentRoundId)?;
            if after == round_id {
                return Ok(RoundReading {
                    round_id,
                    pool_total,
                    deadline_ms,
                    user_total,
                });
            }
            round_id = after;
        }
        Err(ReadError::RoundMoved {
            attempts: ROUND_READ_ATTEMPTS,
        })
    }
}

#[async_trait::async_trait]
pub trait BalanceReader: Send + Sync {
    async fn read_balance(&self, who: &Address) -> Result<Wei, ReadError>;
}

/// Everything the engine needs from a ledger, in one object.
pub trait LedgerClient:
    WagerSubmitter + ConfirmationWatcher + EventFeed + LedgerReader + BalanceReader
{
}

impl<T> LedgerClient for T where
    T: WagerSubmitter + ConfirmationWatcher + EventFeed + LedgerReader + BalanceReader
{
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Serves round ids from a queue, repeating the last one.
    struct MovingRounds {
        ids: Mutex<VecDeque<u64>>,
    }

    impl MovingRounds {
        fn new(ids: &[u64]) -> Self {
            Self {
                ids: Mutex::new(ids.iter().copied().collect()),
            }
        }
    }

    #[async_trait::async_trait]
    impl LedgerReader for MovingRounds {
        async fn read_value(&self, query: LedgerQuery) -> Result<LedgerValue, ReadError> {
            Ok(match query {
                LedgerQuery::CurrentRoundId => {
                    let mut ids = self.ids.lock().unwrap();
                    let id = if ids.len() > 1 {
                        ids.pop_front().unwrap()
                    } else {
                        ids[0]
                    };
                    LedgerValue::RoundId(id)
                }
                LedgerQuery::PoolTotal => LedgerValue::Amount(500),
                LedgerQuery::DrawTime => LedgerValue::TimestampMs(90_000),
                LedgerQuery::PlayerTotal { round_id, .. } => {
                    LedgerValue::Amount(Wei::from(round_id) * 10)
                }
                LedgerQuery::MinBet => LedgerValue::Amount(1),
            })
        }
    }

    #[tokio::test]
    async fn stable_round_reads_once() {
        let ledger = MovingRounds::new(&[3]);
        let me = Address::new("0xme");
        let r = ledger.read_round(Some(&me)).await.unwrap();
        assert_eq!(r.round_id, 3);
        assert_eq!(r.user_total, Some(30));
        assert_eq!(r.pool_total, 500);
    }

    #[tokio::test]
    async fn round_change_mid_read_is_retried() {
        // First composite sees 3 then 4; the retry sees 4 throughout.
        let ledger = MovingRounds::new(&[3, 4]);
        let me = Address::new("0xme");
        let r = ledger.read_round(Some(&me)).await.unwrap();
        assert_eq!(r.round_id, 4);
        assert_eq!(r.user_total, Some(40), "player total belongs to the reported round");
    }

    #[tokio::test]
    async fn round_that_never_settles_is_an_error() {
        let ledger = MovingRounds::new(&[1, 2, 3, 4, 5, 6]);
        let err = ledger.read_round(None).await.unwrap_err();
        assert_eq!(
            err,
            ReadError::RoundMoved {
                attempts: ROUND_READ_ATTEMPTS
            }
        );
    }
}
