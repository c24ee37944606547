//! Typed view over the merged configuration.
//!
//! Every key is optional; absent keys fall back to the defaults below. Keys
//! read here must also appear in [`crate::consumed_pointers_for_mode`].

use anyhow::{bail, Context, Result};
use serde_json::Value;

use arc_schemas::{parse_units, Address, GameKind, Wei};
use arc_session::{HistoryCapacities, DEFAULT_RESOLVED_MEMORY};

pub const DEFAULT_DAEMON_ADDR: &str = "127.0.0.1:8898";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WagerSettings {
    pub min_stake: Wei,
    pub require_balance_check: bool,
    /// Pending duration after which the snapshot flags the wager as slow.
    pub slow_after_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundSettings {
    pub tick_ms: u64,
    pub poll_ms: u64,
    pub winners_capacity: usize,
    pub entries_capacity: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalSettings {
    pub path: Option<String>,
    pub hash_chain: bool,
}

/// Simulated-ledger knobs; only read in `ConfigMode::Sim`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimSettings {
    pub seed: String,
    pub starting_balance: Wei,
    pub min_bet: Wei,
    pub round_duration_ms: i64,
    pub confirm_delay_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub identity: Option<Address>,
    pub wager: WagerSettings,
    pub history: HistoryCapacities,
    pub round: RoundSettings,
    pub correlator_memory: usize,
    pub journal: JournalSettings,
    pub daemon_addr: String,
    pub sim: SimSettings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            identity: None,
            wager: WagerSettings {
                min_stake: 0,
                require_balance_check: true,
                slow_after_ms: 30_000,
            },
            history: HistoryCapacities::default(),
            round: RoundSettings {
                tick_ms: 1_000,
                poll_ms: 5_000,
                winners_capacity: 5,
                entries_capacity: 10,
            },
            correlator_memory: DEFAULT_RESOLVED_MEMORY,
            journal: JournalSettings {
                path: None,
                hash_chain: true,
            },
            daemon_addr: DEFAULT_DAEMON_ADDR.to_string(),
            sim: SimSettings {
                seed: "arcade-sim".to_string(),
                starting_balance: 10 * arc_schemas::units::WEI_PER_UNIT,
                min_bet: 0,
                round_duration_ms: 5 * 60 * 1000,
                confirm_delay_ms: 50,
            },
        }
    }
}

fn read_str<'a>(v: &'a Value, ptr: &str) -> Result<Option<&'a str>> {
    match v.pointer(ptr) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(other) => bail!("CONFIG_INVALID leaf={ptr}: expected string, got {other}"),
    }
}

fn read_bool(v: &Value, ptr: &str) -> Result<Option<bool>> {
    match v.pointer(ptr) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(other) => bail!("CONFIG_INVALID leaf={ptr}: expected bool, got {other}"),
    }
}

fn read_u64(v: &Value, ptr: &str) -> Result<Option<u64>> {
    match v.pointer(ptr) {
        None | Some(Value::Null) => Ok(None),
        Some(n) => match n.as_u64() {
            Some(x) => Ok(Some(x)),
            None => bail!("CONFIG_INVALID leaf={ptr}: expected non-negative integer, got {n}"),
        },
    }
}

/// Amounts are decimal strings in whole units (`"0.01"`).
fn read_amount(v: &Value, ptr: &str) -> Result<Option<Wei>> {
    match read_str(v, ptr)? {
        None => Ok(None),
        Some(s) => parse_units(s)
            .map(Some)
            .with_context(|| format!("CONFIG_INVALID leaf={ptr}: bad amount {s:?}")),
    }
}

fn read_usize(v: &Value, ptr: &str) -> Result<Option<usize>> {
    read_u64(v, ptr)?
        .map(|x| usize::try_from(x).with_context(|| format!("CONFIG_INVALID leaf={ptr}")))
        .transpose()
}

fn read_i64(v: &Value, ptr: &str) -> Result<Option<i64>> {
    read_u64(v, ptr)?
        .map(|x| i64::try_from(x).with_context(|| format!("CONFIG_INVALID leaf={ptr}")))
        .transpose()
}

impl EngineConfig {
    pub fn from_config_json(v: &Value) -> Result<Self> {
        let d = EngineConfig::default();

        let identity = read_str(v, "/session/identity")?
            .filter(|s| !s.trim().is_empty())
            .map(Address::new);

        let wager = WagerSettings {
            min_stake: read_amount(v, "/wager/min_stake")?.unwrap_or(d.wager.min_stake),
            require_balance_check: read_bool(v, "/wager/require_balance_check")?
                .unwrap_or(d.wager.require_balance_check),
            slow_after_ms: read_i64(v, "/wager/slow_after_ms")?.unwrap_or(d.wager.slow_after_ms),
        };

        let mut history = d.history;
        for kind in GameKind::ALL {
            let ptr = format!("/history/capacity/{}", kind.as_str());
            if let Some(cap) = read_usize(v, &ptr)? {
                if cap == 0 {
                    bail!("CONFIG_INVALID leaf={ptr}: capacity must be at least 1");
                }
                match kind {
                    GameKind::Dice => history.dice = cap,
                    GameKind::Flip => history.flip = cap,
                    GameKind::Slots => history.slots = cap,
                    GameKind::Race => history.race = cap,
                    GameKind::Jackpot => history.jackpot = cap,
                }
            }
        }

        let round = RoundSettings {
            tick_ms: read_u64(v, "/round/tick_ms")?.unwrap_or(d.round.tick_ms),
            poll_ms: read_u64(v, "/round/poll_ms")?.unwrap_or(d.round.poll_ms),
            winners_capacity: read_usize(v, "/round/winners_capacity")?
                .unwrap_or(d.round.winners_capacity),
            entries_capacity: read_usize(v, "/round/entries_capacity")?
                .unwrap_or(d.round.entries_capacity),
        };
        if round.tick_ms == 0 || round.poll_ms == 0 {
            bail!("CONFIG_INVALID leaf=/round: tick_ms and poll_ms must be positive");
        }

        let journal = JournalSettings {
            path: read_str(v, "/journal/path")?.map(str::to_string),
            hash_chain: read_bool(v, "/journal/hash_chain")?.unwrap_or(d.journal.hash_chain),
        };

        let sim = SimSettings {
            seed: read_str(v, "/sim/seed")?
                .map(str::to_string)
                .unwrap_or(d.sim.seed),
            starting_balance: read_amount(v, "/sim/starting_balance")?
                .unwrap_or(d.sim.starting_balance),
            min_bet: read_amount(v, "/sim/min_bet")?.unwrap_or(d.sim.min_bet),
            round_duration_ms: read_i64(v, "/sim/round_duration_ms")?
                .unwrap_or(d.sim.round_duration_ms),
            confirm_delay_ms: read_u64(v, "/sim/confirm_delay_ms")?
                .unwrap_or(d.sim.confirm_delay_ms),
        };

        Ok(Self {
            identity,
            wager,
            history,
            round,
            correlator_memory: read_usize(v, "/correlator/memory")?
                .unwrap_or(d.correlator_memory),
            journal,
            daemon_addr: read_str(v, "/daemon/addr")?
                .map(str::to_string)
                .unwrap_or(d.daemon_addr),
            sim,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_config_yields_defaults() {
        let cfg = EngineConfig::from_config_json(&json!({})).unwrap();
        assert_eq!(cfg, EngineConfig::default());
        assert_eq!(cfg.history.race, 3);
        assert_eq!(cfg.round.tick_ms, 1_000);
    }

    #[test]
    fn reads_typed_values() {
        let v = json!({
            "session": {"identity": "0xAbC"},
            "wager": {"min_stake": "0.01", "require_balance_check": false},
            "history": {"capacity": {"dice": 8}},
            "round": {"poll_ms": 2500},
            "journal": {"path": "/tmp/j.jsonl"}
        });
        let cfg = EngineConfig::from_config_json(&v).unwrap();
        assert_eq!(cfg.identity, Some(Address::new("0xabc")));
        assert_eq!(cfg.wager.min_stake, 10_000_000_000_000_000);
        assert!(!cfg.wager.require_balance_check);
        assert_eq!(cfg.history.dice, 8);
        assert_eq!(cfg.history.flip, 4);
        assert_eq!(cfg.round.poll_ms, 2_500);
        assert_eq!(cfg.journal.path.as_deref(), Some("/tmp/j.jsonl"));
    }

    #[test]
    fn rejects_wrong_types() {
        let err = EngineConfig::from_config_json(&json!({"round": {"tick_ms": "fast"}}))
            .unwrap_err()
            .to_string();
        assert!(err.contains("CONFIG_INVALID leaf=/round/tick_ms"), "{err}");

        let err = EngineConfig::from_config_json(&json!({"history": {"capacity": {"flip": 0}}}))
            .unwrap_err()
            .to_string();
        assert!(err.contains("/history/capacity/flip"), "{err}");

        assert!(EngineConfig::from_config_json(&json!({"wager": {"min_stake": "abc"}})).is_err());
    }
}
