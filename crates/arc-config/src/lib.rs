//! Layered YAML configuration.
//!
//! Documents are merged left to right (later layers override), converted to
//! JSON, checked for secret literals, canonicalised and hashed. The hash
//! identifies the effective configuration a session ran with and is recorded
//! in the journal header.

pub mod engine;

pub use engine::{EngineConfig, JournalSettings, RoundSettings, SimSettings, WagerSettings};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fs;

/// Leaf string prefixes that indicate a secret pasted into config.
const SECRET_PREFIXES: &[&str] = &[
    "-----BEGIN", // PEM private keys
    "xprv",       // BIP32 extended private key
    "tprv",       // BIP32 extended private key (testnet)
    "sk-",        // API-style secret keys
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigMode {
    /// Against the in-memory simulated ledger.
    Sim,
    Live,
}

impl ConfigMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigMode::Sim => "SIM",
            ConfigMode::Live => "LIVE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnusedKeyPolicy {
    Warn,
    Fail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnusedKeyReport {
    pub mode: String,
    /// Registry prefixes the report was checked against, sorted.
    pub consumed_prefixes: Vec<String>,
    /// Leaves no prefix covers, sorted.
    pub unused_leaf_pointers: Vec<String>,
}

impl UnusedKeyReport {
    pub fn is_clean(&self) -> bool {
        self.unused_leaf_pointers.is_empty()
    }
}

/// Keys every mode reads.
const ENGINE_KEYS: &[&str] = &[
    "/session/identity",
    "/wager/min_stake",
    "/wager/require_balance_check",
    "/wager/slow_after_ms",
    "/history/capacity",
    "/round/tick_ms",
    "/round/poll_ms",
    "/round/winners_capacity",
    "/round/entries_capacity",
    "/correlator/memory",
    "/journal/path",
    "/journal/hash_chain",
    "/daemon/addr",
];

/// Read only when the simulated ledger backs the engine.
const SIM_KEYS: &[&str] = &[
    "/sim/seed",
    "/sim/starting_balance",
    "/sim/min_bet",
    "/sim/round_duration_ms",
    "/sim/confirm_delay_ms",
];

/// JSON-pointer prefixes read by [`EngineConfig::from_config_json`] in `mode`.
///
/// Keep in step with the reads in `engine.rs`: a listed key that is never
/// read hides typos from the guard.
pub fn consumed_pointers_for_mode(mode: ConfigMode) -> Vec<&'static str> {
    let mut keys = ENGINE_KEYS.to_vec();
    if mode == ConfigMode::Sim {
        keys.extend_from_slice(SIM_KEYS);
    }
    keys
}

/// Report config leaves that nothing reads in `mode`. Under
/// [`UnusedKeyPolicy::Fail`] a non-empty report is an error.
pub fn report_unused_keys(
    mode: ConfigMode,
    config_json: &Value,
    policy: UnusedKeyPolicy,
) -> Result<UnusedKeyReport> {
    let registry: BTreeSet<&str> = consumed_pointers_for_mode(mode).into_iter().collect();

    let unused: BTreeSet<String> = leaves(config_json)
        .into_iter()
        .map(|(ptr, _)| ptr)
        .filter(|ptr| !registry.iter().any(|key| covers(key, ptr)))
        .collect();

    let report = UnusedKeyReport {
        mode: mode.as_str().to_string(),
        consumed_prefixes: registry.iter().map(|k| k.to_string()).collect(),
        unused_leaf_pointers: unused.into_iter().collect(),
    };

    if policy == UnusedKeyPolicy::Fail && !report.is_clean() {
        let shown: Vec<&String> = report.unused_leaf_pointers.iter().take(12).collect();
        bail!(
            "CONFIG_UNUSED_KEYS (mode={}): {} key(s) not read by the engine: {:?}",
            report.mode,
            report.unused_leaf_pointers.len(),
            shown
        );
    }
    Ok(report)
}

/// `key` covers itself and anything beneath it, never a sibling that merely
/// shares its spelling (`/a/b` does not cover `/a/bc`).
fn covers(key: &str, leaf: &str) -> bool {
    match leaf.strip_prefix(key) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// Every scalar in `root` with its JSON pointer. Empty objects and arrays
/// have no leaves; a scalar root is reported at `/`.
fn leaves(root: &Value) -> Vec<(String, &Value)> {
    let mut out = Vec::new();
    let mut stack: Vec<(String, &Value)> = vec![(String::new(), root)];
    while let Some((ptr, v)) = stack.pop() {
        match v {
            Value::Object(map) => {
                for (k, child) in map {
                    let token = k.replace('~', "~0").replace('/', "~1");
                    stack.push((format!("{ptr}/{token}"), child));
                }
            }
            Value::Array(items) => {
                for (i, child) in items.iter().enumerate() {
                    stack.push((format!("{ptr}/{i}"), child));
                }
            }
            scalar if ptr.is_empty() => out.push(("/".to_string(), scalar)),
            scalar => out.push((ptr, scalar)),
        }
    }
    out
}

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// SHA-256 of `canonical_json`, lowercase hex.
    pub config_hash: String,
    pub canonical_json: String,
    pub config_json: Value,
}

pub fn load_layered_yaml(paths: &[&str]) -> Result<LoadedConfig> {
    let docs = paths
        .iter()
        .map(|p| fs::read_to_string(p).with_context(|| format!("read config layer {p}")))
        .collect::<Result<Vec<String>>>()?;
    let refs: Vec<&str> = docs.iter().map(String::as_str).collect();
    load_layered_yaml_from_strings(&refs)
}

pub fn load_layered_yaml_from_strings(yaml_docs: &[&str]) -> Result<LoadedConfig> {
    let mut merged = Value::Object(serde_json::Map::new());
    for (i, raw) in yaml_docs.iter().enumerate() {
        let layer: serde_yaml::Value =
            serde_yaml::from_str(raw).with_context(|| format!("config layer {i} is not yaml"))?;
        // An empty document parses as null; treat it as an empty layer.
        if layer.is_null() {
            continue;
        }
        let layer = serde_json::to_value(layer)
            .with_context(|| format!("config layer {i} has no json form"))?;
        overlay(&mut merged, layer);
    }

    refuse_secret_literals(&merged)?;

    // serde_json::Map is BTreeMap-backed (no preserve_order), so keys
    // serialize sorted.
    let canonical_json = serde_json::to_string(&merged).context("canonical json serialize")?;
    let config_hash = hex::encode(Sha256::digest(canonical_json.as_bytes()));
    Ok(LoadedConfig {
        config_hash,
        canonical_json,
        config_json: merged,
    })
}

/// Objects merge key by key; anything else in `top` replaces `base`.
fn overlay(base: &mut Value, top: Value) {
    match (base, top) {
        (Value::Object(base_map), Value::Object(top_map)) => {
            for (k, v) in top_map {
                match base_map.get_mut(&k) {
                    Some(slot) => overlay(slot, v),
                    None => {
                        base_map.insert(k, v);
                    }
                }
            }
        }
        (slot, v) => *slot = v,
    }
}

fn refuse_secret_literals(v: &Value) -> Result<()> {
    for (ptr, leaf) in leaves(v) {
        if leaf.as_str().is_some_and(looks_like_secret) {
            bail!("CONFIG_SECRET_DETECTED leaf={ptr} value=REDACTED");
        }
    }
    Ok(())
}

fn looks_like_secret(s: &str) -> bool {
    let t = s.trim();
    if t.len() < 8 {
        return false;
    }
    SECRET_PREFIXES.iter().any(|p| t.starts_with(p)) || looks_like_raw_private_key(t)
}

/// 32 bytes of hex, with or without `0x`. Addresses are 20 bytes and pass.
fn looks_like_raw_private_key(t: &str) -> bool {
    let body = t.strip_prefix("0x").unwrap_or(t);
    body.len() == 64 && body.chars().all(|c| c.is_ascii_hexdigit())
}
