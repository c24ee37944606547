//! Config hash stability.
//!
//! GREEN when:
//! - loading the same layers twice yields the same hash;
//! - reordering keys within a YAML document does not change the hash;
//! - a later layer overrides an earlier one and changes the hash.

use arc_config::{load_layered_yaml, load_layered_yaml_from_strings, EngineConfig};

const BASE_YAML: &str = r#"
session:
  identity: "0x1111111111111111111111111111111111111111"
wager:
  min_stake: "0.01"
  require_balance_check: true
history:
  capacity:
    dice: 5
    race: 3
round:
  tick_ms: 1000
  poll_ms: 5000
"#;

const BASE_YAML_REORDERED: &str = r#"
round:
  poll_ms: 5000
  tick_ms: 1000
history:
  capacity:
    race: 3
    dice: 5
wager:
  require_balance_check: true
  min_stake: "0.01"
session:
  identity: "0x1111111111111111111111111111111111111111"
"#;

const OVERLAY_YAML: &str = r#"
round:
  poll_ms: 2000
"#;

#[test]
fn same_input_produces_identical_hash() {
    let a = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let b = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    assert_eq!(a.config_hash, b.config_hash);
    assert_eq!(a.canonical_json, b.canonical_json);
    assert_eq!(a.config_hash.len(), 64, "sha256 hex");
}

#[test]
fn reordered_keys_produce_same_hash() {
    let original = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let reordered = load_layered_yaml_from_strings(&[BASE_YAML_REORDERED]).unwrap();
    assert_eq!(
        original.config_hash, reordered.config_hash,
        "reordering keys in YAML must not change the hash"
    );
}

#[test]
fn overlay_overrides_and_changes_hash() {
    let base = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let merged = load_layered_yaml_from_strings(&[BASE_YAML, OVERLAY_YAML]).unwrap();
    assert_ne!(base.config_hash, merged.config_hash);

    let cfg = EngineConfig::from_config_json(&merged.config_json).unwrap();
    assert_eq!(cfg.round.poll_ms, 2000);
    // Untouched siblings survive the deep merge.
    assert_eq!(cfg.round.tick_ms, 1000);
    assert_eq!(cfg.history.dice, 5);
}

#[test]
fn files_and_strings_hash_identically() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("base.yaml");
    let overlay = dir.path().join("overlay.yaml");
    std::fs::write(&base, BASE_YAML).unwrap();
    std::fs::write(&overlay, OVERLAY_YAML).unwrap();

    let paths = [base.to_str().unwrap(), overlay.to_str().unwrap()];
    let from_files = load_layered_yaml(&paths).unwrap();
    let from_strings = load_layered_yaml_from_strings(&[BASE_YAML, OVERLAY_YAML]).unwrap();
    assert_eq!(from_files.config_hash, from_strings.config_hash);
}

#[test]
fn missing_file_is_an_error_with_path() {
    let err = load_layered_yaml(&["/definitely/not/here.yaml"]).unwrap_err();
    assert!(format!("{err:#}").contains("/definitely/not/here.yaml"));
}
