//! Schema upgrade chain for persisted libraries.
//!
//! Each upgrader migrates raw library data from the version it is registered
//! under to the next one, in place, and reports whether it changed anything.
//! [`upgrade_library_data`] applies upgraders until none is registered for
//! the resulting version or one reports no change.
//!
//! When bumping [`CURRENT_VERSION`], register an upgrader keyed by the
//! previous version in [`upgrader_for`].
//!
//! # Version history
//!
//! | Version | Layout |
//! |---------|--------|
//! | 0 | `content`: map of id → bit; `sort`: `{type, ids, reversed, seed}` |
//! | 1 | `bits`: ordered array; `sort`, `reversed`, `seed` at top level |

use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{Error, Result};

/// The schema version every loaded library ends up at.
pub const CURRENT_VERSION: i64 = 1;

/// Upper bound on chain length before giving up.
const MAX_UPGRADE_STEPS: usize = 64;

/// Migrates raw library data up one version. Returns false if nothing changed.
///
/// An upgrader that cannot make sense of the data fails without touching it.
pub type Upgrader = fn(&mut Map<String, Value>) -> Result<bool>;

fn upgrader_for(version: i64) -> Option<Upgrader> {
    match version {
        0 => Some(upgrade_from_0),
        _ => None,
    }
}

/// The version recorded in raw library data; absent means 0.
pub fn stored_version(data: &Map<String, Value>) -> i64 {
    data.get("version").and_then(Value::as_i64).unwrap_or(0)
}

/// Upgrade raw library data in place to the newest known version.
///
/// Returns true if any upgrader made changes.
pub fn upgrade_library_data(data: &mut Value) -> Result<bool> {
    let obj = data
        .as_object_mut()
        .ok_or_else(|| Error::structural("library data must be a JSON object"))?;
    run_chain(obj, upgrader_for)
}

fn run_chain(
    data: &mut Map<String, Value>,
    lookup: impl Fn(i64) -> Option<Upgrader>,
) -> Result<bool> {
    let mut changed = false;
    let mut steps = 0;
    while let Some(upgrader) = lookup(stored_version(data)) {
        if steps >= MAX_UPGRADE_STEPS {
            return Err(Error::UpgradeExhaustion { steps });
        }
        let from = stored_version(data);
        if !upgrader(data)? {
            break;
        }
        steps += 1;
        changed = true;
        debug!(from, to = stored_version(data), "upgraded library data");
    }
    Ok(changed)
}

/// Version 0 kept bits in an id-keyed map with a separate order hint.
///
/// Bits named by the hint come first, in hint order; ids the hint names but
/// the map lacks are skipped; bits the hint does not name follow in map
/// order. Without a hint the map order is used as is.
///
/// Data without an id-keyed bit map is rejected rather than migrated, so a
/// current-layout file that lost its `version` is never emptied.
fn upgrade_from_0(data: &mut Map<String, Value>) -> Result<bool> {
    if stored_version(data) == 1 {
        return Ok(false);
    }

    let key = match (data.get("content"), data.get("bits")) {
        (Some(Value::Object(_)), _) => "content",
        (None, Some(Value::Object(_))) => "bits",
        _ => {
            return Err(Error::structural(
                "version 0 library needs an id-keyed `content` object",
            ))
        }
    };
    let mut bits_by_id = match data.remove(key) {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    };

    let (sort_type, sort_ids, sort_reversed, sort_seed) = match data.remove("sort") {
        Some(Value::Object(mut sort)) => {
            let ids: Vec<String> = match sort.remove("ids") {
                Some(Value::Array(ids)) => ids
                    .into_iter()
                    .filter_map(|id| id.as_str().map(str::to_string))
                    .collect(),
                _ => Vec::new(),
            };
            (
                sort.remove("type"),
                ids,
                sort.remove("reversed"),
                sort.remove("seed"),
            )
        }
        Some(Value::String(s)) => (Some(Value::String(s)), Vec::new(), None, None),
        _ => (None, Vec::new(), None, None),
    };

    let mut bits = Vec::with_capacity(bits_by_id.len());
    for id in &sort_ids {
        if let Some(bit) = bits_by_id.remove(id) {
            bits.push(bit);
        }
    }
    bits.extend(bits_by_id.into_iter().map(|(_, bit)| bit));

    data.insert("version".to_string(), Value::from(1));
    data.insert("bits".to_string(), Value::Array(bits));
    if let Some(Value::String(s)) = sort_type {
        if !s.is_empty() {
            data.insert("sort".to_string(), Value::String(s));
        }
    }
    if let Some(Value::Bool(true)) = sort_reversed {
        data.insert("reversed".to_string(), Value::Bool(true));
    }
    match sort_seed {
        Some(Value::String(s)) if !s.is_empty() => {
            data.insert("seed".to_string(), Value::String(s));
        }
        Some(n @ Value::Number(_)) => {
            data.insert("seed".to_string(), n);
        }
        _ => {}
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn texts(data: &Value) -> Vec<String> {
        data["bits"]
            .as_array()
            .unwrap()
            .iter()
            .map(|b| b["text"].as_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_hinted_order_is_used() {
        let mut data = json!({
            "version": 0,
            "embedding_model": "m",
            "content": {
                "a": {"text": "A"},
                "b": {"text": "B"},
                "c": {"text": "C"}
            },
            "sort": {"type": "manual", "ids": ["c", "a", "b"], "reversed": true, "seed": "s"}
        });
        assert!(upgrade_library_data(&mut data).unwrap());
        assert_eq!(texts(&data), vec!["C", "A", "B"]);
        assert_eq!(data["version"], 1);
        assert_eq!(data["sort"], "manual");
        assert_eq!(data["reversed"], true);
        assert_eq!(data["seed"], "s");
        assert!(data.get("content").is_none());
    }

    #[test]
    fn test_map_order_without_hint() {
        let mut data = json!({
            "content": {
                "z": {"text": "Z"},
                "a": {"text": "A"},
                "m": {"text": "M"}
            }
        });
        assert!(upgrade_library_data(&mut data).unwrap());
        assert_eq!(texts(&data), vec!["Z", "A", "M"]);
        assert!(data.get("sort").is_none());
        assert!(data.get("reversed").is_none());
    }

    #[test]
    fn test_partial_hint_keeps_unlisted_bits() {
        let mut data = json!({
            "content": {
                "a": {"text": "A"},
                "b": {"text": "B"},
                "c": {"text": "C"}
            },
            "sort": {"ids": ["b", "missing"]}
        });
        upgrade_library_data(&mut data).unwrap();
        assert_eq!(texts(&data), vec!["B", "A", "C"]);
    }

    #[test]
    fn test_current_version_untouched() {
        let mut data = json!({"version": 1, "bits": []});
        let before = data.clone();
        assert!(!upgrade_library_data(&mut data).unwrap());
        assert_eq!(data, before);
    }

    #[test]
    fn test_non_object_rejected() {
        let mut data = json!([1, 2, 3]);
        assert!(upgrade_library_data(&mut data).unwrap_err().is_structural());
    }

    #[test]
    fn test_unversioned_bit_array_rejected_untouched() {
        let mut data = json!({
            "embedding_model": "m",
            "bits": [{"text": "keep me", "info": {"url": "u"}}],
            "sort": "manual"
        });
        let before = data.clone();
        assert!(upgrade_library_data(&mut data).unwrap_err().is_structural());
        assert_eq!(data, before);
    }

    #[test]
    fn test_version_0_without_content_rejected() {
        let mut data = json!({"version": 0, "embedding_model": "m"});
        assert!(upgrade_library_data(&mut data).unwrap_err().is_structural());
        assert_eq!(data["version"], 0);
    }

    #[test]
    fn test_legacy_bits_map_accepted() {
        let mut data = json!({"bits": {"a": {"text": "A"}, "b": {"text": "B"}}});
        assert!(upgrade_library_data(&mut data).unwrap());
        assert_eq!(texts(&data), vec!["A", "B"]);
    }

    #[test]
    fn test_non_converging_chain_is_exhaustion() {
        fn touch(data: &mut Map<String, Value>) -> Result<bool> {
            data.insert("touched".to_string(), Value::Bool(true));
            Ok(true)
        }
        let mut data = Map::new();
        let err = run_chain(&mut data, |_| Some(touch as Upgrader)).unwrap_err();
        assert!(matches!(err, Error::UpgradeExhaustion { .. }));
    }

    #[test]
    fn test_no_change_stops_chain() {
        fn noop(_: &mut Map<String, Value>) -> Result<bool> {
            Ok(false)
        }
        let mut data = Map::new();
        assert!(!run_chain(&mut data, |_| Some(noop as Upgrader)).unwrap());
    }
}
