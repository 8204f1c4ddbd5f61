//! Sort modes and shuffle seeds.
//!
//! ```text
//!   any ⇄ similarity ⇄ random      (freely settable, query-selectable)
//!            │
//!          manual                  (direct mutation only; freezes order)
//! ```

use std::fmt;
use std::str::FromStr;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// How a library orders its bits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortMode {
    /// No particular order; insertion order is kept.
    #[default]
    Any,
    /// Descending similarity to the last query embedding.
    Similarity,
    /// Shuffled, reproducibly when a seed is set.
    Random,
    /// Frozen in its current order.
    Manual,
}

impl SortMode {
    pub fn as_str(self) -> &'static str {
        match self {
            SortMode::Any => "any",
            SortMode::Similarity => "similarity",
            SortMode::Random => "random",
            SortMode::Manual => "manual",
        }
    }

    /// Whether a query request may ask for this mode.
    pub fn is_queryable(self) -> bool {
        !matches!(self, SortMode::Manual)
    }
}

impl FromStr for SortMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "any" => Ok(SortMode::Any),
            "similarity" => Ok(SortMode::Similarity),
            "random" => Ok(SortMode::Random),
            "manual" => Ok(SortMode::Manual),
            other => Err(Error::structural(format!("illegal sort: '{}'", other))),
        }
    }
}

impl fmt::Display for SortMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque shuffle seed. Persisted as whatever JSON scalar the caller gave.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Seed {
    Number(i64),
    Text(String),
}

impl Seed {
    /// Reduces the seed to RNG state.
    pub fn to_u64(&self) -> u64 {
        match self {
            Seed::Number(n) => *n as u64,
            Seed::Text(s) => {
                let digest = Sha256::digest(s.as_bytes());
                let mut bytes = [0u8; 8];
                bytes.copy_from_slice(&digest[..8]);
                u64::from_le_bytes(bytes)
            }
        }
    }
}

impl From<i64> for Seed {
    fn from(n: i64) -> Self {
        Seed::Number(n)
    }
}

impl From<&str> for Seed {
    fn from(s: &str) -> Self {
        Seed::Text(s.to_string())
    }
}

/// Shuffle in place; deterministic for a given seed and starting order.
pub(crate) fn shuffle<T>(items: &mut [T], seed: Option<&Seed>) {
    match seed {
        Some(seed) => items.shuffle(&mut StdRng::seed_from_u64(seed.to_u64())),
        None => items.shuffle(&mut rand::thread_rng()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        for mode in ["any", "similarity", "random", "manual"] {
            let parsed: SortMode = mode.parse().unwrap();
            assert_eq!(parsed.to_string(), mode);
        }
        assert!("name".parse::<SortMode>().is_err());
    }

    #[test]
    fn test_manual_not_queryable() {
        assert!(!SortMode::Manual.is_queryable());
        assert!(SortMode::Random.is_queryable());
    }

    #[test]
    fn test_seed_serde_untagged() {
        let n: Seed = serde_json::from_str("42").unwrap();
        assert_eq!(n, Seed::Number(42));
        let s: Seed = serde_json::from_str("\"abc\"").unwrap();
        assert_eq!(s, Seed::Text("abc".to_string()));
        assert_eq!(serde_json::to_string(&s).unwrap(), "\"abc\"");
    }

    #[test]
    fn test_seeded_shuffle_is_reproducible() {
        let seed = Seed::from("polymath");
        let mut a: Vec<u32> = (0..50).collect();
        let mut b = a.clone();
        shuffle(&mut a, Some(&seed));
        shuffle(&mut b, Some(&seed));
        assert_eq!(a, b);

        let mut sorted = a.clone();
        sorted.sort();
        assert_eq!(sorted, (0..50).collect::<Vec<_>>());
    }
}
