//! Access control for restricted bits.
//!
//! Bits may carry an access tag naming the private partition they came
//! from. An [`AccessPolicy`] maps caller-supplied tokens to the set of tags
//! they may see, and says how much a response discloses about what was
//! hidden. The policy is built once by the host and passed by reference.

use std::collections::{BTreeMap, BTreeSet};

use serde::Deserialize;

/// Tag used when the host does not configure one.
pub const DEFAULT_PRIVATE_ACCESS_TAG: &str = "unpublished";

/// Host access policy.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccessPolicy {
    /// Tag granted by a token record that lists no tags of its own.
    #[serde(default)]
    pub default_private_access_tag: Option<String>,
    #[serde(default)]
    pub restricted: Disclosure,
    /// Token records keyed by a friendly name.
    #[serde(default)]
    pub tokens: BTreeMap<String, TokenRecord>,
}

/// What a query response reveals about restricted bits it removed.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Disclosure {
    /// Report how many bits were removed.
    #[serde(default)]
    pub count: bool,
    /// Appended to the response message when anything was removed.
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenRecord {
    /// The secret callers present.
    pub token: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub access_tags: Vec<String>,
}

impl AccessPolicy {
    /// The tag that marks the default private partition.
    pub fn private_access_tag(&self) -> &str {
        match self.default_private_access_tag.as_deref() {
            Some(tag) if !tag.is_empty() => tag,
            _ => DEFAULT_PRIVATE_ACCESS_TAG,
        }
    }

    /// Tags visible to the holder of `access_token`.
    ///
    /// Empty for a missing or unknown token. A known token with no tags
    /// unlocks the default private partition.
    pub fn permitted_access(&self, access_token: Option<&str>) -> BTreeSet<String> {
        let token = match access_token {
            Some(t) if !t.is_empty() => t,
            _ => return BTreeSet::new(),
        };
        let record = match self.tokens.values().find(|r| r.token == token) {
            Some(r) => r,
            None => return BTreeSet::new(),
        };
        if record.access_tags.is_empty() {
            return BTreeSet::from([self.private_access_tag().to_string()]);
        }
        record.access_tags.iter().cloned().collect()
    }
}
