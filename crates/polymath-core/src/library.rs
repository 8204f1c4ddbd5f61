//! The library: an ordered, deduplicated collection of bits.
//!
//! # Structure
//!
//! Bits live in an id-keyed index; a separate `order` vector of ids is the
//! authoritative (and persisted) sequence. Both always hold the same ids.
//!
//! # Ordering
//!
//! | Sort | On insert | On re-derive |
//! |------|-----------|--------------|
//! | `any` | append | keep |
//! | `manual` | append | keep |
//! | `random` | append | seeded shuffle |
//! | `similarity` | binary-search position | sort by similarity |
//!
//! Under `similarity` the insertion point is found in O(log n); the vector
//! shift after it is O(n). `reversed` flips the direction of every mode, so
//! the stored order is always the display order. Changing the sort mode,
//! `reversed`, or the seed re-derives the order.
//!
//! # Ownership
//!
//! A library owns its bits outright. [`Library::insert`] takes a bit by
//! value and [`Library::remove`] hands it back, so a bit belongs to at most
//! one library. Only read access is handed out for bits inside a library,
//! which keeps index keys in step with bit ids.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::access::AccessPolicy;
use crate::bit::{Bit, BitInfo};
use crate::embedding::{expected_embedding_len, vector_similarity, EMBEDDINGS_MODEL_ID};
use crate::error::{Error, Result};
use crate::omit::{Omit, OmitField};
use crate::record::{BitRecord, Details, LibraryRecord};
use crate::sort::{shuffle, Seed, SortMode};
use crate::upgrade::{upgrade_library_data, CURRENT_VERSION};

/// Unit for [`Library::slice`] budgets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CountType {
    #[default]
    Token,
    Bit,
}

impl FromStr for CountType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "token" => Ok(CountType::Token),
            "bit" => Ok(CountType::Bit),
            other => Err(Error::query(format!(
                "count_type '{}' is not one of token, bit",
                other
            ))),
        }
    }
}

impl fmt::Display for CountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CountType::Token => "token",
            CountType::Bit => "bit",
        })
    }
}

/// Summary numbers for a library.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LibraryStats {
    pub bits: usize,
    pub tokens: usize,
    pub embedded: usize,
    /// Distinct sources, by [`BitInfo::contents`].
    pub sources: usize,
    /// Bit counts per access tag; untagged bits are not listed.
    pub access_tags: BTreeMap<String, usize>,
}

#[derive(Debug, Clone)]
pub struct Library {
    version: i64,
    embedding_model: String,
    omit: Omit,
    sort: SortMode,
    reversed: bool,
    seed: Option<Seed>,
    details: Option<Details>,
    bits: HashMap<String, Bit>,
    order: Vec<String>,
    upgraded: bool,
}

impl Default for Library {
    fn default() -> Self {
        Self::new()
    }
}

/// Ranking key for similarity order. Unscored and NaN rank last, and keys
/// compare with `f32::total_cmp` so the order is total.
fn rank(similarity: Option<f32>) -> f32 {
    similarity
        .filter(|s| !s.is_nan())
        .unwrap_or(f32::NEG_INFINITY)
}

fn similarity_of(bits: &HashMap<String, Bit>, id: &str) -> f32 {
    rank(bits.get(id).and_then(Bit::similarity))
}

impl Library {
    /// An empty library at the current version.
    pub fn new() -> Self {
        Self {
            version: CURRENT_VERSION,
            embedding_model: EMBEDDINGS_MODEL_ID.to_string(),
            omit: Omit::none(),
            sort: SortMode::Any,
            reversed: false,
            seed: None,
            details: None,
            bits: HashMap::new(),
            order: Vec::new(),
            upgraded: false,
        }
    }

    // ── Loading and serialization ───────────────────────────────────────

    pub fn from_json(json: &str) -> Result<Self> {
        let data: Value = serde_json::from_str(json)?;
        Self::from_value(data)
    }

    /// Load raw library data, upgrading legacy layouts first.
    pub fn from_value(mut data: Value) -> Result<Self> {
        let upgraded = upgrade_library_data(&mut data)?;
        let record: LibraryRecord = serde_json::from_value(data)?;
        let mut library = Self::from_record(record)?;
        library.upgraded = upgraded;
        Ok(library)
    }

    /// Build a library from a current-version record, validating every
    /// bit. Nothing is accepted if anything is invalid.
    pub fn from_record(record: LibraryRecord) -> Result<Self> {
        if record.version != Some(CURRENT_VERSION) {
            return Err(Error::structural(format!(
                "version {} is not the current version {}",
                record
                    .version
                    .map(|v| v.to_string())
                    .unwrap_or_else(|| "(missing)".to_string()),
                CURRENT_VERSION
            )));
        }
        let embedding_model = record.embedding_model.unwrap_or_default();
        if embedding_model != EMBEDDINGS_MODEL_ID {
            return Err(Error::structural(format!(
                "embedding model '{}' is not supported, expected '{}'",
                embedding_model, EMBEDDINGS_MODEL_ID
            )));
        }
        let omit = Omit::parse(&record.omit)?;
        let records = record
            .bits
            .ok_or_else(|| Error::structural("bits is a required field"))?;
        if omit.whole_bit() && !records.is_empty() {
            return Err(Error::structural(
                "omit is configured to omit all bits but bits were present",
            ));
        }

        let mut library = Self {
            version: CURRENT_VERSION,
            embedding_model,
            omit,
            sort: record.sort,
            reversed: record.reversed,
            seed: record.seed,
            details: record.details,
            bits: HashMap::with_capacity(records.len()),
            order: Vec::with_capacity(records.len()),
            upgraded: false,
        };
        let expected = library.expected_embedding_len();
        for rec in records {
            let bit = rec.into_bit()?;
            bit.validate(&library.omit, expected)?;
            library.check_sortable(&bit)?;
            if library.bits.contains_key(bit.id()) {
                return Err(Error::invalid_bit(bit.id(), "bit", "appears more than once"));
            }
            library.push_back(bit);
        }
        Ok(library)
    }

    /// The persisted form. Access tags are dropped unless asked for, so
    /// private partition names never leak to callers.
    pub fn serialize(&self, include_access_tag: bool) -> LibraryRecord {
        LibraryRecord {
            version: Some(self.version),
            embedding_model: Some(self.embedding_model.clone()),
            omit: self.omit.canonical(),
            sort: self.sort,
            reversed: self.reversed,
            seed: self.seed.clone(),
            details: self.details.clone(),
            bits: Some(
                self.bits()
                    .map(|bit| BitRecord::from_bit(bit, include_access_tag))
                    .collect(),
            ),
        }
    }

    pub fn to_value(&self, include_access_tag: bool) -> Result<Value> {
        Ok(serde_json::to_value(self.serialize(include_access_tag))?)
    }

    pub fn to_json(&self, include_access_tag: bool) -> Result<String> {
        Ok(serde_json::to_string(&self.serialize(include_access_tag))?)
    }

    // ── Accessors ───────────────────────────────────────────────────────

    pub fn version(&self) -> i64 {
        self.version
    }

    pub fn embedding_model(&self) -> &str {
        &self.embedding_model
    }

    /// Only [`EMBEDDINGS_MODEL_ID`] is accepted.
    pub fn set_embedding_model(&mut self, model: &str) -> Result<()> {
        if model != EMBEDDINGS_MODEL_ID {
            return Err(Error::structural(format!(
                "the only supported embedding model is {}",
                EMBEDDINGS_MODEL_ID
            )));
        }
        self.embedding_model = model.to_string();
        Ok(())
    }

    fn expected_embedding_len(&self) -> Option<usize> {
        expected_embedding_len(&self.embedding_model)
    }

    /// True if loading migrated the data from an older schema.
    pub fn upgraded(&self) -> bool {
        self.upgraded
    }

    pub fn omit(&self) -> &Omit {
        &self.omit
    }

    pub fn sort(&self) -> SortMode {
        self.sort
    }

    pub fn reversed(&self) -> bool {
        self.reversed
    }

    pub fn seed(&self) -> Option<&Seed> {
        self.seed.as_ref()
    }

    /// The query report, if this library carries one. Setting any count
    /// or the message creates it.
    pub fn details(&self) -> Option<&Details> {
        self.details.as_ref()
    }

    fn details_mut(&mut self) -> &mut Details {
        self.details.get_or_insert_with(Details::default)
    }

    pub fn count_bits(&self) -> usize {
        self.details.as_ref().map_or(0, |d| d.counts.bits)
    }

    pub fn set_count_bits(&mut self, count: usize) {
        self.details_mut().counts.bits = count;
    }

    pub fn count_restricted(&self) -> usize {
        self.details.as_ref().map_or(0, |d| d.counts.restricted)
    }

    pub fn set_count_restricted(&mut self, count: usize) {
        self.details_mut().counts.restricted = count;
    }

    pub fn message(&self) -> &str {
        self.details.as_ref().map_or("", |d| d.message.as_str())
    }

    pub fn set_message(&mut self, message: impl Into<String>) {
        self.details_mut().message = message.into();
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.bits.contains_key(id)
    }

    pub fn bit(&self, id: &str) -> Option<&Bit> {
        self.bits.get(id)
    }

    /// Bits in order.
    pub fn bits(&self) -> impl Iterator<Item = &Bit> + '_ {
        self.order.iter().filter_map(move |id| self.bits.get(id))
    }

    pub fn texts(&self) -> Vec<&str> {
        self.bits().map(Bit::text).collect()
    }

    /// The first info seen for each distinct source, in order.
    pub fn unique_infos(&self) -> Vec<&BitInfo> {
        let mut seen = HashSet::new();
        self.bits()
            .filter_map(Bit::info)
            .filter(|info| seen.insert(info.contents()))
            .collect()
    }

    pub fn stats(&self) -> LibraryStats {
        let mut access_tags = BTreeMap::new();
        for tag in self.bits().filter_map(Bit::access_tag) {
            *access_tags.entry(tag.to_string()).or_insert(0) += 1;
        }
        LibraryStats {
            bits: self.len(),
            tokens: self
                .bits()
                .filter_map(Bit::token_count)
                .fold(0usize, usize::saturating_add),
            embedded: self.bits().filter(|b| b.embedding().is_some()).count(),
            sources: self.unique_infos().len(),
            access_tags,
        }
    }

    // ── Membership ──────────────────────────────────────────────────────

    /// Insert a bit in sort order.
    ///
    /// Returns `Ok(false)` without inserting when whole bits are omitted or
    /// a bit with the same id is already present. Fails if the bit does not
    /// validate against this library.
    pub fn insert(&mut self, bit: Bit) -> Result<bool> {
        if self.omit.whole_bit() || self.bits.contains_key(bit.id()) {
            return Ok(false);
        }
        bit.validate(&self.omit, self.expected_embedding_len())?;
        self.check_sortable(&bit)?;

        let id = bit.id().to_string();
        if self.sorted_by_similarity() {
            let similarity = rank(bit.similarity());
            let bits = &self.bits;
            let before = if self.reversed {
                Ordering::Less
            } else {
                Ordering::Greater
            };
            let index = self.order.partition_point(|other| {
                similarity_of(bits, other).total_cmp(&similarity) == before
            });
            self.order.insert(index, id.clone());
        } else {
            self.order.push(id.clone());
        }
        self.bits.insert(id, bit);
        Ok(true)
    }

    /// Append without validation or reordering.
    fn push_back(&mut self, bit: Bit) {
        let id = bit.id().to_string();
        if self.bits.contains_key(&id) {
            return;
        }
        self.order.push(id.clone());
        self.bits.insert(id, bit);
    }

    /// Detach a bit, preserving the relative order of the rest.
    pub fn remove(&mut self, id: &str) -> Option<Bit> {
        let bit = self.bits.remove(id)?;
        if let Some(pos) = self.order.iter().position(|other| other == id) {
            self.order.remove(pos);
        }
        Some(bit)
    }

    /// Remove bits matching `predicate`, returning how many went.
    pub(crate) fn remove_where(&mut self, mut predicate: impl FnMut(&Bit) -> bool) -> usize {
        let bits = &mut self.bits;
        let before = self.order.len();
        self.order.retain(|id| {
            let doomed = bits.get(id.as_str()).map(&mut predicate).unwrap_or(false);
            if doomed {
                bits.remove(id.as_str());
            }
            !doomed
        });
        before - self.order.len()
    }

    pub fn delete_all_bits(&mut self) {
        self.bits.clear();
        self.order.clear();
    }

    /// Merge copies of `other`'s bits into this library.
    ///
    /// Sort mode and omit configuration are adopted from `other` only when
    /// this library has none set, so accumulating into a fresh library
    /// takes on the first source's configuration. Incoming bits are
    /// stripped to the effective omit configuration; duplicates are
    /// dropped. On error this library is left as it was.
    pub fn extend(&mut self, other: &Library) -> Result<()> {
        if other.embedding_model != self.embedding_model {
            return Err(Error::MergeIncompatibility {
                ours: self.embedding_model.clone(),
                theirs: other.embedding_model.clone(),
            });
        }

        let target_sort = if self.sort == SortMode::Any {
            other.sort
        } else {
            self.sort
        };
        let target_omit = if self.omit.is_empty() {
            other.omit.clone()
        } else {
            self.omit.clone()
        };
        let needs_similarity =
            target_sort == SortMode::Similarity && !target_omit.contains(OmitField::Similarity);

        let expected = self.expected_embedding_len();
        let mut incoming = Vec::new();
        if !target_omit.whole_bit() {
            for bit in other.bits() {
                let mut copy = bit.clone();
                copy.strip(&target_omit);
                copy.validate(&target_omit, expected)?;
                if needs_similarity && copy.similarity().is_none() {
                    return Err(missing_similarity(copy.id()));
                }
                incoming.push(copy);
            }
        }
        if needs_similarity {
            if let Some(bit) = self.bits().find(|b| b.similarity().is_none()) {
                return Err(missing_similarity(bit.id()));
            }
        }

        self.set_omit_config(target_omit);
        self.set_sort(target_sort)?;
        let mut added = 0;
        for bit in incoming {
            if self.insert(bit)? {
                added += 1;
            }
        }
        debug!(added, total = self.len(), "extended library");
        Ok(())
    }

    /// Deep, independent clone.
    pub fn copy(&self) -> Library {
        self.clone()
    }

    /// Same configuration and details, no bits.
    fn empty_like(&self) -> Library {
        Library {
            version: self.version,
            embedding_model: self.embedding_model.clone(),
            omit: self.omit.clone(),
            sort: self.sort,
            reversed: self.reversed,
            seed: self.seed.clone(),
            details: self.details.clone(),
            bits: HashMap::new(),
            order: Vec::new(),
            upgraded: false,
        }
    }

    // ── Omit ────────────────────────────────────────────────────────────

    /// Parse and apply an omit configuration, stripping existing bits.
    pub fn set_omit(&mut self, configuration: &str) -> Result<()> {
        let omit = Omit::parse(configuration)?;
        self.set_omit_config(omit);
        Ok(())
    }

    pub fn set_omit_config(&mut self, omit: Omit) {
        if omit == self.omit {
            return;
        }
        self.omit = omit;
        if self.omit.whole_bit() {
            self.delete_all_bits();
            return;
        }
        for bit in self.bits.values_mut() {
            bit.strip(&self.omit);
        }
    }

    // ── Sort ────────────────────────────────────────────────────────────

    fn sorted_by_similarity(&self) -> bool {
        self.sort == SortMode::Similarity && !self.omit.contains(OmitField::Similarity)
    }

    fn check_sortable(&self, bit: &Bit) -> Result<()> {
        if self.sorted_by_similarity() && bit.similarity().is_none() {
            return Err(missing_similarity(bit.id()));
        }
        Ok(())
    }

    fn check_similarities(&self) -> Result<()> {
        if self.omit.contains(OmitField::Similarity) {
            return Ok(());
        }
        match self.bits().find(|b| b.similarity().is_none()) {
            Some(bit) => Err(missing_similarity(bit.id())),
            None => Ok(()),
        }
    }

    pub fn set_sort(&mut self, sort: SortMode) -> Result<()> {
        if sort == self.sort {
            return Ok(());
        }
        if sort == SortMode::Similarity {
            self.check_similarities()?;
        }
        self.sort = sort;
        self.rederive_order();
        Ok(())
    }

    pub fn set_reversed(&mut self, reversed: bool) {
        if reversed == self.reversed {
            return;
        }
        self.reversed = reversed;
        match self.sort {
            SortMode::Similarity | SortMode::Random => self.rederive_order(),
            SortMode::Any | SortMode::Manual => self.order.reverse(),
        }
    }

    pub fn set_seed(&mut self, seed: Option<Seed>) {
        if seed == self.seed {
            return;
        }
        self.seed = seed;
        if self.sort == SortMode::Random {
            self.rederive_order();
        }
    }

    /// Set mode, direction, and seed together and re-derive the order once,
    /// even if nothing changed.
    pub fn apply_sort(&mut self, sort: SortMode, reversed: bool, seed: Option<Seed>) -> Result<()> {
        if sort == SortMode::Similarity {
            self.check_similarities()?;
        }
        let flipped = reversed != self.reversed;
        self.sort = sort;
        self.reversed = reversed;
        self.seed = seed;
        match sort {
            SortMode::Similarity | SortMode::Random => self.rederive_order(),
            SortMode::Any | SortMode::Manual => {
                if flipped {
                    self.order.reverse();
                }
            }
        }
        Ok(())
    }

    /// Rebuild `order` from the sort configuration. Callers check that
    /// similarities are present before switching to similarity order.
    fn rederive_order(&mut self) {
        match self.sort {
            SortMode::Similarity => {
                let bits = &self.bits;
                let reversed = self.reversed;
                self.order.sort_by(|a, b| {
                    let ord = similarity_of(bits, b).total_cmp(&similarity_of(bits, a));
                    if reversed {
                        ord.reverse()
                    } else {
                        ord
                    }
                });
            }
            SortMode::Random => {
                shuffle(&mut self.order, self.seed.as_ref());
                if self.reversed {
                    self.order.reverse();
                }
            }
            SortMode::Any | SortMode::Manual => {}
        }
        debug!(sort = %self.sort, reversed = self.reversed, bits = self.order.len(), "re-derived order");
    }

    // ── Query building blocks ───────────────────────────────────────────

    /// Score every embedded bit against `query_embedding`.
    ///
    /// Does nothing when similarities or embeddings are omitted. A library
    /// sorted by similarity is re-sorted if every bit is now scored.
    pub fn compute_similarities(&mut self, query_embedding: &[f32]) {
        if self.omit.whole_bit()
            || self.omit.contains(OmitField::Similarity)
            || self.omit.contains(OmitField::Embedding)
        {
            return;
        }
        for bit in self.bits.values_mut() {
            let score = bit
                .embedding()
                .map(|embedding| vector_similarity(query_embedding, embedding));
            if let Some(score) = score {
                bit.set_similarity(Some(score));
            }
        }
        if self.sort == SortMode::Similarity && self.check_similarities().is_ok() {
            self.rederive_order();
        }
    }

    /// Remove every bit whose access tag the token does not unlock.
    /// Untagged bits are always kept. Returns the number removed.
    pub fn delete_restricted_bits(
        &mut self,
        access_token: Option<&str>,
        policy: &AccessPolicy,
    ) -> usize {
        let visible = policy.permitted_access(access_token);
        let removed = self.remove_where(|bit| match bit.access_tag() {
            Some(tag) => !visible.contains(tag),
            None => false,
        });
        if removed > 0 {
            debug!(removed, "removed restricted bits");
        }
        removed
    }

    /// Tag every bit with `access_tag` (or clear tags with `None`).
    /// Ignored when access tags are omitted.
    pub fn assign_access_tag(&mut self, access_tag: Option<&str>) {
        if self.omit.contains(OmitField::AccessTag) {
            return;
        }
        for bit in self.bits.values_mut() {
            bit.set_access_tag(access_tag.map(str::to_string));
        }
    }

    /// A new library holding a prefix of this one's order.
    ///
    /// With [`CountType::Bit`], up to `count` bits. With
    /// [`CountType::Token`], bits are taken while their summed token counts
    /// stay within `count`; if the very first bit alone is over budget, its
    /// text is cut to `count` characters and it is returned by itself, with
    /// its token count cleared since the stored one no longer applies.
    /// A negative `count` takes everything. Non-empty input always yields
    /// at least one bit.
    pub fn slice(&self, count: i64, count_type: CountType) -> Library {
        let mut result = self.empty_like();
        let unlimited = count < 0;
        let budget = count.max(0) as usize;
        let mut tokens = 0usize;

        for (n, bit) in self.bits().enumerate() {
            match count_type {
                CountType::Bit => {
                    if !unlimited && n >= budget.max(1) {
                        break;
                    }
                }
                CountType::Token => {
                    let bit_tokens = bit.token_count().unwrap_or(0);
                    if !unlimited && tokens.saturating_add(bit_tokens) > budget {
                        if n == 0 {
                            let mut first = bit.clone();
                            let text: String = bit.text().chars().take(budget).collect();
                            first.set_text(text);
                            first.set_token_count(None);
                            result.push_back(first);
                        }
                        break;
                    }
                    tokens = tokens.saturating_add(bit_tokens);
                }
            }
            result.push_back(bit.clone());
        }
        result
    }
}

fn missing_similarity(id: &str) -> Error {
    Error::invalid_bit(id, "similarity", "is required when sorted by similarity")
}
