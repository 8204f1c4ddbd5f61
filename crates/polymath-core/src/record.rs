//! Persisted and wire document types.
//!
//! These mirror the JSON layout exactly and exist only at the edge:
//! [`Library`](crate::library::Library) converts to and from them when
//! loading, saving, or answering a query.
//!
//! ```json
//! {
//!   "version": 1,
//!   "embedding_model": "openai.com:text-embedding-ada-002",
//!   "omit": "embedding",
//!   "sort": "similarity",
//!   "details": {"counts": {"bits": 2, "restricted": 1}, "message": "..."},
//!   "bits": [{"text": "...", "token_count": 12, "similarity": 0.82,
//!             "info": {"url": "https://..."}}]
//! }
//! ```

use serde::{Deserialize, Serialize};

use crate::bit::{canonical_id, Bit, BitInfo};
use crate::embedding::{vector_from_base64, vector_to_base64};
use crate::error::{Error, Result};
use crate::sort::{Seed, SortMode};

/// Top-level library document (current schema).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LibraryRecord {
    #[serde(default)]
    pub version: Option<i64>,
    #[serde(default)]
    pub embedding_model: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub omit: String,
    #[serde(default, skip_serializing_if = "is_any")]
    pub sort: SortMode,
    #[serde(default, skip_serializing_if = "is_false")]
    pub reversed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<Seed>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Details>,
    #[serde(default)]
    pub bits: Option<Vec<BitRecord>>,
}

fn is_any(sort: &SortMode) -> bool {
    *sort == SortMode::Any
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// Aggregate report attached to query results. Counts are always
/// written, zero or not.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Details {
    #[serde(default)]
    pub counts: Counts,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counts {
    #[serde(default)]
    pub bits: usize,
    #[serde(default)]
    pub restricted: usize,
}

/// One bit as persisted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BitRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Negative values mean "unset".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_count: Option<i64>,
    /// Base64 of little-endian `f32`s.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<BitInfoRecord>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BitInfoRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl BitRecord {
    /// Build the in-memory bit. Fails on a missing text, a missing info
    /// url, or an undecodable embedding.
    pub fn into_bit(self) -> Result<Bit> {
        let url = self
            .info
            .as_ref()
            .and_then(|i| i.url.clone())
            .unwrap_or_default();
        let text = match self.text {
            Some(text) => text,
            None => {
                return Err(Error::invalid_bit(
                    &canonical_id("", &url),
                    "text",
                    "is missing",
                ))
            }
        };
        let id = canonical_id(&text, &url);

        let info = match self.info {
            Some(info) => {
                let url = info.url.ok_or_else(|| {
                    Error::invalid_bit(&id, "info", "is missing required url")
                })?;
                Some(BitInfo {
                    url,
                    image_url: info.image_url,
                    title: info.title,
                    description: info.description,
                })
            }
            None => None,
        };

        let embedding = match self.embedding.as_deref() {
            None | Some("") => None,
            Some(encoded) => Some(
                vector_from_base64(encoded)
                    .map_err(|e| Error::invalid_bit(&id, "embedding", e.to_string()))?,
            ),
        };

        let mut bit = Bit::new(text, BitInfo::default());
        bit.set_info(info);
        bit.set_token_count(self.token_count.filter(|n| *n >= 0).map(|n| n as usize));
        bit.set_embedding(embedding);
        bit.set_similarity(self.similarity);
        bit.set_access_tag(self.access_tag);
        Ok(bit)
    }

    pub fn from_bit(bit: &Bit, include_access_tag: bool) -> Self {
        Self {
            text: Some(bit.text().to_string()),
            token_count: bit.token_count().map(|n| n as i64),
            embedding: bit.embedding().map(vector_to_base64),
            similarity: bit.similarity(),
            access_tag: if include_access_tag {
                bit.access_tag().map(str::to_string)
            } else {
                None
            },
            info: bit.info().map(|info| BitInfoRecord {
                url: Some(info.url.clone()),
                image_url: info.image_url.clone(),
                title: info.title.clone(),
                description: info.description.clone(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negative_token_count_is_unset() {
        let rec = BitRecord {
            text: Some("t".into()),
            token_count: Some(-1),
            info: Some(BitInfoRecord {
                url: Some("u".into()),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(rec.into_bit().unwrap().token_count(), None);
    }

    #[test]
    fn test_missing_text_rejected() {
        let rec = BitRecord::default();
        match rec.into_bit().unwrap_err() {
            Error::InvalidBit { field, .. } => assert_eq!(field, "text"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_info_without_url_rejected() {
        let rec = BitRecord {
            text: Some("t".into()),
            info: Some(BitInfoRecord::default()),
            ..Default::default()
        };
        let err = rec.into_bit().unwrap_err();
        assert!(err.to_string().contains("required url"));
    }

    #[test]
    fn test_bad_embedding_names_bit() {
        let rec = BitRecord {
            text: Some("t".into()),
            embedding: Some("AAAA".into()),
            info: Some(BitInfoRecord {
                url: Some("u".into()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let err = rec.into_bit().unwrap_err();
        assert!(err.to_string().contains(&canonical_id("t", "u")));
    }

    #[test]
    fn test_access_tag_dropped_unless_requested() {
        let bit = Bit::new("t", BitInfo::new("u")).with_access_tag("secret");
        assert!(BitRecord::from_bit(&bit, false).access_tag.is_none());
        assert_eq!(
            BitRecord::from_bit(&bit, true).access_tag.as_deref(),
            Some("secret")
        );
    }

    #[test]
    fn test_default_fields_not_serialized() {
        let rec = LibraryRecord {
            version: Some(1),
            embedding_model: Some("m".into()),
            bits: Some(vec![]),
            ..Default::default()
        };
        let json = serde_json::to_value(&rec).unwrap();
        let obj = json.as_object().unwrap();
        assert!(!obj.contains_key("sort"));
        assert!(!obj.contains_key("omit"));
        assert!(!obj.contains_key("details"));
        assert!(obj.contains_key("bits"));
    }

    #[test]
    fn test_zero_counts_still_serialized() {
        let rec = LibraryRecord {
            details: Some(Details::default()),
            ..Default::default()
        };
        let json = serde_json::to_value(&rec).unwrap();
        assert_eq!(
            json["details"],
            serde_json::json!({"counts": {"bits": 0, "restricted": 0}})
        );
    }
}
