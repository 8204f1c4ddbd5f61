//! Bits: the atomic retrievable unit of text, plus its source metadata.
//!
//! A [`Bit`] is identified by its canonical id, a SHA-256 over its source
//! URL and text with surrounding whitespace removed. The id is computed
//! lazily and cached; changing the text or the info drops the cache.
//!
//! [`BitInfo`] is owned by its bit. Mutating it through [`Bit::info_mut`]
//! is ordinary struct mutation.

use std::sync::OnceLock;

use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::omit::{Omit, OmitField};

/// Returns the canonical id for a bit of text from `url`.
///
/// # Example
///
/// ```rust
/// use polymath_core::bit::canonical_id;
///
/// let a = canonical_id("  Hello world. ", "https://example.com/a");
/// let b = canonical_id("Hello world.", " https://example.com/a\n");
/// assert_eq!(a, b);
/// assert_eq!(a.len(), 64);
/// ```
pub fn canonical_id(text: &str, url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.trim().as_bytes());
    hasher.update(b"\n");
    hasher.update(text.trim().as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Where a bit's text came from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BitInfo {
    pub url: String,
    pub image_url: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
}

impl BitInfo {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_image_url(mut self, image_url: impl Into<String>) -> Self {
        self.image_url = Some(image_url.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// All four fields joined by newlines. Two infos describe the same
    /// source exactly when their contents are equal.
    pub fn contents(&self) -> String {
        [
            self.url.as_str(),
            self.image_url.as_deref().unwrap_or(""),
            self.title.as_deref().unwrap_or(""),
            self.description.as_deref().unwrap_or(""),
        ]
        .join("\n")
    }
}

/// A fragment of text with its embedding and source metadata.
#[derive(Debug, Clone, Default)]
pub struct Bit {
    text: String,
    token_count: Option<usize>,
    embedding: Option<Vec<f32>>,
    similarity: Option<f32>,
    access_tag: Option<String>,
    info: Option<BitInfo>,
    id: OnceLock<String>,
}

impl Bit {
    pub fn new(text: impl Into<String>, info: BitInfo) -> Self {
        Self {
            text: text.into(),
            info: Some(info),
            ..Self::default()
        }
    }

    pub fn with_token_count(mut self, token_count: usize) -> Self {
        self.token_count = Some(token_count);
        self
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    pub fn with_similarity(mut self, similarity: f32) -> Self {
        self.similarity = Some(similarity);
        self
    }

    pub fn with_access_tag(mut self, access_tag: impl Into<String>) -> Self {
        self.access_tag = Some(access_tag.into());
        self
    }

    pub fn id(&self) -> &str {
        self.id.get_or_init(|| canonical_id(&self.text, self.url()))
    }

    /// The source URL, or `""` when info is absent.
    pub fn url(&self) -> &str {
        self.info.as_ref().map(|i| i.url.as_str()).unwrap_or("")
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        let text = text.into();
        if text == self.text {
            return;
        }
        self.text = text;
        self.id = OnceLock::new();
    }

    pub fn token_count(&self) -> Option<usize> {
        self.token_count
    }

    pub fn set_token_count(&mut self, token_count: Option<usize>) {
        self.token_count = token_count;
    }

    pub fn embedding(&self) -> Option<&[f32]> {
        self.embedding.as_deref()
    }

    pub fn set_embedding(&mut self, embedding: Option<Vec<f32>>) {
        self.embedding = embedding;
    }

    pub fn similarity(&self) -> Option<f32> {
        self.similarity
    }

    pub fn set_similarity(&mut self, similarity: Option<f32>) {
        self.similarity = similarity;
    }

    pub fn access_tag(&self) -> Option<&str> {
        self.access_tag.as_deref()
    }

    pub fn set_access_tag(&mut self, access_tag: Option<String>) {
        self.access_tag = access_tag;
    }

    pub fn info(&self) -> Option<&BitInfo> {
        self.info.as_ref()
    }

    /// Mutable access to the info, creating an empty one if absent.
    ///
    /// The cached id is dropped since the url may change.
    pub fn info_mut(&mut self) -> &mut BitInfo {
        self.id = OnceLock::new();
        self.info.get_or_insert_with(BitInfo::default)
    }

    pub fn set_info(&mut self, info: Option<BitInfo>) {
        self.info = info;
        self.id = OnceLock::new();
    }

    /// Whether the omittable `field` currently holds a value.
    pub fn has_field(&self, field: OmitField) -> bool {
        match field {
            OmitField::Similarity => self.similarity.is_some(),
            OmitField::Embedding => self.embedding.is_some(),
            OmitField::TokenCount => self.token_count.is_some(),
            OmitField::Info => self.info.is_some(),
            OmitField::AccessTag => self.access_tag.is_some(),
        }
    }

    /// Check this bit against a library's omission configuration and
    /// expected embedding length.
    ///
    /// Unset `embedding` and `token_count` are valid: ingestion leaves them
    /// empty when a provider gives up.
    pub fn validate(&self, omit: &Omit, expected_embedding_len: Option<usize>) -> Result<()> {
        if omit.whole_bit() {
            return Err(Error::invalid_bit(
                self.id(),
                "bit",
                "is present but whole bits are omitted",
            ));
        }
        for field in omit.fields() {
            if self.has_field(field) {
                return Err(Error::invalid_bit(
                    self.id(),
                    field.name(),
                    "expected to be omitted but was included",
                ));
            }
        }
        if let (Some(embedding), Some(expected)) = (&self.embedding, expected_embedding_len) {
            if embedding.len() != expected {
                return Err(Error::invalid_bit(
                    self.id(),
                    "embedding",
                    format!("has length {} but expected {}", embedding.len(), expected),
                ));
            }
        }
        if !omit.contains(OmitField::Info) && self.info.is_none() {
            return Err(Error::invalid_bit(self.id(), "info", "is missing"));
        }
        Ok(())
    }

    /// Remove every field `omit` excludes. Under whole-bit omission the
    /// entire payload is cleared.
    ///
    /// The id is resolved first, so a stripped bit keeps the identity it
    /// had in its library.
    pub fn strip(&mut self, omit: &Omit) {
        let _ = self.id();
        if omit.whole_bit() {
            self.text.clear();
            self.token_count = None;
            self.embedding = None;
            self.similarity = None;
            self.access_tag = None;
            self.info = None;
            return;
        }
        for field in omit.fields() {
            match field {
                OmitField::Similarity => self.similarity = None,
                OmitField::Embedding => self.embedding = None,
                OmitField::TokenCount => self.token_count = None,
                OmitField::Info => self.info = None,
                OmitField::AccessTag => self.access_tag = None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample() -> Bit {
        Bit::new("Some text", BitInfo::new("https://example.com").with_title("Example"))
            .with_token_count(3)
            .with_embedding(vec![0.0, 1.0])
    }

    #[test]
    fn test_id_is_sha256_of_url_and_text() {
        let bit = sample();
        assert_eq!(bit.id(), canonical_id("Some text", "https://example.com"));
        assert_eq!(bit.id().len(), 64);
    }

    #[test]
    fn test_set_text_invalidates_id() {
        let mut bit = sample();
        let before = bit.id().to_string();
        bit.set_text("Other text");
        assert_ne!(bit.id(), before);
        assert_eq!(bit.id(), canonical_id("Other text", "https://example.com"));
    }

    #[test]
    fn test_info_mut_invalidates_id() {
        let mut bit = sample();
        let before = bit.id().to_string();
        bit.info_mut().url = "https://example.org".to_string();
        assert_ne!(bit.id(), before);
        assert_eq!(bit.url(), "https://example.org");
    }

    #[test]
    fn test_contents_joins_all_fields() {
        let info = BitInfo::new("u").with_title("t").with_description("d");
        assert_eq!(info.contents(), "u\n\nt\nd");
    }

    #[test]
    fn test_validate_ok() {
        sample().validate(&Omit::none(), Some(2)).unwrap();
    }

    #[test]
    fn test_validate_wrong_embedding_length() {
        let err = sample().validate(&Omit::none(), Some(1536)).unwrap_err();
        match err {
            Error::InvalidBit { field, .. } => assert_eq!(field, "embedding"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_validate_field_that_should_be_omitted() {
        let omit = Omit::parse("token_count").unwrap();
        let err = sample().validate(&omit, Some(2)).unwrap_err();
        assert!(err.to_string().contains("token_count"));
        assert!(err.to_string().contains(sample().id()));
    }

    #[test]
    fn test_validate_missing_info() {
        let mut bit = sample();
        bit.set_info(None);
        assert!(bit.validate(&Omit::none(), None).is_err());
        bit.validate(&Omit::parse("info").unwrap(), None).unwrap();
    }

    #[test]
    fn test_unset_embedding_is_valid() {
        let bit = Bit::new("x", BitInfo::new("u"));
        bit.validate(&Omit::none(), Some(1536)).unwrap();
    }

    #[test]
    fn test_strip_keeps_id() {
        let mut bit = sample().with_similarity(0.5);
        let id = bit.id().to_string();
        bit.strip(&Omit::parse("info,similarity,embedding").unwrap());
        assert_eq!(bit.id(), id);
        assert!(bit.info().is_none());
        assert!(bit.similarity().is_none());
        assert!(bit.embedding().is_none());
        assert_eq!(bit.token_count(), Some(3));
    }

    #[test]
    fn test_strip_whole_bit() {
        let mut bit = sample();
        bit.strip(&Omit::everything());
        assert_eq!(bit.text(), "");
        assert!(OmitField::ALL.iter().all(|f| !bit.has_field(*f)));
    }

    proptest! {
        #[test]
        fn prop_canonical_id_ignores_surrounding_whitespace(
            text in "[a-zA-Z0-9 .,]{0,40}",
            url in "[a-z:/.]{0,30}",
            pad_a in "[ \t\n]{0,3}",
            pad_b in "[ \t\n]{0,3}",
        ) {
            let plain = canonical_id(&text, &url);
            let padded = canonical_id(&format!("{}{}{}", pad_a, text, pad_b), &format!("{}{}{}", pad_b, url, pad_a));
            prop_assert_eq!(&plain, &padded);
            prop_assert_eq!(plain, canonical_id(&text, &url));
        }
    }
}
