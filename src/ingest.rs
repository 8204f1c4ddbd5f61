//! Ingestion pipeline.
//!
//! Turns importer output into a library: each `(text, info)` item is
//! token-counted, embedded, and inserted as a bit. Embedding calls are
//! retried with a fixed delay. If a provider keeps failing the bit is kept
//! without an embedding, so one bad item never sinks a whole import.
//!
//! Importers for specific sources (blogs, archives, wikis) live with the
//! host; this module only consumes their output.

use anyhow::{bail, Result};
use polymath_core::embedding::expected_embedding_len;
use polymath_core::{Bit, BitInfo, EmbeddingProvider, Library, TokenCounter, EMBEDDINGS_MODEL_ID};
use std::time::Duration;
use tracing::{info, warn};

use crate::config::IngestConfig;

/// One piece of content produced by an importer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportedItem {
    pub text: String,
    pub info: BitInfo,
}

impl ImportedItem {
    pub fn new(text: impl Into<String>, info: BitInfo) -> Self {
        Self {
            text: text.into(),
            info,
        }
    }
}

/// A source of content to ingest.
pub trait Importer {
    /// Short name used in logs (e.g. `"rss"`).
    fn name(&self) -> &str;
    fn scan(&self) -> Result<Vec<ImportedItem>>;
}

/// Retry policy for embedding calls.
#[derive(Debug, Clone, Copy)]
pub struct IngestSettings {
    /// Total attempts per item, including the first.
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl From<&IngestConfig> for IngestSettings {
    fn from(config: &IngestConfig) -> Self {
        Self {
            max_retries: config.max_retries.max(1),
            retry_delay: config.retry_delay(),
        }
    }
}

/// Import everything `importer` yields into a new library.
///
/// Fails up front if the provider's model is not the one libraries use.
/// Items that repeat an earlier bit are dropped.
pub fn ingest(
    importer: &dyn Importer,
    provider: &dyn EmbeddingProvider,
    counter: &dyn TokenCounter,
    settings: &IngestSettings,
) -> Result<Library> {
    if provider.model_name() != EMBEDDINGS_MODEL_ID {
        bail!(
            "Embedding provider model '{}' does not match library model '{}'",
            provider.model_name(),
            EMBEDDINGS_MODEL_ID
        );
    }
    if let Some(expected) = expected_embedding_len(EMBEDDINGS_MODEL_ID) {
        if provider.dims() != expected {
            bail!(
                "Embedding provider dims {} do not match the expected {}",
                provider.dims(),
                expected
            );
        }
    }

    let items = importer.scan()?;
    let total = items.len();
    let mut library = Library::new();
    let mut unembedded = 0usize;

    for item in items {
        let token_count = counter.count_tokens(&item.text);
        let embedding = embed_with_retry(provider, &item.text, settings);
        if embedding.is_none() {
            unembedded += 1;
        }

        let mut bit = Bit::new(item.text, item.info).with_token_count(token_count);
        bit.set_embedding(embedding);
        library.insert(bit)?;
    }

    info!(
        importer = importer.name(),
        items = total,
        bits = library.len(),
        unembedded,
        "ingested"
    );
    Ok(library)
}

/// Ask the provider up to `max_retries` times. `None` once attempts run out
/// or if the provider returns a vector of the wrong length.
fn embed_with_retry(
    provider: &dyn EmbeddingProvider,
    text: &str,
    settings: &IngestSettings,
) -> Option<Vec<f32>> {
    let attempts = settings.max_retries.max(1);
    for attempt in 1..=attempts {
        match provider.embed(text) {
            Ok(vector) if vector.len() == provider.dims() => return Some(vector),
            Ok(vector) => {
                warn!(
                    len = vector.len(),
                    dims = provider.dims(),
                    "provider returned a vector of the wrong length"
                );
                return None;
            }
            Err(e) => {
                warn!(attempt, attempts, error = %e, "embedding failed");
                if attempt < attempts {
                    std::thread::sleep(settings.retry_delay);
                }
            }
        }
    }
    warn!(attempts, "giving up on embedding; bit stored without one");
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const DIMS: usize = 1536;

    struct FixedImporter(Vec<ImportedItem>);

    impl Importer for FixedImporter {
        fn name(&self) -> &str {
            "fixed"
        }
        fn scan(&self) -> Result<Vec<ImportedItem>> {
            Ok(self.0.clone())
        }
    }

    /// Fails the first `failures` calls, then succeeds.
    struct FlakyProvider {
        failures: usize,
        calls: AtomicUsize,
        model: &'static str,
    }

    impl FlakyProvider {
        fn new(failures: usize) -> Self {
            Self {
                failures,
                calls: AtomicUsize::new(0),
                model: EMBEDDINGS_MODEL_ID,
            }
        }
    }

    impl EmbeddingProvider for FlakyProvider {
        fn model_name(&self) -> &str {
            self.model
        }
        fn dims(&self) -> usize {
            DIMS
        }
        fn embed(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                bail!("provider unavailable");
            }
            let mut v = vec![0.0; DIMS];
            v[0] = 1.0;
            Ok(v)
        }
    }

    struct WordCounter;

    impl TokenCounter for WordCounter {
        fn count_tokens(&self, text: &str) -> usize {
            text.split_whitespace().count()
        }
    }

    fn settings(max_retries: u32) -> IngestSettings {
        IngestSettings {
            max_retries,
            retry_delay: Duration::ZERO,
        }
    }

    fn items() -> FixedImporter {
        FixedImporter(vec![
            ImportedItem::new("one two three", BitInfo::new("https://example.com/a")),
            ImportedItem::new("four five", BitInfo::new("https://example.com/b")),
            ImportedItem::new("one two three", BitInfo::new("https://example.com/a")),
        ])
    }

    #[test]
    fn test_ingest_counts_embeds_and_dedupes() {
        let provider = FlakyProvider::new(0);
        let lib = ingest(&items(), &provider, &WordCounter, &settings(3)).unwrap();
        assert_eq!(lib.len(), 2);
        let first = lib.bits().next().unwrap();
        assert_eq!(first.token_count(), Some(3));
        assert_eq!(first.embedding().map(|e| e.len()), Some(DIMS));
    }

    #[test]
    fn test_transient_failures_are_retried() {
        let provider = FlakyProvider::new(2);
        let lib = ingest(&items(), &provider, &WordCounter, &settings(3)).unwrap();
        assert!(lib.bits().all(|b| b.embedding().is_some()));
    }

    #[test]
    fn test_exhausted_retries_leave_embedding_unset() {
        let provider = FlakyProvider::new(usize::MAX);
        let lib = ingest(&items(), &provider, &WordCounter, &settings(2)).unwrap();
        assert_eq!(lib.len(), 2);
        assert!(lib.bits().all(|b| b.embedding().is_none()));
        assert!(lib.bits().all(|b| b.token_count().is_some()));
        // Three items, two attempts each. The duplicate is embedded before it is dropped.
        assert_eq!(provider.calls.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn test_wrong_model_rejected() {
        let mut provider = FlakyProvider::new(0);
        provider.model = "example.com:other";
        let err = ingest(&items(), &provider, &WordCounter, &settings(1)).unwrap_err();
        assert!(err.to_string().contains("does not match"));
    }

    #[test]
    fn test_settings_from_config() {
        let config = IngestConfig::default();
        let s = IngestSettings::from(&config);
        assert_eq!(s.max_retries, 10);
        assert_eq!(s.retry_delay, Duration::from_secs(20));
    }
}
