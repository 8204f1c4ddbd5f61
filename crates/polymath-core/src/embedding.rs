//! Embedding model identity, vector codec, and collaborator traits.
//!
//! Vectors travel as base64 text wrapping a packed array of little-endian
//! IEEE-754 `f32` values. The codec is lossless: decoding an encoded vector
//! reproduces every bit pattern, NaN payloads and signed zeros included.
//!
//! Providers are expected to return unit-length vectors, so similarity is a
//! plain dot product.
//!
//! Concrete providers and token counters live outside the core; the traits
//! here are the contract the ingestion pipeline consumes.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::error::{Error, Result};

/// The only embedding model a library may declare.
pub const EMBEDDINGS_MODEL_ID: &str = "openai.com:text-embedding-ada-002";

/// Returns the vector length produced by `model`, if the model is known.
pub fn expected_embedding_len(model: &str) -> Option<usize> {
    match model {
        EMBEDDINGS_MODEL_ID => Some(1536),
        _ => None,
    }
}

/// Produces embedding vectors for text.
///
/// Implementations own their transport and retry transient failures
/// themselves; the core never calls a provider.
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"openai.com:text-embedding-ada-002"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;
    /// Embeds a single text.
    fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>>;
}

/// Counts tokens the way the downstream completion model does.
pub trait TokenCounter: Send + Sync {
    fn count_tokens(&self, text: &str) -> usize;
}

/// Encode a float vector as little-endian `f32` bytes.
///
/// # Example
///
/// ```rust
/// use polymath_core::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12); // 3 × 4 bytes
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode little-endian `f32` bytes back into a float vector.
///
/// Trailing bytes that do not form a whole `f32` are ignored; callers that
/// care check the length first (see [`vector_from_base64`]).
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Encode a vector in its transport form.
pub fn vector_to_base64(vec: &[f32]) -> String {
    STANDARD.encode(vec_to_blob(vec))
}

/// Decode a vector from its transport form.
pub fn vector_from_base64(encoded: &str) -> Result<Vec<f32>> {
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|e| Error::structural(format!("embedding is not valid base64: {}", e)))?;
    if bytes.len() % 4 != 0 {
        return Err(Error::structural(format!(
            "embedding byte length {} is not a multiple of 4",
            bytes.len()
        )));
    }
    Ok(blob_to_vec(&bytes))
}

/// Similarity between two pre-normalized embeddings.
///
/// Returns `0.0` for vectors of different lengths.
pub fn vector_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_vec_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        let blob = vec_to_blob(&vec);
        let restored = blob_to_vec(&blob);
        assert_eq!(vec, restored);
    }

    #[test]
    fn test_base64_known_value() {
        // 1.0f32 is 0x3f800000, little-endian 00 00 80 3f.
        assert_eq!(vector_to_base64(&[1.0]), "AACAPw==");
        assert_eq!(vector_from_base64("AACAPw==").unwrap(), vec![1.0]);
    }

    #[test]
    fn test_base64_empty_vector() {
        assert_eq!(vector_to_base64(&[]), "");
        assert!(vector_from_base64("").unwrap().is_empty());
    }

    #[test]
    fn test_base64_rejects_partial_float() {
        // three bytes
        let err = vector_from_base64("AAAA").unwrap_err();
        assert!(err.is_structural());
    }

    #[test]
    fn test_base64_rejects_garbage() {
        assert!(vector_from_base64("not base64!!").is_err());
    }

    #[test]
    fn test_similarity_is_dot_product() {
        let a = vec![0.6, 0.8];
        let b = vec![0.8, 0.6];
        assert!((vector_similarity(&a, &b) - 0.96).abs() < 1e-6);
        assert!((vector_similarity(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_similarity_different_lengths() {
        assert_eq!(vector_similarity(&[1.0, 2.0], &[1.0]), 0.0);
    }

    #[test]
    fn test_expected_len() {
        assert_eq!(expected_embedding_len(EMBEDDINGS_MODEL_ID), Some(1536));
        assert_eq!(expected_embedding_len("other"), None);
    }

    proptest! {
        #[test]
        fn prop_base64_roundtrip_is_bit_exact(bits in proptest::collection::vec(any::<u32>(), 0..64)) {
            let v: Vec<f32> = bits.iter().map(|b| f32::from_bits(*b)).collect();
            let decoded = vector_from_base64(&vector_to_base64(&v)).unwrap();
            let decoded_bits: Vec<u32> = decoded.iter().map(|f| f.to_bits()).collect();
            prop_assert_eq!(decoded_bits, bits);
        }
    }
}
