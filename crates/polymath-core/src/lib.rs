//! # Polymath Core
//!
//! Data model and query engine for Polymath libraries: ordered collections
//! of text fragments ("bits") with embeddings and source metadata, answered
//! by similarity-ranked, access-filtered, token-budgeted queries.
//!
//! This crate does no filesystem or network I/O. Loading files, fetching
//! embeddings, and serving requests belong to the host.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`bit`] | Bits, source info, canonical ids |
//! | [`embedding`] | Vector codec, similarity, provider traits |
//! | [`omit`] | Field omission configuration |
//! | [`sort`] | Sort modes and shuffle seeds |
//! | [`record`] | Persisted/wire document types |
//! | [`upgrade`] | Schema upgrade chain |
//! | [`access`] | Access policy and token resolution |
//! | [`library`] | The library container |
//! | [`query`] | Query pipeline |
//! | [`error`] | Error type |
//!
//! ## Example
//!
//! ```rust
//! use polymath_core::{AccessPolicy, Bit, BitInfo, Library, QueryArgs};
//!
//! let mut library = Library::new();
//! library
//!     .insert(Bit::new("Hello world.", BitInfo::new("https://example.com")).with_token_count(3))
//!     .unwrap();
//!
//! let result = library.query(&QueryArgs::new(100), &AccessPolicy::default()).unwrap();
//! assert_eq!(result.count_bits(), 1);
//! ```

pub mod access;
pub mod bit;
pub mod embedding;
pub mod error;
pub mod library;
pub mod omit;
pub mod query;
pub mod record;
pub mod sort;
pub mod upgrade;

pub use access::{AccessPolicy, Disclosure, TokenRecord, DEFAULT_PRIVATE_ACCESS_TAG};
pub use bit::{canonical_id, Bit, BitInfo};
pub use embedding::{EmbeddingProvider, TokenCounter, EMBEDDINGS_MODEL_ID};
pub use error::{Error, Result};
pub use library::{CountType, Library, LibraryStats};
pub use omit::{Omit, OmitField};
pub use query::QueryArgs;
pub use sort::{Seed, SortMode};
pub use upgrade::CURRENT_VERSION;
