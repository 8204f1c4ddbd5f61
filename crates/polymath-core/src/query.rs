//! Query pipeline.
//!
//! A query never touches the library it is run against. It works on a
//! copy through these stages:
//!
//! ```text
//! validate ─► copy ─► score ─► order ─► restrict ─► slice ─► report ─► omit
//! ```
//!
//! The result is a self-contained library, ready to serialize as the
//! response. Embeddings are omitted unless the caller asks otherwise.

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::access::AccessPolicy;
use crate::embedding::{expected_embedding_len, vector_from_base64};
use crate::error::{Error, Result};
use crate::library::{CountType, Library};
use crate::omit::{Omit, OmitField};
use crate::sort::{Seed, SortMode};
use crate::upgrade::CURRENT_VERSION;

/// Prefix for the disclosure message attached when bits were withheld.
pub const RESTRICTED_MESSAGE_PREFIX: &str = "Restricted results were omitted. ";

fn default_omit() -> String {
    OmitField::Embedding.name().to_string()
}

/// Query request parameters, as they arrive on the wire.
#[derive(Debug, Clone, Deserialize)]
pub struct QueryArgs {
    /// Protocol version the caller speaks.
    pub version: i64,
    /// Base64 little-endian `f32`s.
    #[serde(default)]
    pub query_embedding: Option<String>,
    #[serde(default)]
    pub query_embedding_model: Option<String>,
    /// Budget in `count_type` units; negative means no limit.
    pub count: i64,
    #[serde(default)]
    pub count_type: CountType,
    /// Defaults to `similarity` with an embedding, `any` without.
    #[serde(default)]
    pub sort: Option<SortMode>,
    #[serde(default)]
    pub sort_reversed: bool,
    #[serde(default)]
    pub seed: Option<Seed>,
    #[serde(default = "default_omit")]
    pub omit: String,
    #[serde(default)]
    pub access_token: Option<String>,
}

impl QueryArgs {
    /// Arguments for an unranked query of `count` tokens.
    pub fn new(count: i64) -> Self {
        Self {
            version: CURRENT_VERSION,
            query_embedding: None,
            query_embedding_model: None,
            count,
            count_type: CountType::Token,
            sort: None,
            sort_reversed: false,
            seed: None,
            omit: default_omit(),
            access_token: None,
        }
    }

    /// Parse wire parameters. Malformed input is a query argument error.
    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| Error::query(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::query(e.to_string()))
    }
}

/// Arguments after validation against a particular library.
struct Plan {
    embedding: Option<Vec<f32>>,
    sort: SortMode,
    omit: Omit,
}

fn validate_args(library: &Library, args: &QueryArgs) -> Result<Plan> {
    if args.version < CURRENT_VERSION {
        return Err(Error::query(format!(
            "version {} is older than the required version {}",
            args.version, CURRENT_VERSION
        )));
    }
    if args.count == 0 {
        return Err(Error::query("count must not be zero"));
    }

    let embedding = match args.query_embedding.as_deref() {
        None | Some("") => None,
        Some(encoded) => {
            let model = args.query_embedding_model.as_deref().unwrap_or("");
            if model != library.embedding_model() {
                return Err(Error::query(format!(
                    "query_embedding_model '{}' does not match '{}'",
                    model,
                    library.embedding_model()
                )));
            }
            let vector = vector_from_base64(encoded)
                .map_err(|e| Error::query(format!("query_embedding: {}", e)))?;
            if let Some(expected) = expected_embedding_len(model) {
                if vector.len() != expected {
                    return Err(Error::query(format!(
                        "query_embedding has length {} but expected {}",
                        vector.len(),
                        expected
                    )));
                }
            }
            if let Some(index) = vector.iter().position(|x| !x.is_finite()) {
                return Err(Error::query(format!(
                    "query_embedding component {} is not finite",
                    index
                )));
            }
            Some(vector)
        }
    };

    let sort = match args.sort {
        Some(sort) => sort,
        None if embedding.is_some() => SortMode::Similarity,
        None => SortMode::Any,
    };
    if !sort.is_queryable() {
        return Err(Error::query(format!("sort '{}' cannot be requested", sort)));
    }
    if sort == SortMode::Similarity {
        if embedding.is_none() {
            return Err(Error::query("sort 'similarity' requires a query_embedding"));
        }
        let omit = library.omit();
        if omit.contains(OmitField::Embedding) || omit.contains(OmitField::Similarity) {
            return Err(Error::query(
                "sort 'similarity' is unavailable: the library does not carry embeddings",
            ));
        }
    }

    let omit = Omit::parse(&args.omit).map_err(|e| Error::query(e.to_string()))?;
    Ok(Plan {
        embedding,
        sort,
        omit,
    })
}

impl Library {
    /// Run a query against a copy of this library.
    ///
    /// Bits the caller's token does not unlock are removed before slicing,
    /// so they never count against the budget. Under similarity ordering,
    /// bits without an embedding cannot be ranked and are left out.
    pub fn query(&self, args: &QueryArgs, policy: &AccessPolicy) -> Result<Library> {
        let plan = validate_args(self, args)?;

        let mut working = self.copy();
        if let Some(embedding) = &plan.embedding {
            if plan.sort == SortMode::Similarity {
                let unranked = working.remove_where(|bit| bit.embedding().is_none());
                if unranked > 0 {
                    debug!(unranked, "left out bits without embeddings");
                }
            }
            working.compute_similarities(embedding);
        }
        working.apply_sort(plan.sort, args.sort_reversed, args.seed.clone())?;

        let restricted = working.delete_restricted_bits(args.access_token.as_deref(), policy);

        let mut result = working.slice(args.count, args.count_type);
        result.set_count_bits(result.len());
        result.set_count_restricted(if policy.restricted.count { restricted } else { 0 });
        if restricted > 0 && !policy.restricted.message.is_empty() {
            result.set_message(format!(
                "{}{}",
                RESTRICTED_MESSAGE_PREFIX, policy.restricted.message
            ));
        } else {
            result.set_message(String::new());
        }
        result.set_omit_config(plan.omit);

        info!(
            bits = result.len(),
            restricted,
            sort = %plan.sort,
            "query answered"
        );
        Ok(result)
    }
}
