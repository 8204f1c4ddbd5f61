//! Error type shared by every core operation.
//!
//! Errors fall into four families:
//!
//! | Family | Variants | Raised by |
//! |--------|----------|-----------|
//! | Structural validation | [`Error::Structural`], [`Error::InvalidBit`] | load, insert, sort/omit changes |
//! | Query argument | [`Error::QueryArgument`] | [`Library::query`](crate::library::Library::query) |
//! | Merge incompatibility | [`Error::MergeIncompatibility`] | [`Library::extend`](crate::library::Library::extend) |
//! | Upgrade exhaustion | [`Error::UpgradeExhaustion`] | [`upgrade_library_data`](crate::upgrade::upgrade_library_data) |
//!
//! None of them are retried inside the core.

use thiserror::Error;

/// Result alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// A library-level field is malformed, missing, or contradicts another.
    #[error("invalid library: {0}")]
    Structural(String),

    /// A single bit failed validation against its library's configuration.
    #[error("bit {id}: {field} {reason}")]
    InvalidBit {
        id: String,
        field: &'static str,
        reason: String,
    },

    /// A query request carried an illegal parameter.
    #[error("invalid query argument: {0}")]
    QueryArgument(String),

    /// Two libraries could not be merged.
    #[error("cannot merge libraries: embedding model {theirs} does not match {ours}")]
    MergeIncompatibility { ours: String, theirs: String },

    /// The schema upgrade chain kept reporting changes without converging.
    #[error("library upgrade did not converge after {steps} steps")]
    UpgradeExhaustion { steps: usize },

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn structural(msg: impl Into<String>) -> Self {
        Error::Structural(msg.into())
    }

    pub(crate) fn query(msg: impl Into<String>) -> Self {
        Error::QueryArgument(msg.into())
    }

    pub(crate) fn invalid_bit(id: &str, field: &'static str, reason: impl Into<String>) -> Self {
        Error::InvalidBit {
            id: id.to_string(),
            field,
            reason: reason.into(),
        }
    }

    /// True for errors that reject a whole load or insert.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Error::Structural(_) | Error::InvalidBit { .. } | Error::Json(_)
        )
    }
}
