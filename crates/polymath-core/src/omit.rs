//! Field-omission configuration.
//!
//! A library's `omit` setting is a comma-separated list of bit field names
//! to leave out of every bit, or one of two sentinels:
//!
//! - `""` omits nothing.
//! - `"*"` omits whole bits; a library configured this way holds no bits.
//!
//! Sentinels must appear alone. Parsing canonicalizes the list (duplicates
//! removed, fields in declaration order of [`OmitField`]), so two spellings
//! of the same configuration compare equal.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// A bit field that may be omitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OmitField {
    Similarity,
    Embedding,
    TokenCount,
    Info,
    AccessTag,
}

impl OmitField {
    pub const ALL: [OmitField; 5] = [
        OmitField::Similarity,
        OmitField::Embedding,
        OmitField::TokenCount,
        OmitField::Info,
        OmitField::AccessTag,
    ];

    /// The field's name in the persisted record.
    pub fn name(self) -> &'static str {
        match self {
            OmitField::Similarity => "similarity",
            OmitField::Embedding => "embedding",
            OmitField::TokenCount => "token_count",
            OmitField::Info => "info",
            OmitField::AccessTag => "access_tag",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        OmitField::ALL.into_iter().find(|f| f.name() == name)
    }
}

/// Canonicalized omission configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Omit {
    whole_bit: bool,
    fields: BTreeSet<OmitField>,
}

impl Omit {
    /// Omit nothing.
    pub fn none() -> Self {
        Self::default()
    }

    /// Omit whole bits.
    pub fn everything() -> Self {
        Self {
            whole_bit: true,
            fields: BTreeSet::new(),
        }
    }

    /// Parse a comma-separated configuration.
    pub fn parse(configuration: &str) -> Result<Self> {
        let items: Vec<&str> = configuration.split(',').map(str::trim).collect();
        let mut omit = Omit::none();
        for item in &items {
            match *item {
                "" | "*" if items.len() != 1 => {
                    return Err(Error::structural(format!(
                        "omit '{}' must be the only item, got '{}'",
                        item, configuration
                    )));
                }
                "" => {}
                "*" => omit.whole_bit = true,
                name => {
                    let field = OmitField::from_name(name).ok_or_else(|| {
                        Error::structural(format!("illegal omit key: '{}'", name))
                    })?;
                    omit.fields.insert(field);
                }
            }
        }
        Ok(omit)
    }

    pub fn whole_bit(&self) -> bool {
        self.whole_bit
    }

    pub fn fields(&self) -> impl Iterator<Item = OmitField> + '_ {
        self.fields.iter().copied()
    }

    pub fn contains(&self, field: OmitField) -> bool {
        self.fields.contains(&field)
    }

    /// True when the configuration omits nothing at all.
    pub fn is_empty(&self) -> bool {
        !self.whole_bit && self.fields.is_empty()
    }

    /// The canonical string form, as persisted.
    pub fn canonical(&self) -> String {
        if self.whole_bit {
            return "*".to_string();
        }
        self.fields
            .iter()
            .map(|f| f.name())
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl FromStr for Omit {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Omit::parse(s)
    }
}

impl fmt::Display for Omit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_omits_nothing() {
        let omit = Omit::parse("").unwrap();
        assert!(omit.is_empty());
        assert!(!omit.whole_bit());
        assert_eq!(omit.canonical(), "");
    }

    #[test]
    fn test_star_omits_whole_bit() {
        let omit = Omit::parse("*").unwrap();
        assert!(omit.whole_bit());
        assert_eq!(omit.canonical(), "*");
        assert_eq!(omit, Omit::everything());
    }

    #[test]
    fn test_fields_are_canonicalized() {
        let a = Omit::parse("info,embedding,embedding").unwrap();
        let b = Omit::parse("embedding, info").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.canonical(), "embedding,info");
        assert!(a.contains(OmitField::Info));
        assert!(!a.contains(OmitField::Similarity));
    }

    #[test]
    fn test_sentinels_must_be_alone() {
        assert!(Omit::parse("*,embedding").is_err());
        assert!(Omit::parse("embedding,,info").is_err());
        assert!(Omit::parse(",").is_err());
    }

    #[test]
    fn test_illegal_key() {
        let err = Omit::parse("text").unwrap_err();
        assert!(err.to_string().contains("illegal omit key"));
        assert!(Omit::parse("Embedding").is_err());
    }

    #[test]
    fn test_display_matches_canonical() {
        let omit: Omit = "access_tag,similarity".parse().unwrap();
        assert_eq!(omit.to_string(), "similarity,access_tag");
    }
}
