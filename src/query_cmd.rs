//! `polymath query`: run the query pipeline over the configured libraries.
//!
//! Arguments come either from a JSON document in the wire format (`--args`,
//! with `-` for stdin) or from individual flags. The result library is
//! printed to stdout as JSON.

use anyhow::{Context, Result};
use polymath_core::{CountType, QueryArgs, Seed, SortMode, EMBEDDINGS_MODEL_ID};
use std::io::Read;
use std::path::Path;
use tracing::info;

use crate::config::Config;
use crate::load::load_libraries;

/// Query parameters given as command-line flags.
#[derive(Debug, Clone, Default)]
pub struct QueryFlags {
    pub count: i64,
    pub count_type: Option<String>,
    pub sort: Option<String>,
    pub reversed: bool,
    pub seed: Option<String>,
    pub omit: Option<String>,
    pub access_token: Option<String>,
    pub query_embedding: Option<String>,
}

impl QueryFlags {
    pub fn into_args(self) -> Result<QueryArgs> {
        let mut args = QueryArgs::new(self.count);
        if let Some(count_type) = self.count_type {
            args.count_type = count_type.parse::<CountType>()?;
        }
        if let Some(sort) = self.sort {
            args.sort = Some(sort.parse::<SortMode>()?);
        }
        args.sort_reversed = self.reversed;
        args.seed = self.seed.map(|s| match s.parse::<i64>() {
            Ok(n) => Seed::Number(n),
            Err(_) => Seed::Text(s),
        });
        if let Some(omit) = self.omit {
            args.omit = omit;
        }
        args.access_token = self.access_token;
        if self.query_embedding.is_some() {
            args.query_embedding = self.query_embedding;
            args.query_embedding_model = Some(EMBEDDINGS_MODEL_ID.to_string());
        }
        Ok(args)
    }
}

/// Read wire-format arguments from a file, or stdin for `-`.
pub fn read_args(path: &Path) -> Result<QueryArgs> {
    let content = if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read query arguments from stdin")?;
        buf
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read query arguments: {}", path.display()))?
    };
    Ok(QueryArgs::from_json(&content)?)
}

pub fn run_query(config: &Config, args: &QueryArgs) -> Result<()> {
    let library = load_libraries(config)?;
    info!(bits = library.len(), "libraries loaded");

    let result = library.query(args, &config.access)?;
    let json = serde_json::to_string_pretty(&result.serialize(false))?;
    println!("{}", json);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_into_args() {
        let args = QueryFlags {
            count: 3,
            count_type: Some("bit".into()),
            sort: Some("random".into()),
            seed: Some("42".into()),
            ..Default::default()
        }
        .into_args()
        .unwrap();
        assert_eq!(args.count, 3);
        assert_eq!(args.count_type, CountType::Bit);
        assert_eq!(args.sort, Some(SortMode::Random));
        assert_eq!(args.seed, Some(Seed::Number(42)));
        assert_eq!(args.omit, "embedding");
        assert!(args.query_embedding_model.is_none());
    }

    #[test]
    fn test_text_seed_and_bad_sort() {
        let args = QueryFlags {
            count: 1,
            seed: Some("apple".into()),
            ..Default::default()
        }
        .into_args()
        .unwrap();
        assert_eq!(args.seed, Some(Seed::Text("apple".into())));

        let err = QueryFlags {
            count: 1,
            sort: Some("alphabetical".into()),
            ..Default::default()
        }
        .into_args()
        .unwrap_err();
        assert!(err.to_string().contains("illegal sort"));
    }

    #[test]
    fn test_read_args_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("args.json");
        std::fs::write(&path, r#"{"version": 1, "count": 2, "count_type": "bit"}"#).unwrap();
        let args = read_args(&path).unwrap();
        assert_eq!(args.count, 2);
        assert_eq!(args.count_type, CountType::Bit);
    }
}
