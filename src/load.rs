//! Reading and writing library files.
//!
//! Library files are JSON documents in the persisted layout. Legacy layouts
//! are upgraded in memory on load; nothing is written back unless a caller
//! saves explicitly (see `polymath upgrade`).
//!
//! Files under an `access/<tag>/` directory belong to the private partition
//! `<tag>`: every bit loaded from them is tagged accordingly.
//!
//! ```text
//! libraries/
//! ├── blog.json                 # public
//! └── access/
//!     └── unpublished/
//!         └── drafts.json       # access_tag = "unpublished"
//! ```

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use polymath_core::{AccessPolicy, Library};
use serde::Serialize;
use std::path::{Component, Path, PathBuf};
use tracing::info;
use walkdir::WalkDir;

use crate::config::Config;

/// Name of the directory whose child names private partitions.
const ACCESS_DIR: &str = "access";

/// How to choose the access tag for a loaded library's bits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AccessTagSpec {
    /// Derive from an `access/<tag>/` path component; untagged otherwise.
    #[default]
    FromPath,
    /// The policy's default private tag.
    DefaultPrivate,
    Tag(String),
}

impl AccessTagSpec {
    pub fn resolve(&self, path: &Path, policy: &AccessPolicy) -> Option<String> {
        match self {
            AccessTagSpec::FromPath => access_tag_from_path(path),
            AccessTagSpec::DefaultPrivate => Some(policy.private_access_tag().to_string()),
            AccessTagSpec::Tag(tag) => Some(tag.clone()),
        }
    }
}

/// The directory name directly below an `access` directory, if any.
pub fn access_tag_from_path(path: &Path) -> Option<String> {
    let parts: Vec<&str> = path
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => part.to_str(),
            _ => None,
        })
        .collect();
    // The last part is the file itself.
    let dirs = parts.len().checked_sub(1)?;
    parts[..dirs]
        .iter()
        .position(|part| *part == ACCESS_DIR)
        .and_then(|idx| parts[..dirs].get(idx + 1))
        .map(|tag| tag.to_string())
}

/// Load one library file, tagging bits from the path.
pub fn load_library_file(path: &Path) -> Result<Library> {
    load_library_file_as(path, &AccessTagSpec::FromPath, &AccessPolicy::default())
}

pub fn load_library_file_as(
    path: &Path,
    access_tag: &AccessTagSpec,
    policy: &AccessPolicy,
) -> Result<Library> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read library file: {}", path.display()))?;
    let mut library = Library::from_json(&content)
        .with_context(|| format!("Invalid library file: {}", path.display()))?;

    if let Some(tag) = access_tag.resolve(path, policy) {
        library.assign_access_tag(Some(tag.as_str()));
    }

    info!(
        path = %path.display(),
        bits = library.len(),
        upgraded = library.upgraded(),
        "loaded library"
    );
    Ok(library)
}

pub fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(
            Glob::new(pattern).with_context(|| format!("Invalid glob pattern: {}", pattern))?,
        );
    }
    Ok(builder.build()?)
}

/// Library files under `dir` matching any of `globs`, sorted.
pub fn library_paths(dir: &Path, globs: &[String]) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        bail!("Library directory does not exist: {}", dir.display());
    }
    let include_set = build_globset(globs)?;

    let mut paths = Vec::new();
    for entry in WalkDir::new(dir) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let relative = path.strip_prefix(dir).unwrap_or(path);
        if include_set.is_match(relative) {
            paths.push(path.to_path_buf());
        }
    }

    // Sort for deterministic merge order
    paths.sort();
    Ok(paths)
}

/// Load and merge every library file under `dir`.
pub fn load_libraries_in_directory(dir: &Path, globs: &[String]) -> Result<Library> {
    let mut library = Library::new();
    for path in library_paths(dir, globs)? {
        let loaded = load_library_file(&path)?;
        library
            .extend(&loaded)
            .with_context(|| format!("Failed to merge library: {}", path.display()))?;
    }
    Ok(library)
}

/// Load the libraries named by the configuration.
pub fn load_libraries(config: &Config) -> Result<Library> {
    match &config.libraries.file {
        Some(file) => load_library_file(file),
        None => load_libraries_in_directory(
            &config.libraries.dir,
            &config.libraries.include_globs,
        ),
    }
}

/// Write a library as tab-indented JSON. Access tags are not persisted;
/// they come from where the file lives.
pub fn save_library(library: &Library, path: &Path) -> Result<()> {
    let record = library.serialize(false);
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"\t");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    record.serialize(&mut serializer)?;

    std::fs::write(path, buf)
        .with_context(|| format!("Failed to write library file: {}", path.display()))?;
    info!(path = %path.display(), bits = library.len(), "saved library");
    Ok(())
}
