//! Access token administration.
//!
//! `polymath access grant <name>` writes a fresh secret to
//! `[access.tokens.<name>]` in the config file; `polymath access revoke
//! <name> --force` deletes that record. Other settings in the file are kept
//! as values, but comments and formatting are not preserved.
//!
//! Secrets look like `sk_<name>_<22 url-safe base64 chars>` (16 random
//! bytes). A host picks up changes on its next start.

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use std::path::Path;
use toml::{Table, Value};
use tracing::info;

use crate::config::parse_config;

pub const TOKEN_PREFIX: &str = "sk_";

/// Number of random bytes behind each secret.
const TOKEN_BYTES: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrantOutcome {
    /// A new secret was written.
    Created(String),
    /// The name already had a secret and `force` was not given.
    Existing(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevokeOutcome {
    Revoked,
    NeedsForce,
    NotFound,
}

pub fn generate_token(name: &str) -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("{}{}_{}", TOKEN_PREFIX, name, URL_SAFE_NO_PAD.encode(bytes))
}

fn read_table(path: &Path) -> Result<Table> {
    if !path.exists() {
        return Ok(Table::new());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Serialize, re-validate, and write the config document.
fn write_table(path: &Path, doc: &Table) -> Result<()> {
    let content = toml::to_string_pretty(doc).context("Failed to serialize config")?;
    parse_config(&content).context("Refusing to write an invalid config")?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write config file: {}", path.display()))
}

/// The `[access.tokens]` table, created if missing.
fn tokens_table(doc: &mut Table) -> Result<&mut Table> {
    let access = doc
        .entry("access")
        .or_insert(Value::Table(Table::new()))
        .as_table_mut()
        .context("access must be a table")?;
    access
        .entry("tokens")
        .or_insert(Value::Table(Table::new()))
        .as_table_mut()
        .context("access.tokens must be a table")
}

/// Give `name` a token granting `tags` (or the default private tag when
/// empty). An existing secret is kept unless `force` is set.
pub fn grant(path: &Path, name: &str, tags: &[String], force: bool) -> Result<GrantOutcome> {
    if name.trim().is_empty() {
        bail!("token name must not be empty");
    }

    let mut doc = read_table(path)?;
    let tokens = tokens_table(&mut doc)?;

    if !force {
        let existing = tokens
            .get(name)
            .and_then(|record| record.get("token"))
            .and_then(Value::as_str);
        if let Some(token) = existing {
            return Ok(GrantOutcome::Existing(token.to_string()));
        }
    }

    let token = generate_token(name);
    let record = tokens
        .entry(name)
        .or_insert(Value::Table(Table::new()))
        .as_table_mut()
        .with_context(|| format!("access.tokens.{} must be a table", name))?;
    record.insert("token".to_string(), Value::String(token.clone()));
    if tags.is_empty() {
        record.remove("access_tags");
    } else {
        record.insert(
            "access_tags".to_string(),
            Value::Array(tags.iter().cloned().map(Value::String).collect()),
        );
    }

    write_table(path, &doc)?;
    info!(name, path = %path.display(), "granted access token");
    Ok(GrantOutcome::Created(token))
}

/// Remove the token record for `name`. Without `force` nothing is written.
pub fn revoke(path: &Path, name: &str, force: bool) -> Result<RevokeOutcome> {
    if !path.exists() {
        return Ok(RevokeOutcome::NotFound);
    }
    let mut doc = read_table(path)?;
    let tokens = tokens_table(&mut doc)?;
    if !tokens.contains_key(name) {
        return Ok(RevokeOutcome::NotFound);
    }
    if !force {
        return Ok(RevokeOutcome::NeedsForce);
    }
    tokens.remove(name);

    write_table(path, &doc)?;
    info!(name, path = %path.display(), "revoked access token");
    Ok(RevokeOutcome::Revoked)
}

pub fn run_grant(path: &Path, name: &str, tags: &[String], force: bool) -> Result<()> {
    match grant(path, name, tags, force)? {
        GrantOutcome::Created(token) => {
            println!("Granted a token for {} in {}.", name, path.display());
            println!("Restart any host reading this config. Pass this token to the caller:");
            println!("{}", token);
        }
        GrantOutcome::Existing(token) => {
            println!(
                "{} already has a token; leaving it unchanged. Pass --force to replace it.",
                name
            );
            println!("{}", token);
        }
    }
    Ok(())
}

pub fn run_revoke(path: &Path, name: &str, force: bool) -> Result<()> {
    match revoke(path, name, force)? {
        RevokeOutcome::Revoked => {
            println!("Removed the token for {} from {}.", name, path.display());
        }
        RevokeOutcome::NeedsForce => {
            println!("Pass --force to remove the token for {}.", name);
        }
        RevokeOutcome::NotFound => {
            println!("{} has no token in {}.", name, path.display());
        }
    }
    Ok(())
}
