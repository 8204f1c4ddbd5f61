//! Batch upgrade of library files.
//!
//! `polymath upgrade` loads every library file, which upgrades legacy
//! layouts in memory, and reports which files were out of date. With
//! `--run` those files are re-saved in place; without it nothing is
//! written.

use anyhow::Result;
use std::path::PathBuf;

use crate::config::Config;
use crate::load::{library_paths, load_library_file, save_library};

/// Outcome of an upgrade pass.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct UpgradeSummary {
    pub current: Vec<PathBuf>,
    pub upgraded: Vec<PathBuf>,
}

/// The files an upgrade pass covers: the configured single file, or the
/// library directory filtered by `files` (a glob relative to the
/// directory) or the configured include globs.
fn upgrade_targets(config: &Config, files: Option<&str>) -> Result<Vec<PathBuf>> {
    match (files, &config.libraries.file) {
        (None, Some(file)) => Ok(vec![file.clone()]),
        (Some(pattern), _) => library_paths(&config.libraries.dir, &[pattern.to_string()]),
        (None, None) => library_paths(&config.libraries.dir, &config.libraries.include_globs),
    }
}

pub fn upgrade_libraries(config: &Config, files: Option<&str>, run: bool) -> Result<UpgradeSummary> {
    let mut summary = UpgradeSummary::default();
    for path in upgrade_targets(config, files)? {
        let library = load_library_file(&path)?;
        if !library.upgraded() {
            summary.current.push(path);
            continue;
        }
        if run {
            save_library(&library, &path)?;
        }
        summary.upgraded.push(path);
    }
    Ok(summary)
}

/// Run the upgrade command and print a report.
pub fn run_upgrade(config: &Config, files: Option<&str>, run: bool) -> Result<()> {
    let summary = upgrade_libraries(config, files, run)?;

    for path in &summary.current {
        println!("  current       {}", path.display());
    }
    for path in &summary.upgraded {
        if run {
            println!("  upgraded      {}", path.display());
        } else {
            println!("  would upgrade {}", path.display());
        }
    }

    println!();
    if run {
        println!(
            "{} upgraded, {} already current.",
            summary.upgraded.len(),
            summary.current.len()
        );
    } else {
        println!(
            "{} would be upgraded, {} already current. Pass --run to write changes.",
            summary.upgraded.len(),
            summary.current.len()
        );
    }
    Ok(())
}
