//! Library statistics.
//!
//! A quick summary of what is loaded: bit and token counts, embedding
//! coverage, distinct sources, and a per-access-tag breakdown. Used by
//! `polymath stats` to check that imports and upgrades did what was
//! expected.

use anyhow::Result;

use crate::config::Config;
use crate::load::load_libraries;

/// Run the stats command: load the configured libraries and print a summary.
pub fn run_stats(config: &Config) -> Result<()> {
    let library = load_libraries(config)?;
    let stats = library.stats();

    let source = match &config.libraries.file {
        Some(file) => file.display().to_string(),
        None => config.libraries.dir.display().to_string(),
    };

    println!("Polymath Library Stats");
    println!("======================");
    println!();
    println!("  Libraries:   {}", source);
    println!("  Version:     {}", library.version());
    println!("  Model:       {}", library.embedding_model());
    println!();
    println!("  Bits:        {}", stats.bits);
    println!("  Tokens:      {}", stats.tokens);
    println!(
        "  Embedded:    {} / {} ({}%)",
        stats.embedded,
        stats.bits,
        if stats.bits > 0 {
            (stats.embedded * 100) / stats.bits
        } else {
            0
        }
    );
    println!("  Sources:     {}", stats.sources);

    if !stats.access_tags.is_empty() {
        println!();
        println!("  By access tag:");
        println!("  {:<24} {:>8}", "TAG", "BITS");
        println!("  {}", "-".repeat(33));
        for (tag, count) in &stats.access_tags {
            println!("  {:<24} {:>8}", tag, count);
        }
    }

    println!();
    Ok(())
}
