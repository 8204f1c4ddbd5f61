//! # Polymath CLI (`polymath`)
//!
//! Tools for working with Polymath library files: querying, batch schema
//! upgrades, and statistics.
//!
//! ## Usage
//!
//! ```bash
//! polymath --config ./config/polymath.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `polymath query` | Run a query over the configured libraries |
//! | `polymath upgrade` | Report or rewrite library files in a legacy layout |
//! | `polymath stats` | Summarize the configured libraries |
//! | `polymath access grant <name>` | Add an access token to the config file |
//! | `polymath access revoke <name>` | Remove an access token from the config file |
//!
//! ## Examples
//!
//! ```bash
//! # Top 1000 tokens, any order, as an anonymous caller
//! polymath query --count 1000
//!
//! # Wire-format arguments from stdin
//! echo '{"version": 1, "count": 5, "count_type": "bit"}' | polymath query --args -
//!
//! # See which files need upgrading, then upgrade them
//! polymath upgrade
//! polymath upgrade --run
//!
//! # Hand out a token for the private partition
//! polymath access grant ada --tags unpublished
//! ```
//!
//! Logging goes to stderr and honours `RUST_LOG`.

use clap::{Parser, Subcommand};
use polymath::config::{self, Config};
use polymath::{access_cmd, query_cmd, stats, upgrade_cmd};
use std::path::{Path, PathBuf};
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Polymath: a retrieval library for text with embeddings.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/polymath.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "polymath",
    about = "Query, upgrade, and inspect Polymath libraries",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/polymath.toml`. If the default file does not
    /// exist, built-in defaults are used.
    #[arg(long, global = true, default_value = "./config/polymath.toml")]
    config: PathBuf,

    /// Log at debug level unless `RUST_LOG` says otherwise.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a query over the configured libraries.
    ///
    /// Prints the result library as JSON. Embeddings are omitted unless
    /// `--omit` says otherwise.
    Query {
        /// Read wire-format query arguments from a JSON file (`-` for stdin).
        /// Other query flags are ignored when this is given.
        #[arg(long)]
        args: Option<PathBuf>,

        /// Budget in `--count-type` units. Negative means no limit.
        #[arg(long, default_value_t = 1000, allow_negative_numbers = true)]
        count: i64,

        /// `token` or `bit`.
        #[arg(long)]
        count_type: Option<String>,

        /// `similarity`, `random`, or `any`.
        #[arg(long)]
        sort: Option<String>,

        /// Reverse the result order.
        #[arg(long)]
        reversed: bool,

        /// Seed for `random` ordering.
        #[arg(long)]
        seed: Option<String>,

        /// Comma-separated fields to omit, or `*` for whole bits.
        #[arg(long)]
        omit: Option<String>,

        /// Access token unlocking private bits.
        #[arg(long)]
        access_token: Option<String>,

        /// Base64 query embedding for similarity ranking.
        #[arg(long)]
        query_embedding: Option<String>,
    },

    /// Upgrade library files stored in an older layout.
    ///
    /// Without `--run`, only reports which files would change.
    Upgrade {
        /// Glob of files to check, relative to the library directory.
        #[arg(long)]
        files: Option<String>,

        /// Write upgraded files in place.
        #[arg(long)]
        run: bool,
    },

    /// Show bit, token, and embedding counts for the configured libraries.
    Stats,

    /// Manage access tokens in the config file.
    Access {
        #[command(subcommand)]
        action: AccessAction,
    },
}

#[derive(Subcommand)]
enum AccessAction {
    /// Generate a token for `name`. An existing token is kept unless
    /// `--force` is given.
    Grant {
        name: String,

        /// Access tags the token unlocks (comma-separated). Defaults to the
        /// private access tag.
        #[arg(long, value_delimiter = ',')]
        tags: Vec<String>,

        /// Replace an existing token.
        #[arg(long)]
        force: bool,
    },

    /// Remove the token for `name`. Requires `--force`.
    Revoke {
        name: String,

        #[arg(long)]
        force: bool,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Load the config file, falling back to defaults only when the path is
/// the default one and does not exist.
fn resolve_config(path: &Path) -> anyhow::Result<Config> {
    if !path.exists() && path == Path::new("./config/polymath.toml") {
        debug!(path = %path.display(), "no config file, using defaults");
        return Ok(Config::minimal());
    }
    config::load_config(path)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // Token administration edits the config file itself, which may not
    // exist yet.
    if let Commands::Access { action } = &cli.command {
        return match action {
            AccessAction::Grant { name, tags, force } => {
                access_cmd::run_grant(&cli.config, name, tags, *force)
            }
            AccessAction::Revoke { name, force } => {
                access_cmd::run_revoke(&cli.config, name, *force)
            }
        };
    }

    let cfg = resolve_config(&cli.config)?;

    match cli.command {
        Commands::Query {
            args,
            count,
            count_type,
            sort,
            reversed,
            seed,
            omit,
            access_token,
            query_embedding,
        } => {
            let query_args = match args {
                Some(path) => query_cmd::read_args(&path)?,
                None => query_cmd::QueryFlags {
                    count,
                    count_type,
                    sort,
                    reversed,
                    seed,
                    omit,
                    access_token,
                    query_embedding,
                }
                .into_args()?,
            };
            query_cmd::run_query(&cfg, &query_args)?;
        }
        Commands::Upgrade { files, run } => {
            upgrade_cmd::run_upgrade(&cfg, files.as_deref(), run)?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg)?;
        }
        Commands::Access { .. } => {}
    }

    Ok(())
}
