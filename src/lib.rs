//! # Polymath
//!
//! Host-side tooling for Polymath libraries: configuration, library file
//! loading and saving, batch schema upgrades, statistics, access token
//! administration, the ingestion
//! pipeline, and the `polymath` command-line interface.
//!
//! The data model and query engine live in [`polymath_core`].
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌──────────────┐
//! │  Importers  │──▶│   Ingest    │──▶│ Library JSON │
//! │ (text,info) │   │ Count+Embed │   │    files     │
//! └─────────────┘   └─────────────┘   └──────┬───────┘
//!                                            │ load + upgrade
//!                                            ▼
//!                                     ┌──────────────┐
//!                                     │    Query     │
//!                                     │ score/filter │
//!                                     │ slice/omit   │
//!                                     └──────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`access_cmd`] | Granting and revoking access tokens |
//! | [`load`] | Library file loading, merging, and saving |
//! | [`ingest`] | Importer trait and ingestion pipeline |
//! | [`upgrade_cmd`] | Batch schema upgrade |
//! | [`query_cmd`] | Command-line queries |
//! | [`stats`] | Library statistics |

pub mod access_cmd;
pub mod config;
pub mod ingest;
pub mod load;
pub mod query_cmd;
pub mod stats;
pub mod upgrade_cmd;
