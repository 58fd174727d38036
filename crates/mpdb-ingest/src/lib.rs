//! MPDB Ingest Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Builds a curated dataset of membrane protein structures.
//!
//! # Overview
//!
//! - **Search** ([`search`]): compile a boolean label expression into an RCSB
//!   search query and collect the matching entries
//! - **Curation** ([`curate`]): narrow the entries through RCSB details,
//!   experimental structures, PDBe-KB features and membrane annotations
//! - **Providers** ([`providers`]): HTTP adapters for every external service
//! - **Pipeline** ([`pipeline`]): search, curate and write `data.json`

pub mod cli;
pub mod commands;
pub mod config;
pub mod curate;
pub mod pipeline;
pub mod providers;
pub mod search;

pub use cli::{Cli, Commands};
pub use config::{ConfigError, PipelineConfig};
pub use curate::{CuratedDataset, Curation, Funnel};
pub use pipeline::PipelineError;
