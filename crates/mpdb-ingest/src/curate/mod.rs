//! Curation of searched entries into the final dataset

pub mod dataset;
pub mod funnel;

use std::path::PathBuf;

pub use dataset::{tag_annotation, CuratedDataset, FunnelReport, StageReport, SOURCE_KEY};
pub use funnel::{Capabilities, Curation, Funnel, FunnelOptions, MembraneResolution, StageOutput};

/// Errors that stop a curation run
#[derive(Debug, thiserror::Error)]
pub enum CurateError {
    #[error("Curation cancelled before stage '{stage}'")]
    Cancelled { stage: String },

    #[error("Failed to list '{dir}': {source}")]
    Listing {
        dir: PathBuf,
        source: std::io::Error,
    },
}
