//! Structure file materializer
//!
//! Downloads coordinate files into a directory, one file per input. Failures
//! are logged and swallowed: the funnel decides what made it by listing the
//! directory afterwards.

use crate::config::Endpoints;
use crate::providers::http::HttpClient;
use crate::providers::{ProviderError, StructureMaterializer};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use mpdb_common::Identifier;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, error, info, warn};

/// Suffix of in-flight downloads; never matches a listing suffix
const PARTIAL_SUFFIX: &str = ".part";

/// Where a structure comes from and how its file is named
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StructureMethod {
    /// Experimental mmCIF from the RCSB file server
    Rcsb,
    /// Predicted model for a UniProt accession
    Alphafold,
    /// Atomistic snapshot of a MemProtMD simulation
    Memprotmd,
    /// Membrane-transformed coordinates from PDBTM
    Pdbtm,
    /// Membrane-oriented coordinates from OPM
    Opm,
}

impl StructureMethod {
    pub fn name(self) -> &'static str {
        match self {
            StructureMethod::Rcsb => "rcsb",
            StructureMethod::Alphafold => "alphafold",
            StructureMethod::Memprotmd => "memprotmd",
            StructureMethod::Pdbtm => "pdbtm",
            StructureMethod::Opm => "opm",
        }
    }

    /// Suffix of the files this method writes
    pub fn file_suffix(self) -> &'static str {
        match self {
            StructureMethod::Rcsb | StructureMethod::Alphafold => ".cif",
            StructureMethod::Memprotmd | StructureMethod::Pdbtm | StructureMethod::Opm => ".pdb",
        }
    }

    /// File name for one input.
    ///
    /// Membrane structures are named after the four-character entry code so
    /// a MemProtMD simulation reference lands on the same name as its entry.
    pub fn file_name(self, input: &str) -> Result<String, ProviderError> {
        let name = match self {
            StructureMethod::Rcsb => format!("{}.cif", checked(input)?),
            StructureMethod::Alphafold => format!("AF-{}-F1-model_v4.cif", input.trim().to_uppercase()),
            StructureMethod::Memprotmd | StructureMethod::Pdbtm | StructureMethod::Opm => {
                let code = Identifier::pdb_code(input)
                    .map_err(|e| ProviderError::UnexpectedShape(e.to_string()))?;
                format!("{code}.pdb")
            }
        };
        Ok(name)
    }

    /// Download URL for one input
    pub fn url(self, endpoints: &Endpoints, input: &str) -> Result<String, ProviderError> {
        let input = input.trim();
        let url = match self {
            StructureMethod::Rcsb => format!(
                "{}/download/{}.cif",
                endpoints.rcsb_files.trim_end_matches('/'),
                checked(input)?.as_str().to_uppercase()
            ),
            StructureMethod::Alphafold => format!(
                "{}/files/AF-{}-F1-model_v4.cif",
                endpoints.alphafold.trim_end_matches('/'),
                input.to_uppercase()
            ),
            StructureMethod::Memprotmd => format!(
                "{}/data/memprotmd/simulations/{}/files/structures/at.pdb",
                endpoints.memprotmd.trim_end_matches('/'),
                input
            ),
            StructureMethod::Pdbtm => format!(
                "{}/api/v1/entry/{}.trpdb",
                endpoints.pdbtm.trim_end_matches('/'),
                checked(input)?
            ),
            StructureMethod::Opm => format!(
                "{}/shared/opm-assets/pdb/{}.pdb",
                endpoints.opm_assets.trim_end_matches('/'),
                checked(input)?
            ),
        };
        Ok(url)
    }
}

fn checked(input: &str) -> Result<Identifier, ProviderError> {
    Identifier::new(input).map_err(|e| ProviderError::UnexpectedShape(e.to_string()))
}

impl fmt::Display for StructureMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for StructureMethod {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rcsb" => Ok(StructureMethod::Rcsb),
            "alphafold" => Ok(StructureMethod::Alphafold),
            "memprotmd" => Ok(StructureMethod::Memprotmd),
            "pdbtm" => Ok(StructureMethod::Pdbtm),
            "opm" => Ok(StructureMethod::Opm),
            other => Err(ProviderError::UnexpectedShape(format!(
                "unknown structure method '{other}'"
            ))),
        }
    }
}

/// What happened to one requested file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Downloaded,
    Skipped,
    Unavailable,
}

/// HTTP structure downloader
pub struct StructureDownloader {
    http: HttpClient,
    endpoints: Endpoints,
}

impl StructureDownloader {
    pub fn new(http: HttpClient, endpoints: Endpoints) -> Self {
        Self { http, endpoints }
    }

    async fn download_one(
        &self,
        method: StructureMethod,
        input: &str,
        destination: &Path,
    ) -> Result<Outcome, ProviderError> {
        let target = destination.join(method.file_name(input)?);
        if tokio::fs::try_exists(&target).await? {
            debug!(file = %target.display(), "Structure already present, skipping");
            return Ok(Outcome::Skipped);
        }

        let url = method.url(&self.endpoints, input)?;
        let Some(bytes) = self.http.get_bytes(&url).await? else {
            return Ok(Outcome::Unavailable);
        };

        let partial = partial_path(&target);
        tokio::fs::write(&partial, &bytes).await?;
        if let Err(e) = tokio::fs::rename(&partial, &target).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(e.into());
        }

        debug!(file = %target.display(), bytes = bytes.len(), "Downloaded structure");
        Ok(Outcome::Downloaded)
    }
}

fn partial_path(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_os_string();
    name.push(PARTIAL_SUFFIX);
    PathBuf::from(name)
}

#[async_trait]
impl StructureMaterializer for StructureDownloader {
    async fn materialize(&self, method: StructureMethod, inputs: &[String], destination: &Path) {
        info!(
            method = %method,
            structures = inputs.len(),
            destination = %destination.display(),
            "Downloading structures"
        );

        if let Err(e) = tokio::fs::create_dir_all(destination).await {
            error!(destination = %destination.display(), error = %e, "Cannot create structure directory");
            return;
        }

        let outcomes: Vec<Outcome> = stream::iter(inputs.iter().cloned())
            .map(|input: String| async move {
                match self.download_one(method, &input, destination).await {
                    Ok(Outcome::Unavailable) => {
                        warn!(method = %method, input = %input, "Structure not available");
                        Outcome::Unavailable
                    }
                    Ok(outcome) => outcome,
                    Err(e) => {
                        warn!(method = %method, input = %input, error = %e, "Structure download failed");
                        Outcome::Unavailable
                    }
                }
            })
            .buffer_unordered(self.http.concurrency())
            .collect()
            .await;

        let count = |wanted: Outcome| outcomes.iter().filter(|o| **o == wanted).count();
        info!(
            method = %method,
            downloaded = count(Outcome::Downloaded),
            skipped = count(Outcome::Skipped),
            unavailable = count(Outcome::Unavailable),
            "Structure downloads finished"
        );
    }
}
