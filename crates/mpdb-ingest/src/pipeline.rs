//! End-to-end pipeline: search, curate, write `data.json`
//!
//! Nothing is written unless the whole run succeeds. The dataset goes to a
//! temporary file that is renamed into place, followed by a `sha256sum`-style
//! sidecar.

use crate::config::{ConfigError, PipelineConfig};
use crate::curate::{Capabilities, CurateError, Curation, CuratedDataset, Funnel, FunnelOptions};
use crate::providers::{
    HttpClient, LocalDirectory, MembraneProvider, MembraneSource, MemProtMd, Opm, Pdbe, Pdbtm,
    ProviderError, RcsbGraphql, StructureDownloader,
};
use crate::search::{self, SearchError};
use mpdb_common::{checksum, IdentifierSet, MpdbError};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Name of the curated dataset inside the output directory
pub const OUTPUT_FILE: &str = "data.json";

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Search(#[from] SearchError),

    #[error(transparent)]
    Curate(#[from] CurateError),

    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] ProviderError),

    #[error("Failed to create directory '{path}': {source}")]
    Directory {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write '{path}': {source}")]
    Output { path: PathBuf, source: MpdbError },
}

/// Search, curate and write the dataset
pub async fn run(config: &PipelineConfig, cancel: CancellationToken) -> Result<Curation, PipelineError> {
    let start = Instant::now();
    prepare_directories(config).await?;

    let http = HttpClient::new(&config.http)?;

    if cancel.is_cancelled() {
        return Err(CurateError::Cancelled {
            stage: "search".to_string(),
        }
        .into());
    }
    let ids = search::search(&http, &config.endpoints.rcsb_search, &config.search).await?;

    let curation = curate_with(config, http, &ids, cancel).await?;
    info!(
        entries = curation.dataset.entries.len(),
        elapsed_secs = start.elapsed().as_secs_f64(),
        "Pipeline complete"
    );
    Ok(curation)
}

/// Curate a caller-supplied set of entries and write the dataset
pub async fn curate_entries(
    config: &PipelineConfig,
    ids: &IdentifierSet,
    cancel: CancellationToken,
) -> Result<Curation, PipelineError> {
    prepare_directories(config).await?;
    let http = HttpClient::new(&config.http)?;
    curate_with(config, http, ids, cancel).await
}

async fn curate_with(
    config: &PipelineConfig,
    http: HttpClient,
    ids: &IdentifierSet,
    cancel: CancellationToken,
) -> Result<Curation, PipelineError> {
    let funnel = build_funnel(config, http).with_cancellation(cancel);
    let curation = funnel.run(ids).await?;
    write_dataset(&config.output, &curation.dataset).await?;
    Ok(curation)
}

/// Wire the HTTP adapters into a funnel
pub fn build_funnel(config: &PipelineConfig, http: HttpClient) -> Funnel {
    let endpoints = &config.endpoints;
    let membrane = config
        .membrane
        .preference
        .iter()
        .map(|source| -> Arc<dyn MembraneProvider> {
            match source {
                MembraneSource::Pdbtm => Arc::new(Pdbtm::new(http.clone(), &endpoints.pdbtm)),
                MembraneSource::Opm => Arc::new(Opm::new(http.clone(), &endpoints.opm)),
                MembraneSource::Memprotmd => {
                    Arc::new(MemProtMd::new(http.clone(), &endpoints.memprotmd))
                }
            }
        })
        .collect();

    let capabilities = Capabilities {
        primary: Arc::new(RcsbGraphql::new(
            http.clone(),
            &endpoints.rcsb_graphql,
            config.http.batch_size,
        )),
        secondary: Arc::new(Pdbe::new(http.clone(), &endpoints.pdbe)),
        membrane,
        materializer: Arc::new(StructureDownloader::new(http, endpoints.clone())),
        listing: Arc::new(LocalDirectory),
    };

    Funnel::new(
        capabilities,
        FunnelOptions {
            detail_query: config.data.rcsb_query.clone(),
            features: config.data.pdbe.clone(),
            structure_dir: config.data.pdb.clone(),
            membrane_dir: config.data.tm.clone(),
        },
    )
}

async fn prepare_directories(config: &PipelineConfig) -> Result<(), PipelineError> {
    for dir in [&config.output, &config.data.pdb, &config.data.tm] {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|source| PipelineError::Directory {
                path: dir.clone(),
                source,
            })?;
    }
    Ok(())
}

/// Write `data.json` and its checksum sidecar into `output_dir`
pub async fn write_dataset(output_dir: &Path, dataset: &CuratedDataset) -> Result<PathBuf, PipelineError> {
    let path = output_dir.join(OUTPUT_FILE);
    let output_error = |source: MpdbError| PipelineError::Output {
        path: path.clone(),
        source,
    };

    let json = serde_json::to_vec_pretty(dataset).map_err(|e| output_error(e.into()))?;
    let checksum = checksum::compute_bytes_checksum(&json);
    let sidecar = checksum::sidecar_path(&path);
    let temporary = output_dir.join(format!(".{OUTPUT_FILE}.tmp"));

    tokio::fs::write(&temporary, &json)
        .await
        .map_err(|e| output_error(e.into()))?;

    // The sidecar lands first so a published data.json always has one
    let published = async {
        tokio::fs::write(&sidecar, checksum::sidecar_line(&checksum, OUTPUT_FILE)).await?;
        tokio::fs::rename(&temporary, &path).await?;
        Ok::<_, std::io::Error>(())
    };
    if let Err(e) = published.await {
        let _ = tokio::fs::remove_file(&temporary).await;
        return Err(output_error(e.into()));
    }

    info!(
        output = %path.display(),
        checksum = %sidecar.display(),
        entries = dataset.entries.len(),
        "Wrote curated dataset"
    );
    Ok(path)
}
