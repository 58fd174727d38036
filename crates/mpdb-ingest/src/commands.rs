//! Command handlers behind the CLI

use crate::cli::Commands;
use crate::config::{Endpoints, HttpSettings, LabelledQuery, PipelineConfig, SearchConfig};
use crate::pipeline;
use crate::providers::{AlphaFold, HttpClient, StructureDownloader, StructureMaterializer, StructureMethod, UniProt};
use crate::search;
use anyhow::{Context, Result};
use mpdb_common::identifier::identifier_set;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub async fn execute(command: Commands, cancel: CancellationToken) -> Result<()> {
    match command {
        Commands::Run { config } => {
            let config = PipelineConfig::load(&config.config)?;
            let curation = pipeline::run(&config, cancel).await?;
            println!("{}", serde_json::to_string_pretty(&curation.report)?);
        }
        Commands::Search { config } => {
            let config = PipelineConfig::load(&config.config)?;
            let http = HttpClient::new(&config.http)?;
            let ids = search::search(&http, &config.endpoints.rcsb_search, &config.search).await?;
            println!("{}", serde_json::to_string_pretty(&ids)?);
        }
        Commands::Compile {
            config,
            expression,
            parameters,
        } => {
            let search = match (config, expression, parameters) {
                (Some(path), _, _) => PipelineConfig::load(&path)?.search,
                (None, Some(expression), Some(parameters)) => SearchConfig {
                    query: read_labels(&parameters)?,
                    expression,
                },
                _ => anyhow::bail!("compile needs --config or --expression with --parameters"),
            };
            let request = search::build_request(&search)?;
            println!("{}", serde_json::to_string_pretty(&request)?);
        }
        Commands::Curate { config, entries } => {
            let config = PipelineConfig::load(&config.config)?;
            let ids = identifier_set(&entries)?;
            info!(entries = ids.len(), "Curating supplied entries");
            let curation = pipeline::curate_entries(&config, &ids, cancel).await?;
            println!("{}", serde_json::to_string_pretty(&curation.report)?);
        }
        Commands::Uniprot {
            query,
            entries,
            endpoint,
        } => {
            let sparql = std::fs::read_to_string(&query)
                .with_context(|| format!("Failed to read SPARQL query '{}'", query.display()))?;
            let endpoint = endpoint.unwrap_or_else(|| Endpoints::default().uniprot_sparql);
            let uniprot = UniProt::new(HttpClient::new(&HttpSettings::default())?, endpoint);
            let bindings = uniprot.query(&sparql, &entries).await?;
            println!("{}", serde_json::to_string_pretty(&bindings)?);
        }
        Commands::Alphafold {
            accessions,
            download,
            endpoint,
        } => {
            let mut endpoints = Endpoints::default();
            if let Some(endpoint) = endpoint {
                endpoints.alphafold = endpoint;
            }
            let http = HttpClient::new(&HttpSettings::default())?;
            let predictions = AlphaFold::new(http.clone(), &endpoints.alphafold)
                .predictions(&accessions)
                .await;

            if let Some(dir) = download {
                let found: Vec<String> = predictions.keys().cloned().collect();
                StructureDownloader::new(http, endpoints)
                    .materialize(StructureMethod::Alphafold, &found, &dir)
                    .await;
            }
            println!("{}", serde_json::to_string_pretty(&predictions)?);
        }
    }
    Ok(())
}

fn read_labels(path: &Path) -> Result<Vec<LabelledQuery>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read parameters '{}'", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse parameters '{}'", path.display()))
}
