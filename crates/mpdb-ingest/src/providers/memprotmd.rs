//! MemProtMD simulation references

use crate::providers::http::{is_empty_payload, lookup_each, HttpClient};
use crate::providers::{MembraneProvider, MembraneSource, ProviderBatch, ProviderError};
use async_trait::async_trait;
use mpdb_common::{Identifier, IdentifierSet};
use serde_json::Value;
use tracing::{debug, info};

/// MemProtMD references API adapter
///
/// The annotation lists the coarse-grained simulations run for the entry; the
/// last one is what gets materialized.
pub struct MemProtMd {
    http: HttpClient,
    base_url: String,
}

impl MemProtMd {
    pub fn new(http: HttpClient, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    async fn fetch_entry(&self, id: Identifier) -> Result<Option<Value>, ProviderError> {
        let url = format!(
            "{}/api/references/PDB/{}",
            self.base_url.trim_end_matches('/'),
            id
        );
        let output = self.http.post_empty(&url).await?;

        match output {
            Some(body) if !is_empty_payload(&body) => {
                debug!(entry = %id, "Retrieved MemProtMD simulations");
                Ok(Some(body))
            }
            _ => {
                debug!(entry = %id, "No MemProtMD data");
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl MembraneProvider for MemProtMd {
    fn source(&self) -> MembraneSource {
        MembraneSource::Memprotmd
    }

    async fn lookup(&self, ids: &IdentifierSet) -> ProviderBatch {
        info!(entries = ids.len(), "Fetching MemProtMD data");
        lookup_each("memprotmd", ids, self.http.concurrency(), |id| self.fetch_entry(id)).await
    }
}
