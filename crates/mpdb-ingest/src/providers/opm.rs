//! OPM membrane orientation data

use crate::providers::http::{is_empty_payload, lookup_each, HttpClient};
use crate::providers::{MembraneProvider, MembraneSource, ProviderBatch, ProviderError};
use async_trait::async_trait;
use mpdb_common::{Identifier, IdentifierSet};
use serde_json::Value;
use tracing::info;

/// OPM backend adapter (primary structure lookup by PDB id)
pub struct Opm {
    http: HttpClient,
    base_url: String,
}

impl Opm {
    pub fn new(http: HttpClient, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    async fn fetch_entry(&self, id: Identifier) -> Result<Option<Value>, ProviderError> {
        let url = format!(
            "{}/opm-backend/primary_structures/pdbid/{}",
            self.base_url.trim_end_matches('/'),
            id
        );
        Ok(self
            .http
            .get_json(&url)
            .await?
            .filter(|body| !is_empty_payload(body)))
    }
}

#[async_trait]
impl MembraneProvider for Opm {
    fn source(&self) -> MembraneSource {
        MembraneSource::Opm
    }

    async fn lookup(&self, ids: &IdentifierSet) -> ProviderBatch {
        info!(entries = ids.len(), "Fetching OPM data");
        lookup_each("opm", ids, self.http.concurrency(), |id| self.fetch_entry(id)).await
    }
}
