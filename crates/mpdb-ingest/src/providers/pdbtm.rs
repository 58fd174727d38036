//! PDBTM membrane annotations

use crate::providers::http::{lookup_each, HttpClient};
use crate::providers::{MembraneProvider, MembraneSource, ProviderBatch, ProviderError};
use async_trait::async_trait;
use mpdb_common::{Identifier, IdentifierSet};
use serde_json::Value;
use tracing::{debug, info};

/// PDBTM entry API adapter
///
/// The annotation is the entry's `additional_entry_annotations` object; an
/// entry without one is treated as not annotated.
pub struct Pdbtm {
    http: HttpClient,
    base_url: String,
}

impl Pdbtm {
    pub fn new(http: HttpClient, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    async fn fetch_entry(&self, id: Identifier) -> Result<Option<Value>, ProviderError> {
        let url = format!("{}/api/v1/entry/{}.json", self.base_url.trim_end_matches('/'), id);
        let annotation = self
            .http
            .get_json(&url)
            .await?
            .and_then(|mut body| body.get_mut("additional_entry_annotations").map(Value::take))
            .filter(|annotation| !annotation.is_null());

        match &annotation {
            Some(_) => debug!(entry = %id, "Retrieved PDBTM membrane data"),
            None => debug!(entry = %id, "No PDBTM annotation"),
        }
        Ok(annotation)
    }
}

#[async_trait]
impl MembraneProvider for Pdbtm {
    fn source(&self) -> MembraneSource {
        MembraneSource::Pdbtm
    }

    async fn lookup(&self, ids: &IdentifierSet) -> ProviderBatch {
        info!(entries = ids.len(), "Fetching PDBTM data");
        lookup_each("pdbtm", ids, self.http.concurrency(), |id| self.fetch_entry(id)).await
    }
}
