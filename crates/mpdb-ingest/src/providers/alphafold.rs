//! AlphaFold prediction metadata

use crate::providers::http::HttpClient;
use crate::providers::ProviderError;
use futures::stream::{self, StreamExt};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

/// AlphaFold DB prediction API adapter
///
/// Accessions are UniProt accessions, kept in upper case since the model file
/// names carry them verbatim.
pub struct AlphaFold {
    http: HttpClient,
    base_url: String,
}

impl AlphaFold {
    pub fn new(http: HttpClient, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    /// First prediction listed for one accession
    pub async fn prediction(&self, accession: &str) -> Result<Option<Value>, ProviderError> {
        let url = format!(
            "{}/api/prediction/{}",
            self.base_url.trim_end_matches('/'),
            accession
        );
        match self.http.get_json(&url).await? {
            Some(Value::Array(mut predictions)) if !predictions.is_empty() => {
                Ok(Some(predictions.swap_remove(0)))
            }
            Some(Value::Array(_)) | None => Ok(None),
            Some(other) => Err(ProviderError::UnexpectedShape(format!(
                "prediction answer is not a list: {other}"
            ))),
        }
    }

    /// Predictions keyed by accession; unknown or failed accessions are left out
    pub async fn predictions(&self, accessions: &[String]) -> BTreeMap<String, Value> {
        let unique: BTreeSet<String> = accessions
            .iter()
            .map(|acc| acc.trim().to_uppercase())
            .filter(|acc| !acc.is_empty())
            .collect();
        info!(accessions = unique.len(), "Fetching AlphaFold metadata");

        let outcomes: Vec<(String, Result<Option<Value>, ProviderError>)> = stream::iter(unique)
            .map(|accession| async move {
                let outcome = self.prediction(&accession).await;
                (accession, outcome)
            })
            .buffer_unordered(self.http.concurrency())
            .collect()
            .await;

        let mut found = BTreeMap::new();
        for (accession, outcome) in outcomes {
            match outcome {
                Ok(Some(prediction)) => {
                    debug!(accession = %accession, "Retrieved AlphaFold entry");
                    found.insert(accession, prediction);
                }
                Ok(None) => warn!(accession = %accession, "No AlphaFold prediction"),
                Err(e) => warn!(accession = %accession, error = %e, "AlphaFold request failed"),
            }
        }
        found
    }
}
