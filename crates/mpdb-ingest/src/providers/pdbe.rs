//! PDBe-KB entry features (secondary provider)

use crate::providers::http::{lookup_each, HttpClient};
use crate::providers::{ProviderBatch, ProviderError, SecondaryProvider};
use async_trait::async_trait;
use mpdb_common::{Identifier, IdentifierSet};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::{info, warn};

/// Entry-level features the PDBe API serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PdbeFeature {
    Summary,
    Residues,
    Coverage,
    Structure,
}

impl PdbeFeature {
    pub fn name(self) -> &'static str {
        match self {
            PdbeFeature::Summary => "summary",
            PdbeFeature::Residues => "residues",
            PdbeFeature::Coverage => "coverage",
            PdbeFeature::Structure => "structure",
        }
    }

    /// Path segment under `/pdb/entry/`
    fn endpoint(self) -> &'static str {
        match self {
            PdbeFeature::Summary => "summary",
            PdbeFeature::Residues => "residue_listing",
            PdbeFeature::Coverage => "polymer_coverage",
            PdbeFeature::Structure => "secondary_structure",
        }
    }
}

impl fmt::Display for PdbeFeature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unsupported PDBe feature '{0}' (expected summary, residues, coverage or structure)")]
pub struct UnknownFeature(pub String);

impl FromStr for PdbeFeature {
    type Err = UnknownFeature;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "summary" => Ok(PdbeFeature::Summary),
            "residues" => Ok(PdbeFeature::Residues),
            "coverage" => Ok(PdbeFeature::Coverage),
            "structure" => Ok(PdbeFeature::Structure),
            other => Err(UnknownFeature(other.to_string())),
        }
    }
}

/// PDBe REST API adapter
pub struct Pdbe {
    http: HttpClient,
    base_url: String,
}

impl Pdbe {
    pub fn new(http: HttpClient, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    fn url(&self, feature: PdbeFeature, id: &Identifier) -> String {
        format!(
            "{}/pdb/entry/{}/{}",
            self.base_url.trim_end_matches('/'),
            feature.endpoint(),
            id
        )
    }

    /// Fetch one feature for one entry; the answer is keyed by the entry id
    async fn fetch_feature(
        &self,
        feature: PdbeFeature,
        id: Identifier,
    ) -> Result<Option<Value>, ProviderError> {
        let Some(mut body) = self.http.get_json(&self.url(feature, &id)).await? else {
            return Ok(None);
        };

        let payload = body
            .as_object_mut()
            .and_then(|map| {
                let key = map
                    .keys()
                    .find(|key| key.eq_ignore_ascii_case(id.as_str()))
                    .cloned()?;
                map.remove(&key)
            });

        if payload.is_none() {
            warn!(feature = %feature, entry = %id, "No data for feature in PDBe response");
        }
        Ok(payload)
    }
}

#[async_trait]
impl SecondaryProvider for Pdbe {
    async fn fetch(&self, ids: &IdentifierSet, features: &[String]) -> BTreeMap<String, ProviderBatch> {
        let mut batches = BTreeMap::new();

        for name in features {
            let batch = match name.parse::<PdbeFeature>() {
                Ok(feature) => {
                    info!(feature = %feature, entries = ids.len(), "Fetching PDBe-KB feature");
                    lookup_each("pdbe", ids, self.http.concurrency(), |id| {
                        self.fetch_feature(feature, id)
                    })
                    .await
                }
                Err(e) => {
                    warn!(error = %e, "Skipping unsupported PDBe feature");
                    ProviderBatch::all_failed(ids, &ProviderError::UnexpectedShape(e.to_string()))
                }
            };
            batches.insert(name.clone(), batch);
        }

        batches
    }
}
