//! External data providers
//!
//! Each provider the curation funnel talks to is a capability trait with one
//! HTTP adapter per service:
//!
//! - **Primary** ([`PrimaryProvider`]): RCSB GraphQL entry details
//! - **Secondary** ([`SecondaryProvider`]): PDBe-KB per-entry features
//! - **Membrane** ([`MembraneProvider`]): PDBTM, OPM and MemProtMD annotations
//! - **Materializer** ([`StructureMaterializer`]): structure file downloads
//! - **Listing** ([`FileListing`]): ground truth for what was materialized
//!
//! UniProt SPARQL and AlphaFold lookups are standalone adapters used by the CLI.
//!
//! Adapters never return per-identifier errors: a failed request for one entry
//! lands in [`ProviderBatch::failed`] and the rest of the batch carries on.

pub mod alphafold;
pub mod http;
pub mod listing;
pub mod memprotmd;
pub mod opm;
pub mod pdbe;
pub mod pdbtm;
pub mod rcsb;
pub mod structure;
pub mod uniprot;

use async_trait::async_trait;
use mpdb_common::{Identifier, IdentifierSet};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use tracing::warn;

pub use alphafold::AlphaFold;
pub use http::HttpClient;
pub use listing::LocalDirectory;
pub use memprotmd::MemProtMd;
pub use opm::Opm;
pub use pdbe::{Pdbe, PdbeFeature};
pub use pdbtm::Pdbtm;
pub use rcsb::RcsbGraphql;
pub use structure::{StructureDownloader, StructureMethod};
pub use uniprot::UniProt;

/// Payloads returned by one provider for one logical feature
pub type ProviderRecord = BTreeMap<Identifier, Value>;

/// Error from a single provider request
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("Invalid JSON response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unexpected response shape: {0}")]
    UnexpectedShape(String),
}

/// Outcome of one provider call over a set of identifiers
///
/// `missing` means the provider answered that the entry does not exist;
/// `failed` means the request itself went wrong. The funnel drops both but
/// reports them separately.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderBatch {
    pub found: ProviderRecord,
    pub missing: IdentifierSet,
    pub failed: BTreeMap<Identifier, String>,
}

impl ProviderBatch {
    /// Mark every identifier as failed with the same error
    pub fn all_failed(ids: &IdentifierSet, error: &ProviderError) -> Self {
        let message = error.to_string();
        Self {
            failed: ids.iter().map(|id| (id.clone(), message.clone())).collect(),
            ..Self::default()
        }
    }

    pub fn found_ids(&self) -> IdentifierSet {
        self.found.keys().cloned().collect()
    }

    /// File one identifier's lookup outcome into the batch
    pub fn record(
        &mut self,
        provider: &str,
        id: Identifier,
        outcome: Result<Option<Value>, ProviderError>,
    ) {
        match outcome {
            Ok(Some(value)) => {
                self.found.insert(id, value);
            }
            Ok(None) => {
                self.missing.insert(id);
            }
            Err(e) => {
                warn!(provider, entry = %id, error = %e, "Provider request failed");
                self.failed.insert(id, e.to_string());
            }
        }
    }
}

/// Membrane annotation sources, in no particular order
///
/// The preference order is configuration; see `MembraneConfig`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MembraneSource {
    Pdbtm,
    Opm,
    Memprotmd,
}

impl MembraneSource {
    /// Tag written into `_source` of curated annotations
    pub fn name(self) -> &'static str {
        match self {
            MembraneSource::Pdbtm => "pdbtm",
            MembraneSource::Opm => "opm",
            MembraneSource::Memprotmd => "memprotmd",
        }
    }

    /// Materializer method for this source's structures
    pub fn structure_method(self) -> StructureMethod {
        match self {
            MembraneSource::Pdbtm => StructureMethod::Pdbtm,
            MembraneSource::Opm => StructureMethod::Opm,
            MembraneSource::Memprotmd => StructureMethod::Memprotmd,
        }
    }

    /// What to hand the materializer for an annotated entry.
    ///
    /// MemProtMD structures are addressed by the last simulation listed in
    /// the annotation; an entry without simulations has nothing to download.
    pub fn materialization_input(self, id: &Identifier, annotation: &Value) -> Option<String> {
        match self {
            MembraneSource::Pdbtm | MembraneSource::Opm => Some(id.to_string()),
            MembraneSource::Memprotmd => annotation
                .get("simulations")
                .and_then(Value::as_array)
                .and_then(|simulations| simulations.last())
                .and_then(|last| match last {
                    Value::String(reference) => Some(reference.clone()),
                    Value::Object(_) => last.get("id").and_then(Value::as_str).map(str::to_string),
                    _ => None,
                }),
        }
    }
}

impl fmt::Display for MembraneSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Stage A capability: detailed entry records for the working set
#[async_trait]
pub trait PrimaryProvider: Send + Sync {
    async fn fetch(&self, ids: &IdentifierSet, detail_query: &str) -> ProviderBatch;
}

/// Stage C capability: one batch per requested feature
#[async_trait]
pub trait SecondaryProvider: Send + Sync {
    async fn fetch(&self, ids: &IdentifierSet, features: &[String]) -> BTreeMap<String, ProviderBatch>;
}

/// Stage D capability: membrane annotations from one source
#[async_trait]
pub trait MembraneProvider: Send + Sync {
    fn source(&self) -> MembraneSource;

    async fn lookup(&self, ids: &IdentifierSet) -> ProviderBatch;
}

/// Best-effort structure downloads; success is checked by listing afterwards
#[async_trait]
pub trait StructureMaterializer: Send + Sync {
    async fn materialize(&self, method: StructureMethod, inputs: &[String], destination: &Path);
}

/// Identifiers of the files with `suffix` present in `dir`
#[async_trait]
pub trait FileListing: Send + Sync {
    async fn list(&self, dir: &Path, suffix: &str) -> std::io::Result<IdentifierSet>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn id(raw: &str) -> Identifier {
        Identifier::new(raw).unwrap()
    }

    #[test]
    fn test_memprotmd_uses_last_simulation() {
        let annotation = json!({"simulations": ["1abc_default_dppc", "1abc_default_popc"]});
        assert_eq!(
            MembraneSource::Memprotmd.materialization_input(&id("1abc"), &annotation),
            Some("1abc_default_popc".to_string())
        );
    }

    #[test]
    fn test_memprotmd_without_simulations_has_no_input() {
        let empty = json!({"simulations": []});
        let absent = json!({"_id": "1abc"});
        assert_eq!(MembraneSource::Memprotmd.materialization_input(&id("1abc"), &empty), None);
        assert_eq!(MembraneSource::Memprotmd.materialization_input(&id("1abc"), &absent), None);
    }

    #[test]
    fn test_other_sources_use_identifier() {
        let annotation = json!({});
        assert_eq!(
            MembraneSource::Pdbtm.materialization_input(&id("1ABC"), &annotation),
            Some("1abc".to_string())
        );
        assert_eq!(
            MembraneSource::Opm.materialization_input(&id("1abc"), &annotation),
            Some("1abc".to_string())
        );
    }

    #[test]
    fn test_batch_record_sorts_outcomes() {
        let mut batch = ProviderBatch::default();
        batch.record("test", id("1aaa"), Ok(Some(json!({"ok": true}))));
        batch.record("test", id("2bbb"), Ok(None));
        batch.record(
            "test",
            id("3ccc"),
            Err(ProviderError::Status {
                url: "http://example".to_string(),
                status: 500,
            }),
        );

        assert_eq!(batch.found_ids(), IdentifierSet::from([id("1aaa")]));
        assert!(batch.missing.contains("2bbb"));
        assert!(batch.failed["3ccc"].contains("500"));
    }

    #[test]
    fn test_membrane_source_serde_names() {
        let sources: Vec<MembraneSource> = serde_json::from_value(json!(["pdbtm", "opm", "memprotmd"])).unwrap();
        assert_eq!(
            sources,
            vec![MembraneSource::Pdbtm, MembraneSource::Opm, MembraneSource::Memprotmd]
        );
    }
}
