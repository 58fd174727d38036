//! Staged curation funnel
//!
//! The working set only ever shrinks: each stage takes the previous stage's
//! identifiers and returns the subset it could enrich. Stages run strictly in
//! order, and so do the membrane rounds, since what one round resolves decides
//! what the next one is asked about.
//!
//! 1. **Primary**: RCSB entry details; entries the provider does not return
//!    are dropped.
//! 2. **Structure**: experimental mmCIF download, kept only if the file shows
//!    up in the structure directory.
//! 3. **Secondary**: PDBe-KB features, kept only if every feature came back.
//! 4. **Membrane**: annotation providers in preference order, kept only if
//!    the membrane structure shows up in the membrane directory.

use crate::curate::dataset::{tag_annotation, CuratedDataset, FunnelReport, StageReport};
use crate::curate::CurateError;
use crate::providers::{
    FileListing, MembraneProvider, PrimaryProvider, ProviderBatch, ProviderRecord,
    SecondaryProvider, StructureMaterializer, StructureMethod,
};
use mpdb_common::{Identifier, IdentifierSet};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Stage names used in reports and cancellation errors
pub mod stage {
    pub const PRIMARY: &str = "primary";
    pub const STRUCTURE: &str = "structure";
    pub const SECONDARY: &str = "secondary";
    pub const MEMBRANE: &str = "membrane";
}

/// Everything the funnel talks to
#[derive(Clone)]
pub struct Capabilities {
    pub primary: Arc<dyn PrimaryProvider>,
    pub secondary: Arc<dyn SecondaryProvider>,
    /// Highest preference first
    pub membrane: Vec<Arc<dyn MembraneProvider>>,
    pub materializer: Arc<dyn StructureMaterializer>,
    pub listing: Arc<dyn FileListing>,
}

#[derive(Debug, Clone)]
pub struct FunnelOptions {
    /// GraphQL detail query for the primary provider
    pub detail_query: String,
    /// Secondary features every entry must have
    pub features: Vec<String>,
    /// Where experimental structures are materialized
    pub structure_dir: PathBuf,
    /// Where membrane structures are materialized
    pub membrane_dir: PathBuf,
}

/// One stage's surviving identifiers plus what it collected on the way
#[derive(Debug, Clone)]
pub struct StageOutput<T> {
    pub working_set: IdentifierSet,
    pub data: T,
    pub report: StageReport,
}

/// Result of the membrane preference loop
#[derive(Debug, Clone, Default)]
pub struct MembraneResolution {
    /// Confirmed entries, in the order they were confirmed
    pub entries: Vec<Identifier>,
    pub annotations: ProviderRecord,
    /// One report per round that ran
    pub rounds: Vec<StageReport>,
}

/// Final dataset and the counts behind it
#[derive(Debug, Clone)]
pub struct Curation {
    pub dataset: CuratedDataset,
    pub report: FunnelReport,
}

pub struct Funnel {
    capabilities: Capabilities,
    options: FunnelOptions,
    cancel: CancellationToken,
}

impl Funnel {
    pub fn new(capabilities: Capabilities, options: FunnelOptions) -> Self {
        Self {
            capabilities,
            options,
            cancel: CancellationToken::new(),
        }
    }

    /// Stop between stages once `cancel` fires
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn options(&self) -> &FunnelOptions {
        &self.options
    }

    /// Drive `ids` through every stage
    pub async fn run(&self, ids: &IdentifierSet) -> Result<Curation, CurateError> {
        info!(entries = ids.len(), "Starting data curation");
        debug!(?ids, "Initial entries");

        let mut dataset = CuratedDataset::default();
        let mut report = FunnelReport::default();

        self.checkpoint(stage::PRIMARY)?;
        let primary = self.enrich_primary(ids).await;
        dataset.rcsb = primary.data;
        report.push(primary.report);

        self.checkpoint(stage::STRUCTURE)?;
        let structures = self.materialize_gate(&primary.working_set).await?;
        report.push(structures.report);

        self.checkpoint(stage::SECONDARY)?;
        let secondary = self.enrich_secondary(&structures.working_set).await;
        dataset.pdbe = secondary.data;
        report.push(secondary.report);

        let membrane = self.resolve_membrane(&secondary.working_set).await?;
        dataset.entries = membrane.entries;
        dataset.membrane = membrane.annotations;
        for round in membrane.rounds {
            report.push(round);
        }

        info!(
            entries = dataset.entries.len(),
            failed = report.total_failed(),
            "Final curated set: {} entries",
            dataset.entries.len()
        );
        debug!(entries = ?dataset.entries, "Final entries");

        Ok(Curation { dataset, report })
    }

    /// Stage A: keep what the primary provider knows about
    pub async fn enrich_primary(&self, ids: &IdentifierSet) -> StageOutput<ProviderRecord> {
        let mut report = StageReport::new(stage::PRIMARY, ids.len());
        if ids.is_empty() {
            return StageOutput {
                working_set: IdentifierSet::new(),
                data: ProviderRecord::new(),
                report,
            };
        }

        let batch = self
            .capabilities
            .primary
            .fetch(ids, &self.options.detail_query)
            .await;
        log_dropped(stage::PRIMARY, &batch);
        let data = restrict(batch.found, ids);
        let working_set: IdentifierSet = data.keys().cloned().collect();

        report.retained = working_set.len();
        report.failed = batch.failed.len();
        report.missing = report.dropped() - report.failed.min(report.dropped());

        StageOutput {
            working_set,
            data,
            report,
        }
    }

    /// Stage B: download experimental structures and keep what landed on disk
    pub async fn materialize_gate(&self, ids: &IdentifierSet) -> Result<StageOutput<()>, CurateError> {
        let mut report = StageReport::new(stage::STRUCTURE, ids.len());
        if ids.is_empty() {
            return Ok(StageOutput {
                working_set: IdentifierSet::new(),
                data: (),
                report,
            });
        }

        let method = StructureMethod::Rcsb;
        let inputs: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
        self.capabilities
            .materializer
            .materialize(method, &inputs, &self.options.structure_dir)
            .await;

        let on_disk = self.list(&self.options.structure_dir, method.file_suffix()).await?;
        let working_set: IdentifierSet = ids.intersection(&on_disk).cloned().collect();

        for id in ids.difference(&working_set) {
            warn!(entry = %id, "No experimental structure on disk, dropping entry");
        }

        report.retained = working_set.len();
        report.missing = report.dropped();
        Ok(StageOutput {
            working_set,
            data: (),
            report,
        })
    }

    /// Stage C: keep entries every requested feature came back for
    pub async fn enrich_secondary(
        &self,
        ids: &IdentifierSet,
    ) -> StageOutput<BTreeMap<String, ProviderRecord>> {
        let mut report = StageReport::new(stage::SECONDARY, ids.len());
        let features = &self.options.features;

        if features.is_empty() {
            debug!("No secondary features requested, passing entries through");
            report.retained = ids.len();
            return StageOutput {
                working_set: ids.clone(),
                data: BTreeMap::new(),
                report,
            };
        }

        let mut batches = if ids.is_empty() {
            BTreeMap::new()
        } else {
            self.capabilities.secondary.fetch(ids, features).await
        };

        let mut working_set = ids.clone();
        let mut data = BTreeMap::new();
        let mut missing = IdentifierSet::new();
        let mut failed = IdentifierSet::new();

        for feature in features {
            let batch = batches.remove(feature).unwrap_or_default();
            log_dropped(feature, &batch);
            missing.extend(batch.missing);
            failed.extend(batch.failed.into_keys());
            let records = restrict(batch.found, ids);
            working_set.retain(|id| records.contains_key(id));
            data.insert(feature.clone(), records);
        }

        report.retained = working_set.len();
        report.failed = failed.len();
        report.missing = missing.difference(&failed).count();
        StageOutput {
            working_set,
            data,
            report,
        }
    }

    /// Stage D: walk the membrane providers in preference order.
    ///
    /// An entry counts as resolved by a round only if that round asked for its
    /// structure and the file is on disk afterwards. Resolved entries are
    /// never offered to a later provider.
    pub async fn resolve_membrane(&self, ids: &IdentifierSet) -> Result<MembraneResolution, CurateError> {
        let mut resolution = MembraneResolution::default();
        let mut remaining = ids.clone();
        let mut processed = IdentifierSet::new();

        for provider in &self.capabilities.membrane {
            let source = provider.source();
            let stage_name = format!("{}:{}", stage::MEMBRANE, source);
            self.checkpoint(&stage_name)?;

            remaining = remaining.difference(&processed).cloned().collect();
            if remaining.is_empty() {
                debug!(source = %source, "No entries left, skipping remaining membrane providers");
                break;
            }

            let mut report = StageReport::new(stage_name, remaining.len());
            let batch = provider.lookup(&remaining).await;
            log_dropped(source.name(), &batch);
            report.failed = batch.failed.len();
            let found = restrict(batch.found, &remaining);

            // entry -> identifier its structure file is named after
            let method = source.structure_method();
            let mut expected = BTreeMap::new();
            let mut inputs = Vec::new();
            for (id, annotation) in &found {
                let Some(input) = source.materialization_input(id, annotation) else {
                    debug!(source = %source, entry = %id, "Nothing to materialize");
                    continue;
                };
                match expected_file(method, &input) {
                    Some(file_id) => {
                        expected.insert(id.clone(), file_id);
                        inputs.push(input);
                    }
                    None => warn!(source = %source, entry = %id, input = %input, "Unusable structure reference"),
                }
            }

            processed = if inputs.is_empty() {
                IdentifierSet::new()
            } else {
                self.capabilities
                    .materializer
                    .materialize(method, &inputs, &self.options.membrane_dir)
                    .await;
                let on_disk = self.list(&self.options.membrane_dir, method.file_suffix()).await?;
                expected
                    .iter()
                    .filter(|(_, file_id)| on_disk.contains(*file_id))
                    .map(|(id, _)| id.clone())
                    .collect()
            };

            for id in &processed {
                resolution.entries.push(id.clone());
                if let Some(annotation) = found.get(id) {
                    resolution
                        .annotations
                        .entry(id.clone())
                        .or_insert_with(|| tag_annotation(annotation.clone(), source));
                }
            }

            report.retained = processed.len();
            report.missing = report.dropped() - report.failed.min(report.dropped());
            debug!(source = %source, processed = ?processed, "Processed entries");
            resolution.rounds.push(report);
        }

        Ok(resolution)
    }

    fn checkpoint(&self, stage: &str) -> Result<(), CurateError> {
        if self.cancel.is_cancelled() {
            warn!(stage, "Curation cancelled");
            return Err(CurateError::Cancelled {
                stage: stage.to_string(),
            });
        }
        Ok(())
    }

    async fn list(&self, dir: &Path, suffix: &str) -> Result<IdentifierSet, CurateError> {
        self.capabilities
            .listing
            .list(dir, suffix)
            .await
            .map_err(|source| CurateError::Listing {
                dir: dir.to_path_buf(),
                source,
            })
    }
}

/// Drop records for identifiers the stage was not asked about
fn restrict(records: ProviderRecord, ids: &IdentifierSet) -> ProviderRecord {
    records.into_iter().filter(|(id, _)| ids.contains(id)).collect()
}

fn expected_file(method: StructureMethod, input: &str) -> Option<Identifier> {
    let name = method.file_name(input).ok()?;
    Identifier::from_file_name(&name, method.file_suffix())
}

fn log_dropped(provider: &str, batch: &ProviderBatch) {
    if !batch.missing.is_empty() {
        let missing: BTreeSet<&str> = batch.missing.iter().map(Identifier::as_str).collect();
        debug!(provider, ?missing, "Entries not found");
    }
    for (id, error) in &batch.failed {
        warn!(provider, entry = %id, error = %error, "Dropping entry after failed request");
    }
}
