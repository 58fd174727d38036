//! Curation funnel behaviour against in-memory providers
#![allow(clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use mpdb_common::identifier::identifier_set;
use mpdb_common::{Identifier, IdentifierSet};
use mpdb_ingest::curate::{Capabilities, CurateError, Funnel, FunnelOptions, SOURCE_KEY};
use mpdb_ingest::providers::{
    FileListing, LocalDirectory, MembraneProvider, MembraneSource, PrimaryProvider, ProviderBatch,
    ProviderRecord, SecondaryProvider, StructureMaterializer, StructureMethod,
};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Mocks
// ============================================================================

fn ids(raw: &[&str]) -> IdentifierSet {
    identifier_set(raw).unwrap()
}

fn records(raw: &[&str]) -> ProviderRecord {
    raw.iter()
        .map(|r| (Identifier::new(r).unwrap(), json!({"entry": r})))
        .collect()
}

/// Answers with every record it holds, whatever it was asked
struct MockPrimary {
    records: ProviderRecord,
    failing: IdentifierSet,
    calls: AtomicUsize,
}

impl MockPrimary {
    fn new(records: ProviderRecord) -> Self {
        Self {
            records,
            failing: IdentifierSet::new(),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl PrimaryProvider for MockPrimary {
    async fn fetch(&self, ids: &IdentifierSet, _detail_query: &str) -> ProviderBatch {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut batch = ProviderBatch {
            found: self.records.clone(),
            ..ProviderBatch::default()
        };
        for id in ids {
            if self.failing.contains(id) {
                batch.failed.insert(id.clone(), "503".to_string());
            } else if !self.records.contains_key(id) {
                batch.missing.insert(id.clone());
            }
        }
        batch
    }
}

struct MockSecondary {
    features: BTreeMap<String, IdentifierSet>,
    calls: AtomicUsize,
}

impl MockSecondary {
    fn new(features: Vec<(&str, IdentifierSet)>) -> Self {
        Self {
            features: features
                .into_iter()
                .map(|(name, found)| (name.to_string(), found))
                .collect(),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl SecondaryProvider for MockSecondary {
    async fn fetch(&self, ids: &IdentifierSet, features: &[String]) -> BTreeMap<String, ProviderBatch> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        features
            .iter()
            .map(|feature| {
                let known = self.features.get(feature).cloned().unwrap_or_default();
                let mut batch = ProviderBatch::default();
                for id in ids {
                    if known.contains(id) {
                        batch.found.insert(id.clone(), json!({"feature": feature}));
                    } else {
                        batch.missing.insert(id.clone());
                    }
                }
                (feature.clone(), batch)
            })
            .collect()
    }
}

struct MockMembrane {
    source: MembraneSource,
    annotations: ProviderRecord,
    seen: Mutex<Vec<IdentifierSet>>,
}

impl MockMembrane {
    fn new(source: MembraneSource, annotations: ProviderRecord) -> Arc<Self> {
        Arc::new(Self {
            source,
            annotations,
            seen: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    fn asked(&self) -> Vec<IdentifierSet> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl MembraneProvider for MockMembrane {
    fn source(&self) -> MembraneSource {
        self.source
    }

    async fn lookup(&self, ids: &IdentifierSet) -> ProviderBatch {
        self.seen.lock().unwrap().push(ids.clone());
        let mut batch = ProviderBatch::default();
        for id in ids {
            match self.annotations.get(id) {
                Some(annotation) => {
                    batch.found.insert(id.clone(), annotation.clone());
                }
                None => {
                    batch.missing.insert(id.clone());
                }
            }
        }
        batch
    }
}

/// Writes one file per input unless the (method, input) pair is refused
#[derive(Default)]
struct DiskMaterializer {
    refused: HashSet<(StructureMethod, String)>,
    requests: Mutex<Vec<(StructureMethod, Vec<String>)>>,
}

impl DiskMaterializer {
    fn refusing(pairs: &[(StructureMethod, &str)]) -> Self {
        Self {
            refused: pairs.iter().map(|(m, i)| (*m, i.to_string())).collect(),
            ..Self::default()
        }
    }

    fn requests_for(&self, method: StructureMethod) -> Vec<Vec<String>> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, _)| *m == method)
            .map(|(_, inputs)| inputs.clone())
            .collect()
    }
}

#[async_trait]
impl StructureMaterializer for DiskMaterializer {
    async fn materialize(&self, method: StructureMethod, inputs: &[String], destination: &Path) {
        self.requests.lock().unwrap().push((method, inputs.to_vec()));
        std::fs::create_dir_all(destination).unwrap();
        for input in inputs {
            if self.refused.contains(&(method, input.clone())) {
                continue;
            }
            let name = method.file_name(input).unwrap();
            std::fs::write(destination.join(name), "ATOM").unwrap();
        }
    }
}

struct BrokenListing;

#[async_trait]
impl FileListing for BrokenListing {
    async fn list(&self, _dir: &Path, _suffix: &str) -> std::io::Result<IdentifierSet> {
        Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"))
    }
}

struct Harness {
    dir: TempDir,
    primary: Arc<MockPrimary>,
    secondary: Arc<MockSecondary>,
    membrane: Vec<Arc<MockMembrane>>,
    materializer: Arc<DiskMaterializer>,
    listing: Arc<dyn FileListing>,
}

impl Harness {
    fn new(primary: MockPrimary, secondary: MockSecondary, membrane: Vec<Arc<MockMembrane>>) -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
            primary: Arc::new(primary),
            secondary: Arc::new(secondary),
            membrane,
            materializer: Arc::new(DiskMaterializer::default()),
            listing: Arc::new(LocalDirectory),
        }
    }

    fn with_materializer(mut self, materializer: DiskMaterializer) -> Self {
        self.materializer = Arc::new(materializer);
        self
    }

    fn funnel(&self, features: &[&str]) -> Funnel {
        let capabilities = Capabilities {
            primary: self.primary.clone(),
            secondary: self.secondary.clone(),
            membrane: self
                .membrane
                .iter()
                .map(|m| m.clone() as Arc<dyn MembraneProvider>)
                .collect(),
            materializer: self.materializer.clone(),
            listing: self.listing.clone(),
        };
        Funnel::new(
            capabilities,
            FunnelOptions {
                detail_query: "query { entries { rcsb_id } }".to_string(),
                features: features.iter().map(|f| f.to_string()).collect(),
                structure_dir: self.dir.path().join("pdb"),
                membrane_dir: self.dir.path().join("tm"),
            },
        )
    }
}

fn entry_names(entries: &[Identifier]) -> Vec<&str> {
    entries.iter().map(Identifier::as_str).collect()
}

// ============================================================================
// Stages
// ============================================================================

#[tokio::test]
async fn test_secondary_intersection_across_features() {
    let harness = Harness::new(
        MockPrimary::new(records(&["1aaa", "2bbb", "3ccc"])),
        MockSecondary::new(vec![("x", ids(&["1aaa"])), ("y", ids(&["1aaa", "2bbb"]))]),
        vec![],
    )
    .with_materializer(DiskMaterializer::refusing(&[(StructureMethod::Rcsb, "3ccc")]));
    let funnel = harness.funnel(&["x", "y"]);

    let primary = funnel.enrich_primary(&ids(&["1aaa", "2bbb", "3ccc"])).await;
    assert_eq!(primary.working_set, ids(&["1aaa", "2bbb", "3ccc"]));

    let structures = funnel.materialize_gate(&primary.working_set).await.unwrap();
    assert_eq!(structures.working_set, ids(&["1aaa", "2bbb"]));

    let secondary = funnel.enrich_secondary(&structures.working_set).await;
    assert_eq!(secondary.working_set, ids(&["1aaa"]));
    assert_eq!(secondary.data["x"].len(), 1);
    assert_eq!(secondary.data["y"].len(), 2);
    assert_eq!(secondary.report.retained, 1);
}

#[tokio::test]
async fn test_primary_never_grows_the_working_set() {
    let harness = Harness::new(
        MockPrimary::new(records(&["1aaa", "2bbb", "9zzz"])),
        MockSecondary::new(vec![]),
        vec![],
    );
    let funnel = harness.funnel(&[]);

    let primary = funnel.enrich_primary(&ids(&["1aaa", "2bbb", "3ccc"])).await;

    assert_eq!(primary.working_set, ids(&["1aaa", "2bbb"]));
    assert!(!primary.data.contains_key("9zzz"));
    assert_eq!(primary.report.input, 3);
    assert_eq!(primary.report.retained, 2);
    assert_eq!(primary.report.missing, 1);
}

#[tokio::test]
async fn test_primary_distinguishes_failed_from_missing() {
    let mut primary = MockPrimary::new(records(&["1aaa"]));
    primary.failing = ids(&["2bbb"]);
    let harness = Harness::new(primary, MockSecondary::new(vec![]), vec![]);

    let output = harness
        .funnel(&[])
        .enrich_primary(&ids(&["1aaa", "2bbb", "3ccc"]))
        .await;

    assert_eq!(output.working_set, ids(&["1aaa"]));
    assert_eq!(output.report.failed, 1);
    assert_eq!(output.report.missing, 1);
}

#[tokio::test]
async fn test_zero_features_pass_through() {
    let harness = Harness::new(MockPrimary::new(records(&[])), MockSecondary::new(vec![]), vec![]);
    let funnel = harness.funnel(&[]);

    let output = funnel.enrich_secondary(&ids(&["1aaa", "2bbb"])).await;

    assert_eq!(output.working_set, ids(&["1aaa", "2bbb"]));
    assert!(output.data.is_empty());
    assert_eq!(harness.secondary.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_identifier_case_is_irrelevant() {
    let harness = Harness::new(
        MockPrimary::new(records(&["1CBS"])),
        MockSecondary::new(vec![]),
        vec![],
    )
    .with_materializer(DiskMaterializer::refusing(&[(StructureMethod::Rcsb, "1cbs")]));
    let funnel = harness.funnel(&[]);

    let upper = funnel.enrich_primary(&ids(&["1CBS"])).await;
    let lower = funnel.enrich_primary(&ids(&["1cbs"])).await;
    assert_eq!(upper.working_set, lower.working_set);
    assert_eq!(upper.data, lower.data);

    // A file written with an upper-case name still counts
    let pdb = harness.dir.path().join("pdb");
    std::fs::create_dir_all(&pdb).unwrap();
    std::fs::write(pdb.join("1CBS.CIF"), "data_1CBS").unwrap();
    let gate = funnel.materialize_gate(&upper.working_set).await.unwrap();
    assert_eq!(gate.working_set, ids(&["1cbs"]));
}

#[tokio::test]
async fn test_empty_working_set_runs_trivially() {
    let pdbtm = MockMembrane::new(MembraneSource::Pdbtm, records(&[]));
    let harness = Harness::new(
        MockPrimary::new(records(&[])),
        MockSecondary::new(vec![("x", IdentifierSet::new())]),
        vec![pdbtm.clone()],
    );

    let curation = harness.funnel(&["x"]).run(&IdentifierSet::new()).await.unwrap();

    assert!(curation.dataset.entries.is_empty());
    assert_eq!(harness.primary.calls.load(Ordering::SeqCst), 0);
    assert_eq!(harness.secondary.calls.load(Ordering::SeqCst), 0);
    assert_eq!(pdbtm.calls(), 0);
    assert!(harness.materializer.requests.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_listing_failure_is_fatal() {
    let mut harness = Harness::new(
        MockPrimary::new(records(&["1aaa"])),
        MockSecondary::new(vec![]),
        vec![],
    );
    harness.listing = Arc::new(BrokenListing);

    let err = harness.funnel(&[]).run(&ids(&["1aaa"])).await.unwrap_err();
    assert!(matches!(err, CurateError::Listing { .. }));
}

// ============================================================================
// Membrane preference loop
// ============================================================================

#[tokio::test]
async fn test_resolved_entries_are_not_offered_to_lower_preference() {
    let pdbtm = MockMembrane::new(MembraneSource::Pdbtm, records(&["1aaa"]));
    let opm = MockMembrane::new(MembraneSource::Opm, records(&["1aaa", "2bbb"]));
    let memprotmd = MockMembrane::new(
        MembraneSource::Memprotmd,
        [(
            Identifier::new("3ccc").unwrap(),
            json!({"simulations": ["3ccc_default_dppc"]}),
        )]
        .into_iter()
        .collect(),
    );
    let harness = Harness::new(
        MockPrimary::new(records(&[])),
        MockSecondary::new(vec![]),
        vec![pdbtm.clone(), opm.clone(), memprotmd.clone()],
    );

    let resolution = harness
        .funnel(&[])
        .resolve_membrane(&ids(&["1aaa", "2bbb", "3ccc"]))
        .await
        .unwrap();

    assert_eq!(pdbtm.asked(), vec![ids(&["1aaa", "2bbb", "3ccc"])]);
    assert_eq!(opm.asked(), vec![ids(&["2bbb", "3ccc"])]);
    assert_eq!(memprotmd.asked(), vec![ids(&["3ccc"])]);
    assert_eq!(entry_names(&resolution.entries), vec!["1aaa", "2bbb", "3ccc"]);
    assert_eq!(resolution.annotations["1aaa"][SOURCE_KEY], "pdbtm");
    assert_eq!(resolution.annotations["2bbb"][SOURCE_KEY], "opm");
    assert_eq!(resolution.annotations["3ccc"][SOURCE_KEY], "memprotmd");
    assert_eq!(
        harness.materializer.requests_for(StructureMethod::Memprotmd),
        vec![vec!["3ccc_default_dppc".to_string()]]
    );
}

#[tokio::test]
async fn test_short_circuit_once_nothing_remains() {
    let pdbtm = MockMembrane::new(MembraneSource::Pdbtm, records(&["1aaa", "2bbb"]));
    let opm = MockMembrane::new(MembraneSource::Opm, records(&["1aaa", "2bbb"]));
    let memprotmd = MockMembrane::new(MembraneSource::Memprotmd, records(&[]));
    let harness = Harness::new(
        MockPrimary::new(records(&[])),
        MockSecondary::new(vec![]),
        vec![pdbtm.clone(), opm.clone(), memprotmd.clone()],
    );

    let resolution = harness
        .funnel(&[])
        .resolve_membrane(&ids(&["1aaa", "2bbb"]))
        .await
        .unwrap();

    assert_eq!(pdbtm.calls(), 1);
    assert_eq!(opm.calls(), 0);
    assert_eq!(memprotmd.calls(), 0);
    assert_eq!(resolution.rounds.len(), 1);
    assert_eq!(resolution.entries.len(), 2);
}

#[tokio::test]
async fn test_failed_materialization_falls_through_to_next_provider() {
    let pdbtm = MockMembrane::new(MembraneSource::Pdbtm, records(&["1aaa"]));
    let opm = MockMembrane::new(MembraneSource::Opm, records(&["1aaa"]));
    let harness = Harness::new(
        MockPrimary::new(records(&[])),
        MockSecondary::new(vec![]),
        vec![pdbtm.clone(), opm.clone()],
    )
    .with_materializer(DiskMaterializer::refusing(&[(StructureMethod::Pdbtm, "1aaa")]));

    let resolution = harness
        .funnel(&[])
        .resolve_membrane(&ids(&["1aaa"]))
        .await
        .unwrap();

    assert_eq!(opm.asked(), vec![ids(&["1aaa"])]);
    assert_eq!(entry_names(&resolution.entries), vec!["1aaa"]);
    assert_eq!(resolution.annotations["1aaa"][SOURCE_KEY], "opm");
}

#[tokio::test]
async fn test_empty_simulation_list_is_not_processed() {
    let memprotmd = MockMembrane::new(
        MembraneSource::Memprotmd,
        [
            (Identifier::new("1aaa").unwrap(), json!({"simulations": []})),
            (
                Identifier::new("2bbb").unwrap(),
                json!({"simulations": ["2bbb_default_dppc", "2bbb_default_popc"]}),
            ),
            (Identifier::new("3ccc").unwrap(), json!({"_id": "3ccc"})),
        ]
        .into_iter()
        .collect(),
    );
    let harness = Harness::new(
        MockPrimary::new(records(&[])),
        MockSecondary::new(vec![]),
        vec![memprotmd.clone()],
    );

    let resolution = harness
        .funnel(&[])
        .resolve_membrane(&ids(&["1aaa", "2bbb", "3ccc"]))
        .await
        .unwrap();

    assert_eq!(
        harness.materializer.requests_for(StructureMethod::Memprotmd),
        vec![vec!["2bbb_default_popc".to_string()]]
    );
    assert_eq!(entry_names(&resolution.entries), vec!["2bbb"]);
    assert!(!resolution.annotations.contains_key("1aaa"));
    assert!(!resolution.annotations.contains_key("3ccc"));
}

#[tokio::test]
async fn test_stale_membrane_file_does_not_resolve_unrequested_entry() {
    let opm = MockMembrane::new(MembraneSource::Opm, records(&["2bbb"]));
    let harness = Harness::new(
        MockPrimary::new(records(&[])),
        MockSecondary::new(vec![]),
        vec![opm],
    );
    let tm = harness.dir.path().join("tm");
    std::fs::create_dir_all(&tm).unwrap();
    std::fs::write(tm.join("1aaa.pdb"), "ATOM").unwrap();

    let resolution = harness
        .funnel(&[])
        .resolve_membrane(&ids(&["1aaa", "2bbb"]))
        .await
        .unwrap();

    assert_eq!(entry_names(&resolution.entries), vec!["2bbb"]);
}

// ============================================================================
// Full runs
// ============================================================================

#[tokio::test]
async fn test_end_to_end_run() {
    let pdbtm = MockMembrane::new(MembraneSource::Pdbtm, records(&["1aaa"]));
    let harness = Harness::new(
        MockPrimary::new(records(&["1aaa", "2bbb", "3ccc"])),
        MockSecondary::new(vec![("x", ids(&["1aaa"])), ("y", ids(&["1aaa", "2bbb"]))]),
        vec![pdbtm],
    )
    .with_materializer(DiskMaterializer::refusing(&[(StructureMethod::Rcsb, "3ccc")]));

    let curation = harness
        .funnel(&["x", "y"])
        .run(&ids(&["1AAA", "2bbb", "3ccc"]))
        .await
        .unwrap();

    let dataset = &curation.dataset;
    assert_eq!(entry_names(&dataset.entries), vec!["1aaa"]);
    assert_eq!(dataset.rcsb.len(), 3);
    assert_eq!(dataset.pdbe["y"].len(), 2);
    assert_eq!(
        dataset.membrane["1aaa"],
        json!({"entry": "1aaa", "_source": "pdbtm"})
    );

    let stages: Vec<(&str, usize, usize)> = curation
        .report
        .stages
        .iter()
        .map(|s| (s.stage.as_str(), s.input, s.retained))
        .collect();
    assert_eq!(
        stages,
        vec![
            ("primary", 3, 3),
            ("structure", 3, 2),
            ("secondary", 2, 1),
            ("membrane:pdbtm", 1, 1),
        ]
    );
    for stage in &curation.report.stages {
        assert!(stage.retained <= stage.input, "{} grew", stage.stage);
    }
}

#[tokio::test]
async fn test_cancelled_run_stops_before_any_stage() {
    let harness = Harness::new(
        MockPrimary::new(records(&["1aaa"])),
        MockSecondary::new(vec![]),
        vec![],
    );
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = harness
        .funnel(&[])
        .with_cancellation(cancel)
        .run(&ids(&["1aaa"]))
        .await
        .unwrap_err();

    assert!(matches!(err, CurateError::Cancelled { ref stage } if stage == "primary"));
    assert_eq!(harness.primary.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_dataset_serializes_membrane_value() {
    let pdbtm = MockMembrane::new(
        MembraneSource::Pdbtm,
        [(Identifier::new("1aaa").unwrap(), json!("TMH"))].into_iter().collect(),
    );
    let harness = Harness::new(MockPrimary::new(records(&[])), MockSecondary::new(vec![]), vec![pdbtm]);

    let resolution = harness
        .funnel(&[])
        .resolve_membrane(&ids(&["1aaa"]))
        .await
        .unwrap();

    let annotation: &Value = &resolution.annotations["1aaa"];
    assert_eq!(annotation, &json!({"annotation": "TMH", "_source": "pdbtm"}));
}
