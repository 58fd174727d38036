//! Curated dataset document and per-stage accounting

use crate::providers::{MembraneSource, ProviderRecord};
use mpdb_common::Identifier;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::info;

/// Key naming the provider of a membrane annotation
pub const SOURCE_KEY: &str = "_source";

/// The document written to `data.json`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CuratedDataset {
    /// Curated entries in the order the membrane rounds confirmed them
    pub entries: Vec<Identifier>,
    /// Every RCSB record returned, including entries dropped later
    pub rcsb: ProviderRecord,
    /// Feature name to PDBe records
    pub pdbe: BTreeMap<String, ProviderRecord>,
    /// Annotation of each curated entry, tagged with its provider
    pub membrane: ProviderRecord,
}

/// Tag an annotation with the provider it came from.
///
/// Non-object annotations are wrapped so the tag has somewhere to go.
pub fn tag_annotation(annotation: Value, source: MembraneSource) -> Value {
    let mut object = match annotation {
        Value::Object(object) => object,
        other => {
            let mut object = Map::new();
            object.insert("annotation".to_string(), other);
            object
        }
    };
    object.insert(SOURCE_KEY.to_string(), Value::String(source.name().to_string()));
    Value::Object(object)
}

/// Counts for one funnel stage or membrane round
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageReport {
    pub stage: String,
    pub input: usize,
    pub retained: usize,
    /// Answered "no such entry", or not materialized
    pub missing: usize,
    /// Request failed
    pub failed: usize,
}

impl StageReport {
    pub fn new(stage: impl Into<String>, input: usize) -> Self {
        Self {
            stage: stage.into(),
            input,
            retained: 0,
            missing: 0,
            failed: 0,
        }
    }

    pub fn dropped(&self) -> usize {
        self.input.saturating_sub(self.retained)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunnelReport {
    pub stages: Vec<StageReport>,
}

impl FunnelReport {
    pub fn push(&mut self, report: StageReport) {
        info!(
            stage = %report.stage,
            input = report.input,
            retained = report.retained,
            missing = report.missing,
            failed = report.failed,
            "{}: {} entries retained",
            report.stage,
            report.retained
        );
        self.stages.push(report);
    }

    pub fn stage(&self, name: &str) -> Option<&StageReport> {
        self.stages.iter().find(|report| report.stage == name)
    }

    /// Entries lost to request failures across every stage
    pub fn total_failed(&self) -> usize {
        self.stages.iter().map(|report| report.failed).sum()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tag_object_annotation() {
        let tagged = tag_annotation(json!({"thickness": 31.2}), MembraneSource::Opm);
        assert_eq!(tagged, json!({"thickness": 31.2, "_source": "opm"}));
    }

    #[test]
    fn test_tag_wraps_non_objects() {
        let tagged = tag_annotation(json!(["a", "b"]), MembraneSource::Pdbtm);
        assert_eq!(tagged, json!({"annotation": ["a", "b"], "_source": "pdbtm"}));
    }

    #[test]
    fn test_dataset_shape() {
        let mut dataset = CuratedDataset::default();
        let id = Identifier::new("1CBS").unwrap();
        dataset.entries.push(id.clone());
        dataset.rcsb.insert(id.clone(), json!({"rcsb_id": "1CBS"}));
        dataset
            .pdbe
            .entry("residues".to_string())
            .or_default()
            .insert(id.clone(), json!({"molecules": []}));
        dataset
            .membrane
            .insert(id, tag_annotation(json!({}), MembraneSource::Memprotmd));

        let value = serde_json::to_value(&dataset).unwrap();
        assert_eq!(value["entries"], json!(["1cbs"]));
        assert_eq!(value["rcsb"]["1cbs"]["rcsb_id"], "1CBS");
        assert_eq!(value["pdbe"]["residues"]["1cbs"], json!({"molecules": []}));
        assert_eq!(value["membrane"]["1cbs"]["_source"], "memprotmd");

        let back: CuratedDataset = serde_json::from_value(value).unwrap();
        assert_eq!(back, dataset);
    }

    #[test]
    fn test_report_lookup() {
        let mut report = FunnelReport::default();
        let mut stage = StageReport::new("primary", 3);
        stage.retained = 2;
        stage.failed = 1;
        report.push(stage);

        assert_eq!(report.stage("primary").unwrap().dropped(), 1);
        assert_eq!(report.total_failed(), 1);
        assert!(report.stage("secondary").is_none());
    }
}
