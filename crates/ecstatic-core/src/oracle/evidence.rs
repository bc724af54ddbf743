//! Evidence artifacts: one JSON document per checked pair and relation.
//!
//! Layout:
//! `<root>/<c1>_<c2>_<relation>_<label>_campaign<idx>/flowset_violation-<violated>_<dir>_<target>.json`
//! where `c1`/`c2` are the configuration file basenames up to the first `_`.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::job::{Flow, FinishedFuzzingJob};
use crate::model::Relation;
use crate::oracle::violation::{PartialOrder, PotentialViolation};

/// Findings preserved for one side of the comparison.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PreservedFlows {
    pub config: PathBuf,
    pub flows: Vec<Flow>,
}

/// Persisted evidence document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvidenceArtifact {
    pub config1: PathBuf,
    pub config2: PathBuf,
    #[serde(rename = "type")]
    pub relation: Relation,
    pub partial_order: String,
    pub violation: bool,
    pub generated_at: DateTime<Utc>,
    pub preserve: Vec<PreservedFlows>,
}

impl EvidenceArtifact {
    /// Build the artifact for `violation`, or `None` if it carries no partial order.
    pub fn from_violation(violation: &PotentialViolation) -> Option<Self> {
        let order = violation.primary_order()?;
        Some(Self {
            config1: violation.job1.configuration_location.clone(),
            config2: violation.job2.configuration_location.clone(),
            relation: order.relation,
            partial_order: order.label(),
            violation: violation.violated,
            generated_at: Utc::now(),
            preserve: vec![
                PreservedFlows {
                    config: violation.job1.configuration_location.clone(),
                    flows: violation.preserve1.iter().cloned().collect(),
                },
                PreservedFlows {
                    config: violation.job2.configuration_location.clone(),
                    flows: violation.preserve2.iter().cloned().collect(),
                },
            ],
        })
    }
}

/// Directory-backed store of evidence artifacts.
#[derive(Debug, Clone)]
pub struct EvidenceStore {
    root: PathBuf,
}

impl EvidenceStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory name for a compared pair, relative to the store root.
    pub fn directory_name(
        job1: &FinishedFuzzingJob,
        job2: &FinishedFuzzingJob,
        order: &PartialOrder,
        campaign_index: usize,
    ) -> String {
        format!(
            "{}_{}_{}_{}_campaign{}",
            config_stem(&job1.configuration_location),
            config_stem(&job2.configuration_location),
            order.relation,
            order.label(),
            campaign_index
        )
    }

    /// File name encoding the verdict and the target.
    pub fn file_name(violated: bool, job1: &FinishedFuzzingJob) -> String {
        format!(
            "flowset_violation-{}_{}_{}.json",
            violated,
            job1.job.target.parent_name(),
            job1.job.target.basename()
        )
    }

    /// Path an artifact for `violation` is (or would be) written to.
    pub fn path_for(&self, violation: &PotentialViolation, campaign_index: usize) -> Option<PathBuf> {
        let order = violation.primary_order()?;
        Some(
            self.root
                .join(Self::directory_name(
                    &violation.job1,
                    &violation.job2,
                    order,
                    campaign_index,
                ))
                .join(Self::file_name(violation.violated, &violation.job1)),
        )
    }

    /// Write the evidence artifact for `violation` and return its path.
    ///
    /// The write goes through a temp file in the target directory followed by
    /// a rename, so concurrent writers never observe a torn document.
    pub fn write(&self, violation: &PotentialViolation, campaign_index: usize) -> Result<PathBuf> {
        let artifact = EvidenceArtifact::from_violation(violation)
            .context("potential violation carries no partial order")?;
        let path = self
            .path_for(violation, campaign_index)
            .context("potential violation carries no partial order")?;
        let dir = path.parent().context("evidence path always has a parent")?;

        // create_dir_all treats a concurrently created directory as success.
        std::fs::create_dir_all(dir).with_context(|| format!("create {:?}", dir))?;

        let content =
            serde_json::to_string_pretty(&artifact).context("serialize evidence artifact")?;
        let mut tmp = NamedTempFile::new_in(dir).with_context(|| format!("temp file in {:?}", dir))?;
        tmp.write_all(content.as_bytes())?;
        tmp.persist(&path)
            .map_err(|e| e.error)
            .with_context(|| format!("write {:?}", path))?;
        Ok(path)
    }

    /// Read an artifact back.
    pub fn read(path: &Path) -> Result<EvidenceArtifact> {
        let raw = std::fs::read_to_string(path).with_context(|| format!("read {:?}", path))?;
        serde_json::from_str(&raw).with_context(|| format!("parse {:?}", path))
    }
}

fn config_stem(path: &Path) -> String {
    let base = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    base.split('_').next().unwrap_or_default().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::benchmark::BenchmarkRecord;
    use crate::job::{DetectedFlows, FlowSet, FuzzingJob};
    use std::collections::BTreeSet;

    fn finished(config: &str, level: &str) -> FinishedFuzzingJob {
        FinishedFuzzingJob {
            job: FuzzingJob::new(
                BenchmarkRecord::new("/bench/droidbench/app.apk"),
                [("cgalgo".to_string(), level.to_string())].into_iter().collect(),
                Some("cgalgo".to_string()),
            ),
            configuration_location: PathBuf::from(format!("/out/{config}_config.json")),
            results_location: PathBuf::from(format!("/out/{config}_results.json")),
            detected_flows: DetectedFlows::new(),
        }
    }

    fn violation(relation: Relation, violated: bool) -> PotentialViolation {
        let preserve2: FlowSet = [Flow::new("src", "sink")].into_iter().collect();
        PotentialViolation {
            job1: finished("aaa", "SPARK"),
            job2: finished("bbb", "CHA"),
            partial_orders: BTreeSet::from([PartialOrder {
                option: "cgalgo".to_string(),
                relation,
                left: "SPARK".to_string(),
                right: "CHA".to_string(),
            }]),
            violated,
            preserve1: FlowSet::new(),
            preserve2,
        }
    }

    #[test]
    fn test_path_layout() {
        let store = EvidenceStore::new("/evidence");
        let path = store.path_for(&violation(Relation::Soundness, true), 3).unwrap();
        assert_eq!(
            path,
            PathBuf::from(
                "/evidence/aaa_bbb_soundness_SPARK_more_soundness_than_CHA_campaign3/\
                 flowset_violation-true_droidbench_app.apk.json"
            )
        );
    }

    #[test]
    fn test_write_then_read_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let store = EvidenceStore::new(dir.path());
        let path = store.write(&violation(Relation::Precision, true), 1).unwrap();

        let artifact = EvidenceStore::read(&path).unwrap();
        assert_eq!(artifact.relation, Relation::Precision);
        assert_eq!(artifact.partial_order, "SPARK_more_precision_than_CHA");
        assert!(artifact.violation);
        assert_eq!(artifact.preserve.len(), 2);
        assert!(artifact.preserve[0].flows.is_empty());
        assert_eq!(artifact.preserve[1].flows, vec![Flow::new("src", "sink")]);

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["type"], "precision");
    }

    #[test]
    fn test_distinct_relations_never_overwrite_each_other() {
        let dir = tempfile::tempdir().unwrap();
        let store = EvidenceStore::new(dir.path());
        let soundness = store.write(&violation(Relation::Soundness, true), 1).unwrap();
        let precision = store.write(&violation(Relation::Precision, false), 1).unwrap();

        assert_ne!(soundness, precision);
        assert!(EvidenceStore::read(&soundness).unwrap().violation);
        assert!(!EvidenceStore::read(&precision).unwrap().violation);
    }

    #[test]
    fn test_existing_directory_is_tolerated() {
        let dir = tempfile::tempdir().unwrap();
        let store = EvidenceStore::new(dir.path());
        let v = violation(Relation::Soundness, false);
        let expected = store.path_for(&v, 2).unwrap();
        std::fs::create_dir_all(expected.parent().unwrap()).unwrap();

        assert_eq!(store.write(&v, 2).unwrap(), expected);
    }
}
