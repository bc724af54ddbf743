//! Fuzzing jobs, campaigns and the findings they produce.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::benchmark::BenchmarkRecord;

/// Category label for true-positive-like findings.
pub const TRUE_POSITIVE: &str = "tp";

/// Category label for false-positive-like findings.
pub const FALSE_POSITIVE: &str = "fp";

/// One finding reported by the analyzer (a data-flow leak, a call-graph edge, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Flow {
    pub source: String,
    pub sink: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
}

impl Flow {
    pub fn new(source: impl Into<String>, sink: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            sink: sink.into(),
            attributes: BTreeMap::new(),
        }
    }
}

pub type FlowSet = BTreeSet<Flow>;

/// Findings partitioned by category label.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DetectedFlows(BTreeMap<String, FlowSet>);

impl DetectedFlows {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from true-positive and false-positive sets.
    pub fn from_sets(tp: FlowSet, fp: FlowSet) -> Self {
        let mut flows = Self::new();
        flows.insert(TRUE_POSITIVE, tp);
        flows.insert(FALSE_POSITIVE, fp);
        flows
    }

    pub fn insert(&mut self, category: impl Into<String>, flows: FlowSet) {
        self.0.insert(category.into(), flows);
    }

    /// Findings in `category`; a missing category is an empty set.
    pub fn get(&self, category: &str) -> &FlowSet {
        static EMPTY: FlowSet = BTreeSet::new();
        self.0.get(category).unwrap_or(&EMPTY)
    }

    pub fn tp(&self) -> &FlowSet {
        self.get(TRUE_POSITIVE)
    }

    pub fn fp(&self) -> &FlowSet {
        self.get(FALSE_POSITIVE)
    }

    pub fn total(&self) -> usize {
        self.0.values().map(BTreeSet::len).sum()
    }
}

/// Option name → level name, one level per option.
pub type Configuration = BTreeMap<String, String>;

/// One analyzer invocation to perform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FuzzingJob {
    /// Hand-written campaign files may omit it; a fresh id is assigned.
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub target: BenchmarkRecord,
    pub configuration: Configuration,
    /// The option whose levels are compared across a pair; `None` means
    /// "adopt the partner's".
    #[serde(default)]
    pub option_under_investigation: Option<String>,
}

impl FuzzingJob {
    pub fn new(
        target: BenchmarkRecord,
        configuration: Configuration,
        option_under_investigation: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            target,
            configuration,
            option_under_investigation,
        }
    }

    /// Level of `option` in this job's configuration.
    pub fn level_of(&self, option: &str) -> Option<&str> {
        self.configuration.get(option).map(String::as_str)
    }
}

/// A job the runner completed, with its parsed findings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinishedFuzzingJob {
    pub job: FuzzingJob,
    /// Serialized configuration the tool was run with.
    pub configuration_location: PathBuf,
    /// Raw tool output.
    pub results_location: PathBuf,
    pub detected_flows: DetectedFlows,
}

/// A batch of jobs generated together.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FuzzingCampaign {
    pub jobs: Vec<FuzzingJob>,
}

/// The jobs of a campaign that finished; failed jobs are already filtered out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinishedCampaign {
    pub finished_jobs: Vec<FinishedFuzzingJob>,
}
