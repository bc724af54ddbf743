//! Delta-debugging predicates and their evaluation.
//!
//! The reduction driver calls the wrapper script once per candidate input. The
//! script loads a serialized [`DeltaDebuggingJob`], re-runs both jobs of the
//! violation against the candidate, re-derives violations with a single oracle
//! pass, and reports whether the predicate still holds.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::ToolCommand;
use crate::error::{DeltaDebugError, DeltaDebugResult};
use crate::job::{FinishedFuzzingJob, Flow};
use crate::model::OptionSpec;
use crate::oracle::{PotentialViolation, ViolationOracle};

/// File name of the serialized job inside a predicate directory.
pub const JOB_FILE: &str = "job.json";

/// What a reduced candidate must still exhibit to be kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ViolationPredicate {
    /// The pair still violates its partial order.
    StillViolated,
    /// The pair still violates, and `flow` is still among the offending findings.
    RetainsFlow { flow: Flow },
}

impl ViolationPredicate {
    pub fn holds(&self, violation: &PotentialViolation) -> bool {
        match self {
            ViolationPredicate::StillViolated => violation.violated,
            ViolationPredicate::RetainsFlow { flow } => {
                violation.violated && violation.offending_flows().contains(flow)
            }
        }
    }
}

/// One predicate per offending flow, so each finding is minimized on its own.
/// A violation without offending flows falls back to [`ViolationPredicate::StillViolated`].
pub fn make_predicates(violation: &PotentialViolation) -> Vec<ViolationPredicate> {
    let flows = violation.offending_flows();
    if flows.is_empty() {
        return vec![ViolationPredicate::StillViolated];
    }
    flows
        .into_iter()
        .map(|flow| ViolationPredicate::RetainsFlow { flow })
        .collect()
}

/// Everything the wrapper needs to re-run and re-judge a violation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeltaDebuggingJob {
    pub predicate: ViolationPredicate,
    pub potential_violation: PotentialViolation,
    pub tool: ToolCommand,
    pub options: Vec<OptionSpec>,
}

impl DeltaDebuggingJob {
    /// Serialize into `directory/job.json`.
    pub fn write(&self, directory: &Path) -> DeltaDebugResult<PathBuf> {
        let path = directory.join(JOB_FILE);
        std::fs::write(&path, serde_json::to_string_pretty(self)?)?;
        Ok(path)
    }

    pub fn read(path: &Path) -> DeltaDebugResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

/// Re-run both jobs of `job.potential_violation` and judge the predicate.
///
/// Exactly two runs execute concurrently. Re-derived violations are matched on
/// the original partial-order set: no match means the candidate no longer
/// reproduces (`false`); more than one match is
/// [`DeltaDebugError::AmbiguousViolationSet`].
pub async fn evaluate_predicate(
    job: &DeltaDebuggingJob,
    oracle: &ViolationOracle,
    output_folder: &Path,
) -> DeltaDebugResult<bool> {
    let runner = oracle.runner();
    let original = &job.potential_violation;

    let (first, second) = tokio::join!(
        runner.run(&original.job1.job, Some(output_folder)),
        runner.run(&original.job2.job, Some(output_folder)),
    );

    let finished: Vec<FinishedFuzzingJob> = [first, second]
        .into_iter()
        .filter_map(|result| match result {
            Ok(finished) => Some(finished),
            Err(e) => {
                warn!(error = %e, "candidate run failed");
                None
            }
        })
        .collect();

    let relevant: Vec<PotentialViolation> = oracle
        .detect(&finished)
        .into_iter()
        .filter(|v| v.same_partial_orders(original))
        .collect();

    match relevant.as_slice() {
        [] => {
            info!(
                partial_orders = %original.partial_orders_display(),
                "candidate no longer produces the compared pair"
            );
            Ok(false)
        }
        [violation] => Ok(job.predicate.holds(violation)),
        many => Err(DeltaDebugError::AmbiguousViolationSet {
            count: many.len(),
            partial_orders: original.partial_orders_display(),
        }),
    }
}
