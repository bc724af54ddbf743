//! Violation oracle.
//!
//! Pairs finished jobs that share a target, asks the [`OptionModel`] which
//! direction the option under investigation should move the results, and
//! flags pairs whose findings break that monotonicity:
//!
//! - soundness: if F is at least as sound as G, then `G.tp - F.tp` must be empty
//! - precision: if F is at least as precise as G, then `F.fp - G.fp` must be empty
//!
//! Suspected violations are re-verified by re-running both jobs before they are
//! reported. Every applied relation yields one [`PotentialViolation`], violated
//! or not, and optionally one evidence artifact.

pub mod evidence;
pub mod violation;

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::error::{OracleError, OracleResult};
use crate::job::{FinishedCampaign, FinishedFuzzingJob, FlowSet};
use crate::model::{OptionModel, Relation};
use crate::obs;
use crate::runner::{discard_results, JobRunner};

pub use evidence::{EvidenceArtifact, EvidenceStore, PreservedFlows};
pub use violation::{PartialOrder, PotentialViolation};

/// One relation that applied to a pair, with its first-pass verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub order: PartialOrder,
    pub violated: bool,
}

/// Compares finished jobs against the partial-order model.
pub struct ViolationOracle {
    model: Arc<OptionModel>,
    runner: Arc<dyn JobRunner>,
    store: Option<EvidenceStore>,
    verify: bool,
}

impl ViolationOracle {
    pub fn new(model: Arc<OptionModel>, runner: Arc<dyn JobRunner>) -> Self {
        Self {
            model,
            runner,
            store: None,
            verify: true,
        }
    }

    /// Persist one evidence artifact per checked pair and relation.
    pub fn with_evidence_store(mut self, store: EvidenceStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Enable or disable re-running suspected violations.
    pub fn with_verification(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    pub fn model(&self) -> &OptionModel {
        &self.model
    }

    pub fn runner(&self) -> Arc<dyn JobRunner> {
        Arc::clone(&self.runner)
    }

    /// Jobs in `jobs` that `subject` may be compared with: same target,
    /// different results, and compatible options under investigation.
    pub fn candidates<'a>(
        subject: &FinishedFuzzingJob,
        jobs: &'a [FinishedFuzzingJob],
    ) -> Vec<&'a FinishedFuzzingJob> {
        let subject_option = subject.job.option_under_investigation.as_deref();
        jobs.iter()
            .filter(|other| {
                let other_option = other.job.option_under_investigation.as_deref();
                other.job.target == subject.job.target
                    && other.results_location != subject.results_location
                    && (subject_option.is_none()
                        || other_option.is_none()
                        || subject_option == other_option)
            })
            .collect()
    }

    /// The option a pair is compared on.
    pub fn resolve_option(
        subject: &FinishedFuzzingJob,
        partner: &FinishedFuzzingJob,
    ) -> OracleResult<String> {
        match (
            &subject.job.option_under_investigation,
            &partner.job.option_under_investigation,
        ) {
            (Some(a), Some(b)) if a == b => Ok(a.clone()),
            (Some(a), Some(b)) => Err(OracleError::IncomparableJobs {
                left: a.clone(),
                right: b.clone(),
            }),
            (Some(a), None) => Ok(a.clone()),
            (None, Some(b)) => Ok(b.clone()),
            (None, None) => Err(OracleError::AmbiguousComparison {
                left: subject.results_location.display().to_string(),
                right: partner.results_location.display().to_string(),
            }),
        }
    }

    /// Relations that apply to `(subject, partner)` and their first-pass verdicts.
    ///
    /// A relation whose levels cannot be resolved is logged and skipped; the
    /// other relation is still checked.
    pub fn compare(
        &self,
        subject: &FinishedFuzzingJob,
        partner: &FinishedFuzzingJob,
    ) -> OracleResult<Vec<Verdict>> {
        let option_name = Self::resolve_option(subject, partner)?;
        let option = self.model.get(&option_name)?;
        let left = level_of(subject, &option_name)?;
        let right = level_of(partner, &option_name)?;

        let mut verdicts = Vec::new();
        for relation in [Relation::Soundness, Relation::Precision] {
            match option.is_at_least(relation, left, right) {
                Ok(true) => {
                    debug!(
                        option = %option_name,
                        %relation,
                        left,
                        right,
                        "relation applies"
                    );
                    verdicts.push(Verdict {
                        order: PartialOrder {
                            option: option_name.clone(),
                            relation,
                            left: left.to_string(),
                            right: right.to_string(),
                        },
                        violated: !offending(relation, subject, partner).is_empty(),
                    });
                }
                Ok(false) => {}
                Err(e) => warn!(option = %option_name, %relation, error = %e, "skipping relation"),
            }
        }
        Ok(verdicts)
    }

    /// Single-pass detection over `jobs`: no re-verification, no persistence.
    pub fn detect(&self, jobs: &[FinishedFuzzingJob]) -> Vec<PotentialViolation> {
        let mut out = Vec::new();
        for subject in jobs {
            for partner in Self::candidates(subject, jobs) {
                match self.compare(subject, partner) {
                    Ok(verdicts) => out.extend(
                        verdicts
                            .into_iter()
                            .map(|v| build_violation(subject, partner, v.order, v.violated)),
                    ),
                    Err(e) => report_comparison_error(subject, partner, &e),
                }
            }
        }
        out
    }

    /// Check a finished campaign: detect, re-verify suspected violations, and
    /// persist evidence.
    pub async fn check_campaign(
        &self,
        campaign: &FinishedCampaign,
        campaign_index: usize,
    ) -> Vec<PotentialViolation> {
        let jobs = &campaign.finished_jobs;
        let mut out = Vec::new();

        for subject in jobs {
            let candidates = Self::candidates(subject, jobs);
            info!(
                job = %subject.results_location.display(),
                candidates = candidates.len(),
                "found comparison candidates"
            );
            for partner in candidates {
                let verdicts = match self.compare(subject, partner) {
                    Ok(v) => v,
                    Err(e) => {
                        report_comparison_error(subject, partner, &e);
                        continue;
                    }
                };

                for verdict in verdicts {
                    let relation = verdict.order.relation;
                    let mut violated = verdict.violated;
                    if violated && self.verify {
                        obs::emit_violation_detected(&verdict.order, &subject.job.target.name);
                        violated = match self.reverify(relation, subject, partner).await {
                            Ok(confirmed) => confirmed,
                            Err(e) => {
                                error!(
                                    %relation,
                                    order = %verdict.order,
                                    error = %e,
                                    "re-verification failed; skipping comparison"
                                );
                                continue;
                            }
                        };
                        if !violated {
                            obs::emit_violation_refuted(&verdict.order, &subject.job.target.name);
                        }
                    }

                    let potential = build_violation(subject, partner, verdict.order, violated);
                    if let Some(store) = &self.store {
                        match store.write(&potential, campaign_index) {
                            Ok(path) => obs::emit_evidence_written(&path, potential.violated),
                            Err(e) => error!(error = %e, "failed to write evidence artifact"),
                        }
                    }
                    out.push(potential);
                }
            }
        }
        out
    }

    /// Discard stored results, re-run both jobs, and recompute the verdict on
    /// the fresh pair.
    ///
    /// The partner is re-run first, then the subject. Soundness recomputes
    /// `partner'.tp - subject'.tp` and propagates a failed re-run as an error.
    /// Precision recomputes `subject'.fp - partner'.fp` and treats a failed
    /// re-run as "not confirmed".
    pub async fn reverify(
        &self,
        relation: Relation,
        subject: &FinishedFuzzingJob,
        partner: &FinishedFuzzingJob,
    ) -> OracleResult<bool> {
        for finished in [partner, subject] {
            if let Err(e) = discard_results(finished) {
                warn!(path = %finished.results_location.display(), error = %e, "could not discard results");
            }
        }

        let partner_rerun = self.runner.run(&partner.job, None).await;
        let subject_rerun = self.runner.run(&subject.job, None).await;

        match relation {
            Relation::Soundness => {
                let partner_rerun = partner_rerun.map_err(|e| OracleError::Rerun(e.to_string()))?;
                let subject_rerun = subject_rerun.map_err(|e| OracleError::Rerun(e.to_string()))?;
                Ok(!offending(Relation::Soundness, &subject_rerun, &partner_rerun).is_empty())
            }
            Relation::Precision => match (partner_rerun, subject_rerun) {
                (Ok(partner_rerun), Ok(subject_rerun)) => Ok(subject_rerun
                    .detected_flows
                    .fp()
                    .difference(partner_rerun.detected_flows.fp())
                    .next()
                    .is_some()),
                _ => Ok(false),
            },
        }
    }
}

/// The findings that break `relation` for `(subject, partner)`.
pub fn offending(
    relation: Relation,
    subject: &FinishedFuzzingJob,
    partner: &FinishedFuzzingJob,
) -> FlowSet {
    match relation {
        Relation::Soundness => partner
            .detected_flows
            .tp()
            .difference(subject.detected_flows.tp())
            .cloned()
            .collect(),
        Relation::Precision => subject
            .detected_flows
            .fp()
            .difference(partner.detected_flows.fp())
            .cloned()
            .collect(),
    }
}

/// Evidence sets for each side.
///
/// Violated: the offending difference on the side that produced it, empty on
/// the other. Not violated: each side's full set for the relation's category.
fn preserved_sets(
    relation: Relation,
    violated: bool,
    subject: &FinishedFuzzingJob,
    partner: &FinishedFuzzingJob,
) -> (FlowSet, FlowSet) {
    match (relation, violated) {
        (Relation::Soundness, true) => (FlowSet::new(), offending(relation, subject, partner)),
        (Relation::Soundness, false) => (
            subject.detected_flows.tp().clone(),
            partner.detected_flows.tp().clone(),
        ),
        (Relation::Precision, true) => (offending(relation, subject, partner), FlowSet::new()),
        (Relation::Precision, false) => (
            subject.detected_flows.fp().clone(),
            partner.detected_flows.fp().clone(),
        ),
    }
}

fn build_violation(
    subject: &FinishedFuzzingJob,
    partner: &FinishedFuzzingJob,
    order: PartialOrder,
    violated: bool,
) -> PotentialViolation {
    let (preserve1, preserve2) = preserved_sets(order.relation, violated, subject, partner);
    PotentialViolation {
        job1: subject.clone(),
        job2: partner.clone(),
        partial_orders: BTreeSet::from([order]),
        violated,
        preserve1,
        preserve2,
    }
}

fn level_of<'a>(finished: &'a FinishedFuzzingJob, option: &str) -> OracleResult<&'a str> {
    finished
        .job
        .level_of(option)
        .ok_or_else(|| OracleError::MissingConfiguration {
            job: finished.results_location.display().to_string(),
            option: option.to_string(),
        })
}

fn report_comparison_error(
    subject: &FinishedFuzzingJob,
    partner: &FinishedFuzzingJob,
    err: &OracleError,
) {
    error!(
        subject = %subject.results_location.display(),
        partner = %partner.results_location.display(),
        error = %err,
        "comparison skipped"
    );
}
