//! Campaign pipeline.
//!
//! Three long-lived stages connected by bounded channels:
//!
//! ```text
//! generator --(campaigns)--> scheduler + worker pool --(finished campaigns)--> oracle
//! ```
//!
//! The generator holds one credit per outstanding campaign. The scheduler
//! hands a credit back only after the finished campaign has been enqueued for
//! the oracle, so at most `max_pending_campaigns` campaigns are in flight.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn, Instrument};

use crate::config::FuzzerConfig;
use crate::delta::{DeltaDebugOutcome, DeltaDebugger};
use crate::job::{FinishedCampaign, FuzzingCampaign};
use crate::obs;
use crate::oracle::ViolationOracle;
use crate::runner::JobRunner;

/// Source of campaigns. `Ok(None)` means exhausted; an `Err` means the source
/// itself failed and no further campaigns can be expected from it.
#[async_trait]
pub trait CampaignGenerator: Send {
    async fn next_campaign(&mut self) -> Result<Option<FuzzingCampaign>>;
}

/// Replays pre-generated campaign files (`*.json`) from a directory in
/// lexical order. Unreadable or malformed files are logged and skipped.
pub struct DirectoryCampaignGenerator {
    pending: VecDeque<PathBuf>,
}

impl DirectoryCampaignGenerator {
    pub fn new(directory: &Path) -> Result<Self> {
        let mut files = Vec::new();
        for entry in
            std::fs::read_dir(directory).with_context(|| format!("read {:?}", directory))?
        {
            let path = entry?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
                files.push(path);
            }
        }
        files.sort();
        Ok(Self {
            pending: files.into(),
        })
    }

    /// Campaign files not yet handed out.
    pub fn remaining(&self) -> usize {
        self.pending.len()
    }
}

#[async_trait]
impl CampaignGenerator for DirectoryCampaignGenerator {
    async fn next_campaign(&mut self) -> Result<Option<FuzzingCampaign>> {
        while let Some(path) = self.pending.pop_front() {
            match read_campaign(&path).await {
                Ok(campaign) => {
                    debug!(path = %path.display(), "loaded campaign");
                    return Ok(Some(campaign));
                }
                Err(e) => warn!(
                    path = %path.display(),
                    error = %format!("{e:#}"),
                    "skipping campaign file"
                ),
            }
        }
        Ok(None)
    }
}

async fn read_campaign(path: &Path) -> Result<FuzzingCampaign> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("read {:?}", path))?;
    serde_json::from_str(&raw).with_context(|| format!("parse {:?}", path))
}

/// Summary of a pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineReport {
    pub campaigns: usize,
    pub jobs_run: usize,
    pub jobs_failed: usize,
    /// Applied relations checked by the oracle, violated or not.
    pub comparisons: usize,
    /// Confirmed violations.
    pub violations: usize,
    pub delta_debug: Vec<DeltaDebugOutcome>,
    /// Why generation stopped early, if it did.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generator_error: Option<String>,
}

/// Knobs taken from [`FuzzerConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSettings {
    pub worker_count: usize,
    pub max_campaigns: Option<usize>,
    pub max_pending_campaigns: usize,
    /// Root under which delta-debugging directories are created.
    pub output_directory: PathBuf,
}

impl From<&FuzzerConfig> for PipelineSettings {
    fn from(config: &FuzzerConfig) -> Self {
        Self {
            worker_count: config.worker_count(),
            max_campaigns: config.max_campaigns,
            max_pending_campaigns: config.max_pending_campaigns.max(1),
            output_directory: config.output_directory.clone(),
        }
    }
}

/// Generator, worker pool and oracle wired together.
pub struct FuzzPipeline {
    runner: Arc<dyn JobRunner>,
    oracle: Arc<ViolationOracle>,
    delta: Option<Arc<DeltaDebugger>>,
    settings: PipelineSettings,
}

impl FuzzPipeline {
    pub fn new(
        runner: Arc<dyn JobRunner>,
        oracle: Arc<ViolationOracle>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            runner,
            oracle,
            delta: None,
            settings,
        }
    }

    /// Minimize every confirmed violation.
    pub fn with_delta_debugger(mut self, delta: Arc<DeltaDebugger>) -> Self {
        self.delta = Some(delta);
        self
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Drive `generator` to exhaustion (or `max_campaigns`).
    ///
    /// Campaigns are numbered from 1. Failed jobs are logged and left out of
    /// their finished campaign. A generator error stops generation; campaigns
    /// already handed out still finish and the report records the error.
    /// Only a panicked pipeline task is an `Err`.
    pub async fn run<G>(&self, mut generator: G) -> Result<PipelineReport>
    where
        G: CampaignGenerator + 'static,
    {
        let pending = self.settings.max_pending_campaigns.max(1);
        let (campaign_tx, mut campaign_rx) = mpsc::channel::<(usize, FuzzingCampaign)>(pending);
        let (finished_tx, mut finished_rx) = mpsc::channel::<(usize, FinishedCampaign)>(pending);
        let credits = Arc::new(Semaphore::new(pending));

        let max_campaigns = self.settings.max_campaigns;
        let generator_credits = Arc::clone(&credits);
        let generator_task = tokio::spawn(async move {
            let mut generated = 0usize;
            let mut failure = None;
            while max_campaigns.map_or(true, |max| generated < max) {
                let Ok(permit) = Arc::clone(&generator_credits).acquire_owned().await else {
                    break;
                };
                let campaign = match generator.next_campaign().await {
                    Ok(Some(campaign)) => campaign,
                    Ok(None) => break,
                    Err(e) => {
                        let message = format!("{e:#}");
                        error!(error = %message, after = generated, "campaign generator failed");
                        failure = Some(message);
                        break;
                    }
                };
                permit.forget();
                if campaign_tx.send((generated + 1, campaign)).await.is_err() {
                    break;
                }
                generated += 1;
            }
            info!(campaigns = generated, "generator finished");
            (generated, failure)
        });

        let runner = Arc::clone(&self.runner);
        let workers = self.settings.worker_count.max(1);
        let scheduler_credits = Arc::clone(&credits);
        let scheduler_task = tokio::spawn(async move {
            let (mut jobs_run, mut jobs_failed) = (0usize, 0usize);
            while let Some((index, campaign)) = campaign_rx.recv().await {
                let (finished, failed) = run_campaign(Arc::clone(&runner), index, campaign, workers)
                    .instrument(obs::campaign_span(index))
                    .await;
                jobs_run += finished.finished_jobs.len() + failed;
                jobs_failed += failed;
                if finished_tx.send((index, finished)).await.is_err() {
                    break;
                }
                scheduler_credits.add_permits(1);
            }
            (jobs_run, jobs_failed)
        });

        let mut report = PipelineReport::default();
        while let Some((index, finished)) = finished_rx.recv().await {
            self.check(index, &finished, &mut report)
                .instrument(obs::campaign_span(index))
                .await;
        }

        let (jobs_run, jobs_failed) = scheduler_task.await.context("scheduler task panicked")?;
        report.jobs_run = jobs_run;
        report.jobs_failed = jobs_failed;
        let (generated, failure) = generator_task.await.context("generator task panicked")?;
        report.generator_error = failure;
        debug!(generated, checked = report.campaigns, "pipeline drained");
        Ok(report)
    }

    async fn check(&self, index: usize, finished: &FinishedCampaign, report: &mut PipelineReport) {
        let results = self.oracle.check_campaign(finished, index).await;
        report.campaigns += 1;
        report.comparisons += results.len();

        for violation in results.iter().filter(|v| v.violated) {
            report.violations += 1;
            info!(
                partial_orders = %violation.partial_orders_display(),
                target = %violation.job1.job.target.name.display(),
                "confirmed violation"
            );
            if let Some(delta) = &self.delta {
                let outcomes = delta
                    .delta_debug(violation, &self.settings.output_directory, index)
                    .await;
                report.delta_debug.extend(outcomes);
            }
        }
    }
}

/// Run every job of `campaign` on a pool of `workers` concurrent tasks.
///
/// Returns the finished campaign (completion order) and the number of jobs
/// that produced no result.
async fn run_campaign(
    runner: Arc<dyn JobRunner>,
    index: usize,
    campaign: FuzzingCampaign,
    workers: usize,
) -> (FinishedCampaign, usize) {
    let started = Instant::now();
    obs::emit_campaign_started(index, campaign.jobs.len(), workers);

    let pool = Arc::new(Semaphore::new(workers));
    let mut join_set = JoinSet::new();
    for job in campaign.jobs {
        let runner = Arc::clone(&runner);
        let pool = Arc::clone(&pool);
        join_set.spawn(async move {
            let _permit = pool.acquire_owned().await.ok();
            let result = runner.run(&job, None).await;
            (job, result)
        });
    }

    let mut finished_jobs = Vec::new();
    let mut failed = 0usize;
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok((_, Ok(finished))) => finished_jobs.push(finished),
            Ok((job, Err(e))) => {
                failed += 1;
                warn!(
                    job = %job.id,
                    target = %job.target.name.display(),
                    error = %e,
                    "job produced no result"
                );
            }
            Err(e) => {
                failed += 1;
                warn!(error = %e, "job task join error");
            }
        }
    }

    obs::emit_campaign_finished(
        index,
        finished_jobs.len(),
        failed,
        started.elapsed().as_millis() as u64,
    );
    (FinishedCampaign { finished_jobs }, failed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_from_config() {
        let config = FuzzerConfig {
            parallelism: 6,
            max_pending_campaigns: 0,
            max_campaigns: Some(3),
            ..FuzzerConfig::default()
        };
        let settings = PipelineSettings::from(&config);
        assert_eq!(settings.worker_count, 4);
        assert_eq!(settings.max_pending_campaigns, 1);
        assert_eq!(settings.max_campaigns, Some(3));
    }

    #[tokio::test]
    async fn test_directory_generator_lexical_order() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.json", "a.json"] {
            std::fs::write(dir.path().join(name), r#"{"jobs": []}"#).unwrap();
        }
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let mut generator = DirectoryCampaignGenerator::new(dir.path()).unwrap();
        assert_eq!(generator.remaining(), 2);
        assert!(generator.next_campaign().await.unwrap().is_some());
        assert!(generator.next_campaign().await.unwrap().is_some());
        assert!(generator.next_campaign().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_directory_generator_skips_malformed_campaign() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.json"), "not json").unwrap();
        std::fs::write(dir.path().join("b.json"), r#"{"jobs": []}"#).unwrap();

        let mut generator = DirectoryCampaignGenerator::new(dir.path()).unwrap();
        let campaign = generator.next_campaign().await.unwrap();
        assert!(campaign.is_some_and(|c| c.jobs.is_empty()));
        assert!(generator.next_campaign().await.unwrap().is_none());
    }
}
