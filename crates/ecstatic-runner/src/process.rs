//! Process-backed job runner.
//!
//! For each job the runner writes the configuration to
//! `<out>/<digest>_config.json`, runs the configured analyzer, and parses
//! `<out>/<digest>_results.json`. The digest covers the target and the
//! configuration, so re-running the same job lands on the same files and an
//! existing results file is reused instead of re-running the tool.
//!
//! The analyzer is expected to write its findings as JSON, one array of flows
//! per category: `{"tp": [{"source": ..., "sink": ...}], "fp": [...]}`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use ecstatic_core::{DetectedFlows, FinishedFuzzingJob, FuzzingJob, JobRunner, ToolCommand};

use crate::exec::{execute, Invocation};

/// Runs the analyzer described by a [`ToolCommand`] as a child process.
pub struct ProcessJobRunner {
    tool: ToolCommand,
    output_directory: PathBuf,
}

impl ProcessJobRunner {
    pub fn new(tool: ToolCommand, output_directory: impl Into<PathBuf>) -> Self {
        Self {
            tool,
            output_directory: output_directory.into(),
        }
    }

    pub fn tool(&self) -> &ToolCommand {
        &self.tool
    }

    pub fn output_directory(&self) -> &Path {
        &self.output_directory
    }

    fn substitute(&self, target: &Path, config: &Path, results: &Path, output: &Path) -> Vec<String> {
        self.tool
            .args
            .iter()
            .map(|arg| {
                arg.replace("{target}", &target.to_string_lossy())
                    .replace("{config}", &config.to_string_lossy())
                    .replace("{results}", &results.to_string_lossy())
                    .replace("{output}", &output.to_string_lossy())
            })
            .collect()
    }
}

#[async_trait]
impl JobRunner for ProcessJobRunner {
    async fn run(
        &self,
        job: &FuzzingJob,
        output_folder: Option<&Path>,
    ) -> anyhow::Result<FinishedFuzzingJob> {
        let folder = output_folder.unwrap_or(&self.output_directory);
        tokio::fs::create_dir_all(folder)
            .await
            .with_context(|| format!("create {:?}", folder))?;

        let digest = job_digest(job);
        let configuration_location = folder.join(format!("{digest}_config.json"));
        let results_location = folder.join(format!("{digest}_results.json"));

        if results_location.exists() {
            match read_results(&results_location).await {
                Ok(detected_flows) => {
                    debug!(results = %results_location.display(), "reusing existing results");
                    return Ok(FinishedFuzzingJob {
                        job: job.clone(),
                        configuration_location,
                        results_location,
                        detected_flows,
                    });
                }
                Err(e) => warn!(error = %e, "existing results unreadable; re-running"),
            }
        }

        let config_json = serde_json::to_string_pretty(&job.configuration)?;
        tokio::fs::write(&configuration_location, config_json)
            .await
            .with_context(|| format!("write {:?}", configuration_location))?;

        let args = self.substitute(
            &job.target.name,
            &configuration_location,
            &results_location,
            folder,
        );
        let mut env: BTreeMap<String, String> = self.tool.env.clone();
        for (key, value) in [
            ("ECSTATIC_TARGET", &job.target.name),
            ("ECSTATIC_CONFIG", &configuration_location),
            ("ECSTATIC_RESULTS", &results_location),
            ("ECSTATIC_OUTPUT", &folder.to_path_buf()),
        ] {
            env.insert(key.to_string(), value.to_string_lossy().into_owned());
        }

        info!(
            job = %job.id,
            target = %job.target.name.display(),
            program = %self.tool.program,
            "running analyzer"
        );
        let output = execute(&Invocation {
            program: &self.tool.program,
            args: &args,
            env: &env,
            cwd: Some(folder),
            timeout_secs: self.tool.timeout_secs,
        })
        .await?;

        if !output.passed() {
            anyhow::bail!(
                "{} exited with {} on {}: {}",
                self.tool.program,
                output.exit_code,
                job.target.name.display(),
                output.stderr_tail(5)
            );
        }

        let detected_flows = read_results(&results_location).await?;
        debug!(
            job = %job.id,
            findings = detected_flows.total(),
            duration_ms = output.duration_ms,
            "analyzer finished"
        );
        Ok(FinishedFuzzingJob {
            job: job.clone(),
            configuration_location,
            results_location,
            detected_flows,
        })
    }
}

async fn read_results(path: &Path) -> anyhow::Result<DetectedFlows> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("read {:?}", path))?;
    serde_json::from_str(&raw).with_context(|| format!("parse {:?}", path))
}

/// Deterministic SHA-256 digest of a job's target and configuration.
pub fn job_digest(job: &FuzzingJob) -> String {
    let mut hasher = Sha256::new();
    hasher.update(job.target.name.to_string_lossy().as_bytes());
    hasher.update(b"\0");
    for (option, level) in &job.configuration {
        hasher.update(option.as_bytes());
        hasher.update(b"=");
        hasher.update(level.as_bytes());
        hasher.update(b"\0");
    }
    hex::encode(hasher.finalize())
}
