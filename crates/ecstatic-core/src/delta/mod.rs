//! Delta debugging of confirmed violations.
//!
//! For every predicate derived from a violation, the debugger stages a private
//! copy of the benchmark tree, serializes a [`DeltaDebuggingJob`], writes an
//! executable wrapper that evaluates it, and hands everything to a
//! [`ReductionDriver`]. A predicate run moves through
//! `Prepared -> Reducing -> Minimal | Failed`, or short-circuits to `Skipped`
//! when a previous run already left its log behind.

pub mod driver;
pub mod predicate;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::ToolCommand;
use crate::error::{DeltaDebugError, DeltaDebugResult};
use crate::model::OptionModel;
use crate::obs;
use crate::oracle::{EvidenceStore, PotentialViolation};

pub use driver::{ReductionDriver, ReductionRequest};
pub use predicate::{
    evaluate_predicate, make_predicates, DeltaDebuggingJob, ViolationPredicate, JOB_FILE,
};

/// Reduction log written by the driver; its presence marks a finished run.
pub const LOG_FILE: &str = "log.txt";

/// Wrapper script handed to the driver as its predicate.
pub const PREDICATE_SCRIPT: &str = "predicate.sh";

/// Lifecycle of one predicate run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeltaDebugState {
    Prepared,
    Reducing,
    Minimal,
    Skipped,
    Failed,
}

impl DeltaDebugState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeltaDebugState::Prepared => "prepared",
            DeltaDebugState::Reducing => "reducing",
            DeltaDebugState::Minimal => "minimal",
            DeltaDebugState::Skipped => "skipped",
            DeltaDebugState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DeltaDebugState::Minimal | DeltaDebugState::Skipped | DeltaDebugState::Failed
        )
    }
}

impl fmt::Display for DeltaDebugState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal result of one predicate run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeltaDebugOutcome {
    pub predicate_index: usize,
    pub predicate: ViolationPredicate,
    pub directory: PathBuf,
    pub state: DeltaDebugState,
    /// Why the run failed, when it did.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Settings the debugger needs beyond the model and the driver.
#[derive(Debug, Clone)]
pub struct DeltaDebugSettings {
    /// Root of the benchmark tree; copied wholesale for every predicate run.
    pub benchmark_root: PathBuf,
    /// Command prefix the wrapper script runs, followed by the job file path.
    pub predicate_command: Vec<String>,
    /// Analyzer invocation recorded in each job.
    pub tool: ToolCommand,
}

/// Minimizes the inputs of confirmed violations.
pub struct DeltaDebugger {
    model: Arc<OptionModel>,
    driver: Arc<dyn ReductionDriver>,
    settings: DeltaDebugSettings,
}

impl DeltaDebugger {
    pub fn new(
        model: Arc<OptionModel>,
        driver: Arc<dyn ReductionDriver>,
        settings: DeltaDebugSettings,
    ) -> Self {
        Self {
            model,
            driver,
            settings,
        }
    }

    /// Working directory of predicate `index`:
    /// `<campaign_dir>/deltadebugging/<evidence dir>/<target>/<index>`.
    pub fn predicate_directory(
        violation: &PotentialViolation,
        campaign_dir: &Path,
        campaign_index: usize,
        index: usize,
    ) -> Option<PathBuf> {
        let order = violation.primary_order()?;
        Some(
            campaign_dir
                .join("deltadebugging")
                .join(EvidenceStore::directory_name(
                    &violation.job1,
                    &violation.job2,
                    order,
                    campaign_index,
                ))
                .join(violation.job1.job.target.basename())
                .join(index.to_string()),
        )
    }

    /// Run every predicate of `violation` to a terminal state.
    ///
    /// Predicate runs never abort each other: a failure is recorded in its
    /// outcome and the next predicate starts.
    pub async fn delta_debug(
        &self,
        violation: &PotentialViolation,
        campaign_dir: &Path,
        campaign_index: usize,
    ) -> Vec<DeltaDebugOutcome> {
        let mut outcomes = Vec::new();
        for (index, predicate) in make_predicates(violation).into_iter().enumerate() {
            let directory =
                match Self::predicate_directory(violation, campaign_dir, campaign_index, index) {
                    Some(dir) => dir,
                    None => {
                        warn!("violation carries no partial order; nothing to minimize");
                        return outcomes;
                    }
                };

            let (state, reason) = match self
                .run_predicate(violation, &predicate, &directory)
                .await
            {
                Ok(state) => (state, None),
                Err(e) => {
                    warn!(directory = %directory.display(), error = %e, "delta debugging failed");
                    (DeltaDebugState::Failed, Some(e.to_string()))
                }
            };
            obs::emit_delta_debug_finished(&violation.job1.job.target.name, index, state.as_str());

            outcomes.push(DeltaDebugOutcome {
                predicate_index: index,
                predicate,
                directory,
                state,
                reason,
            });
        }
        outcomes
    }

    async fn run_predicate(
        &self,
        violation: &PotentialViolation,
        predicate: &ViolationPredicate,
        directory: &Path,
    ) -> DeltaDebugResult<DeltaDebugState> {
        let log_path = directory.join(LOG_FILE);
        if log_path.exists() {
            info!(log = %log_path.display(), "already minimized; skipping");
            return Ok(DeltaDebugState::Skipped);
        }

        let target = &violation.job1.job.target;
        if !target.has_sources() {
            return Err(DeltaDebugError::NoSources {
                target: target.name.display().to_string(),
            });
        }

        if directory.exists() {
            debug!(directory = %directory.display(), "removing stale working directory");
            std::fs::remove_dir_all(directory)?;
        }
        std::fs::create_dir_all(directory)?;

        let staged_root = directory.join("benchmarks");
        copy_tree(&self.settings.benchmark_root, &staged_root)?;
        let staged_target = target.rebase(&self.settings.benchmark_root, &staged_root)?;

        let mut staged = violation.clone();
        staged.job1.job.target = staged_target.clone();
        staged.job2.job.target = staged_target.clone();

        let job = DeltaDebuggingJob {
            predicate: predicate.clone(),
            potential_violation: staged,
            tool: self.settings.tool.clone(),
            options: self.model.specs().to_vec(),
        };
        let job_path = job.write(directory)?;
        let script = write_predicate_script(directory, &self.settings.predicate_command, &job_path)?;
        if let Some(build_script) = staged_target.build_script.as_deref().filter(|p| p.exists()) {
            make_executable(build_script)?;
        }
        debug!(directory = %directory.display(), state = %DeltaDebugState::Prepared, "predicate staged");

        let request = ReductionRequest {
            target: staged_target.name.clone(),
            sources: staged_target.sources.clone(),
            build_script: staged_target.build_script.clone(),
            predicate_script: script,
            log_path: log_path.clone(),
            working_directory: directory.to_path_buf(),
        };
        info!(
            target = %request.target.display(),
            sources = request.sources.len(),
            state = %DeltaDebugState::Reducing,
            "starting reduction"
        );
        self.driver
            .reduce(&request)
            .await
            .map_err(|e| DeltaDebugError::Driver(e.to_string()))?;

        if log_path.exists() {
            Ok(DeltaDebugState::Minimal)
        } else {
            Err(DeltaDebugError::Driver(format!(
                "driver finished without writing {}",
                log_path.display()
            )))
        }
    }
}

/// Write `#!/bin/bash` + `<command> <job>` and make it owner-executable.
fn write_predicate_script(
    directory: &Path,
    command: &[String],
    job_path: &Path,
) -> DeltaDebugResult<PathBuf> {
    let mut line: Vec<String> = command.iter().map(|part| shell_quote(part)).collect();
    line.push(shell_quote(&job_path.to_string_lossy()));

    let path = directory.join(PREDICATE_SCRIPT);
    std::fs::write(&path, format!("#!/bin/bash\n{}\n", line.join(" ")))?;
    make_executable(&path)?;
    Ok(path)
}

fn shell_quote(word: &str) -> String {
    format!("'{}'", word.replace('\'', r"'\''"))
}

#[cfg(unix)]
fn make_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

fn copy_tree(from: &Path, to: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(to)?;
    for entry in std::fs::read_dir(from)? {
        let entry = entry?;
        let path = entry.path();
        let dest = to.join(entry.file_name());
        if path.is_dir() {
            copy_tree(&path, &dest)?;
        } else {
            std::fs::copy(&path, &dest)?;
        }
    }
    Ok(())
}
