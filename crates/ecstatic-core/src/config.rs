//! Fuzzer configuration.
//!
//! Loaded from a JSON file; every field has a default so a partial file (or
//! none at all) is valid. CLI flags override individual fields.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// How to invoke the analyzer for one job.
///
/// `args` may contain the placeholders `{target}`, `{config}`, `{results}` and
/// `{output}`, substituted per job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolCommand {
    /// Executable to spawn.
    pub program: String,

    #[serde(default)]
    pub args: Vec<String>,

    /// Extra environment variables.
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Timeout in seconds (0 = none).
    #[serde(default)]
    pub timeout_secs: u64,
}

impl Default for ToolCommand {
    fn default() -> Self {
        Self {
            program: "analyze".to_string(),
            args: vec![
                "{target}".to_string(),
                "{config}".to_string(),
                "{results}".to_string(),
            ],
            env: BTreeMap::new(),
            timeout_secs: 0,
        }
    }
}

/// How to invoke the external reduction driver.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReducerCommand {
    /// Command prefix (first element is the executable).
    pub command: Vec<String>,

    /// Driver-specific flags appended after the standard ones.
    #[serde(default)]
    pub extra_args: Vec<String>,

    /// Per-candidate timeout handed to the driver, in seconds.
    #[serde(default = "default_candidate_timeout")]
    pub candidate_timeout_secs: u64,
}

impl Default for ReducerCommand {
    fn default() -> Self {
        Self {
            command: vec![
                "java".to_string(),
                "-jar".to_string(),
                "ViolationDeltaDebugger.jar".to_string(),
            ],
            extra_args: vec!["--hdd".to_string(), "--class-reduction".to_string()],
            candidate_timeout_secs: default_candidate_timeout(),
        }
    }
}

fn default_candidate_timeout() -> u64 {
    120
}

/// Top-level configuration of a fuzzing session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FuzzerConfig {
    /// Root for evidence artifacts and per-job tool output.
    pub output_directory: PathBuf,

    /// Total process budget.
    pub parallelism: usize,

    /// Processes reserved for the generator and the scheduler itself.
    pub reserved_processes: usize,

    /// Stop after this many campaigns (unbounded when absent).
    pub max_campaigns: Option<usize>,

    /// Campaigns the generator may have outstanding before it blocks.
    pub max_pending_campaigns: usize,

    /// Re-run suspected violations before reporting them.
    pub verify_violations: bool,

    /// Minimize confirmed violations.
    pub delta_debug: bool,

    /// Root of the benchmark tree copied for each minimization.
    pub benchmark_root: PathBuf,

    /// Declarative option specification (JSON).
    pub options_file: PathBuf,

    pub tool: ToolCommand,

    pub reducer: ReducerCommand,

    /// Command the generated wrapper script runs, followed by the job file.
    pub predicate_command: Vec<String>,
}

impl Default for FuzzerConfig {
    fn default() -> Self {
        Self {
            output_directory: PathBuf::from("output"),
            parallelism: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            reserved_processes: 2,
            max_campaigns: None,
            max_pending_campaigns: 1,
            verify_violations: true,
            delta_debug: false,
            benchmark_root: PathBuf::from("benchmarks"),
            options_file: PathBuf::from("options.json"),
            tool: ToolCommand::default(),
            reducer: ReducerCommand::default(),
            predicate_command: vec!["ecstatic".to_string(), "dd-predicate".to_string()],
        }
    }
}

impl FuzzerConfig {
    /// Load a JSON configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).with_context(|| format!("read {:?}", path))?;
        serde_json::from_str(&raw).with_context(|| format!("parse {:?}", path))
    }

    /// Size of the job worker pool: the process budget minus the reserved
    /// orchestration processes, never below one.
    pub fn worker_count(&self) -> usize {
        self.parallelism
            .saturating_sub(self.reserved_processes)
            .max(1)
    }

    /// Directory under which the runner stores per-job tool output.
    pub fn results_directory(&self) -> PathBuf {
        self.output_directory.join("results")
    }

    /// Directory under which evidence artifacts are written.
    pub fn evidence_directory(&self) -> PathBuf {
        self.output_directory.join("evidence")
    }
}
