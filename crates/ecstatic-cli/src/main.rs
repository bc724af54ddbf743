//! ECSTATIC - configuration-space metamorphic testing for static analyzers
//!
//! ## Commands
//!
//! - `run`: replay campaign files through the runner / oracle pipeline
//! - `check`: run the violation oracle over one finished campaign
//! - `dd-predicate`: evaluate a delta-debugging job (exit 0 = holds, 1 = not, 2 = error)

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info, Level};

use ecstatic_core::{
    evaluate_predicate, DeltaDebugSettings, DeltaDebugger, DeltaDebuggingJob,
    DirectoryCampaignGenerator, EvidenceStore, FinishedCampaign, FuzzPipeline, FuzzerConfig,
    OptionModel, PipelineSettings, ViolationOracle,
};
use ecstatic_runner::{CommandReductionDriver, ProcessJobRunner};

/// Exit status of `dd-predicate` when the predicate holds.
const PREDICATE_HOLDS: i32 = 0;
/// Exit status of `dd-predicate` when the predicate does not hold.
const PREDICATE_FAILS: i32 = 1;
/// Exit status of `dd-predicate` on a fatal error.
const PREDICATE_ERROR: i32 = 2;

#[derive(Parser)]
#[command(name = "ecstatic")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Metamorphic testing of static analyzer configurations", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Fuzzer configuration file (JSON)
    #[arg(short, long, global = true, env = "ECSTATIC_CONFIG_FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every campaign file in a directory through the pipeline
    Run {
        /// Directory of campaign JSON files, processed in lexical order
        #[arg(long)]
        campaigns: PathBuf,

        /// Output directory (overrides the configuration file)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Total process budget (overrides the configuration file)
        #[arg(short, long)]
        parallelism: Option<usize>,

        /// Stop after this many campaigns
        #[arg(long)]
        max_campaigns: Option<usize>,

        /// Minimize confirmed violations
        #[arg(long)]
        delta_debug: bool,

        /// Report first-pass verdicts without re-running suspected violations
        #[arg(long)]
        no_verify: bool,
    },

    /// Check one finished campaign for violations
    Check {
        /// Finished campaign (JSON)
        campaign: PathBuf,

        /// Campaign index used in evidence directory names
        #[arg(long, default_value = "1")]
        index: usize,

        /// Output directory (overrides the configuration file)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Report first-pass verdicts without re-running suspected violations
        #[arg(long)]
        no_verify: bool,
    },

    /// Evaluate a delta-debugging job; called by the generated wrapper script
    DdPredicate {
        /// Serialized delta-debugging job (JSON)
        job: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    ecstatic_core::init_tracing(cli.json, level);

    match cli.command {
        Commands::Run {
            campaigns,
            output,
            parallelism,
            max_campaigns,
            delta_debug,
            no_verify,
        } => {
            let mut config = load_config(cli.config.as_deref())?;
            apply_overrides(&mut config, output, parallelism, no_verify);
            if max_campaigns.is_some() {
                config.max_campaigns = max_campaigns;
            }
            config.delta_debug |= delta_debug;
            cmd_run(&config, &campaigns).await
        }
        Commands::Check {
            campaign,
            index,
            output,
            no_verify,
        } => {
            let mut config = load_config(cli.config.as_deref())?;
            apply_overrides(&mut config, output, None, no_verify);
            cmd_check(&config, &campaign, index).await
        }
        Commands::DdPredicate { job } => {
            let code = cmd_dd_predicate(&job).await;
            std::process::exit(code);
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<FuzzerConfig> {
    match path {
        Some(path) => FuzzerConfig::load(path),
        None => Ok(FuzzerConfig::default()),
    }
}

fn apply_overrides(
    config: &mut FuzzerConfig,
    output: Option<PathBuf>,
    parallelism: Option<usize>,
    no_verify: bool,
) {
    if let Some(output) = output {
        config.output_directory = output;
    }
    if let Some(parallelism) = parallelism {
        config.parallelism = parallelism;
    }
    if no_verify {
        config.verify_violations = false;
    }
}

fn build_oracle(config: &FuzzerConfig, model: Arc<OptionModel>) -> (Arc<ProcessJobRunner>, ViolationOracle) {
    let runner = Arc::new(ProcessJobRunner::new(
        config.tool.clone(),
        config.results_directory(),
    ));
    let oracle = ViolationOracle::new(model, runner.clone())
        .with_evidence_store(EvidenceStore::new(config.evidence_directory()))
        .with_verification(config.verify_violations);
    (runner, oracle)
}

/// Replay campaign files through the pipeline and print the report.
async fn cmd_run(config: &FuzzerConfig, campaigns: &Path) -> Result<()> {
    let model = Arc::new(
        OptionModel::load(&config.options_file)
            .with_context(|| format!("Failed to load options from {:?}", config.options_file))?,
    );
    info!(options = model.len(), "loaded option model");

    let (runner, oracle) = build_oracle(config, Arc::clone(&model));
    let mut pipeline = FuzzPipeline::new(runner, Arc::new(oracle), PipelineSettings::from(config));
    if config.delta_debug {
        let delta = DeltaDebugger::new(
            model,
            Arc::new(CommandReductionDriver::new(config.reducer.clone())),
            DeltaDebugSettings {
                benchmark_root: config.benchmark_root.clone(),
                predicate_command: config.predicate_command.clone(),
                tool: config.tool.clone(),
            },
        );
        pipeline = pipeline.with_delta_debugger(Arc::new(delta));
    }

    let generator = DirectoryCampaignGenerator::new(campaigns)?;
    let report = pipeline.run(generator).await?;
    info!(
        campaigns = report.campaigns,
        violations = report.violations,
        "pipeline finished"
    );
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Run the oracle over one finished campaign and print its verdicts.
async fn cmd_check(config: &FuzzerConfig, campaign: &Path, index: usize) -> Result<()> {
    let model = Arc::new(
        OptionModel::load(&config.options_file)
            .with_context(|| format!("Failed to load options from {:?}", config.options_file))?,
    );
    let raw = std::fs::read_to_string(campaign)
        .with_context(|| format!("Failed to read {:?}", campaign))?;
    let finished: FinishedCampaign =
        serde_json::from_str(&raw).with_context(|| format!("Failed to parse {:?}", campaign))?;

    let (_, oracle) = build_oracle(config, model);
    let results = oracle.check_campaign(&finished, index).await;

    let summary: Vec<serde_json::Value> = results
        .iter()
        .map(|v| {
            serde_json::json!({
                "partial_orders": v.partial_orders_display(),
                "violated": v.violated,
                "job1": v.job1.results_location,
                "job2": v.job2.results_location,
                "offending": v.offending_flows(),
            })
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

/// Evaluate a serialized delta-debugging job and map the verdict to an exit status.
async fn cmd_dd_predicate(job_path: &Path) -> i32 {
    match evaluate_job(job_path).await {
        Ok(true) => {
            info!(job = %job_path.display(), "predicate holds");
            PREDICATE_HOLDS
        }
        Ok(false) => {
            info!(job = %job_path.display(), "predicate does not hold");
            PREDICATE_FAILS
        }
        Err(e) => {
            error!(job = %job_path.display(), error = %e, "predicate evaluation failed");
            PREDICATE_ERROR
        }
    }
}

async fn evaluate_job(job_path: &Path) -> Result<bool> {
    let job = DeltaDebuggingJob::read(job_path)?;
    let model = Arc::new(OptionModel::from_specs(job.options.clone())?);
    let scratch = tempfile::tempdir().context("Failed to create scratch directory")?;
    let runner = Arc::new(ProcessJobRunner::new(job.tool.clone(), scratch.path()));
    let oracle = ViolationOracle::new(model, runner);
    Ok(evaluate_predicate(&job, &oracle, scratch.path()).await?)
}
