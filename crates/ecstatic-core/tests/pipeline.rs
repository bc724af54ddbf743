//! End-to-end pipeline tests with in-memory generators and runners.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use ecstatic_core::{
    BenchmarkRecord, CampaignGenerator, DeltaDebugSettings, DeltaDebugState, DeltaDebugger,
    DetectedFlows, EvidenceStore, FinishedFuzzingJob, Flow, FlowSet, FuzzPipeline,
    FuzzingCampaign, FuzzingJob, JobRunner, OptionModel, PipelineSettings, ReductionDriver,
    ReductionRequest, ToolCommand, ViolationOracle,
};

const MODEL: &str = r#"[
    {"name": "cgalgo", "levels": ["CHA", "RTA", "SPARK"],
     "partial_orders": [
        {"partial_order": "MST", "left": "SPARK", "right": "RTA"},
        {"partial_order": "MST", "left": "RTA", "right": "CHA"}
     ]}
]"#;

struct QueueGenerator {
    campaigns: VecDeque<FuzzingCampaign>,
}

#[async_trait]
impl CampaignGenerator for QueueGenerator {
    async fn next_campaign(&mut self) -> anyhow::Result<Option<FuzzingCampaign>> {
        Ok(self.campaigns.pop_front())
    }
}

/// Generates the same campaign forever and counts requests.
struct EndlessGenerator {
    campaign: FuzzingCampaign,
    requested: Arc<AtomicUsize>,
}

#[async_trait]
impl CampaignGenerator for EndlessGenerator {
    async fn next_campaign(&mut self) -> anyhow::Result<Option<FuzzingCampaign>> {
        self.requested.fetch_add(1, Ordering::SeqCst);
        Ok(Some(self.campaign.clone()))
    }
}

/// Hands out its campaigns, then fails instead of reporting exhaustion.
struct FailingAfterGenerator {
    campaigns: VecDeque<FuzzingCampaign>,
}

#[async_trait]
impl CampaignGenerator for FailingAfterGenerator {
    async fn next_campaign(&mut self) -> anyhow::Result<Option<FuzzingCampaign>> {
        match self.campaigns.pop_front() {
            Some(campaign) => Ok(Some(campaign)),
            None => anyhow::bail!("campaign source unavailable"),
        }
    }
}

/// Findings keyed by level; levels without an entry crash.
struct LevelRunner {
    dir: PathBuf,
    by_level: HashMap<String, DetectedFlows>,
    runs: AtomicUsize,
}

#[async_trait]
impl JobRunner for LevelRunner {
    async fn run(
        &self,
        job: &FuzzingJob,
        _output_folder: Option<&Path>,
    ) -> anyhow::Result<FinishedFuzzingJob> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        let level = job.level_of("cgalgo").unwrap_or_default();
        let flows = self
            .by_level
            .get(level)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("analyzer crashed on {level}"))?;
        let stem = job.id.simple().to_string();
        Ok(FinishedFuzzingJob {
            job: job.clone(),
            configuration_location: self.dir.join(format!("{stem}_config.json")),
            results_location: self.dir.join(format!("{stem}_results.json")),
            detected_flows: flows,
        })
    }
}

struct LoggingDriver {
    calls: Mutex<usize>,
}

#[async_trait]
impl ReductionDriver for LoggingDriver {
    async fn reduce(&self, request: &ReductionRequest) -> anyhow::Result<()> {
        *self.calls.lock().unwrap() += 1;
        std::fs::write(&request.log_path, "done\n")?;
        Ok(())
    }
}

fn tp(names: &[&str]) -> DetectedFlows {
    DetectedFlows::from_sets(
        names.iter().map(|n| Flow::new(*n, "sink")).collect(),
        FlowSet::new(),
    )
}

fn campaign(target: &BenchmarkRecord, levels: &[&str]) -> FuzzingCampaign {
    FuzzingCampaign {
        jobs: levels
            .iter()
            .map(|level| {
                FuzzingJob::new(
                    target.clone(),
                    [("cgalgo".to_string(), level.to_string())].into_iter().collect(),
                    Some("cgalgo".to_string()),
                )
            })
            .collect(),
    }
}

fn runner(dir: &Path, findings: &[(&str, &[&str])]) -> Arc<LevelRunner> {
    Arc::new(LevelRunner {
        dir: dir.to_path_buf(),
        by_level: findings
            .iter()
            .map(|(level, flows)| (level.to_string(), tp(flows)))
            .collect(),
        runs: AtomicUsize::new(0),
    })
}

fn settings(output: &Path) -> PipelineSettings {
    PipelineSettings {
        worker_count: 2,
        max_campaigns: None,
        max_pending_campaigns: 1,
        output_directory: output.to_path_buf(),
    }
}

#[tokio::test]
async fn test_pipeline_reports_confirmed_violations() {
    let out = tempfile::tempdir().unwrap();
    let target = BenchmarkRecord::new("/benchmarks/droidbench/app.apk");
    // SPARK >= RTA >= CHA, yet SPARK misses a finding CHA reports
    let runner = runner(
        out.path(),
        &[("SPARK", &["x"]), ("RTA", &["x", "y"]), ("CHA", &["x", "y"])],
    );
    let model = Arc::new(OptionModel::from_json(MODEL).unwrap());
    let oracle = Arc::new(
        ViolationOracle::new(model, runner.clone())
            .with_evidence_store(EvidenceStore::new(out.path().join("evidence"))),
    );

    let generator = QueueGenerator {
        campaigns: [
            campaign(&target, &["SPARK", "RTA", "CHA"]),
            campaign(&target, &["RTA", "CHA"]),
        ]
        .into_iter()
        .collect(),
    };
    let report = FuzzPipeline::new(runner.clone(), oracle, settings(out.path()))
        .run(generator)
        .await
        .unwrap();

    assert_eq!(report.campaigns, 2);
    assert_eq!(report.jobs_run, 5);
    assert_eq!(report.jobs_failed, 0);
    // campaign 0: SPARK>=RTA, SPARK>=CHA, RTA>=CHA; campaign 1: RTA>=CHA
    assert_eq!(report.comparisons, 4);
    assert_eq!(report.violations, 2);
    // two confirmed violations, each re-running both jobs
    assert_eq!(runner.runs.load(Ordering::SeqCst), 5 + 4);
    assert!(out.path().join("evidence").is_dir());
}

#[tokio::test]
async fn test_failed_jobs_are_dropped_from_their_campaign() {
    let out = tempfile::tempdir().unwrap();
    let target = BenchmarkRecord::new("/benchmarks/droidbench/app.apk");
    let runner = runner(out.path(), &[("SPARK", &["x"]), ("RTA", &["x"])]);
    let model = Arc::new(OptionModel::from_json(MODEL).unwrap());
    let oracle = Arc::new(ViolationOracle::new(model, runner.clone()));

    let generator = QueueGenerator {
        campaigns: [campaign(&target, &["SPARK", "RTA", "CHA"])].into_iter().collect(),
    };
    let report = FuzzPipeline::new(runner, oracle, settings(out.path()))
        .run(generator)
        .await
        .unwrap();

    assert_eq!(report.jobs_run, 3);
    assert_eq!(report.jobs_failed, 1);
    assert_eq!(report.comparisons, 1, "only SPARK >= RTA survives");
    assert_eq!(report.violations, 0);
}

#[tokio::test]
async fn test_max_campaigns_stops_an_endless_generator() {
    let out = tempfile::tempdir().unwrap();
    let target = BenchmarkRecord::new("/benchmarks/droidbench/app.apk");
    let runner = runner(out.path(), &[("SPARK", &["x"]), ("CHA", &["x"])]);
    let model = Arc::new(OptionModel::from_json(MODEL).unwrap());
    let oracle = Arc::new(ViolationOracle::new(model, runner.clone()));

    let requested = Arc::new(AtomicUsize::new(0));
    let generator = EndlessGenerator {
        campaign: campaign(&target, &["SPARK", "CHA"]),
        requested: Arc::clone(&requested),
    };
    let report = FuzzPipeline::new(
        runner,
        oracle,
        PipelineSettings {
            max_campaigns: Some(3),
            ..settings(out.path())
        },
    )
    .run(generator)
    .await
    .unwrap();

    assert_eq!(report.campaigns, 3);
    assert_eq!(requested.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_generator_error_keeps_finished_campaigns_in_report() {
    let out = tempfile::tempdir().unwrap();
    let target = BenchmarkRecord::new("/benchmarks/droidbench/app.apk");
    let runner = runner(out.path(), &[("SPARK", &["x"]), ("CHA", &["x", "y"])]);
    let model = Arc::new(OptionModel::from_json(MODEL).unwrap());
    let oracle = Arc::new(ViolationOracle::new(model, runner.clone()));

    let generator = FailingAfterGenerator {
        campaigns: [campaign(&target, &["SPARK", "CHA"])].into_iter().collect(),
    };
    let report = FuzzPipeline::new(runner, oracle, settings(out.path()))
        .run(generator)
        .await
        .expect("a generator error must not discard the report");

    assert_eq!(report.campaigns, 1);
    assert_eq!(report.jobs_run, 2);
    assert_eq!(report.violations, 1);
    assert!(report
        .generator_error
        .as_deref()
        .is_some_and(|e| e.contains("campaign source unavailable")));
}

#[tokio::test]
async fn test_campaigns_are_numbered_from_one() {
    let out = tempfile::tempdir().unwrap();
    let target = BenchmarkRecord::new("/benchmarks/droidbench/app.apk");
    let runner = runner(out.path(), &[("SPARK", &["x"]), ("CHA", &["x", "y"])]);
    let model = Arc::new(OptionModel::from_json(MODEL).unwrap());
    let evidence = out.path().join("evidence");
    let oracle = Arc::new(
        ViolationOracle::new(model, runner.clone())
            .with_evidence_store(EvidenceStore::new(&evidence)),
    );

    let generator = QueueGenerator {
        campaigns: [campaign(&target, &["SPARK", "CHA"])].into_iter().collect(),
    };
    let report = FuzzPipeline::new(runner, oracle, settings(out.path()))
        .run(generator)
        .await
        .unwrap();
    assert!(report.generator_error.is_none());

    let dirs: Vec<String> = std::fs::read_dir(&evidence)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(dirs.len(), 1);
    assert!(dirs[0].ends_with("_campaign1"), "{}", dirs[0]);
}

#[tokio::test]
async fn test_confirmed_violations_are_minimized() {
    let out = tempfile::tempdir().unwrap();
    let bench = tempfile::tempdir().unwrap();
    let app = bench.path().join("droidbench");
    std::fs::create_dir_all(&app).unwrap();
    std::fs::write(app.join("app.apk"), "apk").unwrap();
    std::fs::write(app.join("Main.java"), "class Main {}").unwrap();
    let mut target = BenchmarkRecord::new(app.join("app.apk"));
    target.sources = vec![app.join("Main.java")];

    let runner = runner(out.path(), &[("SPARK", &["x"]), ("CHA", &["x", "y", "z"])]);
    let model = Arc::new(OptionModel::from_json(MODEL).unwrap());
    let oracle = Arc::new(ViolationOracle::new(Arc::clone(&model), runner.clone()));
    let driver = Arc::new(LoggingDriver {
        calls: Mutex::new(0),
    });
    let delta = Arc::new(DeltaDebugger::new(
        model,
        driver.clone(),
        DeltaDebugSettings {
            benchmark_root: bench.path().to_path_buf(),
            predicate_command: vec!["ecstatic".to_string(), "dd-predicate".to_string()],
            tool: ToolCommand::default(),
        },
    ));

    let generator = QueueGenerator {
        campaigns: [campaign(&target, &["SPARK", "CHA"])].into_iter().collect(),
    };
    let report = FuzzPipeline::new(runner, oracle, settings(out.path()))
        .with_delta_debugger(delta)
        .run(generator)
        .await
        .unwrap();

    assert_eq!(report.violations, 1);
    // one predicate per offending flow: y and z
    assert_eq!(report.delta_debug.len(), 2);
    assert!(report
        .delta_debug
        .iter()
        .all(|o| o.state == DeltaDebugState::Minimal));
    assert_eq!(*driver.calls.lock().unwrap(), 2);
}
