//! ECSTATIC Core Library
//!
//! Configuration-space metamorphic testing for static analyzers: a partial-order
//! model over option levels, a violation oracle that compares analyzer runs
//! pairwise, and a delta debugger that minimizes confirmed violations.

pub mod benchmark;
pub mod config;
pub mod delta;
pub mod error;
pub mod job;
pub mod model;
pub mod obs;
pub mod oracle;
pub mod runner;
pub mod scheduler;
pub mod telemetry;

pub use benchmark::BenchmarkRecord;
pub use config::{FuzzerConfig, ReducerCommand, ToolCommand};
pub use delta::{
    evaluate_predicate, make_predicates, DeltaDebugOutcome, DeltaDebugSettings, DeltaDebugState,
    DeltaDebugger, DeltaDebuggingJob, ReductionDriver, ReductionRequest, ViolationPredicate,
};
pub use error::{
    DeltaDebugError, DeltaDebugResult, ModelError, ModelResult, OracleError, OracleResult,
};
pub use job::{
    Configuration, DetectedFlows, FinishedCampaign, FinishedFuzzingJob, Flow, FlowSet,
    FuzzingCampaign, FuzzingJob,
};
pub use model::{ConfigOption, Level, OptionModel, OptionSpec, PartialOrderKind, Relation};
pub use oracle::{
    EvidenceArtifact, EvidenceStore, PartialOrder, PotentialViolation, ViolationOracle,
};
pub use runner::{discard_results, JobRunner};
pub use scheduler::{
    CampaignGenerator, DirectoryCampaignGenerator, FuzzPipeline, PipelineReport, PipelineSettings,
};
pub use telemetry::init_tracing;

/// ECSTATIC version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
