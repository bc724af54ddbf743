//! Error taxonomy for the partial-order model, the oracle and the delta debugger.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while building or querying the partial-order model.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// A level with the same name but a different owning option was registered.
    #[error("option {option} already has a conflicting level named {level}")]
    DuplicateLevel { option: String, level: String },

    /// A level name could not be mapped onto a node of the relation graph.
    #[error("level {level} of option {option} cannot be resolved")]
    UnresolvedLevel { option: String, level: String },

    /// An option name is not present in the model.
    #[error("unknown option: {0}")]
    UnknownOption(String),
}

/// Convenience result alias for model operations.
pub type ModelResult<T> = std::result::Result<T, ModelError>;

/// Errors raised while comparing a pair of finished jobs.
#[derive(Debug, Error)]
pub enum OracleError {
    /// Neither side names an option under investigation.
    #[error("cannot compare {left} and {right}: neither job has an option under investigation")]
    AmbiguousComparison { left: String, right: String },

    /// Both sides name an option under investigation, and they differ.
    #[error("jobs investigate different options ({left} vs {right})")]
    IncomparableJobs { left: String, right: String },

    /// A job's configuration lacks a level for the option being compared.
    #[error("job {job} has no level for option {option}")]
    MissingConfiguration { job: String, option: String },

    #[error("model error: {0}")]
    Model(#[from] ModelError),

    /// Re-running a job during re-verification failed.
    #[error("re-run failed: {0}")]
    Rerun(String),
}

/// Convenience result alias for oracle operations.
pub type OracleResult<T> = std::result::Result<T, OracleError>;

/// Errors raised by a delta-debugging run or a predicate evaluation.
#[derive(Debug, Error)]
pub enum DeltaDebugError {
    /// The target declares no source files, so there is nothing to reduce.
    #[error("benchmark {target} declares no source files")]
    NoSources { target: String },

    /// More than one re-derived violation matches the original partial orders.
    #[error("{count} potential violations match partial order set {partial_orders}")]
    AmbiguousViolationSet { count: usize, partial_orders: String },

    /// A staged path could not be re-rooted into the working copy.
    #[error("path {path:?} is not under benchmark root {root:?}")]
    OutsideBenchmarkRoot { path: PathBuf, root: PathBuf },

    #[error("reduction driver failed: {0}")]
    Driver(String),

    #[error("model error: {0}")]
    Model(#[from] ModelError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result alias for delta-debugging operations.
pub type DeltaDebugResult<T> = std::result::Result<T, DeltaDebugError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unresolved_level_names_option_and_level() {
        let err = ModelError::UnresolvedLevel {
            option: "aplength".to_string(),
            level: "7".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("aplength"));
        assert!(msg.contains("7"));
    }

    #[test]
    fn test_model_error_converts_into_oracle_error() {
        let err: OracleError = ModelError::UnknownOption("cgalgo".to_string()).into();
        assert!(matches!(err, OracleError::Model(ModelError::UnknownOption(_))));
        assert!(err.to_string().contains("cgalgo"));
    }

    #[test]
    fn test_ambiguous_violation_set_reports_count() {
        let err = DeltaDebugError::AmbiguousViolationSet {
            count: 2,
            partial_orders: "{cgalgo:soundness}".to_string(),
        };
        assert!(err.to_string().starts_with("2 potential violations"));
    }
}
