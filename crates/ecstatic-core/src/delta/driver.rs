//! Boundary to the external reduction driver.

use std::path::PathBuf;

use async_trait::async_trait;

/// Inputs handed to a reduction driver for one predicate run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReductionRequest {
    /// Staged target artifact.
    pub target: PathBuf,
    /// Staged source files the driver may shrink.
    pub sources: Vec<PathBuf>,
    pub build_script: Option<PathBuf>,
    /// Executable that exits 0 iff the predicate holds for the current candidate.
    pub predicate_script: PathBuf,
    /// Where the driver records its reduction decisions.
    pub log_path: PathBuf,
    pub working_directory: PathBuf,
}

/// A search procedure that shrinks the staged sources while the predicate
/// script keeps exiting 0.
#[async_trait]
pub trait ReductionDriver: Send + Sync {
    async fn reduce(&self, request: &ReductionRequest) -> anyhow::Result<()>;
}
