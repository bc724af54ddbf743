//! Job runner trait.
//!
//! A runner invokes the external analyzer for one [`FuzzingJob`] and parses its
//! output. An `Err` is the "absent" result: the tool crashed, timed out, or
//! produced output that could not be read.

use std::path::Path;

use async_trait::async_trait;

use crate::job::{FinishedFuzzingJob, FuzzingJob};

/// Trait for analyzer backends.
#[async_trait]
pub trait JobRunner: Send + Sync {
    /// Run `job`, writing tool output under `output_folder` when given, or
    /// under the runner's own output location otherwise.
    async fn run(
        &self,
        job: &FuzzingJob,
        output_folder: Option<&Path>,
    ) -> anyhow::Result<FinishedFuzzingJob>;
}

/// Remove a job's stored results so the next run starts from scratch.
///
/// A file that is already gone is not an error.
pub fn discard_results(finished: &FinishedFuzzingJob) -> std::io::Result<()> {
    match std::fs::remove_file(&finished.results_location) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::benchmark::BenchmarkRecord;
    use crate::job::DetectedFlows;

    fn finished_at(path: &Path) -> FinishedFuzzingJob {
        FinishedFuzzingJob {
            job: FuzzingJob::new(BenchmarkRecord::new("/b/app.apk"), Default::default(), None),
            configuration_location: path.with_extension("config"),
            results_location: path.to_path_buf(),
            detected_flows: DetectedFlows::new(),
        }
    }

    #[test]
    fn test_discard_results_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("abc_results.json");
        std::fs::write(&path, "{}").unwrap();

        discard_results(&finished_at(&path)).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_discard_results_tolerates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("never_written.json");
        assert!(discard_results(&finished_at(&path)).is_ok());
    }
}
