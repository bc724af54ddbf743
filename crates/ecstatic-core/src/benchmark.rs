//! Benchmark records: the analysis target of a fuzzing job.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{DeltaDebugError, DeltaDebugResult};

/// One analysis target. Every path is absolute by the time it reaches the core.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BenchmarkRecord {
    /// Target artifact (e.g. an `.apk` or `.jar`).
    pub name: PathBuf,
    #[serde(default)]
    pub depends_on: Vec<PathBuf>,
    #[serde(default)]
    pub sources: Vec<PathBuf>,
    #[serde(default)]
    pub build_script: Option<PathBuf>,
}

impl BenchmarkRecord {
    pub fn new(name: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            depends_on: Vec::new(),
            sources: Vec::new(),
            build_script: None,
        }
    }

    pub fn has_sources(&self) -> bool {
        !self.sources.is_empty()
    }

    /// File name of the target, e.g. `app.apk`.
    pub fn basename(&self) -> String {
        self.name
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Name of the directory holding the target.
    pub fn parent_name(&self) -> String {
        self.name
            .parent()
            .and_then(Path::file_name)
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Re-root every path from `from` into `to`.
    ///
    /// Used after copying the benchmark tree into a private working directory.
    pub fn rebase(&self, from: &Path, to: &Path) -> DeltaDebugResult<Self> {
        let move_path = |path: &Path| -> DeltaDebugResult<PathBuf> {
            let relative =
                path.strip_prefix(from)
                    .map_err(|_| DeltaDebugError::OutsideBenchmarkRoot {
                        path: path.to_path_buf(),
                        root: from.to_path_buf(),
                    })?;
            Ok(to.join(relative))
        };

        Ok(Self {
            name: move_path(self.name.as_path())?,
            depends_on: self
                .depends_on
                .iter()
                .map(|p| move_path(p.as_path()))
                .collect::<DeltaDebugResult<_>>()?,
            sources: self
                .sources
                .iter()
                .map(|p| move_path(p.as_path()))
                .collect::<DeltaDebugResult<_>>()?,
            build_script: self.build_script.as_deref().map(move_path).transpose()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> BenchmarkRecord {
        BenchmarkRecord {
            name: PathBuf::from("/bench/droidbench/app.apk"),
            depends_on: vec![PathBuf::from("/bench/libs/android.jar")],
            sources: vec![PathBuf::from("/bench/droidbench/src")],
            build_script: Some(PathBuf::from("/bench/droidbench/build.sh")),
        }
    }

    #[test]
    fn test_names() {
        let r = record();
        assert_eq!(r.basename(), "app.apk");
        assert_eq!(r.parent_name(), "droidbench");
        assert!(r.has_sources());
        assert!(!BenchmarkRecord::new("/x.jar").has_sources());
    }

    #[test]
    fn test_rebase_moves_every_path() {
        let moved = record()
            .rebase(Path::new("/bench"), Path::new("/work/benchmarks"))
            .unwrap();
        assert_eq!(moved.name, PathBuf::from("/work/benchmarks/droidbench/app.apk"));
        assert_eq!(moved.depends_on[0], PathBuf::from("/work/benchmarks/libs/android.jar"));
        assert_eq!(moved.sources[0], PathBuf::from("/work/benchmarks/droidbench/src"));
        assert_eq!(
            moved.build_script,
            Some(PathBuf::from("/work/benchmarks/droidbench/build.sh"))
        );
    }

    #[test]
    fn test_rebase_rejects_foreign_paths() {
        let err = record()
            .rebase(Path::new("/elsewhere"), Path::new("/work"))
            .unwrap_err();
        assert!(matches!(err, DeltaDebugError::OutsideBenchmarkRoot { .. }));
    }
}
