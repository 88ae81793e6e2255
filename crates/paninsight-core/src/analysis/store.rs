use std::{fs, io::ErrorKind, path::PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, warn};

use super::AnalysisResult;

/// File name of the persisted copy of the last analysis result.
pub const REPORT_FILE_NAME: &str = "liverprofile-report.json";

/// Local persistence for the most recent analysis result. Last write wins.
pub trait ReportStore: Send + Sync {
    /// Read the persisted result, `None` if nothing usable is stored.
    fn load(&self) -> Result<Option<AnalysisResult>>;

    fn save(&self, result: &AnalysisResult) -> Result<()>;

    fn clear(&self) -> Result<()>;
}

/// Stores the result as JSON inside a state directory.
pub struct FileReportStore {
    base_path: PathBuf,
}

impl FileReportStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.base_path.join(REPORT_FILE_NAME)
    }
}

impl ReportStore for FileReportStore {
    fn load(&self) -> Result<Option<AnalysisResult>> {
        let path = self.path();
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read stored report at {}", path.display()))
            }
        };
        match serde_json::from_str::<Option<AnalysisResult>>(&raw) {
            Ok(result) => Ok(result),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "ignoring unreadable stored report");
                Ok(None)
            }
        }
    }

    fn save(&self, result: &AnalysisResult) -> Result<()> {
        fs::create_dir_all(&self.base_path).with_context(|| {
            format!(
                "failed to create state directory {}",
                self.base_path.display()
            )
        })?;
        let path = self.path();
        let json = serde_json::to_string_pretty(result)?;
        fs::write(&path, json)
            .with_context(|| format!("failed to write stored report at {}", path.display()))?;
        debug!(path = %path.display(), "persisted analysis result");
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match fs::remove_file(self.path()) {
            Err(err) if err.kind() != ErrorKind::NotFound => {
                Err(err).context("failed to remove stored report")
            }
            _ => Ok(()),
        }
    }
}

/// Where the report page got its data from, or where it has to go instead.
#[derive(Debug, Clone, PartialEq)]
pub enum ReportSource {
    Navigation(AnalysisResult),
    Persisted(AnalysisResult),
    /// No result anywhere: the caller must send the user back to the upload step.
    RedirectToUpload,
}

impl ReportSource {
    pub fn result(&self) -> Option<&AnalysisResult> {
        match self {
            Self::Navigation(result) | Self::Persisted(result) => Some(result),
            Self::RedirectToUpload => None,
        }
    }

    pub fn into_result(self) -> Option<AnalysisResult> {
        match self {
            Self::Navigation(result) | Self::Persisted(result) => Some(result),
            Self::RedirectToUpload => None,
        }
    }
}

/// Resolves the analysis result for the report page without touching the network.
pub struct ReportHolder<S: ReportStore> {
    store: S,
}

impl<S: ReportStore> ReportHolder<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Prefer the in-memory navigation state, fall back to the persisted copy.
    ///
    /// A result handed over through navigation is persisted so that reopening the
    /// page later shows the same report.
    pub fn resolve(&self, navigation: Option<AnalysisResult>) -> Result<ReportSource> {
        if let Some(result) = navigation {
            if let Err(err) = self.store.save(&result) {
                warn!(error = %err, "could not persist analysis result");
            }
            return Ok(ReportSource::Navigation(result));
        }
        match self.store.load()? {
            Some(result) => Ok(ReportSource::Persisted(result)),
            None => {
                debug!("no analysis result available, redirecting to upload");
                Ok(ReportSource::RedirectToUpload)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::fixtures::{full_result, minimal_result};
    use crate::report::{render_report, OutputFormat};

    #[test]
    fn missing_file_loads_as_none() {
        let temp = tempfile::tempdir().unwrap();
        let store = FileReportStore::new(temp.path());
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn corrupt_file_is_treated_as_absent() {
        let temp = tempfile::tempdir().unwrap();
        fs::write(temp.path().join(REPORT_FILE_NAME), "{not json").unwrap();
        let store = FileReportStore::new(temp.path());
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn stored_null_is_treated_as_absent() {
        let temp = tempfile::tempdir().unwrap();
        fs::write(temp.path().join(REPORT_FILE_NAME), "null").unwrap();
        let holder = ReportHolder::new(FileReportStore::new(temp.path()));
        assert_eq!(holder.resolve(None).unwrap(), ReportSource::RedirectToUpload);
    }

    #[test]
    fn navigation_state_wins_over_persisted_copy() {
        let temp = tempfile::tempdir().unwrap();
        let store = FileReportStore::new(temp.path());
        store.save(&minimal_result()).unwrap();

        let holder = ReportHolder::new(store);
        let source = holder.resolve(Some(full_result())).unwrap();
        assert_eq!(source, ReportSource::Navigation(full_result()));
    }

    #[test]
    fn reload_without_navigation_reproduces_summary() {
        let temp = tempfile::tempdir().unwrap();
        let holder = ReportHolder::new(FileReportStore::new(temp.path()));

        let first = holder.resolve(Some(full_result())).unwrap();
        let first_summary =
            render_report(first.result().unwrap(), OutputFormat::Human).unwrap();

        let reopened = ReportHolder::new(FileReportStore::new(temp.path()));
        let second = reopened.resolve(None).unwrap();
        assert!(matches!(second, ReportSource::Persisted(_)));
        let second_result = second.result().unwrap();
        assert_eq!(second_result.scan_type, "MRI");
        assert_eq!(second_result.risk_level, full_result().risk_level);
        assert_eq!(second_result.confidence, full_result().confidence);
        assert_eq!(
            render_report(second_result, OutputFormat::Human).unwrap(),
            first_summary
        );
    }

    #[test]
    fn clear_removes_persisted_copy() {
        let temp = tempfile::tempdir().unwrap();
        let store = FileReportStore::new(temp.path());
        store.save(&minimal_result()).unwrap();
        store.clear().unwrap();
        store.clear().unwrap();
        assert!(store.load().unwrap().is_none());
    }
}
