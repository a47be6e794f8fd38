//! Atomic report output.
//!
//! Reports are written to a temporary file in the output directory and then
//! renamed over the target, so readers never observe a half-written report.

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::debug;

use super::BenchmarkReport;
use crate::error::ReportError;

/// Writes reports to `<output_dir>/benchmark_report_<date>.json`.
#[derive(Debug, Clone)]
pub struct ReportWriter {
    output_dir: PathBuf,
}

impl ReportWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Returns the report path for `report`.
    pub fn path_for(&self, report: &BenchmarkReport) -> PathBuf {
        self.output_dir
            .join(format!("benchmark_report_{}.json", report.date))
    }

    /// Serializes `report` and atomically replaces the report file.
    pub fn write(&self, report: &BenchmarkReport) -> Result<PathBuf, ReportError> {
        let path = self.path_for(report);
        let json = serde_json::to_vec_pretty(report)?;
        let write_err = |source: std::io::Error| ReportError::Write {
            path: path.clone(),
            source,
        };

        std::fs::create_dir_all(&self.output_dir).map_err(write_err)?;
        let mut file = NamedTempFile::new_in(&self.output_dir).map_err(write_err)?;
        file.write_all(&json).map_err(write_err)?;
        file.as_file().sync_all().map_err(write_err)?;
        file.persist(&path).map_err(|e| write_err(e.error))?;

        debug!(path = %path.display(), results = report.summary.total_results, "Report written");
        Ok(path)
    }
}
