// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! JSON report files for benchmark results.

use crate::metrics::BenchmarkReport;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReporterError {
    #[error("Report I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize report: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Writes reports as `gpiocast_<category>_<timestamp>.json`.
pub struct JsonReporter {
    output_dir: PathBuf,
}

impl JsonReporter {
    /// Create the output directory if needed.
    pub fn new(output_dir: impl AsRef<Path>) -> Result<Self, ReporterError> {
        let output_dir = output_dir.as_ref().to_path_buf();
        fs::create_dir_all(&output_dir)?;
        Ok(Self { output_dir })
    }

    /// `data/` next to this crate's manifest.
    pub fn default_location() -> Result<Self, ReporterError> {
        Self::new(Path::new(env!("CARGO_MANIFEST_DIR")).join("data"))
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Save a report and return the file path.
    pub fn save(&self, report: &BenchmarkReport) -> Result<PathBuf, ReporterError> {
        let category = report
            .single_category()
            .map(|c| c.name())
            .unwrap_or("mixed");
        let filename = format!(
            "gpiocast_{}_{}.json",
            category,
            report.timestamp.format("%Y-%m-%dT%H-%M-%S%.3fZ")
        );
        let filepath = self.output_dir.join(filename);

        let writer = BufWriter::new(File::create(&filepath)?);
        serde_json::to_writer_pretty(writer, report)?;
        Ok(filepath)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<BenchmarkReport, ReporterError> {
        let file = File::open(path)?;
        Ok(serde_json::from_reader(file)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{BenchmarkCategory, BenchmarkResult};
    use tempfile::TempDir;

    #[test]
    fn test_reporter_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let reporter = JsonReporter::new(temp_dir.path().join("reports")).unwrap();

        let mut report = BenchmarkReport::new();
        report.add_result(BenchmarkResult::latency(
            "publish_to_callback_1",
            BenchmarkCategory::Notify,
            vec![100, 200, 300],
            false,
        ));

        let path = reporter.save(&report).unwrap();
        assert!(path.exists());
        let filename = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(filename.starts_with("gpiocast_notify_"));

        let loaded = JsonReporter::load(&path).unwrap();
        assert_eq!(loaded.results.len(), 1);
        assert_eq!(loaded.results[0].name, "publish_to_callback_1");
        assert_eq!(loaded.ring_capacity, report.ring_capacity);
    }

    #[test]
    fn test_mixed_report_filename() {
        let temp_dir = TempDir::new().unwrap();
        let reporter = JsonReporter::new(temp_dir.path()).unwrap();

        let mut report = BenchmarkReport::new();
        report.add_result(BenchmarkResult::throughput("a", BenchmarkCategory::Notify, 1, 1));
        report.add_result(BenchmarkResult::throughput("b", BenchmarkCategory::EventStore, 1, 1));

        let path = reporter.save(&report).unwrap();
        let filename = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(filename.starts_with("gpiocast_mixed_"));
    }

    #[test]
    fn test_load_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let err = JsonReporter::load(temp_dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, ReporterError::Io(_)));
    }
}
