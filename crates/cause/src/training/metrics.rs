//! Interval reports and the CSV metrics sink.

use std::fs::File;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::TrainError;
use crate::model::LossComponents;

/// One reporting interval: the flushed training statistics and the
/// validation losses measured right after.
#[derive(Debug, Clone, Serialize)]
pub struct IntervalReport {
    pub step: usize,
    pub train: LossComponents,
    pub validation: LossComponents,
    /// Wall-clock seconds since the previous report.
    pub elapsed_secs: f64,
}

/// In-memory record of every interval report of a run.
#[derive(Debug, Clone, Default)]
pub struct MetricsHistory {
    reports: Vec<IntervalReport>,
}

impl MetricsHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, report: IntervalReport) {
        self.reports.push(report);
    }

    pub fn reports(&self) -> &[IntervalReport] {
        &self.reports
    }

    pub fn into_reports(self) -> Vec<IntervalReport> {
        self.reports
    }

    pub fn len(&self) -> usize {
        self.reports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }

    /// Lowest validation total seen so far, with its step.
    pub fn best_validation(&self) -> Option<(usize, f64)> {
        self.reports
            .iter()
            .map(|r| (r.step, r.validation.total))
            .min_by(|a, b| a.1.total_cmp(&b.1))
    }
}

const HEADER: [&str; 6] = [
    "phase",
    "step",
    "total_loss",
    "mse_loss",
    "log_loss",
    "elapsed_secs",
];

/// Appends one `train` and one `validation` row per interval to a CSV file.
pub struct MetricsWriter {
    path: PathBuf,
    writer: csv::Writer<File>,
}

impl MetricsWriter {
    /// Create (truncating) the metrics file and write the header.
    pub fn create(path: &Path) -> Result<Self, TrainError> {
        let resource = |e: anyhow::Error| TrainError::Resource {
            path: path.to_path_buf(),
            reason: e,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| resource(e.into()))?;
        }
        let mut writer = csv::Writer::from_path(path).map_err(|e| resource(e.into()))?;
        writer.write_record(HEADER).map_err(|e| resource(e.into()))?;
        writer.flush()?;
        Ok(Self {
            path: path.to_path_buf(),
            writer,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&mut self, report: &IntervalReport) -> Result<(), TrainError> {
        let step = report.step.to_string();
        let rows = [
            ("train", &report.train, format!("{:.3}", report.elapsed_secs)),
            ("validation", &report.validation, String::new()),
        ];
        for (phase, losses, elapsed) in rows {
            self.writer
                .write_record([
                    phase.to_string(),
                    step.clone(),
                    format!("{:.6}", losses.total),
                    format!("{:.6}", losses.mse),
                    format!("{:.6}", losses.log_loss),
                    elapsed,
                ])
                .map_err(|e| TrainError::Resource {
                    path: self.path.clone(),
                    reason: e.into(),
                })?;
        }
        self.writer.flush()?;
        Ok(())
    }

    /// Flush and close the file.
    pub fn close(mut self) -> Result<(), TrainError> {
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(step: usize, train: f64, val: f64) -> IntervalReport {
        IntervalReport {
            step,
            train: LossComponents::new(train, train / 2.0, train),
            validation: LossComponents::new(val, val / 2.0, val),
            elapsed_secs: 0.25,
        }
    }

    #[test]
    fn test_writer_emits_header_and_two_rows_per_interval() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("logs").join("metrics.csv");
        let mut writer = MetricsWriter::create(&path).unwrap();
        writer.write(&report(40, 1.5, 2.0)).unwrap();
        writer.write(&report(80, 1.0, 1.8)).unwrap();
        writer.close().unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let headers: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
        assert_eq!(headers, HEADER);

        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 4);
        assert_eq!(&rows[0][0], "train");
        assert_eq!(&rows[0][1], "40");
        assert_eq!(&rows[0][5], "0.250");
        assert_eq!(&rows[1][0], "validation");
        assert_eq!(&rows[1][2], "2.000000");
        assert_eq!(&rows[1][5], "");
        assert_eq!(&rows[3][1], "80");
    }

    #[test]
    fn test_unwritable_path_is_resource_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let blocker = tmp.path().join("blocker");
        std::fs::write(&blocker, "not a directory").unwrap();
        let err = MetricsWriter::create(&blocker.join("metrics.csv")).err().unwrap();
        assert!(matches!(err, TrainError::Resource { .. }), "got: {err}");
    }

    #[test]
    fn test_best_validation() {
        let mut history = MetricsHistory::new();
        assert!(history.best_validation().is_none());
        history.push(report(40, 1.0, 2.0));
        history.push(report(80, 1.0, 1.2));
        history.push(report(120, 1.0, 1.5));
        assert_eq!(history.best_validation(), Some((80, 1.2)));
    }
}
