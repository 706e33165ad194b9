// ============================================================
// Layer 6 — Training Logger
// ============================================================
// Records per-epoch training metrics to tab-separated text files.
//
// Two files per architecture, both append-only so interrupted and
// resumed runs keep writing into the same history:
//
//   logs/{arch}_log_triplet.txt
//     epoch  avg_triplet_loss  num_valid_training_triplets
//
//   logs/{arch}_validation_log_triplet.txt
//     epoch  accuracy  precision  recall  roc_auc  threshold  tar  far
//
// Tab separation keeps the files trivially parseable with cut(1)
// or a spreadsheet import.
//
// Reference: Rust Book §12 (I/O and File Handling)

use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::PathBuf,
};

use crate::domain::error::TrainingError;
use crate::domain::verification::ValidationReport;
use crate::ml::trainer::EpochStats;

/// Appends epoch and validation rows for one training run.
pub struct TrainingLogger {
    train_path: PathBuf,
    validation_path: PathBuf,
}

impl TrainingLogger {
    /// Create the log directory and write headers for any file
    /// that does not exist yet.
    pub fn new(dir: impl Into<PathBuf>, architecture: &str) -> Result<Self, TrainingError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| TrainingError::storage(dir.clone(), e))?;

        let train_path = dir.join(format!("{architecture}_log_triplet.txt"));
        let validation_path = dir.join(format!("{architecture}_validation_log_triplet.txt"));

        if !train_path.exists() {
            fs::write(
                &train_path,
                "epoch\tavg_triplet_loss\tnum_valid_training_triplets\n",
            )
            .map_err(|e| TrainingError::storage(train_path.clone(), e))?;
        }
        if !validation_path.exists() {
            fs::write(
                &validation_path,
                "epoch\taccuracy\tprecision\trecall\troc_auc\tthreshold\ttar\tfar\n",
            )
            .map_err(|e| TrainingError::storage(validation_path.clone(), e))?;
        }

        Ok(Self { train_path, validation_path })
    }

    /// Append one epoch's training metrics.
    pub fn log_epoch(&self, epoch: usize, stats: &EpochStats) -> Result<(), TrainingError> {
        let row = format!(
            "{}\t{:.6}\t{}\n",
            epoch, stats.avg_loss, stats.valid_triplets,
        );
        self.append(&self.train_path, &row)
    }

    /// Append one validation report.
    pub fn log_validation(
        &self,
        epoch: usize,
        report: &ValidationReport,
    ) -> Result<(), TrainingError> {
        let row = format!(
            "{}\t{:.6}\t{:.6}\t{:.6}\t{:.6}\t{:.6}\t{:.6}\t{:.6}\n",
            epoch,
            report.accuracy,
            report.precision,
            report.recall,
            report.roc_auc,
            report.best_distance_threshold,
            report.tar,
            report.far,
        );
        self.append(&self.validation_path, &row)
    }

    pub fn train_log_path(&self) -> &PathBuf {
        &self.train_path
    }

    fn append(&self, path: &PathBuf, row: &str) -> Result<(), TrainingError> {
        let mut file = OpenOptions::new()
            .append(true)
            .open(path)
            .map_err(|e| TrainingError::storage(path.clone(), e))?;
        file.write_all(row.as_bytes())
            .map_err(|e| TrainingError::storage(path.clone(), e))
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn stats(avg_loss: f64, valid: usize) -> EpochStats {
        EpochStats {
            avg_loss,
            valid_triplets: valid,
            skipped_batches: 0,
            fallback_batches: 0,
        }
    }

    #[test]
    fn test_epoch_rows_append_under_header() {
        let dir = tempfile::tempdir().unwrap();
        let logger = TrainingLogger::new(dir.path(), "compact").unwrap();
        logger.log_epoch(1, &stats(0.412, 96)).unwrap();
        logger.log_epoch(2, &stats(0.377, 104)).unwrap();

        let text = fs::read_to_string(logger.train_log_path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("epoch\t"));
        assert!(lines[1].starts_with("1\t0.412000\t96"));
        assert!(lines[2].starts_with("2\t0.377000\t104"));
    }

    #[test]
    fn test_existing_log_is_appended_not_truncated() {
        let dir = tempfile::tempdir().unwrap();
        {
            let logger = TrainingLogger::new(dir.path(), "wide").unwrap();
            logger.log_epoch(1, &stats(0.9, 10)).unwrap();
        }
        // Second run over the same directory, as after a resume
        let logger = TrainingLogger::new(dir.path(), "wide").unwrap();
        logger.log_epoch(2, &stats(0.8, 12)).unwrap();

        let text = fs::read_to_string(logger.train_log_path()).unwrap();
        assert_eq!(text.lines().count(), 3);
    }

    #[test]
    fn test_validation_row_format() {
        let dir = tempfile::tempdir().unwrap();
        let logger = TrainingLogger::new(dir.path(), "standard").unwrap();
        let report = ValidationReport {
            accuracy: 0.91,
            precision: 0.9,
            recall: 0.88,
            roc_auc: 0.95,
            best_distance_threshold: 0.82,
            tar: 0.88,
            far: 0.06,
        };
        logger.log_validation(5, &report).unwrap();

        let path = dir.path().join("standard_validation_log_triplet.txt");
        let text = fs::read_to_string(path).unwrap();
        assert!(text.lines().nth(1).unwrap().starts_with("5\t0.910000\t0.900000"));
    }
}
