//! Batch writer: chunks normalized records into size-bounded batches.
//!
//! Each batch is serialized twice over the same record set: a pretty JSON
//! array into the batch output directory and a CSV into the working
//! directory, where it sits next to the staged downloads before the
//! archiver packages the lot. Filenames carry a zero-padded index so a
//! run's batches sort lexicographically in index order.

use std::fs;
use std::path::PathBuf;

use serde_json::Value;
use tracing::info;

use crate::archive::Archiver;
use crate::audit::{AuditLog, LogChannel};
use crate::normalize::NormalizedRecord;

#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error("batch output unwritable: {0}")]
    Io(#[from] std::io::Error),
    #[error("batch CSV write failed: {0}")]
    Csv(#[from] csv::Error),
    #[error("batch JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("batch archive failed: {0}")]
    Archive(String),
}

/// The number of digits needed to zero-pad batch indexes so that all batch
/// filenames in a run sort lexicographically, computed once from the total
/// input size. A run that fits in ten batches or fewer needs no padding.
pub fn pad_width(total_records: usize, max_size: usize) -> usize {
    if total_records == 0 || max_size == 0 {
        return 0;
    }
    let width = (total_records as f64 / max_size as f64).log10().ceil();
    if width.is_sign_negative() {
        0
    } else {
        width as usize
    }
}

/// Reference to one serialized batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchArtifact {
    pub index: usize,
    pub name: String,
    pub json_path: PathBuf,
    pub csv_path: PathBuf,
    pub zip_path: PathBuf,
}

/// Accumulates normalized records and flushes them as complete batches.
///
/// Only one batch is ever held in memory; flushing resets the working
/// directory so no batch's staged files leak into the next.
pub struct BatchWriter<'a, A: Archiver + ?Sized> {
    outfile_stem: String,
    max_size: usize,
    pad_width: usize,
    batch_output_dir: PathBuf,
    working_dir: PathBuf,
    working_files_dir: PathBuf,
    archiver: &'a A,
    audit: &'a AuditLog,
    records: Vec<NormalizedRecord>,
    fieldnames: Vec<String>,
    file_index: usize,
}

impl<'a, A: Archiver + ?Sized> BatchWriter<'a, A> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        outfile_stem: impl Into<String>,
        max_size: usize,
        pad_width: usize,
        batch_output_dir: impl Into<PathBuf>,
        working_dir: impl Into<PathBuf>,
        working_files_dir: impl Into<PathBuf>,
        archiver: &'a A,
        audit: &'a AuditLog,
    ) -> Self {
        BatchWriter {
            outfile_stem: outfile_stem.into(),
            max_size,
            pad_width,
            batch_output_dir: batch_output_dir.into(),
            working_dir: working_dir.into(),
            working_files_dir: working_files_dir.into(),
            archiver,
            audit,
            records: Vec::new(),
            fieldnames: Vec::new(),
            file_index: 0,
        }
    }

    /// Add one record; flushes and returns the batch artifact when the
    /// batch reaches its maximum size.
    pub async fn push(
        &mut self,
        record: NormalizedRecord,
    ) -> Result<Option<BatchArtifact>, BatchError> {
        for fieldname in record.keys() {
            if !self.fieldnames.contains(fieldname) {
                self.fieldnames.push(fieldname.clone());
            }
        }
        self.records.push(record);
        if self.records.len() >= self.max_size {
            return Ok(Some(self.flush().await?));
        }
        Ok(None)
    }

    /// Flush any non-empty partial batch at end of input.
    pub async fn finish(&mut self) -> Result<Option<BatchArtifact>, BatchError> {
        if self.records.is_empty() {
            return Ok(None);
        }
        Ok(Some(self.flush().await?))
    }

    async fn flush(&mut self) -> Result<BatchArtifact, BatchError> {
        let name = format!(
            "{}{:0>width$}",
            self.outfile_stem,
            self.file_index,
            width = self.pad_width
        );
        info!(batch = %name, records = self.records.len(), "Writing batch");
        self.audit
            .write(LogChannel::Details, &format!("Writing metadata into {}", name))?;

        fs::create_dir_all(&self.batch_output_dir)?;
        let json_path = self.batch_output_dir.join(format!("{}.json", name));
        let csv_path = self.working_dir.join(format!("{}.csv", name));
        let zip_path = self.batch_output_dir.join(format!("{}.zip", name));

        self.write_json(&json_path)?;
        self.write_csv(&csv_path)?;

        self.audit.write(
            LogChannel::Details,
            &format!("Creating zip archive: {}", zip_path.display()),
        )?;
        self.archiver
            .archive(&self.working_dir, &zip_path)
            .await
            .map_err(|e| BatchError::Archive(e.to_string()))?;

        self.reset_working_dir()?;

        let artifact = BatchArtifact {
            index: self.file_index,
            name,
            json_path,
            csv_path,
            zip_path,
        };
        self.records.clear();
        self.fieldnames.clear();
        self.file_index += 1;
        Ok(artifact)
    }

    fn write_json(&self, path: &PathBuf) -> Result<(), BatchError> {
        let array = Value::Array(self.records.iter().map(NormalizedRecord::to_json).collect());
        fs::write(path, serde_json::to_string_pretty(&array)?)?;
        Ok(())
    }

    /// CSV header is the insertion-ordered union of field names seen across
    /// the batch's records, so newly appearing fields are never dropped.
    fn write_csv(&self, path: &PathBuf) -> Result<(), BatchError> {
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(&self.fieldnames)?;
        for record in &self.records {
            let row: Vec<String> = self
                .fieldnames
                .iter()
                .map(|field| csv_cell(record.get(field)))
                .collect();
            writer.write_record(&row)?;
        }
        writer.flush().map_err(BatchError::Io)?;
        Ok(())
    }

    /// Clear and recreate the scratch directories so the next batch starts
    /// with an empty file set.
    fn reset_working_dir(&self) -> Result<(), BatchError> {
        if self.working_dir.exists() {
            fs::remove_dir_all(&self.working_dir)?;
        }
        fs::create_dir_all(&self.working_dir)?;
        fs::create_dir_all(&self.working_files_dir)?;
        Ok(())
    }
}

fn csv_cell(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(items)) if items.is_empty() => String::new(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| v.as_str().unwrap_or_default().to_string())
            .collect::<Vec<_>>()
            .join("|"),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}
