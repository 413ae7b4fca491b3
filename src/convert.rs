//! Coordinating module for the load → normalize → batch → archive pipeline.
//!
//! One conversion run: clear the audit channels, reset the scratch
//! directories, load the read-only category and language tables, then walk
//! the input records strictly sequentially. Record N's normalization
//! (including any blocking downloads) completes before record N+1 begins;
//! the tables are shared by reference and never written after load.
//!
//! Failure policy: only setup-level problems (missing tables, unreadable
//! input, unwritable output/log directories) abort the run. Everything
//! record-local degrades to a default or an omission plus an audit entry.

use std::fs;
use std::path::Path;

use chrono::Local;
use tracing::{error, info};

use crate::archive::Archiver;
use crate::audit::{AuditLog, LogChannel};
use crate::batch::{pad_width, BatchArtifact, BatchError, BatchWriter};
use crate::categories::{CategoryError, CategoryTable};
use crate::config::ConvertConfig;
use crate::languages::{LanguageError, LanguageTable};
use crate::normalize::{Normalizer, RawRecord};
use crate::transport::Transport;

/// Batch directory names carry the run's start time.
const BATCH_DATE_FORMAT: &str = "%Y-%m-%d %H-%M-%S";

#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    #[error("filesystem setup failed: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Category(#[from] CategoryError),
    #[error(transparent)]
    Language(#[from] LanguageError),
    #[error(transparent)]
    Batch(#[from] BatchError),
    #[error("input record file malformed: {0}")]
    Input(#[from] serde_json::Error),
}

/// What to convert and how to chunk it.
#[derive(Debug, Clone)]
pub struct ConvertOptions {
    /// Input filename, relative to the configured input directory.
    pub infile: String,
    /// Filename stem for batch outputs; the zero-padded index is appended.
    pub outfile_stem: String,
    /// Maximum number of records per batch.
    pub max_size: usize,
}

/// Final run accounting: records with and without defaulting-triggered
/// flags, and the batches produced.
#[derive(Debug)]
pub struct ConversionReport {
    pub records_ok: usize,
    pub records_with_errors: usize,
    pub batches: Vec<BatchArtifact>,
}

/// Run one full conversion.
pub async fn run_conversion<T, A>(
    config: &ConvertConfig,
    options: &ConvertOptions,
    transport: &T,
    archiver: &A,
) -> Result<ConversionReport, ConvertError>
where
    T: Transport + ?Sized,
    A: Archiver + ?Sized,
{
    let audit = AuditLog::new(&config.log_dir)?;
    audit.clear()?;
    rebuild_working_dir(config)?;

    let batch_name = Local::now().format(BATCH_DATE_FORMAT).to_string();
    let batch_output_dir = config.output_dir.join(&batch_name);
    fs::create_dir_all(&batch_output_dir)?;

    audit.write(LogChannel::Default, "Conversion started.")?;
    audit.write(LogChannel::Details, "Conversion started.")?;
    info!(batch = %batch_name, "Conversion started");

    let categories = CategoryTable::load_json(config.category_table_path())?;
    let languages = LanguageTable::load_json(config.language_table_path())?;

    let input_path = config.input_dir.join(&options.infile);
    let data = read_input_records(&input_path)?;
    info!(records = data.len(), input = %input_path.display(), "Loaded input records");

    let width = pad_width(data.len(), options.max_size);
    let normalizer = Normalizer::new(
        &categories,
        &languages,
        &audit,
        transport,
        config.working_files_dir(),
        Local::now().naive_local(),
    );
    let mut writer = BatchWriter::new(
        &options.outfile_stem,
        options.max_size,
        width,
        &batch_output_dir,
        &config.working_dir,
        config.working_files_dir(),
        archiver,
        &audit,
    );

    let mut records_ok = 0usize;
    let mut records_with_errors = 0usize;
    let mut batches = Vec::new();

    for raw in data {
        let (record, with_errors) = normalizer.normalize(raw).await?;
        if with_errors {
            records_with_errors += 1;
        } else {
            records_ok += 1;
        }
        if let Some(artifact) = writer.push(record).await? {
            info!(batch = %artifact.name, "Batch flushed");
            batches.push(artifact);
        }
    }
    if let Some(artifact) = writer.finish().await? {
        info!(batch = %artifact.name, "Final partial batch flushed");
        batches.push(artifact);
    }

    let summary = format!(
        "Conversion complete. {} objects processed without errors. {} objects processed with errors.",
        records_ok, records_with_errors
    );
    audit.write(LogChannel::Details, &summary)?;
    info!(
        records_ok,
        records_with_errors,
        batches = batches.len(),
        "Conversion complete"
    );

    Ok(ConversionReport {
        records_ok,
        records_with_errors,
        batches,
    })
}

/// Rebuild the category tree from a source CSV and persist it for later
/// runs. Returns the number of categories resolved.
pub fn rebuild_categories(config: &ConvertConfig, infile: &str) -> Result<usize, ConvertError> {
    let source = config.input_dir.join(infile);
    let mut table = CategoryTable::import_raw_csv(&source)?;
    let report = table.resolve();
    for id in &report.recursion_errors {
        error!(category = %id, "Recursive error: parent id has itself as a parent");
    }
    for id in &report.unknown_parents {
        error!(parent = %id, "Category references an undefined parent");
    }
    fs::create_dir_all(&config.definitions_dir)?;
    table.save_json(config.category_table_path())?;
    Ok(table.len())
}

/// Verify a previously built category tree loads, returning its size.
pub fn load_categories(config: &ConvertConfig) -> Result<usize, ConvertError> {
    let table = CategoryTable::load_json(config.category_table_path())?;
    Ok(table.len())
}

/// The export is nominally JSON but arrives in mixed encodings; decode
/// lossily rather than refusing the file.
fn read_input_records(path: &Path) -> Result<Vec<RawRecord>, ConvertError> {
    let bytes = fs::read(path)?;
    let text = String::from_utf8_lossy(&bytes);
    let data: Vec<RawRecord> = serde_json::from_str(&text)?;
    Ok(data)
}

/// Clear out the working directory from the last run (or last batch) and
/// recreate the scratch layout.
fn rebuild_working_dir(config: &ConvertConfig) -> std::io::Result<()> {
    if config.working_dir.exists() {
        fs::remove_dir_all(&config.working_dir)?;
    }
    fs::create_dir_all(&config.working_dir)?;
    fs::create_dir_all(config.working_files_dir())?;
    Ok(())
}
