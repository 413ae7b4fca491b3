//! Run configuration: where the pipeline reads and writes.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info};

pub const CATEGORY_FILENAME: &str = "categories.json";
pub const LANGUAGE_TABLE_FILENAME: &str = "languages.json";

/// Directory layout and source host for a conversion run. Every field has
/// a default mirroring the layout the migration has always used, so a bare
/// run works without a config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvertConfig {
    #[serde(default = "default_input_dir")]
    pub input_dir: PathBuf,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_working_dir")]
    pub working_dir: PathBuf,
    #[serde(default = "default_definitions_dir")]
    pub definitions_dir: PathBuf,
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// Host the transport fetches associated files from.
    #[serde(default)]
    pub source_host: Option<String>,
}

fn default_input_dir() -> PathBuf {
    PathBuf::from("import")
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}
fn default_working_dir() -> PathBuf {
    PathBuf::from("working")
}
fn default_definitions_dir() -> PathBuf {
    PathBuf::from("definitions")
}
fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

impl Default for ConvertConfig {
    fn default() -> Self {
        ConvertConfig {
            input_dir: default_input_dir(),
            output_dir: default_output_dir(),
            working_dir: default_working_dir(),
            definitions_dir: default_definitions_dir(),
            log_dir: default_log_dir(),
            source_host: None,
        }
    }
}

impl ConvertConfig {
    /// Staged downloads live under the working directory so they get
    /// archived with the batch CSV and reset between batches.
    pub fn working_files_dir(&self) -> PathBuf {
        self.working_dir.join("files")
    }

    pub fn category_table_path(&self) -> PathBuf {
        self.definitions_dir.join(CATEGORY_FILENAME)
    }

    pub fn language_table_path(&self) -> PathBuf {
        self.definitions_dir.join(LANGUAGE_TABLE_FILENAME)
    }

    pub fn trace_loaded(&self) {
        info!(
            input_dir = %self.input_dir.display(),
            output_dir = %self.output_dir.display(),
            working_dir = %self.working_dir.display(),
            "Loaded ConvertConfig"
        );
        debug!(?self, "ConvertConfig loaded (full debug)");
    }
}
