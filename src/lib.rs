pub mod archive;
pub mod audit;
pub mod batch;
pub mod categories;
pub mod committee;
pub mod config;
pub mod convert;
pub mod embargo;
pub mod encoding;
pub mod languages;
pub mod load_config;
pub mod normalize;
pub mod transport;
pub mod value;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};

use archive::ZipArchiver;
use convert::{load_categories, rebuild_categories, run_conversion, ConvertOptions};
use load_config::load_config;
use transport::ScpTransport;

/// Host files are pulled from when the config does not name one.
const DEFAULT_SOURCE_HOST: &str = "eprints-prod-01";

#[derive(Parser)]
#[clap(
    name = "etd-convert",
    version,
    about = "Convert an ETD repository export into importer-ready record batches"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Normalize an exported record file and write zipped batches
    Convert {
        /// Input filename inside the configured input directory
        #[clap(long, default_value = "etd.json")]
        infile: String,
        /// Filename stem for batch outputs
        #[clap(long, default_value = "etd")]
        outfile: String,
        /// Maximum records per batch
        #[clap(long, default_value_t = 100)]
        max_size: usize,
        /// Path to the YAML config file
        #[clap(long)]
        config: Option<PathBuf>,
    },
    /// Build or inspect the category tree used during conversion
    Categories {
        #[clap(value_enum)]
        mode: CategoryMode,
        /// Source CSV inside the configured input directory (regenerate only)
        #[clap(long, default_value = "categories.csv")]
        infile: String,
        /// Path to the YAML config file
        #[clap(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum CategoryMode {
    /// Re-import the raw CSV and rebuild the persisted tree
    Regenerate,
    /// Load the persisted tree and report its size
    Load,
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!("trace_initialised");

    let result = match cli.command {
        Commands::Convert {
            infile,
            outfile,
            max_size,
            config,
        } => {
            let config = load_config(config.as_deref())?;
            let host = config
                .source_host
                .clone()
                .unwrap_or_else(|| DEFAULT_SOURCE_HOST.to_string());
            let transport = ScpTransport::new(host);
            let archiver = ZipArchiver;
            let options = ConvertOptions {
                infile,
                outfile_stem: outfile,
                max_size,
            };
            println!("Conversion starting...");
            match run_conversion(&config, &options, &transport, &archiver).await {
                Ok(report) => {
                    println!(
                        "Conversion complete. {} objects processed without errors. {} objects processed with errors.",
                        report.records_ok, report.records_with_errors
                    );
                    for batch in &report.batches {
                        println!("  wrote {}", batch.zip_path.display());
                    }
                    Ok(())
                }
                Err(e) => {
                    eprintln!("[ERROR] Conversion failed: {}", e);
                    Err(anyhow::Error::new(e))
                }
            }
        }
        Commands::Categories {
            mode,
            infile,
            config,
        } => {
            let config = load_config(config.as_deref())?;
            match mode {
                CategoryMode::Regenerate => match rebuild_categories(&config, &infile) {
                    Ok(count) => {
                        println!("Category tree rebuilt: {} categories.", count);
                        Ok(())
                    }
                    Err(e) => {
                        eprintln!("[ERROR] Category rebuild failed: {}", e);
                        Err(anyhow::Error::new(e))
                    }
                },
                CategoryMode::Load => match load_categories(&config) {
                    Ok(count) => {
                        println!("Category tree loaded: {} categories.", count);
                        Ok(())
                    }
                    Err(e) => {
                        eprintln!("[ERROR] Category tree failed to load: {}", e);
                        Err(anyhow::Error::new(e))
                    }
                },
            }
        }
    };

    let exit_span = tracing::info_span!("exit");
    exit_span.in_scope(|| {
        tracing::info!("run finished");
    });

    result
}
