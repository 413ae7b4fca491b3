use std::fs;
use std::path::Path;

use anyhow::Result;
use tracing::{error, info};

use crate::config::ConvertConfig;

/// Load a YAML config file describing the directory layout and source
/// host. When no path is given the built-in default layout is used.
pub fn load_config(path: Option<&Path>) -> Result<ConvertConfig> {
    let Some(path_ref) = path else {
        info!("No config file given, using default directory layout");
        return Ok(ConvertConfig::default());
    };
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => {
            info!(config_path = ?path_ref, "Config file read successfully");
            content
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    let config: ConvertConfig = match serde_yaml::from_str(&config_content) {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            conf
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            return Err(anyhow::anyhow!("Failed to parse config YAML: {e}"));
        }
    };

    config.trace_loaded();
    Ok(config)
}
