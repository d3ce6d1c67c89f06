//! Configuration loading shared by the commands.

use std::path::{Path, PathBuf};

use tracing::debug;

use rcpt_core::{Credentials, RcptConfig, ReceiptPipeline};

use crate::commands::models::{get_active_variant, get_variant_dir};

/// User config location: `<config dir>/rcpt/config.json`.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("rcpt")
        .join("config.json")
}

/// Load the explicit config file, else the user config if present, else defaults.
pub fn load_config(config_path: Option<&str>) -> anyhow::Result<RcptConfig> {
    let config = match config_path {
        Some(path) => RcptConfig::from_file(Path::new(path))?,
        None => {
            let path = default_config_path();
            if path.exists() {
                RcptConfig::from_file(&path)?
            } else {
                RcptConfig::default()
            }
        }
    };

    Ok(config)
}

/// Point the on-device engine at `model_dir`, or at the active downloaded
/// variant when the configured directory lacks any model file.
pub fn resolve_model_dir(config: &mut RcptConfig, model_dir: Option<PathBuf>) {
    if let Some(dir) = model_dir {
        config.models.model_dir = dir;
    } else if !config.models.is_complete() {
        config.models.model_dir = get_variant_dir(get_active_variant());
    }
    debug!("Using model directory {}", config.models.model_dir.display());
}

/// Build the pipeline from config and environment credentials.
pub fn build_pipeline(config: &RcptConfig) -> anyhow::Result<ReceiptPipeline> {
    let credentials = Credentials::from_env();
    Ok(ReceiptPipeline::from_config(config, &credentials)?)
}
