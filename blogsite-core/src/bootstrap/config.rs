//! Configuration loading

use std::path::Path;

use anyhow::{bail, Result};
use tracing::info;

use crate::Config;

const DEFAULT_CONFIG_FILE: &str = "config.yaml";

/// Load configuration from a config file and environment variables
///
/// Config file search order:
/// 1. `explicit` (the `--config` flag)
/// 2. `BLOGSITE_CONFIG_PATH` environment variable
/// 3. ./config.yaml (current working directory)
/// 4. Fall back to environment variables only
///
/// A path named by 1 or 2 must exist.
pub fn load_config(explicit: Option<&str>) -> Result<Config> {
    let named = explicit
        .map(str::to_string)
        .or_else(|| std::env::var("BLOGSITE_CONFIG_PATH").ok());

    let config_path = match named {
        Some(path) if !Path::new(&path).exists() => bail!("Config file {path} not found"),
        Some(path) => Some(path),
        None => Path::new(DEFAULT_CONFIG_FILE)
            .exists()
            .then(|| DEFAULT_CONFIG_FILE.to_string()),
    };

    // Logging is not up yet, so report on stderr
    let config = if let Some(path) = config_path {
        eprintln!("Loading config from {path}");
        Config::from_file(&path).map_err(|e| anyhow::anyhow!("Failed to load {path}: {e}"))?
    } else {
        eprintln!("No config file found, using environment variables");
        Config::from_env()?
    };

    if let Err(errors) = config.validate() {
        for error in &errors {
            eprintln!("Config validation error: {error}");
        }
        return Err(anyhow::anyhow!(
            "Configuration validation failed with {} error(s): {}",
            errors.len(),
            errors.join("; ")
        ));
    }

    Ok(config)
}

/// Log the effective addresses once logging is initialized
pub fn log_summary(config: &Config) {
    info!(
        http = %config.http_address(),
        site = %config.site.absolute_url("/"),
        providers = config.oauth.providers.len(),
        smtp = config.email.is_configured(),
        "Configuration loaded and validated"
    );
}
