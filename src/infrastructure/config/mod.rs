mod loader;
mod types;
pub mod validation;

pub use loader::{load_config, load_config_from_file, load_config_from_file_with_profile, load_config_with_profile, CONFIG_FILE_NAME};
pub use types::*;

use crate::foundation::SkusError;
use std::path::{Path, PathBuf};

pub const CONFIG_PATH_ENV: &str = "SKUS_CONFIG_PATH";
pub const DATA_DIR_ENV: &str = "SKUS_DATA_DIR";

pub fn load_app_config() -> Result<AppConfig, SkusError> {
    let data_dir = resolve_data_dir()?;
    let config_path = resolve_config_path(&data_dir);
    load_app_config_from_path(&config_path, &data_dir)
}

pub fn load_app_config_from_path(path: &Path, data_dir: &Path) -> Result<AppConfig, SkusError> {
    let config = load_config_from_file(path, data_dir)?;
    config.validate().map_err(|errors| SkusError::ConfigError(format!("validation failed: {:?}", errors)))?;
    Ok(config)
}

pub fn load_app_config_with_profile(profile: &str) -> Result<AppConfig, SkusError> {
    let data_dir = resolve_data_dir()?;
    let config = load_config_from_file_with_profile(&resolve_config_path(&data_dir), &data_dir, profile)?;
    config.validate().map_err(|errors| SkusError::ConfigError(format!("validation failed: {:?}", errors)))?;
    Ok(config)
}

pub fn resolve_config_path(data_dir: &Path) -> PathBuf {
    match std::env::var(CONFIG_PATH_ENV) {
        Ok(value) if !value.trim().is_empty() => PathBuf::from(value.trim()),
        _ => data_dir.join(CONFIG_FILE_NAME),
    }
}

pub fn resolve_data_dir() -> Result<PathBuf, SkusError> {
    if let Ok(data_dir) = std::env::var(DATA_DIR_ENV) {
        let trimmed = data_dir.trim();
        if !trimmed.is_empty() {
            return Ok(PathBuf::from(trimmed));
        }
    }
    let cwd = std::env::current_dir()
        .map_err(|err| SkusError::StorageError { operation: "env::current_dir".to_string(), details: err.to_string() })?;
    Ok(cwd.join(".skus"))
}
