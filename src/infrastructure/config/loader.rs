//! Configuration loader using Figment for layered config management.
//!
//! Precedence (lowest to highest):
//! 1. Compiled defaults
//! 2. TOML config file
//! 3. Profile overrides from `[profiles.<name>]`
//! 4. Environment variables (`SKUS_` prefix)

use crate::foundation::SkusError;
use crate::infrastructure::config::types::AppConfig;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::value::Dict;
use figment::{Figment, Profile};
use std::path::Path;
use tracing::{debug, info};

pub const CONFIG_FILE_NAME: &str = "skus-config.toml";

/// Environment variable prefix for config overrides.
///
/// Example: `SKUS_VOTE__DRAIN_PAUSE_MINUTES` -> `vote.drain_pause_minutes`
const ENV_PREFIX: &str = "SKUS_";

pub fn load_config(data_dir: &Path) -> Result<AppConfig, SkusError> {
    load_config_from_file(&data_dir.join(CONFIG_FILE_NAME), data_dir)
}

pub fn load_config_with_profile(data_dir: &Path, profile: &str) -> Result<AppConfig, SkusError> {
    load_config_from_file_with_profile(&data_dir.join(CONFIG_FILE_NAME), data_dir, profile)
}

pub fn load_config_from_file(path: &Path, data_dir: &Path) -> Result<AppConfig, SkusError> {
    info!(path = %path.display(), data_dir = %data_dir.display(), "loading configuration");
    let mut config: AppConfig = figment_base(path)
        .merge(env_provider())
        .extract()
        .map_err(|e| SkusError::ConfigError(format!("config extraction failed: {e}")))?;
    postprocess(&mut config, data_dir);
    log_loaded(&config, None);
    Ok(config)
}

pub fn load_config_from_file_with_profile(path: &Path, data_dir: &Path, profile: &str) -> Result<AppConfig, SkusError> {
    info!(path = %path.display(), data_dir = %data_dir.display(), profile = %profile, "loading configuration with profile");

    // Extract once to reach `profiles.<name>` in the file.
    let base: AppConfig =
        figment_base(path).extract().map_err(|e| SkusError::ConfigError(format!("config extraction failed: {e}")))?;
    let overrides = profile_overrides(&base, profile)?;

    let mut config: AppConfig = figment_base(path)
        .merge(Serialized::from(overrides, Profile::Default))
        .merge(env_provider())
        .extract()
        .map_err(|e| SkusError::ConfigError(format!("config extraction failed for profile '{profile}': {e}")))?;
    postprocess(&mut config, data_dir);
    log_loaded(&config, Some(profile));
    Ok(config)
}

fn figment_base(path: &Path) -> Figment {
    let figment = Figment::new().merge(Serialized::defaults(AppConfig::default()));
    if path.exists() {
        figment.merge(Toml::file(path))
    } else {
        debug!(path = %path.display(), "configuration file missing; using defaults and env only");
        figment
    }
}

fn env_provider() -> Env {
    // SKUS_DATA_DIR and SKUS_CONFIG_PATH locate files; they are not config keys.
    Env::prefixed(ENV_PREFIX).ignore(&["DATA_DIR", "CONFIG_PATH", "TEST_NOW_NANOS"]).split("__")
}

fn profile_overrides(config: &AppConfig, profile: &str) -> Result<Dict, SkusError> {
    let profiles = config.profiles.as_ref().ok_or_else(|| SkusError::ConfigError("no profiles section in config".to_string()))?;
    profiles.get(profile).cloned().ok_or_else(|| SkusError::ConfigError(format!("profile '{profile}' not found in config")))
}

fn postprocess(config: &mut AppConfig, data_dir: &Path) {
    if config.service.data_dir.trim().is_empty() {
        config.service.data_dir = data_dir.to_string_lossy().to_string();
    }
    config.service.whitelisted_skus.iter_mut().for_each(|sku| *sku = sku.trim().to_string());
    config.receipts.apple_root_fingerprint = config.receipts.apple_root_fingerprint.trim().to_ascii_uppercase();
}

fn log_loaded(config: &AppConfig, profile: Option<&str>) {
    debug!(
        profile = profile.unwrap_or("default"),
        environment = %config.service.environment,
        merchant_id = %config.service.merchant_id,
        whitelisted_skus = config.service.whitelisted_skus.len(),
        signed_topic = %config.bus.signed_order_creds_topic,
        play_auth_disabled = config.receipts.disable_play_auth,
        "configuration loaded"
    );
}
