use skus_core::infrastructure::config::{
    load_app_config_from_path, load_config, load_config_from_file_with_profile, CONFIG_FILE_NAME,
};
use std::sync::{Mutex, MutexGuard, OnceLock};
use tempfile::TempDir;

fn lock_env() -> MutexGuard<'static, ()> {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    ENV_LOCK.get_or_init(|| Mutex::new(())).lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

struct EnvGuard {
    keys: Vec<&'static str>,
}

impl EnvGuard {
    fn set(pairs: &[(&'static str, &str)]) -> Self {
        for (key, value) in pairs {
            std::env::set_var(key, value);
        }
        Self { keys: pairs.iter().map(|(key, _)| *key).collect() }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for key in &self.keys {
            std::env::remove_var(key);
        }
    }
}

const CONFIG: &str = r#"
[service]
environment = "production"
time_limited_secret = "file-secret"

[vote]
drain_pause_minutes = 10

[receipts]
play_service_account = "play@skus.iam.gserviceaccount.com"

[profiles.devtest.service]
environment = "development"

[profiles.devtest.vote]
drain_batch_size = 5
"#;

fn write_config(dir: &TempDir, body: &str) {
    std::fs::write(dir.path().join(CONFIG_FILE_NAME), body).expect("write config");
}

#[test]
fn test_load_config_when_env_set_then_env_wins_over_file() {
    let _lock = lock_env();
    let dir = TempDir::new().expect("temp dir");
    write_config(&dir, CONFIG);
    let _env = EnvGuard::set(&[("SKUS_VOTE__DRAIN_PAUSE_MINUTES", "45"), ("SKUS_BUS__VOTE_TOPIC", "vote-staging")]);

    let config = load_config(dir.path()).expect("load");

    assert_eq!(config.vote.drain_pause_minutes, 45);
    assert_eq!(config.bus.vote_topic, "vote-staging");
    assert_eq!(config.service.environment, "production");
    assert_eq!(config.service.time_limited_secret, "file-secret");
}

#[test]
fn test_load_config_when_locator_vars_set_then_not_treated_as_keys() {
    let _lock = lock_env();
    let dir = TempDir::new().expect("temp dir");
    write_config(&dir, CONFIG);
    let _env = EnvGuard::set(&[("SKUS_DATA_DIR", "/tmp/elsewhere"), ("SKUS_CONFIG_PATH", "/tmp/elsewhere/skus.toml")]);

    let config = load_config(dir.path()).expect("load");

    assert_eq!(config.service.data_dir, dir.path().to_string_lossy());
}

#[test]
fn test_load_config_when_profile_selected_then_profile_then_env_applied() {
    let _lock = lock_env();
    let dir = TempDir::new().expect("temp dir");
    write_config(&dir, CONFIG);
    let _env = EnvGuard::set(&[("SKUS_VOTE__DRAIN_BATCH_SIZE", "7")]);

    let config = load_config_from_file_with_profile(&dir.path().join(CONFIG_FILE_NAME), dir.path(), "devtest").expect("load");

    assert_eq!(config.service.environment, "development");
    assert_eq!(config.vote.drain_batch_size, 7);
    assert_eq!(config.vote.drain_pause_minutes, 10);
}

#[test]
fn test_load_app_config_when_invalid_then_validation_error() {
    let _lock = lock_env();
    let dir = TempDir::new().expect("temp dir");
    write_config(
        &dir,
        r#"
[issuer]
retry_attempts = 0
"#,
    );

    let err = load_app_config_from_path(&dir.path().join(CONFIG_FILE_NAME), dir.path()).unwrap_err();

    let message = err.to_string();
    assert!(message.contains("validation failed"), "{message}");
    assert!(message.contains("retry_attempts"), "{message}");
}

#[test]
fn test_load_app_config_when_valid_file_then_ok() {
    let _lock = lock_env();
    let dir = TempDir::new().expect("temp dir");
    write_config(&dir, CONFIG);

    let config = load_app_config_from_path(&dir.path().join(CONFIG_FILE_NAME), dir.path()).expect("valid config");

    assert_eq!(config.receipts.play_service_account, "play@skus.iam.gserviceaccount.com");
}
