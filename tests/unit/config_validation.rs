use crate::fixtures::test_config;
use log::LevelFilter;
use skus_core::infrastructure::config::AppConfig;
use skus_core::infrastructure::logging::LogFilters;

#[test]
fn test_config_validate_when_test_defaults_then_ok() {
    assert_eq!(test_config().validate(), Ok(()));
}

#[test]
fn test_config_validate_when_play_auth_disabled_then_service_account_optional() {
    let mut config = AppConfig::default();
    assert!(config.validate().is_err());
    config.receipts.disable_play_auth = true;
    assert_eq!(config.validate(), Ok(()));
}

#[test]
fn test_config_validate_when_base_vote_value_not_decimal_then_rejected() {
    let mut config = test_config();
    config.vote.base_vote_value = "a quarter".to_string();
    config.issuer.retry_attempts = 0;
    let errors = config.validate().unwrap_err();
    assert_eq!(errors.len(), 2, "{errors:?}");
    assert!(errors.iter().any(|e| e.contains("base_vote_value")));
    assert!(errors.iter().any(|e| e.contains("retry_attempts")));
}

#[test]
fn test_config_validate_when_whitelist_has_blank_entry_then_rejected() {
    let mut config = test_config();
    config.service.whitelisted_skus.push("  ".to_string());
    let errors = config.validate().unwrap_err();
    assert!(errors[0].contains("whitelisted_skus"), "{errors:?}");
}

#[test]
fn test_config_defaults_when_untouched_then_documented_values() {
    let config = AppConfig::default();
    assert_eq!(config.service.merchant_id, "brave.com");
    assert_eq!(config.issuer.retry_attempts, 5);
    assert_eq!(config.issuer.non_retriable_statuses, vec![400, 401, 403, 500, 409]);
    assert_eq!(config.vote.drain_pause_minutes, 30);
    assert_eq!(config.vote.base_vote_value, "0.25");
    assert_eq!(config.bus.signed_order_creds_dlq_topic, "signed-order-creds.dlq");
}

#[test]
fn test_log_filters_when_bad_levels_then_skipped() {
    let filters = LogFilters::parse("verbose, skus_core::application=debug ,rocksdb=loud,root=error,root=trace");
    assert_eq!(filters.app_level, LevelFilter::Info);
    assert_eq!(filters.root_level, LevelFilter::Error);
    assert_eq!(filters.modules, vec![("skus_core::application".to_string(), LevelFilter::Debug)]);
}
