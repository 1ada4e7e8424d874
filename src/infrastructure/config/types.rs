use crate::foundation::{
    BASE_VOTE_VALUE, DEFAULT_CONSUMER_BACKOFF_MS, DEFAULT_MERCHANT_ID, NON_RETRIABLE_ISSUER_STATUSES, VOTE_DRAIN_PAUSE_SECS,
};
use crate::infrastructure::bus::{TOPIC_SIGNED_ORDER_CREDS, TOPIC_SIGNED_ORDER_CREDS_DLQ, TOPIC_UNSIGNED_ORDER_CREDS, TOPIC_VOTE};
use figment::value::{Dict, Map};
use serde::{Deserialize, Serialize};

/// SHA-256 fingerprint of Apple Root CA - G3.
pub const APPLE_ROOT_CA_G3_FINGERPRINT: &str = "63343ABFB89A6A03EBB57E9B3F5FA7BE7C4F5C756F3017B3A8C488C3653E9179";

const DEFAULT_ENVIRONMENT: &str = "development";
const DEFAULT_PLAY_ISSUER: &str = "https://accounts.google.com";
const DEFAULT_RETRY_ATTEMPTS: usize = 5;
const DEFAULT_RETRY_DELAY_MS: u64 = 500;
const DEFAULT_DRAIN_BATCH_SIZE: usize = 100;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub data_dir: String,
    /// Wipe RocksDB if the schema version mismatches. Development only.
    #[serde(default)]
    pub allow_schema_wipe: bool,
    #[serde(default = "default_merchant_id")]
    pub merchant_id: String,
    /// Deployment environment; selects the trusted keys for authorization tokens.
    #[serde(default = "default_environment")]
    pub environment: String,
    /// Raw SKU tokens accepted without a trust check; free orders of these skip payment.
    #[serde(default)]
    pub whitelisted_skus: Vec<String>,
    /// Secret behind time-limited (v1) credentials.
    #[serde(default)]
    pub time_limited_secret: String,
}

fn default_merchant_id() -> String {
    DEFAULT_MERCHANT_ID.to_string()
}

fn default_environment() -> String {
    DEFAULT_ENVIRONMENT.to_string()
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            data_dir: String::new(),
            allow_schema_wipe: false,
            merchant_id: default_merchant_id(),
            environment: default_environment(),
            whitelisted_skus: Vec::new(),
            time_limited_secret: String::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusConfig {
    #[serde(default = "default_unsigned_topic")]
    pub unsigned_order_creds_topic: String,
    #[serde(default = "default_signed_topic")]
    pub signed_order_creds_topic: String,
    #[serde(default = "default_dlq_topic")]
    pub signed_order_creds_dlq_topic: String,
    #[serde(default = "default_vote_topic")]
    pub vote_topic: String,
    /// Pause after a failed signed-credentials message.
    #[serde(default = "default_consumer_backoff_ms")]
    pub consumer_backoff_ms: u64,
}

fn default_unsigned_topic() -> String {
    TOPIC_UNSIGNED_ORDER_CREDS.to_string()
}

fn default_signed_topic() -> String {
    TOPIC_SIGNED_ORDER_CREDS.to_string()
}

fn default_dlq_topic() -> String {
    TOPIC_SIGNED_ORDER_CREDS_DLQ.to_string()
}

fn default_vote_topic() -> String {
    TOPIC_VOTE.to_string()
}

const fn default_consumer_backoff_ms() -> u64 {
    DEFAULT_CONSUMER_BACKOFF_MS
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            unsigned_order_creds_topic: default_unsigned_topic(),
            signed_order_creds_topic: default_signed_topic(),
            signed_order_creds_dlq_topic: default_dlq_topic(),
            vote_topic: default_vote_topic(),
            consumer_backoff_ms: default_consumer_backoff_ms(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuerClientConfig {
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: usize,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_non_retriable_statuses")]
    pub non_retriable_statuses: Vec<u16>,
}

const fn default_retry_attempts() -> usize {
    DEFAULT_RETRY_ATTEMPTS
}

const fn default_retry_delay_ms() -> u64 {
    DEFAULT_RETRY_DELAY_MS
}

fn default_non_retriable_statuses() -> Vec<u16> {
    NON_RETRIABLE_ISSUER_STATUSES.to_vec()
}

impl Default for IssuerClientConfig {
    fn default() -> Self {
        Self {
            retry_attempts: default_retry_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            non_retriable_statuses: default_non_retriable_statuses(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteConfig {
    /// How long the drain job stays paused after the bus reports an expired session.
    #[serde(default = "default_drain_pause_minutes")]
    pub drain_pause_minutes: u64,
    #[serde(default = "default_drain_batch_size")]
    pub drain_batch_size: usize,
    #[serde(default = "default_base_vote_value")]
    pub base_vote_value: String,
}

const fn default_drain_pause_minutes() -> u64 {
    VOTE_DRAIN_PAUSE_SECS / 60
}

const fn default_drain_batch_size() -> usize {
    DEFAULT_DRAIN_BATCH_SIZE
}

fn default_base_vote_value() -> String {
    BASE_VOTE_VALUE.to_string()
}

impl Default for VoteConfig {
    fn default() -> Self {
        Self {
            drain_pause_minutes: default_drain_pause_minutes(),
            drain_batch_size: default_drain_batch_size(),
            base_vote_value: default_base_vote_value(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptsConfig {
    #[serde(default)]
    pub play_audience: String,
    #[serde(default = "default_play_issuer")]
    pub play_issuer: String,
    #[serde(default)]
    pub play_service_account: String,
    /// Skip authorization of Play push notifications (local runs).
    #[serde(default)]
    pub disable_play_auth: bool,
    #[serde(default = "default_apple_root_fingerprint")]
    pub apple_root_fingerprint: String,
}

fn default_play_issuer() -> String {
    DEFAULT_PLAY_ISSUER.to_string()
}

fn default_apple_root_fingerprint() -> String {
    APPLE_ROOT_CA_G3_FINGERPRINT.to_string()
}

impl Default for ReceiptsConfig {
    fn default() -> Self {
        Self {
            play_audience: String::new(),
            play_issuer: default_play_issuer(),
            play_service_account: String::new(),
            disable_play_auth: false,
            apple_root_fingerprint: default_apple_root_fingerprint(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Directory for `skus.log` and `skus_err.log`; console only when unset.
    #[serde(default)]
    pub dir: Option<String>,
    #[serde(default = "default_log_filters")]
    pub filters: String,
}

fn default_log_filters() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { dir: None, filters: default_log_filters() }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub bus: BusConfig,
    #[serde(default)]
    pub issuer: IssuerClientConfig,
    #[serde(default)]
    pub vote: VoteConfig,
    #[serde(default)]
    pub receipts: ReceiptsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default, skip_serializing)]
    pub profiles: Option<Map<String, Dict>>,
}
