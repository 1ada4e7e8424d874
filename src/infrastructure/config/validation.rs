use crate::infrastructure::config::types::AppConfig;
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::str::FromStr;

const MAX_DRAIN_BATCH_SIZE: usize = 1_000;
const SHA256_HEX_LEN: usize = 64;

impl AppConfig {
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.service.merchant_id.trim().is_empty() {
            errors.push("service.merchant_id must not be empty".to_string());
        }
        if self.service.environment.trim().is_empty() {
            errors.push("service.environment must not be empty".to_string());
        }
        if self.service.whitelisted_skus.iter().any(|sku| sku.trim().is_empty()) {
            errors.push("service.whitelisted_skus must not contain empty entries".to_string());
        }

        let topics = [
            ("bus.unsigned_order_creds_topic", &self.bus.unsigned_order_creds_topic),
            ("bus.signed_order_creds_topic", &self.bus.signed_order_creds_topic),
            ("bus.signed_order_creds_dlq_topic", &self.bus.signed_order_creds_dlq_topic),
            ("bus.vote_topic", &self.bus.vote_topic),
        ];
        let mut seen = HashSet::new();
        for (name, topic) in topics {
            if topic.trim().is_empty() {
                errors.push(format!("{name} must not be empty"));
            } else if !seen.insert(topic.as_str()) {
                errors.push(format!("{name} duplicates another topic: {topic}"));
            }
        }

        if self.issuer.retry_attempts == 0 {
            errors.push("issuer.retry_attempts must be > 0".to_string());
        }

        if self.vote.drain_batch_size == 0 || self.vote.drain_batch_size > MAX_DRAIN_BATCH_SIZE {
            errors.push(format!("vote.drain_batch_size must be in 1..={MAX_DRAIN_BATCH_SIZE}"));
        }
        if Decimal::from_str(&self.vote.base_vote_value).is_err() {
            errors.push(format!("vote.base_vote_value is not a decimal: {}", self.vote.base_vote_value));
        }

        if !self.receipts.disable_play_auth {
            if self.receipts.play_issuer.trim().is_empty() {
                errors.push("receipts.play_issuer is required unless receipts.disable_play_auth=true".to_string());
            }
            if self.receipts.play_service_account.trim().is_empty() {
                errors.push("receipts.play_service_account is required unless receipts.disable_play_auth=true".to_string());
            }
        }
        let fingerprint = self.receipts.apple_root_fingerprint.trim();
        if fingerprint.len() != SHA256_HEX_LEN || hex::decode(fingerprint).is_err() {
            errors.push("receipts.apple_root_fingerprint must be a sha256 hex digest".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
