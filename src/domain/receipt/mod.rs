//! Purchase receipts from the two mobile storefronts, normalized into one shape.

pub mod apple;
pub mod google;
pub mod notification;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub use apple::{find_apple_purchase, AppleInApp, AppleReceiptResponse};
pub use google::{check_play_purchase, PlaySubscriptionPurchase};
pub use notification::{
    bearer_token, check_play_claims, classify_app_store, classify_play_store, parse_play_developer_notification,
    x5c_chain, AppStoreNotification, IdTokenClaims, NotificationAction, PlayAuthConfig, PlayDeveloperNotification,
    PlaySubscriptionNotification,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Vendor {
    Ios,
    Android,
}

impl Vendor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Vendor::Ios => "ios",
            Vendor::Android => "android",
        }
    }
}

impl fmt::Display for Vendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptRequest {
    #[serde(rename = "type")]
    pub vendor: Vendor,
    /// Base64 App Store receipt, or the Play purchase token.
    #[serde(rename = "raw_receipt")]
    pub blob: String,
    pub package: String,
    pub subscription_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptData {
    #[serde(rename = "type")]
    pub vendor: Vendor,
    pub product_id: String,
    pub ext_id: String,
    pub expires_at: DateTime<Utc>,
}
