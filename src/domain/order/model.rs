use crate::foundation::{
    IsoDuration, ItemId, IssuerId, OrderId, SkusError, DEFAULT_ISSUANCE_INTERVAL, DEFAULT_ISSUER_BUFFER, DEFAULT_ISSUER_OVERLAP,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Order metadata key holding the payment vendor's transaction id.
pub const METADATA_EXTERNAL_ID: &str = "externalID";
/// Order metadata key naming the payment vendor (`ios`, `android`, ...).
pub const METADATA_VENDOR: &str = "vendor";
/// Order metadata key holding how many signing intervals a time-limited-v2 order requests.
pub const METADATA_NUM_INTERVALS: &str = "numIntervals";
/// Order metadata key holding how many credentials per interval a time-limited-v2 order requests.
pub const METADATA_NUM_PER_INTERVAL: &str = "numPerInterval";

pub const STRIPE_PAYMENT_METHOD: &str = "stripe";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Paid,
    Canceled,
    PastDue,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Paid => "paid",
            OrderStatus::Canceled => "canceled",
            OrderStatus::PastDue => "past_due",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = SkusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "pending" => Ok(OrderStatus::Pending),
            "paid" => Ok(OrderStatus::Paid),
            "canceled" => Ok(OrderStatus::Canceled),
            "past_due" => Ok(OrderStatus::PastDue),
            other => Err(SkusError::Message(format!("unknown order status: {other}"))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CredentialType {
    #[serde(rename = "single-use")]
    SingleUse,
    #[serde(rename = "time-limited")]
    TimeLimited,
    #[serde(rename = "time-limited-v2")]
    TimeLimitedV2,
}

impl CredentialType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialType::SingleUse => "single-use",
            CredentialType::TimeLimited => "time-limited",
            CredentialType::TimeLimitedV2 => "time-limited-v2",
        }
    }
}

impl fmt::Display for CredentialType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CredentialType {
    type Err = SkusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "single-use" => Ok(CredentialType::SingleUse),
            "time-limited" => Ok(CredentialType::TimeLimited),
            "time-limited-v2" => Ok(CredentialType::TimeLimitedV2),
            other => Err(SkusError::InvalidCredentialType(other.to_string())),
        }
    }
}

/// Key rotation window of a time-limited-v2 issuer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuerConfig {
    pub buffer: i32,
    pub overlap: i32,
}

impl Default for IssuerConfig {
    fn default() -> Self {
        Self { buffer: DEFAULT_ISSUER_BUFFER, overlap: DEFAULT_ISSUER_OVERLAP }
    }
}

impl IssuerConfig {
    pub fn num_intervals(&self) -> i32 {
        self.buffer.saturating_add(self.overlap)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: ItemId,
    pub order_id: OrderId,
    pub sku: String,
    pub sku_variant: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub currency: String,
    pub quantity: u32,
    pub price: Decimal,
    pub subtotal: Decimal,
    pub location: Option<String>,
    pub description: Option<String>,
    pub credential_type: CredentialType,
    pub valid_for: Option<Duration>,
    pub valid_for_iso: Option<IsoDuration>,
    pub each_credential_valid_for_iso: Option<IsoDuration>,
    pub issuance_interval_iso: Option<IsoDuration>,
    pub issuer_config: IssuerConfig,
    pub metadata: BTreeMap<String, String>,
}

impl OrderItem {
    /// SKU the issuer is keyed on; variants share their base SKU's issuer.
    pub fn sku_for_issuer(&self) -> &str {
        &self.sku
    }

    pub fn issuance_interval(&self) -> IsoDuration {
        self.issuance_interval_iso.unwrap_or_else(|| IsoDuration::parse(DEFAULT_ISSUANCE_INTERVAL).unwrap_or_default())
    }

    pub fn is_leo(&self) -> bool {
        self.sku.starts_with("brave-leo-premium")
    }

    /// Normalized so that `0.25 * 40` renders as `10`, not `10.00`.
    pub fn compute_subtotal(price: Decimal, quantity: u32) -> Decimal {
        (price * Decimal::from(quantity)).normalize()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub merchant_id: String,
    pub location: Option<String>,
    pub currency: String,
    pub total_price: Decimal,
    pub status: OrderStatus,
    pub items: Vec<OrderItem>,
    pub last_paid_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub valid_for: Option<Duration>,
    pub allowed_payment_methods: Vec<String>,
    pub metadata: BTreeMap<String, String>,
    #[serde(default)]
    pub trial_days: Option<i64>,
}

impl Order {
    /// A paid order is paid; a canceled one stays usable until its expiry passes.
    pub fn is_paid(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            OrderStatus::Paid => true,
            OrderStatus::Canceled => self.expires_at.is_some_and(|expires_at| expires_at > now),
            OrderStatus::Pending | OrderStatus::PastDue => false,
        }
    }

    pub fn has_item(&self, item_id: &ItemId) -> Option<&OrderItem> {
        self.items.iter().find(|item| &item.id == item_id)
    }

    pub fn items_total(&self) -> Decimal {
        self.items.iter().map(|item| item.subtotal).sum::<Decimal>().normalize()
    }

    pub fn total_matches_items(&self) -> bool {
        self.total_price == self.items_total()
    }

    pub fn external_id(&self) -> Option<&str> {
        self.metadata.get(METADATA_EXTERNAL_ID).map(String::as_str)
    }

    pub fn vendor(&self) -> Option<&str> {
        self.metadata.get(METADATA_VENDOR).map(String::as_str)
    }

    pub fn is_payable_by(&self, method: &str) -> bool {
        self.allowed_payment_methods.iter().any(|m| m == method)
    }

    /// Orders paid through an app store are canceled in the store, never through a payment rail.
    pub fn is_mobile(&self) -> bool {
        matches!(self.vendor(), Some("ios" | "android"))
    }

    pub fn trial_days(&self) -> i64 {
        self.trial_days.unwrap_or_default()
    }

    /// Trial days only matter before the first payment of a Stripe-payable order.
    pub fn should_set_trial_days(&self, now: DateTime<Utc>) -> bool {
        !self.is_paid(now) && self.is_payable_by(STRIPE_PAYMENT_METHOD)
    }
}

/// Signing identity for one (merchant, sku) pair as known by the credential issuer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issuer {
    pub id: IssuerId,
    pub created_at: DateTime<Utc>,
    /// Encoded issuer id (`merchant?sku=...`).
    pub merchant_id: String,
    pub public_key: String,
}

impl Issuer {
    pub fn name(&self) -> &str {
        &self.merchant_id
    }
}

/// Item terms extracted from an authorization token.
#[derive(Clone, Debug, PartialEq)]
pub struct OrderItemRequest {
    pub sku: String,
    pub quantity: u32,
}

/// Every item of an order must allow the same set of payment methods.
pub fn ensure_equal_payment_methods(existing: &[String], incoming: &[String]) -> Result<(), SkusError> {
    let mut a: Vec<&str> = existing.iter().map(String::as_str).collect();
    let mut b: Vec<&str> = incoming.iter().map(String::as_str).collect();
    a.sort_unstable();
    b.sort_unstable();
    if a != b {
        return Err(SkusError::MixedOrderItems { field: "allowed payment methods".to_string() });
    }
    Ok(())
}
