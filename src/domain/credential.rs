use crate::domain::order::CredentialType;
use crate::foundation::{IssuerId, ItemId, OrderId, RequestId, SkusError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Correlation record carried opaquely through the signer in `associated_data`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(rename = "itemId")]
    pub item_id: ItemId,
    #[serde(rename = "orderId")]
    pub order_id: OrderId,
    #[serde(rename = "issuerId")]
    pub issuer_id: IssuerId,
    #[serde(rename = "credential_type")]
    pub credential_type: String,
}

impl Metadata {
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, SkusError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self, SkusError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn credential_type(&self) -> Result<CredentialType, SkusError> {
        self.credential_type.parse()
    }
}

/// Single-use credentials for one order item. Unsigned until the signing result lands.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCreds {
    #[serde(rename = "id")]
    pub item_id: ItemId,
    pub order_id: OrderId,
    pub issuer_id: IssuerId,
    pub blinded_creds: Vec<String>,
    pub signed_creds: Option<Vec<String>>,
    pub batch_proof: Option<String>,
    pub public_key: Option<String>,
}

impl OrderCreds {
    pub fn is_signed(&self) -> bool {
        self.signed_creds.is_some()
    }
}

/// Time-limited (v1) credentials are derived on demand and never stored.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeLimitedCreds {
    #[serde(rename = "id")]
    pub item_id: ItemId,
    pub order_id: OrderId,
    /// `YYYY-MM-DD`
    pub issued_at: String,
    /// `YYYY-MM-DD`
    pub expires_at: String,
    pub token: String,
}

/// One signed time bucket of a time-limited-v2 item. Unique per (order, item, issuer, valid_from).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeAwareSubIssuedCreds {
    pub order_id: OrderId,
    pub item_id: ItemId,
    pub issuer_id: IssuerId,
    pub valid_from: DateTime<Utc>,
    pub valid_to: DateTime<Utc>,
    pub blinded_creds: Vec<String>,
    pub signed_creds: Vec<String>,
    pub batch_proof: String,
    pub public_key: String,
    pub request_id: RequestId,
}

impl TimeAwareSubIssuedCreds {
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.valid_to > now
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum CredentialKind {
    SingleUse(OrderCreds),
    TimeLimited(Vec<TimeLimitedCreds>),
    TimeLimitedV2(Vec<TimeAwareSubIssuedCreds>),
}

impl CredentialKind {
    pub fn credential_type(&self) -> CredentialType {
        match self {
            CredentialKind::SingleUse(_) => CredentialType::SingleUse,
            CredentialKind::TimeLimited(_) => CredentialType::TimeLimited,
            CredentialKind::TimeLimitedV2(_) => CredentialType::TimeLimitedV2,
        }
    }
}

/// Answer to a credential fetch: either still being signed, or ready.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CredentialsOutcome {
    Accepted,
    Ready(CredentialKind),
}

/// Request to sign blinded tokens, tracked until the signing result arrives.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningRequestOutbox {
    pub request_id: RequestId,
    pub order_id: OrderId,
    pub item_id: ItemId,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub message: Vec<u8>,
}

impl SigningRequestOutbox {
    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }
}

/// A signed credential presented for redemption.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialBinding {
    #[serde(rename = "publicKey")]
    pub public_key: String,
    #[serde(rename = "t")]
    pub token_preimage: String,
    pub signature: String,
}

/// A credential ready to be redeemed against its issuer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRedemption {
    pub issuer: String,
    #[serde(rename = "t")]
    pub token_preimage: String,
    pub signature: String,
}

/// A credential a merchant presents for verification. `presentation` is base64 JSON whose shape
/// depends on `kind`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyCredentialRequest {
    #[serde(rename = "type")]
    pub kind: String,
    pub sku: String,
    #[serde(rename = "merchantId")]
    pub merchant_id: String,
    pub presentation: String,
}

/// Presentation of a time-limited (v1) credential; dates are `YYYY-MM-DD`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeLimitedPresentation {
    pub issued_at: String,
    pub expires_at: String,
    pub token: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum CredentialVerification {
    Verified,
    /// Time-limited-v2 redemptions report the preimage so merchants can decide on repeats.
    Redeemed { id: String, duplicate: bool },
}

/// Drops repeated token preimages, keeping the first occurrence.
pub fn deduplicate_credential_bindings(bindings: Vec<CredentialBinding>) -> Vec<CredentialBinding> {
    let mut seen = HashSet::new();
    bindings.into_iter().filter(|binding| seen.insert(binding.token_preimage.clone())).collect()
}
