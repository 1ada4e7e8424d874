//! Store-side collaborators of the receipt verifier. The HTTP clients and the X.509/JWT
//! cryptography live outside this crate; these traits are the seams they plug into.

use crate::domain::receipt::{AppleReceiptResponse, IdTokenClaims, PlaySubscriptionPurchase};
use crate::foundation::SkusError;
use async_trait::async_trait;
use base64::engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD};
use base64::Engine;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::HashMap;

#[async_trait]
pub trait AppStoreClient: Send + Sync {
    async fn verify_receipt(&self, blob: &str) -> Result<AppleReceiptResponse, SkusError>;
}

#[async_trait]
pub trait PlayStoreClient: Send + Sync {
    async fn subscription(&self, package: &str, subscription_id: &str, token: &str) -> Result<PlaySubscriptionPurchase, SkusError>;
}

pub trait CertChainVerifier: Send + Sync {
    /// Checks that `certs` (leaf, intermediate, root) chain to the root with the pinned fingerprint.
    fn verify_chain(&self, certs: &[Vec<u8>], pinned_root_fingerprint: &str) -> Result<(), SkusError>;
    /// Verifies the compact JWS with the leaf key and returns the decoded payload.
    fn verify_signature(&self, signed_payload: &str, leaf: &[u8]) -> Result<Vec<u8>, SkusError>;
}

#[async_trait]
pub trait IdTokenValidator: Send + Sync {
    async fn validate(&self, token: &str, audience: &str) -> Result<IdTokenClaims, SkusError>;
}

/// Returns canned responses keyed by receipt blob.
#[derive(Default)]
pub struct StaticAppStoreClient {
    responses: Mutex<HashMap<String, AppleReceiptResponse>>,
}

impl StaticAppStoreClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, blob: &str, response: AppleReceiptResponse) {
        self.responses.lock().insert(blob.to_string(), response);
    }
}

#[async_trait]
impl AppStoreClient for StaticAppStoreClient {
    async fn verify_receipt(&self, blob: &str) -> Result<AppleReceiptResponse, SkusError> {
        self.responses.lock().get(blob).cloned().ok_or_else(|| SkusError::ReceiptVerifier {
            operation: "verify_receipt".to_string(),
            details: "status 21002: receipt data malformed".to_string(),
        })
    }
}

/// Returns canned purchases keyed by purchase token.
#[derive(Default)]
pub struct StaticPlayStoreClient {
    purchases: Mutex<HashMap<String, PlaySubscriptionPurchase>>,
}

impl StaticPlayStoreClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, token: &str, purchase: PlaySubscriptionPurchase) {
        self.purchases.lock().insert(token.to_string(), purchase);
    }
}

#[async_trait]
impl PlayStoreClient for StaticPlayStoreClient {
    async fn subscription(&self, _package: &str, _subscription_id: &str, token: &str) -> Result<PlaySubscriptionPurchase, SkusError> {
        self.purchases.lock().get(token).cloned().ok_or_else(|| SkusError::ReceiptVerifier {
            operation: "subscription".to_string(),
            details: "404 purchase token not found".to_string(),
        })
    }
}

/// Uppercase hex SHA-256 of a DER certificate, the form root fingerprints are configured in.
pub fn sha256_fingerprint(der: &[u8]) -> String {
    hex::encode_upper(Sha256::digest(der))
}

/// Trusts a chain whose last certificate hashes to the pinned fingerprint and skips signature math.
#[derive(Default)]
pub struct PinnedRootCertVerifier;

impl PinnedRootCertVerifier {
    pub fn new() -> Self {
        Self
    }
}

impl CertChainVerifier for PinnedRootCertVerifier {
    fn verify_chain(&self, certs: &[Vec<u8>], pinned_root_fingerprint: &str) -> Result<(), SkusError> {
        let Some(root) = certs.last() else {
            return Err(SkusError::NotificationUnauthorized("certificate chain is empty".to_string()));
        };
        let fingerprint = sha256_fingerprint(root);
        if !fingerprint.eq_ignore_ascii_case(pinned_root_fingerprint.trim()) {
            return Err(SkusError::NotificationUnauthorized(format!("root certificate {fingerprint} is not pinned")));
        }
        Ok(())
    }

    fn verify_signature(&self, signed_payload: &str, _leaf: &[u8]) -> Result<Vec<u8>, SkusError> {
        let payload = signed_payload
            .split('.')
            .nth(1)
            .ok_or_else(|| SkusError::NotificationInvalid("signed payload has no body".to_string()))?;
        URL_SAFE_NO_PAD
            .decode(payload)
            .or_else(|_| STANDARD_NO_PAD.decode(payload))
            .map_err(|err| SkusError::NotificationInvalid(format!("payload: {err}")))
    }
}

/// Returns the same claims for every token.
pub struct StaticIdTokenValidator {
    claims: Option<IdTokenClaims>,
}

impl StaticIdTokenValidator {
    pub fn new(claims: IdTokenClaims) -> Self {
        Self { claims: Some(claims) }
    }

    pub fn rejecting() -> Self {
        Self { claims: None }
    }
}

#[async_trait]
impl IdTokenValidator for StaticIdTokenValidator {
    async fn validate(&self, _token: &str, _audience: &str) -> Result<IdTokenClaims, SkusError> {
        self.claims.clone().ok_or_else(|| SkusError::NotificationUnauthorized("invalid token".to_string()))
    }
}
