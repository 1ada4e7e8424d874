use crate::domain::CredentialRedemption;
use crate::foundation::{SkusError, DEFAULT_COHORT, ISSUER_CONFLICT_STATUS};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use parking_lot::Mutex;

/// Parameters for a time-limited-v2 issuer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuerRequest {
    pub name: String,
    pub cohort: i16,
    pub max_tokens: u32,
    pub valid_from: Option<DateTime<Utc>>,
    /// ISO-8601 duration of one signing period.
    pub duration: String,
    pub buffer: i32,
    pub overlap: i32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuerResponse {
    pub id: String,
    pub name: String,
    pub public_key: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub cohort: i16,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedCredentials {
    pub batch_proof: String,
    pub signed_tokens: Vec<String>,
    pub public_key: String,
}

/// Remote blind-signature service.
#[async_trait]
pub trait CredentialIssuer: Send + Sync {
    async fn create_issuer(&self, name: &str, max_tokens: u32) -> Result<(), SkusError>;
    async fn create_issuer_v3(&self, request: &IssuerRequest) -> Result<(), SkusError>;
    async fn get_issuer(&self, name: &str) -> Result<IssuerResponse, SkusError>;
    async fn get_issuer_v2(&self, name: &str, cohort: i16) -> Result<IssuerResponse, SkusError>;
    async fn sign_credentials(&self, name: &str, blinded: &[String]) -> Result<SignedCredentials, SkusError>;
    async fn redeem_credentials(&self, redemptions: &[CredentialRedemption], payload: &str) -> Result<(), SkusError>;
    async fn redeem_credential(&self, issuer: &str, preimage: &str, signature: &str, payload: &str) -> Result<(), SkusError>;
    /// Redeems against a time-limited-v2 issuer, whose keys rotate per signing period.
    async fn redeem_credential_v3(&self, issuer: &str, preimage: &str, signature: &str, payload: &str) -> Result<(), SkusError>;
}

/// In-process issuer used by tests and local runs. Issuers are keyed by (name, cohort);
/// creating an existing issuer answers 409 like the real service.
pub struct MemoryCredentialIssuer {
    issuers: Mutex<HashMap<(String, i16), IssuerResponse>>,
    scripted_failures: Mutex<Vec<u16>>,
    redeem_failures: Mutex<Vec<u16>>,
    redeemed: Mutex<Vec<(String, String)>>,
    fail_redeem: AtomicBool,
    create_calls: AtomicUsize,
}

impl MemoryCredentialIssuer {
    pub fn new() -> Self {
        Self {
            issuers: Mutex::new(HashMap::new()),
            scripted_failures: Mutex::new(Vec::new()),
            redeem_failures: Mutex::new(Vec::new()),
            redeemed: Mutex::new(Vec::new()),
            fail_redeem: AtomicBool::new(false),
            create_calls: AtomicUsize::new(0),
        }
    }

    /// The next create call fails with `status` (queued, first in first out).
    pub fn fail_next_create(&self, status: u16) {
        self.scripted_failures.lock().push(status);
    }

    /// Replaces the id reported for an existing issuer on the default cohort.
    pub fn set_issuer_id(&self, name: &str, id: &str) {
        if let Some(issuer) = self.issuers.lock().get_mut(&(name.to_string(), DEFAULT_COHORT)) {
            issuer.id = id.to_string();
        }
    }

    /// The next redeem call fails with `status` (queued, first in first out).
    pub fn fail_next_redeem(&self, status: u16) {
        self.redeem_failures.lock().push(status);
    }

    pub fn set_fail_redeem(&self, fail: bool) {
        self.fail_redeem.store(fail, Ordering::Relaxed);
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::Relaxed)
    }

    /// (issuer, preimage) pairs redeemed so far.
    pub fn redeemed(&self) -> Vec<(String, String)> {
        self.redeemed.lock().clone()
    }

    fn create(&self, operation: &str, name: &str, cohort: i16, expires_at: Option<DateTime<Utc>>) -> Result<(), SkusError> {
        self.create_calls.fetch_add(1, Ordering::Relaxed);
        let scripted = pop_front(&mut self.scripted_failures.lock());
        if let Some(status) = scripted {
            return Err(SkusError::issuer_rpc(operation, Some(status), "scripted failure"));
        }
        let mut issuers = self.issuers.lock();
        let key = (name.to_string(), cohort);
        if issuers.contains_key(&key) {
            return Err(SkusError::issuer_rpc(operation, Some(ISSUER_CONFLICT_STATUS), "issuer already exists"));
        }
        let digest = blake3::hash(format!("{name}|{cohort}").as_bytes());
        issuers.insert(
            key,
            IssuerResponse {
                id: uuid::Uuid::new_v4().to_string(),
                name: name.to_string(),
                public_key: hex::encode(&digest.as_bytes()[..16]),
                expires_at,
                cohort,
            },
        );
        Ok(())
    }

    fn lookup(&self, operation: &str, name: &str, cohort: i16) -> Result<IssuerResponse, SkusError> {
        self.issuers
            .lock()
            .get(&(name.to_string(), cohort))
            .cloned()
            .ok_or_else(|| SkusError::issuer_rpc(operation, Some(404), format!("issuer {name} not found")))
    }
}

impl Default for MemoryCredentialIssuer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialIssuer for MemoryCredentialIssuer {
    async fn create_issuer(&self, name: &str, _max_tokens: u32) -> Result<(), SkusError> {
        self.create("create_issuer", name, DEFAULT_COHORT, None)
    }

    async fn create_issuer_v3(&self, request: &IssuerRequest) -> Result<(), SkusError> {
        self.create("create_issuer_v3", &request.name, request.cohort, None)
    }

    async fn get_issuer(&self, name: &str) -> Result<IssuerResponse, SkusError> {
        self.lookup("get_issuer", name, DEFAULT_COHORT)
    }

    async fn get_issuer_v2(&self, name: &str, cohort: i16) -> Result<IssuerResponse, SkusError> {
        self.lookup("get_issuer_v2", name, cohort)
    }

    async fn sign_credentials(&self, name: &str, blinded: &[String]) -> Result<SignedCredentials, SkusError> {
        let issuer = self.lookup("sign_credentials", name, DEFAULT_COHORT)?;
        let signed_tokens =
            blinded.iter().map(|token| hex::encode(blake3::keyed_hash(&pad_key(&issuer.public_key), token.as_bytes()).as_bytes())).collect();
        Ok(SignedCredentials { batch_proof: "proof".to_string(), signed_tokens, public_key: issuer.public_key })
    }

    async fn redeem_credentials(&self, redemptions: &[CredentialRedemption], payload: &str) -> Result<(), SkusError> {
        for redemption in redemptions {
            self.redeem_credential(&redemption.issuer, &redemption.token_preimage, &redemption.signature, payload).await?;
        }
        Ok(())
    }

    async fn redeem_credential(&self, issuer: &str, preimage: &str, _signature: &str, _payload: &str) -> Result<(), SkusError> {
        self.redeem("redeem_credential", issuer, preimage)
    }

    async fn redeem_credential_v3(&self, issuer: &str, preimage: &str, _signature: &str, _payload: &str) -> Result<(), SkusError> {
        self.redeem("redeem_credential_v3", issuer, preimage)
    }
}

impl MemoryCredentialIssuer {
    fn redeem(&self, operation: &str, issuer: &str, preimage: &str) -> Result<(), SkusError> {
        if self.fail_redeem.load(Ordering::Relaxed) {
            return Err(SkusError::issuer_rpc(operation, Some(503), "redeem unavailable"));
        }
        if let Some(status) = pop_front(&mut self.redeem_failures.lock()) {
            return Err(SkusError::issuer_rpc(operation, Some(status), "scripted failure"));
        }
        self.redeemed.lock().push((issuer.to_string(), preimage.to_string()));
        Ok(())
    }
}

fn pop_front(queue: &mut Vec<u16>) -> Option<u16> {
    if queue.is_empty() {
        None
    } else {
        Some(queue.remove(0))
    }
}

fn pad_key(public_key: &str) -> [u8; 32] {
    *blake3::hash(public_key.as_bytes()).as_bytes()
}

pub mod circuit_breaker;
pub mod receipts;
pub mod retry;

pub use circuit_breaker::PauseBreaker;
pub use receipts::{AppStoreClient, CertChainVerifier, IdTokenValidator, PlayStoreClient};
pub use retry::{is_retriable_issuer_error, retry, retry_with_policy};
