use crate::domain::time_limited::TimeLimitedSecret;
use crate::infrastructure::auth::AuthTokenVerifier;
use crate::infrastructure::bus::MessageBus;
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::rpc::{AppStoreClient, CertChainVerifier, CredentialIssuer, IdTokenValidator, PauseBreaker, PlayStoreClient};
use crate::infrastructure::storage::Storage;
use std::sync::Arc;
use std::time::Duration;

/// Everything an order, credential or vote operation needs. Cheap to clone; every collaborator
/// is shared.
#[derive(Clone)]
pub struct SkusContext {
    pub config: AppConfig,
    pub storage: Arc<dyn Storage>,
    pub issuer: Arc<dyn CredentialIssuer>,
    pub bus: Arc<dyn MessageBus>,
    pub auth: Arc<dyn AuthTokenVerifier>,
    pub vote_breaker: Arc<PauseBreaker>,
    pub time_limited_secret: TimeLimitedSecret,
}

impl SkusContext {
    pub fn new(
        config: AppConfig,
        storage: Arc<dyn Storage>,
        issuer: Arc<dyn CredentialIssuer>,
        bus: Arc<dyn MessageBus>,
        auth: Arc<dyn AuthTokenVerifier>,
    ) -> Self {
        let time_limited_secret = TimeLimitedSecret::new(config.service.time_limited_secret.as_bytes());
        Self { config, storage, issuer, bus, auth, vote_breaker: Arc::new(PauseBreaker::new()), time_limited_secret }
    }

    pub fn merchant_id(&self) -> &str {
        &self.config.service.merchant_id
    }

    pub(crate) fn issuer_retry_delay(&self) -> Duration {
        Duration::from_millis(self.config.issuer.retry_delay_ms)
    }

    pub(crate) fn vote_drain_pause(&self) -> Duration {
        Duration::from_secs(self.config.vote.drain_pause_minutes.saturating_mul(60))
    }
}

/// Storefront collaborators for receipt validation and subscription notifications.
#[derive(Clone)]
pub struct ReceiptContext {
    pub config: AppConfig,
    pub storage: Arc<dyn Storage>,
    pub app_store: Arc<dyn AppStoreClient>,
    pub play_store: Arc<dyn PlayStoreClient>,
    pub cert_verifier: Arc<dyn CertChainVerifier>,
    pub id_token_validator: Arc<dyn IdTokenValidator>,
}
