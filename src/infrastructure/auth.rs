//! Authorization token capability. Token formats and their cryptography are external; the
//! service only needs the decoded caveats and a trust decision.

use crate::foundation::SkusError;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};

/// First-party caveats of a decoded token, `key = value` pairs.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Claims {
    pub location: String,
    pub caveats: BTreeMap<String, String>,
}

impl Claims {
    pub fn caveat(&self, key: &str) -> Option<&str> {
        self.caveats.get(key).map(String::as_str)
    }
}

pub trait AuthTokenVerifier: Send + Sync {
    fn decode(&self, raw: &str) -> Result<Claims, SkusError>;
    /// Whether the token was minted by a key trusted in `environment`.
    fn is_trusted(&self, environment: &str, raw: &str) -> Result<bool, SkusError>;
}

/// Table-backed verifier for tests and local runs.
#[derive(Default)]
pub struct StaticAuthTokenVerifier {
    tokens: Mutex<HashMap<String, Claims>>,
    trusted: Mutex<HashSet<(String, String)>>,
}

impl StaticAuthTokenVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, raw: &str, claims: Claims) {
        self.tokens.lock().insert(raw.to_string(), claims);
    }

    pub fn trust(&self, environment: &str, raw: &str) {
        self.trusted.lock().insert((environment.to_string(), raw.to_string()));
    }
}

impl AuthTokenVerifier for StaticAuthTokenVerifier {
    fn decode(&self, raw: &str) -> Result<Claims, SkusError> {
        self.tokens.lock().get(raw).cloned().ok_or(SkusError::InvalidSku)
    }

    fn is_trusted(&self, environment: &str, raw: &str) -> Result<bool, SkusError> {
        Ok(self.trusted.lock().contains(&(environment.to_string(), raw.to_string())))
    }
}
