//! Store-side subscription notifications and what each one means for an order.

use crate::foundation::util::encoding::decode_base64;
use crate::foundation::SkusError;
use base64::engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD};
use base64::Engine;
use serde::Deserialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NotificationAction {
    Renew,
    Cancel,
    Skip,
}

/// Decoded App Store server notification (v2), reduced to what order reconciliation needs.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppStoreNotification {
    pub notification_type: String,
    #[serde(default)]
    pub subtype: Option<String>,
    pub original_transaction_id: String,
    #[serde(default)]
    pub expires_date: Option<i64>,
}

pub fn classify_app_store(ntf: &AppStoreNotification) -> NotificationAction {
    let subtype = ntf.subtype.as_deref().unwrap_or("");
    match (ntf.notification_type.as_str(), subtype) {
        ("DID_RENEW", "") | ("DID_RENEW", "BILLING_RECOVERY") => NotificationAction::Renew,
        ("DID_CHANGE_RENEWAL_STATUS", "AUTO_RENEW_ENABLED") => NotificationAction::Renew,
        ("SUBSCRIBED", "RESUBSCRIBE") => NotificationAction::Renew,
        ("DID_CHANGE_RENEWAL_STATUS", "AUTO_RENEW_DISABLED") => NotificationAction::Cancel,
        ("REFUND", "") => NotificationAction::Cancel,
        ("EXPIRED", "VOLUNTARY") | ("EXPIRED", "BILLING_RETRY") => NotificationAction::Cancel,
        _ => NotificationAction::Skip,
    }
}

#[derive(Deserialize)]
struct JwsHeader {
    #[serde(default)]
    x5c: Vec<String>,
}

/// DER certificates from a signed payload's `x5c` header: leaf, intermediate, root.
pub fn x5c_chain(signed_payload: &str) -> Result<Vec<Vec<u8>>, SkusError> {
    let parts: Vec<&str> = signed_payload.split('.').collect();
    if parts.len() != 3 {
        return Err(SkusError::NotificationInvalid("signed payload must have three parts".to_string()));
    }
    let header_raw = URL_SAFE_NO_PAD
        .decode(parts[0])
        .or_else(|_| STANDARD_NO_PAD.decode(parts[0]))
        .map_err(|err| SkusError::NotificationInvalid(format!("header: {err}")))?;
    let header: JwsHeader =
        serde_json::from_slice(&header_raw).map_err(|err| SkusError::NotificationInvalid(format!("header: {err}")))?;
    if header.x5c.len() != 3 {
        return Err(SkusError::NotificationInvalid(format!("expected 3 certificates, got {}", header.x5c.len())));
    }
    header.x5c.iter().map(|cert| decode_base64(cert)).collect()
}

/// Play real-time developer notification.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayDeveloperNotification {
    #[serde(default)]
    pub package_name: String,
    #[serde(default)]
    pub subscription_notification: Option<PlaySubscriptionNotification>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaySubscriptionNotification {
    pub notification_type: i32,
    pub purchase_token: String,
    pub subscription_id: String,
}

#[derive(Deserialize)]
struct PubSubMessage {
    data: String,
}

#[derive(Deserialize)]
struct PubSubPush {
    message: PubSubMessage,
}

/// Unwraps the Pub/Sub push envelope (`message.data` is base64 JSON).
pub fn parse_play_developer_notification(raw: &[u8]) -> Result<PlayDeveloperNotification, SkusError> {
    let push: PubSubPush = serde_json::from_slice(raw).map_err(|err| SkusError::NotificationInvalid(err.to_string()))?;
    let data = decode_base64(&push.message.data).map_err(|err| SkusError::NotificationInvalid(err.to_string()))?;
    serde_json::from_slice(&data).map_err(|err| SkusError::NotificationInvalid(err.to_string()))
}

pub fn classify_play_store(ntf: &PlayDeveloperNotification) -> NotificationAction {
    let Some(sub) = &ntf.subscription_notification else {
        return NotificationAction::Skip;
    };
    match sub.notification_type {
        // purchased, renewed, recovered, restarted
        4 | 2 | 1 | 7 => NotificationAction::Renew,
        // canceled, expired, revoked, on hold
        3 | 13 | 12 | 5 => NotificationAction::Cancel,
        _ => NotificationAction::Skip,
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PlayAuthConfig {
    pub audience: String,
    pub issuer: String,
    pub service_account: String,
    pub disabled: bool,
}

/// Claims of a Google-signed identity token, as returned by the token validator.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IdTokenClaims {
    pub issuer: String,
    pub email: Option<String>,
    pub email_verified: Option<bool>,
}

/// Extracts the token from `Bearer <token>`.
pub fn bearer_token(header: &str) -> Result<&str, SkusError> {
    if header.is_empty() {
        return Err(SkusError::NotificationUnauthorized("authorization header is empty".to_string()));
    }
    let parts: Vec<&str> = header.split(' ').collect();
    if parts.len() != 2 || parts[0] != "Bearer" || parts[1].is_empty() {
        return Err(SkusError::NotificationUnauthorized("authorization header invalid format".to_string()));
    }
    Ok(parts[1])
}

pub fn check_play_claims(cfg: &PlayAuthConfig, claims: &IdTokenClaims) -> Result<(), SkusError> {
    if claims.issuer.is_empty() || claims.issuer != cfg.issuer {
        return Err(SkusError::NotificationUnauthorized("invalid issuer".to_string()));
    }
    if claims.email.as_deref() != Some(cfg.service_account.as_str()) {
        return Err(SkusError::NotificationUnauthorized("invalid email".to_string()));
    }
    if claims.email_verified != Some(true) {
        return Err(SkusError::NotificationUnauthorized("email not verified".to_string()));
    }
    Ok(())
}
