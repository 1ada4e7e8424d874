use crate::foundation::SkusError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const PAYMENT_STATE_PENDING: i64 = 0;
const PAYMENT_STATE_PAID: i64 = 1;
const PAYMENT_STATE_TRIAL: i64 = 2;
const PAYMENT_STATE_PENDING_DEFERRED: i64 = 3;

const CANCEL_REASON_USER: i64 = 0;
const CANCEL_REASON_SYSTEM: i64 = 1;
const CANCEL_REASON_REPLACED: i64 = 2;
const CANCEL_REASON_DEVELOPER: i64 = 3;

/// Subset of the Play Developer API subscription purchase resource.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaySubscriptionPurchase {
    pub expiry_time_millis: i64,
    /// Absent for canceled or expired subscriptions.
    #[serde(default)]
    pub payment_state: Option<i64>,
    #[serde(default)]
    pub cancel_reason: Option<i64>,
}

impl PlaySubscriptionPurchase {
    /// Expiry equal to `now` still counts as active.
    pub fn has_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry_time_millis < now.timestamp_millis()
    }
}

fn cancel_reason_name(reason: i64) -> Option<&'static str> {
    match reason {
        CANCEL_REASON_USER => Some("user"),
        CANCEL_REASON_SYSTEM => Some("system"),
        CANCEL_REASON_REPLACED => Some("replaced"),
        CANCEL_REASON_DEVELOPER => Some("developer"),
        _ => None,
    }
}

/// Expiry is checked before payment state. Only paid and trial states are accepted; a
/// missing state means the subscription is no longer billed.
pub fn check_play_purchase(purchase: &PlaySubscriptionPurchase, now: DateTime<Utc>) -> Result<(), SkusError> {
    if purchase.has_expired(now) {
        return Err(SkusError::GpsSubPurchaseExpired);
    }
    let Some(state) = purchase.payment_state else {
        return Err(SkusError::GpsSubPurchaseFailed("no payment state".to_string()));
    };
    match state {
        PAYMENT_STATE_PAID | PAYMENT_STATE_TRIAL => Ok(()),
        PAYMENT_STATE_PENDING => match purchase.cancel_reason.and_then(cancel_reason_name) {
            Some(reason) => Err(SkusError::GpsSubPurchaseCanceled { reason: reason.to_string() }),
            None => Err(SkusError::GpsSubPurchasePending),
        },
        PAYMENT_STATE_PENDING_DEFERRED => Err(SkusError::GpsSubPurchaseDeferred),
        other => Err(SkusError::GpsSubPurchaseStatusUnknown(other)),
    }
}
