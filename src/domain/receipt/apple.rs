use crate::domain::receipt::{ReceiptData, Vendor};
use crate::foundation::util::time::millis_to_utc;
use crate::foundation::SkusError;
use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};

const VPN_MONTHLY: &str = "bravevpn.monthly";
const VPN_YEARLY: &str = "bravevpn.yearly";
const LEGACY_VPN_MONTHLY: &str = "brave-firewall-vpn-premium";
const LEGACY_VPN_YEARLY: &str = "brave-firewall-vpn-premium-year";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppleInApp {
    pub product_id: String,
    pub original_transaction_id: String,
    pub expires_date_ms: i64,
}

impl AppleInApp {
    fn expires_at(&self) -> Option<DateTime<Utc>> {
        millis_to_utc(self.expires_date_ms)
    }
}

/// Decoded receipt as returned by the App Store verify endpoint.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppleReceiptResponse {
    #[serde(default)]
    pub in_app: Option<Vec<AppleInApp>>,
    #[serde(default)]
    pub latest_receipt_info: Vec<AppleInApp>,
}

/// Product ids to look for, in order, given what the client claims to have bought.
fn candidate_product_ids(claimed: &str) -> Vec<&str> {
    let mut ids = vec![claimed];
    match claimed {
        // Clients send the monthly id for yearly purchases.
        VPN_MONTHLY => ids.push(VPN_YEARLY),
        LEGACY_VPN_MONTHLY => ids.push(VPN_MONTHLY),
        LEGACY_VPN_YEARLY => ids.push(VPN_YEARLY),
        _ => {}
    }
    ids
}

fn find_active<'a>(list: &'a [AppleInApp], product_id: &str, now: DateTime<Utc>) -> Option<&'a AppleInApp> {
    list.iter().find(|tx| tx.product_id == product_id && tx.expires_at().is_some_and(|expires_at| expires_at > now))
}

/// Picks the purchase backing `claimed`. For each candidate product id the in-app list is searched
/// before latest-receipt-info; the first unexpired hit wins regardless of recency.
pub fn find_apple_purchase(resp: &AppleReceiptResponse, claimed: &str, now: DateTime<Utc>) -> Result<ReceiptData, SkusError> {
    let in_app = match resp.in_app.as_deref() {
        Some(list) if !list.is_empty() => list,
        _ => return Err(SkusError::NoInAppTx),
    };

    for product_id in candidate_product_ids(claimed) {
        let hit = find_active(in_app, product_id, now).or_else(|| find_active(&resp.latest_receipt_info, product_id, now));
        if let Some(tx) = hit {
            debug!("apple purchase matched: claimed={} matched={} ext_id={}", claimed, tx.product_id, tx.original_transaction_id);
            let expires_at = tx.expires_at().ok_or_else(|| SkusError::InvalidReceipt("expiry out of range".to_string()))?;
            return Ok(ReceiptData {
                vendor: Vendor::Ios,
                product_id: tx.product_id.clone(),
                ext_id: tx.original_transaction_id.clone(),
                expires_at,
            });
        }
    }

    Err(SkusError::IosPurchaseNotFound { product_id: claimed.to_string() })
}
