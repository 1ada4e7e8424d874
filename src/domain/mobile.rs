use crate::domain::order::{CredentialType, IssuerConfig, OrderItem};
use crate::foundation::{IsoDuration, ItemId, OrderId, SkusError};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::str::FromStr;

struct MobileProduct {
    sku: &'static str,
    product: &'static str,
    description: &'static str,
    price: &'static str,
    issuer: IssuerConfig,
    each_valid_for: &'static str,
}

const MOBILE_VALID_FOR: &str = "P1M";
const MOBILE_CURRENCY: &str = "USD";

fn mobile_product(sku_vnt: &str) -> Option<MobileProduct> {
    let leo = IssuerConfig { buffer: 3, overlap: 0 };
    let vpn = IssuerConfig { buffer: 31, overlap: 2 };
    let product = match sku_vnt {
        "brave-leo-premium" => ("brave-leo-premium", "leo", "Premium access to Leo", "14.99", leo, "P1D"),
        "brave-leo-premium-year" => ("brave-leo-premium", "leo", "Premium access to Leo Yearly", "149.99", leo, "P1D"),
        "brave-vpn-premium" => ("brave-vpn-premium", "vpn", "brave-vpn-premium", "9.99", vpn, "P1D"),
        "brave-vpn-premium-year" => ("brave-vpn-premium", "vpn", "brave-vpn-premium-year", "99.99", vpn, "P1D"),
        "brave-origin-premium" => ("brave-origin-premium", "origin", "brave-origin-premium", "4.99", leo, "P1M"),
        "brave-origin-premium-year" => ("brave-origin-premium", "origin", "brave-origin-premium-year", "49.99", leo, "P1M"),
        _ => return None,
    };
    let (sku, product, description, price, issuer, each_valid_for) = product;
    Some(MobileProduct { sku, product, description, price, issuer, each_valid_for })
}

fn mobile_location(product: &str, environment: &str) -> String {
    match environment {
        "prod" | "production" => format!("{product}.brave.com"),
        _ => format!("{product}.bravesoftware.com"),
    }
}

/// Builds the single time-limited-v2 item of an order paid in an app store. The item is not yet
/// attached to an order.
pub fn mobile_order_item(sku_vnt: &str, environment: &str, now: DateTime<Utc>) -> Result<(OrderItem, IssuerConfig), SkusError> {
    let product = mobile_product(sku_vnt).ok_or_else(|| SkusError::InvalidMobileProduct(sku_vnt.to_string()))?;
    let price = Decimal::from_str(product.price).map_err(|err| SkusError::Message(format!("invalid price '{}': {err}", product.price)))?;
    let valid_for_iso = IsoDuration::parse(MOBILE_VALID_FOR)?;
    let valid_for = valid_for_iso.length_from(now).and_then(|length| length.to_std().ok()).ok_or_else(|| SkusError::InvalidDuration {
        value: MOBILE_VALID_FOR.to_string(),
        details: "duration is out of range".to_string(),
    })?;
    let item = OrderItem {
        id: ItemId::new_v4(),
        order_id: OrderId::default(),
        sku: product.sku.to_string(),
        sku_variant: sku_vnt.to_string(),
        created_at: now,
        updated_at: now,
        currency: MOBILE_CURRENCY.to_string(),
        quantity: 1,
        price,
        subtotal: OrderItem::compute_subtotal(price, 1),
        location: Some(mobile_location(product.product, environment)),
        description: Some(product.description.to_string()),
        credential_type: CredentialType::TimeLimitedV2,
        valid_for: Some(valid_for),
        valid_for_iso: Some(valid_for_iso),
        each_credential_valid_for_iso: Some(IsoDuration::parse(product.each_valid_for)?),
        issuance_interval_iso: None,
        issuer_config: product.issuer,
        metadata: BTreeMap::new(),
    };
    Ok((item, product.issuer))
}

/// Maps a subscription id sent by a mobile client to the SKU variant it purchases.
///
/// The table covers release, beta and nightly channels on both platforms, plus ids that
/// older iOS clients still send alongside receipts.
pub fn sku_vnt_by_mobile_name(sub_id: &str) -> Result<&'static str, SkusError> {
    let sku = match sub_id {
        // Android Leo monthly.
        "brave.leo.monthly" | "beta.leo.monthly" | "nightly.leo.monthly" => "brave-leo-premium",
        // iOS Leo monthly.
        "braveleo.monthly" | "nightly.braveleo.monthly" => "brave-leo-premium",
        // Android Leo annual.
        "brave.leo.yearly" | "beta.leo.yearly" | "nightly.leo.yearly" => "brave-leo-premium-year",
        // iOS Leo annual.
        "braveleo.yearly" | "nightly.braveleo.yearly" | "braveleo.yearly.2" | "braveleo2.yearly" => "brave-leo-premium-year",
        // Android VPN monthly.
        "brave.vpn.monthly" | "beta.bravevpn.monthly" | "nightly.bravevpn.monthly" => "brave-vpn-premium",
        // iOS VPN monthly.
        "bravevpn.monthly" => "brave-vpn-premium",
        // Android VPN annual.
        "brave.vpn.yearly" | "beta.bravevpn.yearly" | "nightly.bravevpn.yearly" => "brave-vpn-premium-year",
        // iOS VPN annual.
        "bravevpn.yearly" => "brave-vpn-premium-year",
        // Android Origin.
        "brave.origin.monthly" | "beta.origin.monthly" | "nightly.origin.monthly" => "brave-origin-premium",
        "brave.origin.yearly" | "beta.origin.yearly" | "nightly.origin.yearly" => "brave-origin-premium-year",
        // iOS Origin.
        "braveorigin.monthly" | "beta.braveorigin.monthly" | "nightly.braveorigin.monthly" => "brave-origin-premium",
        "braveorigin.yearly" | "beta.braveorigin.yearly" | "nightly.braveorigin.yearly" => "brave-origin-premium-year",
        // Legacy iOS ids.
        "brave-firewall-vpn-premium" => "brave-vpn-premium",
        "brave-firewall-vpn-premium-year" => "brave-vpn-premium-year",
        other => return Err(SkusError::InvalidMobileProduct(other.to_string())),
    };
    Ok(sku)
}
