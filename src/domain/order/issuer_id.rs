//! Issuer ids pack a merchant and a SKU into one string: `brave.com?sku=user-wallet-vote`.

use crate::foundation::SkusError;
use url::form_urlencoded;

const SKU_PARAM: &str = "sku";

pub fn encode_issuer_id(merchant_id: &str, sku: &str) -> Result<String, SkusError> {
    ensure_parseable(merchant_id, merchant_id)?;
    let query = form_urlencoded::Serializer::new(String::new()).append_pair(SKU_PARAM, sku).finish();
    Ok(format!("{merchant_id}?{query}"))
}

/// Splits an issuer id back into `(merchant, sku)`. A missing `sku` parameter yields an empty SKU.
pub fn decode_issuer_id(issuer_id: &str) -> Result<(String, String), SkusError> {
    if issuer_id.trim().is_empty() {
        return Err(invalid(issuer_id, "empty issuer id"));
    }
    ensure_parseable(issuer_id, issuer_id)?;

    let without_fragment = issuer_id.split_once('#').map_or(issuer_id, |(head, _)| head);
    let (merchant, query) = match without_fragment.split_once('?') {
        Some((merchant, query)) => (merchant, query),
        None => (without_fragment, ""),
    };

    let sku = form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == SKU_PARAM)
        .map(|(_, value)| value.into_owned())
        .unwrap_or_default();

    Ok((merchant.to_string(), sku))
}

fn ensure_parseable(issuer_id: &str, value: &str) -> Result<(), SkusError> {
    if value.chars().any(|c| c.is_control()) {
        return Err(invalid(issuer_id, "contains control characters"));
    }
    if value.chars().any(char::is_whitespace) {
        return Err(invalid(issuer_id, "contains whitespace"));
    }
    Ok(())
}

fn invalid(issuer_id: &str, details: &str) -> SkusError {
    SkusError::InvalidIssuerId { issuer_id: issuer_id.to_string(), details: details.to_string() }
}
