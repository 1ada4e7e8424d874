use crate::fixtures::*;
use rust_decimal::Decimal;
use skus_core::application::{create_order, create_order_item_from_macaroon, validate_hardcoded_sku};
use skus_core::domain::order::{encode_issuer_id, OrderItemRequest, METADATA_NUM_INTERVALS, METADATA_NUM_PER_INTERVAL};
use skus_core::domain::{CredentialType, OrderStatus};
use skus_core::foundation::IsoDuration;
use skus_core::infrastructure::auth::Claims;
use skus_core::infrastructure::rpc::CredentialIssuer;
use skus_core::infrastructure::storage::{IssuerStorage, OrderStorage};
use skus_core::SkusError;
use std::collections::BTreeMap;

fn request(token: &str, quantity: u32) -> OrderItemRequest {
    OrderItemRequest { sku: token.to_string(), quantity }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_create_order_when_single_use_then_pending_with_issuer() -> Result<(), SkusError> {
    let h = memory_harness();
    let now = fixed_now();

    let order = create_order(&h.ctx, TEST_MERCHANT_ID, &[request(SINGLE_USE_TOKEN, 2)], now).await?;

    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.total_price, Decimal::new(50, 2));
    assert_eq!(order.currency, "USD");
    assert_eq!(order.location.as_deref(), Some(TEST_LOCATION));
    assert_eq!(order.allowed_payment_methods, vec!["stripe".to_string()]);
    assert_eq!(order.items[0].credential_type, CredentialType::SingleUse);
    assert_eq!(order.items[0].order_id, order.id);
    assert_eq!(order.items[0].description.as_deref(), Some("Talk credits"));

    let issuer_id = encode_issuer_id(TEST_MERCHANT_ID, SINGLE_USE_SKU)?;
    let issuer = h.storage.get_issuer(&issuer_id)?.expect("issuer stored");
    assert!(!issuer.public_key.is_empty());
    assert_eq!(h.issuer.create_calls(), 1);
    assert_eq!(h.storage.get_order(&order.id)?, Some(order));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_create_order_when_forty_quarter_credits_then_total_renders_without_scale() -> Result<(), SkusError> {
    let h = memory_harness();

    let order = create_order(&h.ctx, TEST_MERCHANT_ID, &[request(SINGLE_USE_TOKEN, 40)], fixed_now()).await?;

    assert_eq!(order.total_price.to_string(), "10");
    assert_eq!(order.items[0].subtotal.to_string(), "10");
    assert_eq!(serde_json::to_value(order.total_price).expect("json"), serde_json::json!("10"));
    assert_eq!(h.storage.get_order(&order.id)?.expect("stored").total_price.to_string(), "10");
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_create_order_when_ten_free_whitelisted_then_paid_with_zero_total() -> Result<(), SkusError> {
    let h = memory_harness();

    let order = create_order(&h.ctx, TEST_MERCHANT_ID, &[request(FREE_TOKEN, 10)], fixed_now()).await?;

    assert_eq!(order.status, OrderStatus::Paid);
    assert_eq!(order.total_price.to_string(), "0");
    assert_eq!(serde_json::to_value(order.total_price).expect("json"), serde_json::json!("0"));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_create_order_when_issuer_already_stored_then_signer_not_called() -> Result<(), SkusError> {
    let h = memory_harness();
    create_order(&h.ctx, TEST_MERCHANT_ID, &[request(SINGLE_USE_TOKEN, 1)], fixed_now()).await?;
    create_order(&h.ctx, TEST_MERCHANT_ID, &[request(SINGLE_USE_TOKEN, 3)], fixed_now()).await?;
    assert_eq!(h.issuer.create_calls(), 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_create_order_when_tlv2_then_interval_metadata_recorded() -> Result<(), SkusError> {
    let h = memory_harness();

    let vpn = create_order(&h.ctx, TEST_MERCHANT_ID, &[request(TLV2_TOKEN, 1)], fixed_now()).await?;
    assert_eq!(vpn.metadata.get(METADATA_NUM_INTERVALS).map(String::as_str), Some("35"));
    assert_eq!(vpn.metadata.get(METADATA_NUM_PER_INTERVAL).map(String::as_str), Some("2"));
    assert_eq!(vpn.items[0].issuer_config.buffer, 30);

    let leo = create_order(&h.ctx, TEST_MERCHANT_ID, &[request(LEO_TOKEN, 1)], fixed_now()).await?;
    assert_eq!(leo.metadata.get(METADATA_NUM_INTERVALS).map(String::as_str), Some("35"));
    assert_eq!(leo.metadata.get(METADATA_NUM_PER_INTERVAL).map(String::as_str), Some("192"));

    assert!(h.storage.get_issuer(&encode_issuer_id(TEST_MERCHANT_ID, TLV2_SKU)?)?.is_some());
    assert!(h.storage.get_issuer(&encode_issuer_id(TEST_MERCHANT_ID, LEO_SKU)?)?.is_some());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_create_order_when_free_whitelisted_then_paid_until_valid_for() -> Result<(), SkusError> {
    let h = memory_harness();
    let now = fixed_now();

    let order = create_order(&h.ctx, TEST_MERCHANT_ID, &[request(FREE_TOKEN, 1)], now).await?;

    assert_eq!(order.status, OrderStatus::Paid);
    assert_eq!(order.last_paid_at, Some(now));
    assert_eq!(order.expires_at, IsoDuration::parse("P1M")?.add_to(now));
    assert!(order.metadata.get(METADATA_NUM_INTERVALS).is_none());
    // time-limited items need no signer issuer
    assert_eq!(h.issuer.create_calls(), 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_create_order_when_currencies_differ_then_mixed_items() {
    let h = memory_harness();
    let err = create_order(&h.ctx, TEST_MERCHANT_ID, &[request(SINGLE_USE_TOKEN, 1), request(EUR_SINGLE_USE_TOKEN, 1)], fixed_now())
        .await
        .unwrap_err();
    assert!(matches!(err, SkusError::MixedOrderItems { ref field } if field == "currency"), "{err}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_create_order_when_payment_methods_differ_then_mixed_items() {
    let h = memory_harness();
    let err = create_order(&h.ctx, TEST_MERCHANT_ID, &[request(SINGLE_USE_TOKEN, 1), request(MULTI_PAYMENT_TOKEN, 1)], fixed_now())
        .await
        .unwrap_err();
    assert!(matches!(err, SkusError::MixedOrderItems { .. }), "{err}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_create_order_when_token_untrusted_then_invalid_sku() {
    let h = memory_harness();
    let err = create_order(&h.ctx, TEST_MERCHANT_ID, &[request(UNTRUSTED_TOKEN, 1)], fixed_now()).await.unwrap_err();
    assert!(matches!(err, SkusError::InvalidSku));
    assert_eq!(h.issuer.create_calls(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_create_order_when_no_items_then_rejected() {
    let h = memory_harness();
    assert!(create_order(&h.ctx, TEST_MERCHANT_ID, &[], fixed_now()).await.is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_create_issuer_when_signer_answers_conflict_then_issuer_fetched() -> Result<(), SkusError> {
    let h = memory_harness();
    let issuer_id = encode_issuer_id(TEST_MERCHANT_ID, SINGLE_USE_SKU)?;
    // Known to the signer but not to local storage.
    h.issuer.create_issuer(&issuer_id, 100).await?;

    create_order(&h.ctx, TEST_MERCHANT_ID, &[request(SINGLE_USE_TOKEN, 1)], fixed_now()).await?;

    assert_eq!(h.issuer.create_calls(), 2);
    let stored = h.storage.get_issuer(&issuer_id)?.expect("issuer stored");
    assert_eq!(stored.public_key, h.issuer.get_issuer(&issuer_id).await?.public_key);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_create_issuer_when_signer_reports_malformed_id_then_error_and_nothing_stored() -> Result<(), SkusError> {
    let h = memory_harness();
    let issuer_id = encode_issuer_id(TEST_MERCHANT_ID, SINGLE_USE_SKU)?;
    h.issuer.create_issuer(&issuer_id, 100).await?;
    h.issuer.set_issuer_id(&issuer_id, "not-a-uuid");

    let err = create_order(&h.ctx, TEST_MERCHANT_ID, &[request(SINGLE_USE_TOKEN, 1)], fixed_now()).await.unwrap_err();

    assert!(err.to_string().contains("not-a-uuid"), "{err}");
    assert!(h.storage.get_issuer(&issuer_id)?.is_none());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_create_issuer_when_bad_request_then_not_retried() {
    let h = memory_harness();
    h.issuer.fail_next_create(400);

    let err = create_order(&h.ctx, TEST_MERCHANT_ID, &[request(SINGLE_USE_TOKEN, 1)], fixed_now()).await.unwrap_err();

    assert_eq!(err.http_status(), Some(400));
    assert_eq!(h.issuer.create_calls(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_create_issuer_when_unavailable_twice_then_retried() -> Result<(), SkusError> {
    let h = memory_harness();
    h.issuer.fail_next_create(503);
    h.issuer.fail_next_create(503);

    create_order(&h.ctx, TEST_MERCHANT_ID, &[request(SINGLE_USE_TOKEN, 1)], fixed_now()).await?;

    assert_eq!(h.issuer.create_calls(), 3);
    Ok(())
}

#[test]
fn test_validate_hardcoded_sku_when_whitelisted_or_trusted_then_accepted() -> Result<(), SkusError> {
    let h = memory_harness();
    assert!(validate_hardcoded_sku(&h.ctx, FREE_TOKEN)?);
    assert!(validate_hardcoded_sku(&h.ctx, TLV2_TOKEN)?);
    assert!(!validate_hardcoded_sku(&h.ctx, UNTRUSTED_TOKEN)?);
    Ok(())
}

#[test]
fn test_item_from_token_when_metadata_caveat_then_values_stringified() -> Result<(), SkusError> {
    let h = memory_harness();
    let mut caveats = BTreeMap::new();
    caveats.insert("sku".to_string(), "brave-search-premium".to_string());
    caveats.insert("price".to_string(), "3".to_string());
    caveats.insert("currency".to_string(), "USD".to_string());
    caveats.insert("credential_type".to_string(), "single-use".to_string());
    caveats.insert("metadata".to_string(), r#"{"stripe_product_id":"prod_1","seats":3}"#.to_string());
    h.auth.insert("sku-token-search", Claims { location: "search.brave.com".to_string(), caveats });
    h.auth.trust(TEST_ENVIRONMENT, "sku-token-search");

    let (item, methods, _) = create_order_item_from_macaroon(&h.ctx, "sku-token-search", 2, fixed_now())?;

    assert_eq!(item.subtotal, Decimal::new(6, 0));
    assert_eq!(item.location.as_deref(), Some("search.brave.com"));
    assert_eq!(item.metadata.get("stripe_product_id").map(String::as_str), Some("prod_1"));
    assert_eq!(item.metadata.get("seats").map(String::as_str), Some("3"));
    assert!(methods.is_empty());
    Ok(())
}

#[test]
fn test_item_from_token_when_credential_type_missing_then_rejected() {
    let h = memory_harness();
    let mut caveats = BTreeMap::new();
    caveats.insert("sku".to_string(), "brave-search-premium".to_string());
    caveats.insert("price".to_string(), "3".to_string());
    h.auth.insert("sku-token-untyped", Claims { location: TEST_LOCATION.to_string(), caveats });
    h.auth.trust(TEST_ENVIRONMENT, "sku-token-untyped");

    let err = create_order_item_from_macaroon(&h.ctx, "sku-token-untyped", 1, fixed_now()).unwrap_err();
    assert!(matches!(err, SkusError::InvalidCredentialType(_)));
}
