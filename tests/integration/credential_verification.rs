use crate::fixtures::*;
use chrono::{DateTime, Duration, Utc};
use skus_core::application::{
    cancel_order, create_order, create_order_credentials, get_credentials, set_order_trial_days, uniq_batches, verify_credential,
};
use skus_core::domain::order::{encode_issuer_id, OrderItemRequest};
use skus_core::domain::{
    CredentialKind, CredentialRedemption, CredentialVerification, CredentialsOutcome, Order, OrderStatus, TimeAwareSubIssuedCreds,
    TimeLimitedCreds, TimeLimitedPresentation, VerifyCredentialRequest,
};
use skus_core::foundation::util::encoding::encode_base64;
use skus_core::foundation::{IssuerId, RequestId, MAX_TLV2_ACTIVE_BATCHES};
use skus_core::infrastructure::bus::TOPIC_UNSIGNED_ORDER_CREDS;
use skus_core::infrastructure::storage::{CredentialStorage, OrderStorage};
use skus_core::SkusError;
use std::collections::BTreeMap;

async fn paid_order(h: &TestHarness, token: &str) -> Result<Order, SkusError> {
    let order = create_order(&h.ctx, TEST_MERCHANT_ID, &[OrderItemRequest { sku: token.to_string(), quantity: 1 }], fixed_now()).await?;
    Ok(mark_paid(h.storage.as_ref(), &order.id, fixed_now()))
}

fn request(kind: &str, sku: &str, presentation: String) -> VerifyCredentialRequest {
    VerifyCredentialRequest { kind: kind.to_string(), sku: sku.to_string(), merchant_id: TEST_MERCHANT_ID.to_string(), presentation }
}

fn time_limited_presentation(creds: &TimeLimitedCreds) -> String {
    let presentation = TimeLimitedPresentation {
        issued_at: creds.issued_at.clone(),
        expires_at: creds.expires_at.clone(),
        token: creds.token.clone(),
    };
    encode_base64(serde_json::to_vec(&presentation).expect("presentation json"))
}

fn redemption_presentation(issuer: &str, preimage: &str) -> String {
    let redemption =
        CredentialRedemption { issuer: issuer.to_string(), token_preimage: preimage.to_string(), signature: format!("sig-{preimage}") };
    encode_base64(serde_json::to_vec(&redemption).expect("redemption json"))
}

fn no_caveats() -> BTreeMap<String, String> {
    BTreeMap::new()
}

async fn first_time_limited_creds(h: &TestHarness) -> Result<TimeLimitedCreds, SkusError> {
    let order = paid_order(h, TIME_LIMITED_TOKEN).await?;
    match get_credentials(&h.ctx, &order.id, fixed_now())? {
        CredentialsOutcome::Ready(CredentialKind::TimeLimited(mut creds)) => Ok(creds.remove(0)),
        other => panic!("expected time-limited creds, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_verify_time_limited_when_derived_token_presented_then_verified() -> Result<(), SkusError> {
    let h = memory_harness();
    let creds = first_time_limited_creds(&h).await?;
    let presented = request("time-limited", TIME_LIMITED_SKU, time_limited_presentation(&creds));

    let outcome = verify_credential(&h.ctx, TEST_MERCHANT_ID, &no_caveats(), &presented, fixed_now()).await?;

    assert_eq!(outcome, CredentialVerification::Verified);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_verify_time_limited_when_token_tampered_or_outside_window_then_forbidden() -> Result<(), SkusError> {
    let h = memory_harness();
    let creds = first_time_limited_creds(&h).await?;

    let tampered = TimeLimitedCreds { token: "AAAA".to_string(), ..creds.clone() };
    let err = verify_credential(
        &h.ctx,
        TEST_MERCHANT_ID,
        &no_caveats(),
        &request("time-limited", TIME_LIMITED_SKU, time_limited_presentation(&tampered)),
        fixed_now(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, SkusError::CredentialsNotVerified(_)), "{err}");

    // Tokens are bound to the sku they were derived for.
    let other_sku = request("time-limited", SINGLE_USE_SKU, time_limited_presentation(&creds));
    let err = verify_credential(&h.ctx, TEST_MERCHANT_ID, &no_caveats(), &other_sku, fixed_now()).await.unwrap_err();
    assert!(matches!(err, SkusError::CredentialsNotVerified(_)), "{err}");

    let valid = request("time-limited", TIME_LIMITED_SKU, time_limited_presentation(&creds));
    let after_expiry: DateTime<Utc> = fixed_now() + Duration::days(3);
    let err = verify_credential(&h.ctx, TEST_MERCHANT_ID, &no_caveats(), &valid, after_expiry).await.unwrap_err();
    assert!(err.to_string().contains("not valid"), "{err}");
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_verify_when_merchant_or_sku_caveat_differs_then_forbidden() {
    let h = memory_harness();
    let presented = request("single-use", SINGLE_USE_SKU, String::new());

    let err = verify_credential(&h.ctx, "other.example", &no_caveats(), &presented, fixed_now()).await.unwrap_err();
    assert!(matches!(err, SkusError::CredentialsNotVerified(_)));

    let caveats = BTreeMap::from([("sku".to_string(), TLV2_SKU.to_string())]);
    let err = verify_credential(&h.ctx, TEST_MERCHANT_ID, &caveats, &presented, fixed_now()).await.unwrap_err();
    assert!(matches!(err, SkusError::CredentialsNotVerified(_)));
    assert!(h.issuer.redeemed().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_verify_single_use_when_issuer_matches_then_redeemed() -> Result<(), SkusError> {
    let h = memory_harness();
    let issuer = encode_issuer_id(TEST_MERCHANT_ID, SINGLE_USE_SKU)?;
    let presented = request("single-use", SINGLE_USE_SKU, redemption_presentation(&issuer, "preimage-1"));

    let outcome = verify_credential(&h.ctx, TEST_MERCHANT_ID, &no_caveats(), &presented, fixed_now()).await?;

    assert_eq!(outcome, CredentialVerification::Verified);
    assert_eq!(h.issuer.redeemed(), vec![(issuer, "preimage-1".to_string())]);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_verify_single_use_when_presentation_malformed_or_issuer_differs_then_bad_request() -> Result<(), SkusError> {
    let h = memory_harness();

    let garbage = request("single-use", SINGLE_USE_SKU, "%%%".to_string());
    let err = verify_credential(&h.ctx, TEST_MERCHANT_ID, &no_caveats(), &garbage, fixed_now()).await.unwrap_err();
    assert!(matches!(err, SkusError::InvalidPresentation(_)));

    let foreign = encode_issuer_id(TEST_MERCHANT_ID, TLV2_SKU)?;
    let mismatched = request("single-use", SINGLE_USE_SKU, redemption_presentation(&foreign, "preimage-2"));
    let err = verify_credential(&h.ctx, TEST_MERCHANT_ID, &no_caveats(), &mismatched, fixed_now()).await.unwrap_err();
    assert!(matches!(err, SkusError::InvalidPresentation(_)));

    let unknown_kind = request("unlimited", SINGLE_USE_SKU, String::new());
    assert!(verify_credential(&h.ctx, TEST_MERCHANT_ID, &no_caveats(), &unknown_kind, fixed_now()).await.is_err());
    assert!(h.issuer.redeemed().is_empty());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_verify_when_redeemed_twice_then_single_use_forbidden_and_tlv2_flagged_duplicate() -> Result<(), SkusError> {
    let h = memory_harness();
    let single_use = encode_issuer_id(TEST_MERCHANT_ID, SINGLE_USE_SKU)?;
    h.issuer.fail_next_redeem(409);
    let err = verify_credential(
        &h.ctx,
        TEST_MERCHANT_ID,
        &no_caveats(),
        &request("single-use", SINGLE_USE_SKU, redemption_presentation(&single_use, "spent")),
        fixed_now(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, SkusError::CredentialsNotVerified(_)));

    let tlv2 = encode_issuer_id(TEST_MERCHANT_ID, TLV2_SKU)?;
    let presented = request("time-limited-v2", TLV2_SKU, redemption_presentation(&tlv2, "daily"));
    let first = verify_credential(&h.ctx, TEST_MERCHANT_ID, &no_caveats(), &presented, fixed_now()).await?;
    assert_eq!(first, CredentialVerification::Redeemed { id: "daily".to_string(), duplicate: false });

    h.issuer.fail_next_redeem(409);
    let repeat = verify_credential(&h.ctx, TEST_MERCHANT_ID, &no_caveats(), &presented, fixed_now()).await?;
    assert_eq!(repeat, CredentialVerification::Redeemed { id: "daily".to_string(), duplicate: true });

    h.issuer.fail_next_redeem(503);
    let err = verify_credential(&h.ctx, TEST_MERCHANT_ID, &no_caveats(), &presented, fixed_now()).await.unwrap_err();
    assert_eq!(err.http_status(), Some(503));
    Ok(())
}

fn active_creds(order: &Order, request_id: &str, valid_from: DateTime<Utc>, valid_to: DateTime<Utc>) -> TimeAwareSubIssuedCreds {
    TimeAwareSubIssuedCreds {
        order_id: order.id,
        item_id: order.items[0].id,
        issuer_id: IssuerId::new_v4(),
        valid_from,
        valid_to,
        blinded_creds: vec!["b".to_string()],
        signed_creds: vec!["s".to_string()],
        batch_proof: "proof".to_string(),
        public_key: "pk".to_string(),
        request_id: RequestId::new(request_id),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_uniq_batches_when_requests_overlap_now_then_distinct_requests_counted() -> Result<(), SkusError> {
    let h = memory_harness();
    let order = paid_order(&h, TLV2_TOKEN).await?;
    let now = fixed_now();
    let day = Duration::days(1);
    for (n, request_id) in ["req-a", "req-a", "req-b"].into_iter().enumerate() {
        let from = now - Duration::hours(n as i64 + 1);
        h.storage.insert_time_limited_v2_creds(&active_creds(&order, request_id, from, from + day))?;
    }
    h.storage.insert_time_limited_v2_creds(&active_creds(&order, "req-expired", now - day * 2, now - day))?;
    h.storage.insert_time_limited_v2_creds(&active_creds(&order, "req-future", now + day, now + day * 2))?;

    assert_eq!(uniq_batches(&h.ctx, &order.id, None, now)?, (MAX_TLV2_ACTIVE_BATCHES, 2));
    assert_eq!(uniq_batches(&h.ctx, &order.id, Some(&order.items[0].id), now)?, (MAX_TLV2_ACTIVE_BATCHES, 2));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_uniq_batches_when_unpaid_or_not_tlv2_then_rejected() -> Result<(), SkusError> {
    let h = memory_harness();
    let pending = create_order(&h.ctx, TEST_MERCHANT_ID, &[OrderItemRequest { sku: TLV2_TOKEN.to_string(), quantity: 1 }], fixed_now()).await?;
    assert!(matches!(uniq_batches(&h.ctx, &pending.id, None, fixed_now()), Err(SkusError::OrderUnpaid { .. })));

    let single_use = paid_order(&h, SINGLE_USE_TOKEN).await?;
    assert!(matches!(uniq_batches(&h.ctx, &single_use.id, None, fixed_now()), Err(SkusError::InvalidCredentialType(_))));

    let unknown_item = skus_core::foundation::ItemId::new_v4();
    let tlv2 = paid_order(&h, TLV2_TOKEN).await?;
    assert!(matches!(uniq_batches(&h.ctx, &tlv2.id, Some(&unknown_item), fixed_now()), Err(SkusError::OrderItemNotFound(_))));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_create_credentials_when_active_batches_at_limit_then_new_request_rejected() -> Result<(), SkusError> {
    let h = memory_harness();
    let order = paid_order(&h, TLV2_TOKEN).await?;
    let now = fixed_now();
    for n in 0..MAX_TLV2_ACTIVE_BATCHES {
        let from = now - Duration::minutes(n as i64 + 1);
        h.storage.insert_time_limited_v2_creds(&active_creds(&order, &format!("req-{n}"), from, from + Duration::days(1)))?;
    }

    let err = create_order_credentials(&h.ctx, &order.id, &order.items[0].id, vec!["b".to_string()], RequestId::new("req-new"), now)
        .await
        .unwrap_err();

    assert!(matches!(err, SkusError::Tlv2BatchLimitReached { active, limit } if active == limit));
    assert!(h.bus.published(TOPIC_UNSIGNED_ORDER_CREDS).await.is_empty());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cancel_order_when_paid_then_canceled_and_usable_until_expiry() -> Result<(), SkusError> {
    let h = memory_harness();
    let order = paid_order(&h, TLV2_TOKEN).await?;
    let later = fixed_now() + Duration::hours(1);

    let canceled = cancel_order(&h.ctx, &order.id, later)?;

    assert_eq!(canceled.status, OrderStatus::Canceled);
    let stored = h.storage.get_order(&order.id)?.expect("order");
    assert_eq!(stored.status, OrderStatus::Canceled);
    assert_eq!(stored.updated_at, later);
    assert!(stored.is_paid(later));
    assert!(matches!(
        cancel_order(&h.ctx, &skus_core::foundation::OrderId::new_v4(), later),
        Err(SkusError::OrderNotFound(_))
    ));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_set_trial_days_when_pending_stripe_order_then_stored_and_checkout_refresh_needed() -> Result<(), SkusError> {
    let h = memory_harness();
    let order = create_order(&h.ctx, TEST_MERCHANT_ID, &[OrderItemRequest { sku: TLV2_TOKEN.to_string(), quantity: 1 }], fixed_now()).await?;

    let updated = set_order_trial_days(&h.ctx, &order.id, 7, fixed_now())?;

    assert_eq!(updated.trial_days(), 7);
    assert!(updated.should_set_trial_days(fixed_now()));
    assert_eq!(h.storage.get_order(&order.id)?.expect("order").trial_days, Some(7));

    let paid = mark_paid(h.storage.as_ref(), &order.id, fixed_now());
    assert!(!paid.should_set_trial_days(fixed_now()));
    assert!(set_order_trial_days(&h.ctx, &order.id, -1, fixed_now()).is_err());
    Ok(())
}
