use crate::fixtures::{fixed_now, play_claims, play_push, signed_payload, APPLE_LEAF_DER, APPLE_ROOT_DER, PLAY_PACKAGE, PLAY_SERVICE_ACCOUNT};
use chrono::Duration;
use skus_core::domain::receipt::{
    check_play_claims, check_play_purchase, classify_play_store, find_apple_purchase, parse_play_developer_notification, x5c_chain,
    AppleInApp, AppleReceiptResponse, NotificationAction, PlayAuthConfig, PlaySubscriptionPurchase, Vendor,
};
use skus_core::domain::sku_vnt_by_mobile_name;
use skus_core::SkusError;

fn tx(product_id: &str, ext: &str, days_from_now: i64) -> AppleInApp {
    AppleInApp {
        product_id: product_id.to_string(),
        original_transaction_id: ext.to_string(),
        expires_date_ms: (fixed_now() + Duration::days(days_from_now)).timestamp_millis(),
    }
}

#[test]
fn test_apple_purchase_when_claimed_id_in_latest_only_then_found_before_fallback_id() {
    // The claimed monthly id is searched in both lists before the yearly fallback.
    let resp = AppleReceiptResponse {
        in_app: Some(vec![tx("bravevpn.yearly", "yearly", 300)]),
        latest_receipt_info: vec![tx("bravevpn.monthly", "monthly", 20)],
    };
    let data = find_apple_purchase(&resp, "bravevpn.monthly", fixed_now()).unwrap();
    assert_eq!(data.ext_id, "monthly");
    assert_eq!(data.vendor, Vendor::Ios);
}

#[test]
fn test_apple_purchase_when_in_app_empty_then_no_in_app_tx() {
    let resp = AppleReceiptResponse { in_app: Some(Vec::new()), latest_receipt_info: vec![tx("bravevpn.monthly", "m", 5)] };
    assert!(matches!(find_apple_purchase(&resp, "bravevpn.monthly", fixed_now()), Err(SkusError::NoInAppTx)));
}

#[test]
fn test_apple_purchase_when_all_expired_then_not_found() {
    let resp = AppleReceiptResponse { in_app: Some(vec![tx("braveleo.monthly", "old", -3)]), latest_receipt_info: Vec::new() };
    let err = find_apple_purchase(&resp, "braveleo.monthly", fixed_now()).unwrap_err();
    assert!(matches!(err, SkusError::IosPurchaseNotFound { ref product_id } if product_id == "braveleo.monthly"));
}

#[test]
fn test_play_purchase_when_expired_and_pending_then_expiry_reported_first() {
    let now = fixed_now();
    let purchase =
        PlaySubscriptionPurchase { expiry_time_millis: now.timestamp_millis() - 1_000, payment_state: Some(0), cancel_reason: None };
    assert!(matches!(check_play_purchase(&purchase, now), Err(SkusError::GpsSubPurchaseExpired)));

    let active_pending = PlaySubscriptionPurchase { expiry_time_millis: now.timestamp_millis() + 1_000, ..purchase };
    assert!(matches!(check_play_purchase(&active_pending, now), Err(SkusError::GpsSubPurchasePending)));
}

#[test]
fn test_play_purchase_when_payment_state_missing_then_rejected() {
    let now = fixed_now();
    let lapsed = PlaySubscriptionPurchase { expiry_time_millis: now.timestamp_millis() + 60_000, payment_state: None, cancel_reason: None };
    assert!(matches!(check_play_purchase(&lapsed, now), Err(SkusError::GpsSubPurchaseFailed(_))));

    let system_canceled = PlaySubscriptionPurchase { payment_state: Some(0), cancel_reason: Some(1), ..lapsed.clone() };
    assert!(matches!(check_play_purchase(&system_canceled, now), Err(SkusError::GpsSubPurchaseCanceled { .. })));

    let unknown = PlaySubscriptionPurchase { payment_state: Some(9), ..lapsed };
    let err = check_play_purchase(&unknown, now).unwrap_err();
    assert!(err.is_client_error());
    assert_eq!(err.code(), skus_core::foundation::ErrorCode::GpsSubPurchaseStatusUnknown);
}

#[test]
fn test_play_notification_when_pubsub_envelope_then_decoded_and_classified() {
    let ntf = parse_play_developer_notification(&play_push(2, "purchase-token")).unwrap();
    assert_eq!(ntf.package_name, PLAY_PACKAGE);
    let sub = ntf.subscription_notification.as_ref().unwrap();
    assert_eq!(sub.purchase_token, "purchase-token");
    assert_eq!(classify_play_store(&ntf), NotificationAction::Renew);

    for (kind, expected) in [(1, NotificationAction::Renew), (3, NotificationAction::Cancel), (13, NotificationAction::Cancel), (6, NotificationAction::Skip)] {
        let ntf = parse_play_developer_notification(&play_push(kind, "t")).unwrap();
        assert_eq!(classify_play_store(&ntf), expected, "type {kind}");
    }
}

#[test]
fn test_play_notification_when_data_not_base64_then_invalid() {
    let raw = br#"{"message":{"data":"%%%"}}"#;
    assert!(matches!(parse_play_developer_notification(raw), Err(SkusError::NotificationInvalid(_))));
}

#[test]
fn test_play_claims_when_any_field_off_then_unauthorized() {
    let cfg = PlayAuthConfig {
        audience: "aud".to_string(),
        issuer: "https://accounts.google.com".to_string(),
        service_account: PLAY_SERVICE_ACCOUNT.to_string(),
        disabled: false,
    };
    assert!(check_play_claims(&cfg, &play_claims()).is_ok());

    let mut wrong_email = play_claims();
    wrong_email.email = Some("someone@example.com".to_string());
    let mut unverified = play_claims();
    unverified.email_verified = Some(false);
    let mut wrong_issuer = play_claims();
    wrong_issuer.issuer = "accounts.example.com".to_string();
    for claims in [wrong_email, unverified, wrong_issuer] {
        assert!(matches!(check_play_claims(&cfg, &claims), Err(SkusError::NotificationUnauthorized(_))));
    }
}

#[test]
fn test_x5c_chain_when_three_certs_then_decoded_in_order() {
    let jws = signed_payload(&serde_json::json!({ "notificationType": "DID_RENEW" }), APPLE_ROOT_DER);
    let certs = x5c_chain(&jws).unwrap();
    assert_eq!(certs.len(), 3);
    assert_eq!(certs[0], APPLE_LEAF_DER);
    assert_eq!(certs[2], APPLE_ROOT_DER);
}

#[test]
fn test_x5c_chain_when_malformed_then_invalid() {
    assert!(matches!(x5c_chain("only.two"), Err(SkusError::NotificationInvalid(_))));
    let header = base64::Engine::encode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, r#"{"x5c":["AA=="]}"#);
    assert!(matches!(x5c_chain(&format!("{header}.e30.sig")), Err(SkusError::NotificationInvalid(_))));
}

#[test]
fn test_mobile_sku_when_platform_ids_then_same_variant() {
    for (android, ios, sku) in [
        ("brave.leo.monthly", "braveleo.monthly", "brave-leo-premium"),
        ("brave.leo.yearly", "braveleo.yearly", "brave-leo-premium-year"),
        ("brave.vpn.monthly", "bravevpn.monthly", "brave-vpn-premium"),
        ("brave.vpn.yearly", "bravevpn.yearly", "brave-vpn-premium-year"),
        ("brave.origin.monthly", "braveorigin.monthly", "brave-origin-premium"),
    ] {
        assert_eq!(sku_vnt_by_mobile_name(android).unwrap(), sku);
        assert_eq!(sku_vnt_by_mobile_name(ios).unwrap(), sku);
    }
    assert!(matches!(sku_vnt_by_mobile_name("bravevpn.weekly"), Err(SkusError::InvalidMobileProduct(_))));
}
