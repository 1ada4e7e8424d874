//! Storefront receipts and subscription notifications, and their effect on orders.

use crate::application::context::ReceiptContext;
use crate::application::service::{DEFAULT_NUM_PER_INTERVAL, LEO_NUM_PER_INTERVAL};
use crate::domain::order::{METADATA_EXTERNAL_ID, METADATA_NUM_INTERVALS, METADATA_NUM_PER_INTERVAL, METADATA_VENDOR};
use crate::domain::receipt::{
    bearer_token, check_play_claims, check_play_purchase, classify_app_store, classify_play_store, find_apple_purchase,
    parse_play_developer_notification, x5c_chain, AppStoreNotification, NotificationAction, PlayAuthConfig, ReceiptData,
    ReceiptRequest, Vendor,
};
use crate::domain::{mobile_order_item, sku_vnt_by_mobile_name, Order, OrderStatus};
use crate::foundation::util::time::millis_to_utc;
use crate::foundation::{OrderId, SkusError, DEFAULT_MERCHANT_ID};
use crate::infrastructure::storage::InsertResult;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::collections::BTreeMap;

pub async fn validate_apple(ctx: &ReceiptContext, request: &ReceiptRequest, now: DateTime<Utc>) -> Result<ReceiptData, SkusError> {
    let response = ctx.app_store.verify_receipt(&request.blob).await?;
    find_apple_purchase(&response, &request.subscription_id, now)
}

pub async fn validate_google(ctx: &ReceiptContext, request: &ReceiptRequest, now: DateTime<Utc>) -> Result<ReceiptData, SkusError> {
    let purchase = ctx.play_store.subscription(&request.package, &request.subscription_id, &request.blob).await?;
    check_play_purchase(&purchase, now)?;
    let expires_at = millis_to_utc(purchase.expiry_time_millis)
        .ok_or_else(|| SkusError::InvalidReceipt(format!("expiry out of range: {}", purchase.expiry_time_millis)))?;
    Ok(ReceiptData {
        vendor: Vendor::Android,
        product_id: request.subscription_id.clone(),
        ext_id: request.blob.clone(),
        expires_at,
    })
}

pub async fn validate_receipt(ctx: &ReceiptContext, request: &ReceiptRequest, now: DateTime<Utc>) -> Result<ReceiptData, SkusError> {
    match request.vendor {
        Vendor::Ios => validate_apple(ctx, request, now).await,
        Vendor::Android => validate_google(ctx, request, now).await,
    }
}

/// Marks an order paid by a validated receipt and records the vendor transaction id, so later
/// notifications can find it.
pub fn link_receipt_to_order(ctx: &ReceiptContext, order_id: &OrderId, data: &ReceiptData, now: DateTime<Utc>) -> Result<Order, SkusError> {
    let mut order = ctx.storage.get_order(order_id)?.ok_or_else(|| SkusError::OrderNotFound(order_id.to_string()))?;
    order.transition_to(OrderStatus::Paid, now)?;
    order.metadata.insert(METADATA_EXTERNAL_ID.to_string(), data.ext_id.clone());
    order.metadata.insert(METADATA_VENDOR.to_string(), data.vendor.as_str().to_string());
    order.expires_at = Some(data.expires_at);
    order.last_paid_at = Some(now);
    order.updated_at = now;
    ctx.storage.update_order(&order)?;
    info!("order linked to receipt order_id={} vendor={} expires_at={}", order.id, data.vendor, data.expires_at);
    Ok(order)
}

/// Creates a paid order for a validated receipt that no order is linked to yet.
pub async fn create_order_with_receipt(ctx: &ReceiptContext, request: &ReceiptRequest, now: DateTime<Utc>) -> Result<Order, SkusError> {
    let data = validate_receipt(ctx, request, now).await?;
    if let Some(existing) = ctx.storage.get_order_by_external_id(&data.ext_id)? {
        return Err(SkusError::OrderExistsForReceipt { order_id: existing.id.to_string() });
    }

    let sku_vnt = sku_vnt_by_mobile_name(&request.subscription_id)?;
    let (mut item, issuer_config) = mobile_order_item(sku_vnt, &ctx.config.service.environment, now)?;
    let order_id = OrderId::new_v4();
    item.order_id = order_id;
    let num_per_interval = if item.is_leo() { LEO_NUM_PER_INTERVAL } else { DEFAULT_NUM_PER_INTERVAL };

    let mut metadata = BTreeMap::new();
    metadata.insert(METADATA_EXTERNAL_ID.to_string(), data.ext_id.clone());
    metadata.insert(METADATA_VENDOR.to_string(), data.vendor.as_str().to_string());
    metadata.insert(METADATA_NUM_INTERVALS.to_string(), issuer_config.num_intervals().to_string());
    metadata.insert(METADATA_NUM_PER_INTERVAL.to_string(), num_per_interval.to_string());
    let order = Order {
        id: order_id,
        created_at: now,
        updated_at: now,
        merchant_id: DEFAULT_MERCHANT_ID.to_string(),
        location: item.location.clone(),
        currency: item.currency.clone(),
        total_price: item.subtotal,
        status: OrderStatus::Paid,
        valid_for: item.valid_for,
        items: vec![item],
        last_paid_at: Some(now),
        expires_at: Some(data.expires_at),
        allowed_payment_methods: Vec::new(),
        metadata,
        trial_days: None,
    };
    if ctx.storage.insert_order(&order)? == InsertResult::Conflict {
        return Err(SkusError::StorageError { operation: "insert_order".to_string(), details: format!("order {order_id} already exists") });
    }
    info!("order created from receipt order_id={} vendor={} sku={}", order.id, data.vendor, sku_vnt);
    Ok(order)
}

/// Checks that the order linked to `external_id` is `order_id`.
pub fn check_order_receipt(ctx: &ReceiptContext, order_id: &OrderId, external_id: &str) -> Result<(), SkusError> {
    let order = ctx
        .storage
        .get_order_by_external_id(external_id)?
        .ok_or_else(|| SkusError::OrderNotFound(format!("external_id={external_id}")))?;
    if order.id != *order_id {
        return Err(SkusError::NoMatchOrderReceipt);
    }
    Ok(())
}

/// Verifies and applies an App Store server notification.
pub async fn process_app_store_notification(
    ctx: &ReceiptContext,
    signed_payload: &str,
    now: DateTime<Utc>,
) -> Result<NotificationAction, SkusError> {
    let certs = x5c_chain(signed_payload)?;
    ctx.cert_verifier.verify_chain(&certs, &ctx.config.receipts.apple_root_fingerprint)?;
    let leaf = certs.first().ok_or_else(|| SkusError::NotificationInvalid("missing leaf certificate".to_string()))?;
    let payload = ctx.cert_verifier.verify_signature(signed_payload, leaf)?;
    let ntf: AppStoreNotification = serde_json::from_slice(&payload).map_err(|err| SkusError::NotificationInvalid(err.to_string()))?;

    let action = classify_app_store(&ntf);
    debug!(
        "app store notification type={} subtype={:?} action={:?}",
        ntf.notification_type, ntf.subtype, action
    );
    let expires_at = ntf.expires_date.and_then(millis_to_utc);
    apply_notification(ctx, &ntf.original_transaction_id, action, expires_at, now)?;
    Ok(action)
}

fn play_auth_config(ctx: &ReceiptContext) -> PlayAuthConfig {
    let receipts = &ctx.config.receipts;
    PlayAuthConfig {
        audience: receipts.play_audience.clone(),
        issuer: receipts.play_issuer.clone(),
        service_account: receipts.play_service_account.clone(),
        disabled: receipts.disable_play_auth,
    }
}

/// Checks the `Authorization` header of a Play push request.
pub async fn authenticate_play_notification(ctx: &ReceiptContext, authorization: &str) -> Result<(), SkusError> {
    let cfg = play_auth_config(ctx);
    if cfg.disabled {
        return Ok(());
    }
    let token = bearer_token(authorization)?;
    let claims = ctx.id_token_validator.validate(token, &cfg.audience).await?;
    check_play_claims(&cfg, &claims)
}

/// Authorizes, decodes and applies a Play real-time developer notification. Renewals re-read
/// the subscription to pick up the new expiry.
pub async fn process_play_store_notification(
    ctx: &ReceiptContext,
    authorization: &str,
    raw: &[u8],
    now: DateTime<Utc>,
) -> Result<NotificationAction, SkusError> {
    authenticate_play_notification(ctx, authorization).await?;
    let ntf = parse_play_developer_notification(raw)?;
    let action = classify_play_store(&ntf);
    let Some(sub) = &ntf.subscription_notification else {
        debug!("play notification without subscription payload package={}", ntf.package_name);
        return Ok(action);
    };
    debug!("play notification type={} subscription_id={} action={:?}", sub.notification_type, sub.subscription_id, action);

    let expires_at = match action {
        NotificationAction::Renew => {
            let purchase = ctx.play_store.subscription(&ntf.package_name, &sub.subscription_id, &sub.purchase_token).await?;
            millis_to_utc(purchase.expiry_time_millis)
        }
        NotificationAction::Cancel | NotificationAction::Skip => None,
    };
    apply_notification(ctx, &sub.purchase_token, action, expires_at, now)?;
    Ok(action)
}

fn apply_notification(
    ctx: &ReceiptContext,
    external_id: &str,
    action: NotificationAction,
    expires_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<(), SkusError> {
    if action == NotificationAction::Skip {
        return Ok(());
    }
    let Some(mut order) = ctx.storage.get_order_by_external_id(external_id)? else {
        warn!("notification for unknown external id external_id={}", external_id);
        return Err(SkusError::OrderNotFound(format!("external_id={external_id}")));
    };
    match action {
        NotificationAction::Renew => {
            order.transition_to(OrderStatus::Paid, now)?;
            if expires_at.is_some() {
                order.expires_at = expires_at;
            }
            order.last_paid_at = Some(now);
        }
        NotificationAction::Cancel => order.transition_to(OrderStatus::Canceled, now)?,
        NotificationAction::Skip => return Ok(()),
    }
    order.updated_at = now;
    ctx.storage.update_order(&order)?;
    info!("order updated from notification order_id={} action={:?} status={}", order.id, action, order.status);
    Ok(())
}
