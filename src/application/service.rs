//! Order, issuer and credential orchestration on top of storage, the credential issuer and the bus.

use crate::application::context::SkusContext;
use crate::domain::order::{
    encode_issuer_id, ensure_equal_payment_methods, OrderItemRequest, METADATA_NUM_INTERVALS, METADATA_NUM_PER_INTERVAL,
};
use crate::domain::time_limited::time_chunking;
use crate::domain::{
    CredentialKind, CredentialRedemption, CredentialType, CredentialVerification, CredentialsOutcome, Issuer, IssuerConfig,
    Metadata, Order, OrderCreds, OrderItem, OrderStatus, SigningRequestOutbox, TimeLimitedCreds, TimeLimitedPresentation,
    VerifyCredentialRequest,
};
use crate::foundation::util::encoding::decode_base64;
use crate::foundation::{
    IsoDuration, IssuerId, ItemId, OrderId, RequestId, SkusError, DEFAULT_COHORT, DEFAULT_MAX_TOKENS_PER_ISSUER,
    ISSUER_CONFLICT_STATUS, MAX_TLV2_ACTIVE_BATCHES, REDEMPTION_BAD_REQUEST_STATUS, REDEMPTION_DUPLICATE_STATUS,
};
use crate::infrastructure::codec::{SigningOrder, SigningOrderRequest};
use crate::infrastructure::rpc::retry::is_retriable_issuer_status;
use crate::infrastructure::rpc::{retry_with_policy, IssuerRequest, IssuerResponse};
use crate::infrastructure::storage::InsertResult;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use log::{debug, info, warn};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::str::FromStr;

pub use crate::domain::sku_vnt_by_mobile_name;

/// Credentials submitted per interval for a time-limited-v2 order.
pub(crate) const DEFAULT_NUM_PER_INTERVAL: i32 = 2;
/// Leo issues far more credentials per day than the other products.
pub(crate) const LEO_NUM_PER_INTERVAL: i32 = 192;

/// Whitelisted raw tokens are accepted as-is; anything else must be minted by a key trusted in the
/// configured environment.
pub fn validate_hardcoded_sku(ctx: &SkusContext, raw: &str) -> Result<bool, SkusError> {
    if is_whitelisted(ctx, raw) {
        return Ok(true);
    }
    ctx.auth.is_trusted(&ctx.config.service.environment, raw)
}

fn is_whitelisted(ctx: &SkusContext, raw: &str) -> bool {
    ctx.config.service.whitelisted_skus.iter().any(|sku| sku == raw)
}

/// Builds an order item from the caveats of a SKU authorization token.
///
/// Returns the item (not yet attached to an order), the payment methods it allows and the
/// issuer rotation window for time-limited-v2 SKUs.
pub fn create_order_item_from_macaroon(
    ctx: &SkusContext,
    token: &str,
    quantity: u32,
    now: DateTime<Utc>,
) -> Result<(OrderItem, Vec<String>, IssuerConfig), SkusError> {
    if !validate_hardcoded_sku(ctx, token)? {
        warn!("order item rejected, sku token is not trusted environment={}", ctx.config.service.environment);
        return Err(SkusError::InvalidSku);
    }
    let claims = ctx.auth.decode(token)?;

    let mut sku = String::new();
    let mut price = Decimal::ZERO;
    let mut description = None;
    let mut currency = String::new();
    let mut credential_type = None;
    let mut issuance_interval_iso = None;
    let mut valid_for = None;
    let mut valid_for_iso = None;
    let mut each_credential_valid_for_iso = None;
    let mut issuer_config = IssuerConfig::default();
    let mut allowed_payment_methods = Vec::new();
    let mut metadata = BTreeMap::new();

    for (key, value) in &claims.caveats {
        let value = value.trim();
        match key.trim() {
            "sku" => sku = value.to_string(),
            "price" | "amount" => {
                price = Decimal::from_str(value).map_err(|err| SkusError::Message(format!("invalid price '{value}': {err}")))?
            }
            "description" => description = Some(value.to_string()),
            "currency" => currency = value.to_string(),
            "credential_type" => credential_type = Some(value.parse::<CredentialType>()?),
            "issuance_interval" => issuance_interval_iso = Some(IsoDuration::parse(value)?),
            "credential_valid_duration" => {
                let duration = IsoDuration::parse(value)?;
                valid_for = Some(duration_from(&duration, now)?);
                valid_for_iso = Some(duration);
            }
            "each_credential_valid_duration" => each_credential_valid_for_iso = Some(IsoDuration::parse(value)?),
            "issuer_token_buffer" => issuer_config.buffer = parse_caveat_int(key, value)?,
            "issuer_token_overlap" => issuer_config.overlap = parse_caveat_int(key, value)?,
            "allowed_payment_methods" => allowed_payment_methods = value.split(',').map(|m| m.trim().to_string()).collect(),
            "metadata" => metadata = parse_caveat_metadata(value)?,
            other => debug!("ignoring sku caveat key={}", other),
        }
    }

    let credential_type = credential_type.ok_or_else(|| SkusError::InvalidCredentialType("missing credential_type caveat".to_string()))?;
    let item = OrderItem {
        id: ItemId::new_v4(),
        order_id: OrderId::default(),
        sku_variant: sku.clone(),
        sku,
        created_at: now,
        updated_at: now,
        currency,
        quantity,
        subtotal: OrderItem::compute_subtotal(price, quantity),
        price,
        location: Some(claims.location),
        description,
        credential_type,
        valid_for,
        valid_for_iso,
        each_credential_valid_for_iso,
        issuance_interval_iso,
        issuer_config,
        metadata,
    };
    debug!("order item built from sku token sku={} credential_type={} subtotal={}", item.sku, item.credential_type, item.subtotal);
    Ok((item, allowed_payment_methods, issuer_config))
}

fn duration_from(duration: &IsoDuration, now: DateTime<Utc>) -> Result<std::time::Duration, SkusError> {
    duration.length_from(now).and_then(|length| length.to_std().ok()).ok_or_else(|| SkusError::InvalidDuration {
        value: duration.to_string(),
        details: "duration is out of range".to_string(),
    })
}

fn parse_caveat_int(key: &str, value: &str) -> Result<i32, SkusError> {
    value.parse::<i32>().map_err(|err| SkusError::Message(format!("invalid {key} caveat '{value}': {err}")))
}

/// Metadata caveats are JSON objects; non-string values keep their JSON text.
fn parse_caveat_metadata(value: &str) -> Result<BTreeMap<String, String>, SkusError> {
    let raw: BTreeMap<String, serde_json::Value> = serde_json::from_str(value)?;
    Ok(raw
        .into_iter()
        .map(|(key, value)| match value {
            serde_json::Value::String(s) => (key, s),
            other => (key, other.to_string()),
        })
        .collect())
}

/// Creates an order from SKU tokens, provisioning the issuer of each item on the way.
///
/// All items must share location, currency and allowed payment methods. A zero-total order made
/// only of whitelisted SKUs is created paid.
pub async fn create_order(
    ctx: &SkusContext,
    merchant_id: &str,
    requests: &[OrderItemRequest],
    now: DateTime<Utc>,
) -> Result<Order, SkusError> {
    if requests.is_empty() {
        return Err(SkusError::Message("order requires at least one item".to_string()));
    }

    let order_id = OrderId::new_v4();
    let mut items = Vec::with_capacity(requests.len());
    let mut allowed_payment_methods: Option<Vec<String>> = None;
    let mut location: Option<String> = None;
    let mut currency: Option<String> = None;
    let mut valid_for = None;
    let mut num_intervals = 0;
    let mut num_per_interval = DEFAULT_NUM_PER_INTERVAL;
    let mut all_whitelisted = true;

    for request in requests {
        let (mut item, methods, issuer_config) = create_order_item_from_macaroon(ctx, &request.sku, request.quantity, now)?;
        all_whitelisted &= is_whitelisted(ctx, &request.sku);
        if item.is_leo() {
            num_per_interval = LEO_NUM_PER_INTERVAL;
        }

        match item.credential_type {
            CredentialType::SingleUse => {
                create_issuer(ctx, merchant_id, &item, now).await?;
            }
            CredentialType::TimeLimitedV2 => {
                create_issuer_v3(ctx, merchant_id, &item, issuer_config, now).await?;
                num_intervals = issuer_config.num_intervals();
            }
            CredentialType::TimeLimited => {}
        }

        match &allowed_payment_methods {
            Some(existing) => ensure_equal_payment_methods(existing, &methods)?,
            None => allowed_payment_methods = Some(methods),
        }
        match (&location, &item.location) {
            (None, _) => location = item.location.clone(),
            (Some(existing), Some(incoming)) if existing == incoming => {}
            _ => return Err(SkusError::MixedOrderItems { field: "location".to_string() }),
        }
        match &currency {
            None => currency = Some(item.currency.clone()),
            Some(existing) if *existing == item.currency => {}
            Some(_) => return Err(SkusError::MixedOrderItems { field: "currency".to_string() }),
        }
        if item.valid_for.is_some() {
            valid_for = item.valid_for;
        }

        item.order_id = order_id;
        items.push(item);
    }

    let total_price = items.iter().map(|item| item.subtotal).sum::<Decimal>().normalize();
    let mut order = Order {
        id: order_id,
        created_at: now,
        updated_at: now,
        merchant_id: merchant_id.to_string(),
        location,
        currency: currency.unwrap_or_default(),
        total_price,
        status: OrderStatus::Pending,
        items,
        last_paid_at: None,
        expires_at: None,
        valid_for,
        allowed_payment_methods: allowed_payment_methods.unwrap_or_default(),
        metadata: BTreeMap::new(),
        trial_days: None,
    };
    if num_intervals > 0 {
        order.metadata.insert(METADATA_NUM_INTERVALS.to_string(), num_intervals.to_string());
        order.metadata.insert(METADATA_NUM_PER_INTERVAL.to_string(), num_per_interval.to_string());
    }
    if order.total_price.is_zero() && all_whitelisted {
        order.transition_to(OrderStatus::Paid, now)?;
        order.last_paid_at = Some(now);
        order.expires_at = valid_for.and_then(|valid_for| chrono::Duration::from_std(valid_for).ok()).map(|valid_for| now + valid_for);
    }

    if ctx.storage.insert_order(&order)? == InsertResult::Conflict {
        return Err(SkusError::StorageError { operation: "insert_order".to_string(), details: format!("order {order_id} already exists") });
    }
    info!("order created order_id={} status={} total={} items={}", order.id, order.status, order.total_price, order.items.len());
    Ok(order)
}

async fn issuer_retry<F, Fut, T>(ctx: &SkusContext, op: F) -> Result<T, SkusError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SkusError>>,
{
    let non_retriable = ctx.config.issuer.non_retriable_statuses.clone();
    retry_with_policy(ctx.config.issuer.retry_attempts, ctx.issuer_retry_delay(), move |err| is_retriable_issuer_status(err, &non_retriable), op)
        .await
}

/// The signer answers 409 when the issuer already exists.
fn allow_conflict(issuer_id: &str, result: Result<(), SkusError>) -> Result<(), SkusError> {
    match result {
        Err(err) if err.http_status() == Some(ISSUER_CONFLICT_STATUS) => {
            debug!("issuer already exists at signer issuer_id={}", issuer_id);
            Ok(())
        }
        other => other,
    }
}

fn store_issuer(ctx: &SkusContext, response: IssuerResponse, now: DateTime<Utc>) -> Result<Issuer, SkusError> {
    let id = response
        .id
        .parse::<IssuerId>()
        .map_err(|err| SkusError::issuer_rpc("get_issuer", None, format!("invalid issuer id {}: {}", response.id, err)))?;
    let issuer = Issuer {
        id,
        created_at: now,
        merchant_id: response.name,
        public_key: response.public_key,
    };
    match ctx.storage.insert_issuer_if_not_exists(&issuer)? {
        InsertResult::Inserted => {
            info!("issuer stored issuer_id={} public_key={}", issuer.merchant_id, issuer.public_key);
            Ok(issuer)
        }
        InsertResult::Conflict => {
            ctx.storage.get_issuer(&issuer.merchant_id)?.ok_or_else(|| SkusError::IssuerNotFound(issuer.merchant_id.clone()))
        }
    }
}

/// Provisions the single-use issuer for `(merchant, item.sku)` unless it is already stored.
pub async fn create_issuer(ctx: &SkusContext, merchant_id: &str, item: &OrderItem, now: DateTime<Utc>) -> Result<Issuer, SkusError> {
    let issuer_id = encode_issuer_id(merchant_id, item.sku_for_issuer())?;
    if let Some(issuer) = ctx.storage.get_issuer(&issuer_id)? {
        return Ok(issuer);
    }

    info!("creating new issuer issuer_id={}", issuer_id);
    let created = issuer_retry(ctx, || ctx.issuer.create_issuer(&issuer_id, DEFAULT_MAX_TOKENS_PER_ISSUER)).await;
    allow_conflict(&issuer_id, created)?;
    let response = issuer_retry(ctx, || ctx.issuer.get_issuer(&issuer_id)).await?;
    store_issuer(ctx, response, now)
}

/// Provisions the time-limited-v2 issuer for `(merchant, item.sku)` unless it is already stored.
pub async fn create_issuer_v3(
    ctx: &SkusContext,
    merchant_id: &str,
    item: &OrderItem,
    issuer_config: IssuerConfig,
    now: DateTime<Utc>,
) -> Result<Issuer, SkusError> {
    let issuer_id = encode_issuer_id(merchant_id, item.sku_for_issuer())?;
    if let Some(issuer) = ctx.storage.get_issuer(&issuer_id)? {
        return Ok(issuer);
    }

    let Some(valid_for_iso) = item.valid_for_iso else {
        return Err(SkusError::InvalidDuration {
            value: String::new(),
            details: format!("valid for iso is empty for order item sku {}", item.sku),
        });
    };
    info!("creating new v3 issuer issuer_id={}", issuer_id);
    let request = IssuerRequest {
        name: issuer_id.clone(),
        cohort: DEFAULT_COHORT,
        max_tokens: DEFAULT_MAX_TOKENS_PER_ISSUER,
        valid_from: Some(now),
        duration: valid_for_iso.to_string(),
        buffer: issuer_config.buffer,
        overlap: issuer_config.overlap,
    };
    let created = issuer_retry(ctx, || ctx.issuer.create_issuer_v3(&request)).await;
    allow_conflict(&issuer_id, created)?;
    let response = issuer_retry(ctx, || ctx.issuer.get_issuer_v2(&request.name, request.cohort)).await?;
    store_issuer(ctx, response, now)
}

fn load_order(ctx: &SkusContext, order_id: &OrderId) -> Result<Order, SkusError> {
    ctx.storage.get_order(order_id)?.ok_or_else(|| SkusError::OrderNotFound(order_id.to_string()))
}

fn find_item<'a>(order: &'a Order, item_id: &ItemId) -> Result<&'a OrderItem, SkusError> {
    order.has_item(item_id).ok_or_else(|| SkusError::OrderItemNotFound(item_id.to_string()))
}

/// Submits blinded tokens of a paid order item for signing.
///
/// The request is recorded in the signing outbox before it is published on the unsigned topic;
/// a request id that was already recorded is not published again.
pub async fn create_order_credentials(
    ctx: &SkusContext,
    order_id: &OrderId,
    item_id: &ItemId,
    blinded: Vec<String>,
    request_id: RequestId,
    now: DateTime<Utc>,
) -> Result<(), SkusError> {
    let order = load_order(ctx, order_id)?;
    if !order.is_paid(now) {
        return Err(SkusError::OrderUnpaid { order_id: order_id.to_string() });
    }
    let item = find_item(&order, item_id)?;
    if item.credential_type == CredentialType::TimeLimited {
        return Err(SkusError::InvalidCredentialType(format!("{} credentials are derived, not signed", item.credential_type)));
    }
    let issuer_id = encode_issuer_id(&order.merchant_id, item.sku_for_issuer())?;
    let issuer = ctx.storage.get_issuer(&issuer_id)?.ok_or_else(|| SkusError::IssuerNotFound(issuer_id.clone()))?;

    if item.credential_type == CredentialType::TimeLimitedV2 && ctx.storage.get_signing_request_outbox(&request_id)?.is_none() {
        let active = active_batches(ctx, order_id, item_id, now)?;
        if active >= MAX_TLV2_ACTIVE_BATCHES {
            warn!("too many active batches order_id={} item_id={} active={}", order_id, item_id, active);
            return Err(SkusError::Tlv2BatchLimitReached { active, limit: MAX_TLV2_ACTIVE_BATCHES });
        }
    }

    if item.credential_type == CredentialType::SingleUse {
        let creds = OrderCreds {
            item_id: *item_id,
            order_id: *order_id,
            issuer_id: issuer.id,
            blinded_creds: blinded.clone(),
            signed_creds: None,
            batch_proof: None,
            public_key: None,
        };
        if ctx.storage.insert_order_creds(&creds)? == InsertResult::Conflict {
            debug!("order creds already recorded order_id={} item_id={}", order_id, item_id);
        }
    }

    let metadata = Metadata {
        item_id: *item_id,
        order_id: *order_id,
        issuer_id: issuer.id,
        credential_type: item.credential_type.as_str().to_string(),
    };
    let request = SigningOrderRequest {
        request_id: request_id.clone(),
        data: vec![SigningOrder {
            associated_data: metadata.to_json_bytes()?,
            blinded_tokens: blinded,
            issuer_type: issuer.name().to_string(),
            issuer_cohort: i32::from(DEFAULT_COHORT),
        }],
    };
    let message = request.encode();
    let outbox = SigningRequestOutbox {
        request_id,
        order_id: *order_id,
        item_id: *item_id,
        created_at: now,
        completed_at: None,
        message: message.clone(),
    };
    if !ctx.storage.insert_signing_request_outbox(&outbox)?.is_inserted() {
        info!("signing request already submitted request_id={}", outbox.request_id);
        return Ok(());
    }

    ctx.bus.publish(&ctx.config.bus.unsigned_order_creds_topic, outbox.request_id.as_bytes(), &message).await?;
    info!(
        "signing request published request_id={} order_id={} item_id={} tokens={}",
        outbox.request_id,
        order_id,
        item_id,
        request.data.first().map(|order| order.blinded_tokens.len()).unwrap_or_default()
    );
    Ok(())
}

/// Credentials of a single-item order. The item id doubles as the signing request id.
pub fn get_credentials(ctx: &SkusContext, order_id: &OrderId, now: DateTime<Utc>) -> Result<CredentialsOutcome, SkusError> {
    let order = load_order(ctx, order_id)?;
    let [item] = order.items.as_slice() else {
        return Err(SkusError::Message(format!("order {} must have exactly one item, has {}", order.id, order.items.len())));
    };
    let request_id = RequestId::new(item.id.to_string());
    get_item_credentials(ctx, &order, &item.id, &request_id, now)
}

pub fn get_item_credentials(
    ctx: &SkusContext,
    order: &Order,
    item_id: &ItemId,
    request_id: &RequestId,
    now: DateTime<Utc>,
) -> Result<CredentialsOutcome, SkusError> {
    let item = find_item(order, item_id)?;
    match item.credential_type {
        CredentialType::SingleUse => single_use_credentials(ctx, order, item, request_id),
        CredentialType::TimeLimitedV2 => time_limited_v2_credentials(ctx, order, item, request_id),
        CredentialType::TimeLimited => {
            Ok(CredentialsOutcome::Ready(CredentialKind::TimeLimited(get_time_limited_creds(ctx, order, item_id, now)?)))
        }
    }
}

fn single_use_credentials(
    ctx: &SkusContext,
    order: &Order,
    item: &OrderItem,
    request_id: &RequestId,
) -> Result<CredentialsOutcome, SkusError> {
    if let Some(creds) = ctx.storage.get_order_creds(&order.id, &item.id)? {
        if creds.is_signed() {
            return Ok(CredentialsOutcome::Ready(CredentialKind::SingleUse(creds)));
        }
        return Ok(CredentialsOutcome::Accepted);
    }
    match ctx.storage.get_signing_request_outbox(request_id)? {
        Some(outbox) if !outbox.is_completed() => Ok(CredentialsOutcome::Accepted),
        _ => Err(SkusError::CredentialsNotFound(format!("order_id={} item_id={}", order.id, item.id))),
    }
}

fn time_limited_v2_credentials(
    ctx: &SkusContext,
    order: &Order,
    item: &OrderItem,
    request_id: &RequestId,
) -> Result<CredentialsOutcome, SkusError> {
    let outbox = ctx
        .storage
        .get_signing_request_outbox(request_id)?
        .ok_or_else(|| SkusError::CredentialsNotFound(format!("signing request {request_id}")))?;
    if outbox.order_id != order.id {
        return Err(SkusError::CredentialsNotFound(format!("signing request {request_id} does not belong to order {}", order.id)));
    }
    if !outbox.is_completed() {
        return Ok(CredentialsOutcome::Accepted);
    }
    let creds = ctx.storage.list_time_limited_v2_creds(&order.id, &item.id)?;
    debug!("time limited v2 credentials order_id={} item_id={} buckets={}", order.id, item.id, creds.len());
    Ok(CredentialsOutcome::Ready(CredentialKind::TimeLimitedV2(creds)))
}

/// Derives the time-limited (v1) credentials of a paid, unexpired order item.
pub fn get_time_limited_creds(
    ctx: &SkusContext,
    order: &Order,
    item_id: &ItemId,
    now: DateTime<Utc>,
) -> Result<Vec<TimeLimitedCreds>, SkusError> {
    let last_paid_at = match order.last_paid_at {
        Some(last_paid_at) if order.is_paid(now) => last_paid_at,
        _ => return Err(SkusError::OrderUnpaid { order_id: order.id.to_string() }),
    };
    if order.expires_at.is_some_and(|expires_at| now > expires_at) {
        return Err(SkusError::OrderExpired { order_id: order.id.to_string() });
    }
    let item = find_item(order, item_id)?;
    let Some(duration) = item.valid_for_iso else {
        return Err(SkusError::InvalidDuration {
            value: String::new(),
            details: format!("order item {} has no valid duration", item.id),
        });
    };
    let interval = item.issuance_interval();
    let issuer_id = encode_issuer_id(&order.merchant_id, item.sku_for_issuer())?;

    let creds = time_chunking(&issuer_id, &ctx.time_limited_secret, order.id, item.id, last_paid_at, &duration, &interval, now)?;
    if creds.is_empty() {
        return Err(SkusError::CredentialsNotFound(format!("no time limited credentials for order_id={} item_id={}", order.id, item.id)));
    }
    Ok(creds)
}

/// Cancels an order. Orders paid in an app store are only marked canceled here; the store owns
/// the subscription.
pub fn cancel_order(ctx: &SkusContext, order_id: &OrderId, now: DateTime<Utc>) -> Result<Order, SkusError> {
    let mut order = load_order(ctx, order_id)?;
    order.transition_to(OrderStatus::Canceled, now)?;
    ctx.storage.update_order(&order)?;
    info!("order canceled order_id={} mobile={}", order.id, order.is_mobile());
    Ok(order)
}

/// Records the trial days of an order. Whether a checkout session must be recreated for them is
/// reported by `Order::should_set_trial_days`.
pub fn set_order_trial_days(ctx: &SkusContext, order_id: &OrderId, days: i64, now: DateTime<Utc>) -> Result<Order, SkusError> {
    if days < 0 {
        return Err(SkusError::Message(format!("trial days must not be negative: {days}")));
    }
    let mut order = load_order(ctx, order_id)?;
    order.trial_days = Some(days);
    order.updated_at = now;
    ctx.storage.update_order(&order)?;
    debug!("order trial days set order_id={} days={} checkout_refresh={}", order.id, days, order.should_set_trial_days(now));
    Ok(order)
}

/// Returns the limit and the current number of signing requests whose time-limited-v2
/// credentials are active at `now`. Without `item_id` the first item is used.
pub fn uniq_batches(ctx: &SkusContext, order_id: &OrderId, item_id: Option<&ItemId>, now: DateTime<Utc>) -> Result<(usize, usize), SkusError> {
    let order = load_order(ctx, order_id)?;
    if !order.is_paid(now) {
        return Err(SkusError::OrderUnpaid { order_id: order_id.to_string() });
    }
    let item = match item_id {
        Some(item_id) => find_item(&order, item_id)?,
        None => order.items.first().ok_or_else(|| SkusError::Message(format!("order {} has no items", order.id)))?,
    };
    if item.credential_type != CredentialType::TimeLimitedV2 {
        return Err(SkusError::InvalidCredentialType(format!("{} credentials are not batched", item.credential_type)));
    }
    Ok((MAX_TLV2_ACTIVE_BATCHES, active_batches(ctx, &order.id, &item.id, now)?))
}

fn active_batches(ctx: &SkusContext, order_id: &OrderId, item_id: &ItemId, now: DateTime<Utc>) -> Result<usize, SkusError> {
    let creds = ctx.storage.list_time_limited_v2_creds(order_id, item_id)?;
    let active: HashSet<&RequestId> =
        creds.iter().filter(|creds| creds.valid_from <= now && now < creds.valid_to).map(|creds| &creds.request_id).collect();
    Ok(active.len())
}

/// Verifies a credential presented by `merchant`, whose authorization may pin a `sku` caveat.
pub async fn verify_credential(
    ctx: &SkusContext,
    merchant: &str,
    caveats: &BTreeMap<String, String>,
    request: &VerifyCredentialRequest,
    now: DateTime<Utc>,
) -> Result<CredentialVerification, SkusError> {
    if request.merchant_id != merchant {
        warn!("verify request merchant mismatch merchant={} request_merchant={}", merchant, request.merchant_id);
        return Err(SkusError::CredentialsNotVerified("request merchant does not match authentication".to_string()));
    }
    if let Some(sku) = caveats.get("sku") {
        if *sku != request.sku {
            warn!("verify request sku caveat mismatch sku={} request_sku={}", sku, request.sku);
            return Err(SkusError::CredentialsNotVerified("request sku does not match authentication".to_string()));
        }
    }
    match request.kind.parse::<CredentialType>()? {
        kind @ (CredentialType::SingleUse | CredentialType::TimeLimitedV2) => verify_blinded_token_credential(ctx, kind, request).await,
        CredentialType::TimeLimited => verify_time_limited_credential(ctx, request, now),
    }
}

async fn verify_blinded_token_credential(
    ctx: &SkusContext,
    kind: CredentialType,
    request: &VerifyCredentialRequest,
) -> Result<CredentialVerification, SkusError> {
    let bytes = decode_base64(&request.presentation).map_err(|err| SkusError::InvalidPresentation(err.to_string()))?;
    let redemption: CredentialRedemption = serde_json::from_slice(&bytes).map_err(|err| SkusError::InvalidPresentation(err.to_string()))?;
    let issuer_id = encode_issuer_id(&request.merchant_id, &request.sku)?;
    if issuer_id != redemption.issuer {
        return Err(SkusError::InvalidPresentation("outer merchant and sku don't match issuer".to_string()));
    }

    let (issuer, preimage, signature) = (&redemption.issuer, &redemption.token_preimage, &redemption.signature);
    let redeemed = match kind {
        CredentialType::TimeLimitedV2 => ctx.issuer.redeem_credential_v3(issuer, preimage, signature, issuer).await,
        _ => ctx.issuer.redeem_credential(issuer, preimage, signature, issuer).await,
    };
    match redeemed {
        Ok(()) if kind == CredentialType::TimeLimitedV2 => Ok(CredentialVerification::Redeemed { id: preimage.clone(), duplicate: false }),
        Ok(()) => Ok(CredentialVerification::Verified),
        Err(err) => match err.http_status() {
            Some(REDEMPTION_DUPLICATE_STATUS) if kind == CredentialType::TimeLimitedV2 => {
                debug!("duplicate time limited v2 redemption issuer={}", issuer);
                Ok(CredentialVerification::Redeemed { id: preimage.clone(), duplicate: true })
            }
            Some(REDEMPTION_DUPLICATE_STATUS | REDEMPTION_BAD_REQUEST_STATUS) => {
                Err(SkusError::CredentialsNotVerified(format!("invalid credentials: {err}")))
            }
            _ => Err(err),
        },
    }
}

fn verify_time_limited_credential(
    ctx: &SkusContext,
    request: &VerifyCredentialRequest,
    now: DateTime<Utc>,
) -> Result<CredentialVerification, SkusError> {
    let bytes = decode_base64(&request.presentation).map_err(|err| SkusError::InvalidPresentation(err.to_string()))?;
    let presentation: TimeLimitedPresentation =
        serde_json::from_slice(&bytes).map_err(|err| SkusError::InvalidPresentation(err.to_string()))?;
    let issuer_id = encode_issuer_id(&request.merchant_id, &request.sku)?;
    let issued_at = parse_presentation_date("issuedAt", &presentation.issued_at)?;
    let expires_at = parse_presentation_date("expiresAt", &presentation.expires_at)?;

    if ctx.time_limited_secret.derive(&issuer_id, issued_at, expires_at) != presentation.token {
        return Err(SkusError::CredentialsNotVerified("credentials could not be verified".to_string()));
    }
    if now > expires_at || now < issued_at {
        return Err(SkusError::CredentialsNotVerified("credentials are not valid".to_string()));
    }
    Ok(CredentialVerification::Verified)
}

fn parse_presentation_date(field: &str, value: &str) -> Result<DateTime<Utc>, SkusError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map(|date| date.and_time(NaiveTime::MIN).and_utc())
        .map_err(|err| SkusError::InvalidPresentation(format!("{field} '{value}': {err}")))
}
