//! Consumer of signing results: persists signed credentials and closes the matching outbox entry.
//!
//! Several consumers may process the same result concurrently. Storage uniqueness keys decide
//! which write lands; the losers see `InsertResult::Conflict` and move on.

use crate::application::context::SkusContext;
use crate::domain::{CredentialType, Metadata, OrderCreds, TimeAwareSubIssuedCreds};
use crate::foundation::{now_utc, ItemId, OrderId, RequestId, SkusError};
use crate::infrastructure::bus::BusMessage;
use crate::infrastructure::codec::{SignedOrder, SignedOrderStatus, SigningOrderResult};
use crate::infrastructure::storage::InsertResult;
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use std::time::Duration;
use tokio::sync::watch;

/// Handles one message from the signed topic.
///
/// Undecodable messages are dead-lettered and reported as handled. Every entry is decoded before
/// anything is stored, so a message with one malformed entry is dead-lettered as a whole. Results
/// with a non-ok status are skipped. Storage failures are returned so the caller can dead-letter
/// and back off.
pub async fn handle_signed_order_credentials(ctx: &SkusContext, message: &BusMessage, now: DateTime<Utc>) -> Result<(), SkusError> {
    let result = match SigningOrderResult::decode(&message.value) {
        Ok(result) => result,
        Err(err) => {
            warn!("undecodable signing result offset={} error={}", message.offset, err);
            forward_to_dlq(ctx, message, &err).await;
            return Ok(());
        }
    };

    debug!("signing result received request_id={} orders={}", result.request_id, result.data.len());
    let prepared = match prepare_signed_orders(&result.request_id, &result.data) {
        Ok(prepared) => prepared,
        Err(err) => {
            warn!("malformed signed order request_id={} offset={} error={}", result.request_id, message.offset, err);
            forward_to_dlq(ctx, message, &err).await;
            return Ok(());
        }
    };

    for creds in &prepared {
        store_signed_creds(ctx, &result.request_id, creds)?;
    }

    if ctx.storage.complete_signing_request_outbox(&result.request_id, now)? {
        info!("signing request completed request_id={}", result.request_id);
    }
    Ok(())
}

enum SignedCreds {
    SingleUse(OrderCreds),
    TimeLimitedV2(TimeAwareSubIssuedCreds),
}

impl SignedCreds {
    fn metadata(&self) -> (OrderId, ItemId) {
        match self {
            SignedCreds::SingleUse(creds) => (creds.order_id, creds.item_id),
            SignedCreds::TimeLimitedV2(creds) => (creds.order_id, creds.item_id),
        }
    }
}

fn prepare_signed_orders(request_id: &RequestId, orders: &[SignedOrder]) -> Result<Vec<SignedCreds>, SkusError> {
    let mut prepared = Vec::with_capacity(orders.len());
    for order in orders {
        if order.status != SignedOrderStatus::Ok {
            warn!("signing result not ok request_id={} status={}", request_id, order.status.as_str());
            continue;
        }
        let metadata = order.metadata()?;
        if let Some(creds) = prepare_signed_order(request_id, order, &metadata)? {
            prepared.push(creds);
        }
    }
    Ok(prepared)
}

fn prepare_signed_order(request_id: &RequestId, order: &SignedOrder, metadata: &Metadata) -> Result<Option<SignedCreds>, SkusError> {
    match metadata.credential_type()? {
        CredentialType::SingleUse => Ok(Some(SignedCreds::SingleUse(OrderCreds {
            item_id: metadata.item_id,
            order_id: metadata.order_id,
            issuer_id: metadata.issuer_id,
            blinded_creds: order.blinded_tokens.clone(),
            signed_creds: Some(order.signed_tokens.clone()),
            batch_proof: Some(order.proof.clone()),
            public_key: Some(order.public_key.clone()),
        }))),
        CredentialType::TimeLimitedV2 => {
            let (valid_from, valid_to) = order.validity()?;
            Ok(Some(SignedCreds::TimeLimitedV2(TimeAwareSubIssuedCreds {
                order_id: metadata.order_id,
                item_id: metadata.item_id,
                issuer_id: metadata.issuer_id,
                valid_from,
                valid_to,
                blinded_creds: order.blinded_tokens.clone(),
                signed_creds: order.signed_tokens.clone(),
                batch_proof: order.proof.clone(),
                public_key: order.public_key.clone(),
                request_id: request_id.clone(),
            })))
        }
        CredentialType::TimeLimited => {
            warn!("time-limited credentials are never signed request_id={} order_id={}", request_id, metadata.order_id);
            Ok(None)
        }
    }
}

fn store_signed_creds(ctx: &SkusContext, request_id: &RequestId, creds: &SignedCreds) -> Result<(), SkusError> {
    let inserted = match creds {
        SignedCreds::SingleUse(creds) => ctx.storage.insert_signed_order_creds(creds)?,
        SignedCreds::TimeLimitedV2(creds) => ctx.storage.insert_time_limited_v2_creds(creds)?,
    };
    let (order_id, item_id) = creds.metadata();
    match inserted {
        InsertResult::Inserted => debug!("signed credentials stored request_id={} order_id={} item_id={}", request_id, order_id, item_id),
        InsertResult::Conflict => {
            debug!("signed credentials already stored request_id={} order_id={} item_id={}", request_id, order_id, item_id)
        }
    }
    Ok(())
}

/// Publishes the raw message to the dead-letter topic. Failures are only logged.
pub async fn forward_to_dlq(ctx: &SkusContext, message: &BusMessage, cause: &SkusError) {
    let topic = &ctx.config.bus.signed_order_creds_dlq_topic;
    match ctx.bus.publish(topic, &message.key, &message.value).await {
        Ok(()) => info!("signing result dead-lettered topic={} offset={} cause={}", topic, message.offset, cause),
        Err(err) => error!("dead-letter publish failed topic={} offset={} error={} cause={}", topic, message.offset, err, cause),
    }
}

/// Consumes the signed topic until `shutdown` flips to `true` or the subscription ends.
pub async fn run_store_signed_order_credentials(ctx: SkusContext, mut shutdown: watch::Receiver<bool>) -> Result<(), SkusError> {
    let topic = ctx.config.bus.signed_order_creds_topic.clone();
    let backoff = Duration::from_millis(ctx.config.bus.consumer_backoff_ms);
    let mut subscription = ctx.bus.subscribe(&topic).await?;
    info!("signed order credentials consumer started topic={}", topic);

    loop {
        if *shutdown.borrow() {
            break;
        }
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            item = subscription.next() => {
                let Some(item) = item else { break; };
                let message = match item {
                    Ok(message) => message,
                    Err(err) => {
                        warn!("signed topic stream error topic={} error={}", topic, err);
                        tokio::time::sleep(backoff).await;
                        continue;
                    }
                };
                if let Err(err) = handle_signed_order_credentials(&ctx, &message, now_utc()).await {
                    warn!("signed order credentials handler error offset={} error={}", message.offset, err);
                    forward_to_dlq(&ctx, &message, &err).await;
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    info!("signed order credentials consumer stopped topic={}", topic);
    Ok(())
}
