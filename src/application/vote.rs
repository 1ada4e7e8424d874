//! Vote intake and the drain job that redeems queued votes and publishes them to the ledger topic.

use crate::application::context::SkusContext;
use crate::domain::vote::group_by_issuer;
use crate::domain::{deduplicate_credential_bindings, CredentialBinding, CredentialRedemption, Vote, VoteEvent, VoteRecord};
use crate::foundation::{SkusError, TRANSPORT_EXPIRED_MARKER};
use crate::infrastructure::codec::encode_vote_event;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::time::Duration;
use tokio::sync::watch;

/// Queues a vote paid for with `credentials`.
///
/// Every credential must resolve to a known vote issuer; one bad credential rejects the whole
/// call and nothing is stored. One record is queued per issuer, all in a single write.
pub fn vote(ctx: &SkusContext, credentials: Vec<CredentialBinding>, vote_text: &str, now: DateTime<Utc>) -> Result<Vec<VoteRecord>, SkusError> {
    let vote = Vote::decode_base64(vote_text)?;
    let bindings = deduplicate_credential_bindings(credentials);
    if bindings.is_empty() {
        return Err(SkusError::InvalidVote("no credentials".to_string()));
    }

    let mut redemptions = Vec::with_capacity(bindings.len());
    for binding in bindings {
        let issuer = ctx
            .storage
            .get_issuer_by_public_key(&binding.public_key)?
            .ok_or_else(|| SkusError::IssuerNotFound(format!("public_key={}", binding.public_key)))?;
        redemptions.push(CredentialRedemption {
            issuer: issuer.merchant_id,
            token_preimage: binding.token_preimage,
            signature: binding.signature,
        });
    }

    let mut records = Vec::new();
    for group in group_by_issuer(redemptions)? {
        let tally = i64::try_from(group.redemptions.len()).map_err(|err| SkusError::InvalidVote(err.to_string()))?;
        let mut event = VoteEvent::new(&vote, tally, group.funding_source, now);
        event.base_vote_value = ctx.config.vote.base_vote_value.clone();
        let credentials = serde_json::to_string(&group.redemptions)?;
        records.push(VoteRecord::new(credentials, vote_text.to_string(), encode_vote_event(&event), now));
    }

    ctx.storage.insert_votes(&records)?;
    info!("vote queued type={} channel={} records={}", vote.vote_type, vote.channel, records.len());
    Ok(records)
}

/// Runs one drain pass over the vote queue.
///
/// Returns whether a pass was attempted. Nothing is attempted after shutdown or while the
/// breaker is open. A publish failure rolls the whole pass back; if the bus reports an expired
/// session the breaker is tripped so the job sits out the configured pause.
pub async fn run_next_vote_drain_job(ctx: &SkusContext, shutdown: &watch::Receiver<bool>) -> (bool, Result<(), SkusError>) {
    let (attempted, result) = drain_pass(ctx, shutdown).await;
    (attempted, result.map(|_| ()))
}

async fn drain_pass(ctx: &SkusContext, shutdown: &watch::Receiver<bool>) -> (bool, Result<usize, SkusError>) {
    if *shutdown.borrow() {
        debug!("vote drain skipped, shutting down");
        return (false, Ok(0));
    }
    if ctx.vote_breaker.is_open() {
        debug!("vote drain skipped, breaker open");
        return (false, Ok(0));
    }
    (true, drain_votes(ctx).await)
}

async fn drain_votes(ctx: &SkusContext) -> Result<usize, SkusError> {
    let mut tx = ctx.storage.begin_vote_drain(ctx.config.vote.drain_batch_size)?;
    let records = tx.records().to_vec();
    if records.is_empty() {
        tx.rollback();
        return Ok(0);
    }

    for record in &records {
        let redemptions = match record.redemptions() {
            Ok(redemptions) => redemptions,
            Err(err) => {
                warn!("vote credentials undecodable vote_id={} error={}", record.id, err);
                tx.mark_erred(&record.id)?;
                Vec::new()
            }
        };

        if let Err(err) = ctx.issuer.redeem_credentials(&redemptions, &record.vote_text).await {
            warn!("vote redemption failed vote_id={} error={}", record.id, err);
            tx.mark_erred(&record.id)?;
        }

        let key = record.id.to_string();
        if let Err(err) = ctx.bus.publish(&ctx.config.bus.vote_topic, key.as_bytes(), &record.vote_event).await {
            if err.to_string().contains(TRANSPORT_EXPIRED_MARKER) {
                warn!("vote topic session expired, pausing drain pause_secs={}", ctx.vote_drain_pause().as_secs());
                ctx.vote_breaker.trip(ctx.vote_drain_pause());
            }
            tx.rollback();
            return Err(err);
        }
        tx.mark_processed(&record.id)?;
    }

    tx.commit()?;
    info!("vote drain committed records={}", records.len());
    Ok(records.len())
}

/// Drains the vote queue until shutdown, sleeping `idle` after an empty, skipped or failed pass.
pub async fn run_vote_drain_loop(ctx: SkusContext, mut shutdown: watch::Receiver<bool>, idle: Duration) {
    info!("vote drain loop started");
    loop {
        let (attempted, result) = drain_pass(&ctx, &shutdown).await;
        if *shutdown.borrow() {
            break;
        }
        if let Err(err) = &result {
            warn!("vote drain pass failed error={}", err);
        }
        if !attempted || !matches!(result, Ok(drained) if drained > 0) {
            tokio::select! {
                _ = tokio::time::sleep(idle) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
    }
    info!("vote drain loop stopped");
}
