//! Attention votes paid for with single-use credentials.

use crate::domain::credential::CredentialRedemption;
use crate::domain::order::decode_issuer_id;
use crate::foundation::util::encoding::decode_base64;
use crate::foundation::{SkusError, VoteId, BASE_VOTE_VALUE, DEFAULT_MERCHANT_ID};
use chrono::{DateTime, SecondsFormat, Utc};
use log::warn;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const USER_WALLET_VOTE_SKU: &str = "user-wallet-vote";
pub const ANON_CARD_VOTE_SKU: &str = "anon-card-vote";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VoteType {
    AutoContribute,
    OneoffTip,
    RecurringTip,
}

impl VoteType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoteType::AutoContribute => "auto-contribute",
            VoteType::OneoffTip => "oneoff-tip",
            VoteType::RecurringTip => "recurring-tip",
        }
    }
}

impl fmt::Display for VoteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VoteType {
    type Err = SkusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto-contribute" => Ok(VoteType::AutoContribute),
            "oneoff-tip" => Ok(VoteType::OneoffTip),
            "recurring-tip" => Ok(VoteType::RecurringTip),
            other => Err(SkusError::InvalidVote(format!("unknown vote type {other}"))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FundingSource {
    UserWallet,
    AnonymousCard,
}

impl FundingSource {
    pub fn from_vote_sku(sku: &str) -> Option<Self> {
        match sku {
            USER_WALLET_VOTE_SKU => Some(FundingSource::UserWallet),
            ANON_CARD_VOTE_SKU => Some(FundingSource::AnonymousCard),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FundingSource::UserWallet => "user-wallet",
            FundingSource::AnonymousCard => "anonymous-card",
        }
    }
}

impl FromStr for FundingSource {
    type Err = SkusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user-wallet" => Ok(FundingSource::UserWallet),
            "anonymous-card" => Ok(FundingSource::AnonymousCard),
            other => Err(SkusError::InvalidVote(format!("unknown funding source {other}"))),
        }
    }
}

/// Vote payload sent by the browser, base64(JSON).
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Vote {
    #[serde(rename = "type")]
    pub vote_type: VoteType,
    pub channel: String,
}

impl Vote {
    pub fn decode_base64(vote_text: &str) -> Result<Self, SkusError> {
        let bytes = decode_base64(vote_text).map_err(|err| SkusError::InvalidVote(err.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|err| SkusError::InvalidVote(err.to_string()))
    }
}

impl FromStr for Vote {
    type Err = SkusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode_base64(s)
    }
}

/// Ledger event emitted once per issuer group when a vote is drained.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VoteEvent {
    pub id: VoteId,
    pub vote_type: VoteType,
    pub channel: String,
    pub created_at: DateTime<Utc>,
    pub base_vote_value: String,
    pub vote_tally: i64,
    pub funding_source: FundingSource,
}

impl VoteEvent {
    pub fn new(vote: &Vote, tally: i64, funding_source: FundingSource, now: DateTime<Utc>) -> Self {
        Self {
            id: VoteId::new_v4(),
            vote_type: vote.vote_type,
            channel: vote.channel.clone(),
            created_at: now,
            base_vote_value: BASE_VOTE_VALUE.to_string(),
            vote_tally: tally,
            funding_source,
        }
    }

    pub fn created_at_rfc3339(&self) -> String {
        self.created_at.to_rfc3339_opts(SecondsFormat::Secs, true)
    }
}

/// Queued redemption awaiting the drain job.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRecord {
    pub id: VoteId,
    /// JSON array of [`CredentialRedemption`].
    pub credentials: String,
    pub vote_text: String,
    /// `vote` schema bytes, published as-is.
    pub vote_event: Vec<u8>,
    pub erred: bool,
    pub processed: bool,
    pub created_at: DateTime<Utc>,
}

impl VoteRecord {
    pub fn new(credentials: String, vote_text: String, vote_event: Vec<u8>, now: DateTime<Utc>) -> Self {
        Self { id: VoteId::new_v4(), credentials, vote_text, vote_event, erred: false, processed: false, created_at: now }
    }

    pub fn is_pending(&self) -> bool {
        !self.processed && !self.erred
    }

    pub fn redemptions(&self) -> Result<Vec<CredentialRedemption>, SkusError> {
        Ok(serde_json::from_str(&self.credentials)?)
    }
}

/// Redemptions of one issuer, with the funding source its SKU implies.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IssuerGroup {
    pub issuer: String,
    pub funding_source: FundingSource,
    pub redemptions: Vec<CredentialRedemption>,
}

/// Groups redemptions by issuer in first-seen order. Fails on the first credential whose issuer
/// is not a brave.com vote SKU, so a bad batch is rejected whole.
pub fn group_by_issuer(redemptions: Vec<CredentialRedemption>) -> Result<Vec<IssuerGroup>, SkusError> {
    let mut groups: Vec<IssuerGroup> = Vec::new();
    for redemption in redemptions {
        let (merchant_id, sku) = decode_issuer_id(&redemption.issuer)?;
        if merchant_id != DEFAULT_MERCHANT_ID {
            warn!("vote rejected, merchant is not {}: merchant_id={}", DEFAULT_MERCHANT_ID, merchant_id);
            return Err(SkusError::InvalidVote(format!("invalid merchant id in sku token: {merchant_id}")));
        }
        let Some(funding_source) = FundingSource::from_vote_sku(&sku) else {
            warn!("vote rejected, sku is not a vote sku: sku={}", sku);
            return Err(SkusError::InvalidVote(format!("{sku} is an invalid sku")));
        };
        match groups.iter_mut().find(|group| group.issuer == redemption.issuer) {
            Some(group) => group.redemptions.push(redemption),
            None => groups.push(IssuerGroup { issuer: redemption.issuer.clone(), funding_source, redemptions: vec![redemption] }),
        }
    }
    Ok(groups)
}
