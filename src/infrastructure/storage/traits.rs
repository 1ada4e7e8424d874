use crate::domain::{Issuer, Order, OrderCreds, SigningRequestOutbox, TimeAwareSubIssuedCreds, VoteRecord};
use crate::foundation::{ItemId, OrderId, RequestId, SkusError, VoteId};
use chrono::{DateTime, Utc};

pub type Result<T> = std::result::Result<T, SkusError>;

/// Outcome of a write guarded by a uniqueness key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InsertResult {
    Inserted,
    /// A row with the same key already exists; nothing was written.
    Conflict,
}

impl InsertResult {
    pub fn is_inserted(&self) -> bool {
        matches!(self, InsertResult::Inserted)
    }
}

pub trait OrderStorage: Send + Sync {
    /// Returns `Conflict` if an order with the same id exists.
    fn insert_order(&self, order: &Order) -> Result<InsertResult>;
    fn get_order(&self, order_id: &OrderId) -> Result<Option<Order>>;
    /// Replaces a stored order. Fails if the order does not exist.
    fn update_order(&self, order: &Order) -> Result<()>;
    fn get_order_by_external_id(&self, external_id: &str) -> Result<Option<Order>>;
}

pub trait IssuerStorage: Send + Sync {
    /// Looks an issuer up by its encoded id (`merchant?sku=...`).
    fn get_issuer(&self, name: &str) -> Result<Option<Issuer>>;
    fn get_issuer_by_public_key(&self, public_key: &str) -> Result<Option<Issuer>>;
    /// Issuer names are unique; a second insert for the same name is a `Conflict`.
    fn insert_issuer_if_not_exists(&self, issuer: &Issuer) -> Result<InsertResult>;
    fn list_issuers(&self) -> Result<Vec<Issuer>>;
}

pub trait CredentialStorage: Send + Sync {
    /// Records the blinded tokens submitted for an item. Only one submission per (order, item).
    fn insert_order_creds(&self, creds: &OrderCreds) -> Result<InsertResult>;
    fn get_order_creds(&self, order_id: &OrderId, item_id: &ItemId) -> Result<Option<OrderCreds>>;

    /// Stores the signed half of single-use credentials. The first signing result for an
    /// (order, item) wins; once signed, later results are a `Conflict`.
    fn insert_signed_order_creds(&self, creds: &OrderCreds) -> Result<InsertResult>;

    /// Keyed by (order, item, issuer, valid_from); duplicates collapse to the first row.
    fn insert_time_limited_v2_creds(&self, creds: &TimeAwareSubIssuedCreds) -> Result<InsertResult>;
    fn list_time_limited_v2_creds(&self, order_id: &OrderId, item_id: &ItemId) -> Result<Vec<TimeAwareSubIssuedCreds>>;

    fn insert_signing_request_outbox(&self, outbox: &SigningRequestOutbox) -> Result<InsertResult>;
    fn get_signing_request_outbox(&self, request_id: &RequestId) -> Result<Option<SigningRequestOutbox>>;
    /// Stamps `completed_at` once. Returns `Ok(false)` if unknown or already completed.
    fn complete_signing_request_outbox(&self, request_id: &RequestId, now: DateTime<Utc>) -> Result<bool>;
}

pub trait VoteStorage: Send + Sync {
    /// Persists all records or none.
    fn insert_votes(&self, records: &[VoteRecord]) -> Result<()>;
    fn get_vote(&self, vote_id: &VoteId) -> Result<Option<VoteRecord>>;
    fn list_votes(&self) -> Result<Vec<VoteRecord>>;

    /// Leases up to `limit` records that are neither processed nor erred, oldest first.
    /// Leased records are invisible to other drains until the transaction ends.
    fn begin_vote_drain(&self, limit: usize) -> Result<Box<dyn VoteDrainTransaction + '_>>;
}

/// Row-locked view of queued votes. Marks are staged and only become visible on `commit`.
pub trait VoteDrainTransaction: Send {
    fn records(&self) -> &[VoteRecord];
    fn mark_erred(&mut self, vote_id: &VoteId) -> Result<()>;
    fn mark_processed(&mut self, vote_id: &VoteId) -> Result<()>;
    fn commit(self: Box<Self>) -> Result<()>;
    fn rollback(self: Box<Self>);
}

pub trait Storage: OrderStorage + IssuerStorage + CredentialStorage + VoteStorage {
    fn health_check(&self) -> Result<()> {
        Ok(())
    }
}
