use crate::domain::order::METADATA_EXTERNAL_ID;
use crate::domain::{Issuer, Order, OrderCreds, SigningRequestOutbox, TimeAwareSubIssuedCreds, VoteRecord};
use crate::foundation::{IssuerId, ItemId, OrderId, RequestId, SkusError, VoteId};
use crate::infrastructure::storage::{
    CredentialStorage, InsertResult, IssuerStorage, OrderStorage, Storage, VoteDrainTransaction, VoteStorage,
};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

type Tlv2Key = (OrderId, ItemId, IssuerId, DateTime<Utc>);

struct MemoryInner {
    order: HashMap<OrderId, Order>,
    issuer: BTreeMap<String, Issuer>,
    order_creds: HashMap<(OrderId, ItemId), OrderCreds>,
    tlv2_creds: BTreeMap<Tlv2Key, TimeAwareSubIssuedCreds>,
    outbox: HashMap<RequestId, SigningRequestOutbox>,
    // Insertion order doubles as queue order.
    vote: Vec<VoteRecord>,
    vote_leases: HashSet<VoteId>,
}

impl MemoryInner {
    fn new() -> Self {
        Self {
            order: HashMap::new(),
            issuer: BTreeMap::new(),
            order_creds: HashMap::new(),
            tlv2_creds: BTreeMap::new(),
            outbox: HashMap::new(),
            vote: Vec::new(),
            vote_leases: HashSet::new(),
        }
    }
}

pub struct MemoryStorage {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self { inner: Arc::new(Mutex::new(MemoryInner::new())) }
    }

    fn lock_inner(&self) -> Result<MutexGuard<'_, MemoryInner>, SkusError> {
        lock(&self.inner)
    }
}

fn lock(inner: &Mutex<MemoryInner>) -> Result<MutexGuard<'_, MemoryInner>, SkusError> {
    inner
        .lock()
        .map_err(|_| SkusError::StorageError { operation: "memory storage lock".to_string(), details: "poisoned".to_string() })
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl OrderStorage for MemoryStorage {
    fn insert_order(&self, order: &Order) -> Result<InsertResult, SkusError> {
        let mut inner = self.lock_inner()?;
        if inner.order.contains_key(&order.id) {
            return Ok(InsertResult::Conflict);
        }
        inner.order.insert(order.id, order.clone());
        Ok(InsertResult::Inserted)
    }

    fn get_order(&self, order_id: &OrderId) -> Result<Option<Order>, SkusError> {
        Ok(self.lock_inner()?.order.get(order_id).cloned())
    }

    fn update_order(&self, order: &Order) -> Result<(), SkusError> {
        let mut inner = self.lock_inner()?;
        match inner.order.get_mut(&order.id) {
            Some(existing) => {
                *existing = order.clone();
                Ok(())
            }
            None => Err(SkusError::OrderNotFound(order.id.to_string())),
        }
    }

    fn get_order_by_external_id(&self, external_id: &str) -> Result<Option<Order>, SkusError> {
        let inner = self.lock_inner()?;
        Ok(inner.order.values().find(|order| order.metadata.get(METADATA_EXTERNAL_ID).is_some_and(|v| v == external_id)).cloned())
    }
}

impl IssuerStorage for MemoryStorage {
    fn get_issuer(&self, name: &str) -> Result<Option<Issuer>, SkusError> {
        Ok(self.lock_inner()?.issuer.get(name).cloned())
    }

    fn get_issuer_by_public_key(&self, public_key: &str) -> Result<Option<Issuer>, SkusError> {
        Ok(self.lock_inner()?.issuer.values().find(|issuer| issuer.public_key == public_key).cloned())
    }

    fn insert_issuer_if_not_exists(&self, issuer: &Issuer) -> Result<InsertResult, SkusError> {
        let mut inner = self.lock_inner()?;
        if inner.issuer.contains_key(issuer.name()) {
            return Ok(InsertResult::Conflict);
        }
        inner.issuer.insert(issuer.name().to_string(), issuer.clone());
        Ok(InsertResult::Inserted)
    }

    fn list_issuers(&self) -> Result<Vec<Issuer>, SkusError> {
        Ok(self.lock_inner()?.issuer.values().cloned().collect())
    }
}

impl CredentialStorage for MemoryStorage {
    fn insert_order_creds(&self, creds: &OrderCreds) -> Result<InsertResult, SkusError> {
        let mut inner = self.lock_inner()?;
        let key = (creds.order_id, creds.item_id);
        if inner.order_creds.contains_key(&key) {
            return Ok(InsertResult::Conflict);
        }
        inner.order_creds.insert(key, creds.clone());
        Ok(InsertResult::Inserted)
    }

    fn get_order_creds(&self, order_id: &OrderId, item_id: &ItemId) -> Result<Option<OrderCreds>, SkusError> {
        Ok(self.lock_inner()?.order_creds.get(&(*order_id, *item_id)).cloned())
    }

    fn insert_signed_order_creds(&self, creds: &OrderCreds) -> Result<InsertResult, SkusError> {
        let mut inner = self.lock_inner()?;
        let key = (creds.order_id, creds.item_id);
        match inner.order_creds.get_mut(&key) {
            Some(existing) if existing.is_signed() => Ok(InsertResult::Conflict),
            Some(existing) => {
                existing.signed_creds = creds.signed_creds.clone();
                existing.batch_proof = creds.batch_proof.clone();
                existing.public_key = creds.public_key.clone();
                Ok(InsertResult::Inserted)
            }
            None => {
                inner.order_creds.insert(key, creds.clone());
                Ok(InsertResult::Inserted)
            }
        }
    }

    fn insert_time_limited_v2_creds(&self, creds: &TimeAwareSubIssuedCreds) -> Result<InsertResult, SkusError> {
        let mut inner = self.lock_inner()?;
        let key = (creds.order_id, creds.item_id, creds.issuer_id, creds.valid_from);
        if inner.tlv2_creds.contains_key(&key) {
            return Ok(InsertResult::Conflict);
        }
        inner.tlv2_creds.insert(key, creds.clone());
        Ok(InsertResult::Inserted)
    }

    fn list_time_limited_v2_creds(&self, order_id: &OrderId, item_id: &ItemId) -> Result<Vec<TimeAwareSubIssuedCreds>, SkusError> {
        let inner = self.lock_inner()?;
        Ok(inner.tlv2_creds.values().filter(|c| &c.order_id == order_id && &c.item_id == item_id).cloned().collect())
    }

    fn insert_signing_request_outbox(&self, outbox: &SigningRequestOutbox) -> Result<InsertResult, SkusError> {
        let mut inner = self.lock_inner()?;
        if inner.outbox.contains_key(&outbox.request_id) {
            return Ok(InsertResult::Conflict);
        }
        inner.outbox.insert(outbox.request_id.clone(), outbox.clone());
        Ok(InsertResult::Inserted)
    }

    fn get_signing_request_outbox(&self, request_id: &RequestId) -> Result<Option<SigningRequestOutbox>, SkusError> {
        Ok(self.lock_inner()?.outbox.get(request_id).cloned())
    }

    fn complete_signing_request_outbox(&self, request_id: &RequestId, now: DateTime<Utc>) -> Result<bool, SkusError> {
        let mut inner = self.lock_inner()?;
        match inner.outbox.get_mut(request_id) {
            Some(outbox) if outbox.completed_at.is_none() => {
                outbox.completed_at = Some(now);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum VoteMark {
    Erred,
    Processed,
}

struct MemoryVoteDrain {
    inner: Arc<Mutex<MemoryInner>>,
    records: Vec<VoteRecord>,
    marks: Vec<(VoteId, VoteMark)>,
}

impl MemoryVoteDrain {
    fn ensure_leased(&self, vote_id: &VoteId) -> Result<(), SkusError> {
        if self.records.iter().any(|record| &record.id == vote_id) {
            return Ok(());
        }
        Err(SkusError::StorageError { operation: "vote drain mark".to_string(), details: format!("vote {vote_id} is not leased") })
    }
}

impl VoteDrainTransaction for MemoryVoteDrain {
    fn records(&self) -> &[VoteRecord] {
        &self.records
    }

    fn mark_erred(&mut self, vote_id: &VoteId) -> Result<(), SkusError> {
        self.ensure_leased(vote_id)?;
        self.marks.push((*vote_id, VoteMark::Erred));
        Ok(())
    }

    fn mark_processed(&mut self, vote_id: &VoteId) -> Result<(), SkusError> {
        self.ensure_leased(vote_id)?;
        self.marks.push((*vote_id, VoteMark::Processed));
        Ok(())
    }

    fn commit(self: Box<Self>) -> Result<(), SkusError> {
        let mut inner = lock(&self.inner)?;
        for (vote_id, mark) in &self.marks {
            if let Some(record) = inner.vote.iter_mut().find(|record| &record.id == vote_id) {
                match mark {
                    VoteMark::Erred => record.erred = true,
                    VoteMark::Processed => record.processed = true,
                }
            }
        }
        Ok(())
    }

    fn rollback(self: Box<Self>) {
        drop(self);
    }
}

impl Drop for MemoryVoteDrain {
    fn drop(&mut self) {
        if let Ok(mut inner) = lock(&self.inner) {
            for record in &self.records {
                inner.vote_leases.remove(&record.id);
            }
        }
    }
}

impl VoteStorage for MemoryStorage {
    fn insert_votes(&self, records: &[VoteRecord]) -> Result<(), SkusError> {
        let mut inner = self.lock_inner()?;
        let existing: HashSet<VoteId> = inner.vote.iter().map(|record| record.id).collect();
        if let Some(dup) = records.iter().find(|record| existing.contains(&record.id)) {
            return Err(SkusError::StorageError { operation: "insert_votes".to_string(), details: format!("duplicate vote id {}", dup.id) });
        }
        inner.vote.extend(records.iter().cloned());
        Ok(())
    }

    fn get_vote(&self, vote_id: &VoteId) -> Result<Option<VoteRecord>, SkusError> {
        Ok(self.lock_inner()?.vote.iter().find(|record| &record.id == vote_id).cloned())
    }

    fn list_votes(&self) -> Result<Vec<VoteRecord>, SkusError> {
        Ok(self.lock_inner()?.vote.clone())
    }

    fn begin_vote_drain(&self, limit: usize) -> Result<Box<dyn VoteDrainTransaction + '_>, SkusError> {
        let mut inner = self.lock_inner()?;
        let records: Vec<VoteRecord> = inner
            .vote
            .iter()
            .filter(|record| record.is_pending() && !inner.vote_leases.contains(&record.id))
            .take(limit)
            .cloned()
            .collect();
        for record in &records {
            inner.vote_leases.insert(record.id);
        }
        drop(inner);
        Ok(Box::new(MemoryVoteDrain { inner: Arc::clone(&self.inner), records, marks: Vec::new() }))
    }
}

impl Storage for MemoryStorage {}
