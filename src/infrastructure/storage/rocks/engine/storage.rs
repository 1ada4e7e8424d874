use super::batch::RocksVoteDrain;
use super::RocksStorage;
use crate::domain::{Issuer, Order, OrderCreds, SigningRequestOutbox, TimeAwareSubIssuedCreds, VoteRecord};
use crate::foundation::{ItemId, OrderId, RequestId, SkusError, VoteId};
use crate::infrastructure::storage::rocks::schema::*;
use crate::infrastructure::storage::rocks::util::acquire_with_timeout;
use crate::infrastructure::storage::{
    CredentialStorage, InsertResult, IssuerStorage, OrderStorage, Storage, VoteDrainTransaction, VoteStorage,
};
use crate::storage_err;
use chrono::{DateTime, Utc};
use log::{debug, trace, warn};
use rocksdb::{Direction, IteratorMode, WriteBatch};

impl RocksStorage {
    pub(super) fn scan_prefix<T: serde::de::DeserializeOwned>(&self, cf_name: &str, prefix: &[u8]) -> Result<Vec<T>, SkusError> {
        let cf = self.cf_handle(cf_name)?;
        let mut out = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::From(prefix, Direction::Forward)) {
            let (key, value) = item.map_err(|err| storage_err!("rocksdb iterator", err))?;
            if !key.starts_with(prefix) {
                break;
            }
            out.push(Self::decode(&value)?);
        }
        Ok(out)
    }

    fn put_order(&self, batch: &mut WriteBatch, order: &Order) -> Result<(), SkusError> {
        batch.put_cf(self.cf_handle(CF_ORDER)?, Self::key_order(&order.id), Self::encode(order)?);
        if let Some(external_id) = order.external_id() {
            batch.put_cf(self.cf_handle(CF_ORDER_EXT_INDEX)?, Self::key_order_external(external_id), order.id.as_bytes());
        }
        Ok(())
    }
}

impl OrderStorage for RocksStorage {
    fn insert_order(&self, order: &Order) -> Result<InsertResult, SkusError> {
        let _guard = acquire_with_timeout(&self.order_lock, "rocks order lock")?;
        if self.exists(CF_ORDER, &Self::key_order(&order.id))? {
            return Ok(InsertResult::Conflict);
        }
        let mut batch = WriteBatch::default();
        self.put_order(&mut batch, order)?;
        self.db.write(batch).map_err(|err| storage_err!("rocksdb insert_order", err))?;
        debug!("order stored order_id={} items={}", order.id, order.items.len());
        Ok(InsertResult::Inserted)
    }

    fn get_order(&self, order_id: &OrderId) -> Result<Option<Order>, SkusError> {
        trace!("get_order order_id={}", order_id);
        self.get_decoded(CF_ORDER, &Self::key_order(order_id))
    }

    fn update_order(&self, order: &Order) -> Result<(), SkusError> {
        let _guard = acquire_with_timeout(&self.order_lock, "rocks order lock")?;
        if !self.exists(CF_ORDER, &Self::key_order(&order.id))? {
            return Err(SkusError::OrderNotFound(order.id.to_string()));
        }
        let mut batch = WriteBatch::default();
        self.put_order(&mut batch, order)?;
        self.db.write(batch).map_err(|err| storage_err!("rocksdb update_order", err))
    }

    fn get_order_by_external_id(&self, external_id: &str) -> Result<Option<Order>, SkusError> {
        let cf = self.cf_handle(CF_ORDER_EXT_INDEX)?;
        let Some(bytes) = self.db.get_cf(cf, Self::key_order_external(external_id)).map_err(|err| storage_err!("rocksdb", err))?
        else {
            return Ok(None);
        };
        let raw: [u8; 16] = bytes.as_slice().try_into().map_err(|_| storage_err!("decode order ext index", "corrupt value"))?;
        self.get_order(&OrderId::from_uuid(uuid::Uuid::from_bytes(raw)))
    }
}

impl IssuerStorage for RocksStorage {
    fn get_issuer(&self, name: &str) -> Result<Option<Issuer>, SkusError> {
        self.get_decoded(CF_ISSUER, &Self::key_issuer(name))
    }

    fn get_issuer_by_public_key(&self, public_key: &str) -> Result<Option<Issuer>, SkusError> {
        let cf = self.cf_handle(CF_ISSUER_PK_INDEX)?;
        let Some(name) =
            self.db.get_cf(cf, Self::key_issuer_public_key(public_key)).map_err(|err| storage_err!("rocksdb", err))?
        else {
            return Ok(None);
        };
        let name = String::from_utf8(name).map_err(|err| storage_err!("decode issuer pk index", err))?;
        self.get_issuer(&name)
    }

    fn insert_issuer_if_not_exists(&self, issuer: &Issuer) -> Result<InsertResult, SkusError> {
        let _guard = acquire_with_timeout(&self.issuer_lock, "rocks issuer lock")?;
        let key = Self::key_issuer(issuer.name());
        if self.exists(CF_ISSUER, &key)? {
            return Ok(InsertResult::Conflict);
        }
        let mut batch = WriteBatch::default();
        batch.put_cf(self.cf_handle(CF_ISSUER)?, key, Self::encode(issuer)?);
        batch.put_cf(self.cf_handle(CF_ISSUER_PK_INDEX)?, Self::key_issuer_public_key(&issuer.public_key), issuer.name().as_bytes());
        self.db.write(batch).map_err(|err| storage_err!("rocksdb insert_issuer", err))?;
        debug!("issuer stored name={} issuer_id={}", issuer.name(), issuer.id);
        Ok(InsertResult::Inserted)
    }

    fn list_issuers(&self) -> Result<Vec<Issuer>, SkusError> {
        self.scan_prefix(CF_ISSUER, b"iss:")
    }
}

impl CredentialStorage for RocksStorage {
    fn insert_order_creds(&self, creds: &OrderCreds) -> Result<InsertResult, SkusError> {
        let _guard = acquire_with_timeout(&self.creds_lock, "rocks creds lock")?;
        let key = Self::key_order_creds(&creds.order_id, &creds.item_id);
        if self.exists(CF_ORDER_CREDS, &key)? {
            return Ok(InsertResult::Conflict);
        }
        let cf = self.cf_handle(CF_ORDER_CREDS)?;
        self.db.put_cf(cf, key, Self::encode(creds)?).map_err(|err| storage_err!("rocksdb insert_order_creds", err))?;
        Ok(InsertResult::Inserted)
    }

    fn get_order_creds(&self, order_id: &OrderId, item_id: &ItemId) -> Result<Option<OrderCreds>, SkusError> {
        self.get_decoded(CF_ORDER_CREDS, &Self::key_order_creds(order_id, item_id))
    }

    fn insert_signed_order_creds(&self, creds: &OrderCreds) -> Result<InsertResult, SkusError> {
        let _guard = acquire_with_timeout(&self.creds_lock, "rocks creds lock")?;
        let key = Self::key_order_creds(&creds.order_id, &creds.item_id);
        let stored = match self.get_decoded::<OrderCreds>(CF_ORDER_CREDS, &key)? {
            Some(existing) if existing.is_signed() => return Ok(InsertResult::Conflict),
            Some(mut existing) => {
                existing.signed_creds = creds.signed_creds.clone();
                existing.batch_proof = creds.batch_proof.clone();
                existing.public_key = creds.public_key.clone();
                existing
            }
            None => creds.clone(),
        };
        let cf = self.cf_handle(CF_ORDER_CREDS)?;
        self.db.put_cf(cf, key, Self::encode(&stored)?).map_err(|err| storage_err!("rocksdb insert_signed_order_creds", err))?;
        Ok(InsertResult::Inserted)
    }

    fn insert_time_limited_v2_creds(&self, creds: &TimeAwareSubIssuedCreds) -> Result<InsertResult, SkusError> {
        let _guard = acquire_with_timeout(&self.creds_lock, "rocks creds lock")?;
        let key = Self::key_tlv2(&creds.order_id, &creds.item_id, &creds.issuer_id, &creds.valid_from);
        if self.exists(CF_TLV2_CREDS, &key)? {
            return Ok(InsertResult::Conflict);
        }
        let cf = self.cf_handle(CF_TLV2_CREDS)?;
        self.db.put_cf(cf, key, Self::encode(creds)?).map_err(|err| storage_err!("rocksdb insert_tlv2_creds", err))?;
        Ok(InsertResult::Inserted)
    }

    fn list_time_limited_v2_creds(&self, order_id: &OrderId, item_id: &ItemId) -> Result<Vec<TimeAwareSubIssuedCreds>, SkusError> {
        self.scan_prefix(CF_TLV2_CREDS, &Self::key_tlv2_prefix(order_id, item_id))
    }

    fn insert_signing_request_outbox(&self, outbox: &SigningRequestOutbox) -> Result<InsertResult, SkusError> {
        let _guard = acquire_with_timeout(&self.creds_lock, "rocks creds lock")?;
        let key = Self::key_outbox(&outbox.request_id);
        if self.exists(CF_OUTBOX, &key)? {
            return Ok(InsertResult::Conflict);
        }
        let cf = self.cf_handle(CF_OUTBOX)?;
        self.db.put_cf(cf, key, Self::encode(outbox)?).map_err(|err| storage_err!("rocksdb insert_outbox", err))?;
        Ok(InsertResult::Inserted)
    }

    fn get_signing_request_outbox(&self, request_id: &RequestId) -> Result<Option<SigningRequestOutbox>, SkusError> {
        self.get_decoded(CF_OUTBOX, &Self::key_outbox(request_id))
    }

    fn complete_signing_request_outbox(&self, request_id: &RequestId, now: DateTime<Utc>) -> Result<bool, SkusError> {
        let _guard = acquire_with_timeout(&self.creds_lock, "rocks creds lock")?;
        let key = Self::key_outbox(request_id);
        let Some(mut outbox) = self.get_decoded::<SigningRequestOutbox>(CF_OUTBOX, &key)? else {
            return Ok(false);
        };
        if outbox.is_completed() {
            return Ok(false);
        }
        outbox.completed_at = Some(now);
        let cf = self.cf_handle(CF_OUTBOX)?;
        self.db.put_cf(cf, key, Self::encode(&outbox)?).map_err(|err| storage_err!("rocksdb complete_outbox", err))?;
        Ok(true)
    }
}

impl VoteStorage for RocksStorage {
    fn insert_votes(&self, records: &[VoteRecord]) -> Result<(), SkusError> {
        let _guard = acquire_with_timeout(&self.vote_lock, "rocks vote lock")?;
        let cf_vote = self.cf_handle(CF_VOTE)?;
        let cf_index = self.cf_handle(CF_VOTE_INDEX)?;
        let cf_pending = self.cf_handle(CF_VOTE_PENDING)?;
        let mut batch = WriteBatch::default();
        for record in records {
            let index_key = Self::key_vote_index(&record.id);
            if self.exists(CF_VOTE_INDEX, &index_key)? {
                return Err(SkusError::StorageError {
                    operation: "insert_votes".to_string(),
                    details: format!("duplicate vote id {}", record.id),
                });
            }
            let key = Self::key_vote(record);
            batch.put_cf(cf_vote, &key, Self::encode(record)?);
            if record.is_pending() {
                batch.put_cf(cf_pending, &key, b"");
            }
            batch.put_cf(cf_index, index_key, key);
        }
        self.db.write(batch).map_err(|err| storage_err!("rocksdb insert_votes", err))?;
        debug!("votes stored count={}", records.len());
        Ok(())
    }

    fn get_vote(&self, vote_id: &VoteId) -> Result<Option<VoteRecord>, SkusError> {
        let cf = self.cf_handle(CF_VOTE_INDEX)?;
        let Some(key) = self.db.get_cf(cf, Self::key_vote_index(vote_id)).map_err(|err| storage_err!("rocksdb", err))? else {
            return Ok(None);
        };
        self.get_decoded(CF_VOTE, &key)
    }

    fn list_votes(&self) -> Result<Vec<VoteRecord>, SkusError> {
        self.scan_prefix(CF_VOTE, b"vote:")
    }

    fn begin_vote_drain(&self, limit: usize) -> Result<Box<dyn VoteDrainTransaction + '_>, SkusError> {
        let _guard = acquire_with_timeout(&self.vote_lock, "rocks vote lock")?;
        let mut leases = acquire_with_timeout(&self.vote_leases, "rocks vote leases")?;
        let cf = self.cf_handle(CF_VOTE_PENDING)?;
        let mut records = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            if records.len() >= limit {
                break;
            }
            let (key, _) = item.map_err(|err| storage_err!("rocksdb iterator", err))?;
            let Some(record) = self.get_decoded::<VoteRecord>(CF_VOTE, &key)? else {
                warn!("pending vote index entry without vote key_len={}", key.len());
                continue;
            };
            if record.is_pending() && !leases.contains(&record.id) {
                records.push(record);
            }
        }
        for record in &records {
            leases.insert(record.id);
        }
        trace!("vote drain leased records={}", records.len());
        Ok(Box::new(RocksVoteDrain { storage: self, records, batch: WriteBatch::default() }))
    }
}

impl Storage for RocksStorage {
    fn health_check(&self) -> Result<(), SkusError> {
        self.schema_version().map(|_| ())
    }
}
