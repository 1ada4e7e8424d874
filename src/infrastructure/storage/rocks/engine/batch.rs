use super::RocksStorage;
use crate::domain::VoteRecord;
use crate::foundation::{SkusError, VoteId};
use crate::infrastructure::storage::rocks::schema::{CF_VOTE, CF_VOTE_PENDING};
use crate::infrastructure::storage::VoteDrainTransaction;
use crate::storage_err;
use log::debug;
use rocksdb::WriteBatch;

/// Leased slice of the vote queue. Marks land in one `WriteBatch` on commit; the lease is
/// released on drop either way.
pub(super) struct RocksVoteDrain<'a> {
    pub(super) storage: &'a RocksStorage,
    pub(super) records: Vec<VoteRecord>,
    pub(super) batch: WriteBatch,
}

impl RocksVoteDrain<'_> {
    fn stage(&mut self, vote_id: &VoteId, apply: impl FnOnce(&mut VoteRecord)) -> Result<(), SkusError> {
        let Some(record) = self.records.iter_mut().find(|record| &record.id == vote_id) else {
            return Err(SkusError::StorageError {
                operation: "vote drain mark".to_string(),
                details: format!("vote {vote_id} is not leased"),
            });
        };
        // Marks accumulate on the leased copy; the last put for a key wins inside the batch.
        apply(record);
        let key = RocksStorage::key_vote(record);
        let value = RocksStorage::encode(&*record)?;
        let cf = self.storage.cf_handle(CF_VOTE)?;
        self.batch.put_cf(cf, &key, value);
        if !record.is_pending() {
            self.batch.delete_cf(self.storage.cf_handle(CF_VOTE_PENDING)?, &key);
        }
        Ok(())
    }
}

impl VoteDrainTransaction for RocksVoteDrain<'_> {
    fn records(&self) -> &[VoteRecord] {
        &self.records
    }

    fn mark_erred(&mut self, vote_id: &VoteId) -> Result<(), SkusError> {
        self.stage(vote_id, |record| record.erred = true)
    }

    fn mark_processed(&mut self, vote_id: &VoteId) -> Result<(), SkusError> {
        self.stage(vote_id, |record| record.processed = true)
    }

    fn commit(mut self: Box<Self>) -> Result<(), SkusError> {
        let batch = std::mem::take(&mut self.batch);
        debug!("vote drain commit records={} writes={}", self.records.len(), batch.len());
        self.storage.db.write(batch).map_err(|err| storage_err!("rocksdb vote drain commit", err))
    }

    fn rollback(self: Box<Self>) {
        debug!("vote drain rollback records={}", self.records.len());
        drop(self);
    }
}

impl Drop for RocksVoteDrain<'_> {
    fn drop(&mut self) {
        let mut leases = self.storage.vote_leases.lock();
        for record in &self.records {
            leases.remove(&record.id);
        }
    }
}
