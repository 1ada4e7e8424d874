//! RocksDB-backed storage engine.
//!
//! # Lock Semantics
//!
//! RocksDB itself is thread-safe, but check-then-write sequences need mutual exclusion
//! so that uniqueness keys hold under concurrent consumers.
//!
//! - `order_lock`: guards order inserts/updates and the external id index.
//! - `issuer_lock`: guards issuer inserts and the public key index.
//! - `creds_lock`: guards order credentials, time-limited-v2 credentials and the outbox.
//! - `vote_lock`: guards vote inserts and drain leasing.
//!
//! Locks are acquired with a bounded timeout (`STORAGE_LOCK_TIMEOUT_SECS`). Acquire at most
//! one lock at a time.
//!
//! # Column Families
//!
//! See `schema.rs` for column family names.

use crate::domain::VoteRecord;
use crate::foundation::{IssuerId, ItemId, OrderId, RequestId, SkusError, VoteId};
use crate::infrastructure::storage::rocks::migration::open_db_with_cfs;
use crate::infrastructure::storage::rocks::schema::*;
use crate::storage_err;
use bincode::Options;
use chrono::{DateTime, SecondsFormat, Utc};
use log::{debug, info, warn};
use parking_lot::Mutex;
use rocksdb::{ColumnFamily, WriteBatch, DB};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::{env, fs};

mod batch;
mod storage;

const SCHEMA_VERSION: u32 = 2;
const DATA_DIR_ENV_VAR: &str = "SKUS_DATA_DIR";
const DB_DIR_NAME: &str = "skus";

pub struct RocksStorage {
    db: Arc<DB>,
    order_lock: Mutex<()>,
    issuer_lock: Mutex<()>,
    creds_lock: Mutex<()>,
    vote_lock: Mutex<()>,
    vote_leases: Mutex<HashSet<VoteId>>,
}

impl RocksStorage {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SkusError> {
        Self::open_with_options(path, false)
    }

    pub fn open_with_options(path: impl AsRef<Path>, allow_schema_wipe: bool) -> Result<Self, SkusError> {
        let path = path.as_ref();
        debug!("opening RocksStorage path={}", path.display());
        let db = open_db_with_cfs(path)?;
        let storage = Self {
            db: Arc::new(db),
            order_lock: Mutex::new(()),
            issuer_lock: Mutex::new(()),
            creds_lock: Mutex::new(()),
            vote_lock: Mutex::new(()),
            vote_leases: Mutex::new(HashSet::new()),
        };
        if let Err(err) = storage.maybe_run_migrations() {
            if allow_schema_wipe {
                if let SkusError::SchemaMismatch { stored, current } = err {
                    warn!("schema mismatch (stored={}, current={}); wiping db path={}", stored, current, path.display());
                    drop(storage);
                    if path.exists() {
                        fs::remove_dir_all(path).map_err(|err| storage_err!("fs::remove_dir_all schema_wipe", err))?;
                    }
                    return Self::open_with_options(path, false);
                }
            }
            return Err(err);
        }
        info!("RocksStorage opened path={}", path.display());
        Ok(storage)
    }

    /// Opens `$SKUS_DATA_DIR/skus`, falling back to `./.skus/skus`.
    pub fn open_default() -> Result<Self, SkusError> {
        if let Ok(data_dir) = env::var(DATA_DIR_ENV_VAR) {
            let trimmed = data_dir.trim();
            if !trimmed.is_empty() {
                return Self::open_in_dir(trimmed);
            }
        }
        let base = env::current_dir().map_err(|err| storage_err!("env::current_dir", err))?;
        Self::open_in_dir(base.join(".skus"))
    }

    pub fn open_in_dir(data_dir: impl AsRef<Path>) -> Result<Self, SkusError> {
        let dir = data_dir.as_ref();
        if dir.as_os_str().is_empty() {
            return Self::open_default();
        }
        fs::create_dir_all(dir).map_err(|err| storage_err!("fs::create_dir_all open_in_dir", err))?;
        let path = dir.join(DB_DIR_NAME);
        debug!("opening RocksStorage in dir path={}", path.display());
        Self::open_with_options(path, false)
    }

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily, SkusError> {
        self.db.cf_handle(name).ok_or_else(|| SkusError::StorageError {
            operation: "rocksdb cf_handle".to_string(),
            details: format!("missing column family: {}", name),
        })
    }

    fn maybe_run_migrations(&self) -> Result<(), SkusError> {
        match self.schema_version()? {
            None => {
                info!("initializing fresh db schema schema_version={}", SCHEMA_VERSION);
                self.set_schema_version(SCHEMA_VERSION)?;
            }
            Some(v) if v == SCHEMA_VERSION => {}
            Some(1) => {
                info!("migrating db schema from=1 to={}", SCHEMA_VERSION);
                self.rebuild_vote_pending_index()?;
                self.set_schema_version(SCHEMA_VERSION)?;
            }
            Some(v) => return Err(SkusError::SchemaMismatch { stored: v, current: SCHEMA_VERSION }),
        }
        Ok(())
    }

    /// Version 2 added the pending vote index.
    fn rebuild_vote_pending_index(&self) -> Result<(), SkusError> {
        let cf_pending = self.cf_handle(CF_VOTE_PENDING)?;
        let mut batch = WriteBatch::default();
        for record in self.scan_prefix::<VoteRecord>(CF_VOTE, b"vote:")? {
            if record.is_pending() {
                batch.put_cf(cf_pending, Self::key_vote(&record), b"");
            }
        }
        debug!("vote pending index rebuilt entries={}", batch.len());
        self.db.write(batch).map_err(|err| storage_err!("rocksdb rebuild_vote_pending_index", err))
    }

    fn schema_version(&self) -> Result<Option<u32>, SkusError> {
        let cf = self.cf_handle(CF_METADATA)?;
        match self.db.get_cf(cf, b"schema_version") {
            Ok(Some(bytes)) => {
                let array: [u8; 4] = bytes.as_slice().try_into().map_err(|_| SkusError::StorageError {
                    operation: "schema_version decode".to_string(),
                    details: "corrupt schema version".to_string(),
                })?;
                Ok(Some(u32::from_be_bytes(array)))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(storage_err!("rocksdb get_cf schema_version", e)),
        }
    }

    fn set_schema_version(&self, version: u32) -> Result<(), SkusError> {
        let cf = self.cf_handle(CF_METADATA)?;
        self.db.put_cf(cf, b"schema_version", version.to_be_bytes()).map_err(SkusError::from)
    }

    fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, SkusError> {
        bincode::DefaultOptions::new().with_fixint_encoding().serialize(value).map_err(|err| err.into())
    }

    fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, SkusError> {
        bincode::DefaultOptions::new().with_fixint_encoding().deserialize(bytes).map_err(|err| err.into())
    }

    fn get_decoded<T: serde::de::DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>, SkusError> {
        let cf = self.cf_handle(cf_name)?;
        match self.db.get_cf(cf, key).map_err(|err| storage_err!("rocksdb", err))? {
            Some(bytes) => Ok(Some(Self::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn exists(&self, cf_name: &str, key: &[u8]) -> Result<bool, SkusError> {
        let cf = self.cf_handle(cf_name)?;
        Ok(self.db.get_pinned_cf(cf, key).map_err(|err| storage_err!("rocksdb get_pinned_cf", err))?.is_some())
    }

    fn key_order(order_id: &OrderId) -> Vec<u8> {
        KeyBuilder::with_capacity(4 + 16).prefix(b"ord:").order(order_id).build()
    }

    fn key_order_external(external_id: &str) -> Vec<u8> {
        KeyBuilder::with_capacity(4 + external_id.len()).prefix(b"ext:").str(external_id).build()
    }

    fn key_issuer(name: &str) -> Vec<u8> {
        KeyBuilder::with_capacity(4 + name.len()).prefix(b"iss:").str(name).build()
    }

    fn key_issuer_public_key(public_key: &str) -> Vec<u8> {
        KeyBuilder::with_capacity(3 + public_key.len()).prefix(b"pk:").str(public_key).build()
    }

    fn key_order_creds(order_id: &OrderId, item_id: &ItemId) -> Vec<u8> {
        KeyBuilder::with_capacity(3 + 16 + 1 + 16).prefix(b"oc:").order(order_id).sep().item(item_id).build()
    }

    fn key_tlv2_prefix(order_id: &OrderId, item_id: &ItemId) -> Vec<u8> {
        KeyBuilder::with_capacity(5 + 16 + 1 + 16 + 1).prefix(b"tlv2:").order(order_id).sep().item(item_id).sep().build()
    }

    fn key_tlv2(order_id: &OrderId, item_id: &ItemId, issuer_id: &IssuerId, valid_from: &DateTime<Utc>) -> Vec<u8> {
        let valid_from = valid_from.to_rfc3339_opts(SecondsFormat::Secs, true);
        KeyBuilder::with_capacity(5 + 16 + 1 + 16 + 1 + 16 + 1 + valid_from.len())
            .bytes(&Self::key_tlv2_prefix(order_id, item_id))
            .bytes(issuer_id.as_bytes())
            .sep()
            .str(&valid_from)
            .build()
    }

    fn key_outbox(request_id: &RequestId) -> Vec<u8> {
        KeyBuilder::with_capacity(4 + request_id.as_str().len()).prefix(b"sro:").str(request_id.as_str()).build()
    }

    /// Queue order key: creation time then id.
    fn key_vote(record: &VoteRecord) -> Vec<u8> {
        let nanos = record.created_at.timestamp_nanos_opt().map(|n| n.max(0) as u64).unwrap_or_default();
        KeyBuilder::with_capacity(5 + 8 + 16).prefix(b"vote:").u64_be(nanos).bytes(record.id.as_bytes()).build()
    }

    fn key_vote_index(vote_id: &VoteId) -> Vec<u8> {
        KeyBuilder::with_capacity(5 + 16).prefix(b"vidx:").bytes(vote_id.as_bytes()).build()
    }
}

impl RocksStorage {
    pub fn compact(&self) -> Result<(), SkusError> {
        debug!("rocksdb compact_range start");
        self.db.compact_range(None::<&[u8]>, None::<&[u8]>);
        debug!("rocksdb compact_range complete");
        Ok(())
    }
}
