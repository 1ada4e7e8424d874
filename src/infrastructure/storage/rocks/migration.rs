use super::schema::*;
use crate::foundation::SkusError;
use rocksdb::{ColumnFamilyDescriptor, Options as RocksOptions, DB};
use std::path::Path;

pub fn open_db_with_cfs(path: impl AsRef<Path>) -> Result<DB, SkusError> {
    let mut options = RocksOptions::default();
    options.create_if_missing(true);
    options.create_missing_column_families(true);
    options.set_use_fsync(true);
    options.set_manual_wal_flush(false);
    options.set_paranoid_checks(true);
    options.optimize_for_point_lookup(64);

    let cfs = [
        CF_DEFAULT,
        CF_METADATA,
        CF_ORDER,
        CF_ORDER_EXT_INDEX,
        CF_ISSUER,
        CF_ISSUER_PK_INDEX,
        CF_ORDER_CREDS,
        CF_TLV2_CREDS,
        CF_OUTBOX,
        CF_VOTE,
        CF_VOTE_INDEX,
        CF_VOTE_PENDING,
    ]
    .into_iter()
    .map(|name| ColumnFamilyDescriptor::new(name, RocksOptions::default()))
    .collect::<Vec<_>>();

    DB::open_cf_descriptors(&options, path, cfs)
        .map_err(|err| SkusError::StorageError { operation: "rocksdb open_cf_descriptors".to_string(), details: err.to_string() })
}
