use chrono::{DateTime, Duration, TimeZone, Utc};
use redb::{Database as RedbDatabase, ReadTransaction, WriteTransaction};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use super::tables::*;

const DB_FILE_NAME: &str = "id-allocator.redb";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),
    #[error("Decode error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
    #[error("Encode error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Database error: {0}")]
    Redb(#[from] redb::Error),
    #[error("Database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),
    #[error("Storage error: {0}")]
    Storage(#[from] redb::StorageError),
    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),
    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("ID {0} already exists")]
    AlreadyExists(u64),
    #[error("ID {0} is currently in use")]
    InUse(u64),
    #[error("ID {0} is not allocated or already released")]
    NotAllocated(u64),
    #[error("{0} does not exist")]
    NotFound(String),
    #[error("No available ID found in the pool")]
    PoolExhausted,
    #[error("{0}")]
    Validation(String),
}

impl StoreError {
    /// True for failures of the database itself rather than a rejected operation.
    pub fn is_internal(&self) -> bool {
        !matches!(
            self,
            StoreError::AlreadyExists(_)
                | StoreError::InUse(_)
                | StoreError::NotAllocated(_)
                | StoreError::NotFound(_)
                | StoreError::PoolExhausted
                | StoreError::Validation(_)
        )
    }

    pub(crate) fn id_not_found(id: u64) -> Self {
        StoreError::NotFound(format!("ID {id}"))
    }
}

/// Handle to the embedded store. Cheap to clone; all clones share one file.
#[derive(Clone)]
pub struct Database {
    db: Arc<RedbDatabase>,
}

impl Database {
    /// Open or create a database at the given path
    pub fn open<P: AsRef<Path>>(data_dir: P) -> Result<Self, StoreError> {
        std::fs::create_dir_all(data_dir.as_ref())?;
        let db_path = data_dir.as_ref().join(DB_FILE_NAME);
        let db = RedbDatabase::create(db_path)?;

        // Initialize tables
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(POOL)?;
            let _ = write_txn.open_table(ALLOCATIONS)?;
            let _ = write_txn.open_table(CALLER_ALLOCATIONS)?;
            let _ = write_txn.open_table(ALLOCATION_EXPIRY)?;
            let _ = write_txn.open_table(CREDENTIALS)?;
            let _ = write_txn.open_table(ADMIN_SESSIONS)?;
            let _ = write_txn.open_table(QUOTES)?;
            let _ = write_txn.open_table(QUOTE_TEXTS)?;
            let _ = write_txn.open_table(SETTINGS)?;
        }
        write_txn.commit()?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Begin a read transaction
    pub fn begin_read(&self) -> Result<ReadTransaction, StoreError> {
        Ok(self.db.begin_read()?)
    }

    /// Begin a write transaction
    pub fn begin_write(&self) -> Result<WriteTransaction, StoreError> {
        Ok(self.db.begin_write()?)
    }
}

pub(crate) fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    Ok(rmp_serde::to_vec_named(value)?)
}

pub(crate) fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
    Ok(rmp_serde::from_slice(bytes)?)
}

/// Build an expiration index key. Zero-padded millis keep lexicographic
/// order equal to chronological order.
pub(crate) fn expiry_key(expires_at: &DateTime<Utc>, id: u64) -> String {
    format!("{:020}:{id}", expires_at.timestamp_millis().max(0))
}

/// Extract the expiry millis from an expiration index key
pub(crate) fn expiry_key_ms(key: &str) -> Option<i64> {
    key.split_once(':')?.0.parse().ok()
}

/// Last millisecond of the calendar day `now` falls on, in `now`'s timezone.
pub fn end_of_day<Tz: TimeZone>(now: &DateTime<Tz>) -> DateTime<Utc> {
    let tz = now.timezone();
    now.date_naive()
        .and_hms_milli_opt(23, 59, 59, 999)
        .and_then(|naive| tz.from_local_datetime(&naive).latest())
        .map(|dt| dt.with_timezone(&Utc))
        // The day's last instant does not exist locally (DST gap); fall back to a day's lease
        .unwrap_or_else(|| now.with_timezone(&Utc) + Duration::days(1))
}
