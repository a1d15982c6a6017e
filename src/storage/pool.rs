use chrono::{DateTime, Utc};
use redb::ReadableTable;

use super::allocations::AllocationTables;
use super::db::{decode, encode, Database, StoreError};
use super::models::{
    Allocation, BatchOperation, BatchReport, IdStatus, PoolEntry, PoolEntryDetail, PoolStats,
};
use super::tables::*;

impl AllocationTables<'_> {
    /// Checks run before any write, so a rejected id leaves the
    /// transaction untouched.
    fn remove_entry(&mut self, id: u64) -> Result<(), StoreError> {
        if self.pool_entry(id)?.is_none() {
            return Err(StoreError::id_not_found(id));
        }
        if self.allocation(id)?.is_some() {
            return Err(StoreError::InUse(id));
        }
        self.pool.remove(id)?;
        Ok(())
    }

    fn change_status(
        &mut self,
        id: u64,
        status: IdStatus,
        now: DateTime<Utc>,
    ) -> Result<PoolEntry, StoreError> {
        if status == IdStatus::Allocated {
            return Err(StoreError::Validation(
                "status must be 'available' or 'disabled'".to_string(),
            ));
        }

        let mut entry = self
            .pool_entry(id)?
            .ok_or_else(|| StoreError::id_not_found(id))?;
        if status == IdStatus::Available && self.allocation(id)?.is_some() {
            return Err(StoreError::InUse(id));
        }

        entry.status = status;
        entry.updated_at = now;
        self.put_pool_entry(&entry)?;
        Ok(entry)
    }
}

impl Database {
    // ========================================================================
    // Pool entry operations
    // ========================================================================

    /// Insert every id not already in the pool. Existing ids, including
    /// repeats within `ids`, are reported as failures without aborting.
    pub fn import_ids(&self, ids: &[u64]) -> Result<BatchReport, StoreError> {
        let now = Utc::now();
        let write_txn = self.begin_write()?;
        let report = {
            let mut table = write_txn.open_table(POOL)?;
            let mut report = BatchReport::default();

            for &id in ids {
                if table.get(id)?.is_some() {
                    report.failed(StoreError::AlreadyExists(id).to_string());
                    continue;
                }
                let data = encode(&PoolEntry::new(id, now))?;
                table.insert(id, data.as_slice())?;
                report.succeeded();
            }
            report
        };
        write_txn.commit()?;

        tracing::info!(
            imported = report.success_count,
            failed = report.failed_count,
            "Imported pool IDs"
        );
        Ok(report)
    }

    /// Add a single id to the pool
    pub fn add_id(&self, id: u64) -> Result<PoolEntry, StoreError> {
        let entry = PoolEntry::new(id, Utc::now());
        let write_txn = self.begin_write()?;
        {
            let mut table = write_txn.open_table(POOL)?;
            if table.get(id)?.is_some() {
                return Err(StoreError::AlreadyExists(id));
            }
            let data = encode(&entry)?;
            table.insert(id, data.as_slice())?;
        }
        write_txn.commit()?;

        tracing::debug!(id, "Added pool ID");
        Ok(entry)
    }

    /// Remove an id from the pool. Allocated ids cannot be removed.
    pub fn delete_id(&self, id: u64) -> Result<(), StoreError> {
        let write_txn = self.begin_write()?;
        AllocationTables::open(&write_txn)?.remove_entry(id)?;
        write_txn.commit()?;

        tracing::debug!(id, "Deleted pool ID");
        Ok(())
    }

    /// Change an entry's status.
    ///
    /// Enabling an allocated id fails with `InUse`. Disabling is always
    /// accepted, even while the id is allocated: the allocation stays active
    /// until it is released or expires, which puts the entry back to
    /// `available`.
    pub fn set_status(&self, id: u64, status: IdStatus) -> Result<PoolEntry, StoreError> {
        let write_txn = self.begin_write()?;
        let entry = AllocationTables::open(&write_txn)?.change_status(id, status, Utc::now())?;
        write_txn.commit()?;

        tracing::debug!(id, status = %status, "Updated pool ID status");
        Ok(entry)
    }

    /// Apply one operation to each id in a single transaction. Per-id
    /// failures are collected in the report; storage failures abort the batch.
    pub fn batch_update(
        &self,
        ids: &[u64],
        operation: BatchOperation,
    ) -> Result<BatchReport, StoreError> {
        let now = Utc::now();
        let write_txn = self.begin_write()?;
        let report = {
            let mut tables = AllocationTables::open(&write_txn)?;
            let mut report = BatchReport::default();

            for &id in ids {
                let result = match operation {
                    BatchOperation::Delete => tables.remove_entry(id),
                    BatchOperation::Disable => tables
                        .change_status(id, IdStatus::Disabled, now)
                        .map(|_| ()),
                    BatchOperation::Enable => tables
                        .change_status(id, IdStatus::Available, now)
                        .map(|_| ()),
                };
                match result {
                    Ok(()) => report.succeeded(),
                    Err(e) if e.is_internal() => return Err(e),
                    Err(e) => report.failed(e.to_string()),
                }
            }
            report
        };
        write_txn.commit()?;

        tracing::info!(
            operation = ?operation,
            succeeded = report.success_count,
            failed = report.failed_count,
            "Batch update finished"
        );
        Ok(report)
    }

    /// Get a pool entry by id
    pub fn get_pool_entry(&self, id: u64) -> Result<Option<PoolEntry>, StoreError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(POOL)?;

        match table.get(id)? {
            Some(data) => Ok(Some(decode(data.value())?)),
            None => Ok(None),
        }
    }

    /// Every pool entry in ascending id order, joined with its allocation
    pub fn list_ids(&self) -> Result<Vec<PoolEntryDetail>, StoreError> {
        let read_txn = self.begin_read()?;
        let pool_table = read_txn.open_table(POOL)?;
        let allocations_table = read_txn.open_table(ALLOCATIONS)?;

        let mut entries = Vec::new();
        for result in pool_table.iter()? {
            let (key, value) = result?;
            let entry: PoolEntry = decode(value.value())?;
            let allocation: Option<Allocation> = match allocations_table.get(key.value())? {
                Some(data) => Some(decode(data.value())?),
                None => None,
            };

            entries.push(PoolEntryDetail {
                allocated_at: allocation.as_ref().map(|a| a.allocated_at),
                caller: allocation.map(|a| a.caller),
                created_at: entry.created_at,
                id: entry.id,
                status: entry.status,
                updated_at: entry.updated_at,
            });
        }

        Ok(entries)
    }

    /// Entries whose decimal id contains `query`, optionally filtered by status
    pub fn search_ids(
        &self,
        query: &str,
        status: Option<IdStatus>,
    ) -> Result<Vec<PoolEntryDetail>, StoreError> {
        let query = query.trim();
        Ok(self
            .list_ids()?
            .into_iter()
            .filter(|e| e.id.to_string().contains(query))
            .filter(|e| status.map_or(true, |s| e.status == s))
            .collect())
    }

    /// Pool counters. An entry only counts as available when no allocation
    /// record references it, whatever its stored status says.
    pub fn pool_stats(&self) -> Result<PoolStats, StoreError> {
        let read_txn = self.begin_read()?;
        let pool_table = read_txn.open_table(POOL)?;
        let allocations_table = read_txn.open_table(ALLOCATIONS)?;

        let mut stats = PoolStats::default();
        for result in pool_table.iter()? {
            let (key, value) = result?;
            let entry: PoolEntry = decode(value.value())?;
            stats.total += 1;
            match entry.status {
                IdStatus::Available if allocations_table.get(key.value())?.is_none() => {
                    stats.available += 1;
                }
                IdStatus::Disabled => stats.disabled += 1,
                _ => {}
            }
        }

        for result in allocations_table.iter()? {
            result?;
            stats.allocated += 1;
        }

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::setup_db;

    #[test]
    fn test_import_ids() {
        let (db, _temp) = setup_db();

        let report = db.import_ids(&[1001, 1002, 1003]).unwrap();
        assert_eq!(report.success_count, 3);
        assert_eq!(report.failed_count, 0);
        assert!(report.errors.is_empty());
        assert_eq!(db.list_ids().unwrap().len(), 3);
    }

    #[test]
    fn test_import_skips_existing_ids() {
        let (db, _temp) = setup_db();
        db.import_ids(&[1001, 1002]).unwrap();

        let report = db.import_ids(&[1002, 1003]).unwrap();
        assert_eq!(report.success_count, 1);
        assert_eq!(report.failed_count, 1);
        assert_eq!(report.errors, vec!["ID 1002 already exists".to_string()]);
    }

    #[test]
    fn test_import_duplicate_within_one_call() {
        let (db, _temp) = setup_db();

        let report = db.import_ids(&[5, 5]).unwrap();
        assert_eq!(report.success_count, 1);
        assert_eq!(report.failed_count, 1);
        assert!(report.errors[0].contains("already exists"));
    }

    #[test]
    fn test_import_empty_slice() {
        let (db, _temp) = setup_db();
        let report = db.import_ids(&[]).unwrap();
        assert_eq!(report.success_count, 0);
        assert_eq!(report.failed_count, 0);
    }

    #[test]
    fn test_add_id_rejects_duplicate() {
        let (db, _temp) = setup_db();

        let entry = db.add_id(2001).unwrap();
        assert_eq!(entry.status, IdStatus::Available);
        assert!(matches!(db.add_id(2001), Err(StoreError::AlreadyExists(2001))));
    }

    #[test]
    fn test_delete_id() {
        let (db, _temp) = setup_db();
        db.import_ids(&[3001]).unwrap();

        db.delete_id(3001).unwrap();
        assert!(db.get_pool_entry(3001).unwrap().is_none());
        assert!(matches!(db.delete_id(3001), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_delete_allocated_id_requires_release() {
        let (db, _temp) = setup_db();
        db.import_ids(&[3002]).unwrap();
        db.allocate("10.0.0.9", false).unwrap();

        assert!(matches!(db.delete_id(3002), Err(StoreError::InUse(3002))));

        db.release(3002).unwrap();
        db.delete_id(3002).unwrap();
        assert!(db.get_pool_entry(3002).unwrap().is_none());
    }

    #[test]
    fn test_set_status_round_trip() {
        let (db, _temp) = setup_db();
        db.import_ids(&[4001]).unwrap();

        assert_eq!(
            db.set_status(4001, IdStatus::Disabled).unwrap().status,
            IdStatus::Disabled
        );
        assert_eq!(
            db.set_status(4001, IdStatus::Available).unwrap().status,
            IdStatus::Available
        );
    }

    #[test]
    fn test_set_status_unknown_id() {
        let (db, _temp) = setup_db();
        let err = db.set_status(404, IdStatus::Disabled).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
        assert_eq!(err.to_string(), "ID 404 does not exist");
    }

    #[test]
    fn test_enable_allocated_id_fails() {
        let (db, _temp) = setup_db();
        db.import_ids(&[4002]).unwrap();
        db.allocate("10.0.0.10", false).unwrap();

        assert!(matches!(
            db.set_status(4002, IdStatus::Available),
            Err(StoreError::InUse(4002))
        ));
    }

    #[test]
    fn test_disable_allocated_id_is_accepted() {
        // Asymmetric with enabling: disabling does not check for an allocation.
        let (db, _temp) = setup_db();
        db.import_ids(&[4003]).unwrap();
        db.allocate("10.0.0.11", false).unwrap();

        let entry = db.set_status(4003, IdStatus::Disabled).unwrap();
        assert_eq!(entry.status, IdStatus::Disabled);
        assert!(db.get_allocation(4003).unwrap().is_some());

        // Releasing returns the entry to the pool
        db.release(4003).unwrap();
        assert_eq!(
            db.get_pool_entry(4003).unwrap().unwrap().status,
            IdStatus::Available
        );
        assert_eq!(db.pool_stats().unwrap().disabled, 0);
    }

    #[test]
    fn test_set_status_allocated_is_rejected() {
        let (db, _temp) = setup_db();
        db.import_ids(&[4004]).unwrap();
        assert!(matches!(
            db.set_status(4004, IdStatus::Allocated),
            Err(StoreError::Validation(_))
        ));
    }

    #[test]
    fn test_batch_enable_and_disable() {
        let (db, _temp) = setup_db();
        db.import_ids(&[7001, 7002, 7003]).unwrap();

        let report = db.batch_update(&[7001, 7002], BatchOperation::Disable).unwrap();
        assert_eq!(report.success_count, 2);
        assert_eq!(
            db.get_pool_entry(7001).unwrap().unwrap().status,
            IdStatus::Disabled
        );

        let report = db.batch_update(&[7001, 7002], BatchOperation::Enable).unwrap();
        assert_eq!(report.success_count, 2);
        assert_eq!(report.failed_count, 0);
        assert_eq!(
            db.get_pool_entry(7002).unwrap().unwrap().status,
            IdStatus::Available
        );
    }

    #[test]
    fn test_batch_delete_collects_per_id_errors() {
        let (db, _temp) = setup_db();
        db.import_ids(&[7201, 7202, 7203]).unwrap();
        let allocated = db.allocate("10.0.0.12", false).unwrap().allocation.id;

        let report = db
            .batch_update(&[7201, 7202, 7203, 9999], BatchOperation::Delete)
            .unwrap();
        assert_eq!(report.success_count, 2);
        assert_eq!(report.failed_count, 2);
        assert!(report.errors.iter().any(|e| e.contains("in use")));
        assert!(report.errors.iter().any(|e| e.contains("9999")));

        let remaining: Vec<u64> = db.list_ids().unwrap().iter().map(|e| e.id).collect();
        assert_eq!(remaining, vec![allocated]);
    }

    #[test]
    fn test_batch_enable_skips_allocated_and_missing_ids() {
        let (db, _temp) = setup_db();
        db.import_ids(&[7301, 7302]).unwrap();
        let allocated = db.allocate("10.0.0.14", false).unwrap().allocation.id;
        let other = if allocated == 7301 { 7302 } else { 7301 };
        db.batch_update(&[7301, 7302], BatchOperation::Disable).unwrap();

        let report = db
            .batch_update(&[allocated, 9998, other], BatchOperation::Enable)
            .unwrap();
        assert_eq!(report.success_count, 1);
        assert_eq!(report.failed_count, 2);
        assert_eq!(
            report.errors,
            vec![
                format!("ID {allocated} is currently in use"),
                "ID 9998 does not exist".to_string(),
            ]
        );

        // The id after the failures was still applied and committed
        assert_eq!(
            db.get_pool_entry(other).unwrap().unwrap().status,
            IdStatus::Available
        );
        assert_eq!(
            db.get_pool_entry(allocated).unwrap().unwrap().status,
            IdStatus::Disabled
        );
        assert!(db.get_allocation(allocated).unwrap().is_some());
    }

    #[test]
    fn test_list_ids_joins_allocation() {
        let (db, _temp) = setup_db();
        db.import_ids(&[3, 1, 2]).unwrap();
        let id = db.allocate("10.0.0.13", false).unwrap().allocation.id;

        let entries = db.list_ids().unwrap();
        let ids: Vec<u64> = entries.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);

        let allocated = entries.iter().find(|e| e.id == id).unwrap();
        assert_eq!(allocated.caller.as_deref(), Some("10.0.0.13"));
        assert!(allocated.allocated_at.is_some());
        assert!(entries
            .iter()
            .filter(|e| e.id != id)
            .all(|e| e.caller.is_none()));
    }

    #[test]
    fn test_search_ids() {
        let (db, _temp) = setup_db();
        db.import_ids(&[6001, 6002, 6100, 7000]).unwrap();

        let ids: Vec<u64> = db
            .search_ids("60", None)
            .unwrap()
            .iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, vec![6001, 6002]);

        db.set_status(6001, IdStatus::Disabled).unwrap();
        let disabled = db.search_ids("60", Some(IdStatus::Disabled)).unwrap();
        assert_eq!(disabled.len(), 1);
        assert_eq!(disabled[0].id, 6001);

        assert!(db.search_ids("99", None).unwrap().is_empty());
    }

    #[test]
    fn test_pool_stats() {
        let (db, _temp) = setup_db();
        db.import_ids(&[9301, 9302, 9303, 9304]).unwrap();
        db.set_status(9304, IdStatus::Disabled).unwrap();
        db.allocate("192.168.1.109", false).unwrap();

        let stats = db.pool_stats().unwrap();
        assert_eq!(
            stats,
            PoolStats {
                allocated: 1,
                available: 2,
                disabled: 1,
                total: 4,
            }
        );
    }

    #[test]
    fn test_pool_stats_empty() {
        let (db, _temp) = setup_db();
        assert_eq!(db.pool_stats().unwrap(), PoolStats::default());
    }
}
