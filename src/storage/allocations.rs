use chrono::{DateTime, Local, TimeZone, Utc};
use rand::seq::SliceRandom;
use redb::{ReadableTable, Table, WriteTransaction};

use super::db::{decode, encode, end_of_day, expiry_key, expiry_key_ms, Database, StoreError};
use super::models::{Allocation, AllocationGrant, IdStatus, PoolEntry};
use super::tables::*;
use crate::tokens::generator::generate_token;

/// The four tables an allocation touches, opened inside one write transaction.
///
/// `attach` and `detach` are the only code paths that create or remove an
/// allocation, and they always update the pool entry status, the caller index
/// and the expiration index together.
pub(super) struct AllocationTables<'txn> {
    pub(super) allocations: Table<'txn, u64, &'static [u8]>,
    pub(super) callers: Table<'txn, &'static str, u64>,
    pub(super) expiry: Table<'txn, &'static str, u64>,
    pub(super) pool: Table<'txn, u64, &'static [u8]>,
}

impl<'txn> AllocationTables<'txn> {
    pub(super) fn open(txn: &'txn WriteTransaction) -> Result<Self, StoreError> {
        Ok(Self {
            allocations: txn.open_table(ALLOCATIONS)?,
            callers: txn.open_table(CALLER_ALLOCATIONS)?,
            expiry: txn.open_table(ALLOCATION_EXPIRY)?,
            pool: txn.open_table(POOL)?,
        })
    }

    pub(super) fn allocation(&self, id: u64) -> Result<Option<Allocation>, StoreError> {
        match self.allocations.get(id)? {
            Some(data) => Ok(Some(decode(data.value())?)),
            None => Ok(None),
        }
    }

    fn allocation_for_caller(&self, caller: &str) -> Result<Option<Allocation>, StoreError> {
        let id = match self.callers.get(caller)? {
            Some(id) => id.value(),
            None => return Ok(None),
        };
        self.allocation(id)
    }

    pub(super) fn pool_entry(&self, id: u64) -> Result<Option<PoolEntry>, StoreError> {
        match self.pool.get(id)? {
            Some(data) => Ok(Some(decode(data.value())?)),
            None => Ok(None),
        }
    }

    pub(super) fn put_pool_entry(&mut self, entry: &PoolEntry) -> Result<(), StoreError> {
        let data = encode(entry)?;
        self.pool.insert(entry.id, data.as_slice())?;
        Ok(())
    }

    fn set_status(
        &mut self,
        id: u64,
        status: IdStatus,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut entry = self
            .pool_entry(id)?
            .ok_or_else(|| StoreError::id_not_found(id))?;
        entry.status = status;
        entry.updated_at = now;
        self.put_pool_entry(&entry)
    }

    /// Entries that are `available` and have no allocation record.
    fn available_ids(&self) -> Result<Vec<u64>, StoreError> {
        let mut ids = Vec::new();
        for entry in self.pool.iter()? {
            let (key, value) = entry?;
            let pool_entry: PoolEntry = decode(value.value())?;
            if pool_entry.status == IdStatus::Available
                && self.allocations.get(key.value())?.is_none()
            {
                ids.push(key.value());
            }
        }
        Ok(ids)
    }

    fn all_allocations(&self) -> Result<Vec<Allocation>, StoreError> {
        let mut allocations = Vec::new();
        for entry in self.allocations.iter()? {
            let (_, value) = entry?;
            allocations.push(decode(value.value())?);
        }
        Ok(allocations)
    }

    fn attach(&mut self, allocation: &Allocation) -> Result<(), StoreError> {
        self.set_status(allocation.id, IdStatus::Allocated, allocation.allocated_at)?;

        let data = encode(allocation)?;
        self.allocations.insert(allocation.id, data.as_slice())?;
        self.callers
            .insert(allocation.caller.as_str(), allocation.id)?;

        let ek = expiry_key(&allocation.expires_at, allocation.id);
        self.expiry.insert(ek.as_str(), allocation.id)?;
        Ok(())
    }

    /// Remove an allocation and return its pool entry to `available`, whatever
    /// status an admin gave it while it was allocated.
    fn detach(&mut self, allocation: &Allocation, now: DateTime<Utc>) -> Result<(), StoreError> {
        self.allocations.remove(allocation.id)?;

        let indexed_id = self
            .callers
            .get(allocation.caller.as_str())?
            .map(|v| v.value());
        if indexed_id == Some(allocation.id) {
            self.callers.remove(allocation.caller.as_str())?;
        }

        let ek = expiry_key(&allocation.expires_at, allocation.id);
        self.expiry.remove(ek.as_str())?;

        if self.pool_entry(allocation.id)?.is_some() {
            self.set_status(allocation.id, IdStatus::Available, now)?;
        }
        Ok(())
    }
}

impl Database {
    // ========================================================================
    // Allocation operations
    // ========================================================================

    /// Grant an ID to `caller`, or return the one it already holds.
    ///
    /// With `force_new`, the caller's current allocation is released first and
    /// a different ID is preferred. Everything happens in one transaction, so a
    /// `PoolExhausted` failure leaves the previous allocation in place.
    pub fn allocate(&self, caller: &str, force_new: bool) -> Result<AllocationGrant, StoreError> {
        self.allocate_at(caller, force_new, Local::now())
    }

    /// [`Database::allocate`] with an explicit clock; the allocation expires at
    /// the end of `now`'s calendar day in `now`'s timezone.
    pub fn allocate_at<Tz: TimeZone>(
        &self,
        caller: &str,
        force_new: bool,
        now: DateTime<Tz>,
    ) -> Result<AllocationGrant, StoreError> {
        debug_assert!(!caller.is_empty(), "caller identity must not be empty");

        let allocated_at = now.with_timezone(&Utc);
        let expires_at = end_of_day(&now);

        let write_txn = self.begin_write()?;
        let grant = {
            let mut tables = AllocationTables::open(&write_txn)?;

            let mut released = None;
            if let Some(current) = tables.allocation_for_caller(caller)? {
                if !force_new {
                    return Ok(AllocationGrant {
                        allocation: current,
                        existing: true,
                    });
                }
                tables.detach(&current, allocated_at)?;
                released = Some(current.id);
            }

            let candidates = tables.available_ids()?;
            let fresh: Vec<u64> = candidates
                .iter()
                .copied()
                .filter(|id| Some(*id) != released)
                .collect();
            let id = fresh
                .choose(&mut rand::thread_rng())
                .or_else(|| candidates.first())
                .copied()
                .ok_or(StoreError::PoolExhausted)?;

            let allocation = Allocation {
                allocated_at,
                caller: caller.to_string(),
                expires_at,
                id,
                session_token: generate_token(),
            };
            tables.attach(&allocation)?;

            AllocationGrant {
                allocation,
                existing: false,
            }
        };
        write_txn.commit()?;

        tracing::info!(
            id = grant.allocation.id,
            caller = %caller,
            expires_at = %grant.allocation.expires_at,
            "Allocated ID"
        );
        Ok(grant)
    }

    /// Release an allocated ID back to the pool
    pub fn release(&self, id: u64) -> Result<Allocation, StoreError> {
        let now = Utc::now();
        let write_txn = self.begin_write()?;
        let allocation = {
            let mut tables = AllocationTables::open(&write_txn)?;
            let allocation = tables
                .allocation(id)?
                .ok_or(StoreError::NotAllocated(id))?;
            tables.detach(&allocation, now)?;
            allocation
        };
        write_txn.commit()?;

        tracing::info!(id, caller = %allocation.caller, "Released ID");
        Ok(allocation)
    }

    /// Release every allocation whose expiry has passed.
    pub fn cleanup_expired(&self) -> Result<usize, StoreError> {
        self.cleanup_expired_at(Utc::now())
    }

    /// Sweep the expiration index up to `now` (inclusive), in one transaction.
    pub fn cleanup_expired_at(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let now_ms = now.timestamp_millis();

        let write_txn = self.begin_write()?;
        let cleaned = {
            let mut tables = AllocationTables::open(&write_txn)?;

            let expired: Vec<(String, u64)> = {
                let mut result = Vec::new();
                for entry in tables.expiry.iter()? {
                    let (key, value) = entry?;
                    let key_str = key.value().to_string();
                    match expiry_key_ms(&key_str) {
                        Some(ms) if ms <= now_ms => result.push((key_str, value.value())),
                        _ => break,
                    }
                }
                result
            };

            if expired.is_empty() {
                return Ok(0);
            }

            let mut cleaned = 0;
            for (key, id) in &expired {
                match tables.allocation(*id)? {
                    Some(allocation) if allocation.is_expired_at(now) => {
                        tables.detach(&allocation, now)?;
                        cleaned += 1;
                    }
                    // Stale index key: the record is gone or now expires later
                    _ => {
                        tables.expiry.remove(key.as_str())?;
                    }
                }
            }
            cleaned
        };
        write_txn.commit()?;

        if cleaned > 0 {
            tracing::info!(count = cleaned, "Released expired allocations");
        }
        Ok(cleaned)
    }

    /// Release every active allocation
    pub fn clear_all_allocations(&self) -> Result<usize, StoreError> {
        let now = Utc::now();
        let write_txn = self.begin_write()?;
        let cleared = {
            let mut tables = AllocationTables::open(&write_txn)?;
            let allocations = tables.all_allocations()?;
            for allocation in &allocations {
                tables.detach(allocation, now)?;
            }
            allocations.len()
        };
        write_txn.commit()?;

        tracing::warn!(count = cleared, "Cleared all allocations");
        Ok(cleared)
    }

    /// Get the active allocation for an ID
    pub fn get_allocation(&self, id: u64) -> Result<Option<Allocation>, StoreError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(ALLOCATIONS)?;

        match table.get(id)? {
            Some(data) => Ok(Some(decode(data.value())?)),
            None => Ok(None),
        }
    }

    /// Get the active allocation held by a caller
    pub fn get_allocation_by_caller(&self, caller: &str) -> Result<Option<Allocation>, StoreError> {
        let read_txn = self.begin_read()?;
        let index_table = read_txn.open_table(CALLER_ALLOCATIONS)?;
        let allocations_table = read_txn.open_table(ALLOCATIONS)?;

        let id = match index_table.get(caller)? {
            Some(id) => id.value(),
            None => return Ok(None),
        };

        match allocations_table.get(id)? {
            Some(data) => Ok(Some(decode(data.value())?)),
            None => Ok(None),
        }
    }

    /// All active allocations, ordered by ID
    pub fn list_allocations(&self) -> Result<Vec<Allocation>, StoreError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(ALLOCATIONS)?;

        let mut allocations = Vec::new();
        for result in table.iter()? {
            let (_, value) = result?;
            allocations.push(decode(value.value())?);
        }

        Ok(allocations)
    }
}
