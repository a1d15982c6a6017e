use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a pool entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdStatus {
    Allocated,
    Available,
    Disabled,
}

impl IdStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdStatus::Allocated => "allocated",
            IdStatus::Available => "available",
            IdStatus::Disabled => "disabled",
        }
    }
}

impl fmt::Display for IdStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IdStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "allocated" => Ok(IdStatus::Allocated),
            "available" => Ok(IdStatus::Available),
            "disabled" => Ok(IdStatus::Disabled),
            other => Err(format!("unknown status '{other}'")),
        }
    }
}

/// One issuable ID in the pool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolEntry {
    pub created_at: DateTime<Utc>,
    pub id: u64,
    pub status: IdStatus,
    pub updated_at: DateTime<Utc>,
}

impl PoolEntry {
    pub fn new(id: u64, now: DateTime<Utc>) -> Self {
        Self {
            created_at: now,
            id,
            status: IdStatus::Available,
            updated_at: now,
        }
    }
}

/// An active grant of a pool entry to a caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Allocation {
    pub allocated_at: DateTime<Utc>,
    /// Caller identity (usually a network address), unique across allocations
    pub caller: String,
    /// End of the calendar day the allocation was made on
    pub expires_at: DateTime<Utc>,
    pub id: u64,
    /// Opaque token identifying this allocation instance (32-byte hex)
    pub session_token: String,
}

impl Allocation {
    /// Expiry is inclusive: an allocation is expired at its `expires_at`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Result of an allocate call
#[derive(Debug, Clone, Serialize)]
pub struct AllocationGrant {
    pub allocation: Allocation,
    /// True when the caller already held this allocation and nothing changed
    pub existing: bool,
}

/// A pool entry joined with its active allocation, if any
#[derive(Debug, Clone, Serialize)]
pub struct PoolEntryDetail {
    pub allocated_at: Option<DateTime<Utc>>,
    pub caller: Option<String>,
    pub created_at: DateTime<Utc>,
    pub id: u64,
    pub status: IdStatus,
    pub updated_at: DateTime<Utc>,
}

/// Pool counters. `allocated` counts allocation records, not entry statuses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    pub allocated: u64,
    pub available: u64,
    pub disabled: u64,
    pub total: u64,
}

/// Operation applied by a batch update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchOperation {
    Delete,
    Disable,
    Enable,
}

/// Partial-success summary for batch imports and updates
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchReport {
    pub errors: Vec<String>,
    pub failed_count: u64,
    pub success_count: u64,
}

impl BatchReport {
    pub fn succeeded(&mut self) {
        self.success_count += 1;
    }

    pub fn failed(&mut self, error: impl Into<String>) {
        self.failed_count += 1;
        self.errors.push(error.into());
    }
}

/// An admin session created by a successful login
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminSession {
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    /// Opaque secret token (32-byte hex), sent back in `x-admin-session`
    pub token: String,
}

/// A motivational quote shown by the popup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    pub created_at: DateTime<Utc>,
    pub id: u64,
    pub quote: String,
    pub source: String,
}
