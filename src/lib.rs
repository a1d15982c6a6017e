//! id-allocator - A small service that hands out unique IDs from a finite pool
//!
//! This crate provides:
//! - One allocation per caller, expiring at the end of the calendar day
//! - Admin-only pool management behind a password and opaque session tokens
//! - A motivational quote list with popup timing settings
//! - Active expiration via a background task
//! - redb embedded database (ACID, MVCC, crash-safe)
//! - JSON API

pub mod api;
pub mod config;
pub mod expiration;
pub mod storage;
#[cfg(test)]
pub mod testutil;
pub mod tokens;

use config::Config;
use storage::Database;

/// Shared application state
pub struct AppState {
    pub config: Config,
    pub db: Database,
}
