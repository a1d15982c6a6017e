use chrono::{Duration, Utc};
use thiserror::Error;

use crate::storage::models::AdminSession;
use crate::storage::{Database, StoreError};

use super::generator::generate_token;

/// Ten years; keeps the idle cutoff representable
const MAX_SESSION_TTL_SECONDS: u64 = 10 * 365 * 24 * 60 * 60;

#[derive(Debug, Error)]
pub enum AdminError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Admin authentication required")]
    AuthenticationRequired,
    #[error("Invalid password")]
    InvalidPassword,
}

/// Plaintext comparison against the stored admin password
pub fn verify_password(db: &Database, candidate: &str) -> Result<bool, AdminError> {
    Ok(db
        .admin_password()?
        .is_some_and(|password| password == candidate))
}

/// Check the password and open a new admin session
pub fn login(db: &Database, password: &str) -> Result<AdminSession, AdminError> {
    if !verify_password(db, password)? {
        tracing::warn!("Admin login rejected");
        return Err(AdminError::InvalidPassword);
    }
    create_session(db)
}

/// Create a new admin session
pub fn create_session(db: &Database) -> Result<AdminSession, AdminError> {
    let now = Utc::now();
    let session = AdminSession {
        created_at: now,
        last_activity_at: now,
        token: generate_token(),
    };

    db.put_admin_session(&session)?;
    tracing::info!("Created admin session");

    Ok(session)
}

/// Check a session token, refreshing its activity time when valid
pub fn verify_session(db: &Database, token: &str) -> Result<bool, AdminError> {
    if token.is_empty() {
        return Ok(false);
    }
    Ok(db.touch_admin_session(token, Utc::now())?)
}

/// Gate for admin-only operations
pub fn require_session(db: &Database, token: Option<&str>) -> Result<(), AdminError> {
    match token {
        Some(token) if verify_session(db, token)? => Ok(()),
        _ => Err(AdminError::AuthenticationRequired),
    }
}

/// Delete an admin session
pub fn logout(db: &Database, token: &str) -> Result<bool, AdminError> {
    let deleted = db.delete_admin_session(token)?;
    if deleted {
        tracing::debug!("Deleted admin session");
    }
    Ok(deleted)
}

/// Replace the admin password. Fails with `InvalidPassword` when `old` is wrong.
pub fn change_password(db: &Database, old: &str, new: &str) -> Result<(), AdminError> {
    if new.is_empty() {
        return Err(StoreError::Validation("New password must not be empty".to_string()).into());
    }
    if !db.replace_admin_password(old, new)? {
        return Err(AdminError::InvalidPassword);
    }
    Ok(())
}

/// Delete sessions idle for longer than `ttl_seconds` (called by background task)
pub fn cleanup_stale(db: &Database, ttl_seconds: u64) -> Result<usize, AdminError> {
    let ttl = Duration::seconds(ttl_seconds.min(MAX_SESSION_TTL_SECONDS) as i64);
    let cleaned = db.delete_idle_admin_sessions(Utc::now() - ttl)?;

    if cleaned > 0 {
        tracing::info!(count = cleaned, "Cleaned up stale admin sessions");
    }

    Ok(cleaned)
}
