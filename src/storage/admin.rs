use chrono::{DateTime, Utc};
use redb::ReadableTable;

use super::db::{decode, encode, Database, StoreError};
use super::models::AdminSession;
use super::tables::*;

/// Credential key holding the admin login password
pub const LOGIN_PASSWORD_KEY: &str = "login_password";

impl Database {
    // ========================================================================
    // Credential operations
    // ========================================================================

    /// Store `default` as the admin password unless one is already set.
    /// Returns true when the password was seeded.
    pub fn seed_admin_password(&self, default: &str) -> Result<bool, StoreError> {
        let write_txn = self.begin_write()?;
        let seeded = {
            let mut table = write_txn.open_table(CREDENTIALS)?;
            if table.get(LOGIN_PASSWORD_KEY)?.is_some() {
                false
            } else {
                table.insert(LOGIN_PASSWORD_KEY, default)?;
                true
            }
        };
        write_txn.commit()?;

        if seeded {
            tracing::info!("Seeded default admin password");
        }
        Ok(seeded)
    }

    /// The current admin password, if one has been set
    pub fn admin_password(&self) -> Result<Option<String>, StoreError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(CREDENTIALS)?;
        Ok(table.get(LOGIN_PASSWORD_KEY)?.map(|v| v.value().to_string()))
    }

    /// Replace the admin password if `old` matches the stored one.
    /// Returns false, leaving the password untouched, on a mismatch.
    pub fn replace_admin_password(&self, old: &str, new: &str) -> Result<bool, StoreError> {
        let write_txn = self.begin_write()?;
        {
            let mut table = write_txn.open_table(CREDENTIALS)?;
            let matches = table
                .get(LOGIN_PASSWORD_KEY)?
                .is_some_and(|v| v.value() == old);
            if !matches {
                return Ok(false);
            }
            table.insert(LOGIN_PASSWORD_KEY, new)?;
        }
        write_txn.commit()?;

        tracing::info!("Admin password changed");
        Ok(true)
    }

    // ========================================================================
    // Admin session operations
    // ========================================================================

    /// Store an admin session
    pub fn put_admin_session(&self, session: &AdminSession) -> Result<(), StoreError> {
        debug_assert!(!session.token.is_empty(), "session token must not be empty");

        let write_txn = self.begin_write()?;
        {
            let mut table = write_txn.open_table(ADMIN_SESSIONS)?;
            let data = encode(session)?;
            table.insert(session.token.as_str(), data.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Get an admin session by its token
    pub fn get_admin_session(&self, token: &str) -> Result<Option<AdminSession>, StoreError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(ADMIN_SESSIONS)?;

        match table.get(token)? {
            Some(data) => Ok(Some(decode(data.value())?)),
            None => Ok(None),
        }
    }

    /// Record activity on a session. Returns false if the token is unknown.
    pub fn touch_admin_session(&self, token: &str, now: DateTime<Utc>) -> Result<bool, StoreError> {
        let write_txn = self.begin_write()?;
        {
            let mut table = write_txn.open_table(ADMIN_SESSIONS)?;
            let mut session: AdminSession = match table.get(token)? {
                Some(data) => decode(data.value())?,
                None => return Ok(false),
            };
            session.last_activity_at = now;
            let data = encode(&session)?;
            table.insert(token, data.as_slice())?;
        }
        write_txn.commit()?;
        Ok(true)
    }

    /// Delete an admin session. Returns false if it did not exist.
    pub fn delete_admin_session(&self, token: &str) -> Result<bool, StoreError> {
        let write_txn = self.begin_write()?;
        let removed = {
            let mut table = write_txn.open_table(ADMIN_SESSIONS)?;
            let removed = table.remove(token)?.is_some();
            removed
        };
        write_txn.commit()?;
        Ok(removed)
    }

    /// Delete sessions with no activity since `cutoff`. Returns how many went.
    pub fn delete_idle_admin_sessions(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        let write_txn = self.begin_write()?;
        let removed = {
            let mut table = write_txn.open_table(ADMIN_SESSIONS)?;

            let idle: Vec<String> = {
                let mut result = Vec::new();
                for entry in table.iter()? {
                    let (key, value) = entry?;
                    let session: AdminSession = decode(value.value())?;
                    if session.last_activity_at < cutoff {
                        result.push(key.value().to_string());
                    }
                }
                result
            };

            for token in &idle {
                table.remove(token.as_str())?;
            }
            idle.len()
        };
        write_txn.commit()?;

        if removed > 0 {
            tracing::debug!(count = removed, "Removed idle admin sessions");
        }
        Ok(removed)
    }
}
