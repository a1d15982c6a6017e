use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::tokens::admin;
use crate::AppState;

/// Start the background expiration cleaner task
pub fn start_expiration_cleaner(state: Arc<AppState>) -> JoinHandle<()> {
    let interval = Duration::from_secs(state.config.sweeper.cleanup_interval_seconds);

    tokio::spawn(async move {
        let mut interval_timer = tokio::time::interval(interval);

        loop {
            interval_timer.tick().await;
            run_cleanup(&state).await;
        }
    })
}

/// One sweep: expired allocations, then idle admin sessions
pub async fn run_cleanup(state: &AppState) {
    debug!("Running expiration cleanup");

    let db = state.db.clone();
    let session_ttl = state.config.admin.session_ttl_seconds;
    let result = tokio::task::spawn_blocking(move || {
        let allocations = db.cleanup_expired();
        let sessions = admin::cleanup_stale(&db, session_ttl);
        (allocations, sessions)
    })
    .await;

    let (allocation_result, session_result) = match result {
        Ok(results) => results,
        Err(e) => {
            error!(error = %e, "Expiration cleanup task panicked");
            return;
        }
    };

    match allocation_result {
        Ok(count) if count > 0 => debug!(allocations_released = count, "Expired allocations released"),
        Err(e) => error!(error = %e, "Failed to release expired allocations"),
        _ => {}
    }

    match session_result {
        Ok(count) if count > 0 => debug!(sessions_cleaned = count, "Stale admin sessions cleaned"),
        Err(e) => error!(error = %e, "Failed to clean up stale admin sessions"),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::models::AdminSession;
    use crate::testutil::{setup_db, test_state};
    use chrono::{Local, Utc};

    #[tokio::test]
    async fn test_run_cleanup_sweeps_allocations_and_sessions() {
        let (db, _temp) = setup_db();
        db.import_ids(&[1, 2]).unwrap();
        let yesterday = Local::now() - chrono::Duration::days(1);
        db.allocate_at("stale-caller", false, yesterday).unwrap();
        db.allocate("live-caller", false).unwrap();
        db.put_admin_session(&AdminSession {
            created_at: Utc::now() - chrono::Duration::days(3),
            last_activity_at: Utc::now() - chrono::Duration::days(3),
            token: "idle".to_string(),
        })
        .unwrap();

        let state = test_state(db);
        run_cleanup(&state).await;

        assert!(state
            .db
            .get_allocation_by_caller("stale-caller")
            .unwrap()
            .is_none());
        assert!(state
            .db
            .get_allocation_by_caller("live-caller")
            .unwrap()
            .is_some());
        assert!(state.db.get_admin_session("idle").unwrap().is_none());
    }
}
