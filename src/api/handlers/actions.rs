use axum::body::Bytes;
use axum::extract::{ConnectInfo, State};
use axum::http::{header, HeaderMap};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::api::client_ip::resolve_caller;
use crate::api::response::{ApiError, JSend};
use crate::storage::models::{BatchOperation, IdStatus, Quote};
use crate::tokens::{admin, AdminError};
use crate::AppState;

/// Header carrying the admin session token
pub const ADMIN_SESSION_HEADER: &str = "x-admin-session";

// ============================================================================
// Types
// ============================================================================

/// Every action the POST endpoint understands, selected by the `action` field
#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Action {
    // Public
    Allocate {
        #[serde(default)]
        force_new_allocation: bool,
    },
    Release {
        id: u64,
    },
    AdminLogin {
        password: String,
    },
    VerifySession,
    Logout,
    GetPoolStats,
    GetRandomQuote,
    GetQuoteInterval,
    GetFadeOutDelay,

    // Admin only
    ClearAll,
    ChangePassword {
        old_password: String,
        new_password: String,
    },
    GetAllIds,
    AddId {
        id: u64,
    },
    DeleteId {
        id: u64,
    },
    UpdateIdStatus {
        id: u64,
        status: IdStatus,
    },
    BatchUpdate {
        ids: Vec<u64>,
        operation: BatchOperation,
    },
    SearchIds {
        #[serde(default)]
        query: String,
        #[serde(default)]
        status: Option<String>,
    },
    ImportQuotes {
        text: String,
    },
    GetAllQuotes,
    DeleteQuote {
        id: u64,
    },
    SetQuoteInterval {
        interval: i64,
    },
    SetFadeOutDelay {
        delay: i64,
    },
}

impl Action {
    pub fn requires_admin(&self) -> bool {
        match self {
            Action::Allocate { .. }
            | Action::Release { .. }
            | Action::AdminLogin { .. }
            | Action::VerifySession
            | Action::Logout
            | Action::GetPoolStats
            | Action::GetRandomQuote
            | Action::GetQuoteInterval
            | Action::GetFadeOutDelay => false,
            Action::ClearAll
            | Action::ChangePassword { .. }
            | Action::GetAllIds
            | Action::AddId { .. }
            | Action::DeleteId { .. }
            | Action::UpdateIdStatus { .. }
            | Action::BatchUpdate { .. }
            | Action::SearchIds { .. }
            | Action::ImportQuotes { .. }
            | Action::GetAllQuotes
            | Action::DeleteQuote { .. }
            | Action::SetQuoteInterval { .. }
            | Action::SetFadeOutDelay { .. } => true,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AllocateResponse {
    pub allocated_at: String,
    pub caller: String,
    pub existing: bool,
    pub expires_at: String,
    pub id: u64,
    pub session_token: String,
}

#[derive(Debug, Serialize)]
pub struct IdResponse {
    pub id: u64,
}

#[derive(Debug, Serialize)]
pub struct IdStatusResponse {
    pub id: u64,
    pub status: IdStatus,
}

#[derive(Debug, Serialize)]
pub struct ClearAllResponse {
    pub cleared_count: usize,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub session_token: String,
}

#[derive(Debug, Serialize)]
pub struct SessionValidityResponse {
    pub valid: bool,
}

#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    pub logged_out: bool,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct RandomQuoteResponse {
    pub quote: Option<Quote>,
}

#[derive(Debug, Serialize)]
pub struct QuoteIntervalResponse {
    pub interval: u64,
}

#[derive(Debug, Serialize)]
pub struct FadeOutDelayResponse {
    pub delay: u64,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub errors: Vec<String>,
    pub failed_count: u64,
    pub total_pool_ids: u64,
    pub uploaded_count: u64,
}

// ============================================================================
// Handlers
// ============================================================================

/// Multiplexed action endpoint. A `text/plain` body is a bulk ID upload;
/// anything else must be a JSON action object.
pub async fn post_action(
    State(state): State<Arc<AppState>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    if is_plain_text(&headers) {
        return upload_ids(&state, &body);
    }

    let action: Action = serde_json::from_slice(&body)
        .map_err(|e| ApiError::bad_request(format!("Invalid action: {e}")))?;

    let session_token = headers
        .get(ADMIN_SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty());

    if action.requires_admin() {
        admin::require_session(&state.db, session_token)?;
    }

    let caller = || {
        resolve_caller(
            &headers,
            connect_info.map(|ConnectInfo(addr)| addr),
            state.config.node.server_ip.as_deref(),
        )
    };

    let db = &state.db;
    let response = match action {
        Action::Allocate {
            force_new_allocation,
        } => {
            let grant = db.allocate(&caller(), force_new_allocation)?;
            let allocation = grant.allocation;
            ok(AllocateResponse {
                allocated_at: allocation.allocated_at.to_rfc3339(),
                caller: allocation.caller,
                existing: grant.existing,
                expires_at: allocation.expires_at.to_rfc3339(),
                id: allocation.id,
                session_token: allocation.session_token,
            })
        }
        Action::Release { id } => {
            db.release(id)?;
            ok(IdResponse { id })
        }
        Action::AdminLogin { password } => {
            let session = admin::login(db, &password)?;
            ok(LoginResponse {
                session_token: session.token,
            })
        }
        Action::VerifySession => {
            let valid = match session_token {
                Some(token) => admin::verify_session(db, token)?,
                None => false,
            };
            ok(SessionValidityResponse { valid })
        }
        Action::Logout => {
            let logged_out = match session_token {
                Some(token) => admin::logout(db, token)?,
                None => false,
            };
            ok(LogoutResponse { logged_out })
        }
        Action::GetPoolStats => ok(db.pool_stats()?),
        Action::GetRandomQuote => ok(RandomQuoteResponse {
            quote: db.random_quote()?,
        }),
        Action::GetQuoteInterval => ok(QuoteIntervalResponse {
            interval: db.quote_interval()?,
        }),
        Action::GetFadeOutDelay => ok(FadeOutDelayResponse {
            delay: db.fade_out_delay()?,
        }),

        Action::ClearAll => ok(ClearAllResponse {
            cleared_count: db.clear_all_allocations()?,
        }),
        Action::ChangePassword {
            old_password,
            new_password,
        } => match admin::change_password(db, &old_password, &new_password) {
            Ok(()) => ok(MessageResponse {
                message: "Password changed".to_string(),
            }),
            Err(AdminError::InvalidPassword) => {
                return Err(ApiError::bad_request("Old password is incorrect"));
            }
            Err(e) => return Err(e.into()),
        },
        Action::GetAllIds => ok(db.list_ids()?),
        Action::AddId { id } => {
            db.add_id(id)?;
            ok(IdResponse { id })
        }
        Action::DeleteId { id } => {
            db.delete_id(id)?;
            ok(IdResponse { id })
        }
        Action::UpdateIdStatus { id, status } => {
            let entry = db.set_status(id, status)?;
            ok(IdStatusResponse {
                id: entry.id,
                status: entry.status,
            })
        }
        Action::BatchUpdate { ids, operation } => ok(db.batch_update(&ids, operation)?),
        Action::SearchIds { query, status } => {
            let status = parse_status_filter(status.as_deref())?;
            ok(db.search_ids(&query, status)?)
        }
        Action::ImportQuotes { text } => ok(db.import_quotes(&text)?),
        Action::GetAllQuotes => ok(db.list_quotes()?),
        Action::DeleteQuote { id } => {
            db.delete_quote(id)?;
            ok(IdResponse { id })
        }
        Action::SetQuoteInterval { interval } => ok(QuoteIntervalResponse {
            interval: db.set_quote_interval(interval)?,
        }),
        Action::SetFadeOutDelay { delay } => ok(FadeOutDelayResponse {
            delay: db.set_fade_out_delay(delay)?,
        }),
    };

    Ok(response)
}

fn ok<T: Serialize>(data: T) -> Response {
    JSend::success(data).into_response()
}

fn is_plain_text(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("text/plain"))
}

/// `None`, empty and `all` mean no filter
fn parse_status_filter(status: Option<&str>) -> Result<Option<IdStatus>, ApiError> {
    match status.map(str::trim) {
        None | Some("") | Some("all") => Ok(None),
        Some(s) => s.parse().map(Some).map_err(ApiError::bad_request),
    }
}

/// Ids from an uploaded text file: one per line, unparsable lines skipped
fn parse_id_lines(text: &str) -> BTreeSet<u64> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| line.parse().ok())
        .collect()
}

fn upload_ids(state: &AppState, body: &[u8]) -> Result<Response, ApiError> {
    let text = String::from_utf8_lossy(body);
    let ids: Vec<u64> = parse_id_lines(&text).into_iter().collect();
    if ids.is_empty() {
        return Err(ApiError::bad_request("No valid IDs found in the file"));
    }

    let report = state.db.import_ids(&ids)?;
    let total_pool_ids = state.db.pool_stats()?.total;

    Ok(ok(UploadResponse {
        errors: report.errors,
        failed_count: report.failed_count,
        total_pool_ids,
        uploaded_count: report.success_count,
    }))
}
