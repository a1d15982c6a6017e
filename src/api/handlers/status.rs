use axum::extract::{ConnectInfo, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::api::client_ip::resolve_caller;
use crate::api::response::{ApiError, JSend};
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct AllocatedIdResponse {
    pub allocated_at: String,
    pub caller: String,
    pub id: u64,
}

#[derive(Debug, Serialize)]
pub struct AllocationStatusResponse {
    pub allocated_ids: Vec<AllocatedIdResponse>,
    pub allocated_ids_count: u64,
    pub available_ids: u64,
    pub client_allocated_id: Option<u64>,
    pub disabled_ids: u64,
    pub total_pool_ids: u64,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// Pool overview plus the calling client's own allocation.
/// Expired allocations are swept first so the numbers are current.
pub async fn get_status(
    State(state): State<Arc<AppState>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
) -> Result<Json<JSend<AllocationStatusResponse>>, ApiError> {
    state.db.cleanup_expired()?;

    let caller = resolve_caller(
        &headers,
        connect_info.map(|ConnectInfo(addr)| addr),
        state.config.node.server_ip.as_deref(),
    );

    let client_allocated_id = state
        .db
        .get_allocation_by_caller(&caller)?
        .map(|allocation| allocation.id);

    let allocated_ids = state
        .db
        .list_allocations()?
        .into_iter()
        .map(|allocation| AllocatedIdResponse {
            allocated_at: allocation.allocated_at.to_rfc3339(),
            caller: allocation.caller,
            id: allocation.id,
        })
        .collect();

    let stats = state.db.pool_stats()?;

    Ok(JSend::success(AllocationStatusResponse {
        allocated_ids,
        allocated_ids_count: stats.allocated,
        available_ids: stats.available,
        client_allocated_id,
        disabled_ids: stats.disabled,
        total_pool_ids: stats.total,
    }))
}

pub async fn health() -> Json<JSend<HealthResponse>> {
    JSend::success(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
