//! HTTP API handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::network::StatsSnapshot;
use crate::protocol::ChannelStatus;
use crate::ui::server::AppState;

/// API response wrapper
#[derive(serde::Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

/// System status
#[derive(serde::Serialize)]
pub struct SystemStatus {
    pub stream_address: String,
    pub channel_count: usize,
    pub member_count: usize,
    pub uptime_seconds: u64,
    pub stats: StatsSnapshot,
}

/// Get system status
pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<ApiResponse<SystemStatus>> {
    let status = SystemStatus {
        stream_address: state.stream_addr.to_string(),
        channel_count: state.registry.channel_count(),
        member_count: state.registry.member_count(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        stats: state.stats.snapshot(),
    };

    Json(ApiResponse::ok(status))
}

/// Get all channels
pub async fn get_channels(
    State(state): State<Arc<AppState>>,
) -> Json<ApiResponse<Vec<ChannelStatus>>> {
    Json(ApiResponse::ok(state.registry.snapshot().channels))
}

/// Get one channel
pub async fn get_channel(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> (StatusCode, Json<ApiResponse<ChannelStatus>>) {
    let found = state
        .registry
        .snapshot()
        .channels
        .into_iter()
        .find(|channel| channel.key == key);

    match found {
        Some(channel) => (StatusCode::OK, Json(ApiResponse::ok(channel))),
        None => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::error(format!("Channel not found: {}", key))),
        ),
    }
}
