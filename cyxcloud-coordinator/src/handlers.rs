//! HTTP handlers for the coordinator API.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use chrono::{DateTime, Utc};
use cyxcloud_metadata::{ChunkReplica, File, HeartbeatReport};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{ApiError, ApiErrorResponse};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub url: String,
    pub id: Option<String>,
}

#[derive(Serialize)]
pub struct RegisterResponse {
    pub status: &'static str,
    pub url: String,
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<RegisterResponse>, ApiErrorResponse> {
    state.registry.register(&req.url, req.id).await?;
    Ok(Json(RegisterResponse {
        status: "ok",
        url: req.url,
    }))
}

#[derive(Deserialize)]
pub struct UnregisterRequest {
    pub url: String,
}

#[derive(Serialize)]
pub struct StatusOnlyResponse {
    pub status: &'static str,
}

pub async fn unregister(
    State(state): State<Arc<AppState>>,
    Json(req): Json<UnregisterRequest>,
) -> Result<Json<StatusOnlyResponse>, ApiErrorResponse> {
    if req.url.trim().is_empty() {
        return Err(ApiErrorResponse(
            StatusCode::BAD_REQUEST,
            ApiError::new("url must not be empty"),
        ));
    }
    state.registry.unregister(&req.url).await;
    Ok(Json(StatusOnlyResponse { status: "ok" }))
}

#[derive(Serialize)]
pub struct HeartbeatResponse {
    pub status: &'static str,
    pub message: &'static str,
    pub timestamp: DateTime<Utc>,
}

pub async fn heartbeat(
    State(state): State<Arc<AppState>>,
    Json(report): Json<HeartbeatReport>,
) -> Result<Json<HeartbeatResponse>, ApiErrorResponse> {
    let timestamp = state.liveness.heartbeat(report).await?;
    Ok(Json(HeartbeatResponse {
        status: "ok",
        message: "heartbeat accepted",
        timestamp,
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRequest {
    pub file_id: String,
    pub size: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub status: &'static str,
    pub file_id: String,
    pub chunks: Vec<ChunkReplica>,
    pub replication_factor: usize,
}

pub async fn upload(
    State(state): State<Arc<AppState>>,
    Json(req): Json<UploadRequest>,
) -> Result<Json<UploadResponse>, ApiErrorResponse> {
    if req.file_id.trim().is_empty() {
        return Err(ApiErrorResponse(
            StatusCode::BAD_REQUEST,
            ApiError::new("fileId must not be empty"),
        ));
    }
    let file = state.placement.plan_upload(&req.file_id, req.size).await?;
    Ok(Json(UploadResponse {
        status: "ok",
        file_id: file.file_id.clone(),
        chunks: file.chunks,
        replication_factor: state.config.replication_factor,
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileIdQuery {
    pub file_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataResponse {
    pub status: &'static str,
    pub file_id: String,
    pub size: u64,
    pub chunks: Vec<ChunkReplica>,
    pub timestamp: DateTime<Utc>,
}

pub async fn get_metadata(
    State(state): State<Arc<AppState>>,
    Query(q): Query<FileIdQuery>,
) -> Result<Json<MetadataResponse>, ApiErrorResponse> {
    let file = state.placement.filter_for_read(&q.file_id).await?;
    Ok(Json(MetadataResponse {
        status: "ok",
        file_id: file.file_id,
        size: file.size,
        chunks: file.chunks,
        timestamp: file.timestamp,
    }))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResponse {
    pub status: &'static str,
    pub replicas_deleted: usize,
    pub replicas_failed: usize,
}

pub async fn delete(
    State(state): State<Arc<AppState>>,
    Query(q): Query<FileIdQuery>,
) -> Result<Json<DeleteResponse>, ApiErrorResponse> {
    let file = state.store.get(&q.file_id).await?;
    let mut deleted = 0usize;
    let mut failed = 0usize;
    for replica in &file.chunks {
        match state
            .node_client
            .delete_chunk(&replica.node_url, &file.file_id, replica.chunk_index)
            .await
        {
            Ok(()) => deleted += 1,
            Err(e) => {
                warn!(node_url = %replica.node_url, error = %e, "failed to delete replica during file delete");
                failed += 1;
            }
        }
    }
    state.store.delete(&q.file_id).await;
    info!(file_id = %q.file_id, deleted, failed, "file deleted");
    Ok(Json(DeleteResponse {
        status: "ok",
        replicas_deleted: deleted,
        replicas_failed: failed,
    }))
}

pub async fn list_files(State(state): State<Arc<AppState>>) -> Json<Vec<File>> {
    Json(state.store.list().await)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub total_nodes: usize,
    pub alive_nodes: usize,
    pub dead_nodes: usize,
    pub can_maintain_replication: bool,
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let nodes = state.registry.list().await;
    let alive = state.liveness.alive_urls().await;
    let total = nodes.len();
    let alive_count = alive.len();
    let dead = total.saturating_sub(alive_count);
    let can_maintain = alive_count >= state.config.min_replicas;
    Json(HealthResponse {
        status: if alive_count >= state.config.replication_factor {
            "HEALTHY"
        } else {
            "DEGRADED"
        },
        total_nodes: total,
        alive_nodes: alive_count,
        dead_nodes: dead,
        can_maintain_replication: can_maintain,
    })
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub total_files: usize,
    pub total_nodes: usize,
    pub alive_nodes: usize,
    pub total_repair_attempts: u64,
    pub total_trim_attempts: u64,
}

pub async fn stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    let files = state.store.list().await;
    let nodes = state.registry.list().await;
    let alive = state.liveness.alive_urls().await;
    let rebalancer_stats = state.re_replication.stats();
    Json(StatsResponse {
        total_files: files.len(),
        total_nodes: nodes.len(),
        alive_nodes: alive.len(),
        total_repair_attempts: rebalancer_stats.total_repair_attempts,
        total_trim_attempts: rebalancer_stats.total_trim_attempts,
    })
}

