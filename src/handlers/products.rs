use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use tracing::error;

use crate::context::ExecutionContext;
use crate::services::product_sync::{ProductCounts, SyncOutcome};
use crate::{ApiResponse, ApiResult, AppState};

/// Summary counts for the import page.
pub async fn counts(State(state): State<AppState>) -> ApiResult<ProductCounts> {
    let ctx = ExecutionContext::system();
    let counts = state.product_sync_service().product_counts(&ctx).await?;
    Ok(Json(ApiResponse::success(counts)))
}

#[derive(Debug, Deserialize)]
pub struct SyncRequest {
    pub product_id: String,
}

/// Imports one product synchronously.
pub async fn sync(
    State(state): State<AppState>,
    Json(req): Json<SyncRequest>,
) -> ApiResult<SyncOutcome> {
    let ctx = ExecutionContext::system();
    let outcome = state
        .product_sync_service()
        .sync_product(&ctx, &req.product_id)
        .await?;
    Ok(Json(ApiResponse::success(outcome)))
}

#[derive(Debug, Deserialize)]
pub struct BulkSyncRequest {
    /// Comma-delimited platform product IDs
    pub products: String,
}

/// Queues a bulk import; progress streams through the event channel.
pub async fn sync_bulk(
    State(state): State<AppState>,
    Json(req): Json<BulkSyncRequest>,
) -> impl IntoResponse {
    let ids: Vec<String> = req
        .products
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();

    let service = state.product_sync_service();
    tokio::spawn(async move {
        let ctx = ExecutionContext::system();
        if let Err(err) = service.sync_bulk(&ctx, ids).await {
            error!(error = %err, "bulk product sync aborted");
        }
    });

    (
        StatusCode::ACCEPTED,
        Json(ApiResponse::<()>::message("Bulk product sync queued")),
    )
}
