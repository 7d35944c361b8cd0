use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::error;

use crate::context::ExecutionContext;
use crate::services::reconciliation::{CandidatePair, ReconcileOutcome, ReconciliationCandidate};
use crate::{ApiResponse, ApiResult, AppState};

#[derive(Debug, Deserialize)]
pub struct UnreconciledQuery {
    pub from: DateTime<Utc>,
    pub to: Option<DateTime<Utc>>,
}

/// Lists storefront products whose platform ID is still an ERP item code.
pub async fn unreconciled(
    State(state): State<AppState>,
    Query(query): Query<UnreconciledQuery>,
) -> ApiResult<Vec<ReconciliationCandidate>> {
    let ctx = ExecutionContext::system();
    let candidates = state
        .matcher_service()
        .unreconciled_products(&ctx, query.from, query.to)
        .await?;
    Ok(Json(ApiResponse::success(candidates)))
}

/// Filters (id, sku) pairs down to those requiring a destructive merge.
pub async fn merge_candidates(
    State(state): State<AppState>,
    Json(pairs): Json<Vec<CandidatePair>>,
) -> ApiResult<Vec<String>> {
    let ctx = ExecutionContext::system();
    let ids = state.matcher_service().merge_required(&ctx, pairs).await?;
    Ok(Json(ApiResponse::success(ids)))
}

#[derive(Debug, Deserialize)]
pub struct ReconcileRequest {
    pub product_id: String,
}

/// Reconciles one product synchronously.
pub async fn reconcile(
    State(state): State<AppState>,
    Json(req): Json<ReconcileRequest>,
) -> ApiResult<ReconcileOutcome> {
    let ctx = ExecutionContext::system();
    let outcome = state
        .reconciler_service()
        .reconcile_one(&ctx, &req.product_id)
        .await?;
    Ok(Json(ApiResponse::success(outcome)))
}

#[derive(Debug, Deserialize)]
pub struct BulkReconcileRequest {
    /// Comma-delimited platform product IDs
    pub products: String,
}

/// Queues a bulk reconciliation; progress streams through the event channel.
pub async fn reconcile_bulk(
    State(state): State<AppState>,
    Json(req): Json<BulkReconcileRequest>,
) -> impl IntoResponse {
    let ids: Vec<String> = req
        .products
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();

    let service = state.reconciler_service();
    tokio::spawn(async move {
        let ctx = ExecutionContext::system();
        if let Err(err) = service.reconcile_bulk(&ctx, ids).await {
            error!(error = %err, "bulk reconciliation aborted");
        }
    });

    (
        StatusCode::ACCEPTED,
        Json(ApiResponse::<()>::message("Bulk reconciliation queued")),
    )
}
