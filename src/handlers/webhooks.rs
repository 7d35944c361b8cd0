use axum::extract::State;
use axum::Json;

use crate::context::ExecutionContext;
use crate::services::refunds::RefundOutcome;
use crate::storefront::RefundPayload;
use crate::{ApiResponse, ApiResult, AppState};

/// Refund webhook intake. An invoice-less refund is acknowledged as invalid
/// so the storefront does not redeliver it; translation errors surface as
/// the usual error envelope.
pub async fn refund(
    State(state): State<AppState>,
    Json(payload): Json<RefundPayload>,
) -> ApiResult<String> {
    let ctx = ExecutionContext::system();
    let outcome = state.refund_service().process_refund(&ctx, payload).await?;

    let message = match outcome {
        RefundOutcome::Success => "Success".to_string(),
        RefundOutcome::Invalid(reason) => format!("Invalid: {reason}"),
    };
    Ok(Json(ApiResponse::success(message)))
}
