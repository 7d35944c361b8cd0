use axum::Json;
use serde::Serialize;

use crate::{ApiResponse, ApiResult};

#[derive(Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
}

pub async fn health() -> ApiResult<HealthStatus> {
    Ok(Json(ApiResponse::success(HealthStatus { status: "ok" })))
}
