pub mod health;
pub mod products;
pub mod reconciliation;
pub mod webhooks;

use axum::routing::{get, post};
use axum::Router;

use crate::AppState;

/// Assembles the exposed operation surface: reconciliation pages, product
/// sync pages, and the refund webhook intake.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .route(
            "/reconciliation/unreconciled",
            get(reconciliation::unreconciled),
        )
        .route(
            "/reconciliation/merge-candidates",
            post(reconciliation::merge_candidates),
        )
        .route("/reconciliation/reconcile", post(reconciliation::reconcile))
        .route(
            "/reconciliation/reconcile-bulk",
            post(reconciliation::reconcile_bulk),
        )
        .route("/products/counts", get(products::counts))
        .route("/products/sync", post(products::sync))
        .route("/products/sync-bulk", post(products::sync_bulk))
        .route("/webhooks/refunds", post(webhooks::refund))
}
