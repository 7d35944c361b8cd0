use std::sync::Arc;
use std::time::Instant;

use http::StatusCode;
use sea_orm::{DatabaseConnection, DatabaseTransaction, TransactionTrait};
use serde::Serialize;
use tracing::{error, info, instrument, warn};

use crate::catalog;
use crate::config::AppConfig;
use crate::context::{ExecutionContext, Scope};
use crate::db::with_savepoint;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender, ProgressUpdate};
use crate::services::reconciliation::merge;
use crate::storefront::StorefrontClient;

/// Structured result of one synchronous reconciliation: an http-style status
/// code plus a human-readable message.
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileOutcome {
    pub code: u16,
    pub message: String,
}

impl ReconcileOutcome {
    fn success() -> Self {
        Self {
            code: StatusCode::OK.as_u16(),
            message: "Successful".to_string(),
        }
    }

    fn failure(code: StatusCode, product_id: &str, reason: &str) -> Self {
        Self {
            code: code.as_u16(),
            message: format!("Error reconciling product {product_id}: {reason}"),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == StatusCode::OK.as_u16()
    }
}

/// Short per-item failure reason for outcomes and progress messages.
fn failure_reason(err: &ServiceError) -> String {
    match err {
        ServiceError::NotFound(_) => "Item not found".to_string(),
        ServiceError::PermissionDenied(_) => "Access denied".to_string(),
        other => other.to_string(),
    }
}

/// What a successful per-item reconciliation did.
enum Applied {
    Renamed { sku: String },
    Merged { survivor: String, retired: usize },
}

/// Renames platform-ID-keyed ERP items to their storefront SKU, merging when
/// an item already exists at the SKU identifier.
#[derive(Clone)]
pub struct ReconcilerService {
    db: Arc<DatabaseConnection>,
    storefront: Arc<dyn StorefrontClient>,
    events: EventSender,
    config: Arc<AppConfig>,
}

impl ReconcilerService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        storefront: Arc<dyn StorefrontClient>,
        events: EventSender,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            db,
            storefront,
            events,
            config,
        }
    }

    /// Reconciles one product synchronously. Failures come back as a
    /// structured outcome, never as a raised error past this boundary.
    #[instrument(skip(self, ctx))]
    pub async fn reconcile_one(
        &self,
        ctx: &ExecutionContext,
        product_id: &str,
    ) -> Result<ReconcileOutcome, ServiceError> {
        let product = match self.storefront.find_product(product_id).await {
            Ok(Some(product)) => product,
            Ok(None) => {
                return Ok(ReconcileOutcome::failure(
                    StatusCode::NOT_FOUND,
                    product_id,
                    "product not found on storefront",
                ))
            }
            Err(err) => {
                warn!(product_id, error = %err, "storefront lookup failed");
                return Ok(ReconcileOutcome::failure(
                    StatusCode::BAD_GATEWAY,
                    product_id,
                    &failure_reason(&err),
                ));
            }
        };

        let Some(sku) = product.primary_sku().map(str::to_string) else {
            return Ok(ReconcileOutcome::failure(
                StatusCode::BAD_REQUEST,
                product_id,
                "No SKU found for this product",
            ));
        };

        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;
        match self.apply(ctx, &txn, &product.id, &sku).await {
            Ok(applied) => {
                txn.commit().await.map_err(ServiceError::db_error)?;
                self.emit_applied(&product.id, applied).await;
                Ok(ReconcileOutcome::success())
            }
            Err(err) => {
                if let Err(rollback_err) = txn.rollback().await {
                    warn!("Rollback failed: {}", rollback_err);
                }
                error!(product_id, error = %err, "reconciliation failed");
                Ok(ReconcileOutcome::failure(
                    err.status_code(),
                    product_id,
                    &failure_reason(&err),
                ))
            }
        }
    }

    /// Reconciles a list of products as one long-lived unit of work. Each
    /// item runs under its own savepoint; a failure rolls back that item
    /// alone and the loop continues. Progress streams through the event
    /// channel in input order, terminated by a done event with elapsed time.
    #[instrument(skip(self, ctx, product_ids), fields(count = product_ids.len()))]
    pub async fn reconcile_bulk(
        &self,
        ctx: &ExecutionContext,
        product_ids: Vec<String>,
    ) -> Result<(), ServiceError> {
        let start = Instant::now();
        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;

        for product_id in &product_ids {
            let product = match self.storefront.find_product(product_id).await {
                Ok(Some(product)) => product,
                Ok(None) => {
                    self.publish(ProgressUpdate::failed(format!(
                        "Error reconciling product {product_id}: product not found on storefront"
                    )))
                    .await;
                    continue;
                }
                Err(err) => {
                    self.publish(ProgressUpdate::failed(format!(
                        "Error reconciling product {product_id}: {}",
                        failure_reason(&err)
                    )))
                    .await;
                    continue;
                }
            };

            let Some(sku) = product.primary_sku().map(str::to_string) else {
                self.publish(ProgressUpdate::failed(format!(
                    "Error reconciling product {product_id}: No SKU found for this product"
                )))
                .await;
                continue;
            };

            // owned captures only: the savepoint closure must not borrow
            // from the enclosing iteration
            let service = self.clone();
            let item_ctx = ctx.clone();
            let platform_id = product.id.clone();
            let target_sku = sku.clone();
            let result = with_savepoint(&txn, move |sp| {
                Box::pin(async move {
                    service.apply(&item_ctx, sp, &platform_id, &target_sku).await
                })
            })
            .await;

            match result {
                Ok(applied) => {
                    self.publish(ProgressUpdate::succeeded(format!(
                        "Reconciled product {product_id} to {sku}"
                    )))
                    .await;
                    self.emit_applied(product_id, applied).await;
                }
                Err(err) => {
                    self.publish(ProgressUpdate::failed(format!(
                        "Error reconciling product {product_id}: {}",
                        failure_reason(&err)
                    )))
                    .await;
                }
            }
        }

        txn.commit().await.map_err(ServiceError::db_error)?;
        self.publish(ProgressUpdate::done(start.elapsed().as_secs_f64()))
            .await;
        Ok(())
    }

    /// Performs one reconciliation on an open connection: merge when an item
    /// already occupies the SKU identifier, plain rename otherwise.
    async fn apply(
        &self,
        ctx: &ExecutionContext,
        conn: &DatabaseTransaction,
        platform_id: &str,
        sku: &str,
    ) -> Result<Applied, ServiceError> {
        ctx.require(Scope::CatalogWrite)?;

        catalog::get_enabled(conn, platform_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("item {platform_id}")))?;

        if catalog::get(conn, sku).await?.is_some() {
            let outcome = merge::merge_items(
                conn,
                &self.config.integration.integration_name,
                &[platform_id.to_string(), sku.to_string()],
                sku,
            )
            .await?;
            Ok(Applied::Merged {
                survivor: outcome.survivor,
                retired: outcome.retired,
            })
        } else {
            catalog::rename_item(conn, platform_id, sku).await?;
            Ok(Applied::Renamed {
                sku: sku.to_string(),
            })
        }
    }

    async fn emit_applied(&self, platform_id: &str, applied: Applied) {
        match applied {
            Applied::Renamed { sku } => {
                info!(platform_id, sku, "reconciled by rename");
                self.events
                    .send(Event::ItemRenamed {
                        old_code: platform_id.to_string(),
                        new_code: sku,
                    })
                    .await;
            }
            Applied::Merged { survivor, retired } => {
                info!(platform_id, survivor, retired, "reconciled by merge");
                self.events.send(Event::ItemsMerged { survivor, retired }).await;
            }
        }
    }

    async fn publish(&self, update: ProgressUpdate) {
        self.events.send(Event::SyncProgress(update)).await;
    }
}
