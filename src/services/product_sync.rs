use std::sync::Arc;
use std::time::Instant;

use http::StatusCode;
use rust_decimal::Decimal;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction, EntityTrait,
    PaginatorTrait, QueryFilter, TransactionTrait,
};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::catalog::{self, links, NewCatalogItem};
use crate::config::AppConfig;
use crate::context::{ExecutionContext, Scope};
use crate::db::with_savepoint;
use crate::entities::catalog_item;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender, ProgressUpdate};
use crate::storefront::{Product, StorefrontClient};

const DEFAULT_STOCK_UOM: &str = "Nos";

/// Structured result of one synchronous product sync.
#[derive(Debug, Clone, Serialize)]
pub struct SyncOutcome {
    pub code: u16,
    pub message: String,
}

impl SyncOutcome {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            code: StatusCode::OK.as_u16(),
            message: message.into(),
        }
    }

    fn failure(code: StatusCode, product_id: &str, reason: &str) -> Self {
        Self {
            code: code.as_u16(),
            message: format!("Error syncing product {product_id}: {reason}"),
        }
    }
}

/// Summary counts shown on the import page.
#[derive(Debug, Clone, Serialize)]
pub struct ProductCounts {
    pub storefront_count: u64,
    pub synced_count: u64,
    pub erp_count: u64,
}

/// Imports storefront products into the catalog, creating the item and its
/// ecommerce link row.
#[derive(Clone)]
pub struct ProductSyncService {
    db: Arc<DatabaseConnection>,
    storefront: Arc<dyn StorefrontClient>,
    events: EventSender,
    config: Arc<AppConfig>,
}

impl ProductSyncService {
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

    fn integration(&self) -> &str {
        &self.config.integration.integration_name
    }

    /// Whether a link row already binds this product to its primary SKU.
    /// Runs on the caller's connection so a check inside an open transaction
    /// sees link rows written earlier in the same unit of work.
    pub async fn is_synced<C: ConnectionTrait>(
        &self,
        conn: &C,
        product: &Product,
    ) -> Result<bool, ServiceError> {
        let Some(sku) = product.primary_sku() else {
            return Ok(false);
        };
        links::is_synced(conn, self.integration(), &product.id, sku).await
    }

    /// Syncs one product synchronously, reporting a structured outcome.
    #[instrument(skip(self, ctx))]
    pub async fn sync_product(
        &self,
        ctx: &ExecutionContext,
        product_id: &str,
    ) -> Result<SyncOutcome, ServiceError> {
        let product = match self.storefront.find_product(product_id).await? {
            Some(product) => product,
            None => {
                return Ok(SyncOutcome::failure(
                    StatusCode::NOT_FOUND,
                    product_id,
                    "product not found on storefront",
                ))
            }
        };

        if product.primary_sku().is_none() {
            return Ok(SyncOutcome::failure(
                StatusCode::BAD_REQUEST,
                product_id,
                "No SKU found for this product",
            ));
        }
        if self.is_synced(&*self.db, &product).await? {
            return Ok(SyncOutcome::ok(format!(
                "Product {product_id} already synced"
            )));
        }

        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;
        match self.apply(ctx, &txn, &product).await {
            Ok(()) => {
                txn.commit().await.map_err(ServiceError::db_error)?;
                Ok(SyncOutcome::ok("Successful"))
            }
            Err(err) => {
                if let Err(rollback_err) = txn.rollback().await {
                    warn!("Rollback failed: {}", rollback_err);
                }
                warn!(product_id, error = %err, "product sync failed");
                Ok(SyncOutcome::failure(
                    err.status_code(),
                    product_id,
                    &err.to_string(),
                ))
            }
        }
    }

    /// Syncs a list of products as one background unit of work with a
    /// savepoint per product and streamed progress.
    #[instrument(skip(self, ctx, product_ids), fields(count = product_ids.len()))]
    pub async fn sync_bulk(
        &self,
        ctx: &ExecutionContext,
        product_ids: Vec<String>,
    ) -> Result<(), ServiceError> {
        let start = Instant::now();
        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;

        for product_id in &product_ids {
            self.publish(ProgressUpdate::note(format!("Syncing product {product_id}")))
                .await;

            let product = match self.storefront.find_product(product_id).await {
                Ok(Some(product)) => product,
                Ok(None) => {
                    self.publish(ProgressUpdate::failed(format!(
                        "Error syncing product {product_id}: product not found on storefront"
                    )))
                    .await;
                    continue;
                }
                Err(err) => {
                    self.publish(ProgressUpdate::failed(format!(
                        "Error syncing product {product_id}: {err}"
                    )))
                    .await;
                    continue;
                }
            };

            if product.primary_sku().is_none() {
                self.publish(ProgressUpdate::failed(format!(
                    "Error syncing product {product_id}: No SKU found for this product"
                )))
                .await;
                continue;
            }
            match self.is_synced(&txn, &product).await {
                Ok(true) => {
                    self.publish(ProgressUpdate::note(format!(
                        "Product {product_id} already synced. Skipping..."
                    )))
                    .await;
                    continue;
                }
                Ok(false) => {}
                Err(err) => {
                    self.publish(ProgressUpdate::failed(format!(
                        "Error syncing product {product_id}: {err}"
                    )))
                    .await;
                    continue;
                }
            }

            let service = self.clone();
            let item_ctx = ctx.clone();
            let item = product.clone();
            let result = with_savepoint(&txn, move |sp| {
                Box::pin(async move { service.apply(&item_ctx, sp, &item).await })
            })
            .await;

            match result {
                Ok(()) => {
                    self.publish(ProgressUpdate::succeeded(format!(
                        "Synced product {product_id}"
                    )))
                    .await;
                }
                Err(err) => {
                    self.publish(ProgressUpdate::failed(format!(
                        "Error syncing product {product_id}: {err}"
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

    /// Creates the catalog item and its link row for a live product.
    async fn apply(
        &self,
        ctx: &ExecutionContext,
        conn: &DatabaseTransaction,
        product: &Product,
    ) -> Result<(), ServiceError> {
        ctx.require(Scope::CatalogWrite)?;

        let sku = product
            .primary_sku()
            .ok_or_else(|| {
                ServiceError::ValidationError("No SKU found for this product".to_string())
            })?
            .to_string();
        let primary_variant = product.variants.first();

        let item = catalog::create_item(
            conn,
            NewCatalogItem {
                item_code: sku.clone(),
                item_name: product.title.clone(),
                description: product.title.clone(),
                stock_uom: DEFAULT_STOCK_UOM.to_string(),
                item_group: None,
                brand: None,
                image: None,
                is_stock_item: true,
                standard_rate: primary_variant
                    .and_then(|v| v.price)
                    .unwrap_or(Decimal::ZERO),
            },
        )
        .await?;

        links::insert(
            conn,
            self.integration(),
            &product.id,
            primary_variant.map(|v| v.id.clone()),
            Some(sku),
            &item.item_code,
        )
        .await?;

        info!(product_id = %product.id, item_code = %item.item_code, "product synced");
        Ok(())
    }

    /// Summary counts for the import page.
    #[instrument(skip(self, ctx))]
    pub async fn product_counts(&self, ctx: &ExecutionContext) -> Result<ProductCounts, ServiceError> {
        ctx.require(Scope::CatalogRead)?;

        let erp_count = catalog_item::Entity::find()
            .filter(catalog_item::Column::Disabled.eq(false))
            .count(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;
        let synced_count = links::count(&*self.db, self.integration()).await?;
        let storefront_count = self.storefront.product_count().await?;

        Ok(ProductCounts {
            storefront_count,
            synced_count,
            erp_count,
        })
    }

    async fn publish(&self, update: ProgressUpdate) {
        self.events.send(Event::SyncProgress(update)).await;
    }
}
