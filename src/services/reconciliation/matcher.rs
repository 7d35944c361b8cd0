use std::sync::Arc;

use chrono::{DateTime, Utc};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::catalog;
use crate::context::{ExecutionContext, Scope};
use crate::errors::ServiceError;
use crate::storefront::{Product, StorefrontClient};

/// A storefront product whose platform ID is still in use as an ERP item
/// code, together with whether reaching the SKU identity requires a merge.
#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationCandidate {
    pub product: Product,
    pub needs_reconciliation: bool,
    pub requires_merging: bool,
}

/// A caller-supplied (platform ID, SKU) pair to check before a merge.
#[derive(Debug, Clone, Deserialize)]
pub struct CandidatePair {
    pub id: String,
    pub sku: String,
}

/// Read-only matching between storefront products and ERP items. Never
/// mutates state; running it twice without intervening merges yields the
/// same classification.
#[derive(Clone)]
pub struct MatcherService {
    db: Arc<DatabaseConnection>,
    storefront: Arc<dyn StorefrontClient>,
}

impl MatcherService {
    pub fn new(db: Arc<DatabaseConnection>, storefront: Arc<dyn StorefrontClient>) -> Self {
        Self { db, storefront }
    }

    /// Storefront products created in the window whose platform ID still
    /// names an enabled ERP item. Disabled items are already retired and do
    /// not count as matches.
    #[instrument(skip(self, ctx))]
    pub async fn unreconciled_products(
        &self,
        ctx: &ExecutionContext,
        from: DateTime<Utc>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<ReconciliationCandidate>, ServiceError> {
        ctx.require(Scope::CatalogRead)?;

        let db = &*self.db;
        let mut result = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let page = self
                .storefront
                .products_created_between(from, to, cursor.take())
                .await?;

            for product in page.products {
                let Some(sku) = product.primary_sku() else {
                    continue;
                };

                let needs_reconciliation = catalog::exists_enabled(db, &product.id).await?;
                if !needs_reconciliation {
                    continue;
                }

                let requires_merging =
                    sku != product.id && catalog::exists_enabled(db, sku).await?;

                result.push(ReconciliationCandidate {
                    product,
                    needs_reconciliation,
                    requires_merging,
                });
            }

            match page.next {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        Ok(result)
    }

    /// Filters candidate pairs down to those where both the ID-keyed and the
    /// SKU-keyed item exist enabled: the precondition for a destructive merge.
    #[instrument(skip(self, ctx, pairs))]
    pub async fn merge_required(
        &self,
        ctx: &ExecutionContext,
        pairs: Vec<CandidatePair>,
    ) -> Result<Vec<String>, ServiceError> {
        ctx.require(Scope::CatalogRead)?;

        let db = &*self.db;
        let mut result = Vec::new();
        for pair in pairs {
            if catalog::exists_enabled(db, &pair.id).await?
                && catalog::exists_enabled(db, &pair.sku).await?
            {
                result.push(pair.id);
            }
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storefront::{MockStorefrontClient, ProductPage};
    use sea_orm::Database;

    // SKU-less products are skipped before any catalog lookup, so the
    // pagination loop can be exercised without seeded tables.
    #[tokio::test]
    async fn matcher_follows_page_cursors_to_the_end() {
        let mut storefront = MockStorefrontClient::new();
        storefront
            .expect_products_created_between()
            .withf(|_, _, cursor| cursor.is_none())
            .times(1)
            .returning(|_, _, _| {
                Ok(ProductPage {
                    products: vec![Product {
                        id: "1".to_string(),
                        title: None,
                        variants: vec![],
                        created_at: None,
                    }],
                    next: Some("page-2".to_string()),
                })
            });
        storefront
            .expect_products_created_between()
            .withf(|_, _, cursor| cursor.as_deref() == Some("page-2"))
            .times(1)
            .returning(|_, _, _| Ok(ProductPage::default()));

        let db = Database::connect("sqlite::memory:").await.unwrap();
        let matcher = MatcherService::new(Arc::new(db), Arc::new(storefront));

        let candidates = matcher
            .unreconciled_products(&ExecutionContext::system(), Utc::now(), None)
            .await
            .unwrap();
        assert!(candidates.is_empty());
    }
}
