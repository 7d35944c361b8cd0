pub mod rest;
pub mod types;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::errors::ServiceError;
pub use types::{
    DiscountAllocation, OrderAdjustment, Product, ProductPage, ProductVariant, RefundLineDetail,
    RefundLineItem, RefundPayload,
};

/// Paginated product lookups against the storefront platform.
///
/// The platform API itself is an external collaborator; this trait is the
/// seam the engines consume, with [`rest::RestStorefrontClient`] as the
/// production implementation.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StorefrontClient: Send + Sync {
    /// One page of products created inside the given window. Pass the
    /// previous page's `next` cursor to continue.
    async fn products_created_between(
        &self,
        from: DateTime<Utc>,
        to: Option<DateTime<Utc>>,
        cursor: Option<String>,
    ) -> Result<ProductPage, ServiceError>;

    /// A single live product by platform ID.
    async fn find_product(&self, product_id: &str) -> Result<Option<Product>, ServiceError>;

    /// Total product count on the platform.
    async fn product_count(&self) -> Result<u64, ServiceError>;
}
