use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::instrument;

use crate::config::IntegrationConfig;
use crate::errors::ServiceError;
use crate::storefront::{Product, ProductPage, StorefrontClient};

/// REST implementation of [`StorefrontClient`].
pub struct RestStorefrontClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
    page_limit: u32,
}

#[derive(Deserialize)]
struct ProductsEnvelope {
    #[serde(default)]
    products: Vec<Product>,
    #[serde(default)]
    next: Option<String>,
}

#[derive(Deserialize)]
struct ProductEnvelope {
    product: Product,
}

#[derive(Deserialize)]
struct CountEnvelope {
    count: u64,
}

impl RestStorefrontClient {
    pub fn new(cfg: &IntegrationConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: cfg.storefront_base_url.trim_end_matches('/').to_string(),
            token: cfg.storefront_token.clone(),
            page_limit: cfg.page_limit,
        }
    }

    fn request(&self, path: &str) -> reqwest::RequestBuilder {
        let mut req = self.http.get(format!("{}{}", self.base_url, path));
        if let Some(token) = &self.token {
            req = req.header("X-Access-Token", token);
        }
        req
    }

    async fn send<T: serde::de::DeserializeOwned>(
        req: reqwest::RequestBuilder,
    ) -> Result<Option<T>, ServiceError> {
        let resp = req
            .send()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(format!("storefront request: {e}")))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(ServiceError::ExternalServiceError(format!(
                "storefront returned {}",
                resp.status()
            )));
        }

        let body = resp
            .json::<T>()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(format!("storefront payload: {e}")))?;
        Ok(Some(body))
    }
}

#[async_trait]
impl StorefrontClient for RestStorefrontClient {
    #[instrument(skip(self))]
    async fn products_created_between(
        &self,
        from: DateTime<Utc>,
        to: Option<DateTime<Utc>>,
        cursor: Option<String>,
    ) -> Result<ProductPage, ServiceError> {
        let mut req = self
            .request("/products.json")
            .query(&[("limit", self.page_limit.to_string())])
            .query(&[("created_at_min", from.to_rfc3339())]);
        if let Some(to) = to {
            req = req.query(&[("created_at_max", to.to_rfc3339())]);
        }
        if let Some(cursor) = cursor {
            req = req.query(&[("page_info", cursor)]);
        }

        let envelope: ProductsEnvelope = Self::send(req).await?.unwrap_or(ProductsEnvelope {
            products: Vec::new(),
            next: None,
        });
        Ok(ProductPage {
            products: envelope.products,
            next: envelope.next,
        })
    }

    #[instrument(skip(self))]
    async fn find_product(&self, product_id: &str) -> Result<Option<Product>, ServiceError> {
        let req = self.request(&format!("/products/{product_id}.json"));
        let envelope: Option<ProductEnvelope> = Self::send(req).await?;
        Ok(envelope.map(|e| e.product))
    }

    #[instrument(skip(self))]
    async fn product_count(&self) -> Result<u64, ServiceError> {
        let req = self.request("/products/count.json");
        let envelope: Option<CountEnvelope> = Self::send(req).await?;
        Ok(envelope.map(|e| e.count).unwrap_or(0))
    }
}
