pub mod catalog;
pub mod config;
pub mod context;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod services;
pub mod storefront;

use std::sync::Arc;

use axum::{Json, Router};
use sea_orm::DatabaseConnection;
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;
use crate::events::EventSender;
use crate::services::product_sync::ProductSyncService;
use crate::services::reconciliation::{MatcherService, ReconcilerService};
use crate::services::refunds::RefundService;
use crate::storefront::StorefrontClient;

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<AppConfig>,
    pub event_sender: EventSender,
    pub storefront: Arc<dyn StorefrontClient>,
}

impl AppState {
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: Arc<AppConfig>,
        event_sender: EventSender,
        storefront: Arc<dyn StorefrontClient>,
    ) -> Self {
        Self {
            db,
            config,
            event_sender,
            storefront,
        }
    }

    pub fn matcher_service(&self) -> MatcherService {
        MatcherService::new(self.db.clone(), self.storefront.clone())
    }

    pub fn reconciler_service(&self) -> ReconcilerService {
        ReconcilerService::new(
            self.db.clone(),
            self.storefront.clone(),
            self.event_sender.clone(),
            self.config.clone(),
        )
    }

    pub fn refund_service(&self) -> RefundService {
        RefundService::new(
            self.db.clone(),
            self.event_sender.clone(),
            self.config.clone(),
        )
    }

    pub fn product_sync_service(&self) -> ProductSyncService {
        ProductSyncService::new(
            self.db.clone(),
            self.storefront.clone(),
            self.event_sender.clone(),
            self.config.clone(),
        )
    }
}

/// Standard response envelope for every successful request.
#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }

    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: None,
            message: Some(message.into()),
        }
    }
}

pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

/// Builds the application router.
pub fn router(state: AppState) -> Router {
    handlers::routes()
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
