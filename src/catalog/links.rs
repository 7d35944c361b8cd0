use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, EntityTrait, ModelTrait,
    PaginatorTrait, QueryFilter,
};
use tracing::info;
use uuid::Uuid;

use crate::entities::ecommerce_link;
use crate::errors::ServiceError;

/// Links currently resolving to any of the given ERP item codes.
pub async fn find_for_erp_codes<C: ConnectionTrait>(
    conn: &C,
    integration: &str,
    codes: &[String],
) -> Result<Vec<ecommerce_link::Model>, ServiceError> {
    ecommerce_link::Entity::find()
        .filter(ecommerce_link::Column::Integration.eq(integration))
        .filter(ecommerce_link::Column::ErpItemCode.is_in(codes.iter().map(String::as_str)))
        .all(conn)
        .await
        .map_err(ServiceError::db_error)
}

/// Whether a product is already synced: a link row exists binding the
/// platform item code to the given SKU for this integration.
pub async fn is_synced<C: ConnectionTrait>(
    conn: &C,
    integration: &str,
    integration_item_code: &str,
    sku: &str,
) -> Result<bool, ServiceError> {
    let found = ecommerce_link::Entity::find()
        .filter(ecommerce_link::Column::Integration.eq(integration))
        .filter(ecommerce_link::Column::IntegrationItemCode.eq(integration_item_code))
        .filter(ecommerce_link::Column::Sku.eq(sku))
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?;
    Ok(found.is_some())
}

/// Resolves a refunded line back to an ERP item code through the link table,
/// trying the SKU first, then the variant ID.
pub async fn resolve_item_code<C: ConnectionTrait>(
    conn: &C,
    integration: &str,
    sku: Option<&str>,
    variant_id: Option<&str>,
) -> Result<Option<String>, ServiceError> {
    if let Some(sku) = sku {
        let by_sku = ecommerce_link::Entity::find()
            .filter(ecommerce_link::Column::Integration.eq(integration))
            .filter(ecommerce_link::Column::Sku.eq(sku))
            .one(conn)
            .await
            .map_err(ServiceError::db_error)?;
        if let Some(link) = by_sku {
            return Ok(Some(link.erp_item_code));
        }
    }
    if let Some(variant_id) = variant_id {
        let by_variant = ecommerce_link::Entity::find()
            .filter(ecommerce_link::Column::Integration.eq(integration))
            .filter(ecommerce_link::Column::VariantId.eq(variant_id))
            .one(conn)
            .await
            .map_err(ServiceError::db_error)?;
        if let Some(link) = by_variant {
            return Ok(Some(link.erp_item_code));
        }
    }
    Ok(None)
}

/// Re-points a link row at a different ERP item code.
pub async fn repoint<C: ConnectionTrait>(
    conn: &C,
    link_id: Uuid,
    erp_item_code: &str,
) -> Result<(), ServiceError> {
    ecommerce_link::Entity::update_many()
        .col_expr(
            ecommerce_link::Column::ErpItemCode,
            Expr::value(erp_item_code),
        )
        .col_expr(ecommerce_link::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(ecommerce_link::Column::Id.eq(link_id))
        .exec(conn)
        .await
        .map_err(ServiceError::db_error)?;
    Ok(())
}

/// Collapses a duplicate link into the surviving one: the found link's
/// platform identity is rewritten onto the survivor and the duplicate is
/// deleted, keeping at most one link per ERP item code.
pub async fn absorb<C: ConnectionTrait>(
    conn: &C,
    survivor: &ecommerce_link::Model,
    duplicate: ecommerce_link::Model,
) -> Result<(), ServiceError> {
    ecommerce_link::Entity::update_many()
        .col_expr(
            ecommerce_link::Column::IntegrationItemCode,
            Expr::value(duplicate.integration_item_code.clone()),
        )
        .col_expr(
            ecommerce_link::Column::VariantId,
            Expr::value(duplicate.variant_id.clone()),
        )
        .col_expr(
            ecommerce_link::Column::Sku,
            Expr::value(duplicate.sku.clone()),
        )
        .col_expr(ecommerce_link::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(ecommerce_link::Column::Id.eq(survivor.id))
        .exec(conn)
        .await
        .map_err(ServiceError::db_error)?;

    let duplicate_id = duplicate.id;
    duplicate
        .delete(conn)
        .await
        .map_err(ServiceError::db_error)?;
    info!(survivor = %survivor.id, duplicate = %duplicate_id, "collapsed duplicate link");
    Ok(())
}

/// Inserts a new link row for a freshly synced product.
pub async fn insert<C: ConnectionTrait>(
    conn: &C,
    integration: &str,
    integration_item_code: &str,
    variant_id: Option<String>,
    sku: Option<String>,
    erp_item_code: &str,
) -> Result<ecommerce_link::Model, ServiceError> {
    let now = Utc::now();
    let model = ecommerce_link::ActiveModel {
        id: Set(Uuid::new_v4()),
        integration: Set(integration.to_string()),
        integration_item_code: Set(integration_item_code.to_string()),
        variant_id: Set(variant_id),
        sku: Set(sku),
        erp_item_code: Set(erp_item_code.to_string()),
        created_at: Set(now),
        updated_at: Set(now),
    };
    model.insert(conn).await.map_err(ServiceError::db_error)
}

/// Number of link rows for this integration.
pub async fn count<C: ConnectionTrait>(conn: &C, integration: &str) -> Result<u64, ServiceError> {
    ecommerce_link::Entity::find()
        .filter(ecommerce_link::Column::Integration.eq(integration))
        .count(conn)
        .await
        .map_err(ServiceError::db_error)
}
