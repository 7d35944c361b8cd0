pub mod links;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter,
};
use tracing::{info, instrument};
use validator::Validate;

use crate::entities::{catalog_item, ecommerce_link, sales_invoice_line};
use crate::errors::ServiceError;

/// Looks up a catalog item by code, enabled or not.
pub async fn get<C: ConnectionTrait>(
    conn: &C,
    code: &str,
) -> Result<Option<catalog_item::Model>, ServiceError> {
    catalog_item::Entity::find_by_id(code)
        .one(conn)
        .await
        .map_err(ServiceError::db_error)
}

/// Looks up an enabled catalog item by code. Disabled items are already
/// retired and never participate in matching.
pub async fn get_enabled<C: ConnectionTrait>(
    conn: &C,
    code: &str,
) -> Result<Option<catalog_item::Model>, ServiceError> {
    catalog_item::Entity::find_by_id(code)
        .filter(catalog_item::Column::Disabled.eq(false))
        .one(conn)
        .await
        .map_err(ServiceError::db_error)
}

pub async fn exists_enabled<C: ConnectionTrait>(
    conn: &C,
    code: &str,
) -> Result<bool, ServiceError> {
    Ok(get_enabled(conn, code).await?.is_some())
}

/// Input for the validated item-creation path.
#[derive(Debug, Clone, Validate)]
pub struct NewCatalogItem {
    #[validate(length(min = 1))]
    pub item_code: String,
    pub item_name: Option<String>,
    pub description: Option<String>,
    #[validate(length(min = 1))]
    pub stock_uom: String,
    pub item_group: Option<String>,
    pub brand: Option<String>,
    pub image: Option<String>,
    pub is_stock_item: bool,
    pub standard_rate: Decimal,
}

/// Creates a catalog item through the validated write path.
#[instrument(skip(conn, item), fields(item_code = %item.item_code))]
pub async fn create_item<C: ConnectionTrait>(
    conn: &C,
    item: NewCatalogItem,
) -> Result<catalog_item::Model, ServiceError> {
    item.validate()?;

    if get(conn, &item.item_code).await?.is_some() {
        return Err(ServiceError::UniqueConflict(format!(
            "item {} already exists",
            item.item_code
        )));
    }

    let now = Utc::now();
    let model = catalog_item::ActiveModel {
        item_code: Set(item.item_code),
        item_name: Set(item.item_name),
        description: Set(item.description),
        item_group: Set(item.item_group),
        brand: Set(item.brand),
        image: Set(item.image),
        stock_uom: Set(item.stock_uom),
        has_batch_no: Set(false),
        has_serial_no: Set(false),
        is_stock_item: Set(item.is_stock_item),
        disabled: Set(false),
        valuation_rate: Set(Decimal::ZERO),
        standard_rate: Set(item.standard_rate),
        created_at: Set(now),
        modified_at: Set(now),
    };

    model.insert(conn).await.map_err(ServiceError::db_error)
}

/// Renames a catalog item, cascading the new code onto historical invoice
/// lines and link rows so no reference is orphaned.
#[instrument(skip(conn))]
pub async fn rename_item<C: ConnectionTrait>(
    conn: &C,
    old_code: &str,
    new_code: &str,
) -> Result<(), ServiceError> {
    if get(conn, old_code).await?.is_none() {
        return Err(ServiceError::NotFound(format!("item {old_code}")));
    }
    if get(conn, new_code).await?.is_some() {
        return Err(ServiceError::UniqueConflict(format!(
            "cannot rename {old_code}: {new_code} already exists"
        )));
    }

    catalog_item::Entity::update_many()
        .col_expr(catalog_item::Column::ItemCode, Expr::value(new_code))
        .col_expr(catalog_item::Column::ModifiedAt, Expr::value(Utc::now()))
        .filter(catalog_item::Column::ItemCode.eq(old_code))
        .exec(conn)
        .await
        .map_err(ServiceError::db_error)?;

    sales_invoice_line::Entity::update_many()
        .col_expr(sales_invoice_line::Column::ItemCode, Expr::value(new_code))
        .filter(sales_invoice_line::Column::ItemCode.eq(old_code))
        .exec(conn)
        .await
        .map_err(ServiceError::db_error)?;

    ecommerce_link::Entity::update_many()
        .col_expr(ecommerce_link::Column::ErpItemCode, Expr::value(new_code))
        .col_expr(ecommerce_link::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(ecommerce_link::Column::ErpItemCode.eq(old_code))
        .exec(conn)
        .await
        .map_err(ServiceError::db_error)?;

    info!(old_code, new_code, "renamed catalog item");
    Ok(())
}

/// The fixed field set a merge preserves from its source-of-truth candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemSnapshot {
    pub item_name: Option<String>,
    pub description: Option<String>,
    pub item_group: Option<String>,
    pub brand: Option<String>,
    pub image: Option<String>,
    pub stock_uom: String,
    pub has_batch_no: bool,
    pub has_serial_no: bool,
    pub is_stock_item: bool,
    pub valuation_rate: Decimal,
    pub standard_rate: Decimal,
}

impl From<&catalog_item::Model> for ItemSnapshot {
    fn from(model: &catalog_item::Model) -> Self {
        Self {
            item_name: model.item_name.clone(),
            description: model.description.clone(),
            item_group: model.item_group.clone(),
            brand: model.brand.clone(),
            image: model.image.clone(),
            stock_uom: model.stock_uom.clone(),
            has_batch_no: model.has_batch_no,
            has_serial_no: model.has_serial_no,
            is_stock_item: model.is_stock_item,
            valuation_rate: model.valuation_rate,
            standard_rate: model.standard_rate,
        }
    }
}

/// Privileged write path: direct field updates that bypass the validated
/// create/update flow. Used only where records are intentionally being
/// retired or overwritten during a merge.
pub struct PrivilegedWriter<'a, C: ConnectionTrait> {
    conn: &'a C,
}

impl<'a, C: ConnectionTrait> PrivilegedWriter<'a, C> {
    pub fn new(conn: &'a C) -> Self {
        Self { conn }
    }

    /// Writes a preserved-field snapshot onto an item, skipping validation.
    pub async fn write_snapshot(
        &self,
        code: &str,
        snapshot: &ItemSnapshot,
    ) -> Result<(), ServiceError> {
        catalog_item::Entity::update_many()
            .col_expr(
                catalog_item::Column::ItemName,
                Expr::value(snapshot.item_name.clone()),
            )
            .col_expr(
                catalog_item::Column::Description,
                Expr::value(snapshot.description.clone()),
            )
            .col_expr(
                catalog_item::Column::ItemGroup,
                Expr::value(snapshot.item_group.clone()),
            )
            .col_expr(
                catalog_item::Column::Brand,
                Expr::value(snapshot.brand.clone()),
            )
            .col_expr(
                catalog_item::Column::Image,
                Expr::value(snapshot.image.clone()),
            )
            .col_expr(
                catalog_item::Column::StockUom,
                Expr::value(snapshot.stock_uom.clone()),
            )
            .col_expr(
                catalog_item::Column::HasBatchNo,
                Expr::value(snapshot.has_batch_no),
            )
            .col_expr(
                catalog_item::Column::HasSerialNo,
                Expr::value(snapshot.has_serial_no),
            )
            .col_expr(
                catalog_item::Column::IsStockItem,
                Expr::value(snapshot.is_stock_item),
            )
            .col_expr(
                catalog_item::Column::ValuationRate,
                Expr::value(snapshot.valuation_rate),
            )
            .col_expr(
                catalog_item::Column::StandardRate,
                Expr::value(snapshot.standard_rate),
            )
            .col_expr(catalog_item::Column::ModifiedAt, Expr::value(Utc::now()))
            .filter(catalog_item::Column::ItemCode.eq(code))
            .exec(self.conn)
            .await
            .map_err(ServiceError::db_error)?;
        Ok(())
    }

    /// Retires an item by disabling it in place.
    pub async fn disable(&self, code: &str) -> Result<(), ServiceError> {
        catalog_item::Entity::update_many()
            .col_expr(catalog_item::Column::Disabled, Expr::value(true))
            .col_expr(catalog_item::Column::ModifiedAt, Expr::value(Utc::now()))
            .filter(catalog_item::Column::ItemCode.eq(code))
            .exec(self.conn)
            .await
            .map_err(ServiceError::db_error)?;
        Ok(())
    }

    /// Bumps an item's modification timestamp so list views observe the change.
    pub async fn touch(&self, code: &str) -> Result<(), ServiceError> {
        catalog_item::Entity::update_many()
            .col_expr(catalog_item::Column::ModifiedAt, Expr::value(Utc::now()))
            .filter(catalog_item::Column::ItemCode.eq(code))
            .exec(self.conn)
            .await
            .map_err(ServiceError::db_error)?;
        Ok(())
    }
}
