use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// An ERP inventory record. Retired items are disabled, never deleted, so
/// historical transaction lines keep resolving.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "catalog_items")]
pub struct Model {
    /// Internal identifier or, post-reconciliation, the storefront SKU
    #[sea_orm(primary_key, auto_increment = false)]
    pub item_code: String,
    pub item_name: Option<String>,
    pub description: Option<String>,
    pub item_group: Option<String>,
    pub brand: Option<String>,
    pub image: Option<String>,
    pub stock_uom: String,
    pub has_batch_no: bool,
    pub has_serial_no: bool,
    pub is_stock_item: bool,
    pub disabled: bool,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub valuation_rate: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub standard_rate: Decimal,
    pub created_at: DateTimeUtc,
    pub modified_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
