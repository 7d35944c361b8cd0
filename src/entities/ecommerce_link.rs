use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Cross-reference row binding a storefront identity (platform item code,
/// variant, SKU) to the ERP item code it currently resolves to. At most one
/// row should resolve to a given ERP item code per integration.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "ecommerce_links")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub integration: String,
    pub integration_item_code: String,
    pub variant_id: Option<String>,
    pub sku: Option<String>,
    pub erp_item_code: String,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
