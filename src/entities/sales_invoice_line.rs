use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sales_invoice_lines")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub invoice_id: Uuid,
    pub item_code: String,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub qty: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub rate: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub amount: Decimal,
    pub warehouse: Option<String>,
    pub income_account: Option<String>,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::sales_invoice::Entity",
        from = "Column::InvoiceId",
        to = "super::sales_invoice::Column::Id"
    )]
    SalesInvoice,
}

impl Related<super::sales_invoice::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SalesInvoice.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
