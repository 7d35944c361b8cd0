use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A financial document, immutable once submitted. Credit and debit notes
/// are invoices flagged as returns, referencing the document they reverse.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sales_invoices")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub invoice_number: String,
    /// Storefront order this invoice was issued for
    pub order_id: Option<String>,
    pub customer: Option<String>,
    pub is_return: bool,
    pub is_debit_note: bool,
    /// Invoice this note reverses, when `is_return`
    pub return_against: Option<Uuid>,
    pub update_stock: bool,
    pub status: String,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub total: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub total_taxes_and_charges: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub grand_total: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub outstanding_amount: Decimal,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::sales_invoice_line::Entity")]
    SalesInvoiceLines,
    #[sea_orm(has_many = "super::invoice_tax_charge::Entity")]
    InvoiceTaxCharges,
    #[sea_orm(has_many = "super::payment_entry::Entity")]
    PaymentEntries,
}

impl Related<super::sales_invoice_line::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SalesInvoiceLines.def()
    }
}

impl Related<super::invoice_tax_charge::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::InvoiceTaxCharges.def()
    }
}

impl Related<super::payment_entry::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PaymentEntries.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
