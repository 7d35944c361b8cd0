#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ConnectOptions, ConnectionTrait, Database,
    DatabaseConnection, Schema,
};
use tokio::sync::mpsc;
use uuid::Uuid;

use commerce_sync::config::AppConfig;
use commerce_sync::entities::{
    catalog_item, ecommerce_link, invoice_tax_charge, sales_invoice, sales_invoice_line,
};
use commerce_sync::errors::ServiceError;
use commerce_sync::events::{Event, EventSender};
use commerce_sync::storefront::{Product, ProductPage, ProductVariant, StorefrontClient};

/// Fresh in-memory SQLite database with the full schema created from the
/// entity definitions.
pub async fn setup_db() -> DatabaseConnection {
    let mut options = ConnectOptions::new("sqlite::memory:".to_owned());
    options.max_connections(1).min_connections(1);
    let db = Database::connect(options).await.expect("connect sqlite");

    let backend = db.get_database_backend();
    let schema = Schema::new(backend);
    let statements = vec![
        schema.create_table_from_entity(catalog_item::Entity),
        schema.create_table_from_entity(ecommerce_link::Entity),
        schema.create_table_from_entity(sales_invoice::Entity),
        schema.create_table_from_entity(sales_invoice_line::Entity),
        schema.create_table_from_entity(invoice_tax_charge::Entity),
        schema.create_table_from_entity(commerce_sync::entities::payment_entry::Entity),
    ];
    for statement in statements {
        db.execute(backend.build(&statement))
            .await
            .expect("create table");
    }
    db
}

pub fn test_config() -> Arc<AppConfig> {
    Arc::new(AppConfig::new("sqlite::memory:", "127.0.0.1", 0))
}

pub fn event_channel() -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(256);
    (EventSender::new(tx), rx)
}

/// Drains every event currently buffered on the channel.
pub fn drain_events(rx: &mut mpsc::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Inserts a catalog item; `age_secs` pushes its modification timestamp into
/// the past so merge ordering is deterministic.
pub async fn insert_item(
    db: &DatabaseConnection,
    code: &str,
    disabled: bool,
    age_secs: i64,
) -> catalog_item::Model {
    let stamp = Utc::now() - Duration::seconds(age_secs);
    catalog_item::ActiveModel {
        item_code: Set(code.to_string()),
        item_name: Set(Some(format!("{code} name"))),
        description: Set(Some(format!("{code} description"))),
        item_group: Set(Some("Products".to_string())),
        brand: Set(Some(format!("{code} brand"))),
        image: Set(None),
        stock_uom: Set("Nos".to_string()),
        has_batch_no: Set(false),
        has_serial_no: Set(false),
        is_stock_item: Set(true),
        disabled: Set(disabled),
        valuation_rate: Set(Decimal::new(100, 1)),
        standard_rate: Set(Decimal::new(150, 1)),
        created_at: Set(stamp),
        modified_at: Set(stamp),
    }
    .insert(db)
    .await
    .expect("insert item")
}

pub async fn insert_link(
    db: &DatabaseConnection,
    integration: &str,
    platform_code: &str,
    sku: Option<&str>,
    erp_item_code: &str,
) -> ecommerce_link::Model {
    let now = Utc::now();
    ecommerce_link::ActiveModel {
        id: Set(Uuid::new_v4()),
        integration: Set(integration.to_string()),
        integration_item_code: Set(platform_code.to_string()),
        variant_id: Set(Some(format!("var-{platform_code}"))),
        sku: Set(sku.map(str::to_string)),
        erp_item_code: Set(erp_item_code.to_string()),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await
    .expect("insert link")
}

pub struct TaxRow {
    pub account_head: &'static str,
    pub rate: Decimal,
    pub tax_amount: Decimal,
    /// item code -> (rate, amount)
    pub detail: BTreeMap<String, (Decimal, Decimal)>,
}

/// Inserts a submitted invoice with the given lines and tax rows; the
/// outstanding balance starts at the grand total.
pub async fn insert_invoice(
    db: &DatabaseConnection,
    order_id: &str,
    lines: &[(&str, Decimal, Decimal)],
    taxes: Vec<TaxRow>,
) -> sales_invoice::Model {
    let now = Utc::now();
    let total: Decimal = lines.iter().map(|(_, qty, rate)| *qty * *rate).sum();
    let tax_total: Decimal = taxes.iter().map(|t| t.tax_amount).sum();
    let invoice_id = Uuid::new_v4();

    let invoice = sales_invoice::ActiveModel {
        id: Set(invoice_id),
        invoice_number: Set(format!("SINV-{order_id}")),
        order_id: Set(Some(order_id.to_string())),
        customer: Set(Some("ACME".to_string())),
        is_return: Set(false),
        is_debit_note: Set(false),
        return_against: Set(None),
        update_stock: Set(true),
        status: Set("Submitted".to_string()),
        total: Set(total),
        total_taxes_and_charges: Set(tax_total),
        grand_total: Set(total + tax_total),
        outstanding_amount: Set(total + tax_total),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await
    .expect("insert invoice");

    for (item_code, qty, rate) in lines {
        sales_invoice_line::ActiveModel {
            id: Set(Uuid::new_v4()),
            invoice_id: Set(invoice_id),
            item_code: Set(item_code.to_string()),
            qty: Set(*qty),
            rate: Set(*rate),
            amount: Set(*qty * *rate),
            warehouse: Set(Some("Main".to_string())),
            income_account: Set(Some("Sales".to_string())),
            created_at: Set(now),
        }
        .insert(db)
        .await
        .expect("insert invoice line");
    }

    for tax in taxes {
        invoice_tax_charge::ActiveModel {
            id: Set(Uuid::new_v4()),
            invoice_id: Set(invoice_id),
            account_head: Set(tax.account_head.to_string()),
            rate: Set(tax.rate),
            tax_amount: Set(tax.tax_amount),
            item_wise_tax_detail: Set(serde_json::to_value(&tax.detail).unwrap()),
            created_at: Set(now),
        }
        .insert(db)
        .await
        .expect("insert tax charge");
    }

    invoice
}

/// Builds a product with a single variant carrying the given SKU.
pub fn product(id: &str, sku: Option<&str>) -> Product {
    Product {
        id: id.to_string(),
        title: Some(format!("Product {id}")),
        variants: sku
            .map(|sku| {
                vec![ProductVariant {
                    id: format!("var-{id}"),
                    sku: Some(sku.to_string()),
                    title: None,
                    price: Some(Decimal::new(1999, 2)),
                }]
            })
            .unwrap_or_default(),
        created_at: Some(Utc::now()),
    }
}

/// Storefront double serving a fixed product list as a single page.
pub struct FixtureStorefront {
    pub products: Vec<Product>,
}

impl FixtureStorefront {
    pub fn new(products: Vec<Product>) -> Arc<Self> {
        Arc::new(Self { products })
    }
}

#[async_trait]
impl StorefrontClient for FixtureStorefront {
    async fn products_created_between(
        &self,
        _from: DateTime<Utc>,
        _to: Option<DateTime<Utc>>,
        _cursor: Option<String>,
    ) -> Result<ProductPage, ServiceError> {
        Ok(ProductPage {
            products: self.products.clone(),
            next: None,
        })
    }

    async fn find_product(&self, product_id: &str) -> Result<Option<Product>, ServiceError> {
        Ok(self.products.iter().find(|p| p.id == product_id).cloned())
    }

    async fn product_count(&self) -> Result<u64, ServiceError> {
        Ok(self.products.len() as u64)
    }
}
