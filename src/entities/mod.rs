pub mod catalog_item;
pub mod ecommerce_link;
pub mod invoice_tax_charge;
pub mod payment_entry;
pub mod sales_invoice;
pub mod sales_invoice_line;
