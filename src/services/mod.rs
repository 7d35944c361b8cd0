pub mod product_sync;
pub mod reconciliation;
pub mod refunds;
