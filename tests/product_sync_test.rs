mod common;

use std::sync::Arc;

use rust_decimal_macros::dec;
use sea_orm::EntityTrait;

use commerce_sync::catalog;
use commerce_sync::context::ExecutionContext;
use commerce_sync::entities::ecommerce_link;
use commerce_sync::events::Event;
use commerce_sync::services::product_sync::ProductSyncService;

use common::{
    drain_events, event_channel, insert_item, insert_link, product, setup_db, test_config,
    FixtureStorefront,
};

const INTEGRATION: &str = "shopify";

fn sync_service(
    db: Arc<sea_orm::DatabaseConnection>,
    storefront: Arc<FixtureStorefront>,
) -> (ProductSyncService, tokio::sync::mpsc::Receiver<Event>) {
    let (events, rx) = event_channel();
    (
        ProductSyncService::new(db, storefront, events, test_config()),
        rx,
    )
}

#[tokio::test]
async fn sync_creates_item_and_link() {
    let db = Arc::new(setup_db().await);
    let storefront = FixtureStorefront::new(vec![product("1001", Some("SP-1"))]);
    let (service, _rx) = sync_service(db.clone(), storefront);

    let outcome = service
        .sync_product(&ExecutionContext::system(), "1001")
        .await
        .expect("sync runs");
    assert_eq!(outcome.code, 200);
    assert_eq!(outcome.message, "Successful");

    let item = catalog::get_enabled(&*db, "SP-1")
        .await
        .expect("query item")
        .expect("item created");
    assert_eq!(item.stock_uom, "Nos");
    assert_eq!(item.standard_rate, dec!(19.99));

    let links = ecommerce_link::Entity::find()
        .all(&*db)
        .await
        .expect("query links");
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].integration, INTEGRATION);
    assert_eq!(links[0].integration_item_code, "1001");
    assert_eq!(links[0].sku.as_deref(), Some("SP-1"));
    assert_eq!(links[0].erp_item_code, "SP-1");
}

#[tokio::test]
async fn already_synced_product_is_skipped() {
    let db = Arc::new(setup_db().await);
    insert_item(&db, "SP-2", false, 10).await;
    insert_link(&db, INTEGRATION, "1002", Some("SP-2"), "SP-2").await;

    let storefront = FixtureStorefront::new(vec![product("1002", Some("SP-2"))]);
    let (service, _rx) = sync_service(db.clone(), storefront);

    let outcome = service
        .sync_product(&ExecutionContext::system(), "1002")
        .await
        .expect("sync runs");
    assert_eq!(outcome.code, 200);
    assert!(outcome.message.contains("already synced"));

    let links = ecommerce_link::Entity::find()
        .all(&*db)
        .await
        .expect("query links");
    assert_eq!(links.len(), 1);
}

#[tokio::test]
async fn existing_unlinked_item_is_a_conflict() {
    let db = Arc::new(setup_db().await);
    insert_item(&db, "SP-3", false, 10).await;

    let storefront = FixtureStorefront::new(vec![product("1003", Some("SP-3"))]);
    let (service, _rx) = sync_service(db.clone(), storefront);

    let outcome = service
        .sync_product(&ExecutionContext::system(), "1003")
        .await
        .expect("sync runs");
    assert_eq!(outcome.code, 409);
    assert!(outcome.message.contains("already exists"));

    let links = ecommerce_link::Entity::find()
        .all(&*db)
        .await
        .expect("query links");
    assert!(links.is_empty());
}

#[tokio::test]
async fn bulk_sync_continues_past_a_failed_product() {
    let db = Arc::new(setup_db().await);
    insert_item(&db, "TAKEN", false, 10).await;

    let storefront = FixtureStorefront::new(vec![
        product("1004", Some("OK-1")),
        product("1005", Some("TAKEN")),
        product("1006", Some("OK-2")),
    ]);
    let (service, mut rx) = sync_service(db.clone(), storefront);

    service
        .sync_bulk(
            &ExecutionContext::system(),
            vec!["1004".to_string(), "1005".to_string(), "1006".to_string()],
        )
        .await
        .expect("bulk run completes");

    assert!(catalog::get_enabled(&*db, "OK-1").await.expect("query").is_some());
    assert!(catalog::get_enabled(&*db, "OK-2").await.expect("query").is_some());

    let progress: Vec<_> = drain_events(&mut rx)
        .into_iter()
        .filter_map(|e| match e {
            Event::SyncProgress(update) => Some(update),
            _ => None,
        })
        .collect();
    assert_eq!(progress.iter().filter(|p| p.error).count(), 1);
    assert_eq!(progress.iter().filter(|p| p.succeeded).count(), 2);
    assert!(progress.last().map(|p| p.done).unwrap_or(false));
}

#[tokio::test]
async fn bulk_sync_sees_links_written_earlier_in_the_same_run() {
    let db = Arc::new(setup_db().await);
    let storefront = FixtureStorefront::new(vec![product("1007", Some("NEW-1"))]);
    let (service, mut rx) = sync_service(db.clone(), storefront);

    // the second occurrence must observe the link row the first one wrote
    // inside the still-open bulk transaction
    service
        .sync_bulk(
            &ExecutionContext::system(),
            vec!["1007".to_string(), "1007".to_string()],
        )
        .await
        .expect("bulk run completes");

    assert!(catalog::get_enabled(&*db, "NEW-1").await.expect("query").is_some());
    let links = ecommerce_link::Entity::find()
        .all(&*db)
        .await
        .expect("query links");
    assert_eq!(links.len(), 1);

    let progress: Vec<_> = drain_events(&mut rx)
        .into_iter()
        .filter_map(|e| match e {
            Event::SyncProgress(update) => Some(update),
            _ => None,
        })
        .collect();
    assert_eq!(progress.iter().filter(|p| p.succeeded).count(), 1);
    assert_eq!(progress.iter().filter(|p| p.error).count(), 0);
    assert!(progress.iter().any(|p| p.message.contains("already synced")));
}

#[tokio::test]
async fn product_counts_cover_storefront_links_and_catalog() {
    let db = Arc::new(setup_db().await);
    insert_item(&db, "E1", false, 10).await;
    insert_item(&db, "E2", false, 10).await;
    insert_item(&db, "GONE", true, 10).await;
    insert_link(&db, INTEGRATION, "2001", Some("E1"), "E1").await;

    let storefront = FixtureStorefront::new(vec![
        product("2001", Some("E1")),
        product("2002", Some("X1")),
        product("2003", Some("X2")),
    ]);
    let (service, _rx) = sync_service(db.clone(), storefront);

    let counts = service
        .product_counts(&ExecutionContext::system())
        .await
        .expect("counts computed");
    assert_eq!(counts.storefront_count, 3);
    assert_eq!(counts.synced_count, 1);
    assert_eq!(counts.erp_count, 2);
}
