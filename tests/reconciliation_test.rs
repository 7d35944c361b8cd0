mod common;

use std::sync::Arc;

use chrono::{Duration, Utc};
use rust_decimal_macros::dec;
use sea_orm::EntityTrait;

use commerce_sync::catalog;
use commerce_sync::context::ExecutionContext;
use commerce_sync::entities::{catalog_item, ecommerce_link, sales_invoice_line};
use commerce_sync::events::Event;
use commerce_sync::services::reconciliation::{
    merge, CandidatePair, MatcherService, ReconcilerService,
};

use common::{
    drain_events, event_channel, insert_invoice, insert_item, insert_link, product, setup_db,
    test_config, FixtureStorefront,
};

const INTEGRATION: &str = "shopify";

fn reconciler(
    db: Arc<sea_orm::DatabaseConnection>,
    storefront: Arc<FixtureStorefront>,
) -> (ReconcilerService, tokio::sync::mpsc::Receiver<Event>) {
    let (events, rx) = event_channel();
    (
        ReconcilerService::new(db, storefront, events, test_config()),
        rx,
    )
}

#[tokio::test]
async fn merge_prefers_sku_named_target_and_snapshots_newest() {
    let db = Arc::new(setup_db().await);
    // "111" is the most recently modified candidate, so it is the field
    // source of truth even though "SKU-9" keeps the identity
    insert_item(&db, "111", false, 10).await;
    insert_item(&db, "SKU-9", false, 3600).await;
    insert_link(&db, INTEGRATION, "111", Some("SKU-9"), "111").await;

    let outcome = merge::merge_items(
        &*db,
        INTEGRATION,
        &["111".to_string(), "SKU-9".to_string()],
        "SKU-9",
    )
    .await
    .expect("merge succeeds");

    assert_eq!(outcome.survivor, "SKU-9");
    assert_eq!(outcome.retired, 1);

    let survivor = catalog::get_enabled(&*db, "SKU-9")
        .await
        .expect("query survivor")
        .expect("survivor enabled");
    assert_eq!(survivor.brand.as_deref(), Some("111 brand"));
    assert_eq!(survivor.item_name.as_deref(), Some("111 name"));

    let retired = catalog::get(&*db, "111")
        .await
        .expect("query retired")
        .expect("retired still present");
    assert!(retired.disabled);

    let links = ecommerce_link::Entity::find()
        .all(&*db)
        .await
        .expect("query links");
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].erp_item_code, "SKU-9");
}

#[tokio::test]
async fn merge_renames_sole_candidate_when_sku_is_free() {
    let db = Arc::new(setup_db().await);
    insert_item(&db, "222", false, 10).await;
    insert_link(&db, INTEGRATION, "222", Some("SKU-22"), "222").await;

    let outcome = merge::merge_items(&*db, INTEGRATION, &["222".to_string()], "SKU-22")
        .await
        .expect("merge succeeds");

    assert_eq!(outcome.survivor, "SKU-22");
    assert_eq!(outcome.retired, 0);
    assert!(catalog::get(&*db, "222").await.expect("query").is_none());
    assert!(catalog::get_enabled(&*db, "SKU-22")
        .await
        .expect("query")
        .is_some());

    let links = ecommerce_link::Entity::find()
        .all(&*db)
        .await
        .expect("query links");
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].erp_item_code, "SKU-22");
}

#[tokio::test]
async fn occupied_sku_code_leaves_target_under_its_current_code() {
    let db = Arc::new(setup_db().await);
    insert_item(&db, "333", false, 10).await;
    // a retired item still occupies the SKU code
    insert_item(&db, "SKU-33", true, 3600).await;

    let outcome = merge::merge_items(&*db, INTEGRATION, &["333".to_string()], "SKU-33")
        .await
        .expect("merge succeeds");

    assert_eq!(outcome.survivor, "333");
    assert!(catalog::get_enabled(&*db, "333")
        .await
        .expect("query")
        .is_some());
    let occupant = catalog::get(&*db, "SKU-33")
        .await
        .expect("query")
        .expect("occupant kept");
    assert!(occupant.disabled);
}

#[tokio::test]
async fn merge_collapses_duplicate_links_onto_survivor() {
    let db = Arc::new(setup_db().await);
    insert_item(&db, "444", false, 10).await;
    insert_item(&db, "SKU-44", false, 3600).await;
    insert_link(&db, INTEGRATION, "P444", Some("SKU-44"), "444").await;
    insert_link(&db, INTEGRATION, "OLD44", Some("SKU-44"), "SKU-44").await;

    merge::merge_items(
        &*db,
        INTEGRATION,
        &["444".to_string(), "SKU-44".to_string()],
        "SKU-44",
    )
    .await
    .expect("merge succeeds");

    let links = ecommerce_link::Entity::find()
        .all(&*db)
        .await
        .expect("query links");
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].erp_item_code, "SKU-44");
    // the stale link's platform identity wins on the surviving row
    assert_eq!(links[0].integration_item_code, "P444");
}

#[tokio::test]
async fn matcher_classification_is_idempotent() {
    let db = Arc::new(setup_db().await);
    insert_item(&db, "P1", false, 10).await;
    insert_item(&db, "S1", false, 10).await;

    let storefront = FixtureStorefront::new(vec![
        product("P1", Some("S1")),
        product("P2", Some("S2")),
        product("NOSKU", None),
    ]);
    let matcher = MatcherService::new(db.clone(), storefront);
    let ctx = ExecutionContext::system();
    let window_start = Utc::now() - Duration::days(7);

    for _ in 0..2 {
        let candidates = matcher
            .unreconciled_products(&ctx, window_start, None)
            .await
            .expect("matching succeeds");
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].product.id, "P1");
        assert!(candidates[0].needs_reconciliation);
        assert!(candidates[0].requires_merging);
    }
}

#[tokio::test]
async fn disabled_items_never_match() {
    let db = Arc::new(setup_db().await);
    insert_item(&db, "P3", true, 10).await;

    let storefront = FixtureStorefront::new(vec![product("P3", Some("S3"))]);
    let matcher = MatcherService::new(db.clone(), storefront);

    let candidates = matcher
        .unreconciled_products(&ExecutionContext::system(), Utc::now() - Duration::days(7), None)
        .await
        .expect("matching succeeds");
    assert!(candidates.is_empty());
}

#[tokio::test]
async fn merge_required_keeps_only_pairs_with_both_items_enabled() {
    let db = Arc::new(setup_db().await);
    insert_item(&db, "P1", false, 10).await;
    insert_item(&db, "S1", false, 10).await;

    let matcher = MatcherService::new(db.clone(), FixtureStorefront::new(vec![]));
    let required = matcher
        .merge_required(
            &ExecutionContext::system(),
            vec![
                CandidatePair {
                    id: "P1".to_string(),
                    sku: "S1".to_string(),
                },
                CandidatePair {
                    id: "P2".to_string(),
                    sku: "S2".to_string(),
                },
            ],
        )
        .await
        .expect("filter succeeds");
    assert_eq!(required, vec!["P1".to_string()]);
}

#[tokio::test]
async fn reconcile_one_reports_missing_sku_as_bad_request() {
    let db = Arc::new(setup_db().await);
    let storefront = FixtureStorefront::new(vec![product("P4", None)]);
    let (service, _rx) = reconciler(db, storefront);

    let outcome = service
        .reconcile_one(&ExecutionContext::system(), "P4")
        .await
        .expect("outcome returned");
    assert_eq!(outcome.code, 400);
    assert_eq!(
        outcome.message,
        "Error reconciling product P4: No SKU found for this product"
    );
}

#[tokio::test]
async fn reconcile_one_reports_unknown_product_as_not_found() {
    let db = Arc::new(setup_db().await);
    let (service, _rx) = reconciler(db, FixtureStorefront::new(vec![]));

    let outcome = service
        .reconcile_one(&ExecutionContext::system(), "MISSING")
        .await
        .expect("outcome returned");
    assert_eq!(outcome.code, 404);
}

#[tokio::test]
async fn reconcile_one_renames_and_cascades_invoice_lines() {
    let db = Arc::new(setup_db().await);
    insert_item(&db, "P5", false, 10).await;
    let invoice = insert_invoice(&db, "ORD-R", &[("P5", dec!(1), dec!(10))], vec![]).await;

    let storefront = FixtureStorefront::new(vec![product("P5", Some("S5"))]);
    let (service, mut rx) = reconciler(db.clone(), storefront);

    let outcome = service
        .reconcile_one(&ExecutionContext::system(), "P5")
        .await
        .expect("outcome returned");
    assert!(outcome.is_success());
    assert_eq!(outcome.message, "Successful");

    assert!(catalog::get(&*db, "P5").await.expect("query").is_none());
    assert!(catalog::get_enabled(&*db, "S5")
        .await
        .expect("query")
        .is_some());

    let lines = sales_invoice_line::Entity::find()
        .all(&*db)
        .await
        .expect("query lines");
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].invoice_id, invoice.id);
    assert_eq!(lines[0].item_code, "S5");

    let events = drain_events(&mut rx);
    assert!(events.iter().any(|e| matches!(
        e,
        Event::ItemRenamed { old_code, new_code } if old_code == "P5" && new_code == "S5"
    )));
}

#[tokio::test]
async fn reconcile_one_merges_when_sku_item_exists() {
    let db = Arc::new(setup_db().await);
    insert_item(&db, "P6", false, 10).await;
    insert_item(&db, "S6", false, 3600).await;

    let storefront = FixtureStorefront::new(vec![product("P6", Some("S6"))]);
    let (service, mut rx) = reconciler(db.clone(), storefront);

    let outcome = service
        .reconcile_one(&ExecutionContext::system(), "P6")
        .await
        .expect("outcome returned");
    assert!(outcome.is_success());

    let survivor = catalog::get_enabled(&*db, "S6")
        .await
        .expect("query")
        .expect("survivor enabled");
    assert!(!survivor.disabled);
    let retired = catalog::get(&*db, "P6")
        .await
        .expect("query")
        .expect("retired present");
    assert!(retired.disabled);

    // exactly one enabled item remains for the identity
    let enabled: Vec<_> = catalog_item::Entity::find()
        .all(&*db)
        .await
        .expect("query items")
        .into_iter()
        .filter(|item| !item.disabled)
        .collect();
    assert_eq!(enabled.len(), 1);

    let events = drain_events(&mut rx);
    assert!(events.iter().any(|e| matches!(
        e,
        Event::ItemsMerged { survivor, retired } if survivor == "S6" && *retired == 1
    )));
}

#[tokio::test]
async fn bulk_failure_rolls_back_one_item_and_continues() {
    let db = Arc::new(setup_db().await);
    insert_item(&db, "A", false, 10).await;
    insert_item(&db, "C", false, 10).await;
    // no item "B": its reconciliation fails inside the shared transaction

    let storefront = FixtureStorefront::new(vec![
        product("A", Some("SA")),
        product("B", Some("SB")),
        product("C", Some("SC")),
    ]);
    let (service, mut rx) = reconciler(db.clone(), storefront);

    service
        .reconcile_bulk(
            &ExecutionContext::system(),
            vec!["A".to_string(), "B".to_string(), "C".to_string()],
        )
        .await
        .expect("bulk run completes");

    assert!(catalog::get_enabled(&*db, "SA").await.expect("query").is_some());
    assert!(catalog::get_enabled(&*db, "SC").await.expect("query").is_some());
    assert!(catalog::get(&*db, "SB").await.expect("query").is_none());

    let progress: Vec<_> = drain_events(&mut rx)
        .into_iter()
        .filter_map(|e| match e {
            Event::SyncProgress(update) => Some(update),
            _ => None,
        })
        .collect();
    assert_eq!(progress.len(), 4);
    assert!(progress[0].succeeded);
    assert!(progress[1].error);
    assert!(progress[1].message.contains("Item not found"));
    assert!(progress[2].succeeded);
    assert!(progress[3].done);
    assert!(progress[3].message.starts_with("Done in "));
}
