use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder};
use tracing::{info, instrument, warn};

use crate::catalog::{self, links, ItemSnapshot, PrivilegedWriter};
use crate::entities::{catalog_item, ecommerce_link};
use crate::errors::ServiceError;

/// Result of a completed merge.
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    /// Code of the single surviving, enabled item
    pub survivor: String,
    /// Number of candidates retired (disabled)
    pub retired: usize,
}

/// Collapses a set of catalog items sharing one identity into a single
/// enabled item at the SKU identifier.
///
/// Field source of truth is the most recently modified candidate. Target
/// identity preference: a candidate already named the SKU, then a candidate
/// with a link record, then the most recently modified one. All remaining
/// candidates are disabled in place. The caller supplies the transaction;
/// any error leaves the merge to roll back whole.
#[instrument(skip(conn))]
pub async fn merge_items<C: ConnectionTrait>(
    conn: &C,
    integration: &str,
    candidate_codes: &[String],
    sku: &str,
) -> Result<MergeOutcome, ServiceError> {
    let candidates = catalog_item::Entity::find()
        .filter(catalog_item::Column::ItemCode.is_in(candidate_codes.iter().map(String::as_str)))
        .filter(catalog_item::Column::Disabled.eq(false))
        .order_by_desc(catalog_item::Column::ModifiedAt)
        .all(conn)
        .await
        .map_err(ServiceError::db_error)?;

    if candidates.is_empty() {
        return Err(ServiceError::NotFound(format!(
            "no enabled candidates for merge into {sku}"
        )));
    }

    let newest = &candidates[0];
    let snapshot = ItemSnapshot::from(newest);

    let original_codes: Vec<String> = candidates.iter().map(|c| c.item_code.clone()).collect();
    let linked = links::find_for_erp_codes(conn, integration, &original_codes).await?;

    // Target identity: exact SKU match, then a linked candidate, then newest.
    let target = candidates
        .iter()
        .find(|c| c.item_code == sku)
        .or_else(|| {
            candidates
                .iter()
                .find(|c| linked.iter().any(|l| l.erp_item_code == c.item_code))
        })
        .unwrap_or(newest);
    let target_original_code = target.item_code.clone();
    let mut target_code = target_original_code.clone();

    let writer = PrivilegedWriter::new(conn);
    let mut snapshot_written = false;

    if target_code != sku {
        if catalog::get(conn, sku).await?.is_some() {
            // A different item occupies the SKU code; the target keeps its
            // current code. Known gap, surfaced instead of silently resolved.
            warn!(
                target = %target_code,
                sku,
                "SKU code already occupied; merge target keeps its current code"
            );
        } else {
            catalog::rename_item(conn, &target_code, sku).await?;
            target_code = sku.to_string();
            writer.write_snapshot(&target_code, &snapshot).await?;
            snapshot_written = true;
        }
    }

    if !snapshot_written && target_original_code != newest.item_code {
        writer.write_snapshot(&target_code, &snapshot).await?;
    }

    let mut retired = 0;
    for candidate in &candidates {
        if candidate.item_code != target_original_code {
            writer.disable(&candidate.item_code).await?;
            retired += 1;
        }
    }

    repair_links(conn, integration, &original_codes, &target_code).await?;

    // Bump the survivor once more so downstream list views observe the merge.
    writer.touch(&target_code).await?;

    info!(survivor = %target_code, retired, "merge complete");
    Ok(MergeOutcome {
        survivor: target_code,
        retired,
    })
}

/// Re-points link rows at the surviving item and collapses duplicates so at
/// most one link resolves to the survivor.
async fn repair_links<C: ConnectionTrait>(
    conn: &C,
    integration: &str,
    original_codes: &[String],
    target_code: &str,
) -> Result<(), ServiceError> {
    let mut codes: Vec<String> = original_codes.to_vec();
    if !codes.iter().any(|c| c == target_code) {
        codes.push(target_code.to_string());
    }

    let links_found = links::find_for_erp_codes(conn, integration, &codes).await?;
    let (on_target, stale): (Vec<ecommerce_link::Model>, Vec<ecommerce_link::Model>) = links_found
        .into_iter()
        .partition(|l| l.erp_item_code == target_code);

    match on_target.first() {
        Some(anchor) => {
            for duplicate in on_target.iter().skip(1).cloned().chain(stale) {
                links::absorb(conn, anchor, duplicate).await?;
            }
        }
        None => {
            let mut stale_iter = stale.into_iter();
            if let Some(first) = stale_iter.next() {
                links::repoint(conn, first.id, target_code).await?;
                let anchor = ecommerce_link::Model {
                    erp_item_code: target_code.to_string(),
                    ..first
                };
                for duplicate in stale_iter {
                    links::absorb(conn, &anchor, duplicate).await?;
                }
            }
        }
    }

    Ok(())
}
