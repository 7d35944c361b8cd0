use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, QueryFilter, TransactionTrait,
};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::catalog::links;
use crate::config::{AppConfig, TaxSignPolicy};
use crate::context::{ExecutionContext, Scope};
use crate::entities::{invoice_tax_charge, payment_entry, sales_invoice, sales_invoice_line};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::storefront::{OrderAdjustment, RefundLineItem, RefundPayload};

/// Per-item `[rate, amount]` tax distribution of one tax charge.
type TaxDetailMap = BTreeMap<String, (Decimal, Decimal)>;

fn parse_detail(value: &serde_json::Value) -> Result<TaxDetailMap, ServiceError> {
    if value.is_null() {
        return Ok(TaxDetailMap::new());
    }
    Ok(serde_json::from_value(value.clone())?)
}

fn detail_to_json(detail: &TaxDetailMap) -> Result<serde_json::Value, ServiceError> {
    Ok(serde_json::to_value(detail)?)
}

/// In-memory draft of a credit or debit note before it is committed.
#[derive(Debug, Clone)]
struct NoteDraft {
    lines: Vec<DraftLine>,
    taxes: Vec<DraftTax>,
    update_stock: bool,
    is_debit_note: bool,
}

#[derive(Debug, Clone)]
struct DraftLine {
    item_code: String,
    qty: Decimal,
    rate: Decimal,
    amount: Decimal,
    warehouse: Option<String>,
    income_account: Option<String>,
}

#[derive(Debug, Clone)]
struct DraftTax {
    account_head: String,
    rate: Decimal,
    tax_amount: Decimal,
    detail: TaxDetailMap,
}

impl NoteDraft {
    fn lines_total(&self) -> Decimal {
        self.lines.iter().map(|l| l.amount).sum()
    }

    fn tax_total(&self) -> Decimal {
        self.taxes.iter().map(|t| t.tax_amount).sum()
    }

    fn grand_total(&self) -> Decimal {
        self.lines_total() + self.tax_total()
    }
}

/// One refunded invoice line after resolution against the link table.
#[derive(Debug, Clone)]
struct ReturnedLine {
    qty: Decimal,
    rate: Decimal,
    basis: Decimal,
}

/// Result of one refund intake. An invoice-less refund is an invalid intake,
/// recorded and acknowledged, not an error.
#[derive(Debug, Clone)]
pub enum RefundOutcome {
    Success,
    Invalid(String),
}

/// Translates storefront refund events into credit/debit notes against the
/// originating invoice, with proportionally correct tax re-apportionment,
/// then settles the invoice's outstanding balance.
#[derive(Clone)]
pub struct RefundService {
    db: Arc<DatabaseConnection>,
    events: EventSender,
    config: Arc<AppConfig>,
}

impl RefundService {
    pub fn new(db: Arc<DatabaseConnection>, events: EventSender, config: Arc<AppConfig>) -> Self {
        Self { db, events, config }
    }

    /// Entry point for refund webhooks. The whole translation runs as one
    /// transaction; events are emitted only after commit.
    #[instrument(skip(self, ctx, payload), fields(order_id = %payload.order_id))]
    pub async fn process_refund(
        &self,
        ctx: &ExecutionContext,
        payload: RefundPayload,
    ) -> Result<RefundOutcome, ServiceError> {
        payload.validate()?;
        ctx.require(Scope::DocumentWrite)?;

        let Some(invoice) = self.find_invoice(&payload.order_id).await? else {
            let reason = "Sales invoice not found for creating credit note".to_string();
            warn!(order_id = %payload.order_id, "{reason}");
            self.events
                .send(Event::RefundIgnored {
                    order_id: payload.order_id.clone(),
                    reason: reason.clone(),
                })
                .await;
            return Ok(RefundOutcome::Invalid(reason));
        };

        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;
        match self.translate(&txn, &invoice, &payload).await {
            Ok(events) => {
                txn.commit().await.map_err(ServiceError::db_error)?;
                for event in events {
                    self.events.send(event).await;
                }
                info!(invoice = %invoice.invoice_number, "refund translated");
                Ok(RefundOutcome::Success)
            }
            Err(err) => {
                if let Err(rollback_err) = txn.rollback().await {
                    warn!("Rollback failed: {}", rollback_err);
                }
                error!(invoice = %invoice.invoice_number, error = %err, "refund translation failed");
                Err(err)
            }
        }
    }

    async fn find_invoice(
        &self,
        order_id: &str,
    ) -> Result<Option<sales_invoice::Model>, ServiceError> {
        sales_invoice::Entity::find()
            .filter(sales_invoice::Column::OrderId.eq(order_id))
            .filter(sales_invoice::Column::IsReturn.eq(false))
            .filter(sales_invoice::Column::IsDebitNote.eq(false))
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)
    }

    async fn translate<C: ConnectionTrait>(
        &self,
        conn: &C,
        invoice: &sales_invoice::Model,
        payload: &RefundPayload,
    ) -> Result<Vec<Event>, ServiceError> {
        let mut events = Vec::new();

        if !payload.refund_line_items.is_empty() {
            let (note_id, grand_total) = self.make_credit_note(conn, invoice, payload).await?;
            events.push(Event::CreditNoteIssued {
                invoice_id: invoice.id,
                note_id,
                amount: grand_total,
            });
        }

        // order-level adjustments stand on their own: a refund can carry
        // both returned lines and a discrepancy amount
        if !payload.order_adjustments.is_empty() {
            let (note_id, grand_total) = self
                .make_debit_note(conn, invoice, &payload.order_adjustments)
                .await?;
            events.push(Event::DebitNoteIssued {
                invoice_id: invoice.id,
                note_id,
                amount: grand_total,
            });
        }

        if let Some(amount) = self.make_payment_entry(conn, invoice.id).await? {
            events.push(Event::PaymentEntryCreated {
                invoice_id: invoice.id,
                amount,
            });
        }

        Ok(events)
    }

    /// Builds a structural return copy of the invoice: every line negated,
    /// warehouse overridden when configured, tax detail sign-inverted or
    /// zeroed per policy.
    async fn build_return_copy<C: ConnectionTrait>(
        &self,
        conn: &C,
        invoice: &sales_invoice::Model,
    ) -> Result<NoteDraft, ServiceError> {
        let lines = sales_invoice_line::Entity::find()
            .filter(sales_invoice_line::Column::InvoiceId.eq(invoice.id))
            .all(conn)
            .await
            .map_err(ServiceError::db_error)?;
        let taxes = invoice_tax_charge::Entity::find()
            .filter(invoice_tax_charge::Column::InvoiceId.eq(invoice.id))
            .all(conn)
            .await
            .map_err(ServiceError::db_error)?;

        let warehouse_override = self.config.integration.warehouse.clone();
        let draft_lines = lines
            .into_iter()
            .map(|line| DraftLine {
                item_code: line.item_code,
                qty: -line.qty,
                rate: line.rate,
                amount: -line.amount,
                warehouse: warehouse_override.clone().or(line.warehouse),
                income_account: line.income_account,
            })
            .collect();

        let policy = self.config.integration.tax_sign_policy;
        let mut draft_taxes = Vec::with_capacity(taxes.len());
        for tax in taxes {
            let mut detail = parse_detail(&tax.item_wise_tax_detail)?;
            for entry in detail.values_mut() {
                *entry = match policy {
                    TaxSignPolicy::Invert => (-entry.0, -entry.1),
                    TaxSignPolicy::Zero => (Decimal::ZERO, Decimal::ZERO),
                };
            }
            draft_taxes.push(DraftTax {
                account_head: tax.account_head,
                rate: tax.rate,
                tax_amount: -tax.tax_amount,
                detail,
            });
        }

        Ok(NoteDraft {
            lines: draft_lines,
            taxes: draft_taxes,
            update_stock: true,
            is_debit_note: false,
        })
    }

    /// Resolves refunded lines to ERP item codes through the link table,
    /// falling back to the raw SKU.
    async fn resolve_returned_lines<C: ConnectionTrait>(
        &self,
        conn: &C,
        refund_lines: &[RefundLineItem],
    ) -> Result<BTreeMap<String, ReturnedLine>, ServiceError> {
        let integration = &self.config.integration.integration_name;
        let mut returned = BTreeMap::new();

        for line in refund_lines {
            let resolved = links::resolve_item_code(
                conn,
                integration,
                line.line_item.sku.as_deref(),
                line.line_item.variant_id.as_deref(),
            )
            .await?;
            let item_code = resolved
                .or_else(|| line.line_item.sku.clone())
                .ok_or_else(|| {
                    ServiceError::ValidationError(
                        "refund line has no SKU or variant resolving to an item".to_string(),
                    )
                })?;

            returned.insert(
                item_code,
                ReturnedLine {
                    qty: line.quantity,
                    rate: line.credited_rate(),
                    basis: line.price_basis(),
                },
            );
        }

        Ok(returned)
    }

    /// Restricts a return copy to the refunded items and re-apportions each
    /// tax entry as `original_amount × (returned_qty / invoiced_qty)`. An
    /// item whose invoiced quantity is zero (already fully returned)
    /// contributes zero instead of dividing.
    fn handle_partial_returns(
        draft: &mut NoteDraft,
        returned: &BTreeMap<String, ReturnedLine>,
        invoiced_qty: &BTreeMap<String, Decimal>,
    ) {
        draft.lines.retain(|line| returned.contains_key(&line.item_code));
        for line in &mut draft.lines {
            let ret = &returned[&line.item_code];
            line.qty = -ret.qty;
            line.rate = ret.rate;
            line.amount = -ret.basis;
        }

        let mut returned_qty: BTreeMap<String, Decimal> = BTreeMap::new();
        for line in &draft.lines {
            *returned_qty.entry(line.item_code.clone()).or_default() += line.qty.abs();
        }

        for tax in &mut draft.taxes {
            let mut new_tax_amount = Decimal::ZERO;
            for (item_code, entry) in tax.detail.iter_mut() {
                if entry.0.is_zero() {
                    continue;
                }
                let ratio = match invoiced_qty.get(item_code) {
                    Some(total) if !total.is_zero() => {
                        returned_qty.get(item_code).copied().unwrap_or_default() / total
                    }
                    _ => Decimal::ZERO,
                };
                entry.1 *= ratio;
                new_tax_amount += entry.1;
            }
            tax.tax_amount = new_tax_amount;
        }
    }

    async fn make_credit_note<C: ConnectionTrait>(
        &self,
        conn: &C,
        invoice: &sales_invoice::Model,
        payload: &RefundPayload,
    ) -> Result<(Uuid, Decimal), ServiceError> {
        let mut draft = self.build_return_copy(conn, invoice).await?;
        if !payload.restock {
            draft.update_stock = false;
        }

        let returned = self
            .resolve_returned_lines(conn, &payload.refund_line_items)
            .await?;

        let invoice_lines = sales_invoice_line::Entity::find()
            .filter(sales_invoice_line::Column::InvoiceId.eq(invoice.id))
            .all(conn)
            .await
            .map_err(ServiceError::db_error)?;
        let mut invoiced_qty: BTreeMap<String, Decimal> = BTreeMap::new();
        for line in &invoice_lines {
            *invoiced_qty.entry(line.item_code.clone()).or_default() += line.qty.abs();
        }

        Self::handle_partial_returns(&mut draft, &returned, &invoiced_qty);

        if draft.lines.is_empty() {
            return Err(ServiceError::ValidationError(
                "no refunded line matches an invoice line".to_string(),
            ));
        }

        let note_id = self.insert_note(conn, invoice, &draft, "RET").await?;
        let grand_total = draft.grand_total();
        self.settle_against_invoice(conn, invoice.id, grand_total)
            .await?;
        Ok((note_id, grand_total))
    }

    /// Builds a debit note for order-level adjustments: a return copy whose
    /// line rates are rescaled so the total line+tax value equals the
    /// adjustment amount exactly, with every quantity forced to zero so
    /// stock is unaffected.
    async fn make_debit_note<C: ConnectionTrait>(
        &self,
        conn: &C,
        invoice: &sales_invoice::Model,
        adjustments: &[OrderAdjustment],
    ) -> Result<(Uuid, Decimal), ServiceError> {
        let amount: Decimal = adjustments
            .iter()
            .map(|adj| adj.amount + adj.tax_amount)
            .sum();

        let original_amount = invoice.total + invoice.total_taxes_and_charges;
        if original_amount.is_zero() {
            return Err(ServiceError::ValidationError(
                "cannot scale adjustment against a zero-value invoice".to_string(),
            ));
        }
        let ratio = amount / original_amount;

        let mut draft = self.build_return_copy(conn, invoice).await?;
        draft.is_debit_note = true;
        draft.update_stock = false;

        for line in &mut draft.lines {
            // amount carries the rescaled value; qty stays zero so the line
            // never touches stock
            let share = (line.rate * line.qty.abs()) / original_amount;
            line.rate = -share * amount;
            line.qty = Decimal::ZERO;
            line.amount = line.rate;
        }

        for tax in &mut draft.taxes {
            for entry in tax.detail.values_mut() {
                if entry.1.is_zero() {
                    continue;
                }
                entry.0 *= ratio;
                entry.1 *= ratio;
            }
            tax.tax_amount *= ratio;
        }

        let note_id = self.insert_note(conn, invoice, &draft, "ADJ").await?;
        let grand_total = draft.grand_total();
        self.settle_against_invoice(conn, invoice.id, grand_total)
            .await?;
        Ok((note_id, grand_total))
    }

    /// Commits a note draft: one invoice row flagged as a return, plus its
    /// lines and tax charges. Inserted through the privileged path; drafts
    /// are derived documents, not user input.
    async fn insert_note<C: ConnectionTrait>(
        &self,
        conn: &C,
        invoice: &sales_invoice::Model,
        draft: &NoteDraft,
        suffix: &str,
    ) -> Result<Uuid, ServiceError> {
        let note_id = Uuid::new_v4();
        let now = Utc::now();
        let number = format!(
            "{}-{}-{}",
            invoice.invoice_number,
            suffix,
            &note_id.simple().to_string()[..8]
        );

        let note = sales_invoice::ActiveModel {
            id: Set(note_id),
            invoice_number: Set(number),
            order_id: Set(invoice.order_id.clone()),
            customer: Set(invoice.customer.clone()),
            is_return: Set(true),
            is_debit_note: Set(draft.is_debit_note),
            return_against: Set(Some(invoice.id)),
            update_stock: Set(draft.update_stock),
            status: Set("Submitted".to_string()),
            total: Set(draft.lines_total()),
            total_taxes_and_charges: Set(draft.tax_total()),
            grand_total: Set(draft.grand_total()),
            outstanding_amount: Set(Decimal::ZERO),
            created_at: Set(now),
            updated_at: Set(now),
        };
        note.insert(conn).await.map_err(ServiceError::db_error)?;

        for line in &draft.lines {
            let model = sales_invoice_line::ActiveModel {
                id: Set(Uuid::new_v4()),
                invoice_id: Set(note_id),
                item_code: Set(line.item_code.clone()),
                qty: Set(line.qty),
                rate: Set(line.rate),
                amount: Set(line.amount),
                warehouse: Set(line.warehouse.clone()),
                income_account: Set(line.income_account.clone()),
                created_at: Set(now),
            };
            model.insert(conn).await.map_err(ServiceError::db_error)?;
        }

        for tax in &draft.taxes {
            let model = invoice_tax_charge::ActiveModel {
                id: Set(Uuid::new_v4()),
                invoice_id: Set(note_id),
                account_head: Set(tax.account_head.clone()),
                rate: Set(tax.rate),
                tax_amount: Set(tax.tax_amount),
                item_wise_tax_detail: Set(detail_to_json(&tax.detail)?),
                created_at: Set(now),
            };
            model.insert(conn).await.map_err(ServiceError::db_error)?;
        }

        Ok(note_id)
    }

    /// Applies a note's (negative) grand total against the invoice's
    /// outstanding balance and updates its status.
    async fn settle_against_invoice<C: ConnectionTrait>(
        &self,
        conn: &C,
        invoice_id: Uuid,
        note_grand_total: Decimal,
    ) -> Result<(), ServiceError> {
        let invoice = sales_invoice::Entity::find_by_id(invoice_id)
            .one(conn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("invoice {invoice_id}")))?;

        let new_outstanding = (invoice.outstanding_amount + note_grand_total).max(Decimal::ZERO);
        let status = if new_outstanding.is_zero() {
            "Credit Note Issued".to_string()
        } else {
            "Partly Paid".to_string()
        };

        let mut active: sales_invoice::ActiveModel = invoice.into();
        active.outstanding_amount = Set(new_outstanding);
        active.status = Set(status);
        active.updated_at = Set(Utc::now());
        active.update(conn).await.map_err(ServiceError::db_error)?;
        Ok(())
    }

    /// Generates a settlement payment entry for whatever balance remains on
    /// the invoice, marking it paid.
    async fn make_payment_entry<C: ConnectionTrait>(
        &self,
        conn: &C,
        invoice_id: Uuid,
    ) -> Result<Option<Decimal>, ServiceError> {
        let invoice = sales_invoice::Entity::find_by_id(invoice_id)
            .one(conn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("invoice {invoice_id}")))?;

        if invoice.outstanding_amount <= Decimal::ZERO {
            return Ok(None);
        }

        let amount = invoice.outstanding_amount;
        let entry = payment_entry::ActiveModel {
            id: Set(Uuid::new_v4()),
            invoice_id: Set(invoice.id),
            amount: Set(amount),
            payment_type: Set("Receive".to_string()),
            reference: Set(Some(format!("Settlement for {}", invoice.invoice_number))),
            created_at: Set(Utc::now()),
        };
        entry.insert(conn).await.map_err(ServiceError::db_error)?;

        let mut active: sales_invoice::ActiveModel = invoice.into();
        active.outstanding_amount = Set(Decimal::ZERO);
        active.status = Set("Paid".to_string());
        active.updated_at = Set(Utc::now());
        active.update(conn).await.map_err(ServiceError::db_error)?;

        Ok(Some(amount))
    }
}
