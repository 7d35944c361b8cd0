use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// One progress notification from a bulk job, mirrored to subscribed pages.
/// A terminal update carries `done: true` and the elapsed time in its message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub message: String,
    pub succeeded: bool,
    pub error: bool,
    pub done: bool,
}

impl ProgressUpdate {
    pub fn succeeded(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            succeeded: true,
            error: false,
            done: false,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            succeeded: false,
            error: true,
            done: false,
        }
    }

    pub fn note(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            succeeded: false,
            error: false,
            done: false,
        }
    }

    pub fn done(elapsed_secs: f64) -> Self {
        Self {
            message: format!("Done in {elapsed_secs:.3}s"),
            succeeded: false,
            error: false,
            done: true,
        }
    }
}

/// Events emitted by the reconciliation and refund engines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    /// Incremental status from a bulk reconciliation or sync job
    SyncProgress(ProgressUpdate),
    ItemRenamed {
        old_code: String,
        new_code: String,
    },
    ItemsMerged {
        survivor: String,
        retired: usize,
    },
    CreditNoteIssued {
        invoice_id: Uuid,
        note_id: Uuid,
        amount: Decimal,
    },
    DebitNoteIssued {
        invoice_id: Uuid,
        note_id: Uuid,
        amount: Decimal,
    },
    PaymentEntryCreated {
        invoice_id: Uuid,
        amount: Decimal,
    },
    /// A refund arrived for an order with no matching invoice; recorded as an
    /// invalid intake rather than an error
    RefundIgnored {
        order_id: String,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event; a closed channel is logged, never fatal to the caller.
    pub async fn send(&self, event: Event) {
        if let Err(e) = self.sender.send(event).await {
            warn!("Failed to send event: {}", e);
        }
    }
}

/// Consumes events and logs them. Real-time page delivery and outbound
/// webhook fan-out sit behind this loop in deployment.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    while let Some(event) = rx.recv().await {
        match &event {
            Event::SyncProgress(update) => {
                if update.error {
                    warn!(done = update.done, "{}", update.message);
                } else {
                    info!(done = update.done, "{}", update.message);
                }
            }
            other => info!(event = ?other, "domain event"),
        }
    }
    info!("Event channel closed; processor exiting");
}
