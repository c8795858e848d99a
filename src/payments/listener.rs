// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Settlement Listener
//!
//! Two long-lived tasks joined by a bounded channel:
//!
//! - [`SubscriptionTask`] holds the node's invoice subscription open,
//!   re-subscribing with exponential backoff, and forwards every update.
//! - [`SettlementListener`] consumes updates and finalizes matching ledger
//!   entries. Replays and duplicates are no-ops.
//!
//! Cancelling the shutdown token stops the subscription task, which drops
//! the channel sender. The listener then drains what is buffered and returns.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use sha2::{Digest, Sha256};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::webhook::WebhookNotifier;
use super::{Deps, PaymentError};
use crate::lightning::{with_timeout, Invoice, LightningClient, LightningError};
use crate::retry::retry;
use crate::storage::{Direction, LedgerDb, Payment, Transition};

/// Capacity of the channel between subscription and listener.
pub const SETTLEMENT_CHANNEL_CAPACITY: usize = 256;

const SUBSCRIBE_ATTEMPTS: u32 = 5;
const INITIAL_RESUBSCRIBE_BACKOFF: Duration = Duration::from_secs(1);
const MAX_RESUBSCRIBE_BACKOFF: Duration = Duration::from_secs(60);

/// What handling one invoice update did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    /// First settlement: the entry moved OPEN → SUCCEEDED.
    Settled(Payment),
    /// The invoice is known but not settled yet.
    Unsettled,
    /// The entry was already terminal.
    Duplicate(Payment),
    /// No inbound entry matches the payment request.
    Unknown,
}

// =============================================================================
// Listener
// =============================================================================

pub struct SettlementListener {
    db: Arc<LedgerDb>,
    notifier: WebhookNotifier,
}

impl SettlementListener {
    pub fn new(deps: &Deps, notifier: WebhookNotifier) -> Self {
        Self {
            db: deps.db.clone(),
            notifier,
        }
    }

    /// Consume updates until every sender is gone.
    pub async fn run(self, mut events: mpsc::Receiver<Invoice>) {
        tracing::info!("Settlement listener starting");
        let mut settled = 0u64;

        while let Some(invoice) = events.recv().await {
            match self.handle_event(&invoice) {
                Ok(EventOutcome::Settled(_)) => settled += 1,
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(
                        r_hash = %invoice.r_hash,
                        error = %e,
                        "Failed to apply invoice update"
                    );
                }
            }
        }

        tracing::info!(settled, "Settlement listener drained, stopping");
    }

    /// Apply one invoice update to the ledger.
    pub fn handle_event(&self, invoice: &Invoice) -> Result<EventOutcome, PaymentError> {
        let Some(payment) = self.db.find_by_payment_request(&invoice.payment_request)? else {
            tracing::debug!(r_hash = %invoice.r_hash, "Invoice update for unknown payment request");
            return Ok(EventOutcome::Unknown);
        };
        apply_settlement(&self.db, &self.notifier, &payment, invoice)
    }
}

/// Settle an inbound entry from the node's view of its invoice.
///
/// Shared by the listener and the reconciler so both apply the same rules.
pub(crate) fn apply_settlement(
    db: &LedgerDb,
    notifier: &WebhookNotifier,
    payment: &Payment,
    invoice: &Invoice,
) -> Result<EventOutcome, PaymentError> {
    if payment.direction != Direction::Inbound {
        tracing::warn!(
            payment_id = payment.id,
            "Invoice update matched an outbound entry, ignoring"
        );
        return Ok(EventOutcome::Unknown);
    }
    if !invoice.settled {
        return Ok(EventOutcome::Unsettled);
    }

    let preimage = invoice.preimage.as_deref().ok_or_else(|| {
        PaymentError::node(
            "settlement",
            LightningError::InvalidResponse("settled invoice without preimage".to_string()),
        )
    })?;
    let preimage_hash = hex::encode(Sha256::digest(preimage));
    if preimage_hash != payment.hashed_preimage {
        return Err(PaymentError::node(
            "settlement",
            LightningError::InvalidResponse(format!(
                "preimage does not hash to {}",
                payment.hashed_preimage
            )),
        ));
    }

    match db.mark_succeeded(payment.id, &hex::encode(preimage))? {
        Transition::Applied(settled) => {
            tracing::info!(
                payment_id = settled.id,
                user_id = settled.user_id,
                amount_sat = settled.amount_sat,
                "Invoice settled"
            );
            notifier.notify(settled.clone());
            Ok(EventOutcome::Settled(settled))
        }
        Transition::Unchanged(current) => {
            tracing::debug!(
                payment_id = current.id,
                status = %current.status,
                "Duplicate settlement ignored"
            );
            Ok(EventOutcome::Duplicate(current))
        }
    }
}

// =============================================================================
// Subscription
// =============================================================================

/// Keeps the node subscription open and forwards updates to the listener.
pub struct SubscriptionTask {
    lightning: Arc<dyn LightningClient>,
    node_timeout: Duration,
    initial_backoff: Duration,
    max_backoff: Duration,
    events: mpsc::Sender<Invoice>,
}

impl SubscriptionTask {
    pub fn new(deps: &Deps, events: mpsc::Sender<Invoice>) -> Self {
        Self {
            lightning: deps.lightning.clone(),
            node_timeout: deps.settings.node_timeout,
            initial_backoff: INITIAL_RESUBSCRIBE_BACKOFF,
            max_backoff: MAX_RESUBSCRIBE_BACKOFF,
            events,
        }
    }

    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max.max(initial);
        self
    }

    /// Run until `shutdown` is cancelled or the listener goes away.
    pub async fn run(self, shutdown: CancellationToken) {
        tracing::info!("Invoice subscription starting");
        let mut backoff = self.initial_backoff;

        'subscription: loop {
            let lightning = &self.lightning;
            let node_timeout = self.node_timeout;
            let subscribe = retry(SUBSCRIBE_ATTEMPTS, backoff, move || {
                with_timeout(node_timeout, lightning.subscribe_invoices())
            });

            let subscribed = tokio::select! {
                result = subscribe => result,
                _ = shutdown.cancelled() => break 'subscription,
            };

            match subscribed {
                Ok(mut stream) => {
                    tracing::info!("Subscribed to invoice updates");
                    backoff = self.initial_backoff;

                    loop {
                        let next = tokio::select! {
                            next = stream.next() => next,
                            _ = shutdown.cancelled() => break 'subscription,
                        };
                        match next {
                            Some(Ok(invoice)) => {
                                tokio::select! {
                                    sent = self.events.send(invoice) => {
                                        if sent.is_err() {
                                            tracing::warn!("Settlement listener gone, stopping subscription");
                                            break 'subscription;
                                        }
                                    }
                                    _ = shutdown.cancelled() => break 'subscription,
                                }
                            }
                            Some(Err(e)) => {
                                tracing::warn!(error = %e, "Invoice subscription errored");
                                break;
                            }
                            None => {
                                tracing::warn!("Invoice subscription ended");
                                break;
                            }
                        }
                    }
                }
                Err(e) => {
                    tracing::error!(
                        attempts = e.attempts,
                        error = %e.last_error,
                        "Could not subscribe to invoice updates"
                    );
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(backoff) => {},
                _ = shutdown.cancelled() => break 'subscription,
            }
            backoff = backoff.saturating_mul(2).min(self.max_backoff);
        }

        tracing::info!("Invoice subscription stopped");
    }
}
