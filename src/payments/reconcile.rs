// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Reconciler
//!
//! Background sweep that resolves OPEN entries against the node.
//!
//! - Outbound entries older than the stale threshold are looked up with
//!   `lookup_payment`. Succeeded settles them, failed or unknown releases the
//!   debit, in-flight leaves them alone. Entries whose send is still running
//!   in this process are skipped.
//! - Inbound entries are looked up with `lookup_invoice` and settled through
//!   the same path as the settlement listener, which covers updates missed
//!   while the listener was down. An invoice found unpaid after its expiry
//!   is retired from later sweeps and keeps its OPEN status.
//!
//! One sweep runs at startup and then one per interval until cancelled.

use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::listener::{apply_settlement, EventOutcome};
use super::webhook::WebhookNotifier;
use super::Deps;
use crate::lightning::{with_timeout, PaymentLookup};
use crate::storage::{Direction, Payment};

/// Counts from one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub checked: u32,
    pub settled: u32,
    pub failed: u32,
    pub still_open: u32,
    /// Inbound entries retired from the sweep after expiring unpaid
    pub expired: u32,
    pub errors: u32,
}

pub struct Reconciler {
    deps: Deps,
    notifier: WebhookNotifier,
    interval: Duration,
}

impl Reconciler {
    pub fn new(deps: Deps, notifier: WebhookNotifier, interval: Duration) -> Self {
        Self {
            deps,
            notifier,
            interval,
        }
    }

    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            interval_secs = self.interval.as_secs(),
            stale_after_secs = self.deps.settings.reconcile_stale_after.as_secs(),
            "Reconciler starting"
        );

        loop {
            if shutdown.is_cancelled() {
                info!("Reconciler shutting down");
                return;
            }

            let report = self.sweep().await;
            if report.checked > 0 {
                info!(
                    checked = report.checked,
                    settled = report.settled,
                    failed = report.failed,
                    still_open = report.still_open,
                    expired = report.expired,
                    errors = report.errors,
                    "Reconciliation sweep finished"
                );
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {},
                _ = shutdown.cancelled() => {
                    info!("Reconciler shutting down");
                    return;
                }
            }
        }
    }

    /// Check every OPEN entry once.
    pub async fn sweep(&self) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        let open = match self.deps.db.list_open() {
            Ok(open) => open,
            Err(e) => {
                warn!(error = %e, "Reconciler could not list open payments");
                report.errors += 1;
                return report;
            }
        };

        for payment in open {
            match payment.direction {
                Direction::Outbound => self.check_outbound(&payment, &mut report).await,
                Direction::Inbound => self.check_inbound(&payment, &mut report).await,
            }
        }
        report
    }

    async fn check_outbound(&self, payment: &Payment, report: &mut ReconcileReport) {
        if self.deps.in_flight.contains(payment.id) {
            report.still_open += 1;
            return;
        }

        let settings = &self.deps.settings;
        let age = (Utc::now() - payment.created_at).to_std().unwrap_or_default();
        if age < settings.reconcile_stale_after {
            report.still_open += 1;
            return;
        }
        report.checked += 1;

        let lookup = with_timeout(
            settings.node_timeout,
            self.deps.lightning.lookup_payment(&payment.hashed_preimage),
        )
        .await;

        let outcome = match lookup {
            Ok(PaymentLookup::Succeeded { preimage }) => self
                .deps
                .db
                .mark_succeeded(payment.id, &hex::encode(preimage))
                .map(|t| (t.applied(), true)),
            Ok(PaymentLookup::Failed { .. }) | Ok(PaymentLookup::Unknown) => {
                self.deps.db.mark_failed(payment.id).map(|t| (t.applied(), false))
            }
            Ok(PaymentLookup::InFlight) => {
                report.still_open += 1;
                return;
            }
            Err(e) => {
                warn!(payment_id = payment.id, error = %e, "Reconciler: payment lookup failed");
                report.errors += 1;
                return;
            }
        };

        match outcome {
            Ok((true, true)) => {
                info!(payment_id = payment.id, "Reconciler: outbound payment succeeded");
                report.settled += 1;
            }
            Ok((true, false)) => {
                info!(payment_id = payment.id, "Reconciler: outbound payment failed, debit released");
                report.failed += 1;
            }
            Ok((false, _)) => {}
            Err(e) => {
                warn!(payment_id = payment.id, error = %e, "Reconciler: ledger update failed");
                report.errors += 1;
            }
        }
    }

    async fn check_inbound(&self, payment: &Payment, report: &mut ReconcileReport) {
        report.checked += 1;
        let invoice = match with_timeout(
            self.deps.settings.node_timeout,
            self.deps.lightning.lookup_invoice(&payment.hashed_preimage),
        )
        .await
        {
            Ok(invoice) => invoice,
            Err(e) => {
                warn!(payment_id = payment.id, error = %e, "Reconciler: invoice lookup failed");
                report.errors += 1;
                return;
            }
        };

        match apply_settlement(&self.deps.db, &self.notifier, payment, &invoice) {
            Ok(EventOutcome::Settled(_)) => report.settled += 1,
            Ok(EventOutcome::Unsettled) if payment.is_expired_at(Utc::now()) => {
                match self.deps.db.retire_expired_invoice(payment.id) {
                    Ok(_) => {
                        info!(payment_id = payment.id, "Reconciler: invoice expired unpaid");
                        report.expired += 1;
                    }
                    Err(e) => {
                        warn!(payment_id = payment.id, error = %e, "Reconciler: could not retire invoice");
                        report.errors += 1;
                    }
                }
            }
            Ok(EventOutcome::Unsettled) => report.still_open += 1,
            Ok(EventOutcome::Duplicate(_)) | Ok(EventOutcome::Unknown) => {}
            Err(e) => {
                warn!(payment_id = payment.id, error = %e, "Reconciler: settlement failed");
                report.errors += 1;
            }
        }
    }
}
