// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Payment Lifecycle
//!
//! Invoice issuance, balance-safe payment execution, settlement handling and
//! webhook delivery. Every component receives its collaborators through an
//! explicit [`Deps`] value.
//!
//! ## Lifecycle
//!
//! ```text
//! create_invoice ──► INBOUND/OPEN ──(settlement event)──► SUCCEEDED ──► webhook
//! pay_invoice    ──► OUTBOUND/OPEN (debited) ──► SUCCEEDED
//!                                              └► FAILED (debit released)
//! ```
//!
//! Entries left OPEN by a crash or an unreachable node are resolved by the
//! [`reconcile::Reconciler`].

pub mod error;
pub mod execution;
pub mod invoices;
pub mod listener;
pub mod reconcile;
pub mod webhook;

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::lightning::LightningClient;
use crate::storage::LedgerDb;

pub use error::PaymentError;
pub use execution::{PayInvoiceRequest, PaymentExecutor};
pub use invoices::{CreateInvoiceRequest, InvoiceService, MAX_INVOICE_AMOUNT_SAT};
pub use listener::{EventOutcome, SettlementListener, SubscriptionTask};
pub use reconcile::{ReconcileReport, Reconciler};
pub use webhook::{HttpWebhookSender, WebhookNotifier, WebhookSender, WebhookStats};

/// Timing knobs shared by the payment components.
#[derive(Debug, Clone)]
pub struct LedgerSettings {
    /// Upper bound for every unary node call
    pub node_timeout: Duration,
    /// Upper bound for `send_payment_sync`
    pub payment_timeout: Duration,
    /// Lifetime requested for new invoices
    pub invoice_expiry_secs: i64,
    /// Age after which an OPEN outbound entry is checked against the node
    pub reconcile_stale_after: Duration,
    pub node_retry_attempts: u32,
    pub node_retry_sleep: Duration,
}

impl LedgerSettings {
    /// Longest a send can keep its outbound entry OPEN before it resolves or
    /// hands the entry over to reconciliation.
    pub fn send_resolution_bound(&self) -> Duration {
        self.payment_timeout + self.node_timeout * self.node_retry_attempts
    }
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            node_timeout: Duration::from_secs(10),
            payment_timeout: Duration::from_secs(60),
            invoice_expiry_secs: 86_400,
            reconcile_stale_after: Duration::from_secs(300),
            node_retry_attempts: 3,
            node_retry_sleep: Duration::from_millis(500),
        }
    }
}

/// Collaborators handed to every payment component.
#[derive(Clone)]
pub struct Deps {
    pub db: Arc<LedgerDb>,
    pub lightning: Arc<dyn LightningClient>,
    pub settings: LedgerSettings,
    /// Outbound entries whose send is running in this process
    pub in_flight: InFlightPayments,
}

impl Deps {
    pub fn new(db: Arc<LedgerDb>, lightning: Arc<dyn LightningClient>, settings: LedgerSettings) -> Self {
        Self {
            db,
            lightning,
            settings,
            in_flight: InFlightPayments::default(),
        }
    }
}

/// Ids of outbound entries a [`PaymentExecutor`] is still resolving.
///
/// The reconciler leaves these alone whatever their age.
#[derive(Debug, Clone, Default)]
pub struct InFlightPayments(Arc<Mutex<HashSet<u64>>>);

impl InFlightPayments {
    /// Register `id` until the returned guard is dropped.
    pub fn enter(&self, id: u64) -> InFlightGuard {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).insert(id);
        InFlightGuard {
            set: self.clone(),
            id,
        }
    }

    pub fn contains(&self, id: u64) -> bool {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).contains(&id)
    }
}

pub struct InFlightGuard {
    set: InFlightPayments,
    id: u64,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set
            .0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}

#[cfg(test)]
pub mod test_support {
    use super::*;
    use crate::lightning::fake::FakeLightning;
    use crate::storage::{Direction, NewPayment, Payment};

    pub struct Harness {
        pub deps: Deps,
        pub fake: Arc<FakeLightning>,
        _dir: tempfile::TempDir,
    }

    pub fn harness() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(LedgerDb::open(&dir.path().join("ledger.redb")).unwrap());
        let fake = Arc::new(FakeLightning::new());
        let settings = LedgerSettings {
            node_retry_sleep: Duration::from_millis(10),
            reconcile_stale_after: Duration::ZERO,
            ..LedgerSettings::default()
        };
        Harness {
            deps: Deps::new(db, fake.clone(), settings),
            fake,
            _dir: dir,
        }
    }

    impl Harness {
        /// Credit `sat` to a user through a settled inbound entry.
        pub fn fund(&self, user_id: u64, sat: u64) -> Payment {
            let payment = self
                .deps
                .db
                .insert(&NewPayment {
                    user_id,
                    direction: Direction::Inbound,
                    amount_sat: sat,
                    payment_request: format!("lnbcrt-fund-{}", uuid::Uuid::new_v4().simple()),
                    hashed_preimage: "00".repeat(32),
                    memo: None,
                    description: None,
                    callback_url: None,
                    customer_order_id: None,
                    expiry: 3600,
                })
                .unwrap();
            self.deps
                .db
                .mark_succeeded(payment.id, &"00".repeat(32))
                .unwrap()
                .into_payment()
        }

        pub fn balance_sats(&self, user_id: u64) -> i64 {
            self.deps.db.balance(user_id).unwrap().sats()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_flight_guard_releases_on_drop() {
        let in_flight = InFlightPayments::default();
        let shared = in_flight.clone();

        let guard = in_flight.enter(7);
        assert!(shared.contains(7));
        assert!(!shared.contains(8));

        drop(guard);
        assert!(!shared.contains(7));
    }

    #[test]
    fn default_stale_threshold_outlasts_a_send() {
        let settings = LedgerSettings::default();
        assert_eq!(settings.send_resolution_bound(), Duration::from_secs(90));
        assert!(settings.reconcile_stale_after > settings.send_resolution_bound());
    }
}
