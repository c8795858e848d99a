// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Outbound payment execution.
//!
//! ## Protocol
//!
//! 1. Decode the payment request on the node; zero-amount requests are rejected.
//! 2. Check the balance and insert the OPEN outbound entry in one write
//!    transaction. The entry carries the debit from this point on.
//! 3. Send the payment and wait for the outcome (bounded by the payment timeout).
//! 4. Success marks the entry SUCCEEDED with its preimage. A node-reported
//!    failure marks it FAILED, which releases the debit.
//!
//! When the send itself errors the outcome is unknown, so the node is asked
//! for the payment status before anything is rolled back.
//!
//! The entry id stays in [`Deps::in_flight`](super::Deps) until the call
//! returns, which keeps the reconciler from resolving it underneath us.

use super::{Deps, PaymentError};
use crate::lightning::{with_timeout, LightningError, PaymentLookup, SendOutcome};
use crate::retry::retry;
use crate::storage::{Direction, NewPayment, Payment, PaymentStatus, Transition};

#[derive(Debug, Clone)]
pub struct PayInvoiceRequest {
    pub payment_request: String,
    pub description: Option<String>,
}

pub struct PaymentExecutor {
    deps: Deps,
}

impl PaymentExecutor {
    pub fn new(deps: Deps) -> Self {
        Self { deps }
    }

    /// Pay a BOLT11 request on behalf of `user_id`.
    pub async fn pay_invoice(
        &self,
        user_id: u64,
        request: PayInvoiceRequest,
    ) -> Result<Payment, PaymentError> {
        let settings = &self.deps.settings;
        let payment_request = request.payment_request.trim().to_string();

        let decoded = with_timeout(
            settings.node_timeout,
            self.deps.lightning.decode_pay_req(&payment_request),
        )
        .await
        .map_err(|e| match e {
            LightningError::InvalidPaymentRequest(msg) => PaymentError::InvalidPaymentRequest(msg),
            other => PaymentError::node("decode_pay_req", other),
        })?;

        if decoded.num_satoshis == 0 {
            return Err(PaymentError::ZeroAmountPaymentRequest);
        }

        let description = request
            .description
            .or_else(|| Some(decoded.description.clone()))
            .filter(|d| !d.is_empty());

        let payment = self.deps.db.debit_and_insert(&NewPayment {
            user_id,
            direction: Direction::Outbound,
            amount_sat: decoded.num_satoshis,
            payment_request,
            hashed_preimage: decoded.payment_hash,
            memo: None,
            description,
            callback_url: None,
            customer_order_id: None,
            expiry: decoded.expiry_secs,
        })?;

        tracing::info!(
            payment_id = payment.id,
            user_id,
            amount_sat = payment.amount_sat,
            "Outbound payment debited, sending"
        );
        let _sending = self.deps.in_flight.enter(payment.id);

        let outcome = with_timeout(
            settings.payment_timeout,
            self.deps.lightning.send_payment_sync(&payment.payment_request),
        )
        .await;

        match outcome {
            Ok(SendOutcome::Succeeded { preimage }) => self.settle(&payment, &preimage),
            Ok(SendOutcome::Failed { reason }) => {
                self.release(&payment)?;
                Err(PaymentError::PaymentFailed {
                    payment_id: payment.id,
                    reason,
                })
            }
            Err(error) => self.resolve_after_transport_error(payment, error).await,
        }
    }

    /// The send errored without a definitive answer. Ask the node what happened.
    async fn resolve_after_transport_error(
        &self,
        payment: Payment,
        error: LightningError,
    ) -> Result<Payment, PaymentError> {
        tracing::warn!(
            payment_id = payment.id,
            error = %error,
            "Send outcome unknown, checking payment status on node"
        );

        let settings = &self.deps.settings;
        let lightning = &self.deps.lightning;
        let hash = payment.hashed_preimage.as_str();
        let lookup = retry(settings.node_retry_attempts, settings.node_retry_sleep, move || {
            with_timeout(settings.node_timeout, lightning.lookup_payment(hash))
        })
        .await;

        match lookup {
            Ok(PaymentLookup::Succeeded { preimage }) => self.settle(&payment, &preimage),
            Ok(PaymentLookup::Failed { reason }) => {
                self.release(&payment)?;
                Err(PaymentError::PaymentFailed {
                    payment_id: payment.id,
                    reason,
                })
            }
            Ok(PaymentLookup::Unknown) => {
                self.release(&payment)?;
                Err(PaymentError::node("send_payment", error))
            }
            Ok(PaymentLookup::InFlight) => {
                tracing::warn!(
                    payment_id = payment.id,
                    "Payment still in flight, leaving open for reconciliation"
                );
                Err(PaymentError::node("send_payment", error))
            }
            Err(lookup_error) => {
                tracing::error!(
                    payment_id = payment.id,
                    error = %lookup_error,
                    "Node unreachable after send, leaving open for reconciliation"
                );
                Err(PaymentError::node("send_payment", error))
            }
        }
    }

    fn settle(&self, payment: &Payment, preimage: &[u8]) -> Result<Payment, PaymentError> {
        match self.deps.db.mark_succeeded(payment.id, &hex::encode(preimage))? {
            Transition::Applied(settled) => {
                tracing::info!(payment_id = settled.id, "Outbound payment succeeded");
                Ok(settled)
            }
            Transition::Unchanged(current) if current.status == PaymentStatus::Failed => {
                tracing::error!(
                    payment_id = current.id,
                    user_id = current.user_id,
                    amount_sat = current.amount_sat,
                    "Node paid an entry already recorded as failed; debit was released"
                );
                Err(PaymentError::LedgerConflict {
                    payment_id: current.id,
                })
            }
            Transition::Unchanged(current) => {
                tracing::warn!(
                    payment_id = current.id,
                    status = %current.status,
                    "Payment already resolved before send completed"
                );
                Ok(current)
            }
        }
    }

    fn release(&self, payment: &Payment) -> Result<(), PaymentError> {
        if self.deps.db.mark_failed(payment.id)?.applied() {
            tracing::info!(
                payment_id = payment.id,
                user_id = payment.user_id,
                "Outbound payment failed, debit released"
            );
        }
        Ok(())
    }
}
