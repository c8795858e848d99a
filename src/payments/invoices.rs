// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Inbound invoice issuance.

use url::Url;

use super::{Deps, PaymentError};
use crate::lightning::{with_timeout, InvoiceRequest, LightningError};
use crate::retry::retry_no_backoff;
use crate::storage::{Direction, NewPayment, Payment};

/// BOLT11 caps invoice amounts at 2^32 msat.
pub const MAX_INVOICE_AMOUNT_SAT: u64 = 4_294_967;

#[derive(Debug, Clone, Default)]
pub struct CreateInvoiceRequest {
    pub amount_sat: u64,
    pub memo: Option<String>,
    pub description: Option<String>,
    pub callback_url: Option<String>,
    pub customer_order_id: Option<String>,
}

pub struct InvoiceService {
    deps: Deps,
}

impl InvoiceService {
    pub fn new(deps: Deps) -> Self {
        Self { deps }
    }

    /// Create an invoice on the node and record it as an OPEN inbound entry.
    ///
    /// Nothing is persisted unless the node accepted the invoice and echoed
    /// it back on lookup.
    pub async fn create_invoice(
        &self,
        user_id: u64,
        request: CreateInvoiceRequest,
    ) -> Result<Payment, PaymentError> {
        validate_amount(request.amount_sat)?;
        let callback_url = request
            .callback_url
            .as_deref()
            .map(validate_callback_url)
            .transpose()?;

        let settings = &self.deps.settings;
        let lightning = &self.deps.lightning;

        let added = with_timeout(
            settings.node_timeout,
            lightning.add_invoice(InvoiceRequest {
                value_sat: request.amount_sat,
                memo: request.memo.clone(),
                expiry_secs: settings.invoice_expiry_secs,
            }),
        )
        .await
        .map_err(|e| PaymentError::node("add_invoice", e))?;

        let r_hash = added.r_hash.as_str();
        let invoice = retry_no_backoff(settings.node_retry_attempts, settings.node_retry_sleep, move || {
            with_timeout(settings.node_timeout, lightning.lookup_invoice(r_hash))
        })
        .await
        .map_err(|e| PaymentError::node_retry("lookup_invoice", e))?;

        if invoice.value_sat != request.amount_sat {
            return Err(PaymentError::node(
                "lookup_invoice",
                LightningError::InvalidResponse(format!(
                    "node echoed {} sat for a {} sat invoice",
                    invoice.value_sat, request.amount_sat
                )),
            ));
        }

        let payment_request = if invoice.payment_request.is_empty() {
            added.payment_request
        } else {
            invoice.payment_request
        };

        let payment = self.deps.db.insert(&NewPayment {
            user_id,
            direction: Direction::Inbound,
            amount_sat: invoice.value_sat,
            payment_request,
            hashed_preimage: added.r_hash,
            memo: request.memo,
            description: request.description,
            callback_url,
            customer_order_id: request.customer_order_id,
            expiry: invoice.expiry_secs,
        })?;

        tracing::info!(
            payment_id = payment.id,
            user_id,
            amount_sat = payment.amount_sat,
            "Invoice created"
        );
        Ok(payment)
    }
}

fn validate_amount(amount_sat: u64) -> Result<(), PaymentError> {
    if amount_sat == 0 {
        return Err(PaymentError::InvalidAmount);
    }
    if amount_sat > MAX_INVOICE_AMOUNT_SAT {
        return Err(PaymentError::AmountTooLarge {
            amount_sat,
            max_sat: MAX_INVOICE_AMOUNT_SAT,
        });
    }
    Ok(())
}

fn validate_callback_url(raw: &str) -> Result<String, PaymentError> {
    let url = Url::parse(raw.trim()).map_err(|e| PaymentError::InvalidCallbackUrl(e.to_string()))?;
    match url.scheme() {
        "http" | "https" if url.host().is_some() => Ok(url.to_string()),
        scheme => Err(PaymentError::InvalidCallbackUrl(format!(
            "unsupported scheme or missing host: {scheme}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::test_support::harness;
    use crate::storage::PaymentStatus;
    use std::sync::atomic::Ordering;

    fn request(amount_sat: u64) -> CreateInvoiceRequest {
        CreateInvoiceRequest {
            amount_sat,
            memo: Some("coffee".into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn creates_open_inbound_entry() {
        let h = harness();
        let service = InvoiceService::new(h.deps.clone());

        let payment = service.create_invoice(7, request(1000)).await.unwrap();

        assert_eq!(payment.user_id, 7);
        assert_eq!(payment.direction, Direction::Inbound);
        assert_eq!(payment.status, PaymentStatus::Open);
        assert_eq!(payment.amount_sat, 1000);
        assert_eq!(payment.amount_msat, 1_000_000);
        assert_eq!(payment.expiry, 86_400);
        assert_eq!(payment.memo.as_deref(), Some("coffee"));
        assert!(h.fake.invoice(&payment.hashed_preimage).is_some());
        // an open invoice credits nothing
        assert_eq!(h.balance_sats(7), 0);
    }

    #[tokio::test]
    async fn amount_bounds_are_validated_before_the_node() {
        let h = harness();
        let service = InvoiceService::new(h.deps.clone());

        let zero = service.create_invoice(1, request(0)).await.unwrap_err();
        assert_eq!(zero.code(), "invalid_amount");

        let big = service
            .create_invoice(1, request(MAX_INVOICE_AMOUNT_SAT + 1))
            .await
            .unwrap_err();
        assert_eq!(big.code(), "amount_too_large");

        assert!(service.create_invoice(1, request(MAX_INVOICE_AMOUNT_SAT)).await.is_ok());
        assert_eq!(h.fake.add_invoice_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn callback_url_must_be_http() {
        let h = harness();
        let service = InvoiceService::new(h.deps.clone());

        let mut bad = request(10);
        bad.callback_url = Some("ftp://example.com/hook".into());
        assert_eq!(
            service.create_invoice(1, bad).await.unwrap_err().code(),
            "invalid_callback_url"
        );

        let mut good = request(10);
        good.callback_url = Some("https://shop.example.com/hook".into());
        let payment = service.create_invoice(1, good).await.unwrap();
        assert_eq!(
            payment.callback_url.as_deref(),
            Some("https://shop.example.com/hook")
        );
    }

    #[tokio::test]
    async fn mismatched_echo_persists_nothing() {
        let h = harness();
        let service = InvoiceService::new(h.deps.clone());
        h.fake.echo_next_invoice_value(999);

        let err = service.create_invoice(3, request(1000)).await.unwrap_err();

        assert_eq!(err.code(), "node_unavailable");
        assert!(err.to_string().contains("echoed 999 sat for a 1000 sat invoice"));
        assert!(h.deps.db.list_by_user(3, Default::default()).unwrap().is_empty());
        assert!(h.deps.db.list_open().unwrap().is_empty());
    }

    #[tokio::test]
    async fn node_failure_persists_nothing() {
        let h = harness();
        let service = InvoiceService::new(h.deps.clone());
        h.fake
            .fail_next_add_invoice(LightningError::Transport("connection refused".into()));

        let err = service.create_invoice(3, request(500)).await.unwrap_err();

        assert_eq!(err.code(), "node_unavailable");
        assert!(h.deps.db.list_by_user(3, Default::default()).unwrap().is_empty());
    }
}
