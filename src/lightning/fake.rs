// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Scriptable in-memory Lightning node for tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::sync::mpsc;

use super::{
    AddedInvoice, DecodedPayReq, Invoice, InvoiceRequest, InvoiceStream, LightningClient,
    LightningError, PaymentLookup, SendOutcome,
};

type Event = Result<Invoice, LightningError>;

#[derive(Default)]
pub struct FakeLightning {
    next: AtomicU64,
    invoices: Mutex<HashMap<String, Invoice>>,
    preimages: Mutex<HashMap<String, Vec<u8>>>,
    pay_reqs: Mutex<HashMap<String, DecodedPayReq>>,
    send_script: Mutex<VecDeque<Result<SendOutcome, LightningError>>>,
    payments: Mutex<HashMap<String, VecDeque<Result<PaymentLookup, LightningError>>>>,
    add_invoice_errors: Mutex<VecDeque<LightningError>>,
    echoed_values: Mutex<VecDeque<u64>>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<Event>>>,
    pub add_invoice_calls: AtomicU32,
    pub lookup_invoice_calls: AtomicU32,
    pub send_calls: AtomicU32,
    pub lookup_payment_calls: AtomicU32,
    pub subscribe_calls: AtomicU32,
}

/// `(preimage, hex(sha256(preimage)))` for the n-th fake payment.
pub fn preimage_pair(n: u64) -> (Vec<u8>, String) {
    let mut preimage = [0u8; 32];
    preimage[..8].copy_from_slice(&n.to_be_bytes());
    preimage[31] = 0x5a;
    let hash = hex::encode(Sha256::digest(preimage));
    (preimage.to_vec(), hash)
}

impl FakeLightning {
    pub fn new() -> Self {
        Self::default()
    }

    fn bump(&self) -> u64 {
        self.next.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Register an external payment request the service can be asked to pay.
    ///
    /// Returns `(payment_request, payment_hash)`.
    pub fn register_pay_req(&self, num_satoshis: u64) -> (String, String) {
        let n = self.bump();
        let (_, hash) = preimage_pair(1_000_000 + n);
        let request = format!("lnbcrt{num_satoshis}n1ext{n}");
        self.pay_reqs.lock().unwrap().insert(
            request.clone(),
            DecodedPayReq {
                payment_hash: hash.clone(),
                num_satoshis,
                description: format!("external {n}"),
                expiry_secs: 3600,
            },
        );
        (request, hash)
    }

    /// Queue the result of the next `send_payment_sync` call.
    ///
    /// With nothing queued, sends succeed with a fresh preimage.
    pub fn script_send(&self, outcome: Result<SendOutcome, LightningError>) {
        self.send_script.lock().unwrap().push_back(outcome);
    }

    /// Queue results of `lookup_payment` for a hash. The last one repeats.
    pub fn script_lookup_payment(&self, hash: &str, result: Result<PaymentLookup, LightningError>) {
        self.payments
            .lock()
            .unwrap()
            .entry(hash.to_string())
            .or_default()
            .push_back(result);
    }

    /// Replace any queued `lookup_payment` results for a hash.
    pub fn set_lookup_payment(&self, hash: &str, result: Result<PaymentLookup, LightningError>) {
        self.payments
            .lock()
            .unwrap()
            .insert(hash.to_string(), VecDeque::from([result]));
    }

    pub fn fail_next_add_invoice(&self, error: LightningError) {
        self.add_invoice_errors.lock().unwrap().push_back(error);
    }

    /// Record the next created invoice with `value_sat` instead of the
    /// requested amount, as a misbehaving node would.
    pub fn echo_next_invoice_value(&self, value_sat: u64) {
        self.echoed_values.lock().unwrap().push_back(value_sat);
    }

    /// Mark an invoice settled and broadcast the update to subscribers.
    pub fn settle_invoice(&self, r_hash: &str, preimage: &[u8]) -> Invoice {
        let invoice = {
            let mut invoices = self.invoices.lock().unwrap();
            let invoice = invoices.get_mut(r_hash).expect("unknown invoice");
            invoice.settled = true;
            invoice.preimage = Some(preimage.to_vec());
            invoice.clone()
        };
        self.push_event(Ok(invoice.clone()));
        invoice
    }

    /// Broadcast an arbitrary event (replays, unknown invoices, errors).
    pub fn push_event(&self, event: Event) {
        self.subscribers
            .lock()
            .unwrap()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// End every open subscription stream.
    pub fn close_subscriptions(&self) {
        self.subscribers.lock().unwrap().clear();
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().unwrap().len()
    }

    pub fn invoice(&self, r_hash: &str) -> Option<Invoice> {
        self.invoices.lock().unwrap().get(r_hash).cloned()
    }

    /// Preimage the fake will reveal for an invoice it created.
    pub fn preimage_for(&self, r_hash: &str) -> Option<Vec<u8>> {
        self.preimages.lock().unwrap().get(r_hash).cloned()
    }
}

#[async_trait]
impl LightningClient for FakeLightning {
    async fn add_invoice(&self, request: InvoiceRequest) -> Result<AddedInvoice, LightningError> {
        self.add_invoice_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.add_invoice_errors.lock().unwrap().pop_front() {
            return Err(err);
        }

        let n = self.bump();
        let (preimage, r_hash) = preimage_pair(n);
        self.preimages.lock().unwrap().insert(r_hash.clone(), preimage);
        let payment_request = format!("lnbcrt{}n1fake{n}", request.value_sat);
        self.invoices.lock().unwrap().insert(
            r_hash.clone(),
            Invoice {
                r_hash: r_hash.clone(),
                payment_request: payment_request.clone(),
                value_sat: self
                    .echoed_values
                    .lock()
                    .unwrap()
                    .pop_front()
                    .unwrap_or(request.value_sat),
                memo: request.memo.unwrap_or_default(),
                settled: false,
                preimage: None,
                expiry_secs: request.expiry_secs,
            },
        );
        Ok(AddedInvoice {
            r_hash,
            payment_request,
        })
    }

    async fn lookup_invoice(&self, r_hash: &str) -> Result<Invoice, LightningError> {
        self.lookup_invoice_calls.fetch_add(1, Ordering::SeqCst);
        self.invoice(r_hash)
            .ok_or_else(|| LightningError::NotFound(format!("invoice {r_hash}")))
    }

    async fn decode_pay_req(&self, payment_request: &str) -> Result<DecodedPayReq, LightningError> {
        self.pay_reqs
            .lock()
            .unwrap()
            .get(payment_request)
            .cloned()
            .ok_or_else(|| LightningError::InvalidPaymentRequest("checksum failed".to_string()))
    }

    async fn send_payment_sync(&self, _payment_request: &str) -> Result<SendOutcome, LightningError> {
        self.send_calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self.send_script.lock().unwrap().pop_front();
        match scripted {
            Some(outcome) => outcome,
            None => {
                let (preimage, _) = preimage_pair(self.bump());
                Ok(SendOutcome::Succeeded { preimage })
            }
        }
    }

    async fn lookup_payment(&self, payment_hash: &str) -> Result<PaymentLookup, LightningError> {
        self.lookup_payment_calls.fetch_add(1, Ordering::SeqCst);
        let mut payments = self.payments.lock().unwrap();
        match payments.get_mut(payment_hash) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or(Ok(PaymentLookup::Unknown)),
            Some(queue) => queue.front().cloned().unwrap_or(Ok(PaymentLookup::Unknown)),
            None => Ok(PaymentLookup::Unknown),
        }
    }

    async fn subscribe_invoices(&self) -> Result<InvoiceStream, LightningError> {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().unwrap().push(tx);
        let stream = futures_util::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        });
        Ok(Box::pin(stream))
    }
}
