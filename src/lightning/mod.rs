// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Lightning Node Client
//!
//! The narrow capability set the payment core needs from a Lightning node.
//! The node is an opaque external service; everything here is expressed in
//! plain values (hex hashes, satoshi amounts, raw preimage bytes).
//!
//! - [`LightningClient`] - async trait implemented by concrete node clients
//! - [`lnd::LndRestClient`] - LND over its REST gateway
//! - [`with_timeout`] - bound any client call by a deadline

pub mod lnd;

#[cfg(test)]
pub mod fake;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::Stream;

pub use lnd::{LndConfig, LndRestClient};

// =============================================================================
// Types
// =============================================================================

/// Parameters for a new inbound invoice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceRequest {
    pub value_sat: u64,
    pub memo: Option<String>,
    pub expiry_secs: i64,
}

/// What the node returns right after creating an invoice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddedInvoice {
    /// Payment hash, lowercase hex
    pub r_hash: String,
    pub payment_request: String,
}

/// Node view of an inbound invoice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invoice {
    /// Payment hash, lowercase hex
    pub r_hash: String,
    pub payment_request: String,
    pub value_sat: u64,
    pub memo: String,
    pub settled: bool,
    /// Raw preimage bytes, present once the invoice is settled
    pub preimage: Option<Vec<u8>>,
    pub expiry_secs: i64,
}

/// Decoded BOLT11 payment request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedPayReq {
    /// Payment hash, lowercase hex
    pub payment_hash: String,
    pub num_satoshis: u64,
    pub description: String,
    pub expiry_secs: i64,
}

/// Result of a synchronous send that reached the node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Succeeded { preimage: Vec<u8> },
    /// The node refused or could not route the payment. No funds left.
    Failed { reason: String },
}

/// Node-side status of an outbound payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentLookup {
    Succeeded { preimage: Vec<u8> },
    Failed { reason: String },
    InFlight,
    /// The node has no record of the payment.
    Unknown,
}

/// Settlement event stream. Ends when the node closes the subscription.
pub type InvoiceStream = Pin<Box<dyn Stream<Item = Result<Invoice, LightningError>> + Send>>;

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LightningError {
    #[error("node transport error: {0}")]
    Transport(String),

    #[error("node call timed out after {0:?}")]
    Timeout(Duration),

    #[error("node returned {status}: {message}")]
    Rpc { status: u16, message: String },

    #[error("invalid node response: {0}")]
    InvalidResponse(String),

    #[error("invalid payment request: {0}")]
    InvalidPaymentRequest(String),

    #[error("not found on node: {0}")]
    NotFound(String),
}

impl LightningError {
    /// Whether the node may not have seen the request at all.
    pub fn is_transient(&self) -> bool {
        match self {
            LightningError::Transport(_) | LightningError::Timeout(_) => true,
            LightningError::Rpc { status, .. } => matches!(status, 502..=504),
            LightningError::InvalidResponse(_)
            | LightningError::InvalidPaymentRequest(_)
            | LightningError::NotFound(_) => false,
        }
    }
}

// =============================================================================
// Client Trait
// =============================================================================

/// Lightning node capabilities consumed by the payment core.
#[async_trait]
pub trait LightningClient: Send + Sync {
    /// Create an inbound invoice.
    async fn add_invoice(&self, request: InvoiceRequest) -> Result<AddedInvoice, LightningError>;

    /// Look up an inbound invoice by payment hash (hex).
    async fn lookup_invoice(&self, r_hash: &str) -> Result<Invoice, LightningError>;

    /// Decode a BOLT11 payment request without paying it.
    async fn decode_pay_req(&self, payment_request: &str) -> Result<DecodedPayReq, LightningError>;

    /// Pay a BOLT11 request and wait for the final outcome.
    ///
    /// `Err` means the outcome is unknown to the caller; `Ok(Failed)` means the
    /// node reported a definitive failure.
    async fn send_payment_sync(&self, payment_request: &str) -> Result<SendOutcome, LightningError>;

    /// Look up an outbound payment by payment hash (hex).
    async fn lookup_payment(&self, payment_hash: &str) -> Result<PaymentLookup, LightningError>;

    /// Subscribe to invoice updates (settlements included).
    async fn subscribe_invoices(&self) -> Result<InvoiceStream, LightningError>;
}

/// Run a node call with an upper bound on its duration.
pub async fn with_timeout<T, F>(limit: Duration, call: F) -> Result<T, LightningError>
where
    F: Future<Output = Result<T, LightningError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(LightningError::Timeout(limit)),
    }
}
