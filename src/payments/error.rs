// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use crate::lightning::LightningError;
use crate::retry::RetryError;
use crate::storage::LedgerDbError;

/// Failures of invoice issuance and payment execution.
///
/// Every variant maps to a stable machine-readable code via [`PaymentError::code`].
#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("amount must be greater than zero")]
    InvalidAmount,

    #[error("amount of {amount_sat} sat exceeds the maximum of {max_sat} sat")]
    AmountTooLarge { amount_sat: u64, max_sat: u64 },

    #[error("invalid callback url: {0}")]
    InvalidCallbackUrl(String),

    #[error("invalid payment request: {0}")]
    InvalidPaymentRequest(String),

    #[error("payment request does not specify an amount")]
    ZeroAmountPaymentRequest,

    #[error("payment request has already been recorded")]
    DuplicatePaymentRequest,

    #[error("insufficient balance: {available_msat} msat available, {required_msat} msat required")]
    InsufficientBalance {
        available_msat: i64,
        required_msat: u64,
    },

    #[error("lightning node unavailable during {context}: {source}")]
    NodeUnavailable {
        context: &'static str,
        source: LightningError,
    },

    #[error("payment {payment_id} failed: {reason}")]
    PaymentFailed { payment_id: u64, reason: String },

    #[error("payment {0} not found")]
    NotFound(u64),

    /// The node paid an entry whose debit had already been released.
    #[error("payment {payment_id} succeeded on the node after it was recorded as failed")]
    LedgerConflict { payment_id: u64 },

    #[error("storage error: {0}")]
    Storage(#[source] LedgerDbError),
}

impl PaymentError {
    pub fn node(context: &'static str, source: LightningError) -> Self {
        PaymentError::NodeUnavailable { context, source }
    }

    /// Wrap the last error of an exhausted retry.
    pub fn node_retry(context: &'static str, error: RetryError<LightningError>) -> Self {
        tracing::warn!(
            context,
            attempts = error.attempts,
            elapsed_ms = error.elapsed.as_millis() as u64,
            "Lightning node call exhausted retries"
        );
        PaymentError::node(context, error.last_error)
    }

    pub fn code(&self) -> &'static str {
        match self {
            PaymentError::InvalidAmount => "invalid_amount",
            PaymentError::AmountTooLarge { .. } => "amount_too_large",
            PaymentError::InvalidCallbackUrl(_) => "invalid_callback_url",
            PaymentError::InvalidPaymentRequest(_) => "invalid_payment_request",
            PaymentError::ZeroAmountPaymentRequest => "zero_amount_payment_request",
            PaymentError::DuplicatePaymentRequest => "duplicate_payment_request",
            PaymentError::InsufficientBalance { .. } => "insufficient_balance",
            PaymentError::NodeUnavailable { .. } => "node_unavailable",
            PaymentError::PaymentFailed { .. } => "payment_failed",
            PaymentError::NotFound(_) => "not_found",
            PaymentError::LedgerConflict { .. } => "ledger_conflict",
            PaymentError::Storage(_) => "storage_error",
        }
    }
}

impl From<LedgerDbError> for PaymentError {
    fn from(err: LedgerDbError) -> Self {
        match err {
            LedgerDbError::InvalidAmount(_) => PaymentError::InvalidAmount,
            LedgerDbError::DuplicatePaymentRequest(_) => PaymentError::DuplicatePaymentRequest,
            LedgerDbError::InsufficientBalance {
                available_msat,
                required_msat,
            } => PaymentError::InsufficientBalance {
                available_msat,
                required_msat,
            },
            LedgerDbError::PaymentNotFound(id) => PaymentError::NotFound(id),
            other => {
                tracing::error!(error = %other, "Ledger storage failure");
                PaymentError::Storage(other)
            }
        }
    }
}
