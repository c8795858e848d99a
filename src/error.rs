// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::auth::AuthError;
use crate::payments::PaymentError;
use crate::storage::LedgerDbError;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub code: &'static str,
}

/// Error body returned by every endpoint.
#[derive(Serialize, ToSchema)]
pub struct ErrorBody {
    pub error: String,
    pub error_code: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            code,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

}

impl From<PaymentError> for ApiError {
    fn from(err: PaymentError) -> Self {
        let status = match &err {
            PaymentError::InvalidAmount
            | PaymentError::AmountTooLarge { .. }
            | PaymentError::InvalidCallbackUrl(_)
            | PaymentError::InvalidPaymentRequest(_)
            | PaymentError::ZeroAmountPaymentRequest => StatusCode::BAD_REQUEST,
            PaymentError::DuplicatePaymentRequest => StatusCode::CONFLICT,
            PaymentError::InsufficientBalance { .. } | PaymentError::PaymentFailed { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            PaymentError::NodeUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            PaymentError::NotFound(_) => StatusCode::NOT_FOUND,
            PaymentError::Storage(_) | PaymentError::LedgerConflict { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let message = match &err {
            // storage internals stay in the logs
            PaymentError::Storage(_) => "Internal storage error".to_string(),
            other => other.to_string(),
        };
        Self::new(status, err.code(), message)
    }
}

impl From<LedgerDbError> for ApiError {
    fn from(err: LedgerDbError) -> Self {
        PaymentError::from(err).into()
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        Self::new(err.status(), err.code(), err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
            error_code: self.code.to_string(),
        });
        (self.status, body).into_response()
    }
}
