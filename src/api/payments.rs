// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Outbound payment and payment history endpoints.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::{
    auth::{Auth, Scope},
    error::{ApiError, ErrorBody},
    payments::PayInvoiceRequest,
    state::AppState,
    storage::{ListQuery, PaymentView},
};

/// Largest page size accepted by the list endpoint.
pub const MAX_PAGE_SIZE: usize = 200;

/// Request body for POST /v1/payments
#[derive(Debug, Deserialize, ToSchema)]
pub struct PayInvoiceBody {
    /// BOLT11 payment request to pay
    pub payment_request: String,
    /// Overrides the description decoded from the payment request
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ListPaymentsQuery {
    /// Page size (default 50, at most 200)
    pub limit: Option<usize>,
    /// Entries to skip
    pub offset: Option<usize>,
    /// Include soft-deleted entries
    pub include_deleted: Option<bool>,
}

impl From<ListPaymentsQuery> for ListQuery {
    fn from(query: ListPaymentsQuery) -> Self {
        let defaults = ListQuery::default();
        Self {
            limit: query.limit.unwrap_or(defaults.limit).min(MAX_PAGE_SIZE),
            offset: query.offset.unwrap_or(defaults.offset),
            include_deleted: query.include_deleted.unwrap_or(defaults.include_deleted),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ListPaymentsResponse {
    /// Newest first
    pub payments: Vec<PaymentView>,
}

/// Pay a Lightning invoice from the caller's balance.
///
/// The amount is debited before the node is contacted. A node-reported
/// failure releases the debit and answers 422 `payment_failed`. When the
/// node cannot be reached the entry may stay OPEN until it is reconciled.
#[utoipa::path(
    post,
    path = "/v1/payments",
    tag = "Payments",
    request_body = PayInvoiceBody,
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Payment succeeded", body = PaymentView),
        (status = 400, description = "Invalid or zero-amount payment request", body = ErrorBody),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Missing send_transaction scope"),
        (status = 409, description = "Payment request already recorded", body = ErrorBody),
        (status = 422, description = "Insufficient balance or payment failed", body = ErrorBody),
        (status = 503, description = "Lightning node unavailable", body = ErrorBody)
    )
)]
pub async fn pay_invoice(
    Auth(user): Auth,
    State(state): State<AppState>,
    Json(body): Json<PayInvoiceBody>,
) -> Result<Json<PaymentView>, ApiError> {
    user.require(Scope::SendTransaction)?;
    let payment = state
        .executor
        .pay_invoice(
            user.user_id,
            PayInvoiceRequest {
                payment_request: body.payment_request,
                description: body.description,
            },
        )
        .await?;
    Ok(Json(payment.view_at(Utc::now())))
}

/// List the caller's payments, newest first.
#[utoipa::path(
    get,
    path = "/v1/payments",
    tag = "Payments",
    params(ListPaymentsQuery),
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Payments", body = ListPaymentsResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Missing read_wallet scope")
    )
)]
pub async fn list_payments(
    Auth(user): Auth,
    State(state): State<AppState>,
    Query(query): Query<ListPaymentsQuery>,
) -> Result<Json<ListPaymentsResponse>, ApiError> {
    user.require(Scope::ReadWallet)?;
    let now = Utc::now();
    let payments = state
        .db()
        .list_by_user(user.user_id, query.into())?
        .into_iter()
        .map(|p| p.view_at(now))
        .collect();
    Ok(Json(ListPaymentsResponse { payments }))
}

/// Get one of the caller's payments.
#[utoipa::path(
    get,
    path = "/v1/payments/{payment_id}",
    tag = "Payments",
    params(("payment_id" = u64, Path, description = "Payment ID")),
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Payment", body = PaymentView),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Missing read_wallet scope"),
        (status = 404, description = "Payment not found", body = ErrorBody)
    )
)]
pub async fn get_payment(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path(payment_id): Path<u64>,
) -> Result<Json<PaymentView>, ApiError> {
    user.require(Scope::ReadWallet)?;
    // another user's entry is indistinguishable from a missing one
    let payment = state
        .db()
        .get_for_user(user.user_id, payment_id)?
        .ok_or_else(|| ApiError::not_found(format!("payment {payment_id} not found")))?;
    Ok(Json(payment.view_at(Utc::now())))
}

/// Hide a payment from listings. The balance is not affected.
#[utoipa::path(
    delete,
    path = "/v1/payments/{payment_id}",
    tag = "Payments",
    params(("payment_id" = u64, Path, description = "Payment ID")),
    security(("bearer" = [])),
    responses(
        (status = 204, description = "Payment hidden"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Missing edit_account scope"),
        (status = 404, description = "Payment not found", body = ErrorBody)
    )
)]
pub async fn delete_payment(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path(payment_id): Path<u64>,
) -> Result<StatusCode, ApiError> {
    user.require(Scope::EditAccount)?;
    state.db().soft_delete(user.user_id, payment_id)?;
    tracing::info!(user_id = user.user_id, payment_id, "Payment hidden");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_query_defaults_and_clamps() {
        let query: ListQuery = ListPaymentsQuery {
            limit: None,
            offset: None,
            include_deleted: None,
        }
        .into();
        assert_eq!(query.limit, 50);
        assert_eq!(query.offset, 0);
        assert!(!query.include_deleted);

        let query: ListQuery = ListPaymentsQuery {
            limit: Some(10_000),
            offset: Some(5),
            include_deleted: Some(true),
        }
        .into();
        assert_eq!(query.limit, MAX_PAGE_SIZE);
        assert_eq!(query.offset, 5);
        assert!(query.include_deleted);
    }
}
