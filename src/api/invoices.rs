// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Inbound invoice endpoints.

use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use serde::Deserialize;
use utoipa::ToSchema;

use crate::{
    auth::{Auth, Scope},
    error::{ApiError, ErrorBody},
    payments::CreateInvoiceRequest,
    state::AppState,
    storage::PaymentView,
};

/// Request body for POST /v1/invoices
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateInvoiceBody {
    /// Amount in satoshis (1 to 4294967)
    pub amount_sat: u64,
    /// Memo embedded in the BOLT11 invoice
    #[serde(default)]
    pub memo: Option<String>,
    /// Internal description, not shown to the payer
    #[serde(default)]
    pub description: Option<String>,
    /// http(s) URL notified once the invoice is paid
    #[serde(default)]
    pub callback_url: Option<String>,
    #[serde(default)]
    pub customer_order_id: Option<String>,
}

impl From<CreateInvoiceBody> for CreateInvoiceRequest {
    fn from(body: CreateInvoiceBody) -> Self {
        Self {
            amount_sat: body.amount_sat,
            memo: body.memo,
            description: body.description,
            callback_url: body.callback_url,
            customer_order_id: body.customer_order_id,
        }
    }
}

/// Issue a Lightning invoice that credits the caller once paid.
#[utoipa::path(
    post,
    path = "/v1/invoices",
    tag = "Invoices",
    request_body = CreateInvoiceBody,
    security(("bearer" = [])),
    responses(
        (status = 201, description = "Invoice created", body = PaymentView),
        (status = 400, description = "Invalid amount or callback URL", body = ErrorBody),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Missing create_invoice scope"),
        (status = 503, description = "Lightning node unavailable", body = ErrorBody)
    )
)]
pub async fn create_invoice(
    Auth(user): Auth,
    State(state): State<AppState>,
    Json(body): Json<CreateInvoiceBody>,
) -> Result<(StatusCode, Json<PaymentView>), ApiError> {
    user.require(Scope::CreateInvoice)?;
    let payment = state.invoices.create_invoice(user.user_id, body.into()).await?;
    Ok((StatusCode::CREATED, Json(payment.view_at(Utc::now()))))
}
