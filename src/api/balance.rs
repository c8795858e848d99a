// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Balance endpoint.

use axum::{extract::State, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    auth::{Auth, Scope},
    error::ApiError,
    state::AppState,
    storage::Balance,
};

/// Balance response. Derived from the ledger on every request.
#[derive(Debug, Serialize, ToSchema)]
pub struct BalanceResponse {
    /// Whole satoshis, rounded toward zero
    pub sats: i64,
    pub msats: i64,
}

impl From<Balance> for BalanceResponse {
    fn from(balance: Balance) -> Self {
        Self {
            sats: balance.sats(),
            msats: balance.msat,
        }
    }
}

/// Get the caller's balance.
///
/// Settled inbound payments minus every outbound payment that has not failed.
#[utoipa::path(
    get,
    path = "/v1/balance",
    tag = "Balance",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Current balance", body = BalanceResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Missing read_wallet scope")
    )
)]
pub async fn get_balance(
    Auth(user): Auth,
    State(state): State<AppState>,
) -> Result<Json<BalanceResponse>, ApiError> {
    user.require(Scope::ReadWallet)?;
    let balance = state.db().balance(user.user_id)?;
    Ok(Json(balance.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sub_satoshi_remainder_is_kept_in_msats() {
        let response = BalanceResponse::from(Balance { msat: 1_500_999 });
        assert_eq!(response.sats, 1500);
        assert_eq!(response.msats, 1_500_999);
    }
}
