// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! API key endpoint.

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    auth::{generate_api_key, hash_api_key, Auth, Scope},
    error::ApiError,
    state::AppState,
};

#[derive(Debug, Serialize, ToSchema)]
pub struct ApiKeyResponse {
    /// Raw key. Returned once and never stored.
    pub api_key: String,
}

/// Create or rotate the caller's API key.
///
/// Webhook bodies are signed with HMAC-SHA256 keyed by `sha256(api_key)`.
/// Rotating the key invalidates signatures computed with the old one.
#[utoipa::path(
    post,
    path = "/v1/apikey",
    tag = "Account",
    security(("bearer" = [])),
    responses(
        (status = 201, description = "API key created", body = ApiKeyResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Missing edit_account scope")
    )
)]
pub async fn create_api_key(
    Auth(user): Auth,
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<ApiKeyResponse>), ApiError> {
    user.require(Scope::EditAccount)?;
    let api_key = generate_api_key();
    state
        .db()
        .set_api_key_hash(user.user_id, &hash_api_key(&api_key))?;
    tracing::info!(user_id = user.user_id, "API key rotated");
    Ok((StatusCode::CREATED, Json(ApiKeyResponse { api_key })))
}
