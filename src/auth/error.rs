// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Bearer token failures.
//!
//! Everything except a missing scope is a 401; a valid token without the
//! scope an endpoint needs is a 403.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

use super::Scope;
use crate::error::ApiError;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("Authorization header is required")]
    MissingAuthHeader,

    #[error("Authorization header must be 'Bearer <token>'")]
    InvalidAuthHeader,

    #[error("Bearer token could not be decoded")]
    MalformedToken,

    #[error("Bearer token signature does not verify")]
    InvalidSignature,

    #[error("Bearer token has expired")]
    TokenExpired,

    #[error("Bearer token was issued by an unexpected issuer")]
    InvalidIssuer,

    #[error("Bearer token is not valid yet")]
    TokenNotYetValid,

    /// `sub` must carry the numeric user id the ledger keys on.
    #[error("Token subject is not a user id")]
    InvalidSubject,

    #[error("Token does not grant the {0} scope")]
    MissingScope(Scope),
}

impl AuthError {
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::MissingAuthHeader => "missing_auth_header",
            AuthError::InvalidAuthHeader => "invalid_auth_header",
            AuthError::MalformedToken => "malformed_token",
            AuthError::InvalidSignature => "invalid_signature",
            AuthError::TokenExpired => "token_expired",
            AuthError::InvalidIssuer => "invalid_issuer",
            AuthError::TokenNotYetValid => "token_not_yet_valid",
            AuthError::InvalidSubject => "invalid_subject",
            AuthError::MissingScope(_) => "insufficient_permissions",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::MissingScope(_) => StatusCode::FORBIDDEN,
            _ => StatusCode::UNAUTHORIZED,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        ApiError::from(self).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use serde_json::Value;

    async fn body(err: AuthError) -> (StatusCode, Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn token_problems_are_unauthorized() {
        for err in [
            AuthError::MissingAuthHeader,
            AuthError::TokenExpired,
            AuthError::InvalidSubject,
        ] {
            let code = err.code();
            let (status, json) = body(err).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED);
            assert_eq!(json["error_code"], code);
        }
    }

    #[tokio::test]
    async fn missing_scope_is_forbidden_and_named() {
        let (status, json) = body(AuthError::MissingScope(Scope::SendTransaction)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(json["error_code"], "insufficient_permissions");
        assert_eq!(json["error"], "Token does not grant the send_transaction scope");
    }
}
