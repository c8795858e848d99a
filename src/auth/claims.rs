// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! JWT claims and authenticated user representation.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{AuthError, Scope};

/// Claims carried by an access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the decimal ledger user id.
    pub sub: String,

    /// Expiration timestamp
    pub exp: i64,

    /// Issuer, checked only when `JWT_ISSUER` is configured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,

    /// Scope names. Unknown names are ignored.
    #[serde(default)]
    pub scopes: Vec<String>,
}

/// Authenticated user information extracted from a verified token.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuthenticatedUser {
    /// Ledger user id (the token's `sub`)
    pub user_id: u64,

    /// Granted scopes
    pub scopes: Vec<Scope>,

    /// Token expiration (Unix timestamp, not serialized)
    #[serde(skip)]
    pub expires_at: i64,
}

impl AuthenticatedUser {
    pub fn from_claims(claims: Claims) -> Result<Self, AuthError> {
        let user_id = claims
            .sub
            .trim()
            .parse::<u64>()
            .map_err(|_| AuthError::InvalidSubject)?;

        let mut scopes: Vec<Scope> = claims.scopes.iter().filter_map(|s| Scope::parse(s)).collect();
        scopes.sort_by_key(|s| *s as u8);
        scopes.dedup();

        Ok(Self {
            user_id,
            scopes,
            expires_at: claims.exp,
        })
    }

    pub fn has_scope(&self, scope: Scope) -> bool {
        self.scopes.contains(&scope)
    }

    /// Fail with [`AuthError::MissingScope`] unless the token grants `scope`.
    pub fn require(&self, scope: Scope) -> Result<(), AuthError> {
        if self.has_scope(scope) {
            Ok(())
        } else {
            tracing::debug!(user_id = self.user_id, required = %scope, "Missing scope");
            Err(AuthError::MissingScope(scope))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(sub: &str, scopes: &[&str]) -> Claims {
        Claims {
            sub: sub.to_string(),
            exp: 1700003600,
            iss: None,
            scopes: scopes.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn from_claims_parses_numeric_subject() {
        let user = AuthenticatedUser::from_claims(claims("42", &["read_wallet"])).unwrap();
        assert_eq!(user.user_id, 42);
        assert_eq!(user.expires_at, 1700003600);
    }

    #[test]
    fn from_claims_rejects_non_numeric_subject() {
        let err = AuthenticatedUser::from_claims(claims("user_123", &[])).unwrap_err();
        assert!(matches!(err, AuthError::InvalidSubject));
    }

    #[test]
    fn unknown_and_repeated_scopes_are_dropped() {
        let user = AuthenticatedUser::from_claims(claims(
            "1",
            &["send_transaction", "admin", "read_wallet", "send_transaction"],
        ))
        .unwrap();
        assert_eq!(user.scopes, vec![Scope::ReadWallet, Scope::SendTransaction]);
    }

    #[test]
    fn require_checks_scope() {
        let user = AuthenticatedUser::from_claims(claims("1", &["read_wallet"])).unwrap();
        assert!(user.require(Scope::ReadWallet).is_ok());
        assert!(matches!(
            user.require(Scope::SendTransaction),
            Err(AuthError::MissingScope(Scope::SendTransaction))
        ));
    }
}
