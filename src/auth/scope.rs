// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Token scopes for authorization.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Permission carried in a token's `scopes` claim.
///
/// Scopes are flat: holding one grants nothing else.
///
/// - `ReadWallet` - balance and payment history
/// - `CreateInvoice` - issue inbound invoices
/// - `SendTransaction` - pay outbound invoices
/// - `EditAccount` - API keys and hiding payments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    ReadWallet,
    CreateInvoice,
    SendTransaction,
    EditAccount,
}

impl Scope {
    /// Parse a scope name (case-insensitive). Unknown names yield `None`.
    pub fn parse(s: &str) -> Option<Scope> {
        match s.to_ascii_lowercase().as_str() {
            "read_wallet" => Some(Scope::ReadWallet),
            "create_invoice" => Some(Scope::CreateInvoice),
            "send_transaction" => Some(Scope::SendTransaction),
            "edit_account" => Some(Scope::EditAccount),
            _ => None,
        }
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scope::ReadWallet => write!(f, "read_wallet"),
            Scope::CreateInvoice => write!(f, "create_invoice"),
            Scope::SendTransaction => write!(f, "send_transaction"),
            Scope::EditAccount => write!(f, "edit_account"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!(Scope::parse("read_wallet"), Some(Scope::ReadWallet));
        assert_eq!(Scope::parse("SEND_TRANSACTION"), Some(Scope::SendTransaction));
        assert_eq!(Scope::parse("admin"), None);
    }

    #[test]
    fn display_matches_serde_name() {
        for scope in [
            Scope::ReadWallet,
            Scope::CreateInvoice,
            Scope::SendTransaction,
            Scope::EditAccount,
        ] {
            let json = serde_json::to_string(&scope).unwrap();
            assert_eq!(json, format!("\"{scope}\""));
        }
    }
}
