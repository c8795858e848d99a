// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Ledger entry model.
//!
//! A [`Payment`] is the only persisted financial record. Balances are never
//! stored; they are derived from these rows by [`super::LedgerDb::balance`].

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Millisatoshis per satoshi.
pub const MSAT_PER_SAT: u64 = 1000;

/// Value direction of a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    /// Invoice issued by the service, credits the user once settled.
    Inbound,
    /// Payment sent by the service, debits the user while not failed.
    Outbound,
}

/// Lifecycle status of a ledger entry.
///
/// ```text
/// OPEN ──► SUCCEEDED
///   └────► FAILED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Open,
    Succeeded,
    Failed,
}

impl PaymentStatus {
    pub fn is_terminal(self) -> bool {
        match self {
            PaymentStatus::Open => false,
            PaymentStatus::Succeeded | PaymentStatus::Failed => true,
        }
    }

    /// Whether `self → next` is a valid lifecycle step.
    pub fn can_transition_to(self, next: PaymentStatus) -> bool {
        match (self, next) {
            (PaymentStatus::Open, PaymentStatus::Succeeded) => true,
            (PaymentStatus::Open, PaymentStatus::Failed) => true,
            (PaymentStatus::Open, PaymentStatus::Open) => false,
            (PaymentStatus::Succeeded, _) => false,
            (PaymentStatus::Failed, _) => false,
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PaymentStatus::Open => "OPEN",
            PaymentStatus::Succeeded => "SUCCEEDED",
            PaymentStatus::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// Persisted ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Payment {
    /// Store-assigned identifier, never reused
    pub id: u64,
    /// Owning user
    pub user_id: u64,
    pub direction: Direction,
    pub status: PaymentStatus,
    pub amount_sat: u64,
    /// Always `amount_sat * 1000`
    pub amount_msat: u64,
    /// BOLT11 payment request (unique across the ledger)
    pub payment_request: String,
    /// Payment hash, lowercase hex
    pub hashed_preimage: String,
    /// Preimage, lowercase hex. Present iff status is SUCCEEDED.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preimage: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_order_id: Option<String>,
    /// Invoice lifetime in seconds, counted from `created_at`
    pub expiry: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settled_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Payment {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.created_at + Duration::seconds(self.expiry)
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Signed contribution of this entry to its owner's balance.
    pub fn balance_effect_msat(&self) -> i64 {
        let msat = self.amount_msat as i64;
        match (self.direction, self.status) {
            (Direction::Inbound, PaymentStatus::Succeeded) => msat,
            (Direction::Inbound, PaymentStatus::Open | PaymentStatus::Failed) => 0,
            (Direction::Outbound, PaymentStatus::Open | PaymentStatus::Succeeded) => -msat,
            (Direction::Outbound, PaymentStatus::Failed) => 0,
        }
    }

    /// Attach the derived `expired` flag for API responses.
    pub fn view_at(self, now: DateTime<Utc>) -> PaymentView {
        PaymentView {
            expired: self.is_expired_at(now),
            payment: self,
        }
    }
}

/// Fields supplied by callers when creating an entry.
///
/// The store assigns `id`, timestamps and the OPEN status and derives
/// `amount_msat`.
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub user_id: u64,
    pub direction: Direction,
    pub amount_sat: u64,
    pub payment_request: String,
    pub hashed_preimage: String,
    pub memo: Option<String>,
    pub description: Option<String>,
    pub callback_url: Option<String>,
    pub customer_order_id: Option<String>,
    pub expiry: i64,
}

/// Ledger entry plus read-time fields.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PaymentView {
    #[serde(flatten)]
    pub payment: Payment,
    /// `now > created_at + expiry`, computed when the entry is read
    pub expired: bool,
}

/// Derived user balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Balance {
    pub msat: i64,
}

impl Balance {
    /// Whole satoshis, rounded toward zero.
    pub fn sats(self) -> i64 {
        self.msat / MSAT_PER_SAT as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payment(direction: Direction, status: PaymentStatus) -> Payment {
        let now = Utc::now();
        Payment {
            id: 1,
            user_id: 7,
            direction,
            status,
            amount_sat: 250,
            amount_msat: 250_000,
            payment_request: "lnbcrt2500n1test".to_string(),
            hashed_preimage: "ab".repeat(32),
            preimage: None,
            memo: None,
            description: None,
            callback_url: None,
            customer_order_id: None,
            expiry: 3600,
            created_at: now,
            updated_at: now,
            settled_at: None,
            deleted_at: None,
        }
    }

    #[test]
    fn only_open_entries_transition() {
        use PaymentStatus::*;
        assert!(Open.can_transition_to(Succeeded));
        assert!(Open.can_transition_to(Failed));
        for terminal in [Succeeded, Failed] {
            assert!(terminal.is_terminal());
            for next in [Open, Succeeded, Failed] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn balance_effect_follows_direction_and_status() {
        use Direction::*;
        use PaymentStatus::*;
        assert_eq!(payment(Inbound, Open).balance_effect_msat(), 0);
        assert_eq!(payment(Inbound, Succeeded).balance_effect_msat(), 250_000);
        assert_eq!(payment(Inbound, Failed).balance_effect_msat(), 0);
        assert_eq!(payment(Outbound, Open).balance_effect_msat(), -250_000);
        assert_eq!(payment(Outbound, Succeeded).balance_effect_msat(), -250_000);
        assert_eq!(payment(Outbound, Failed).balance_effect_msat(), 0);
    }

    #[test]
    fn expiry_is_computed_from_creation_time() {
        let p = payment(Direction::Inbound, PaymentStatus::Open);
        assert!(!p.is_expired_at(p.created_at + Duration::seconds(3600)));
        assert!(p.is_expired_at(p.created_at + Duration::seconds(3601)));
    }

    #[test]
    fn status_serializes_screaming_case() {
        let p = payment(Direction::Outbound, PaymentStatus::Succeeded);
        let json = serde_json::to_value(p.view_at(Utc::now())).unwrap();
        assert_eq!(json["status"], "SUCCEEDED");
        assert_eq!(json["direction"], "OUTBOUND");
        assert_eq!(json["expired"], false);
        assert!(json.get("preimage").is_none());
    }

    #[test]
    fn balance_sats_truncates() {
        assert_eq!(Balance { msat: 1_999 }.sats(), 1);
        assert_eq!(Balance { msat: 0 }.sats(), 0);
    }
}
