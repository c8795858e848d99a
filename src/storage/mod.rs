// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Ledger Storage
//!
//! Persistent state lives in a single redb file under `DATA_DIR`:
//!
//! ```text
//! $DATA_DIR/
//!   ledger.redb     # payments, indices, API key hashes
//! ```
//!
//! Entries are never hard-deleted. Balances are derived, never stored.

pub mod ledger_db;
pub mod payment;

pub use ledger_db::{LedgerDb, LedgerDbError, LedgerResult, ListQuery, Transition};
pub use payment::{Balance, Direction, NewPayment, Payment, PaymentStatus, PaymentView, MSAT_PER_SAT};

/// File name of the ledger database inside the data directory.
pub const LEDGER_FILE: &str = "ledger.redb";
