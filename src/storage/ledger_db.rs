// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded ledger database backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `payments`: id → serialized [`Payment`] (JSON bytes)
//! - `payment_request_index`: payment request → id (unique)
//! - `hash_index`: payment hash (hex) → ids (multimap)
//! - `user_index`: user id → ids (multimap)
//! - `open_payments`: id → user id, for entries still OPEN
//! - `api_key_hashes`: user id → SHA-256 of the user's API key
//! - `ledger_state`: key → value (id counter)
//!
//! redb admits a single write transaction at a time. Every operation that
//! must observe and change a user's balance atomically (the debit check and
//! the outbound insert) runs inside one write transaction, which is what
//! makes concurrent payments for the same user safe.

use std::path::Path;

use chrono::Utc;
use redb::{
    Database, MultimapTableDefinition, ReadableDatabase, ReadableMultimapTable, ReadableTable,
    TableDefinition, WriteTransaction,
};

use super::payment::{Balance, Direction, NewPayment, Payment, PaymentStatus, MSAT_PER_SAT};

// =============================================================================
// Table Definitions
// =============================================================================

/// Primary table: id → serialized Payment (JSON bytes).
const PAYMENTS: TableDefinition<u64, &[u8]> = TableDefinition::new("payments");

/// Unique index: payment request → id.
const PAYMENT_REQUEST_INDEX: TableDefinition<&str, u64> =
    TableDefinition::new("payment_request_index");

/// Index: lowercase hex payment hash → ids.
const HASH_INDEX: MultimapTableDefinition<&str, u64> = MultimapTableDefinition::new("hash_index");

/// Index: user id → ids. Values iterate in ascending id order.
const USER_INDEX: MultimapTableDefinition<u64, u64> = MultimapTableDefinition::new("user_index");

/// Entries still in OPEN status: id → user id.
const OPEN_PAYMENTS: TableDefinition<u64, u64> = TableDefinition::new("open_payments");

/// user id → SHA-256 of the raw API key.
const API_KEY_HASHES: TableDefinition<u64, &[u8]> = TableDefinition::new("api_key_hashes");

/// Ledger state: key → value.
const LEDGER_STATE: TableDefinition<&str, u64> = TableDefinition::new("ledger_state");

const NEXT_PAYMENT_ID: &str = "next_payment_id";

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum LedgerDbError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("payment {0} not found")]
    PaymentNotFound(u64),

    #[error("invalid amount: {0} sat")]
    InvalidAmount(u64),

    #[error("payment request already recorded as payment {0}")]
    DuplicatePaymentRequest(u64),

    #[error("insufficient balance: {available_msat} msat available, {required_msat} msat required")]
    InsufficientBalance {
        available_msat: i64,
        required_msat: u64,
    },

    #[error("ledger corrupt: {0}")]
    Corrupt(String),
}

pub type LedgerResult<T> = Result<T, LedgerDbError>;

// =============================================================================
// Query / Result Types
// =============================================================================

/// Pagination for [`LedgerDb::list_by_user`].
#[derive(Debug, Clone, Copy)]
pub struct ListQuery {
    pub limit: usize,
    pub offset: usize,
    pub include_deleted: bool,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            limit: 50,
            offset: 0,
            include_deleted: false,
        }
    }
}

/// Outcome of a status transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// The entry was OPEN and has been moved to the requested status.
    Applied(Payment),
    /// The entry was already terminal; nothing was written.
    Unchanged(Payment),
}

impl Transition {
    pub fn applied(&self) -> bool {
        matches!(self, Transition::Applied(_))
    }

    pub fn into_payment(self) -> Payment {
        match self {
            Transition::Applied(p) | Transition::Unchanged(p) => p,
        }
    }
}

// =============================================================================
// Row Helpers
// =============================================================================

fn load<T>(table: &T, id: u64) -> LedgerResult<Option<Payment>>
where
    T: ReadableTable<u64, &'static [u8]>,
{
    match table.get(id)? {
        Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
        None => Ok(None),
    }
}

fn load_indexed<T>(table: &T, id: u64) -> LedgerResult<Payment>
where
    T: ReadableTable<u64, &'static [u8]>,
{
    load(table, id)?
        .ok_or_else(|| LedgerDbError::Corrupt(format!("index points at missing payment {id}")))
}

fn user_payment_ids<T>(index: &T, user_id: u64) -> LedgerResult<Vec<u64>>
where
    T: ReadableMultimapTable<u64, u64>,
{
    let mut ids = Vec::new();
    for entry in index.get(user_id)? {
        ids.push(entry?.value());
    }
    Ok(ids)
}

fn user_balance<U, P>(index: &U, payments: &P, user_id: u64) -> LedgerResult<Balance>
where
    U: ReadableMultimapTable<u64, u64>,
    P: ReadableTable<u64, &'static [u8]>,
{
    let mut msat: i64 = 0;
    for id in user_payment_ids(index, user_id)? {
        let payment = load_indexed(payments, id)?;
        msat = msat
            .checked_add(payment.balance_effect_msat())
            .ok_or_else(|| LedgerDbError::Corrupt(format!("balance overflow for user {user_id}")))?;
    }
    Ok(Balance { msat })
}

// =============================================================================
// LedgerDb
// =============================================================================

/// Embedded ACID payment ledger.
pub struct LedgerDb {
    db: Database,
}

impl LedgerDb {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> LedgerResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let db = Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(PAYMENTS)?;
            let _ = write_txn.open_table(PAYMENT_REQUEST_INDEX)?;
            let _ = write_txn.open_multimap_table(HASH_INDEX)?;
            let _ = write_txn.open_multimap_table(USER_INDEX)?;
            let _ = write_txn.open_table(OPEN_PAYMENTS)?;
            let _ = write_txn.open_table(API_KEY_HASHES)?;
            let _ = write_txn.open_table(LEDGER_STATE)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    // =========================================================================
    // Inserts
    // =========================================================================

    /// Insert a new OPEN entry.
    pub fn insert(&self, new: &NewPayment) -> LedgerResult<Payment> {
        let write_txn = self.db.begin_write()?;
        let payment = insert_in(&write_txn, new)?;
        write_txn.commit()?;
        Ok(payment)
    }

    /// Check the user's balance covers `new` and insert it, atomically.
    ///
    /// Nothing is written when the balance is insufficient.
    pub fn debit_and_insert(&self, new: &NewPayment) -> LedgerResult<Payment> {
        let required_msat = new
            .amount_sat
            .checked_mul(MSAT_PER_SAT)
            .ok_or(LedgerDbError::InvalidAmount(new.amount_sat))?;

        let write_txn = self.db.begin_write()?;
        {
            let index = write_txn.open_multimap_table(USER_INDEX)?;
            let payments = write_txn.open_table(PAYMENTS)?;
            let balance = user_balance(&index, &payments, new.user_id)?;
            let covered = i64::try_from(required_msat)
                .map(|required| balance.msat >= required)
                .unwrap_or(false);
            if !covered {
                return Err(LedgerDbError::InsufficientBalance {
                    available_msat: balance.msat,
                    required_msat,
                });
            }
        }
        let payment = insert_in(&write_txn, new)?;
        write_txn.commit()?;
        Ok(payment)
    }

    // =========================================================================
    // Lookups
    // =========================================================================

    pub fn get(&self, id: u64) -> LedgerResult<Option<Payment>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(PAYMENTS)?;
        load(&table, id)
    }

    /// Look up an entry owned by `user_id`. Other users' entries read as absent.
    pub fn get_for_user(&self, user_id: u64, id: u64) -> LedgerResult<Option<Payment>> {
        Ok(self.get(id)?.filter(|p| p.user_id == user_id))
    }

    pub fn find_by_payment_request(&self, payment_request: &str) -> LedgerResult<Option<Payment>> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(PAYMENT_REQUEST_INDEX)?;
        let id = match index.get(payment_request)? {
            Some(id) => id.value(),
            None => return Ok(None),
        };
        let payments = read_txn.open_table(PAYMENTS)?;
        load_indexed(&payments, id).map(Some)
    }

    /// All entries recorded under a payment hash, oldest first.
    pub fn find_by_hash(&self, hashed_preimage: &str) -> LedgerResult<Vec<Payment>> {
        let hash = hashed_preimage.to_ascii_lowercase();
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_multimap_table(HASH_INDEX)?;
        let payments = read_txn.open_table(PAYMENTS)?;

        let mut found = Vec::new();
        for entry in index.get(hash.as_str())? {
            found.push(load_indexed(&payments, entry?.value())?);
        }
        Ok(found)
    }

    /// A user's entries, newest first.
    pub fn list_by_user(&self, user_id: u64, query: ListQuery) -> LedgerResult<Vec<Payment>> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_multimap_table(USER_INDEX)?;
        let payments = read_txn.open_table(PAYMENTS)?;

        let mut ids = user_payment_ids(&index, user_id)?;
        ids.reverse();

        let mut results = Vec::with_capacity(query.limit.min(ids.len()));
        let mut skipped = 0;
        for id in ids {
            if results.len() >= query.limit {
                break;
            }
            let payment = load_indexed(&payments, id)?;
            if payment.is_deleted() && !query.include_deleted {
                continue;
            }
            if skipped < query.offset {
                skipped += 1;
                continue;
            }
            results.push(payment);
        }
        Ok(results)
    }

    /// OPEN entries still awaiting reconciliation, oldest first.
    ///
    /// Expired invoices drop out of this set once retired with
    /// [`LedgerDb::retire_expired_invoice`] while keeping their OPEN status.
    pub fn list_open(&self) -> LedgerResult<Vec<Payment>> {
        let read_txn = self.db.begin_read()?;
        let open = read_txn.open_table(OPEN_PAYMENTS)?;
        let payments = read_txn.open_table(PAYMENTS)?;

        let mut results = Vec::new();
        for entry in open.iter()? {
            let (id, _user) = entry?;
            results.push(load_indexed(&payments, id.value())?);
        }
        Ok(results)
    }

    /// Derive a user's balance from their ledger rows.
    pub fn balance(&self, user_id: u64) -> LedgerResult<Balance> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_multimap_table(USER_INDEX)?;
        let payments = read_txn.open_table(PAYMENTS)?;
        user_balance(&index, &payments, user_id)
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    /// OPEN → SUCCEEDED, recording the preimage and settlement time.
    pub fn mark_succeeded(&self, id: u64, preimage_hex: &str) -> LedgerResult<Transition> {
        let preimage = preimage_hex.to_ascii_lowercase();
        self.transition(id, PaymentStatus::Succeeded, move |payment| {
            payment.preimage = Some(preimage);
            payment.settled_at = Some(payment.updated_at);
        })
    }

    /// OPEN → FAILED. For outbound entries this releases the debit.
    pub fn mark_failed(&self, id: u64) -> LedgerResult<Transition> {
        self.transition(id, PaymentStatus::Failed, |_| {})
    }

    fn transition(
        &self,
        id: u64,
        next: PaymentStatus,
        apply: impl FnOnce(&mut Payment),
    ) -> LedgerResult<Transition> {
        let write_txn = self.db.begin_write()?;
        let outcome = {
            let mut payments = write_txn.open_table(PAYMENTS)?;
            let mut payment = load(&payments, id)?.ok_or(LedgerDbError::PaymentNotFound(id))?;

            if !payment.status.can_transition_to(next) {
                return Ok(Transition::Unchanged(payment));
            }

            payment.status = next;
            payment.updated_at = Utc::now();
            apply(&mut payment);

            let json = serde_json::to_vec(&payment)?;
            payments.insert(id, json.as_slice())?;

            let mut open = write_txn.open_table(OPEN_PAYMENTS)?;
            open.remove(id)?;

            Transition::Applied(payment)
        };
        write_txn.commit()?;
        Ok(outcome)
    }

    /// Stop reconciling an inbound entry whose invoice expired unpaid.
    ///
    /// The entry stays OPEN. Returns `false` when the entry is not an
    /// expired, OPEN inbound entry still in the sweep set.
    pub fn retire_expired_invoice(&self, id: u64) -> LedgerResult<bool> {
        let write_txn = self.db.begin_write()?;
        let retired = {
            let payments = write_txn.open_table(PAYMENTS)?;
            let payment = load(&payments, id)?.ok_or(LedgerDbError::PaymentNotFound(id))?;
            let eligible = payment.direction == Direction::Inbound
                && payment.status == PaymentStatus::Open
                && payment.is_expired_at(Utc::now());
            if eligible {
                write_txn.open_table(OPEN_PAYMENTS)?.remove(id)?.is_some()
            } else {
                false
            }
        };
        write_txn.commit()?;
        Ok(retired)
    }

    /// Hide an entry from listings. The entry keeps counting toward the balance.
    pub fn soft_delete(&self, user_id: u64, id: u64) -> LedgerResult<Payment> {
        let write_txn = self.db.begin_write()?;
        let payment = {
            let mut payments = write_txn.open_table(PAYMENTS)?;
            let mut payment = load(&payments, id)?
                .filter(|p| p.user_id == user_id)
                .ok_or(LedgerDbError::PaymentNotFound(id))?;

            if payment.deleted_at.is_none() {
                let now = Utc::now();
                payment.deleted_at = Some(now);
                payment.updated_at = now;
                let json = serde_json::to_vec(&payment)?;
                payments.insert(id, json.as_slice())?;
            }
            payment
        };
        write_txn.commit()?;
        Ok(payment)
    }

    // =========================================================================
    // API keys
    // =========================================================================

    pub fn set_api_key_hash(&self, user_id: u64, hash: &[u8; 32]) -> LedgerResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(API_KEY_HASHES)?;
            table.insert(user_id, hash.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn api_key_hash(&self, user_id: u64) -> LedgerResult<Option<[u8; 32]>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(API_KEY_HASHES)?;
        match table.get(user_id)? {
            Some(v) => {
                let hash: [u8; 32] = v.value().try_into().map_err(|_| {
                    LedgerDbError::Corrupt(format!("api key hash for user {user_id} is not 32 bytes"))
                })?;
                Ok(Some(hash))
            }
            None => Ok(None),
        }
    }

    /// Cheap read used by readiness probes.
    pub fn health_check(&self) -> LedgerResult<()> {
        let read_txn = self.db.begin_read()?;
        let _ = read_txn.open_table(LEDGER_STATE)?;
        Ok(())
    }
}

/// Insert `new` as an OPEN entry inside an existing write transaction.
///
/// Enforces `amount_sat > 0`, `amount_msat == amount_sat * 1000` and
/// uniqueness of the payment request.
fn insert_in(write_txn: &WriteTransaction, new: &NewPayment) -> LedgerResult<Payment> {
    if new.amount_sat == 0 {
        return Err(LedgerDbError::InvalidAmount(0));
    }
    let amount_msat = new
        .amount_sat
        .checked_mul(MSAT_PER_SAT)
        .filter(|msat| i64::try_from(*msat).is_ok())
        .ok_or(LedgerDbError::InvalidAmount(new.amount_sat))?;

    let mut request_index = write_txn.open_table(PAYMENT_REQUEST_INDEX)?;
    if let Some(existing) = request_index.get(new.payment_request.as_str())? {
        return Err(LedgerDbError::DuplicatePaymentRequest(existing.value()));
    }

    let id = {
        let mut state = write_txn.open_table(LEDGER_STATE)?;
        let next = state.get(NEXT_PAYMENT_ID)?.map(|v| v.value()).unwrap_or(1);
        state.insert(NEXT_PAYMENT_ID, next + 1)?;
        next
    };

    let now = Utc::now();
    let payment = Payment {
        id,
        user_id: new.user_id,
        direction: new.direction,
        status: PaymentStatus::Open,
        amount_sat: new.amount_sat,
        amount_msat,
        payment_request: new.payment_request.clone(),
        hashed_preimage: new.hashed_preimage.to_ascii_lowercase(),
        preimage: None,
        memo: new.memo.clone(),
        description: new.description.clone(),
        callback_url: new.callback_url.clone(),
        customer_order_id: new.customer_order_id.clone(),
        expiry: new.expiry,
        created_at: now,
        updated_at: now,
        settled_at: None,
        deleted_at: None,
    };

    let json = serde_json::to_vec(&payment)?;
    write_txn.open_table(PAYMENTS)?.insert(id, json.as_slice())?;
    request_index.insert(payment.payment_request.as_str(), id)?;
    write_txn
        .open_multimap_table(HASH_INDEX)?
        .insert(payment.hashed_preimage.as_str(), id)?;
    write_txn.open_multimap_table(USER_INDEX)?.insert(payment.user_id, id)?;
    write_txn.open_table(OPEN_PAYMENTS)?.insert(id, payment.user_id)?;

    Ok(payment)
}

// =============================================================================
// Tests
// =============================================================================
