// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Relational Lightning - Custodial Lightning Wallet Service
//!
//! Issues Lightning invoices, pays outbound invoices against a balance derived
//! from an embedded ledger, settles inbound payments streamed from an LND node
//! and notifies integrators through signed webhooks.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `auth` - Bearer-token authentication and scopes
//! - `lightning` - Lightning node client trait and LND REST implementation
//! - `payments` - Invoice issuance, payment execution, settlement, webhooks
//! - `retry` - Bounded retry and await helpers
//! - `storage` - Ledger database (redb)

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod lightning;
pub mod logging;
pub mod payments;
pub mod retry;
pub mod state;
pub mod storage;
