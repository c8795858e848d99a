// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Bearer-token authentication for the Lightning API.
//!
//! ## Auth Flow
//!
//! 1. The account service issues an HS256 JWT signed with `JWT_SECRET`
//! 2. Clients send `Authorization: Bearer <JWT>`
//! 3. The server:
//!    - Verifies signature, expiry and (if configured) issuer
//!    - Extracts:
//!      - `sub` → numeric `user_id`
//!      - `scopes` → the operations the token may perform
//!
//! ## Security
//!
//! - All non-health endpoints require authentication
//! - Every handler checks its own scope with `AuthenticatedUser::require`
//! - Clock skew tolerance is 60 seconds

pub mod api_key;
pub mod claims;
pub mod error;
pub mod extractor;
pub mod scope;

pub use api_key::{generate_api_key, hash_api_key};
pub use claims::{AuthenticatedUser, Claims};
pub use error::AuthError;
pub use extractor::{Auth, AuthConfig};
pub use scope::Scope;
