// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use crate::auth::AuthConfig;
use crate::payments::{Deps, InvoiceService, PaymentExecutor, WebhookNotifier};
use crate::storage::LedgerDb;

#[derive(Clone)]
pub struct AppState {
    pub deps: Deps,
    pub invoices: Arc<InvoiceService>,
    pub executor: Arc<PaymentExecutor>,
    pub notifier: WebhookNotifier,
    pub auth_config: AuthConfig,
}

impl AppState {
    pub fn new(deps: Deps, notifier: WebhookNotifier, auth_config: AuthConfig) -> Self {
        Self {
            invoices: Arc::new(InvoiceService::new(deps.clone())),
            executor: Arc::new(PaymentExecutor::new(deps.clone())),
            deps,
            notifier,
            auth_config,
        }
    }

    pub fn db(&self) -> &LedgerDb {
        &self.deps.db
    }
}

#[cfg(test)]
pub mod test_support {
    use std::time::Duration;

    use jsonwebtoken::{encode, EncodingKey, Header};

    use super::*;
    use crate::auth::Claims;
    use crate::payments::test_support::{harness, Harness};
    use crate::payments::{HttpWebhookSender, WebhookSender};

    pub const TEST_JWT_SECRET: &str = "test-secret-for-hs256-tokens";

    /// State over a fresh ledger and fake node. Keep the harness alive for
    /// the duration of the test.
    pub fn test_state() -> (AppState, Harness) {
        let h = harness();
        let sender: Arc<dyn WebhookSender> =
            Arc::new(HttpWebhookSender::new(Duration::from_secs(1)).unwrap());
        let notifier = WebhookNotifier::new(h.deps.db.clone(), sender, 4);
        let state = AppState::new(
            h.deps.clone(),
            notifier,
            AuthConfig::new(TEST_JWT_SECRET, None),
        );
        (state, h)
    }

    /// Signed token for `user_id` valid for ten minutes.
    pub fn token(user_id: u64, scopes: &[&str]) -> String {
        let claims = Claims {
            sub: user_id.to_string(),
            exp: chrono::Utc::now().timestamp() + 600,
            iss: None,
            scopes: scopes.iter().map(|s| s.to_string()).collect(),
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(TEST_JWT_SECRET.as_bytes()),
        )
        .unwrap()
    }
}
