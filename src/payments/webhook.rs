// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Webhook Notifier
//!
//! Best-effort delivery of settlement notifications to integrators.
//!
//! ## Wire Format
//!
//! `POST <callback_url>` with a JSON body:
//!
//! ```json
//! { "payment": { ...ledger entry... }, "hash": "<base64>" }
//! ```
//!
//! `hash` is HMAC-SHA256 over the decimal payment id, keyed by SHA-256 of the
//! user's API key. Receivers holding the raw key can recompute it.
//!
//! Deliveries run on a [`TaskTracker`], at most `max_in_flight` at a time,
//! and are retried with exponential backoff. Failures are logged and counted;
//! they never touch the ledger.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64ct::{Base64, Encoding};
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::{Serialize, Serializer};
use sha2::Sha256;
use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;
use utoipa::ToSchema;

use crate::retry::{retry, wait_timeout};
use crate::storage::{LedgerDb, Payment};

pub const WEBHOOK_ATTEMPTS: u32 = 5;
pub const WEBHOOK_INITIAL_BACKOFF: Duration = Duration::from_secs(1);

// =============================================================================
// Body & Signature
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct WebhookBody {
    pub payment: Payment,
    #[serde(serialize_with = "base64_bytes")]
    pub hash: Vec<u8>,
}

fn base64_bytes<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&Base64::encode_string(bytes))
}

/// HMAC-SHA256 of the decimal payment id, keyed by the API key hash.
pub fn sign_payment_id(api_key_hash: &[u8; 32], payment_id: u64) -> Vec<u8> {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(api_key_hash).expect("HMAC accepts any key length");
    mac.update(payment_id.to_string().as_bytes());
    mac.finalize().into_bytes().to_vec()
}

// =============================================================================
// Sender
// =============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum WebhookError {
    #[error("webhook transport error: {0}")]
    Transport(String),

    #[error("webhook request timed out")]
    Timeout,

    #[error("webhook receiver returned {0}")]
    Status(u16),
}

/// Transport for a single delivery attempt.
#[async_trait]
pub trait WebhookSender: Send + Sync {
    async fn deliver(&self, url: &str, body: &WebhookBody) -> Result<(), WebhookError>;
}

/// Delivers webhooks over HTTP(S) with a per-request timeout.
#[derive(Debug, Clone)]
pub struct HttpWebhookSender {
    http: Client,
}

impl HttpWebhookSender {
    pub fn new(timeout: Duration) -> Result<Self, WebhookError> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("relational-lightning/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| WebhookError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http })
    }
}

#[async_trait]
impl WebhookSender for HttpWebhookSender {
    async fn deliver(&self, url: &str, body: &WebhookBody) -> Result<(), WebhookError> {
        let response = self.http.post(url).json(body).send().await.map_err(|e| {
            if e.is_timeout() {
                WebhookError::Timeout
            } else {
                WebhookError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(WebhookError::Status(status.as_u16()))
        }
    }
}

// =============================================================================
// Notifier
// =============================================================================

#[derive(Debug, Default)]
struct Counters {
    in_flight: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
}

/// Snapshot of delivery counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, ToSchema)]
pub struct WebhookStats {
    pub in_flight: u64,
    pub delivered: u64,
    pub failed: u64,
    pub skipped: u64,
}

/// Supervised, bounded webhook dispatcher. Cheap to clone.
#[derive(Clone)]
pub struct WebhookNotifier {
    db: Arc<LedgerDb>,
    sender: Arc<dyn WebhookSender>,
    tracker: TaskTracker,
    permits: Arc<Semaphore>,
    counters: Arc<Counters>,
    attempts: u32,
    initial_backoff: Duration,
}

impl WebhookNotifier {
    pub fn new(db: Arc<LedgerDb>, sender: Arc<dyn WebhookSender>, max_in_flight: usize) -> Self {
        Self {
            db,
            sender,
            tracker: TaskTracker::new(),
            permits: Arc::new(Semaphore::new(max_in_flight.max(1))),
            counters: Arc::new(Counters::default()),
            attempts: WEBHOOK_ATTEMPTS,
            initial_backoff: WEBHOOK_INITIAL_BACKOFF,
        }
    }

    /// Queue a notification for a freshly settled entry. Returns immediately.
    pub fn notify(&self, payment: Payment) {
        let Some(url) = payment.callback_url.clone() else {
            return;
        };

        let notifier = self.clone();
        self.counters.in_flight.fetch_add(1, Ordering::SeqCst);
        self.tracker.spawn(async move {
            notifier.deliver(url, payment).await;
            notifier.counters.in_flight.fetch_sub(1, Ordering::SeqCst);
        });
    }

    async fn deliver(&self, url: String, payment: Payment) {
        let payment_id = payment.id;
        let key_hash = match self.db.api_key_hash(payment.user_id) {
            Ok(Some(hash)) => hash,
            Ok(None) => {
                tracing::info!(
                    payment_id,
                    user_id = payment.user_id,
                    "No API key on record, skipping webhook"
                );
                self.counters.skipped.fetch_add(1, Ordering::SeqCst);
                return;
            }
            Err(e) => {
                tracing::warn!(payment_id, error = %e, "Failed to load API key hash for webhook");
                self.counters.failed.fetch_add(1, Ordering::SeqCst);
                return;
            }
        };

        let body = WebhookBody {
            hash: sign_payment_id(&key_hash, payment_id),
            payment,
        };

        let Ok(_permit) = self.permits.acquire().await else {
            return;
        };

        let sender = &self.sender;
        let url = url.as_str();
        let body = &body;
        match retry(self.attempts, self.initial_backoff, move || sender.deliver(url, body)).await {
            Ok(()) => {
                self.counters.delivered.fetch_add(1, Ordering::SeqCst);
                tracing::info!(payment_id, "Webhook delivered");
            }
            Err(e) => {
                self.counters.failed.fetch_add(1, Ordering::SeqCst);
                tracing::warn!(
                    payment_id,
                    attempts = e.attempts,
                    elapsed_ms = e.elapsed.as_millis() as u64,
                    error = %e.last_error,
                    "Webhook delivery abandoned"
                );
            }
        }
    }

    pub fn stats(&self) -> WebhookStats {
        WebhookStats {
            in_flight: self.counters.in_flight.load(Ordering::SeqCst),
            delivered: self.counters.delivered.load(Ordering::SeqCst),
            failed: self.counters.failed.load(Ordering::SeqCst),
            skipped: self.counters.skipped.load(Ordering::SeqCst),
        }
    }

    /// Close the tracker and wait for pending deliveries.
    ///
    /// Returns `true` if deliveries were still running when `timeout` elapsed.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        let timed_out = wait_timeout(&self.tracker, timeout).await;
        if timed_out {
            tracing::warn!(stats = ?self.stats(), "Webhook deliveries still pending at shutdown");
        } else {
            tracing::info!(stats = ?self.stats(), "Webhook notifier drained");
        }
        timed_out
    }
}
