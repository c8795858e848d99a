// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Configuration is loaded from the environment once at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `DATA_DIR` | Directory holding `ledger.redb` | `/data` |
//! | `LND_REST_URL` | LND REST gateway base URL | Required |
//! | `LND_MACAROON_HEX` | Hex-encoded macaroon sent with every node call | Required |
//! | `LND_TLS_CERT_PATH` | PEM certificate trusted for the node | Optional |
//! | `JWT_SECRET` | HS256 secret for bearer tokens | Required |
//! | `JWT_ISSUER` | Expected `iss` claim | Optional |
//! | `NODE_TIMEOUT_SECS` | Bound on every unary node call | `10` |
//! | `PAYMENT_TIMEOUT_SECS` | Bound on a synchronous send | `60` |
//! | `INVOICE_EXPIRY_SECS` | Lifetime of issued invoices | `86400` |
//! | `WEBHOOK_TIMEOUT_SECS` | Bound on one webhook POST | `10` |
//! | `WEBHOOK_MAX_IN_FLIGHT` | Concurrent webhook deliveries | `32` |
//! | `RECONCILE_INTERVAL_SECS` | Pause between reconciliation sweeps | `60` |
//! | `RECONCILE_STALE_AFTER_SECS` | Age before an OPEN payment is checked; must exceed `PAYMENT_TIMEOUT_SECS` plus one `NODE_TIMEOUT_SECS` per status retry | `300` |
//! | `SHUTDOWN_TIMEOUT_SECS` | Wait for in-flight webhooks on shutdown | `30` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::lightning::lnd::LndConfig;
use crate::payments::LedgerSettings;

pub const DATA_DIR_ENV: &str = "DATA_DIR";

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: &str = "8080";
const DEFAULT_DATA_DIR: &str = "/data";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub data_dir: PathBuf,
    pub lnd: LndConfig,
    pub jwt_secret: String,
    pub jwt_issuer: Option<String>,
    pub ledger: LedgerSettings,
    pub webhook_timeout: Duration,
    pub webhook_max_in_flight: usize,
    pub reconcile_interval: Duration,
    pub shutdown_timeout: Duration,
    pub log_format: LogFormat,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        let host = env.or_default("HOST", DEFAULT_HOST);
        let port = env.or_default("PORT", DEFAULT_PORT);
        let bind_addr = format!("{host}:{port}")
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::Invalid {
                name: "HOST/PORT",
                reason: format!("{host}:{port}: {e}"),
            })?;

        let node_timeout = env.secs("NODE_TIMEOUT_SECS", 10)?;
        let payment_timeout = env.secs("PAYMENT_TIMEOUT_SECS", 60)?;

        let lnd = LndConfig {
            rest_url: env.required("LND_REST_URL")?,
            macaroon_hex: env.required("LND_MACAROON_HEX")?,
            tls_cert_path: env.optional("LND_TLS_CERT_PATH").map(PathBuf::from),
            request_timeout: node_timeout,
            payment_timeout,
        };

        let ledger = LedgerSettings {
            node_timeout,
            payment_timeout,
            invoice_expiry_secs: env.parsed("INVOICE_EXPIRY_SECS", 86_400)?,
            reconcile_stale_after: env.secs("RECONCILE_STALE_AFTER_SECS", 300)?,
            ..LedgerSettings::default()
        };
        if ledger.reconcile_stale_after <= ledger.send_resolution_bound() {
            return Err(ConfigError::Invalid {
                name: "RECONCILE_STALE_AFTER_SECS",
                reason: format!(
                    "must exceed {}s so a running send resolves before reconciliation",
                    ledger.send_resolution_bound().as_secs()
                ),
            });
        }

        let log_format = match env.or_default("LOG_FORMAT", "pretty").to_ascii_lowercase().as_str() {
            "json" => LogFormat::Json,
            "pretty" => LogFormat::Pretty,
            other => {
                return Err(ConfigError::Invalid {
                    name: "LOG_FORMAT",
                    reason: format!("expected json or pretty, got {other}"),
                })
            }
        };

        let webhook_max_in_flight: usize = env.parsed("WEBHOOK_MAX_IN_FLIGHT", 32)?;
        if webhook_max_in_flight == 0 {
            return Err(ConfigError::Invalid {
                name: "WEBHOOK_MAX_IN_FLIGHT",
                reason: "must be at least 1".into(),
            });
        }

        Ok(Self {
            bind_addr,
            data_dir: PathBuf::from(env.or_default(DATA_DIR_ENV, DEFAULT_DATA_DIR)),
            lnd,
            jwt_secret: env.required("JWT_SECRET")?,
            jwt_issuer: env.optional("JWT_ISSUER"),
            ledger,
            webhook_timeout: env.secs("WEBHOOK_TIMEOUT_SECS", 10)?,
            webhook_max_in_flight,
            reconcile_interval: env.secs("RECONCILE_INTERVAL_SECS", 60)?,
            shutdown_timeout: env.secs("SHUTDOWN_TIMEOUT_SECS", 30)?,
            log_format,
        })
    }
}

struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, name: &str) -> Option<String> {
        (self.0)(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, name: &'static str) -> Result<String, ConfigError> {
        self.optional(name).ok_or(ConfigError::Missing(name))
    }

    fn or_default(&self, name: &str, default: &str) -> String {
        self.optional(name).unwrap_or_else(|| default.to_string())
    }

    fn parsed<T>(&self, name: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        match self.optional(name) {
            Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
                name,
                reason: format!("{raw}: {e}"),
            }),
            None => Ok(default),
        }
    }

    fn secs(&self, name: &'static str, default: u64) -> Result<Duration, ConfigError> {
        self.parsed(name, default).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    const REQUIRED: &[(&str, &str)] = &[
        ("LND_REST_URL", "https://127.0.0.1:8080"),
        ("LND_MACAROON_HEX", "0201036c6e64"),
        ("JWT_SECRET", "secret"),
    ];

    #[test]
    fn defaults_apply() {
        let config = Config::from_lookup(lookup(REQUIRED)).unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:8080".parse().unwrap());
        assert_eq!(config.data_dir, PathBuf::from("/data"));
        assert_eq!(config.ledger.node_timeout, Duration::from_secs(10));
        assert_eq!(config.lnd.payment_timeout, Duration::from_secs(60));
        assert_eq!(config.ledger.invoice_expiry_secs, 86_400);
        assert_eq!(config.webhook_max_in_flight, 32);
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert!(config.lnd.tls_cert_path.is_none());
        assert!(config.jwt_issuer.is_none());
    }

    #[test]
    fn missing_required_is_reported_by_name() {
        let err = Config::from_lookup(lookup(&REQUIRED[..2])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("JWT_SECRET")));
    }

    #[test]
    fn blank_values_count_as_unset() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("PORT", "  "));
        pairs.push(("JWT_ISSUER", ""));
        let config = Config::from_lookup(lookup(&pairs)).unwrap();
        assert_eq!(config.bind_addr.port(), 8080);
        assert!(config.jwt_issuer.is_none());
    }

    #[test]
    fn stale_threshold_must_outlast_a_send() {
        // 60s send plus 3 lookups of 10s each
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("RECONCILE_STALE_AFTER_SECS", "90"));
        let err = Config::from_lookup(lookup(&pairs)).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "RECONCILE_STALE_AFTER_SECS", .. }));

        pairs.push(("PAYMENT_TIMEOUT_SECS", "30"));
        let config = Config::from_lookup(lookup(&pairs)).unwrap();
        assert_eq!(config.ledger.reconcile_stale_after, Duration::from_secs(90));
    }

    #[test]
    fn overrides_and_bad_values() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("PORT", "9000"));
        pairs.push(("NODE_TIMEOUT_SECS", "3"));
        pairs.push(("LOG_FORMAT", "JSON"));
        let config = Config::from_lookup(lookup(&pairs)).unwrap();
        assert_eq!(config.bind_addr.port(), 9000);
        assert_eq!(config.lnd.request_timeout, Duration::from_secs(3));
        assert_eq!(config.log_format, LogFormat::Json);

        pairs.push(("PAYMENT_TIMEOUT_SECS", "soon"));
        let err = Config::from_lookup(lookup(&pairs)).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "PAYMENT_TIMEOUT_SECS", .. }));
    }
}
