// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Tracing subscriber setup.

use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LogFormat;

const DEFAULT_FILTER: &str = "info,tower_http=debug";

/// Install the global subscriber. `RUST_LOG` overrides the default filter.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_tracing(format: LogFormat) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    match format {
        LogFormat::Json => {
            let _ = fmt::Subscriber::builder()
                .with_env_filter(env_filter)
                .json()
                .with_current_span(false)
                .try_init();
        }
        LogFormat::Pretty => {
            let _ = fmt::Subscriber::builder()
                .with_env_filter(env_filter)
                .with_target(true)
                .try_init();
        }
    }
}
