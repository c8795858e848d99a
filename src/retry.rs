// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Bounded Retry and Await Helpers
//!
//! Every bounded wait on something outside the process (the Lightning node,
//! a webhook receiver) goes through this module.
//!
//! | Helper | Repeats | Sleep between attempts |
//! |--------|---------|------------------------|
//! | [`retry`] | until `Ok` | doubles after each failure |
//! | [`retry_no_backoff`] | until `Ok` | constant |
//! | [`await_condition`] | until `true` | doubles after each miss |
//! | [`await_condition_no_backoff`] | until `true` | constant |
//! | [`wait_timeout`] | - | bounded wait on a [`TaskTracker`] |
//!
//! All helpers make at least one attempt and never sleep after the final one.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::task::TaskTracker;

/// Returned when a [`retry`] helper runs out of attempts.
#[derive(Debug, thiserror::Error)]
#[error("gave up after {attempts} attempt(s) in {elapsed:?}: {last_error}")]
pub struct RetryError<E> {
    /// Number of attempts actually made.
    pub attempts: u32,
    /// Wall-clock time spent, sleeps included.
    pub elapsed: Duration,
    /// Error returned by the final attempt.
    pub last_error: E,
}

/// Returned when an [`await_condition`] helper runs out of attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("condition not met after {attempts} attempt(s) in {elapsed:?}")]
pub struct AwaitTimeout {
    pub attempts: u32,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Copy)]
enum Backoff {
    Exponential,
    Constant,
}

impl Backoff {
    fn next(self, current: Duration) -> Duration {
        match self {
            Backoff::Exponential => current.saturating_mul(2),
            Backoff::Constant => current,
        }
    }
}

/// Call `f` until it succeeds, doubling the sleep after every failed attempt.
pub async fn retry<T, E, F, Fut>(
    attempts: u32,
    initial_sleep: Duration,
    f: F,
) -> Result<T, RetryError<E>>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    retry_with(Backoff::Exponential, attempts, initial_sleep, f).await
}

/// Like [`retry`] but sleeps `sleep` between every attempt.
pub async fn retry_no_backoff<T, E, F, Fut>(
    attempts: u32,
    sleep: Duration,
    f: F,
) -> Result<T, RetryError<E>>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    retry_with(Backoff::Constant, attempts, sleep, f).await
}

/// Poll `condition` until it returns `true`, doubling the sleep after every miss.
pub async fn await_condition<F, Fut>(
    attempts: u32,
    initial_sleep: Duration,
    condition: F,
) -> Result<(), AwaitTimeout>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    await_with(Backoff::Exponential, attempts, initial_sleep, condition).await
}

/// Like [`await_condition`] but sleeps `sleep` between every poll.
pub async fn await_condition_no_backoff<F, Fut>(
    attempts: u32,
    sleep: Duration,
    condition: F,
) -> Result<(), AwaitTimeout>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    await_with(Backoff::Constant, attempts, sleep, condition).await
}

/// Wait for every task spawned on `tracker` to finish, for at most `timeout`.
///
/// The tracker is closed first, so tasks spawned afterwards are still run but
/// no longer hold the barrier open. Returns `true` if the wait timed out.
pub async fn wait_timeout(tracker: &TaskTracker, timeout: Duration) -> bool {
    tracker.close();
    tokio::time::timeout(timeout, tracker.wait()).await.is_err()
}

async fn retry_with<T, E, F, Fut>(
    backoff: Backoff,
    attempts: u32,
    initial_sleep: Duration,
    mut f: F,
) -> Result<T, RetryError<E>>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let started = Instant::now();
    let attempts = attempts.max(1);
    let mut sleep = initial_sleep;
    let mut attempt = 0;

    loop {
        attempt += 1;
        match f().await {
            Ok(value) => return Ok(value),
            Err(error) if attempt >= attempts => {
                return Err(RetryError {
                    attempts: attempt,
                    elapsed: started.elapsed(),
                    last_error: error,
                });
            }
            Err(error) => {
                tracing::debug!(
                    attempt,
                    remaining = attempts - attempt,
                    sleep_ms = sleep.as_millis() as u64,
                    error = %error,
                    "Attempt failed, retrying"
                );
                tokio::time::sleep(sleep).await;
                sleep = backoff.next(sleep);
            }
        }
    }
}

async fn await_with<F, Fut>(
    backoff: Backoff,
    attempts: u32,
    initial_sleep: Duration,
    mut condition: F,
) -> Result<(), AwaitTimeout>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let started = Instant::now();
    let attempts = attempts.max(1);
    let mut sleep = initial_sleep;
    let mut attempt = 0;

    loop {
        attempt += 1;
        if condition().await {
            return Ok(());
        }
        if attempt >= attempts {
            return Err(AwaitTimeout {
                attempts: attempt,
                elapsed: started.elapsed(),
            });
        }
        tokio::time::sleep(sleep).await;
        sleep = backoff.next(sleep);
    }
}
