//! Retry loop wrapping a single network call with an adaptive [`Backoff`].
//!
//! Transport failures and non-2xx statuses are treated alike: log,
//! grow the delay, sleep, try again.  There is no attempt limit; the
//! backoff ceiling alone keeps a persistently failing endpoint from
//! being hammered.  A success feeds its latency back into the backoff.

use std::future::Future;
use std::time::{Duration, Instant};

use galsync_core::backoff::Backoff;

use crate::transport::{FetchResponse, TransportError};

/// A successful response plus how much retrying it took.
#[derive(Debug)]
pub struct Fetched {
    pub response: FetchResponse,
    pub attempts: u32,
    /// Sleep taken after each failed attempt, in order.
    pub retry_delays: Vec<Duration>,
}

/// Invoke `op` until it yields a 2xx response.
///
/// `what` names the resource in log events (e.g. `"gallery page 3"`).
pub async fn fetch_with_retry<F, Fut>(backoff: &mut Backoff, what: &str, mut op: F) -> Fetched
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<FetchResponse, TransportError>>,
{
    let mut attempt = 0u32;
    let mut retry_delays = Vec::new();

    loop {
        attempt += 1;
        let started = Instant::now();

        match op().await {
            Ok(response) if response.is_success() => {
                let elapsed = started.elapsed();
                backoff.observe(elapsed);
                if response.body.is_empty() {
                    tracing::warn!(
                        what,
                        status = response.status.as_u16(),
                        "Successful response with an empty body",
                    );
                }
                tracing::debug!(
                    what,
                    attempt,
                    elapsed_ms = elapsed.as_millis() as u64,
                    backoff_secs = backoff.current(),
                    "Fetched",
                );
                return Fetched {
                    response,
                    attempts: attempt,
                    retry_delays,
                };
            }
            Ok(response) => {
                backoff.increment();
                tracing::warn!(
                    what,
                    attempt,
                    status = response.status.as_u16(),
                    retry_in_secs = backoff.current(),
                    "Request returned HTTP {}, retrying",
                    response.status,
                );
            }
            Err(e) => {
                backoff.increment();
                tracing::warn!(
                    what,
                    attempt,
                    error = %e,
                    retry_in_secs = backoff.current(),
                    "Request failed, retrying",
                );
            }
        }

        let delay = backoff.delay();
        retry_delays.push(delay);
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use galsync_core::backoff::BackoffConfig;
    use reqwest::StatusCode;
    use std::collections::VecDeque;

    fn fast_backoff() -> Backoff {
        Backoff::new(BackoffConfig {
            initial_secs: 0.01,
            min_secs: 0.001,
            max_secs: 0.05,
        })
    }

    #[tokio::test]
    async fn first_success_returns_immediately() {
        let mut backoff = fast_backoff();
        let mut calls = 0;

        let fetched = fetch_with_retry(&mut backoff, "thing", || {
            calls += 1;
            async { Ok(FetchResponse::new(StatusCode::OK, "body")) }
        })
        .await;

        assert_eq!(calls, 1);
        assert_eq!(fetched.attempts, 1);
        assert!(fetched.retry_delays.is_empty());
        assert_eq!(fetched.response.body, b"body");
        // A fast success relaxes the delay.
        assert!(backoff.current() < 0.01);
    }

    #[tokio::test]
    async fn transport_error_then_500_then_success() {
        let mut backoff = fast_backoff();
        let mut script: VecDeque<Result<FetchResponse, TransportError>> = VecDeque::from([
            Err(TransportError::Connection("reset by peer".into())),
            Ok(FetchResponse::new(StatusCode::INTERNAL_SERVER_ERROR, "oops")),
            Ok(FetchResponse::new(StatusCode::OK, "payload")),
        ]);
        let mut calls = 0;

        let fetched = fetch_with_retry(&mut backoff, "image", || {
            calls += 1;
            let next = script.pop_front().expect("no more scripted responses");
            async move { next }
        })
        .await;

        assert_eq!(calls, 3);
        assert_eq!(fetched.attempts, 3);
        assert_eq!(fetched.response.body, b"payload");
        assert_eq!(fetched.retry_delays.len(), 2);
        assert!(fetched.retry_delays[0] > Duration::from_secs_f64(0.01));
        assert!(fetched.retry_delays[1] > fetched.retry_delays[0]);
        assert!(script.is_empty());
    }

    #[tokio::test]
    async fn retries_are_unbounded_and_capped_at_max() {
        let mut backoff = fast_backoff();
        let mut remaining_failures = 12;

        let fetched = fetch_with_retry(&mut backoff, "page", || {
            let fail = remaining_failures > 0;
            remaining_failures -= 1;
            async move {
                if fail {
                    Ok(FetchResponse::new(StatusCode::TOO_MANY_REQUESTS, ""))
                } else {
                    Ok(FetchResponse::new(StatusCode::OK, "ok"))
                }
            }
        })
        .await;

        assert_eq!(fetched.attempts, 13);
        assert_eq!(
            *fetched.retry_delays.last().unwrap(),
            Duration::from_secs_f64(0.05)
        );
    }

    #[tokio::test]
    async fn empty_success_body_is_still_returned() {
        let mut backoff = fast_backoff();
        let fetched = fetch_with_retry(&mut backoff, "empty", || async {
            Ok(FetchResponse::new(StatusCode::OK, Vec::new()))
        })
        .await;

        assert_eq!(fetched.attempts, 1);
        assert!(fetched.response.body.is_empty());
    }
}
