//! Bounded exponential-backoff execution of single upstream calls.
//!
//! Only transport failures are retried. Any HTTP answer other than 503/504
//! goes back to the caller untouched, 4xx included; callers judge status
//! codes themselves.

use std::time::Duration;

use crate::error::Error;
use crate::transport::{Transport, TransportError, UpstreamRequest, UpstreamResponse};

/// How many times to try and how long to wait in between.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub(crate) max_attempts: u32,
    pub(crate) base_delay: Duration,
    pub(crate) max_delay: Duration,
    pub(crate) is_retryable: fn(&TransportError) -> bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            is_retryable: TransportError::is_retryable,
        }
    }
}

impl RetryPolicy {
    /// Total attempts, first one included. Zero is treated as one.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    #[must_use]
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Override the retryable-error predicate.
    #[must_use]
    pub fn with_classifier(mut self, is_retryable: fn(&TransportError) -> bool) -> Self {
        self.is_retryable = is_retryable;
        self
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Wait before `attempt` (1-based): zero for the first, then
    /// `min(base * 2^(attempt-2), max)`.
    #[must_use]
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let factor = 2u32.saturating_pow(attempt - 2);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Runs requests through a [`Transport`] under a [`RetryPolicy`].
pub struct RetryingExecutor<T> {
    transport: T,
    policy: RetryPolicy,
}

impl<T: Transport> RetryingExecutor<T> {
    #[must_use]
    pub fn new(transport: T, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    #[must_use]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Send `request`, retrying transport failures with backoff.
    ///
    /// Each attempt sends a fresh clone of `request`. Backoff sleeps are
    /// ordinary `tokio` sleeps, so dropping the returned future cancels the
    /// call between attempts.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] for a failure the policy does not retry,
    /// or [`Error::Exhausted`] with the attempt count and last cause once
    /// every attempt has failed.
    pub async fn execute(&self, request: UpstreamRequest) -> Result<UpstreamResponse, Error> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let outcome = self
                .transport
                .send(request.clone())
                .await
                .and_then(|response| match TransportError::from_status(response.status()) {
                    Some(err) => Err(err),
                    None => Ok(response),
                });

            let err = match outcome {
                Ok(response) => {
                    if attempt > 1 {
                        tracing::debug!(
                            attempt,
                            method = %request.method(),
                            path = request.url().path(),
                            "Upstream request succeeded after retry"
                        );
                    }
                    return Ok(response);
                }
                Err(err) => err,
            };

            if !(self.policy.is_retryable)(&err) {
                tracing::debug!(error = %err, "Upstream request failed, not retryable");
                return Err(Error::Transport(err));
            }

            if attempt >= max_attempts {
                tracing::warn!(
                    attempts = attempt,
                    error = %err,
                    method = %request.method(),
                    path = request.url().path(),
                    "Upstream request retries exhausted"
                );
                return Err(Error::Exhausted {
                    attempts: attempt,
                    source: err,
                });
            }

            attempt += 1;
            let delay = self.policy.delay_before(attempt);
            tracing::warn!(
                attempt,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %err,
                method = %request.method(),
                path = request.url().path(),
                "Upstream request failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use reqwest::{Method, StatusCode};
    use tokio::time::Instant;

    use super::*;
    use crate::test_support::StubTransport;
    use crate::transport::TransportErrorKind;

    fn request() -> UpstreamRequest {
        UpstreamRequest::new(Method::GET, "https://auth.example.com/userinfo".parse().unwrap())
    }

    fn reset() -> Result<UpstreamResponse, TransportError> {
        Err(TransportError::new(
            TransportErrorKind::ConnectionReset,
            "connection reset by peer",
        ))
    }

    fn ok() -> Result<UpstreamResponse, TransportError> {
        Ok(UpstreamResponse::new(StatusCode::OK, "{}"))
    }

    #[test]
    fn test_delay_schedule() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_before(1), Duration::ZERO);
        assert_eq!(policy.delay_before(2), Duration::from_millis(500));
        assert_eq!(policy.delay_before(3), Duration::from_millis(1000));
        assert_eq!(policy.delay_before(4), Duration::from_millis(2000));
        assert_eq!(policy.delay_before(7), Duration::from_secs(10));
        assert_eq!(policy.delay_before(40), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_on_third_attempt() {
        let executor = RetryingExecutor::new(
            StubTransport::scripted(vec![reset(), reset(), ok()]),
            RetryPolicy::default().with_max_attempts(3),
        );

        let start = Instant::now();
        let response = executor.execute(request()).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(executor.transport().call_count(), 3);
        let waited = start.elapsed();
        assert!(waited >= Duration::from_millis(1500), "{waited:?}");
        assert!(waited < Duration::from_millis(1600), "{waited:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_names_attempts() {
        let executor = RetryingExecutor::new(
            StubTransport::scripted(vec![reset(), reset(), reset()]),
            RetryPolicy::default().with_max_attempts(3),
        );

        let err = executor.execute(request()).await.unwrap_err();

        assert_eq!(executor.transport().call_count(), 3);
        match err {
            Error::Exhausted { attempts, source } => {
                assert_eq!(attempts, 3);
                assert_eq!(source.kind(), TransportErrorKind::ConnectionReset);
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_error_returned_without_backoff() {
        let executor = RetryingExecutor::new(
            StubTransport::scripted(vec![Ok(UpstreamResponse::new(StatusCode::BAD_REQUEST, ""))]),
            RetryPolicy::default(),
        );

        let start = Instant::now();
        let response = executor.execute(request()).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(executor.transport().call_count(), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_error_fails_immediately() {
        let executor = RetryingExecutor::new(
            StubTransport::scripted(vec![Err(TransportError::new(
                TransportErrorKind::InvalidRequest,
                "bad header",
            ))]),
            RetryPolicy::default(),
        );

        let start = Instant::now();
        let err = executor.execute(request()).await.unwrap_err();

        assert!(matches!(err, Error::Transport(_)));
        assert_eq!(executor.transport().call_count(), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_503_is_retried() {
        let executor = RetryingExecutor::new(
            StubTransport::scripted(vec![
                Ok(UpstreamResponse::new(StatusCode::SERVICE_UNAVAILABLE, "")),
                Ok(UpstreamResponse::new(StatusCode::GATEWAY_TIMEOUT, "")),
                ok(),
            ]),
            RetryPolicy::default(),
        );

        let response = executor.execute(request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(executor.transport().call_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_each_attempt_sends_identical_copy() {
        let executor = RetryingExecutor::new(
            StubTransport::scripted(vec![reset(), ok()]),
            RetryPolicy::default(),
        );
        let req = request().json(&["puuid"]).unwrap();

        executor.execute(req).await.unwrap();

        let calls = executor.transport().calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].body(), calls[1].body());
        assert_eq!(calls[1].body(), Some(&b"[\"puuid\"]"[..]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_classifier() {
        let executor = RetryingExecutor::new(
            StubTransport::scripted(vec![reset(), ok()]),
            RetryPolicy::default().with_classifier(|_| false),
        );

        assert!(matches!(
            executor.execute(request()).await,
            Err(Error::Transport(_))
        ));
        assert_eq!(executor.transport().call_count(), 1);
    }
}
