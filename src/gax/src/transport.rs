// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! An HTTP transport that retries transient failures.
//!
//! Every request sent through [RetryTransport] is retried while:
//! - the error is classified as transient by
//!   [is_retryable_error][crate::retry_predicates::is_retryable_error], and
//! - no abort predicate matches the error, and
//! - the request deadline has not passed, and
//! - the request has not been cancelled.
//!
//! When the deadline passes the transport returns the error from the last
//! attempt, which is more useful than a bare timeout. Requests without a
//! deadline get the default from [RetryTransportConfig].

use crate::Result;
use crate::error::Error;
use crate::options::{RequestOptions, RetryTransportConfig};
use crate::retry_predicates::{SharedRetryPredicate, is_retryable_error};
use bytes::Bytes;

/// Sends requests with retries, see the module documentation for details.
#[derive(Clone, Debug)]
pub struct RetryTransport {
    inner: reqwest::Client,
    config: RetryTransportConfig,
}

impl RetryTransport {
    /// Creates a transport on top of an existing client.
    ///
    /// The client is cheap to clone and shares its connection pool with all
    /// clones.
    pub fn new(inner: reqwest::Client, config: RetryTransportConfig) -> Self {
        Self { inner, config }
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.inner
    }

    pub fn config(&self) -> &RetryTransportConfig {
        &self.config
    }

    /// Sends `request`, retrying transient failures.
    ///
    /// The request body must be cloneable (i.e. not a stream), as it is
    /// resent on each attempt.
    pub async fn execute(
        &self,
        request: reqwest::Request,
        options: RequestOptions,
    ) -> Result<http::Response<Bytes>> {
        let timeout = options
            .timeout()
            .unwrap_or_else(|| self.config.default_timeout());
        let cancel = options.cancellation();
        let backoff = self.config.backoff();
        let predicates: Vec<SharedRetryPredicate> = self
            .config
            .retry_predicates()
            .iter()
            .chain(options.retry_predicates())
            .cloned()
            .collect();

        let loop_start = tokio::time::Instant::now();
        let deadline = loop_start + timeout;
        let mut attempt_count = 0_u32;
        let mut last_error: Option<Error> = None;
        loop {
            let Some(attempt) = request.try_clone() else {
                return Err(Error::binding(
                    "streaming request bodies cannot be resent on retries",
                ));
            };
            attempt_count += 1;
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            let result = tokio::select! {
                _ = cancel.cancelled() => return Err(cancelled(last_error)),
                r = tokio::time::timeout(remaining, self.attempt(attempt)) => r,
            };
            let error = match result {
                Ok(Ok(response)) => return Ok(response),
                Ok(Err(e)) => e,
                Err(_) => {
                    return Err(last_error.unwrap_or_else(|| {
                        Error::timeout(format!("the request exceeded its {timeout:?} deadline"))
                    }));
                }
            };
            if let Some(reason) = options
                .abort_predicates()
                .iter()
                .find_map(|p| p.is_retryable(&error))
            {
                tracing::debug!(%reason, "aborting retries: {error}");
                return Err(error);
            }
            if !is_retryable_error(&error, &predicates) {
                return Err(error);
            }
            let delay = backoff.delay(attempt_count);
            if tokio::time::Instant::now() + delay >= deadline {
                tracing::debug!(attempt_count, "deadline reached, returning the last error");
                return Err(error);
            }
            tracing::debug!(attempt_count, ?delay, "retrying request: {error}");
            last_error = Some(error);
            tokio::select! {
                _ = cancel.cancelled() => return Err(cancelled(last_error)),
                _ = tokio::time::sleep(delay) => {},
            }
        }
    }

    async fn attempt(&self, request: reqwest::Request) -> Result<http::Response<Bytes>> {
        let response = self
            .inner
            .execute(request)
            .await
            .map_err(map_send_error)?;
        if !response.status().is_success() {
            return to_http_error(response).await;
        }
        to_http_response(response).await
    }
}

fn cancelled(last_error: Option<Error>) -> Error {
    match last_error {
        Some(e) => Error::cancelled(e),
        None => Error::cancelled("cancelled before the first attempt completed"),
    }
}

fn map_send_error(err: reqwest::Error) -> Error {
    match err {
        e if e.is_timeout() => Error::timeout(e),
        e => Error::io(e),
    }
}

async fn to_http_error<O>(response: reqwest::Response) -> Result<O> {
    let status_code = response.status().as_u16();
    let response = http::Response::from(response);
    let (parts, body) = response.into_parts();

    let body = http_body_util::BodyExt::collect(body)
        .await
        .map_err(Error::io)?
        .to_bytes();
    Err(Error::from_http_response(status_code, parts.headers, body))
}

async fn to_http_response(response: reqwest::Response) -> Result<http::Response<Bytes>> {
    let response = http::Response::from(response);
    let (parts, body) = response.into_parts();
    let body = http_body_util::BodyExt::collect(body)
        .await
        .map_err(Error::io)?
        .to_bytes();
    Ok(http::Response::from_parts(parts, body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn http_error_with_status() -> anyhow::Result<()> {
        let http_resp = http::Response::builder()
            .header("Content-Type", "application/json")
            .status(409)
            .body(r#"{"error": {"code": 409, "message": "operationInProgress"}}"#)?;
        let response: reqwest::Response = http_resp.into();
        let got = to_http_error::<()>(response).await;
        let err = got.expect_err("409 is an error");
        assert_eq!(err.http_status_code(), Some(409));
        assert!(err.status().is_some(), "{err:?}");
        assert!(err.http_headers().is_some(), "{err:?}");
        Ok(())
    }

    #[tokio::test]
    async fn http_error_bytes() -> anyhow::Result<()> {
        let http_resp = http::Response::builder()
            .status(502)
            .body("<html>Bad Gateway</html>")?;
        let response: reqwest::Response = http_resp.into();
        let err = to_http_error::<()>(response)
            .await
            .expect_err("502 is an error");
        assert_eq!(err.http_status_code(), Some(502));
        assert!(err.status().is_none(), "{err:?}");
        assert!(err.to_string().contains("Bad Gateway"), "{err}");
        Ok(())
    }

    #[tokio::test]
    async fn http_response() -> anyhow::Result<()> {
        let http_resp = http::Response::builder()
            .header("x-test", "value")
            .status(200)
            .body(r#"{"name": "op-1"}"#)?;
        let response: reqwest::Response = http_resp.into();
        let got = to_http_response(response).await?;
        assert_eq!(got.status(), 200);
        assert_eq!(got.headers().get("x-test").map(|v| v.as_bytes()), Some(&b"value"[..]));
        assert_eq!(got.body().as_ref(), br#"{"name": "op-1"}"#);
        Ok(())
    }

    #[test]
    fn cancelled_errors() {
        let err = cancelled(None);
        assert!(err.is_cancelled(), "{err:?}");
        let err = cancelled(Some(Error::io("reset")));
        assert!(err.is_cancelled(), "{err:?}");
        assert!(err.to_string().contains("reset"), "{err}");
    }
}
