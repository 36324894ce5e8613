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

//! Configuration for the retry transport and the requests sent through it.
//!
//! [RetryTransportConfig] holds the settings shared by all requests: the
//! default deadline, the backoff policy, and any extra retry predicates.
//! [RequestOptions] overrides them for a single request.
//!
//! The default deadline can be changed without recompiling, via the
//! `TPG_RETRY_TRANSPORT_TIMEOUT_SEC` environment variable.

use crate::backoff::{Backoff, ExponentialBackoff};
use crate::retry_predicates::SharedRetryPredicate;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// The environment variable overriding the default retry deadline, in seconds.
pub const RETRY_TIMEOUT_VAR: &str = "TPG_RETRY_TRANSPORT_TIMEOUT_SEC";

/// The retry deadline used when neither the request nor the environment
/// provide one.
pub const DEFAULT_RETRY_TIMEOUT: Duration = Duration::from_secs(30);

/// Settings shared by all requests sent through a
/// [RetryTransport][crate::transport::RetryTransport].
#[derive(Clone, Default)]
pub struct RetryTransportConfig {
    default_timeout: Option<Duration>,
    backoff: Option<Arc<dyn Backoff>>,
    retry_predicates: Vec<SharedRetryPredicate>,
}

impl RetryTransportConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the deadline for requests that do not set their own.
    ///
    /// # Example
    /// ```
    /// # use tpg_gax::options::RetryTransportConfig;
    /// use std::time::Duration;
    /// let config = RetryTransportConfig::new().set_default_timeout(Duration::from_secs(60));
    /// assert_eq!(config.default_timeout(), Duration::from_secs(60));
    /// ```
    pub fn set_default_timeout<V: Into<Duration>>(mut self, v: V) -> Self {
        self.default_timeout = Some(v.into());
        self
    }

    /// Sets the delays between retry attempts.
    pub fn set_backoff<V: Backoff + 'static>(mut self, v: V) -> Self {
        self.backoff = Some(Arc::new(v));
        self
    }

    /// Adds a predicate applied after the default retry predicates.
    pub fn add_retry_predicate(mut self, v: SharedRetryPredicate) -> Self {
        self.retry_predicates.push(v);
        self
    }

    /// The effective default deadline.
    ///
    /// Uses, in order: the value set in this configuration, the value of
    /// [RETRY_TIMEOUT_VAR] (if it is a valid number of seconds), and
    /// [DEFAULT_RETRY_TIMEOUT].
    pub fn default_timeout(&self) -> Duration {
        self.default_timeout.unwrap_or_else(timeout_from_env)
    }

    pub(crate) fn backoff(&self) -> Arc<dyn Backoff> {
        self.backoff
            .clone()
            .unwrap_or_else(|| Arc::new(ExponentialBackoff::default()))
    }

    pub(crate) fn retry_predicates(&self) -> &[SharedRetryPredicate] {
        &self.retry_predicates
    }
}

impl std::fmt::Debug for RetryTransportConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryTransportConfig")
            .field("default_timeout", &self.default_timeout)
            .field("backoff", &self.backoff)
            .field("retry_predicates", &self.retry_predicates.len())
            .finish()
    }
}

fn timeout_from_env() -> Duration {
    std::env::var(RETRY_TIMEOUT_VAR)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_RETRY_TIMEOUT)
}

/// Per-request settings for the retry transport.
#[derive(Clone, Default)]
pub struct RequestOptions {
    timeout: Option<Duration>,
    cancellation: Option<CancellationToken>,
    retry_predicates: Vec<SharedRetryPredicate>,
    abort_predicates: Vec<SharedRetryPredicate>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the overall deadline for the request, including all retries.
    pub fn set_timeout<V: Into<Duration>>(mut self, v: V) -> Self {
        self.timeout = Some(v.into());
        self
    }

    /// Sets a token to cancel the request and any pending retries.
    pub fn set_cancellation_token(mut self, v: CancellationToken) -> Self {
        self.cancellation = Some(v);
        self
    }

    /// Adds a predicate that marks additional errors as retryable.
    pub fn add_retry_predicate(mut self, v: SharedRetryPredicate) -> Self {
        self.retry_predicates.push(v);
        self
    }

    /// Adds a predicate that stops the retry loop, even for errors that would
    /// otherwise be retried.
    pub fn add_abort_predicate(mut self, v: SharedRetryPredicate) -> Self {
        self.abort_predicates.push(v);
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub(crate) fn cancellation(&self) -> CancellationToken {
        self.cancellation.clone().unwrap_or_default()
    }

    pub(crate) fn retry_predicates(&self) -> &[SharedRetryPredicate] {
        &self.retry_predicates
    }

    pub(crate) fn abort_predicates(&self) -> &[SharedRetryPredicate] {
        &self.abort_predicates
    }
}

impl std::fmt::Debug for RequestOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestOptions")
            .field("timeout", &self.timeout)
            .field("cancellation", &self.cancellation)
            .field("retry_predicates", &self.retry_predicates.len())
            .field("abort_predicates", &self.abort_predicates.len())
            .finish()
    }
}
