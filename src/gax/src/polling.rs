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

//! Bounded retry loops and polling on read results.
//!
//! Many resources become visible (or invisible) some time after the call that
//! creates (or deletes) them succeeds. The helpers in this module repeatedly
//! read a resource and classify each read with a [PollResult], until the
//! expected state has been observed enough times in a row.
//!
//! # Example
//! ```
//! # use tpg_gax::polling::*;
//! # use tpg_gax::client::JsonObject;
//! use std::time::Duration;
//! # tokio_test::block_on(async {
//! let mut reads = 0;
//! polling_wait_time(
//!     async || {
//!         reads += 1;
//!         Ok(JsonObject::new())
//!     },
//!     poll_check_for_existence,
//!     "Creating bucket",
//!     Duration::from_secs(60),
//!     2,
//! )
//! .await?;
//! assert_eq!(reads, 2);
//! # tpg_gax::Result::<()>::Ok(()) });
//! ```

use crate::Result;
use crate::client::JsonObject;
use crate::error::Error;
use crate::retry_predicates::{SharedRetryPredicate, is_retryable_error};
use crate::state_change::StateChangeConf;
use std::time::Duration;

const MIN_TIMEOUT: Duration = Duration::from_millis(500);
const STATE_RETRYABLE: &str = "retryableerror";
const STATE_SUCCESS: &str = "success";

/// The classification of a single poll attempt.
#[derive(Debug)]
pub enum PollResult {
    /// The expected state was observed.
    Success,
    /// The expected state was not observed yet, the reason is for logging.
    Pending(String),
    /// The poll failed, stop polling.
    Fatal(Error),
}

impl PollResult {
    pub fn pending<T: Into<String>>(reason: T) -> Self {
        Self::Pending(reason.into())
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// The error returned by [PendingStatus] results while polling.
///
/// When a poll times out the error from the last attempt is returned, for
/// pending results this error describes why the state was not yet reached.
#[derive(Debug, thiserror::Error)]
#[error("got pending status {0:?}")]
pub struct PendingStatus(pub String);

/// A polling loop did not observe the expected state before the timeout.
#[derive(Debug, thiserror::Error)]
#[error("{activity}: timed out after {elapsed:?}: {source}")]
pub struct PollingTimeout {
    pub activity: String,
    pub elapsed: Duration,
    #[source]
    pub source: Error,
}

/// An error returned by an attempt in [retry_with_target_occurrences].
#[derive(Debug)]
pub struct RetryError {
    pub error: Error,
    pub retryable: bool,
}

impl RetryError {
    /// The loop continues after this error, if there is time left.
    pub fn retryable(error: Error) -> Self {
        Self {
            error,
            retryable: true,
        }
    }

    /// The loop stops and returns this error.
    pub fn permanent(error: Error) -> Self {
        Self {
            error,
            retryable: false,
        }
    }
}

impl From<PollResult> for std::result::Result<(), RetryError> {
    fn from(value: PollResult) -> Self {
        match value {
            PollResult::Success => Ok(()),
            PollResult::Pending(reason) => Err(RetryError::retryable(Error::other(
                PendingStatus(reason),
            ))),
            PollResult::Fatal(e) => Err(RetryError::permanent(e)),
        }
    }
}

/// Calls `f` until it succeeds `target_occurrences` times in a row.
///
/// Any retryable error resets the count of consecutive successes. A permanent
/// error stops the loop and is returned unchanged. If the timeout expires,
/// the last retryable error is returned, or a timeout error if the last
/// attempt succeeded.
///
/// The wait between attempts starts at 500ms and doubles, up to 10 seconds,
/// while no success has been observed. After a success the next attempt
/// happens after the same wait.
pub async fn retry_with_target_occurrences<F>(
    timeout: Duration,
    target_occurrences: u32,
    mut f: F,
) -> Result<()>
where
    F: AsyncFnMut() -> std::result::Result<(), RetryError>,
{
    let mut last_error: Option<Error> = None;
    let conf = StateChangeConf::new([STATE_RETRYABLE], [STATE_SUCCESS], timeout)
        .with_min_timeout(MIN_TIMEOUT)
        .with_continuous_target_occurrence(target_occurrences);
    let wait = conf
        .wait_for_state(async || match f().await {
            Ok(()) => {
                last_error = None;
                Ok(Some(((), STATE_SUCCESS.to_string())))
            }
            Err(RetryError {
                error,
                retryable: true,
            }) => {
                tracing::debug!("retrying after error: {error}");
                last_error = Some(error);
                Ok(Some(((), STATE_RETRYABLE.to_string())))
            }
            Err(RetryError {
                error,
                retryable: false,
            }) => {
                last_error = None;
                Err(error)
            }
        })
        .await;
    match (wait, last_error) {
        (Ok(_), _) => Ok(()),
        (Err(_), Some(e)) => Err(e),
        (Err(e), None) => Err(e),
    }
}

/// Retries `f` while it fails with transient errors, up to `timeout`.
///
/// Errors are classified with [is_retryable_error], using the default
/// predicates and `predicates`.
pub async fn retry_time_duration<T, F>(
    timeout: Duration,
    predicates: &[SharedRetryPredicate],
    mut f: F,
) -> Result<T>
where
    F: AsyncFnMut() -> Result<T>,
{
    let mut output = None;
    retry_with_target_occurrences(timeout, 1, async || match f().await {
        Ok(v) => {
            output = Some(v);
            Ok(())
        }
        Err(e) if is_retryable_error(&e, predicates) => Err(RetryError::retryable(e)),
        Err(e) => Err(RetryError::permanent(e)),
    })
    .await?;
    output.ok_or_else(|| Error::other("retry loop finished without a result"))
}

/// Reads a resource until `check` reports success `target_occurrences` times
/// in a row.
///
/// `Pending` results are retried, `Fatal` results stop the loop. When the
/// timeout expires the error names the `activity` and the elapsed time, and
/// wraps the error from the last attempt.
pub async fn polling_wait_time<R, C>(
    mut read: R,
    mut check: C,
    activity: &str,
    timeout: Duration,
    target_occurrences: u32,
) -> Result<()>
where
    R: AsyncFnMut() -> Result<JsonObject>,
    C: FnMut(Result<JsonObject>) -> PollResult,
{
    tracing::debug!(
        target_occurrences,
        "{activity}: polling until expected state is read"
    );
    let start = tokio::time::Instant::now();
    // Set when `check` stops the loop, any other error is the deadline.
    let mut fatal = false;
    let result = retry_with_target_occurrences(timeout, target_occurrences, async || {
        let response = read().await;
        let outcome = check(response);
        fatal = matches!(outcome, PollResult::Fatal(_));
        std::result::Result::<(), RetryError>::from(outcome)
    })
    .await;
    match result {
        Err(e) if !fatal => Err(Error::timeout(PollingTimeout {
            activity: activity.to_string(),
            elapsed: start.elapsed(),
            source: e,
        })),
        r => r,
    }
}

/// Succeeds once the resource can be read, retrying on 404.
pub fn poll_check_for_existence(response: Result<JsonObject>) -> PollResult {
    match response {
        Ok(_) => PollResult::Success,
        Err(e) if e.http_status_code() == Some(404) => {
            PollResult::pending("found 404, waiting for resource to exist")
        }
        Err(e) => PollResult::Fatal(e),
    }
}

/// Like [poll_check_for_existence], also retrying on 403.
///
/// Useful for resources whose permissions propagate after creation.
pub fn poll_check_for_existence_with_403(response: Result<JsonObject>) -> PollResult {
    match response {
        Ok(_) => PollResult::Success,
        Err(e) if matches!(e.http_status_code(), Some(403 | 404)) => {
            let code = e.http_status_code().unwrap_or_default();
            PollResult::pending(format!("found {code}, waiting for resource to exist"))
        }
        Err(e) => PollResult::Fatal(e),
    }
}

/// Succeeds once reading the resource returns 404.
pub fn poll_check_for_absence(response: Result<JsonObject>) -> PollResult {
    match response {
        Ok(_) => PollResult::pending("found resource, waiting for it to be gone"),
        Err(e) if e.http_status_code() == Some(404) => PollResult::Success,
        Err(e) => PollResult::Fatal(e),
    }
}

/// Like [poll_check_for_absence], also treating 403 as absent.
///
/// Reading a resource in a deleted project returns 403.
pub fn poll_check_for_absence_with_403(response: Result<JsonObject>) -> PollResult {
    match response {
        Ok(_) => PollResult::pending("found resource, waiting for it to be gone"),
        Err(e) if matches!(e.http_status_code(), Some(403 | 404)) => PollResult::Success,
        Err(e) => PollResult::Fatal(e),
    }
}
