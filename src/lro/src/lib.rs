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

//! Waits for long-running operations (LROs) to complete.
//!
//! Most Google Cloud APIs return an "Operation" from mutating calls. The
//! operation must be polled until it completes, and the error embedded in the
//! operation (if any) reported to the caller.
//!
//! Each API uses a slightly different "Operation" type. Each of them has a
//! [Waiter] implementation in this crate, and [operation_wait] drives any of
//! them to completion:
//! - [compute::ComputeOperationWaiter] for Compute Engine.
//! - [sql::SqlAdminOperationWaiter] for Cloud SQL Admin.
//! - [container::ContainerOperationWaiter] for Kubernetes Engine.
//! - [common::CommonOperationWaiter] for the APIs using the AIP-151
//!   operations, such as Spanner or Service Usage.
//!
//! Cloud Run resources do not return operations, [knative] has the check used
//! to wait for them.

use gax::error::Error;
use gax::retry_predicates::{
    SharedRetryPredicate, is_not_found_retryable_error, is_retryable_error,
};
use gax::state_change::{StateChangeConf, TimeoutError};
use std::time::Duration;

pub use gax::Result;

pub mod common;
pub mod compute;
pub mod container;
pub mod knative;
pub mod sql;

/// Operations are refreshed at most this often.
const MIN_TIMEOUT: Duration = Duration::from_secs(2);

/// The number of consecutive failed status checks tolerated.
const NOT_FOUND_CHECKS: u32 = 20;

/// The API-specific part of waiting for an operation.
///
/// Implementations hold the current copy of the operation, replaced after each
/// status check with [set_op][Waiter::set_op].
#[async_trait::async_trait]
pub trait Waiter: Send + Sync {
    /// The operation type returned by the service.
    type Operation: Send;

    /// The status of the current operation, compared against
    /// [pending_states][Waiter::pending_states] and
    /// [target_states][Waiter::target_states].
    fn state(&self) -> String;

    /// The error embedded in the current operation, if any.
    fn error(&self) -> Option<Error>;

    /// Returns true if the operation error is transient.
    ///
    /// Retrying an operation error means checking its status again, not
    /// restarting the operation.
    fn is_retryable(&self, error: &Error) -> bool;

    /// Adopts a new copy of the operation.
    fn set_op(&mut self, op: Self::Operation) -> Result<()>;

    /// Checks the status of the operation, with exactly one request.
    async fn query_op(&self) -> Result<Self::Operation>;

    fn op_name(&self) -> String;

    fn pending_states(&self) -> Vec<String>;

    fn target_states(&self) -> Vec<String>;
}

/// An operation did not complete before the timeout.
#[derive(Debug, thiserror::Error)]
#[error("timeout while waiting for {activity} after {elapsed:?}: {source}")]
pub struct OperationWaitTimeout {
    pub activity: String,
    pub elapsed: Duration,
    #[source]
    pub source: Error,
}

/// Waits until the operation held by `waiter` completes.
///
/// Returns the error embedded in the operation, if any. The status is checked
/// at most every 2 seconds, or every `poll_interval` if it is between zero and
/// three minutes. Transient errors while checking the status, including "not
/// found", are tolerated up to 20 times in a row.
///
/// # Example
/// ```no_run
/// # use tpg_lro::*;
/// # use tpg_lro::compute::{ComputeOperationWaiter, Operation};
/// # use gax::client::ApiClient;
/// use std::time::Duration;
/// async fn wait(client: ApiClient, op: Operation) -> Result<()> {
///     let mut waiter = ComputeOperationWaiter::new(client, "my-project", op)?;
///     operation_wait(&mut waiter, "Creating Instance", Duration::from_secs(20 * 60), Duration::ZERO).await
/// }
/// ```
pub async fn operation_wait<W>(
    waiter: &mut W,
    activity: &str,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<()>
where
    W: Waiter,
{
    if waiter.target_states().contains(&waiter.state()) {
        tracing::debug!(op = %waiter.op_name(), "{activity}: operation already done");
        return waiter.error().map_or(Ok(()), Err);
    }

    let not_found = [is_not_found_retryable_error("GET operation")];
    let conf = StateChangeConf::new(waiter.pending_states(), waiter.target_states(), timeout)
        .with_min_timeout(MIN_TIMEOUT)
        .with_poll_interval(poll_interval)
        .with_not_found_checks(NOT_FOUND_CHECKS);
    let start = tokio::time::Instant::now();
    let result = conf
        .wait_for_state(async || refresh(waiter, &not_found).await)
        .await;
    match result {
        Ok(_) => {}
        Err(e) if is_wait_deadline(&e) => {
            return Err(Error::timeout(OperationWaitTimeout {
                activity: activity.to_string(),
                elapsed: start.elapsed(),
                source: e,
            }));
        }
        Err(e) => return Err(e),
    }
    tracing::debug!(op = %waiter.op_name(), "{activity}: operation finished");
    waiter.error().map_or(Ok(()), Err)
}

fn is_wait_deadline(error: &Error) -> bool {
    use std::error::Error as _;
    error
        .source()
        .is_some_and(|s| s.downcast_ref::<TimeoutError>().is_some())
}

/// Checks the status once, `Ok(None)` means "no usable status yet".
async fn refresh<W>(
    waiter: &mut W,
    predicates: &[SharedRetryPredicate],
) -> Result<Option<((), String)>>
where
    W: Waiter,
{
    let op = match waiter.query_op().await {
        Ok(op) => op,
        Err(e) if is_retryable_error(&e, predicates) => {
            tracing::debug!(op = %waiter.op_name(), "dismissed retryable error on GET operation: {e}");
            return Ok(None);
        }
        Err(e) => return Err(e),
    };
    waiter.set_op(op)?;
    if let Some(e) = waiter.error() {
        if waiter.is_retryable(&e) {
            tracing::debug!(op = %waiter.op_name(), "retrying operation GET after retryable error: {e}");
            return Ok(None);
        }
        return Err(e);
    }
    Ok(Some(((), waiter.state())))
}

/// Sends one `GET` request and decodes the response as an operation.
pub(crate) async fn fetch<T>(
    client: &gax::client::ApiClient,
    url: String,
    project: Option<&str>,
) -> Result<T>
where
    T: serde::de::DeserializeOwned,
{
    use gax::client::SendRequestOptions;
    let request = SendRequestOptions::new(reqwest::Method::GET, url);
    let request = match project {
        Some(p) => request.set_project(p),
        None => request,
    };
    let body = client.send_request(request).await?.unwrap_or_default();
    serde_json::from_value(serde_json::Value::Object(body)).map_err(Error::deser)
}

/// Returns the last segment of a resource URL, e.g. the zone in
/// `https://.../projects/p/zones/us-central1-a`.
pub(crate) fn name_from_self_link(link: &str) -> &str {
    link.rsplit('/').next().unwrap_or(link)
}
