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

//! Decides whether an error is transient.
//!
//! Every request the provider makes, and every poll of a long-running
//! operation, goes through [is_retryable_error]. The function applies a fixed
//! set of default predicates, followed by any predicates supplied by the
//! caller. The first predicate that matches wins, and its reason is logged at
//! debug level.
//!
//! Errors are often wrapped, for example by the request batcher. The
//! classifier walks the [source][std::error::Error::source] chain and applies
//! the predicates to every [Error] it finds.
//!
//! # Example
//! ```
//! use std::sync::Arc;
//! use tpg_gax::error::Error;
//! use tpg_gax::retry_predicates::*;
//!
//! let error = Error::http(503, http::HeaderMap::new(), "unavailable".into());
//! assert!(is_retryable_error(&error, &[]));
//!
//! let error = Error::http(404, http::HeaderMap::new(), "not found".into());
//! assert!(!is_retryable_error(&error, &[]));
//! assert!(is_retryable_error(&error, &[is_not_found_retryable_error("instance read")]));
//! ```

use crate::error::Error;
use std::error::Error as StdError;
use std::sync::Arc;

/// A predicate that may classify an error as retryable.
///
/// Returns `Some(reason)` if the error is retryable, `None` if the predicate
/// has no opinion. Predicates never mark an error as permanent: an error is
/// permanent if no predicate matches it.
pub trait RetryPredicate: Send + Sync {
    fn is_retryable(&self, error: &Error) -> Option<String>;
}

impl<F> RetryPredicate for F
where
    F: Fn(&Error) -> Option<String> + Send + Sync,
{
    fn is_retryable(&self, error: &Error) -> Option<String> {
        self(error)
    }
}

/// A shared, type-erased [RetryPredicate].
pub type SharedRetryPredicate = Arc<dyn RetryPredicate>;

type PredicateFn = fn(&Error) -> Option<String>;

const DEFAULT_PREDICATES: [PredicateFn; 5] = [
    is_network_error,
    is_common_retryable_error_code,
    is_409_operation_in_progress_error,
    is_412_fingerprint_error,
    is_operation_read_quota_error,
];

/// Returns true if `error`, or any error in its source chain, is transient.
///
/// The default predicates are applied first, then `predicates` in order.
/// Classification has no side effects other than logging, and always returns
/// the same value for the same inputs.
pub fn is_retryable_error(error: &Error, predicates: &[SharedRetryPredicate]) -> bool {
    let mut next: Option<&(dyn StdError + 'static)> = Some(error);
    while let Some(current) = next {
        if let Some(e) = current.downcast_ref::<Error>() {
            if let Some(reason) = classify(e, predicates) {
                tracing::debug!(%reason, "dismissed an error as retryable: {e}");
                return true;
            }
        }
        next = current.source();
    }
    tracing::debug!("retry disabled for error: {error}");
    false
}

fn classify(error: &Error, predicates: &[SharedRetryPredicate]) -> Option<String> {
    DEFAULT_PREDICATES
        .iter()
        .find_map(|p| p(error))
        .or_else(|| predicates.iter().find_map(|p| p.is_retryable(error)))
}

/// Returns true if the error has the given HTTP status code.
///
/// Like [is_retryable_error], this walks the source chain.
pub fn is_google_api_error_with_code(error: &Error, code: u16) -> bool {
    find_in_chain(error, |e| e.http_status_code() == Some(code))
}

/// Returns true if the error reports that the API is not enabled in the
/// project.
///
/// Callers use this to abort retry loops early: waiting does not enable the
/// API.
pub fn is_api_not_enabled_error(error: &Error) -> bool {
    find_in_chain(error, |e| {
        e.http_status_code() == Some(403)
            && e.status().is_some_and(|s| s.has_reason("accessNotConfigured"))
    })
}

fn find_in_chain<P>(error: &Error, predicate: P) -> bool
where
    P: Fn(&Error) -> bool,
{
    let mut next: Option<&(dyn StdError + 'static)> = Some(error);
    while let Some(current) = next {
        if current.downcast_ref::<Error>().is_some_and(&predicate) {
            return true;
        }
        next = current.source();
    }
    false
}

fn body_contains(error: &Error, needle: &str) -> bool {
    if let Some(payload) = error.http_payload() {
        if String::from_utf8_lossy(payload).contains(needle) {
            return true;
        }
    }
    error.status().is_some_and(|s| {
        s.message.contains(needle)
            || s.errors
                .iter()
                .any(|e| e.reason == needle || e.message.contains(needle))
    })
}

/// Connection failures and timeouts without an HTTP response.
///
/// Only timeouts raised by the network stack count. Deadlines of a wait, a
/// poll loop or a batch are final.
pub fn is_network_error(error: &Error) -> Option<String> {
    if is_network_timeout(error) {
        return Some("Retry on network timeout".to_string());
    }
    if error.is_io() {
        return Some(format!("Retry on connection error: {error}"));
    }
    None
}

fn is_network_timeout(error: &Error) -> bool {
    if !error.is_timeout() || error.http_status_code().is_some() {
        return false;
    }
    let Some(source) = error.source() else {
        return false;
    };
    if let Some(e) = source.downcast_ref::<reqwest::Error>() {
        return e.is_timeout();
    }
    source
        .downcast_ref::<std::io::Error>()
        .is_some_and(|e| e.kind() == std::io::ErrorKind::TimedOut)
}

/// HTTP 429, 500, 502 and 503.
pub fn is_common_retryable_error_code(error: &Error) -> Option<String> {
    match error.http_status_code() {
        Some(code @ (429 | 500 | 502 | 503)) => Some(format!("Retryable error code {code}")),
        _ => None,
    }
}

/// HTTP 409 while another operation is running on the same resource.
///
/// Other conflicts, such as "already exists", are permanent.
pub fn is_409_operation_in_progress_error(error: &Error) -> Option<String> {
    if error.http_status_code() == Some(409) && body_contains(error, "operationInProgress") {
        return Some("Operation still in progress".to_string());
    }
    None
}

/// HTTP 412 caused by a stale resource fingerprint.
///
/// The resource was changed since it was read, a new read-modify-write cycle
/// with the updated fingerprint is expected to succeed.
pub fn is_412_fingerprint_error(error: &Error) -> Option<String> {
    if error.http_status_code() != Some(412) {
        return None;
    }
    if body_contains(error, "fingerprint") || body_contains(error, "conditionNotMet") {
        return Some("fingerprint mismatch".to_string());
    }
    None
}

/// HTTP 403 when the per-project operation read quota is exhausted.
pub fn is_operation_read_quota_error(error: &Error) -> Option<String> {
    if error.http_status_code() == Some(403) && body_contains(error, "Quota exceeded for quota group")
    {
        return Some("Waiting for quota to refresh".to_string());
    }
    None
}

/// Cloud SQL rejects concurrent operations on the same instance with a 409.
pub fn is_sql_operation_in_progress_error(error: &Error) -> Option<String> {
    if error.http_status_code() != Some(409) {
        return None;
    }
    if error
        .status()
        .is_some_and(|s| s.has_reason("operationInProgress"))
        || body_contains(error, "you cannot perform another operation")
    {
        return Some("Waiting for other concurrent Cloud SQL operations to finish".to_string());
    }
    None
}

/// Cloud Monitoring rejects concurrent edits to the same project with a 409.
pub fn is_monitoring_concurrent_edit_error(error: &Error) -> Option<String> {
    if error.http_status_code() == Some(409) && body_contains(error, "too many concurrent edits") {
        return Some("Waiting for other Monitoring changes to finish".to_string());
    }
    None
}

/// Cloud Storage returns 412 while an object is being replaced concurrently.
pub fn is_storage_precondition_error(error: &Error) -> Option<String> {
    if error.http_status_code() == Some(412) && body_contains(error, "conditionNotMet") {
        return Some("Retry on storage precondition not met".to_string());
    }
    None
}

/// Treats a 404 as transient, while the named operation becomes visible.
///
/// Newly created operations and resources are eventually consistent in some
/// services, the first few reads may return "not found".
pub fn is_not_found_retryable_error(operation: impl Into<String>) -> SharedRetryPredicate {
    let operation = operation.into();
    Arc::new(move |error: &Error| {
        if error.http_status_code() == Some(404) {
            return Some(format!("Retry 404s for {operation}"));
        }
        None
    })
}
