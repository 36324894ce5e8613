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

use super::ApiStatus;
use bytes::Bytes;
use http::HeaderMap;
use std::error::Error as StdError;

pub(crate) type BoxError = Box<dyn StdError + Send + Sync>;

/// The error returned by the polling, retry and batching layers.
///
/// A resource operation can fail in many places: the service rejects the
/// request, the connection drops, the long-running operation ends in an error
/// state, the wait runs out of time, or the resource configuration cannot be
/// turned into a request at all. The predicates (`is_*()`) tell these apart.
/// The accessors expose the HTTP response, when there is one, and the
/// [source][std::error::Error::source] chain holds anything else.
///
/// # Example
/// ```
/// use tpg_gax::error::Error;
/// fn describe(e: &Error) -> &'static str {
///     match e {
///         e if e.http_status_code() == Some(404) => "the resource is gone",
///         e if e.is_operation() => "the operation failed",
///         e if e.is_timeout() => "increase the resource timeouts",
///         _ => "unexpected error",
///     }
/// }
/// assert_eq!(describe(&Error::timeout("waiting for DONE")), "increase the resource timeouts");
/// ```
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    source: Option<BoxError>,
}

#[derive(Debug)]
enum ErrorKind {
    /// A response with an unsuccessful status code. With a parsed
    /// [ApiStatus] this is a service error, without it a transport error.
    Http(Box<HttpResponse>),
    /// No response was received.
    Io,
    Timeout,
    Exhausted,
    Cancelled,
    Operation,
    Binding,
    Serialization,
    Deserialization,
    Other,
}

#[derive(Debug)]
struct HttpResponse {
    status_code: u16,
    headers: Option<HeaderMap>,
    payload: Option<Bytes>,
    status: Option<ApiStatus>,
}

impl Error {
    fn with_source<T: Into<BoxError>>(kind: ErrorKind, source: T) -> Self {
        Self {
            kind,
            source: Some(source.into()),
        }
    }

    fn from_response(response: HttpResponse) -> Self {
        Self {
            kind: ErrorKind::Http(Box::new(response)),
            source: None,
        }
    }

    fn response(&self) -> Option<&HttpResponse> {
        match &self.kind {
            ErrorKind::Http(r) => Some(r),
            _ => None,
        }
    }

    /// Creates a service error from a parsed Google API error body.
    ///
    /// The HTTP status code is taken from the body.
    ///
    /// # Example
    /// ```
    /// use tpg_gax::error::{ApiStatus, Error};
    /// let status = ApiStatus::default().set_code(403_u16).set_message("caller does not have permission");
    /// let error = Error::service(status.clone());
    /// assert_eq!(error.status(), Some(&status));
    /// assert_eq!(error.http_status_code(), Some(403));
    /// ```
    pub fn service(status: ApiStatus) -> Self {
        Self::from_response(HttpResponse {
            status_code: status.code,
            headers: None,
            payload: None,
            status: Some(status),
        })
    }

    /// Creates an error from an unsuccessful HTTP response.
    ///
    /// Google APIs return errors as `{"error": {...}}`. When the payload has
    /// that format the result is a service error, and [status][Error::status]
    /// returns the parsed body. Responses generated elsewhere (a proxy, a load
    /// balancer) become transport errors.
    ///
    /// # Example
    /// ```
    /// use tpg_gax::error::Error;
    /// let body = br#"{"error": {"code": 409, "message": "resource busy", "errors": [{"reason": "resourceInUseByAnotherResource"}]}}"#;
    /// let error = Error::from_http_response(409, http::HeaderMap::new(), bytes::Bytes::from_static(body));
    /// assert!(error.status().is_some_and(|s| s.has_reason("resourceInUseByAnotherResource")));
    ///
    /// let error = Error::from_http_response(502, http::HeaderMap::new(), "<html>Bad Gateway</html>".into());
    /// assert!(error.is_transport());
    /// assert_eq!(error.http_status_code(), Some(502));
    /// ```
    pub fn from_http_response(status_code: u16, headers: HeaderMap, payload: Bytes) -> Self {
        let status = ApiStatus::try_from(&payload).ok();
        Self::from_response(HttpResponse {
            status_code,
            headers: Some(headers),
            payload: Some(payload),
            status,
        })
    }

    /// Creates a transport error for a response without a Google API error
    /// body.
    pub fn http(status_code: u16, headers: HeaderMap, payload: Bytes) -> Self {
        Self::from_response(HttpResponse {
            status_code,
            headers: Some(headers),
            payload: Some(payload),
            status: None,
        })
    }

    /// Creates a transport error for a request that received no response.
    ///
    /// For example, the connection was refused or reset.
    pub fn io<T: Into<BoxError>>(source: T) -> Self {
        Self::with_source(ErrorKind::Io, source)
    }

    /// Creates an error for a request or a wait that did not complete in time.
    pub fn timeout<T: Into<BoxError>>(source: T) -> Self {
        Self::with_source(ErrorKind::Timeout, source)
    }

    /// Creates an error for a loop that gave up before its deadline, e.g.
    /// after too many consecutive "not found" results.
    pub fn exhausted<T: Into<BoxError>>(source: T) -> Self {
        Self::with_source(ErrorKind::Exhausted, source)
    }

    /// Creates an error for a cancelled request.
    ///
    /// The source is the last error observed before the cancellation, if any.
    pub fn cancelled<T: Into<BoxError>>(source: T) -> Self {
        Self::with_source(ErrorKind::Cancelled, source)
    }

    /// Creates an error for a long-running operation that finished
    /// unsuccessfully. The source is displayed unchanged.
    ///
    /// # Example
    /// ```
    /// use tpg_gax::error::Error;
    /// let error = Error::operation("Error code 9, message: precondition failed");
    /// assert!(error.is_operation());
    /// assert_eq!(error.to_string(), "Error code 9, message: precondition failed");
    /// ```
    pub fn operation<T: Into<BoxError>>(source: T) -> Self {
        Self::with_source(ErrorKind::Operation, source)
    }

    /// Creates an error for inputs that cannot be turned into a request.
    ///
    /// For example, a Compute operation without a name, or a batch request
    /// with an empty batch type.
    pub fn binding<T: Into<BoxError>>(source: T) -> Self {
        Self::with_source(ErrorKind::Binding, source)
    }

    pub fn ser<T: Into<BoxError>>(source: T) -> Self {
        Self::with_source(ErrorKind::Serialization, source)
    }

    pub fn deser<T: Into<BoxError>>(source: T) -> Self {
        Self::with_source(ErrorKind::Deserialization, source)
    }

    /// Creates an error that does not fit any other kind.
    pub fn other<T: Into<BoxError>>(source: T) -> Self {
        Self::with_source(ErrorKind::Other, source)
    }

    /// The wait, or the request, ran out of time.
    ///
    /// The operation may still complete in the service. Some operations, such
    /// as creating a Cloud SQL instance or a GKE cluster, routinely take tens
    /// of minutes. Consider increasing the resource timeouts.
    pub fn is_timeout(&self) -> bool {
        matches!(self.kind, ErrorKind::Timeout)
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self.kind, ErrorKind::Exhausted)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.kind, ErrorKind::Cancelled)
    }

    /// A long-running operation completed with an error.
    ///
    /// These errors are never retried: the operation has run to completion,
    /// and polling again returns the same result.
    pub fn is_operation(&self) -> bool {
        matches!(self.kind, ErrorKind::Operation)
    }

    /// The inputs could not be turned into a valid request. This is a problem
    /// in the caller, and is never retried.
    pub fn is_binding(&self) -> bool {
        matches!(self.kind, ErrorKind::Binding)
    }

    pub fn is_serialization(&self) -> bool {
        matches!(self.kind, ErrorKind::Serialization)
    }

    pub fn is_deserialization(&self) -> bool {
        matches!(self.kind, ErrorKind::Deserialization)
    }

    /// The request received no response.
    ///
    /// The retry classifier treats these errors as transient.
    pub fn is_io(&self) -> bool {
        matches!(self.kind, ErrorKind::Io)
    }

    /// The request failed below the service: no response, or a response
    /// without a Google API error body.
    pub fn is_transport(&self) -> bool {
        match &self.kind {
            ErrorKind::Io => true,
            ErrorKind::Http(r) => r.status.is_none(),
            _ => false,
        }
    }

    /// The parsed Google API error body, for service errors.
    pub fn status(&self) -> Option<&ApiStatus> {
        self.response().and_then(|r| r.status.as_ref())
    }

    /// The HTTP status code of the failed response, if there was one.
    pub fn http_status_code(&self) -> Option<u16> {
        self.response().map(|r| r.status_code)
    }

    pub fn http_headers(&self) -> Option<&HeaderMap> {
        self.response().and_then(|r| r.headers.as_ref())
    }

    pub fn http_payload(&self) -> Option<&Bytes> {
        self.response().and_then(|r| r.payload.as_ref())
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let ErrorKind::Http(response) = &self.kind {
            return response.fmt(f);
        }
        let Some(source) = &self.source else {
            return write!(f, "{:?}", self.kind);
        };
        match self.kind {
            ErrorKind::Io => write!(f, "error sending the request: {source}"),
            ErrorKind::Cancelled => write!(f, "the request was cancelled: {source}"),
            ErrorKind::Binding => write!(f, "invalid request inputs: {source}"),
            ErrorKind::Serialization => write!(f, "error encoding the request body: {source}"),
            ErrorKind::Deserialization => write!(f, "error decoding the response: {source}"),
            _ => write!(f, "{source}"),
        }
    }
}

impl std::fmt::Display for HttpResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(status) = &self.status {
            write!(f, "googleapi: Error {}: {}", self.status_code, status.message)?;
            for reason in status.errors.iter().map(|i| &i.reason) {
                if !reason.is_empty() {
                    write!(f, ", {reason}")?;
                }
            }
            return Ok(());
        }
        write!(f, "googleapi: got HTTP response code {}", self.status_code)?;
        match self.payload.as_deref().map(std::str::from_utf8) {
            Some(Ok(body)) if !body.is_empty() => write!(f, " with body: {body}"),
            Some(Err(_)) => write!(f, " with a binary body of {} bytes", self.payload.as_ref().map_or(0, Bytes::len)),
            _ => Ok(()),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorItem;
    use test_case::test_case;

    #[derive(Debug, thiserror::Error)]
    #[error("simulated problem")]
    struct Simulated;

    fn json_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            http::header::CONTENT_TYPE,
            http::HeaderValue::from_static("application/json"),
        );
        headers
    }

    #[test]
    fn send_and_sync() {
        static_assertions::assert_impl_all!(Error: Send, Sync, StdError, std::fmt::Debug);
    }

    #[test]
    fn service() {
        let status = ApiStatus::default()
            .set_code(404_u16)
            .set_message("The resource 'projects/p/zones/z/instances/vm' was not found")
            .set_errors([ErrorItem::new("notFound", "not found")]);
        let error = Error::service(status.clone());
        assert_eq!(error.status(), Some(&status));
        assert_eq!(error.http_status_code(), Some(404));
        assert!(error.http_headers().is_none(), "{error:?}");
        assert!(error.http_payload().is_none(), "{error:?}");
        assert!(!error.is_transport(), "{error:?}");
        assert!(error.source().is_none(), "{error:?}");
        assert_eq!(
            error.to_string(),
            "googleapi: Error 404: The resource 'projects/p/zones/z/instances/vm' was not found, notFound"
        );
    }

    #[test]
    fn from_http_response_with_status() {
        let payload = Bytes::from_static(
            br#"{"error": {"code": 409, "message": "operationInProgress", "errors": [{"reason": "alreadyExists"}]}}"#,
        );
        let error = Error::from_http_response(409, json_headers(), payload.clone());
        assert!(!error.is_transport(), "{error:?}");
        assert_eq!(error.http_status_code(), Some(409));
        assert_eq!(error.http_headers(), Some(&json_headers()));
        assert_eq!(error.http_payload(), Some(&payload));
        let status = error.status().expect("payload is a valid status");
        assert!(status.has_reason("alreadyExists"), "{status:?}");
    }

    #[test]
    fn from_http_response_without_status() {
        let payload = Bytes::from_static(b"upstream connect error");
        let error = Error::from_http_response(503, json_headers(), payload.clone());
        assert!(error.is_transport(), "{error:?}");
        assert!(!error.is_io(), "{error:?}");
        assert!(error.status().is_none(), "{error:?}");
        assert_eq!(error.http_status_code(), Some(503));
        assert_eq!(error.http_payload(), Some(&payload));
        assert_eq!(
            error.to_string(),
            "googleapi: got HTTP response code 503 with body: upstream connect error"
        );
    }

    #[test_case(Bytes::new(), "googleapi: got HTTP response code 502"; "empty")]
    #[test_case(Bytes::from_static(&[0xFF, 0xFE]), "googleapi: got HTTP response code 502 with a binary body of 2 bytes"; "binary")]
    fn http_display(payload: Bytes, want: &str) {
        let error = Error::http(502, HeaderMap::new(), payload);
        assert!(error.is_transport(), "{error:?}");
        assert_eq!(error.to_string(), want);
    }

    #[test]
    fn io() {
        let error = Error::io(Simulated);
        assert!(error.is_io(), "{error:?}");
        assert!(error.is_transport(), "{error:?}");
        assert!(error.http_status_code().is_none(), "{error:?}");
        assert_eq!(error.to_string(), "error sending the request: simulated problem");
    }

    #[test]
    fn timeout() {
        let error = Error::timeout(Simulated);
        assert!(error.is_timeout(), "{error:?}");
        assert!(!error.is_transport(), "{error:?}");
        let got = error.source().and_then(|e| e.downcast_ref::<Simulated>());
        assert!(got.is_some(), "{error:?}");
        assert_eq!(error.to_string(), "simulated problem");
        assert!(error.http_status_code().is_none(), "{error:?}");
        assert!(error.status().is_none(), "{error:?}");
    }

    #[test]
    fn cancelled_wraps_last_error() {
        let last = Error::http(503, HeaderMap::new(), "try again".into());
        let error = Error::cancelled(last);
        assert!(error.is_cancelled(), "{error:?}");
        let got = error.source().and_then(|e| e.downcast_ref::<Error>());
        assert!(
            matches!(got, Some(e) if e.http_status_code() == Some(503)),
            "{error:?}"
        );
        assert!(
            error.to_string().starts_with("the request was cancelled: "),
            "{error}"
        );
    }

    #[test_case(Error::exhausted(Simulated), Error::is_exhausted, "simulated problem")]
    #[test_case(Error::operation(Simulated), Error::is_operation, "simulated problem")]
    #[test_case(Error::other(Simulated), |_: &Error| true, "simulated problem")]
    #[test_case(Error::binding(Simulated), Error::is_binding, "invalid request inputs: simulated problem")]
    #[test_case(Error::ser(Simulated), Error::is_serialization, "error encoding the request body: simulated problem")]
    #[test_case(Error::deser(Simulated), Error::is_deserialization, "error decoding the response: simulated problem")]
    fn client_side(error: Error, predicate: fn(&Error) -> bool, want: &str) {
        assert!(predicate(&error), "{error:?}");
        assert!(!error.is_transport(), "{error:?}");
        assert!(!error.is_timeout(), "{error:?}");
        assert!(error.http_status_code().is_none(), "{error:?}");
        assert_eq!(error.to_string(), want);
    }
}
