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

use serde::{Deserialize, Serialize};

/// The error payload returned by Google Cloud REST APIs.
///
/// Services return errors wrapped in an `{"error": {...}}` object. Besides the
/// HTTP status code and a human-readable message, older APIs (Compute, SQL
/// Admin, Storage) include a list of [ErrorItem] with a machine-readable
/// `reason`. Newer APIs include a `status` name and typed `details`, which we
/// preserve as raw JSON values.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
#[non_exhaustive]
pub struct ApiStatus {
    /// The HTTP status code reported in the payload.
    pub code: u16,
    /// A developer-facing error message.
    pub message: String,
    /// The canonical status name, such as `FAILED_PRECONDITION`.
    pub status: String,
    /// The legacy error list.
    pub errors: Vec<ErrorItem>,
    /// The typed details, such as `google.rpc.ErrorInfo`.
    pub details: Vec<serde_json::Value>,
}

impl ApiStatus {
    /// Sets the value for [code][ApiStatus::code].
    pub fn set_code<T: Into<u16>>(mut self, v: T) -> Self {
        self.code = v.into();
        self
    }

    /// Sets the value for [message][ApiStatus::message].
    pub fn set_message<T: Into<String>>(mut self, v: T) -> Self {
        self.message = v.into();
        self
    }

    /// Sets the value for [status][ApiStatus::status].
    pub fn set_status<T: Into<String>>(mut self, v: T) -> Self {
        self.status = v.into();
        self
    }

    /// Sets the value for [errors][ApiStatus::errors].
    pub fn set_errors<T, I>(mut self, v: T) -> Self
    where
        T: IntoIterator<Item = I>,
        I: Into<ErrorItem>,
    {
        self.errors = v.into_iter().map(|i| i.into()).collect();
        self
    }

    /// Returns true if any of the legacy error items has the given `reason`.
    pub fn has_reason(&self, reason: &str) -> bool {
        self.errors.iter().any(|e| e.reason == reason)
    }
}

/// One entry in the legacy error list.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
#[non_exhaustive]
pub struct ErrorItem {
    pub reason: String,
    pub message: String,
    pub domain: String,
}

impl ErrorItem {
    pub fn new<R: Into<String>, M: Into<String>>(reason: R, message: M) -> Self {
        Self {
            reason: reason.into(),
            message: message.into(),
            ..Default::default()
        }
    }
}

#[derive(Deserialize)]
struct ErrorWrapper {
    error: ApiStatus,
}

impl TryFrom<&bytes::Bytes> for ApiStatus {
    type Error = serde_json::Error;

    fn try_from(value: &bytes::Bytes) -> Result<Self, Self::Error> {
        serde_json::from_slice::<ErrorWrapper>(value).map(|w| w.error)
    }
}
