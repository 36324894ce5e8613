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

//! Operations following [AIP-151].
//!
//! These operations have a `done` flag and, once done, either an `error` or a
//! `response`. The operation name is a relative resource name, resolved
//! against the service endpoint.
//!
//! [AIP-151]: https://google.aip.dev/151

use crate::{Result, Waiter, fetch, operation_wait};
use gax::client::{ApiClient, JsonObject};
use gax::error::Error;
use serde::Deserialize;
use std::time::Duration;

/// The services using [CommonOperationWaiter].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum CommonApi {
    Spanner,
    ServiceUsage,
    ResourceManager,
    ServiceNetworking,
}

impl CommonApi {
    pub fn base_path(&self) -> &'static str {
        match self {
            Self::Spanner => "https://spanner.googleapis.com/v1/",
            Self::ServiceUsage => "https://serviceusage.googleapis.com/v1/",
            Self::ResourceManager => "https://cloudresourcemanager.googleapis.com/v1/",
            Self::ServiceNetworking => "https://servicenetworking.googleapis.com/v1/",
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
#[non_exhaustive]
pub struct Operation {
    pub name: String,
    pub done: bool,
    pub metadata: Option<JsonObject>,
    pub error: Option<Status>,
    pub response: Option<JsonObject>,
}

impl Operation {
    pub fn set_name<V: Into<String>>(mut self, v: V) -> Self {
        self.name = v.into();
        self
    }

    pub fn set_done(mut self, v: bool) -> Self {
        self.done = v;
        self
    }

    pub fn set_error(mut self, v: Status) -> Self {
        self.error = Some(v);
        self
    }

    pub fn set_response(mut self, v: JsonObject) -> Self {
        self.response = Some(v);
        self
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
#[non_exhaustive]
pub struct Status {
    pub code: i32,
    pub message: String,
    pub details: Vec<serde_json::Value>,
}

impl Status {
    pub fn new<M: Into<String>>(code: i32, message: M) -> Self {
        Self {
            code,
            message: message.into(),
            ..Default::default()
        }
    }
}

/// The error embedded in a failed AIP-151 operation.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
#[error("Error code {}, message: {}", .0.code, .0.message)]
pub struct CommonOperationError(pub Status);

/// Waits for AIP-151 operations.
#[derive(Clone, Debug)]
pub struct CommonOperationWaiter {
    client: ApiClient,
    base_path: String,
    project: Option<String>,
    op: Operation,
}

impl CommonOperationWaiter {
    pub fn new(client: ApiClient, api: CommonApi, op: Operation) -> Result<Self> {
        let mut waiter = Self {
            client,
            base_path: api.base_path().to_string(),
            project: None,
            op: Operation::default(),
        };
        waiter.set_op(op)?;
        Ok(waiter)
    }

    pub fn with_base_path<V: Into<String>>(mut self, v: V) -> Self {
        self.base_path = v.into();
        self
    }

    /// The project used for billing the status checks.
    pub fn with_project<V: Into<String>>(mut self, v: V) -> Self {
        self.project = Some(v.into());
        self
    }

    /// The response embedded in the current operation, if any.
    pub fn response(&self) -> Option<&JsonObject> {
        self.op.response.as_ref()
    }

    fn operation_url(&self) -> String {
        format!("{}{}", self.base_path, self.op.name)
    }
}

#[async_trait::async_trait]
impl Waiter for CommonOperationWaiter {
    type Operation = Operation;

    fn state(&self) -> String {
        format!("done: {}", self.op.done)
    }

    fn error(&self) -> Option<Error> {
        self.op
            .error
            .as_ref()
            .map(|s| Error::operation(CommonOperationError(s.clone())))
    }

    fn is_retryable(&self, _error: &Error) -> bool {
        false
    }

    fn set_op(&mut self, op: Operation) -> Result<()> {
        if op.name.is_empty() {
            return Err(Error::binding("the operation has no name"));
        }
        self.op = op;
        Ok(())
    }

    async fn query_op(&self) -> Result<Operation> {
        fetch(&self.client, self.operation_url(), self.project.as_deref()).await
    }

    fn op_name(&self) -> String {
        self.op.name.clone()
    }

    fn pending_states(&self) -> Vec<String> {
        vec!["done: false".to_string()]
    }

    fn target_states(&self) -> Vec<String> {
        vec!["done: true".to_string()]
    }
}

/// Waits for the operation and decodes its response into `T`.
///
/// Operations completing without a response decode from an empty object.
pub async fn operation_wait_with_response<T>(
    waiter: &mut CommonOperationWaiter,
    activity: &str,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<T>
where
    T: serde::de::DeserializeOwned,
{
    operation_wait(waiter, activity, timeout, poll_interval).await?;
    let response = waiter.response().cloned().unwrap_or_default();
    serde_json::from_value(serde_json::Value::Object(response)).map_err(Error::deser)
}
