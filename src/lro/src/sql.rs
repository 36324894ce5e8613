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

//! Cloud SQL Admin operations.

use crate::{Result, Waiter, fetch};
use gax::client::ApiClient;
use gax::error::Error;
use serde::Deserialize;

const DEFAULT_BASE_PATH: &str = "https://sqladmin.googleapis.com/sql/v1beta4/";

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
#[non_exhaustive]
pub struct Operation {
    pub name: String,
    pub status: String,
    pub operation_type: String,
    pub target_id: String,
    pub target_project: String,
    pub self_link: String,
    pub error: Option<OperationErrors>,
}

impl Operation {
    pub fn set_name<V: Into<String>>(mut self, v: V) -> Self {
        self.name = v.into();
        self
    }

    pub fn set_status<V: Into<String>>(mut self, v: V) -> Self {
        self.status = v.into();
        self
    }

    pub fn set_error(mut self, v: OperationErrors) -> Self {
        self.error = Some(v);
        self
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
#[non_exhaustive]
pub struct OperationErrors {
    pub errors: Vec<OperationError>,
}

impl OperationErrors {
    pub fn new<T: IntoIterator<Item = OperationError>>(errors: T) -> Self {
        Self {
            errors: errors.into_iter().collect(),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
#[non_exhaustive]
pub struct OperationError {
    pub code: String,
    pub message: String,
    pub kind: String,
}

impl OperationError {
    pub fn new<C: Into<String>, M: Into<String>>(code: C, message: M) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            ..Default::default()
        }
    }
}

/// The error embedded in a failed Cloud SQL operation, one message per line.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
#[error("{}", render(.0))]
pub struct SqlAdminOperationError(pub OperationErrors);

fn render(errors: &OperationErrors) -> String {
    errors
        .errors
        .iter()
        .map(|e| format!("{}\n", e.message))
        .collect()
}

/// Waits for Cloud SQL Admin operations.
#[derive(Clone, Debug)]
pub struct SqlAdminOperationWaiter {
    client: ApiClient,
    base_path: String,
    project: String,
    op: Operation,
}

impl SqlAdminOperationWaiter {
    pub fn new<P: Into<String>>(client: ApiClient, project: P, op: Operation) -> Result<Self> {
        let mut waiter = Self {
            client,
            base_path: DEFAULT_BASE_PATH.to_string(),
            project: project.into(),
            op: Operation::default(),
        };
        waiter.set_op(op)?;
        Ok(waiter)
    }

    pub fn with_base_path<V: Into<String>>(mut self, v: V) -> Self {
        self.base_path = v.into();
        self
    }

    fn operation_url(&self) -> String {
        format!(
            "{}projects/{}/operations/{}",
            self.base_path, self.project, self.op.name
        )
    }
}

#[async_trait::async_trait]
impl Waiter for SqlAdminOperationWaiter {
    type Operation = Operation;

    fn state(&self) -> String {
        self.op.status.clone()
    }

    fn error(&self) -> Option<Error> {
        self.op
            .error
            .as_ref()
            .filter(|e| !e.errors.is_empty())
            .map(|e| Error::operation(SqlAdminOperationError(e.clone())))
    }

    fn is_retryable(&self, _error: &Error) -> bool {
        false
    }

    fn set_op(&mut self, op: Operation) -> Result<()> {
        if op.name.is_empty() {
            return Err(Error::binding("the Cloud SQL operation has no name"));
        }
        self.op = op;
        Ok(())
    }

    async fn query_op(&self) -> Result<Operation> {
        fetch(&self.client, self.operation_url(), Some(&self.project)).await
    }

    fn op_name(&self) -> String {
        self.op.name.clone()
    }

    fn pending_states(&self) -> Vec<String> {
        vec!["PENDING".to_string(), "RUNNING".to_string()]
    }

    fn target_states(&self) -> Vec<String> {
        vec!["DONE".to_string()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gax::client::StaticToken;
    use gax::options::RetryTransportConfig;
    use gax::transport::RetryTransport;

    fn test_client() -> ApiClient {
        let transport = RetryTransport::new(reqwest::Client::new(), RetryTransportConfig::new());
        ApiClient::new(transport, StaticToken::new("test-token"))
    }

    #[test]
    fn error_lines() -> anyhow::Result<()> {
        let op = Operation::default()
            .set_name("op-1")
            .set_status("DONE")
            .set_error(OperationErrors::new([
                OperationError::new("ERROR_RDBMS", "first problem"),
                OperationError::new("ERROR_RDBMS", "second problem"),
            ]));
        let waiter = SqlAdminOperationWaiter::new(test_client(), "p", op)?;
        let err = waiter.error().expect("the operation failed");
        assert!(err.is_operation(), "{err:?}");
        assert_eq!(err.to_string(), "first problem\nsecond problem\n");
        assert!(!waiter.is_retryable(&err));
        Ok(())
    }

    #[test]
    fn no_error() -> anyhow::Result<()> {
        let op = Operation::default().set_name("op-1").set_status("RUNNING");
        let waiter = SqlAdminOperationWaiter::new(test_client(), "p", op)?;
        assert!(waiter.error().is_none());
        assert_eq!(waiter.state(), "RUNNING");

        let op = Operation::default()
            .set_name("op-1")
            .set_error(OperationErrors::default());
        let waiter = SqlAdminOperationWaiter::new(test_client(), "p", op)?;
        assert!(waiter.error().is_none());
        Ok(())
    }

    #[test]
    fn url() -> anyhow::Result<()> {
        let op = Operation::default().set_name("op-1");
        let waiter = SqlAdminOperationWaiter::new(test_client(), "p", op)?;
        assert_eq!(
            waiter.operation_url(),
            "https://sqladmin.googleapis.com/sql/v1beta4/projects/p/operations/op-1"
        );
        Ok(())
    }

    #[test]
    fn deserialize() -> anyhow::Result<()> {
        let op = serde_json::from_value::<Operation>(serde_json::json!({
            "kind": "sql#operation",
            "name": "op-1",
            "status": "DONE",
            "error": {"kind": "sql#operationErrors", "errors": [
                {"kind": "sql#operationError", "code": "ERROR_RDBMS", "message": "boom"},
            ]},
        }))?;
        assert_eq!(op.status, "DONE");
        assert_eq!(
            op.error,
            Some(OperationErrors::new([OperationError {
                kind: "sql#operationError".into(),
                ..OperationError::new("ERROR_RDBMS", "boom")
            }]))
        );
        Ok(())
    }
}
