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

//! Kubernetes Engine operations.

use crate::{Result, Waiter, fetch};
use gax::client::ApiClient;
use gax::error::Error;
use serde::Deserialize;

const DEFAULT_BASE_PATH: &str = "https://container.googleapis.com/v1/";

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
#[non_exhaustive]
pub struct Operation {
    pub name: String,
    pub status: String,
    /// Deprecated by the service in favor of `error`, still populated by some
    /// operations.
    pub status_message: String,
    pub operation_type: String,
    pub zone: String,
    pub location: String,
    pub self_link: String,
    pub target_link: String,
    pub error: Option<Status>,
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

    pub fn set_status_message<V: Into<String>>(mut self, v: V) -> Self {
        self.status_message = v.into();
        self
    }

    pub fn set_error(mut self, v: Status) -> Self {
        self.error = Some(v);
        self
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
#[non_exhaustive]
pub struct Status {
    pub code: i32,
    pub message: String,
}

impl Status {
    pub fn new<M: Into<String>>(code: i32, message: M) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Waits for Kubernetes Engine operations.
///
/// Operations are queried by location, which may be a zone or a region.
#[derive(Clone, Debug)]
pub struct ContainerOperationWaiter {
    client: ApiClient,
    base_path: String,
    project: String,
    location: String,
    user_project: Option<String>,
    op: Operation,
}

impl ContainerOperationWaiter {
    pub fn new<P, L>(client: ApiClient, project: P, location: L, op: Operation) -> Result<Self>
    where
        P: Into<String>,
        L: Into<String>,
    {
        let mut waiter = Self {
            client,
            base_path: DEFAULT_BASE_PATH.to_string(),
            project: project.into(),
            location: location.into(),
            user_project: None,
            op: Operation::default(),
        };
        waiter.set_op(op)?;
        Ok(waiter)
    }

    pub fn with_base_path<V: Into<String>>(mut self, v: V) -> Self {
        self.base_path = v.into();
        self
    }

    /// Bills the status checks to this project.
    pub fn with_user_project<V: Into<String>>(mut self, v: V) -> Self {
        self.user_project = Some(v.into());
        self
    }

    fn operation_url(&self) -> String {
        format!(
            "{}projects/{}/locations/{}/operations/{}",
            self.base_path, self.project, self.location, self.op.name
        )
    }
}

#[async_trait::async_trait]
impl Waiter for ContainerOperationWaiter {
    type Operation = Operation;

    fn state(&self) -> String {
        self.op.status.clone()
    }

    fn error(&self) -> Option<Error> {
        // Running operations report progress in `statusMessage`.
        if self.pending_states().contains(&self.op.status) {
            return None;
        }
        match (&self.op.error, self.op.status_message.as_str()) {
            (Some(status), _) if !status.message.is_empty() => {
                Some(Error::operation(status.message.clone()))
            }
            (_, "") => None,
            (_, message) => Some(Error::operation(message.to_string())),
        }
    }

    fn is_retryable(&self, _error: &Error) -> bool {
        false
    }

    fn set_op(&mut self, op: Operation) -> Result<()> {
        if op.name.is_empty() {
            return Err(Error::binding("the Kubernetes Engine operation has no name"));
        }
        self.op = op;
        Ok(())
    }

    async fn query_op(&self) -> Result<Operation> {
        let project = self.user_project.as_deref().unwrap_or(&self.project);
        fetch(&self.client, self.operation_url(), Some(project)).await
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
    use test_case::test_case;

    fn test_client() -> ApiClient {
        let transport = RetryTransport::new(reqwest::Client::new(), RetryTransportConfig::new());
        ApiClient::new(transport, StaticToken::new("test-token"))
    }

    #[test_case(Operation::default(), None)]
    #[test_case(Operation::default().set_error(Status::new(3, "bad node pool")), Some("bad node pool"))]
    #[test_case(Operation::default().set_status_message("legacy failure"), Some("legacy failure"))]
    #[test_case(Operation::default().set_error(Status::new(3, "new")).set_status_message("old"), Some("new"))]
    #[test_case(Operation::default().set_error(Status::default()), None)]
    #[test_case(Operation::default().set_status("RUNNING").set_status_message("Creating node pool"), None)]
    #[test_case(Operation::default().set_status("PENDING").set_error(Status::new(3, "not yet")), None)]
    #[test_case(Operation::default().set_status("DONE").set_status_message("legacy failure"), Some("legacy failure"))]
    fn error(op: Operation, want: Option<&str>) -> anyhow::Result<()> {
        let waiter = ContainerOperationWaiter::new(test_client(), "p", "us-central1", op.set_name("op-1"))?;
        let got = waiter.error();
        assert_eq!(got.as_ref().map(|e| e.to_string()).as_deref(), want, "{got:?}");
        if let Some(e) = got {
            assert!(e.is_operation(), "{e:?}");
            assert!(!waiter.is_retryable(&e));
        }
        Ok(())
    }

    #[test]
    fn url() -> anyhow::Result<()> {
        let op = Operation::default().set_name("operation-123").set_status("RUNNING");
        let waiter = ContainerOperationWaiter::new(test_client(), "p", "us-central1-a", op)?
            .with_user_project("billing");
        assert_eq!(
            waiter.operation_url(),
            "https://container.googleapis.com/v1/projects/p/locations/us-central1-a/operations/operation-123"
        );
        assert_eq!(waiter.state(), "RUNNING");
        assert_eq!(waiter.op_name(), "operation-123");
        Ok(())
    }
}
