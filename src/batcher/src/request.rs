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

use crate::Result;
use std::sync::Arc;

/// Defines how requests of one batch type are combined and sent.
///
/// # Parameters
/// * `B` - the request body. Bodies of requests in the same batch are
///   combined into one.
/// * `R` - the response. All callers in a batch receive a copy.
#[async_trait::async_trait]
pub trait BatchHandler<B, R>: Send + Sync {
    /// Combines `to_add` into the current batch `body`.
    ///
    /// On error the batch keeps its current body, and only the caller adding
    /// `to_add` receives the error.
    fn combine(&self, body: &B, to_add: B) -> Result<B>;

    /// Sends a batch. Called exactly once per batch.
    async fn send(&self, resource_name: &str, body: B) -> Result<R>;
}

/// A single request to a [RequestBatcher][crate::RequestBatcher].
pub struct BatchRequest<B, R> {
    pub(crate) resource_name: String,
    pub(crate) body: B,
    pub(crate) handler: Arc<dyn BatchHandler<B, R>>,
    pub(crate) debug_id: String,
}

impl<B, R> BatchRequest<B, R> {
    /// Creates a request for `resource_name`.
    ///
    /// Requests for the same resource name (and batch type) may be combined.
    /// The resource name is also passed to [BatchHandler::send].
    pub fn new<N>(resource_name: N, body: B, handler: Arc<dyn BatchHandler<B, R>>) -> Self
    where
        N: Into<String>,
    {
        Self {
            resource_name: resource_name.into(),
            body,
            handler,
            debug_id: String::new(),
        }
    }

    /// Identifies the request in logs and errors, typically the Terraform
    /// resource making the request.
    pub fn set_debug_id<V: Into<String>>(mut self, v: V) -> Self {
        self.debug_id = v.into();
        self
    }

    pub fn resource_name(&self) -> &str {
        &self.resource_name
    }

    pub fn body(&self) -> &B {
        &self.body
    }

    pub fn debug_id(&self) -> &str {
        &self.debug_id
    }
}

impl<B, R> std::fmt::Debug for BatchRequest<B, R>
where
    B: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchRequest")
            .field("resource_name", &self.resource_name)
            .field("body", &self.body)
            .field("debug_id", &self.debug_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Concat;

    #[async_trait::async_trait]
    impl BatchHandler<String, usize> for Concat {
        fn combine(&self, body: &String, to_add: String) -> Result<String> {
            Ok(format!("{body},{to_add}"))
        }

        async fn send(&self, _resource_name: &str, body: String) -> Result<usize> {
            Ok(body.len())
        }
    }

    #[tokio::test]
    async fn request() -> anyhow::Result<()> {
        let request = BatchRequest::new("projects/p", "a".to_string(), Arc::new(Concat))
            .set_debug_id("google_project_service.a");
        assert_eq!(request.resource_name(), "projects/p");
        assert_eq!(request.body(), "a");
        assert_eq!(request.debug_id(), "google_project_service.a");
        let fmt = format!("{request:?}");
        assert!(fmt.contains("google_project_service.a"), "{fmt}");

        let combined = request.handler.combine(request.body(), "b".to_string())?;
        assert_eq!(combined, "a,b");
        assert_eq!(request.handler.send("projects/p", combined).await?, 3);
        Ok(())
    }
}
