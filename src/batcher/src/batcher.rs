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

use crate::options::BatchingConfig;
use crate::request::BatchRequest;
use crate::Result;
use gax::error::Error;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;

type BatchResult<R> = std::result::Result<R, Arc<Error>>;

/// A batch waiting for its timer, and the callers waiting for its result.
struct StartedBatch<B, R> {
    request: BatchRequest<B, R>,
    listeners: Vec<oneshot::Sender<BatchResult<R>>>,
}

type Batches<B, R> = Arc<Mutex<HashMap<String, StartedBatch<B, R>>>>;

/// Coalesces requests with the same batch type and resource name.
///
/// The batcher is created once per provider configuration and shared (by
/// cloning) with every resource that needs it. Clones share the pending
/// batches.
///
/// # Example
/// ```no_run
/// # use tpg_batcher::{BatchHandler, BatchRequest, BatchingConfig, RequestBatcher};
/// # use std::sync::Arc;
/// # use std::time::Duration;
/// # async fn sample(handler: Arc<dyn BatchHandler<Vec<String>, ()>>) -> gax::Result<()> {
/// let batcher = RequestBatcher::new(BatchingConfig::default());
/// let request = BatchRequest::new("projects/my-project", vec!["pubsub.googleapis.com".to_string()], handler)
///     .set_debug_id("google_project_service.pubsub");
/// batcher
///     .send_request_with_timeout("Enable Project Services", request, Duration::from_secs(1200))
///     .await?;
/// # Ok(()) }
/// ```
pub struct RequestBatcher<B, R> {
    config: BatchingConfig,
    batches: Batches<B, R>,
}

impl<B, R> Clone for RequestBatcher<B, R> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            batches: self.batches.clone(),
        }
    }
}

impl<B, R> std::fmt::Debug for RequestBatcher<B, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestBatcher")
            .field("config", &self.config)
            .finish()
    }
}

impl<B, R> RequestBatcher<B, R>
where
    B: Send + 'static,
    R: Clone + Send + 'static,
{
    pub fn new(config: BatchingConfig) -> Self {
        Self {
            config,
            batches: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Sends `request` as part of a batch, and waits for the batch result.
    ///
    /// Requests with the same `batch_type` and resource name, made before the
    /// batch is sent, are combined into a single call. Every caller in the
    /// batch receives a copy of its response, or of its error.
    ///
    /// The `timeout` applies only to this caller. If it expires, the batch is
    /// still sent for any other callers.
    pub async fn send_request_with_timeout(
        &self,
        batch_type: &str,
        request: BatchRequest<B, R>,
        timeout: Duration,
    ) -> Result<R> {
        if batch_type.is_empty() {
            return Err(Error::binding("the batch type cannot be empty"));
        }
        if self.config.disable_batching {
            tracing::debug!(debug_id = %request.debug_id, "batching is disabled, sending single request");
            let BatchRequest {
                resource_name,
                body,
                handler,
                ..
            } = request;
            return handler.send(&resource_name, body).await;
        }

        let batch_key = format!("{batch_type}:{}", request.resource_name);
        let debug_id = request.debug_id.clone();
        let rx = self.start_or_join(&batch_key, request)?;
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(Ok(response))) => Ok(response),
            Ok(Ok(Err(source))) => Err(Error::other(BatchError {
                batch_key,
                debug_id,
                source,
            })),
            Ok(Err(_)) => Err(Error::other(format!(
                "batch {batch_key:?} was dropped before sending request {debug_id:?}"
            ))),
            Err(_) => Err(Error::timeout(BatchTimeout {
                batch_key,
                timeout,
            })),
        }
    }

    fn start_or_join(
        &self,
        batch_key: &str,
        request: BatchRequest<B, R>,
    ) -> Result<oneshot::Receiver<BatchResult<R>>> {
        let (tx, rx) = oneshot::channel();
        let mut batches = self.batches.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(batch) = batches.get_mut(batch_key) {
            tracing::debug!(debug_id = %request.debug_id, %batch_key, "adding request to existing batch");
            let combined = batch
                .request
                .handler
                .combine(&batch.request.body, request.body)
                .map_err(|source| {
                    Error::other(BatchCombineError {
                        batch_key: batch_key.to_string(),
                        debug_id: request.debug_id.clone(),
                        source,
                    })
                })?;
            batch.request.body = combined;
            batch.listeners.push(tx);
            tracing::trace!(%batch_key, listeners = batch.listeners.len(), "added request to batch");
            return Ok(rx);
        }

        tracing::debug!(debug_id = %request.debug_id, %batch_key, "creating new batch");
        batches.insert(
            batch_key.to_string(),
            StartedBatch {
                request,
                listeners: vec![tx],
            },
        );
        tokio::spawn(send_after(
            self.batches.clone(),
            batch_key.to_string(),
            self.config.send_after,
        ));
        Ok(rx)
    }
}

/// Waits for the batch to fill up, then sends it and notifies its listeners.
async fn send_after<B, R>(batches: Batches<B, R>, batch_key: String, delay: Duration)
where
    R: Clone,
{
    tokio::time::sleep(delay).await;
    let batch = batches
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .remove(&batch_key);
    let Some(StartedBatch { request, listeners }) = batch else {
        tracing::debug!(%batch_key, "batch not found in pending batches");
        return;
    };
    tracing::debug!(%batch_key, requests = listeners.len(), "sending batch");

    let BatchRequest {
        resource_name,
        body,
        handler,
        ..
    } = request;
    let result = handler.send(&resource_name, body).await.map_err(Arc::new);
    if let Err(e) = &result {
        tracing::debug!(%batch_key, "batch returned error: {e}");
    }
    for tx in listeners {
        // The caller may have timed out, it is ok if this fails.
        let _ = tx.send(result.clone());
    }
}

/// The error returned to every caller in a batch when sending the batch fails.
///
/// The [source][std::error::Error::source] is the error returned by
/// [BatchHandler::send][crate::BatchHandler::send], shared by all the callers.
#[derive(Debug)]
pub struct BatchError {
    batch_key: String,
    debug_id: String,
    source: Arc<Error>,
}

impl BatchError {
    pub fn batch_key(&self) -> &str {
        &self.batch_key
    }

    pub fn debug_id(&self) -> &str {
        &self.debug_id
    }

    pub fn error(&self) -> &Error {
        &self.source
    }
}

impl std::fmt::Display for BatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Batch {:?} Request {:?} returned error: {}",
            self.batch_key, self.debug_id, self.source
        )
    }
}

impl std::error::Error for BatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.source.as_ref())
    }
}

/// The error returned to a caller whose request could not join a batch.
///
/// The batch itself is not affected.
#[derive(Debug, thiserror::Error)]
#[error(
    "error adding request to batch: Unable to combine request {debug_id:?} data into existing batch {batch_key:?}: {source}"
)]
pub struct BatchCombineError {
    batch_key: String,
    debug_id: String,
    #[source]
    source: Error,
}

/// The caller gave up waiting for the batch result.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
#[error("Request {batch_key} timed out after {timeout:?}")]
pub struct BatchTimeout {
    batch_key: String,
    timeout: Duration,
}
