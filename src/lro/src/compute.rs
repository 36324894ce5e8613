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

//! Compute Engine operations.
//!
//! Compute Engine uses zonal, regional, and global operations, each queried at
//! a different endpoint. The operation itself records where it lives, so the
//! waiter picks the endpoint from the operation.

use crate::{Result, Waiter, fetch, name_from_self_link};
use gax::client::ApiClient;
use gax::error::Error;
use serde::Deserialize;

const DEFAULT_BASE_PATH: &str = "https://compute.googleapis.com/compute/v1/";
const RESOURCE_NOT_READY: &str = "RESOURCE_NOT_READY";

/// A Compute Engine operation, as returned by the service.
///
/// Only the fields needed to wait for the operation are included.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
#[non_exhaustive]
pub struct Operation {
    pub name: String,
    pub status: String,
    pub status_message: String,
    /// The full URL of the zone, for zonal operations.
    pub zone: String,
    /// The full URL of the region, for regional operations.
    pub region: String,
    pub self_link: String,
    pub target_link: String,
    pub operation_type: String,
    pub progress: i32,
    pub error: Option<OperationError>,
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

    pub fn set_zone<V: Into<String>>(mut self, v: V) -> Self {
        self.zone = v.into();
        self
    }

    pub fn set_region<V: Into<String>>(mut self, v: V) -> Self {
        self.region = v.into();
        self
    }

    pub fn set_error(mut self, v: OperationError) -> Self {
        self.error = Some(v);
        self
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
#[non_exhaustive]
pub struct OperationError {
    pub errors: Vec<OperationErrorItem>,
}

impl OperationError {
    pub fn new<T: IntoIterator<Item = OperationErrorItem>>(errors: T) -> Self {
        Self {
            errors: errors.into_iter().collect(),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
#[non_exhaustive]
pub struct OperationErrorItem {
    pub code: String,
    pub message: String,
    pub location: String,
    pub error_details: Vec<ErrorDetail>,
}

impl OperationErrorItem {
    pub fn new<C: Into<String>, M: Into<String>>(code: C, message: M) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn add_detail(mut self, v: ErrorDetail) -> Self {
        self.error_details.push(v);
        self
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
#[non_exhaustive]
pub struct ErrorDetail {
    pub localized_message: Option<LocalizedMessage>,
    pub help: Option<Help>,
    pub error_info: Option<serde_json::Value>,
    pub quota_info: Option<serde_json::Value>,
}

impl ErrorDetail {
    pub fn with_localized_message<V: Into<String>>(mut self, locale: &str, message: V) -> Self {
        self.localized_message = Some(LocalizedMessage {
            locale: locale.to_string(),
            message: message.into(),
        });
        self
    }

    pub fn with_links<T: IntoIterator<Item = HelpLink>>(mut self, links: T) -> Self {
        self.help = Some(Help {
            links: links.into_iter().collect(),
        });
        self
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
#[non_exhaustive]
pub struct LocalizedMessage {
    pub locale: String,
    pub message: String,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
#[non_exhaustive]
pub struct Help {
    pub links: Vec<HelpLink>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
#[non_exhaustive]
pub struct HelpLink {
    pub description: String,
    pub url: String,
}

impl HelpLink {
    pub fn new<D: Into<String>, U: Into<String>>(description: D, url: U) -> Self {
        Self {
            description: description.into(),
            url: url.into(),
        }
    }
}

/// The error embedded in a failed Compute Engine operation.
///
/// Each error item is rendered with its message, then the first localized
/// message and the first help link found in its details, if any.
#[derive(Clone, Debug, PartialEq)]
pub struct ComputeOperationError(pub OperationError);

impl ComputeOperationError {
    pub fn errors(&self) -> &[OperationErrorItem] {
        &self.0.errors
    }
}

impl std::fmt::Display for ComputeOperationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for item in &self.0.errors {
            write_error_item(f, item)?;
        }
        Ok(())
    }
}

impl std::error::Error for ComputeOperationError {}

fn write_error_item(f: &mut std::fmt::Formatter<'_>, item: &OperationErrorItem) -> std::fmt::Result {
    writeln!(f, "{}", item.message)?;

    let mut localized = None;
    let mut link = None;
    for detail in &item.error_details {
        if localized.is_none() {
            localized = detail.localized_message.as_ref();
        }
        if link.is_none() {
            link = detail.help.as_ref().and_then(|h| h.links.first());
        }
        if localized.is_some() && link.is_some() {
            break;
        }
    }

    if let Some(m) = localized.filter(|m| !m.message.is_empty()) {
        writeln!(f, "error details: {}", m.message)?;
    }
    if let Some(link) = link {
        if !link.description.is_empty() {
            writeln!(f, "help: {}", link.description)?;
        }
        if !link.url.is_empty() {
            writeln!(f, "{}", link.url)?;
        }
    }
    Ok(())
}

/// Waits for Compute Engine operations.
#[derive(Clone, Debug)]
pub struct ComputeOperationWaiter {
    client: ApiClient,
    base_path: String,
    project: String,
    parent: Option<String>,
    op: Operation,
}

impl ComputeOperationWaiter {
    /// Creates a waiter for `op`, an operation in `project`.
    ///
    /// Fails if the operation has no name.
    pub fn new<P: Into<String>>(client: ApiClient, project: P, op: Operation) -> Result<Self> {
        let mut waiter = Self {
            client,
            base_path: DEFAULT_BASE_PATH.to_string(),
            project: project.into(),
            parent: None,
            op: Operation::default(),
        };
        waiter.set_op(op)?;
        Ok(waiter)
    }

    /// Overrides the service endpoint, e.g. to use the beta API.
    pub fn with_base_path<V: Into<String>>(mut self, v: V) -> Self {
        self.base_path = v.into();
        self
    }

    /// Queries organization operations, used by hierarchical firewall and
    /// security policies, instead of global project operations.
    pub fn with_parent<V: Into<String>>(mut self, v: V) -> Self {
        self.parent = Some(v.into());
        self
    }

    pub fn operation(&self) -> &Operation {
        &self.op
    }

    fn operation_url(&self) -> Result<String> {
        let name = &self.op.name;
        if !self.op.zone.is_empty() {
            let zone = location(&self.op.zone)?;
            return Ok(format!(
                "{}projects/{}/zones/{zone}/operations/{name}",
                self.base_path, self.project
            ));
        }
        if !self.op.region.is_empty() {
            let region = location(&self.op.region)?;
            return Ok(format!(
                "{}projects/{}/regions/{region}/operations/{name}",
                self.base_path, self.project
            ));
        }
        if let Some(parent) = &self.parent {
            return Ok(format!(
                "{}locations/global/operations/{name}?parentId={parent}",
                self.base_path
            ));
        }
        Ok(format!(
            "{}projects/{}/global/operations/{name}",
            self.base_path, self.project
        ))
    }
}

fn location(link: &str) -> Result<&str> {
    match name_from_self_link(link) {
        "" => Err(Error::binding(format!(
            "cannot parse the operation location from {link:?}"
        ))),
        name => Ok(name),
    }
}

#[async_trait::async_trait]
impl Waiter for ComputeOperationWaiter {
    type Operation = Operation;

    fn state(&self) -> String {
        self.op.status.clone()
    }

    fn error(&self) -> Option<Error> {
        self.op
            .error
            .as_ref()
            .map(|e| Error::operation(ComputeOperationError(e.clone())))
    }

    fn is_retryable(&self, error: &Error) -> bool {
        use std::error::Error as _;
        error
            .source()
            .and_then(|e| e.downcast_ref::<ComputeOperationError>())
            .is_some_and(|e| e.errors().iter().any(|i| i.code == RESOURCE_NOT_READY))
    }

    fn set_op(&mut self, op: Operation) -> Result<()> {
        if op.name.is_empty() {
            return Err(Error::binding("the Compute operation has no name"));
        }
        self.op = op;
        Ok(())
    }

    async fn query_op(&self) -> Result<Operation> {
        let url = self.operation_url()?;
        fetch(&self.client, url, Some(&self.project)).await
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
