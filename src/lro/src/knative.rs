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

//! Waits for Knative-style resources, as used by Cloud Run (v1).
//!
//! These resources have no operations. Instead the service reports the
//! generation it has reconciled, and a `Ready` condition. The check in this
//! module is used with [polling_wait_time][gax::polling::polling_wait_time]:
//!
//! ```no_run
//! # use gax::client::JsonObject;
//! # use gax::polling::polling_wait_time;
//! # use tpg_lro::knative::poll_check_knative_status;
//! # use std::time::Duration;
//! async fn wait(created: JsonObject, read: impl AsyncFnMut() -> gax::Result<JsonObject>) -> gax::Result<()> {
//!     let check = poll_check_knative_status(&created)?;
//!     polling_wait_time(read, check, "Creating Service", Duration::from_secs(600), 1).await
//! }
//! ```

use gax::Result;
use gax::client::JsonObject;
use gax::error::Error;
use gax::polling::PollResult;
use serde::Deserialize;

const READY: &str = "Ready";
const CERTIFICATE_PENDING: &str = "CertificatePending";

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
struct KnativeResource {
    metadata: Metadata,
    status: KnativeStatus,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
struct Metadata {
    generation: i64,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
struct KnativeStatus {
    observed_generation: i64,
    conditions: Vec<Condition>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
struct Condition {
    #[serde(rename = "type")]
    kind: String,
    status: String,
    reason: String,
    message: String,
}

fn decode(object: &JsonObject) -> Result<KnativeResource> {
    serde_json::from_value(serde_json::Value::Object(object.clone())).map_err(Error::deser)
}

/// Returns a check that succeeds once the resource is ready.
///
/// `desired` is the resource as returned by the create or update call, its
/// generation is the one the service must reconcile. The returned check:
/// - is pending until the observed generation matches the desired one,
/// - succeeds when the `Ready` condition is `True`,
/// - also succeeds when `Ready` is `Unknown` only because a certificate is
///   pending, which domain mappings may stay in for a long time,
/// - fails when `Ready` is `False`,
/// - is pending otherwise.
pub fn poll_check_knative_status(
    desired: &JsonObject,
) -> Result<impl FnMut(Result<JsonObject>) -> PollResult + use<>> {
    let generation = decode(desired)?.metadata.generation;
    Ok(move |response: Result<JsonObject>| check(generation, response))
}

fn check(generation: i64, response: Result<JsonObject>) -> PollResult {
    let resource = match response.and_then(|r| decode(&r)) {
        Ok(r) => r,
        Err(e) => return PollResult::Fatal(e),
    };
    let status = resource.status;
    if status.observed_generation != generation {
        return PollResult::pending(format!(
            "waiting for observed generation {} to match desired generation {generation}",
            status.observed_generation
        ));
    }
    let Some(ready) = status.conditions.iter().find(|c| c.kind == READY) else {
        return PollResult::pending("no status yet");
    };
    tracing::debug!(status = %ready.status, message = %ready.message, "checking Knative Ready condition");
    match ready.status.as_str() {
        "True" => PollResult::Success,
        "Unknown" if ready.reason == CERTIFICATE_PENDING => PollResult::Success,
        "False" => PollResult::Fatal(Error::operation(format!(
            r#"resource is in failed state "Ready:False", message: {}"#,
            ready.message
        ))),
        s => PollResult::pending(format!("{s}:{}", ready.message)),
    }
}
