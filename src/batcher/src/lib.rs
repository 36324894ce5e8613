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

//! Coalesces concurrent requests into a single call.
//!
//! Some APIs accept a single request to change many sub-resources, e.g.
//! enabling many services in a project, or updating the IAM policy of a
//! resource. When several resources make such changes concurrently, it is
//! faster (and uses less quota) to combine them into one request.
//!
//! A [RequestBatcher] groups requests by batch type and resource name. The
//! first request for a group starts a timer, requests arriving before the timer
//! fires are combined into the first one, and when the timer fires the
//! combined request is sent once. Every caller receives the same result.
//!
//! The behavior of each batch type (how to combine bodies, how to send them) is
//! defined by a [BatchHandler].

pub use gax::Result;

mod batcher;
pub mod options;
mod request;

pub use batcher::{BatchCombineError, BatchError, BatchTimeout, RequestBatcher};
pub use options::BatchingConfig;
pub use request::{BatchHandler, BatchRequest};
