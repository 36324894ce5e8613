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

//! Retry and polling helpers for the Terraform Google provider.
//!
//! This crate contains the pieces shared by every resource implementation:
//! the error type, the classifier that decides which errors are transient,
//! the state-change and bounded-retry polling loops, and an HTTP transport
//! that retries transient failures until a deadline.
//!
//! The per-API long-running operation waiters live in `tpg-lro`, and the
//! request batcher lives in `tpg-batcher`.

/// An alias of [std::result::Result] where the error is always [crate::error::Error].
///
/// This is the result type used by all functions that make requests or wait
/// on them.
pub type Result<T> = std::result::Result<T, crate::error::Error>;

/// The core error types.
pub mod error;

pub mod backoff;

/// Classifies errors as transient or permanent.
pub mod retry_predicates;

pub mod polling;
pub mod state_change;

pub mod client;
pub mod options;
pub mod transport;
