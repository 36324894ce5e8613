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

//! Errors and error details returned by Google Cloud services and the
//! polling machinery.
//!
//! We distinguish between errors detected while trying to send a request
//! (e.g. cannot open a connection), errors returned by the service itself,
//! errors embedded in a completed long-running operation, and errors
//! generated locally, such as timeouts while waiting for some state.
//!
//! # Examples
//!
//! ```
//! use tpg_gax::error::Error;
//! fn handle_error(e: Error) {
//!     if let Some(status) = e.status() {
//!         println!("{} {status:?}", status.code)
//!     }
//! }
//! ```

mod api_status;
mod core_error;
pub use api_status::*;
pub use core_error::*;
pub(crate) use core_error::BoxError;
