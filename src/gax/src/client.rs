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

//! A JSON client for Google Cloud REST APIs.
//!
//! [ApiClient] attaches the authentication and billing headers to each
//! request, sends it through the [RetryTransport], and decodes the JSON
//! response. Operation waiters use it to issue their status checks.

use crate::Result;
use crate::error::Error;
use crate::options::RequestOptions;
use crate::transport::RetryTransport;
use std::sync::Arc;
use std::time::Duration;

/// A JSON object, as returned by most Google Cloud REST APIs.
pub type JsonObject = serde_json::Map<String, serde_json::Value>;

/// The timeout for requests that do not set their own.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Disables the billing project override for a single request.
pub const NO_BILLING_PROJECT_OVERRIDE: &str = "NO_BILLING_PROJECT_OVERRIDE";

const USER_PROJECT_HEADER: &str = "x-goog-user-project";

/// Provides OAuth2 access tokens for requests.
///
/// Obtaining credentials is outside the scope of this crate. Applications
/// implement this trait on top of their credentials library of choice.
#[async_trait::async_trait]
pub trait TokenProvider: Send + Sync + std::fmt::Debug {
    async fn token(&self) -> Result<String>;
}

/// A [TokenProvider] that always returns the same token.
///
/// Useful in tests and with short-lived tokens obtained out of band.
#[derive(Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new<T: Into<String>>(token: T) -> Self {
        Self(token.into())
    }
}

impl std::fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("StaticToken").field(&"[censored]").finish()
    }
}

#[async_trait::async_trait]
impl TokenProvider for StaticToken {
    async fn token(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

/// The parameters for [ApiClient::send_request].
#[derive(Clone, Debug)]
pub struct SendRequestOptions {
    method: reqwest::Method,
    url: String,
    project: Option<String>,
    body: Option<serde_json::Value>,
    options: RequestOptions,
}

impl SendRequestOptions {
    pub fn new<U: Into<String>>(method: reqwest::Method, url: U) -> Self {
        Self {
            method,
            url: url.into(),
            project: None,
            body: None,
            options: RequestOptions::new(),
        }
    }

    /// The billing project, used when the client overrides the user project.
    pub fn set_project<V: Into<String>>(mut self, v: V) -> Self {
        self.project = Some(v.into());
        self
    }

    pub fn set_body<V: Into<serde_json::Value>>(mut self, v: V) -> Self {
        self.body = Some(v.into());
        self
    }

    pub fn set_request_options(mut self, v: RequestOptions) -> Self {
        self.options = v;
        self
    }
}

/// Sends authenticated JSON requests to Google Cloud REST APIs.
#[derive(Clone, Debug)]
pub struct ApiClient {
    transport: RetryTransport,
    token_provider: Arc<dyn TokenProvider>,
    user_agent: String,
    user_project_override: bool,
}

impl ApiClient {
    pub fn new<T>(transport: RetryTransport, token_provider: T) -> Self
    where
        T: TokenProvider + 'static,
    {
        Self {
            transport,
            token_provider: Arc::new(token_provider),
            user_agent: concat!("tpg-gax/", env!("CARGO_PKG_VERSION")).to_string(),
            user_project_override: false,
        }
    }

    pub fn with_user_agent<V: Into<String>>(mut self, v: V) -> Self {
        self.user_agent = v.into();
        self
    }

    /// Bills requests to the project in [SendRequestOptions::set_project].
    pub fn with_user_project_override(mut self, v: bool) -> Self {
        self.user_project_override = v;
        self
    }

    /// Sends a request and returns the decoded JSON object.
    ///
    /// Returns `Ok(None)` for `204 No Content` responses.
    pub async fn send_request(&self, request: SendRequestOptions) -> Result<Option<JsonObject>> {
        let response = self.send(request).await?;
        if response.status() == http::StatusCode::NO_CONTENT || response.body().is_empty() {
            return Ok(None);
        }
        serde_json::from_slice::<JsonObject>(response.body())
            .map(Some)
            .map_err(Error::deser)
    }

    /// Sends a `GET` request and decodes the response into `T`.
    pub async fn get<T>(&self, url: &str, options: RequestOptions) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        let request =
            SendRequestOptions::new(reqwest::Method::GET, url).set_request_options(options);
        let response = self.send(request).await?;
        serde_json::from_slice::<T>(response.body()).map_err(Error::deser)
    }

    async fn send(&self, request: SendRequestOptions) -> Result<http::Response<bytes::Bytes>> {
        let token = self.token_provider.token().await?;
        let mut builder = self
            .transport
            .client()
            .request(request.method, &request.url)
            .query(&[("alt", "json")])
            .bearer_auth(token)
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        match request.project.as_deref() {
            Some(project) if self.user_project_override && !project.is_empty() => {
                let value = if project == NO_BILLING_PROJECT_OVERRIDE {
                    ""
                } else {
                    project
                };
                builder = builder.header(USER_PROJECT_HEADER, value);
            }
            _ => {}
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        let http_request = builder.build().map_err(Error::binding)?;
        let options = match request.options.timeout() {
            Some(_) => request.options,
            None => request.options.set_timeout(DEFAULT_REQUEST_TIMEOUT),
        };
        tracing::trace!(url = %request.url, "sending request");
        self.transport.execute(http_request, options).await
    }
}
