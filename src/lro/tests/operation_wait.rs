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

//! Drives the waiters against a fake service. The fake returns a sequence of
//! operation states, specific to each test.

#[cfg(test)]
mod tests {
    use gax::client::{ApiClient, StaticToken};
    use gax::backoff::ConstantBackoff;
    use gax::options::RetryTransportConfig;
    use gax::transport::RetryTransport;
    use httptest::{Expectation, Server, matchers::*, responders::*};
    use serde_json::json;
    use std::time::Duration;
    use tpg_lro::common::{CommonApi, CommonOperationWaiter};
    use tpg_lro::compute::{ComputeOperationWaiter, Operation};
    use tpg_lro::container::ContainerOperationWaiter;
    use tpg_lro::operation_wait;

    type Result<T> = anyhow::Result<T>;

    const TIMEOUT: Duration = Duration::from_secs(30);
    const POLL_INTERVAL: Duration = Duration::from_millis(10);
    const ZONE: &str = "https://www.googleapis.com/compute/v1/projects/p/zones/us-central1-a";

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn compute_zonal_done() -> Result<()> {
        let path = "/compute/v1/projects/p/zones/us-central1-a/operations/op-1";
        let server = Server::run();
        server.expect(
            Expectation::matching(all_of![
                request::method_path("GET", path),
                request::headers(contains(("authorization", "Bearer test-token"))),
            ])
            .times(3)
            .respond_with(cycle![
                json_encoded(json!({"name": "op-1", "status": "RUNNING", "zone": ZONE})),
                status_code(404).body("not found yet"),
                json_encoded(json!({"name": "op-1", "status": "DONE", "zone": ZONE})),
            ]),
        );

        let op = serde_json::from_value::<Operation>(json!({
            "name": "op-1",
            "status": "PENDING",
            "zone": ZONE,
        }))?;
        let mut waiter = ComputeOperationWaiter::new(test_client(), "p", op)?
            .with_base_path(server.url_str("/compute/v1/"));
        operation_wait(&mut waiter, "Creating Instance", TIMEOUT, POLL_INTERVAL).await?;
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn compute_operation_error() -> Result<()> {
        let path = "/compute/v1/projects/p/global/operations/op-2";
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", path)).respond_with(json_encoded(
                json!({
                    "name": "op-2",
                    "status": "DONE",
                    "error": {"errors": [{
                        "code": "QUOTA_EXCEEDED",
                        "message": "Quota 'CPUS' exceeded.",
                        "errorDetails": [{
                            "localizedMessage": {"locale": "en-US", "message": "Request a higher quota."},
                            "help": {"links": [{"description": "Quotas", "url": "https://cloud.google.com/compute/quotas"}]},
                        }],
                    }]},
                }),
            )),
        );

        let op = serde_json::from_value::<Operation>(json!({"name": "op-2", "status": "RUNNING"}))?;
        let mut waiter = ComputeOperationWaiter::new(test_client(), "p", op)?
            .with_base_path(server.url_str("/compute/v1/"));
        let err = operation_wait(&mut waiter, "Creating Network", TIMEOUT, POLL_INTERVAL)
            .await
            .expect_err("the operation failed");
        assert!(err.is_operation(), "{err:?}");
        let msg = err.to_string();
        for want in [
            "Quota 'CPUS' exceeded.",
            "Request a higher quota.",
            "Quotas",
            "https://cloud.google.com/compute/quotas",
        ] {
            assert!(msg.contains(want), "{want} in {msg}");
        }
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn container_progress_message_is_not_an_error() -> Result<()> {
        let path = "/v1/projects/p/locations/us-central1/operations/op-4";
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", path))
                .times(2)
                .respond_with(cycle![
                    json_encoded(json!({
                        "name": "op-4",
                        "status": "RUNNING",
                        "statusMessage": "Creating node pool",
                    })),
                    json_encoded(json!({"name": "op-4", "status": "DONE"})),
                ]),
        );

        let op = serde_json::from_value(json!({"name": "op-4", "status": "PENDING"}))?;
        let mut waiter = ContainerOperationWaiter::new(test_client(), "p", "us-central1", op)?
            .with_base_path(server.url_str("/v1/"));
        operation_wait(&mut waiter, "Creating Cluster", TIMEOUT, POLL_INTERVAL).await?;
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn container_permanent_query_error() -> Result<()> {
        let path = "/v1/projects/p/locations/us-central1/operations/op-3";
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", path)).respond_with(
                status_code(403)
                    .insert_header("Content-Type", "application/json")
                    .body(
                        json!({"error": {"code": 403, "message": "permission denied"}})
                            .to_string(),
                    ),
            ),
        );

        let op = serde_json::from_value(json!({"name": "op-3", "status": "RUNNING"}))?;
        let mut waiter = ContainerOperationWaiter::new(test_client(), "p", "us-central1", op)?
            .with_base_path(server.url_str("/v1/"));
        let err = operation_wait(&mut waiter, "Creating Cluster", TIMEOUT, POLL_INTERVAL)
            .await
            .expect_err("403 is not retryable");
        assert_eq!(err.http_status_code(), Some(403), "{err:?}");
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn common_done_with_error() -> Result<()> {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/v1/operations/acf.1"))
                .times(2)
                .respond_with(cycle![
                    json_encoded(json!({"name": "operations/acf.1"})),
                    json_encoded(json!({
                        "name": "operations/acf.1",
                        "done": true,
                        "error": {"code": 7, "message": "The caller does not have permission"},
                    })),
                ]),
        );

        let op = serde_json::from_value(json!({"name": "operations/acf.1", "done": false}))?;
        let mut waiter = CommonOperationWaiter::new(test_client(), CommonApi::ServiceUsage, op)?
            .with_base_path(server.url_str("/v1/"));
        let err = operation_wait(&mut waiter, "Enabling Service", TIMEOUT, POLL_INTERVAL)
            .await
            .expect_err("the operation failed");
        assert_eq!(
            err.to_string(),
            "Error code 7, message: The caller does not have permission"
        );
        Ok(())
    }

    fn test_client() -> ApiClient {
        let config = RetryTransportConfig::new()
            .set_default_timeout(Duration::from_secs(5))
            .set_backoff(ConstantBackoff(Duration::from_millis(1)));
        let transport = RetryTransport::new(reqwest::Client::new(), config);
        ApiClient::new(transport, StaticToken::new("test-token"))
    }
}
