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

//! Waits for a resource to reach a target state.
//!
//! [StateChangeConf] repeatedly calls a refresh function, which returns the
//! current state of some resource, until:
//! - the state is one of the target states, for the configured number of
//!   consecutive refreshes, or
//! - the state is neither pending nor target (an unexpected state), or
//! - the resource was not found too many times in a row, or
//! - the refresh function returns an error, or
//! - the timeout expires.
//!
//! Between refreshes the loop waits, starting at 100ms and doubling while the
//! target has not been observed. The wait is bounded by the minimum timeout
//! and 10 seconds, unless a fixed poll interval is configured.

use crate::Result;
use crate::error::Error;
use std::time::Duration;

const INITIAL_WAIT: Duration = Duration::from_millis(100);
const MAXIMUM_WAIT: Duration = Duration::from_secs(10);
const MAXIMUM_POLL_INTERVAL: Duration = Duration::from_secs(180);
const DEFAULT_NOT_FOUND_CHECKS: u32 = 20;

/// The wait for a target state did not complete in time.
#[derive(Debug)]
pub struct TimeoutError {
    pub last_state: String,
    pub expected: Vec<String>,
    pub timeout: Duration,
}

impl std::fmt::Display for TimeoutError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.expected.is_empty() {
            write!(f, "timeout while waiting for resource to be gone")?;
        } else {
            write!(
                f,
                "timeout while waiting for state to become '{}'",
                self.expected.join(", ")
            )?;
        }
        let mut extra = Vec::new();
        if !self.last_state.is_empty() {
            extra.push(format!("last state: '{}'", self.last_state));
        }
        if !self.timeout.is_zero() {
            extra.push(format!("timeout: {:?}", self.timeout));
        }
        if !extra.is_empty() {
            write!(f, " ({})", extra.join(", "))?;
        }
        Ok(())
    }
}

impl std::error::Error for TimeoutError {}

/// The resource reached a state that is neither pending nor target.
#[derive(Debug, thiserror::Error)]
#[error("unexpected state '{state}', wanted target '{}'", .expected.join(", "))]
pub struct UnexpectedStateError {
    pub state: String,
    pub expected: Vec<String>,
}

/// The resource was not found too many times in a row.
#[derive(Debug, thiserror::Error)]
#[error("couldn't find resource ({retries} retries)")]
pub struct NotFoundError {
    pub retries: u32,
}

/// Configures a wait for a target state.
///
/// # Example
/// ```
/// # use tpg_gax::state_change::StateChangeConf;
/// use std::time::Duration;
/// # tokio_test::block_on(async {
/// let conf = StateChangeConf::new(["PENDING", "RUNNING"], ["DONE"], Duration::from_secs(60));
/// let mut states = vec!["DONE", "RUNNING", "PENDING"];
/// let got = conf
///     .wait_for_state(async || {
///         let state = states.pop().unwrap_or("DONE");
///         Ok(Some((state.len(), state.to_string())))
///     })
///     .await?;
/// assert_eq!(got, Some(4));
/// # tpg_gax::Result::<()>::Ok(()) });
/// ```
#[derive(Clone, Debug)]
pub struct StateChangeConf {
    pending: Vec<String>,
    target: Vec<String>,
    timeout: Duration,
    delay: Duration,
    min_timeout: Duration,
    poll_interval: Duration,
    not_found_checks: u32,
    continuous_target_occurrence: u32,
}

impl StateChangeConf {
    /// Creates a configuration to wait up to `timeout` for any of the `target`
    /// states, tolerating any of the `pending` states in the meantime.
    ///
    /// An empty `target` waits for the resource to be gone, that is, for the
    /// refresh function to return `Ok(None)`.
    pub fn new<P, T, S1, S2>(pending: P, target: T, timeout: Duration) -> Self
    where
        P: IntoIterator<Item = S1>,
        T: IntoIterator<Item = S2>,
        S1: Into<String>,
        S2: Into<String>,
    {
        Self {
            pending: pending.into_iter().map(Into::into).collect(),
            target: target.into_iter().map(Into::into).collect(),
            timeout,
            delay: Duration::ZERO,
            min_timeout: Duration::ZERO,
            poll_interval: Duration::ZERO,
            not_found_checks: DEFAULT_NOT_FOUND_CHECKS,
            continuous_target_occurrence: 1,
        }
    }

    /// The wait before the first refresh.
    pub fn with_delay(mut self, v: Duration) -> Self {
        self.delay = v;
        self
    }

    /// The lower bound for the wait between refreshes.
    pub fn with_min_timeout(mut self, v: Duration) -> Self {
        self.min_timeout = v;
        self
    }

    /// A fixed wait between refreshes, only used if it is in `(0, 180s)`.
    pub fn with_poll_interval(mut self, v: Duration) -> Self {
        self.poll_interval = v;
        self
    }

    /// The number of consecutive "not found" results tolerated.
    pub fn with_not_found_checks(mut self, v: u32) -> Self {
        self.not_found_checks = v;
        self
    }

    /// The number of consecutive target states required to finish.
    ///
    /// Values below 1 are treated as 1.
    pub fn with_continuous_target_occurrence(mut self, v: u32) -> Self {
        self.continuous_target_occurrence = v.max(1);
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Runs the refresh loop.
    ///
    /// The refresh function returns `Ok(Some((value, state)))` when it finds
    /// the resource, `Ok(None)` when it does not, and `Err(_)` to stop the
    /// loop. Errors from the refresh function are returned unchanged.
    ///
    /// On success, returns the value from the last refresh.
    pub async fn wait_for_state<T, F>(&self, mut refresh: F) -> Result<Option<T>>
    where
        F: AsyncFnMut() -> Result<Option<(T, String)>>,
    {
        let deadline = tokio::time::sleep(self.timeout);
        tokio::pin!(deadline);
        let mut last_state = String::new();

        if !self.delay.is_zero() {
            tokio::select! {
                _ = &mut deadline => return Err(self.timeout_error(last_state)),
                _ = tokio::time::sleep(self.delay) => {},
            }
        }

        let mut wait = INITIAL_WAIT;
        let mut not_found_tick = 0_u32;
        let mut target_occurrence = 0_u32;
        loop {
            let refreshed = tokio::select! {
                _ = &mut deadline => return Err(self.timeout_error(last_state)),
                r = refresh() => r?,
            };
            match refreshed {
                None if self.target.is_empty() => {
                    target_occurrence += 1;
                    if target_occurrence >= self.continuous_target_occurrence {
                        return Ok(None);
                    }
                }
                None => {
                    not_found_tick += 1;
                    if not_found_tick > self.not_found_checks {
                        return Err(Error::exhausted(NotFoundError {
                            retries: not_found_tick,
                        }));
                    }
                }
                Some((value, state)) => {
                    not_found_tick = 0;
                    if self.target.contains(&state) {
                        target_occurrence += 1;
                        if target_occurrence >= self.continuous_target_occurrence {
                            return Ok(Some(value));
                        }
                    } else if self.pending.contains(&state) {
                        target_occurrence = 0;
                    } else if !self.pending.is_empty() {
                        return Err(Error::other(UnexpectedStateError {
                            state,
                            expected: self.target.clone(),
                        }));
                    }
                    last_state = state;
                }
            }

            wait = self.next_wait(wait, target_occurrence);
            tracing::trace!(?wait, state = %last_state, "waiting before next refresh");
            tokio::select! {
                _ = &mut deadline => return Err(self.timeout_error(last_state)),
                _ = tokio::time::sleep(wait) => {},
            }
        }
    }

    fn next_wait(&self, wait: Duration, target_occurrence: u32) -> Duration {
        // No backoff while waiting for the target state to reoccur.
        let wait = if target_occurrence == 0 {
            wait.saturating_mul(2)
        } else {
            wait
        };
        if !self.poll_interval.is_zero() && self.poll_interval < MAXIMUM_POLL_INTERVAL {
            return self.poll_interval;
        }
        if wait < self.min_timeout {
            self.min_timeout
        } else if wait > MAXIMUM_WAIT {
            MAXIMUM_WAIT
        } else {
            wait
        }
    }

    fn timeout_error(&self, last_state: String) -> Error {
        Error::timeout(TimeoutError {
            last_state,
            expected: self.target.clone(),
            timeout: self.timeout,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;
    use test_case::test_case;

    fn conf() -> StateChangeConf {
        StateChangeConf::new(["PENDING", "RUNNING"], ["DONE"], Duration::from_secs(60))
    }

    #[tokio::test(start_paused = true)]
    async fn reaches_target() -> anyhow::Result<()> {
        let mut states = vec!["DONE", "RUNNING", "RUNNING", "PENDING"];
        let mut calls = 0;
        let got = conf()
            .wait_for_state(async || {
                calls += 1;
                let state = states.pop().expect("called after the target state");
                Ok(Some((calls, state.to_string())))
            })
            .await?;
        assert_eq!(got, Some(4));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn unexpected_state() {
        let got = conf()
            .wait_for_state(async || Ok(Some(((), "FAILED".to_string()))))
            .await;
        let err = got.expect_err("FAILED is not an expected state");
        let source = err
            .source()
            .and_then(|e| e.downcast_ref::<UnexpectedStateError>());
        assert!(
            matches!(source, Some(UnexpectedStateError { state, .. }) if state == "FAILED"),
            "{err:?}"
        );
        assert_eq!(
            err.to_string(),
            "unexpected state 'FAILED', wanted target 'DONE'"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn unexpected_state_without_pending_is_ignored() -> anyhow::Result<()> {
        let conf = StateChangeConf::new(Vec::<String>::new(), ["DONE"], Duration::from_secs(60));
        let mut states = vec!["DONE", "SOMETHING"];
        let got = conf
            .wait_for_state(async || Ok(Some(((), states.pop().unwrap_or("DONE").to_string()))))
            .await?;
        assert_eq!(got, Some(()));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_error_is_returned_unchanged() {
        let got: Result<Option<()>> = conf()
            .wait_for_state(async || Err(Error::http(400, http::HeaderMap::new(), "bad".into())))
            .await;
        let err = got.expect_err("refresh errors stop the loop");
        assert_eq!(err.http_status_code(), Some(400), "{err:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_names_last_state() {
        let conf = StateChangeConf::new(["RUNNING"], ["DONE"], Duration::from_secs(30));
        let got = conf
            .wait_for_state(async || Ok(Some(((), "RUNNING".to_string()))))
            .await;
        let err = got.expect_err("never reaches DONE");
        assert!(err.is_timeout(), "{err:?}");
        assert_eq!(
            err.to_string(),
            "timeout while waiting for state to become 'DONE' (last state: 'RUNNING', timeout: 30s)"
        );
        assert!(
            !crate::retry_predicates::is_retryable_error(&err, &[]),
            "{err:?}"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn not_found_checks() {
        let mut calls = 0;
        let got: Result<Option<()>> = conf()
            .with_not_found_checks(3)
            .wait_for_state(async || {
                calls += 1;
                Ok(None)
            })
            .await;
        let err = got.expect_err("never found");
        assert!(err.is_exhausted(), "{err:?}");
        assert_eq!(calls, 4);
        assert_eq!(err.to_string(), "couldn't find resource (4 retries)");
    }

    #[tokio::test(start_paused = true)]
    async fn not_found_counter_resets() -> anyhow::Result<()> {
        let mut results = vec![
            Some("DONE"),
            None,
            None,
            Some("RUNNING"),
            None,
            None,
        ];
        let got = conf()
            .with_not_found_checks(2)
            .wait_for_state(async || {
                let r = results.pop().expect("called after the target state");
                Ok(r.map(|s| ((), s.to_string())))
            })
            .await?;
        assert_eq!(got, Some(()));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn waits_for_absence() -> anyhow::Result<()> {
        let conf = StateChangeConf::new(["EXISTS"], Vec::<String>::new(), Duration::from_secs(60));
        let mut results = vec![None, Some("EXISTS"), Some("EXISTS")];
        let got = conf
            .wait_for_state(async || Ok(results.pop().flatten().map(|s| ((), s.to_string()))))
            .await?;
        assert_eq!(got, None);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn continuous_target_occurrence_resets() -> anyhow::Result<()> {
        let mut states = vec!["DONE", "DONE", "RUNNING", "DONE"];
        let mut calls = 0;
        conf()
            .with_continuous_target_occurrence(2)
            .wait_for_state(async || {
                calls += 1;
                Ok(Some(((), states.pop().expect("too many calls").to_string())))
            })
            .await?;
        assert_eq!(calls, 4);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn delay_before_first_refresh() -> anyhow::Result<()> {
        let start = tokio::time::Instant::now();
        let mut first = None;
        conf()
            .with_delay(Duration::from_secs(5))
            .wait_for_state(async || {
                first.get_or_insert(tokio::time::Instant::now());
                Ok(Some(((), "DONE".to_string())))
            })
            .await?;
        let first = first.expect("refresh was called");
        assert_eq!(first - start, Duration::from_secs(5));
        Ok(())
    }

    #[test_case(Duration::from_millis(100), 0, Duration::ZERO, Duration::ZERO, Duration::from_millis(200))]
    #[test_case(Duration::from_millis(100), 1, Duration::ZERO, Duration::ZERO, Duration::from_millis(100))]
    #[test_case(Duration::from_millis(100), 0, Duration::from_secs(2), Duration::ZERO, Duration::from_secs(2))]
    #[test_case(Duration::from_secs(8), 0, Duration::ZERO, Duration::ZERO, Duration::from_secs(10))]
    #[test_case(Duration::from_millis(100), 0, Duration::from_secs(2), Duration::from_secs(30), Duration::from_secs(30))]
    #[test_case(Duration::from_millis(100), 0, Duration::ZERO, Duration::from_secs(180), Duration::from_millis(200))]
    fn next_wait(
        wait: Duration,
        occurrence: u32,
        min_timeout: Duration,
        poll_interval: Duration,
        want: Duration,
    ) {
        let conf = conf()
            .with_min_timeout(min_timeout)
            .with_poll_interval(poll_interval);
        assert_eq!(conf.next_wait(wait, occurrence), want);
    }
}
