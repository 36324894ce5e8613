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

use std::time::Duration;

/// The default time between the first request in a batch and sending it.
pub const DEFAULT_SEND_AFTER: Duration = Duration::from_secs(10);

/// Options for configuring the batching behavior.
///
/// These are exposed in the provider configuration as:
/// ```hcl
/// batching {
///   send_after      = "10s"
///   enable_batching = true
/// }
/// ```
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub struct BatchingConfig {
    pub send_after: Duration,
    pub disable_batching: bool,
}

impl BatchingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the [BatchingConfig][Self::send_after] field.
    ///
    /// # Example
    /// ```
    /// # use tpg_batcher::BatchingConfig;
    /// use std::time::Duration;
    /// let config = BatchingConfig::new().set_send_after(Duration::from_secs(3));
    /// ```
    pub fn set_send_after<V: Into<Duration>>(mut self, v: V) -> Self {
        self.send_after = v.into();
        self
    }

    /// Set the [BatchingConfig][Self::disable_batching] field.
    ///
    /// With batching disabled each request is sent as soon as it is made.
    pub fn set_disable_batching(mut self, v: bool) -> Self {
        self.disable_batching = v;
        self
    }

    /// Parses the `send_after` value used in the provider configuration.
    ///
    /// The value is a sequence of numbers with units, such as `"10s"`,
    /// `"1m30s"` or `"500ms"`. Valid units are `ms`, `s`, `m` and `h`.
    ///
    /// # Example
    /// ```
    /// # use tpg_batcher::BatchingConfig;
    /// use std::time::Duration;
    /// let config = BatchingConfig::new().set_send_after(BatchingConfig::parse_send_after("1m30s")?);
    /// assert_eq!(config.send_after, Duration::from_secs(90));
    /// # Ok::<(), tpg_batcher::options::ConfigError>(())
    /// ```
    pub fn parse_send_after(value: &str) -> Result<Duration, ConfigError> {
        parse_duration(value)
    }
}

impl Default for BatchingConfig {
    fn default() -> Self {
        Self {
            send_after: DEFAULT_SEND_AFTER,
            disable_batching: false,
        }
    }
}

/// An invalid value in the batching configuration.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("empty duration")]
    Empty,
    #[error("invalid duration {0:?}: missing unit")]
    MissingUnit(String),
    #[error("invalid duration {0:?}: unknown unit {1:?}")]
    UnknownUnit(String, String),
    #[error("invalid duration {0:?}: expected a number")]
    InvalidNumber(String),
}

fn parse_duration(value: &str) -> Result<Duration, ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::Empty);
    }
    if value == "0" {
        return Ok(Duration::ZERO);
    }
    let mut total = Duration::ZERO;
    let mut rest = value;
    while !rest.is_empty() {
        let digits = rest
            .find(|c: char| !c.is_ascii_digit() && c != '.')
            .ok_or_else(|| ConfigError::MissingUnit(value.to_string()))?;
        let (number, tail) = rest.split_at(digits);
        let number = number
            .parse::<f64>()
            .map_err(|_| ConfigError::InvalidNumber(value.to_string()))?;
        let unit_len = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_len);
        let scale = match unit {
            "ms" => 0.001,
            "s" => 1.0,
            "m" => 60.0,
            "h" => 3600.0,
            u => return Err(ConfigError::UnknownUnit(value.to_string(), u.to_string())),
        };
        total += Duration::from_secs_f64(number * scale);
        rest = tail;
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn defaults() {
        let config = BatchingConfig::default();
        assert_eq!(config.send_after, Duration::from_secs(10));
        assert!(!config.disable_batching);
    }

    #[test]
    fn setters() {
        let config = BatchingConfig::new()
            .set_send_after(Duration::from_millis(1234))
            .set_disable_batching(true);
        assert_eq!(config.send_after, Duration::from_millis(1234));
        assert!(config.disable_batching);
    }

    #[test_case("10s", Duration::from_secs(10))]
    #[test_case("0", Duration::ZERO)]
    #[test_case("500ms", Duration::from_millis(500))]
    #[test_case("1m30s", Duration::from_secs(90))]
    #[test_case("1h", Duration::from_secs(3600))]
    #[test_case("1.5s", Duration::from_millis(1500))]
    fn parse(input: &str, want: Duration) -> anyhow::Result<()> {
        assert_eq!(BatchingConfig::parse_send_after(input)?, want);
        Ok(())
    }

    #[test_case("", ConfigError::Empty)]
    #[test_case("10", ConfigError::MissingUnit("10".into()))]
    #[test_case("10d", ConfigError::UnknownUnit("10d".into(), "d".into()))]
    #[test_case("s", ConfigError::InvalidNumber("s".into()))]
    #[test_case("1..2s", ConfigError::InvalidNumber("1..2s".into()))]
    fn parse_errors(input: &str, want: ConfigError) {
        assert_eq!(BatchingConfig::parse_send_after(input), Err(want));
    }
}
