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

//! Delays between attempts of the retry transport.
//!
//! Google Cloud services ask clients to wait before retrying transient
//! failures. The transport uses [ExponentialBackoff] unless configured
//! otherwise: half a second after the first failure, doubling on each failure,
//! up to 30 seconds. Each delay is jittered into the upper half of its range.
//!
//! # Example
//! ```
//! # use tpg_gax::options::RetryTransportConfig;
//! use tpg_gax::backoff::ExponentialBackoff;
//! use std::time::Duration;
//!
//! let backoff = ExponentialBackoff::new(Duration::from_millis(100), Duration::from_secs(5), 4.0)?;
//! let config = RetryTransportConfig::new().set_backoff(backoff);
//! # Ok::<(), tpg_gax::backoff::BackoffError>(())
//! ```

use std::time::Duration;

/// Computes the delay before the next attempt.
pub trait Backoff: Send + Sync + std::fmt::Debug {
    /// The delay after `failures` consecutive failed attempts.
    ///
    /// The transport calls this with `failures >= 1`.
    fn delay(&self, failures: u32) -> Duration;
}

/// Invalid parameters for [ExponentialBackoff].
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum BackoffError {
    #[error("the initial delay must be positive")]
    ZeroInitialDelay,
    #[error("the maximum delay ({maximum:?}) is below the initial delay ({initial:?})")]
    MaximumBelowInitial { initial: Duration, maximum: Duration },
    #[error("the multiplier ({0}) must be a finite number >= 1.0")]
    InvalidMultiplier(f64),
}

const DEFAULT_INITIAL: Duration = Duration::from_millis(500);
const DEFAULT_MAXIMUM: Duration = Duration::from_secs(30);
const DEFAULT_MULTIPLIER: f64 = 2.0;

/// Truncated exponential backoff, with optional jitter.
#[derive(Clone, Debug, PartialEq)]
pub struct ExponentialBackoff {
    initial: Duration,
    maximum: Duration,
    multiplier: f64,
    jitter: bool,
}

impl ExponentialBackoff {
    /// Creates a jittered backoff starting at `initial`, multiplied by
    /// `multiplier` on each failure, and truncated at `maximum`.
    pub fn new(initial: Duration, maximum: Duration, multiplier: f64) -> Result<Self, BackoffError> {
        if initial.is_zero() {
            return Err(BackoffError::ZeroInitialDelay);
        }
        if maximum < initial {
            return Err(BackoffError::MaximumBelowInitial { initial, maximum });
        }
        if !multiplier.is_finite() || multiplier < 1.0 {
            return Err(BackoffError::InvalidMultiplier(multiplier));
        }
        Ok(Self {
            initial,
            maximum,
            multiplier,
            jitter: true,
        })
    }

    /// Disables jitter, each delay is the full computed value.
    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    fn truncated(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(i32::MAX as u32) as i32;
        let factor = self.multiplier.powi(exponent);
        // Compare in f64 to avoid overflowing `Duration::mul_f64`.
        if factor >= self.maximum.div_duration_f64(self.initial) {
            return self.maximum;
        }
        self.initial.mul_f64(factor)
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            initial: DEFAULT_INITIAL,
            maximum: DEFAULT_MAXIMUM,
            multiplier: DEFAULT_MULTIPLIER,
            jitter: true,
        }
    }
}

impl Backoff for ExponentialBackoff {
    fn delay(&self, failures: u32) -> Duration {
        let delay = self.truncated(failures);
        if !self.jitter {
            return delay;
        }
        use rand::Rng;
        rand::rng().random_range((delay / 2)..=delay)
    }
}

/// The same delay after every failure.
///
/// Mostly useful in tests, where the retry timing is not interesting.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ConstantBackoff(pub Duration);

impl Backoff for ConstantBackoff {
    fn delay(&self, _failures: u32) -> Duration {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(Duration::ZERO, Duration::from_secs(1), 2.0, BackoffError::ZeroInitialDelay)]
    #[test_case(
        Duration::from_secs(2),
        Duration::from_secs(1),
        2.0,
        BackoffError::MaximumBelowInitial { initial: Duration::from_secs(2), maximum: Duration::from_secs(1) }
    )]
    #[test_case(Duration::from_secs(1), Duration::from_secs(2), 0.5, BackoffError::InvalidMultiplier(0.5))]
    fn invalid(initial: Duration, maximum: Duration, multiplier: f64, want: BackoffError) {
        assert_eq!(ExponentialBackoff::new(initial, maximum, multiplier), Err(want));
    }

    #[test]
    fn nan_multiplier() {
        let got = ExponentialBackoff::new(Duration::from_secs(1), Duration::from_secs(2), f64::NAN);
        assert!(matches!(got, Err(BackoffError::InvalidMultiplier(_))), "{got:?}");
    }

    #[test]
    fn default_matches_new() -> anyhow::Result<()> {
        let want = ExponentialBackoff::new(Duration::from_millis(500), Duration::from_secs(30), 2.0)?;
        assert_eq!(ExponentialBackoff::default(), want);
        Ok(())
    }

    #[test_case(1, Duration::from_millis(500))]
    #[test_case(2, Duration::from_secs(1))]
    #[test_case(3, Duration::from_secs(2))]
    #[test_case(7, Duration::from_secs(30))]
    #[test_case(u32::MAX, Duration::from_secs(30))]
    fn without_jitter(failures: u32, want: Duration) {
        let backoff = ExponentialBackoff::default().without_jitter();
        assert_eq!(backoff.delay(failures), want);
    }

    #[test]
    fn jitter_stays_in_upper_half() {
        let backoff = ExponentialBackoff::default();
        for failures in 1..10 {
            let full = backoff.truncated(failures);
            let got = backoff.delay(failures);
            assert!(full / 2 <= got && got <= full, "{failures} {got:?} {full:?}");
        }
    }

    #[test]
    fn constant() {
        let backoff = ConstantBackoff(Duration::from_millis(3));
        assert_eq!(backoff.delay(1), Duration::from_millis(3));
        assert_eq!(backoff.delay(100), Duration::from_millis(3));
    }
}
