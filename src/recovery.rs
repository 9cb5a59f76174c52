//! Reconnection policy: when to retry and how long to wait.

use crate::error::Error;
use backon::{BackoffBuilder, ConstantBuilder, ExponentialBuilder};
use std::time::Duration;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BackoffStrategy {
    /// Same delay between every attempt.
    Linear,
    /// Delay doubles per attempt, capped at `exponential_limit`.
    #[default]
    Exponential,
}

/// Reconnect behavior, separate from the wire-level options.
#[derive(Clone, Debug)]
pub struct RecoveryConfig {
    pub reconnect: bool,
    pub backoff_strategy: BackoffStrategy,
    /// Delay before the first retry (and every retry under `Linear`).
    pub backoff_time: Duration,
    pub exponential_limit: Duration,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            reconnect: true,
            backoff_strategy: BackoffStrategy::default(),
            backoff_time: Duration::from_secs(1),
            exponential_limit: Duration::from_secs(120),
        }
    }
}

impl RecoveryConfig {
    pub fn disabled() -> Self {
        Self {
            reconnect: false,
            ..Self::default()
        }
    }
}

/// Tracks one connection's retry series.
///
/// Owned by the io loop; a `ready` handshake resets the series so the
/// next outage starts over from `backoff_time`.
pub(crate) struct RecoverySupervisor {
    config: RecoveryConfig,
    backoff: Option<Box<dyn Iterator<Item = Duration> + Send>>,
}

impl RecoverySupervisor {
    pub(crate) fn new(config: RecoveryConfig) -> Self {
        Self {
            config,
            backoff: None,
        }
    }

    pub(crate) fn reconnect_enabled(&self) -> bool {
        self.config.reconnect
    }

    pub(crate) fn should_recover(&self, error: &Error) -> bool {
        self.config.reconnect && error.can_be_recovered()
    }

    pub(crate) fn next_backoff(&mut self) -> Duration {
        let config = &self.config;
        let backoff = self.backoff.get_or_insert_with(|| match config.backoff_strategy {
            BackoffStrategy::Linear => Box::new(
                ConstantBuilder::default()
                    .with_delay(config.backoff_time)
                    .with_max_times(usize::MAX)
                    .build(),
            ),
            BackoffStrategy::Exponential => Box::new(
                ExponentialBuilder::default()
                    .with_min_delay(config.backoff_time)
                    .with_max_delay(config.exponential_limit)
                    .with_factor(2.0)
                    .with_max_times(usize::MAX)
                    .build(),
            ),
        });
        backoff.next().unwrap_or(config.exponential_limit)
    }

    pub(crate) fn reset(&mut self) {
        self.backoff = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn supervisor(strategy: BackoffStrategy) -> RecoverySupervisor {
        RecoverySupervisor::new(RecoveryConfig {
            reconnect: true,
            backoff_strategy: strategy,
            backoff_time: Duration::from_millis(1000),
            exponential_limit: Duration::from_millis(10_000),
        })
    }

    #[test]
    fn exponential_series_doubles_up_to_the_limit() {
        let mut supervisor = supervisor(BackoffStrategy::Exponential);
        let series: Vec<u64> = (0..6)
            .map(|_| supervisor.next_backoff().as_millis() as u64)
            .collect();
        assert_eq!(series, vec![1000, 2000, 4000, 8000, 10_000, 10_000]);
    }

    #[test]
    fn ready_resets_the_series() {
        let mut supervisor = supervisor(BackoffStrategy::Exponential);
        supervisor.next_backoff();
        supervisor.next_backoff();
        supervisor.reset();
        assert_eq!(supervisor.next_backoff(), Duration::from_millis(1000));
    }

    #[test]
    fn linear_series_stays_flat() {
        let mut supervisor = supervisor(BackoffStrategy::Linear);
        for _ in 0..4 {
            assert_eq!(supervisor.next_backoff(), Duration::from_millis(1000));
        }
    }

    #[test]
    fn permanent_errors_are_not_recovered() {
        let supervisor = supervisor(BackoffStrategy::Linear);
        let transient: Error = crate::ErrorKind::NotConnected.into();
        assert!(supervisor.should_recover(&transient));
        let permanent: Error = crate::ErrorKind::AuthenticationFailure.into();
        assert!(!supervisor.should_recover(&permanent));
        let disabled = RecoverySupervisor::new(RecoveryConfig::disabled());
        assert!(!disabled.should_recover(&transient));
    }
}
