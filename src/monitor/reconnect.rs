//! What a device does after its session drops or a connect attempt fails.
//!
//! The default is [`ReconnectPolicy::Never`]: a dropped device stays
//! `Disconnected` until the process restarts.

use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use backoff::backoff::{Backoff, Constant};
use backoff::ExponentialBackoff;
use thiserror::Error;

use crate::constants::defaults;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReconnectPolicy {
    #[default]
    Never,
    FixedDelay(Duration),
    ExponentialBackoff {
        initial: Duration,
        max: Duration,
    },
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("invalid reconnect policy '{0}', expected never, fixed[:<secs>] or backoff[:<initial secs>:<max secs>]")]
pub struct ParsePolicyError(String);

impl ReconnectPolicy {
    pub fn is_enabled(&self) -> bool {
        !matches!(self, ReconnectPolicy::Never)
    }

    fn backoff(&self) -> Option<Box<dyn Backoff>> {
        match *self {
            ReconnectPolicy::Never => None,
            ReconnectPolicy::FixedDelay(delay) => Some(Box::new(Constant::new(delay))),
            ReconnectPolicy::ExponentialBackoff { initial, max } => {
                Some(Box::new(ExponentialBackoff {
                    current_interval: initial,
                    initial_interval: initial,
                    max_interval: max,
                    // Keep retrying for as long as the process runs
                    max_elapsed_time: None,
                    ..ExponentialBackoff::default()
                }))
            }
        }
    }
}

impl FromStr for ReconnectPolicy {
    type Err = ParsePolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParsePolicyError(s.to_string());
        let secs = |v: &str| v.parse::<u64>().map(Duration::from_secs).map_err(|_| err());

        let mut parts = s.split(':');
        let policy = match (parts.next(), parts.next(), parts.next()) {
            (Some("never"), None, None) => ReconnectPolicy::Never,
            (Some("fixed"), None, None) => {
                ReconnectPolicy::FixedDelay(defaults::RECONNECT_FIXED_DELAY)
            }
            (Some("fixed"), Some(delay), None) => ReconnectPolicy::FixedDelay(secs(delay)?),
            (Some("backoff"), None, None) => ReconnectPolicy::ExponentialBackoff {
                initial: defaults::RECONNECT_BACKOFF_INITIAL,
                max: defaults::RECONNECT_BACKOFF_MAX,
            },
            (Some("backoff"), Some(initial), Some(max)) => ReconnectPolicy::ExponentialBackoff {
                initial: secs(initial)?,
                max: secs(max)?,
            },
            _ => return Err(err()),
        };
        if parts.next().is_some() {
            return Err(err());
        }
        Ok(policy)
    }
}

impl fmt::Display for ReconnectPolicy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ReconnectPolicy::Never => write!(f, "never"),
            ReconnectPolicy::FixedDelay(d) => write!(f, "fixed:{}", d.as_secs()),
            ReconnectPolicy::ExponentialBackoff { initial, max } => {
                write!(f, "backoff:{}:{}", initial.as_secs(), max.as_secs())
            }
        }
    }
}

/// Per-device retry schedule driven by a [`ReconnectPolicy`]
pub struct Reconnector {
    policy: ReconnectPolicy,
    backoff: Option<Box<dyn Backoff>>,
    due: Option<Instant>,
}

impl Reconnector {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Reconnector {
            policy,
            backoff: policy.backoff(),
            due: None,
        }
    }

    pub fn policy(&self) -> ReconnectPolicy {
        self.policy
    }

    /// Plan the next attempt. Returns the delay, or `None` when the policy never retries.
    pub fn schedule(&mut self, now: Instant) -> Option<Duration> {
        let delay = self.backoff.as_mut()?.next_backoff()?;
        self.due = Some(now + delay);
        Some(delay)
    }

    pub fn is_scheduled(&self) -> bool {
        self.due.is_some()
    }

    /// True once per scheduled attempt, when its time has come
    pub fn take_due(&mut self, now: Instant) -> bool {
        match self.due {
            Some(due) if now >= due => {
                self.due = None;
                true
            }
            _ => false,
        }
    }

    pub fn cancel(&mut self) {
        self.due = None;
    }

    /// Forget earlier failures after a successful connect
    pub fn reset(&mut self) {
        self.due = None;
        if let Some(backoff) = self.backoff.as_mut() {
            backoff.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_policies() {
        assert_eq!("never".parse::<ReconnectPolicy>(), Ok(ReconnectPolicy::Never));
        assert_eq!(
            "fixed".parse::<ReconnectPolicy>(),
            Ok(ReconnectPolicy::FixedDelay(Duration::from_secs(5)))
        );
        assert_eq!(
            "fixed:2".parse::<ReconnectPolicy>(),
            Ok(ReconnectPolicy::FixedDelay(Duration::from_secs(2)))
        );
        assert_eq!(
            "backoff:1:60".parse::<ReconnectPolicy>(),
            Ok(ReconnectPolicy::ExponentialBackoff {
                initial: Duration::from_secs(1),
                max: Duration::from_secs(60),
            })
        );
        assert!("fixed:soon".parse::<ReconnectPolicy>().is_err());
        assert!("backoff:1".parse::<ReconnectPolicy>().is_err());
        assert!("always".parse::<ReconnectPolicy>().is_err());
        assert!("never:1".parse::<ReconnectPolicy>().is_err());
    }

    #[test]
    fn display_round_trips() {
        for text in ["never", "fixed:3", "backoff:2:120"] {
            assert_eq!(text.parse::<ReconnectPolicy>().unwrap().to_string(), text);
        }
    }

    #[test]
    fn never_does_not_schedule() {
        let mut reconnector = Reconnector::new(ReconnectPolicy::Never);
        assert_eq!(reconnector.schedule(Instant::now()), None);
        assert!(!reconnector.is_scheduled());
        assert!(!reconnector.take_due(Instant::now()));
    }

    #[test]
    fn fixed_delay_fires_once_when_due() {
        let mut reconnector =
            Reconnector::new(ReconnectPolicy::FixedDelay(Duration::from_secs(5)));
        let now = Instant::now();

        assert_eq!(reconnector.schedule(now), Some(Duration::from_secs(5)));
        assert!(!reconnector.take_due(now + Duration::from_secs(4)));
        assert!(reconnector.take_due(now + Duration::from_secs(5)));
        assert!(!reconnector.take_due(now + Duration::from_secs(6)));
    }

    #[test]
    fn backoff_stays_within_max() {
        let max = Duration::from_secs(8);
        let mut reconnector = Reconnector::new(ReconnectPolicy::ExponentialBackoff {
            initial: Duration::from_secs(1),
            max,
        });
        let now = Instant::now();
        for _ in 0..20 {
            let delay = reconnector.schedule(now).unwrap();
            // Randomization may push a single delay up to 1.5x the capped interval
            assert!(delay <= max.mul_f64(1.5));
        }

        reconnector.cancel();
        assert!(!reconnector.is_scheduled());
        reconnector.reset();
        assert!(reconnector.schedule(now).unwrap() <= Duration::from_millis(1500));
    }
}
