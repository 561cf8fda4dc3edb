//! Controller side of the shutdown handshake: poll for Ended at a fixed
//! interval, optionally giving up after a bound.

use std::thread;
use std::time::{Duration, Instant};

use crate::config::ShutdownConfig;
use crate::error::{log_audio_error, AudioError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownPolicy {
    pub poll_interval: Duration,
    /// `None` polls until the loop ends, however long that takes
    pub timeout: Option<Duration>,
}

impl ShutdownPolicy {
    pub fn bounded(poll_interval: Duration, timeout: Duration) -> Self {
        Self {
            poll_interval,
            timeout: Some(timeout),
        }
    }
}

impl Default for ShutdownPolicy {
    fn default() -> Self {
        ShutdownConfig::default().into()
    }
}

impl From<ShutdownConfig> for ShutdownPolicy {
    fn from(config: ShutdownConfig) -> Self {
        Self {
            poll_interval: Duration::from_millis(config.poll_interval_ms.max(1)),
            timeout: config.timeout_ms.map(Duration::from_millis),
        }
    }
}

/// Poll `has_ended` until it reports true or the policy's timeout passes
pub fn poll_until_ended<F>(policy: &ShutdownPolicy, has_ended: F) -> Result<(), AudioError>
where
    F: Fn() -> bool,
{
    let begin = Instant::now();
    while !has_ended() {
        if let Some(timeout) = policy.timeout {
            let waited = begin.elapsed();
            if waited >= timeout {
                let err = AudioError::ShutdownTimedOut {
                    waited_ms: waited.as_millis() as u64,
                };
                log_audio_error(&err, "poll_until_ended");
                return Err(err);
            }
        }
        thread::sleep(policy.poll_interval);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_default_policy_is_unbounded_50ms() {
        let policy = ShutdownPolicy::default();
        assert_eq!(policy.poll_interval, Duration::from_millis(50));
        assert_eq!(policy.timeout, None);
    }

    #[test]
    fn test_returns_once_ended() {
        let polls = AtomicUsize::new(0);
        let policy = ShutdownPolicy {
            poll_interval: Duration::from_millis(1),
            timeout: None,
        };
        let result = poll_until_ended(&policy, || polls.fetch_add(1, Ordering::SeqCst) >= 3);
        assert!(result.is_ok());
        assert_eq!(polls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_times_out() {
        let policy = ShutdownPolicy::bounded(Duration::from_millis(1), Duration::from_millis(20));
        let result = poll_until_ended(&policy, || false);
        assert!(matches!(result, Err(AudioError::ShutdownTimedOut { .. })));
    }

    #[test]
    fn test_config_conversion() {
        let policy: ShutdownPolicy = ShutdownConfig {
            poll_interval_ms: 10,
            timeout_ms: Some(500),
        }
        .into();
        assert_eq!(policy.poll_interval, Duration::from_millis(10));
        assert_eq!(policy.timeout, Some(Duration::from_millis(500)));
    }
}
