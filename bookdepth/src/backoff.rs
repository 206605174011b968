//! Reconnect delay policy for the depth stream.
//!
//! Replaces an open-ended "sleep and try again" with an explicit policy:
//! fixed or exponential delay, optional jitter, and an optional cap on
//! consecutive failed attempts after which the session gives up.

use std::time::Duration;

use rand::Rng;

/// How the delay grows between consecutive failed attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffKind {
    /// Always wait `base`.
    Fixed,
    /// `min(max_delay, base * 2^attempt)`.
    Exponential,
}

/// Reconnect policy for a streaming session.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    pub kind: BackoffKind,
    /// Initial (or constant, for [`BackoffKind::Fixed`]) delay.
    pub base: Duration,
    /// Upper bound for exponential growth.
    pub max_delay: Duration,
    /// Jitter as a fraction of the delay (0.0 to 1.0). Negative values are
    /// clamped to 0.
    pub jitter_factor: f64,
    /// Consecutive failures allowed before the session is abandoned.
    /// `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            kind: BackoffKind::Fixed,
            base: Duration::from_secs(5),
            max_delay: Duration::from_secs(60),
            jitter_factor: 0.0,
            max_attempts: None,
        }
    }
}

impl ReconnectPolicy {
    /// Exponential policy with 10% jitter.
    pub fn exponential(base: Duration, max_delay: Duration) -> Self {
        Self {
            kind: BackoffKind::Exponential,
            base,
            max_delay,
            jitter_factor: 0.1,
            max_attempts: None,
        }
    }

    /// Fixed-delay policy without jitter.
    pub fn fixed(delay: Duration) -> Self {
        Self {
            kind: BackoffKind::Fixed,
            base: delay,
            max_delay: delay,
            jitter_factor: 0.0,
            max_attempts: None,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: Option<u32>) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn backoff(&self) -> Backoff {
        Backoff {
            policy: self.clone(),
            attempt: 0,
        }
    }
}

/// Stateful delay generator built from a [`ReconnectPolicy`].
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: ReconnectPolicy,
    attempt: u32,
}

impl Backoff {
    /// Delay before the next attempt, or `None` once `max_attempts`
    /// consecutive failures have been recorded.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if let Some(max) = self.policy.max_attempts {
            if self.attempt >= max {
                return None;
            }
        }

        let raw = match self.policy.kind {
            BackoffKind::Fixed => self.policy.base,
            BackoffKind::Exponential => self
                .policy
                .base
                .saturating_mul(2u32.saturating_pow(self.attempt))
                .min(self.policy.max_delay),
        };

        let jitter_factor = self.policy.jitter_factor.max(0.0);
        let jitter_range = raw.as_secs_f64() * jitter_factor;
        let jitter = if jitter_range > 0.0 {
            rand::thread_rng().gen_range(-jitter_range..=jitter_range)
        } else {
            0.0
        };

        self.attempt = self.attempt.saturating_add(1);
        Some(Duration::from_secs_f64((raw.as_secs_f64() + jitter).max(0.0)))
    }

    /// Call after a successful connection.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Consecutive failed attempts so far.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_delay_is_constant() {
        let mut backoff = ReconnectPolicy::fixed(Duration::from_secs(5)).backoff();
        for _ in 0..5 {
            assert_eq!(backoff.next_delay(), Some(Duration::from_secs(5)));
        }
        assert_eq!(backoff.attempt(), 5);
    }

    #[test]
    fn exponential_doubles_and_caps() {
        let mut policy =
            ReconnectPolicy::exponential(Duration::from_secs(1), Duration::from_secs(10));
        policy.jitter_factor = 0.0;
        let mut backoff = policy.backoff();

        assert_eq!(backoff.next_delay(), Some(Duration::from_secs(1)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_secs(2)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_secs(4)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_secs(8)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_secs(10)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_secs(10)));
    }

    #[test]
    fn reset_starts_over() {
        let mut policy =
            ReconnectPolicy::exponential(Duration::from_secs(1), Duration::from_secs(60));
        policy.jitter_factor = 0.0;
        let mut backoff = policy.backoff();
        backoff.next_delay();
        backoff.next_delay();
        assert_eq!(backoff.attempt(), 2);

        backoff.reset();
        assert_eq!(backoff.attempt(), 0);
        assert_eq!(backoff.next_delay(), Some(Duration::from_secs(1)));
    }

    #[test]
    fn max_attempts_exhausts() {
        let mut backoff = ReconnectPolicy::fixed(Duration::from_millis(10))
            .with_max_attempts(Some(2))
            .backoff();
        assert!(backoff.next_delay().is_some());
        assert!(backoff.next_delay().is_some());
        assert_eq!(backoff.next_delay(), None);

        backoff.reset();
        assert!(backoff.next_delay().is_some());
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let mut policy =
            ReconnectPolicy::exponential(Duration::from_secs(10), Duration::from_secs(60));
        policy.jitter_factor = 0.2;
        let secs = policy.backoff().next_delay().unwrap().as_secs_f64();
        assert!((8.0..=12.0).contains(&secs), "delay was {secs}");
    }

    #[test]
    fn negative_jitter_is_clamped() {
        let mut policy = ReconnectPolicy::fixed(Duration::from_secs(1));
        policy.jitter_factor = -0.5;
        assert_eq!(policy.backoff().next_delay(), Some(Duration::from_secs(1)));
    }
}
