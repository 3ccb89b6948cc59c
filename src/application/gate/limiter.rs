//! Failed-attempt bookkeeping for the authoring gate.
//!
//! Each limiter owns one `(attempt_count, locked_until)` pair persisted in the
//! browser's client storage. Lockouts expire lazily: the first read after
//! `locked_until` passes resets the pair.

use std::sync::Arc;

use metrics::counter;
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use tracing::{debug, warn};

use crate::util::clock::Clock;

use super::storage::{ClientStorage, StorageError};

const SOURCE: &str = "application::gate::limiter";

#[derive(Debug, Error)]
pub enum LimiterError {
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Storage keys of one limiter instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimiterKeys {
    pub attempts: &'static str,
    pub locked_until: &'static str,
}

impl LimiterKeys {
    pub const SECRET: Self = Self {
        attempts: "secretAttempts",
        locked_until: "secretLockedUntil",
    };

    pub const CREDENTIALS: Self = Self {
        attempts: "loginAttempts",
        locked_until: "lockedUntil",
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockoutPolicy {
    pub max_attempts: u32,
    pub lockout: Duration,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            lockout: Duration::seconds(300),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LockoutState {
    pub attempt_count: u32,
    pub locked_until: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LimitStatus {
    Allowed,
    /// Remaining lockout, formatted as `M dakika S saniye`.
    Locked { remaining: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    AttemptsRemaining(u32),
    Locked { duration_seconds: i64 },
}

pub struct AttemptLimiter {
    keys: LimiterKeys,
    policy: LockoutPolicy,
    storage: Arc<dyn ClientStorage>,
    clock: Arc<dyn Clock>,
    state: LockoutState,
}

impl AttemptLimiter {
    /// Read the persisted pair and drop it if its lockout already elapsed.
    pub async fn load(
        keys: LimiterKeys,
        policy: LockoutPolicy,
        storage: Arc<dyn ClientStorage>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, LimiterError> {
        let attempt_count = match storage.get_item(keys.attempts).await? {
            Some(raw) => raw.trim().parse::<u32>().unwrap_or_else(|_| {
                warn!(target = SOURCE, key = keys.attempts, value = %raw, "ignoring unreadable attempt count");
                0
            }),
            None => 0,
        };
        let locked_until = storage
            .get_item(keys.locked_until)
            .await?
            .and_then(|raw| parse_millis(keys.locked_until, &raw));

        let mut limiter = Self {
            keys,
            policy,
            storage,
            clock,
            state: LockoutState {
                attempt_count,
                locked_until,
            },
        };
        let now = limiter.clock.now();
        limiter.reset_if_expired(now).await?;
        Ok(limiter)
    }

    pub fn state(&self) -> LockoutState {
        self.state
    }

    pub fn policy(&self) -> LockoutPolicy {
        self.policy
    }

    pub async fn check(&mut self) -> Result<LimitStatus, LimiterError> {
        let now = self.clock.now();
        if let Some(remaining) = self.remaining_lockout(now) {
            return Ok(LimitStatus::Locked {
                remaining: format_remaining(remaining),
            });
        }
        self.reset_if_expired(now).await?;
        Ok(LimitStatus::Allowed)
    }

    /// Count a failed attempt. While locked the attempt is ignored and the
    /// remaining lockout is reported instead.
    pub async fn record_failure(&mut self) -> Result<FailureOutcome, LimiterError> {
        let now = self.clock.now();
        if let Some(remaining) = self.remaining_lockout(now) {
            return Ok(FailureOutcome::Locked {
                duration_seconds: ceil_seconds(remaining),
            });
        }
        self.reset_if_expired(now).await?;

        self.state.attempt_count = self.state.attempt_count.saturating_add(1);
        self.storage
            .set_item(self.keys.attempts, &self.state.attempt_count.to_string())
            .await?;

        if self.state.attempt_count >= self.policy.max_attempts {
            let until = now + self.policy.lockout;
            self.state.locked_until = Some(until);
            self.storage
                .set_item(self.keys.locked_until, &to_millis(until).to_string())
                .await?;
            debug!(
                target = SOURCE,
                key = self.keys.attempts,
                attempts = self.state.attempt_count,
                "attempt limit reached; locking"
            );
            counter!("kubinet_gate_lockout_total").increment(1);
            return Ok(FailureOutcome::Locked {
                duration_seconds: self.policy.lockout.whole_seconds(),
            });
        }

        Ok(FailureOutcome::AttemptsRemaining(
            self.policy.max_attempts - self.state.attempt_count,
        ))
    }

    pub async fn record_success(&mut self) -> Result<(), LimiterError> {
        self.clear().await
    }

    fn remaining_lockout(&self, now: OffsetDateTime) -> Option<Duration> {
        self.state
            .locked_until
            .filter(|until| now < *until)
            .map(|until| until - now)
    }

    async fn reset_if_expired(&mut self, now: OffsetDateTime) -> Result<(), LimiterError> {
        match self.state.locked_until {
            Some(until) if now >= until => {
                debug!(target = SOURCE, key = self.keys.attempts, "lockout expired");
                self.clear().await
            }
            _ => Ok(()),
        }
    }

    async fn clear(&mut self) -> Result<(), LimiterError> {
        self.state = LockoutState::default();
        self.storage.remove_item(self.keys.attempts).await?;
        self.storage.remove_item(self.keys.locked_until).await?;
        Ok(())
    }
}

/// Human-readable lockout remainder, seconds rounded up.
pub fn format_remaining(remaining: Duration) -> String {
    let secs = ceil_seconds(remaining).max(0);
    format!("{} dakika {} saniye", secs / 60, secs % 60)
}

fn ceil_seconds(duration: Duration) -> i64 {
    let millis = duration.whole_milliseconds();
    i64::try_from((millis + 999).div_euclid(1000)).unwrap_or(i64::MAX)
}

fn to_millis(at: OffsetDateTime) -> i128 {
    at.unix_timestamp_nanos() / 1_000_000
}

fn parse_millis(key: &'static str, raw: &str) -> Option<OffsetDateTime> {
    let parsed = raw
        .trim()
        .parse::<i128>()
        .ok()
        .and_then(|millis| OffsetDateTime::from_unix_timestamp_nanos(millis * 1_000_000).ok());
    if parsed.is_none() {
        warn!(target = SOURCE, key, value = %raw, "ignoring unreadable lockout timestamp");
    }
    parsed
}

#[cfg(test)]
mod tests {
    use crate::infra::storage::MemoryClientStorage;
    use crate::util::clock::ManualClock;

    use super::*;

    async fn limiter(
        storage: Arc<MemoryClientStorage>,
        clock: Arc<ManualClock>,
    ) -> AttemptLimiter {
        AttemptLimiter::load(
            LimiterKeys::CREDENTIALS,
            LockoutPolicy::default(),
            storage,
            clock,
        )
        .await
        .expect("load limiter")
    }

    #[tokio::test]
    async fn five_failures_count_down_then_lock() {
        let storage = Arc::new(MemoryClientStorage::default());
        let clock = Arc::new(ManualClock::default());
        let mut limiter = limiter(storage, clock).await;

        let mut outcomes = Vec::new();
        for _ in 0..5 {
            outcomes.push(limiter.record_failure().await.expect("failure"));
        }

        assert_eq!(
            outcomes,
            vec![
                FailureOutcome::AttemptsRemaining(4),
                FailureOutcome::AttemptsRemaining(3),
                FailureOutcome::AttemptsRemaining(2),
                FailureOutcome::AttemptsRemaining(1),
                FailureOutcome::Locked {
                    duration_seconds: 300
                },
            ]
        );
    }

    #[tokio::test]
    async fn lock_holds_until_lockout_elapses() {
        let storage = Arc::new(MemoryClientStorage::default());
        let clock = Arc::new(ManualClock::default());
        let mut limiter = limiter(storage, clock.clone()).await;
        for _ in 0..5 {
            limiter.record_failure().await.expect("failure");
        }

        clock.advance(Duration::seconds(1));
        assert_eq!(
            limiter.check().await.expect("check"),
            LimitStatus::Locked {
                remaining: "4 dakika 59 saniye".to_string()
            }
        );

        clock.advance(Duration::seconds(299));
        assert_eq!(limiter.check().await.expect("check"), LimitStatus::Allowed);
        assert_eq!(limiter.state(), LockoutState::default());
    }

    #[tokio::test]
    async fn failure_while_locked_is_not_counted() {
        let storage = Arc::new(MemoryClientStorage::default());
        let clock = Arc::new(ManualClock::default());
        let mut limiter = limiter(storage, clock.clone()).await;
        for _ in 0..5 {
            limiter.record_failure().await.expect("failure");
        }

        clock.advance(Duration::seconds(100));
        let outcome = limiter.record_failure().await.expect("failure");
        assert_eq!(
            outcome,
            FailureOutcome::Locked {
                duration_seconds: 200
            }
        );
        assert_eq!(limiter.state().attempt_count, 5);
    }

    #[tokio::test]
    async fn success_resets_attempts() {
        let storage = Arc::new(MemoryClientStorage::default());
        let clock = Arc::new(ManualClock::default());
        let mut limiter = limiter(storage.clone(), clock).await;
        limiter.record_failure().await.expect("failure");
        limiter.record_failure().await.expect("failure");

        limiter.record_success().await.expect("success");

        assert_eq!(limiter.check().await.expect("check"), LimitStatus::Allowed);
        assert_eq!(limiter.state().attempt_count, 0);
        assert_eq!(storage.get_item("loginAttempts").await.expect("get"), None);
    }

    #[tokio::test]
    async fn state_survives_reload_from_same_storage() {
        let storage = Arc::new(MemoryClientStorage::default());
        let clock = Arc::new(ManualClock::default());
        let mut first = limiter(storage.clone(), clock.clone()).await;
        for _ in 0..5 {
            first.record_failure().await.expect("failure");
        }

        let mut reloaded = limiter(storage.clone(), clock.clone()).await;
        assert!(matches!(
            reloaded.check().await.expect("check"),
            LimitStatus::Locked { .. }
        ));

        clock.advance(Duration::seconds(301));
        let expired = limiter(storage.clone(), clock).await;
        assert_eq!(expired.state(), LockoutState::default());
        assert_eq!(storage.get_item("lockedUntil").await.expect("get"), None);
    }

    #[tokio::test]
    async fn instances_do_not_share_counters() {
        let storage = Arc::new(MemoryClientStorage::default());
        let clock = Arc::new(ManualClock::default());
        let mut credentials = limiter(storage.clone(), clock.clone()).await;
        let secret = AttemptLimiter::load(
            LimiterKeys::SECRET,
            LockoutPolicy::default(),
            storage.clone(),
            clock,
        )
        .await
        .expect("load");

        credentials.record_failure().await.expect("failure");
        assert_eq!(secret.state().attempt_count, 0);
        assert_eq!(
            storage.get_item("loginAttempts").await.expect("get"),
            Some("1".to_string())
        );
        assert_eq!(storage.get_item("secretAttempts").await.expect("get"), None);
    }

    #[test]
    fn remaining_time_rounds_seconds_up() {
        assert_eq!(format_remaining(Duration::seconds(300)), "5 dakika 0 saniye");
        assert_eq!(
            format_remaining(Duration::milliseconds(61_001)),
            "1 dakika 2 saniye"
        );
        assert_eq!(format_remaining(Duration::milliseconds(1)), "0 dakika 1 saniye");
    }
}
