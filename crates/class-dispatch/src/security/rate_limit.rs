use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::ttl_cache::TtlCache;

/// Limits applied per client IP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoginRateLimitPolicy {
    pub max_attempts: u32,
    pub window: Duration,
    pub block: Duration,
    pub sweep_interval: std::time::Duration,
}

impl Default for LoginRateLimitPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            window: Duration::minutes(15),
            block: Duration::minutes(30),
            sweep_interval: std::time::Duration::from_secs(60 * 60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub count: u32,
    pub window_reset_at: DateTime<Utc>,
    pub blocked_until: Option<DateTime<Utc>>,
}

impl AttemptRecord {
    fn is_blocked(&self, now: DateTime<Utc>) -> bool {
        self.blocked_until.is_some_and(|until| until > now)
    }

    fn window_open(&self, now: DateTime<Utc>) -> bool {
        self.window_reset_at > now
    }

    fn expires_at(&self) -> DateTime<Utc> {
        match self.blocked_until {
            Some(until) => until.max(self.window_reset_at),
            None => self.window_reset_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining_attempts: u32,
    pub blocked_until: Option<DateTime<Utc>>,
}

/// Per-IP login attempt counter with a temporary block.
///
/// `check` and `record` are separate calls and the pair is not atomic: two concurrent logins
/// from one IP can both pass `check` near the limit. Each call on its own is atomic per key.
#[derive(Debug, Default)]
pub struct LoginRateLimiter {
    policy: LoginRateLimitPolicy,
    attempts: TtlCache<String, AttemptRecord>,
}

impl LoginRateLimiter {
    pub fn new(policy: LoginRateLimitPolicy) -> Self {
        Self {
            policy,
            attempts: TtlCache::new(),
        }
    }

    pub fn policy(&self) -> &LoginRateLimitPolicy {
        &self.policy
    }

    pub fn check(&self, ip: &str) -> RateLimitDecision {
        self.check_at(ip, Utc::now())
    }

    pub fn record(&self, ip: &str, success: bool) -> RateLimitDecision {
        self.record_at(ip, success, Utc::now())
    }

    /// Reports whether another attempt is allowed. Reaching the limit inside an open window
    /// starts the block.
    pub fn check_at(&self, ip: &str, now: DateTime<Utc>) -> RateLimitDecision {
        let max = self.policy.max_attempts;
        let block = self.policy.block;
        let mut started_block = false;

        let record = self.attempts.update(ip.to_string(), now, |current| {
            let record = current.copied()?;
            if record.is_blocked(now) || !record.window_open(now) || record.count < max {
                return Some((record, record.expires_at()));
            }
            started_block = true;
            let blocked = AttemptRecord {
                blocked_until: Some(now + block),
                ..record
            };
            Some((blocked, blocked.expires_at()))
        });

        if started_block {
            info!(ip, "login attempts exhausted, blocking client");
        }
        self.decision(record, now)
    }

    /// Records a login outcome. Success clears the counter unless a block is in effect; a
    /// failure past the limit starts the block.
    pub fn record_at(&self, ip: &str, success: bool, now: DateTime<Utc>) -> RateLimitDecision {
        let max = self.policy.max_attempts;
        let window = self.policy.window;
        let block = self.policy.block;

        let record = self.attempts.update(ip.to_string(), now, |current| {
            if let Some(record) = current.filter(|record| record.is_blocked(now)) {
                return Some((*record, record.expires_at()));
            }
            if success {
                return None;
            }

            let mut record = match current {
                Some(record) if record.window_open(now) => AttemptRecord {
                    count: record.count.saturating_add(1),
                    ..*record
                },
                _ => AttemptRecord {
                    count: 1,
                    window_reset_at: now + window,
                    blocked_until: None,
                },
            };
            if record.count > max {
                record.blocked_until = Some(now + block);
            }
            Some((record, record.expires_at()))
        });

        self.decision(record, now)
    }

    fn decision(&self, record: Option<AttemptRecord>, now: DateTime<Utc>) -> RateLimitDecision {
        let max = self.policy.max_attempts;
        match record {
            Some(record) if record.is_blocked(now) => RateLimitDecision {
                allowed: false,
                remaining_attempts: 0,
                blocked_until: record.blocked_until,
            },
            Some(record) if record.window_open(now) => RateLimitDecision {
                allowed: true,
                remaining_attempts: max.saturating_sub(record.count),
                blocked_until: None,
            },
            _ => RateLimitDecision {
                allowed: true,
                remaining_attempts: max,
                blocked_until: None,
            },
        }
    }

    /// Removes clients whose window and block have both lapsed.
    pub fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        self.attempts.sweep(now)
    }

    pub fn tracked_clients(&self) -> usize {
        self.attempts.len()
    }

    /// Runs [`LoginRateLimiter::sweep_at`] on the policy's interval until the task is aborted.
    pub fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let limiter = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(limiter.policy.sweep_interval);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = limiter.sweep_at(Utc::now());
                debug!(removed, "swept expired login attempt records");
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_expiry_resets_the_counter() {
        let limiter = LoginRateLimiter::default();
        let start = Utc::now();
        for _ in 0..3 {
            limiter.record_at("10.0.0.1", false, start);
        }
        let later = start + Duration::minutes(16);

        let decision = limiter.check_at("10.0.0.1", later);
        assert!(decision.allowed);
        assert_eq!(decision.remaining_attempts, 5);

        let decision = limiter.record_at("10.0.0.1", false, later);
        assert_eq!(decision.remaining_attempts, 4);
    }

    #[test]
    fn success_clears_counter_when_not_blocked() {
        let limiter = LoginRateLimiter::default();
        let now = Utc::now();
        limiter.record_at("10.0.0.2", false, now);
        limiter.record_at("10.0.0.2", false, now);

        let decision = limiter.record_at("10.0.0.2", true, now);
        assert_eq!(decision.remaining_attempts, 5);
        assert_eq!(limiter.tracked_clients(), 0);
    }

    #[test]
    fn sixth_failure_blocks_without_a_check() {
        let limiter = LoginRateLimiter::default();
        let now = Utc::now();
        for _ in 0..5 {
            assert!(limiter.record_at("10.0.0.3", false, now).allowed);
        }

        let decision = limiter.record_at("10.0.0.3", false, now);
        assert!(!decision.allowed);
        assert_eq!(decision.blocked_until, Some(now + Duration::minutes(30)));
    }

    #[test]
    fn sweep_keeps_blocked_clients_until_block_lapses() {
        let limiter = LoginRateLimiter::default();
        let now = Utc::now();
        for _ in 0..6 {
            limiter.record_at("10.0.0.4", false, now);
        }
        limiter.record_at("10.0.0.5", false, now);

        assert_eq!(limiter.sweep_at(now + Duration::minutes(20)), 1);
        assert_eq!(limiter.tracked_clients(), 1);
        assert_eq!(limiter.sweep_at(now + Duration::minutes(31)), 1);
        assert_eq!(limiter.tracked_clients(), 0);
    }
}
