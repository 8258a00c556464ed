use crate::clock::{Clock, SystemClock};
use crate::limiter::{
    format_epoch_ms, ClientStatus, Decision, LimitEvent, LimitNotifier, Policy, Quota,
    RequestParts, SweepReport,
};
use crate::metrics;
use dashmap::DashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Per-client counter for one window
#[derive(Debug, Clone, PartialEq, Eq)]
struct ClientBucket {
    count: u64,
    window_start: u64,
    window_ms: u64,
    max_requests: u64,
    blocked: bool,
    block_until: u64,
}

impl ClientBucket {
    fn fresh(now: u64, window_ms: u64, max_requests: u64) -> Self {
        Self {
            count: 0,
            window_start: now,
            window_ms,
            max_requests,
            blocked: false,
            block_until: 0,
        }
    }

    fn window_end(&self) -> u64 {
        self.window_start.saturating_add(self.window_ms)
    }

    fn window_expired(&self, now: u64) -> bool {
        now > self.window_end()
    }

    fn block_active(&self, now: u64) -> bool {
        self.blocked && self.block_until > now
    }

    /// A block keeps the bucket alive until it lifts.
    fn last_active(&self) -> u64 {
        if self.blocked {
            self.window_start.max(self.block_until)
        } else {
            self.window_start
        }
    }

    fn quota(&self) -> Quota {
        Quota {
            limit: self.max_requests,
            remaining: self.max_requests.saturating_sub(self.count),
            reset_at_ms: self.window_end(),
        }
    }
}

/// State owned by one limiter. Lock order is always buckets before
/// violations or blacklist.
#[derive(Debug, Default)]
struct LimiterState {
    buckets: DashMap<String, ClientBucket>,
    /// Violations per client key
    violations: DashMap<String, u32>,
    /// Client key -> block end (epoch ms)
    blacklist: DashMap<String, u64>,
}

/// Fixed-window admission controller with progressive blocking.
///
/// Each client gets `max` requests per window. Every request over the
/// ceiling is a violation; once a client accumulates `block_threshold`
/// violations it is blacklisted for `block_duration`, during which every
/// request is refused regardless of window state.
pub struct RateLimiter {
    policy: Policy,
    state: LimiterState,
    clock: Arc<dyn Clock>,
    notifier: Option<Arc<dyn LimitNotifier>>,
}

impl RateLimiter {
    /// Create a limiter on the wall clock
    pub fn new(policy: Policy) -> Self {
        Self::with_clock(policy, Arc::new(SystemClock))
    }

    pub fn with_clock(policy: Policy, clock: Arc<dyn Clock>) -> Self {
        debug!(
            "Creating rate limiter: policy={}, window={:?}, max={}, block_threshold={}, block_duration={:?}",
            policy.name, policy.window, policy.max, policy.block_threshold, policy.block_duration
        );
        Self {
            policy,
            state: LimiterState::default(),
            clock,
            notifier: None,
        }
    }

    /// Attach a limit-reached hook
    pub fn with_notifier(mut self, notifier: Arc<dyn LimitNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    pub fn client_key(&self, req: &dyn RequestParts) -> String {
        (self.policy.key_generator)(req)
    }

    /// Decide whether to admit `req` now.
    pub fn admit(&self, req: &dyn RequestParts) -> Decision {
        self.admit_at(req, self.clock.now_ms())
    }

    pub fn admit_at(&self, req: &dyn RequestParts, now: u64) -> Decision {
        let key = self.client_key(req);
        self.check(&key, req.path(), now)
    }

    /// Decide for an already derived client key.
    pub fn check(&self, key: &str, path: &str, now: u64) -> Decision {
        let started = Instant::now();
        let decision = self.evaluate(key, path, now);

        debug!(
            policy = %self.policy.name,
            key = %key,
            path = %path,
            outcome = decision.outcome(),
            "Admission decision"
        );
        metrics::record_decision(
            &self.policy.name,
            decision.outcome(),
            started.elapsed().as_secs_f64(),
        );

        decision
    }

    fn evaluate(&self, key: &str, path: &str, now: u64) -> Decision {
        if let Some(until) = self.active_block(key, now) {
            return Decision::Blocked {
                retry_after_secs: Some(secs_until(until, now)),
            };
        }

        let window_ms = self.policy.window_ms();
        let max_requests = self.policy.max;

        let mut bucket = self
            .state
            .buckets
            .entry(key.to_string())
            .or_insert_with(|| ClientBucket::fresh(now, window_ms, max_requests));

        if bucket.block_active(now) {
            return Decision::Blocked {
                retry_after_secs: Some(secs_until(bucket.block_until, now)),
            };
        }

        if bucket.window_expired(now) {
            *bucket = ClientBucket::fresh(now, window_ms, max_requests);
        } else if bucket.blocked {
            bucket.blocked = false;
            bucket.block_until = 0;
        }

        bucket.count += 1;

        if bucket.count <= bucket.max_requests {
            return Decision::Admitted {
                quota: bucket.quota(),
            };
        }

        let violations = {
            let mut entry = self.state.violations.entry(key.to_string()).or_insert(0);
            *entry += 1;
            *entry
        };
        metrics::record_violation(&self.policy.name);

        let blacklisted = violations >= self.policy.block_threshold;
        if blacklisted {
            let until = now.saturating_add(self.policy.block_duration_ms());
            bucket.blocked = true;
            bucket.block_until = until;
            self.state.blacklist.insert(key.to_string(), until);
            metrics::record_blacklisted(&self.policy.name);
            warn!(
                policy = %self.policy.name,
                key = %key,
                violations,
                "Client blacklisted until {}",
                format_epoch_ms(until)
            );
        }

        let count = bucket.count;
        let quota = bucket.quota();
        drop(bucket);

        self.notify_limit_reached(key, path, count, violations, blacklisted);

        Decision::RateLimited {
            retry_after_secs: secs_until(quota.reset_at_ms, now),
            quota,
            violations,
        }
    }

    /// Block end for `key` if its blacklist entry is still in force. Expired
    /// entries are lifted on the way.
    fn active_block(&self, key: &str, now: u64) -> Option<u64> {
        let until = *self.state.blacklist.get(key)?;
        if until > now {
            return Some(until);
        }
        self.lift_block(key, until);
        None
    }

    fn lift_block(&self, key: &str, until: u64) -> bool {
        if self
            .state
            .blacklist
            .remove_if(key, |_, current| *current == until)
            .is_none()
        {
            return false;
        }
        self.state.violations.remove(key);
        info!(policy = %self.policy.name, key = %key, "Block lifted");
        true
    }

    fn notify_limit_reached(
        &self,
        key: &str,
        path: &str,
        count: u64,
        violations: u32,
        blacklisted: bool,
    ) {
        let Some(notifier) = &self.notifier else {
            return;
        };

        let event = LimitEvent {
            policy: self.policy.name.clone(),
            key: key.to_string(),
            path: path.to_string(),
            count,
            violations,
            blacklisted,
        };

        match catch_unwind(AssertUnwindSafe(|| notifier.notify(&event))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                metrics::record_hook_failure(&self.policy.name);
                warn!(policy = %self.policy.name, key = %key, "Limit hook failed: {}", e);
            }
            Err(_) => {
                metrics::record_hook_failure(&self.policy.name);
                warn!(policy = %self.policy.name, key = %key, "Limit hook panicked");
            }
        }
    }

    /// Current state of `key`, computed with the same expiry rules `admit` uses.
    pub fn status(&self, key: &str) -> ClientStatus {
        self.status_at(key, self.clock.now_ms())
    }

    pub fn status_at(&self, key: &str, now: u64) -> ClientStatus {
        let blacklisted_until = self.active_block(key, now);
        let bucket = self.state.buckets.get(key).map(|b| b.value().clone());
        let violations = self.state.violations.get(key).map(|v| *v).unwrap_or(0);

        let bucket_block = bucket
            .as_ref()
            .filter(|b| b.block_active(now))
            .map(|b| b.block_until);
        let blocked_until = blacklisted_until.or(bucket_block);
        let live_window = bucket.filter(|b| !b.window_expired(now));

        ClientStatus {
            key: key.to_string(),
            blocked: blocked_until.is_some(),
            blocked_until: blocked_until.map(format_epoch_ms),
            retry_after_secs: blocked_until.map(|until| secs_until(until, now)),
            violations,
            count: live_window.as_ref().map(|b| b.count),
            window_reset: live_window.map(|b| format_epoch_ms(b.window_end())),
        }
    }

    /// Periodic maintenance: lift expired blocks and evict buckets idle for
    /// more than three windows.
    pub fn tick(&self, now: u64) -> SweepReport {
        let mut report = SweepReport::default();

        let expired: Vec<(String, u64)> = self
            .state
            .blacklist
            .iter()
            .filter(|entry| *entry.value() <= now)
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();
        for (key, until) in expired {
            if self.lift_block(&key, until) {
                report.expired_blocks += 1;
            }
        }

        // Violation counters outlive their buckets; only an expired block
        // clears them.
        let idle_limit = self.policy.window_ms().saturating_mul(3);
        self.state.buckets.retain(|_, bucket| {
            if now.saturating_sub(bucket.last_active()) <= idle_limit {
                return true;
            }
            report.evicted_buckets += 1;
            false
        });

        metrics::record_sweep(
            &self.policy.name,
            &report,
            self.state.buckets.len(),
            self.state.blacklist.len(),
        );
        report
    }

    pub fn tick_now(&self) -> SweepReport {
        self.tick(self.clock.now_ms())
    }

    /// Number of clients with a live bucket
    pub fn tracked_clients(&self) -> usize {
        self.state.buckets.len()
    }

    pub fn blacklist_len(&self) -> usize {
        self.state.blacklist.len()
    }
}

/// Whole seconds from `now` until `until`, rounded up, at least 1.
fn secs_until(until: u64, now: u64) -> u64 {
    until.saturating_sub(now).div_ceil(1000).max(1)
}
