//! Route table of named limiters, swappable at runtime.

use crate::clock::{Clock, SystemClock};
use crate::config::{PolicyConfig, PolicyFileConfig};
use crate::limiter::{LimitNotifier, RateLimiter, TracingNotifier};
use crate::metrics;
use arc_swap::ArcSwap;
use std::sync::Arc;
use tracing::{debug, info};

struct RouteEntry {
    config: PolicyConfig,
    limiter: Arc<RateLimiter>,
}

struct RouteTable {
    /// Entries ordered by descending prefix length, so the first match wins.
    entries: Vec<RouteEntry>,
    config: PolicyFileConfig,
}

impl RouteTable {
    fn find_by_name(&self, name: &str) -> Option<&RouteEntry> {
        self.entries.iter().find(|e| e.config.name == name)
    }
}

pub struct PolicyRegistry {
    table: ArcSwap<RouteTable>,
    clock: Arc<dyn Clock>,
    notifier: Option<Arc<dyn LimitNotifier>>,
}

impl PolicyRegistry {
    /// Registry on the wall clock that logs every limit event
    pub fn new(config: PolicyFileConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock), Some(Arc::new(TracingNotifier)))
    }

    pub fn with_clock(
        config: PolicyFileConfig,
        clock: Arc<dyn Clock>,
        notifier: Option<Arc<dyn LimitNotifier>>,
    ) -> Self {
        let registry = Self {
            table: ArcSwap::from_pointee(RouteTable {
                entries: vec![],
                config: PolicyFileConfig { policies: vec![] },
            }),
            clock,
            notifier,
        };
        registry.apply(config);
        registry
    }

    /// Replace the route table. Limiters whose configuration is unchanged
    /// are carried over together with their counters and blocks. A policy
    /// with any changed field gets a fresh limiter, which lifts its blocks
    /// and clears its violation counts.
    pub fn apply(&self, config: PolicyFileConfig) {
        let current = self.table.load();
        let mut reused = 0;

        let mut entries: Vec<RouteEntry> = config
            .policies
            .iter()
            .map(|policy_config| {
                let limiter = match current.find_by_name(&policy_config.name) {
                    Some(existing) if existing.config == *policy_config => {
                        reused += 1;
                        existing.limiter.clone()
                    }
                    _ => Arc::new(self.build_limiter(policy_config)),
                };
                RouteEntry {
                    config: policy_config.clone(),
                    limiter,
                }
            })
            .collect();
        entries.sort_by(|a, b| b.config.route_prefix.len().cmp(&a.config.route_prefix.len()));

        info!(
            "Applying {} policies ({} carried over with live state)",
            entries.len(),
            reused
        );
        metrics::update_config_metrics(entries.len());

        self.table.store(Arc::new(RouteTable { entries, config }));
    }

    fn build_limiter(&self, config: &PolicyConfig) -> RateLimiter {
        debug!("Building limiter for policy '{}'", config.name);
        let limiter = RateLimiter::with_clock(config.to_policy(), self.clock.clone());
        match &self.notifier {
            Some(notifier) => limiter.with_notifier(notifier.clone()),
            None => limiter,
        }
    }

    pub fn by_name(&self, name: &str) -> Option<Arc<RateLimiter>> {
        self.table
            .load()
            .find_by_name(name)
            .map(|e| e.limiter.clone())
    }

    /// Limiter with the longest route prefix matching `path`
    pub fn for_path(&self, path: &str) -> Option<Arc<RateLimiter>> {
        self.table
            .load()
            .entries
            .iter()
            .find(|e| prefix_matches(&e.config.route_prefix, path))
            .map(|e| e.limiter.clone())
    }

    pub fn limiters(&self) -> Vec<Arc<RateLimiter>> {
        self.table
            .load()
            .entries
            .iter()
            .map(|e| e.limiter.clone())
            .collect()
    }

    /// Policy names in configuration order
    pub fn names(&self) -> Vec<String> {
        self.table
            .load()
            .config
            .policies
            .iter()
            .map(|p| p.name.clone())
            .collect()
    }

    pub fn config(&self) -> PolicyFileConfig {
        self.table.load().config.clone()
    }
}

/// Prefix match on path segment boundaries: `/api` covers `/api` and
/// `/api/x` but not `/apix`.
fn prefix_matches(prefix: &str, path: &str) -> bool {
    if prefix == "/" {
        return true;
    }
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/') || prefix.ends_with('/'),
        None => false,
    }
}
