use crate::registry::PolicyRegistry;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// Spawn the periodic maintenance task. Every `interval` it runs `tick_now`
/// on each limiter currently registered, independent of request traffic.
pub fn spawn_sweeper(registry: Arc<PolicyRegistry>, interval: Duration) -> JoinHandle<()> {
    info!("Starting sweeper (interval: {:?})", interval);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            for limiter in registry.limiters() {
                let report = limiter.tick_now();
                if !report.is_empty() {
                    debug!(
                        policy = %limiter.policy().name,
                        evicted = report.evicted_buckets,
                        expired_blocks = report.expired_blocks,
                        "Sweep removed stale state"
                    );
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::{PolicyConfig, PolicyFileConfig};
    use crate::limiter::RequestParts;

    struct Req;

    impl RequestParts for Req {
        fn header(&self, name: &str) -> Option<&str> {
            (name == "cf-connecting-ip").then_some("3.3.3.3")
        }

        fn path(&self) -> &str {
            "/"
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_evicts_idle_clients() {
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let registry = Arc::new(PolicyRegistry::with_clock(
            PolicyFileConfig {
                policies: vec![PolicyConfig::new("default", "/")],
            },
            clock.clone(),
            None,
        ));

        let limiter = registry.by_name("default").unwrap();
        limiter.admit(&Req);
        assert_eq!(limiter.tracked_clients(), 1);

        let handle = spawn_sweeper(registry.clone(), Duration::from_secs(30));

        // Idle for less than three windows: kept
        clock.advance(Duration::from_secs(120));
        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(limiter.tracked_clients(), 1);

        clock.advance(Duration::from_secs(120));
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(limiter.tracked_clients(), 0);

        handle.abort();
    }
}
