use crate::limiter::SweepReport;
use lazy_static::lazy_static;
use prometheus::{
    register_gauge, register_histogram_vec, register_int_counter_vec, register_int_gauge_vec,
    Gauge, HistogramVec, IntCounterVec, IntGaugeVec,
};

lazy_static! {
    // Decision metrics
    pub static ref DECISIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "warden_decisions_total",
        "Admission decisions by policy and outcome",
        &["policy", "outcome"]
    ).unwrap();

    pub static ref VIOLATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "warden_violations_total",
        "Requests that exceeded the window ceiling",
        &["policy"]
    ).unwrap();

    pub static ref BLACKLISTED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "warden_blacklisted_total",
        "Clients put on the blacklist",
        &["policy"]
    ).unwrap();

    pub static ref HOOK_FAILURES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "warden_hook_failures_total",
        "Limit-reached hooks that returned an error or panicked",
        &["policy"]
    ).unwrap();

    // Latency metrics
    pub static ref ADMIT_DURATION: HistogramVec = register_histogram_vec!(
        "warden_admit_duration_seconds",
        "Time spent deciding one request",
        &["policy"],
        vec![0.000_001, 0.000_005, 0.000_01, 0.000_05, 0.000_1, 0.000_5, 0.001, 0.005]
    ).unwrap();

    // State metrics
    pub static ref EVICTIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "warden_evicted_buckets_total",
        "Idle client buckets removed by the sweeper",
        &["policy"]
    ).unwrap();

    pub static ref TRACKED_BUCKETS: IntGaugeVec = register_int_gauge_vec!(
        "warden_tracked_buckets",
        "Client buckets currently held in memory",
        &["policy"]
    ).unwrap();

    pub static ref BLACKLIST_SIZE: IntGaugeVec = register_int_gauge_vec!(
        "warden_blacklist_size",
        "Clients currently blacklisted",
        &["policy"]
    ).unwrap();

    // Config metrics
    pub static ref CONFIG_RELOADS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "warden_config_reloads_total",
        "Policy configuration reloads",
        &["result"]
    ).unwrap();

    pub static ref ACTIVE_POLICIES: Gauge = register_gauge!(
        "warden_active_policies",
        "Number of policies currently registered"
    ).unwrap();
}

/// Record one admission decision
pub fn record_decision(policy: &str, outcome: &str, duration_secs: f64) {
    DECISIONS_TOTAL.with_label_values(&[policy, outcome]).inc();
    ADMIT_DURATION
        .with_label_values(&[policy])
        .observe(duration_secs);
}

pub fn record_violation(policy: &str) {
    VIOLATIONS_TOTAL.with_label_values(&[policy]).inc();
}

pub fn record_blacklisted(policy: &str) {
    BLACKLISTED_TOTAL.with_label_values(&[policy]).inc();
}

pub fn record_hook_failure(policy: &str) {
    HOOK_FAILURES_TOTAL.with_label_values(&[policy]).inc();
}

/// Record a sweep and the resulting state sizes
pub fn record_sweep(policy: &str, report: &SweepReport, buckets: usize, blacklisted: usize) {
    EVICTIONS_TOTAL
        .with_label_values(&[policy])
        .inc_by(report.evicted_buckets as u64);
    TRACKED_BUCKETS
        .with_label_values(&[policy])
        .set(buckets as i64);
    BLACKLIST_SIZE
        .with_label_values(&[policy])
        .set(blacklisted as i64);
}

/// Update config metrics
pub fn update_config_metrics(policy_count: usize) {
    ACTIVE_POLICIES.set(policy_count as f64);
}

/// Record config reload
pub fn record_config_reload(success: bool) {
    let result = if success { "success" } else { "error" };
    CONFIG_RELOADS_TOTAL.with_label_values(&[result]).inc();
}

/// Render every registered metric in the text exposition format
pub fn gather_text() -> Result<String, String> {
    use prometheus::{Encoder, TextEncoder};

    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| format!("Failed to encode metrics: {}", e))?;

    String::from_utf8(buffer).map_err(|e| format!("Failed to convert metrics to UTF-8: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gather_includes_recorded_decision() {
        record_decision("metrics_test", "admitted", 0.000_002);
        let text = gather_text().unwrap();
        assert!(text.contains("warden_decisions_total"));
        assert!(text.contains("metrics_test"));
    }

    #[test]
    fn test_sweep_counts_evictions_as_integers() {
        let report = SweepReport {
            evicted_buckets: 2,
            expired_blocks: 0,
        };
        record_sweep("metrics_sweep_test", &report, 5, 1);
        record_sweep("metrics_sweep_test", &report, 3, 0);

        let evicted: u64 = EVICTIONS_TOTAL
            .with_label_values(&["metrics_sweep_test"])
            .get();
        assert_eq!(evicted, 4);
        assert_eq!(
            TRACKED_BUCKETS.with_label_values(&["metrics_sweep_test"]).get(),
            3
        );
    }
}
