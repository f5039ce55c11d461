//! Service metrics: a request counter and a generation-latency histogram.
//!
//! Both are process-wide, updated with relaxed atomics so handlers can share
//! a `&Metrics` without locks, and exposed in Prometheus text format for
//! scraping. Neither resets except on process restart.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Histogram bucket upper bounds in microseconds (1ms to 60s, plus +Inf).
const LATENCY_BUCKETS_US: &[u64] = &[
    1_000,      // 1ms
    2_000,      // 2ms
    5_000,      // 5ms
    10_000,     // 10ms
    25_000,     // 25ms
    50_000,     // 50ms
    100_000,    // 100ms
    250_000,    // 250ms
    500_000,    // 500ms
    1_000_000,  // 1s
    2_500_000,  // 2.5s
    5_000_000,  // 5s
    10_000_000, // 10s
    30_000_000, // 30s
    60_000_000, // 60s
];

#[derive(Debug)]
pub struct Metrics {
    requests_total: AtomicU64,
    latency: LatencyHistogram,
}

impl Metrics {
    #[must_use]
    pub fn new() -> Self {
        Self {
            requests_total: AtomicU64::new(0),
            latency: LatencyHistogram::new(),
        }
    }

    /// Count one generation request. Called before any work is attempted,
    /// so failed requests are counted too.
    pub fn record_request(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record end-to-end generation latency. Observed exactly once per
    /// request, on the success and failure paths alike.
    pub fn observe_latency(&self, elapsed: Duration) {
        self.latency.observe(elapsed.as_micros() as u64);
    }

    #[must_use]
    pub fn requests_total(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn latency_count(&self) -> u64 {
        self.latency.count()
    }

    /// Render both metrics in Prometheus exposition format.
    #[must_use]
    pub fn to_prometheus(&self) -> String {
        use std::fmt::Write;

        let mut output = String::new();
        let _ = writeln!(
            output,
            "# HELP generate_requests_total Total number of text generation requests"
        );
        let _ = writeln!(output, "# TYPE generate_requests_total counter");
        let _ = writeln!(output, "generate_requests_total {}", self.requests_total());
        output.push_str(&self.latency.to_prometheus("generation_latency_seconds"));
        output
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixed-bucket latency histogram with atomic counters.
#[derive(Debug)]
pub struct LatencyHistogram {
    /// Count per bucket, one extra slot for values past the last bound.
    counts: Vec<AtomicU64>,
    total: AtomicU64,
    sum_us: AtomicU64,
}

impl LatencyHistogram {
    #[must_use]
    pub fn new() -> Self {
        let counts = (0..=LATENCY_BUCKETS_US.len())
            .map(|_| AtomicU64::new(0))
            .collect();
        Self {
            counts,
            total: AtomicU64::new(0),
            sum_us: AtomicU64::new(0),
        }
    }

    /// Record a latency value in microseconds.
    pub fn observe(&self, value_us: u64) {
        self.total.fetch_add(1, Ordering::Relaxed);
        self.sum_us.fetch_add(value_us, Ordering::Relaxed);

        let idx = LATENCY_BUCKETS_US
            .iter()
            .position(|&bound| value_us <= bound)
            .unwrap_or(LATENCY_BUCKETS_US.len());
        self.counts[idx].fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn count(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn sum_us(&self) -> u64 {
        self.sum_us.load(Ordering::Relaxed)
    }

    /// Export as a Prometheus histogram: cumulative `_bucket{le=...}` lines
    /// with bounds converted to seconds, then `_sum` and `_count`.
    #[must_use]
    pub fn to_prometheus(&self, name: &str) -> String {
        use std::fmt::Write;

        let mut output = String::new();
        let _ = writeln!(output, "# HELP {name} Time taken to generate responses");
        let _ = writeln!(output, "# TYPE {name} histogram");

        let mut cumulative = 0u64;
        for (i, &bound) in LATENCY_BUCKETS_US.iter().enumerate() {
            cumulative += self.counts[i].load(Ordering::Relaxed);
            let le = bound as f64 / 1_000_000.0;
            let _ = writeln!(output, "{name}_bucket{{le=\"{le:.6}\"}} {cumulative}");
        }
        cumulative += self.counts[LATENCY_BUCKETS_US.len()].load(Ordering::Relaxed);
        let _ = writeln!(output, "{name}_bucket{{le=\"+Inf\"}} {cumulative}");

        let sum_secs = self.sum_us.load(Ordering::Relaxed) as f64 / 1_000_000.0;
        let _ = writeln!(output, "{name}_sum {sum_secs:.6}");
        let _ = writeln!(output, "{name}_count {}", self.count());
        output
    }
}

impl Default for LatencyHistogram {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn new_metrics_start_at_zero() {
        let metrics = Metrics::new();
        assert_eq!(metrics.requests_total(), 0);
        assert_eq!(metrics.latency_count(), 0);
    }

    #[test]
    fn record_request_increments_counter() {
        let metrics = Metrics::new();
        metrics.record_request();
        metrics.record_request();
        assert_eq!(metrics.requests_total(), 2);
        // Counting a request does not touch the histogram.
        assert_eq!(metrics.latency_count(), 0);
    }

    #[test]
    fn observe_latency_updates_count_and_sum() {
        let metrics = Metrics::new();
        metrics.observe_latency(Duration::from_millis(100));
        metrics.observe_latency(Duration::from_millis(200));
        assert_eq!(metrics.latency_count(), 2);
        assert!(metrics.latency.sum_us() >= 300_000);
    }

    #[test]
    fn histogram_buckets_are_cumulative_in_exposition() {
        let hist = LatencyHistogram::new();
        hist.observe(500);       // <= 1ms bucket
        hist.observe(3_000);     // <= 5ms bucket
        hist.observe(90_000_000); // past the last bound

        let prom = hist.to_prometheus("generation_latency_seconds");
        assert!(prom.contains("generation_latency_seconds_bucket{le=\"0.001000\"} 1"));
        assert!(prom.contains("generation_latency_seconds_bucket{le=\"0.005000\"} 2"));
        assert!(prom.contains("generation_latency_seconds_bucket{le=\"+Inf\"} 3"));
        assert!(prom.contains("generation_latency_seconds_count 3"));
    }

    #[test]
    fn prometheus_output_carries_both_metrics() {
        let metrics = Metrics::new();
        metrics.record_request();
        metrics.observe_latency(Duration::from_millis(42));

        let prom = metrics.to_prometheus();
        assert!(prom.contains("# TYPE generate_requests_total counter"));
        assert!(prom.contains("generate_requests_total 1"));
        assert!(prom.contains("# TYPE generation_latency_seconds histogram"));
        assert!(prom.contains("generation_latency_seconds_count 1"));
    }

    #[test]
    fn concurrent_updates_are_not_lost() {
        let metrics = Arc::new(Metrics::new());
        let other = Arc::clone(&metrics);

        let handle = thread::spawn(move || {
            for _ in 0..100 {
                other.record_request();
                other.observe_latency(Duration::from_micros(100));
            }
        });
        for _ in 0..100 {
            metrics.record_request();
            metrics.observe_latency(Duration::from_micros(100));
        }
        handle.join().unwrap();

        assert_eq!(metrics.requests_total(), 200);
        assert_eq!(metrics.latency_count(), 200);
    }
}
