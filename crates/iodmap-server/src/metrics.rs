//! Per-operation handler metrics

use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Counters for one operation
#[derive(Debug, Default)]
pub struct OpMetrics {
    pub requests_total: AtomicU64,
    pub requests_success: AtomicU64,
    pub requests_error: AtomicU64,
    pub latency_sum_us: AtomicU64,
    pub bytes_sent: AtomicU64,
    pub bytes_received: AtomicU64,
}

impl OpMetrics {
    pub fn record(&self, success: bool, latency: Duration, bytes_in: u64, bytes_out: u64) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        if success {
            self.requests_success.fetch_add(1, Ordering::Relaxed);
        } else {
            self.requests_error.fetch_add(1, Ordering::Relaxed);
        }
        let latency_us = u64::try_from(latency.as_micros()).unwrap_or(u64::MAX);
        self.latency_sum_us.fetch_add(latency_us, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes_in, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes_out, Ordering::Relaxed);
    }

    pub fn successes(&self) -> u64 {
        self.requests_success.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.requests_error.load(Ordering::Relaxed)
    }
}

/// Metrics collector for the map handlers
#[derive(Debug, Default)]
pub struct HandlerMetrics {
    pub create: OpMetrics,
    pub open: OpMetrics,
    pub set: OpMetrics,
    pub get: OpMetrics,
    pub get_count: OpMetrics,
    pub exists: OpMetrics,
    pub delete: OpMetrics,
    pub close: OpMetrics,
    /// Cleanup releases that failed after the response was decided
    pub release_errors: AtomicU64,
}

impl HandlerMetrics {
    pub fn record_release_error(&self) {
        self.release_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn release_errors(&self) -> u64 {
        self.release_errors.load(Ordering::Relaxed)
    }

    fn ops(&self) -> [(&'static str, &OpMetrics); 8] {
        [
            ("create", &self.create),
            ("open", &self.open),
            ("set", &self.set),
            ("get", &self.get),
            ("get_count", &self.get_count),
            ("exists", &self.exists),
            ("delete", &self.delete),
            ("close", &self.close),
        ]
    }

    /// Export metrics in Prometheus format
    pub fn export_prometheus(&self, server: &str) -> String {
        let mut output = String::with_capacity(4 * 1024);

        let _ = writeln!(
            output,
            "# HELP iodmap_map_requests_total Total map requests by operation and status"
        );
        let _ = writeln!(output, "# TYPE iodmap_map_requests_total counter");
        for (op, metrics) in self.ops() {
            for (status, value) in [("success", metrics.successes()), ("error", metrics.errors())] {
                let _ = writeln!(
                    output,
                    "iodmap_map_requests_total{{server=\"{}\",op=\"{}\",status=\"{}\"}} {}",
                    server, op, status, value
                );
            }
        }

        let _ = writeln!(
            output,
            "# HELP iodmap_map_latency_seconds_sum Sum of map request latencies"
        );
        let _ = writeln!(output, "# TYPE iodmap_map_latency_seconds_sum counter");
        for (op, metrics) in self.ops() {
            let sum_us = metrics.latency_sum_us.load(Ordering::Relaxed);
            let _ = writeln!(
                output,
                "iodmap_map_latency_seconds_sum{{server=\"{}\",op=\"{}\"}} {}",
                server,
                op,
                Duration::from_micros(sum_us).as_secs_f64()
            );
        }

        let _ = writeln!(
            output,
            "# HELP iodmap_map_bytes_total Value bytes moved by map requests"
        );
        let _ = writeln!(output, "# TYPE iodmap_map_bytes_total counter");
        for (op, metrics) in self.ops() {
            let received = metrics.bytes_received.load(Ordering::Relaxed);
            let sent = metrics.bytes_sent.load(Ordering::Relaxed);
            if received > 0 {
                let _ = writeln!(
                    output,
                    "iodmap_map_bytes_total{{server=\"{}\",op=\"{}\",direction=\"in\"}} {}",
                    server, op, received
                );
            }
            if sent > 0 {
                let _ = writeln!(
                    output,
                    "iodmap_map_bytes_total{{server=\"{}\",op=\"{}\",direction=\"out\"}} {}",
                    server, op, sent
                );
            }
        }

        let _ = writeln!(
            output,
            "# HELP iodmap_map_release_errors_total Resource releases that failed during cleanup"
        );
        let _ = writeln!(output, "# TYPE iodmap_map_release_errors_total counter");
        let _ = writeln!(
            output,
            "iodmap_map_release_errors_total{{server=\"{}\"}} {}",
            server,
            self.release_errors()
        );

        output
    }
}
