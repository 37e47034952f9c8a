use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Process-wide counters. The only state shared across connections; atomic
/// increment/decrement only.
#[derive(Debug, Default)]
pub struct MetricsStore {
    active_sessions: AtomicI64,
    bytes_in: AtomicU64,
    bytes_out: AtomicU64,
    upstream_errors: AtomicU64,
}

impl MetricsStore {
    pub fn session_started(&self) {
        self.active_sessions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn session_ended(&self) {
        self.active_sessions.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn add_bytes_in(&self, count: u64) {
        self.bytes_in.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_bytes_out(&self, count: u64) {
        self.bytes_out.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_upstream_error(&self) {
        self.upstream_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn active_sessions(&self) -> i64 {
        self.active_sessions.load(Ordering::Relaxed)
    }

    pub fn bytes_in(&self) -> u64 {
        self.bytes_in.load(Ordering::Relaxed)
    }

    pub fn bytes_out(&self) -> u64 {
        self.bytes_out.load(Ordering::Relaxed)
    }

    pub fn render_prometheus(&self) -> String {
        let mut out = String::new();
        out.push_str("# HELP asr_gateway_active_sessions Active WebSocket sessions\n");
        out.push_str("# TYPE asr_gateway_active_sessions gauge\n");
        out.push_str(&format!(
            "asr_gateway_active_sessions {}\n",
            self.active_sessions.load(Ordering::Relaxed)
        ));

        out.push_str("# HELP asr_gateway_bytes_in Total bytes received from clients\n");
        out.push_str("# TYPE asr_gateway_bytes_in counter\n");
        out.push_str(&format!(
            "asr_gateway_bytes_in {}\n",
            self.bytes_in.load(Ordering::Relaxed)
        ));

        out.push_str("# HELP asr_gateway_bytes_out Total bytes sent to clients\n");
        out.push_str("# TYPE asr_gateway_bytes_out counter\n");
        out.push_str(&format!(
            "asr_gateway_bytes_out {}\n",
            self.bytes_out.load(Ordering::Relaxed)
        ));

        out.push_str("# HELP asr_gateway_upstream_errors Total upstream errors observed\n");
        out.push_str("# TYPE asr_gateway_upstream_errors counter\n");
        out.push_str(&format!(
            "asr_gateway_upstream_errors {}\n",
            self.upstream_errors.load(Ordering::Relaxed)
        ));

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_track_session_lifecycle() {
        let metrics = MetricsStore::default();
        metrics.session_started();
        metrics.session_started();
        metrics.session_ended();
        metrics.add_bytes_in(5);
        metrics.add_bytes_out(120);
        metrics.add_upstream_error();

        assert_eq!(metrics.active_sessions(), 1);
        assert_eq!(metrics.bytes_in(), 5);
        assert_eq!(metrics.bytes_out(), 120);
    }

    #[test]
    fn prometheus_rendering_lists_every_metric() {
        let metrics = MetricsStore::default();
        metrics.add_bytes_in(42);
        let text = metrics.render_prometheus();
        assert!(text.contains("# TYPE asr_gateway_active_sessions gauge\n"));
        assert!(text.contains("asr_gateway_bytes_in 42\n"));
        assert!(text.contains("asr_gateway_bytes_out 0\n"));
        assert!(text.contains("asr_gateway_upstream_errors 0\n"));
    }
}
