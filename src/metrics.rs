use crate::control::ControlAction;
use prometheus::core::Collector;
use prometheus::{
    histogram_opts, opts, CounterVec, Encoder, Gauge, HistogramVec, Registry, TextEncoder,
};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub http_requests_total: CounterVec,
    pub http_request_duration_seconds: HistogramVec,
    pub control_actions_total: CounterVec,
    pub uptime_seconds: Gauge,
}

impl Metrics {
    pub fn new() -> Result<Arc<Self>, prometheus::Error> {
        let registry = Registry::new();

        let http_requests_total = CounterVec::new(
            opts!(
                "statusd_http_requests_total",
                "HTTP requests served by method and status code"
            ),
            &["method", "status"],
        )?;
        let http_request_duration_seconds = HistogramVec::new(
            histogram_opts!(
                "statusd_http_request_duration_seconds",
                "HTTP request latency in seconds by method",
                vec![0.005, 0.025, 0.1, 0.5, 1.0, 2.5, 5.0]
            ),
            &["method"],
        )?;
        let control_actions_total = CounterVec::new(
            opts!(
                "statusd_control_actions_total",
                "Completed control actions by action"
            ),
            &["action"],
        )?;
        let uptime_seconds = Gauge::with_opts(opts!(
            "statusd_uptime_seconds",
            "Seconds since the service started"
        ))?;

        register(&registry, &http_requests_total)?;
        register(&registry, &http_request_duration_seconds)?;
        register(&registry, &control_actions_total)?;
        register(&registry, &uptime_seconds)?;

        for action in ControlAction::ALL {
            control_actions_total.with_label_values(&[action.as_str()]);
        }

        Ok(Arc::new(Self {
            registry,
            http_requests_total,
            http_request_duration_seconds,
            control_actions_total,
            uptime_seconds,
        }))
    }

    pub fn observe_request(&self, method: &str, status: u16, latency: Duration) {
        self.http_requests_total
            .with_label_values(&[method, &status.to_string()])
            .inc();
        self.http_request_duration_seconds
            .with_label_values(&[method])
            .observe(latency.as_secs_f64());
    }

    pub fn inc_control_action(&self, action: ControlAction) {
        self.control_actions_total
            .with_label_values(&[action.as_str()])
            .inc();
    }

    pub fn set_uptime(&self, uptime: Duration) {
        self.uptime_seconds.set(uptime.as_secs_f64());
    }

    pub fn encode_metrics(&self) -> Result<Vec<u8>, prometheus::Error> {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        let mf = self.registry.gather();
        encoder.encode(&mf, &mut buf)?;
        Ok(buf)
    }
}

fn register<T: Collector + Clone + 'static>(
    registry: &Registry,
    collector: &T,
) -> Result<(), prometheus::Error> {
    registry.register(Box::new(collector.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_registered_families() {
        let metrics = Metrics::new().expect("metrics init");
        metrics.observe_request("GET", 200, Duration::from_millis(3));
        metrics.inc_control_action(ControlAction::Restart);
        metrics.set_uptime(Duration::from_secs(42));

        let text = String::from_utf8(metrics.encode_metrics().unwrap()).unwrap();
        assert!(text.contains("statusd_http_requests_total{method=\"GET\",status=\"200\"} 1"));
        assert!(text.contains("statusd_control_actions_total{action=\"restart\"} 1"));
        assert!(text.contains("statusd_control_actions_total{action=\"start\"} 0"));
        assert!(text.contains("statusd_uptime_seconds 42"));
        assert!(text.contains("statusd_http_request_duration_seconds_bucket"));
    }
}
