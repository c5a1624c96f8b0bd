use std::fmt;
use std::time::Duration;

use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::{exponential_buckets, linear_buckets, Histogram};
use prometheus_client::registry::Registry;

pub const CONTENT_TYPE: &str = "application/openmetrics-text; version=1.0.0; charset=utf-8";

#[derive(Debug, Clone, Hash, PartialEq, Eq, EncodeLabelSet)]
struct RequestLabels {
    endpoint: String,
    status_class: String,
}

#[derive(Debug, Clone, Hash, PartialEq, Eq, EncodeLabelSet)]
struct EndpointLabels {
    endpoint: String,
}

type HistogramFamily<L> = Family<L, Histogram, fn() -> Histogram>;

fn latency_histogram() -> Histogram {
    Histogram::new(exponential_buckets(0.005, 2.0, 12))
}

/// Process-wide registry behind `/metrics`.
pub struct ServiceMetrics {
    registry: Registry,
    http_requests: Family<RequestLabels, Counter>,
    http_latency: HistogramFamily<EndpointLabels>,
    query_latency: Histogram,
    retrieved_chunks: Histogram,
}

impl Default for ServiceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceMetrics {
    pub fn new() -> Self {
        let mut registry = Registry::default();
        let http_requests = Family::<RequestLabels, Counter>::default();
        let http_latency: HistogramFamily<EndpointLabels> =
            Family::new_with_constructor(latency_histogram);
        let query_latency = latency_histogram();
        let retrieved_chunks = Histogram::new(linear_buckets(0.0, 1.0, 11));
        registry.register(
            "http_requests",
            "HTTP requests by endpoint and status class",
            http_requests.clone(),
        );
        registry.register(
            "http_request_latency_seconds",
            "HTTP request latency by endpoint",
            http_latency.clone(),
        );
        registry.register(
            "query_latency_seconds",
            "End to end latency of served queries",
            query_latency.clone(),
        );
        registry.register(
            "retrieved_chunks",
            "Evidence chunks used per served query",
            retrieved_chunks.clone(),
        );
        Self {
            registry,
            http_requests,
            http_latency,
            query_latency,
            retrieved_chunks,
        }
    }

    pub fn observe_request(&self, endpoint: &str, status: u16, elapsed: Duration) {
        self.http_requests
            .get_or_create(&RequestLabels {
                endpoint: endpoint.to_string(),
                status_class: format!("{}xx", status / 100),
            })
            .inc();
        self.http_latency
            .get_or_create(&EndpointLabels {
                endpoint: endpoint.to_string(),
            })
            .observe(elapsed.as_secs_f64());
    }

    pub fn observe_query(&self, elapsed: Duration, chunks: usize) {
        self.query_latency.observe(elapsed.as_secs_f64());
        self.retrieved_chunks.observe(chunks as f64);
    }

    pub fn render(&self) -> Result<String, fmt::Error> {
        let mut body = String::new();
        encode(&mut body, &self.registry)?;
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_registered_series() {
        let metrics = ServiceMetrics::new();
        metrics.observe_request("/query", 200, Duration::from_millis(12));
        metrics.observe_request("/query", 429, Duration::from_millis(1));
        metrics.observe_query(Duration::from_millis(10), 2);
        let body = metrics.render().unwrap();
        assert!(body.contains(r#"http_requests_total{endpoint="/query",status_class="2xx"} 1"#));
        assert!(body.contains(r#"http_requests_total{endpoint="/query",status_class="4xx"} 1"#));
        assert!(body.contains("query_latency_seconds_count 1"));
        assert!(body.contains("retrieved_chunks_count 1"));
        assert!(body.ends_with("# EOF\n"));
    }
}
