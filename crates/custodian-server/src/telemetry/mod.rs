// SPDX-License-Identifier: Apache-2.0

use axum::http::StatusCode;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;

/// Per-route request counters and latency samples, rendered as a plaintext
/// exposition on `/metrics`.
#[derive(Default)]
pub struct RequestMetrics {
    counts: Mutex<HashMap<(String, u16), u64>>,
    latency_ns: Mutex<HashMap<String, Vec<u64>>>,
}

impl RequestMetrics {
    pub(crate) async fn observe_request(&self, route: &str, status: StatusCode, latency: Duration) {
        let mut counts = self.counts.lock().await;
        *counts
            .entry((route.to_string(), status.as_u16()))
            .or_insert(0) += 1;
        drop(counts);
        let mut latency_map = self.latency_ns.lock().await;
        latency_map
            .entry(route.to_string())
            .or_default()
            .push(latency.as_nanos() as u64);
    }

    pub(crate) async fn render(&self) -> String {
        let mut out = String::new();
        let counts = self.counts.lock().await;
        let mut count_rows: Vec<(&(String, u16), &u64)> = counts.iter().collect();
        count_rows.sort_by(|a, b| a.0.cmp(b.0));
        for ((route, status), count) in count_rows {
            out.push_str(&format!(
                "custodian_http_requests_total{{route=\"{route}\",status=\"{status}\"}} {count}\n"
            ));
        }
        drop(counts);
        let latencies = self.latency_ns.lock().await;
        let mut latency_rows: Vec<(&String, &Vec<u64>)> = latencies.iter().collect();
        latency_rows.sort_by(|a, b| a.0.cmp(b.0));
        for (route, samples) in latency_rows {
            if samples.is_empty() {
                continue;
            }
            let mut sorted = samples.clone();
            sorted.sort_unstable();
            let p95_index = ((sorted.len() as f64) * 0.95).ceil() as usize;
            let p95 = sorted[p95_index.saturating_sub(1).min(sorted.len() - 1)];
            out.push_str(&format!(
                "custodian_http_request_latency_p95_ms{{route=\"{route}\"}} {}\n",
                p95 / 1_000_000
            ));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rendered_metrics_carry_route_and_status() {
        let metrics = RequestMetrics::default();
        metrics
            .observe_request(
                "/rest/api/v1/owners",
                StatusCode::OK,
                Duration::from_millis(3),
            )
            .await;
        metrics
            .observe_request(
                "/rest/api/v1/owners",
                StatusCode::OK,
                Duration::from_millis(5),
            )
            .await;
        let rendered = metrics.render().await;
        assert!(rendered.contains(
            "custodian_http_requests_total{route=\"/rest/api/v1/owners\",status=\"200\"} 2"
        ));
        assert!(rendered.contains("custodian_http_request_latency_p95_ms"));
    }
}
