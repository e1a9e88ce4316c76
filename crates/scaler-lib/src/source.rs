//! Metrics source boundary and the Prometheus-backed implementation

use crate::models::MetricsSnapshot;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use url::Url;

/// Supplies resource snapshots for the scaled workload
#[async_trait]
pub trait MetricsSource: Send + Sync {
    /// Current totals across all pods of the workload
    async fn get_snapshot(&self) -> Result<MetricsSnapshot>;

    /// Snapshots covering the trailing `window`, oldest first
    async fn get_historical(&self, window: Duration) -> Result<Vec<MetricsSnapshot>>;

    /// Cheap liveness probe of the backend
    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

/// PromQL for one workload, selected by namespace and pod name prefix
#[derive(Debug, Clone)]
struct WorkloadQueries {
    pod_count: String,
    cpu_millicores: String,
    memory_bytes: String,
    network_bytes: String,
}

impl WorkloadQueries {
    fn new(namespace: &str, pod_prefix: &str) -> Self {
        let selector = format!(r#"namespace="{}", pod=~"{}.*""#, namespace, pod_prefix);
        Self {
            pod_count: format!("count(kube_pod_info{{{}}})", selector),
            cpu_millicores: format!(
                "sum(rate(container_cpu_usage_seconds_total{{{}}}[1m])) * 1000",
                selector
            ),
            memory_bytes: format!("sum(container_memory_working_set_bytes{{{}}})", selector),
            network_bytes: format!(
                "sum(rate(container_network_receive_bytes_total{{{s}}}[1m])) + sum(rate(container_network_transmit_bytes_total{{{s}}}[1m]))",
                s = selector
            ),
        }
    }
}

#[derive(Debug, Deserialize)]
struct PromResponse {
    status: String,
    #[serde(default)]
    data: Option<PromData>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PromData {
    #[serde(default)]
    result: Vec<PromSeries>,
}

#[derive(Debug, Deserialize)]
struct PromSeries {
    #[serde(default)]
    value: Option<(f64, String)>,
    #[serde(default)]
    values: Vec<(f64, String)>,
}

impl PromResponse {
    fn into_series(self) -> Result<Vec<PromSeries>> {
        if self.status != "success" {
            let detail = self.error.unwrap_or(self.status);
            anyhow::bail!("Prometheus query failed: {}", detail);
        }
        Ok(self.data.map(|d| d.result).unwrap_or_default())
    }
}

/// First sample of an instant-vector result, if any
///
/// `NaN` and infinite samples are reported as missing.
fn instant_value(response: PromResponse) -> Result<Option<f64>> {
    match response.into_series()?.into_iter().next() {
        Some(PromSeries {
            value: Some((_, raw)),
            ..
        }) => {
            let value = raw
                .parse::<f64>()
                .with_context(|| format!("Invalid sample value {:?}", raw))?;
            Ok(value.is_finite().then_some(value))
        }
        _ => Ok(None),
    }
}

/// Samples of the first range-vector series keyed by unix timestamp
fn range_values(response: PromResponse) -> Result<BTreeMap<i64, f64>> {
    let mut out = BTreeMap::new();
    if let Some(series) = response.into_series()?.into_iter().next() {
        for (ts, raw) in series.values {
            let value = raw
                .parse::<f64>()
                .with_context(|| format!("Invalid sample value {:?}", raw))?;
            if value.is_finite() {
                out.insert(ts as i64, value);
            }
        }
    }
    Ok(out)
}

/// Join per-metric ranges on timestamps where pod count and CPU are both present
fn merge_ranges(
    pods: &BTreeMap<i64, f64>,
    cpu: &BTreeMap<i64, f64>,
    memory: &BTreeMap<i64, f64>,
    network: &BTreeMap<i64, f64>,
) -> Vec<MetricsSnapshot> {
    pods.iter()
        .filter_map(|(ts, pod_count)| {
            let cpu = cpu.get(ts)?;
            Some(MetricsSnapshot {
                timestamp: *ts,
                cpu_millicores_total: *cpu,
                memory_bytes_total: memory.get(ts).copied().unwrap_or(0.0).max(0.0) as u64,
                network_bytes_per_sec: network.get(ts).copied().unwrap_or(0.0),
                pod_count: pod_count.max(0.0).round() as u32,
            })
        })
        .collect()
}

/// Reads workload metrics from the Prometheus HTTP API
pub struct PrometheusSource {
    client: Client,
    base_url: Url,
    queries: WorkloadQueries,
    step: Duration,
}

impl PrometheusSource {
    /// `step` is the resolution used for historical range queries
    pub fn new(base_url: &str, namespace: &str, pod_prefix: &str, step: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to create HTTP client")?;
        // Relative joins must keep any path prefix
        let mut base_url = Url::parse(base_url).context("Invalid Prometheus URL")?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            client,
            base_url,
            queries: WorkloadQueries::new(namespace, pod_prefix),
            step: step.max(Duration::from_secs(1)),
        })
    }

    async fn get(&self, path: &str, params: &[(&str, String)]) -> Result<PromResponse> {
        let url = self.base_url.join(path).context("Invalid path")?;
        let response = self
            .client
            .get(url)
            .query(params)
            .send()
            .await
            .context("Failed to reach Prometheus")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Prometheus error ({}): {}", status, body);
        }

        response.json().await.context("Failed to parse Prometheus response")
    }

    async fn instant(&self, query: &str) -> Result<Option<f64>> {
        instant_value(self.get("api/v1/query", &[("query", query.to_string())]).await?)
    }

    async fn range(&self, query: &str, start: i64, end: i64) -> Result<BTreeMap<i64, f64>> {
        let params = [
            ("query", query.to_string()),
            ("start", start.to_string()),
            ("end", end.to_string()),
            ("step", format!("{}s", self.step.as_secs())),
        ];
        range_values(self.get("api/v1/query_range", &params).await?)
    }
}

#[async_trait]
impl MetricsSource for PrometheusSource {
    async fn get_snapshot(&self) -> Result<MetricsSnapshot> {
        let q = &self.queries;
        let (pods, cpu, memory, network) = tokio::try_join!(
            self.instant(&q.pod_count),
            self.instant(&q.cpu_millicores),
            self.instant(&q.memory_bytes),
            self.instant(&q.network_bytes),
        )?;

        let pods = pods.context("No pod count series for workload")?;
        let cpu = cpu.context("No CPU usage series for workload")?;
        let memory = memory.context("No memory usage series for workload")?;

        Ok(MetricsSnapshot {
            timestamp: chrono::Utc::now().timestamp(),
            cpu_millicores_total: cpu,
            memory_bytes_total: memory.max(0.0) as u64,
            network_bytes_per_sec: network.unwrap_or(0.0),
            pod_count: pods.max(0.0).round() as u32,
        })
    }

    async fn get_historical(&self, window: Duration) -> Result<Vec<MetricsSnapshot>> {
        let end = chrono::Utc::now().timestamp();
        let start = end - window.as_secs() as i64;
        let q = &self.queries;
        let (pods, cpu, memory, network) = tokio::try_join!(
            self.range(&q.pod_count, start, end),
            self.range(&q.cpu_millicores, start, end),
            self.range(&q.memory_bytes, start, end),
            self.range(&q.network_bytes, start, end),
        )?;
        Ok(merge_ranges(&pods, &cpu, &memory, &network))
    }

    async fn health_check(&self) -> Result<()> {
        let url = self.base_url.join("-/healthy").context("Invalid path")?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to reach Prometheus")?;
        if !response.status().is_success() {
            anyhow::bail!("Prometheus unhealthy ({})", response.status());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(body: &str) -> PromResponse {
        serde_json::from_str(body).unwrap()
    }

    #[test]
    fn test_queries_select_workload() {
        let q = WorkloadQueries::new("shop", "checkout");
        assert_eq!(
            q.pod_count,
            r#"count(kube_pod_info{namespace="shop", pod=~"checkout.*"})"#
        );
        assert!(q.cpu_millicores.ends_with("[1m])) * 1000"));
        assert!(q.network_bytes.contains("container_network_transmit_bytes_total"));
    }

    #[test]
    fn test_instant_value() {
        let body = r#"{"status":"success","data":{"resultType":"vector","result":[{"metric":{},"value":[1704067200.5,"1350.25"]}]}}"#;
        assert_eq!(instant_value(parse(body)).unwrap(), Some(1350.25));
    }

    #[test]
    fn test_instant_value_empty_result() {
        let body = r#"{"status":"success","data":{"resultType":"vector","result":[]}}"#;
        assert_eq!(instant_value(parse(body)).unwrap(), None);
    }

    #[test]
    fn test_error_status() {
        let body = r#"{"status":"error","errorType":"bad_data","error":"parse error"}"#;
        let err = instant_value(parse(body)).unwrap_err();
        assert!(err.to_string().contains("parse error"));
    }

    #[test]
    fn test_non_finite_instant_is_missing() {
        for raw in ["NaN", "+Inf", "-Inf"] {
            let body = format!(
                r#"{{"status":"success","data":{{"result":[{{"value":[1.0,"{}"]}}]}}}}"#,
                raw
            );
            assert_eq!(instant_value(parse(&body)).unwrap(), None, "{}", raw);
        }
    }

    #[test]
    fn test_invalid_sample_value() {
        let body = r#"{"status":"success","data":{"result":[{"value":[1.0,"abc"]}]}}"#;
        assert!(instant_value(parse(body)).is_err());
    }

    #[test]
    fn test_range_merge() {
        let pods = range_values(parse(
            r#"{"status":"success","data":{"resultType":"matrix","result":[{"metric":{},"values":[[100,"2"],[130,"2"],[160,"3"]]}]}}"#,
        ))
        .unwrap();
        let cpu = range_values(parse(
            r#"{"status":"success","data":{"result":[{"values":[[100,"800"],[160,"1500"]]}]}}"#,
        ))
        .unwrap();
        let memory = range_values(parse(
            r#"{"status":"success","data":{"result":[{"values":[[100,"1048576"],[130,"1048576"],[160,"2097152"]]}]}}"#,
        ))
        .unwrap();
        let network = BTreeMap::new();

        let snapshots = merge_ranges(&pods, &cpu, &memory, &network);
        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[0].timestamp, 100);
        assert_eq!(snapshots[0].pod_count, 2);
        assert_eq!(snapshots[1].cpu_millicores_total, 1500.0);
        assert_eq!(snapshots[1].memory_bytes_total, 2_097_152);
        assert_eq!(snapshots[1].network_bytes_per_sec, 0.0);
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(PrometheusSource::new("not a url", "default", "web", Duration::from_secs(30)).is_err());
    }
}
