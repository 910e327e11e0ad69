// src/publisher.rs

//! Per-region batching of derived metrics

use std::collections::BTreeMap;

use tracing::debug;

use crate::callbacks::MetricPublisher;
use crate::error::MonitorResult;
use crate::types::MetricDatum;

/// Most data points one publish call accepts
pub const MAX_METRICS_PER_CALL: usize = 20;

/// Metric data accumulated during an invocation, keyed by destination region.
///
/// Order is preserved within a region; regions are published in key order.
#[derive(Debug, Clone, Default)]
pub struct MetricBatches {
    by_region: BTreeMap<String, Vec<MetricDatum>>,
}

impl MetricBatches {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push<R: Into<String>>(&mut self, region: R, datum: MetricDatum) {
        self.by_region.entry(region.into()).or_default().push(datum);
    }

    /// Data points queued across all regions
    pub fn len(&self) -> usize {
        self.by_region.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn regions(&self) -> impl Iterator<Item = &str> {
        self.by_region.keys().map(String::as_str)
    }

    /// Send everything in chunks of at most [`MAX_METRICS_PER_CALL`]; returns data points written
    pub async fn publish(
        &self,
        publisher: &dyn MetricPublisher,
        namespace: &str,
    ) -> MonitorResult<usize> {
        let mut written = 0;
        for (region, data) in &self.by_region {
            for chunk in data.chunks(MAX_METRICS_PER_CALL) {
                publisher.put_metric_data(region, namespace, chunk).await?;
                written += chunk.len();
                debug!(region = %region, count = chunk.len(), "Put data for metrics");
            }
        }
        Ok(written)
    }
}

#[cfg(feature = "prometheus-metrics")]
pub use self::prometheus_mirror::PrometheusPublisher;

#[cfg(feature = "prometheus-metrics")]
mod prometheus_mirror {
    use async_trait::async_trait;
    use prometheus::{Encoder, GaugeVec, Opts, Registry, TextEncoder};

    use crate::callbacks::MetricPublisher;
    use crate::error::{MonitorError, MonitorResult};
    use crate::types::MetricDatum;

    /// Mirrors published metric data into a Prometheus gauge for scraping hosts
    pub struct PrometheusPublisher {
        registry: Registry,
        gauge: GaugeVec,
    }

    fn registry_error(err: prometheus::Error) -> MonitorError {
        MonitorError::upstream("prometheus".to_string(), err.to_string())
    }

    impl PrometheusPublisher {
        pub fn new() -> MonitorResult<Self> {
            let registry = Registry::new();
            let gauge = GaugeVec::new(
                Opts::new(
                    "personalize_monitor_metric",
                    "Last value published by the personalize monitor",
                ),
                &["region", "namespace", "metric", "resource"],
            )
            .map_err(registry_error)?;
            registry
                .register(Box::new(gauge.clone()))
                .map_err(registry_error)?;

            Ok(Self { registry, gauge })
        }

        pub fn registry(&self) -> &Registry {
            &self.registry
        }

        /// Text exposition of every mirrored metric
        pub fn render(&self) -> MonitorResult<String> {
            let mut buffer = Vec::new();
            TextEncoder::new()
                .encode(&self.registry.gather(), &mut buffer)
                .map_err(registry_error)?;
            String::from_utf8(buffer)
                .map_err(|err| MonitorError::upstream("prometheus".to_string(), err.to_string()))
        }
    }

    #[async_trait]
    impl MetricPublisher for PrometheusPublisher {
        async fn put_metric_data(
            &self,
            region: &str,
            namespace: &str,
            data: &[MetricDatum],
        ) -> MonitorResult<()> {
            for datum in data {
                let resource = datum
                    .dimensions
                    .first()
                    .map(|dimension| dimension.value.as_str())
                    .unwrap_or("");
                self.gauge
                    .get_metric_with_label_values(&[region, namespace, datum.metric_name.as_str(), resource])
                    .map_err(registry_error)?
                    .set(datum.value);
            }
            Ok(())
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callbacks::MockMetricPublisher;
    use crate::types::{MetricUnit, PROJECT_NAME};
    use std::sync::{Arc, Mutex};

    #[tokio::test]
    async fn test_chunks_of_twenty_per_region() {
        let mut batches = MetricBatches::new();
        for i in 0..45 {
            batches.push("us-east-1", MetricDatum::aggregate(format!("m{}", i), i as f64, MetricUnit::Count));
        }
        batches.push("eu-west-1", MetricDatum::aggregate("monitoredResourceCount", 1.0, MetricUnit::Count));
        assert_eq!(batches.len(), 46);

        let calls = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&calls);
        let mut publisher = MockMetricPublisher::new();
        publisher
            .expect_put_metric_data()
            .withf(|_, namespace, _| namespace == PROJECT_NAME)
            .times(4)
            .returning(move |region, _, data| {
                recorded
                    .lock()
                    .unwrap()
                    .push((region.to_string(), data.len(), data[0].metric_name.clone()));
                Ok(())
            });

        let written = batches.publish(&publisher, PROJECT_NAME).await.unwrap();
        assert_eq!(written, 46);

        let calls = calls.lock().unwrap();
        assert_eq!(
            *calls,
            vec![
                ("eu-west-1".to_string(), 1, "monitoredResourceCount".to_string()),
                ("us-east-1".to_string(), 20, "m0".to_string()),
                ("us-east-1".to_string(), 20, "m20".to_string()),
                ("us-east-1".to_string(), 5, "m40".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_empty_batches_publish_nothing() {
        let mut publisher = MockMetricPublisher::new();
        publisher.expect_put_metric_data().times(0);

        let written = MetricBatches::new().publish(&publisher, PROJECT_NAME).await.unwrap();
        assert_eq!(written, 0);
    }
}
