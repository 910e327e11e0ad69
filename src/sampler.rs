// src/sampler.rs

//! Request-count sampling and throughput derivation

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::callbacks::{MetricsSource, ResourceApi};
use crate::error::MonitorResult;
use crate::types::{
    Datapoint, MetricQuery, MetricValue, MonitoredResource, Resource, PERSONALIZE_NAMESPACE,
};
use crate::utils::SECONDS_PER_HOUR;

/// Utilization in percent of the provisioned floor.
///
/// A zero rate is exactly zero utilization, whatever the floor.
pub fn utilization(average_rate: MetricValue, min_capacity: u32) -> MetricValue {
    if average_rate == 0.0 || min_capacity == 0 {
        return 0.0;
    }
    average_rate / f64::from(min_capacity) * 100.0
}

/// Queries summed request counts for a resource and derives rates from them
#[derive(Clone)]
pub struct UtilizationSampler {
    resources: Arc<dyn ResourceApi>,
    metrics: Arc<dyn MetricsSource>,
}

impl UtilizationSampler {
    pub fn new(resources: Arc<dyn ResourceApi>, metrics: Arc<dyn MetricsSource>) -> Self {
        Self { resources, metrics }
    }

    /// Resolve the inference metric name, memoizing a campaign's recipe on the resource
    pub async fn inference_metric_name(&self, resource: &mut Resource) -> MonitorResult<&'static str> {
        if resource.needs_recipe_lookup() {
            if let Some(solution_version_arn) = resource.solution_version_arn().map(str::to_string) {
                let recipe_arn = self
                    .resources
                    .describe_recipe(resource.arn().region(), &solution_version_arn)
                    .await?;
                debug!(arn = %resource.arn(), recipe_arn = %recipe_arn, "Resolved campaign recipe");
                resource.set_recipe_arn(recipe_arn);
            }
        }

        Ok(resource.inference_metric_name())
    }

    /// Summed request counts per `period_seconds` bucket over `[start, end)`
    pub async fn datapoints(
        &self,
        resource: &mut Resource,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        period_seconds: u32,
    ) -> MonitorResult<Vec<Datapoint>> {
        let metric_name = self.inference_metric_name(resource).await?;

        let query = MetricQuery {
            region: resource.arn().region().to_string(),
            namespace: PERSONALIZE_NAMESPACE.to_string(),
            metric_name: metric_name.to_string(),
            dimension: resource.dimension(),
            start,
            end,
            period_seconds,
        };

        self.metrics.sum_requests(&query).await
    }

    /// Total requests over the window
    pub async fn total_requests(
        &self,
        resource: &mut Resource,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        period_seconds: u32,
    ) -> MonitorResult<MetricValue> {
        let datapoints = self.datapoints(resource, start, end, period_seconds).await?;
        Ok(datapoints.iter().map(|datapoint| datapoint.value).sum())
    }

    /// Requests per second over the window; 0.0 when no datapoints exist
    pub async fn average_rate(
        &self,
        resource: &mut Resource,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        period_seconds: u32,
    ) -> MonitorResult<MetricValue> {
        if period_seconds == 0 {
            return Ok(0.0);
        }
        let total = self.total_requests(resource, start, end, period_seconds).await?;
        Ok(total / f64::from(period_seconds))
    }

    /// Hourly request counts over the window, newest first
    pub async fn hourly_counts(
        &self,
        resource: &mut Resource,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> MonitorResult<Vec<Datapoint>> {
        self.datapoints(resource, start, end, SECONDS_PER_HOUR).await
    }
}
