// src/capacity.rs

//! Gradual step-down of over-provisioned throughput floors

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use crate::config::MonitorSettings;
use crate::error::MonitorResult;
use crate::events::CapacityStepDown;
use crate::sampler::UtilizationSampler;
use crate::types::{Datapoint, MetricValue, MonitoredResource, Resource};
use crate::utils::{floor_to_hour, SECONDS_PER_HOUR};

/// Trailing window the low watermark is measured over
pub const LOOKBACK_DAYS: i64 = 14;

/// Resources younger than this keep their floor
pub const MIN_AGE_TO_ADJUST_HOURS: i64 = 24;

/// Next floor after one 25% step, never below 1
pub fn step_down(min_capacity: u32) -> u32 {
    let stepped = (u64::from(min_capacity) * 3 / 4).max(1);
    u32::try_from(stepped).unwrap_or(u32::MAX)
}

/// Hourly throughput summary over the lookback, in whole requests per second
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Watermarks {
    pub min_hourly_rate: u64,
    pub max_hourly_rate: u64,
    pub avg_hourly_rate: u64,
    pub datapoints: usize,
}

impl Watermarks {
    /// All zero when there are no datapoints
    pub fn from_datapoints(datapoints: &[Datapoint]) -> Self {
        if datapoints.is_empty() {
            return Self::default();
        }

        let hour = f64::from(SECONDS_PER_HOUR);
        let (min, max, total) = datapoints.iter().fold(
            (f64::MAX, f64::MIN, 0.0),
            |(min, max, total), datapoint| {
                (min.min(datapoint.value), max.max(datapoint.value), total + datapoint.value)
            },
        );

        Self {
            min_hourly_rate: to_whole_rate(min / hour),
            max_hourly_rate: to_whole_rate(max / hour),
            avg_hourly_rate: to_whole_rate(total / (datapoints.len() as f64 * hour)),
            datapoints: datapoints.len(),
        }
    }
}

fn to_whole_rate(rate: MetricValue) -> u64 {
    if rate.is_finite() && rate > 0.0 {
        rate.floor() as u64
    } else {
        0
    }
}

/// Whether floors may be adjusted at all
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapacityPolicy {
    pub enabled: bool,
}

impl CapacityPolicy {
    pub fn from_settings(settings: &MonitorSettings) -> Self {
        Self {
            enabled: settings.auto_adjust_min_tps,
        }
    }
}

/// What the capacity check concluded
#[derive(Debug, Clone, PartialEq)]
pub enum CapacityVerdict {
    /// Retired this cycle, not due, disabled, or already at the minimum floor
    NotEvaluated,
    TooYoung { watermarks: Watermarks },
    /// Low watermark is at or above the floor
    AtDemand { watermarks: Watermarks },
    /// A step-down is warranted but the status will not accept an update
    Immutable { new_min_capacity: u32 },
    StepDown(CapacityStepDown),
}

impl CapacityVerdict {
    pub fn decision(self) -> Option<CapacityStepDown> {
        match self {
            CapacityVerdict::StepDown(step) => Some(step),
            _ => None,
        }
    }
}

/// Decides capacity step-downs from a 14-day hourly low watermark
pub struct CapacityAdjuster {
    sampler: UtilizationSampler,
}

impl CapacityAdjuster {
    pub fn new(sampler: UtilizationSampler) -> Self {
        Self { sampler }
    }

    pub async fn evaluate(
        &self,
        resource: &mut Resource,
        utilization: MetricValue,
        due: bool,
        retired: bool,
        policy: &CapacityPolicy,
        now: DateTime<Utc>,
    ) -> MonitorResult<CapacityVerdict> {
        let min_capacity = resource.min_capacity();
        if retired || !due || !policy.enabled || min_capacity <= 1 {
            return Ok(CapacityVerdict::NotEvaluated);
        }

        let arn = resource.arn().clone();
        let end = floor_to_hour(now);
        let start = end - Duration::days(LOOKBACK_DAYS);

        let datapoints = self.sampler.hourly_counts(resource, start, end).await?;
        let watermarks = Watermarks::from_datapoints(&datapoints);

        info!(
            arn = %arn,
            days_back = LOOKBACK_DAYS,
            datapoints = watermarks.datapoints,
            min = watermarks.min_hourly_rate,
            max = watermarks.max_hourly_rate,
            avg = watermarks.avg_hourly_rate,
            "Performing min capacity adjustment check"
        );

        let age_hours = resource.age_hours(now);
        if age_hours < MIN_AGE_TO_ADJUST_HOURS {
            info!(
                arn = %arn,
                age_hours,
                "Not eligible for min capacity adjustment yet"
            );
            return Ok(CapacityVerdict::TooYoung { watermarks });
        }

        if watermarks.min_hourly_rate >= u64::from(min_capacity) {
            return Ok(CapacityVerdict::AtDemand { watermarks });
        }

        let new_min_capacity = step_down(min_capacity);

        if !resource.is_mutable() {
            warn!(
                arn = %arn,
                current = min_capacity,
                proposed = new_min_capacity,
                "Min capacity could be lowered but current status will not allow an update on this run"
            );
            return Ok(CapacityVerdict::Immutable { new_min_capacity });
        }

        let reason = format!(
            "Step down adjustment of {} for {} down from {} to {} based on average hourly rate low watermark of {} over last {} days",
            resource.kind().capacity_metric_name(),
            arn,
            min_capacity,
            new_min_capacity,
            watermarks.min_hourly_rate,
            LOOKBACK_DAYS
        );
        info!(arn = %arn, "{}", reason);

        Ok(CapacityVerdict::StepDown(CapacityStepDown {
            kind: resource.kind(),
            arn,
            utilization,
            age_hours,
            current_min_capacity: min_capacity,
            new_min_capacity,
            min_hourly_rate: watermarks.min_hourly_rate,
            max_hourly_rate: watermarks.max_hourly_rate,
            avg_hourly_rate: watermarks.avg_hourly_rate,
            datapoints,
            reason,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callbacks::{MockMetricsSource, MockResourceApi};
    use crate::tests::{campaign, recommender};
    use chrono::TimeZone;
    use std::sync::Arc;

    const ENABLED: CapacityPolicy = CapacityPolicy { enabled: true };

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 8, 20, 15, 41, 0).unwrap()
    }

    /// One hourly datapoint per entry, newest first
    fn adjuster_with_hourly(hourly_requests: Vec<f64>) -> CapacityAdjuster {
        let mut metrics = MockMetricsSource::new();
        metrics
            .expect_sum_requests()
            .withf(|query| {
                query.period_seconds == 3600
                    && query.end == Utc.with_ymd_and_hms(2024, 8, 20, 15, 0, 0).unwrap()
                    && query.end - query.start == Duration::days(14)
            })
            .returning(move |query| {
                Ok(hourly_requests
                    .iter()
                    .enumerate()
                    .map(|(i, value)| Datapoint::new(query.end - Duration::hours(i as i64 + 1), *value))
                    .collect())
            });

        let mut api = MockResourceApi::new();
        api.expect_describe_recipe()
            .returning(|_, _| Ok("arn:aws:personalize:::recipe/aws-similar-items".to_string()));

        CapacityAdjuster::new(UtilizationSampler::new(Arc::new(api), Arc::new(metrics)))
    }

    #[test]
    fn test_step_down() {
        assert_eq!(step_down(10), 7);
        assert_eq!(step_down(7), 5);
        assert_eq!(step_down(5), 3);
        assert_eq!(step_down(3), 2);
        assert_eq!(step_down(2), 1);
        assert_eq!(step_down(1), 1);
        assert_eq!(step_down(u32::MAX), 3_221_225_471);
    }

    #[test]
    fn test_watermarks() {
        let t = now();
        let datapoints = vec![
            Datapoint::new(t, 18_000.0),
            Datapoint::new(t, 36_000.0),
            Datapoint::new(t, 7_199.0),
        ];
        let marks = Watermarks::from_datapoints(&datapoints);
        assert_eq!(marks.min_hourly_rate, 1);
        assert_eq!(marks.max_hourly_rate, 10);
        assert_eq!(marks.avg_hourly_rate, 5);
        assert_eq!(marks.datapoints, 3);

        assert_eq!(Watermarks::from_datapoints(&[]), Watermarks::default());
    }

    #[tokio::test]
    async fn test_low_watermark_steps_ten_down_to_seven() {
        // 5 requests/second at the quietest hour
        let adjuster = adjuster_with_hourly(vec![5.0 * 3600.0, 40_000.0, 50_000.0]);
        let mut resource = Resource::from(campaign("shop", 10, now() - Duration::days(20)));

        let step = adjuster
            .evaluate(&mut resource, 42.0, true, false, &ENABLED, now())
            .await
            .unwrap()
            .decision()
            .expect("step down");

        assert_eq!(step.current_min_capacity, 10);
        assert_eq!(step.new_min_capacity, 7);
        assert_eq!(step.min_hourly_rate, 5);
        assert_eq!(step.datapoints.len(), 3);
        assert!(step.reason.contains("minProvisionedTPS"));
    }

    #[tokio::test]
    async fn test_repeated_cycles_converge_to_one() {
        let adjuster = adjuster_with_hourly(Vec::new());
        let mut floor = 10;
        let mut seen = Vec::new();

        while floor > 1 {
            let mut resource = Resource::from(recommender("feed", floor, now() - Duration::days(30)));
            let step = adjuster
                .evaluate(&mut resource, 0.0, true, false, &ENABLED, now())
                .await
                .unwrap()
                .decision()
                .expect("step down");
            floor = step.new_min_capacity;
            seen.push(floor);
        }

        assert_eq!(seen, vec![7, 5, 3, 2, 1]);
    }

    #[tokio::test]
    async fn test_young_resource_keeps_floor() {
        let adjuster = adjuster_with_hourly(vec![0.0]);
        let mut resource = Resource::from(campaign("shop", 10, now() - Duration::hours(23)));

        let verdict = adjuster
            .evaluate(&mut resource, 0.0, true, false, &ENABLED, now())
            .await
            .unwrap();
        assert!(matches!(verdict, CapacityVerdict::TooYoung { .. }));
    }

    #[tokio::test]
    async fn test_busy_resource_keeps_floor() {
        let adjuster = adjuster_with_hourly(vec![4.0 * 3600.0, 9.0 * 3600.0]);
        let mut resource = Resource::from(campaign("shop", 4, now() - Duration::days(20)));

        let verdict = adjuster
            .evaluate(&mut resource, 100.0, true, false, &ENABLED, now())
            .await
            .unwrap();
        assert!(matches!(verdict, CapacityVerdict::AtDemand { .. }));
    }

    #[tokio::test]
    async fn test_preconditions_skip_query() {
        let mut metrics = MockMetricsSource::new();
        metrics.expect_sum_requests().times(0);
        let adjuster = CapacityAdjuster::new(UtilizationSampler::new(
            Arc::new(MockResourceApi::new()),
            Arc::new(metrics),
        ));

        for (min_capacity, due, retired, enabled) in [
            (1, true, false, true),
            (8, false, false, true),
            (8, true, true, true),
            (8, true, false, false),
        ] {
            let mut resource =
                Resource::from(campaign("shop", min_capacity, now() - Duration::days(20)));
            let policy = CapacityPolicy { enabled };
            let verdict = adjuster
                .evaluate(&mut resource, 0.0, due, retired, &policy, now())
                .await
                .unwrap();
            assert_eq!(verdict, CapacityVerdict::NotEvaluated);
        }
    }
}
