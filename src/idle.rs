// src/idle.rs

//! Retirement of abandoned resources

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use crate::config::MonitorSettings;
use crate::error::MonitorResult;
use crate::events::RetireDecision;
use crate::sampler::UtilizationSampler;
use crate::types::{MetricValue, MonitoredResource, Resource, ResourceKind};
use crate::utils::SECONDS_PER_HOUR;

/// Idle retirement settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IdlePolicy {
    pub enabled: bool,
    pub idle_threshold_hours: u32,
}

impl IdlePolicy {
    pub fn from_settings(settings: &MonitorSettings) -> Self {
        Self {
            enabled: settings.auto_delete_or_stop_idle_resources,
            idle_threshold_hours: settings.idle_threshold_hours,
        }
    }
}

/// What the idle check concluded
#[derive(Debug, Clone, PartialEq)]
pub enum IdleVerdict {
    /// Traffic this sample, not due, or retirement disabled
    NotEvaluated,
    TooNew { age_hours: i64 },
    /// Requests arrived inside the idle window
    TrafficSeen { total_requests: MetricValue },
    /// Idle, but the current status will not accept a delete/stop
    Immutable,
    Retire(RetireDecision),
}

impl IdleVerdict {
    pub fn decision(self) -> Option<RetireDecision> {
        match self {
            IdleVerdict::Retire(decision) => Some(decision),
            _ => None,
        }
    }
}

/// Decides whether an idle resource should be deleted (campaign) or stopped (recommender)
pub struct IdlePolicyEngine {
    sampler: UtilizationSampler,
}

impl IdlePolicyEngine {
    pub fn new(sampler: UtilizationSampler) -> Self {
        Self { sampler }
    }

    pub async fn evaluate(
        &self,
        resource: &mut Resource,
        utilization: MetricValue,
        due: bool,
        policy: &IdlePolicy,
        now: DateTime<Utc>,
    ) -> MonitorResult<IdleVerdict> {
        if utilization != 0.0 || !due || !policy.enabled {
            return Ok(IdleVerdict::NotEvaluated);
        }

        let arn = resource.arn().clone();
        let threshold = policy.idle_threshold_hours;
        let age_hours = resource.age_hours(now);

        info!(
            arn = %arn,
            age_hours,
            last_update_age_hours = ?resource.last_update_age_hours(now),
            "Performing idle stop/delete check"
        );

        if age_hours < i64::from(threshold) {
            info!(
                arn = %arn,
                age_hours,
                idle_threshold_hours = threshold,
                "Too new to consider for auto-deletion/auto-stop"
            );
            return Ok(IdleVerdict::TooNew { age_hours });
        }

        let start = now - Duration::hours(i64::from(threshold));
        let total_requests = self
            .sampler
            .total_requests(resource, start, now, threshold.saturating_mul(SECONDS_PER_HOUR))
            .await?;

        if total_requests > 0.0 {
            warn!(
                arn = %arn,
                total_requests,
                idle_threshold_hours = threshold,
                "Currently idle but had requests within the idle window; not retiring"
            );
            return Ok(IdleVerdict::TrafficSeen { total_requests });
        }

        if !resource.is_mutable() {
            warn!(
                arn = %arn,
                idle_threshold_hours = threshold,
                "Idle but current status will not allow it to be deleted/stopped on this run"
            );
            return Ok(IdleVerdict::Immutable);
        }

        let reason = match resource.kind() {
            ResourceKind::Campaign => format!(
                "Campaign {} has been idle for at least {} hours so initiating delete according to configuration.",
                arn, threshold
            ),
            ResourceKind::Recommender => format!(
                "Recommender {} has been idle for at least {} hours so initiating stop according to configuration.",
                arn, threshold
            ),
        };
        info!(arn = %arn, "{}", reason);

        Ok(IdleVerdict::Retire(RetireDecision {
            kind: resource.kind(),
            arn,
            utilization,
            age_hours,
            idle_threshold_hours: threshold,
            total_requests_during_idle_threshold_hours: total_requests,
            reason,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callbacks::{MockMetricsSource, MockResourceApi};
    use crate::tests::{campaign, recommender};
    use crate::types::Datapoint;
    use chrono::TimeZone;
    use std::sync::Arc;

    const POLICY: IdlePolicy = IdlePolicy {
        enabled: true,
        idle_threshold_hours: 24,
    };

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, 1, 12, 0, 0).unwrap()
    }

    fn engine_returning(total: Option<f64>) -> IdlePolicyEngine {
        let mut metrics = MockMetricsSource::new();
        metrics
            .expect_sum_requests()
            .withf(|query| {
                query.period_seconds == 24 * 3600
                    && query.end == now()
                    && query.start == now() - Duration::hours(24)
            })
            .returning(move |query| {
                Ok(total
                    .map(|value| vec![Datapoint::new(query.start, value)])
                    .unwrap_or_default())
            });

        let mut api = MockResourceApi::new();
        api.expect_describe_recipe()
            .returning(|_, _| Ok("arn:aws:personalize:::recipe/aws-user-personalization".to_string()));

        IdlePolicyEngine::new(UtilizationSampler::new(Arc::new(api), Arc::new(metrics)))
    }

    #[tokio::test]
    async fn test_idle_old_resource_is_retired() {
        let engine = engine_returning(None);
        let mut resource = Resource::from(campaign("shop", 4, now() - Duration::hours(48)));

        let verdict = engine
            .evaluate(&mut resource, 0.0, true, &POLICY, now())
            .await
            .unwrap();

        let decision = verdict.decision().expect("retire decision");
        assert_eq!(decision.kind, ResourceKind::Campaign);
        assert_eq!(decision.age_hours, 48);
        assert_eq!(decision.idle_threshold_hours, 24);
        assert_eq!(decision.total_requests_during_idle_threshold_hours, 0.0);
        assert!(decision.reason.contains("initiating delete"));
    }

    #[tokio::test]
    async fn test_single_request_prevents_retirement() {
        let engine = engine_returning(Some(1.0));
        let mut resource = Resource::from(recommender("feed", 2, now() - Duration::hours(48)));

        let verdict = engine
            .evaluate(&mut resource, 0.0, true, &POLICY, now())
            .await
            .unwrap();
        assert_eq!(verdict, IdleVerdict::TrafficSeen { total_requests: 1.0 });
    }

    #[tokio::test]
    async fn test_too_new_skips_metric_query() {
        let mut metrics = MockMetricsSource::new();
        metrics.expect_sum_requests().times(0);
        let engine = IdlePolicyEngine::new(UtilizationSampler::new(
            Arc::new(MockResourceApi::new()),
            Arc::new(metrics),
        ));
        let mut resource = Resource::from(recommender("feed", 2, now() - Duration::hours(23)));

        let verdict = engine
            .evaluate(&mut resource, 0.0, true, &POLICY, now())
            .await
            .unwrap();
        assert_eq!(verdict, IdleVerdict::TooNew { age_hours: 23 });
    }

    #[tokio::test]
    async fn test_preconditions() {
        let engine = engine_returning(None);
        let mut resource = Resource::from(campaign("shop", 4, now() - Duration::hours(48)));

        let busy = engine.evaluate(&mut resource, 12.5, true, &POLICY, now()).await.unwrap();
        assert_eq!(busy, IdleVerdict::NotEvaluated);

        let not_due = engine.evaluate(&mut resource, 0.0, false, &POLICY, now()).await.unwrap();
        assert_eq!(not_due, IdleVerdict::NotEvaluated);

        let disabled = IdlePolicy {
            enabled: false,
            ..POLICY
        };
        let off = engine.evaluate(&mut resource, 0.0, true, &disabled, now()).await.unwrap();
        assert_eq!(off, IdleVerdict::NotEvaluated);
    }

    #[tokio::test]
    async fn test_pending_update_blocks_retirement() {
        let engine = engine_returning(None);
        let mut stale = campaign("shop", 4, now() - Duration::hours(100));
        stale.latest_update_status = Some("CREATE IN_PROGRESS".into());
        let mut resource = Resource::from(stale);

        let verdict = engine
            .evaluate(&mut resource, 0.0, true, &POLICY, now())
            .await
            .unwrap();
        assert_eq!(verdict, IdleVerdict::Immutable);
    }
}
