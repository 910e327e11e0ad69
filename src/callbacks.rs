// src/callbacks.rs

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::alarms::{AlarmDescriptor, AlarmSummary};
use crate::engine::InvocationSummary;
use crate::error::MonitorResult;
use crate::events::{DecisionEvent, NotificationEvent};
use crate::types::{Arn, Campaign, Datapoint, MetricDatum, MetricQuery, Page, Recommender};

/// Why a configured resource was left out of this cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Describe was throttled and nothing was cached for it
    ThrottledWithoutCache,
    /// The resource has been deleted
    NotFound,
    /// Not ACTIVE, or a deletion is in flight
    NotMonitorable,
    /// A metric, recipe or alarm call was throttled part way through evaluation
    ThrottledDuringEvaluation,
}

/// Point lookups and listings against the recommendation service
///
/// Implementations should map the service's throttling and not-found
/// responses onto `MonitorError::Throttled` and `MonitorError::NotFound`;
/// the directory relies on that classification.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ResourceApi: Send + Sync {
    async fn describe_campaign(&self, arn: &Arn) -> MonitorResult<Campaign>;

    async fn describe_recommender(&self, arn: &Arn) -> MonitorResult<Recommender>;

    /// Recipe ARN a solution version was trained with
    async fn describe_recipe(
        &self,
        region: &str,
        solution_version_arn: &str,
    ) -> MonitorResult<String>;

    /// One page of campaign ARNs in a region
    async fn list_campaigns(
        &self,
        region: &str,
        next_token: Option<String>,
    ) -> MonitorResult<Page<Arn>>;

    /// One page of recommender ARNs in a region
    async fn list_recommenders(
        &self,
        region: &str,
        next_token: Option<String>,
    ) -> MonitorResult<Page<Arn>>;
}

/// Time-series store holding inference request counts
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MetricsSource: Send + Sync {
    /// Sum of requests per `period_seconds` bucket, newest first
    async fn sum_requests(&self, query: &MetricQuery) -> MonitorResult<Vec<Datapoint>>;
}

/// Alert rule store
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AlarmService: Send + Sync {
    /// Alarms defined on one metric/namespace/dimension
    async fn describe_alarms_for_metric(
        &self,
        region: &str,
        namespace: &str,
        metric_name: &str,
        dimension_name: &str,
        dimension_value: &str,
    ) -> MonitorResult<Vec<AlarmSummary>>;

    async fn put_metric_alarm(&self, region: &str, alarm: &AlarmDescriptor) -> MonitorResult<()>;

    async fn set_alarm_actions_enabled(
        &self,
        region: &str,
        alarm_name: &str,
        enabled: bool,
    ) -> MonitorResult<()>;

    /// One page of metric alarms whose name starts with `prefix`
    async fn describe_alarms_with_prefix(
        &self,
        region: &str,
        prefix: &str,
        next_token: Option<String>,
    ) -> MonitorResult<Page<AlarmSummary>>;

    async fn list_alarm_tags(
        &self,
        region: &str,
        alarm_arn: &str,
    ) -> MonitorResult<HashMap<String, String>>;

    /// Delete up to 100 alarms by name
    async fn delete_alarms(&self, region: &str, alarm_names: &[String]) -> MonitorResult<()>;

    /// Action target (notification topic) new alarms should notify
    async fn notification_target(&self, region: &str) -> MonitorResult<String>;
}

/// Receives derived metrics
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MetricPublisher: Send + Sync {
    /// Publish at most 20 data points in one call
    async fn put_metric_data(
        &self,
        region: &str,
        namespace: &str,
        data: &[MetricDatum],
    ) -> MonitorResult<()>;
}

/// Event bus receiving decision events (at-least-once, fire-and-forget)
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventNotifier: Send + Sync {
    async fn put_event(&self, event: &NotificationEvent) -> MonitorResult<()>;
}

/// Trait for receiving monitor events and decisions
///
/// Implement this to get notified about what each invocation did.
/// Useful for logging, alerting, or surfacing degraded-mode skips.
#[async_trait]
pub trait MonitorObserver: Send + Sync {
    /// Called when a configured resource is left out of this cycle
    async fn on_resource_skipped(&self, _arn: &Arn, _reason: SkipReason) -> MonitorResult<()> {
        Ok(())
    }

    /// Called after a decision event has been published
    async fn on_decision(&self, _event: &DecisionEvent) -> MonitorResult<()> {
        Ok(())
    }

    /// Called when a new alarm was created
    async fn on_alarm_created(&self, _region: &str, _alarm_name: &str) -> MonitorResult<()> {
        Ok(())
    }

    /// Called once the invocation has published its metrics
    async fn on_invocation_complete(&self, _summary: &InvocationSummary) -> MonitorResult<()> {
        Ok(())
    }
}

/// Every collaborator one invocation talks to
#[derive(Clone)]
pub struct MonitorCallbacks {
    pub resources: Arc<dyn ResourceApi>,
    pub metrics: Arc<dyn MetricsSource>,
    pub alarms: Arc<dyn AlarmService>,
    pub publisher: Arc<dyn MetricPublisher>,
    pub notifier: Arc<dyn EventNotifier>,
    pub observers: Vec<Arc<dyn MonitorObserver>>,
}

impl MonitorCallbacks {
    /// Create a new callback configuration
    pub fn new(
        resources: Arc<dyn ResourceApi>,
        metrics: Arc<dyn MetricsSource>,
        alarms: Arc<dyn AlarmService>,
        publisher: Arc<dyn MetricPublisher>,
        notifier: Arc<dyn EventNotifier>,
    ) -> Self {
        Self {
            resources,
            metrics,
            alarms,
            publisher,
            notifier,
            observers: Vec::new(),
        }
    }

    /// Add an observer to receive monitor events
    pub fn add_observer(mut self, observer: Arc<dyn MonitorObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Add multiple observers at once
    pub fn add_observers(mut self, observers: Vec<Arc<dyn MonitorObserver>>) -> Self {
        self.observers.extend(observers);
        self
    }
}
