// src/engine.rs

use std::fmt;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::alarms::{AlarmFamily, AlarmLifecycleManager};
use crate::callbacks::{MonitorCallbacks, SkipReason};
use crate::capacity::{CapacityAdjuster, CapacityPolicy};
use crate::config::{EventOverrides, MonitorSettings};
use crate::directory::ResourceDirectory;
use crate::error::{ErrorKind, MonitorResult};
use crate::events::{DashboardRebuild, DecisionEvent};
use crate::idle::{IdlePolicy, IdlePolicyEngine};
use crate::publisher::MetricBatches;
use crate::region::resolve_regions;
use crate::sampler::{utilization, UtilizationSampler};
use crate::schedule;
use crate::types::{Arn, MetricDatum, MetricUnit, MonitoredResource, Resource, PROJECT_NAME};
use crate::utils::{current_time, five_minute_window, SAMPLE_PERIOD_SECONDS};

/// Aggregate metric counting monitored resources
pub const MONITORED_RESOURCE_COUNT_METRIC: &str = "monitoredResourceCount";

/// What one invocation did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvocationSummary {
    /// Resources that had utilization metrics recorded
    pub resources_evaluated: usize,
    pub metrics_written: usize,
    pub alarms_created: usize,
    pub alarms_deleted: usize,
    pub retirements: usize,
    pub step_downs: usize,
    /// Throttled with nothing cached, or throttled part way through evaluation
    pub skipped_throttled: usize,
    /// No longer exists, or vanished part way through evaluation
    pub skipped_missing: usize,
    /// Not active, or being deleted
    pub skipped_inactive: usize,
}

impl fmt::Display for InvocationSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Logged {} TPS utilization metrics for {} active campaigns and recommenders; {} alarms created",
            self.metrics_written, self.resources_evaluated, self.alarms_created
        )?;
        if self.skipped_throttled > 0 {
            write!(f, "; {} skipped due to throttling", self.skipped_throttled)?;
        }
        Ok(())
    }
}

/// Per-resource result folded into the summary
#[derive(Debug, Default)]
struct ResourceOutcome {
    alarms_created: usize,
    alarms_deleted: usize,
    retired: bool,
    stepped_down: bool,
}

/// Runs monitoring cycles against the configured collaborators.
///
/// The engine owns the resource cache, so a host that keeps one engine warm
/// across invocations keeps the throttle fallback warm too.
pub struct MonitorEngine {
    settings: MonitorSettings,
    callbacks: MonitorCallbacks,
    directory: ResourceDirectory,
    idle: IdlePolicyEngine,
    capacity: CapacityAdjuster,
    sampler: UtilizationSampler,
    alarms: AlarmLifecycleManager,
}

impl MonitorEngine {
    /// Create a new monitor engine
    pub fn new(settings: MonitorSettings, callbacks: MonitorCallbacks) -> Self {
        let sampler =
            UtilizationSampler::new(callbacks.resources.clone(), callbacks.metrics.clone());

        Self {
            directory: ResourceDirectory::new(callbacks.resources.clone()),
            idle: IdlePolicyEngine::new(sampler.clone()),
            capacity: CapacityAdjuster::new(sampler.clone()),
            alarms: AlarmLifecycleManager::new(callbacks.alarms.clone()),
            sampler,
            settings,
            callbacks,
        }
    }

    pub fn settings(&self) -> &MonitorSettings {
        &self.settings
    }

    pub fn directory(&self) -> &ResourceDirectory {
        &self.directory
    }

    pub fn alarm_manager(&self) -> &AlarmLifecycleManager {
        &self.alarms
    }

    /// Run one cycle now
    pub async fn run(&mut self, overrides: &EventOverrides) -> MonitorResult<InvocationSummary> {
        self.run_at(overrides, current_time()).await
    }

    /// Run one cycle as of `now`
    pub async fn run_at(
        &mut self,
        overrides: &EventOverrides,
        now: DateTime<Utc>,
    ) -> MonitorResult<InvocationSummary> {
        let settings = self.settings.with_overrides(overrides);
        settings.validate()?;

        let regions = resolve_regions(&settings);
        let targets = self.directory.resolve_targets(&settings, &regions).await?;
        let snapshot = self.directory.active_resources(&targets, now).await?;

        let mut summary = InvocationSummary {
            skipped_throttled: snapshot.skipped_count(SkipReason::ThrottledWithoutCache),
            skipped_missing: snapshot.skipped_count(SkipReason::NotFound),
            skipped_inactive: snapshot.skipped_count(SkipReason::NotMonitorable),
            ..InvocationSummary::default()
        };

        for (arn, reason) in &snapshot.skipped {
            self.notify_skipped(arn, *reason).await;
        }

        let mut batches = MetricBatches::new();
        batches.push(
            settings.current_region.as_str(),
            MetricDatum::aggregate(
                MONITORED_RESOURCE_COUNT_METRIC,
                snapshot.resources.len() as f64,
                MetricUnit::Count,
            ),
        );

        info!(
            resources = snapshot.resources.len(),
            skipped = snapshot.skipped.len(),
            "Evaluating active campaigns and recommenders"
        );

        for mut resource in snapshot.resources {
            let arn = resource.arn().clone();
            let outcome = match self
                .evaluate_resource(&mut resource, &settings, &mut batches, now)
                .await
            {
                Ok(outcome) => outcome,
                Err(err) => {
                    // One resource must not sink the batch; anything unclassified still does
                    let reason = match err.kind() {
                        ErrorKind::Throttled => SkipReason::ThrottledDuringEvaluation,
                        ErrorKind::NotFound => SkipReason::NotFound,
                        ErrorKind::Invalid | ErrorKind::Upstream => return Err(err),
                    };
                    error!(arn = %arn, error = %err, "Evaluation interrupted; skipping resource this time");
                    if reason == SkipReason::NotFound {
                        summary.skipped_missing += 1;
                    } else {
                        summary.skipped_throttled += 1;
                    }
                    self.notify_skipped(&arn, reason).await;
                    continue;
                }
            };

            summary.resources_evaluated += 1;
            summary.alarms_created += outcome.alarms_created;
            summary.alarms_deleted += outcome.alarms_deleted;
            summary.retirements += usize::from(outcome.retired);
            summary.step_downs += usize::from(outcome.stepped_down);
        }

        summary.metrics_written = batches
            .publish(self.callbacks.publisher.as_ref(), PROJECT_NAME)
            .await?;

        info!("{}", summary);

        if summary.alarms_created > 0 {
            info!(
                alarms_created = summary.alarms_created,
                "Triggering rebuild of the dashboard since new alarm(s) were created"
            );
            self.publish_decision(DecisionEvent::NotifyDashboardRebuild(DashboardRebuild::new(
                summary.alarms_created,
            )))
            .await?;
        }

        for observer in &self.callbacks.observers {
            if let Err(e) = observer.on_invocation_complete(&summary).await {
                warn!("Observer error on invocation complete: {}", e);
            }
        }

        Ok(summary)
    }

    /// Sample, decide and reconcile alarms for one resource
    async fn evaluate_resource(
        &self,
        resource: &mut Resource,
        settings: &MonitorSettings,
        batches: &mut MetricBatches,
        now: DateTime<Utc>,
    ) -> MonitorResult<ResourceOutcome> {
        let arn = resource.arn().clone();
        let region = arn.region().to_string();
        let kind = resource.kind();
        let min_capacity = resource.min_capacity();
        let mut outcome = ResourceOutcome::default();

        // Sample before queueing anything so an interrupted sample leaves no partial metrics
        let (start, end) = five_minute_window(now);
        let rate = self
            .sampler
            .average_rate(resource, start, end, SAMPLE_PERIOD_SECONDS)
            .await?;

        batches.push(
            region.as_str(),
            MetricDatum::for_resource(
                kind.capacity_metric_name(),
                resource.dimension(),
                f64::from(min_capacity),
                MetricUnit::CountPerSecond,
            ),
        );

        if rate > 0.0 {
            batches.push(
                region.as_str(),
                MetricDatum::for_resource(
                    kind.rate_metric_name(),
                    resource.dimension(),
                    rate,
                    MetricUnit::CountPerSecond,
                ),
            );
        }

        let utilization = utilization(rate, min_capacity);
        batches.push(
            region.as_str(),
            MetricDatum::for_resource(
                kind.utilization_metric_name(),
                resource.dimension(),
                utilization,
                MetricUnit::Percent,
            ),
        );

        debug!(
            arn = %arn,
            min_capacity,
            rate,
            utilization,
            "Computed current utilization"
        );

        let due = schedule::is_due(&arn, now);

        let retire = self
            .idle
            .evaluate(resource, utilization, due, &IdlePolicy::from_settings(settings), now)
            .await?
            .decision();

        if let Some(retire) = retire {
            self.publish_decision(DecisionEvent::Retire(retire)).await?;
            outcome.retired = true;
            outcome.alarms_deleted = self.alarms.delete_alarms_for_resource(&arn).await?;
            return Ok(outcome);
        }

        let step_down = self
            .capacity
            .evaluate(
                resource,
                utilization,
                due,
                false,
                &CapacityPolicy::from_settings(settings),
                now,
            )
            .await?
            .decision();

        if let Some(step) = step_down {
            self.publish_decision(DecisionEvent::CapacityStepDown(step)).await?;
            outcome.stepped_down = true;
        }

        if settings.auto_create_utilization_alarms
            && self
                .alarms
                .ensure_utilization_alarm(
                    resource,
                    &region,
                    settings.utilization_threshold_alarm_lower_bound,
                )
                .await?
        {
            outcome.alarms_created += 1;
            self.notify_alarm_created(&region, AlarmFamily::LowUtilization, resource)
                .await;
        }

        if settings.auto_create_idle_alarms
            && self
                .alarms
                .ensure_idle_alarm(resource, &region, settings.idle_threshold_hours, now)
                .await?
        {
            outcome.alarms_created += 1;
            self.notify_alarm_created(&region, AlarmFamily::Idle, resource).await;
        }

        Ok(outcome)
    }

    /// Put the event on the bus, then tell observers
    async fn publish_decision(&self, event: DecisionEvent) -> MonitorResult<()> {
        let notification = event.to_notification()?;
        info!(
            detail_type = %notification.detail_type,
            resources = ?notification.resources,
            reason = %event.reason(),
            "Publishing decision event"
        );
        self.callbacks.notifier.put_event(&notification).await?;

        for observer in &self.callbacks.observers {
            if let Err(e) = observer.on_decision(&event).await {
                warn!("Observer error on decision: {}", e);
            }
        }
        Ok(())
    }

    async fn notify_skipped(&self, arn: &Arn, reason: SkipReason) {
        for observer in &self.callbacks.observers {
            if let Err(e) = observer.on_resource_skipped(arn, reason).await {
                warn!("Observer error on resource skipped: {}", e);
            }
        }
    }

    async fn notify_alarm_created(&self, region: &str, family: AlarmFamily, resource: &Resource) {
        let alarm_name = format!("{}{}", family.name_prefix(resource.kind()), resource.name());
        for observer in &self.callbacks.observers {
            if let Err(e) = observer.on_alarm_created(region, &alarm_name).await {
                warn!("Observer error on alarm created: {}", e);
            }
        }
    }

    /// Delete every alarm this monitor owns in the configured regions
    pub async fn delete_all_owned_alarms(&self) -> MonitorResult<usize> {
        let regions = resolve_regions(&self.settings);
        self.alarms.delete_all_owned_alarms(&regions).await
    }
}
