// src/alarms.rs

//! Idempotent management of the two alarms kept per resource.
//!
//! Lookups match by reserved name prefix and comparison-operator family,
//! never by exact name, so alarms renamed by an operator are still found and
//! alarms created by anyone else are ignored.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::callbacks::AlarmService;
use crate::error::{MonitorError, MonitorResult};
use crate::types::{
    Arn, Dimension, MonitoredResource, Resource, ResourceKind, PERSONALIZE_NAMESPACE, PROJECT_NAME,
};
use crate::utils::{SAMPLE_PERIOD_SECONDS, SECONDS_PER_HOUR};

/// Reserved prefix of every alarm this monitor creates
pub const ALARM_NAME_PREFIX: &str = "PersonalizeMonitor-";

/// Tag key marking alarms owned by this monitor; the value is [`PROJECT_NAME`]
pub const OWNERSHIP_TAG_KEY: &str = "CreatedBy";

/// Most alarm names one delete call accepts
pub const MAX_ALARMS_PER_DELETE: usize = 100;

/// Utilization alarm evaluates the last 60 minutes
pub const UTILIZATION_EVALUATION_PERIODS: u32 = 12;
/// 45 of those 60 minutes must be below the bound
pub const UTILIZATION_DATAPOINTS_TO_ALARM: u32 = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComparisonOperator {
    LessThanThreshold,
    LessThanOrEqualToThreshold,
    GreaterThanThreshold,
    GreaterThanOrEqualToThreshold,
    #[serde(other)]
    Other,
}

impl ComparisonOperator {
    pub fn is_lower_bound(&self) -> bool {
        matches!(
            self,
            ComparisonOperator::LessThanThreshold | ComparisonOperator::LessThanOrEqualToThreshold
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Statistic {
    Average,
    Sum,
}

/// How periods without datapoints are evaluated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MissingDataTreatment {
    Breaching,
    NotBreaching,
    Ignore,
    Missing,
}

/// The two alarm policies kept per resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmFamily {
    LowUtilization,
    Idle,
}

impl AlarmFamily {
    pub fn name_prefix(&self, kind: ResourceKind) -> &'static str {
        match (self, kind) {
            (AlarmFamily::LowUtilization, ResourceKind::Campaign) => {
                "PersonalizeMonitor-LowCampaignUtilization-"
            }
            (AlarmFamily::LowUtilization, ResourceKind::Recommender) => {
                "PersonalizeMonitor-LowRecommenderUtilization-"
            }
            (AlarmFamily::Idle, ResourceKind::Campaign) => "PersonalizeMonitor-IdleCampaign-",
            (AlarmFamily::Idle, ResourceKind::Recommender) => "PersonalizeMonitor-IdleRecommender-",
        }
    }

    /// Whether an existing alarm already plays this role for `kind`
    pub fn matches(&self, kind: ResourceKind, alarm: &AlarmSummary) -> bool {
        if !alarm.name.starts_with(self.name_prefix(kind)) {
            return false;
        }
        match self {
            AlarmFamily::LowUtilization => alarm.comparison.is_lower_bound(),
            AlarmFamily::Idle => {
                alarm.comparison == ComparisonOperator::LessThanOrEqualToThreshold
                    && alarm.threshold == 0.0
            }
        }
    }
}

/// Full definition of a metric alarm to create
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct AlarmDescriptor {
    #[serde(rename = "AlarmName")]
    pub name: String,
    #[serde(rename = "AlarmDescription")]
    pub description: String,
    pub actions_enabled: bool,
    /// Targets notified on both ALARM and OK transitions
    pub actions: Vec<String>,
    pub metric_name: String,
    pub namespace: String,
    pub statistic: Statistic,
    pub dimension: Dimension,
    #[serde(rename = "Period")]
    pub period_seconds: u32,
    pub evaluation_periods: u32,
    pub datapoints_to_alarm: Option<u32>,
    pub threshold: f64,
    #[serde(rename = "ComparisonOperator")]
    pub comparison: ComparisonOperator,
    #[serde(rename = "TreatMissingData")]
    pub missing_data: MissingDataTreatment,
    pub tags: BTreeMap<String, String>,
}

/// What the alarm store reports about an existing alarm
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AlarmSummary {
    #[serde(rename = "AlarmName")]
    pub name: String,
    #[serde(rename = "AlarmArn")]
    pub arn: String,
    #[serde(rename = "ComparisonOperator")]
    pub comparison: ComparisonOperator,
    pub threshold: f64,
    pub actions_enabled: bool,
    #[serde(default)]
    pub dimensions: Vec<Dimension>,
}

impl AlarmSummary {
    pub fn has_dimension_value(&self, value: &str) -> bool {
        self.dimensions.iter().any(|dimension| dimension.value == value)
    }
}

fn ownership_tags() -> BTreeMap<String, String> {
    BTreeMap::from([(OWNERSHIP_TAG_KEY.to_string(), PROJECT_NAME.to_string())])
}

/// Creates, toggles and deletes the alarms derived from monitored resources
#[derive(Clone)]
pub struct AlarmLifecycleManager {
    alarms: Arc<dyn AlarmService>,
}

impl AlarmLifecycleManager {
    pub fn new(alarms: Arc<dyn AlarmService>) -> Self {
        Self { alarms }
    }

    /// Low-utilization alarm; actions only matter while the floor can still drop
    pub async fn ensure_utilization_alarm(
        &self,
        resource: &Resource,
        region: &str,
        lower_bound: f64,
    ) -> MonitorResult<bool> {
        let kind = resource.kind();
        let family = AlarmFamily::LowUtilization;
        let enable_actions = resource.min_capacity() > 1;

        let existing = self
            .alarms
            .describe_alarms_for_metric(
                region,
                PROJECT_NAME,
                kind.utilization_metric_name(),
                kind.dimension_name(),
                resource.arn().as_str(),
            )
            .await?;

        if let Some(alarm) = existing.iter().find(|alarm| family.matches(kind, alarm)) {
            self.sync_actions(region, alarm, enable_actions).await?;
            return Ok(false);
        }

        let target = self.alarms.notification_target(region).await?;
        let descriptor = AlarmDescriptor {
            name: format!("{}{}", family.name_prefix(kind), resource.name()),
            description: "Alarms when utilization falls below threshold indicating possible over provisioning condition".to_string(),
            actions_enabled: enable_actions,
            actions: vec![target],
            metric_name: kind.utilization_metric_name().to_string(),
            namespace: PROJECT_NAME.to_string(),
            statistic: Statistic::Average,
            dimension: resource.dimension(),
            period_seconds: SAMPLE_PERIOD_SECONDS,
            evaluation_periods: UTILIZATION_EVALUATION_PERIODS,
            datapoints_to_alarm: Some(UTILIZATION_DATAPOINTS_TO_ALARM),
            threshold: lower_bound,
            comparison: ComparisonOperator::LessThanThreshold,
            missing_data: MissingDataTreatment::NotBreaching,
            tags: ownership_tags(),
        };

        self.create(region, resource.arn(), &descriptor).await?;
        Ok(true)
    }

    /// Idle alarm over one period spanning the whole idle window.
    ///
    /// Missing data breaches, so actions stay off until the resource is at
    /// least as old as the window. A campaign's recipe must already be
    /// resolved (see `UtilizationSampler::inference_metric_name`), otherwise
    /// the alarm could watch the wrong inference metric.
    pub async fn ensure_idle_alarm(
        &self,
        resource: &Resource,
        region: &str,
        idle_threshold_hours: u32,
        now: DateTime<Utc>,
    ) -> MonitorResult<bool> {
        if resource.needs_recipe_lookup() {
            return Err(MonitorError::invalid(format!(
                "recipe of {} must be resolved before its idle alarm can be provisioned",
                resource.arn()
            )));
        }

        let kind = resource.kind();
        let family = AlarmFamily::Idle;
        let metric_name = resource.inference_metric_name();
        let enable_actions = resource.age_hours(now) >= i64::from(idle_threshold_hours);

        let existing = self
            .alarms
            .describe_alarms_for_metric(
                region,
                PERSONALIZE_NAMESPACE,
                metric_name,
                kind.dimension_name(),
                resource.arn().as_str(),
            )
            .await?;

        if let Some(alarm) = existing.iter().find(|alarm| family.matches(kind, alarm)) {
            self.sync_actions(region, alarm, enable_actions).await?;
            return Ok(false);
        }

        let target = self.alarms.notification_target(region).await?;
        let descriptor = AlarmDescriptor {
            name: format!("{}{}", family.name_prefix(kind), resource.name()),
            description: "Alarms when utilization is idle for contiguous length of time indicating potential abandoned campaign/recommender".to_string(),
            actions_enabled: enable_actions,
            actions: vec![target],
            metric_name: metric_name.to_string(),
            namespace: PERSONALIZE_NAMESPACE.to_string(),
            statistic: Statistic::Sum,
            dimension: resource.dimension(),
            period_seconds: idle_threshold_hours.saturating_mul(SECONDS_PER_HOUR),
            evaluation_periods: 1,
            datapoints_to_alarm: None,
            threshold: 0.0,
            comparison: ComparisonOperator::LessThanOrEqualToThreshold,
            missing_data: MissingDataTreatment::Breaching,
            tags: ownership_tags(),
        };

        self.create(region, resource.arn(), &descriptor).await?;
        Ok(true)
    }

    async fn create(&self, region: &str, arn: &Arn, descriptor: &AlarmDescriptor) -> MonitorResult<()> {
        info!(
            arn = %arn,
            alarm = %descriptor.name,
            actions_enabled = descriptor.actions_enabled,
            "Creating alarm"
        );
        self.alarms.put_metric_alarm(region, descriptor).await
    }

    /// Only the enabled/disabled state of an existing alarm is ever changed
    async fn sync_actions(&self, region: &str, alarm: &AlarmSummary, enable: bool) -> MonitorResult<()> {
        if alarm.actions_enabled == enable {
            debug!(alarm = %alarm.name, "Alarm already provisioned");
            return Ok(());
        }

        info!(alarm = %alarm.name, enable, "Toggling alarm actions");
        self.alarms
            .set_alarm_actions_enabled(region, &alarm.name, enable)
            .await
    }

    /// Every owned alarm in `region` that passes `filter`
    async fn owned_alarms<F>(&self, region: &str, keep: F) -> MonitorResult<Vec<String>>
    where
        F: Fn(&AlarmSummary) -> bool,
    {
        let mut names: Vec<String> = Vec::new();
        let mut next_token = None;

        loop {
            let page = self
                .alarms
                .describe_alarms_with_prefix(region, ALARM_NAME_PREFIX, next_token)
                .await?;

            for alarm in page.items.iter().filter(|alarm| keep(*alarm)) {
                let tags = self.alarms.list_alarm_tags(region, &alarm.arn).await?;
                let owned = tags
                    .get(OWNERSHIP_TAG_KEY)
                    .map(|value| value == PROJECT_NAME)
                    .unwrap_or(false);
                if owned && !names.contains(&alarm.name) {
                    names.push(alarm.name.clone());
                }
            }

            match page.next_token {
                Some(token) if !token.is_empty() => next_token = Some(token),
                _ => break,
            }
        }

        Ok(names)
    }

    async fn delete_in_batches(&self, region: &str, names: &[String]) -> MonitorResult<usize> {
        for batch in names.chunks(MAX_ALARMS_PER_DELETE) {
            self.alarms.delete_alarms(region, batch).await?;
        }
        Ok(names.len())
    }

    /// Delete every owned alarm dimensioned to `arn`; none found is a no-op
    pub async fn delete_alarms_for_resource(&self, arn: &Arn) -> MonitorResult<usize> {
        let region = arn.region();
        let names = self
            .owned_alarms(region, |alarm| alarm.has_dimension_value(arn.as_str()))
            .await?;

        if names.is_empty() {
            info!(arn = %arn, "No alarms to delete");
            return Ok(0);
        }

        info!(arn = %arn, alarms = ?names, "Deleting alarms");
        self.delete_in_batches(region, &names).await
    }

    /// Remove every owned alarm in the given regions, e.g. when tearing the monitor down
    pub async fn delete_all_owned_alarms(&self, regions: &[String]) -> MonitorResult<usize> {
        let mut deleted = 0;
        for region in regions {
            let names = self.owned_alarms(region, |_| true).await?;
            if !names.is_empty() {
                info!(region = %region, count = names.len(), "Deleting owned alarms");
                deleted += self.delete_in_batches(region, &names).await?;
            }
        }
        info!(deleted, "Deleted owned alarms");
        Ok(deleted)
    }
}
