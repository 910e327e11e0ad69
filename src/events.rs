//! Decision events published to the event bus
//!
//! Each decision carries the ARN it concerns, the numbers that justified it
//! and a human-readable reason. The detail document keeps the field names
//! downstream consumers (delete/stop/update handlers) already read.

use serde::{Deserialize, Serialize};

use crate::error::MonitorResult;
use crate::types::{Arn, Datapoint, ResourceKind};

/// `source` of every event this monitor publishes
pub const EVENT_SOURCE: &str = "personalize.monitor";

/// Retire an idle resource: delete a campaign, stop a recommender
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct RetireDecision {
    #[serde(skip)]
    pub kind: ResourceKind,
    #[serde(rename = "ARN")]
    pub arn: Arn,
    pub utilization: f64,
    pub age_hours: i64,
    pub idle_threshold_hours: u32,
    pub total_requests_during_idle_threshold_hours: f64,
    pub reason: String,
}

/// Lower a resource's provisioned throughput floor
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CapacityStepDown {
    #[serde(skip)]
    pub kind: ResourceKind,
    #[serde(rename = "ARN")]
    pub arn: Arn,
    pub utilization: f64,
    pub age_hours: i64,
    #[serde(rename = "CurrentMinTPS")]
    pub current_min_capacity: u32,
    #[serde(rename = "NewMinTPS")]
    pub new_min_capacity: u32,
    #[serde(rename = "MinAverageTPS")]
    pub min_hourly_rate: u64,
    #[serde(rename = "MaxAverageTPS")]
    pub max_hourly_rate: u64,
    #[serde(rename = "AverageTPS")]
    pub avg_hourly_rate: u64,
    pub datapoints: Vec<Datapoint>,
    pub reason: String,
}

/// Ask the dashboard owner to rebuild because new alarms exist
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DashboardRebuild {
    pub alarms_created: usize,
    pub reason: String,
}

impl DashboardRebuild {
    pub fn new(alarms_created: usize) -> Self {
        Self {
            alarms_created,
            reason: format!(
                "Triggered rebuild due to {} new alarm(s) being created",
                alarms_created
            ),
        }
    }
}

/// Everything the monitor can decide
#[derive(Debug, Clone, PartialEq)]
pub enum DecisionEvent {
    CapacityStepDown(CapacityStepDown),
    Retire(RetireDecision),
    NotifyDashboardRebuild(DashboardRebuild),
}

impl DecisionEvent {
    /// Event bus detail type, which downstream rules route on
    pub fn detail_type(&self) -> &'static str {
        match self {
            DecisionEvent::Retire(retire) => match retire.kind {
                ResourceKind::Campaign => "DeletePersonalizeCampaign",
                ResourceKind::Recommender => "StopPersonalizeRecommender",
            },
            DecisionEvent::CapacityStepDown(step) => match step.kind {
                ResourceKind::Campaign => "UpdatePersonalizeCampaignMinProvisionedTPS",
                ResourceKind::Recommender => "UpdatePersonalizeRecommenderMinRecommendationRPS",
            },
            DecisionEvent::NotifyDashboardRebuild(_) => "BuildPersonalizeMonitorDashboard",
        }
    }

    pub fn arn(&self) -> Option<&Arn> {
        match self {
            DecisionEvent::Retire(retire) => Some(&retire.arn),
            DecisionEvent::CapacityStepDown(step) => Some(&step.arn),
            DecisionEvent::NotifyDashboardRebuild(_) => None,
        }
    }

    pub fn reason(&self) -> &str {
        match self {
            DecisionEvent::Retire(retire) => &retire.reason,
            DecisionEvent::CapacityStepDown(step) => &step.reason,
            DecisionEvent::NotifyDashboardRebuild(rebuild) => &rebuild.reason,
        }
    }

    /// Render the bus entry
    pub fn to_notification(&self) -> MonitorResult<NotificationEvent> {
        let detail = match self {
            DecisionEvent::Retire(retire) => serde_json::to_string(retire)?,
            DecisionEvent::CapacityStepDown(step) => serde_json::to_string(step)?,
            DecisionEvent::NotifyDashboardRebuild(rebuild) => serde_json::to_string(rebuild)?,
        };

        Ok(NotificationEvent {
            source: EVENT_SOURCE.to_string(),
            detail_type: self.detail_type().to_string(),
            detail,
            resources: self.arn().map(|arn| vec![arn.to_string()]).unwrap_or_default(),
        })
    }
}

/// One entry for the event bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NotificationEvent {
    pub source: String,
    pub detail_type: String,
    /// JSON document
    pub detail: String,
    pub resources: Vec<String>,
}
