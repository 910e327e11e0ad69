//! # Personalize Monitor - Utilization Monitoring for Inference Endpoints
//!
//! Personalize Monitor watches provisioned recommendation endpoints (campaigns
//! and recommenders), publishes utilization metrics for them, keeps two alarms
//! per endpoint in place, and emits decision events when an endpoint is idle
//! or over-provisioned. It never mutates an endpoint itself; downstream
//! handlers act on the events.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────────┐
//! │                            MonitorEngine                              │
//! ├────────────────┬────────────────┬─────────────────┬───────────────────┤
//! │   Directory    │    Sampler     │    Policies     │  Alarm Lifecycle  │
//! │                │                │                 │                   │
//! │ • ARN / "all"  │ • 5-min rate   │ • Idle retire   │ • Low utilization │
//! │ • 22-min cache │ • Utilization  │ • 25% step-down │ • Idle            │
//! │ • Throttling   │ • Recipe memo  │ • Hourly slots  │ • Owned teardown  │
//! └────────────────┴────────────────┴─────────────────┴───────────────────┘
//!                                    │
//!                          ┌─────────▼─────────┐
//!                          │  Your Callbacks   │
//!                          │                   │
//!                          │ • ResourceApi     │
//!                          │ • MetricsSource   │
//!                          │ • AlarmService    │
//!                          │ • MetricPublisher │
//!                          │ • EventNotifier   │
//!                          └───────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use personalize_monitor::{
//!     AlarmDescriptor, AlarmService, AlarmSummary, Arn, Campaign, Datapoint, EventNotifier,
//!     EventOverrides, MetricDatum, MetricPublisher, MetricQuery, MetricsSource, MonitorCallbacks,
//!     MonitorEngine, MonitorError, MonitorResult, MonitorSettings, NotificationEvent, Page,
//!     Recommender, ResourceApi,
//! };
//! use std::collections::HashMap;
//! use std::sync::Arc;
//!
//! // Placeholder collaborator; a real one wraps the cloud SDK clients
//! struct Cloud;
//!
//! #[async_trait::async_trait]
//! impl ResourceApi for Cloud {
//!     async fn describe_campaign(&self, arn: &Arn) -> MonitorResult<Campaign> {
//!         Err(MonitorError::resource_gone(arn))
//!     }
//!     async fn describe_recommender(&self, arn: &Arn) -> MonitorResult<Recommender> {
//!         Err(MonitorError::resource_gone(arn))
//!     }
//!     async fn describe_recipe(&self, _region: &str, _solution_version_arn: &str) -> MonitorResult<String> {
//!         Ok("arn:aws:personalize:::recipe/aws-user-personalization".to_string())
//!     }
//!     async fn list_campaigns(&self, _region: &str, _next_token: Option<String>) -> MonitorResult<Page<Arn>> {
//!         Ok(Page::last(Vec::new()))
//!     }
//!     async fn list_recommenders(&self, _region: &str, _next_token: Option<String>) -> MonitorResult<Page<Arn>> {
//!         Ok(Page::last(Vec::new()))
//!     }
//! }
//!
//! #[async_trait::async_trait]
//! impl MetricsSource for Cloud {
//!     async fn sum_requests(&self, _query: &MetricQuery) -> MonitorResult<Vec<Datapoint>> {
//!         Ok(Vec::new())
//!     }
//! }
//!
//! #[async_trait::async_trait]
//! impl AlarmService for Cloud {
//!     async fn describe_alarms_for_metric(
//!         &self, _region: &str, _namespace: &str, _metric_name: &str,
//!         _dimension_name: &str, _dimension_value: &str,
//!     ) -> MonitorResult<Vec<AlarmSummary>> {
//!         Ok(Vec::new())
//!     }
//!     async fn put_metric_alarm(&self, _region: &str, _alarm: &AlarmDescriptor) -> MonitorResult<()> {
//!         Ok(())
//!     }
//!     async fn set_alarm_actions_enabled(&self, _region: &str, _name: &str, _enabled: bool) -> MonitorResult<()> {
//!         Ok(())
//!     }
//!     async fn describe_alarms_with_prefix(
//!         &self, _region: &str, _prefix: &str, _next_token: Option<String>,
//!     ) -> MonitorResult<Page<AlarmSummary>> {
//!         Ok(Page::last(Vec::new()))
//!     }
//!     async fn list_alarm_tags(&self, _region: &str, _alarm_arn: &str) -> MonitorResult<HashMap<String, String>> {
//!         Ok(HashMap::new())
//!     }
//!     async fn delete_alarms(&self, _region: &str, _alarm_names: &[String]) -> MonitorResult<()> {
//!         Ok(())
//!     }
//!     async fn notification_target(&self, region: &str) -> MonitorResult<String> {
//!         Ok(format!("arn:aws:sns:{}:123456789012:PersonalizeMonitorNotifications", region))
//!     }
//! }
//!
//! #[async_trait::async_trait]
//! impl MetricPublisher for Cloud {
//!     async fn put_metric_data(&self, _region: &str, _namespace: &str, _data: &[MetricDatum]) -> MonitorResult<()> {
//!         Ok(())
//!     }
//! }
//!
//! #[async_trait::async_trait]
//! impl EventNotifier for Cloud {
//!     async fn put_event(&self, _event: &NotificationEvent) -> MonitorResult<()> {
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> MonitorResult<()> {
//!     // 1. Settings from MONITOR_* variables, e.g. MONITOR_CAMPAIGN_ARNS=all
//!     let settings = MonitorSettings::from_env()?;
//!     personalize_monitor::init_tracing(settings.log_format, &settings.log_level)?;
//!
//!     // 2. Wire the collaborators
//!     let cloud = Arc::new(Cloud);
//!     let callbacks = MonitorCallbacks::new(
//!         cloud.clone(),
//!         cloud.clone(),
//!         cloud.clone(),
//!         cloud.clone(),
//!         cloud,
//!     );
//!
//!     // 3. Run one cycle per scheduled invocation; keep the engine to keep its cache
//!     let mut engine = MonitorEngine::new(settings, callbacks);
//!     let payload = EventOverrides::from_json(r#"{"AutoAdjustMinTPS": false}"#)?;
//!     let summary = engine.run(&payload).await?;
//!     println!("{}", summary);
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Sharded work**: each endpoint is evaluated for decisions during two minutes of its own 10-minute slot
//! - **Throttle tolerant**: recent describes are served from cache when the API throttles
//! - **Idempotent alarms**: alarms are found by prefix and role, created once, and only toggled afterwards
//! - **Observability**: structured `tracing` logs plus observer hooks for skips and decisions
//! - **Optional**: `prometheus-metrics` mirrors published data; `config-toml` reads settings files

pub mod alarms;
pub mod callbacks;
pub mod capacity;
pub mod config;
pub mod directory;
pub mod engine;
pub mod error;
pub mod events;
pub mod idle;
pub mod observability;
pub mod publisher;
pub mod region;
pub mod sampler;
pub mod schedule;
pub mod types;
pub mod utils;

// Re-export common types for convenience
pub use types::{
    Arn, Campaign, Datapoint, Dimension, MetricDatum, MetricQuery, MetricUnit, MetricValue,
    MonitoredResource, Page, Recommender, Resource, ResourceKind, ResourceStatus,
    PERSONALIZE_NAMESPACE, PROJECT_NAME,
};

pub use error::{ErrorKind, MonitorError, MonitorResult};

pub use config::{EventOverrides, ListSpec, LogFormat, MonitorSettings, MonitorSettingsBuilder};

pub use callbacks::{
    AlarmService, EventNotifier, MetricPublisher, MetricsSource, MonitorCallbacks,
    MonitorObserver, ResourceApi, SkipReason,
};

pub use alarms::{AlarmDescriptor, AlarmFamily, AlarmLifecycleManager, AlarmSummary};

pub use events::{CapacityStepDown, DashboardRebuild, DecisionEvent, NotificationEvent, RetireDecision};

pub use engine::{InvocationSummary, MonitorEngine};

pub use observability::init_tracing;

#[cfg(feature = "prometheus-metrics")]
pub use publisher::PrometheusPublisher;
