//! Monitor configuration
//!
//! Settings are resolved in three layers: the invocation payload
//! ([`EventOverrides`]) wins over the process environment, which wins over
//! the defaults below.

use serde::{Deserialize, Serialize};

use crate::error::{MonitorError, MonitorResult};

/// Idle thresholds shorter than this are rejected
pub const MIN_IDLE_THRESHOLD_HOURS: u32 = 1;

/// Environment variable prefix, e.g. `MONITOR_IDLE_THRESHOLD_HOURS`
pub const ENV_PREFIX: &str = "MONITOR";

/// A list given either as a JSON array or as a comma-separated string
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ListSpec {
    Csv(String),
    Items(Vec<String>),
}

impl ListSpec {
    /// Split, trim and drop empty entries
    pub fn values(&self) -> Vec<String> {
        let raw: Vec<&str> = match self {
            ListSpec::Csv(csv) => csv.split(',').collect(),
            ListSpec::Items(items) => items.iter().map(String::as_str).collect(),
        };

        raw.into_iter()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.values().is_empty()
    }

    /// The single case-insensitive value `all` requests discovery
    pub fn is_all(&self) -> bool {
        let values = self.values();
        values.len() == 1 && values[0].eq_ignore_ascii_case("all")
    }
}

impl From<&str> for ListSpec {
    fn from(value: &str) -> Self {
        ListSpec::Csv(value.to_string())
    }
}

/// Output format for the tracing subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Text,
}

/// Process-level monitor settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorSettings {
    /// Campaign ARNs to monitor, or `all`
    #[serde(default)]
    pub campaign_arns: Option<ListSpec>,

    /// Recommender ARNs to monitor, or `all`
    #[serde(default)]
    pub recommender_arns: Option<ListSpec>,

    /// Regions scanned when discovering resources
    #[serde(default)]
    pub regions: Option<ListSpec>,

    /// Region this process runs in
    #[serde(default = "default_current_region")]
    pub current_region: String,

    #[serde(default = "default_true")]
    pub auto_create_utilization_alarms: bool,

    /// Utilization percent below which the low-utilization alarm fires
    #[serde(default = "default_utilization_lower_bound")]
    pub utilization_threshold_alarm_lower_bound: f64,

    #[serde(default = "default_true")]
    pub auto_create_idle_alarms: bool,

    #[serde(default)]
    pub auto_delete_or_stop_idle_resources: bool,

    #[serde(default = "default_idle_threshold_hours")]
    pub idle_threshold_hours: u32,

    #[serde(default = "default_true")]
    pub auto_adjust_min_tps: bool,

    #[serde(default)]
    pub log_format: LogFormat,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_current_region() -> String {
    std::env::var("AWS_REGION").unwrap_or_default()
}

fn default_true() -> bool {
    true
}

fn default_utilization_lower_bound() -> f64 {
    100.0
}

fn default_idle_threshold_hours() -> u32 {
    24
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            campaign_arns: None,
            recommender_arns: None,
            regions: None,
            current_region: default_current_region(),
            auto_create_utilization_alarms: true,
            utilization_threshold_alarm_lower_bound: default_utilization_lower_bound(),
            auto_create_idle_alarms: true,
            auto_delete_or_stop_idle_resources: false,
            idle_threshold_hours: default_idle_threshold_hours(),
            auto_adjust_min_tps: true,
            log_format: LogFormat::default(),
            log_level: default_log_level(),
        }
    }
}

impl MonitorSettings {
    pub fn builder() -> MonitorSettingsBuilder {
        MonitorSettingsBuilder::new()
    }

    /// Load settings from `MONITOR_*` environment variables
    pub fn from_env() -> MonitorResult<Self> {
        Self::from_env_source(None)
    }

    /// Load settings from an explicit variable map instead of the process environment
    pub fn from_env_source(source: Option<config::Map<String, String>>) -> MonitorResult<Self> {
        let settings = config::Config::builder()
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .try_parsing(true)
                    .source(source),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    #[cfg(feature = "config-toml")]
    pub fn from_toml_str(contents: &str) -> MonitorResult<Self> {
        toml::from_str(contents).map_err(|e| MonitorError::invalid(format!("bad settings file: {}", e)))
    }

    #[cfg(feature = "config-toml")]
    pub fn from_toml_file<P: AsRef<std::path::Path>>(path: P) -> MonitorResult<Self> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            MonitorError::invalid(format!(
                "cannot read settings file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_toml_str(&contents)
    }

    /// Apply invocation-level overrides on top of these settings
    pub fn with_overrides(&self, overrides: &EventOverrides) -> Self {
        let mut merged = self.clone();

        if let Some(arns) = overrides.campaign_arns.as_ref().filter(|a| !a.is_empty()) {
            merged.campaign_arns = Some(arns.clone());
        }
        if let Some(arns) = overrides.recommender_arns.as_ref().filter(|a| !a.is_empty()) {
            merged.recommender_arns = Some(arns.clone());
        }
        if let Some(regions) = overrides.regions.as_ref().filter(|r| !r.is_empty()) {
            merged.regions = Some(regions.clone());
        }
        if let Some(value) = overrides.auto_create_utilization_alarms {
            merged.auto_create_utilization_alarms = value;
        }
        if let Some(value) = overrides.utilization_threshold_alarm_lower_bound {
            merged.utilization_threshold_alarm_lower_bound = value;
        }
        if let Some(value) = overrides.auto_create_idle_alarms {
            merged.auto_create_idle_alarms = value;
        }
        if let Some(value) = overrides.auto_delete_or_stop_idle_resources {
            merged.auto_delete_or_stop_idle_resources = value;
        }
        if let Some(value) = overrides.idle_threshold_hours {
            merged.idle_threshold_hours = value;
        }
        if let Some(value) = overrides.auto_adjust_min_tps {
            merged.auto_adjust_min_tps = value;
        }

        merged
    }

    /// Reject settings that must never reach a collaborator
    pub fn validate(&self) -> MonitorResult<()> {
        if self.idle_threshold_hours < MIN_IDLE_THRESHOLD_HOURS {
            return Err(MonitorError::invalid(format!(
                "\"IdleThresholdHours\" must be >= {} hours",
                MIN_IDLE_THRESHOLD_HOURS
            )));
        }

        if !self.utilization_threshold_alarm_lower_bound.is_finite()
            || self.utilization_threshold_alarm_lower_bound < 0.0
        {
            return Err(MonitorError::invalid(format!(
                "\"UtilizationThresholdAlarmLowerBound\" must be a non-negative number, got {}",
                self.utilization_threshold_alarm_lower_bound
            )));
        }

        if self.current_region.trim().is_empty() {
            return Err(MonitorError::invalid(
                "current region is unknown; set AWS_REGION or MONITOR_CURRENT_REGION",
            ));
        }

        Ok(())
    }
}

/// Builder for creating monitor settings easily
#[derive(Debug)]
pub struct MonitorSettingsBuilder {
    settings: MonitorSettings,
}

impl MonitorSettingsBuilder {
    pub fn new() -> Self {
        Self {
            settings: MonitorSettings::default(),
        }
    }

    pub fn campaign_arns(mut self, arns: &str) -> Self {
        self.settings.campaign_arns = Some(ListSpec::from(arns));
        self
    }

    pub fn recommender_arns(mut self, arns: &str) -> Self {
        self.settings.recommender_arns = Some(ListSpec::from(arns));
        self
    }

    pub fn regions(mut self, regions: &str) -> Self {
        self.settings.regions = Some(ListSpec::from(regions));
        self
    }

    pub fn current_region(mut self, region: &str) -> Self {
        self.settings.current_region = region.to_string();
        self
    }

    pub fn auto_create_utilization_alarms(mut self, enabled: bool) -> Self {
        self.settings.auto_create_utilization_alarms = enabled;
        self
    }

    pub fn utilization_lower_bound(mut self, percent: f64) -> Self {
        self.settings.utilization_threshold_alarm_lower_bound = percent;
        self
    }

    pub fn auto_create_idle_alarms(mut self, enabled: bool) -> Self {
        self.settings.auto_create_idle_alarms = enabled;
        self
    }

    pub fn auto_delete_or_stop_idle_resources(mut self, enabled: bool) -> Self {
        self.settings.auto_delete_or_stop_idle_resources = enabled;
        self
    }

    pub fn idle_threshold_hours(mut self, hours: u32) -> Self {
        self.settings.idle_threshold_hours = hours;
        self
    }

    pub fn auto_adjust_min_tps(mut self, enabled: bool) -> Self {
        self.settings.auto_adjust_min_tps = enabled;
        self
    }

    pub fn build(self) -> MonitorSettings {
        self.settings
    }
}

impl Default for MonitorSettingsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Invocation payload; any field present here overrides the process settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EventOverrides {
    #[serde(rename = "CampaignARNs", default)]
    pub campaign_arns: Option<ListSpec>,
    #[serde(rename = "RecommenderARNs", default)]
    pub recommender_arns: Option<ListSpec>,
    #[serde(default)]
    pub regions: Option<ListSpec>,
    #[serde(default)]
    pub auto_create_utilization_alarms: Option<bool>,
    #[serde(default)]
    pub utilization_threshold_alarm_lower_bound: Option<f64>,
    #[serde(default)]
    pub auto_create_idle_alarms: Option<bool>,
    #[serde(default)]
    pub auto_delete_or_stop_idle_resources: Option<bool>,
    #[serde(default)]
    pub idle_threshold_hours: Option<u32>,
    #[serde(rename = "AutoAdjustMinTPS", default)]
    pub auto_adjust_min_tps: Option<bool>,
}

impl EventOverrides {
    pub fn from_json(payload: &str) -> MonitorResult<Self> {
        Ok(serde_json::from_str(payload)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> Option<config::Map<String, String>> {
        Some(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_defaults() {
        let settings = MonitorSettings::builder().current_region("us-east-1").build();
        assert!(settings.auto_create_utilization_alarms);
        assert!(settings.auto_create_idle_alarms);
        assert!(!settings.auto_delete_or_stop_idle_resources);
        assert!(settings.auto_adjust_min_tps);
        assert_eq!(settings.idle_threshold_hours, 24);
        assert_eq!(settings.utilization_threshold_alarm_lower_bound, 100.0);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_list_spec_parsing() {
        let csv = ListSpec::from(" arn:a , arn:b,, ");
        assert_eq!(csv.values(), vec!["arn:a", "arn:b"]);
        assert!(!csv.is_all());

        assert!(ListSpec::from("ALL").is_all());
        assert!(ListSpec::Items(vec![" all ".to_string()]).is_all());
        assert!(!ListSpec::Items(vec!["all".to_string(), "arn:x".to_string()]).is_all());
        assert!(ListSpec::from(" , ").is_empty());
    }

    #[test]
    fn test_event_overrides_win() {
        let base = MonitorSettings::builder()
            .current_region("us-east-1")
            .campaign_arns("all")
            .idle_threshold_hours(48)
            .build();

        let overrides = EventOverrides::from_json(
            r#"{
                "CampaignARNs": ["arn:aws:personalize:us-east-1:1:campaign/a"],
                "Regions": "us-east-1, us-west-2",
                "IdleThresholdHours": 6,
                "AutoDeleteOrStopIdleResources": true,
                "AutoAdjustMinTPS": false
            }"#,
        )
        .unwrap();

        let merged = base.with_overrides(&overrides);
        assert_eq!(
            merged.campaign_arns.unwrap().values(),
            vec!["arn:aws:personalize:us-east-1:1:campaign/a"]
        );
        assert_eq!(merged.regions.unwrap().values(), vec!["us-east-1", "us-west-2"]);
        assert_eq!(merged.idle_threshold_hours, 6);
        assert!(merged.auto_delete_or_stop_idle_resources);
        assert!(!merged.auto_adjust_min_tps);
        // untouched fields keep the process value
        assert!(merged.auto_create_idle_alarms);
    }

    #[test]
    fn test_empty_override_does_not_clear_process_value() {
        let base = MonitorSettings::builder()
            .current_region("us-east-1")
            .campaign_arns("all")
            .build();
        let overrides = EventOverrides {
            campaign_arns: Some(ListSpec::from("")),
            ..Default::default()
        };
        assert!(base.with_overrides(&overrides).campaign_arns.unwrap().is_all());
    }

    #[test]
    fn test_validation_rejects_short_idle_threshold() {
        let settings = MonitorSettings::builder()
            .current_region("us-east-1")
            .idle_threshold_hours(0)
            .build();
        let err = settings.validate().unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Invalid);
    }

    #[test]
    fn test_validation_requires_region() {
        let settings = MonitorSettings::builder().current_region(" ").build();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_from_env_source() {
        let settings = MonitorSettings::from_env_source(env(&[
            ("MONITOR_CURRENT_REGION", "eu-central-1"),
            ("MONITOR_CAMPAIGN_ARNS", "all"),
            ("MONITOR_IDLE_THRESHOLD_HOURS", "72"),
            ("MONITOR_AUTO_CREATE_IDLE_ALARMS", "false"),
            ("MONITOR_LOG_FORMAT", "text"),
        ]))
        .unwrap();

        assert_eq!(settings.current_region, "eu-central-1");
        assert!(settings.campaign_arns.unwrap().is_all());
        assert_eq!(settings.idle_threshold_hours, 72);
        assert!(!settings.auto_create_idle_alarms);
        assert!(settings.auto_create_utilization_alarms);
        assert_eq!(settings.log_format, LogFormat::Text);
    }

    #[cfg(feature = "config-toml")]
    #[test]
    fn test_from_toml_file() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
current_region = "ap-southeast-2"
recommender_arns = ["arn:aws:personalize:ap-southeast-2:1:recommender/r"]
auto_adjust_min_tps = false
"#
        )
        .unwrap();

        let settings = MonitorSettings::from_toml_file(file.path()).unwrap();
        assert_eq!(settings.current_region, "ap-southeast-2");
        assert_eq!(settings.recommender_arns.unwrap().values().len(), 1);
        assert!(!settings.auto_adjust_min_tps);
        assert_eq!(settings.idle_threshold_hours, 24);
    }
}
