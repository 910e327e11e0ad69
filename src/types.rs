// src/types.rs

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{MonitorError, MonitorResult};

/// Namespace for metrics written by this application and tag value marking owned alarms
pub const PROJECT_NAME: &str = "PersonalizeMonitor";

/// Namespace the service publishes inference request counts under
pub const PERSONALIZE_NAMESPACE: &str = "AWS/Personalize";

/// Recipe whose campaigns report `GetPersonalizedRanking` instead of `GetRecommendations`
pub const PERSONALIZED_RANKING_RECIPE_ARN: &str =
    "arn:aws:personalize:::recipe/aws-personalized-ranking";

/// A metric value (request counts, rates, utilization percent)
pub type MetricValue = f64;

/// Resource identity, e.g. `arn:aws:personalize:us-east-1:123456789012:campaign/my-campaign`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Arn(String);

impl Arn {
    /// Parse an ARN, requiring the six `:`-separated sections
    pub fn parse<S: Into<String>>(value: S) -> MonitorResult<Self> {
        let value = value.into();
        let trimmed = value.trim();
        let sections: Vec<&str> = trimmed.splitn(6, ':').collect();

        if sections.len() < 6 || sections[0] != "arn" || sections[5].is_empty() {
            return Err(MonitorError::invalid(format!("'{}' is not a valid ARN", trimmed)));
        }

        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn section(&self, index: usize) -> &str {
        self.0.splitn(6, ':').nth(index).unwrap_or_default()
    }

    pub fn region(&self) -> &str {
        self.section(3)
    }

    pub fn account_id(&self) -> &str {
        self.section(4)
    }

    /// Resource type segment, e.g. `campaign` for `campaign/my-campaign`
    pub fn resource_type(&self) -> &str {
        self.section(5).split('/').next().unwrap_or_default()
    }

    pub fn kind(&self) -> Option<ResourceKind> {
        match self.resource_type() {
            "campaign" => Some(ResourceKind::Campaign),
            "recommender" => Some(ResourceKind::Recommender),
            _ => None,
        }
    }
}

impl fmt::Display for Arn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Arn {
    type Error = MonitorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Arn::parse(value)
    }
}

impl From<Arn> for String {
    fn from(arn: Arn) -> Self {
        arn.0
    }
}

impl FromStr for Arn {
    type Err = MonitorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Arn::parse(s)
    }
}

/// The two kinds of managed inference endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Campaign,
    Recommender,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Campaign => "campaign",
            ResourceKind::Recommender => "recommender",
        }
    }

    /// Dimension name the resource ARN is published under
    pub fn dimension_name(&self) -> &'static str {
        match self {
            ResourceKind::Campaign => "CampaignArn",
            ResourceKind::Recommender => "RecommenderArn",
        }
    }

    pub fn capacity_metric_name(&self) -> &'static str {
        match self {
            ResourceKind::Campaign => "minProvisionedTPS",
            ResourceKind::Recommender => "minRecommendationRequestsPerSecond",
        }
    }

    pub fn rate_metric_name(&self) -> &'static str {
        match self {
            ResourceKind::Campaign => "averageTPS",
            ResourceKind::Recommender => "averageRPS",
        }
    }

    pub fn utilization_metric_name(&self) -> &'static str {
        match self {
            ResourceKind::Campaign => "campaignUtilization",
            ResourceKind::Recommender => "recommenderUtilization",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Campaign => write!(f, "Campaign"),
            ResourceKind::Recommender => write!(f, "Recommender"),
        }
    }
}

/// Lifecycle status as reported by the service
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ResourceStatus {
    CreatePending,
    CreateInProgress,
    Active,
    CreateFailed,
    StopPending,
    StopInProgress,
    Inactive,
    StartPending,
    StartInProgress,
    DeletePending,
    DeleteInProgress,
    Other(String),
}

impl ResourceStatus {
    /// True for the two in-flight deletion states
    pub fn is_deleting(&self) -> bool {
        matches!(self, ResourceStatus::DeletePending | ResourceStatus::DeleteInProgress)
    }

    /// Statuses from which the service accepts an update, delete or stop
    pub fn allows_mutation(&self) -> bool {
        matches!(self, ResourceStatus::Active | ResourceStatus::CreateFailed)
    }
}

impl FromStr for ResourceStatus {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // The service mixes spaces and underscores ("DELETE IN_PROGRESS")
        let normalized = s.trim().to_ascii_uppercase().replace(' ', "_");
        Ok(match normalized.as_str() {
            "CREATE_PENDING" => ResourceStatus::CreatePending,
            "CREATE_IN_PROGRESS" | "CREATING" => ResourceStatus::CreateInProgress,
            "ACTIVE" => ResourceStatus::Active,
            "CREATE_FAILED" => ResourceStatus::CreateFailed,
            "STOP_PENDING" => ResourceStatus::StopPending,
            "STOP_IN_PROGRESS" => ResourceStatus::StopInProgress,
            "INACTIVE" => ResourceStatus::Inactive,
            "START_PENDING" => ResourceStatus::StartPending,
            "START_IN_PROGRESS" => ResourceStatus::StartInProgress,
            "DELETE_PENDING" => ResourceStatus::DeletePending,
            "DELETE_IN_PROGRESS" => ResourceStatus::DeleteInProgress,
            _ => ResourceStatus::Other(s.trim().to_string()),
        })
    }
}

impl From<String> for ResourceStatus {
    fn from(value: String) -> Self {
        match value.parse() {
            Ok(status) => status,
            Err(never) => match never {},
        }
    }
}

impl From<&str> for ResourceStatus {
    fn from(value: &str) -> Self {
        ResourceStatus::from(value.to_string())
    }
}

impl From<ResourceStatus> for String {
    fn from(status: ResourceStatus) -> Self {
        status.to_string()
    }
}

impl fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ResourceStatus::CreatePending => "CREATE PENDING",
            ResourceStatus::CreateInProgress => "CREATE IN_PROGRESS",
            ResourceStatus::Active => "ACTIVE",
            ResourceStatus::CreateFailed => "CREATE FAILED",
            ResourceStatus::StopPending => "STOP PENDING",
            ResourceStatus::StopInProgress => "STOP IN_PROGRESS",
            ResourceStatus::Inactive => "INACTIVE",
            ResourceStatus::StartPending => "START PENDING",
            ResourceStatus::StartInProgress => "START IN_PROGRESS",
            ResourceStatus::DeletePending => "DELETE PENDING",
            ResourceStatus::DeleteInProgress => "DELETE IN_PROGRESS",
            ResourceStatus::Other(other) => other.as_str(),
        };
        f.write_str(text)
    }
}

/// Which inference metric a campaign's recipe reports under
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecipeKind {
    PersonalizedRanking,
    Recommendation,
}

impl RecipeKind {
    pub fn from_recipe_arn(recipe_arn: &str) -> Self {
        if recipe_arn == PERSONALIZED_RANKING_RECIPE_ARN {
            RecipeKind::PersonalizedRanking
        } else {
            RecipeKind::Recommendation
        }
    }
}

/// Shared view over campaigns and recommenders used by every policy
pub trait MonitoredResource {
    fn kind(&self) -> ResourceKind;
    fn arn(&self) -> &Arn;
    fn name(&self) -> &str;
    fn status(&self) -> &ResourceStatus;
    /// Status of an in-flight update, distinct from the top-level status
    fn pending_update_status(&self) -> Option<&ResourceStatus>;
    /// Provisioned throughput floor (requests per second)
    fn min_capacity(&self) -> u32;
    fn creation_time(&self) -> DateTime<Utc>;
    fn last_update_time(&self) -> Option<DateTime<Utc>>;
    /// Recipe ARN if known; campaigns resolve it lazily
    fn recipe_arn(&self) -> Option<&str>;

    /// Whole hours since creation, never negative
    fn age_hours(&self, now: DateTime<Utc>) -> i64 {
        (now - self.creation_time()).num_hours().max(0)
    }

    fn last_update_age_hours(&self, now: DateTime<Utc>) -> Option<i64> {
        self.last_update_time()
            .map(|updated| (now - updated).num_hours().max(0))
    }

    /// Name of the request-count metric this resource reports under.
    ///
    /// Campaigns whose recipe has not been resolved yet report the generic name;
    /// `UtilizationSampler::inference_metric_name` resolves it first.
    fn inference_metric_name(&self) -> &'static str {
        match (self.kind(), self.recipe_arn().map(RecipeKind::from_recipe_arn)) {
            (ResourceKind::Campaign, Some(RecipeKind::PersonalizedRanking)) => {
                "GetPersonalizedRanking"
            }
            _ => "GetRecommendations",
        }
    }

    /// Active and not being deleted underneath us
    fn is_monitorable(&self) -> bool {
        *self.status() == ResourceStatus::Active
            && !self
                .pending_update_status()
                .map(ResourceStatus::is_deleting)
                .unwrap_or(false)
    }

    /// Whether the service would accept a delete, stop or capacity update right now
    fn is_mutable(&self) -> bool {
        self.status().allows_mutation()
            && self
                .pending_update_status()
                .map(ResourceStatus::allows_mutation)
                .unwrap_or(true)
    }

    fn dimension(&self) -> Dimension {
        Dimension::new(self.kind().dimension_name(), self.arn().as_str())
    }
}

/// Snapshot of a campaign as returned by the describe call
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Campaign {
    pub campaign_arn: Arn,
    pub name: String,
    pub status: ResourceStatus,
    /// Status of `latestCampaignUpdate`, if one exists
    pub latest_update_status: Option<ResourceStatus>,
    #[serde(rename = "minProvisionedTPS")]
    pub min_provisioned_tps: u32,
    pub solution_version_arn: String,
    pub creation_date_time: DateTime<Utc>,
    pub last_updated_date_time: Option<DateTime<Utc>>,
    /// Memoized from the solution version on first use
    #[serde(default)]
    pub recipe_arn: Option<String>,
}

impl MonitoredResource for Campaign {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Campaign
    }

    fn arn(&self) -> &Arn {
        &self.campaign_arn
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn status(&self) -> &ResourceStatus {
        &self.status
    }

    fn pending_update_status(&self) -> Option<&ResourceStatus> {
        self.latest_update_status.as_ref()
    }

    fn min_capacity(&self) -> u32 {
        self.min_provisioned_tps
    }

    fn creation_time(&self) -> DateTime<Utc> {
        self.creation_date_time
    }

    fn last_update_time(&self) -> Option<DateTime<Utc>> {
        self.last_updated_date_time
    }

    fn recipe_arn(&self) -> Option<&str> {
        self.recipe_arn.as_deref()
    }
}

/// Snapshot of a recommender as returned by the describe call
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommender {
    pub recommender_arn: Arn,
    pub name: String,
    pub status: ResourceStatus,
    /// Status of `latestRecommenderUpdate`, if one exists
    pub latest_update_status: Option<ResourceStatus>,
    pub min_recommendation_requests_per_second: u32,
    pub recipe_arn: String,
    pub creation_date_time: DateTime<Utc>,
    pub last_updated_date_time: Option<DateTime<Utc>>,
}

impl MonitoredResource for Recommender {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Recommender
    }

    fn arn(&self) -> &Arn {
        &self.recommender_arn
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn status(&self) -> &ResourceStatus {
        &self.status
    }

    fn pending_update_status(&self) -> Option<&ResourceStatus> {
        self.latest_update_status.as_ref()
    }

    fn min_capacity(&self) -> u32 {
        self.min_recommendation_requests_per_second
    }

    fn creation_time(&self) -> DateTime<Utc> {
        self.creation_date_time
    }

    fn last_update_time(&self) -> Option<DateTime<Utc>> {
        self.last_updated_date_time
    }

    fn recipe_arn(&self) -> Option<&str> {
        Some(&self.recipe_arn)
    }
}

/// A monitored inference endpoint. Equality is by ARN.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Resource {
    Campaign(Campaign),
    Recommender(Recommender),
}

impl Resource {
    fn inner(&self) -> &dyn MonitoredResource {
        match self {
            Resource::Campaign(campaign) => campaign,
            Resource::Recommender(recommender) => recommender,
        }
    }

    /// Campaign whose recipe has not been looked up yet
    pub fn needs_recipe_lookup(&self) -> bool {
        matches!(self, Resource::Campaign(campaign) if campaign.recipe_arn.is_none())
    }

    pub fn solution_version_arn(&self) -> Option<&str> {
        match self {
            Resource::Campaign(campaign) => Some(&campaign.solution_version_arn),
            Resource::Recommender(_) => None,
        }
    }

    /// Memoize a resolved recipe; recommenders already carry theirs
    pub fn set_recipe_arn(&mut self, recipe_arn: String) {
        if let Resource::Campaign(campaign) = self {
            campaign.recipe_arn = Some(recipe_arn);
        }
    }
}

impl MonitoredResource for Resource {
    fn kind(&self) -> ResourceKind {
        self.inner().kind()
    }

    fn arn(&self) -> &Arn {
        self.inner().arn()
    }

    fn name(&self) -> &str {
        self.inner().name()
    }

    fn status(&self) -> &ResourceStatus {
        self.inner().status()
    }

    fn pending_update_status(&self) -> Option<&ResourceStatus> {
        self.inner().pending_update_status()
    }

    fn min_capacity(&self) -> u32 {
        self.inner().min_capacity()
    }

    fn creation_time(&self) -> DateTime<Utc> {
        self.inner().creation_time()
    }

    fn last_update_time(&self) -> Option<DateTime<Utc>> {
        self.inner().last_update_time()
    }

    fn recipe_arn(&self) -> Option<&str> {
        self.inner().recipe_arn()
    }
}

impl PartialEq for Resource {
    fn eq(&self, other: &Self) -> bool {
        self.arn() == other.arn()
    }
}

impl Eq for Resource {}

impl From<Campaign> for Resource {
    fn from(campaign: Campaign) -> Self {
        Resource::Campaign(campaign)
    }
}

impl From<Recommender> for Resource {
    fn from(recommender: Recommender) -> Self {
        Resource::Recommender(recommender)
    }
}

/// One aggregated request count over one time bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Datapoint {
    pub timestamp: DateTime<Utc>,
    pub value: MetricValue,
}

impl Datapoint {
    pub fn new(timestamp: DateTime<Utc>, value: MetricValue) -> Self {
        Self { timestamp, value }
    }
}

/// Metric dimension (name/value pair)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Dimension {
    pub name: String,
    pub value: String,
}

impl Dimension {
    pub fn new<N: Into<String>, V: Into<String>>(name: N, value: V) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// A summed request-count query against the time-series store
#[derive(Debug, Clone, PartialEq)]
pub struct MetricQuery {
    pub region: String,
    pub namespace: String,
    pub metric_name: String,
    pub dimension: Dimension,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub period_seconds: u32,
}

/// Unit attached to a published metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetricUnit {
    Count,
    #[serde(rename = "Count/Second")]
    CountPerSecond,
    Percent,
}

impl fmt::Display for MetricUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricUnit::Count => write!(f, "Count"),
            MetricUnit::CountPerSecond => write!(f, "Count/Second"),
            MetricUnit::Percent => write!(f, "Percent"),
        }
    }
}

/// A metric value destined for the publisher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MetricDatum {
    pub metric_name: String,
    pub dimensions: Vec<Dimension>,
    pub value: MetricValue,
    pub unit: MetricUnit,
}

impl MetricDatum {
    /// Metric without dimensions (aggregate counts)
    pub fn aggregate<S: Into<String>>(metric_name: S, value: MetricValue, unit: MetricUnit) -> Self {
        Self {
            metric_name: metric_name.into(),
            dimensions: Vec::new(),
            value,
            unit,
        }
    }

    /// Metric dimensioned by a resource ARN
    pub fn for_resource<S: Into<String>>(
        metric_name: S,
        dimension: Dimension,
        value: MetricValue,
        unit: MetricUnit,
    ) -> Self {
        Self {
            metric_name: metric_name.into(),
            dimensions: vec![dimension],
            value,
            unit,
        }
    }
}

/// One page of a paginated listing
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_token: Option<String>,
}

impl<T> Page<T> {
    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            next_token: None,
        }
    }
}
