// src/directory.rs

//! Target resolution and throttle-tolerant resource lookups

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rand::seq::SliceRandom;
use tracing::{debug, error, info, warn};

use crate::callbacks::{ResourceApi, SkipReason};
use crate::config::{ListSpec, MonitorSettings};
use crate::error::{ErrorKind, MonitorError, MonitorResult};
use crate::types::{Arn, MonitoredResource, Page, Resource, ResourceKind};

/// How long a cached snapshot may stand in for a throttled describe
pub const CACHE_TTL_MINUTES: i64 = 22;

/// Last good snapshot per ARN, consulted only after a throttled describe
#[derive(Debug, Default)]
pub struct ResourceCache {
    entries: HashMap<Arn, (Resource, DateTime<Utc>)>,
}

impl ResourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, resource: Resource, now: DateTime<Utc>) {
        self.entries.insert(resource.arn().clone(), (resource, now));
    }

    /// Unexpired snapshot for `arn`
    pub fn get(&self, arn: &Arn, now: DateTime<Utc>) -> Option<&Resource> {
        self.entries
            .get(arn)
            .filter(|(_, inserted_at)| now - *inserted_at < Duration::minutes(CACHE_TTL_MINUTES))
            .map(|(resource, _)| resource)
    }

    /// Drop expired entries
    pub fn purge_expired(&mut self, now: DateTime<Utc>) {
        self.entries
            .retain(|_, (_, inserted_at)| now - *inserted_at < Duration::minutes(CACHE_TTL_MINUTES));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Outcome of a single point lookup
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    /// Fresh read
    Live(Resource),
    /// Describe was throttled; served from cache
    Cached(Resource),
    /// Describe was throttled and nothing usable was cached
    Throttled,
    /// The resource no longer exists
    Gone,
}

/// ARNs to examine this invocation, by kind
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Targets {
    pub campaigns: Vec<Arn>,
    pub recommenders: Vec<Arn>,
}

impl Targets {
    pub fn len(&self) -> usize {
        self.campaigns.len() + self.recommenders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Monitorable resources plus what was left out and why
#[derive(Debug, Clone, Default)]
pub struct DirectorySnapshot {
    /// Shuffled processing order
    pub resources: Vec<Resource>,
    pub skipped: Vec<(Arn, SkipReason)>,
}

impl DirectorySnapshot {
    pub fn skipped_count(&self, reason: SkipReason) -> usize {
        self.skipped.iter().filter(|(_, r)| *r == reason).count()
    }
}

/// Resolves target ARNs and fetches their current state
pub struct ResourceDirectory {
    api: Arc<dyn ResourceApi>,
    cache: ResourceCache,
}

impl ResourceDirectory {
    pub fn new(api: Arc<dyn ResourceApi>) -> Self {
        Self {
            api,
            cache: ResourceCache::new(),
        }
    }

    pub fn cache(&self) -> &ResourceCache {
        &self.cache
    }

    /// Resolve which ARNs to examine.
    ///
    /// A list of exactly `all` discovers every resource of that kind in `regions`.
    /// At least one of the two lists must be configured.
    pub async fn resolve_targets(
        &self,
        settings: &MonitorSettings,
        regions: &[String],
    ) -> MonitorResult<Targets> {
        let campaign_spec = settings.campaign_arns.as_ref().filter(|spec| !spec.is_empty());
        let recommender_spec = settings.recommender_arns.as_ref().filter(|spec| !spec.is_empty());

        if campaign_spec.is_none() && recommender_spec.is_none() {
            return Err(MonitorError::invalid(
                "\"CampaignARNs\" or \"RecommenderARNs\" expression required in event or environment",
            ));
        }

        let targets = Targets {
            campaigns: self
                .resolve_kind(campaign_spec, ResourceKind::Campaign, regions)
                .await?,
            recommenders: self
                .resolve_kind(recommender_spec, ResourceKind::Recommender, regions)
                .await?,
        };

        debug!(
            campaigns = targets.campaigns.len(),
            recommenders = targets.recommenders.len(),
            "Resolved target ARNs"
        );
        Ok(targets)
    }

    async fn resolve_kind(
        &self,
        spec: Option<&ListSpec>,
        kind: ResourceKind,
        regions: &[String],
    ) -> MonitorResult<Vec<Arn>> {
        let Some(spec) = spec else {
            return Ok(Vec::new());
        };

        if spec.is_all() {
            let mut arns = Vec::new();
            for region in regions {
                let found = self.discover(kind, region).await?;
                debug!(region = %region, kind = %kind, count = found.len(), "Discovered resources");
                arns.extend(found);
            }
            return Ok(arns);
        }

        let mut arns = Vec::new();
        for value in spec.values() {
            let arn = Arn::parse(value)?;
            if arn.kind() != Some(kind) {
                return Err(MonitorError::invalid(format!(
                    "'{}' is not a {} ARN",
                    arn,
                    kind.as_str()
                )));
            }
            if !arns.contains(&arn) {
                arns.push(arn);
            }
        }
        Ok(arns)
    }

    /// Exhaustively page through the listing for one kind in one region
    async fn discover(&self, kind: ResourceKind, region: &str) -> MonitorResult<Vec<Arn>> {
        let mut arns = Vec::new();
        let mut next_token = None;

        loop {
            let page: Page<Arn> = match kind {
                ResourceKind::Campaign => self.api.list_campaigns(region, next_token).await?,
                ResourceKind::Recommender => self.api.list_recommenders(region, next_token).await?,
            };
            arns.extend(page.items);

            match page.next_token {
                Some(token) if !token.is_empty() => next_token = Some(token),
                _ => break,
            }
        }

        Ok(arns)
    }

    /// Point lookup; a fresh read always wins and refreshes the cache
    pub async fn fetch(&mut self, arn: &Arn, now: DateTime<Utc>) -> MonitorResult<Lookup> {
        let described = match arn.kind() {
            Some(ResourceKind::Campaign) => self.api.describe_campaign(arn).await.map(Resource::from),
            Some(ResourceKind::Recommender) => {
                self.api.describe_recommender(arn).await.map(Resource::from)
            }
            None => {
                return Err(MonitorError::invalid(format!(
                    "'{}' is neither a campaign nor a recommender",
                    arn
                )))
            }
        };

        match described {
            Ok(resource) => {
                self.cache.insert(resource.clone(), now);
                Ok(Lookup::Live(resource))
            }
            Err(err) => match err.kind() {
                ErrorKind::Throttled => {
                    error!(arn = %arn, error = %err, "Throttled while describing resource");
                    match self.cache.get(arn, now) {
                        Some(cached) => {
                            warn!(arn = %arn, "Using cached resource snapshot");
                            Ok(Lookup::Cached(cached.clone()))
                        }
                        None => {
                            warn!(arn = %arn, "Resource not found in cache; skipping this time");
                            Ok(Lookup::Throttled)
                        }
                    }
                }
                ErrorKind::NotFound => {
                    error!(arn = %arn, "Resource no longer exists; skipping");
                    Ok(Lookup::Gone)
                }
                _ => Err(err),
            },
        }
    }

    /// Fetch every target and keep the monitorable ones, in random order
    pub async fn active_resources(
        &mut self,
        targets: &Targets,
        now: DateTime<Utc>,
    ) -> MonitorResult<DirectorySnapshot> {
        let mut arns: Vec<Arn> = targets
            .campaigns
            .iter()
            .chain(targets.recommenders.iter())
            .cloned()
            .collect();
        arns.shuffle(&mut rand::thread_rng());

        self.cache.purge_expired(now);

        let mut snapshot = DirectorySnapshot::default();
        for arn in arns {
            let resource = match self.fetch(&arn, now).await? {
                Lookup::Live(resource) | Lookup::Cached(resource) => resource,
                Lookup::Throttled => {
                    snapshot.skipped.push((arn, SkipReason::ThrottledWithoutCache));
                    continue;
                }
                Lookup::Gone => {
                    snapshot.skipped.push((arn, SkipReason::NotFound));
                    continue;
                }
            };

            if resource.is_monitorable() {
                snapshot.resources.push(resource);
            } else {
                info!(
                    arn = %arn,
                    status = %resource.status(),
                    pending_update_status = ?resource.pending_update_status().map(ToString::to_string),
                    "Resource cannot be monitored in this state; skipping"
                );
                snapshot.skipped.push((arn, SkipReason::NotMonitorable));
            }
        }

        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callbacks::MockResourceApi;
    use crate::tests::{arn, campaign, recommender};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 4, 10, 8, 0, 0).unwrap()
    }

    #[test]
    fn test_cache_expires_after_22_minutes() {
        let mut cache = ResourceCache::new();
        let resource = Resource::from(campaign("shop", 5, now()));
        let key = resource.arn().clone();
        cache.insert(resource, now());

        assert!(cache.get(&key, now() + Duration::minutes(21)).is_some());
        assert!(cache.get(&key, now() + Duration::minutes(22)).is_none());

        cache.purge_expired(now() + Duration::minutes(30));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_resolve_explicit_csv() {
        let directory = ResourceDirectory::new(Arc::new(MockResourceApi::new()));
        let settings = MonitorSettings::builder()
            .current_region("us-east-1")
            .campaign_arns(&format!(" {} , {},", arn(ResourceKind::Campaign, "a"), arn(ResourceKind::Campaign, "b")))
            .build();

        let targets = directory
            .resolve_targets(&settings, &["us-east-1".to_string()])
            .await
            .unwrap();
        assert_eq!(
            targets.campaigns,
            vec![arn(ResourceKind::Campaign, "a"), arn(ResourceKind::Campaign, "b")]
        );
        assert!(targets.recommenders.is_empty());
    }

    #[tokio::test]
    async fn test_resolve_requires_some_targets() {
        let directory = ResourceDirectory::new(Arc::new(MockResourceApi::new()));
        let settings = MonitorSettings::builder().current_region("us-east-1").build();

        let err = directory
            .resolve_targets(&settings, &["us-east-1".to_string()])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Invalid);
    }

    #[tokio::test]
    async fn test_resolve_rejects_wrong_kind() {
        let directory = ResourceDirectory::new(Arc::new(MockResourceApi::new()));
        let settings = MonitorSettings::builder()
            .current_region("us-east-1")
            .campaign_arns(arn(ResourceKind::Recommender, "feed").as_str())
            .build();

        let err = directory
            .resolve_targets(&settings, &["us-east-1".to_string()])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Invalid);
    }

    #[tokio::test]
    async fn test_discovery_pages_every_region() {
        let mut api = MockResourceApi::new();
        api.expect_list_campaigns()
            .withf(|region, token| region == "us-east-1" && token.is_none())
            .times(1)
            .returning(|_, _| {
                Ok(Page {
                    items: vec![arn(ResourceKind::Campaign, "one")],
                    next_token: Some("page-2".to_string()),
                })
            });
        api.expect_list_campaigns()
            .withf(|region, token| region == "us-east-1" && token.as_deref() == Some("page-2"))
            .times(1)
            .returning(|_, _| Ok(Page::last(vec![arn(ResourceKind::Campaign, "two")])));
        api.expect_list_campaigns()
            .withf(|region, _| region == "us-west-2")
            .times(1)
            .returning(|_, _| {
                Ok(Page::last(vec![Arn::parse(
                    "arn:aws:personalize:us-west-2:123456789012:campaign/three",
                )
                .unwrap()]))
            });

        let directory = ResourceDirectory::new(Arc::new(api));
        let settings = MonitorSettings::builder()
            .current_region("us-east-1")
            .campaign_arns("ALL")
            .build();

        let targets = directory
            .resolve_targets(&settings, &["us-east-1".to_string(), "us-west-2".to_string()])
            .await
            .unwrap();
        assert_eq!(targets.campaigns.len(), 3);
        assert_eq!(targets.campaigns[2].region(), "us-west-2");
    }

    #[tokio::test]
    async fn test_throttle_falls_back_to_cache() {
        let created = now() - Duration::days(3);
        let mut api = MockResourceApi::new();
        let mut calls = 0;
        api.expect_describe_campaign().times(2).returning(move |_| {
            calls += 1;
            if calls == 1 {
                Ok(campaign("shop", 5, created))
            } else {
                Err(MonitorError::throttled("DescribeCampaign", "Rate exceeded"))
            }
        });

        let mut directory = ResourceDirectory::new(Arc::new(api));
        let key = arn(ResourceKind::Campaign, "shop");

        assert!(matches!(directory.fetch(&key, now()).await.unwrap(), Lookup::Live(_)));
        match directory.fetch(&key, now() + Duration::minutes(10)).await.unwrap() {
            Lookup::Cached(resource) => assert_eq!(resource.min_capacity(), 5),
            other => panic!("expected cached snapshot, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_throttle_without_cache_skips() {
        let mut api = MockResourceApi::new();
        api.expect_describe_recommender()
            .returning(|_| Err(MonitorError::throttled("DescribeRecommender", "Rate exceeded")));

        let mut directory = ResourceDirectory::new(Arc::new(api));
        let lookup = directory
            .fetch(&arn(ResourceKind::Recommender, "feed"), now())
            .await
            .unwrap();
        assert_eq!(lookup, Lookup::Throttled);
        assert!(directory.cache().is_empty());
    }

    #[tokio::test]
    async fn test_not_found_is_skipped_and_upstream_is_fatal() {
        let mut api = MockResourceApi::new();
        api.expect_describe_campaign()
            .withf(|arn| arn.as_str().ends_with("/gone"))
            .returning(|arn| Err(MonitorError::resource_gone(arn)));
        api.expect_describe_campaign()
            .withf(|arn| arn.as_str().ends_with("/broken"))
            .returning(|_| Err(MonitorError::upstream("DescribeCampaign", "AccessDenied")));

        let mut directory = ResourceDirectory::new(Arc::new(api));
        assert_eq!(
            directory.fetch(&arn(ResourceKind::Campaign, "gone"), now()).await.unwrap(),
            Lookup::Gone
        );

        let err = directory
            .fetch(&arn(ResourceKind::Campaign, "broken"), now())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Upstream);
    }

    #[tokio::test]
    async fn test_active_resources_filters_and_counts_skips() {
        let created = now() - Duration::days(5);
        let mut api = MockResourceApi::new();
        api.expect_describe_campaign().returning(move |arn| {
            let name = arn.as_str().rsplit('/').next().unwrap_or_default().to_string();
            let mut c = campaign(&name, 2, created);
            match name.as_str() {
                "creating" => c.status = "CREATE IN_PROGRESS".into(),
                "deleting" => c.latest_update_status = Some("DELETE PENDING".into()),
                "gone" => return Err(MonitorError::resource_gone(arn)),
                _ => {}
            }
            Ok(c)
        });
        api.expect_describe_recommender()
            .returning(move |_| Ok(recommender("feed", 3, created)));

        let targets = Targets {
            campaigns: ["ok", "creating", "deleting", "gone"]
                .iter()
                .map(|name| arn(ResourceKind::Campaign, name))
                .collect(),
            recommenders: vec![arn(ResourceKind::Recommender, "feed")],
        };

        let mut directory = ResourceDirectory::new(Arc::new(api));
        let snapshot = directory.active_resources(&targets, now()).await.unwrap();

        let mut names: Vec<&str> = snapshot.resources.iter().map(|r| r.name()).collect();
        names.sort_unstable();
        assert_eq!(names, vec!["feed", "ok"]);
        assert_eq!(snapshot.skipped_count(SkipReason::NotMonitorable), 2);
        assert_eq!(snapshot.skipped_count(SkipReason::NotFound), 1);
        assert_eq!(snapshot.skipped_count(SkipReason::ThrottledWithoutCache), 0);
        // Non-monitorable snapshots still refresh the cache
        assert_eq!(directory.cache().len(), 4);
    }
}
