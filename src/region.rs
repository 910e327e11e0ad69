// src/region.rs

use tracing::debug;

use crate::config::MonitorSettings;

/// Regions to scan: the configured list, or else the region we are running in
pub fn resolve_regions(settings: &MonitorSettings) -> Vec<String> {
    let configured = settings
        .regions
        .as_ref()
        .map(|regions| regions.values())
        .unwrap_or_default();

    let regions = if configured.is_empty() {
        vec![settings.current_region.trim().to_string()]
    } else {
        let mut unique: Vec<String> = Vec::with_capacity(configured.len());
        for region in configured {
            if !unique.contains(&region) {
                unique.push(region);
            }
        }
        unique
    };

    debug!(regions = ?regions, "Resolved regions to scan");
    regions
}
