//! Tier reference data — feature flags and numeric caps per subscription
//! tier. Read-only once seeded; never mutated by message processing.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Feature flags and caps for one subscription tier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TierConfig {
    pub code: String,
    /// Whether messages for this tier carry an ad slot.
    pub ads_enabled: bool,
    /// Whether delivered messages require mandatory feedback from the user.
    pub feedback_required: bool,
    /// Whether advanced presentation (rich visuals/animation) is permitted.
    pub advanced_presentation: bool,
    pub daily_cap: u32,
    pub monthly_cap: u32,
    pub storage_mb: u32,
}

impl TierConfig {
    /// Entry tier: ad-supported, mandatory feedback, plain presentation.
    pub fn baseline() -> Self {
        Self {
            code: "T1".to_string(),
            ads_enabled: true,
            feedback_required: true,
            advanced_presentation: false,
            daily_cap: 3,
            monthly_cap: 60,
            storage_mb: 50,
        }
    }
}

/// Lookup table of tier configurations keyed by tier code.
pub struct TierCatalog {
    tiers: DashMap<String, TierConfig>,
}

impl TierCatalog {
    pub fn new() -> Self {
        Self {
            tiers: DashMap::new(),
        }
    }

    /// Catalog seeded with the three standard tiers.
    pub fn with_defaults() -> Self {
        let catalog = Self::new();
        catalog.register(TierConfig::baseline());
        catalog.register(TierConfig {
            code: "T2".to_string(),
            ads_enabled: false,
            feedback_required: false,
            advanced_presentation: false,
            daily_cap: 6,
            monthly_cap: 150,
            storage_mb: 200,
        });
        catalog.register(TierConfig {
            code: "T3".to_string(),
            ads_enabled: false,
            feedback_required: false,
            advanced_presentation: true,
            daily_cap: 10,
            monthly_cap: 300,
            storage_mb: 1000,
        });
        catalog
    }

    pub fn register(&self, config: TierConfig) {
        self.tiers.insert(config.code.clone(), config);
    }

    pub fn get(&self, code: &str) -> Option<TierConfig> {
        self.tiers.get(code).map(|c| c.clone())
    }

    /// Resolve a tier code, falling back to the baseline tier for codes the
    /// catalog does not know.
    pub fn resolve(&self, code: &str) -> TierConfig {
        match self.get(code) {
            Some(config) => config,
            None => {
                warn!(tier_code = %code, "unknown tier code, using baseline tier");
                TierConfig::baseline()
            }
        }
    }
}

impl Default for TierCatalog {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_catalog_tiers() {
        let catalog = TierCatalog::with_defaults();
        let t3 = catalog.get("T3").unwrap();
        assert_eq!(t3.daily_cap, 10);
        assert!(t3.advanced_presentation);
        assert!(!t3.ads_enabled);

        let t1 = catalog.get("T1").unwrap();
        assert!(t1.ads_enabled);
        assert!(t1.feedback_required);
    }

    #[test]
    fn test_unknown_code_resolves_to_baseline() {
        let catalog = TierCatalog::with_defaults();
        let resolved = catalog.resolve("enterprise-legacy");
        assert_eq!(resolved, TierConfig::baseline());
    }
}
