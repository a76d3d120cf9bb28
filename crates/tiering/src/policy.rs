//! Applies tier feature flags to an approved message and enforces usage
//! caps. Filtering is a pure function of the message and tier config, so
//! re-running it yields identical output.

use std::sync::Arc;

use attune_core::types::{FilteredMessage, Message, PresentationLevel};
use thiserror::Error;
use tracing::debug;

use crate::catalog::{TierCatalog, TierConfig};
use crate::usage::{CapWindow, UsageTracker};

/// Payload keys carrying presentation hints that lower tiers must not see.
const ADVANCED_HINT_KEYS: &[&str] = &["visual_theme", "animation", "interactive"];

#[derive(Error, Debug)]
pub enum TierError {
    #[error("{window} cap of {cap} reached")]
    CapExceeded { window: String, cap: u32 },
}

/// Tier policy: cap check followed by feature-flag filtering.
pub struct TierPolicy {
    catalog: Arc<TierCatalog>,
    usage: UsageTracker,
}

impl TierPolicy {
    pub fn new(catalog: Arc<TierCatalog>) -> Self {
        Self {
            catalog,
            usage: UsageTracker::new(),
        }
    }

    pub fn catalog(&self) -> &TierCatalog {
        &self.catalog
    }

    /// Check caps for `user_id` under `tier_code`, then filter the message.
    /// A cap hit returns `CapExceeded` with no side effects.
    pub fn apply(
        &self,
        message: &Message,
        user_id: &str,
        tier_code: &str,
    ) -> Result<FilteredMessage, TierError> {
        let config = self.catalog.resolve(tier_code);

        if let Some((window, cap)) = self.usage.exceeded_window(user_id, &config) {
            debug!(user_id = %user_id, %window, cap, "usage cap reached");
            return Err(TierError::CapExceeded {
                window: window.to_string(),
                cap,
            });
        }

        Ok(filter(message, &config))
    }

    /// Record a successful delivery against the user's rolling counters.
    /// Called only after the delivery handoff succeeds, so a blocked or
    /// deferred message never consumes quota.
    pub fn record_delivery(&self, user_id: &str) {
        self.usage.record(user_id);
    }

    pub fn usage(&self) -> &UsageTracker {
        &self.usage
    }
}

/// Pure tier filtering: strip advanced presentation hints the tier does not
/// allow and mark ad/feedback obligations.
pub fn filter(message: &Message, config: &TierConfig) -> FilteredMessage {
    let mut message = message.clone();

    let presentation = if config.advanced_presentation {
        PresentationLevel::Advanced
    } else {
        if let Some(map) = message.payload.as_object_mut() {
            for key in ADVANCED_HINT_KEYS {
                map.remove(*key);
            }
        }
        PresentationLevel::Standard
    };

    FilteredMessage {
        message,
        tier_code: config.code.clone(),
        ad_eligible: config.ads_enabled,
        feedback_required: config.feedback_required,
        presentation,
    }
}
