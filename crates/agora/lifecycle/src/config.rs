//! Tunables for the lifecycle controller.

use agora_council::ResolutionRule;
use serde::{Deserialize, Serialize};

/// Governance thresholds and limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GovernanceConfig {
    /// Requested amount, in minor units, at or above which approval goes
    /// to a council vote instead of auto-approval.
    pub council_threshold_minor: u64,
    /// Rule deciding when a council vote resolves.
    pub resolution_rule: ResolutionRule,
    /// Minimum proposal text length, in characters.
    pub min_text_len: usize,
    /// Budget for one evaluator call, in milliseconds. On expiry the
    /// proposal keeps its prior status and the caller gets a retryable
    /// error.
    pub evaluation_timeout_ms: u64,
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            council_threshold_minor: 100_000,
            resolution_rule: ResolutionRule::majority_of(3),
            min_text_len: 10,
            evaluation_timeout_ms: 10_000,
        }
    }
}

impl GovernanceConfig {
    pub fn with_council_threshold(mut self, minor: u64) -> Self {
        self.council_threshold_minor = minor;
        self
    }

    pub fn with_resolution_rule(mut self, rule: ResolutionRule) -> Self {
        self.resolution_rule = rule;
        self
    }

    pub fn with_min_text_len(mut self, len: usize) -> Self {
        self.min_text_len = len;
        self
    }

    pub fn with_evaluation_timeout_ms(mut self, ms: u64) -> Self {
        self.evaluation_timeout_ms = ms;
        self
    }
}
