//! Negotiation configuration.
//!
//! Every field has a default, so an empty JSON object is a valid
//! configuration file.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CoreError, Result};

/// Default time tolerance for feasibility checks.
pub const DEFAULT_EPSILON: f64 = 1e-7;

/// Default upper bound on the length of a displacement cascade.
pub const DEFAULT_MAX_SHIFT_CHAIN: usize = 16;

/// Default number of consecutive failed quote rounds before an order gives up.
pub const DEFAULT_MAX_QUOTE_ROUNDS: u32 = 8;

/// How a courier decides whether a displacement batch is worth committing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplacementRule {
    /// Compare the displaced orders' new efficiencies against their
    /// committed efficiencies.
    #[default]
    DisplacedOnly,
    /// Like [`DisplacementRule::DisplacedOnly`], but the requester's own
    /// efficiency is added to the new side of the comparison.
    NetGain,
}

impl DisplacementRule {
    /// Returns true if the batch strictly improves on the status quo.
    ///
    /// `displaced_new` and `displaced_committed` are sums over the displaced
    /// orders; `requester` is the efficiency of the order asking to be placed.
    #[must_use]
    pub fn accepts(
        self,
        displaced_new: f64,
        displaced_committed: f64,
        requester: f64,
        epsilon: f64,
    ) -> bool {
        let candidate = match self {
            Self::DisplacedOnly => displaced_new,
            Self::NetGain => displaced_new + requester,
        };
        candidate > displaced_committed + epsilon
    }
}

/// Which insertion points a courier offers in response to a quote request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariantSearch {
    /// Earliest-available plus one variant per committed order.
    #[default]
    AfterEachOrder,
    /// Additionally offer every idle gap large enough for the order.
    FullGapSearch,
}

/// Configuration shared by every agent of a dispatch system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Time tolerance for feasibility and comparison checks.
    pub epsilon: f64,
    /// Displacement acceptance rule.
    pub displacement_rule: DisplacementRule,
    /// Variant enumeration mode.
    pub variant_search: VariantSearch,
    /// Longest displacement cascade a courier will attempt.
    pub max_shift_chain: usize,
    /// Consecutive failed quote rounds after which an order stops retrying.
    pub max_quote_rounds: u32,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            epsilon: DEFAULT_EPSILON,
            displacement_rule: DisplacementRule::default(),
            variant_search: VariantSearch::default(),
            max_shift_chain: DEFAULT_MAX_SHIFT_CHAIN,
            max_quote_rounds: DEFAULT_MAX_QUOTE_ROUNDS,
        }
    }
}

impl DispatchConfig {
    /// Loads and validates a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_json(&content)?;
        debug!(path = %path.as_ref().display(), ?config, "loaded dispatch config");
        Ok(config)
    }

    /// Parses and validates a JSON configuration string.
    pub fn from_json(content: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Sets the displacement rule.
    #[must_use]
    pub const fn with_displacement_rule(mut self, rule: DisplacementRule) -> Self {
        self.displacement_rule = rule;
        self
    }

    /// Sets the variant enumeration mode.
    #[must_use]
    pub const fn with_variant_search(mut self, search: VariantSearch) -> Self {
        self.variant_search = search;
        self
    }

    /// Sets the retry bound.
    #[must_use]
    pub const fn with_max_quote_rounds(mut self, rounds: u32) -> Self {
        self.max_quote_rounds = rounds;
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        if !(self.epsilon.is_finite() && self.epsilon > 0.0) {
            return Err(CoreError::InvalidConfig(
                "epsilon must be a positive number".into(),
            ));
        }
        if self.max_shift_chain == 0 {
            return Err(CoreError::InvalidConfig(
                "max_shift_chain must be at least 1".into(),
            ));
        }
        if self.max_quote_rounds == 0 {
            return Err(CoreError::InvalidConfig(
                "max_quote_rounds must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn empty_json_yields_defaults() {
        let config = DispatchConfig::from_json("{}").expect("parse");
        assert_eq!(config, DispatchConfig::default());
    }

    #[test]
    fn rules_parse_from_snake_case() {
        let config = DispatchConfig::from_json(
            r#"{"displacement_rule":"net_gain","variant_search":"full_gap_search"}"#,
        )
        .expect("parse");
        assert_eq!(config.displacement_rule, DisplacementRule::NetGain);
        assert_eq!(config.variant_search, VariantSearch::FullGapSearch);
    }

    #[test_case(r#"{"epsilon":0.0}"# ; "zero epsilon")]
    #[test_case(r#"{"epsilon":-1.0}"# ; "negative epsilon")]
    #[test_case(r#"{"max_shift_chain":0}"# ; "zero chain")]
    #[test_case(r#"{"max_quote_rounds":0}"# ; "zero rounds")]
    fn invalid_config_rejected(json: &str) {
        assert!(matches!(
            DispatchConfig::from_json(json),
            Err(CoreError::InvalidConfig(_))
        ));
    }

    #[test]
    fn malformed_json_is_parse_error() {
        assert!(matches!(
            DispatchConfig::from_json("{"),
            Err(CoreError::Parse(_))
        ));
    }

    #[test]
    fn displaced_only_requires_strict_gain() {
        let rule = DisplacementRule::DisplacedOnly;
        assert!(!rule.accepts(10.0, 10.0, 100.0, 1e-7));
        assert!(rule.accepts(10.5, 10.0, -100.0, 1e-7));
    }

    #[test]
    fn net_gain_counts_requester() {
        let rule = DisplacementRule::NetGain;
        assert!(rule.accepts(8.0, 10.0, 5.0, 1e-7));
        assert!(!rule.accepts(8.0, 10.0, 2.0, 1e-7));
    }
}
