//! Matching options and engine configuration
//!
//! `AutoMatchOptions` tunes the scoring of a single run. `ReconciliationConfig`
//! wraps it with the settings of the match lifecycle and can be loaded from
//! TOML:
//!
//! ```toml
//! auto_apply_threshold = 0.95
//! matched_by = "system"
//!
//! [matching]
//! exact_amount_match = true
//! date_tolerance_days = 3
//! description_similarity = 0.7
//! reference_match = true
//!
//! [[rules]]
//! id = "frais"
//! name = "Frais bancaires"
//! priority = 5
//!
//! [rules.conditions]
//! amount_match = "tolerance"
//! amount_tolerance = 100
//! date_match = "range"
//! date_range = 2
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::reconciliation::rules::MatchRule;
use crate::reconciliation::scoring::MATCH_THRESHOLD;
use crate::types::*;

/// Tunable weights of the auto-matching score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoMatchOptions {
    /// Award the top amount tier only for bit-exact equal amounts
    pub exact_amount_match: bool,
    /// Width of the linear date-decay window, in days
    pub date_tolerance_days: u32,
    /// Minimum description similarity in [0, 1] to earn description credit
    pub description_similarity: f64,
    /// Enable the reference-equality component
    pub reference_match: bool,
}

impl Default for AutoMatchOptions {
    fn default() -> Self {
        Self {
            exact_amount_match: true,
            date_tolerance_days: 3,
            description_similarity: 0.7,
            reference_match: true,
        }
    }
}

impl AutoMatchOptions {
    /// Check that the options describe a usable scoring setup
    pub fn validate(&self) -> ReconciliationResult<()> {
        if !(0.0..=1.0).contains(&self.description_similarity) {
            return Err(ReconciliationError::Config(format!(
                "description_similarity must be within [0, 1], got {}",
                self.description_similarity
            )));
        }
        Ok(())
    }
}

/// Settings of the reconciliation manager
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconciliationConfig {
    pub matching: AutoMatchOptions,
    /// Suggestions at or above this confidence are applied by `auto_match`
    pub auto_apply_threshold: f64,
    /// Recorded as `matched_by` on matches the manager creates
    pub matched_by: String,
    /// Matching rules tried before scored suggestions
    pub rules: Vec<MatchRule>,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            matching: AutoMatchOptions::default(),
            auto_apply_threshold: 0.95,
            matched_by: "system".to_string(),
            rules: Vec::new(),
        }
    }
}

impl ReconciliationConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> ReconciliationResult<Self> {
        let config: ReconciliationConfig = toml::from_str(content)
            .map_err(|e| ReconciliationError::Config(format!("Failed to parse TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> ReconciliationResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> ReconciliationResult<()> {
        self.matching.validate()?;

        if !(MATCH_THRESHOLD..=1.0).contains(&self.auto_apply_threshold) {
            return Err(ReconciliationError::Config(format!(
                "auto_apply_threshold must be within [{MATCH_THRESHOLD}, 1], got {}",
                self.auto_apply_threshold
            )));
        }

        if self.matched_by.trim().is_empty() {
            return Err(ReconciliationError::Config(
                "matched_by cannot be empty".to_string(),
            ));
        }

        let mut ids = HashSet::new();
        for rule in &self.rules {
            rule.validate()?;
            if !ids.insert(rule.id.as_str()) {
                return Err(ReconciliationError::Config(format!(
                    "Duplicate rule id '{}'",
                    rule.id
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = ReconciliationConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.matching.exact_amount_match);
        assert_eq!(config.matching.date_tolerance_days, 3);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = ReconciliationConfig::from_toml_str(
            r#"
            matched_by = "comptable"

            [matching]
            date_tolerance_days = 7
            "#,
        )
        .unwrap();

        assert_eq!(config.matched_by, "comptable");
        assert_eq!(config.matching.date_tolerance_days, 7);
        assert_eq!(config.matching.description_similarity, 0.7);
        assert_eq!(config.auto_apply_threshold, 0.95);
    }

    #[test]
    fn test_rejects_out_of_range_values() {
        let err = ReconciliationConfig::from_toml_str(
            r#"
            [matching]
            description_similarity = 1.5
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ReconciliationError::Config(_)));

        let err = ReconciliationConfig::from_toml_str("auto_apply_threshold = 0.5").unwrap_err();
        assert!(matches!(err, ReconciliationError::Config(_)));
    }

    #[test]
    fn test_rejects_malformed_toml() {
        let err = ReconciliationConfig::from_toml_str("matching = [").unwrap_err();
        assert!(matches!(err, ReconciliationError::Config(_)));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "auto_apply_threshold = 0.9").unwrap();

        let config = ReconciliationConfig::from_file(file.path()).unwrap();
        assert_eq!(config.auto_apply_threshold, 0.9);

        let missing = ReconciliationConfig::from_file("/nonexistent/reconciliation.toml");
        assert!(matches!(missing, Err(ReconciliationError::Io(_))));
    }

    #[test]
    fn test_rules_from_toml() {
        let config = ReconciliationConfig::from_toml_str(
            r#"
            [[rules]]
            id = "frais"
            name = "Frais bancaires"
            priority = 5

            [rules.conditions]
            amount_match = "tolerance"
            amount_tolerance = "100"
            date_match = "range"
            date_range = 2

            [[rules]]
            id = "loyer"
            name = "Loyer"
            auto_apply = true
            "#,
        )
        .unwrap();

        assert_eq!(config.rules.len(), 2);
        let fees = &config.rules[0];
        assert!(fees.active);
        assert!(!fees.auto_apply);
        assert_eq!(fees.conditions.date_range, Some(2));
        assert_eq!(
            fees.conditions.amount_tolerance,
            Some(bigdecimal::BigDecimal::from(100))
        );
        assert!(config.rules[1].auto_apply);
    }

    #[test]
    fn test_rejects_invalid_rules() {
        let duplicate = ReconciliationConfig::from_toml_str(
            r#"
            [[rules]]
            id = "r"
            name = "A"

            [[rules]]
            id = "r"
            name = "B"
            "#,
        );
        assert!(matches!(duplicate, Err(ReconciliationError::Config(_))));

        let incomplete = ReconciliationConfig::from_toml_str(
            r#"
            [[rules]]
            id = "r"
            name = "A"
            conditions = { date_match = "range" }
            "#,
        );
        assert!(matches!(incomplete, Err(ReconciliationError::Config(_))));
    }
}
