use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::constants::{
    CONFIG_PATH_ENV, DEFAULT_BATCH_SIZE, DEFAULT_CACHE_TTL_SECS, DEFAULT_CONFIG_PATH,
    DEFAULT_PAGE_SIZE, DEFAULT_SIMILARITY_THRESHOLD,
};
use crate::domain::ContactField;
use crate::error::{PipelineError, Result};
use crate::pipeline::batch::BatchProcessingOptions;
use crate::pipeline::ingestion::{Limits, RateLimiter};
use crate::pipeline::processing::normalize::rules::NormalizationRule;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub batch: BatchConfig,
    pub normalization: NormalizationConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub batch_size: usize,
    pub similarity_threshold: f64,
    pub cross_batch_reconciliation: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            cross_batch_reconciliation: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizationConfig {
    /// Applied after the built-in rules, in order
    pub custom_rules: Vec<PatternRuleConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternRuleConfig {
    pub field: ContactField,
    pub pattern: String,
    #[serde(default)]
    pub replacement: String,
    #[serde(default)]
    pub description: String,
}

impl PatternRuleConfig {
    pub fn to_rule(&self) -> Result<NormalizationRule> {
        let description = if self.description.is_empty() {
            format!("Custom pattern {} on {}", self.pattern, self.field)
        } else {
            self.description.clone()
        };
        NormalizationRule::pattern(self.field, &self.pattern, &self.replacement, description)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub page_size: usize,
    pub cache_ttl_secs: u64,
    /// Unset means unlimited
    pub requests_per_min: Option<u64>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            requests_per_min: None,
        }
    }
}

impl StoreConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn rate_limiter(&self) -> Option<RateLimiter> {
        self.requests_per_min.map(|rpm| {
            RateLimiter::new(Limits {
                requests_per_min: Some(rpm),
                concurrency: None,
            })
        })
    }
}

impl Config {
    /// Path from `CONTACT_PIPELINE_CONFIG`, or the default file name
    pub fn default_path() -> PathBuf {
        std::env::var(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
    }

    pub fn load() -> Result<Self> {
        Self::load_from(Self::default_path())
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config_content = fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;

        let config: Config = toml::from_str(&config_content)?;
        config.validate()?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Like [`Config::load_from`], but a missing file yields the defaults
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load_from(path)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch.batch_size == 0 {
            return Err(PipelineError::InvalidConfiguration(
                "batch.batch_size must be greater than 0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.batch.similarity_threshold) {
            return Err(PipelineError::InvalidConfiguration(format!(
                "batch.similarity_threshold must be within [0, 1], got {}",
                self.batch.similarity_threshold
            )));
        }
        if self.store.page_size == 0 {
            return Err(PipelineError::InvalidConfiguration(
                "store.page_size must be greater than 0".to_string(),
            ));
        }
        for rule in &self.normalization.custom_rules {
            if !rule.field.is_normalizable() {
                return Err(PipelineError::InvalidConfiguration(format!(
                    "field {} cannot carry normalization rules",
                    rule.field
                )));
            }
            rule.to_rule()?;
        }
        Ok(())
    }

    pub fn custom_rules(&self) -> Result<Vec<NormalizationRule>> {
        self.normalization
            .custom_rules
            .iter()
            .map(PatternRuleConfig::to_rule)
            .collect()
    }

    /// Batch options carrying the configured sizes, without callbacks
    pub fn batch_options(&self) -> BatchProcessingOptions {
        BatchProcessingOptions::new()
            .batch_size(self.batch.batch_size)
            .similarity_threshold(self.batch.similarity_threshold)
            .cross_batch_reconciliation(self.batch.cross_batch_reconciliation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_default(dir.path().join("absent.toml")).unwrap();

        assert_eq!(config, Config::default());
        assert_eq!(config.batch.batch_size, 50);
        assert_eq!(config.batch.similarity_threshold, 0.8);
        assert_eq!(config.store.page_size, 100);
    }

    #[test]
    fn test_load_with_custom_rules() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[batch]
batch_size = 10
cross_batch_reconciliation = true

[[normalization.custom_rules]]
field = "company"
pattern = "\\s+Inc\\.?$"
replacement = ""
description = "Drop Inc suffix"
"#
        )
        .unwrap();

        let config = Config::load_from(file.path()).unwrap();

        assert_eq!(config.batch.batch_size, 10);
        assert_eq!(config.batch.similarity_threshold, 0.8);
        assert!(config.batch.cross_batch_reconciliation);
        let rules = config.custom_rules().unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].description, "Drop Inc suffix");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.batch.batch_size = 0;
        assert!(matches!(config.validate(), Err(PipelineError::InvalidConfiguration(_))));

        let mut config = Config::default();
        config.batch.similarity_threshold = -0.1;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.normalization.custom_rules.push(PatternRuleConfig {
            field: ContactField::Email,
            pattern: "(".to_string(),
            replacement: String::new(),
            description: String::new(),
        });
        assert!(matches!(config.validate(), Err(PipelineError::Regex(_))));
    }

    #[test]
    fn test_unreadable_file_is_config_error() {
        assert!(matches!(
            Config::load_from("/nonexistent/contact_pipeline.toml"),
            Err(PipelineError::Config(_))
        ));
    }
}
