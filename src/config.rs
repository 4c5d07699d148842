//! Engine configuration
//!
//! Every tunable weight and threshold used by the ranking, caching,
//! compression and learning code lives here, so the formulas stay testable
//! independent of the components that apply them. Values load from an
//! optional config file plus `CTX_`-prefixed environment overrides.

use crate::error::{ContextError, Result};
use serde::{Deserialize, Serialize};

/// Top-level engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub scoring: ScoringWeights,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub compression: CompressionConfig,

    #[serde(default)]
    pub adaptation: AdaptationConfig,

    #[serde(default)]
    pub feedback: FeedbackConfig,
}

impl EngineConfig {
    /// Load configuration from an optional file merged with environment
    /// variables (`CTX_CACHE__MAX_ENTRIES=200` style overrides).
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder
            .add_source(config::Environment::with_prefix("CTX").separator("__"))
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| ContextError::Configuration(e.to_string()))
    }
}

/// Weights for the ranking strategies and the relevance heuristic
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringWeights {
    /// Relevance share in the dependency strategy
    #[serde(default = "default_dependency_relevance")]
    pub dependency_relevance: f32,

    /// Centrality share in the dependency strategy
    #[serde(default = "default_dependency_centrality")]
    pub dependency_centrality: f32,

    /// Relevance share in the balanced strategy
    #[serde(default = "default_balanced_relevance")]
    pub balanced_relevance: f32,

    /// Centrality share in the balanced strategy
    #[serde(default = "default_balanced_centrality")]
    pub balanced_centrality: f32,

    /// Freshness share in the balanced strategy
    #[serde(default = "default_balanced_freshness")]
    pub balanced_freshness: f32,

    /// Size-efficiency share in the balanced strategy
    #[serde(default = "default_balanced_size")]
    pub balanced_size: f32,

    /// Token count treated as fully size-efficient
    #[serde(default = "default_size_reference_tokens")]
    pub size_reference_tokens: usize,

    /// Multiplier in the compactness density score
    #[serde(default = "default_compactness_scale")]
    pub compactness_scale: f32,

    /// Files younger than this are maximally fresh (hours)
    #[serde(default = "default_fresh_age_hours")]
    pub fresh_age_hours: f32,

    /// Freshness decay half-life in days
    #[serde(default = "default_freshness_half_life_days")]
    pub freshness_half_life_days: f32,

    /// Score for a task keyword matching the file stem exactly
    #[serde(default = "default_keyword_stem_weight")]
    pub keyword_stem_weight: f32,

    /// Score for a task keyword appearing anywhere in the path
    #[serde(default = "default_keyword_path_weight")]
    pub keyword_path_weight: f32,
}

fn default_dependency_relevance() -> f32 {
    0.7
}

fn default_dependency_centrality() -> f32 {
    0.3
}

fn default_balanced_relevance() -> f32 {
    0.5
}

fn default_balanced_centrality() -> f32 {
    0.2
}

fn default_balanced_freshness() -> f32 {
    0.15
}

fn default_balanced_size() -> f32 {
    0.15
}

fn default_size_reference_tokens() -> usize {
    2000
}

fn default_compactness_scale() -> f32 {
    1000.0
}

fn default_fresh_age_hours() -> f32 {
    24.0
}

fn default_freshness_half_life_days() -> f32 {
    7.0
}

fn default_keyword_stem_weight() -> f32 {
    0.4
}

fn default_keyword_path_weight() -> f32 {
    0.25
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            dependency_relevance: default_dependency_relevance(),
            dependency_centrality: default_dependency_centrality(),
            balanced_relevance: default_balanced_relevance(),
            balanced_centrality: default_balanced_centrality(),
            balanced_freshness: default_balanced_freshness(),
            balanced_size: default_balanced_size(),
            size_reference_tokens: default_size_reference_tokens(),
            compactness_scale: default_compactness_scale(),
            fresh_age_hours: default_fresh_age_hours(),
            freshness_half_life_days: default_freshness_half_life_days(),
            keyword_stem_weight: default_keyword_stem_weight(),
            keyword_path_weight: default_keyword_path_weight(),
        }
    }
}

/// Selection cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,

    /// Maximum number of cached selections
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// Default entry time-to-live in seconds
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,

    /// Background sweep interval in seconds
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
}

fn default_cache_enabled() -> bool {
    true
}

fn default_max_entries() -> usize {
    100
}

fn default_ttl_secs() -> u64 {
    300
}

fn default_cleanup_interval_secs() -> u64 {
    60
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            max_entries: default_max_entries(),
            ttl_secs: default_ttl_secs(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
        }
    }
}

/// Compression configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressionConfig {
    /// Lines kept around each function marker by the snippet technique
    #[serde(default = "default_snippet_context_lines")]
    pub snippet_context_lines: usize,
}

fn default_snippet_context_lines() -> usize {
    5
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            snippet_context_lines: default_snippet_context_lines(),
        }
    }
}

/// Adaptive learning configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptationConfig {
    /// Exponential moving average learning rate
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f32,

    /// Feedback samples required before learned adaptation applies
    #[serde(default = "default_min_samples")]
    pub min_samples_for_adaptation: u64,

    /// Fraction of the learned budget gap applied per request
    #[serde(default = "default_aggressiveness")]
    pub aggressiveness: f32,

    /// Hard cap on a single budget adjustment (tokens)
    #[serde(default = "default_max_budget_adjustment")]
    pub max_budget_adjustment: i64,

    /// Success/quality bar for trusting a learned preference
    #[serde(default = "default_quality_threshold")]
    pub quality_threshold: f32,

    /// In-memory feedback log retention in days
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
}

fn default_learning_rate() -> f32 {
    0.1
}

fn default_min_samples() -> u64 {
    5
}

fn default_aggressiveness() -> f32 {
    0.3
}

fn default_max_budget_adjustment() -> i64 {
    2000
}

fn default_quality_threshold() -> f32 {
    0.7
}

fn default_retention_days() -> i64 {
    30
}

impl Default for AdaptationConfig {
    fn default() -> Self {
        Self {
            learning_rate: default_learning_rate(),
            min_samples_for_adaptation: default_min_samples(),
            aggressiveness: default_aggressiveness(),
            max_budget_adjustment: default_max_budget_adjustment(),
            quality_threshold: default_quality_threshold(),
            retention_days: default_retention_days(),
        }
    }
}

/// Feedback collection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackConfig {
    /// Directory for persisted feedback records
    #[serde(default = "default_storage_dir")]
    pub storage_dir: String,

    /// Seconds a trend analysis stays cached
    #[serde(default = "default_trend_cache_secs")]
    pub trend_cache_secs: u64,

    /// Export lookback window in days
    #[serde(default = "default_export_lookback_days")]
    pub export_lookback_days: i64,

    /// Samples required before trend recommendations are meaningful
    #[serde(default = "default_min_trend_samples")]
    pub min_trend_samples: usize,

    /// Average quality below this is flagged in trend analysis
    #[serde(default = "default_fair_quality_threshold")]
    pub fair_quality_threshold: f32,
}

fn default_storage_dir() -> String {
    "feedback".to_string()
}

fn default_trend_cache_secs() -> u64 {
    300
}

fn default_export_lookback_days() -> i64 {
    365
}

fn default_min_trend_samples() -> usize {
    5
}

fn default_fair_quality_threshold() -> f32 {
    0.6
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            storage_dir: default_storage_dir(),
            trend_cache_secs: default_trend_cache_secs(),
            export_lookback_days: default_export_lookback_days(),
            min_trend_samples: default_min_trend_samples(),
            fair_quality_threshold: default_fair_quality_threshold(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_consistent() {
        let config = EngineConfig::default();
        let w = &config.scoring;
        let balanced_total = w.balanced_relevance
            + w.balanced_centrality
            + w.balanced_freshness
            + w.balanced_size;
        assert!((balanced_total - 1.0).abs() < 1e-6);
        assert!((w.dependency_relevance + w.dependency_centrality - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_adaptation_defaults() {
        let config = AdaptationConfig::default();
        assert_eq!(config.min_samples_for_adaptation, 5);
        assert!(config.learning_rate > 0.0 && config.learning_rate < 1.0);
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = EngineConfig::load(None).unwrap();
        assert_eq!(config.cache.max_entries, 100);
        assert_eq!(config.feedback.storage_dir, "feedback");
    }
}
