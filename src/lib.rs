//! Adaptive context selection and optimization engine
//!
//! Selects, ranks, compresses, caches and adaptively tunes the subset of a
//! project's files handed to an AI coding assistant under a token budget.
//! The optimizer ranks eligible files per strategy and packs greedily; the
//! cache memoizes selections with fingerprint invalidation; the adaptive
//! manager learns per-task-type budgets and strategies from feedback.

pub mod adaptive;
pub mod cache;
pub mod compress;
pub mod config;
pub mod error;
pub mod feedback;
pub mod graph;
pub mod metrics;
pub mod optimizer;
pub mod project;
pub mod scoring;
pub mod tokens;

pub use adaptive::{AdaptedContext, AdaptiveContextManager, TaskProfile};
pub use cache::{CacheStats, SelectionCache};
pub use compress::{CompressedContext, CompressedFile, CompressionStrategy, ContextCompressor};
pub use config::EngineConfig;
pub use error::{ContextError, Result};
pub use feedback::{
    CompletionStatus, ContextFeedback, ExecutionData, FeedbackAnalysis, FeedbackCollector,
    FeedbackStore,
};
pub use graph::{DependencyGraph, GraphBuilder};
pub use optimizer::{
    ContextConstraints, ContextFile, ContextOptimizer, SelectedContext, SelectionStrategy, Task,
    TaskScope, TaskType,
};
pub use project::{FileInfo, FileType, ProjectContext};
pub use scoring::RelevanceScorer;
pub use tokens::{HeuristicEstimator, TiktokenEstimator, TokenEstimator};

use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// A fully wired engine: optimizer with cache and compressor, adaptive
/// manager, feedback collector, and the cache's background sweep.
pub struct Engine {
    pub optimizer: Arc<ContextOptimizer>,
    pub adaptive: Arc<AdaptiveContextManager>,
    pub feedback: FeedbackCollector,
    pub cache: Arc<SelectionCache>,
    sweeper: tokio::task::JoinHandle<()>,
}

impl Engine {
    /// Wire every component from one configuration with the heuristic token
    /// estimator. Must run inside a tokio runtime: the cache sweep task is
    /// spawned immediately.
    pub fn new(config: EngineConfig) -> Result<Self> {
        Self::with_estimator(config, Arc::new(HeuristicEstimator))
    }

    /// Wire with a custom token estimator (e.g. [`TiktokenEstimator`]).
    pub fn with_estimator(
        config: EngineConfig,
        estimator: Arc<dyn TokenEstimator>,
    ) -> Result<Self> {
        let cache = Arc::new(SelectionCache::new(
            config.cache.max_entries,
            Duration::from_secs(config.cache.ttl_secs),
        ));
        let sweeper = cache.spawn_cleanup(Duration::from_secs(config.cache.cleanup_interval_secs));

        let compressor = ContextCompressor::new(Arc::clone(&estimator), config.compression.clone());
        let mut optimizer =
            ContextOptimizer::new(config.scoring.clone()).with_compressor(compressor);
        if config.cache.enabled {
            optimizer = optimizer.with_cache(Arc::clone(&cache));
        }
        let optimizer = Arc::new(optimizer);

        let adaptive = Arc::new(AdaptiveContextManager::new(
            Arc::clone(&optimizer),
            config.adaptation.clone(),
        ));
        let store = FeedbackStore::new(config.feedback.storage_dir.clone())?;
        let feedback = FeedbackCollector::new(store, Arc::clone(&adaptive), config.feedback);

        info!("Context engine initialized");
        Ok(Self {
            optimizer,
            adaptive,
            feedback,
            cache,
            sweeper,
        })
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.sweeper.abort();
    }
}
