//! Context selection orchestration
//!
//! Ranks eligible files under the active strategy, packs them greedily under
//! the token budget, consults the selection cache, and tightens thresholds
//! progressively when a budget cannot be met. Budget compliance is
//! best-effort: after the tightening ladder is exhausted the selection is
//! returned with its true token count and the caller decides.

pub mod models;

pub use models::{
    ContextConstraints, ContextFile, ContextPriority, SelectedContext, SelectionStrategy, Task,
    TaskScope, TaskType,
};

use crate::cache::SelectionCache;
use crate::compress::{CompressedContext, CompressionStrategy, ContextCompressor};
use crate::config::ScoringWeights;
use crate::error::{ContextError, Result};
use crate::graph::{DependencyGraph, GraphBuilder};
use crate::metrics::METRICS;
use crate::project::{FileInfo, ProjectContext};
use crate::scoring::RelevanceScorer;
use chrono::{DateTime, Utc};
use glob::Pattern;
use std::collections::HashSet;
use std::time::Instant;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Relevance floor applied by the first rung of the tightening ladder
const LADDER_MIN_RELEVANCE: f32 = 0.3;

/// Headroom multiplier for the relaxed first pass of budget optimization.
/// The first selection may overshoot the target budget; the ladder then
/// tightens toward it.
const RELAXED_BUDGET_FACTOR: usize = 2;

/// Selects the optimal file subset for a task under constraints
pub struct ContextOptimizer {
    scorer: RelevanceScorer,
    graph_builder: GraphBuilder,
    compressor: Option<ContextCompressor>,
    cache: Option<Arc<SelectionCache>>,
    weights: ScoringWeights,
}

impl ContextOptimizer {
    pub fn new(weights: ScoringWeights) -> Self {
        Self {
            scorer: RelevanceScorer::new(weights.clone()),
            graph_builder: GraphBuilder::new(),
            compressor: None,
            cache: None,
            weights,
        }
    }

    pub fn with_cache(mut self, cache: Arc<SelectionCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_compressor(mut self, compressor: ContextCompressor) -> Self {
        self.compressor = Some(compressor);
        self
    }

    /// Select the best file subset for `task` under `constraints`.
    ///
    /// Checks the cache first; on a miss the full ranking runs and the result
    /// is cached alongside the project fingerprint.
    pub async fn select_optimal_context(
        &self,
        project: &ProjectContext,
        task: &Task,
        constraints: &ContextConstraints,
    ) -> Result<SelectedContext> {
        let start = Instant::now();
        let key = cache_key(project, task, constraints.max_tokens);

        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.get(&key) {
                METRICS.cache_hits.inc();
                METRICS.record_selection(
                    &constraints.strategy.to_string(),
                    true,
                    start.elapsed().as_secs_f64(),
                );
                debug!("Selection cache hit for task {}", task.id);
                return Ok(hit);
            }
            METRICS.cache_misses.inc();
        }

        let selection = self.select_uncached(project, task, constraints, start)?;

        if let Some(cache) = &self.cache {
            if let Some(fingerprint) = project.fingerprint_for(&selection.file_paths()) {
                cache.set(&key, selection.clone(), fingerprint, None);
            }
        }

        METRICS.record_selection(
            &constraints.strategy.to_string(),
            false,
            start.elapsed().as_secs_f64(),
        );
        Ok(selection)
    }

    /// Select under a hard token budget, tightening progressively.
    ///
    /// Starts from relaxed constraints; on overage raises the relevance
    /// floor, then shrinks dependency depth, then compresses with the
    /// snippet technique. Not guaranteed to converge: the final result may
    /// still exceed `budget` and is returned with its true token count.
    pub async fn optimize_for_token_budget(
        &self,
        project: &ProjectContext,
        budget: usize,
        task: &Task,
    ) -> Result<SelectedContext> {
        let mut constraints = ContextConstraints::relaxed(budget * RELAXED_BUDGET_FACTOR);
        let mut selection =
            self.select_uncached(project, task, &constraints, Instant::now())?;
        if selection.total_tokens <= budget {
            return Ok(selection);
        }

        debug!(
            "Selection over budget ({} > {}), raising relevance floor",
            selection.total_tokens, budget
        );
        constraints.min_relevance_score = LADDER_MIN_RELEVANCE;
        selection = self.select_uncached(project, task, &constraints, Instant::now())?;
        if selection.total_tokens <= budget {
            return Ok(selection);
        }

        debug!("Still over budget, reducing dependency depth");
        constraints.dependency_depth = 1;
        selection = self.select_uncached(project, task, &constraints, Instant::now())?;
        if selection.total_tokens <= budget {
            return Ok(selection);
        }

        METRICS.record_budget_overflow();
        let Some(compressor) = &self.compressor else {
            warn!(
                "Budget ladder exhausted without a compressor; returning {} tokens against {}",
                selection.total_tokens, budget
            );
            return Ok(selection);
        };

        let compressed = compressor.compress(&selection, CompressionStrategy::Snippet)?;
        METRICS.record_compression("snippet");
        info!(
            "Compressed selection from {} to {} tokens (budget {})",
            compressed.total_original_tokens, compressed.total_compressed_tokens, budget
        );

        for (ctx_file, comp_file) in selection.files.iter_mut().zip(&compressed.files) {
            ctx_file.content = Some(comp_file.content.clone());
        }
        selection.total_tokens = compressed.total_compressed_tokens;
        Ok(selection)
    }

    /// Compress an existing selection with an explicit strategy.
    pub fn apply_compression_strategy(
        &self,
        selection: &SelectedContext,
        strategy: CompressionStrategy,
    ) -> Result<CompressedContext> {
        let compressor = self
            .compressor
            .as_ref()
            .ok_or(ContextError::CompressorUnavailable)?;
        let compressed = compressor.compress(selection, strategy)?;
        METRICS.record_compression(&strategy.to_string());
        Ok(compressed)
    }

    /// Store a selection in the cache under its derived key.
    /// A missing or disabled cache is a no-op, never an error.
    pub fn cache_context_selection(&self, project: &ProjectContext, selection: &SelectedContext) {
        let Some(cache) = &self.cache else { return };
        let key = cache_key(project, &selection.task, selection.constraints.max_tokens);
        if let Some(fingerprint) = project.fingerprint_for(&selection.file_paths()) {
            cache.set(&key, selection.clone(), fingerprint, None);
        }
    }

    /// Cache lookup without running a selection. Absent cache is a miss.
    pub fn get_cached_selection(
        &self,
        project: &ProjectContext,
        task: &Task,
        max_tokens: usize,
    ) -> Option<SelectedContext> {
        self.cache
            .as_ref()
            .and_then(|cache| cache.get(&cache_key(project, task, max_tokens)))
    }

    fn select_uncached(
        &self,
        project: &ProjectContext,
        task: &Task,
        constraints: &ContextConstraints,
        start: Instant,
    ) -> Result<SelectedContext> {
        let patterns = compile_patterns(&constraints.excluded_patterns)?;
        let graph_storage = self.graph_for(project, constraints)?;
        let graph: Option<&DependencyGraph> = graph_storage.as_ref().map(|g| g.get());
        let now = Utc::now();

        let mut ranked: Vec<(f32, &FileInfo)> = project
            .files
            .iter()
            .filter(|f| eligible(f, constraints, &patterns))
            .map(|f| (self.strategy_score(f, task, graph, constraints, now), f))
            .filter(|(score, _)| *score >= constraints.min_relevance_score)
            .collect();

        // Deterministic total order: score descending, then path ascending
        ranked.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.1.path.cmp(&b.1.path))
        });

        let mut files: Vec<ContextFile> = Vec::new();
        let mut total_tokens = 0usize;
        for (score, file) in &ranked {
            if files.len() >= constraints.max_files {
                break;
            }
            if total_tokens + file.token_count > constraints.max_tokens {
                continue;
            }
            total_tokens += file.token_count;
            files.push(ContextFile::new(
                (*file).clone(),
                *score,
                inclusion_reason(constraints.strategy),
            ));
        }

        if let Some(graph) = graph {
            total_tokens += self.expand_dependencies(
                project,
                task,
                constraints,
                graph,
                &patterns,
                now,
                &mut files,
                total_tokens,
            );
        }

        let selection_score = if files.is_empty() {
            0.0
        } else {
            files.iter().map(|f| f.relevance_score).sum::<f32>() / files.len() as f32
        };

        let selection = SelectedContext {
            task: task.clone(),
            total_tokens,
            total_files: files.len(),
            selection_score,
            strategy: constraints.strategy,
            constraints: constraints.clone(),
            created_at: now,
            selection_duration: start.elapsed(),
            files,
        };

        info!(
            "Selected {} files, {} tokens ({} strategy) for task {}",
            selection.total_files, selection.total_tokens, constraints.strategy, task.id
        );
        Ok(selection)
    }

    /// Pull in local dependencies of already-selected files, breadth-first up
    /// to the constraint's traversal depth, as long as they still fit.
    /// Returns the tokens added.
    #[allow(clippy::too_many_arguments)]
    fn expand_dependencies(
        &self,
        project: &ProjectContext,
        task: &Task,
        constraints: &ContextConstraints,
        graph: &DependencyGraph,
        patterns: &[Pattern],
        now: DateTime<Utc>,
        files: &mut Vec<ContextFile>,
        mut total_tokens: usize,
    ) -> usize {
        let start_tokens = total_tokens;
        let mut included: HashSet<String> =
            files.iter().map(|f| f.file.path.clone()).collect();
        let mut frontier: Vec<String> = included.iter().cloned().collect();
        frontier.sort();

        for _ in 0..constraints.dependency_depth {
            let mut next: Vec<String> = Vec::new();
            for path in &frontier {
                let Some(node) = graph.node(path) else { continue };
                for dep in &node.dependencies {
                    if included.contains(dep) {
                        continue;
                    }
                    let Some(file) = project.file(dep) else { continue };
                    if !eligible(file, constraints, patterns) {
                        continue;
                    }
                    if files.len() >= constraints.max_files
                        || total_tokens + file.token_count > constraints.max_tokens
                    {
                        continue;
                    }
                    let score = self.strategy_score(file, task, Some(graph), constraints, now);
                    total_tokens += file.token_count;
                    files.push(ContextFile::new(
                        file.clone(),
                        score,
                        "imported by a selected file",
                    ));
                    included.insert(dep.clone());
                    next.push(dep.clone());
                }
            }
            if next.is_empty() {
                break;
            }
            frontier = next;
        }
        total_tokens - start_tokens
    }

    fn graph_for<'p>(
        &self,
        project: &'p ProjectContext,
        constraints: &ContextConstraints,
    ) -> Result<Option<GraphRef<'p>>> {
        let needs_graph = matches!(
            constraints.strategy,
            SelectionStrategy::Dependency | SelectionStrategy::Balanced
        ) || constraints.dependency_depth > 0;
        if !needs_graph {
            return Ok(None);
        }
        if let Some(graph) = &project.dependency_graph {
            return Ok(Some(GraphRef::Borrowed(graph)));
        }
        Ok(Some(GraphRef::Owned(self.graph_builder.build(project)?)))
    }

    fn strategy_score(
        &self,
        file: &FileInfo,
        task: &Task,
        graph: Option<&DependencyGraph>,
        constraints: &ContextConstraints,
        now: DateTime<Utc>,
    ) -> f32 {
        let w = &self.weights;
        let relevance = self.scorer.score(file, task);
        let centrality = graph.map(|g| g.centrality(&file.path)).unwrap_or(0.0);
        let bias = constraints.freshness_bias;

        match constraints.strategy {
            SelectionStrategy::Relevance => relevance,
            SelectionStrategy::Dependency => {
                w.dependency_relevance * relevance + w.dependency_centrality * centrality
            }
            SelectionStrategy::Freshness => {
                let fresh = self.scorer.freshness_score(file, now);
                relevance * (1.0 - bias) + fresh * bias
            }
            SelectionStrategy::Compactness => {
                if file.token_count == 0 {
                    0.0
                } else {
                    relevance / file.token_count as f32 * w.compactness_scale
                }
            }
            SelectionStrategy::Balanced => {
                let fresh = self.scorer.freshness_score(file, now);
                let size_efficiency = if file.token_count == 0 {
                    1.0
                } else {
                    (w.size_reference_tokens as f32 / file.token_count as f32).min(1.0)
                };
                w.balanced_relevance * relevance
                    + w.balanced_centrality * centrality
                    + w.balanced_freshness * fresh * bias
                    + w.balanced_size * size_efficiency
            }
        }
    }
}

/// Owned-or-borrowed dependency graph used during one selection
enum GraphRef<'a> {
    Borrowed(&'a DependencyGraph),
    Owned(DependencyGraph),
}

impl GraphRef<'_> {
    fn get(&self) -> &DependencyGraph {
        match self {
            GraphRef::Borrowed(g) => g,
            GraphRef::Owned(g) => g,
        }
    }
}

fn cache_key(project: &ProjectContext, task: &Task, max_tokens: usize) -> String {
    format!(
        "{}|{}|{}|{}",
        project.root_path.display(),
        task.task_type,
        task.description,
        max_tokens
    )
}

fn compile_patterns(patterns: &[String]) -> Result<Vec<Pattern>> {
    patterns
        .iter()
        .map(|p| {
            Pattern::new(p)
                .map_err(|e| ContextError::Configuration(format!("bad exclude pattern {p}: {e}")))
        })
        .collect()
}

fn eligible(
    file: &FileInfo,
    constraints: &ContextConstraints,
    excluded: &[Pattern],
) -> bool {
    use crate::project::FileType;

    if !constraints.include_tests && file.file_type == FileType::Test {
        return false;
    }
    if !constraints.include_docs && file.file_type == FileType::Documentation {
        return false;
    }
    if !constraints.preferred_file_types.is_empty()
        && !constraints.preferred_file_types.contains(&file.file_type)
    {
        return false;
    }
    !excluded.iter().any(|p| p.matches(&file.path))
}

fn inclusion_reason(strategy: SelectionStrategy) -> &'static str {
    match strategy {
        SelectionStrategy::Relevance => "keyword relevance",
        SelectionStrategy::Dependency => "dependency centrality",
        SelectionStrategy::Freshness => "recently modified",
        SelectionStrategy::Compactness => "high information density",
        SelectionStrategy::Balanced => "balanced fit",
    }
}
