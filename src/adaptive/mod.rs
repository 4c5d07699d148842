//! Adaptive context management
//!
//! Wraps the optimizer with per-task-type learning: constraints are adjusted
//! from learned profiles once enough feedback has accumulated, and every
//! feedback record moves the profiles by exponential moving average.

pub mod profile;

pub use profile::TaskProfile;

use crate::config::AdaptationConfig;
use crate::error::Result;
use crate::feedback::ContextFeedback;
use crate::optimizer::models::{
    ContextConstraints, SelectedContext, Task, TaskType,
};
use crate::optimizer::ContextOptimizer;
use crate::project::ProjectContext;
use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// A selection plus the adaptation that produced it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptedContext {
    pub context: SelectedContext,
    /// Expected quality of this selection, 0.0..=1.0
    pub predicted_quality: f32,
    /// Human-readable reasons for each adjustment applied
    pub adaptation_reasons: Vec<String>,
}

/// Learns per-task-type behavior and adapts selection requests
pub struct AdaptiveContextManager {
    optimizer: Arc<ContextOptimizer>,
    profiles: DashMap<TaskType, TaskProfile>,
    feedback_log: Mutex<Vec<ContextFeedback>>,
    config: AdaptationConfig,
}

impl AdaptiveContextManager {
    pub fn new(optimizer: Arc<ContextOptimizer>, config: AdaptationConfig) -> Self {
        Self {
            optimizer,
            profiles: DashMap::new(),
            feedback_log: Mutex::new(Vec::new()),
            config,
        }
    }

    /// Select context with learned adaptation applied to the constraints.
    pub async fn adapt_optimal_context(
        &self,
        project: &ProjectContext,
        task: &Task,
        budget: usize,
    ) -> Result<AdaptedContext> {
        let (constraints, reasons) = self.adapted_constraints(task, budget);
        let selection = self
            .optimizer
            .select_optimal_context(project, task, &constraints)
            .await?;
        let predicted_quality = self.predict_quality(&selection, &constraints, task);

        debug!(
            "Adapted selection for {} task: {} files, predicted quality {:.2}",
            task.task_type, selection.total_files, predicted_quality
        );
        Ok(AdaptedContext {
            context: selection,
            predicted_quality,
            adaptation_reasons: reasons,
        })
    }

    /// The constraints adaptation would use, without running a selection.
    pub fn get_adaptive_constraints(&self, task: &Task, budget: usize) -> ContextConstraints {
        self.adapted_constraints(task, budget).0
    }

    /// Absorb one feedback record into the log and the task profile.
    pub fn learn_from_feedback(&self, feedback: ContextFeedback) -> Result<()> {
        {
            let mut log = self.feedback_log.lock().unwrap();
            log.push(feedback.clone());
            let cutoff = Utc::now() - chrono::Duration::days(self.config.retention_days);
            log.retain(|f| f.created_at >= cutoff);
        }

        let budget_seed = feedback.context.constraints.max_tokens;
        let mut profile = self
            .profiles
            .entry(feedback.task.task_type)
            .or_insert_with(|| TaskProfile::new(feedback.task.task_type, budget_seed));
        profile.apply_feedback(&feedback, self.config.learning_rate, self.config.quality_threshold);

        info!(
            "Learned from feedback for {} tasks: quality EMA {:.2}, success EMA {:.2}, {} samples",
            profile.task_type, profile.avg_quality_score, profile.success_rate, profile.sample_count
        );
        Ok(())
    }

    /// Budget suggestion from project size tier blended with learned state.
    /// Confidence grows with sample count and saturates at 20 samples.
    pub fn predict_optimal_budget(&self, task: &Task, project: &ProjectContext) -> usize {
        let base: f32 = if project.total_tokens >= 200_000 {
            12_000.0
        } else if project.total_tokens < 50_000 {
            4_000.0
        } else {
            8_000.0
        };

        match self.profiles.get(&task.task_type) {
            Some(profile) if profile.sample_count > 0 => {
                let confidence = (profile.sample_count as f32 / 20.0).min(1.0);
                (base * (1.0 - confidence) + profile.optimal_token_budget * confidence).round()
                    as usize
            }
            _ => base as usize,
        }
    }

    /// Snapshot of the learned profile for a task type, if any.
    pub fn profile(&self, task_type: TaskType) -> Option<TaskProfile> {
        self.profiles.get(&task_type).map(|p| p.clone())
    }

    /// Records currently retained in the in-memory feedback log.
    pub fn feedback_log_len(&self) -> usize {
        self.feedback_log.lock().unwrap().len()
    }

    fn adapted_constraints(&self, task: &Task, budget: usize) -> (ContextConstraints, Vec<String>) {
        let mut constraints = base_constraints(task, budget);
        let mut reasons = Vec::new();

        let profile = match self.profiles.get(&task.task_type) {
            Some(profile) => profile.clone(),
            None => {
                reasons.push("no learned profile yet, using defaults".to_string());
                return (constraints, reasons);
            }
        };

        if profile.sample_count < self.config.min_samples_for_adaptation {
            reasons.push(format!(
                "collecting samples ({} of {}), adaptation not applied",
                profile.sample_count, self.config.min_samples_for_adaptation
            ));
            return (constraints, reasons);
        }

        let gap = profile.optimal_token_budget - budget as f32;
        let adjustment = (gap * self.config.aggressiveness).clamp(
            -(self.config.max_budget_adjustment as f32),
            self.config.max_budget_adjustment as f32,
        );
        if adjustment.abs() >= 1.0 {
            let adjusted = (budget as i64 + adjustment as i64).max(500) as usize;
            reasons.push(format!(
                "budget {budget} adjusted by {adjustment:.0} toward learned optimum {:.0}",
                profile.optimal_token_budget
            ));
            constraints.max_tokens = adjusted;
        }

        if profile.success_rate > self.config.quality_threshold {
            constraints.strategy = profile.preferred_strategy;
            reasons.push(format!(
                "strategy {} preferred at {:.0}% success rate",
                profile.preferred_strategy,
                profile.success_rate * 100.0
            ));
        }

        let typical = profile.typical_file_count.round().max(1.0) as usize;
        if typical != constraints.max_files {
            constraints.max_files = (constraints.max_files + typical).div_ceil(2);
            reasons.push(format!(
                "file cap nudged toward typical count {typical}"
            ));
        }

        if profile.avg_quality_score > 0.8 {
            constraints.min_relevance_score = 0.2;
            reasons.push("relevance floor raised on strong history".to_string());
        } else if profile.avg_quality_score < self.config.quality_threshold {
            constraints.min_relevance_score = 0.05;
            reasons.push("relevance floor lowered on weak history".to_string());
        }

        (constraints, reasons)
    }

    fn predict_quality(
        &self,
        selection: &SelectedContext,
        constraints: &ContextConstraints,
        task: &Task,
    ) -> f32 {
        let base = self
            .profiles
            .get(&task.task_type)
            .filter(|p| p.sample_count > 0)
            .map(|p| p.avg_quality_score)
            .unwrap_or(0.5);

        let mut quality = base;

        let token_utilization = if constraints.max_tokens == 0 {
            0.0
        } else {
            selection.total_tokens as f32 / constraints.max_tokens as f32
        };
        quality += if (0.7..=0.9).contains(&token_utilization) {
            0.05
        } else {
            -0.05
        };

        let file_utilization = if constraints.max_files == 0 {
            0.0
        } else {
            selection.total_files as f32 / constraints.max_files as f32
        };
        quality += if (0.3..=0.8).contains(&file_utilization) {
            0.05
        } else {
            -0.05
        };

        if selection.selection_score > 0.7 {
            quality += 0.05;
        } else if selection.selection_score < 0.3 {
            quality -= 0.1;
        }

        quality.clamp(0.0, 1.0)
    }
}

/// Default constraints for a task before adaptation: tests only for test
/// tasks, docs only for documentation tasks.
fn base_constraints(task: &Task, budget: usize) -> ContextConstraints {
    let mut constraints = ContextConstraints::relaxed(budget);
    constraints.include_tests = task.task_type == TaskType::Test;
    constraints.include_docs = task.task_type == TaskType::Documentation;
    constraints
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScoringWeights;
    use crate::feedback::testutil::feedback_with_quality;
    use crate::optimizer::models::SelectionStrategy;
    use crate::project::testutil::{file, project};
    use crate::project::FileType;

    fn manager() -> AdaptiveContextManager {
        AdaptiveContextManager::new(
            Arc::new(ContextOptimizer::new(ScoringWeights::default())),
            AdaptationConfig::default(),
        )
    }

    #[test]
    fn test_no_adaptation_before_min_samples() {
        let m = manager();
        let task = Task::new(TaskType::Feature, "sample");

        for _ in 0..3 {
            m.learn_from_feedback(feedback_with_quality(0.95, true)).unwrap();
        }

        let constraints = m.get_adaptive_constraints(&task, 8000);
        assert_eq!(constraints.max_tokens, 8000);
        assert_eq!(constraints.strategy, SelectionStrategy::Balanced);
    }

    #[test]
    fn test_adaptation_applies_after_enough_samples() {
        let m = manager();
        let task = Task::new(TaskType::Feature, "sample");

        // High-quality successes with 100 tokens used pull the learned
        // optimum far below the requested budget.
        for _ in 0..30 {
            m.learn_from_feedback(feedback_with_quality(0.95, true)).unwrap();
        }

        let constraints = m.get_adaptive_constraints(&task, 8000);
        assert!(constraints.max_tokens < 8000);
        // Strong history also raises the relevance floor
        assert!((constraints.min_relevance_score - 0.2).abs() < f32::EPSILON);
    }

    #[test]
    fn test_budget_adjustment_is_capped() {
        let config = AdaptationConfig {
            max_budget_adjustment: 1000,
            ..AdaptationConfig::default()
        };
        let m = AdaptiveContextManager::new(
            Arc::new(ContextOptimizer::new(ScoringWeights::default())),
            config,
        );
        let task = Task::new(TaskType::Feature, "sample");
        for _ in 0..30 {
            m.learn_from_feedback(feedback_with_quality(0.95, true)).unwrap();
        }

        let constraints = m.get_adaptive_constraints(&task, 8000);
        assert!(constraints.max_tokens >= 7000);
    }

    #[test]
    fn test_strategy_override_requires_success_history() {
        let m = manager();
        let task = Task::new(TaskType::Feature, "sample");

        for _ in 0..10 {
            m.learn_from_feedback(feedback_with_quality(0.9, false)).unwrap();
        }

        // Success EMA decays toward zero: no override despite samples
        let constraints = m.get_adaptive_constraints(&task, 8000);
        assert_eq!(constraints.strategy, SelectionStrategy::Balanced);
    }

    #[test]
    fn test_predict_optimal_budget_tiers() {
        let m = manager();
        let task = Task::new(TaskType::Refactor, "sample");

        let small = project(vec![file("a.go", "go", FileType::Source, 10_000)]);
        assert_eq!(m.predict_optimal_budget(&task, &small), 4000);

        let medium = project(vec![file("a.go", "go", FileType::Source, 100_000)]);
        assert_eq!(m.predict_optimal_budget(&task, &medium), 8000);

        let large = project(vec![file("a.go", "go", FileType::Source, 250_000)]);
        assert_eq!(m.predict_optimal_budget(&task, &large), 12_000);
    }

    #[test]
    fn test_predict_optimal_budget_blends_with_learning() {
        let m = manager();
        let task = Task::new(TaskType::Feature, "sample");
        let p = project(vec![file("a.go", "go", FileType::Source, 100_000)]);

        let before = m.predict_optimal_budget(&task, &p);
        // 20+ samples saturate confidence at 1.0: prediction tracks the
        // learned budget EMA instead of the tier base.
        for _ in 0..40 {
            m.learn_from_feedback(feedback_with_quality(0.95, true)).unwrap();
        }
        let after = m.predict_optimal_budget(&task, &p);
        assert_eq!(before, 8000);
        assert!(after < 8000);
    }

    #[test]
    fn test_feedback_log_retention() {
        let m = manager();
        let mut old = feedback_with_quality(0.5, true);
        old.created_at = Utc::now() - chrono::Duration::days(90);
        m.learn_from_feedback(old).unwrap();
        m.learn_from_feedback(feedback_with_quality(0.5, true)).unwrap();

        // The 90-day-old record falls outside the 30-day retention window
        assert_eq!(m.feedback_log_len(), 1);
    }

    #[tokio::test]
    async fn test_adapt_optimal_context_reports_reasons() {
        let m = manager();
        let p = project(vec![file("src/auth.go", "go", FileType::Source, 500)]);
        let task = Task::new(TaskType::Feature, "auth cleanup");

        let adapted = m.adapt_optimal_context(&p, &task, 8000).await.unwrap();
        assert!(!adapted.adaptation_reasons.is_empty());
        assert!(adapted.predicted_quality >= 0.0 && adapted.predicted_quality <= 1.0);
        assert_eq!(adapted.context.total_files, 1);
    }

    #[test]
    fn test_profile_created_lazily() {
        let m = manager();
        assert!(m.profile(TaskType::Debug).is_none());
        m.learn_from_feedback(feedback_with_quality(0.6, true)).unwrap();
        // testutil feedback is a feature task
        assert!(m.profile(TaskType::Feature).is_some());
        assert!(m.profile(TaskType::Debug).is_none());
    }
}
