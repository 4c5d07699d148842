//! Learned per-task-type profiles
//!
//! A profile is created lazily on first feedback for a task type and only
//! ever mutated through exponential-moving-average updates. Profiles are
//! never deleted; the feedback log, not the profile, is retention-pruned.

use crate::feedback::ContextFeedback;
use crate::optimizer::models::{SelectionStrategy, TaskType};
use crate::project::FileType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Learned state for one task type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskProfile {
    pub task_type: TaskType,
    /// EMA of token usage on successful, high-quality runs
    pub optimal_token_budget: f32,
    pub preferred_strategy: SelectionStrategy,
    pub important_file_types: Vec<FileType>,
    /// EMA of selected file counts
    pub typical_file_count: f32,
    /// EMA of observed quality scores
    pub avg_quality_score: f32,
    /// EMA of success outcomes (1.0 success, 0.0 failure)
    pub success_rate: f32,
    pub sample_count: u64,
    pub last_updated: DateTime<Utc>,
}

impl TaskProfile {
    pub fn new(task_type: TaskType, default_budget: usize) -> Self {
        Self {
            task_type,
            optimal_token_budget: default_budget as f32,
            preferred_strategy: SelectionStrategy::Balanced,
            important_file_types: vec![FileType::Source],
            typical_file_count: 10.0,
            avg_quality_score: 0.5,
            success_rate: 0.5,
            sample_count: 0,
            last_updated: Utc::now(),
        }
    }

    /// Absorb one feedback record.
    ///
    /// The preferred strategy flips when the feedback's quality beats the
    /// running average as it stood before this update; the budget EMA only
    /// moves on successful, above-threshold feedback.
    pub fn apply_feedback(
        &mut self,
        feedback: &ContextFeedback,
        learning_rate: f32,
        quality_threshold: f32,
    ) {
        let previous_avg = self.avg_quality_score;

        self.avg_quality_score = ema(learning_rate, feedback.quality_score, previous_avg);
        self.success_rate = ema(
            learning_rate,
            if feedback.success { 1.0 } else { 0.0 },
            self.success_rate,
        );
        if feedback.success && feedback.quality_score > quality_threshold {
            self.optimal_token_budget = ema(
                learning_rate,
                feedback.tokens_used as f32,
                self.optimal_token_budget,
            );
        }
        self.typical_file_count = ema(
            learning_rate,
            feedback.context.total_files as f32,
            self.typical_file_count,
        );
        if feedback.quality_score > previous_avg {
            self.preferred_strategy = feedback.context.strategy;
        }

        self.sample_count += 1;
        self.last_updated = Utc::now();
    }
}

/// `new = alpha * sample + (1 - alpha) * old`
fn ema(alpha: f32, sample: f32, old: f32) -> f32 {
    alpha * sample + (1.0 - alpha) * old
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feedback::testutil::feedback_with_quality;

    #[test]
    fn test_ema_law() {
        assert!((ema(0.1, 1.0, 0.0) - 0.1).abs() < 1e-6);
        assert!((ema(0.5, 0.8, 0.4) - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_quality_converges_to_repeated_sample() {
        let mut profile = TaskProfile::new(TaskType::Feature, 8000);
        for _ in 0..200 {
            profile.apply_feedback(&feedback_with_quality(0.9, true), 0.1, 0.7);
        }
        assert!((profile.avg_quality_score - 0.9).abs() < 0.01);
        assert!((profile.success_rate - 1.0).abs() < 0.01);
        assert_eq!(profile.sample_count, 200);
    }

    #[test]
    fn test_budget_only_learns_from_good_outcomes() {
        let mut profile = TaskProfile::new(TaskType::Feature, 8000);
        let before = profile.optimal_token_budget;

        // Low quality: budget untouched even on success
        profile.apply_feedback(&feedback_with_quality(0.3, true), 0.1, 0.7);
        assert_eq!(profile.optimal_token_budget, before);

        // Failure: budget untouched even at high quality
        profile.apply_feedback(&feedback_with_quality(0.9, false), 0.1, 0.7);
        assert_eq!(profile.optimal_token_budget, before);

        // Successful and above threshold: budget moves toward tokens_used
        profile.apply_feedback(&feedback_with_quality(0.9, true), 0.1, 0.7);
        assert!(profile.optimal_token_budget < before);
    }

    #[test]
    fn test_preferred_strategy_follows_strong_feedback() {
        let mut profile = TaskProfile::new(TaskType::Feature, 8000);
        profile.preferred_strategy = SelectionStrategy::Relevance;

        // testutil feedback carries the balanced strategy
        profile.apply_feedback(&feedback_with_quality(0.9, true), 0.1, 0.7);
        assert_eq!(profile.preferred_strategy, SelectionStrategy::Balanced);

        // Weak feedback does not flip the preference back
        profile.preferred_strategy = SelectionStrategy::Relevance;
        profile.apply_feedback(&feedback_with_quality(0.1, false), 0.1, 0.7);
        assert_eq!(profile.preferred_strategy, SelectionStrategy::Relevance);
    }

    #[test]
    fn test_file_count_always_learns() {
        let mut profile = TaskProfile::new(TaskType::Feature, 8000);
        let before = profile.typical_file_count;
        profile.apply_feedback(&feedback_with_quality(0.1, false), 0.1, 0.7);
        assert!(profile.typical_file_count < before);
    }
}
