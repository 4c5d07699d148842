//! Heuristic relevance scoring
//!
//! Keyword overlap between the task description and file paths, plus
//! task-type affinity. Scores are deterministic for identical inputs and may
//! mildly exceed 1.0 when several signals stack; downstream strategies
//! tolerate the overshoot.

use crate::config::ScoringWeights;
use crate::optimizer::models::{Task, TaskType};
use crate::project::{FileInfo, FileType};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "with", "that", "this", "from", "into", "when", "should", "would",
];

/// Scores a file's pertinence to a task
#[derive(Debug, Clone)]
pub struct RelevanceScorer {
    weights: ScoringWeights,
}

impl RelevanceScorer {
    pub fn new(weights: ScoringWeights) -> Self {
        Self { weights }
    }

    /// Heuristic relevance of `file` to `task`.
    pub fn score(&self, file: &FileInfo, task: &Task) -> f32 {
        let keywords = keywords(&task.description);
        let path_lower = file.path.to_lowercase();
        let stem_lower = file.stem().to_lowercase();

        let mut score = 0.0;
        for keyword in &keywords {
            if stem_lower == *keyword {
                score += self.weights.keyword_stem_weight;
            } else if path_lower.contains(keyword.as_str()) {
                score += self.weights.keyword_path_weight;
            }
        }

        score += type_affinity(task.task_type, file.file_type);
        score
    }

    /// Recency score: 1.0 under a day old, then exponential decay with the
    /// configured half-life.
    pub fn freshness_score(&self, file: &FileInfo, now: DateTime<Utc>) -> f32 {
        let age_hours = (now - file.last_modified).num_minutes() as f32 / 60.0;
        if age_hours < self.weights.fresh_age_hours {
            return 1.0;
        }
        let age_days = age_hours / 24.0;
        let half_life = self.weights.freshness_half_life_days.max(f32::EPSILON);
        (-std::f32::consts::LN_2 * age_days / half_life).exp()
    }
}

/// How naturally a file type serves a task type
fn type_affinity(task_type: TaskType, file_type: FileType) -> f32 {
    match (task_type, file_type) {
        (TaskType::Test, FileType::Test) => 0.4,
        (TaskType::Documentation, FileType::Documentation) => 0.4,
        (TaskType::Test, FileType::Source) => 0.15,
        (TaskType::Documentation, FileType::Source) => 0.1,
        (TaskType::Feature | TaskType::Debug | TaskType::Refactor, FileType::Source) => 0.2,
        (TaskType::Debug, FileType::Test) => 0.1,
        (_, FileType::Configuration) => 0.05,
        _ => 0.0,
    }
}

// BTreeSet keeps summation order stable, so identical inputs always
// produce bit-identical scores.
fn keywords(description: &str) -> BTreeSet<String> {
    description
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() >= 3 && !STOPWORDS.contains(w))
        .map(str::to_string)
        .collect()
}
