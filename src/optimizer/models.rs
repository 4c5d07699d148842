//! Data models for context selection

use crate::project::{FileInfo, FileType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Kind of work the assistant is asked to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Feature,
    Debug,
    Refactor,
    Test,
    Documentation,
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskType::Feature => "feature",
            TaskType::Debug => "debug",
            TaskType::Refactor => "refactor",
            TaskType::Test => "test",
            TaskType::Documentation => "documentation",
        };
        f.write_str(s)
    }
}

/// Priority level for tasks and selected files
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextPriority {
    Critical = 4,
    High = 3,
    Medium = 2,
    Low = 1,
}

/// How much of the project a task is expected to touch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskScope {
    File,
    Module,
    Project,
    System,
}

/// A unit of work context is selected for
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub task_type: TaskType,
    pub description: String,
    pub priority: ContextPriority,
    pub scope: TaskScope,
}

impl Task {
    pub fn new(task_type: TaskType, description: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            task_type,
            description: description.into(),
            priority: ContextPriority::Medium,
            scope: TaskScope::Module,
        }
    }
}

/// Named ranking formula
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionStrategy {
    Relevance,
    Dependency,
    Freshness,
    Compactness,
    Balanced,
}

impl fmt::Display for SelectionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SelectionStrategy::Relevance => "relevance",
            SelectionStrategy::Dependency => "dependency",
            SelectionStrategy::Freshness => "freshness",
            SelectionStrategy::Compactness => "compactness",
            SelectionStrategy::Balanced => "balanced",
        };
        f.write_str(s)
    }
}

impl FromStr for SelectionStrategy {
    type Err = crate::error::ContextError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "relevance" => Ok(SelectionStrategy::Relevance),
            "dependency" => Ok(SelectionStrategy::Dependency),
            "freshness" => Ok(SelectionStrategy::Freshness),
            "compactness" => Ok(SelectionStrategy::Compactness),
            "balanced" => Ok(SelectionStrategy::Balanced),
            other => Err(crate::error::ContextError::UnknownStrategy(other.to_string())),
        }
    }
}

/// Per-request selection constraints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConstraints {
    pub max_tokens: usize,
    pub max_files: usize,
    pub min_relevance_score: f32,
    /// Acts as an allowlist when non-empty
    pub preferred_file_types: Vec<FileType>,
    /// Glob patterns for paths to exclude
    pub excluded_patterns: Vec<String>,
    pub include_tests: bool,
    pub include_docs: bool,
    /// Weight of recency in freshness-aware strategies, 0.0..=1.0
    pub freshness_bias: f32,
    pub dependency_depth: usize,
    pub strategy: SelectionStrategy,
}

impl ContextConstraints {
    /// Relaxed baseline used by budget optimization: tests and docs out,
    /// moderate freshness bias, dependency depth 2.
    pub fn relaxed(max_tokens: usize) -> Self {
        Self {
            max_tokens,
            max_files: 20,
            min_relevance_score: 0.1,
            preferred_file_types: Vec::new(),
            excluded_patterns: Vec::new(),
            include_tests: false,
            include_docs: false,
            freshness_bias: 0.3,
            dependency_depth: 2,
            strategy: SelectionStrategy::Balanced,
        }
    }
}

/// A file chosen for inclusion, with the score that earned its place
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextFile {
    pub file: FileInfo,
    pub relevance_score: f32,
    pub inclusion_reason: String,
    pub priority: ContextPriority,
    pub content: Option<String>,
}

impl ContextFile {
    pub fn new(file: FileInfo, score: f32, reason: impl Into<String>) -> Self {
        let priority = if score >= 0.8 {
            ContextPriority::Critical
        } else if score >= 0.5 {
            ContextPriority::High
        } else if score >= 0.25 {
            ContextPriority::Medium
        } else {
            ContextPriority::Low
        };
        Self {
            file,
            relevance_score: score,
            inclusion_reason: reason.into(),
            priority,
            content: None,
        }
    }
}

/// The outcome of one selection request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectedContext {
    pub task: Task,
    pub files: Vec<ContextFile>,
    pub total_tokens: usize,
    pub total_files: usize,
    /// Mean strategy score of the included files
    pub selection_score: f32,
    pub strategy: SelectionStrategy,
    pub constraints: ContextConstraints,
    pub created_at: DateTime<Utc>,
    pub selection_duration: Duration,
}

impl SelectedContext {
    pub fn within_budget(&self) -> bool {
        self.total_tokens <= self.constraints.max_tokens
    }

    /// Share of the project's tokens this selection avoided
    pub fn reduction_ratio(&self, project_total_tokens: usize) -> f32 {
        if project_total_tokens == 0 {
            return 0.0;
        }
        1.0 - self.total_tokens as f32 / project_total_tokens as f32
    }

    pub fn file_paths(&self) -> Vec<String> {
        self.files.iter().map(|f| f.file.path.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_round_trip() {
        for s in [
            SelectionStrategy::Relevance,
            SelectionStrategy::Dependency,
            SelectionStrategy::Freshness,
            SelectionStrategy::Compactness,
            SelectionStrategy::Balanced,
        ] {
            assert_eq!(s.to_string().parse::<SelectionStrategy>().unwrap(), s);
        }
        assert!("spiral".parse::<SelectionStrategy>().is_err());
    }

    #[test]
    fn test_context_file_priority_from_score() {
        let file = crate::project::testutil::file("a.go", "go", FileType::Source, 10);
        assert_eq!(
            ContextFile::new(file.clone(), 0.9, "r").priority,
            ContextPriority::Critical
        );
        assert_eq!(
            ContextFile::new(file.clone(), 0.6, "r").priority,
            ContextPriority::High
        );
        assert_eq!(ContextFile::new(file, 0.1, "r").priority, ContextPriority::Low);
    }

    #[test]
    fn test_relaxed_constraints() {
        let c = ContextConstraints::relaxed(8000);
        assert!(!c.include_tests);
        assert!(!c.include_docs);
        assert_eq!(c.dependency_depth, 2);
        assert_eq!(c.max_tokens, 8000);
    }
}
