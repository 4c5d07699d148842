//! Feedback collection and trend analysis
//!
//! Converts execution telemetry and explicit ratings into feedback records,
//! persists them, and forwards them to the adaptive manager. Learning happens
//! before persistence: a failed write surfaces as an error without rolling
//! back the in-memory profile update.

pub mod store;

pub use store::FeedbackStore;

use crate::adaptive::AdaptiveContextManager;
use crate::config::FeedbackConfig;
use crate::error::Result;
use crate::metrics::METRICS;
use crate::optimizer::models::{SelectedContext, Task};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Schema version written into every persisted record
pub const FEEDBACK_SCHEMA_VERSION: u32 = 1;

/// One observed execution outcome for a selected context
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextFeedback {
    pub id: String,
    pub task_id: String,
    pub task: Task,
    pub context: SelectedContext,
    pub success: bool,
    /// Inferred or rating-derived quality, 0.0..=1.0
    pub quality_score: f32,
    pub completion_time: Duration,
    pub tokens_used: usize,
    /// Files the execution touched but the selection lacked
    pub missing_files: Vec<String>,
    /// Files the selection carried but the execution never touched
    pub unnecessary_files: Vec<String>,
    pub user_rating: Option<u8>,
    pub created_at: DateTime<Utc>,
    pub version: u32,
}

/// How an assisted task run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletionStatus {
    Success,
    Partial,
    Failed,
}

/// Telemetry from one task execution
#[derive(Debug, Clone)]
pub struct ExecutionData {
    pub status: CompletionStatus,
    pub duration: Duration,
    pub error_count: usize,
    pub iteration_count: usize,
    pub user_interventions: usize,
    /// Paths the execution actually read or edited; empty when unknown
    pub accessed_files: Vec<String>,
}

/// Aggregated view over a feedback window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackAnalysis {
    pub window: Duration,
    pub total_records: usize,
    pub success_rate: f32,
    pub avg_quality: f32,
    pub by_task_type: HashMap<String, TaskTypeTrend>,
    pub recommendations: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskTypeTrend {
    pub count: usize,
    pub avg_quality: f32,
    pub success_rate: f32,
}

/// Compact lifetime summary of collected feedback
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackSummary {
    pub total_records: usize,
    pub avg_quality: f32,
    pub success_rate: f32,
    pub last_feedback_at: Option<DateTime<Utc>>,
}

struct CachedAnalysis {
    computed_at: Instant,
    window: Duration,
    analysis: FeedbackAnalysis,
}

/// Collects execution feedback and feeds the learning loop
pub struct FeedbackCollector {
    store: FeedbackStore,
    manager: Arc<AdaptiveContextManager>,
    config: FeedbackConfig,
    trend_cache: Mutex<Option<CachedAnalysis>>,
}

impl FeedbackCollector {
    pub fn new(
        store: FeedbackStore,
        manager: Arc<AdaptiveContextManager>,
        config: FeedbackConfig,
    ) -> Self {
        Self {
            store,
            manager,
            config,
            trend_cache: Mutex::new(None),
        }
    }

    /// Infer feedback from execution telemetry and feed it to learning and
    /// storage.
    pub fn collect_implicit(
        &self,
        task: &Task,
        context: &SelectedContext,
        execution: &ExecutionData,
    ) -> Result<ContextFeedback> {
        let quality = infer_quality(execution);
        let (missing, unnecessary) = diff_files(context, &execution.accessed_files);

        let feedback = ContextFeedback {
            id: uuid::Uuid::new_v4().to_string(),
            task_id: task.id.clone(),
            task: task.clone(),
            context: context.clone(),
            success: execution.status == CompletionStatus::Success,
            quality_score: quality,
            completion_time: execution.duration,
            tokens_used: context.total_tokens,
            missing_files: missing,
            unnecessary_files: unnecessary,
            user_rating: None,
            created_at: Utc::now(),
            version: FEEDBACK_SCHEMA_VERSION,
        };
        METRICS.record_feedback("implicit");
        self.record(feedback)
    }

    /// Convert a 1-5 user rating into feedback. Ratings of 3 and above count
    /// as success.
    pub fn collect_explicit(
        &self,
        task: &Task,
        context: &SelectedContext,
        rating: u8,
    ) -> Result<ContextFeedback> {
        let rating = rating.clamp(1, 5);
        let quality = (rating - 1) as f32 / 4.0;

        let feedback = ContextFeedback {
            id: uuid::Uuid::new_v4().to_string(),
            task_id: task.id.clone(),
            task: task.clone(),
            context: context.clone(),
            success: rating >= 3,
            quality_score: quality,
            completion_time: Duration::ZERO,
            tokens_used: context.total_tokens,
            missing_files: Vec::new(),
            unnecessary_files: Vec::new(),
            user_rating: Some(rating),
            created_at: Utc::now(),
            version: FEEDBACK_SCHEMA_VERSION,
        };
        METRICS.record_feedback("explicit");
        self.record(feedback)
    }

    fn record(&self, feedback: ContextFeedback) -> Result<ContextFeedback> {
        // Learning first: a storage failure must not cost the profile update.
        self.manager.learn_from_feedback(feedback.clone())?;
        self.store.append(&feedback)?;
        debug!(
            "Recorded feedback {} (quality {:.2}, success {})",
            feedback.id, feedback.quality_score, feedback.success
        );
        Ok(feedback)
    }

    /// Windowed quality/success aggregation with threshold-based
    /// recommendations. Results are cached for the configured interval.
    pub fn analyze_trends(&self, window: Duration) -> Result<FeedbackAnalysis> {
        {
            let cache = self.trend_cache.lock().unwrap();
            if let Some(cached) = cache.as_ref() {
                if cached.window == window
                    && cached.computed_at.elapsed()
                        < Duration::from_secs(self.config.trend_cache_secs)
                {
                    return Ok(cached.analysis.clone());
                }
            }
        }

        let cutoff = Utc::now()
            - chrono::Duration::from_std(window)
                .unwrap_or_else(|_| chrono::Duration::days(365));
        let records = self.store.load_since(cutoff)?;
        let analysis = self.build_analysis(window, &records);

        *self.trend_cache.lock().unwrap() = Some(CachedAnalysis {
            computed_at: Instant::now(),
            window,
            analysis: analysis.clone(),
        });
        info!(
            "Analyzed {} feedback records: avg quality {:.2}, success rate {:.2}",
            analysis.total_records, analysis.avg_quality, analysis.success_rate
        );
        Ok(analysis)
    }

    fn build_analysis(&self, window: Duration, records: &[ContextFeedback]) -> FeedbackAnalysis {
        let total = records.len();
        let successes = records.iter().filter(|r| r.success).count();
        let avg_quality = if total == 0 {
            0.0
        } else {
            records.iter().map(|r| r.quality_score).sum::<f32>() / total as f32
        };
        let success_rate = if total == 0 {
            0.0
        } else {
            successes as f32 / total as f32
        };

        let mut by_task_type: HashMap<String, TaskTypeTrend> = HashMap::new();
        for record in records {
            let trend = by_task_type
                .entry(record.task.task_type.to_string())
                .or_default();
            trend.count += 1;
            trend.avg_quality += record.quality_score;
            if record.success {
                trend.success_rate += 1.0;
            }
        }
        for trend in by_task_type.values_mut() {
            trend.avg_quality /= trend.count as f32;
            trend.success_rate /= trend.count as f32;
        }

        let mut recommendations = Vec::new();
        if total < self.config.min_trend_samples {
            recommendations.push(format!(
                "insufficient samples ({total} of {} needed) for reliable trends",
                self.config.min_trend_samples
            ));
        } else {
            if avg_quality < self.config.fair_quality_threshold {
                recommendations.push(format!(
                    "average quality {avg_quality:.2} is below the fair threshold {:.2}; consider wider budgets or a different strategy",
                    self.config.fair_quality_threshold
                ));
            }
            if success_rate < 0.5 {
                recommendations
                    .push(format!("success rate {success_rate:.2} is below 50%"));
            }
        }

        FeedbackAnalysis {
            window,
            total_records: total,
            success_rate,
            avg_quality,
            by_task_type,
            recommendations,
            generated_at: Utc::now(),
        }
    }

    /// Lifetime summary over the export lookback window.
    pub fn summary(&self) -> Result<FeedbackSummary> {
        let cutoff = Utc::now() - chrono::Duration::days(self.config.export_lookback_days);
        let records = self.store.load_since(cutoff)?;
        let total = records.len();
        Ok(FeedbackSummary {
            total_records: total,
            avg_quality: if total == 0 {
                0.0
            } else {
                records.iter().map(|r| r.quality_score).sum::<f32>() / total as f32
            },
            success_rate: if total == 0 {
                0.0
            } else {
                records.iter().filter(|r| r.success).count() as f32 / total as f32
            },
            last_feedback_at: records.last().map(|r| r.created_at),
        })
    }

    /// Export all records in the lookback window as one JSON array.
    pub fn export(&self) -> Result<String> {
        let cutoff = Utc::now() - chrono::Duration::days(self.config.export_lookback_days);
        let records = self.store.load_since(cutoff)?;
        Ok(serde_json::to_string_pretty(&records)?)
    }
}

/// Quality inferred from telemetry: a status base nudged by fixed increments.
/// Duration nudges only apply to successful runs, so a plain failure infers
/// exactly the failure base.
fn infer_quality(execution: &ExecutionData) -> f32 {
    let mut quality = match execution.status {
        CompletionStatus::Success => 0.8,
        CompletionStatus::Partial => 0.5,
        CompletionStatus::Failed => 0.2,
    };

    if execution.status == CompletionStatus::Success {
        if execution.duration < Duration::from_secs(30) {
            quality += 0.1;
        } else if execution.duration > Duration::from_secs(600) {
            quality -= 0.1;
        }
    }

    quality -= 0.05 * execution.error_count.min(4) as f32;
    if execution.iteration_count > 3 {
        quality -= 0.05 * (execution.iteration_count - 3).min(3) as f32;
    }
    quality -= 0.1 * execution.user_interventions.min(3) as f32;

    quality.clamp(0.0, 1.0)
}

/// Missing = accessed but not selected; unnecessary = selected but never
/// accessed. Both empty when no access telemetry is present.
fn diff_files(context: &SelectedContext, accessed: &[String]) -> (Vec<String>, Vec<String>) {
    if accessed.is_empty() {
        return (Vec::new(), Vec::new());
    }
    let selected: HashSet<&str> = context.files.iter().map(|f| f.file.path.as_str()).collect();
    let accessed_set: HashSet<&str> = accessed.iter().map(String::as_str).collect();

    let mut missing: Vec<String> = accessed_set
        .difference(&selected)
        .map(|s| s.to_string())
        .collect();
    let mut unnecessary: Vec<String> = selected
        .difference(&accessed_set)
        .map(|s| s.to_string())
        .collect();
    missing.sort();
    unnecessary.sort();
    (missing, unnecessary)
}
