//! End-to-end tests for the context engine
//!
//! These tests wire the full engine against a real temporary project tree
//! and drive the select → execute → learn loop.

use chrono::Utc;
use context_optimizer::{
    CompletionStatus, CompressionStrategy, Engine, EngineConfig, ExecutionData, FileInfo,
    FileType, ProjectContext, Task, TaskType,
};
use std::io::Write;
use std::path::Path;
use std::time::Duration;

fn write_file(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    let mut f = std::fs::File::create(path).unwrap();
    f.write_all(content.as_bytes()).unwrap();
}

fn info(path: &str, file_type: FileType, tokens: usize) -> FileInfo {
    FileInfo {
        path: path.to_string(),
        language: "go".to_string(),
        file_type,
        token_count: tokens,
        last_modified: Utc::now() - chrono::Duration::hours(12),
    }
}

fn sample_project(root: &Path) -> ProjectContext {
    write_file(
        root,
        "cmd/main.go",
        "package main\n\nimport \"proj/internal/auth\"\n\nfunc main() {\n\tauth.Login(\"\")\n}\n",
    );
    write_file(
        root,
        "internal/auth/auth.go",
        "package auth\n\nimport \"fmt\"\n\n// Login authenticates a user.\nfunc Login(user string) error {\n\tif user == \"\" {\n\t\treturn fmt.Errorf(\"empty user\")\n\t}\n\treturn nil\n}\n",
    );
    write_file(
        root,
        "internal/auth/auth_test.go",
        "package auth\n\nfunc TestLogin(t *testing.T) {}\n",
    );
    write_file(root, "README.md", "# proj\n");

    ProjectContext::new(
        root.to_path_buf(),
        vec![
            info("cmd/main.go", FileType::Source, 400),
            info("internal/auth/auth.go", FileType::Source, 600),
            info("internal/auth/auth_test.go", FileType::Test, 200),
            info("README.md", FileType::Documentation, 100),
        ],
    )
}

fn engine(feedback_dir: &Path) -> Engine {
    let mut config = EngineConfig::default();
    config.feedback.storage_dir = feedback_dir.to_string_lossy().into_owned();
    config.cache.cleanup_interval_secs = 1;
    Engine::new(config).unwrap()
}

#[tokio::test]
async fn test_full_selection_and_learning_loop() {
    let project_dir = tempfile::tempdir().unwrap();
    let feedback_dir = tempfile::tempdir().unwrap();
    let engine = engine(feedback_dir.path());

    let project = sample_project(project_dir.path());
    let task = Task::new(TaskType::Debug, "login fails for empty auth user");

    // First selection: adaptive defaults, no profile yet
    let adapted = engine
        .adaptive
        .adapt_optimal_context(&project, &task, 8000)
        .await
        .unwrap();
    assert!(adapted.context.total_files >= 1);
    assert!(adapted.context.total_tokens <= 8000);
    assert!(adapted
        .context
        .file_paths()
        .contains(&"internal/auth/auth.go".to_string()));

    // Execution telemetry closes the loop
    let execution = ExecutionData {
        status: CompletionStatus::Success,
        duration: Duration::from_secs(20),
        error_count: 0,
        iteration_count: 1,
        user_interventions: 0,
        accessed_files: vec!["internal/auth/auth.go".to_string()],
    };
    let feedback = engine
        .feedback
        .collect_implicit(&task, &adapted.context, &execution)
        .unwrap();
    assert!(feedback.success);
    assert!(feedback.quality_score > 0.8);

    let profile = engine.adaptive.profile(TaskType::Debug).unwrap();
    assert_eq!(profile.sample_count, 1);
}

#[tokio::test]
async fn test_selection_is_cached_until_project_changes() {
    let project_dir = tempfile::tempdir().unwrap();
    let feedback_dir = tempfile::tempdir().unwrap();
    let engine = engine(feedback_dir.path());

    let mut project = sample_project(project_dir.path());
    let task = Task::new(TaskType::Feature, "extend auth");

    let constraints = engine.adaptive.get_adaptive_constraints(&task, 8000);
    let first = engine
        .optimizer
        .select_optimal_context(&project, &task, &constraints)
        .await
        .unwrap();
    let second = engine
        .optimizer
        .select_optimal_context(&project, &task, &constraints)
        .await
        .unwrap();
    assert_eq!(first.file_paths(), second.file_paths());
    assert_eq!(engine.cache.stats().hits, 1);

    // An edit to a constituent file invalidates the cached selection
    project.files[1].last_modified = Utc::now();
    let removed = engine.cache.invalidate_by_project_change(&project);
    assert!(removed >= 1);
    assert!(engine
        .optimizer
        .get_cached_selection(&project, &task, constraints.max_tokens)
        .is_none());
}

#[tokio::test]
async fn test_compression_of_selected_context() {
    let project_dir = tempfile::tempdir().unwrap();
    let feedback_dir = tempfile::tempdir().unwrap();
    let engine = engine(feedback_dir.path());

    let project = sample_project(project_dir.path());
    let task = Task::new(TaskType::Refactor, "auth module cleanup");
    let constraints = engine.adaptive.get_adaptive_constraints(&task, 8000);
    let mut selection = engine
        .optimizer
        .select_optimal_context(&project, &task, &constraints)
        .await
        .unwrap();

    // Load real content so compression has text to work on
    for file in &mut selection.files {
        file.content =
            std::fs::read_to_string(project_dir.path().join(&file.file.path)).ok();
    }

    let compressed = engine
        .optimizer
        .apply_compression_strategy(&selection, CompressionStrategy::Summary)
        .unwrap();
    assert_eq!(compressed.files.len(), selection.files.len());
    assert!(compressed.total_compressed_tokens <= compressed.total_original_tokens);
    assert!(compressed.estimated_quality > 0.0);

    let auth = compressed
        .files
        .iter()
        .find(|f| f.path == "internal/auth/auth.go")
        .unwrap();
    assert!(auth.content.contains("func Login"));
    assert!(!auth.content.contains("fmt.Errorf"));
}

#[tokio::test]
async fn test_budget_prediction_shifts_with_learning() {
    let project_dir = tempfile::tempdir().unwrap();
    let feedback_dir = tempfile::tempdir().unwrap();
    let engine = engine(feedback_dir.path());

    let project = sample_project(project_dir.path());
    let task = Task::new(TaskType::Feature, "extend auth");

    // Small project tier
    assert_eq!(engine.adaptive.predict_optimal_budget(&task, &project), 4000);

    let adapted = engine
        .adaptive
        .adapt_optimal_context(&project, &task, 4000)
        .await
        .unwrap();
    let execution = ExecutionData {
        status: CompletionStatus::Success,
        duration: Duration::from_secs(20),
        error_count: 0,
        iteration_count: 1,
        user_interventions: 0,
        accessed_files: Vec::new(),
    };
    for _ in 0..10 {
        engine
            .feedback
            .collect_implicit(&task, &adapted.context, &execution)
            .unwrap();
    }

    let predicted = engine.adaptive.predict_optimal_budget(&task, &project);
    assert_ne!(predicted, 4000);

    let summary = engine.feedback.summary().unwrap();
    assert_eq!(summary.total_records, 10);
    assert!(summary.success_rate > 0.99);
}
