//! Project snapshot types
//!
//! A `ProjectContext` is the immutable inventory produced by the external
//! analyzer (filesystem walk, language detection, per-file token counts).
//! The engine only reads it.

use crate::graph::DependencyGraph;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::PathBuf;

/// Coarse classification of a project file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Source,
    Test,
    Configuration,
    Documentation,
    Build,
    Other,
}

/// Metadata for a single project file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileInfo {
    /// Path relative to the project root
    pub path: String,
    pub language: String,
    pub file_type: FileType,
    pub token_count: usize,
    pub last_modified: DateTime<Utc>,
}

impl FileInfo {
    /// File name without directories or extension
    pub fn stem(&self) -> &str {
        let name = self.path.rsplit('/').next().unwrap_or(&self.path);
        name.split('.').next().unwrap_or(name)
    }
}

/// Immutable snapshot of an analyzed project
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectContext {
    pub root_path: PathBuf,
    pub total_files: usize,
    pub total_tokens: usize,
    /// File count per detected language
    pub languages: HashMap<String, usize>,
    pub files: Vec<FileInfo>,
    pub dependency_graph: Option<DependencyGraph>,
    pub analysis_notes: Vec<String>,
}

impl ProjectContext {
    /// Build a snapshot from a file inventory, deriving the aggregates.
    pub fn new(root_path: PathBuf, files: Vec<FileInfo>) -> Self {
        let mut languages: HashMap<String, usize> = HashMap::new();
        let mut total_tokens = 0;
        for file in &files {
            *languages.entry(file.language.clone()).or_insert(0) += 1;
            total_tokens += file.token_count;
        }
        Self {
            root_path,
            total_files: files.len(),
            total_tokens,
            languages,
            files,
            dependency_graph: None,
            analysis_notes: Vec::new(),
        }
    }

    /// Language with the most files, ties broken alphabetically
    pub fn dominant_language(&self) -> Option<&str> {
        self.languages
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(lang, _)| lang.as_str())
    }

    /// Look up a file by its project-relative path
    pub fn file(&self, path: &str) -> Option<&FileInfo> {
        self.files.iter().find(|f| f.path == path)
    }

    /// Fingerprint over the current (path, mtime) pairs of the given files.
    ///
    /// Returns `None` when any of the paths is absent from the snapshot, so
    /// callers can treat a vanished file as a change.
    pub fn fingerprint_for(&self, paths: &[String]) -> Option<String> {
        let mut lines: Vec<String> = Vec::with_capacity(paths.len());
        for path in paths {
            let file = self.file(path)?;
            lines.push(format!("{}:{}", file.path, file.last_modified.timestamp()));
        }
        lines.sort();

        let mut hasher = Sha256::new();
        for line in &lines {
            hasher.update(line.as_bytes());
            hasher.update(b"\n");
        }
        Some(hex::encode(hasher.finalize()))
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;
    use chrono::Duration;

    pub fn file(path: &str, language: &str, file_type: FileType, tokens: usize) -> FileInfo {
        FileInfo {
            path: path.to_string(),
            language: language.to_string(),
            file_type,
            token_count: tokens,
            last_modified: Utc::now() - Duration::hours(48),
        }
    }

    pub fn project(files: Vec<FileInfo>) -> ProjectContext {
        ProjectContext::new(PathBuf::from("/tmp/project"), files)
    }
}

#[cfg(test)]
mod tests {
    use super::testutil::{file, project};
    use super::*;

    #[test]
    fn test_dominant_language() {
        let p = project(vec![
            file("a.go", "go", FileType::Source, 100),
            file("b.go", "go", FileType::Source, 100),
            file("c.py", "python", FileType::Source, 100),
        ]);
        assert_eq!(p.dominant_language(), Some("go"));
        assert_eq!(p.total_tokens, 300);
    }

    #[test]
    fn test_fingerprint_changes_with_mtime() {
        let mut p = project(vec![file("a.go", "go", FileType::Source, 100)]);
        let paths = vec!["a.go".to_string()];
        let before = p.fingerprint_for(&paths).unwrap();

        p.files[0].last_modified = Utc::now();
        let after = p.fingerprint_for(&paths).unwrap();
        assert_ne!(before, after);
    }

    #[test]
    fn test_fingerprint_missing_file_is_none() {
        let p = project(vec![file("a.go", "go", FileType::Source, 100)]);
        assert!(p.fingerprint_for(&["gone.go".to_string()]).is_none());
    }

    #[test]
    fn test_fingerprint_is_order_independent() {
        let p = project(vec![
            file("a.go", "go", FileType::Source, 100),
            file("b.go", "go", FileType::Source, 100),
        ]);
        let fp1 = p.fingerprint_for(&["a.go".to_string(), "b.go".to_string()]);
        let fp2 = p.fingerprint_for(&["b.go".to_string(), "a.go".to_string()]);
        assert_eq!(fp1, fp2);
    }

    #[test]
    fn test_file_stem() {
        let f = file("src/auth/login_handler.go", "go", FileType::Source, 10);
        assert_eq!(f.stem(), "login_handler");
    }
}
