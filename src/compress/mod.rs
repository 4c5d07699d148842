//! Context compression
//!
//! Lossy per-file reduction of a selection. Compression works on whatever
//! text is available: preloaded content when the selection carried it, a
//! metadata placeholder otherwise. A failure on one file falls back to that
//! file's uncompressed content and never aborts the whole selection.

use crate::config::CompressionConfig;
use crate::error::{ContextError, Result};
use crate::optimizer::models::{ContextFile, SelectedContext};
use crate::tokens::TokenEstimator;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

/// Named reduction technique
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionStrategy {
    None,
    Summary,
    Snippet,
    Minify,
    Semantic,
}

impl fmt::Display for CompressionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CompressionStrategy::None => "none",
            CompressionStrategy::Summary => "summary",
            CompressionStrategy::Snippet => "snippet",
            CompressionStrategy::Minify => "minify",
            CompressionStrategy::Semantic => "semantic",
        };
        f.write_str(s)
    }
}

impl FromStr for CompressionStrategy {
    type Err = ContextError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "none" => Ok(CompressionStrategy::None),
            "summary" => Ok(CompressionStrategy::Summary),
            "snippet" => Ok(CompressionStrategy::Snippet),
            "minify" => Ok(CompressionStrategy::Minify),
            "semantic" => Ok(CompressionStrategy::Semantic),
            other => Err(ContextError::UnknownStrategy(other.to_string())),
        }
    }
}

/// One compressed file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressedFile {
    pub path: String,
    pub original_tokens: usize,
    pub compressed_tokens: usize,
    pub ratio: f32,
    pub techniques: Vec<String>,
    pub quality: f32,
    pub content: String,
}

/// A selection after compression
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressedContext {
    pub files: Vec<CompressedFile>,
    pub strategy: CompressionStrategy,
    pub total_original_tokens: usize,
    pub total_compressed_tokens: usize,
    pub overall_ratio: f32,
    /// Token-weighted mean of per-file quality estimates, 0.0..=1.0
    pub estimated_quality: f32,
}

/// Applies a compression strategy to a selection
pub struct ContextCompressor {
    estimator: Arc<dyn TokenEstimator>,
    config: CompressionConfig,
}

impl ContextCompressor {
    pub fn new(estimator: Arc<dyn TokenEstimator>, config: CompressionConfig) -> Self {
        Self { estimator, config }
    }

    /// Compress every file of the selection with one strategy.
    pub fn compress(
        &self,
        selection: &SelectedContext,
        strategy: CompressionStrategy,
    ) -> Result<CompressedContext> {
        let mut files = Vec::with_capacity(selection.files.len());
        let mut total_original = 0usize;
        let mut total_compressed = 0usize;
        let mut weighted_quality = 0.0f64;

        for file in &selection.files {
            let compressed = self.compress_file(file, strategy);
            total_original += compressed.original_tokens;
            total_compressed += compressed.compressed_tokens;
            weighted_quality += compressed.quality as f64 * compressed.original_tokens as f64;
            files.push(compressed);
        }

        let overall_ratio = if total_original == 0 {
            1.0
        } else {
            total_compressed as f32 / total_original as f32
        };
        let estimated_quality = if total_original == 0 {
            1.0
        } else {
            (weighted_quality / total_original as f64) as f32
        };

        Ok(CompressedContext {
            files,
            strategy,
            total_original_tokens: total_original,
            total_compressed_tokens: total_compressed,
            overall_ratio,
            estimated_quality,
        })
    }

    fn compress_file(&self, file: &ContextFile, strategy: CompressionStrategy) -> CompressedFile {
        let (content, original_tokens) = match &file.content {
            Some(c) => (c.clone(), self.estimator.estimate(c)),
            None => (placeholder(file), file.file.token_count),
        };

        let language = file.file.language.as_str();
        let (output, techniques) = match apply(strategy, &content, language, &self.config) {
            Ok(output) => (output, vec![strategy.to_string()]),
            Err(e) => {
                debug!("Compression failed for {}, keeping original: {}", file.file.path, e);
                (content.clone(), vec!["uncompressed".to_string()])
            }
        };

        let compressed_tokens = self.estimator.estimate(&output);
        let ratio = if original_tokens == 0 {
            1.0
        } else {
            compressed_tokens as f32 / original_tokens as f32
        };

        CompressedFile {
            path: file.file.path.clone(),
            original_tokens,
            compressed_tokens,
            ratio,
            quality: quality_estimate(strategy, ratio),
            techniques,
            content: output,
        }
    }
}

/// Planning estimate of the token ratio a strategy achieves. A constant per
/// strategy; no work is done and no accuracy is promised.
pub fn estimate_ratio(strategy: CompressionStrategy) -> f32 {
    match strategy {
        CompressionStrategy::None => 1.0,
        CompressionStrategy::Summary => 0.3,
        CompressionStrategy::Snippet => 0.4,
        CompressionStrategy::Minify => 0.8,
        CompressionStrategy::Semantic => 0.5,
    }
}

/// Estimated quality after compressing to `ratio`. Decreases monotonically
/// with deeper compression; each strategy has its own base and sensitivity.
pub fn quality_estimate(strategy: CompressionStrategy, ratio: f32) -> f32 {
    let (base, sensitivity) = match strategy {
        CompressionStrategy::None => (1.0, 0.0),
        CompressionStrategy::Minify => (0.95, 0.1),
        CompressionStrategy::Snippet => (0.8, 0.3),
        CompressionStrategy::Semantic => (0.75, 0.4),
        CompressionStrategy::Summary => (0.6, 0.5),
    };
    (base - (1.0 - ratio).max(0.0) * sensitivity).clamp(0.0, 1.0)
}

fn apply(
    strategy: CompressionStrategy,
    content: &str,
    language: &str,
    config: &CompressionConfig,
) -> Result<String> {
    let output = match strategy {
        CompressionStrategy::None => content.to_string(),
        CompressionStrategy::Summary => summarize(content, language),
        CompressionStrategy::Snippet => snippet(content, language, config.snippet_context_lines),
        CompressionStrategy::Minify => minify(content, language),
        CompressionStrategy::Semantic => semantic_digest(content, language),
    };
    Ok(output)
}

/// Declarations and signatures only, bodies elided.
fn summarize(content: &str, language: &str) -> String {
    let marker = format!("{} ...", comment_prefix(language));
    let mut out: Vec<String> = Vec::new();
    let mut elided = false;

    for line in content.lines() {
        let trimmed = line.trim();
        if is_declaration(trimmed, language) {
            if elided {
                out.push(marker.clone());
                elided = false;
            }
            out.push(line.trim_end().to_string());
        } else if !trimmed.is_empty() {
            elided = true;
        }
    }
    if elided {
        out.push(marker);
    }
    out.join("\n")
}

/// Imports plus a window of lines after each function marker.
fn snippet(content: &str, language: &str, context_lines: usize) -> String {
    let lines: Vec<&str> = content.lines().collect();
    let mut keep = vec![false; lines.len()];

    for (i, line) in lines.iter().enumerate() {
        let trimmed = line.trim();
        if is_import(trimmed, language) {
            keep[i] = true;
        }
        if is_function_start(trimmed, language) {
            let end = (i + context_lines).min(lines.len().saturating_sub(1));
            for slot in keep.iter_mut().take(end + 1).skip(i) {
                *slot = true;
            }
        }
    }

    let marker = format!("{} ...", comment_prefix(language));
    let mut out: Vec<String> = Vec::new();
    let mut gap = false;
    for (i, line) in lines.iter().enumerate() {
        if keep[i] {
            if gap && !out.is_empty() {
                out.push(marker.clone());
            }
            gap = false;
            out.push(line.trim_end().to_string());
        } else {
            gap = true;
        }
    }
    out.join("\n")
}

/// Strip comments, drop blank lines, collapse runs of interior whitespace.
fn minify(content: &str, language: &str) -> String {
    let line_comment = comment_prefix(language);
    let mut out: Vec<String> = Vec::new();
    let mut in_block_comment = false;

    for line in content.lines() {
        let mut text = line.to_string();

        if language != "python" {
            if in_block_comment {
                match text.find("*/") {
                    Some(pos) => {
                        text = text[pos + 2..].to_string();
                        in_block_comment = false;
                    }
                    None => continue,
                }
            }
            while let Some(start) = text.find("/*") {
                match text[start..].find("*/") {
                    Some(len) => text = format!("{}{}", &text[..start], &text[start + len + 2..]),
                    None => {
                        text = text[..start].to_string();
                        in_block_comment = true;
                        break;
                    }
                }
            }
        }

        if let Some(pos) = text.find(line_comment) {
            // Heuristic: don't strip inside an obvious string literal
            if !text[..pos].contains('"') {
                text = text[..pos].to_string();
            }
        }

        let trimmed = text.trim_end();
        if trimmed.trim().is_empty() {
            continue;
        }

        let indent: String = trimmed.chars().take_while(|c| c.is_whitespace()).collect();
        let body = trimmed.trim_start();
        let mut collapsed = String::with_capacity(body.len());
        let mut last_space = false;
        for c in body.chars() {
            if c == ' ' || c == '\t' {
                if !last_space {
                    collapsed.push(' ');
                }
                last_space = true;
            } else {
                collapsed.push(c);
                last_space = false;
            }
        }
        out.push(format!("{indent}{collapsed}"));
    }
    out.join("\n")
}

/// Grouped extraction of package declaration, imports, types and signatures.
fn semantic_digest(content: &str, language: &str) -> String {
    let mut package: Vec<&str> = Vec::new();
    let mut imports: Vec<&str> = Vec::new();
    let mut types: Vec<&str> = Vec::new();
    let mut functions: Vec<&str> = Vec::new();

    for line in content.lines() {
        let trimmed = line.trim();
        if is_package_decl(trimmed, language) {
            package.push(trimmed);
        } else if is_import(trimmed, language) {
            imports.push(trimmed);
        } else if is_type_decl(trimmed, language) {
            types.push(trimmed);
        } else if is_function_start(trimmed, language) {
            functions.push(trimmed);
        }
    }

    let mut out = String::new();
    for (title, lines) in [
        ("package", package),
        ("imports", imports),
        ("types", types),
        ("functions", functions),
    ] {
        if lines.is_empty() {
            continue;
        }
        out.push_str(&format!("=== {title} ===\n"));
        for line in lines {
            out.push_str(line);
            out.push('\n');
        }
    }
    out.trim_end().to_string()
}

fn placeholder(file: &ContextFile) -> String {
    format!(
        "// {} ({:?}, {} tokens)\n// content not loaded\n",
        file.file.path, file.file.file_type, file.file.token_count
    )
}

fn comment_prefix(language: &str) -> &'static str {
    match language {
        "python" => "#",
        _ => "//",
    }
}

fn is_package_decl(line: &str, language: &str) -> bool {
    match language {
        "go" => line.starts_with("package "),
        "rust" => line.starts_with("mod ") || line.starts_with("pub mod "),
        _ => false,
    }
}

fn is_import(line: &str, language: &str) -> bool {
    match language {
        "python" => line.starts_with("import ") || line.starts_with("from "),
        "rust" => line.starts_with("use ") || line.starts_with("pub use "),
        _ => line.starts_with("import ") || line.contains("require("),
    }
}

fn is_type_decl(line: &str, language: &str) -> bool {
    match language {
        "go" => line.starts_with("type "),
        "rust" => ["struct ", "enum ", "trait ", "type "]
            .iter()
            .any(|kw| line.starts_with(kw) || line.starts_with(&format!("pub {kw}"))),
        "python" => line.starts_with("class "),
        _ => {
            line.starts_with("interface ")
                || line.starts_with("type ")
                || line.starts_with("class ")
                || line.starts_with("export interface ")
                || line.starts_with("export type ")
                || line.starts_with("export class ")
        }
    }
}

fn is_function_start(line: &str, language: &str) -> bool {
    match language {
        "go" => line.starts_with("func "),
        "rust" => {
            line.starts_with("fn ")
                || line.starts_with("pub fn ")
                || line.starts_with("async fn ")
                || line.starts_with("pub async fn ")
        }
        "python" => line.starts_with("def ") || line.starts_with("async def "),
        _ => {
            line.starts_with("function ")
                || line.starts_with("export function ")
                || line.starts_with("async function ")
                || (line.contains("=>") && (line.contains("const ") || line.contains("let ")))
        }
    }
}

fn is_declaration(line: &str, language: &str) -> bool {
    is_package_decl(line, language)
        || is_import(line, language)
        || is_type_decl(line, language)
        || is_function_start(line, language)
}
