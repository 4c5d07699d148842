//! Dependency graph construction
//!
//! Line-based import/export extraction over the dominant language's files.
//! A file that cannot be read or parsed is skipped; the graph degrades to
//! partial coverage instead of failing the analysis.

use super::DependencyGraph;
use crate::error::{ContextError, Result};
use crate::project::ProjectContext;
use std::collections::HashSet;
use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Builds a `DependencyGraph` from a project snapshot
#[derive(Default)]
pub struct GraphBuilder {
    cancel: Option<Arc<AtomicBool>>,
}

#[derive(Debug, Default)]
struct ParsedSource {
    imports: Vec<String>,
    exports: Vec<String>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancellation flag, checked between per-file parses
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Build the graph over files of the project's dominant language.
    pub fn build(&self, project: &ProjectContext) -> Result<DependencyGraph> {
        let mut graph = DependencyGraph::new();
        let Some(language) = project.dominant_language().map(str::to_string) else {
            return Ok(graph);
        };

        let candidates: Vec<&str> = project
            .files
            .iter()
            .filter(|f| f.language == language)
            .map(|f| f.path.as_str())
            .collect();
        let path_set: HashSet<&str> = candidates.iter().copied().collect();

        for path in &candidates {
            graph.ensure_node(path);
        }

        let total = candidates.len();
        for (parsed_count, path) in candidates.iter().enumerate() {
            if let Some(flag) = &self.cancel {
                if flag.load(Ordering::Relaxed) {
                    return Err(ContextError::Cancelled {
                        parsed: parsed_count,
                        total,
                    });
                }
            }

            let content = match fs::read_to_string(project.root_path.join(path)) {
                Ok(content) => content,
                Err(e) => {
                    debug!("Skipping unreadable file {}: {}", path, e);
                    continue;
                }
            };

            let parsed = parse_source(&language, &content);
            let node = graph.ensure_node(path);
            node.imports = parsed.imports.clone();
            node.exports = parsed.exports;

            for import in &parsed.imports {
                if let Some(target) = resolve_local(import, path, &path_set, &language) {
                    graph.add_edge(path, &target);
                }
            }
        }

        debug!(
            "Dependency graph built: {} nodes, {} edges ({})",
            graph.len(),
            graph.edges.len(),
            language
        );
        Ok(graph)
    }
}

fn parse_source(language: &str, content: &str) -> ParsedSource {
    match language {
        "go" => parse_go(content),
        "rust" => parse_rust(content),
        "javascript" | "typescript" => parse_js(content),
        "python" => parse_python(content),
        _ => ParsedSource::default(),
    }
}

fn parse_go(content: &str) -> ParsedSource {
    let mut parsed = ParsedSource::default();
    let mut in_import_block = false;

    for line in content.lines() {
        let trimmed = line.trim();
        if in_import_block {
            if trimmed.starts_with(')') {
                in_import_block = false;
            } else if let Some(path) = quoted(trimmed) {
                parsed.imports.push(path);
            }
            continue;
        }
        if trimmed.starts_with("import (") {
            in_import_block = true;
        } else if trimmed.starts_with("import ") {
            if let Some(path) = quoted(trimmed) {
                parsed.imports.push(path);
            }
        } else if let Some(rest) = trimmed.strip_prefix("func ") {
            if let Some(name) = exported_go_ident(rest) {
                parsed.exports.push(name);
            }
        } else if let Some(rest) = trimmed.strip_prefix("type ") {
            if let Some(name) = exported_go_ident(rest) {
                parsed.exports.push(name);
            }
        }
    }
    parsed
}

fn parse_rust(content: &str) -> ParsedSource {
    let mut parsed = ParsedSource::default();
    for line in content.lines() {
        let trimmed = line.trim();
        let use_line = trimmed
            .strip_prefix("pub use ")
            .or_else(|| trimmed.strip_prefix("use "));
        if let Some(rest) = use_line {
            let path = rest
                .split(|c| c == ';' || c == '{')
                .next()
                .unwrap_or("")
                .trim()
                .trim_end_matches("::");
            if !path.is_empty() {
                parsed.imports.push(path.to_string());
            }
        } else if let Some(rest) = trimmed.strip_prefix("mod ") {
            if let Some(name) = rest.strip_suffix(';') {
                parsed.imports.push(format!("self::{}", name.trim()));
            }
        } else if trimmed.starts_with("pub fn ")
            || trimmed.starts_with("pub struct ")
            || trimmed.starts_with("pub enum ")
            || trimmed.starts_with("pub trait ")
            || trimmed.starts_with("pub const ")
        {
            if let Some(name) = trimmed.split_whitespace().nth(2) {
                parsed
                    .exports
                    .push(name.trim_end_matches(|c: char| !c.is_alphanumeric() && c != '_').to_string());
            }
        }
    }
    parsed
}

fn parse_js(content: &str) -> ParsedSource {
    let mut parsed = ParsedSource::default();
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("import ") || trimmed.contains("require(") {
            if let Some(path) = quoted(trimmed) {
                parsed.imports.push(path);
            }
        } else if let Some(rest) = trimmed.strip_prefix("export ") {
            if let Some(name) = rest
                .split_whitespace()
                .find(|w| !matches!(*w, "default" | "const" | "function" | "class" | "async" | "let" | "var"))
            {
                parsed
                    .exports
                    .push(name.trim_end_matches(|c: char| !c.is_alphanumeric() && c != '_').to_string());
            }
        }
    }
    parsed
}

fn parse_python(content: &str) -> ParsedSource {
    let mut parsed = ParsedSource::default();
    for line in content.lines() {
        let trimmed = line.trim_end();
        if let Some(rest) = trimmed.strip_prefix("from ") {
            if let Some(module) = rest.split_whitespace().next() {
                parsed.imports.push(module.to_string());
            }
        } else if let Some(rest) = trimmed.strip_prefix("import ") {
            if let Some(module) = rest.split(|c| c == ',' || c == ' ').next() {
                parsed.imports.push(module.trim().to_string());
            }
        } else if let Some(rest) = trimmed.strip_prefix("def ") {
            if let Some(name) = rest.split('(').next() {
                parsed.exports.push(name.trim().to_string());
            }
        } else if let Some(rest) = trimmed.strip_prefix("class ") {
            if let Some(name) = rest.split(|c| c == '(' || c == ':').next() {
                parsed.exports.push(name.trim().to_string());
            }
        }
    }
    parsed
}

/// First double- or single-quoted segment in a line
fn quoted(line: &str) -> Option<String> {
    for quote in ['"', '\''] {
        let mut parts = line.split(quote);
        parts.next()?;
        if let Some(inner) = parts.next() {
            if !inner.is_empty() {
                return Some(inner.to_string());
            }
        }
    }
    None
}

fn exported_go_ident(rest: &str) -> Option<String> {
    // Skip a method receiver: func (s *Server) Name(...)
    let rest = if rest.starts_with('(') {
        rest.split_once(')').map(|(_, r)| r.trim_start())?
    } else {
        rest
    };
    let name: String = rest
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_')
        .collect();
    if name.chars().next()?.is_uppercase() {
        Some(name)
    } else {
        None
    }
}

/// Resolve an import string to a project-local file, if it is one.
///
/// Relative paths resolve against the importing file's directory. Bare paths
/// qualify only when they lack a dot (vendor hosts like `github.com/...`
/// carry one) and a matching file exists in the project.
fn resolve_local(
    import: &str,
    from: &str,
    paths: &HashSet<&str>,
    language: &str,
) -> Option<String> {
    match language {
        "go" => resolve_go(import, paths),
        "rust" => resolve_rust(import, from, paths),
        "javascript" | "typescript" => resolve_js(import, from, paths),
        "python" => resolve_python(import, from, paths),
        _ => None,
    }
}

fn resolve_go(import: &str, paths: &HashSet<&str>) -> Option<String> {
    if import.contains('.') {
        return None;
    }
    // Progressively drop leading module-path segments until a project
    // directory matches, then pick a deterministic representative file.
    let segments: Vec<&str> = import.split('/').collect();
    for start in 0..segments.len() {
        let dir = segments[start..].join("/");
        let prefix = format!("{dir}/");
        let mut in_dir: Vec<&str> = paths
            .iter()
            .copied()
            .filter(|p| p.starts_with(&prefix) && !p[prefix.len()..].contains('/'))
            .collect();
        if !in_dir.is_empty() {
            in_dir.sort_unstable();
            let stem_match = in_dir
                .iter()
                .find(|p| p.ends_with(&format!("/{}.go", segments[segments.len() - 1])));
            return Some(stem_match.unwrap_or(&in_dir[0]).to_string());
        }
    }
    None
}

fn resolve_rust(import: &str, from: &str, paths: &HashSet<&str>) -> Option<String> {
    let (anchor, rest) = import.split_once("::").unwrap_or((import, ""));
    let segments: Vec<&str> = rest.split("::").filter(|s| !s.is_empty()).collect();

    let base = match anchor {
        "crate" => "src".to_string(),
        "self" => parent_dir(from),
        "super" => parent_dir(&parent_dir(from)),
        _ => return None,
    };

    // Trailing segments may be items rather than modules; try shrinking.
    for end in (1..=segments.len()).rev() {
        let module_path = segments[..end].join("/");
        for candidate in [
            format!("{base}/{module_path}.rs"),
            format!("{base}/{module_path}/mod.rs"),
        ] {
            if paths.contains(candidate.as_str()) {
                return Some(candidate);
            }
        }
    }
    None
}

fn resolve_js(import: &str, from: &str, paths: &HashSet<&str>) -> Option<String> {
    if !import.starts_with('.') {
        return None;
    }
    let joined = join_relative(&parent_dir(from), import);
    let candidates = [
        joined.clone(),
        format!("{joined}.ts"),
        format!("{joined}.tsx"),
        format!("{joined}.js"),
        format!("{joined}.jsx"),
        format!("{joined}/index.ts"),
        format!("{joined}/index.js"),
    ];
    candidates
        .into_iter()
        .find(|c| paths.contains(c.as_str()))
}

fn resolve_python(import: &str, from: &str, paths: &HashSet<&str>) -> Option<String> {
    let (base, module) = if let Some(stripped) = import.strip_prefix('.') {
        let mut dir = parent_dir(from);
        let mut rest = stripped;
        while let Some(more) = rest.strip_prefix('.') {
            dir = parent_dir(&dir);
            rest = more;
        }
        (dir, rest.to_string())
    } else {
        // Absolute module path: local only when a matching file exists
        (String::new(), import.to_string())
    };

    let module_path = module.replace('.', "/");
    let joined = if base.is_empty() {
        module_path
    } else {
        format!("{base}/{module_path}")
    };
    let candidates = [format!("{joined}.py"), format!("{joined}/__init__.py")];
    candidates
        .into_iter()
        .find(|c| paths.contains(c.as_str()))
}

fn parent_dir(path: &str) -> String {
    match path.rsplit_once('/') {
        Some((dir, _)) => dir.to_string(),
        None => String::new(),
    }
}

fn join_relative(base: &str, relative: &str) -> String {
    let mut parts: Vec<&str> = if base.is_empty() {
        Vec::new()
    } else {
        base.split('/').collect()
    };
    for segment in relative.split('/') {
        match segment {
            "." | "" => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}
