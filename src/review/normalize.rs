//! Normalization of model output into canonical findings.
//!
//! The model's response is free text that usually, but not always,
//! contains one embedded JSON object with an `issues` array. Extraction is
//! layered: strict JSON first, then a line-oriented text scan, and as a
//! last resort a single placeholder finding. Nothing in this module fails;
//! every malformed input degrades to the next layer.

use serde_json::Value;
use std::collections::HashSet;

use super::diff_map::map_diff_line;
use super::types::{Category, Finding, Severity};
use crate::model::ReviewMode;

/// Parse a model response into findings. In diff mode, reported line
/// numbers are diff-relative and are remapped to file line numbers here.
/// Always returns at least one finding.
pub fn parse_model_response(response: &str, examined: &str, mode: ReviewMode) -> Vec<Finding> {
    let mut findings = parse_json_issues(response, examined, mode);
    if findings.is_empty() {
        findings = scan_text(response, examined, mode);
    }
    if findings.is_empty() {
        findings.push(placeholder(mode));
    }
    findings
}

/// Merge detector findings (already file-line-indexed) with normalized
/// model findings, dropping exact duplicates while preserving order.
pub fn merge(detector: Vec<Finding>, model: Vec<Finding>) -> Vec<Finding> {
    let mut seen = HashSet::new();
    let mut merged = Vec::new();
    for finding in detector.into_iter().chain(model) {
        let key = (finding.line, finding.category, finding.description.clone());
        if seen.insert(key) {
            merged.push(finding);
        }
    }
    merged
}

/// Strict extraction: locate the first `{...}` span, parse it, and read
/// its `issues` array. Returns empty on any parse failure.
fn parse_json_issues(response: &str, examined: &str, mode: ReviewMode) -> Vec<Finding> {
    let Some(start) = response.find('{') else {
        return Vec::new();
    };
    let Some(end) = response.rfind('}') else {
        return Vec::new();
    };
    if end < start {
        return Vec::new();
    }

    let Ok(value) = serde_json::from_str::<Value>(&response[start..=end]) else {
        return Vec::new();
    };
    let Some(issues) = value.get("issues").and_then(Value::as_array) else {
        return Vec::new();
    };

    issues
        .iter()
        .map(|issue| {
            let raw_line = issue.get("line").and_then(Value::as_u64).unwrap_or(1) as usize;
            let line = match mode {
                ReviewMode::Diff => map_diff_line(raw_line, examined),
                ReviewMode::Full => raw_line,
            };
            Finding {
                category: Category::from_tag(
                    issue.get("type").and_then(Value::as_str).unwrap_or(""),
                ),
                line,
                description: issue
                    .get("description")
                    .and_then(Value::as_str)
                    .unwrap_or("No description")
                    .to_string(),
                suggestion: issue
                    .get("suggestion")
                    .and_then(Value::as_str)
                    .unwrap_or("No suggestion")
                    .to_string(),
                severity: Severity::from_tag(
                    issue.get("severity").and_then(Value::as_str).unwrap_or(""),
                ),
            }
        })
        .collect()
}

#[derive(Default)]
struct Draft {
    description: Option<String>,
    category: Category,
    severity: Severity,
    line: Option<usize>,
    suggestion: Option<String>,
}

impl Draft {
    fn finish(self, examined: &str, mode: ReviewMode) -> Finding {
        let raw_line = self.line.unwrap_or(1);
        let line = match mode {
            ReviewMode::Diff => map_diff_line(raw_line, examined),
            ReviewMode::Full => raw_line,
        };
        Finding {
            category: self.category,
            line,
            description: self
                .description
                .unwrap_or_else(|| "No description".to_string()),
            suggestion: self.suggestion.unwrap_or_else(|| "No suggestion".to_string()),
            severity: self.severity,
        }
    }
}

/// Fallback parser over plain text: keyword cues open a finding, `Line N`
/// tokens set its position, `suggestion`/`fix` lines set its advice.
fn scan_text(response: &str, examined: &str, mode: ReviewMode) -> Vec<Finding> {
    const CUES: &[&str] = &["issue", "problem", "warning", "error"];
    let mut findings = Vec::new();
    let mut current: Option<Draft> = None;

    for raw in response.lines() {
        let line = raw.trim();
        let lower = line.to_lowercase();

        if CUES.iter().any(|cue| lower.contains(cue)) {
            if let Some(draft) = current.take() {
                findings.push(draft.finish(examined, mode));
            }
            current = Some(Draft {
                description: Some(line.to_string()),
                category: infer_category(line),
                severity: infer_severity(line),
                line: None,
                suggestion: None,
            });
        } else if line.starts_with("Line") && line.contains(':') {
            let number = parse_line_token(line);
            current.get_or_insert_with(Draft::default).line = number;
        } else if lower.starts_with("suggestion") || lower.starts_with("fix") {
            current.get_or_insert_with(Draft::default).suggestion = Some(line.to_string());
        }
    }

    if let Some(draft) = current {
        findings.push(draft.finish(examined, mode));
    }

    findings
}

/// Extract N from a `Line N: ...` token.
fn parse_line_token(line: &str) -> Option<usize> {
    let rest = line.strip_prefix("Line")?.trim_start();
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

/// Infer an issue category from keywords in free text.
pub fn infer_category(text: &str) -> Category {
    let lower = text.to_lowercase();
    let has = |words: &[&str]| words.iter().any(|w| lower.contains(w));
    if has(&["security", "vulnerability", "injection"]) {
        Category::Security
    } else if has(&["performance", "slow", "inefficient"]) {
        Category::Performance
    } else if has(&["bug", "error", "exception"]) {
        Category::Bug
    } else if has(&["style", "format", "convention"]) {
        Category::Style
    } else {
        Category::General
    }
}

/// Infer a severity from keywords in free text.
pub fn infer_severity(text: &str) -> Severity {
    let lower = text.to_lowercase();
    let has = |words: &[&str]| words.iter().any(|w| lower.contains(w));
    if has(&["critical", "severe", "dangerous"]) {
        Severity::Critical
    } else if has(&["high", "important", "major"]) {
        Severity::High
    } else if has(&["low", "minor", "trivial"]) {
        Severity::Low
    } else {
        Severity::Medium
    }
}

fn placeholder(mode: ReviewMode) -> Finding {
    let subject = match mode {
        ReviewMode::Diff => "diff",
        ReviewMode::Full => "file",
    };
    Finding {
        category: Category::Analysis,
        line: 1,
        description: format!("Code {} analysis completed", subject),
        suggestion: "Review the detailed analysis provided".to_string(),
        severity: Severity::Low,
    }
}
