//! Review orchestration: per-file analysis combining detector and model
//! findings, and whole-pull-request aggregation into an
//! [`AnalysisResult`].

pub mod detect;
pub mod diff_map;
pub mod normalize;
pub mod types;

pub use types::{AnalysisResult, Category, FileReport, Finding, Severity, Summary};

use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info_span, warn, Instrument};

use crate::model::{ModelCapability, ReviewMode};
use detect::DetectorRegistry;

/// One file queued for review.
#[derive(Debug, Clone, Default)]
pub struct ReviewFile {
    pub path: String,
    pub language: String,
    pub content: String,
    /// Unified diff for this file, when available. Its presence selects
    /// diff-mode analysis.
    pub patch: Option<String>,
    /// Set when the file's content could not be fetched; surfaces as an
    /// error finding on the report.
    pub fetch_error: Option<String>,
}

/// A pull request is split into more findings than reviewers want to read;
/// past this many total findings we suggest splitting the change.
const SPLIT_THRESHOLD: usize = 20;

/// File extensions excluded from review: binaries, archives, bundles, and
/// documents.
const SKIP_EXTENSIONS: &[&str] = &[
    ".png", ".jpg", ".jpeg", ".gif", ".svg", ".ico", ".pdf", ".doc", ".docx", ".xls", ".xlsx",
    ".zip", ".tar", ".gz", ".rar", ".exe", ".dll", ".so", ".dylib", ".min.js", ".min.css",
];

/// Path fragments excluded from review: dependency, build, and tooling
/// directories.
const SKIP_PATTERNS: &[&str] = &[
    "node_modules/",
    "vendor/",
    ".git/",
    "__pycache__/",
    ".pytest_cache/",
    "coverage/",
    "dist/",
    "build/",
];

/// Whether a path is eligible for review at all.
pub fn should_review(path: &str) -> bool {
    let lower = path.to_lowercase();
    if SKIP_EXTENSIONS.iter().any(|ext| lower.ends_with(ext)) {
        return false;
    }
    if SKIP_PATTERNS.iter().any(|pattern| lower.contains(pattern)) {
        return false;
    }
    true
}

/// Drives analysis of individual files and whole pull requests.
pub struct Reviewer {
    model: Arc<dyn ModelCapability>,
    detectors: DetectorRegistry,
}

impl Reviewer {
    pub fn new(model: Arc<dyn ModelCapability>) -> Self {
        Self {
            model,
            detectors: DetectorRegistry::standard(),
        }
    }

    /// Review one file. Never fails: a model error degrades to a report
    /// carrying a single `error` finding, so one bad file cannot abort a
    /// batch.
    pub async fn review_file(&self, file: &ReviewFile) -> FileReport {
        let (mode, examined) = match file.patch.as_deref() {
            Some(patch) if !patch.is_empty() => (ReviewMode::Diff, patch),
            _ => (ReviewMode::Full, file.content.as_str()),
        };
        let lines_analyzed = examined.split('\n').count();
        debug!(path = %file.path, %mode, lines_analyzed, "reviewing file");

        let mut detector_findings = self.detectors.detect(examined, &file.language);
        if mode == ReviewMode::Diff {
            // Detector lines index the raw diff text; remap to file lines.
            for finding in &mut detector_findings {
                finding.line = diff_map::map_diff_text_line(finding.line, examined);
            }
        }

        let mut findings = match self
            .model
            .critique(examined, &file.path, &file.language, mode)
            .await
        {
            Ok(response) => {
                let model_findings = normalize::parse_model_response(&response, examined, mode);
                normalize::merge(detector_findings, model_findings)
            }
            Err(err) => {
                warn!(path = %file.path, error = %err, "file review failed");
                vec![Finding {
                    category: Category::Error,
                    line: 1,
                    description: format!("Analysis failed: {err}"),
                    suggestion: "Manual review required".to_string(),
                    severity: Severity::Medium,
                }]
            }
        };

        if let Some(note) = &file.fetch_error {
            findings.push(Finding {
                category: Category::Error,
                line: 1,
                description: format!("Failed to fetch file content: {note}"),
                suggestion: "Manual review required".to_string(),
                severity: Severity::Medium,
            });
        }

        FileReport {
            name: display_name(&file.path),
            path: file.path.clone(),
            findings,
            lines_analyzed,
        }
    }

    /// Review every eligible file, in order, and aggregate the reports
    /// into the final result.
    pub async fn review_all(&self, files: &[ReviewFile]) -> AnalysisResult {
        let mut reports = Vec::new();
        let mut languages = BTreeSet::new();

        for file in files {
            if !should_review(&file.path) {
                debug!(path = %file.path, "skipping excluded file");
                continue;
            }
            languages.insert(file.language.clone());
            let report = self
                .review_file(file)
                .instrument(info_span!("review_file", path = %file.path))
                .await;
            reports.push(report);
        }

        let summary = Summary::from_reports(&reports, &languages);
        let recommendations = recommendations(&summary);

        AnalysisResult {
            files: reports,
            summary,
            recommendations,
        }
    }
}

fn display_name(path: &str) -> String {
    path.rsplit('/').next().unwrap_or(path).to_string()
}

/// Fixed recommendation ladder evaluated once per summary. Rules are
/// independent; all applicable ones fire. The affirmative closing message
/// fires only when no other rule did.
fn recommendations(summary: &Summary) -> Vec<String> {
    let mut recommendations = Vec::new();

    if summary.critical_issues > 0 {
        recommendations.push(format!(
            "Address {} critical security/bug issues immediately",
            summary.critical_issues
        ));
    }
    if summary.high_issues > 0 {
        recommendations.push(format!(
            "Review {} high-priority issues before merging",
            summary.high_issues
        ));
    }
    if summary.total_issues > SPLIT_THRESHOLD {
        recommendations.push(
            "Consider breaking this pull request into smaller, more focused changes".to_string(),
        );
    }

    let has = |language: &str| {
        summary
            .languages_detected
            .iter()
            .any(|tag| tag == language)
    };
    if has("python") {
        recommendations
            .push("Consider running black, flake8, and mypy for Python code quality".to_string());
    }
    if has("javascript") || has("typescript") {
        recommendations
            .push("Consider using ESLint and Prettier for JavaScript/TypeScript code".to_string());
    }

    if recommendations.is_empty() {
        recommendations.push("Code looks good! No major issues detected".to_string());
    }

    recommendations
}
