use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Category of a reported issue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Style,
    Bug,
    Performance,
    Security,
    #[default]
    General,
    /// Review of this file failed; the finding describes the failure.
    Error,
    /// Placeholder emitted when the model returned nothing parseable.
    Analysis,
}

impl Category {
    /// Parse a category tag from model output. Unknown tags map to General.
    pub fn from_tag(tag: &str) -> Category {
        match tag.trim().to_lowercase().as_str() {
            "style" => Category::Style,
            "bug" => Category::Bug,
            "performance" => Category::Performance,
            "security" => Category::Security,
            "error" => Category::Error,
            "analysis" => Category::Analysis,
            _ => Category::General,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Style => "style",
            Category::Bug => "bug",
            Category::Performance => "performance",
            Category::Security => "security",
            Category::General => "general",
            Category::Error => "error",
            Category::Analysis => "analysis",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity of an individual finding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Parse a severity tag from model output. Unknown tags map to Medium.
    pub fn from_tag(tag: &str) -> Severity {
        match tag.trim().to_lowercase().as_str() {
            "low" => Severity::Low,
            "high" => Severity::High,
            "critical" => Severity::Critical,
            "medium" => Severity::Medium,
            _ => Severity::Medium,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Low => write!(f, "LOW"),
            Severity::Medium => write!(f, "MEDIUM"),
            Severity::High => write!(f, "HIGH"),
            Severity::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// One reported issue. The line number is always 1-based and, once
/// normalized, always indexes the file being reported on, never the raw
/// diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub category: Category,
    pub line: usize,
    pub description: String,
    pub suggestion: String,
    pub severity: Severity,
}

/// The result of reviewing one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileReport {
    /// Last path component, for display.
    pub name: String,
    pub path: String,
    pub findings: Vec<Finding>,
    /// Line count of the content actually examined: the diff text in diff
    /// mode, the full file otherwise.
    pub lines_analyzed: usize,
}

/// Aggregate counts derived from a set of FileReports. Always recomputable;
/// never stored independently of the reports it was derived from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub total_files: usize,
    pub total_issues: usize,
    pub critical_issues: usize,
    pub high_issues: usize,
    pub medium_issues: usize,
    pub low_issues: usize,
    pub languages_detected: Vec<String>,
}

impl Summary {
    /// Tally findings by severity across the given reports.
    pub fn from_reports(reports: &[FileReport], languages: &BTreeSet<String>) -> Summary {
        let all = reports.iter().flat_map(|r| r.findings.iter());
        let mut summary = Summary {
            total_files: reports.len(),
            total_issues: 0,
            critical_issues: 0,
            high_issues: 0,
            medium_issues: 0,
            low_issues: 0,
            languages_detected: languages.iter().cloned().collect(),
        };
        for finding in all {
            summary.total_issues += 1;
            match finding.severity {
                Severity::Critical => summary.critical_issues += 1,
                Severity::High => summary.high_issues += 1,
                Severity::Medium => summary.medium_issues += 1,
                Severity::Low => summary.low_issues += 1,
            }
        }
        summary
    }
}

/// The terminal payload of one analysis task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub files: Vec<FileReport>,
    pub summary: Summary,
    pub recommendations: Vec<String>,
}
