//! Terminal and markdown rendering for analysis results. Used by the
//! one-shot CLI path; the service returns results as JSON instead.

use colored::Colorize;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::github::PullRequestInfo;
use crate::review::{AnalysisResult, Severity};

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Failed to write report file: {0}")]
    FileWrite(#[from] std::io::Error),
}

/// Output the analysis to terminal (default) or to a markdown file.
#[instrument(skip(pr, results), fields(pr = pr.number, issues = results.summary.total_issues))]
pub fn output(
    pr: &PullRequestInfo,
    results: &AnalysisResult,
    output_path: Option<&Path>,
) -> Result<(), ReportError> {
    match output_path {
        None => {
            debug!("writing report to terminal");
            print_terminal_report(pr, results);
            Ok(())
        }
        Some(path) => {
            debug!(path = %path.display(), "writing report to file");
            write_markdown_report(pr, results, path)
        }
    }
}

fn print_terminal_report(pr: &PullRequestInfo, results: &AnalysisResult) {
    println!();
    println!("PR #{}: \"{}\"", pr.number, pr.title);
    println!(
        "Author: {} | Files analyzed: {} | Issues: {}",
        pr.author, results.summary.total_files, results.summary.total_issues
    );
    println!();

    for file in &results.files {
        println!("═══ {} ═══", file.path);
        if file.findings.is_empty() {
            println!("  No findings.");
        } else {
            for finding in &file.findings {
                println!(
                    "  • [{}] line {}: {} ({})",
                    colorize_severity(finding.severity),
                    finding.line,
                    finding.description,
                    finding.category
                );
                println!("    → {}", finding.suggestion);
            }
        }
        println!();
    }

    let summary = &results.summary;
    println!("═══ Summary ═══");
    println!(
        "Critical: {} | High: {} | Medium: {} | Low: {}",
        summary.critical_issues, summary.high_issues, summary.medium_issues, summary.low_issues
    );
    if !summary.languages_detected.is_empty() {
        println!("Languages: {}", summary.languages_detected.join(", "));
    }
    println!();
    for recommendation in &results.recommendations {
        println!("  • {recommendation}");
    }
    println!();
}

fn write_markdown_report(
    pr: &PullRequestInfo,
    results: &AnalysisResult,
    path: &Path,
) -> Result<(), ReportError> {
    let mut md = String::new();
    md.push_str(&format!("# PR #{}: \"{}\"\n\n", pr.number, pr.title));
    md.push_str(&format!(
        "**Author:** {} | **Files analyzed:** {} | **Issues:** {}\n\n",
        pr.author, results.summary.total_files, results.summary.total_issues
    ));

    for file in &results.files {
        md.push_str(&format!("## {}\n\n", file.path));
        if file.findings.is_empty() {
            md.push_str("No findings.\n\n");
        } else {
            for finding in &file.findings {
                md.push_str(&format!(
                    "- **[{}]** line {}: {} ({})\n  - Suggestion: {}\n",
                    finding.severity, finding.line, finding.description, finding.category,
                    finding.suggestion
                ));
            }
            md.push('\n');
        }
    }

    let summary = &results.summary;
    md.push_str("## Summary\n\n");
    md.push_str(&format!(
        "**Critical:** {} | **High:** {} | **Medium:** {} | **Low:** {}\n\n",
        summary.critical_issues, summary.high_issues, summary.medium_issues, summary.low_issues
    ));
    if !summary.languages_detected.is_empty() {
        md.push_str(&format!(
            "**Languages:** {}\n\n",
            summary.languages_detected.join(", ")
        ));
    }
    for recommendation in &results.recommendations {
        md.push_str(&format!("- {recommendation}\n"));
    }

    std::fs::write(path, md)?;
    Ok(())
}

fn colorize_severity(severity: Severity) -> colored::ColoredString {
    match severity {
        Severity::Critical => "CRITICAL".red().bold(),
        Severity::High => "HIGH".red(),
        Severity::Medium => "MEDIUM".yellow(),
        Severity::Low => "LOW".green(),
    }
}
