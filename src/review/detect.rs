//! Heuristic detectors.
//!
//! Detectors are pure functions over the literal source text: they scan
//! line by line, match patterns, and never parse or execute code. A
//! finding's line number is always a direct 1-based index into whatever
//! text was passed in; remapping for diff-mode reviews happens in the
//! orchestrator, not here. Detectors never fail for any input.

use std::collections::HashMap;

use super::types::{Category, Finding, Severity};

/// A detector scans source text and returns findings in line order.
pub type Detector = fn(&str) -> Vec<Finding>;

/// Registry key matching any language.
pub const ANY_LANGUAGE: &str = "*";

/// Nested-loop proximity window. A `for` within this many lines of another
/// `for` is flagged as potentially quadratic. Tunable policy, not a
/// contract.
const NESTED_LOOP_WINDOW: usize = 5;

/// Maximum line length before the style detector complains.
const MAX_LINE_LENGTH: usize = 120;

/// Registry mapping `(language, category)` to detectors. Detectors
/// registered under [`ANY_LANGUAGE`] run for every language; unrecognized
/// languages yield only those generic findings.
pub struct DetectorRegistry {
    detectors: HashMap<(String, Category), Vec<Detector>>,
}

impl DetectorRegistry {
    pub fn new() -> Self {
        Self {
            detectors: HashMap::new(),
        }
    }

    /// The standard detector set.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register(ANY_LANGUAGE, Category::Style, generic_style);
        registry.register(ANY_LANGUAGE, Category::Performance, nested_loops);
        registry.register(ANY_LANGUAGE, Category::Security, security_patterns);
        registry.register("python", Category::Style, python_missing_docstrings);
        registry.register("python", Category::Bug, python_bugs);
        registry.register("python", Category::Performance, python_string_concat);
        registry.register("javascript", Category::Bug, js_bugs);
        registry.register("typescript", Category::Bug, js_bugs);
        registry.register("javascript", Category::Performance, js_push_in_loop);
        registry
    }

    pub fn register(&mut self, language: &str, category: Category, detector: Detector) {
        self.detectors
            .entry((language.to_string(), category))
            .or_default()
            .push(detector);
    }

    /// Run every applicable detector for one category.
    pub fn detect_category(&self, code: &str, language: &str, category: Category) -> Vec<Finding> {
        let mut findings = Vec::new();
        for key in [
            (ANY_LANGUAGE.to_string(), category),
            (language.to_string(), category),
        ] {
            if let Some(detectors) = self.detectors.get(&key) {
                for detector in detectors {
                    findings.extend(detector(code));
                }
            }
        }
        findings
    }

    /// Run all detector categories over the given text.
    pub fn detect(&self, code: &str, language: &str) -> Vec<Finding> {
        let mut findings = Vec::new();
        for category in [
            Category::Style,
            Category::Bug,
            Category::Performance,
            Category::Security,
        ] {
            findings.extend(self.detect_category(code, language, category));
        }
        findings
    }
}

impl Default for DetectorRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

fn finding(
    category: Category,
    line: usize,
    description: String,
    suggestion: &str,
    severity: Severity,
) -> Finding {
    Finding {
        category,
        line,
        description,
        suggestion: suggestion.to_string(),
        severity,
    }
}

/// Language-independent style checks: line length and trailing whitespace.
fn generic_style(code: &str) -> Vec<Finding> {
    let mut findings = Vec::new();
    for (i, line) in code.lines().enumerate() {
        let width = line.chars().count();
        if width > MAX_LINE_LENGTH {
            findings.push(finding(
                Category::Style,
                i + 1,
                format!("Line too long ({} characters)", width),
                "Break line into multiple lines or refactor",
                Severity::Low,
            ));
        }
        if line.ends_with(' ') || line.ends_with('\t') {
            findings.push(finding(
                Category::Style,
                i + 1,
                "Trailing whitespace detected".to_string(),
                "Remove trailing whitespace",
                Severity::Low,
            ));
        }
    }
    findings
}

/// Flag function definitions not immediately followed by a docstring.
fn python_missing_docstrings(code: &str) -> Vec<Finding> {
    let lines: Vec<&str> = code.lines().collect();
    let mut findings = Vec::new();
    for (i, line) in lines.iter().enumerate() {
        if !line.trim_start().starts_with("def ") {
            continue;
        }
        if let Some(next) = lines.get(i + 1) {
            let next = next.trim_start();
            if !next.starts_with("\"\"\"") && !next.starts_with("'''") {
                findings.push(finding(
                    Category::Style,
                    i + 1,
                    "Function missing docstring".to_string(),
                    "Add docstring to document function purpose",
                    Severity::Medium,
                ));
            }
        }
    }
    findings
}

fn python_bugs(code: &str) -> Vec<Finding> {
    let mut findings = Vec::new();
    for (i, line) in code.lines().enumerate() {
        if line.contains(".get(") && !line.contains("if") && !line.contains("assert") {
            findings.push(finding(
                Category::Bug,
                i + 1,
                "Potential None value from dict.get() without null check".to_string(),
                "Add null check or provide default value",
                Severity::Medium,
            ));
        }
        if line.trim() == "except:" {
            findings.push(finding(
                Category::Bug,
                i + 1,
                "Bare except clause catches all exceptions".to_string(),
                "Specify exception types to catch",
                Severity::High,
            ));
        }
    }
    findings
}

fn js_bugs(code: &str) -> Vec<Finding> {
    let mut findings = Vec::new();
    for (i, line) in code.lines().enumerate() {
        if line.contains(" == ") && !line.contains(" === ") {
            findings.push(finding(
                Category::Bug,
                i + 1,
                "Using == instead of === for comparison".to_string(),
                "Use === for strict equality comparison",
                Severity::Medium,
            ));
        }
        if line.contains(".length") && !line.contains("if") {
            findings.push(finding(
                Category::Bug,
                i + 1,
                "Accessing .length without null/undefined check".to_string(),
                "Add null/undefined check before accessing length",
                Severity::Medium,
            ));
        }
    }
    findings
}

/// Flag a `for` with another `for` nearby. Sibling loops trip this too;
/// the window is deliberately loose.
fn nested_loops(code: &str) -> Vec<Finding> {
    let lines: Vec<&str> = code.lines().collect();
    let mut findings = Vec::new();
    for (i, line) in lines.iter().enumerate() {
        if !line.contains("for ") {
            continue;
        }
        let start = i.saturating_sub(NESTED_LOOP_WINDOW);
        let end = (i + NESTED_LOOP_WINDOW).min(lines.len());
        let has_neighbor = (start..end).any(|j| j != i && lines[j].contains("for "));
        if has_neighbor {
            findings.push(finding(
                Category::Performance,
                i + 1,
                "Nested loops detected - potential O(n^2) complexity".to_string(),
                "Consider optimizing the algorithm or using more efficient data structures",
                Severity::Medium,
            ));
        }
    }
    findings
}

fn python_string_concat(code: &str) -> Vec<Finding> {
    let mut findings = Vec::new();
    for (i, line) in code.lines().enumerate() {
        let in_loop = line.contains("for ") || line.contains("while ");
        if in_loop && line.contains("+=") && line.contains("str") {
            findings.push(finding(
                Category::Performance,
                i + 1,
                "String concatenation in loop is inefficient".to_string(),
                "Use list.join() or f-strings for better performance",
                Severity::Medium,
            ));
        }
    }
    findings
}

fn js_push_in_loop(code: &str) -> Vec<Finding> {
    let mut findings = Vec::new();
    for (i, line) in code.lines().enumerate() {
        if line.contains(".push(") && line.contains("for") {
            findings.push(finding(
                Category::Performance,
                i + 1,
                "Array.push() in loop may be inefficient".to_string(),
                "Consider pre-allocating array size or using other methods",
                Severity::Low,
            ));
        }
    }
    findings
}

/// Language-independent security patterns: SQL built by interpolation,
/// hardcoded credentials, and eval.
fn security_patterns(code: &str) -> Vec<Finding> {
    const SECRET_NAMES: &[&str] = &["password", "secret", "key", "token", "api_key"];
    let mut findings = Vec::new();
    for (i, raw) in code.lines().enumerate() {
        let line = raw.trim().to_lowercase();

        if line.contains("select")
            && (line.contains("format") || line.contains('%') || line.contains('+'))
        {
            findings.push(finding(
                Category::Security,
                i + 1,
                "Potential SQL injection vulnerability".to_string(),
                "Use parameterized queries or prepared statements",
                Severity::Critical,
            ));
        }

        for name in SECRET_NAMES {
            if line.contains(name)
                && line.contains('=')
                && (raw.contains('"') || raw.contains('\''))
            {
                findings.push(finding(
                    Category::Security,
                    i + 1,
                    format!("Potential hardcoded {} detected", name),
                    "Move sensitive data to environment variables or secure configuration",
                    Severity::High,
                ));
                break;
            }
        }

        if line.contains("eval(") {
            findings.push(finding(
                Category::Security,
                i + 1,
                "Use of eval() function is dangerous".to_string(),
                "Avoid eval() and use safer alternatives",
                Severity::Critical,
            ));
        }
    }
    findings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detectors_are_deterministic() {
        let registry = DetectorRegistry::standard();
        let code = "try:\n    pass\nexcept:\n    pass\nx = d.get('k')\n";
        let first = registry.detect(code, "python");
        let second = registry.detect(code, "python");
        assert_eq!(first, second);
    }

    #[test]
    fn test_empty_input_yields_nothing() {
        let registry = DetectorRegistry::standard();
        assert!(registry.detect("", "python").is_empty());
        assert!(registry.detect("", "").is_empty());
    }

    #[test]
    fn test_unknown_language_runs_only_generic_checks() {
        let registry = DetectorRegistry::standard();
        // Bare except is python-specific; an unknown tag must not flag it.
        let findings = registry.detect("except:\n", "cobol");
        assert!(findings.is_empty());

        let long_line = "x".repeat(130);
        let findings = registry.detect(&long_line, "cobol");
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].category, Category::Style);
    }

    #[test]
    fn test_bare_except_is_high_severity_bug() {
        let registry = DetectorRegistry::standard();
        let findings = registry.detect("try:\n    pass\nexcept:\n    pass\n", "python");
        let bare = findings
            .iter()
            .find(|f| f.description.contains("Bare except"))
            .unwrap();
        assert_eq!(bare.category, Category::Bug);
        assert_eq!(bare.severity, Severity::High);
        assert_eq!(bare.line, 3);
    }

    #[test]
    fn test_dict_get_without_check() {
        let registry = DetectorRegistry::standard();
        let findings = registry.detect("value = data.get('key')\n", "python");
        assert!(findings
            .iter()
            .any(|f| f.description.contains("dict.get()")));
    }

    #[test]
    fn test_loose_equality_in_javascript() {
        let registry = DetectorRegistry::standard();
        let findings = registry.detect("if (a == b) {\n}\n", "javascript");
        let loose = findings
            .iter()
            .find(|f| f.description.contains("=="))
            .unwrap();
        assert_eq!(loose.severity, Severity::Medium);
        // Strict equality must not be flagged.
        let clean = registry.detect("if (a === b) {\n}\n", "javascript");
        assert!(!clean.iter().any(|f| f.description.contains("== instead")));
    }

    #[test]
    fn test_loose_equality_in_typescript() {
        let registry = DetectorRegistry::standard();
        let findings = registry.detect("const same = a == b;\n", "typescript");
        assert!(findings.iter().any(|f| f.category == Category::Bug));
    }

    #[test]
    fn test_trailing_whitespace() {
        let registry = DetectorRegistry::standard();
        let findings = registry.detect("let x = 1;   \n", "rust");
        assert!(findings
            .iter()
            .any(|f| f.description.contains("Trailing whitespace")));
    }

    #[test]
    fn test_line_length_counts_characters() {
        let registry = DetectorRegistry::standard();
        let ok = "y".repeat(120);
        assert!(registry.detect(&ok, "rust").is_empty());
        let too_long = "y".repeat(121);
        assert_eq!(registry.detect(&too_long, "rust").len(), 1);
    }

    #[test]
    fn test_nested_loop_pattern_is_flagged() {
        let registry = DetectorRegistry::standard();
        let code = "for i in items:\n    for j in items:\n        pass\n";
        let findings = registry.detect(code, "python");
        assert!(findings
            .iter()
            .any(|f| f.description.contains("Nested loops")));
    }

    #[test]
    fn test_single_loop_is_not_flagged() {
        let registry = DetectorRegistry::standard();
        let code = "for i in items:\n    total += i\n";
        let findings = registry.detect(code, "python");
        assert!(!findings
            .iter()
            .any(|f| f.description.contains("Nested loops")));
    }

    #[test]
    fn test_sql_interpolation_is_critical() {
        let registry = DetectorRegistry::standard();
        let code = "query = \"SELECT * FROM users WHERE id = %s\" % user_id\n";
        let findings = registry.detect(code, "python");
        let sql = findings
            .iter()
            .find(|f| f.description.contains("SQL injection"))
            .unwrap();
        assert_eq!(sql.severity, Severity::Critical);
    }

    #[test]
    fn test_hardcoded_secret() {
        let registry = DetectorRegistry::standard();
        let findings = registry.detect("password = \"hunter2\"\n", "python");
        assert!(findings
            .iter()
            .any(|f| f.category == Category::Security && f.severity == Severity::High));
    }

    #[test]
    fn test_eval_is_critical() {
        let registry = DetectorRegistry::standard();
        let findings = registry.detect("result = eval(user_input)\n", "python");
        assert!(findings
            .iter()
            .any(|f| f.description.contains("eval()") && f.severity == Severity::Critical));
    }

    #[test]
    fn test_missing_docstring() {
        let registry = DetectorRegistry::standard();
        let code = "def add(a, b):\n    return a + b\n";
        let findings = registry.detect(code, "python");
        assert!(findings
            .iter()
            .any(|f| f.description.contains("docstring")));

        let documented = "def add(a, b):\n    \"\"\"Add two numbers.\"\"\"\n    return a + b\n";
        let findings = registry.detect(documented, "python");
        assert!(!findings
            .iter()
            .any(|f| f.description.contains("docstring")));
    }

    #[test]
    fn test_category_scoped_lookup() {
        let registry = DetectorRegistry::standard();
        let code = "except:\npassword = \"x\"\n";
        let bugs = registry.detect_category(code, "python", Category::Bug);
        assert!(bugs.iter().all(|f| f.category == Category::Bug));
        let security = registry.detect_category(code, "python", Category::Security);
        assert!(security.iter().all(|f| f.category == Category::Security));
    }
}
