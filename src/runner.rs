//! Golden Test Runner
//!
//! Loads `.tests` files and checks every case against the parser:
//! - `=== name` starts a case; input runs up to `---`
//! - expected s-expressions run up to the next `---`, `=== ` or EOF
//! - `<error>` and `<infinite>` expect the parse to fail
//! - a first input line of `# @extglob` enables extended globs
//!
//! Each case runs on a blocking worker under a wall-clock timeout.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use lazy_static::lazy_static;
use regex_lite::Regex;
use serde::Serialize;
use similar::{ChangeTag, TextDiff};

use crate::parser::parse;

const EXTGLOB_DIRECTIVE: &str = "# @extglob\n";

lazy_static! {
    static ref WHITESPACE_RUN: Regex = Regex::new(r"\s+").unwrap();
}

// =============================================================================
// TEST FILES
// =============================================================================

/// One `=== name` block of a `.tests` file
#[derive(Debug, Clone, PartialEq)]
pub struct TestCase {
    pub name: String,
    pub input: String,
    pub expected: String,
    pub file: PathBuf,
    /// 1-based line of the `===` header
    pub line: usize,
}

impl TestCase {
    /// Input with the extglob directive removed, and whether it was present
    pub fn source(&self) -> (&str, bool) {
        match self.input.strip_prefix(EXTGLOB_DIRECTIVE) {
            Some(rest) => (rest, true),
            None => (self.input.as_str(), false),
        }
    }

    pub fn expects_error(&self) -> bool {
        matches!(normalize(&self.expected).as_str(), "<error>" | "<infinite>")
    }

    pub fn matches_filter(&self, filter: &str) -> bool {
        self.name.contains(filter) || self.file.to_string_lossy().contains(filter)
    }
}

/// Every `*.tests` file under `path`, sorted. A file path is returned as is.
pub fn find_test_files(path: &Path) -> Result<Vec<PathBuf>, String> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    let pattern = format!("{}/**/*.tests", path.display());
    let mut files = Vec::new();
    match glob::glob(&pattern) {
        Ok(paths) => {
            for entry in paths {
                match entry {
                    Ok(file) => files.push(file),
                    Err(_) => continue,
                }
            }
        }
        Err(e) => return Err(e.to_string()),
    }
    files.sort();
    Ok(files)
}

pub fn parse_test_file(content: &str, file: &Path) -> Vec<TestCase> {
    let lines: Vec<&str> = content.split('\n').collect();
    let n = lines.len();
    let mut cases = Vec::new();
    let mut i = 0;
    while i < n {
        let line = lines[i];
        let Some(header) = line.strip_prefix("=== ") else {
            i += 1;
            continue;
        };
        let start_line = i + 1;
        i += 1;

        let mut input_lines = Vec::new();
        while i < n && lines[i] != "---" {
            input_lines.push(lines[i]);
            i += 1;
        }
        if i < n {
            i += 1;
        }

        let mut expected_lines = Vec::new();
        while i < n && lines[i] != "---" && !lines[i].starts_with("=== ") {
            expected_lines.push(lines[i]);
            i += 1;
        }
        if i < n && lines[i] == "---" {
            i += 1;
        }
        while expected_lines.last().is_some_and(|l| l.trim().is_empty()) {
            expected_lines.pop();
        }

        cases.push(TestCase {
            name: header.trim().to_string(),
            input: input_lines.join("\n"),
            expected: expected_lines.join("\n"),
            file: file.to_path_buf(),
            line: start_line,
        });
    }
    cases
}

/// Collapse whitespace runs to one space and trim
pub fn normalize(s: &str) -> String {
    WHITESPACE_RUN.replace_all(s, " ").trim().to_string()
}

// =============================================================================
// EXECUTION
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Pass,
    /// Rendered output differs, or a parse succeeded where an error was expected
    Fail,
    /// Unexpected parse error
    Error,
    Timeout,
    /// The parser panicked
    Crash,
}

#[derive(Debug, Clone, Serialize)]
pub struct CaseResult {
    pub name: String,
    pub file: String,
    pub line: usize,
    pub outcome: Outcome,
    pub input: String,
    pub expected: String,
    pub actual: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CaseResult {
    fn new(case: &TestCase, outcome: Outcome, actual: String, error: Option<String>) -> Self {
        Self {
            name: case.name.clone(),
            file: case.file.display().to_string(),
            line: case.line,
            outcome,
            input: case.input.clone(),
            expected: case.expected.clone(),
            actual,
            error,
        }
    }

    pub fn passed(&self) -> bool {
        self.outcome == Outcome::Pass
    }
}

/// Render the parse of `source` the way expectations are written
pub fn render(source: &str, extglob: bool) -> Result<String, crate::ParseError> {
    let nodes = parse(source, extglob)?;
    Ok(nodes
        .iter()
        .map(|n| n.to_sexp())
        .collect::<Vec<_>>()
        .join(" "))
}

/// Parse one case on the calling thread
pub fn run_case_blocking(case: &TestCase) -> CaseResult {
    let (source, extglob) = case.source();
    match render(source, extglob) {
        Ok(actual) => {
            if case.expects_error() {
                let msg = "Expected parse error but got successful parse".to_string();
                CaseResult::new(case, Outcome::Fail, actual, Some(msg))
            } else if normalize(&actual) == normalize(&case.expected) {
                CaseResult::new(case, Outcome::Pass, actual, None)
            } else {
                CaseResult::new(case, Outcome::Fail, actual, None)
            }
        }
        Err(e) if case.expects_error() => {
            CaseResult::new(case, Outcome::Pass, "<error>".to_string(), Some(e.to_string()))
        }
        Err(e) => CaseResult::new(
            case,
            Outcome::Error,
            "<parse error>".to_string(),
            Some(e.to_string()),
        ),
    }
}

/// Parse one case on a blocking worker. A case still running after
/// `timeout` is abandoned and reported as [`Outcome::Timeout`].
pub async fn run_case(case: TestCase, timeout: Duration) -> CaseResult {
    let worker_case = case.clone();
    let handle = tokio::task::spawn_blocking(move || run_case_blocking(&worker_case));
    match tokio::time::timeout(timeout, handle).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => CaseResult::new(
            &case,
            Outcome::Crash,
            "<exception>".to_string(),
            Some(e.to_string()),
        ),
        Err(_) => CaseResult::new(
            &case,
            Outcome::Timeout,
            "<timeout>".to_string(),
            Some(format!("Timed out after {}s", timeout.as_secs_f64())),
        ),
    }
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub filter: Option<String>,
    pub timeout: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            filter: None,
            timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub passed: usize,
    pub failed: usize,
    pub elapsed_secs: f64,
    pub results: Vec<CaseResult>,
}

impl Report {
    pub fn failures(&self) -> impl Iterator<Item = &CaseResult> {
        self.results.iter().filter(|r| !r.passed())
    }

    pub fn summary(&self) -> String {
        format!(
            "{} passed, {} failed in {:.2}s",
            self.passed, self.failed, self.elapsed_secs
        )
    }
}

/// Run every case of `files`, in order. Unreadable files count as one failure.
pub async fn run_files(files: &[PathBuf], options: &RunOptions) -> Report {
    let start = Instant::now();
    let mut results = Vec::new();
    let mut unreadable = 0;
    for file in files {
        let content = match std::fs::read_to_string(file) {
            Ok(content) => content,
            Err(e) => {
                eprintln!("Error: Cannot read test file: {}: {}", file.display(), e);
                unreadable += 1;
                continue;
            }
        };
        for case in parse_test_file(&content, file) {
            if let Some(filter) = &options.filter {
                if !case.matches_filter(filter) {
                    continue;
                }
            }
            results.push(run_case(case, options.timeout).await);
        }
    }
    let passed = results.iter().filter(|r| r.passed()).count();
    Report {
        passed,
        failed: results.len() - passed + unreadable,
        elapsed_secs: start.elapsed().as_secs_f64(),
        results,
    }
}

// =============================================================================
// REPORTING
// =============================================================================

/// Human-readable description of a failed case
pub fn format_failure(result: &CaseResult) -> String {
    let mut out = String::new();
    out.push_str(&format!("\n{}:{} {}\n", result.file, result.line, result.name));
    out.push_str(&format!("  Outcome:  {:?}\n", result.outcome));
    out.push_str(&format!("  Input:    {:?}\n", result.input));
    out.push_str(&format!("  Expected: {}\n", result.expected));
    out.push_str(&format!("  Actual:   {}\n", result.actual));
    if let Some(error) = &result.error {
        out.push_str(&format!("  Error:    {}\n", error));
    }
    if result.outcome == Outcome::Fail && !result.expected.is_empty() {
        out.push_str(&format_diff(&result.expected, &result.actual));
    }
    out
}

/// Line diff of the normalized expected and actual output, one
/// s-expression per line
fn format_diff(expected: &str, actual: &str) -> String {
    let split = |s: &str| normalize(s).replace(") (", ")\n(") + "\n";
    let (expected, actual) = (split(expected), split(actual));
    let diff = TextDiff::from_lines(&expected, &actual);
    let mut out = String::new();
    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => "-",
            ChangeTag::Insert => "+",
            ChangeTag::Equal => " ",
        };
        out.push_str("    ");
        out.push_str(sign);
        out.push_str(change.value());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
# leading comment

=== simple command
echo hi
---
(command (word \"echo\") (word \"hi\"))
---

=== unterminated quote
echo 'oops
---
<error>
---
=== extglob pattern
# @extglob
echo @(a|b)
---
(command (word \"echo\")
  (word \"@(a|b)\"))


=== no end marker
a && b
---
(and (command (word \"a\")) (command (word \"b\")))
";

    fn cases() -> Vec<TestCase> {
        parse_test_file(SAMPLE, Path::new("tests/parser/sample.tests"))
    }

    #[test]
    fn test_parse_test_file() {
        let cases = cases();
        assert_eq!(cases.len(), 4);
        assert_eq!(cases[0].name, "simple command");
        assert_eq!(cases[0].input, "echo hi");
        assert_eq!(cases[0].line, 3);
        assert_eq!(cases[2].input, "# @extglob\necho @(a|b)");
        assert_eq!(cases[2].expected, "(command (word \"echo\")\n  (word \"@(a|b)\"))");
        assert_eq!(
            cases[3].expected,
            "(and (command (word \"a\")) (command (word \"b\")))"
        );
    }

    #[test]
    fn test_source_strips_extglob_directive() {
        let cases = cases();
        assert_eq!(cases[0].source(), ("echo hi", false));
        assert_eq!(cases[2].source(), ("echo @(a|b)", true));
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("  (a\n   b)\t(c) \n"), "(a b) (c)");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn test_expects_error() {
        let cases = cases();
        assert!(cases[1].expects_error());
        assert!(!cases[0].expects_error());
    }

    #[test]
    fn test_run_case_blocking_outcomes() {
        for case in cases() {
            let result = run_case_blocking(&case);
            assert_eq!(result.outcome, Outcome::Pass, "{}", format_failure(&result));
        }

        let mut wrong = cases()[0].clone();
        wrong.expected = "(command (word \"echo\"))".to_string();
        let result = run_case_blocking(&wrong);
        assert_eq!(result.outcome, Outcome::Fail);
        assert!(format_failure(&result).contains("+(word \"hi\"))"));

        let mut no_error = cases()[0].clone();
        no_error.expected = "<infinite>".to_string();
        assert_eq!(run_case_blocking(&no_error).outcome, Outcome::Fail);

        let mut unexpected = cases()[1].clone();
        unexpected.expected = "(command)".to_string();
        assert_eq!(run_case_blocking(&unexpected).outcome, Outcome::Error);
    }

    #[test]
    fn test_filter() {
        let cases = cases();
        assert!(cases[0].matches_filter("simple"));
        assert!(cases[0].matches_filter("sample.tests"));
        assert!(!cases[0].matches_filter("heredoc"));
    }

    #[tokio::test]
    async fn test_run_case_on_worker() {
        let case = cases().remove(0);
        let result = run_case(case, Duration::from_secs(10)).await;
        assert!(result.passed());
    }

    #[test]
    fn test_report_json() {
        let cases = cases();
        let report = Report {
            passed: 1,
            failed: 0,
            elapsed_secs: 0.5,
            results: vec![run_case_blocking(&cases[0])],
        };
        assert_eq!(report.summary(), "1 passed, 0 failed in 0.50s");
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["results"][0]["outcome"], "pass");
        assert!(json["results"][0].get("error").is_none());
    }
}
