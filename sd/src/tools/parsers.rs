//! Per-analyzer output parsers
//!
//! Each parser converts one tool's output into normalized findings.
//! Parsers never raise past this boundary: malformed input logs at warn
//! and yields an empty list.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Value, json};
use tracing::warn;

use findingstore::{Category, Finding, Severity};

use super::spec::ToolIdGen;

#[allow(clippy::too_many_arguments)]
fn tool_finding(
    ids: &ToolIdGen,
    tool: &str,
    category: Category,
    severity: Severity,
    file: &str,
    line: u32,
    description: String,
    suggestion: &str,
    raw: Value,
) -> Finding {
    let mut finding = Finding::new("", file, line, category, severity, description)
        .with_suggestion(suggestion)
        .with_tool(tool)
        .with_raw_output(raw);
    finding.id = ids.next(tool);
    finding
}

fn json_u32(value: &Value, key: &str) -> u32 {
    value.get(key).and_then(Value::as_u64).unwrap_or(0) as u32
}

fn json_str<'a>(value: &'a Value, key: &str) -> &'a str {
    value.get(key).and_then(Value::as_str).unwrap_or("")
}

/// radon `cc -j` output: `{file: [{name, rank, complexity, lineno}, ...]}`
///
/// Grades A and B are fine and not reported.
pub(crate) fn parse_radon(output: &str, ids: &ToolIdGen) -> Vec<Finding> {
    let data: Value = match serde_json::from_str(output) {
        Ok(data) => data,
        Err(_) => {
            warn!("Could not parse radon JSON output");
            return Vec::new();
        }
    };

    let Some(files) = data.as_object() else {
        return Vec::new();
    };

    let mut findings = Vec::new();
    for (file, functions) in files {
        for func in functions.as_array().into_iter().flatten() {
            let rank = json_str(func, "rank");
            let severity = match rank {
                "C" => Severity::Medium,
                "D" => Severity::High,
                "E" | "F" => Severity::Critical,
                _ => continue,
            };

            let name = json_str(func, "name");
            let complexity = func.get("complexity").and_then(Value::as_u64).unwrap_or(0);
            findings.push(tool_finding(
                ids,
                "radon",
                Category::Complexity,
                severity,
                file,
                json_u32(func, "lineno"),
                format!("Function '{name}' has complexity grade {rank} (CC={complexity})"),
                "Break into smaller functions",
                func.clone(),
            ));
        }
    }
    findings
}

static VULTURE_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+?):(\d+): (.+?) \((\d+)% confidence\)").expect("valid vulture pattern"));

/// vulture line format: `file.py:10: unused function 'foo' (90% confidence)`
pub(crate) fn parse_vulture(output: &str, ids: &ToolIdGen) -> Vec<Finding> {
    let mut findings = Vec::new();
    for line in output.lines() {
        let Some(caps) = VULTURE_LINE.captures(line) else {
            continue;
        };
        let confidence: u32 = caps[4].parse().unwrap_or(0);
        let severity = if confidence >= 90 {
            Severity::High
        } else if confidence >= 70 {
            Severity::Medium
        } else {
            Severity::Low
        };

        findings.push(tool_finding(
            ids,
            "vulture",
            Category::DeadCode,
            severity,
            &caps[1],
            caps[2].parse().unwrap_or(0),
            format!("{} ({confidence}% confidence)", &caps[3]),
            "Remove if no longer needed",
            json!({ "line": line }),
        ));
    }
    findings
}

/// bandit `-f json` output: `{results: [{issue_severity, filename, ...}]}`
pub(crate) fn parse_bandit(output: &str, ids: &ToolIdGen) -> Vec<Finding> {
    let data: Value = match serde_json::from_str(output) {
        Ok(data) => data,
        Err(_) => {
            warn!("Could not parse bandit JSON output");
            return Vec::new();
        }
    };

    let mut findings = Vec::new();
    for result in data.get("results").and_then(Value::as_array).into_iter().flatten() {
        // bandit severities are shifted up one level: its "high" is ours critical
        let severity = match json_str(result, "issue_severity").to_lowercase().as_str() {
            "high" => Severity::Critical,
            "medium" => Severity::High,
            "low" => Severity::Medium,
            _ => Severity::Low,
        };

        findings.push(tool_finding(
            ids,
            "bandit",
            Category::Security,
            severity,
            json_str(result, "filename"),
            json_u32(result, "line_number"),
            format!("{} [{}]", json_str(result, "issue_text"), json_str(result, "test_id")),
            json_str(result, "more_info"),
            result.clone(),
        ));
    }
    findings
}

/// ruff `--output-format json` output: an array of issues
pub(crate) fn parse_ruff(output: &str, ids: &ToolIdGen) -> Vec<Finding> {
    let data: Value = match serde_json::from_str(output) {
        Ok(data) => data,
        Err(_) => {
            warn!("Could not parse ruff JSON output");
            return Vec::new();
        }
    };

    let mut findings = Vec::new();
    for issue in data.as_array().into_iter().flatten() {
        let code = json_str(issue, "code");
        let severity = if code.starts_with('E') || code.starts_with('F') {
            Severity::High
        } else if code.starts_with('W') {
            Severity::Medium
        } else {
            Severity::Low
        };

        let line = issue.get("location").map_or(0, |loc| json_u32(loc, "row"));
        let suggestion = issue
            .get("fix")
            .and_then(|fix| fix.get("message"))
            .and_then(Value::as_str)
            .unwrap_or("");

        findings.push(tool_finding(
            ids,
            "ruff",
            Category::StyleIssues,
            severity,
            json_str(issue, "filename"),
            line,
            format!("[{code}] {}", json_str(issue, "message")),
            suggestion,
            issue.clone(),
        ));
    }
    findings
}

static MYPY_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+?):(\d+):(\d+): (error|warning|note): (.+)").expect("valid mypy pattern"));

/// mypy line format: `file.py:10:5: error: Message [error-code]`
pub(crate) fn parse_mypy(output: &str, ids: &ToolIdGen) -> Vec<Finding> {
    let mut findings = Vec::new();
    for line in output.lines() {
        let Some(caps) = MYPY_LINE.captures(line) else {
            continue;
        };
        let severity = match &caps[4] {
            "error" => Severity::High,
            "warning" => Severity::Medium,
            _ => Severity::Low,
        };

        findings.push(tool_finding(
            ids,
            "mypy",
            Category::TypeIssues,
            severity,
            &caps[1],
            caps[2].parse().unwrap_or(0),
            caps[5].to_string(),
            "Add type annotations or fix the type mismatch",
            json!({ "line": line }),
        ));
    }
    findings
}

/// jscpd JSON report: `{duplicates: [{firstFile, secondFile, lines}]}`
pub(crate) fn parse_jscpd(output: &str, ids: &ToolIdGen) -> Vec<Finding> {
    let data: Value = match serde_json::from_str(output) {
        Ok(data) => data,
        Err(_) => {
            warn!("Could not parse jscpd JSON output");
            return Vec::new();
        }
    };

    let mut findings = Vec::new();
    for dup in data.get("duplicates").and_then(Value::as_array).into_iter().flatten() {
        let lines = dup.get("lines").and_then(Value::as_u64).unwrap_or(0);
        let severity = if lines >= 50 {
            Severity::Critical
        } else if lines >= 20 {
            Severity::High
        } else if lines >= 10 {
            Severity::Medium
        } else {
            Severity::Low
        };

        let first = dup.get("firstFile").cloned().unwrap_or(Value::Null);
        let second = dup.get("secondFile").cloned().unwrap_or(Value::Null);
        findings.push(tool_finding(
            ids,
            "jscpd",
            Category::CodeDuplication,
            severity,
            json_str(&first, "name"),
            json_u32(&first, "start"),
            format!(
                "Duplicated code block ({lines} lines) also in {}:{}",
                json_str(&second, "name"),
                json_u32(&second, "start"),
            ),
            "Extract to shared function or module",
            dup.clone(),
        ));
    }
    findings
}

/// ai-slop-detector `--json` output: `{issues: [{category, severity, ...}]}`
pub(crate) fn parse_slop_detector(output: &str, ids: &ToolIdGen) -> Vec<Finding> {
    let data: Value = match serde_json::from_str(output) {
        Ok(data) => data,
        Err(_) => {
            warn!("Could not parse slop-detector JSON output");
            return Vec::new();
        }
    };

    let mut findings = Vec::new();
    for issue in data.get("issues").and_then(Value::as_array).into_iter().flatten() {
        let category = json_str(issue, "category").parse().unwrap_or(Category::AiSlop);
        let severity = json_str(issue, "severity").parse().unwrap_or(Severity::Medium);

        findings.push(tool_finding(
            ids,
            "slop-detector",
            category,
            severity,
            json_str(issue, "file"),
            json_u32(issue, "line"),
            json_str(issue, "description").to_string(),
            json_str(issue, "suggestion"),
            issue.clone(),
        ));
    }
    findings
}

/// karpeslop output: free text with an embedded JSON report
pub(crate) fn parse_karpeslop(output: &str, ids: &ToolIdGen) -> Vec<Finding> {
    let Some(start) = output.find('{') else {
        return Vec::new();
    };
    let data: Value = match serde_json::from_str(&output[start..]) {
        Ok(data) => data,
        Err(_) => {
            warn!("Could not parse karpeslop output");
            return Vec::new();
        }
    };

    let mut findings = Vec::new();
    for issue in data.get("issues").and_then(Value::as_array).into_iter().flatten() {
        let category = json_str(issue, "pattern").parse().unwrap_or(Category::AiSlop);
        let severity = json_str(issue, "severity").parse().unwrap_or(Severity::Medium);

        findings.push(tool_finding(
            ids,
            "karpeslop",
            category,
            severity,
            json_str(issue, "file"),
            json_u32(issue, "line"),
            json_str(issue, "message").to_string(),
            json_str(issue, "fix"),
            issue.clone(),
        ));
    }
    findings
}
