//! Backend descriptors and LLM response types

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use findingstore::now_ms;

/// One command-line LLM backend
///
/// Owned strings so tests can inject shell-backed fakes via
/// [`super::AiRouter::with_backends`].
#[derive(Debug, Clone)]
pub struct BackendSpec {
    /// Internal name ("claude", "gemini", ...)
    pub name: String,

    /// Invocation argv; the prompt arrives on stdin
    pub cmd: Vec<String>,

    /// Availability probe argv; exit 0 means usable
    pub check_cmd: Vec<String>,

    /// Per-call deadline unless the caller overrides it
    pub timeout: Duration,

    /// Human description for CLI listings
    pub description: String,
}

impl BackendSpec {
    pub fn new(name: &str, cmd: &[&str], check_cmd: &[&str], timeout_secs: u64, description: &str) -> Self {
        Self {
            name: name.to_string(),
            cmd: cmd.iter().map(|s| s.to_string()).collect(),
            check_cmd: check_cmd.iter().map(|s| s.to_string()).collect(),
            timeout: Duration::from_secs(timeout_secs),
            description: description.to_string(),
        }
    }
}

/// The production backend set, in priority order
pub fn default_backends() -> Vec<BackendSpec> {
    vec![
        BackendSpec::new(
            "claude",
            &["claude", "--print", "--dangerously-skip-permissions"],
            &["claude", "--version"],
            120,
            "Anthropic Claude via CLI",
        ),
        BackendSpec::new(
            "gemini",
            &["gemini", "--model", "gemini-2.5-pro", "--output-format", "text"],
            &["gemini", "--version"],
            60,
            "Google Gemini via Vertex AI",
        ),
        BackendSpec::new(
            "codex",
            &["codex", "--quiet", "--approval-mode", "full-auto"],
            &["codex", "--version"],
            120,
            "OpenAI Codex CLI",
        ),
        BackendSpec::new(
            "opencode",
            &["opencode", "--non-interactive"],
            &["opencode", "--version"],
            120,
            "OpenCode CLI",
        ),
    ]
}

/// One finding as reported by a backend, before normalization
///
/// Every field is defaulted: backends routinely omit keys, and the
/// owning loop coerces category and severity afterwards.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmFinding {
    #[serde(default)]
    pub file: String,
    #[serde(default)]
    pub line: u32,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub severity: String,
    #[serde(default)]
    pub suggestion: String,
}

/// Result of one backend invocation
#[derive(Debug, Clone)]
pub struct LlmResponse {
    /// Raw text from the backend (empty on failure)
    pub text: String,

    /// Parsed findings; empty when the reply was not valid JSON
    pub findings: Vec<LlmFinding>,

    /// Whether the backend declared the scan complete
    pub done: bool,

    /// Backend that produced this response
    pub backend: String,

    /// Measured call latency
    pub latency_ms: u64,

    /// False on timeout or non-zero exit
    pub success: bool,

    /// Error detail when `success` is false
    pub error: Option<String>,

    /// Response time (Unix ms)
    pub timestamp: i64,
}

impl LlmResponse {
    pub(crate) fn failure(backend: &str, latency_ms: u64, error: impl Into<String>) -> Self {
        Self {
            text: String::new(),
            findings: Vec::new(),
            done: false,
            backend: backend.to_string(),
            latency_ms,
            success: false,
            error: Some(error.into()),
            timestamp: now_ms(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ReplyDoc {
    #[serde(default)]
    findings: Vec<LlmFinding>,
    #[serde(default)]
    done: bool,
}

/// Fixed JSON-output contract appended to every analysis prompt
pub(crate) const JSON_CONTRACT: &str = r#"IMPORTANT: Return your response as valid JSON with this structure:
{
    "findings": [
        {
            "file": "path/to/file.py",
            "line": 123,
            "category": "unused_imports|dead_code|bare_except|security|...",
            "description": "Description of the issue",
            "severity": "critical|high|medium|low",
            "suggestion": "Actionable fix (e.g., 'Remove import on line 42')"
        }
    ],
    "done": true
}

Set "done" to true when you've found all issues or confirmed none exist.

Category guidelines:
- unused_imports: Import statements that are never used
- unused_variables: Variables assigned but never read
- dead_code: Functions/classes never called, unreachable code
- bare_except: Using 'except:' without specifying exception type
- empty_except: Exception handlers that do nothing (pass)
- security: Hardcoded secrets, injection vulnerabilities
- race_conditions: Concurrent access without synchronization
- memory_leaks: Unbounded caches, unclosed resources

If no issues found, return: {"findings": [], "done": true}"#;

/// Parse a backend reply into findings and the done flag
///
/// Tolerates one level of markdown code-fence wrapping. A reply that is
/// not JSON yields no findings and `done = false`; the call itself is
/// still considered successful.
pub(crate) fn parse_reply(backend: &str, text: &str) -> (Vec<LlmFinding>, bool) {
    let body = extract_json(text);
    match serde_json::from_str::<ReplyDoc>(body.trim()) {
        Ok(doc) => (doc.findings, doc.done),
        Err(e) => {
            warn!(%backend, error = %e, "Could not parse JSON from backend response");
            (Vec::new(), false)
        }
    }
}

fn extract_json(text: &str) -> &str {
    if let Some(idx) = text.find("```json") {
        let rest = &text[idx + 7..];
        return rest.find("```").map_or(rest, |end| &rest[..end]);
    }
    if let Some(idx) = text.find("```") {
        let rest = &text[idx + 3..];
        return rest.find("```").map_or(rest, |end| &rest[..end]);
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_json() {
        let (findings, done) = parse_reply(
            "claude",
            r#"{"findings": [{"file": "a.py", "line": 1, "category": "dead_code", "description": "x", "severity": "low", "suggestion": "remove"}], "done": true}"#,
        );
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].file, "a.py");
        assert!(done);
    }

    #[test]
    fn test_parse_json_fenced() {
        let text = "Here is my analysis:\n```json\n{\"findings\": [], \"done\": true}\n```\nDone.";
        let (findings, done) = parse_reply("claude", text);
        assert!(findings.is_empty());
        assert!(done);
    }

    #[test]
    fn test_parse_bare_fenced() {
        let text = "```\n{\"findings\": [], \"done\": false}\n```";
        let (_, done) = parse_reply("claude", text);
        assert!(!done);
    }

    #[test]
    fn test_parse_non_json_yields_empty_not_done() {
        let (findings, done) = parse_reply("claude", "I could not find any issues, great job!");
        assert!(findings.is_empty());
        assert!(!done);
    }

    #[test]
    fn test_parse_tolerates_missing_fields() {
        let (findings, done) = parse_reply("claude", r#"{"findings": [{"file": "a.py"}]}"#);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].line, 0);
        assert_eq!(findings[0].category, "");
        assert!(!done);
    }

    #[test]
    fn test_default_backends_priority_order() {
        let names: Vec<_> = default_backends().into_iter().map(|b| b.name).collect();
        assert_eq!(names, ["claude", "gemini", "codex", "opencode"]);
    }
}
