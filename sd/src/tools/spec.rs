//! Static analyzer table and tool-local id generation

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use findingstore::Category;

/// One external analyzer
///
/// Owned strings so tests can inject shell-backed fakes via
/// [`super::ExternalTools::with_tools`].
#[derive(Debug, Clone)]
pub struct ToolSpec {
    /// Internal name ("radon", "vulture", ...)
    pub name: String,

    /// Invocation argv; the target path is appended as the last argument
    pub cmd: Vec<String>,

    /// Availability probe argv; exit 0 means installed
    pub check_cmd: Vec<String>,

    /// Install hint for CLI listings
    pub install: String,

    /// Categories this tool detects
    pub detects: Vec<Category>,

    /// 1 = dedicated slop detector, 2 = traditional static analysis
    pub tier: u8,

    /// Supported languages; None means any
    pub languages: Option<Vec<String>>,

    /// Per-run deadline
    pub timeout: Duration,
}

impl ToolSpec {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: &str,
        cmd: &[&str],
        check_cmd: &[&str],
        install: &str,
        detects: &[Category],
        tier: u8,
        languages: Option<&[&str]>,
        timeout_secs: u64,
    ) -> Self {
        Self {
            name: name.to_string(),
            cmd: cmd.iter().map(|s| s.to_string()).collect(),
            check_cmd: check_cmd.iter().map(|s| s.to_string()).collect(),
            install: install.to_string(),
            detects: detects.to_vec(),
            tier,
            languages: languages.map(|l| l.iter().map(|s| s.to_string()).collect()),
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// Whether this tool can analyze files of the given language
    pub fn supports_language(&self, language: Option<&str>) -> bool {
        match &self.languages {
            None => true,
            Some(langs) => language.is_some_and(|l| langs.iter().any(|s| s == l)),
        }
    }
}

/// The production analyzer set
pub fn default_tools() -> Vec<ToolSpec> {
    vec![
        // Tier 1: dedicated slop detectors
        ToolSpec::new(
            "slop-detector",
            &["slop-detector", "--json", "--project"],
            &["slop-detector", "--version"],
            "pip install ai-slop-detector",
            &[Category::PlaceholderCode, Category::AiSlop, Category::DocstringInflation, Category::HallucinatedImports],
            1,
            Some(&["python"]),
            300,
        ),
        ToolSpec::new(
            "karpeslop",
            &["npx", "karpeslop@latest", "--quiet"],
            &["npx", "karpeslop@latest", "--version"],
            "npx karpeslop@latest",
            &[Category::HallucinatedImports, Category::AiSlop],
            1,
            Some(&["typescript", "javascript", "tsx", "jsx"]),
            60,
        ),
        // Tier 2: traditional static analysis
        ToolSpec::new(
            "jscpd",
            &["npx", "jscpd", "--reporters", "json", "--output", "/dev/stdout"],
            &["npx", "jscpd", "--version"],
            "npm install -g jscpd",
            &[Category::CodeDuplication],
            2,
            None,
            300,
        ),
        ToolSpec::new(
            "radon",
            &["radon", "cc", "-j"],
            &["radon", "--version"],
            "pip install radon",
            &[Category::Complexity],
            2,
            Some(&["python"]),
            60,
        ),
        ToolSpec::new(
            "vulture",
            &["vulture", "--min-confidence", "80"],
            &["vulture", "--version"],
            "pip install vulture",
            &[Category::DeadCode],
            2,
            Some(&["python"]),
            300,
        ),
        ToolSpec::new(
            "mypy",
            &["mypy", "--no-error-summary", "--show-column-numbers"],
            &["mypy", "--version"],
            "pip install mypy",
            &[Category::TypeIssues],
            2,
            Some(&["python"]),
            300,
        ),
        ToolSpec::new(
            "bandit",
            &["bandit", "-f", "json", "-r"],
            &["bandit", "--version"],
            "pip install bandit",
            &[Category::Security],
            2,
            Some(&["python"]),
            60,
        ),
        ToolSpec::new(
            "ruff",
            &["ruff", "check", "--output-format", "json"],
            &["ruff", "--version"],
            "pip install ruff",
            &[Category::StyleIssues],
            2,
            Some(&["python"]),
            30,
        ),
    ]
}

/// Map a file extension to its language name
pub fn language_for(path: &str) -> Option<&'static str> {
    match Path::new(path).extension()?.to_str()?.to_lowercase().as_str() {
        "py" => Some("python"),
        "ts" => Some("typescript"),
        "tsx" => Some("tsx"),
        "js" => Some("javascript"),
        "jsx" => Some("jsx"),
        _ => None,
    }
}

/// Sequence generator for tool-qualified finding ids
///
/// Ids like `slop-radon-0001` identify hints inside a prompt; the store
/// assigns its own id if a tool finding is ever persisted.
#[derive(Debug, Default)]
pub struct ToolIdGen {
    counter: AtomicU64,
}

impl ToolIdGen {
    pub fn next(&self, tool: &str) -> String {
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        format!("slop-{tool}-{n:04}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_mapping() {
        assert_eq!(language_for("server/main.py"), Some("python"));
        assert_eq!(language_for("web/app.tsx"), Some("tsx"));
        assert_eq!(language_for("README.md"), None);
        assert_eq!(language_for("Makefile"), None);
    }

    #[test]
    fn test_supports_language() {
        let tools = default_tools();
        let radon = tools.iter().find(|t| t.name == "radon").unwrap();
        assert!(radon.supports_language(Some("python")));
        assert!(!radon.supports_language(Some("typescript")));
        assert!(!radon.supports_language(None));

        let jscpd = tools.iter().find(|t| t.name == "jscpd").unwrap();
        assert!(jscpd.supports_language(Some("python")));
        assert!(jscpd.supports_language(None));
    }

    #[test]
    fn test_tool_id_sequence() {
        let ids = ToolIdGen::default();
        assert_eq!(ids.next("radon"), "slop-radon-0001");
        assert_eq!(ids.next("radon"), "slop-radon-0002");
        assert_eq!(ids.next("vulture"), "slop-vulture-0003");
    }
}
