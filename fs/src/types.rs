//! Row types and query parameters for the findings store

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{generate_finding_id, now_ms};

/// A string failed to parse into one of the closed enums
#[derive(Debug, thiserror::Error)]
#[error("unrecognized value: '{value}'")]
pub struct ParseEnumError {
    /// The offending input
    pub value: String,
}

/// Finding severity, ordered worst-first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

impl Severity {
    /// Canonical lowercase form (matches the stored column value)
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Severity {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "critical" => Ok(Self::Critical),
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            other => Err(ParseEnumError { value: other.to_string() }),
        }
    }
}

/// Finding lifecycle status
///
/// `open → acknowledged → fixed`, with `false_positive` as a terminal
/// alternative from any prior state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingStatus {
    #[default]
    Open,
    Acknowledged,
    Fixed,
    FalsePositive,
}

impl FindingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Acknowledged => "acknowledged",
            Self::Fixed => "fixed",
            Self::FalsePositive => "false_positive",
        }
    }
}

impl fmt::Display for FindingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for FindingStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(Self::Open),
            "acknowledged" => Ok(Self::Acknowledged),
            "fixed" => Ok(Self::Fixed),
            "false_positive" => Ok(Self::FalsePositive),
            other => Err(ParseEnumError { value: other.to_string() }),
        }
    }
}

/// Closed set of defect categories across every loop and analyzer
///
/// LLM output may carry arbitrary category strings; anything that does
/// not parse is coerced by the owning loop to its primary category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    MemoryLeaks,
    DeadCode,
    UnusedImports,
    UnusedVariables,
    UnreachableCode,
    RaceConditions,
    HallucinatedImports,
    CodeDuplication,
    AiSlop,
    PlaceholderCode,
    DocstringInflation,
    Complexity,
    Security,
    ExceptionHandling,
    BareExcept,
    EmptyExcept,
    Verbosity,
    StyleIssues,
    TypeIssues,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MemoryLeaks => "memory_leaks",
            Self::DeadCode => "dead_code",
            Self::UnusedImports => "unused_imports",
            Self::UnusedVariables => "unused_variables",
            Self::UnreachableCode => "unreachable_code",
            Self::RaceConditions => "race_conditions",
            Self::HallucinatedImports => "hallucinated_imports",
            Self::CodeDuplication => "code_duplication",
            Self::AiSlop => "ai_slop",
            Self::PlaceholderCode => "placeholder_code",
            Self::DocstringInflation => "docstring_inflation",
            Self::Complexity => "complexity",
            Self::Security => "security",
            Self::ExceptionHandling => "exception_handling",
            Self::BareExcept => "bare_except",
            Self::EmptyExcept => "empty_except",
            Self::Verbosity => "verbosity",
            Self::StyleIssues => "style_issues",
            Self::TypeIssues => "type_issues",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Category {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "memory_leaks" => Ok(Self::MemoryLeaks),
            "dead_code" => Ok(Self::DeadCode),
            "unused_imports" => Ok(Self::UnusedImports),
            "unused_variables" => Ok(Self::UnusedVariables),
            "unreachable_code" => Ok(Self::UnreachableCode),
            "race_conditions" => Ok(Self::RaceConditions),
            "hallucinated_imports" => Ok(Self::HallucinatedImports),
            "code_duplication" => Ok(Self::CodeDuplication),
            "ai_slop" => Ok(Self::AiSlop),
            "placeholder_code" => Ok(Self::PlaceholderCode),
            "docstring_inflation" => Ok(Self::DocstringInflation),
            "complexity" => Ok(Self::Complexity),
            "security" => Ok(Self::Security),
            "exception_handling" => Ok(Self::ExceptionHandling),
            "bare_except" => Ok(Self::BareExcept),
            "empty_except" => Ok(Self::EmptyExcept),
            "verbosity" => Ok(Self::Verbosity),
            "style_issues" => Ok(Self::StyleIssues),
            "type_issues" => Ok(Self::TypeIssues),
            other => Err(ParseEnumError { value: other.to_string() }),
        }
    }
}

/// A single persisted defect report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    /// Store-assigned identifier (`slop-<hex>`)
    pub id: String,

    /// Name of the loop that produced this finding
    #[serde(rename = "loop")]
    pub loop_name: String,

    /// File path, relative to the scanned root
    pub file: String,

    /// 1-based line number, 0 when unknown
    pub line: u32,

    /// Defect category
    pub category: Category,

    /// Severity
    pub severity: Severity,

    /// Human-readable description of the issue
    pub description: String,

    /// Actionable fix suggestion
    #[serde(default)]
    pub suggestion: String,

    /// Analyzer that produced this finding; empty for LLM-originated ones
    #[serde(default)]
    pub tool: String,

    /// Opaque analyzer payload, serialized to JSON text on store
    #[serde(default)]
    pub raw_output: Value,

    /// First detection time (Unix ms); never reset by re-observation
    pub detected_at: i64,

    /// Most recent observation time (Unix ms)
    pub last_seen_at: i64,

    /// Lifecycle status
    #[serde(default)]
    pub status: FindingStatus,

    /// Set when the finding is first acknowledged
    #[serde(default)]
    pub acknowledged_at: Option<i64>,

    /// Set when the finding is first marked fixed
    #[serde(default)]
    pub fixed_at: Option<i64>,

    /// Commit the finding was observed at, if known
    #[serde(default)]
    pub git_commit: Option<String>,
}

impl Finding {
    /// Create a new open finding stamped with the current time
    pub fn new(
        loop_name: impl Into<String>,
        file: impl Into<String>,
        line: u32,
        category: Category,
        severity: Severity,
        description: impl Into<String>,
    ) -> Self {
        let now = now_ms();
        Self {
            id: generate_finding_id(),
            loop_name: loop_name.into(),
            file: file.into(),
            line,
            category,
            severity,
            description: description.into(),
            suggestion: String::new(),
            tool: String::new(),
            raw_output: Value::Null,
            detected_at: now,
            last_seen_at: now,
            status: FindingStatus::Open,
            acknowledged_at: None,
            fixed_at: None,
            git_commit: None,
        }
    }

    /// Builder method to set the suggestion
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = suggestion.into();
        self
    }

    /// Builder method to set the originating tool
    pub fn with_tool(mut self, tool: impl Into<String>) -> Self {
        self.tool = tool.into();
        self
    }

    /// Builder method to attach the raw analyzer payload
    pub fn with_raw_output(mut self, raw: Value) -> Self {
        self.raw_output = raw;
        self
    }
}

/// Exact-match and substring filters for `FindingStore::list`
#[derive(Debug, Clone, Default)]
pub struct FindingFilter {
    /// Exact loop name
    pub loop_name: Option<String>,
    /// Exact file path
    pub file: Option<String>,
    /// Exact category
    pub category: Option<Category>,
    /// Exact severity
    pub severity: Option<Severity>,
    /// Exact status
    pub status: Option<FindingStatus>,
    /// Substring match on file path
    pub file_like: Option<String>,
    /// Substring match on description
    pub description_like: Option<String>,
}

impl FindingFilter {
    pub fn loop_name(mut self, name: impl Into<String>) -> Self {
        self.loop_name = Some(name.into());
        self
    }

    pub fn file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }

    pub fn category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn status(mut self, status: FindingStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn file_like(mut self, fragment: impl Into<String>) -> Self {
        self.file_like = Some(fragment.into());
        self
    }

    pub fn description_like(mut self, fragment: impl Into<String>) -> Self {
        self.description_like = Some(fragment.into());
        self
    }
}

/// Allow-listed sort orders for `FindingStore::list`
///
/// Untrusted strings enter only through [`OrderBy::parse`], which maps
/// anything outside the allow-list to the default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderBy {
    #[default]
    DetectedAtDesc,
    DetectedAtAsc,
    LastSeenAtDesc,
    LastSeenAtAsc,
    SeverityDesc,
    SeverityAsc,
    CategoryDesc,
    CategoryAsc,
    StatusDesc,
    StatusAsc,
    FileDesc,
    FileAsc,
    LoopDesc,
    LoopAsc,
}

impl OrderBy {
    /// Parse an untrusted string; unrecognized input yields the default
    pub fn parse(s: &str) -> Self {
        match s.trim() {
            "detected_at" | "detected_at ASC" => Self::DetectedAtAsc,
            "detected_at DESC" => Self::DetectedAtDesc,
            "last_seen_at" | "last_seen_at ASC" => Self::LastSeenAtAsc,
            "last_seen_at DESC" => Self::LastSeenAtDesc,
            "severity" | "severity ASC" => Self::SeverityAsc,
            "severity DESC" => Self::SeverityDesc,
            "category" | "category ASC" => Self::CategoryAsc,
            "category DESC" => Self::CategoryDesc,
            "status" | "status ASC" => Self::StatusAsc,
            "status DESC" => Self::StatusDesc,
            "file" | "file ASC" => Self::FileAsc,
            "file DESC" => Self::FileDesc,
            "loop" | "loop ASC" => Self::LoopAsc,
            "loop DESC" => Self::LoopDesc,
            _ => Self::default(),
        }
    }

    /// The ORDER BY fragment this variant maps to
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::DetectedAtDesc => "detected_at DESC",
            Self::DetectedAtAsc => "detected_at ASC",
            Self::LastSeenAtDesc => "last_seen_at DESC",
            Self::LastSeenAtAsc => "last_seen_at ASC",
            Self::SeverityDesc => "severity DESC",
            Self::SeverityAsc => "severity ASC",
            Self::CategoryDesc => "category DESC",
            Self::CategoryAsc => "category ASC",
            Self::StatusDesc => "status DESC",
            Self::StatusAsc => "status ASC",
            Self::FileDesc => "file DESC",
            Self::FileAsc => "file ASC",
            Self::LoopDesc => "loop DESC",
            Self::LoopAsc => "loop ASC",
        }
    }
}

/// One orchestrated scan, recorded when the pass finishes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanRecord {
    /// Auto-assigned row id
    pub id: i64,
    /// Scan type label ("all", "specific", ...)
    pub scan_type: String,
    /// Loop names actually run, in execution order
    pub loops_run: Vec<String>,
    /// Number of files scanned
    pub files_scanned: u32,
    /// Total findings produced by the pass
    pub findings_count: u32,
    /// Wall-clock duration of the pass
    pub duration_ms: u64,
    /// Pass start time (Unix ms)
    pub started_at: i64,
    /// Pass end time (Unix ms)
    pub completed_at: i64,
}

/// One loop execution, recorded at loop termination
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopRunRecord {
    /// Auto-assigned row id
    pub id: i64,
    /// Loop name
    pub loop_name: String,
    /// Terminal status ("done", "stopped", "error")
    pub status: String,
    /// Iterations executed
    pub iterations: u32,
    /// Findings buffered during the pass
    pub findings_count: u32,
    /// Wall-clock duration of the run
    pub duration_ms: u64,
    /// Error message for "error" runs
    pub error: Option<String>,
    /// Run end time (Unix ms)
    pub completed_at: i64,
}

/// Aggregate counts over the findings table
#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreStats {
    /// Total row count
    pub total: u64,
    /// Counts grouped by loop name
    pub by_loop: HashMap<String, u64>,
    /// Counts grouped by category
    pub by_category: HashMap<String, u64>,
    /// Counts grouped by severity
    pub by_severity: HashMap<String, u64>,
    /// Counts grouped by status
    pub by_status: HashMap<String, u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_round_trip() {
        for s in ["critical", "high", "medium", "low"] {
            let parsed: Severity = s.parse().unwrap();
            assert_eq!(parsed.to_string(), s);
        }
        assert!("urgent".parse::<Severity>().is_err());
    }

    #[test]
    fn test_status_round_trip() {
        for s in ["open", "acknowledged", "fixed", "false_positive"] {
            let parsed: FindingStatus = s.parse().unwrap();
            assert_eq!(parsed.to_string(), s);
        }
        assert!("closed".parse::<FindingStatus>().is_err());
    }

    #[test]
    fn test_category_rejects_unknown() {
        assert!("general".parse::<Category>().is_err());
        assert_eq!("memory_leaks".parse::<Category>().unwrap(), Category::MemoryLeaks);
    }

    #[test]
    fn test_order_by_rejects_injection() {
        let order = OrderBy::parse("DROP TABLE findings; --");
        assert_eq!(order, OrderBy::DetectedAtDesc);
        assert_eq!(order.as_sql(), "detected_at DESC");
    }

    #[test]
    fn test_order_by_accepts_allow_listed_forms() {
        assert_eq!(OrderBy::parse("severity DESC"), OrderBy::SeverityDesc);
        assert_eq!(OrderBy::parse("file"), OrderBy::FileAsc);
        assert_eq!(OrderBy::parse("last_seen_at DESC"), OrderBy::LastSeenAtDesc);
    }

    #[test]
    fn test_finding_builder() {
        let f = Finding::new("leaky", "a.py", 10, Category::MemoryLeaks, Severity::High, "cache grows")
            .with_suggestion("Add a max size")
            .with_tool("radon");
        assert!(f.id.starts_with("slop-"));
        assert_eq!(f.status, FindingStatus::Open);
        assert_eq!(f.detected_at, f.last_seen_at);
        assert_eq!(f.suggestion, "Add a max size");
        assert_eq!(f.tool, "radon");
    }

    #[test]
    fn test_finding_serde_uses_loop_key() {
        let f = Finding::new("zombie", "b.py", 1, Category::DeadCode, Severity::Low, "never called");
        let json = serde_json::to_string(&f).unwrap();
        assert!(json.contains("\"loop\":\"zombie\""));
        let back: Finding = serde_json::from_str(&json).unwrap();
        assert_eq!(back.loop_name, "zombie");
    }
}
