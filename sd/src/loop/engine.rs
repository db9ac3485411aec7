//! AnalysisLoop - per-smell Ralph-style iteration
//!
//! One loop analyzes the codebase for ONE smell with clean context:
//! pre-filter analyzers produce hints, then the same focused prompt is
//! iterated against the LLM until it declares done or the cap is hit.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use findingstore::{Category, Finding, FindingStore, Severity};

use crate::router::{AiRouter, LlmFinding};
use crate::tools::ExternalTools;

use super::descriptor::LoopDescriptor;
use super::files::{MAX_FILES_PER_PASS, enumerate_source_files};

/// Files listed verbatim in the prompt; the remainder shows as a count
const PROMPT_FILE_LIMIT: usize = 50;

/// Hints serialized into the prompt
const PROMPT_HINT_LIMIT: usize = 20;

/// Most recent pass findings echoed back to the LLM
const PROMPT_PREVIOUS_LIMIT: usize = 10;

/// Loop lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopStatus {
    #[default]
    Idle,
    Running,
    Done,
    Stopped,
    Error,
}

impl std::fmt::Display for LoopStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Done => "done",
            Self::Stopped => "stopped",
            Self::Error => "error",
        };
        write!(f, "{s}")
    }
}

/// Result of one pass
#[derive(Debug, Clone, Serialize)]
pub struct LoopSummary {
    pub loop_name: String,
    pub status: LoopStatus,
    pub iterations: u32,
    pub max_iterations: u32,
    pub findings_count: u32,
    pub files_scanned: u32,
    pub duration_ms: u64,
    pub error: Option<String>,
}

impl LoopSummary {
    /// Summary for a loop whose task failed outside normal execution
    pub(crate) fn error_summary(loop_name: &str, max_iterations: u32, error: impl Into<String>) -> Self {
        Self {
            loop_name: loop_name.to_string(),
            status: LoopStatus::Error,
            iterations: 0,
            max_iterations,
            findings_count: 0,
            files_scanned: 0,
            duration_ms: 0,
            error: Some(error.into()),
        }
    }
}

/// Cheap status snapshot, readable while the loop runs
#[derive(Debug, Clone, Serialize)]
pub struct LoopSnapshot {
    pub name: &'static str,
    pub display_name: &'static str,
    pub status: LoopStatus,
    pub iteration: u32,
    pub max_iterations: u32,
    pub findings_count: u32,
    pub description: &'static str,
}

#[derive(Debug, Default)]
struct LoopState {
    status: LoopStatus,
    iteration: u32,
    findings_count: u32,
}

/// Per-pass buffer; lives on the task, cleared at pass start
#[derive(Default)]
struct PassState {
    findings: Vec<Finding>,
    files_scanned: u32,
}

/// A named analysis loop bound to one smell category
pub struct AnalysisLoop {
    descriptor: &'static LoopDescriptor,
    store: Arc<FindingStore>,
    router: Arc<AiRouter>,
    tools: Option<Arc<ExternalTools>>,
    state: std::sync::Mutex<LoopState>,
    stop_requested: AtomicBool,
}

impl AnalysisLoop {
    pub fn new(
        descriptor: &'static LoopDescriptor,
        store: Arc<FindingStore>,
        router: Arc<AiRouter>,
        tools: Option<Arc<ExternalTools>>,
    ) -> Self {
        debug!(loop_name = %descriptor.name, "AnalysisLoop::new: called");
        Self {
            descriptor,
            store,
            router,
            tools,
            state: std::sync::Mutex::new(LoopState::default()),
            stop_requested: AtomicBool::new(false),
        }
    }

    /// Internal loop name
    pub fn name(&self) -> &'static str {
        self.descriptor.name
    }

    /// The static descriptor
    pub fn descriptor(&self) -> &'static LoopDescriptor {
        self.descriptor
    }

    /// Request a cooperative stop, observed between iterations
    pub fn stop(&self) {
        info!(loop_name = %self.descriptor.name, "Stop requested");
        self.stop_requested.store(true, Ordering::SeqCst);
    }

    /// Non-blocking status snapshot
    pub fn snapshot(&self) -> LoopSnapshot {
        let state = self.state_lock();
        LoopSnapshot {
            name: self.descriptor.name,
            display_name: self.descriptor.display_name,
            status: state.status,
            iteration: state.iteration,
            max_iterations: self.descriptor.max_iterations,
            findings_count: state.findings_count,
            description: self.descriptor.description,
        }
    }

    fn state_lock(&self) -> std::sync::MutexGuard<'_, LoopState> {
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Run the loop until done, stop, or max iterations
    ///
    /// Errors never escape: a failed pass yields an `error` summary and
    /// whatever was buffered before the failure is still persisted.
    pub async fn run(&self, files: Option<Vec<String>>, root_path: &Path) -> LoopSummary {
        self.stop_requested.store(false, Ordering::SeqCst);
        {
            let mut state = self.state_lock();
            state.status = LoopStatus::Running;
            state.iteration = 0;
            state.findings_count = 0;
        }
        let start = Instant::now();
        info!(loop_name = %self.descriptor.name, "Starting loop: {}", self.descriptor.description);

        let mut pass = PassState::default();
        let outcome = self.run_pass(files, root_path, &mut pass).await;

        if !pass.findings.is_empty()
            && let Err(e) = self.store.add_many(&pass.findings)
        {
            warn!(loop_name = %self.descriptor.name, error = %e, "Failed to persist findings");
        }

        let stopped = self.stop_requested.load(Ordering::SeqCst);
        let (status, error) = match outcome {
            Ok(()) if stopped => (LoopStatus::Stopped, None),
            Ok(()) => (LoopStatus::Done, None),
            Err(e) => {
                error!(loop_name = %self.descriptor.name, error = %e, "Loop error");
                (LoopStatus::Error, Some(e.to_string()))
            }
        };

        let iterations = {
            let mut state = self.state_lock();
            state.status = status;
            state.iteration
        };

        let summary = LoopSummary {
            loop_name: self.descriptor.name.to_string(),
            status,
            iterations,
            max_iterations: self.descriptor.max_iterations,
            findings_count: pass.findings.len() as u32,
            files_scanned: pass.files_scanned,
            duration_ms: start.elapsed().as_millis() as u64,
            error,
        };
        info!(
            loop_name = %self.descriptor.name,
            status = %summary.status,
            findings = summary.findings_count,
            duration_ms = summary.duration_ms,
            "Loop completed"
        );
        summary
    }

    async fn run_pass(&self, files: Option<Vec<String>>, root_path: &Path, pass: &mut PassState) -> eyre::Result<()> {
        let files = match files {
            Some(files) => files,
            None => enumerate_source_files(root_path, MAX_FILES_PER_PASS)?,
        };
        pass.files_scanned = files.len() as u32;
        if files.is_empty() {
            warn!(loop_name = %self.descriptor.name, "No candidate files, analyzing anyway");
        }

        let hints = self.run_prefilters(root_path).await;
        if !hints.is_empty() {
            info!(loop_name = %self.descriptor.name, count = hints.len(), "Pre-filter tools produced hints");
        }

        while self.state_lock().iteration < self.descriptor.max_iterations && !self.stop_requested.load(Ordering::SeqCst)
        {
            let iteration = {
                let mut state = self.state_lock();
                state.iteration += 1;
                state.iteration
            };
            info!(
                loop_name = %self.descriptor.name,
                "Loop iteration {}/{}",
                iteration,
                self.descriptor.max_iterations
            );

            let prompt = self.build_prompt(&files, &hints, &pass.findings, iteration);
            let response = self.router.analyze(&prompt, self.descriptor.task, None, None).await?;

            if !response.success {
                // Transient backend failure, the next iteration may recover
                warn!(
                    loop_name = %self.descriptor.name,
                    error = response.error.as_deref().unwrap_or("unknown"),
                    "LLM analysis failed"
                );
                continue;
            }

            if !response.findings.is_empty() {
                info!(loop_name = %self.descriptor.name, count = response.findings.len(), "Found new issues");
                for raw in response.findings {
                    pass.findings.push(self.normalize(raw));
                }
                self.state_lock().findings_count = pass.findings.len() as u32;
            }

            if response.done {
                info!(loop_name = %self.descriptor.name, "Loop reports done after {} iterations", iteration);
                break;
            }
        }

        Ok(())
    }

    /// Run the pre-filter analyzers concurrently, collecting hints
    async fn run_prefilters(&self, root_path: &Path) -> Vec<Finding> {
        let Some(ref tools) = self.tools else {
            return Vec::new();
        };
        if self.descriptor.prefilter_tools.is_empty() {
            return Vec::new();
        }

        let target = root_path.display().to_string();
        let runs = self.descriptor.prefilter_tools.iter().map(|tool| tools.run_tool(tool, &target));
        join_all(runs).await.into_iter().flatten().collect()
    }

    /// Stamp the loop name and coerce the category into the allowed set
    ///
    /// Out-of-set categories are not rejected: LLMs wander, so the
    /// finding is kept and re-tagged to the primary category.
    fn normalize(&self, raw: LlmFinding) -> Finding {
        let severity = raw.severity.parse().unwrap_or(Severity::Medium);
        let category = raw
            .category
            .parse::<Category>()
            .ok()
            .filter(|c| self.descriptor.allowed_categories.contains(c))
            .unwrap_or_else(|| {
                debug!(
                    loop_name = %self.descriptor.name,
                    category = %raw.category,
                    primary = %self.descriptor.primary_category,
                    "normalize: category not allowed, using primary"
                );
                self.descriptor.primary_category
            });

        Finding::new(self.descriptor.name, raw.file, raw.line, category, severity, raw.description)
            .with_suggestion(raw.suggestion)
    }

    /// Compose the focused prompt for one iteration
    fn build_prompt(&self, files: &[String], hints: &[Finding], previous: &[Finding], iteration: u32) -> String {
        let mut files_text = files[..files.len().min(PROMPT_FILE_LIMIT)].join("\n");
        if files.len() > PROMPT_FILE_LIMIT {
            files_text.push_str(&format!("\n... and {} more files", files.len() - PROMPT_FILE_LIMIT));
        }

        let hints_text = if hints.is_empty() {
            "None".to_string()
        } else {
            let shown = &hints[..hints.len().min(PROMPT_HINT_LIMIT)];
            let mut text = serde_json::to_string_pretty(shown).unwrap_or_else(|_| "[]".to_string());
            if hints.len() > PROMPT_HINT_LIMIT {
                text.push_str(&format!("\n... and {} more hints", hints.len() - PROMPT_HINT_LIMIT));
            }
            text
        };

        let previous_text = if previous.is_empty() {
            "None".to_string()
        } else {
            let recent = &previous[previous.len().saturating_sub(PROMPT_PREVIOUS_LIMIT)..];
            let body = serde_json::to_string_pretty(recent).unwrap_or_else(|_| "[]".to_string());
            if previous.len() > PROMPT_PREVIOUS_LIMIT {
                format!("... {} earlier findings ...\n{body}", previous.len() - PROMPT_PREVIOUS_LIMIT)
            } else {
                body
            }
        };

        let allowed: Vec<&str> = self.descriptor.allowed_categories.iter().map(|c| c.as_str()).collect();

        format!(
            "## Analysis Task: {display_name}\n\n\
             {template}\n\n\
             ## Scope\n\n\
             Analyze the ENTIRE codebase for this ONE issue type.\n\
             Iteration: {iteration}/{max_iterations}\n\n\
             ## Files to Analyze\n\n\
             {files_text}\n\n\
             ## Fast Tool Hints (pre-filtered)\n\n\
             {hints_text}\n\n\
             ## Previous Findings This Pass\n\n\
             {previous_text}\n\n\
             ## Instructions\n\n\
             1. Focus ONLY on {task} - ignore other code smells\n\
             2. Analyze across ALL files, not just one at a time\n\
             3. Return JSON: {{\"findings\": [...], \"done\": true/false}}\n\
             4. Set done=true when you've found all issues or confirmed none exist\n\
             5. Each finding MUST include: file, line, category, description, severity, suggestion\n\
             6. CATEGORY must be one of: {allowed}\n\
             7. SUGGESTION must be actionable (e.g., \"Remove import 'os' on line 42\" not \"Consider removing...\")\n\
             8. Don't repeat findings from previous iterations\n",
            display_name = self.descriptor.display_name,
            template = self.descriptor.prompt,
            iteration = iteration,
            max_iterations = self.descriptor.max_iterations,
            files_text = files_text,
            hints_text = hints_text,
            previous_text = previous_text,
            task = self.descriptor.task,
            allowed = allowed.join(", "),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::r#loop::descriptor::descriptor;
    use crate::router::BackendSpec;
    use std::fs;
    use tempfile::TempDir;

    fn fake_router(reply: &str) -> Arc<AiRouter> {
        let backend = BackendSpec::new(
            "fake",
            &["sh", "-c", &format!("cat >/dev/null; printf '%s' '{reply}'")],
            &["sh", "-c", "exit 0"],
            5,
            "shell-backed fake",
        );
        Arc::new(AiRouter::with_backends(vec![backend], None))
    }

    fn dead_router() -> Arc<AiRouter> {
        let backend = BackendSpec::new(
            "ghost",
            &["definitely-not-a-real-binary-3141"],
            &["definitely-not-a-real-binary-3141", "--version"],
            5,
            "not installed",
        );
        Arc::new(AiRouter::with_backends(vec![backend], None))
    }

    fn workspace() -> (TempDir, Arc<FindingStore>) {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("app.py"), "x = 1\n").unwrap();
        let store = Arc::new(FindingStore::open(temp.path().join("findings.db")).unwrap());
        (temp, store)
    }

    fn make_loop(name: &str, store: Arc<FindingStore>, router: Arc<AiRouter>) -> AnalysisLoop {
        AnalysisLoop::new(descriptor(name).unwrap(), store, router, None)
    }

    #[tokio::test]
    async fn test_done_on_first_iteration() {
        let (temp, store) = workspace();
        let lp = make_loop("leaky", store.clone(), fake_router(r#"{"findings": [], "done": true}"#));

        let summary = lp.run(None, temp.path()).await;
        assert_eq!(summary.status, LoopStatus::Done);
        assert_eq!(summary.iterations, 1);
        assert_eq!(summary.findings_count, 0);
        assert_eq!(store.stats().unwrap().total, 0);
    }

    #[tokio::test]
    async fn test_finding_is_normalized_and_persisted() {
        let (temp, store) = workspace();
        let reply = r#"{"findings": [{"file": "cache.py", "line": 42, "category": "memory_leaks", "description": "Unbounded cache", "severity": "high", "suggestion": "Add maximum entry count"}], "done": true}"#;
        let lp = make_loop("leaky", store.clone(), fake_router(reply));

        let summary = lp.run(None, temp.path()).await;
        assert_eq!(summary.status, LoopStatus::Done);
        assert_eq!(summary.iterations, 1);
        assert_eq!(summary.findings_count, 1);

        let rows = store.by_loop("leaky").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].severity, Severity::High);
        assert_eq!(rows[0].category, Category::MemoryLeaks);
        assert_eq!(rows[0].suggestion, "Add maximum entry count");
    }

    #[tokio::test]
    async fn test_category_coercion_to_primary() {
        let (temp, store) = workspace();
        let reply = r#"{"findings": [{"file": "cache.py", "line": 7, "category": "general", "description": "odd growth", "severity": "low", "suggestion": "Bound it"}], "done": true}"#;
        let lp = make_loop("leaky", store.clone(), fake_router(reply));

        lp.run(None, temp.path()).await;
        let rows = store.by_loop("leaky").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].category, Category::MemoryLeaks);
        assert_eq!(rows[0].description, "odd growth");
    }

    #[tokio::test]
    async fn test_allowed_secondary_category_is_kept() {
        let (temp, store) = workspace();
        let reply = r#"{"findings": [{"file": "a.py", "line": 1, "category": "unused_imports", "description": "os unused", "severity": "low", "suggestion": "Remove import 'os' on line 1"}], "done": true}"#;
        let lp = make_loop("zombie", store.clone(), fake_router(reply));

        lp.run(None, temp.path()).await;
        let rows = store.by_loop("zombie").unwrap();
        assert_eq!(rows[0].category, Category::UnusedImports);
    }

    #[tokio::test]
    async fn test_iteration_cap_reached_when_never_done() {
        let (temp, store) = workspace();
        let reply = r#"{"findings": [{"file": "a.py", "line": 1, "category": "memory_leaks", "description": "leak", "severity": "low", "suggestion": "Fix it"}], "done": false}"#;
        let lp = make_loop("leaky", store.clone(), fake_router(reply));

        let summary = lp.run(None, temp.path()).await;
        assert_eq!(summary.status, LoopStatus::Done);
        assert_eq!(summary.iterations, 5, "leaky caps at 5 iterations");
        assert_eq!(summary.findings_count, 5, "one buffered finding per iteration");
        // Identical tuples dedupe to one stored row
        assert_eq!(store.stats().unwrap().total, 1);
    }

    #[tokio::test]
    async fn test_no_backend_yields_error_summary() {
        let (temp, store) = workspace();
        let lp = make_loop("leaky", store.clone(), dead_router());

        let summary = lp.run(None, temp.path()).await;
        assert_eq!(summary.status, LoopStatus::Error);
        assert!(summary.error.as_deref().unwrap_or("").contains("backend"));
    }

    #[tokio::test]
    async fn test_empty_directory_still_iterates_once() {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(FindingStore::open(temp.path().join("findings.db")).unwrap());
        let lp = make_loop("leaky", store, fake_router(r#"{"findings": [], "done": true}"#));

        let summary = lp.run(None, temp.path()).await;
        assert_eq!(summary.status, LoopStatus::Done);
        assert_eq!(summary.iterations, 1);
        assert_eq!(summary.files_scanned, 0);
    }

    #[tokio::test]
    async fn test_stop_is_observed_between_iterations() {
        let (temp, store) = workspace();
        // Slow backend that never says done
        let backend = BackendSpec::new(
            "slowpoke",
            &["sh", "-c", r#"cat >/dev/null; sleep 0.3; printf '%s' '{"findings": [], "done": false}'"#],
            &["sh", "-c", "exit 0"],
            5,
            "slow fake",
        );
        let router = Arc::new(AiRouter::with_backends(vec![backend], None));
        let lp = Arc::new(make_loop("leaky", store, router));

        let runner = lp.clone();
        let root = temp.path().to_path_buf();
        let handle = tokio::spawn(async move { runner.run(None, &root).await });

        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        lp.stop();

        let summary = handle.await.unwrap();
        assert_eq!(summary.status, LoopStatus::Stopped);
        assert!(summary.iterations < 5);
    }

    #[tokio::test]
    async fn test_snapshot_reflects_state() {
        let (temp, store) = workspace();
        let lp = make_loop("tangled", store, fake_router(r#"{"findings": [], "done": true}"#));

        let before = lp.snapshot();
        assert_eq!(before.status, LoopStatus::Idle);
        assert_eq!(before.display_name, "TANGLED");
        assert_eq!(before.max_iterations, 4);

        lp.run(None, temp.path()).await;
        let after = lp.snapshot();
        assert_eq!(after.status, LoopStatus::Done);
        assert_eq!(after.iteration, 1);
    }

    #[test]
    fn test_build_prompt_truncation() {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(FindingStore::open(temp.path().join("findings.db")).unwrap());
        let lp = make_loop("leaky", store, fake_router("{}"));

        let files: Vec<String> = (0..80).map(|i| format!("src/file{i}.py")).collect();
        let prompt = lp.build_prompt(&files, &[], &[], 1);

        assert!(prompt.contains("## Analysis Task: LEAKY"));
        assert!(prompt.contains("src/file49.py"));
        assert!(!prompt.contains("src/file50.py"));
        assert!(prompt.contains("... and 30 more files"));
        assert!(prompt.contains("Iteration: 1/5"));
        assert!(prompt.contains("CATEGORY must be one of: memory_leaks"));
    }

    #[test]
    fn test_build_prompt_previous_findings_tail() {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(FindingStore::open(temp.path().join("findings.db")).unwrap());
        let lp = make_loop("leaky", store, fake_router("{}"));

        let previous: Vec<Finding> = (0..13)
            .map(|i| Finding::new("leaky", format!("f{i}.py"), i, Category::MemoryLeaks, Severity::Low, format!("leak {i}")))
            .collect();
        let prompt = lp.build_prompt(&["a.py".to_string()], &[], &previous, 3);

        assert!(prompt.contains("... 3 earlier findings ..."));
        assert!(prompt.contains("leak 12"), "latest findings are shown");
        assert!(!prompt.contains("\"leak 1\""), "oldest findings are elided");
    }
}
