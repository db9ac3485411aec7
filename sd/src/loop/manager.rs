//! Orchestrator - bounded parallel scheduling of named loops
//!
//! Owns the loop set, enforces the max-parallel cap via a counting
//! semaphore, executes loops in priority order, aggregates results, and
//! routes cooperative cancellation.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use eyre::{Context, Result, eyre};
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use findingstore::{Finding, FindingFilter, FindingStatus, FindingStore, OrderBy, Severity, StoreStats, now_ms};

use crate::router::AiRouter;
use crate::tools::ExternalTools;

use super::descriptor::{PRIORITY_ORDER, descriptor, descriptors};
use super::engine::{AnalysisLoop, LoopSnapshot, LoopSummary};

/// Orchestrator construction parameters
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Maximum loops running at once
    pub max_parallel: usize,

    /// Findings store file
    pub db_path: PathBuf,

    /// Pin a specific LLM backend
    pub preferred_backend: Option<String>,

    /// Root of the codebase to analyze
    pub codebase_path: PathBuf,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_parallel: 3,
            db_path: default_db_path(),
            preferred_backend: None,
            codebase_path: PathBuf::from("."),
        }
    }
}

/// Default store location beneath the user configuration directory
pub fn default_db_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("sd")
        .join("findings.db")
}

/// Full status snapshot for UI display
#[derive(Debug, Clone, Serialize)]
pub struct OrchestratorStatus {
    pub running: bool,
    pub max_parallel: usize,
    pub loops: HashMap<String, LoopStatusEntry>,
    pub priority_order: Vec<&'static str>,
}

/// Per-loop status plus its most recent result
#[derive(Debug, Clone, Serialize)]
pub struct LoopStatusEntry {
    #[serde(flatten)]
    pub snapshot: LoopSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_result: Option<LoopSummary>,
}

#[derive(Default)]
struct Inner {
    store: Option<Arc<FindingStore>>,
    loops: HashMap<String, Arc<AnalysisLoop>>,
    results: HashMap<String, LoopSummary>,
}

/// Manages the named analysis loops with max N concurrent
pub struct Orchestrator {
    config: OrchestratorConfig,
    router: Arc<AiRouter>,
    tools: Arc<ExternalTools>,
    semaphore: Arc<Semaphore>,
    inner: std::sync::Mutex<Inner>,
    running: AtomicBool,
    init_lock: tokio::sync::Mutex<()>,
}

impl Orchestrator {
    /// Orchestrator over the production router and tool set
    pub fn new(config: OrchestratorConfig) -> Self {
        let router = Arc::new(AiRouter::new(config.preferred_backend.clone()));
        let tools = Arc::new(ExternalTools::new(&config.codebase_path));
        Self::with_components(config, router, tools)
    }

    /// Orchestrator with explicit router and tools (used by tests)
    pub fn with_components(config: OrchestratorConfig, router: Arc<AiRouter>, tools: Arc<ExternalTools>) -> Self {
        debug!(max_parallel = config.max_parallel, db_path = %config.db_path.display(), "Orchestrator::with_components: called");
        Self {
            semaphore: Arc::new(Semaphore::new(config.max_parallel)),
            config,
            router,
            tools,
            inner: std::sync::Mutex::new(Inner::default()),
            running: AtomicBool::new(false),
            init_lock: tokio::sync::Mutex::new(()),
        }
    }

    fn inner_lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn store(&self) -> Option<Arc<FindingStore>> {
        self.inner_lock().store.clone()
    }

    fn store_required(&self) -> Result<Arc<FindingStore>> {
        self.store().ok_or_else(|| eyre!("orchestrator is not initialized"))
    }

    /// Open the store, probe backends and tools, and build the loop set
    ///
    /// Idempotent: the second call is a no-op. Failure to open the store
    /// is fatal; missing LLM backends only warn.
    pub async fn initialize(&self) -> Result<()> {
        let _guard = self.init_lock.lock().await;
        if self.inner_lock().store.is_some() {
            debug!("initialize: already initialized");
            return Ok(());
        }

        let store =
            Arc::new(FindingStore::open(&self.config.db_path).context("Failed to open findings store")?);

        let backend_availability = self.router.check_availability(false).await;
        let available_backends: Vec<&str> = backend_availability
            .iter()
            .filter(|(_, ok)| **ok)
            .map(|(name, _)| name.as_str())
            .collect();
        if available_backends.is_empty() {
            warn!("No LLM backends available - analysis will fail");
        } else {
            info!(backends = ?available_backends, "Available LLM backends");
        }

        let tool_availability = self.tools.check_availability(false).await;
        let available_tools: Vec<&str> = tool_availability
            .iter()
            .filter(|(_, ok)| **ok)
            .map(|(name, _)| name.as_str())
            .collect();
        info!(tools = ?available_tools, "Available external tools");

        let loops: HashMap<String, Arc<AnalysisLoop>> = descriptors()
            .iter()
            .map(|desc| {
                let lp = AnalysisLoop::new(desc, store.clone(), self.router.clone(), Some(self.tools.clone()));
                (desc.name.to_string(), Arc::new(lp))
            })
            .collect();

        let loop_count = loops.len();
        {
            let mut inner = self.inner_lock();
            inner.store = Some(store);
            inner.loops = loops;
        }

        info!(loop_count, max_parallel = self.config.max_parallel, "Orchestrator initialized");
        Ok(())
    }

    /// Run every loop in priority order
    pub async fn run_all(&self, parallel: bool) -> Result<HashMap<String, LoopSummary>> {
        self.initialize().await?;
        let names: Vec<String> = PRIORITY_ORDER.iter().map(|n| n.to_string()).collect();
        self.run_named(names, parallel, "all").await
    }

    /// Run a named subset; unknown names are skipped with a warning
    pub async fn run_specific(&self, loop_names: &[String], parallel: bool) -> Result<HashMap<String, LoopSummary>> {
        self.initialize().await?;

        let valid: Vec<String> = {
            let inner = self.inner_lock();
            loop_names
                .iter()
                .filter(|name| {
                    let known = inner.loops.contains_key(*name);
                    if !known {
                        warn!(loop_name = %name, "Unknown loop, skipping");
                    }
                    known
                })
                .cloned()
                .collect()
        };

        if valid.is_empty() {
            warn!(?loop_names, "No valid loop names");
            return Ok(HashMap::new());
        }

        self.run_named(valid, parallel, "specific").await
    }

    async fn run_named(
        &self,
        names: Vec<String>,
        parallel: bool,
        scan_type: &str,
    ) -> Result<HashMap<String, LoopSummary>> {
        let loops: Vec<(String, Arc<AnalysisLoop>)> = {
            let inner = self.inner_lock();
            names
                .iter()
                .filter_map(|name| inner.loops.get(name).map(|lp| (name.clone(), lp.clone())))
                .collect()
        };

        self.running.store(true, Ordering::SeqCst);
        info!(count = loops.len(), parallel, max = self.config.max_parallel, "Starting loops");

        let started_at = now_ms();
        let start = Instant::now();
        let mut results = HashMap::new();

        if parallel {
            let mut handles = Vec::with_capacity(loops.len());
            for (name, lp) in &loops {
                let lp = lp.clone();
                let semaphore = self.semaphore.clone();
                let root = self.config.codebase_path.clone();
                let task_name = name.clone();
                handles.push((
                    name.clone(),
                    tokio::spawn(async move {
                        let _permit = match semaphore.acquire_owned().await {
                            Ok(permit) => permit,
                            Err(_) => {
                                return LoopSummary::error_summary(&task_name, 0, "semaphore closed");
                            }
                        };
                        debug!(loop_name = %task_name, "run_named: acquired semaphore");
                        lp.run(None, &root).await
                    }),
                ));
            }

            for (name, handle) in handles {
                let summary = match handle.await {
                    Ok(summary) => summary,
                    Err(e) => {
                        error!(loop_name = %name, error = %e, "Loop task failed");
                        let max = descriptor(&name).map(|d| d.max_iterations).unwrap_or(0);
                        LoopSummary::error_summary(&name, max, e.to_string())
                    }
                };
                results.insert(name, summary);
            }
        } else {
            for (name, lp) in &loops {
                let summary = lp.run(None, &self.config.codebase_path).await;
                results.insert(name.clone(), summary);
            }
        }

        self.running.store(false, Ordering::SeqCst);

        self.record_history(scan_type, &names, &results, start.elapsed().as_millis() as u64, started_at);

        let total: u32 = results.values().map(|s| s.findings_count).sum();
        info!(total_findings = total, "All loops completed");

        self.inner_lock().results.extend(results.clone());
        Ok(results)
    }

    /// Record loop runs and the scan itself; history failures only warn
    fn record_history(
        &self,
        scan_type: &str,
        names: &[String],
        results: &HashMap<String, LoopSummary>,
        duration_ms: u64,
        started_at: i64,
    ) {
        let Some(store) = self.store() else {
            return;
        };

        for (name, summary) in results {
            if let Err(e) = store.add_loop_run(
                name,
                &summary.status.to_string(),
                summary.iterations,
                summary.findings_count,
                summary.duration_ms,
                summary.error.as_deref(),
            ) {
                warn!(loop_name = %name, error = %e, "Failed to record loop run");
            }
        }

        // The loops enumerate the same tree, so take the widest pass
        let files_scanned = results.values().map(|s| s.files_scanned).max().unwrap_or(0);
        let findings_count: u32 = results.values().map(|s| s.findings_count).sum();
        if let Err(e) = store.add_scan_run(scan_type, names, files_scanned, findings_count, duration_ms, started_at) {
            warn!(error = %e, "Failed to record scan run");
        }
    }

    /// Request a cooperative stop for one loop; false if unknown
    pub fn stop_loop(&self, loop_name: &str) -> bool {
        let inner = self.inner_lock();
        match inner.loops.get(loop_name) {
            Some(lp) => {
                lp.stop();
                true
            }
            None => {
                warn!(%loop_name, "stop_loop: unknown loop");
                false
            }
        }
    }

    /// Request a cooperative stop for every loop
    pub fn stop_all(&self) {
        info!("Stopping all loops");
        let inner = self.inner_lock();
        for lp in inner.loops.values() {
            lp.stop();
        }
    }

    /// Whether any loops are currently running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Cheap read-only status snapshot; never blocks on running loops
    pub fn status(&self) -> OrchestratorStatus {
        let inner = self.inner_lock();
        let loops = inner
            .loops
            .iter()
            .map(|(name, lp)| {
                let entry = LoopStatusEntry {
                    snapshot: lp.snapshot(),
                    last_result: inner.results.get(name).cloned(),
                };
                (name.clone(), entry)
            })
            .collect();

        OrchestratorStatus {
            running: self.running.load(Ordering::SeqCst),
            max_parallel: self.config.max_parallel,
            loops,
            priority_order: PRIORITY_ORDER.to_vec(),
        }
    }

    /// Status snapshot for one loop
    pub fn loop_status(&self, loop_name: &str) -> Option<LoopSnapshot> {
        self.inner_lock().loops.get(loop_name).map(|lp| lp.snapshot())
    }

    /// Query findings from the store
    pub fn findings(
        &self,
        loop_name: Option<&str>,
        severity: Option<Severity>,
        status: Option<FindingStatus>,
        limit: u32,
    ) -> Result<Vec<Finding>> {
        let store = self.store_required()?;
        let mut filter = FindingFilter::default();
        if let Some(name) = loop_name {
            filter = filter.loop_name(name);
        }
        if let Some(severity) = severity {
            filter = filter.severity(severity);
        }
        if let Some(status) = status {
            filter = filter.status(status);
        }
        store.list(&filter, limit, 0, OrderBy::default())
    }

    /// Aggregate statistics from the store
    pub fn stats(&self) -> Result<StoreStats> {
        self.store_required()?.stats()
    }

    /// Mark a finding as acknowledged
    pub fn acknowledge(&self, finding_id: &str) -> Result<bool> {
        self.store_required()?.set_status(finding_id, FindingStatus::Acknowledged)
    }

    /// Mark a finding as fixed
    pub fn mark_fixed(&self, finding_id: &str) -> Result<bool> {
        self.store_required()?.set_status(finding_id, FindingStatus::Fixed)
    }

    /// Mark a finding as a false positive
    pub fn mark_false_positive(&self, finding_id: &str) -> Result<bool> {
        self.store_required()?.set_status(finding_id, FindingStatus::FalsePositive)
    }

    /// Stop all loops and close the store
    pub fn close(&self) {
        self.stop_all();
        if let Some(store) = self.store() {
            store.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::r#loop::engine::LoopStatus;
    use crate::router::BackendSpec;
    use crate::tools::ToolSpec;
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

    fn no_tools(root: &std::path::Path) -> Arc<ExternalTools> {
        Arc::new(ExternalTools::with_tools(Vec::<ToolSpec>::new(), root))
    }

    fn make_orchestrator(temp: &TempDir, max_parallel: usize, reply: &str) -> Orchestrator {
        fs::write(temp.path().join("app.py"), "x = 1\n").unwrap();
        let config = OrchestratorConfig {
            max_parallel,
            db_path: temp.path().join("findings.db"),
            preferred_backend: None,
            codebase_path: temp.path().to_path_buf(),
        };
        Orchestrator::with_components(config, fake_router(reply), no_tools(temp.path()))
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let orch = make_orchestrator(&temp, 3, r#"{"findings": [], "done": true}"#);

        orch.initialize().await.unwrap();
        orch.initialize().await.unwrap();

        let status = orch.status();
        assert_eq!(status.loops.len(), 10);
        assert!(!status.running);
    }

    #[tokio::test]
    async fn test_run_all_pristine() {
        let temp = TempDir::new().unwrap();
        let orch = make_orchestrator(&temp, 3, r#"{"findings": [], "done": true}"#);

        let results = orch.run_all(true).await.unwrap();
        assert_eq!(results.len(), 10);
        for (name, summary) in &results {
            assert_eq!(summary.status, LoopStatus::Done, "loop {name}");
            assert_eq!(summary.iterations, 1, "loop {name}");
            assert_eq!(summary.findings_count, 0, "loop {name}");
        }
        assert_eq!(orch.stats().unwrap().total, 0);
    }

    #[tokio::test]
    async fn test_run_all_records_history() {
        let temp = TempDir::new().unwrap();
        let orch = make_orchestrator(&temp, 3, r#"{"findings": [], "done": true}"#);

        orch.run_all(true).await.unwrap();

        let store = orch.store_required().unwrap();
        let scans = store.recent_scans(10).unwrap();
        assert_eq!(scans.len(), 1);
        assert_eq!(scans[0].scan_type, "all");
        assert_eq!(scans[0].loops_run.len(), 10);
        assert_eq!(scans[0].loops_run[0], "leaker", "priority order is recorded");

        let history = store.loop_history(None, 20).unwrap();
        assert_eq!(history.len(), 10);
    }

    #[tokio::test]
    async fn test_run_all_sequential() {
        let temp = TempDir::new().unwrap();
        let orch = make_orchestrator(&temp, 3, r#"{"findings": [], "done": true}"#);

        let results = orch.run_all(false).await.unwrap();
        assert_eq!(results.len(), 10);
        assert!(results.values().all(|s| s.status == LoopStatus::Done));
    }

    #[tokio::test]
    async fn test_run_specific_skips_unknown() {
        let temp = TempDir::new().unwrap();
        let orch = make_orchestrator(&temp, 3, r#"{"findings": [], "done": true}"#);

        let names = vec!["leaky".to_string(), "phantom".to_string()];
        let results = orch.run_specific(&names, true).await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(results.contains_key("leaky"));
    }

    #[tokio::test]
    async fn test_run_specific_all_unknown() {
        let temp = TempDir::new().unwrap();
        let orch = make_orchestrator(&temp, 3, r#"{"findings": [], "done": true}"#);

        let names = vec!["phantom".to_string()];
        let results = orch.run_specific(&names, true).await.unwrap();
        assert!(results.is_empty());
        assert!(!orch.is_running());
    }

    #[tokio::test]
    async fn test_findings_flow_into_store() {
        let temp = TempDir::new().unwrap();
        let reply = r#"{"findings": [{"file": "app.py", "line": 3, "category": "security", "description": "hardcoded key", "severity": "critical", "suggestion": "Move to env"}], "done": true}"#;
        let orch = make_orchestrator(&temp, 3, reply);

        let names = vec!["leaker".to_string()];
        let results = orch.run_specific(&names, true).await.unwrap();
        assert_eq!(results["leaker"].findings_count, 1);

        let findings = orch.findings(Some("leaker"), Some(Severity::Critical), None, 100).unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].category, findingstore::Category::Security);
    }

    #[tokio::test]
    async fn test_status_lifecycle_transitions() {
        let temp = TempDir::new().unwrap();
        let reply = r#"{"findings": [{"file": "app.py", "line": 3, "category": "security", "description": "hardcoded key", "severity": "critical", "suggestion": "Move to env"}], "done": true}"#;
        let orch = make_orchestrator(&temp, 3, reply);
        orch.run_specific(&["leaker".to_string()], true).await.unwrap();

        let id = orch.findings(None, None, None, 10).unwrap()[0].id.clone();
        assert!(orch.acknowledge(&id).unwrap());
        assert!(orch.mark_fixed(&id).unwrap());
        assert!(!orch.mark_fixed("slop-missing").unwrap());

        let stats = orch.stats().unwrap();
        assert_eq!(stats.by_status.get("fixed"), Some(&1));
    }

    #[tokio::test]
    async fn test_stop_loop_known_and_unknown() {
        let temp = TempDir::new().unwrap();
        let orch = make_orchestrator(&temp, 3, r#"{"findings": [], "done": true}"#);
        orch.initialize().await.unwrap();

        assert!(orch.stop_loop("leaky"));
        assert!(!orch.stop_loop("phantom"));
        orch.stop_all();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_cap_is_respected() {
        let temp = TempDir::new().unwrap();
        // Each loop's single iteration takes ~200ms
        let reply = r#"{"findings": [], "done": true}"#;
        fs::write(temp.path().join("app.py"), "x = 1\n").unwrap();
        let backend = BackendSpec::new(
            "slowpoke",
            &["sh", "-c", &format!("cat >/dev/null; sleep 0.2; printf '%s' '{reply}'")],
            &["sh", "-c", "exit 0"],
            5,
            "slow fake",
        );
        let config = OrchestratorConfig {
            max_parallel: 2,
            db_path: temp.path().join("findings.db"),
            preferred_backend: None,
            codebase_path: temp.path().to_path_buf(),
        };
        let orch = Arc::new(Orchestrator::with_components(
            config,
            Arc::new(AiRouter::with_backends(vec![backend], None)),
            no_tools(temp.path()),
        ));

        let runner = orch.clone();
        let handle = tokio::spawn(async move { runner.run_all(true).await });

        let mut max_running = 0usize;
        while !handle.is_finished() {
            let status = orch.status();
            let running = status
                .loops
                .values()
                .filter(|entry| entry.snapshot.status == LoopStatus::Running)
                .count();
            max_running = max_running.max(running);
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }

        let results = handle.await.unwrap().unwrap();
        assert_eq!(results.len(), 10, "all loops eventually complete");
        assert!(results.values().all(|s| s.status == LoopStatus::Done));
        assert!(max_running <= 2, "at most max_parallel loops ran at once, saw {max_running}");
        assert!(max_running > 0, "sampling observed at least one running loop");
    }

    #[tokio::test]
    async fn test_status_is_callable_before_initialize() {
        let temp = TempDir::new().unwrap();
        let orch = make_orchestrator(&temp, 3, "{}");
        let status = orch.status();
        assert!(status.loops.is_empty());
        assert_eq!(status.max_parallel, 3);
    }

    #[tokio::test]
    async fn test_close_shuts_down_store() {
        let temp = TempDir::new().unwrap();
        let orch = make_orchestrator(&temp, 3, r#"{"findings": [], "done": true}"#);
        orch.initialize().await.unwrap();

        orch.close();
        assert!(orch.stats().is_err());
    }
}
