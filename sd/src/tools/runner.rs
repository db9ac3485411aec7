//! ExternalTools - fan-out to installed static analyzers

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, error, info, warn};

use findingstore::{Category, Finding};

use crate::availability::AvailabilityCache;
use crate::process::{find_in_path, is_executable, run_command};

use super::parsers;
use super::spec::{ToolIdGen, ToolSpec, default_tools, language_for};

/// Availability cache time-to-live
const CACHE_TTL: Duration = Duration::from_secs(300);

/// Ceiling for a single version-check probe
const CHECK_TIMEOUT: Duration = Duration::from_secs(15);

/// Runs external analyzers and normalizes their output
///
/// A tool lives either on the process `PATH` or in the project
/// environment directory (`.venv/bin`); `npx`-fronted tools resolve
/// through npx itself.
pub struct ExternalTools {
    tools: Vec<ToolSpec>,
    cache: Mutex<AvailabilityCache>,
    ids: ToolIdGen,
    env_bin: PathBuf,
}

impl ExternalTools {
    /// Runner over the production tool set for a project root
    pub fn new(project_root: impl AsRef<Path>) -> Self {
        Self::with_tools(default_tools(), project_root)
    }

    /// Runner over an explicit tool set
    pub fn with_tools(tools: Vec<ToolSpec>, project_root: impl AsRef<Path>) -> Self {
        let env_bin = project_root.as_ref().join(".venv").join("bin");
        debug!(tool_count = tools.len(), env_bin = %env_bin.display(), "ExternalTools::with_tools: called");
        Self {
            tools,
            cache: Mutex::new(AvailabilityCache::new(CACHE_TTL)),
            ids: ToolIdGen::default(),
            env_bin,
        }
    }

    /// The declared tools
    pub fn tools(&self) -> &[ToolSpec] {
        &self.tools
    }

    fn tool(&self, name: &str) -> Option<&ToolSpec> {
        self.tools.iter().find(|t| t.name == name)
    }

    /// Replace argv\[0\] with the project-env binary when it is not on PATH
    fn resolve_program(&self, argv: &mut [String]) {
        let Some(program) = argv.first_mut() else {
            return;
        };
        if program.as_str() == "npx" || find_in_path(program).is_some() {
            return;
        }
        let candidate = self.env_bin.join(&*program);
        if is_executable(&candidate) {
            *program = candidate.display().to_string();
        }
    }

    /// Probe which tools are installed; cached for five minutes
    pub async fn check_availability(&self, force_refresh: bool) -> HashMap<String, bool> {
        if !force_refresh
            && let Some(map) = self.cache.lock().unwrap_or_else(std::sync::PoisonError::into_inner).fresh()
        {
            debug!("check_availability: serving from cache");
            return map;
        }

        let probes = self.tools.iter().map(|tool| async {
            let available = self.probe_tool(tool).await;
            (tool.name.clone(), available)
        });
        let results: HashMap<String, bool> = join_all(probes).await.into_iter().collect();

        self.cache
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .update(results.clone());
        results
    }

    async fn probe_tool(&self, tool: &ToolSpec) -> bool {
        let mut check_cmd = tool.check_cmd.clone();
        let Some(program) = check_cmd.first() else {
            return false;
        };

        if program != "npx" && find_in_path(program).is_none() {
            let candidate = self.env_bin.join(program);
            if !is_executable(&candidate) {
                debug!(tool = %tool.name, %program, "probe_tool: command not found");
                return false;
            }
            check_cmd[0] = candidate.display().to_string();
        }

        match run_command(&check_cmd, None, None, CHECK_TIMEOUT).await {
            Ok(output) if output.success() => {
                debug!(tool = %tool.name, "probe_tool: available");
                true
            }
            Ok(output) => {
                debug!(tool = %tool.name, ?output.exit_code, timed_out = output.timed_out, "probe_tool: check failed");
                false
            }
            Err(e) => {
                debug!(tool = %tool.name, error = %e, "probe_tool: check error");
                false
            }
        }
    }

    /// Tools whose language predicate matches the file's extension
    pub fn tools_for_file(&self, file_path: &str) -> Vec<String> {
        let language = language_for(file_path);
        self.tools
            .iter()
            .filter(|t| t.supports_language(language))
            .map(|t| t.name.clone())
            .collect()
    }

    /// Tools that detect the given category
    pub fn tools_for_category(&self, category: Category) -> Vec<String> {
        self.tools
            .iter()
            .filter(|t| t.detects.contains(&category))
            .map(|t| t.name.clone())
            .collect()
    }

    /// Run one tool on a path and parse its output into findings
    ///
    /// Unknown, unavailable, or timed-out tools yield an empty list; this
    /// never fails past its boundary.
    pub async fn run_tool(&self, tool: &str, path: &str) -> Vec<Finding> {
        let Some(spec) = self.tool(tool) else {
            error!(%tool, "run_tool: unknown tool");
            return Vec::new();
        };

        let availability = self.check_availability(false).await;
        if !availability.get(tool).copied().unwrap_or(false) {
            debug!(%tool, "run_tool: skipping, not available");
            return Vec::new();
        }

        let mut cmd = spec.cmd.clone();
        self.resolve_program(&mut cmd);
        cmd.push(path.to_string());

        info!(%tool, %path, "Running analyzer");

        let output = match run_command(&cmd, None, None, spec.timeout).await {
            Ok(output) => output,
            Err(e) => {
                error!(%tool, error = %e, "run_tool: failed to run");
                return Vec::new();
            }
        };

        if output.timed_out {
            error!(%tool, timeout_s = spec.timeout.as_secs(), "run_tool: timed out");
            return Vec::new();
        }

        let findings = self.parse_output(tool, &output.stdout);
        debug!(%tool, count = findings.len(), duration_ms = output.duration_ms, "run_tool: parsed findings");
        findings
    }

    fn parse_output(&self, tool: &str, output: &str) -> Vec<Finding> {
        match tool {
            "radon" => parsers::parse_radon(output, &self.ids),
            "vulture" => parsers::parse_vulture(output, &self.ids),
            "bandit" => parsers::parse_bandit(output, &self.ids),
            "ruff" => parsers::parse_ruff(output, &self.ids),
            "mypy" => parsers::parse_mypy(output, &self.ids),
            "jscpd" => parsers::parse_jscpd(output, &self.ids),
            "slop-detector" => parsers::parse_slop_detector(output, &self.ids),
            "karpeslop" => parsers::parse_karpeslop(output, &self.ids),
            other => {
                warn!(tool = %other, "parse_output: no parser for tool");
                Vec::new()
            }
        }
    }

    /// Run every applicable and available tool on a path concurrently
    pub async fn run_all_applicable(&self, path: &str) -> Vec<Finding> {
        let applicable = self.tools_for_file(path);
        let availability = self.check_availability(false).await;
        let to_run: Vec<String> = applicable
            .into_iter()
            .filter(|t| availability.get(t).copied().unwrap_or(false))
            .collect();

        if to_run.is_empty() {
            warn!(%path, "run_all_applicable: no tools available");
            return Vec::new();
        }

        let runs = to_run.iter().map(|tool| self.run_tool(tool, path));
        join_all(runs).await.into_iter().flatten().collect()
    }
}
