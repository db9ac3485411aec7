//! AiRouter - discovery, selection, and invocation of CLI LLM backends

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::availability::AvailabilityCache;
use crate::process::{find_in_path, run_command};

use super::error::RouterError;
use super::types::{BackendSpec, JSON_CONTRACT, LlmResponse, default_backends, parse_reply};

/// Availability cache time-to-live
const CACHE_TTL: Duration = Duration::from_secs(300);

/// Ceiling for a single version-check probe
const CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// Routes analysis prompts to the best available CLI backend
///
/// Backends are tried in declaration order; the availability cache lives
/// on the router instance so tests get isolated state.
pub struct AiRouter {
    backends: Vec<BackendSpec>,
    preferred: Option<String>,
    cache: Mutex<AvailabilityCache>,
}

impl AiRouter {
    /// Router over the production backend set
    pub fn new(preferred: Option<String>) -> Self {
        Self::with_backends(default_backends(), preferred)
    }

    /// Router over an explicit backend set (priority = order given)
    pub fn with_backends(backends: Vec<BackendSpec>, preferred: Option<String>) -> Self {
        debug!(backend_count = backends.len(), ?preferred, "AiRouter::with_backends: called");
        Self {
            backends,
            preferred,
            cache: Mutex::new(AvailabilityCache::new(CACHE_TTL)),
        }
    }

    /// The declared backends, in priority order
    pub fn backends(&self) -> &[BackendSpec] {
        &self.backends
    }

    fn backend(&self, name: &str) -> Option<&BackendSpec> {
        self.backends.iter().find(|b| b.name == name)
    }

    /// Probe which backends are usable; cached for five minutes
    pub async fn check_availability(&self, force_refresh: bool) -> HashMap<String, bool> {
        if !force_refresh
            && let Some(map) = self.cache.lock().unwrap_or_else(std::sync::PoisonError::into_inner).fresh()
        {
            debug!("check_availability: serving from cache");
            return map;
        }

        let probes = self.backends.iter().map(|backend| async {
            let available = probe_backend(backend).await;
            (backend.name.clone(), available)
        });
        let results: HashMap<String, bool> = join_all(probes).await.into_iter().collect();

        self.cache
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .update(results.clone());
        results
    }

    /// The first available backend, honoring the preferred one
    pub async fn best_backend(&self) -> Result<String, RouterError> {
        let availability = self.check_availability(false).await;

        if let Some(ref preferred) = self.preferred
            && availability.get(preferred).copied().unwrap_or(false)
        {
            return Ok(preferred.clone());
        }

        for backend in &self.backends {
            if availability.get(&backend.name).copied().unwrap_or(false) {
                return Ok(backend.name.clone());
            }
        }

        let names: Vec<&str> = self.backends.iter().map(|b| b.name.as_str()).collect();
        Err(RouterError::BackendUnavailable(format!(
            "install one of: {}",
            names.join(", ")
        )))
    }

    /// Run one analysis prompt through a backend
    ///
    /// The prompt gains the JSON-output contract and goes to the backend
    /// on stdin. Timeouts and non-zero exits come back as a response with
    /// `success = false`; only backend selection can fail.
    pub async fn analyze(
        &self,
        prompt: &str,
        task: &str,
        backend: Option<&str>,
        timeout: Option<Duration>,
    ) -> Result<LlmResponse, RouterError> {
        let selected = match backend {
            Some(name) => {
                let availability = self.check_availability(false).await;
                if !availability.get(name).copied().unwrap_or(false) {
                    return Err(RouterError::BackendUnavailable(format!(
                        "requested backend '{name}' is not available"
                    )));
                }
                name.to_string()
            }
            None => self.best_backend().await?,
        };

        // The pinned-or-selected name is guaranteed to be declared
        let spec = match self.backend(&selected) {
            Some(spec) => spec,
            None => {
                return Err(RouterError::BackendUnavailable(format!(
                    "requested backend '{selected}' is not declared"
                )));
            }
        };
        let deadline = timeout.unwrap_or(spec.timeout);

        info!(%task, backend = %selected, "Running analysis");

        let full_prompt = format!("{prompt}\n\n{JSON_CONTRACT}\n");

        let output = match run_command(&spec.cmd, Some(&full_prompt), None, deadline).await {
            Ok(output) => output,
            Err(e) => {
                warn!(backend = %selected, error = %e, "analyze: failed to run backend");
                return Ok(LlmResponse::failure(&selected, 0, e.to_string()));
            }
        };

        if output.timed_out {
            warn!(backend = %selected, timeout_s = deadline.as_secs(), "analyze: backend timed out");
            return Ok(LlmResponse::failure(
                &selected,
                output.duration_ms,
                format!("Timeout after {}s", deadline.as_secs()),
            ));
        }

        if output.exit_code != Some(0) {
            let stderr = output.stderr.trim();
            let error = if stderr.is_empty() { "Unknown error" } else { stderr };
            warn!(backend = %selected, ?output.exit_code, %error, "analyze: backend failed");
            return Ok(LlmResponse::failure(&selected, output.duration_ms, error));
        }

        let text = output.stdout.trim().to_string();
        debug!(backend = %selected, latency_ms = output.duration_ms, response_len = text.len(), "analyze: response received");

        let (findings, done) = parse_reply(&selected, &text);
        Ok(LlmResponse {
            text,
            findings,
            done,
            backend: selected,
            latency_ms: output.duration_ms,
            success: true,
            error: None,
            timestamp: findingstore::now_ms(),
        })
    }

    /// Try backends in priority order until one succeeds
    ///
    /// At most `max_retries` backends are attempted. Fails with
    /// [`RouterError::AllBackendsFailed`] carrying each backend's error.
    pub async fn analyze_with_retry(
        &self,
        prompt: &str,
        task: &str,
        max_retries: usize,
        timeout: Option<Duration>,
    ) -> Result<LlmResponse, RouterError> {
        let availability = self.check_availability(false).await;
        let available: Vec<&BackendSpec> = self
            .backends
            .iter()
            .filter(|b| availability.get(&b.name).copied().unwrap_or(false))
            .collect();

        if available.is_empty() {
            return Err(RouterError::BackendUnavailable("no LLM backend available".to_string()));
        }

        let mut errors = Vec::new();
        for backend in available.into_iter().take(max_retries) {
            let response = self.analyze(prompt, task, Some(&backend.name), timeout).await?;
            if response.success {
                return Ok(response);
            }
            errors.push((
                backend.name.clone(),
                response.error.unwrap_or_else(|| "unknown error".to_string()),
            ));
        }

        Err(RouterError::AllBackendsFailed { errors })
    }
}

async fn probe_backend(backend: &BackendSpec) -> bool {
    let Some(program) = backend.check_cmd.first() else {
        return false;
    };
    if find_in_path(program).is_none() {
        debug!(backend = %backend.name, %program, "probe_backend: command not found");
        return false;
    }

    match run_command(&backend.check_cmd, None, None, CHECK_TIMEOUT).await {
        Ok(output) if output.success() => {
            debug!(backend = %backend.name, "probe_backend: available");
            true
        }
        Ok(output) => {
            debug!(backend = %backend.name, ?output.exit_code, timed_out = output.timed_out, "probe_backend: check failed");
            false
        }
        Err(e) => {
            debug!(backend = %backend.name, error = %e, "probe_backend: check error");
            false
        }
    }
}
