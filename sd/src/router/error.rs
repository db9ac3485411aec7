//! Router error types

use thiserror::Error;

/// Errors surfaced by the LLM router
///
/// Per-call failures (timeouts, non-zero exits, unparsable output) are
/// reported inside [`super::LlmResponse`] instead; these variants cover
/// the cases where no response exists at all.
#[derive(Debug, Error)]
pub enum RouterError {
    /// No backend passed its version check, or the pinned one failed it
    #[error("no LLM backend available: {0}")]
    BackendUnavailable(String),

    /// Every retried backend failed
    #[error("all backends failed: {}", .errors.iter().map(|(b, e)| format!("{b}: {e}")).collect::<Vec<_>>().join("; "))]
    AllBackendsFailed {
        /// (backend name, error message) per attempt
        errors: Vec<(String, String)>,
    },
}
