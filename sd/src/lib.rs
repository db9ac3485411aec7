//! SmellDaemon - background code-quality analysis service
//!
//! Continuously scans a codebase for specific categories of defects
//! ("smells"). Each smell category is handled by a named analysis loop
//! (LEAKY for memory leaks, ZOMBIE for dead code, LEAKER for security,
//! ...) that combines fast deterministic analyzers with an LLM reviewer,
//! iterating Ralph-style on one smell at a time until the LLM declares
//! the scan complete.
//!
//! # Core Concepts
//!
//! - **One Smell Per Loop**: every loop carries a clean, focused context
//! - **Ralph-Style Iteration**: the same prompt runs until done or cap
//! - **Deterministic Hints**: static analyzers pre-filter, the LLM judges
//! - **Bounded Parallelism**: a counting semaphore caps concurrent loops
//!
//! # Modules
//!
//! - [`router`] - LLM backend discovery, selection, and invocation
//! - [`tools`] - external analyzer fan-out and output parsers
//! - [`r#loop`] - analysis loops and the orchestrator
//! - [`config`] - configuration types and loading
//! - [`cli`] - command-line interface

pub mod cli;
pub mod config;
pub mod process;
pub mod router;
pub mod tools;

mod availability;

// Note: 'loop' is a reserved keyword, so we use r#loop
#[path = "loop/mod.rs"]
pub mod r#loop;

// Re-export commonly used types
pub use config::Config;
pub use r#loop::{
    AnalysisLoop, LoopDescriptor, LoopSnapshot, LoopStatus, LoopStatusEntry, LoopSummary, Orchestrator,
    OrchestratorConfig, OrchestratorStatus, PRIORITY_ORDER, default_db_path, descriptor, descriptors,
};
pub use process::{ProcessOutput, run_command};
pub use router::{AiRouter, BackendSpec, LlmFinding, LlmResponse, RouterError, default_backends};
pub use tools::{ExternalTools, ToolSpec, default_tools};
