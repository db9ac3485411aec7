//! LLM router module
//!
//! Detects which command-line LLM backends are usable, picks one by
//! priority, and drives it with a timeout-bounded subprocess call. The
//! wire contract is prompt-on-stdin, one JSON document on stdout.

mod core;
mod error;
mod types;

pub use core::AiRouter;
pub use error::RouterError;
pub use types::{BackendSpec, LlmFinding, LlmResponse, default_backends};
