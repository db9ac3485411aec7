//! Analysis loop module
//!
//! Each named loop hunts ONE smell category with Ralph-style iteration:
//! the same focused prompt runs against the LLM until it declares done or
//! the iteration cap is hit. The Orchestrator schedules loops in priority
//! order under a concurrency cap.

mod descriptor;
mod engine;
mod files;
mod manager;

pub use descriptor::{LoopDescriptor, PRIORITY_ORDER, descriptor, descriptors};
pub use engine::{AnalysisLoop, LoopSnapshot, LoopStatus, LoopSummary};
pub use files::{MAX_FILES_PER_PASS, enumerate_source_files};
pub use manager::{LoopStatusEntry, Orchestrator, OrchestratorConfig, OrchestratorStatus, default_db_path};
