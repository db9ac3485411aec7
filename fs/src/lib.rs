//! FindingStore - embedded persistence for code-quality findings
//!
//! Stores and queries findings produced by the analysis loops, plus scan
//! and loop-run history. One SQLite file per store.
//!
//! - Duplicate findings (same file/line/category/description) are folded
//!   into one row; re-observation advances `last_seen_at`
//! - Filtered queries with an allow-listed sort order
//! - Status lifecycle: open → acknowledged → fixed, or false_positive
//! - Aggregate statistics by loop, category, severity, and status
//!
//! # Example
//!
//! ```ignore
//! use findingstore::{Finding, FindingStore, Category, Severity};
//!
//! let store = FindingStore::open("findings.db")?;
//! let id = store.add(&Finding::new(
//!     "leaky", "server/cache.py", 42,
//!     Category::MemoryLeaks, Severity::High,
//!     "Unbounded cache",
//! ))?;
//! let open = store.by_loop("leaky")?;
//! ```

mod store;
mod types;

pub use store::FindingStore;
pub use types::{
    Category, Finding, FindingFilter, FindingStatus, LoopRunRecord, OrderBy, ParseEnumError, ScanRecord, Severity,
    StoreStats,
};

/// Current Unix time in milliseconds
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Generate a store-level finding id (`slop-` + 12 hex chars)
pub fn generate_finding_id() -> String {
    let hex = uuid::Uuid::now_v7().simple().to_string();
    format!("slop-{}", &hex[..12])
}
