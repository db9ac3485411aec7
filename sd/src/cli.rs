//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// sd - background code-smell analysis
#[derive(Parser)]
#[command(name = "sd", about = "Named analysis loops hunting code smells with LLM review", version)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(short = 'l', long = "log-level", global = true, help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)")]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// List LLM backends and their availability
    Backends {
        /// Re-probe instead of using the cached result
        #[arg(long)]
        refresh: bool,
    },

    /// List external analyzers and their availability
    Tools {
        /// Re-probe instead of using the cached result
        #[arg(long)]
        refresh: bool,
    },

    /// Run analysis loops (all of them, or a named subset)
    Run {
        /// Loop names to run (empty = all, in priority order)
        loops: Vec<String>,

        /// Run loops one at a time instead of in parallel
        #[arg(long)]
        sequential: bool,

        /// Codebase root to analyze
        #[arg(short, long)]
        path: Option<PathBuf>,

        /// Findings store file
        #[arg(long)]
        db: Option<PathBuf>,

        /// Pin a specific LLM backend
        #[arg(short, long)]
        backend: Option<String>,

        /// Maximum loops running at once
        #[arg(long)]
        max_parallel: Option<usize>,
    },

    /// List stored findings
    Findings {
        /// Filter by loop name
        #[arg(long = "loop")]
        loop_name: Option<String>,

        /// Filter by severity (critical, high, medium, low)
        #[arg(short, long)]
        severity: Option<String>,

        /// Filter by status (open, acknowledged, fixed, false_positive)
        #[arg(long)]
        status: Option<String>,

        /// Maximum results
        #[arg(long, default_value = "50")]
        limit: u32,

        /// Findings store file
        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// Show aggregate statistics
    Stats {
        /// Findings store file
        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// Mark a finding as acknowledged
    Ack {
        /// Finding id
        id: String,

        /// Findings store file
        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// Mark a finding as fixed
    Fixed {
        /// Finding id
        id: String,

        /// Findings store file
        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// Mark a finding as a false positive
    FalsePositive {
        /// Finding id
        id: String,

        /// Findings store file
        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// Show scan and loop run history
    History {
        /// Filter loop history by loop name
        #[arg(long = "loop")]
        loop_name: Option<String>,

        /// Maximum entries per table
        #[arg(long, default_value = "10")]
        limit: u32,

        /// Findings store file
        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// Delete findings older than N days
    Purge {
        /// Age threshold in days
        #[arg(long, default_value = "30")]
        days: u32,

        /// Also compact the store afterwards
        #[arg(long)]
        compact: bool,

        /// Findings store file
        #[arg(long)]
        db: Option<PathBuf>,
    },
}
