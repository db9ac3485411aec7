//! sd - CLI driver for the smell daemon
//!
//! Thin invocation surface over the orchestrator and the findings store:
//! probe backends and analyzers, run loops, inspect and triage findings.

use std::path::PathBuf;

use clap::Parser;
use colored::Colorize;
use eyre::{Result, bail};
use tracing::debug;

use findingstore::{Finding, FindingStatus, FindingStore, Severity};
use smelldaemon::cli::{Cli, Command};
use smelldaemon::config::Config;
use smelldaemon::r#loop::{Orchestrator, OrchestratorConfig, default_db_path};
use smelldaemon::router::AiRouter;
use smelldaemon::tools::ExternalTools;

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) {
    let level = cli_log_level
        .or(config_log_level)
        .map(|s| s.to_uppercase())
        .and_then(|s| s.parse::<tracing::Level>().ok())
        .unwrap_or(tracing::Level::WARN);

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("sd={level},smelldaemon={level},findingstore={level}")));

    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn resolve_db_path(flag: Option<PathBuf>, config: &Config) -> PathBuf {
    flag.or_else(|| config.db_path.clone()).unwrap_or_else(default_db_path)
}

fn open_store(flag: Option<PathBuf>, config: &Config) -> Result<FindingStore> {
    FindingStore::open(resolve_db_path(flag, config))
}

fn severity_label(severity: Severity) -> colored::ColoredString {
    match severity {
        Severity::Critical => "critical".red().bold(),
        Severity::High => "high".red(),
        Severity::Medium => "medium".yellow(),
        Severity::Low => "low".normal(),
    }
}

fn status_label(status: FindingStatus) -> colored::ColoredString {
    match status {
        FindingStatus::Open => "open".yellow(),
        FindingStatus::Acknowledged => "acknowledged".cyan(),
        FindingStatus::Fixed => "fixed".green(),
        FindingStatus::FalsePositive => "false_positive".dimmed(),
    }
}

fn print_finding(finding: &Finding) {
    println!(
        "{}  {:<8}  {:<9}  {}:{}  {}",
        finding.id.dimmed(),
        severity_label(finding.severity),
        finding.loop_name,
        finding.file,
        finding.line,
        finding.description,
    );
    if !finding.suggestion.is_empty() {
        println!("{}  fix: {}", " ".repeat(17), finding.suggestion.dimmed());
    }
}

async fn cmd_backends(config: &Config, refresh: bool) {
    let router = AiRouter::new(config.preferred_backend.clone());
    let availability = router.check_availability(refresh).await;

    println!("{}", "LLM backends (priority order):".bold());
    for backend in router.backends() {
        let mark = if availability.get(&backend.name).copied().unwrap_or(false) {
            "available".green()
        } else {
            "missing".red()
        };
        println!("  {:<10} {:<10} {}", backend.name, mark, backend.description.dimmed());
    }
}

async fn cmd_tools(config: &Config, refresh: bool) {
    let root = config.codebase_path.clone().unwrap_or_else(|| PathBuf::from("."));
    let tools = ExternalTools::new(&root);
    let availability = tools.check_availability(refresh).await;

    println!("{}", "External analyzers:".bold());
    for tool in tools.tools() {
        let mark = if availability.get(&tool.name).copied().unwrap_or(false) {
            "available".green()
        } else {
            "missing".red()
        };
        println!(
            "  {:<14} {:<10} tier {}  install: {}",
            tool.name,
            mark,
            tool.tier,
            tool.install.dimmed()
        );
    }
}

#[allow(clippy::too_many_arguments)]
async fn cmd_run(
    config: &Config,
    loops: Vec<String>,
    sequential: bool,
    path: Option<PathBuf>,
    db: Option<PathBuf>,
    backend: Option<String>,
    max_parallel: Option<usize>,
) -> Result<()> {
    let orch_config = OrchestratorConfig {
        max_parallel: max_parallel.unwrap_or(config.max_parallel),
        db_path: resolve_db_path(db, config),
        preferred_backend: backend.or_else(|| config.preferred_backend.clone()),
        codebase_path: path
            .or_else(|| config.codebase_path.clone())
            .unwrap_or_else(|| PathBuf::from(".")),
    };
    debug!(?orch_config.max_parallel, "cmd_run: starting");

    let orchestrator = Orchestrator::new(orch_config);
    let results = if loops.is_empty() {
        orchestrator.run_all(!sequential).await?
    } else {
        orchestrator.run_specific(&loops, !sequential).await?
    };

    if results.is_empty() {
        println!("{}", "No loops ran (unknown loop names?)".yellow());
        orchestrator.close();
        return Ok(());
    }

    println!("{}", "Loop results:".bold());
    let mut names: Vec<&String> = results.keys().collect();
    names.sort();
    for name in names {
        let summary = &results[name];
        let status = match summary.status {
            smelldaemon::LoopStatus::Done => "done".green(),
            smelldaemon::LoopStatus::Stopped => "stopped".yellow(),
            smelldaemon::LoopStatus::Error => "error".red(),
            other => other.to_string().as_str().normal(),
        };
        print!(
            "  {:<10} {:<8} {} iterations, {} findings, {}ms",
            name, status, summary.iterations, summary.findings_count, summary.duration_ms
        );
        match &summary.error {
            Some(error) => println!("  {}", error.red()),
            None => println!(),
        }
    }

    let stats = orchestrator.stats()?;
    println!("\n{} findings stored in total", stats.total);
    orchestrator.close();
    Ok(())
}

fn cmd_findings(
    config: &Config,
    loop_name: Option<String>,
    severity: Option<String>,
    status: Option<String>,
    limit: u32,
    db: Option<PathBuf>,
) -> Result<()> {
    let severity = match severity {
        Some(s) => Some(s.parse::<Severity>().map_err(|e| eyre::eyre!("{e} (expected critical|high|medium|low)"))?),
        None => None,
    };
    let status = match status {
        Some(s) => Some(
            s.parse::<FindingStatus>()
                .map_err(|e| eyre::eyre!("{e} (expected open|acknowledged|fixed|false_positive)"))?,
        ),
        None => None,
    };

    let store = open_store(db, config)?;
    let mut filter = findingstore::FindingFilter::default();
    if let Some(name) = loop_name {
        filter = filter.loop_name(name);
    }
    if let Some(severity) = severity {
        filter = filter.severity(severity);
    }
    if let Some(status) = status {
        filter = filter.status(status);
    }

    let findings = store.list(&filter, limit, 0, findingstore::OrderBy::default())?;
    if findings.is_empty() {
        println!("No findings");
        return Ok(());
    }
    for finding in &findings {
        print_finding(finding);
    }
    println!("\n{} findings", findings.len());
    Ok(())
}

fn cmd_stats(config: &Config, db: Option<PathBuf>) -> Result<()> {
    let store = open_store(db, config)?;
    let stats = store.stats()?;

    println!("{} {}", "Total findings:".bold(), stats.total);
    for (title, bucket) in [
        ("By loop", &stats.by_loop),
        ("By category", &stats.by_category),
        ("By severity", &stats.by_severity),
        ("By status", &stats.by_status),
    ] {
        if bucket.is_empty() {
            continue;
        }
        println!("\n{}:", title.bold());
        let mut entries: Vec<(&String, &u64)> = bucket.iter().collect();
        entries.sort_by(|a, b| b.1.cmp(a.1));
        for (key, count) in entries {
            println!("  {key:<22} {count}");
        }
    }
    Ok(())
}

fn cmd_set_status(config: &Config, id: &str, status: FindingStatus, db: Option<PathBuf>) -> Result<()> {
    let store = open_store(db, config)?;
    if store.set_status(id, status)? {
        println!("{} -> {}", id, status_label(status));
        Ok(())
    } else {
        bail!("no finding with id '{id}'");
    }
}

fn cmd_history(config: &Config, loop_name: Option<String>, limit: u32, db: Option<PathBuf>) -> Result<()> {
    let store = open_store(db, config)?;

    if loop_name.is_none() {
        let scans = store.recent_scans(limit)?;
        println!("{}", "Recent scans:".bold());
        if scans.is_empty() {
            println!("  none");
        }
        for scan in scans {
            println!(
                "  #{}  {}  {} loops, {} files, {} findings, {}ms",
                scan.id,
                scan.scan_type,
                scan.loops_run.len(),
                scan.files_scanned,
                scan.findings_count,
                scan.duration_ms
            );
        }
        println!();
    }

    let runs = store.loop_history(loop_name.as_deref(), limit)?;
    println!("{}", "Loop runs:".bold());
    if runs.is_empty() {
        println!("  none");
    }
    for run in runs {
        print!(
            "  {:<10} {:<8} {} iterations, {} findings, {}ms",
            run.loop_name, run.status, run.iterations, run.findings_count, run.duration_ms
        );
        match &run.error {
            Some(error) => println!("  {}", error.red()),
            None => println!(),
        }
    }
    Ok(())
}

fn cmd_purge(config: &Config, days: u32, compact: bool, db: Option<PathBuf>) -> Result<()> {
    let store = open_store(db, config)?;
    let deleted = store.purge_older_than(days)?;
    println!("Deleted {deleted} findings older than {days} days");
    if compact {
        store.compact()?;
        println!("Store compacted");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_ref())?;
    setup_logging(cli.log_level.as_deref(), config.log_level.as_deref());

    match cli.command {
        Command::Backends { refresh } => cmd_backends(&config, refresh).await,
        Command::Tools { refresh } => cmd_tools(&config, refresh).await,
        Command::Run {
            loops,
            sequential,
            path,
            db,
            backend,
            max_parallel,
        } => cmd_run(&config, loops, sequential, path, db, backend, max_parallel).await?,
        Command::Findings {
            loop_name,
            severity,
            status,
            limit,
            db,
        } => cmd_findings(&config, loop_name, severity, status, limit, db)?,
        Command::Stats { db } => cmd_stats(&config, db)?,
        Command::Ack { id, db } => cmd_set_status(&config, &id, FindingStatus::Acknowledged, db)?,
        Command::Fixed { id, db } => cmd_set_status(&config, &id, FindingStatus::Fixed, db)?,
        Command::FalsePositive { id, db } => cmd_set_status(&config, &id, FindingStatus::FalsePositive, db)?,
        Command::History { loop_name, limit, db } => cmd_history(&config, loop_name, limit, db)?,
        Command::Purge { days, compact, db } => cmd_purge(&config, days, compact, db)?,
    }

    Ok(())
}
