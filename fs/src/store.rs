//! Core FindingStore implementation

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use eyre::{Context, Result, eyre};
use rusqlite::types::{Type, Value};
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};
use tracing::{debug, info};

use crate::types::{
    Finding, FindingFilter, FindingStatus, LoopRunRecord, OrderBy, ScanRecord, StoreStats,
};
use crate::now_ms;

const SCHEMA: &str = "
-- Findings table with unique constraint to prevent duplicates
CREATE TABLE IF NOT EXISTS findings (
    id TEXT PRIMARY KEY,
    loop TEXT NOT NULL,
    file TEXT NOT NULL,
    line INTEGER DEFAULT 0,
    category TEXT NOT NULL,
    severity TEXT NOT NULL,
    description TEXT NOT NULL,
    suggestion TEXT DEFAULT '',
    tool TEXT DEFAULT '',
    raw_output TEXT DEFAULT '{}',
    detected_at INTEGER NOT NULL,
    last_seen_at INTEGER NOT NULL,
    status TEXT DEFAULT 'open',
    acknowledged_at INTEGER,
    fixed_at INTEGER,
    git_commit TEXT,
    UNIQUE(file, line, category, description)
);

CREATE INDEX IF NOT EXISTS idx_findings_loop ON findings(loop);
CREATE INDEX IF NOT EXISTS idx_findings_file ON findings(file);
CREATE INDEX IF NOT EXISTS idx_findings_category ON findings(category);
CREATE INDEX IF NOT EXISTS idx_findings_severity ON findings(severity);
CREATE INDEX IF NOT EXISTS idx_findings_status ON findings(status);
CREATE INDEX IF NOT EXISTS idx_findings_detected ON findings(detected_at);
CREATE INDEX IF NOT EXISTS idx_findings_last_seen ON findings(last_seen_at);

-- Scan history table
CREATE TABLE IF NOT EXISTS scan_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    scan_type TEXT,
    loops_run TEXT,
    files_scanned INTEGER DEFAULT 0,
    findings_count INTEGER DEFAULT 0,
    duration_ms INTEGER DEFAULT 0,
    started_at INTEGER,
    completed_at INTEGER NOT NULL
);

-- Loop run history
CREATE TABLE IF NOT EXISTS loop_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    loop_name TEXT NOT NULL,
    status TEXT NOT NULL,
    iterations INTEGER DEFAULT 0,
    findings_count INTEGER DEFAULT 0,
    duration_ms INTEGER DEFAULT 0,
    error TEXT,
    completed_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_loop_history_name ON loop_history(loop_name);
CREATE INDEX IF NOT EXISTS idx_loop_history_completed ON loop_history(completed_at);
";

/// Embedded SQLite store for findings, scan history, and loop history
///
/// One logical connection per store; a mutex serializes writers. All
/// mutation happens through these operations, callers never hold rows.
pub struct FindingStore {
    /// Guarded connection; None once `close` has been called
    conn: Mutex<Option<Connection>>,

    /// Database file path
    path: PathBuf,
}

impl FindingStore {
    /// Open (and create if needed) a store at the given path
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).context("Failed to create store directory")?;
        }

        let conn = Connection::open(&path).context(format!("Failed to open store at {}", path.display()))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute_batch(SCHEMA).context("Failed to apply store schema")?;

        info!(path = %path.display(), "Opened findings store");
        Ok(Self {
            conn: Mutex::new(Some(conn)),
            path,
        })
    }

    /// The database file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Close the store; further operations fail
    pub fn close(&self) {
        let mut guard = self.conn.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if guard.take().is_some() {
            debug!(path = %self.path.display(), "Closed findings store");
        }
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let guard = self.conn.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        match guard.as_ref() {
            Some(conn) => f(conn),
            None => Err(eyre!("findings store is closed")),
        }
    }

    /// Insert a finding, or fold it into the existing row sharing its
    /// `(file, line, category, description)` tuple
    ///
    /// On conflict `last_seen_at`, `severity`, and `suggestion` are taken
    /// from the new observation; `detected_at` and `status` are kept.
    /// Returns the id of the row that now represents the finding.
    pub fn add(&self, finding: &Finding) -> Result<String> {
        self.with_conn(|conn| {
            let raw_output = serde_json::to_string(&finding.raw_output)?;
            conn.execute(
                "INSERT INTO findings
                 (id, loop, file, line, category, severity, description,
                  suggestion, tool, raw_output, detected_at, last_seen_at, status)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
                 ON CONFLICT(file, line, category, description) DO UPDATE SET
                     last_seen_at = excluded.last_seen_at,
                     severity = excluded.severity,
                     suggestion = excluded.suggestion",
                params![
                    finding.id,
                    finding.loop_name,
                    finding.file,
                    finding.line,
                    finding.category.as_str(),
                    finding.severity.as_str(),
                    finding.description,
                    finding.suggestion,
                    finding.tool,
                    raw_output,
                    finding.detected_at,
                    finding.last_seen_at,
                    finding.status.as_str(),
                ],
            )?;

            // The row keeps its original id across re-observations
            let id = conn.query_row(
                "SELECT id FROM findings WHERE file = ?1 AND line = ?2 AND category = ?3 AND description = ?4",
                params![finding.file, finding.line, finding.category.as_str(), finding.description],
                |row| row.get(0),
            )?;
            Ok(id)
        })
    }

    /// Add findings in order, returning the assigned ids
    pub fn add_many(&self, findings: &[Finding]) -> Result<Vec<String>> {
        debug!(count = findings.len(), "add_many: called");
        let mut ids = Vec::with_capacity(findings.len());
        for finding in findings {
            ids.push(self.add(finding)?);
        }
        Ok(ids)
    }

    /// Fetch a single finding by id
    pub fn get(&self, id: &str) -> Result<Option<Finding>> {
        self.with_conn(|conn| {
            let finding = conn
                .query_row(
                    &format!("SELECT {} FROM findings WHERE id = ?1", FINDING_COLUMNS),
                    params![id],
                    row_to_finding,
                )
                .optional()?;
            Ok(finding)
        })
    }

    /// Query findings with filters, pagination, and an allow-listed order
    pub fn list(&self, filter: &FindingFilter, limit: u32, offset: u32, order: OrderBy) -> Result<Vec<Finding>> {
        self.with_conn(|conn| {
            let mut sql = format!("SELECT {} FROM findings", FINDING_COLUMNS);
            let mut clauses: Vec<&str> = Vec::new();
            let mut values: Vec<Value> = Vec::new();

            if let Some(ref name) = filter.loop_name {
                clauses.push("loop = ?");
                values.push(Value::Text(name.clone()));
            }
            if let Some(ref file) = filter.file {
                clauses.push("file = ?");
                values.push(Value::Text(file.clone()));
            }
            if let Some(category) = filter.category {
                clauses.push("category = ?");
                values.push(Value::Text(category.as_str().to_string()));
            }
            if let Some(severity) = filter.severity {
                clauses.push("severity = ?");
                values.push(Value::Text(severity.as_str().to_string()));
            }
            if let Some(status) = filter.status {
                clauses.push("status = ?");
                values.push(Value::Text(status.as_str().to_string()));
            }
            if let Some(ref fragment) = filter.file_like {
                clauses.push("file LIKE ?");
                values.push(Value::Text(format!("%{}%", fragment)));
            }
            if let Some(ref fragment) = filter.description_like {
                clauses.push("description LIKE ?");
                values.push(Value::Text(format!("%{}%", fragment)));
            }

            if !clauses.is_empty() {
                sql.push_str(" WHERE ");
                sql.push_str(&clauses.join(" AND "));
            }
            sql.push_str(&format!(" ORDER BY {} LIMIT ? OFFSET ?", order.as_sql()));
            values.push(Value::Integer(i64::from(limit)));
            values.push(Value::Integer(i64::from(offset)));

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(values), row_to_finding)?;
            let mut findings = Vec::new();
            for row in rows {
                findings.push(row?);
            }
            Ok(findings)
        })
    }

    /// All findings for a file
    pub fn by_file(&self, file: &str) -> Result<Vec<Finding>> {
        self.list(&FindingFilter::default().file(file), DEFAULT_LIMIT, 0, OrderBy::default())
    }

    /// All findings from a loop
    pub fn by_loop(&self, loop_name: &str) -> Result<Vec<Finding>> {
        self.list(
            &FindingFilter::default().loop_name(loop_name),
            DEFAULT_LIMIT,
            0,
            OrderBy::default(),
        )
    }

    /// All findings of a category
    pub fn by_category(&self, category: crate::Category) -> Result<Vec<Finding>> {
        self.list(
            &FindingFilter::default().category(category),
            DEFAULT_LIMIT,
            0,
            OrderBy::default(),
        )
    }

    /// Transition a finding's status
    ///
    /// The first transition to `acknowledged` stamps `acknowledged_at`,
    /// the first to `fixed` stamps `fixed_at`; repeats keep the original
    /// timestamp. Returns false when the id does not exist.
    pub fn set_status(&self, id: &str, status: FindingStatus) -> Result<bool> {
        self.with_conn(|conn| {
            let now = now_ms();
            let changed = match status {
                FindingStatus::Acknowledged => conn.execute(
                    "UPDATE findings SET status = ?1, acknowledged_at = COALESCE(acknowledged_at, ?2) WHERE id = ?3",
                    params![status.as_str(), now, id],
                )?,
                FindingStatus::Fixed => conn.execute(
                    "UPDATE findings SET status = ?1, fixed_at = COALESCE(fixed_at, ?2) WHERE id = ?3",
                    params![status.as_str(), now, id],
                )?,
                _ => conn.execute("UPDATE findings SET status = ?1 WHERE id = ?2", params![status.as_str(), id])?,
            };
            debug!(%id, status = %status, changed, "set_status: updated");
            Ok(changed > 0)
        })
    }

    /// Delete a finding; returns false when the id does not exist
    pub fn delete(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute("DELETE FROM findings WHERE id = ?1", params![id])?;
            Ok(changed > 0)
        })
    }

    /// Aggregate counts, one grouped read per dimension
    pub fn stats(&self) -> Result<StoreStats> {
        self.with_conn(|conn| {
            let mut stats = StoreStats {
                total: conn.query_row("SELECT COUNT(*) FROM findings", [], |row| row.get::<_, i64>(0))? as u64,
                ..Default::default()
            };

            for (column, bucket) in [
                ("loop", &mut stats.by_loop),
                ("category", &mut stats.by_category),
                ("severity", &mut stats.by_severity),
                ("status", &mut stats.by_status),
            ] {
                let sql = format!("SELECT {column}, COUNT(*) FROM findings GROUP BY {column}");
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map([], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
                })?;
                for row in rows {
                    let (key, count) = row?;
                    bucket.insert(key, count);
                }
            }

            Ok(stats)
        })
    }

    /// Record a completed scan; returns the assigned row id
    pub fn add_scan_run(
        &self,
        scan_type: &str,
        loops_run: &[String],
        files_scanned: u32,
        findings_count: u32,
        duration_ms: u64,
        started_at: i64,
    ) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO scan_history
                 (scan_type, loops_run, files_scanned, findings_count, duration_ms, started_at, completed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    scan_type,
                    serde_json::to_string(loops_run)?,
                    files_scanned,
                    findings_count,
                    duration_ms as i64,
                    started_at,
                    now_ms(),
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Record a terminated loop run; returns the assigned row id
    pub fn add_loop_run(
        &self,
        loop_name: &str,
        status: &str,
        iterations: u32,
        findings_count: u32,
        duration_ms: u64,
        error: Option<&str>,
    ) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO loop_history
                 (loop_name, status, iterations, findings_count, duration_ms, error, completed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![loop_name, status, iterations, findings_count, duration_ms as i64, error, now_ms()],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Most recent scans, newest first
    pub fn recent_scans(&self, limit: u32) -> Result<Vec<ScanRecord>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, scan_type, loops_run, files_scanned, findings_count, duration_ms, started_at, completed_at
                 FROM scan_history ORDER BY completed_at DESC LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![limit], |row| {
                let loops_json: String = row.get(2)?;
                Ok(ScanRecord {
                    id: row.get(0)?,
                    scan_type: row.get(1)?,
                    loops_run: serde_json::from_str(&loops_json).unwrap_or_default(),
                    files_scanned: row.get(3)?,
                    findings_count: row.get(4)?,
                    duration_ms: row.get::<_, i64>(5)? as u64,
                    started_at: row.get(6)?,
                    completed_at: row.get(7)?,
                })
            })?;
            let mut scans = Vec::new();
            for row in rows {
                scans.push(row?);
            }
            Ok(scans)
        })
    }

    /// Loop run history, optionally filtered by loop name, newest first
    pub fn loop_history(&self, loop_name: Option<&str>, limit: u32) -> Result<Vec<LoopRunRecord>> {
        self.with_conn(|conn| {
            let (sql, values): (&str, Vec<Value>) = match loop_name {
                Some(name) => (
                    "SELECT id, loop_name, status, iterations, findings_count, duration_ms, error, completed_at
                     FROM loop_history WHERE loop_name = ? ORDER BY completed_at DESC LIMIT ?",
                    vec![Value::Text(name.to_string()), Value::Integer(i64::from(limit))],
                ),
                None => (
                    "SELECT id, loop_name, status, iterations, findings_count, duration_ms, error, completed_at
                     FROM loop_history ORDER BY completed_at DESC LIMIT ?",
                    vec![Value::Integer(i64::from(limit))],
                ),
            };

            let mut stmt = conn.prepare(sql)?;
            let rows = stmt.query_map(params_from_iter(values), |row| {
                Ok(LoopRunRecord {
                    id: row.get(0)?,
                    loop_name: row.get(1)?,
                    status: row.get(2)?,
                    iterations: row.get(3)?,
                    findings_count: row.get(4)?,
                    duration_ms: row.get::<_, i64>(5)? as u64,
                    error: row.get(6)?,
                    completed_at: row.get(7)?,
                })
            })?;
            let mut runs = Vec::new();
            for row in rows {
                runs.push(row?);
            }
            Ok(runs)
        })
    }

    /// Delete findings first detected more than `days` days ago
    ///
    /// Returns the number of deleted rows.
    pub fn purge_older_than(&self, days: u32) -> Result<usize> {
        self.with_conn(|conn| {
            let cutoff = now_ms() - i64::from(days) * 86_400_000;
            let deleted = conn.execute("DELETE FROM findings WHERE detected_at < ?1", params![cutoff])?;
            info!(days, deleted, "Purged old findings");
            Ok(deleted)
        })
    }

    /// Reclaim file space
    pub fn compact(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute_batch("VACUUM")?;
            Ok(())
        })
    }
}

const FINDING_COLUMNS: &str = "id, loop, file, line, category, severity, description, suggestion, tool, \
                               raw_output, detected_at, last_seen_at, status, acknowledged_at, fixed_at, git_commit";

const DEFAULT_LIMIT: u32 = 100;

fn row_to_finding(row: &Row<'_>) -> rusqlite::Result<Finding> {
    let raw_json: String = row.get(9)?;
    Ok(Finding {
        id: row.get(0)?,
        loop_name: row.get(1)?,
        file: row.get(2)?,
        line: row.get(3)?,
        category: parse_enum(row, 4)?,
        severity: parse_enum(row, 5)?,
        description: row.get(6)?,
        suggestion: row.get(7)?,
        tool: row.get(8)?,
        raw_output: serde_json::from_str(&raw_json).unwrap_or(serde_json::Value::Null),
        detected_at: row.get(10)?,
        last_seen_at: row.get(11)?,
        status: parse_enum(row, 12)?,
        acknowledged_at: row.get(13)?,
        fixed_at: row.get(14)?,
        git_commit: row.get(15)?,
    })
}

fn parse_enum<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = crate::ParseEnumError>,
{
    let text: String = row.get(idx)?;
    text.parse()
        .map_err(|e: crate::ParseEnumError| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Category, Severity};
    use tempfile::TempDir;

    fn open_store(temp: &TempDir) -> FindingStore {
        FindingStore::open(temp.path().join("findings.db")).unwrap()
    }

    fn leak_finding() -> Finding {
        Finding::new("leaky", "server/cache.py", 42, Category::MemoryLeaks, Severity::High, "Unbounded cache")
            .with_suggestion("Add a maximum entry count")
    }

    #[test]
    fn test_add_and_get() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp);

        let id = store.add(&leak_finding()).unwrap();
        let fetched = store.get(&id).unwrap().unwrap();

        assert_eq!(fetched.loop_name, "leaky");
        assert_eq!(fetched.file, "server/cache.py");
        assert_eq!(fetched.line, 42);
        assert_eq!(fetched.category, Category::MemoryLeaks);
        assert_eq!(fetched.severity, Severity::High);
        assert_eq!(fetched.status, FindingStatus::Open);
    }

    #[test]
    fn test_get_unknown_id() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp);
        assert!(store.get("slop-nope").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_upsert_keeps_one_row() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp);

        let first = leak_finding();
        let id1 = store.add(&first).unwrap();

        std::thread::sleep(std::time::Duration::from_millis(5));

        // Same uniqueness tuple, new observation with a different severity
        let mut second = leak_finding();
        second.severity = Severity::Medium;
        second.suggestion = "Evict oldest entries".to_string();
        let id2 = store.add(&second).unwrap();

        assert_eq!(id1, id2, "re-observation must resolve to the original row");
        assert_eq!(store.stats().unwrap().total, 1);

        let row = store.get(&id1).unwrap().unwrap();
        assert_eq!(row.severity, Severity::Medium);
        assert_eq!(row.suggestion, "Evict oldest entries");
        assert_eq!(row.detected_at, first.detected_at, "detected_at must not reset");
        assert!(row.last_seen_at > first.last_seen_at, "last_seen_at must advance");
    }

    #[test]
    fn test_add_many_preserves_order_and_count() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp);

        let findings: Vec<Finding> = (0..5)
            .map(|i| {
                Finding::new("zombie", "a.py", i, Category::DeadCode, Severity::Low, format!("dead block {i}"))
            })
            .collect();

        let ids = store.add_many(&findings).unwrap();
        assert_eq!(ids.len(), 5);
        assert_eq!(store.stats().unwrap().total, 5);
    }

    #[test]
    fn test_list_filters() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp);

        store.add(&leak_finding()).unwrap();
        store
            .add(&Finding::new("zombie", "lib/util.py", 7, Category::DeadCode, Severity::Low, "unused helper"))
            .unwrap();

        let leaky = store
            .list(&FindingFilter::default().loop_name("leaky"), 100, 0, OrderBy::default())
            .unwrap();
        assert_eq!(leaky.len(), 1);
        assert_eq!(leaky[0].loop_name, "leaky");

        let by_severity = store
            .list(&FindingFilter::default().severity(Severity::Low), 100, 0, OrderBy::default())
            .unwrap();
        assert_eq!(by_severity.len(), 1);
        assert_eq!(by_severity[0].file, "lib/util.py");

        let like = store
            .list(&FindingFilter::default().file_like("util"), 100, 0, OrderBy::default())
            .unwrap();
        assert_eq!(like.len(), 1);

        let desc_like = store
            .list(&FindingFilter::default().description_like("cache"), 100, 0, OrderBy::default())
            .unwrap();
        assert_eq!(desc_like.len(), 1);
        assert_eq!(desc_like[0].loop_name, "leaky");
    }

    #[test]
    fn test_list_pagination() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp);

        for i in 0..10 {
            let mut finding =
                Finding::new("drifter", "big.py", i, Category::Verbosity, Severity::Low, format!("verbose {i}"));
            finding.detected_at += i64::from(i);
            store.add(&finding).unwrap();
        }

        let page = store.list(&FindingFilter::default(), 4, 4, OrderBy::DetectedAtAsc).unwrap();
        assert_eq!(page.len(), 4);
        assert_eq!(page[0].line, 4);
    }

    #[test]
    fn test_injection_in_order_by_is_neutralized() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp);
        store.add(&leak_finding()).unwrap();

        let order = OrderBy::parse("DROP TABLE findings; --");
        let rows = store.list(&FindingFilter::default(), 100, 0, order).unwrap();
        assert_eq!(rows.len(), 1);
        // Table survived
        assert_eq!(store.stats().unwrap().total, 1);
    }

    #[test]
    fn test_set_status_acknowledged_stamps_once() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp);
        let id = store.add(&leak_finding()).unwrap();

        assert!(store.set_status(&id, FindingStatus::Acknowledged).unwrap());
        let first = store.get(&id).unwrap().unwrap();
        let stamped = first.acknowledged_at.unwrap();

        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(store.set_status(&id, FindingStatus::Acknowledged).unwrap());
        let second = store.get(&id).unwrap().unwrap();

        assert_eq!(second.status, FindingStatus::Acknowledged);
        assert_eq!(second.acknowledged_at.unwrap(), stamped, "repeat must not reset the timestamp");
    }

    #[test]
    fn test_set_status_fixed_and_false_positive() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp);
        let id = store.add(&leak_finding()).unwrap();

        assert!(store.set_status(&id, FindingStatus::Fixed).unwrap());
        let fixed = store.get(&id).unwrap().unwrap();
        assert!(fixed.fixed_at.is_some());

        let id2 = store
            .add(&Finding::new("leaker", "auth.py", 3, Category::Security, Severity::Critical, "hardcoded key"))
            .unwrap();
        assert!(store.set_status(&id2, FindingStatus::FalsePositive).unwrap());
        let fp = store.get(&id2).unwrap().unwrap();
        assert_eq!(fp.status, FindingStatus::FalsePositive);
        assert!(fp.acknowledged_at.is_none());
        assert!(fp.fixed_at.is_none());
    }

    #[test]
    fn test_set_status_unknown_id_returns_false() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp);
        assert!(!store.set_status("slop-missing", FindingStatus::Fixed).unwrap());
    }

    #[test]
    fn test_delete() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp);
        let id = store.add(&leak_finding()).unwrap();

        assert!(store.delete(&id).unwrap());
        assert!(store.get(&id).unwrap().is_none());
        assert!(!store.delete(&id).unwrap());
    }

    #[test]
    fn test_stats_buckets() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp);

        store.add(&leak_finding()).unwrap();
        store
            .add(&Finding::new("leaky", "other.py", 1, Category::MemoryLeaks, Severity::High, "held closure"))
            .unwrap();
        store
            .add(&Finding::new("leaker", "auth.py", 3, Category::Security, Severity::Critical, "hardcoded key"))
            .unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.by_loop.get("leaky"), Some(&2));
        assert_eq!(stats.by_loop.get("leaker"), Some(&1));
        assert_eq!(stats.by_category.get("security"), Some(&1));
        assert_eq!(stats.by_severity.get("high"), Some(&2));
        assert_eq!(stats.by_status.get("open"), Some(&3));
    }

    #[test]
    fn test_scan_history() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp);

        let loops = vec!["leaker".to_string(), "leaky".to_string()];
        let id = store.add_scan_run("all", &loops, 87, 12, 4200, now_ms() - 4200).unwrap();
        assert!(id > 0);

        let scans = store.recent_scans(10).unwrap();
        assert_eq!(scans.len(), 1);
        assert_eq!(scans[0].scan_type, "all");
        assert_eq!(scans[0].loops_run, loops);
        assert_eq!(scans[0].files_scanned, 87);
    }

    #[test]
    fn test_loop_history_filtered() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp);

        store.add_loop_run("leaky", "done", 2, 3, 1500, None).unwrap();
        store.add_loop_run("zombie", "error", 1, 0, 300, Some("boom")).unwrap();

        let all = store.loop_history(None, 10).unwrap();
        assert_eq!(all.len(), 2);

        let zombie = store.loop_history(Some("zombie"), 10).unwrap();
        assert_eq!(zombie.len(), 1);
        assert_eq!(zombie[0].status, "error");
        assert_eq!(zombie[0].error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_purge_older_than() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp);

        let mut old = leak_finding();
        old.detected_at = now_ms() - 40 * 86_400_000;
        store.add(&old).unwrap();
        store
            .add(&Finding::new("zombie", "new.py", 1, Category::DeadCode, Severity::Low, "fresh"))
            .unwrap();

        let purged = store.purge_older_than(30).unwrap();
        assert_eq!(purged, 1);
        assert_eq!(store.stats().unwrap().total, 1);
    }

    #[test]
    fn test_compact_runs() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp);
        store.add(&leak_finding()).unwrap();
        store.compact().unwrap();
    }

    #[test]
    fn test_close_rejects_further_operations() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp);
        store.add(&leak_finding()).unwrap();

        store.close();
        assert!(store.stats().is_err());
        assert!(store.add(&leak_finding()).is_err());
    }
}
