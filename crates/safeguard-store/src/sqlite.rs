//! SQLite-based store implementation

use chrono::{DateTime, Local, NaiveDate};
use rusqlite::{Connection, params};
use safeguard_host_api::{BlockRecorder, HostError, HostResult};
use safeguard_util::{PackageId, start_of_day};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, warn};

use crate::{AuditEvent, BlockRecord, BlockStats, Store, StoreError, StoreResult};

/// Maximum number of rows kept in the block log
pub const MAX_BLOCK_LOG_ENTRIES: usize = 1000;

/// SQLite-based store
pub struct SqliteStore {
    conn: Mutex<Connection>,
    block_log_cap: usize,
}

impl SqliteStore {
    /// Open or create a store at the given path
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> StoreResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> StoreResult<Self> {
        let store = Self {
            conn: Mutex::new(conn),
            block_log_cap: MAX_BLOCK_LOG_ENTRIES,
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Override the block log cap
    pub fn with_block_log_cap(mut self, cap: usize) -> Self {
        self.block_log_cap = cap;
        self
    }

    fn lock(&self) -> StoreResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Database("store lock poisoned".into()))
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.lock()?;

        conn.execute_batch(
            r#"
            -- Audit log (append-only)
            CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                event_json TEXT NOT NULL
            );

            -- Block log (bounded)
            CREATE TABLE IF NOT EXISTS block_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                package TEXT NOT NULL,
                timestamp_ms INTEGER NOT NULL
            );

            -- Indexes
            CREATE INDEX IF NOT EXISTS idx_audit_timestamp ON audit_log(timestamp);
            CREATE INDEX IF NOT EXISTS idx_block_timestamp ON block_log(timestamp_ms);
            "#,
        )?;

        debug!("Store schema initialized");
        Ok(())
    }

    fn query_blocks(
        conn: &Connection,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> StoreResult<Vec<BlockRecord>> {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params, |row| {
            let id: i64 = row.get(0)?;
            let package: String = row.get(1)?;
            let timestamp_ms: i64 = row.get(2)?;
            Ok((id, package, timestamp_ms))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (id, package, timestamp_ms) = row?;
            let Some(timestamp) = safeguard_util::from_epoch_millis(timestamp_ms) else {
                warn!(id, timestamp_ms, "Skipping block record with bad timestamp");
                continue;
            };
            records.push(BlockRecord {
                id,
                package: PackageId::new(package),
                timestamp,
            });
        }
        Ok(records)
    }
}

impl Store for SqliteStore {
    fn append_audit(&self, mut event: AuditEvent) -> StoreResult<()> {
        let conn = self.lock()?;
        let event_json = serde_json::to_string(&event.event)?;

        conn.execute(
            "INSERT INTO audit_log (timestamp, event_json) VALUES (?, ?)",
            params![event.timestamp.to_rfc3339(), event_json],
        )?;

        event.id = conn.last_insert_rowid();
        debug!(event_id = event.id, "Audit event appended");

        Ok(())
    }

    fn get_recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(
            "SELECT id, timestamp, event_json FROM audit_log ORDER BY id DESC LIMIT ?",
        )?;

        let rows = stmt.query_map([limit], |row| {
            let id: i64 = row.get(0)?;
            let timestamp_str: String = row.get(1)?;
            let event_json: String = row.get(2)?;
            Ok((id, timestamp_str, event_json))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (id, timestamp_str, event_json) = row?;
            let timestamp = DateTime::parse_from_rfc3339(&timestamp_str)
                .map(|dt| dt.with_timezone(&Local))
                .unwrap_or_else(|_| safeguard_util::now());
            let event: crate::AuditEventType = serde_json::from_str(&event_json)?;

            events.push(AuditEvent {
                id,
                timestamp,
                event,
            });
        }

        Ok(events)
    }

    fn record_block(&self, package: &PackageId, at: DateTime<Local>) -> StoreResult<()> {
        let conn = self.lock()?;

        conn.execute(
            "INSERT INTO block_log (package, timestamp_ms) VALUES (?, ?)",
            params![package.as_str(), at.timestamp_millis()],
        )?;

        let evicted = conn.execute(
            r#"
            DELETE FROM block_log WHERE id NOT IN (
                SELECT id FROM block_log ORDER BY id DESC LIMIT ?
            )
            "#,
            [self.block_log_cap],
        )?;

        debug!(package = %package, evicted, "Block recorded");
        Ok(())
    }

    fn recent_blocks(&self, limit: usize) -> StoreResult<Vec<BlockRecord>> {
        let conn = self.lock()?;
        Self::query_blocks(
            &conn,
            "SELECT id, package, timestamp_ms FROM block_log ORDER BY id DESC LIMIT ?",
            [limit],
        )
    }

    fn blocks_between(
        &self,
        start: DateTime<Local>,
        end: DateTime<Local>,
    ) -> StoreResult<Vec<BlockRecord>> {
        let conn = self.lock()?;
        Self::query_blocks(
            &conn,
            r#"
            SELECT id, package, timestamp_ms FROM block_log
            WHERE timestamp_ms >= ? AND timestamp_ms < ?
            ORDER BY timestamp_ms DESC, id DESC
            "#,
            [start.timestamp_millis(), end.timestamp_millis()],
        )
    }

    fn block_stats_for_day(&self, day: NaiveDate) -> StoreResult<BlockStats> {
        let start = start_of_day(day);
        let end = match day.succ_opt() {
            Some(next) => start_of_day(next),
            None => return Ok(BlockStats::default()),
        };

        let conn = self.lock()?;
        let range = [start.timestamp_millis(), end.timestamp_millis()];

        let (total, unique): (i64, i64) = conn.query_row(
            r#"
            SELECT COUNT(*), COUNT(DISTINCT package) FROM block_log
            WHERE timestamp_ms >= ? AND timestamp_ms < ?
            "#,
            range,
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let mut stmt = conn.prepare(
            r#"
            SELECT package, COUNT(*) AS n FROM block_log
            WHERE timestamp_ms >= ? AND timestamp_ms < ?
            GROUP BY package
            ORDER BY n DESC, package ASC
            LIMIT 1
            "#,
        )?;
        let mut rows = stmt.query(range)?;
        let most_blocked = match rows.next()? {
            Some(row) => {
                let package: String = row.get(0)?;
                let count: i64 = row.get(1)?;
                Some((PackageId::new(package), count as u64))
            }
            None => None,
        };

        Ok(BlockStats {
            total_blocks: total as u64,
            unique_packages: unique as u64,
            most_blocked,
        })
    }

    fn clear_block_log(&self) -> StoreResult<()> {
        let conn = self.lock()?;
        let removed = conn.execute("DELETE FROM block_log", [])?;
        debug!(removed, "Block log cleared");
        Ok(())
    }

    fn is_healthy(&self) -> bool {
        match self.conn.lock() {
            Ok(conn) => conn.query_row("SELECT 1", [], |_| Ok(())).is_ok(),
            Err(_) => {
                warn!("Store lock poisoned");
                false
            }
        }
    }
}

impl BlockRecorder for SqliteStore {
    fn record_block_event(&self, package: &PackageId, at: DateTime<Local>) -> HostResult<()> {
        self.record_block(package, at)
            .map_err(|e| HostError::Internal(e.to_string()))
    }
}
