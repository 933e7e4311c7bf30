//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the GraphStore trait.

use crate::content::PageContent;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{GraphStore, StorageError, StorageResult};
use crate::storage::{ErrorRecord, LinkEdge, PageRecord, RunRecord, RunStatus};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// SQLite graph store
///
/// The connection sits behind a mutex because a SQLite connection cannot be
/// used from two threads at once. Upsert idempotency is enforced by the
/// schema's unique constraints.
pub struct SqliteGraphStore {
    conn: Mutex<Option<Connection>>,
}

impl SqliteGraphStore {
    /// Opens or creates the database file at `path`
    pub fn open(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;
        conn.busy_timeout(Duration::from_secs(5))?;

        initialize_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(Some(conn)),
        })
    }

    /// Creates an in-memory database
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(Some(conn)),
        })
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> StorageResult<T>,
    ) -> StorageResult<T> {
        let guard = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let conn = guard.as_ref().ok_or(StorageError::Closed)?;
        f(conn)
    }

    fn count(&self, sql: &str) -> StorageResult<u64> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(sql, [], |row| row.get(0))?;
            Ok(count as u64)
        })
    }
}

fn now_string() -> String {
    format_time(Utc::now())
}

/// Fixed-width UTC timestamps so stored values order lexicographically
fn format_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_time(idx: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn time_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let value: String = row.get(idx)?;
    parse_time(idx, &value)
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    let finished_at: Option<String> = row.get(2)?;
    let status: String = row.get(5)?;
    Ok(RunRecord {
        id: row.get(0)?,
        started_at: time_column(row, 1)?,
        finished_at: finished_at.map(|t| parse_time(2, &t)).transpose()?,
        seed_url: row.get(3)?,
        config_hash: row.get(4)?,
        status: RunStatus::from_db_string(&status).unwrap_or(RunStatus::Failed),
    })
}

impl GraphStore for SqliteGraphStore {
    // ===== Graph Writes =====

    fn upsert_page(&self, url: &str, content: &PageContent) -> StorageResult<()> {
        let json = serde_json::to_string(content)?;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO pages (url, title, content, last_scraped) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(url) DO UPDATE SET
                    title = excluded.title,
                    content = excluded.content,
                    last_scraped = excluded.last_scraped",
                params![url, content.title, json, now_string()],
            )?;
            Ok(())
        })
    }

    fn upsert_link(&self, from: &str, to: &str) -> StorageResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO links (from_url, to_url, discovered) VALUES (?1, ?2, ?3)
                 ON CONFLICT(from_url, to_url) DO UPDATE SET
                    discovered = MAX(discovered, excluded.discovered)",
                params![from, to, now_string()],
            )?;
            Ok(())
        })
    }

    fn insert_error(&self, url: &str, message: &str, proxy: Option<&str>) -> StorageResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO errors (url, error, timestamp, proxy) VALUES (?1, ?2, ?3, ?4)",
                params![url, message, now_string(), proxy],
            )?;
            Ok(())
        })
    }

    // ===== Graph Reads =====

    fn get_page(&self, url: &str) -> StorageResult<Option<PageRecord>> {
        let row = self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT url, content, last_scraped FROM pages WHERE url = ?1",
                    params![url],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            time_column(row, 2)?,
                        ))
                    },
                )
                .optional()?;
            Ok(row)
        })?;

        row.map(|(url, json, last_scraped)| {
            Ok(PageRecord {
                url,
                content: serde_json::from_str(&json)?,
                last_scraped,
            })
        })
        .transpose()
    }

    fn outgoing_links(&self, from: &str) -> StorageResult<Vec<LinkEdge>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT from_url, to_url, discovered FROM links WHERE from_url = ?1 ORDER BY id",
            )?;

            let links = stmt
                .query_map(params![from], |row| {
                    Ok(LinkEdge {
                        from: row.get(0)?,
                        to: row.get(1)?,
                        discovered: time_column(row, 2)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;

            Ok(links)
        })
    }

    fn errors_for(&self, url: &str) -> StorageResult<Vec<ErrorRecord>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, url, error, timestamp, proxy FROM errors WHERE url = ?1 ORDER BY id",
            )?;

            let errors = stmt
                .query_map(params![url], |row| {
                    Ok(ErrorRecord {
                        id: row.get(0)?,
                        url: row.get(1)?,
                        message: row.get(2)?,
                        timestamp: time_column(row, 3)?,
                        proxy: row.get(4)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;

            Ok(errors)
        })
    }

    // ===== Statistics =====

    fn count_pages(&self) -> StorageResult<u64> {
        self.count("SELECT COUNT(*) FROM pages")
    }

    fn count_links(&self) -> StorageResult<u64> {
        self.count("SELECT COUNT(*) FROM links")
    }

    fn count_errors(&self) -> StorageResult<u64> {
        self.count("SELECT COUNT(*) FROM errors")
    }

    // ===== Run Management =====

    fn create_run(&self, seed_url: &str, config_hash: &str) -> StorageResult<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO runs (started_at, seed_url, config_hash, status) VALUES (?1, ?2, ?3, ?4)",
                params![
                    now_string(),
                    seed_url,
                    config_hash,
                    RunStatus::Running.to_db_string()
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    fn finish_run(&self, run_id: i64, status: RunStatus) -> StorageResult<()> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE runs SET status = ?1, finished_at = ?2 WHERE id = ?3",
                params![status.to_db_string(), now_string(), run_id],
            )?;
            if updated == 0 {
                return Err(StorageError::Corrupt(format!("run {} does not exist", run_id)));
            }
            Ok(())
        })
    }

    fn last_completed_run(&self) -> StorageResult<Option<RunRecord>> {
        self.with_conn(|conn| {
            let run = conn
                .query_row(
                    "SELECT id, started_at, finished_at, seed_url, config_hash, status
                     FROM runs WHERE status = ?1
                     ORDER BY finished_at DESC, id DESC LIMIT 1",
                    params![RunStatus::Completed.to_db_string()],
                    run_from_row,
                )
                .optional()?;
            Ok(run)
        })
    }

    // ===== Lifecycle =====

    fn close(&self) -> StorageResult<()> {
        let conn = self
            .conn
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        match conn {
            Some(conn) => conn.close().map_err(|(_, e)| StorageError::Sqlite(e)),
            None => Ok(()),
        }
    }
}
