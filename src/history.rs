//! Durable, local History Store: an append-only, indexed log of every
//! command executed, backed by SQLite in WAL mode.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OpenFlags};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// An immutable, durable record of one completed command.
#[derive(Debug, Clone, Serialize)]
pub struct CommandRecord {
    pub id: Uuid,
    pub session_id: Uuid,
    pub project_id: String,
    pub command: String,
    pub output: String,
    pub exit_code: i32,
    pub success: bool,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_ms: i64,
    pub working_dir: String,
}

impl CommandRecord {
    /// Build a record, enforcing the `success == (exit_code == 0)` and
    /// `ended_at >= started_at` invariants at construction time.
    #[must_use]
    pub fn new(
        session_id: Uuid,
        project_id: String,
        command: String,
        output: String,
        exit_code: i32,
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
        working_dir: String,
    ) -> Self {
        let ended_at = ended_at.max(started_at);
        Self {
            id: Uuid::new_v4(),
            session_id,
            project_id,
            command,
            output,
            exit_code,
            success: exit_code == 0,
            duration_ms: (ended_at - started_at).num_milliseconds().max(0),
            started_at,
            ended_at,
            working_dir,
        }
    }
}

/// Column to sort `query` results by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortField {
    #[default]
    Time,
    Duration,
    Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDir {
    Asc,
    #[default]
    Desc,
}

/// All combinable filters accepted by `search_history`.
#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    pub session_id: Option<Uuid>,
    pub project_id: Option<String>,
    pub command_substr: Option<String>,
    pub output_substr: Option<String>,
    pub success: Option<bool>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub working_dir_substr: Option<String>,
    pub limit: usize,
    pub sort_by: SortField,
    pub sort_dir: SortDir,
}

pub const DEFAULT_SEARCH_LIMIT: usize = 100;
pub const MAX_SEARCH_LIMIT: usize = 1000;

/// Durable, single-writer-friendly relational store for Command Records.
#[derive(Clone)]
pub struct HistoryStore {
    conn: Arc<Mutex<Connection>>,
}

impl HistoryStore {
    /// Open (creating if absent) the history database at `path`.
    pub async fn open(path: &Path, enable_wal: bool) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let path = path.to_path_buf();
        let conn = tokio::task::spawn_blocking(move || -> anyhow::Result<Connection> {
            let conn = Connection::open_with_flags(
                &path,
                OpenFlags::SQLITE_OPEN_READ_WRITE
                    | OpenFlags::SQLITE_OPEN_CREATE
                    | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?;
            if enable_wal {
                conn.pragma_update(None, "journal_mode", "WAL")?;
            }
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS command_history (
                    id TEXT PRIMARY KEY,
                    session_id TEXT NOT NULL,
                    project_id TEXT NOT NULL,
                    command TEXT NOT NULL,
                    output TEXT NOT NULL,
                    exit_code INTEGER NOT NULL,
                    success INTEGER NOT NULL,
                    started_at TEXT NOT NULL,
                    ended_at TEXT NOT NULL,
                    duration_ms INTEGER NOT NULL,
                    working_dir TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_history_session ON command_history(session_id);
                CREATE INDEX IF NOT EXISTS idx_history_project ON command_history(project_id);
                CREATE INDEX IF NOT EXISTS idx_history_started ON command_history(started_at);",
            )?;
            Ok(conn)
        })
        .await??;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Atomically append one record. Failures are the caller's to log; they
    /// must never fail the command whose outcome is being recorded.
    pub async fn append(&self, record: CommandRecord) -> anyhow::Result<()> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
            let conn = conn.blocking_lock();
            conn.execute(
                "INSERT INTO command_history
                    (id, session_id, project_id, command, output, exit_code, success,
                     started_at, ended_at, duration_ms, working_dir)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                rusqlite::params![
                    record.id.to_string(),
                    record.session_id.to_string(),
                    record.project_id,
                    record.command,
                    record.output,
                    record.exit_code,
                    i64::from(record.success),
                    record.started_at.to_rfc3339(),
                    record.ended_at.to_rfc3339(),
                    record.duration_ms,
                    record.working_dir,
                ],
            )?;
            Ok(())
        })
        .await?
    }

    /// Query matching records, newest-first by default.
    pub async fn query(&self, filters: SearchFilters) -> anyhow::Result<Vec<CommandRecord>> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || -> anyhow::Result<Vec<CommandRecord>> {
            let conn = conn.blocking_lock();
            let mut clauses: Vec<String> = Vec::new();
            let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

            if let Some(session_id) = &filters.session_id {
                clauses.push("session_id = ?".to_string());
                params.push(Box::new(session_id.to_string()));
            }
            if let Some(project_id) = &filters.project_id {
                clauses.push("project_id = ?".to_string());
                params.push(Box::new(project_id.clone()));
            }
            if let Some(substr) = &filters.command_substr {
                clauses.push("command LIKE ?".to_string());
                params.push(Box::new(format!("%{}%", like_escape(substr))));
            }
            if let Some(substr) = &filters.output_substr {
                clauses.push("output LIKE ?".to_string());
                params.push(Box::new(format!("%{}%", like_escape(substr))));
            }
            if let Some(success) = filters.success {
                clauses.push("success = ?".to_string());
                params.push(Box::new(i64::from(success)));
            }
            if let Some(start) = filters.start_time {
                clauses.push("started_at >= ?".to_string());
                params.push(Box::new(start.to_rfc3339()));
            }
            if let Some(end) = filters.end_time {
                clauses.push("started_at < ?".to_string());
                params.push(Box::new(end.to_rfc3339()));
            }
            if let Some(substr) = &filters.working_dir_substr {
                clauses.push("working_dir LIKE ?".to_string());
                params.push(Box::new(format!("%{}%", like_escape(substr))));
            }

            let where_clause = if clauses.is_empty() {
                String::new()
            } else {
                format!("WHERE {}", clauses.join(" AND "))
            };

            let sort_col = match filters.sort_by {
                SortField::Time => "started_at",
                SortField::Duration => "duration_ms",
                SortField::Command => "command",
            };
            let sort_dir = match filters.sort_dir {
                SortDir::Asc => "ASC",
                SortDir::Desc => "DESC",
            };

            let limit = filters.limit.clamp(1, MAX_SEARCH_LIMIT);

            let sql = format!(
                "SELECT id, session_id, project_id, command, output, exit_code, success,
                        started_at, ended_at, duration_ms, working_dir
                 FROM command_history
                 {where_clause}
                 ORDER BY {sort_col} {sort_dir}
                 LIMIT {limit}"
            );

            let mut stmt = conn.prepare(&sql)?;
            let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

            let rows = stmt.query_map(param_refs.as_slice(), |row| {
                let id: String = row.get(0)?;
                let session_id: String = row.get(1)?;
                let success: i64 = row.get(6)?;
                let started_at: String = row.get(7)?;
                let ended_at: String = row.get(8)?;
                Ok(CommandRecord {
                    id: Uuid::parse_str(&id).unwrap_or_default(),
                    session_id: Uuid::parse_str(&session_id).unwrap_or_default(),
                    project_id: row.get(2)?,
                    command: row.get(3)?,
                    output: row.get(4)?,
                    exit_code: row.get(5)?,
                    success: success != 0,
                    started_at: parse_rfc3339(&started_at),
                    ended_at: parse_rfc3339(&ended_at),
                    duration_ms: row.get(9)?,
                    working_dir: row.get(10)?,
                })
            })?;

            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok(out)
        })
        .await?
    }

    /// Flush and release. SQLite with WAL needs no explicit flush on a
    /// normal close; this exists so callers have an explicit lifecycle hook.
    pub async fn close(&self) {
        let conn = self.conn.clone();
        let _ = tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let _ = conn.pragma_update(None, "optimize", "");
        })
        .await;
    }
}

fn like_escape(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

fn parse_rfc3339(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_clamps_ended_at_and_computes_duration() {
        let start = Utc::now();
        let record = CommandRecord::new(
            Uuid::new_v4(),
            "proj_abc123".to_string(),
            "echo hi".to_string(),
            "hi".to_string(),
            0,
            start,
            start - chrono::Duration::seconds(5),
            "/tmp".to_string(),
        );
        assert_eq!(record.ended_at, start);
        assert_eq!(record.duration_ms, 0);
        assert!(record.success);
    }

    #[tokio::test]
    async fn append_then_query_round_trips_and_filters() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::open(&dir.path().join("history.db"), true)
            .await
            .unwrap();

        let session_id = Uuid::new_v4();
        let now = Utc::now();
        store
            .append(CommandRecord::new(
                session_id,
                "proj_abc123".to_string(),
                "echo alpha".to_string(),
                "alpha".to_string(),
                0,
                now,
                now,
                "/tmp".to_string(),
            ))
            .await
            .unwrap();
        store
            .append(CommandRecord::new(
                session_id,
                "proj_abc123".to_string(),
                "false".to_string(),
                String::new(),
                1,
                now,
                now,
                "/tmp".to_string(),
            ))
            .await
            .unwrap();

        let mut filters = SearchFilters::default();
        filters.success = Some(true);
        filters.limit = DEFAULT_SEARCH_LIMIT;
        let results = store.query(filters).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].command, "echo alpha");

        store.close().await;
    }

    #[tokio::test]
    async fn query_respects_limit_clamp() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::open(&dir.path().join("history.db"), true)
            .await
            .unwrap();
        let now = Utc::now();
        for i in 0..5 {
            store
                .append(CommandRecord::new(
                    Uuid::new_v4(),
                    "proj_abc123".to_string(),
                    format!("echo {i}"),
                    String::new(),
                    0,
                    now,
                    now,
                    "/tmp".to_string(),
                ))
                .await
                .unwrap();
        }

        let mut filters = SearchFilters::default();
        filters.limit = 2;
        let results = store.query(filters).await.unwrap();
        assert_eq!(results.len(), 2);
    }
}
