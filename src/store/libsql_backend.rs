//! libSQL backend: async `Database` trait implementation.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, Row, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::pipeline::types::ResultTag;
use crate::store::migrations;
use crate::store::traits::{Database, Meeting, ProcessedRecord, ThreadMemory, Todo};

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::from_database(db)?;
        backend.run_migrations().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let backend = Self::from_database(db)?;
        backend.run_migrations().await?;
        Ok(backend)
    }

    fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn parse_uuid(s: &str, op: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(s).map_err(|e| DatabaseError::Query(format!("{op}: bad id '{s}': {e}")))
}

/// Clamp a caller-supplied limit to what SQLite accepts.
fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

const MEETING_COLUMNS: &str = "id, topic, datetime, attendees, source_message_id, created_at";
const TODO_COLUMNS: &str = "id, task, due_date, source_message_id, created_at";

/// Column order matches MEETING_COLUMNS.
fn row_to_meeting(row: &Row) -> Result<Meeting, DatabaseError> {
    let read = |e: libsql::Error| DatabaseError::Query(format!("meeting row parse: {e}"));
    let id: String = row.get(0).map_err(read)?;
    let created: String = row.get(5).map_err(read)?;
    Ok(Meeting {
        id: parse_uuid(&id, "meeting row parse")?,
        topic: row.get(1).map_err(read)?,
        datetime: row.get(2).map_err(read)?,
        attendees: row.get(3).map_err(read)?,
        source_message_id: row.get(4).map_err(read)?,
        created_at: parse_datetime(&created),
    })
}

/// Column order matches TODO_COLUMNS.
fn row_to_todo(row: &Row) -> Result<Todo, DatabaseError> {
    let read = |e: libsql::Error| DatabaseError::Query(format!("todo row parse: {e}"));
    let id: String = row.get(0).map_err(read)?;
    let created: String = row.get(4).map_err(read)?;
    Ok(Todo {
        id: parse_uuid(&id, "todo row parse")?,
        task: row.get(1).map_err(read)?,
        due_date: row.get(2).map_err(read)?,
        source_message_id: row.get(3).map_err(read)?,
        created_at: parse_datetime(&created),
    })
}

#[async_trait]
impl Database for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Dedup ───────────────────────────────────────────────────────

    async fn has_processed(&self, message_id: &str) -> Result<bool, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT 1 FROM processed_messages WHERE message_id = ?1",
                params![message_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("has_processed: {e}")))?;

        match rows.next().await {
            Ok(row) => Ok(row.is_some()),
            Err(e) => Err(DatabaseError::Query(format!("has_processed: {e}"))),
        }
    }

    async fn mark_processed(
        &self,
        message_id: &str,
        result: ResultTag,
    ) -> Result<bool, DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let inserted = self
            .conn()
            .execute(
                "INSERT INTO processed_messages (message_id, result, processed_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(message_id) DO NOTHING",
                params![message_id, result.label(), now],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("mark_processed: {e}")))?;

        debug!(message_id, result = %result, inserted = inserted > 0, "Marked processed");
        Ok(inserted > 0)
    }

    async fn get_processed(
        &self,
        message_id: &str,
    ) -> Result<Option<ProcessedRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT message_id, result, processed_at FROM processed_messages WHERE message_id = ?1",
                params![message_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_processed: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let read = |e: libsql::Error| DatabaseError::Query(format!("get_processed: {e}"));
                let processed_at: String = row.get(2).map_err(read)?;
                Ok(Some(ProcessedRecord {
                    message_id: row.get(0).map_err(read)?,
                    result: row.get(1).map_err(read)?,
                    processed_at: parse_datetime(&processed_at),
                }))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_processed: {e}"))),
        }
    }

    // ── Thread memory ───────────────────────────────────────────────

    async fn get_thread_memory(
        &self,
        thread_id: &str,
    ) -> Result<Option<ThreadMemory>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT thread_id, summary, last_action, updated_at FROM threads WHERE thread_id = ?1",
                params![thread_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_thread_memory: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let read =
                    |e: libsql::Error| DatabaseError::Query(format!("get_thread_memory: {e}"));
                let updated_at: String = row.get(3).map_err(read)?;
                Ok(Some(ThreadMemory {
                    thread_id: row.get(0).map_err(read)?,
                    summary: row.get(1).map_err(read)?,
                    last_action: row.get(2).map_err(read)?,
                    updated_at: parse_datetime(&updated_at),
                }))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_thread_memory: {e}"))),
        }
    }

    async fn update_thread_memory(
        &self,
        thread_id: &str,
        summary: &str,
        last_action: &str,
    ) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        self.conn()
            .execute(
                "INSERT INTO threads (thread_id, summary, last_action, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(thread_id) DO UPDATE SET
                    summary = excluded.summary,
                    last_action = excluded.last_action,
                    updated_at = excluded.updated_at",
                params![thread_id, summary, last_action, now],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("update_thread_memory: {e}")))?;

        debug!(thread_id, last_action, "Thread memory updated");
        Ok(())
    }

    // ── Action records ──────────────────────────────────────────────

    async fn insert_meeting(&self, meeting: &Meeting) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                &format!("INSERT INTO meetings ({MEETING_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"),
                params![
                    meeting.id.to_string(),
                    meeting.topic.as_str(),
                    meeting.datetime.as_str(),
                    meeting.attendees.as_str(),
                    meeting.source_message_id.as_str(),
                    meeting.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_meeting: {e}")))?;

        debug!(meeting_id = %meeting.id, "Meeting inserted into DB");
        Ok(())
    }

    async fn list_meetings(&self, limit: usize) -> Result<Vec<Meeting>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {MEETING_COLUMNS} FROM meetings ORDER BY created_at DESC, rowid DESC LIMIT ?1"
                ),
                params![sql_limit(limit)],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_meetings: {e}")))?;

        let mut meetings = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_meetings: {e}")))?
        {
            meetings.push(row_to_meeting(&row)?);
        }
        Ok(meetings)
    }

    async fn insert_todo(&self, todo: &Todo) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                &format!("INSERT INTO todos ({TODO_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5)"),
                params![
                    todo.id.to_string(),
                    todo.task.as_str(),
                    todo.due_date.as_str(),
                    todo.source_message_id.as_str(),
                    todo.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_todo: {e}")))?;

        debug!(todo_id = %todo.id, "Todo inserted into DB");
        Ok(())
    }

    async fn list_todos(&self, limit: usize) -> Result<Vec<Todo>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {TODO_COLUMNS} FROM todos ORDER BY created_at DESC, rowid DESC LIMIT ?1"
                ),
                params![sql_limit(limit)],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_todos: {e}")))?;

        let mut todos = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_todos: {e}")))?
        {
            todos.push(row_to_todo(&row)?);
        }
        Ok(todos)
    }
}
