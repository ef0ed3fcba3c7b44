//! `Database` trait: single async interface for all persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::pipeline::types::ResultTag;

/// What the pipeline remembers about one conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadMemory {
    pub thread_id: String,
    /// Condensed summary of the conversation so far.
    pub summary: String,
    /// Result label of the most recent completed action on this thread.
    pub last_action: String,
    pub updated_at: DateTime<Utc>,
}

/// Entry in the processed set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedRecord {
    pub message_id: String,
    pub result: String,
    pub processed_at: DateTime<Utc>,
}

/// A meeting recorded by `schedule_meeting`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meeting {
    pub id: Uuid,
    pub topic: String,
    /// As stated in the email. Not normalized.
    pub datetime: String,
    pub attendees: String,
    pub source_message_id: String,
    pub created_at: DateTime<Utc>,
}

impl Meeting {
    pub fn new(
        topic: impl Into<String>,
        datetime: impl Into<String>,
        attendees: impl Into<String>,
        source_message_id: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            topic: topic.into(),
            datetime: datetime.into(),
            attendees: attendees.into(),
            source_message_id: source_message_id.into(),
            created_at: Utc::now(),
        }
    }
}

/// A task recorded by `add_to_todo`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Todo {
    pub id: Uuid,
    pub task: String,
    pub due_date: String,
    pub source_message_id: String,
    pub created_at: DateTime<Utc>,
}

impl Todo {
    pub fn new(
        task: impl Into<String>,
        due_date: impl Into<String>,
        source_message_id: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            task: task.into(),
            due_date: due_date.into(),
            source_message_id: source_message_id.into(),
            created_at: Utc::now(),
        }
    }
}

/// Backend-agnostic persistence for dedup, thread memory and action records.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    // ── Dedup ───────────────────────────────────────────────────────

    /// Whether the message has been recorded as processed.
    async fn has_processed(&self, message_id: &str) -> Result<bool, DatabaseError>;

    /// Record the message as processed.
    ///
    /// Idempotent. Returns `true` only for the call that inserted the
    /// record; the first result tag wins.
    async fn mark_processed(
        &self,
        message_id: &str,
        result: ResultTag,
    ) -> Result<bool, DatabaseError>;

    /// Look up a processed record.
    async fn get_processed(
        &self,
        message_id: &str,
    ) -> Result<Option<ProcessedRecord>, DatabaseError>;

    // ── Thread memory ───────────────────────────────────────────────

    async fn get_thread_memory(
        &self,
        thread_id: &str,
    ) -> Result<Option<ThreadMemory>, DatabaseError>;

    /// Replace the thread's memory in one write.
    async fn update_thread_memory(
        &self,
        thread_id: &str,
        summary: &str,
        last_action: &str,
    ) -> Result<(), DatabaseError>;

    // ── Action records ──────────────────────────────────────────────

    async fn insert_meeting(&self, meeting: &Meeting) -> Result<(), DatabaseError>;

    /// Meetings, most recent first.
    async fn list_meetings(&self, limit: usize) -> Result<Vec<Meeting>, DatabaseError>;

    async fn insert_todo(&self, todo: &Todo) -> Result<(), DatabaseError>;

    /// Todos, most recent first.
    async fn list_todos(&self, limit: usize) -> Result<Vec<Todo>, DatabaseError>;
}
