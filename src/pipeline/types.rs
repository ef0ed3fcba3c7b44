//! Shared types for the triage pipeline.

use serde::{Deserialize, Serialize};

// ── Inbound message ─────────────────────────────────────────────────

/// One fetched mail message.
///
/// Immutable once fetched. The pipeline never persists it; only its id
/// (dedup) and thread id (memory) outlive a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Provider message id.
    pub id: String,
    /// Provider conversation id.
    #[serde(rename = "threadId")]
    pub thread_id: String,
    /// Sender, as the From header reads (may include a display name).
    pub from: String,
    pub subject: String,
    /// Plain-text body.
    pub body: String,
}

impl Message {
    /// Subject for a reply: `Re: <subject>` unless it already is one.
    pub fn reply_subject(&self) -> String {
        let trimmed = self.subject.trim();
        if trimmed
            .get(..3)
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case("re:"))
        {
            trimmed.to_string()
        } else {
            format!("Re: {trimmed}")
        }
    }
}

// ── Result tag ──────────────────────────────────────────────────────

/// Outcome label for one message that went through a full cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultTag {
    ReplySent,
    ScheduledMeeting,
    Summarized,
    TodoAdded,
    NoAction,
}

impl ResultTag {
    /// Stable label, also what thread memory stores as the last action.
    pub fn label(&self) -> &'static str {
        match self {
            Self::ReplySent => "reply_sent",
            Self::ScheduledMeeting => "scheduled_meeting",
            Self::Summarized => "summarized",
            Self::TodoAdded => "todo_added",
            Self::NoAction => "no_action",
        }
    }

    /// Whether the cycle produced a side effect worth remembering.
    pub fn is_action(&self) -> bool {
        !matches!(self, Self::NoAction)
    }
}

impl std::fmt::Display for ResultTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

// ── Per-message outcome ─────────────────────────────────────────────

/// Where in the cycle a message failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Reading the processed set.
    Dedup,
    /// Reading memory or asking the model for a decision.
    Decision,
    /// Running the handler or acknowledging the message.
    Execution,
    /// Recording the message as processed.
    Commit,
    /// Refreshing thread memory after a completed action.
    Memory,
}

/// What happened to one message in a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// Already processed in an earlier run. Nothing was done.
    Skipped,
    /// The cycle ran to completion.
    Completed {
        tag: ResultTag,
        /// Handler output (draft text, summary, record description).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        output: Option<String>,
    },
    /// The cycle stopped at `stage`.
    ///
    /// Failures before `Commit` leave the message unprocessed, so the next
    /// batch retries it. A `Memory` failure happens after the commit.
    Failed { stage: Stage, error: String },
}

/// Per-message entry returned by `process_batch`, in input order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageOutcome {
    pub message_id: String,
    pub thread_id: String,
    #[serde(flatten)]
    pub status: OutcomeStatus,
}

impl MessageOutcome {
    pub fn new(message: &Message, status: OutcomeStatus) -> Self {
        Self {
            message_id: message.id.clone(),
            thread_id: message.thread_id.clone(),
            status,
        }
    }

    /// Result tag if the cycle completed.
    pub fn tag(&self) -> Option<ResultTag> {
        match &self.status {
            OutcomeStatus::Completed { tag, .. } => Some(*tag),
            _ => None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.status, OutcomeStatus::Skipped)
    }
}
