//! Side-effect helpers behind the registered actions.
//!
//! The text-producing helpers are plain LLM calls with fixed prompts; the
//! record helpers build what the store persists. Dispatch and mail
//! acknowledgment live in the executor.

use crate::error::LlmError;
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider};
use crate::store::{Meeting, Todo};

const REPLY_SYSTEM_PROMPT: &str =
    "You are an email assistant. Draft a short, professional and helpful reply to the following email:";

/// Draft a reply to `email_text`.
///
/// `sender` is prepended as context so the greeting can address them.
pub async fn generate_reply(
    llm: &dyn LlmProvider,
    email_text: &str,
    sender: &str,
) -> Result<String, LlmError> {
    let user = if sender.trim().is_empty() {
        email_text.to_string()
    } else {
        format!("From: {sender}\n\n{email_text}")
    };
    let request = CompletionRequest::new(vec![
        ChatMessage::system(REPLY_SYSTEM_PROMPT),
        ChatMessage::user(user),
    ]);
    let response = llm.complete(request).await?;
    Ok(response.content.trim().to_string())
}

/// Summarize a single email.
pub async fn summarize_email(llm: &dyn LlmProvider, email_text: &str) -> Result<String, LlmError> {
    let request = CompletionRequest::new(vec![ChatMessage::user(format!(
        "Summarize the following email:\n\n{email_text}"
    ))]);
    let response = llm.complete(request).await?;
    Ok(response.content.trim().to_string())
}

pub fn meeting_record(datetime: &str, topic: &str, attendees: &str, source_message_id: &str) -> Meeting {
    Meeting::new(topic, datetime, attendees, source_message_id)
}

pub fn todo_record(task: &str, due_date: &str, source_message_id: &str) -> Todo {
    Todo::new(task, due_date, source_message_id)
}

/// One-line description of a recorded meeting, used as handler output.
pub fn describe_meeting(meeting: &Meeting) -> String {
    let mut out = format!("Meeting scheduled: {}", display_or(&meeting.topic, "(no topic)"));
    if !meeting.datetime.is_empty() {
        out.push_str(&format!(" at {}", meeting.datetime));
    }
    if !meeting.attendees.is_empty() {
        out.push_str(&format!(" with {}", meeting.attendees));
    }
    out
}

/// One-line description of a recorded todo, used as handler output.
pub fn describe_todo(todo: &Todo) -> String {
    let mut out = format!("Todo added: {}", display_or(&todo.task, "(no task)"));
    if !todo.due_date.is_empty() {
        out.push_str(&format!(" (due {})", todo.due_date));
    }
    out
}

fn display_or<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.trim().is_empty() { fallback } else { value }
}
