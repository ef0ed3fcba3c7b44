//! Mail provider access.
//!
//! The pipeline only sees [`MailSource`]. `GmailClient` is the production
//! implementation; tests use in-memory fakes.

pub mod gmail;
pub mod parse;

pub use gmail::{GmailClient, GmailConfig};

use async_trait::async_trait;
use tracing::warn;

use crate::error::MailError;
use crate::pipeline::types::Message;

/// One page of unread message ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnreadPage {
    pub ids: Vec<String>,
    /// Token for the following page, `None` on the last one.
    pub next_page: Option<String>,
}

/// Everything the triage pipeline needs from a mailbox.
#[async_trait]
pub trait MailSource: Send + Sync {
    /// One page of unread ids, in the provider's listing order.
    async fn list_unread(
        &self,
        page_size: usize,
        page_token: Option<&str>,
    ) -> Result<UnreadPage, MailError>;

    /// A single message by id.
    async fn fetch_message(&self, message_id: &str) -> Result<Message, MailError>;

    /// Every message of a conversation, oldest first.
    async fn fetch_thread(&self, thread_id: &str) -> Result<Vec<Message>, MailError>;

    /// Mark a message read.
    async fn acknowledge_read(&self, message_id: &str) -> Result<(), MailError>;

    /// Send a plain-text message. Returns the provider's id for it.
    async fn transmit(&self, to: &str, subject: &str, body: &str) -> Result<String, MailError>;

    /// Move a message out of the inbox.
    async fn archive(&self, message_id: &str) -> Result<(), MailError>;

    /// The first `limit` unread messages. Messages that cannot be fetched
    /// are logged and left out.
    async fn fetch_batch(&self, limit: usize) -> Result<Vec<Message>, MailError> {
        let page = self.list_unread(limit, None).await?;
        let ids: Vec<&str> = page.ids.iter().take(limit).map(String::as_str).collect();
        Ok(fetch_each(self, ids).await)
    }
}

/// Fetch `ids` in order, skipping any that fail.
pub async fn fetch_each<S, I, T>(source: &S, ids: I) -> Vec<Message>
where
    S: MailSource + ?Sized,
    I: IntoIterator<Item = T> + Send,
    I::IntoIter: Send,
    T: AsRef<str> + Send,
{
    let mut messages = Vec::new();
    for id in ids {
        let id = id.as_ref();
        match source.fetch_message(id).await {
            Ok(message) => messages.push(message),
            Err(e) => warn!(message_id = %id, error = %e, "Skipping message that failed to load"),
        }
    }
    messages
}
