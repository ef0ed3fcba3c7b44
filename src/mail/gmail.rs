//! Gmail REST client over reqwest.
//!
//! Authenticates with a bearer access token supplied by configuration.
//! Messages are fetched in `raw` form and parsed locally, so the body the
//! pipeline sees does not depend on Gmail's MIME tree rendering.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use reqwest::{Client, Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::config::require_secret;
use crate::error::{ConfigError, MailError};
use crate::mail::{MailSource, UnreadPage, fetch_each};
use crate::mail::parse::{BASE64_URL, parse_encoded};
use crate::pipeline::types::Message;

/// Gmail API root.
pub const DEFAULT_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Gmail client configuration, built from environment variables.
#[derive(Debug, Clone)]
pub struct GmailConfig {
    pub access_token: SecretString,
    /// Mailbox owner. `me` means the token's own account.
    pub user_id: String,
    /// Sender address for outgoing mail. Looked up from the profile when unset.
    pub from_address: Option<String>,
    pub api_base: String,
}

impl GmailConfig {
    /// Build from `GMAIL_ACCESS_TOKEN`, `GMAIL_USER_ID` and `GMAIL_FROM_ADDRESS`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let access_token = require_secret("GMAIL_ACCESS_TOKEN", &lookup)?;
        let user_id = lookup("GMAIL_USER_ID")
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| "me".to_string());
        let from_address = lookup("GMAIL_FROM_ADDRESS").filter(|a| !a.trim().is_empty());
        Ok(Self {
            access_token,
            user_id,
            from_address,
            api_base: DEFAULT_API_BASE.to_string(),
        })
    }
}

// ── Wire types ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct MessageRef {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    messages: Vec<MessageRef>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ThreadResponse {
    #[serde(default)]
    messages: Vec<MessageRef>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMessage {
    id: String,
    thread_id: String,
    raw: String,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Profile {
    email_address: String,
}

// ── Client ──────────────────────────────────────────────────────────

/// Gmail-backed [`MailSource`].
pub struct GmailClient {
    http: Client,
    config: GmailConfig,
    sender: OnceCell<String>,
}

impl GmailClient {
    pub fn new(config: GmailConfig) -> Self {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            http,
            config,
            sender: OnceCell::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/users/{}/{}",
            self.config.api_base.trim_end_matches('/'),
            self.config.user_id,
            path
        )
    }

    /// Send one request and decode the JSON reply.
    ///
    /// `subject` names the resource for `NotFound`.
    async fn call<T: DeserializeOwned>(
        &self,
        operation: &str,
        subject: &str,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<serde_json::Value>,
    ) -> Result<T, MailError> {
        let mut request = self
            .http
            .request(method, self.url(path))
            .bearer_auth(self.config.access_token.expose_secret())
            .query(query);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await.map_err(|e| MailError::RequestFailed {
            operation: operation.to_string(),
            reason: e.to_string(),
        })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(MailError::AuthFailed);
        }
        if status == StatusCode::NOT_FOUND {
            return Err(MailError::NotFound {
                id: subject.to_string(),
            });
        }
        let text = response.text().await.map_err(|e| MailError::RequestFailed {
            operation: operation.to_string(),
            reason: format!("failed to read body: {e}"),
        })?;
        if !status.is_success() {
            let preview: String = text.chars().take(300).collect();
            return Err(MailError::RequestFailed {
                operation: operation.to_string(),
                reason: format!("HTTP {status}: {preview}"),
            });
        }

        serde_json::from_str(&text).map_err(|e| MailError::RequestFailed {
            operation: operation.to_string(),
            reason: format!("unexpected response: {e}"),
        })
    }

    async fn get_raw(&self, message_id: &str) -> Result<Message, MailError> {
        let raw: RawMessage = self
            .call(
                "get_message",
                message_id,
                Method::GET,
                &format!("messages/{message_id}"),
                &[("format", "raw".to_string())],
                None,
            )
            .await?;
        parse_encoded(&raw.id, &raw.thread_id, &raw.raw)
    }

    async fn remove_label(&self, message_id: &str, label: &str) -> Result<(), MailError> {
        let _: serde_json::Value = self
            .call(
                "modify",
                message_id,
                Method::POST,
                &format!("messages/{message_id}/modify"),
                &[],
                Some(serde_json::json!({ "removeLabelIds": [label] })),
            )
            .await?;
        debug!(message_id, label, "Label removed");
        Ok(())
    }

    /// Sender address for outgoing mail.
    async fn sender(&self) -> Result<&str, MailError> {
        self.sender
            .get_or_try_init(|| async {
                match &self.config.from_address {
                    Some(address) => Ok::<_, MailError>(address.clone()),
                    None => self
                        .call::<Profile>("profile", "profile", Method::GET, "profile", &[], None)
                        .await
                        .map(|profile| profile.email_address),
                }
            })
            .await
            .map(String::as_str)
    }
}

/// Build a plain-text MIME message and encode it for `messages/send`.
pub fn encode_outgoing(from: &str, to: &str, subject: &str, body: &str) -> Result<String, MailError> {
    let from: Mailbox = from
        .parse()
        .map_err(|e| MailError::Compose(format!("invalid sender '{from}': {e}")))?;
    let to: Mailbox = to
        .parse()
        .map_err(|e| MailError::Compose(format!("invalid recipient '{to}': {e}")))?;

    let message = lettre::Message::builder()
        .from(from)
        .to(to)
        .subject(subject)
        .header(ContentType::TEXT_PLAIN)
        .body(body.to_string())
        .map_err(|e| MailError::Compose(e.to_string()))?;

    Ok(BASE64_URL.encode(message.formatted()))
}

#[async_trait]
impl MailSource for GmailClient {
    async fn list_unread(
        &self,
        page_size: usize,
        page_token: Option<&str>,
    ) -> Result<UnreadPage, MailError> {
        let mut query = vec![
            ("labelIds", "UNREAD".to_string()),
            ("maxResults", page_size.to_string()),
        ];
        if let Some(token) = page_token {
            query.push(("pageToken", token.to_string()));
        }
        let list: ListResponse = self
            .call("list_unread", "UNREAD", Method::GET, "messages", &query, None)
            .await?;
        debug!(count = list.messages.len(), more = list.next_page_token.is_some(), "Listed unread");
        Ok(UnreadPage {
            ids: list.messages.into_iter().map(|m| m.id).collect(),
            next_page: list.next_page_token,
        })
    }

    async fn fetch_message(&self, message_id: &str) -> Result<Message, MailError> {
        self.get_raw(message_id).await
    }

    async fn fetch_thread(&self, thread_id: &str) -> Result<Vec<Message>, MailError> {
        let thread: ThreadResponse = self
            .call(
                "get_thread",
                thread_id,
                Method::GET,
                &format!("threads/{thread_id}"),
                &[("format", "minimal".to_string())],
                None,
            )
            .await?;
        let ids: Vec<&str> = thread.messages.iter().map(|m| m.id.as_str()).collect();
        Ok(fetch_each(self, ids).await)
    }

    async fn acknowledge_read(&self, message_id: &str) -> Result<(), MailError> {
        self.remove_label(message_id, "UNREAD").await
    }

    async fn transmit(&self, to: &str, subject: &str, body: &str) -> Result<String, MailError> {
        let from = self.sender().await?;
        let raw = encode_outgoing(from, to, subject, body)?;
        let sent: SendResponse = self
            .call(
                "send",
                to,
                Method::POST,
                "messages/send",
                &[],
                Some(serde_json::json!({ "raw": raw })),
            )
            .await?;
        debug!(receipt = %sent.id, "Message sent");
        Ok(sent.id)
    }

    async fn archive(&self, message_id: &str) -> Result<(), MailError> {
        self.remove_label(message_id, "INBOX").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: std::collections::HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn config_defaults_user_to_me() {
        let config = GmailConfig::from_lookup(lookup_from(&[("GMAIL_ACCESS_TOKEN", "ya29")])).unwrap();
        assert_eq!(config.user_id, "me");
        assert_eq!(config.access_token.expose_secret(), "ya29");
        assert!(config.from_address.is_none());
        assert_eq!(config.api_base, DEFAULT_API_BASE);
    }

    #[test]
    fn config_requires_token() {
        let err = GmailConfig::from_lookup(lookup_from(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref k) if k == "GMAIL_ACCESS_TOKEN"));
    }

    #[test]
    fn urls_are_scoped_to_user() {
        let mut config = GmailConfig::from_lookup(lookup_from(&[
            ("GMAIL_ACCESS_TOKEN", "t"),
            ("GMAIL_USER_ID", "ops@x.com"),
        ]))
        .unwrap();
        config.api_base = "http://localhost:9/gmail/v1/".into();
        let client = GmailClient::new(config);
        assert_eq!(
            client.url("messages/abc/modify"),
            "http://localhost:9/gmail/v1/users/ops@x.com/messages/abc/modify"
        );
    }

    #[test]
    fn list_and_thread_responses_tolerate_missing_messages() {
        let list: ListResponse = serde_json::from_str(r#"{"resultSizeEstimate": 0}"#).unwrap();
        assert!(list.messages.is_empty());
        assert!(list.next_page_token.is_none());

        let paged: ListResponse = serde_json::from_str(
            r#"{"messages": [{"id": "m9", "threadId": "t9"}], "nextPageToken": "p2"}"#,
        )
        .unwrap();
        assert_eq!(paged.messages[0].id, "m9");
        assert_eq!(paged.next_page_token.as_deref(), Some("p2"));

        let thread: ThreadResponse = serde_json::from_str(
            r#"{"id": "t1", "messages": [{"id": "m1", "threadId": "t1"}, {"id": "m2", "threadId": "t1"}]}"#,
        )
        .unwrap();
        let ids: Vec<_> = thread.messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["m1", "m2"]);
    }

    #[test]
    fn raw_message_payload_parses() {
        let raw = BASE64_URL.encode("From: a@x.com\r\nSubject: Q\r\n\r\nhello\r\n");
        let body = serde_json::json!({"id": "m1", "threadId": "t1", "raw": raw}).to_string();
        let wire: RawMessage = serde_json::from_str(&body).unwrap();
        let msg = parse_encoded(&wire.id, &wire.thread_id, &wire.raw).unwrap();
        assert_eq!(msg.thread_id, "t1");
        assert_eq!(msg.body, "hello");
    }

    #[test]
    fn outgoing_message_round_trips_through_parser() {
        let raw = encode_outgoing("me@y.com", "Alice <a@x.com>", "Re: Q", "Tuesday works.").unwrap();
        let msg = parse_encoded("out", "t1", &raw).unwrap();
        assert_eq!(msg.from, "me@y.com");
        assert_eq!(msg.subject, "Re: Q");
        assert_eq!(msg.body, "Tuesday works.");
    }

    #[test]
    fn outgoing_rejects_bad_recipient() {
        let err = encode_outgoing("me@y.com", "not an address", "s", "b").unwrap_err();
        assert!(matches!(err, MailError::Compose(_)));
    }
}
