//! Fakes shared by the integration tests. No network calls.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use inbox_triage::error::{LlmError, MailError};
use inbox_triage::llm::provider::{
    CompletionRequest, CompletionResponse, FinishReason, LlmProvider, ToolCall,
    ToolCompletionRequest, ToolCompletionResponse,
};
use inbox_triage::mail::{MailSource, UnreadPage};
use inbox_triage::pipeline::types::Message;

/// LLM stub: decisions come from a queue (empty queue = no action),
/// summaries are numbered, everything else is a fixed draft.
pub struct StubLlm {
    decisions: Mutex<VecDeque<Option<(String, String)>>>,
    pub decide_calls: AtomicUsize,
    pub text_calls: AtomicUsize,
    summaries: AtomicUsize,
}

impl StubLlm {
    pub fn new() -> Self {
        Self {
            decisions: Mutex::new(VecDeque::new()),
            decide_calls: AtomicUsize::new(0),
            text_calls: AtomicUsize::new(0),
            summaries: AtomicUsize::new(0),
        }
    }

    /// Queue a function call for the next decision.
    pub fn then_call(self, name: &str, arguments: &str) -> Self {
        self.decisions
            .lock()
            .unwrap()
            .push_back(Some((name.to_string(), arguments.to_string())));
        self
    }

    /// Queue a decision with no function call.
    pub fn then_nothing(self) -> Self {
        self.decisions.lock().unwrap().push_back(None);
        self
    }

    pub fn decide_calls(&self) -> usize {
        self.decide_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmProvider for StubLlm {
    fn model_name(&self) -> &str {
        "stub"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.text_calls.fetch_add(1, Ordering::SeqCst);
        let first = request.messages.first().map(|m| m.content.as_str()).unwrap_or("");
        let content = if first.starts_with("Summarize this conversation") {
            let n = self.summaries.fetch_add(1, Ordering::SeqCst) + 1;
            format!("thread summary {n}")
        } else {
            "stub draft reply".to_string()
        };
        Ok(CompletionResponse {
            content,
            input_tokens: 0,
            output_tokens: 0,
            finish_reason: FinishReason::Stop,
        })
    }

    async fn complete_with_tools(
        &self,
        _request: ToolCompletionRequest,
    ) -> Result<ToolCompletionResponse, LlmError> {
        self.decide_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.decisions.lock().unwrap().pop_front().flatten();
        Ok(ToolCompletionResponse {
            content: None,
            tool_calls: next
                .into_iter()
                .map(|(name, arguments)| ToolCall {
                    id: "call_0".into(),
                    name,
                    arguments,
                })
                .collect(),
            input_tokens: 0,
            output_tokens: 0,
            finish_reason: FinishReason::ToolUse,
        })
    }
}

/// In-memory mailbox recording every side effect.
#[derive(Default)]
pub struct FakeMailbox {
    pub unread: Mutex<Vec<Message>>,
    pub threads: Mutex<HashMap<String, Vec<Message>>>,
    pub acked: Mutex<Vec<String>>,
    pub sent: Mutex<Vec<(String, String, String)>>,
    pub archived: Mutex<Vec<String>>,
}

impl FakeMailbox {
    /// Deliver a message: unread and part of its thread.
    pub fn deliver(&self, message: Message) {
        self.threads
            .lock()
            .unwrap()
            .entry(message.thread_id.clone())
            .or_default()
            .push(message.clone());
        self.unread.lock().unwrap().push(message);
    }

    pub fn acked(&self) -> Vec<String> {
        self.acked.lock().unwrap().clone()
    }
}

#[async_trait]
impl MailSource for FakeMailbox {
    async fn list_unread(
        &self,
        page_size: usize,
        page_token: Option<&str>,
    ) -> Result<UnreadPage, MailError> {
        let offset: usize = page_token.map_or(0, |t| t.parse().unwrap());
        let unread = self.unread.lock().unwrap();
        let ids: Vec<String> = unread
            .iter()
            .skip(offset)
            .take(page_size)
            .map(|m| m.id.clone())
            .collect();
        let next = offset + ids.len();
        Ok(UnreadPage {
            ids,
            next_page: (next < unread.len()).then(|| next.to_string()),
        })
    }

    async fn fetch_message(&self, message_id: &str) -> Result<Message, MailError> {
        self.threads
            .lock()
            .unwrap()
            .values()
            .flatten()
            .find(|m| m.id == message_id)
            .cloned()
            .ok_or_else(|| MailError::NotFound {
                id: message_id.into(),
            })
    }

    async fn fetch_thread(&self, thread_id: &str) -> Result<Vec<Message>, MailError> {
        Ok(self
            .threads
            .lock()
            .unwrap()
            .get(thread_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn acknowledge_read(&self, message_id: &str) -> Result<(), MailError> {
        self.unread.lock().unwrap().retain(|m| m.id != message_id);
        self.acked.lock().unwrap().push(message_id.to_string());
        Ok(())
    }

    async fn transmit(&self, to: &str, subject: &str, body: &str) -> Result<String, MailError> {
        let mut sent = self.sent.lock().unwrap();
        sent.push((to.to_string(), subject.to_string(), body.to_string()));
        Ok(format!("sent-{}", sent.len()))
    }

    async fn archive(&self, message_id: &str) -> Result<(), MailError> {
        self.archived.lock().unwrap().push(message_id.to_string());
        Ok(())
    }
}

pub fn message(id: &str, thread_id: &str, body: &str) -> Message {
    Message {
        id: id.into(),
        thread_id: thread_id.into(),
        from: "a@x.com".into(),
        subject: "Q".into(),
        body: body.into(),
    }
}
