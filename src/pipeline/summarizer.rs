//! Thread summarizer: folds a whole conversation into a short summary.

use std::sync::Arc;

use crate::error::LlmError;
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider};
use crate::pipeline::types::Message;

pub struct ThreadSummarizer {
    llm: Arc<dyn LlmProvider>,
    max_sentences: usize,
}

impl ThreadSummarizer {
    pub fn new(llm: Arc<dyn LlmProvider>, max_sentences: usize) -> Self {
        Self { llm, max_sentences }
    }

    /// Summarize `messages` (oldest first).
    ///
    /// The sentence bound is an instruction to the model, not enforced here.
    pub async fn resummarize(&self, messages: &[Message]) -> Result<String, LlmError> {
        let request = CompletionRequest::new(vec![
            ChatMessage::system(format!(
                "Summarize this conversation in at most {} sentences.",
                self.max_sentences
            )),
            ChatMessage::user(transcript(messages)),
        ]);
        let response = self.llm.complete(request).await?;
        Ok(response.content.trim().to_string())
    }
}

/// `From: <sender>\n<body>` blocks separated by a blank line.
pub fn transcript(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|m| format!("From: {}\n{}", m.from, m.body.trim()))
        .collect::<Vec<_>>()
        .join("\n\n")
}
